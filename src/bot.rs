//! Command routing for the bot.
//!
//! Provides prefix command dispatch, owner checks and automatic help.
//!
//! # Example
//!
//! ```rust,no_run
//! use challenge_auth::bot::Bot;
//!
//! let mut bot = Bot::new("!").owner("alice");
//! bot.command("ping", "Reply with pong", |ctx| {
//!     Box::pin(async move { ctx.reply("pong!").await })
//! });
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::client::ClientHandle;
use crate::event::Event;
use crate::session::Requester;

/// Context passed to command handlers.
pub struct CommandContext {
    /// The bot's client handle for sending messages.
    pub handle: ClientHandle,
    /// Nick of the user who invoked the command.
    pub sender: String,
    /// Channel or nick the command was sent to.
    pub target: String,
    /// Whether this was sent in a channel (vs PM).
    pub is_channel: bool,
    /// Sender's services account, from the `account` tag.
    pub account: Option<String>,
}

impl CommandContext {
    /// Where replies to this command go.
    pub fn reply_target(&self) -> &str {
        if self.is_channel {
            &self.target
        } else {
            &self.sender
        }
    }

    /// The invoking user as a challenge requester.
    pub fn requester(&self) -> Requester {
        Requester::new(self.sender.clone(), self.reply_target())
    }

    /// Reply to the channel/user.
    pub async fn reply(&self, text: &str) -> anyhow::Result<()> {
        self.handle.privmsg(self.reply_target(), text).await
    }
}

/// A command handler function.
pub type Handler = Arc<
    dyn Fn(CommandContext) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send
        + Sync,
>;

/// Permission level for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Permission {
    /// Anyone can use this command.
    Anyone,
    /// Only accounts listed as owners.
    Owner,
}

struct CommandEntry {
    name: String,
    description: String,
    permission: Permission,
    handler: Handler,
}

/// An IRC bot with command routing.
pub struct Bot {
    /// Command prefix (e.g. "!", ".", "bot:").
    prefix: String,
    commands: Vec<CommandEntry>,
    /// Accounts allowed to run owner commands.
    owners: Vec<String>,
}

impl Bot {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            commands: Vec::new(),
            owners: Vec::new(),
        }
    }

    /// Add an owner account.
    pub fn owner(mut self, account: &str) -> Self {
        self.owners.push(account.to_string());
        self
    }

    /// Register a command available to anyone.
    pub fn command<F>(&mut self, name: &str, description: &str, handler: F)
    where
        F: Fn(CommandContext) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
            + Send
            + Sync
            + 'static,
    {
        self.add(name, description, Permission::Anyone, Arc::new(handler));
    }

    /// Register an owner-only command.
    pub fn owner_command<F>(&mut self, name: &str, description: &str, handler: F)
    where
        F: Fn(CommandContext) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
            + Send
            + Sync
            + 'static,
    {
        self.add(name, description, Permission::Owner, Arc::new(handler));
    }

    fn add(&mut self, name: &str, description: &str, permission: Permission, handler: Handler) {
        self.commands.push(CommandEntry {
            name: name.to_lowercase(),
            description: description.to_string(),
            permission,
            handler,
        });
    }

    fn is_owner(&self, account: Option<&str>) -> bool {
        account.is_some_and(|a| self.owners.iter().any(|o| o.eq_ignore_ascii_case(a)))
    }

    /// Process an event. Call this in your event loop.
    pub async fn handle_event(&self, handle: &ClientHandle, event: &Event) {
        let Event::Message {
            from,
            target,
            text,
            tags,
        } = event
        else {
            return;
        };
        let Some(cmd_text) = text.strip_prefix(&self.prefix) else {
            return;
        };

        let Some(cmd_name) = cmd_text.split_whitespace().next().map(str::to_lowercase) else {
            return;
        };
        let is_channel = target.starts_with('#') || target.starts_with('&');
        let reply_target = if is_channel { target } else { from };

        if cmd_name == "help" {
            if let Err(e) = self.send_help(handle, reply_target).await {
                tracing::warn!(error = %e, "Cannot send help");
            }
            return;
        }

        let Some(entry) = self.commands.iter().find(|c| c.name == cmd_name) else {
            return;
        };

        let account = tags.get("account").cloned();
        if entry.permission == Permission::Owner && !self.is_owner(account.as_deref()) {
            tracing::info!(command = %entry.name, nick = %from, "Owner command refused");
            let _ = handle.privmsg(reply_target, "Permission denied.").await;
            return;
        }

        let ctx = CommandContext {
            handle: handle.clone(),
            sender: from.clone(),
            target: target.clone(),
            is_channel,
            account,
        };

        if let Err(e) = (entry.handler)(ctx).await {
            tracing::warn!(command = %entry.name, error = %e, "Command handler error");
        }
    }

    /// Send help listing all commands.
    async fn send_help(&self, handle: &ClientHandle, target: &str) -> anyhow::Result<()> {
        let mut lines = vec![format!("Commands (prefix: {}):", self.prefix)];
        for entry in &self.commands {
            let perm = match entry.permission {
                Permission::Anyone => "",
                Permission::Owner => " [owner]",
            };
            lines.push(format!(
                "  {}{} - {}{}",
                self.prefix, entry.name, entry.description, perm
            ));
        }
        lines.push(format!("  {}help - Show this help", self.prefix));
        for line in lines {
            handle.privmsg(target, &line).await?;
        }
        Ok(())
    }
}
