//! Glue between the IRC client, the bot and the challenge driver.
//!
//! [`ChallengeAuth`] feeds numerics and the `challenge` command into a
//! [`ChallengeDriver`] and carries out the resulting actions on the
//! connection. The driver sits behind a `tokio::sync::Mutex` that is held
//! until the actions are queued, so events are applied one at a time and
//! their output lines keep arrival order. Key loading and decryption run
//! on the blocking pool.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, Mutex};

use crate::bot::Bot;
use crate::client::ClientHandle;
use crate::config::ChallengeConfig;
use crate::driver::{Action, ChallengeDriver, ChallengeEvent, DriverState};
use crate::engine::EngineFactory;
use crate::event::Event;
use crate::numeric::NumericRegistry;
use crate::reporter::Delivery;
use crate::session::Requester;

pub struct ChallengeAuth<F: EngineFactory> {
    driver: Arc<Mutex<ChallengeDriver<F>>>,
    registry: NumericRegistry,
}

impl<F: EngineFactory + 'static> ChallengeAuth<F> {
    /// `auto_challenge` starts an attempt as soon as registration completes.
    pub fn new(factory: F, config: ChallengeConfig, auto_challenge: bool) -> Self {
        Self {
            driver: Arc::new(Mutex::new(ChallengeDriver::new(factory, config))),
            registry: NumericRegistry::challenge(auto_challenge),
        }
    }

    /// Register the owner-only `challenge` command on a bot.
    pub fn register(self: &Arc<Self>, bot: &mut Bot) {
        let auth = Arc::clone(self);
        bot.owner_command("challenge", "Initiate an RSA challenge", move |ctx| {
            let auth = Arc::clone(&auth);
            Box::pin(async move {
                tracing::info!(nick = %ctx.sender, account = ?ctx.account, "CHALLENGE requested");
                auth.request(&ctx.handle, ctx.requester()).await
            })
        });
    }

    /// Start an attempt on behalf of `requester`.
    pub async fn request(&self, handle: &ClientHandle, requester: Requester) -> Result<()> {
        self.dispatch(handle, ChallengeEvent::Requested(requester)).await
    }

    /// Feed a client event. Numerics the registry does not know are ignored.
    pub async fn handle_event(&self, handle: &ClientHandle, event: &Event) -> Result<()> {
        let Event::Numeric(msg) = event else {
            return Ok(());
        };
        match self.registry.dispatch(msg) {
            Some(challenge_event) => self.dispatch(handle, challenge_event).await,
            None => Ok(()),
        }
    }

    pub async fn dispatch(&self, handle: &ClientHandle, event: ChallengeEvent) -> Result<()> {
        let mut driver = Arc::clone(&self.driver).lock_owned().await;
        let (_driver, actions) = tokio::task::spawn_blocking(move || {
            let actions = driver.handle(event);
            (driver, actions)
        })
        .await?;
        for action in actions {
            perform(handle, action).await?;
        }
        Ok(())
    }

    /// Replace the configuration used by future attempts.
    pub async fn set_config(&self, config: ChallengeConfig) {
        self.driver.lock().await.set_config(config);
    }

    pub async fn state(&self) -> DriverState {
        self.driver.lock().await.state()
    }
}

async fn perform(handle: &ClientHandle, action: Action) -> Result<()> {
    match action {
        Action::Send(line) => handle.raw(&line).await,
        Action::Deliver(Delivery::Reply { to, text }) => handle.privmsg(&to.reply_to, &text).await,
        Action::Deliver(Delivery::Log { text }) => {
            tracing::info!("{text}");
            Ok(())
        }
    }
}

/// Drive the bot until the connection closes.
///
/// Joins `channels` once registered and hands every event to both the
/// challenge glue and the command router.
pub async fn serve<F: EngineFactory + 'static>(
    handle: ClientHandle,
    mut events: mpsc::Receiver<Event>,
    bot: &Bot,
    auth: &ChallengeAuth<F>,
    channels: &[String],
) -> Result<()> {
    while let Some(event) = events.recv().await {
        match event {
            Event::Registered { ref nick } => {
                tracing::info!(%nick, "Registered");
                for channel in channels {
                    handle.join(channel).await?;
                }
            }
            Event::Disconnected { ref reason } => {
                tracing::info!(%reason, "Disconnected");
                break;
            }
            Event::ServerNotice { ref text } => tracing::debug!(%text, "Server notice"),
            Event::RawLine(ref line) => tracing::trace!(%line, "<<"),
            _ => {}
        }
        if let Err(e) = auth.handle_event(&handle, &event).await {
            tracing::warn!(error = %e, "Challenge action failed");
        }
        bot.handle_event(&handle, &event).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Command;
    use crate::engine::ChallengeEngine;
    use crate::error::{DecryptError, KeyLoadError};
    use crate::irc::Message;

    struct ConcatEngine(String);

    impl ChallengeEngine for ConcatEngine {
        fn push(&mut self, fragment: &str) {
            self.0.push_str(fragment);
        }

        fn finalise(&mut self) -> Result<String, DecryptError> {
            Ok(std::mem::take(&mut self.0))
        }
    }

    struct ConcatFactory;

    impl EngineFactory for ConcatFactory {
        type Engine = ConcatEngine;

        fn build(&self, _config: &ChallengeConfig) -> Result<ConcatEngine, KeyLoadError> {
            Ok(ConcatEngine(String::new()))
        }
    }

    fn auth(opername: &str) -> ChallengeAuth<ConcatFactory> {
        let config = ChallengeConfig {
            opername: opername.to_string(),
            keyfile: "/oper.key".to_string(),
            ..Default::default()
        };
        ChallengeAuth::new(ConcatFactory, config, true)
    }

    fn numeric(line: &str) -> Event {
        Event::Numeric(Message::parse(line).unwrap())
    }

    fn raw(cmd: Command) -> String {
        match cmd {
            Command::Raw(line) => line,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unrequested_rejection_only_logs() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = ClientHandle::from_sender(tx);
        let auth = auth("bot");

        auth.handle_event(&handle, &numeric(":srv 001 bot :Welcome")).await.unwrap();
        assert_eq!(raw(rx.try_recv().unwrap()), "CHALLENGE bot");
        assert_eq!(auth.state().await, DriverState::AwaitingCiphertext);

        auth.handle_event(&handle, &numeric(":srv 491 bot :No O-lines for your host"))
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(auth.state().await, DriverState::Idle);
    }

    #[tokio::test]
    async fn requested_exchange_replies_in_place() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = ClientHandle::from_sender(tx);
        let auth = auth("bot");

        auth.request(&handle, Requester::new("alice", "#ops")).await.unwrap();
        for line in [":srv 740 bot :ab", ":srv 740 bot :cd", ":srv 741 bot :End"] {
            auth.handle_event(&handle, &numeric(line)).await.unwrap();
        }
        auth.handle_event(&handle, &numeric(":srv 381 bot :You are now an IRC operator"))
            .await
            .unwrap();

        assert_eq!(raw(rx.try_recv().unwrap()), "CHALLENGE bot");
        assert_eq!(raw(rx.try_recv().unwrap()), "CHALLENGE +abcd");
        match rx.try_recv().unwrap() {
            Command::Privmsg { target, text } => {
                assert_eq!(target, "#ops");
                assert_eq!(text, "The operation succeeded.");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn new_config_applies_to_next_attempt() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = ClientHandle::from_sender(tx);
        let auth = auth("bot");

        auth.request(&handle, Requester::new("alice", "alice")).await.unwrap();
        auth.set_config(ChallengeConfig {
            opername: "ops".to_string(),
            keyfile: "/ops.key".to_string(),
            ..Default::default()
        })
        .await;
        auth.handle_event(&handle, &numeric(":srv 740 bot :xy")).await.unwrap();
        auth.handle_event(&handle, &numeric(":srv 741 bot :End")).await.unwrap();
        auth.request(&handle, Requester::new("alice", "alice")).await.unwrap();

        assert_eq!(raw(rx.try_recv().unwrap()), "CHALLENGE bot");
        assert_eq!(raw(rx.try_recv().unwrap()), "CHALLENGE +xy");
        assert_eq!(raw(rx.try_recv().unwrap()), "CHALLENGE ops");
    }

    #[tokio::test]
    async fn ignores_unrelated_events() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = ClientHandle::from_sender(tx);
        let auth = auth("bot");

        auth.handle_event(&handle, &Event::ServerNotice { text: "hi".to_string() })
            .await
            .unwrap();
        auth.handle_event(&handle, &numeric(":srv 372 bot :- motd")).await.unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(auth.state().await, DriverState::Idle);
    }
}
