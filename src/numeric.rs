//! Numeric reply dispatch.
//!
//! The host hands every server numeric to a [`NumericRegistry`], which maps
//! the three-digit code to a decoder producing a [`ChallengeEvent`].

use std::collections::HashMap;

use crate::driver::ChallengeEvent;
use crate::irc::Message;

pub const RPL_WELCOME: &str = "001";
pub const RPL_YOUREOPER: &str = "381";
pub const ERR_PASSWDMISMATCH: &str = "464";
pub const ERR_NOOPERHOST: &str = "491";
pub const RPL_RSACHALLENGE2: &str = "740";
pub const RPL_ENDOFRSACHALLENGE2: &str = "741";

/// Turns a numeric reply into a driver event, if it carries one.
pub type NumericHandler = fn(&Message) -> Option<ChallengeEvent>;

#[derive(Default)]
pub struct NumericRegistry {
    handlers: HashMap<&'static str, NumericHandler>,
}

impl NumericRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The numerics the CHALLENGE exchange listens to.
    ///
    /// 001 is only included when `auto_challenge` is set.
    pub fn challenge(auto_challenge: bool) -> Self {
        let mut registry = Self::new();
        if auto_challenge {
            registry.register(RPL_WELCOME, |_| Some(ChallengeEvent::Connected));
        }
        registry.register(RPL_RSACHALLENGE2, |msg| {
            // :server 740 <nick> :<ciphertext>
            msg.param(1)
                .map(|fragment| ChallengeEvent::Ciphertext(fragment.to_string()))
        });
        registry.register(RPL_ENDOFRSACHALLENGE2, |_| Some(ChallengeEvent::Complete));
        registry.register(ERR_NOOPERHOST, |_| Some(ChallengeEvent::NoOperLine));
        registry.register(ERR_PASSWDMISMATCH, |_| Some(ChallengeEvent::PasswordMismatch));
        registry.register(RPL_YOUREOPER, |_| Some(ChallengeEvent::YoureOper));
        registry
    }

    /// Register a handler. A later registration for the same code replaces the earlier one.
    pub fn register(&mut self, code: &'static str, handler: NumericHandler) {
        self.handlers.insert(code, handler);
    }

    pub fn handles(&self, code: &str) -> bool {
        self.handlers.contains_key(code)
    }

    pub fn dispatch(&self, msg: &Message) -> Option<ChallengeEvent> {
        let handler = self.handlers.get(msg.command.as_str())?;
        handler(msg)
    }
}
