//! Routing of challenge outcomes to the requester or the log.

use crate::session::Requester;

/// Reply text for a successful oper-up.
pub const SUCCESS_TEXT: &str = "The operation succeeded.";
/// Reply text when the server has no O:Line for this host.
pub const NO_OPER_LINE_TEXT: &str = "Error: No O:Lines for my host";
/// Reply text when the server rejects the response.
pub const PASSWORD_MISMATCH_TEXT: &str = "Error: Password mismatch";
/// Reply text when the key file cannot be loaded.
pub const KEY_LOAD_TEXT: &str = "Error: Could not load challenge key";
/// Reply text when the challenge cannot be decrypted.
pub const DECRYPT_TEXT: &str = "Error: Could not answer challenge";

/// Server verdict on a challenge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    NoOperLine,
    PasswordMismatch,
}

impl Outcome {
    pub fn text(self) -> &'static str {
        match self {
            Outcome::Success => SUCCESS_TEXT,
            Outcome::NoOperLine => NO_OPER_LINE_TEXT,
            Outcome::PasswordMismatch => PASSWORD_MISMATCH_TEXT,
        }
    }
}

/// Where a piece of user-facing text ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Direct reply to the user who asked.
    Reply { to: Requester, text: String },
    /// Informational log entry; nobody asked.
    Log { text: String },
}

/// Route an outcome: reply to the requester if there is one, else log it.
pub fn report(outcome: Outcome, requester: Option<&Requester>) -> Delivery {
    deliver(outcome.text(), requester)
}

/// Route arbitrary text the same way as an outcome.
pub fn deliver(text: &str, requester: Option<&Requester>) -> Delivery {
    match requester {
        Some(to) => Delivery::Reply {
            to: to.clone(),
            text: text.to_string(),
        },
        None => Delivery::Log {
            text: text.to_string(),
        },
    }
}
