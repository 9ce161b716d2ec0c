//! Events emitted by the IRC client for the bot layer to consume.

use std::collections::HashMap;

use crate::irc::Message;

#[derive(Debug, Clone)]
pub enum Event {
    /// TCP (and TLS) connection is up.
    Connected,

    /// IRC registration complete. `nick` is our confirmed nick.
    Registered { nick: String },

    /// A message in a channel or private message.
    Message {
        from: String,
        target: String,
        text: String,
        /// IRCv3 message tags (empty if none).
        tags: HashMap<String, String>,
    },

    /// Any three-digit server reply, including 001.
    Numeric(Message),

    /// Server sent a notice.
    ServerNotice { text: String },

    /// Connection was closed.
    Disconnected { reason: String },

    /// Raw server line (for debugging).
    RawLine(String),
}
