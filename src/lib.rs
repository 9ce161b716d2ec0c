//! RSA CHALLENGE oper authentication for IRC bots.
//!
//! Ratbox-derived servers let an operator authenticate by decrypting a
//! challenge with their private key instead of sending a password:
//!
//! ```text
//! -> CHALLENGE <opername>
//! <- 740 <nick> :<base64 ciphertext>     (repeated)
//! <- 741 <nick> :End of CHALLENGE
//! -> CHALLENGE +<base64 sha1(plaintext)>
//! <- 381 | 464 | 491
//! ```
//!
//! # Modules
//!
//! - [`driver`] — the CHALLENGE state machine
//! - [`session`] — one attempt and its requester
//! - [`reporter`] — routing outcomes to the requester or the log
//! - [`engine`] — challenge engines (RSA) and their factory
//! - [`numeric`] — numeric reply → driver event registry
//! - [`auth`] — glue between client, bot and driver
//! - [`client`] — async IRC client
//! - [`bot`] — command routing with owner checks
//! - [`irc`] — IRC message parsing/formatting
//! - [`config`] — challenge settings and the bot's command line

pub mod auth;
pub mod bot;
pub mod client;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod event;
pub mod irc;
pub mod numeric;
pub mod reporter;
pub mod session;
