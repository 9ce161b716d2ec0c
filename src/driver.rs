//! CHALLENGE protocol state machine.
//!
//! The driver owns at most one [`Session`]. Events come in one at a time
//! (connection registered, the `challenge` command, numerics 740/741/491/464/381)
//! and each returns the [`Action`]s the host should perform: lines to queue
//! on the connection and outcomes to deliver. The driver does no I/O itself
//! besides the key file read in [`EngineFactory::build`].
//!
//! ```text
//! Start ──► CHALLENGE <opername> ──► 740* ──► 741 ──► CHALLENGE +<token> ──► 381 | 464 | 491
//! ```

use crate::config::ChallengeConfig;
use crate::engine::EngineFactory;
use crate::reporter::{self, Delivery, Outcome};
use crate::session::{Phase, Requester, Session};

/// Protocol events the driver reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeEvent {
    /// Registration completed (001). Starts an unrequested attempt.
    Connected,
    /// An authorized user asked for an attempt.
    Requested(Requester),
    /// 740: one piece of base64 ciphertext.
    Ciphertext(String),
    /// 741: all ciphertext sent.
    Complete,
    /// 491: no O:Line matches our host.
    NoOperLine,
    /// 464: the server rejected our response.
    PasswordMismatch,
    /// 381: we are now an operator.
    YoureOper,
}

/// Something the host must do on the driver's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Queue a raw protocol line.
    Send(String),
    /// Deliver text to a requester or the log.
    Deliver(Delivery),
}

/// Coarse driver state, for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    AwaitingCiphertext,
    Responded,
}

pub struct ChallengeDriver<F: EngineFactory> {
    factory: F,
    config: ChallengeConfig,
    session: Option<Session<F::Engine>>,
    attempts: u64,
}

impl<F: EngineFactory> ChallengeDriver<F> {
    pub fn new(factory: F, config: ChallengeConfig) -> Self {
        Self {
            factory,
            config,
            session: None,
            attempts: 0,
        }
    }

    /// Replace the configuration. An attempt already in flight keeps its snapshot.
    pub fn set_config(&mut self, config: ChallengeConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &ChallengeConfig {
        &self.config
    }

    pub fn state(&self) -> DriverState {
        match self.session.as_ref().map(Session::phase) {
            None => DriverState::Idle,
            Some(Phase::AwaitingCiphertext) => DriverState::AwaitingCiphertext,
            Some(Phase::Responded) => DriverState::Responded,
        }
    }

    /// Requester of the live session, if any.
    pub fn requester(&self) -> Option<&Requester> {
        self.session.as_ref().and_then(Session::requester)
    }

    pub fn handle(&mut self, event: ChallengeEvent) -> Vec<Action> {
        match event {
            ChallengeEvent::Connected => self.start(None),
            ChallengeEvent::Requested(requester) => self.start(Some(requester)),
            ChallengeEvent::Ciphertext(fragment) => {
                self.on_ciphertext(&fragment);
                Vec::new()
            }
            ChallengeEvent::Complete => self.on_complete(),
            ChallengeEvent::NoOperLine => self.on_rejected(Outcome::NoOperLine),
            ChallengeEvent::PasswordMismatch => self.on_rejected(Outcome::PasswordMismatch),
            ChallengeEvent::YoureOper => self.on_oper(),
        }
    }

    /// Begin a new attempt, discarding any previous one.
    ///
    /// If the engine cannot be built nothing is sent and the previous
    /// session, if any, is left as it was.
    pub fn start(&mut self, requester: Option<Requester>) -> Vec<Action> {
        let engine = match self.factory.build(&self.config) {
            Ok(engine) => engine,
            Err(e) => {
                tracing::warn!(error = %e, requested_by = ?requester.as_ref().map(|r| &r.nick), "Cannot start challenge");
                return match requester {
                    Some(ref r) => vec![Action::Deliver(reporter::deliver(
                        reporter::KEY_LOAD_TEXT,
                        Some(r),
                    ))],
                    None => Vec::new(),
                };
            }
        };

        if let Some(old) = self.session.take() {
            tracing::debug!(session = old.id(), "Discarding previous challenge attempt");
        }

        self.attempts += 1;
        let session = Session::new(self.attempts, engine, requester);
        tracing::info!(
            session = session.id(),
            opername = %self.config.opername,
            requested_by = ?session.requester().map(|r| &r.nick),
            "Starting challenge"
        );
        self.session = Some(session);

        vec![Action::Send(format!("CHALLENGE {}", self.config.opername))]
    }

    fn on_ciphertext(&mut self, fragment: &str) {
        match self.session {
            Some(ref mut session) if session.phase() == Phase::AwaitingCiphertext => {
                session.push(fragment);
            }
            Some(ref session) => {
                tracing::debug!(session = session.id(), "Ciphertext after response, ignoring");
            }
            None => tracing::debug!("Ciphertext with no challenge in progress, ignoring"),
        }
    }

    fn on_complete(&mut self) -> Vec<Action> {
        let Some(ref mut session) = self.session else {
            tracing::debug!("End of challenge with no challenge in progress, ignoring");
            return Vec::new();
        };
        if session.phase() != Phase::AwaitingCiphertext {
            tracing::warn!(session = session.id(), "Duplicate end of challenge, ignoring");
            return Vec::new();
        }

        match session.respond() {
            Ok(token) => {
                tracing::debug!(
                    session = session.id(),
                    fragments = session.fragments(),
                    "Answering challenge"
                );
                vec![Action::Send(format!("CHALLENGE +{token}"))]
            }
            Err(e) => {
                tracing::warn!(session = session.id(), error = %e, "Cannot answer challenge");
                let requester = self.session.take().and_then(Session::into_requester);
                match requester {
                    Some(ref r) => vec![Action::Deliver(reporter::deliver(
                        reporter::DECRYPT_TEXT,
                        Some(r),
                    ))],
                    None => Vec::new(),
                }
            }
        }
    }

    fn on_rejected(&mut self, outcome: Outcome) -> Vec<Action> {
        let requester = self.session.take().and_then(Session::into_requester);
        vec![Action::Deliver(reporter::report(outcome, requester.as_ref()))]
    }

    fn on_oper(&mut self) -> Vec<Action> {
        let Some(session) = self.session.take() else {
            return Vec::new();
        };
        tracing::info!(session = session.id(), "Challenge succeeded, now an operator");
        match session.into_requester() {
            Some(r) => vec![Action::Deliver(reporter::report(Outcome::Success, Some(&r)))],
            None => Vec::new(),
        }
    }
}
