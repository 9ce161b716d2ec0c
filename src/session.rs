//! State of a single CHALLENGE attempt.

use crate::engine::ChallengeEngine;
use crate::error::DecryptError;

/// Who asked for a challenge attempt, and where to answer them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    /// Nick of the user who ran the command.
    pub nick: String,
    /// Channel or nick the reply goes to.
    pub reply_to: String,
}

impl Requester {
    pub fn new(nick: impl Into<String>, reply_to: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            reply_to: reply_to.into(),
        }
    }
}

/// Where an attempt is in the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// `CHALLENGE <opername>` sent, collecting 740 fragments.
    AwaitingCiphertext,
    /// `CHALLENGE +<token>` sent, waiting for 381/464/491.
    Responded,
}

/// One challenge attempt: the engine plus the requester it reports to.
pub struct Session<E> {
    id: u64,
    engine: E,
    requester: Option<Requester>,
    phase: Phase,
    fragments: usize,
}

impl<E: ChallengeEngine> Session<E> {
    pub fn new(id: u64, engine: E, requester: Option<Requester>) -> Self {
        Self {
            id,
            engine,
            requester,
            phase: Phase::AwaitingCiphertext,
            fragments: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn requester(&self) -> Option<&Requester> {
        self.requester.as_ref()
    }

    pub fn into_requester(self) -> Option<Requester> {
        self.requester
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of ciphertext fragments received so far.
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn push(&mut self, fragment: &str) {
        self.engine.push(fragment);
        self.fragments += 1;
    }

    /// Decrypt the collected ciphertext. The session counts as responded either way.
    pub fn respond(&mut self) -> Result<String, DecryptError> {
        self.phase = Phase::Responded;
        self.engine.finalise()
    }
}

impl<E> std::fmt::Debug for Session<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("requester", &self.requester)
            .field("phase", &self.phase)
            .field("fragments", &self.fragments)
            .finish_non_exhaustive()
    }
}
