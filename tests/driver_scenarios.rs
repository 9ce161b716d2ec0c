//! Driver scenarios with a recording engine.
//!
//! The engine's "decryption" is `decrypt(<ciphertext>)`, so every emitted
//! response line shows exactly which fragments reached which session.

use std::sync::{Arc, Mutex};

use challenge_auth::config::ChallengeConfig;
use challenge_auth::driver::{Action, ChallengeDriver, ChallengeEvent, DriverState};
use challenge_auth::engine::{ChallengeEngine, EngineFactory};
use challenge_auth::error::{DecryptError, KeyLoadError};
use challenge_auth::reporter::Delivery;
use challenge_auth::session::Requester;

struct RecordingEngine {
    id: usize,
    buffer: String,
    pushes: Arc<Mutex<Vec<(usize, String)>>>,
}

impl ChallengeEngine for RecordingEngine {
    fn push(&mut self, fragment: &str) {
        self.pushes
            .lock()
            .unwrap()
            .push((self.id, fragment.to_string()));
        self.buffer.push_str(fragment);
    }

    fn finalise(&mut self) -> Result<String, DecryptError> {
        Ok(format!("decrypt({})", std::mem::take(&mut self.buffer)))
    }
}

#[derive(Default)]
struct RecordingFactory {
    built: Mutex<usize>,
    pushes: Arc<Mutex<Vec<(usize, String)>>>,
}

impl EngineFactory for RecordingFactory {
    type Engine = RecordingEngine;

    fn build(&self, _config: &ChallengeConfig) -> Result<RecordingEngine, KeyLoadError> {
        let mut built = self.built.lock().unwrap();
        *built += 1;
        Ok(RecordingEngine {
            id: *built,
            buffer: String::new(),
            pushes: Arc::clone(&self.pushes),
        })
    }
}

fn driver() -> ChallengeDriver<RecordingFactory> {
    let config = ChallengeConfig {
        opername: "rsabot".to_string(),
        keyfile: "~/rsabot.key".to_string(),
        ..Default::default()
    };
    ChallengeDriver::new(RecordingFactory::default(), config)
}

fn user() -> Requester {
    Requester::new("U", "#staff")
}

fn deliveries(actions: &[Action]) -> Vec<&Delivery> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::Deliver(d) => Some(d),
            Action::Send(_) => None,
        })
        .collect()
}

fn respond_to(fragments: &[&str]) -> Vec<Action> {
    let mut d = driver();
    d.handle(ChallengeEvent::Connected);
    for f in fragments {
        d.handle(ChallengeEvent::Ciphertext(f.to_string()));
    }
    d.handle(ChallengeEvent::Complete)
}

// ── Scenario A: requested attempt succeeds ──────────────────────────

#[test]
fn scenario_a_requested_success() {
    let mut d = driver();

    let actions = d.handle(ChallengeEvent::Requested(user()));
    assert_eq!(actions, vec![Action::Send("CHALLENGE rsabot".to_string())]);

    assert!(d.handle(ChallengeEvent::Ciphertext("ab".into())).is_empty());
    assert!(d.handle(ChallengeEvent::Ciphertext("cd".into())).is_empty());

    let actions = d.handle(ChallengeEvent::Complete);
    assert_eq!(
        actions,
        vec![Action::Send("CHALLENGE +decrypt(abcd)".to_string())]
    );
    assert_eq!(d.state(), DriverState::Responded);

    let actions = d.handle(ChallengeEvent::YoureOper);
    assert_eq!(
        actions,
        vec![Action::Deliver(Delivery::Reply {
            to: user(),
            text: "The operation succeeded.".to_string()
        })]
    );
    assert_eq!(d.state(), DriverState::Idle);
}

// ── Scenario B: on-connect attempt, no O:Line ───────────────────────

#[test]
fn scenario_b_on_connect_no_oper_line() {
    let mut d = driver();
    d.handle(ChallengeEvent::Connected);

    let actions = d.handle(ChallengeEvent::NoOperLine);
    assert_eq!(
        actions,
        vec![Action::Deliver(Delivery::Log {
            text: "Error: No O:Lines for my host".to_string()
        })]
    );
}

// ── Scenario C: requested attempt, password mismatch ────────────────

#[test]
fn scenario_c_requested_password_mismatch() {
    let mut d = driver();
    d.handle(ChallengeEvent::Requested(user()));

    let actions = d.handle(ChallengeEvent::PasswordMismatch);
    assert_eq!(
        actions,
        vec![Action::Deliver(Delivery::Reply {
            to: user(),
            text: "Error: Password mismatch".to_string()
        })]
    );
}

// ── Properties ──────────────────────────────────────────────────────

#[test]
fn fragments_concatenate_in_arrival_order() {
    let forward = respond_to(&["AAAA", "BBBB", "CC=="]);
    let reordered = respond_to(&["BBBB", "AAAA", "CC=="]);
    assert_eq!(
        forward,
        vec![Action::Send("CHALLENGE +decrypt(AAAABBBBCC==)".to_string())]
    );
    assert_ne!(forward, reordered);

    let duplicated = respond_to(&["AAAA", "AAAA"]);
    assert_eq!(
        duplicated,
        vec![Action::Send("CHALLENGE +decrypt(AAAAAAAA)".to_string())]
    );
}

#[test]
fn new_start_supersedes_old_session() {
    let mut d = driver();
    d.handle(ChallengeEvent::Requested(user()));
    d.handle(ChallengeEvent::Ciphertext("old".into()));

    d.handle(ChallengeEvent::Connected);
    assert!(d.requester().is_none());
    d.handle(ChallengeEvent::Ciphertext("new".into()));

    assert_eq!(
        d.handle(ChallengeEvent::Complete),
        vec![Action::Send("CHALLENGE +decrypt(new)".to_string())]
    );
    // The superseded requester hears nothing.
    assert!(d.handle(ChallengeEvent::YoureOper).is_empty());
}

#[test]
fn fragment_after_restart_goes_to_new_engine() {
    let factory = RecordingFactory::default();
    let pushes = Arc::clone(&factory.pushes);
    let mut d = ChallengeDriver::new(factory, ChallengeConfig::default());

    d.handle(ChallengeEvent::Connected);
    d.handle(ChallengeEvent::Ciphertext("one".into()));
    d.handle(ChallengeEvent::Requested(user()));
    d.handle(ChallengeEvent::Ciphertext("two".into()));

    assert_eq!(
        *pushes.lock().unwrap(),
        vec![(1, "one".to_string()), (2, "two".to_string())]
    );
}

#[test]
fn oper_success_reports_only_to_requester() {
    let mut d = driver();
    d.handle(ChallengeEvent::Connected);
    d.handle(ChallengeEvent::Ciphertext("x".into()));
    d.handle(ChallengeEvent::Complete);
    assert!(deliveries(&d.handle(ChallengeEvent::YoureOper)).is_empty());

    d.handle(ChallengeEvent::Requested(user()));
    d.handle(ChallengeEvent::Ciphertext("x".into()));
    d.handle(ChallengeEvent::Complete);
    assert_eq!(deliveries(&d.handle(ChallengeEvent::YoureOper)).len(), 1);
}

#[test]
fn rejections_report_exactly_once() {
    for fragments in [0, 1, 5] {
        for requested in [false, true] {
            for event in [ChallengeEvent::NoOperLine, ChallengeEvent::PasswordMismatch] {
                let mut d = driver();
                if requested {
                    d.handle(ChallengeEvent::Requested(user()));
                } else {
                    d.handle(ChallengeEvent::Connected);
                }
                for i in 0..fragments {
                    d.handle(ChallengeEvent::Ciphertext(format!("f{i}")));
                }
                let actions = d.handle(event);
                let delivered = deliveries(&actions);
                assert_eq!(delivered.len(), 1);
                assert_eq!(
                    matches!(delivered[0], Delivery::Reply { .. }),
                    requested
                );
            }
        }
    }
}

#[test]
fn stray_fragment_and_finalise_are_harmless() {
    let mut d = driver();
    assert!(d.handle(ChallengeEvent::Ciphertext("zz".into())).is_empty());
    assert!(d.handle(ChallengeEvent::Complete).is_empty());
    assert!(d.handle(ChallengeEvent::Ciphertext("zz".into())).is_empty());
    assert_eq!(d.state(), DriverState::Idle);
}

#[test]
fn rejection_without_session_is_logged() {
    let mut d = driver();
    assert_eq!(
        d.handle(ChallengeEvent::PasswordMismatch),
        vec![Action::Deliver(Delivery::Log {
            text: "Error: Password mismatch".to_string()
        })]
    );
}
