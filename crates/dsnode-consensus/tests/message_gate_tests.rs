// CONSENSUS MESSAGE GATE INTEGRATION TESTS
// Reordered delivery, serialization of application, and the rejection paths.

mod common;

use common::*;
use dsnode_consensus::{
    ConsensusConfig, ConsensusState, DsPhase, GateOutcome, RoundStage, SyncType, ViewChangeEvent,
};
use dsnode_core::ChainStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn spawn_delivery(harness: &Harness, phase: u8) -> thread::JoinHandle<GateOutcome> {
    let ctx = Arc::clone(&harness.ctx);
    thread::spawn(move || {
        ctx.process_message(&consensus_message(phase), OFFSET, &peer(1))
            .expect("no round fault")
    })
}

#[test]
fn test_in_order_delivery_applies_each_phase() {
    let harness = Harness::new(HarnessOptions {
        phases: 3,
        ..Default::default()
    });
    harness.start_round();

    assert_eq!(harness.deliver(0), Ok(GateOutcome::Applied { accepted: true }));
    assert_eq!(harness.deliver(1), Ok(GateOutcome::Applied { accepted: true }));
    assert!(matches!(harness.deliver(2), Ok(GateOutcome::Finalized(_))));
    assert_eq!(harness.applied(), vec![0, 1, 2]);
}

#[test]
fn test_reordered_messages_wait_for_their_phase() {
    let harness = Harness::new(HarnessOptions {
        phases: 3,
        ..Default::default()
    });
    harness.start_round();

    let late = spawn_delivery(&harness, 2);
    thread::sleep(Duration::from_millis(20));
    let middle = spawn_delivery(&harness, 1);
    thread::sleep(Duration::from_millis(20));
    assert!(harness.applied().is_empty());

    assert_eq!(harness.deliver(0), Ok(GateOutcome::Applied { accepted: true }));

    let middle = middle.join().unwrap();
    let late = late.join().unwrap();
    assert_eq!(middle, GateOutcome::Applied { accepted: true });
    assert!(matches!(late, GateOutcome::Finalized(_)));
    assert_eq!(harness.applied(), vec![0, 1, 2]);
    assert_eq!(harness.chain.committed_length(), 1);
}

#[test]
fn test_gate_never_applies_concurrently_or_out_of_order() {
    let phases = 8u8;
    let harness = Harness::new(HarnessOptions {
        phases,
        ..Default::default()
    });
    harness.start_round();

    let handles: Vec<_> = (0..phases).rev().map(|phase| spawn_delivery(&harness, phase)).collect();
    let outcomes: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();

    assert_eq!(harness.record.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(harness.record.inadmissible_applied.load(Ordering::SeqCst), 0);
    assert_eq!(harness.applied(), (0..phases).collect::<Vec<_>>());
    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| matches!(outcome, GateOutcome::Finalized(_)))
            .count(),
        1
    );
}

#[test]
fn test_inadmissible_message_times_out() {
    let harness = Harness::new(HarnessOptions {
        phases: 3,
        config: ConsensusConfig {
            message_order_window_ms: 50,
            ..test_config()
        },
        ..Default::default()
    });
    harness.start_round();

    let started = Instant::now();
    assert_eq!(harness.deliver(2), Ok(GateOutcome::OrderTimeout));
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(harness.applied().is_empty());
}

#[test]
fn test_resync_rejects_without_waiting() {
    let harness = Harness::new(HarnessOptions::default());
    harness.start_round();
    harness.ctx.set_sync(SyncType::DsSync);

    let started = Instant::now();
    assert_eq!(harness.deliver(0), Ok(GateOutcome::Resyncing));
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(harness.applied().is_empty());
}

#[test]
fn test_resync_releases_parked_messages() {
    let harness = Harness::new(HarnessOptions {
        phases: 2,
        ..Default::default()
    });
    harness.start_round();

    let parked = spawn_delivery(&harness, 1);
    thread::sleep(Duration::from_millis(20));
    harness.ctx.set_sync(SyncType::NewSync);

    assert_eq!(parked.join().unwrap(), GateOutcome::Resyncing);
    assert!(harness.applied().is_empty());
}

#[test]
fn test_message_waits_for_session_installation() {
    let harness = Harness::new(HarnessOptions::default());

    let early = spawn_delivery(&harness, 0);
    thread::sleep(Duration::from_millis(20));
    assert!(harness.applied().is_empty());

    harness.start_round();

    assert!(matches!(early.join().unwrap(), GateOutcome::Finalized(_)));
    assert_eq!(harness.applied(), vec![0]);
}

#[test]
fn test_early_message_wakes_round_preparation() {
    let harness = Harness::new(HarnessOptions {
        config: ConsensusConfig {
            consensus_object_timeout_ms: 5_000,
            ..test_config()
        },
        ..Default::default()
    });
    let prep = harness.ctx.consensus_prep_signal().ticket();
    harness.ctx.install_session(harness.session());

    let early = spawn_delivery(&harness, 0);
    let round = harness
        .ctx
        .consensus_prep_signal()
        .wait(prep, Duration::from_secs(5));
    assert_eq!(round, Some(1));

    harness.ctx.set_phase(DsPhase::DsBlockConsensus);

    assert!(matches!(early.join().unwrap(), GateOutcome::Finalized(_)));
}

#[test]
fn test_round_driver_advances_while_early_message_waits() {
    let harness = Harness::new(HarnessOptions {
        config: ConsensusConfig {
            consensus_object_timeout_ms: 2_000,
            ..test_config()
        },
        ..Default::default()
    });
    let prep = harness.ctx.consensus_prep_signal().ticket();
    harness.ctx.install_session(harness.session());

    let early = spawn_delivery(&harness, 0);
    assert_eq!(
        harness.ctx.consensus_prep_signal().wait(prep, Duration::from_secs(5)),
        Some(1)
    );

    let started = Instant::now();
    harness.ctx.set_phase(DsPhase::DsBlockConsensusPrep);
    harness.ctx.install_session(harness.session());
    assert!(started.elapsed() < Duration::from_millis(500));

    harness.ctx.set_phase(DsPhase::DsBlockConsensus);

    assert!(matches!(early.join().unwrap(), GateOutcome::Finalized(_)));
    assert_eq!(harness.applied(), vec![0]);
}

#[test]
fn test_resync_during_preparation_rejects_waiting_message() {
    let harness = Harness::new(HarnessOptions {
        config: ConsensusConfig {
            consensus_object_timeout_ms: 2_000,
            ..test_config()
        },
        ..Default::default()
    });
    let prep = harness.ctx.consensus_prep_signal().ticket();
    harness.ctx.install_session(harness.session());

    let early = spawn_delivery(&harness, 0);
    harness
        .ctx
        .consensus_prep_signal()
        .wait(prep, Duration::from_secs(5));

    let started = Instant::now();
    harness.ctx.set_sync(SyncType::DsSync);
    assert!(started.elapsed() < Duration::from_millis(500));

    assert_eq!(early.join().unwrap(), GateOutcome::Resyncing);
    assert!(started.elapsed() < Duration::from_millis(1_500));
    assert!(harness.applied().is_empty());
}

#[test]
fn test_readiness_timeout_outside_consensus_phase_ignores_message() {
    let harness = Harness::new(HarnessOptions::default());
    harness.ctx.install_session(harness.session());

    assert_eq!(harness.deliver(0), Ok(GateOutcome::WrongPhase));
    assert!(harness.applied().is_empty());
    assert_eq!(harness.ctx.stage(), RoundStage::AwaitingMessage);
}

#[test]
fn test_agreement_failure_hands_over_to_view_change() {
    let harness = Harness::new(HarnessOptions {
        outcome: ConsensusState::Error,
        ..Default::default()
    });
    let before = harness.ctx.committee().committee_snapshot();
    harness.ctx.record_round_failure();
    harness.start_round();

    assert_eq!(harness.deliver(0), Ok(GateOutcome::AgreementFailed));

    assert_eq!(harness.ctx.stage(), RoundStage::AwaitingViewChange);
    assert_eq!(harness.ctx.view_change_counter(), 0);
    assert_eq!(
        harness.ctx.view_change_signal().latest(),
        Some(ViewChangeEvent::AgreementFailed { round: 1 })
    );
    assert_eq!(harness.chain.committed_length(), 0);
    assert_eq!(harness.ctx.committee().committee_snapshot(), before);
    assert!(harness.broadcast.dispatches().is_empty());
}

#[test]
fn test_messages_after_agreement_failure_time_out() {
    let harness = Harness::new(HarnessOptions {
        outcome: ConsensusState::Error,
        config: ConsensusConfig {
            message_order_window_ms: 50,
            ..test_config()
        },
        ..Default::default()
    });
    harness.start_round();
    assert_eq!(harness.deliver(0), Ok(GateOutcome::AgreementFailed));

    assert_eq!(harness.deliver(1), Ok(GateOutcome::OrderTimeout));
    assert_eq!(harness.applied(), vec![0]);
}
