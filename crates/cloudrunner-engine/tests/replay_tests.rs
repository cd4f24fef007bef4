//! Integration tests for recording and replaying frame inputs.
//!
//! These tests validate recording, replaying, checkpoint verification,
//! divergence detection, and JSON serialization of [`ReplayLog`].

use std::time::Duration;

use cloudrunner_engine::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(seed: u64) -> EngineConfig {
    EngineConfig {
        seed,
        map: NodeMap::demo().starting_at("node-b").unwrap(),
        ..EngineConfig::default()
    }
}

fn fresh(seed: u64) -> Engine<RecordingSink> {
    Engine::new(CommandRegistry::heist(), &config(seed), RecordingSink::new())
}

/// A scripted session: breach, stack injections in the background, kill one,
/// idle long enough for the vault's weak window to open, then move on.
fn script(frame: u64) -> FrameInput {
    let mut input = FrameInput::idle(Duration::from_millis(if frame % 3 == 0 { 40 } else { 16 }));
    match frame {
        1 => input.lines.push("breach".to_owned()),
        20 => input.lines.push("inject --payload burn &".to_owned()),
        21 => input.lines.push("firewall up; lag &".to_owned()),
        30 => input.lines.push("kill %2".to_owned()),
        60 => input.lines.push("inject --stack 4".to_owned()),
        90 => input.lines.push("route --policy fast; connect node-d".to_owned()),
        _ => {}
    }
    input
}

fn record(seed: u64, frames: u64, interval: u64) -> (ReplayLog, Engine<RecordingSink>) {
    let cfg = config(seed);
    let driver = FrameDriver::from_config(&cfg);
    let mut engine = fresh(seed);
    let mut recorder = ReplayRecorder::new(engine.capture_snapshot(), interval);
    for frame in 0..frames {
        let input = script(frame);
        recorder.record_frame(frame, &input, Some(engine.state_hash()));
        driver.step(&mut engine, &input);
    }
    (recorder.finish(), engine)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn replay_reproduces_final_state() {
    let (log, original) = record(17, 400, 25);
    assert_eq!(log.total_frames, 400);

    let mut engine = fresh(17);
    let driver = FrameDriver::from_config(&config(17));
    let result = replay(&mut engine, &driver, &log).unwrap();

    assert!(result.completed);
    assert_eq!(result.frames_replayed, 400);
    assert!(result.first_divergence.is_none());
    assert_eq!(engine.state_hash(), original.state_hash());
    assert_eq!(engine.sink().events(), original.sink().events());
}

#[test]
fn replay_ignores_the_engine_it_starts_from() {
    let (log, original) = record(17, 120, 10);

    // Different seed and state: the initial snapshot replaces it.
    let mut engine = fresh(99);
    engine.execute_line("overclock");
    let driver = FrameDriver::from_config(&config(17));
    replay(&mut engine, &driver, &log).unwrap();

    assert_eq!(engine.state_hash(), original.state_hash());
}

#[test]
fn tampered_checkpoint_is_reported_as_divergence() {
    let (mut log, _) = record(17, 60, 10);
    for entry in &mut log.entries {
        if let ReplayEntry::Checkpoint { frame: 30, state_hash } = entry {
            *state_hash = "0".repeat(64);
        }
    }

    let mut engine = fresh(17);
    let driver = FrameDriver::from_config(&config(17));
    let result = replay(&mut engine, &driver, &log).unwrap();

    assert!(!result.completed);
    assert_eq!(result.frames_replayed, 30);
    let divergence = result.first_divergence.unwrap();
    assert_eq!(divergence.frame, 30);
    assert_eq!(divergence.expected_hash, "0".repeat(64));
}

#[test]
fn different_driver_diverges() {
    let (log, _) = record(17, 200, 5);

    let mut engine = fresh(17);
    let driver = FrameDriver::new(Duration::from_millis(50), RegenRates::none());
    let result = replay(&mut engine, &driver, &log).unwrap();

    assert!(!result.completed);
    assert!(result.first_divergence.is_some());
}

#[test]
fn duplicate_frames_are_rejected_before_restore() {
    let (mut log, _) = record(17, 10, 0);
    log.entries.push(ReplayEntry::Frame {
        frame: 3,
        input: FrameInput::default(),
    });

    let mut engine = fresh(5);
    engine.execute_line("scan");
    let before = engine.state_hash();
    let driver = FrameDriver::from_config(&config(17));

    let err = replay(&mut engine, &driver, &log).unwrap_err();
    assert!(err.to_string().contains("duplicate Frame"));
    assert_eq!(engine.state_hash(), before);
}

#[test]
fn missing_frame_is_rejected() {
    let (mut log, _) = record(17, 10, 0);
    log.entries
        .retain(|e| !matches!(e, ReplayEntry::Frame { frame: 4, .. }));

    let mut engine = fresh(17);
    let driver = FrameDriver::from_config(&config(17));
    let err = replay(&mut engine, &driver, &log).unwrap_err();
    assert!(err.to_string().contains("no input for frame 4"));
}

#[test]
fn log_round_trips_through_json() {
    let (log, original) = record(17, 90, 15);
    let json = serde_json::to_string(&log).unwrap();
    let back: ReplayLog = serde_json::from_str(&json).unwrap();

    let mut engine = fresh(17);
    let driver = FrameDriver::from_config(&config(17));
    let result = replay(&mut engine, &driver, &back).unwrap();

    assert!(result.completed);
    assert_eq!(engine.state_hash(), original.state_hash());
}

#[test]
fn fractional_frame_times_survive_json() {
    let cfg = config(17);
    let driver = FrameDriver::from_config(&cfg);
    let mut engine = fresh(17);
    let mut recorder = ReplayRecorder::new(engine.capture_snapshot(), 8);
    for frame in 0..40 {
        let mut input = FrameInput::idle(Duration::from_micros(16_667));
        if frame == 0 {
            input.lines.push("scan &".to_owned());
        }
        recorder.record_frame(frame, &input, Some(engine.state_hash()));
        driver.step(&mut engine, &input);
    }
    let json = serde_json::to_string(&recorder.finish()).unwrap();
    let back: ReplayLog = serde_json::from_str(&json).unwrap();

    let mut replayed = fresh(17);
    let result = replay(&mut replayed, &driver, &back).unwrap();

    assert!(result.completed);
    assert_eq!(result.frames_replayed, 40);
    assert_eq!(replayed.state_hash(), engine.state_hash());
    assert_eq!(replayed.time(), Duration::from_micros(16_667 * 40));
}

#[test]
fn replay_follows_map_moves() {
    let (log, original) = record(17, 120, 30);
    assert_eq!(original.game().target().id, "node-d");

    let mut engine = fresh(17);
    let driver = FrameDriver::from_config(&config(17));
    replay(&mut engine, &driver, &log).unwrap();
    assert_eq!(engine.game().target().name, "Rest");
    assert!(engine.sink().has_line_containing("connected -> Rest"));
}

#[test]
#[should_panic(expected = "expected frame 1")]
fn recorder_rejects_gaps() {
    let engine = fresh(1);
    let mut recorder = ReplayRecorder::new(engine.capture_snapshot(), 1);
    recorder.record_frame(0, &FrameInput::default(), None);
    recorder.record_frame(2, &FrameInput::default(), None);
}
