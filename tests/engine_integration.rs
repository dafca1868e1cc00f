//! End-to-end engine tests: audio blocks and note events in, telemetry
//! messages out.
//!
//! Run with:
//! ```bash
//! cargo test -p penta --test engine_integration
//! ```

use penta::prelude::*;
use penta::Mode;

const SAMPLE_RATE: f64 = 44100.0;
const BLOCK: usize = 512;

/// Burst spacing of exactly 43 hops so every detection lands at the same
/// frame phase; the ideal reading is 120.19 BPM.
const BEAT: usize = 22016;

fn test_engine() -> (AnalysisEngine, EngineHandles) {
    AnalysisEngine::builder()
        .sample_rate(SAMPLE_RATE)
        .build()
        .expect("Failed to create test engine")
}

/// Deterministic broadband sample in [-1, 1].
fn noise(i: usize) -> f32 {
    let h = (i as u32).wrapping_mul(2654435761);
    (h >> 8) as f32 / 8388608.0 - 1.0
}

/// Silence with decaying broadband bursts at the given onsets.
fn burst_signal(len: usize, onsets: &[usize]) -> Vec<f32> {
    let mut signal = vec![0.0; len];
    for &start in onsets {
        for i in 0..2048.min(len - start) {
            let decay = (-(i as f32) / 300.0).exp();
            signal[start + i] = noise(start + i) * 0.9 * decay;
        }
    }
    signal
}

fn run_blocks(engine: &mut AnalysisEngine, signal: &[f32]) {
    for block in signal.chunks(BLOCK) {
        engine.process_block(block).expect("process_block failed");
    }
}

fn drain(handles: &EngineHandles) -> Vec<Message> {
    let consumer = handles.messages.as_ref().expect("no consumer");
    let mut out = Vec::new();
    consumer.drain(|message| out.push(message));
    out
}

#[test]
fn test_click_track_converges_to_tempo() {
    let (mut engine, handles) = test_engine();

    let onsets: Vec<usize> = (1..=10).map(|k| k * BEAT).collect();
    let signal = burst_signal(12 * BEAT, &onsets);
    run_blocks(&mut engine, &signal);

    let messages = drain(&handles);
    let onset_count = messages
        .iter()
        .filter(|message| matches!(message.payload, Payload::Onset(_)))
        .count();
    assert_eq!(onset_count, onsets.len());

    let tempos: Vec<TempoEstimate> = messages
        .iter()
        .filter_map(|message| match message.payload {
            Payload::Tempo(estimate) => Some(estimate),
            _ => None,
        })
        .collect();
    assert!(!tempos.is_empty());

    let last = tempos.last().unwrap();
    assert!((last.bpm - 120.0).abs() < 1.0, "bpm {}", last.bpm);
    assert!(last.confidence > 0.9, "confidence {}", last.confidence);
    assert!((engine.tempo_bpm() - 120.0).abs() < 1.0);

    // With an estimate in hand, full-strength quantization snaps to the
    // nearest beat multiple.
    let snapped = engine.quantize(2 * BEAT as u64 + 30, GridResolution::Quarter, 1.0, 0.0);
    assert!(
        (snapped as i64 - 2 * BEAT as i64).abs() <= 8,
        "snapped {snapped}"
    );
}

#[test]
fn test_single_outlier_deflects_tempo_at_most_five_bpm() {
    let (mut engine, _handles) = test_engine();

    // One early burst in the middle of an otherwise steady pulse.
    let mut position = 0;
    let mut onsets = Vec::new();
    for i in 0..12 {
        position += if i == 6 { BEAT / 2 } else { BEAT };
        onsets.push(position);
    }
    let signal = burst_signal(position + 4 * BLOCK, &onsets);
    run_blocks(&mut engine, &signal);

    assert!(
        (engine.tempo_bpm() - 120.0).abs() <= 5.0,
        "bpm {}",
        engine.tempo_bpm()
    );
}

#[test]
fn test_silence_then_single_click() {
    let (mut engine, handles) = test_engine();

    let second = SAMPLE_RATE as usize;
    run_blocks(&mut engine, &vec![0.0; second]);
    assert_eq!(
        drain(&handles)
            .iter()
            .filter(|message| matches!(message.payload, Payload::Onset(_)))
            .count(),
        0
    );

    let signal = burst_signal(2 * second, &[second / 2]);
    run_blocks(&mut engine, &signal);
    assert_eq!(
        drain(&handles)
            .iter()
            .filter(|message| matches!(message.payload, Payload::Onset(_)))
            .count(),
        1
    );
}

#[test]
fn test_queue_overflow_keeps_newest_with_seq_gap() {
    let capacity = 8;
    let (mut engine, handles) = AnalysisEngine::builder()
        .sample_rate(SAMPLE_RATE)
        .queue_capacities(capacity, 64)
        .report_interval(1)
        .build()
        .unwrap();

    // One diagnostics message per block, far more than the queue holds.
    let block = vec![0.0f32; BLOCK];
    for _ in 0..30 {
        engine.process_block(&block).unwrap();
    }

    let consumer = handles.messages.as_ref().unwrap();
    let mut survivors = Vec::new();
    consumer.drain(|message| survivors.push(message));

    // Exactly the newest `capacity` pushes survive, in order, and the
    // drop counter accounts for every displaced message.
    assert_eq!(survivors.len(), capacity);
    let seqs: Vec<u64> = survivors.iter().map(|message| message.seq).collect();
    assert!(seqs.windows(2).all(|pair| pair[1] == pair[0] + 1));
    assert_eq!(seqs[0], consumer.dropped() + 1);
    assert_eq!(*seqs.last().unwrap(), consumer.dropped() + capacity as u64);
}

#[test]
fn test_chord_progression_end_to_end() {
    let (mut engine, handles) = test_engine();

    // C major triad, then F major, released in between.
    for &note in &[60u8, 64, 67] {
        engine.note_event(note, 100, true, 0);
    }
    for &note in &[60u8, 64, 67] {
        engine.note_event(note, 0, false, 0);
    }
    for &note in &[65u8, 69, 72] {
        engine.note_event(note, 100, true, 0);
    }

    let messages = drain(&handles);
    let chords: Vec<(u8, u8)> = messages
        .iter()
        .filter_map(|message| match message.payload {
            Payload::Chord {
                root, quality_id, ..
            } => Some((root, quality_id)),
            _ => None,
        })
        .collect();
    // Root 0 = C, root 5 = F, quality 0 = major.
    assert_eq!(chords, vec![(0, 0), (5, 0)]);

    let voicings: Vec<Vec<u8>> = messages
        .iter()
        .filter_map(|message| match message.payload {
            Payload::Voicing { notes, len, .. } => Some(notes[..len as usize].to_vec()),
            _ => None,
        })
        .collect();
    assert_eq!(voicings.len(), 2);
    // The first suggestion keeps the played triad; the second moves two
    // voices by the minimal total of three semitones.
    assert_eq!(voicings[0], vec![60, 64, 67]);
    assert_eq!(voicings[1], vec![60, 65, 69]);
}

#[test]
fn test_key_detection_over_scale() {
    let (mut engine, _handles) = test_engine();

    // One octave of C major, one note per degree.
    for &note in &[60u8, 62, 64, 65, 67, 69, 71] {
        engine.note_event(note, 100, true, 0);
        engine.note_event(note, 0, false, 0);
    }

    let key = engine.current_key().expect("no key estimate");
    assert_eq!(key.tonic.index(), 0);
    assert_eq!(key.mode, Mode::Major);
    assert!(key.confidence > 0.1, "confidence {}", key.confidence);
}

#[test]
fn test_overload_gates_voicing_search() {
    let (mut engine, handles) = test_engine();

    // Report a pathological block so the smoothed load exceeds the
    // threshold before any chord arrives.
    handles.diagnostics.record_block(
        &[],
        std::time::Duration::from_millis(50),
        std::time::Duration::from_millis(10),
        0.8,
    );
    assert!(handles.diagnostics.is_overloaded());

    for &note in &[60u8, 64, 67] {
        engine.note_event(note, 100, true, 0);
    }

    let messages = drain(&handles);
    assert!(messages
        .iter()
        .any(|message| matches!(message.payload, Payload::Chord { .. })));
    assert!(!messages
        .iter()
        .any(|message| matches!(message.payload, Payload::Voicing { .. })));
}

#[test]
fn test_reset_restores_initial_estimates() {
    let (mut engine, handles) = test_engine();

    let onsets: Vec<usize> = (1..=8).map(|k| k * BEAT).collect();
    let signal = burst_signal(10 * BEAT, &onsets);
    run_blocks(&mut engine, &signal);
    assert!(engine.tempo_confidence() > 0.0);

    engine.reset();
    assert_eq!(engine.tempo_bpm(), 120.0);
    assert_eq!(engine.tempo_confidence(), 0.0);
    assert!(engine.current_chord().is_none());

    // The stream keeps its ordering guarantee across the reset.
    let before = drain(&handles);
    let max_seq = before.iter().map(|message| message.seq).max().unwrap();
    run_blocks(&mut engine, &signal);
    let after = drain(&handles);
    assert!(after.iter().all(|message| message.seq > max_seq));
    assert!((engine.tempo_bpm() - 120.0).abs() < 1.0);
}
