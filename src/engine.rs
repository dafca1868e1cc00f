//! AnalysisEngine that runs every estimator inside the host audio callback.
//!
//! The engine owns the RT-side state: the scratch pool, the groove and
//! harmony analyzers, and the producer half of the telemetry queue. The
//! host calls [`AnalysisEngine::process_block`] once per audio block and
//! [`AnalysisEngine::note_event`] for each note crossing; everything else
//! (hub, UI, scripting) observes through the handles returned at build
//! time. Nothing here blocks or allocates after construction.

use crate::config::EngineConfig;
use crate::diagnostics::DiagnosticsEngine;
use crate::Result;
use arc_swap::ArcSwap;
use penta_groove::{quantize, GridResolution, OnsetDetector, OnsetEvent, TempoEstimator};
use penta_harmony::{
    ChordAnalyzer, ChordEstimate, KeyEstimate, PitchClass, PitchClassSet, ScaleDetector,
    VoiceLeadingOptimizer, VoicingSuggestion, MAX_VOICES, MIN_VOICES,
};
use penta_rt::{RtConsumer, RtPool, RtProducer};
use penta_telemetry::{ControlCommand, Message, Payload};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Onsets accepted from a single block; more than this in one block is
/// noise, not rhythm.
const MAX_BLOCK_ONSETS: usize = 64;

/// Simultaneously tracked held notes for voicing seeds.
const MAX_HELD_NOTES: usize = 32;

/// Histogram decay applied once per key window.
const KEY_DECAY: f32 = 0.8;

/// Key windows elapse once per second of audio.
const KEY_WINDOW_SECS: f64 = 1.0;

/// Most key windows caught up at once after a position jump. Past this
/// many windows the remaining mass is negligible anyway.
const MAX_DECAY_CATCHUP: u64 = 32;

/// Real-time music analysis engine.
///
/// Built via [`AnalysisEngine::builder`]; the companion
/// [`EngineHandles`](crate::EngineHandles) carry the non-RT ends of the
/// queues plus the shared config store.
///
/// # Example
///
/// ```ignore
/// use penta::prelude::*;
///
/// let (mut engine, handles) = AnalysisEngine::builder()
///     .sample_rate(48_000.0)
///     .build()?;
///
/// // Inside the audio callback:
/// engine.process_block(&samples)?;
/// engine.note_event(60, 100, true, position);
///
/// // Anywhere else:
/// let report = handles.diagnostics.report();
/// ```
pub struct AnalysisEngine {
    config: Arc<ArcSwap<EngineConfig>>,
    sample_rate: f64,

    pool: RtPool,
    onset: OnsetDetector,
    tempo: TempoEstimator,
    chord: ChordAnalyzer,
    scale: ScaleDetector,
    voicing: VoiceLeadingOptimizer,
    diagnostics: Arc<DiagnosticsEngine>,

    messages: RtProducer<Message>,
    controls: RtConsumer<ControlCommand>,

    onset_scratch: Vec<OnsetEvent>,
    note_counts: [u8; 12],
    active: PitchClassSet,
    held_notes: [u8; MAX_HELD_NOTES],
    held_len: usize,
    last_chord: Option<ChordEstimate>,
    last_key: Option<KeyEstimate>,
    last_voicing: Option<VoicingSuggestion>,

    seq: u64,
    samples_seen: u64,
    block_index: u64,
    key_window: u64,
    next_decay: u64,
    reported_drops: u64,
}

impl AnalysisEngine {
    /// Create a new engine builder.
    pub fn builder() -> crate::EngineBuilder {
        crate::EngineBuilder::default()
    }

    /// Internal: assemble the engine from builder-constructed parts.
    pub(crate) fn from_parts(
        config: Arc<ArcSwap<EngineConfig>>,
        pool: RtPool,
        onset: OnsetDetector,
        tempo: TempoEstimator,
        diagnostics: Arc<DiagnosticsEngine>,
        messages: RtProducer<Message>,
        controls: RtConsumer<ControlCommand>,
    ) -> Self {
        let snapshot = config.load_full();
        let key_window = ((snapshot.sample_rate * KEY_WINDOW_SECS) as u64).max(1);
        Self {
            sample_rate: snapshot.sample_rate,
            config,
            pool,
            onset,
            tempo,
            chord: ChordAnalyzer::new(),
            scale: ScaleDetector::new(KEY_DECAY),
            voicing: VoiceLeadingOptimizer::new(),
            diagnostics,
            messages,
            controls,
            onset_scratch: vec![
                OnsetEvent {
                    position: 0,
                    strength: 0.0,
                    confidence: 0.0,
                };
                MAX_BLOCK_ONSETS
            ],
            note_counts: [0; 12],
            active: PitchClassSet::EMPTY,
            held_notes: [0; MAX_HELD_NOTES],
            held_len: 0,
            last_chord: None,
            last_key: None,
            last_voicing: None,
            seq: 0,
            samples_seen: 0,
            block_index: 0,
            key_window,
            next_decay: key_window,
            reported_drops: 0,
        }
    }

    // =========================================================================
    // RT entry points
    // =========================================================================

    /// Feed one block of mono samples from the audio callback.
    ///
    /// Order per cycle: pending control commands, one config snapshot,
    /// pool reset, onset detection, tempo update, periodic diagnostics
    /// telemetry, block health recording on the way out.
    pub fn process_block(&mut self, samples: &[f32]) -> Result<()> {
        let started = Instant::now();

        self.apply_controls();

        let config = self.config.load_full();
        self.onset.set_threshold_k(config.threshold_k);
        self.tempo.set_params(
            config.history_size,
            config.min_tempo,
            config.max_tempo,
            config.adaptation_rate,
        );

        // Transient scratch from the previous cycle dies here; reserved
        // frame state survives.
        self.pool.reset();

        let count = {
            let Self {
                onset,
                pool,
                onset_scratch,
                ..
            } = self;
            onset.process_block(samples, pool, onset_scratch)?
        };
        for i in 0..count {
            let event = self.onset_scratch[i];
            self.push(Payload::Onset(event));
            if let Some(estimate) = self.tempo.add_onset(event.position) {
                self.push(Payload::Tempo(estimate));
            }
        }

        self.samples_seen += samples.len() as u64;
        self.advance_key_clock(self.samples_seen);

        self.block_index += 1;
        // The shared store accepts snapshots that skipped validate().
        if self.block_index % u64::from(config.report_interval.max(1)) == 0 {
            let report = self.diagnostics.report();
            self.push(Payload::Diagnostics {
                load: report.load,
                peak: report.peak,
                rms: report.rms,
                overloaded: report.overloaded,
            });
            let dropped = self.messages.dropped();
            if dropped > self.reported_drops {
                self.reported_drops = dropped;
                self.push(Payload::Drops { dropped });
            }
        }

        let budget = Duration::from_secs_f64(samples.len() as f64 / self.sample_rate);
        self.diagnostics
            .record_block(samples, started.elapsed(), budget, config.overload_threshold);
        Ok(())
    }

    /// Feed one note on/off from the host callback.
    ///
    /// `position` is a sample timestamp on the same clock that
    /// `process_block` advances. Chord analysis re-runs when the active
    /// pitch-class set changes; key detection re-runs when a note-on adds
    /// histogram mass; the voice-leading search follows fresh chords
    /// unless the engine is overloaded.
    pub fn note_event(&mut self, pitch: u8, velocity: u8, on: bool, position: u64) {
        self.advance_key_clock(position);

        let pc = PitchClass::from_midi(pitch);
        let slot = pc.index() as usize;
        if on {
            self.note_counts[slot] = self.note_counts[slot].saturating_add(1);
            if self.held_len < MAX_HELD_NOTES
                && !self.held_notes[..self.held_len].contains(&pitch)
            {
                self.held_notes[self.held_len] = pitch;
                self.held_len += 1;
            }

            self.scale.add_note(pc, velocity);
            let key = self.scale.detect();
            if self.last_key != Some(key) {
                self.last_key = Some(key);
                self.push(Payload::Key {
                    tonic: key.tonic.index(),
                    mode: key.mode.id(),
                    confidence: key.confidence,
                });
            }
        } else {
            self.note_counts[slot] = self.note_counts[slot].saturating_sub(1);
            if let Some(at) = self.held_notes[..self.held_len]
                .iter()
                .position(|&note| note == pitch)
            {
                self.held_len -= 1;
                self.held_notes[at] = self.held_notes[self.held_len];
            }
        }

        let active = self.active_set();
        if active != self.active {
            self.active = active;
            let estimate = self.chord.analyze(active);
            if estimate.confidence > 0.0 {
                let changed = self.last_chord.map_or(true, |prev| {
                    prev.root != estimate.root || prev.quality != estimate.quality
                });
                if changed {
                    self.last_chord = Some(estimate);
                    self.push(Payload::Chord {
                        root: estimate.root.index(),
                        quality_id: estimate.quality.id(),
                        confidence: estimate.confidence,
                        pitch_classes: estimate.pitch_classes.bits(),
                    });
                    if !self.diagnostics.is_overloaded() {
                        self.suggest_voicing(&estimate);
                    }
                }
            }
        }
    }

    /// Snap a sample position to the current tempo grid.
    ///
    /// Positions pass through unchanged until a tempo estimate exists.
    pub fn quantize(
        &self,
        position: u64,
        grid: GridResolution,
        strength: f32,
        swing: f32,
    ) -> u64 {
        quantize(position, self.tempo.samples_per_beat(), grid, strength, swing)
    }

    /// Restore every analyzer to cold start.
    ///
    /// Sequence numbers and the sample clock are not reset, so consumers
    /// see one continuous, strictly ordered stream across the boundary.
    pub fn reset(&mut self) {
        self.onset.reset(&mut self.pool);
        self.tempo.reset();
        self.chord.reset();
        self.scale.reset();
        self.voicing.reset();
        self.diagnostics.reset();
        self.note_counts = [0; 12];
        self.active = PitchClassSet::EMPTY;
        self.held_len = 0;
        self.last_chord = None;
        self.last_key = None;
        self.last_voicing = None;
    }

    // =========================================================================
    // Observers
    // =========================================================================

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Current tempo in BPM (120 before any estimate).
    pub fn tempo_bpm(&self) -> f32 {
        self.tempo.bpm()
    }

    pub fn tempo_confidence(&self) -> f32 {
        self.tempo.confidence()
    }

    /// Last chord pushed to telemetry, if any.
    pub fn current_chord(&self) -> Option<ChordEstimate> {
        self.last_chord
    }

    /// Last key estimate pushed to telemetry, if any.
    pub fn current_key(&self) -> Option<KeyEstimate> {
        self.last_key
    }

    /// Pitch classes with at least one sounding note.
    pub fn active_pitch_classes(&self) -> PitchClassSet {
        self.active
    }

    pub fn diagnostics(&self) -> &Arc<DiagnosticsEngine> {
        &self.diagnostics
    }

    /// Current config snapshot.
    pub fn config(&self) -> Arc<EngineConfig> {
        self.config.load_full()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Drain pending control commands. Commands apply in arrival order; a
    /// command displaced from the queue simply never ran.
    fn apply_controls(&mut self) {
        while let Some(command) = self.controls.pop() {
            match command {
                ControlCommand::Reset => self.reset(),
                ControlCommand::TempoOverride(bpm) => {
                    if bpm.is_finite() {
                        self.tempo.set_tempo(bpm);
                    }
                }
            }
        }
    }

    /// Apply histogram decay for every key window that has elapsed up to
    /// `position`, capped after large jumps.
    fn advance_key_clock(&mut self, position: u64) {
        if position < self.next_decay {
            return;
        }
        let elapsed = (position - self.next_decay) / self.key_window + 1;
        for _ in 0..elapsed.min(MAX_DECAY_CATCHUP) {
            self.scale.decay_window();
        }
        self.next_decay += elapsed * self.key_window;
    }

    /// Run the bounded voice-leading search, seeded from the previous
    /// suggestion or, the first time, from the notes actually held.
    fn suggest_voicing(&mut self, estimate: &ChordEstimate) {
        let mut seed = [0u8; MAX_VOICES];
        let previous: &[u8] = match &self.last_voicing {
            Some(suggestion) => suggestion.voices(),
            None => {
                if self.held_len < MIN_VOICES {
                    return;
                }
                let mut held = [0u8; MAX_HELD_NOTES];
                held[..self.held_len].copy_from_slice(&self.held_notes[..self.held_len]);
                held[..self.held_len].sort_unstable();
                let len = self.held_len.min(MAX_VOICES);
                seed[..len].copy_from_slice(&held[..len]);
                &seed[..len]
            }
        };
        if let Some(suggestion) = self.voicing.suggest(previous, estimate) {
            self.last_voicing = Some(suggestion);
            self.push(Payload::Voicing {
                notes: suggestion.notes,
                len: suggestion.len,
                cost: suggestion.cost,
            });
        }
    }

    fn active_set(&self) -> PitchClassSet {
        let mut set = PitchClassSet::EMPTY;
        for (index, &count) in self.note_counts.iter().enumerate() {
            if count > 0 {
                set.insert(PitchClass::new(index as u8));
            }
        }
        set
    }

    /// Assign the next sequence number and push, displacing the oldest
    /// message when the queue is full.
    fn push(&mut self, payload: Payload) {
        self.seq += 1;
        self.messages.push(Message {
            seq: self.seq,
            payload,
        });
    }
}
