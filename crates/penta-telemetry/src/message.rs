//! Messages crossing the RT boundary.
//!
//! Everything here is `Copy` and fixed-size so the drop-oldest queue
//! never runs drop glue on the audio thread.

use penta_groove::{OnsetEvent, TempoEstimate};
use penta_harmony::MAX_VOICES;

/// One telemetry record. `seq` is assigned at send; consumers observe
/// queue drops as gaps in it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Message {
    pub seq: u64,
    pub payload: Payload,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    Onset(OnsetEvent),
    Tempo(TempoEstimate),
    Chord {
        root: u8,
        quality_id: u8,
        confidence: f32,
        pitch_classes: u16,
    },
    Key {
        tonic: u8,
        mode: u8,
        confidence: f32,
    },
    Voicing {
        notes: [u8; MAX_VOICES],
        len: u8,
        cost: f32,
    },
    Diagnostics {
        load: f32,
        peak: f32,
        rms: f32,
        overloaded: bool,
    },
    Drops {
        dropped: u64,
    },
}

impl Payload {
    /// OSC address this payload publishes under.
    pub fn address(&self) -> &'static str {
        match self {
            Payload::Onset(_) => "/penta/groove/onset",
            Payload::Tempo(_) => "/penta/groove/tempo",
            Payload::Chord { .. } => "/penta/harmony/chord",
            Payload::Key { .. } => "/penta/harmony/key",
            Payload::Voicing { .. } => "/penta/harmony/voicing",
            Payload::Diagnostics { .. } => "/penta/diag/cpu",
            Payload::Drops { .. } => "/penta/diag/drops",
        }
    }
}

/// Commands travelling toward the RT side. Stale commands may be
/// displaced by newer ones before the engine applies them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    Reset,
    TempoOverride(f32),
}

/// A single config field update decoded from the wire. Validation and
/// the copy-on-write swap happen at the config store, not here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigUpdate {
    ThresholdK(f32),
    AdaptationRate(f32),
    MinTempo(f32),
    MaxTempo(f32),
    OverloadThreshold(f32),
    ReportInterval(u32),
    HistorySize(u32),
}
