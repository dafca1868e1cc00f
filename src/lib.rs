//! # Penta - Real-time Music Analysis Engine
//!
//! Harmonic and rhythmic estimation for a host's audio callback, with
//! lock-free telemetry out the side.
//!
//! ## Architecture
//!
//! Penta is an umbrella crate that coordinates:
//! - **penta-rt** - RT primitives (scratch pool, padded atomics, drop-oldest queue)
//! - **penta-groove** - Rhythm (spectral-flux onsets, tempo tracking, grid quantization)
//! - **penta-harmony** - Harmony (chord templates, key profiles, voice-leading search)
//! - **penta-telemetry** - Message types, OSC wire codec, and the UDP hub thread
//!
//! The engine lives on the audio thread and never blocks or allocates
//! after construction; estimates cross to the telemetry side through a
//! bounded queue that displaces its oldest element rather than pushing
//! back. Consumers observe losses as sequence-number gaps.
//!
//! ## Quick Start
//!
//! ```ignore
//! use penta::prelude::*;
//!
//! let (mut engine, handles) = AnalysisEngine::builder()
//!     .sample_rate(48_000.0)
//!     .tempo_range(60.0, 200.0)
//!     .telemetry(TelemetryConfig::default())
//!     .build()?;
//!
//! // Inside the audio callback:
//! engine.process_block(&samples)?;
//! engine.note_event(60, 100, true, position);
//!
//! // From any other thread:
//! let report = handles.diagnostics.report();
//! handles.control.push(ControlCommand::Reset);
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Engine plus the OSC telemetry hub
//! - `telemetry` - OSC hub thread and wire codec (UDP)
//!
//! Message and estimate types stay available without `telemetry`; only
//! the socket, codec, and hub thread are gated.

/// Re-export of penta-rt for direct access
pub use penta_rt as rt;

/// Re-export of penta-groove for direct access
pub use penta_groove as groove;

/// Re-export of penta-harmony for direct access
pub use penta_harmony as harmony;

/// Re-export of penta-telemetry for direct access
pub use penta_telemetry as telemetry;

// Real-time primitives
pub use penta_rt::{
    rt_channel, AtomicCounter, AtomicFlag, AtomicFloat, PoolBuf, RtConsumer, RtPool, RtProducer,
};

// Rhythm
pub use penta_groove::{
    quantize, GridResolution, OnsetDetector, OnsetEvent, TempoEstimate, TempoEstimator,
};

// Harmony
pub use penta_harmony::{
    ChordAnalyzer, ChordEstimate, ChordQuality, KeyEstimate, Mode, PitchClass, PitchClassSet,
    PitchHistogram, ScaleDetector, VoiceLeadingOptimizer, VoicingSuggestion, MAJOR_PROFILE,
    MAX_VOICES, MINOR_PROFILE, MIN_VOICES, NOTE_NAMES,
};

// Telemetry messages (always available; the hub itself is feature-gated)
pub use penta_telemetry::{ConfigUpdate, ControlCommand, Message, Payload};

// OSC hub
#[cfg(feature = "telemetry")]
pub use penta_telemetry::{
    AddressFilter, HubHandle, HubStats, Subscription, TelemetryConfig, TelemetryHub,
};

mod builder;
mod config;
mod diagnostics;
mod engine;
mod error;

pub use builder::{EngineBuilder, EngineHandles};
pub use config::EngineConfig;
pub use diagnostics::{DiagnosticsEngine, DiagnosticsReport};
pub use engine::AnalysisEngine;
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    // Engine and handles
    pub use crate::{AnalysisEngine, EngineBuilder, EngineConfig, EngineHandles};

    // Diagnostics
    pub use crate::{DiagnosticsEngine, DiagnosticsReport};

    // Messages
    pub use crate::{ConfigUpdate, ControlCommand, Message, Payload};

    // Estimates
    pub use crate::{
        ChordEstimate, GridResolution, KeyEstimate, OnsetEvent, TempoEstimate, VoicingSuggestion,
    };

    // Hub
    #[cfg(feature = "telemetry")]
    pub use crate::{HubHandle, HubStats, Subscription, TelemetryConfig};

    pub use crate::{Error, Result};
}
