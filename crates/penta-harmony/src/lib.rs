//! # penta-harmony - Harmonic analysis
//!
//! The harmonic half of the penta engine:
//!
//! - [`PitchClass`] / [`PitchClassSet`] - 12-tone pitch classes and u16
//!   bitset chords
//! - [`ChordAnalyzer`] - template matching over all rotations with
//!   temporal smoothing
//! - [`ScaleDetector`] - Krumhansl-Schmuckler key finding over a decaying
//!   velocity-weighted histogram
//! - [`VoiceLeadingOptimizer`] - bounded search for the smoothest voicing
//!   of a chord
//!
//! Everything operates on plain `Copy` values; analyzers hold only small
//! fixed-size state and a bounded memo map, so they are safe to call from
//! the note-event path.

mod chord;
mod key;
mod pitch_class;
mod voicing;

pub use chord::{ChordAnalyzer, ChordEstimate, ChordQuality};
pub use key::{KeyEstimate, Mode, PitchHistogram, ScaleDetector, MAJOR_PROFILE, MINOR_PROFILE};
pub use pitch_class::{PitchClass, PitchClassSet, NOTE_NAMES};
pub use voicing::{VoiceLeadingOptimizer, VoicingSuggestion, MAX_VOICES, MIN_VOICES};
