//! # penta-groove - Rhythm analysis
//!
//! The rhythmic half of the penta engine:
//!
//! - [`OnsetDetector`] - streaming spectral-flux onset detection with an
//!   adaptive median + MAD threshold
//! - [`TempoEstimator`] - inter-onset-interval tempo tracking with
//!   exponential smoothing
//! - [`quantize`] - grid snapping with strength interpolation and swing
//!
//! All per-block state lives in a caller-provided [`penta_rt::RtPool`];
//! nothing here allocates on the audio thread after construction.

mod onset;
mod quantize;
mod tempo;

pub use onset::{OnsetDetector, OnsetEvent};
pub use quantize::{quantize, GridResolution};
pub use tempo::{TempoEstimate, TempoEstimator};
