//! Grid quantization over the estimator's beat length.
//!
//! Pure math, no state: the engine passes the current `samples_per_beat`
//! and the caller's grid, strength, and swing. Out-of-range strength and
//! swing clamp instead of erroring, matching how the host bridge treats
//! its config ranges.

/// Subdivision of a beat, straight or triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridResolution {
    Quarter,
    Eighth,
    EighthTriplet,
    Sixteenth,
    SixteenthTriplet,
    ThirtySecond,
}

impl GridResolution {
    pub fn divisions_per_beat(self) -> f64 {
        match self {
            GridResolution::Quarter => 1.0,
            GridResolution::Eighth => 2.0,
            GridResolution::EighthTriplet => 3.0,
            GridResolution::Sixteenth => 4.0,
            GridResolution::SixteenthTriplet => 6.0,
            GridResolution::ThirtySecond => 8.0,
        }
    }
}

/// Snap `position` toward the nearest grid line.
///
/// `strength` interpolates between the input (0) and the grid line (1).
/// `swing` delays odd-numbered subdivisions by up to a third of the grid
/// step, so 1.0 lands offbeats on the triplet position. With no tempo yet
/// (`samples_per_beat == 0`) the input passes through unchanged.
pub fn quantize(
    position: u64,
    samples_per_beat: u64,
    grid: GridResolution,
    strength: f32,
    swing: f32,
) -> u64 {
    if samples_per_beat == 0 {
        return position;
    }
    let strength = strength.clamp(0.0, 1.0) as f64;
    let swing = swing.clamp(0.0, 1.0) as f64;

    let step = samples_per_beat as f64 / grid.divisions_per_beat();
    let index = (position as f64 / step).round();
    let mut target = index * step;
    if (index as u64) % 2 == 1 {
        target += swing * step / 3.0;
    }

    let snapped = position as f64 + (target - position as f64) * strength;
    snapped.round().max(0.0) as u64
}
