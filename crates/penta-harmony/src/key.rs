//! Key detection from a decaying pitch-class histogram.
//!
//! Incoming notes accumulate velocity-weighted mass per pitch class; the
//! detector correlates the histogram against the Krumhansl-Kessler major
//! and minor profiles at every rotation and reports the best of the 24
//! candidates. Confidence is the margin over the runner-up, so ambiguous
//! material (relative keys, sparse input) reads as low confidence rather
//! than a coin flip.

use crate::PitchClass;
use std::fmt;

/// Krumhansl-Kessler major key profile (probe-tone ratings, 1982).
pub const MAJOR_PROFILE: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Kessler minor key profile.
pub const MINOR_PROFILE: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Mode {
    #[default]
    Major = 0,
    Minor = 1,
}

impl Mode {
    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::Major => "major",
            Mode::Minor => "minor",
        }
    }

    fn profile(self) -> &'static [f32; 12] {
        match self {
            Mode::Major => &MAJOR_PROFILE,
            Mode::Minor => &MINOR_PROFILE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KeyEstimate {
    pub tonic: PitchClass,
    pub mode: Mode,
    pub confidence: f32,
}

impl fmt::Display for KeyEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.tonic, self.mode.name())
    }
}

/// Velocity-weighted pitch-class mass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PitchHistogram {
    bins: [f32; 12],
}

impl PitchHistogram {
    pub fn add(&mut self, pc: PitchClass, weight: f32) {
        self.bins[pc.index() as usize] += weight.max(0.0);
    }

    pub fn decay(&mut self, factor: f32) {
        let factor = factor.clamp(0.0, 1.0);
        for bin in &mut self.bins {
            *bin *= factor;
        }
    }

    pub fn clear(&mut self) {
        self.bins = [0.0; 12];
    }

    pub fn bins(&self) -> &[f32; 12] {
        &self.bins
    }

    pub fn total(&self) -> f32 {
        self.bins.iter().sum()
    }

    /// Pearson correlation between the histogram rotated down to `tonic`
    /// and a key profile. Zero variance on either side yields 0.
    fn correlation(&self, tonic: u8, profile: &[f32; 12]) -> f32 {
        let mut x = [0.0f32; 12];
        for (i, slot) in x.iter_mut().enumerate() {
            *slot = self.bins[(i + tonic as usize) % 12];
        }

        let x_mean: f32 = x.iter().sum::<f32>() / 12.0;
        let y_mean: f32 = profile.iter().sum::<f32>() / 12.0;

        let mut num = 0.0;
        let mut x_var = 0.0;
        let mut y_var = 0.0;
        for i in 0..12 {
            let dx = x[i] - x_mean;
            let dy = profile[i] - y_mean;
            num += dx * dy;
            x_var += dx * dx;
            y_var += dy * dy;
        }

        let den = (x_var * y_var).sqrt();
        if den <= f32::EPSILON {
            0.0
        } else {
            num / den
        }
    }
}

/// Sliding-window key detector.
#[derive(Debug, Clone)]
pub struct ScaleDetector {
    histogram: PitchHistogram,
    decay: f32,
}

impl ScaleDetector {
    /// `decay` is the per-window retention factor applied by
    /// [`decay_window`](Self::decay_window); 1.0 never forgets.
    pub fn new(decay: f32) -> Self {
        Self {
            histogram: PitchHistogram::default(),
            decay: decay.clamp(0.0, 1.0),
        }
    }

    pub fn add_note(&mut self, pc: PitchClass, velocity: u8) {
        self.histogram.add(pc, velocity as f32 / 127.0);
    }

    /// Ages the histogram by one analysis window.
    pub fn decay_window(&mut self) {
        self.histogram.decay(self.decay);
    }

    /// Best of the 24 key candidates. A flat or empty histogram returns
    /// zero confidence.
    pub fn detect(&self) -> KeyEstimate {
        let mut best = KeyEstimate::default();
        let mut best_r = f32::NEG_INFINITY;
        let mut second_r = f32::NEG_INFINITY;

        for tonic in 0..12u8 {
            for mode in [Mode::Major, Mode::Minor] {
                let r = self.histogram.correlation(tonic, mode.profile());
                if r > best_r {
                    second_r = best_r;
                    best_r = r;
                    best.tonic = PitchClass::new(tonic);
                    best.mode = mode;
                } else if r > second_r {
                    second_r = r;
                }
            }
        }

        if best_r <= 0.0 {
            return KeyEstimate::default();
        }
        best.confidence = ((best_r - second_r) / best_r.max(f32::EPSILON)).clamp(0.0, 1.0);
        best
    }

    pub fn reset(&mut self) {
        self.histogram.clear();
    }

    pub fn histogram(&self) -> &PitchHistogram {
        &self.histogram
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const C_MAJOR_SCALE: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];
    const G_MAJOR_SCALE: [u8; 7] = [7, 9, 11, 0, 2, 4, 6];

    fn feed(detector: &mut ScaleDetector, pcs: &[u8], velocity: u8) {
        for &pc in pcs {
            detector.add_note(PitchClass::new(pc), velocity);
        }
    }

    #[test]
    fn test_major_scale_finds_its_tonic() {
        let mut detector = ScaleDetector::new(1.0);
        feed(&mut detector, &C_MAJOR_SCALE, 100);

        let key = detector.detect();
        assert_eq!(key.tonic.index(), 0);
        assert_eq!(key.mode, Mode::Major);
        assert!(key.confidence > 0.1, "confidence {}", key.confidence);
    }

    #[test]
    fn test_profile_shaped_histogram_is_exact() {
        // A histogram that is the minor profile rotated to E correlates
        // perfectly with exactly one candidate.
        let mut detector = ScaleDetector::new(1.0);
        for i in 0..12 {
            detector
                .histogram
                .add(PitchClass::new(((i + 4) % 12) as u8), MINOR_PROFILE[i]);
        }

        let key = detector.detect();
        assert_eq!(key.tonic.index(), 4);
        assert_eq!(key.mode, Mode::Minor);
        assert!(key.confidence > 0.1, "confidence {}", key.confidence);
    }

    #[test]
    fn test_flat_histogram_has_no_key() {
        let mut detector = ScaleDetector::new(1.0);
        assert_eq!(detector.detect().confidence, 0.0);

        for pc in 0..12 {
            detector.add_note(PitchClass::new(pc), 100);
        }
        assert_eq!(detector.detect().confidence, 0.0);
    }

    #[test]
    fn test_decay_tracks_modulation() {
        let mut detector = ScaleDetector::new(0.5);
        for _ in 0..8 {
            feed(&mut detector, &C_MAJOR_SCALE, 100);
        }
        assert_eq!(detector.detect().tonic.index(), 0);

        for _ in 0..12 {
            detector.decay_window();
            feed(&mut detector, &G_MAJOR_SCALE, 100);
        }

        let key = detector.detect();
        assert_eq!(key.tonic.index(), 7);
        assert_eq!(key.mode, Mode::Major);
    }

    #[test]
    fn test_velocity_scales_weight() {
        let mut detector = ScaleDetector::new(1.0);
        detector.add_note(PitchClass::new(0), 127);
        detector.add_note(PitchClass::new(7), 64);

        let bins = detector.histogram().bins();
        assert_relative_eq!(bins[0], 1.0);
        assert_relative_eq!(bins[7], 64.0 / 127.0);
        assert_eq!(bins[1], 0.0);
    }

    #[test]
    fn test_reset_clears_mass() {
        let mut detector = ScaleDetector::new(1.0);
        feed(&mut detector, &C_MAJOR_SCALE, 100);
        detector.reset();
        assert_eq!(detector.histogram().total(), 0.0);
        assert_eq!(detector.detect().confidence, 0.0);
    }
}
