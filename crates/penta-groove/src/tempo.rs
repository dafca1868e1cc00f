//! Inter-onset-interval tempo tracking.
//!
//! Onsets accumulate in a bounded FIFO; once at least four are present,
//! each new onset re-estimates tempo from the median inter-onset interval,
//! clamps it to the configured range, and folds it into the running value
//! with exponential smoothing. Confidence falls off with interval
//! variance, so irregular playing reads as uncertainty rather than as a
//! tempo change.

use std::collections::VecDeque;

/// Backing capacity of the onset FIFO. The logical `history_size` can
/// move at runtime but never past this, so it never reallocates.
pub(crate) const MAX_HISTORY: usize = 128;

/// Estimation needs this many onsets.
const MIN_ONSETS: usize = 4;

const DEFAULT_TEMPO: f32 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoEstimate {
    pub bpm: f32,
    pub confidence: f32,
}

pub struct TempoEstimator {
    sample_rate: f64,
    history: VecDeque<u64>,
    history_size: usize,
    min_tempo: f32,
    max_tempo: f32,
    adaptation_rate: f32,
    intervals: Vec<f32>,
    bpm: f32,
    confidence: f32,
    has_estimate: bool,
}

impl TempoEstimator {
    pub fn new(
        sample_rate: f64,
        history_size: usize,
        min_tempo: f32,
        max_tempo: f32,
        adaptation_rate: f32,
    ) -> Self {
        Self {
            sample_rate,
            history: VecDeque::with_capacity(MAX_HISTORY),
            history_size: history_size.clamp(MIN_ONSETS, MAX_HISTORY),
            min_tempo,
            max_tempo,
            adaptation_rate,
            intervals: Vec::with_capacity(MAX_HISTORY),
            bpm: DEFAULT_TEMPO,
            confidence: 0.0,
            has_estimate: false,
        }
    }

    /// Record an onset position and, with enough history, re-estimate.
    /// Returns the updated estimate when one was made.
    pub fn add_onset(&mut self, position: u64) -> Option<TempoEstimate> {
        while self.history.len() >= self.history_size {
            self.history.pop_front();
        }
        self.history.push_back(position);

        if self.history.len() < MIN_ONSETS {
            return None;
        }
        self.estimate()
    }

    fn estimate(&mut self) -> Option<TempoEstimate> {
        self.intervals.clear();
        for (&a, &b) in self.history.iter().zip(self.history.iter().skip(1)) {
            // Duplicate or out-of-order positions carry no interval.
            if b > a {
                self.intervals
                    .push((b - a) as f32 / self.sample_rate as f32);
            }
        }
        if self.intervals.is_empty() {
            return None;
        }

        self.intervals.sort_unstable_by(f32::total_cmp);
        let mid = self.intervals.len() / 2;
        let beat_interval = if self.intervals.len() % 2 == 0 {
            (self.intervals[mid - 1] + self.intervals[mid]) * 0.5
        } else {
            self.intervals[mid]
        };
        if beat_interval <= 0.0 {
            return None;
        }

        let instantaneous = (60.0 / beat_interval).clamp(self.min_tempo, self.max_tempo);
        self.bpm = self.bpm * (1.0 - self.adaptation_rate) + instantaneous * self.adaptation_rate;
        self.bpm = self.bpm.clamp(self.min_tempo, self.max_tempo);

        let variance = self
            .intervals
            .iter()
            .map(|&i| (i - beat_interval) * (i - beat_interval))
            .sum::<f32>()
            / self.intervals.len() as f32;
        self.confidence = (1.0 / (1.0 + variance * 10.0)).clamp(0.0, 1.0);
        self.has_estimate = true;

        Some(TempoEstimate {
            bpm: self.bpm,
            confidence: self.confidence,
        })
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Beat length in samples, 0 until a first estimate exists.
    pub fn samples_per_beat(&self) -> u64 {
        if !self.has_estimate || self.bpm <= 0.0 {
            return 0;
        }
        (60.0 * self.sample_rate / self.bpm as f64) as u64
    }

    /// Force the running tempo, as from a host override. Marks the value
    /// estimated so `samples_per_beat` becomes valid immediately.
    pub fn set_tempo(&mut self, bpm: f32) {
        self.bpm = bpm.clamp(self.min_tempo, self.max_tempo);
        self.has_estimate = true;
    }

    /// Always valid: clears history, restores 120 BPM at zero confidence.
    pub fn reset(&mut self) {
        self.history.clear();
        self.bpm = DEFAULT_TEMPO;
        self.confidence = 0.0;
        self.has_estimate = false;
    }

    /// Apply a config snapshot at a block boundary. The logical history
    /// bound moves; backing storage does not.
    pub fn set_params(
        &mut self,
        history_size: usize,
        min_tempo: f32,
        max_tempo: f32,
        adaptation_rate: f32,
    ) {
        self.history_size = history_size.clamp(MIN_ONSETS, MAX_HISTORY);
        self.min_tempo = min_tempo;
        self.max_tempo = max_tempo;
        self.adaptation_rate = adaptation_rate;
        self.bpm = self.bpm.clamp(min_tempo, max_tempo);
        while self.history.len() > self.history_size {
            self.history.pop_front();
        }
    }

    pub fn onset_count(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f64 = 44100.0;

    fn estimator() -> TempoEstimator {
        TempoEstimator::new(SAMPLE_RATE, 32, 40.0, 240.0, 0.1)
    }

    fn feed_regular(est: &mut TempoEstimator, count: usize, interval: u64) {
        for i in 0..count {
            est.add_onset(i as u64 * interval);
        }
    }

    #[test]
    fn test_converges_at_120_bpm() {
        let mut est = estimator();
        // 500 ms apart at 44.1 kHz.
        feed_regular(&mut est, 8, 22050);
        assert!((est.bpm() - 120.0).abs() < 1.0);
        assert!(est.confidence() > 0.9);
        assert_eq!(est.samples_per_beat(), 22050);
    }

    #[test]
    fn test_needs_four_onsets() {
        let mut est = estimator();
        assert!(est.add_onset(0).is_none());
        assert!(est.add_onset(22050).is_none());
        assert!(est.add_onset(44100).is_none());
        assert_eq!(est.samples_per_beat(), 0);
        assert!(est.add_onset(66150).is_some());
        assert_ne!(est.samples_per_beat(), 0);
    }

    #[test]
    fn test_estimates_clamp_to_range() {
        let mut est = TempoEstimator::new(SAMPLE_RATE, 32, 40.0, 240.0, 1.0);
        // 100 ms intervals would read 600 BPM.
        feed_regular(&mut est, 8, 4410);
        assert_eq!(est.bpm(), 240.0);

        let mut slow = TempoEstimator::new(SAMPLE_RATE, 32, 40.0, 240.0, 1.0);
        // 3 s intervals would read 20 BPM.
        feed_regular(&mut slow, 8, 132300);
        assert_eq!(slow.bpm(), 40.0);
    }

    #[test]
    fn test_single_outlier_barely_moves_median() {
        let mut est = estimator();
        let interval = 22050u64;
        let mut position = 0u64;
        for i in 0..12 {
            // One early hit in the middle of an otherwise steady pulse.
            position += if i == 6 { interval / 2 } else { interval };
            est.add_onset(position);
        }
        assert!((est.bpm() - 120.0).abs() <= 5.0, "bpm {}", est.bpm());
    }

    #[test]
    fn test_jittered_intervals_stay_close() {
        let mut est = estimator();
        let mut position = 0u64;
        for i in 0..16 {
            // Alternating +-3% around 500 ms.
            let jitter = if i % 2 == 0 { 662 } else { -662i64 };
            position += (22050i64 + jitter) as u64;
            est.add_onset(position);
        }
        assert!((est.bpm() - 120.0).abs() < 2.0, "bpm {}", est.bpm());
        assert!(est.confidence() > 0.9);
    }

    #[test]
    fn test_duplicate_positions_are_skipped() {
        let mut est = estimator();
        est.add_onset(0);
        est.add_onset(22050);
        est.add_onset(22050);
        est.add_onset(44100);
        est.add_onset(66150);
        // Surviving intervals are all 500 ms.
        assert!((est.bpm() - 120.0).abs() < 1.0);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut est = estimator();
        feed_regular(&mut est, 8, 10000);
        est.reset();
        assert_eq!(est.bpm(), 120.0);
        assert_eq!(est.confidence(), 0.0);
        assert_eq!(est.samples_per_beat(), 0);
        assert_eq!(est.onset_count(), 0);
        est.reset();
        assert_eq!(est.bpm(), 120.0);
        assert_eq!(est.onset_count(), 0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut est = TempoEstimator::new(SAMPLE_RATE, 8, 40.0, 240.0, 0.1);
        feed_regular(&mut est, 100, 22050);
        assert_eq!(est.onset_count(), 8);
    }

    #[test]
    fn test_set_params_clamps_running_tempo() {
        let mut est = estimator();
        feed_regular(&mut est, 8, 22050);
        est.set_params(32, 40.0, 100.0, 0.1);
        assert_eq!(est.bpm(), 100.0);
    }

    #[test]
    fn test_set_tempo_override() {
        let mut est = estimator();
        est.set_tempo(98.0);
        assert_eq!(est.bpm(), 98.0);
        assert_eq!(est.samples_per_beat(), (60.0 * SAMPLE_RATE / 98.0) as u64);
    }
}
