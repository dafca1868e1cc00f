//! Engine configuration.
//!
//! Validated once at build time, then shared through an `ArcSwap` store:
//! writers clone the current snapshot, apply an update, and swap the new
//! `Arc` in; the RT side loads exactly one snapshot per block and never
//! observes a half-applied change.

use crate::{Error, Result};
use penta_telemetry::ConfigUpdate;
use serde::{Deserialize, Serialize};

/// Complete engine configuration.
///
/// Structural fields (sample rate, FFT geometry, capacities) are fixed
/// after `build()`; the remaining tuning fields may change at runtime
/// through [`EngineConfig::with_update`]. Runtime changes to
/// `history_size` move the estimator's logical bound only, its backing
/// storage is sized at build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Host sample rate in Hz.
    pub sample_rate: f64,
    /// Nominal samples per `process_block` call.
    pub block_size: usize,
    /// Spectral frame length for onset detection. Power of two.
    pub fft_size: usize,
    /// Samples between successive spectral frames. At most `fft_size`.
    pub hop_size: usize,
    /// Onsets remembered for tempo estimation.
    pub history_size: usize,
    /// Lower tempo bound in BPM.
    pub min_tempo: f32,
    /// Upper tempo bound in BPM.
    pub max_tempo: f32,
    /// EMA weight for new tempo observations, in [0, 1].
    pub adaptation_rate: f32,
    /// Onset threshold scale: flux must clear median + k * spread.
    pub threshold_k: f32,
    /// Smoothed CPU load above which optional work is shed.
    pub overload_threshold: f32,
    /// Blocks between periodic diagnostics messages.
    pub report_interval: u32,
    /// Outbound telemetry queue capacity in messages.
    pub queue_capacity: usize,
    /// Inbound control queue capacity.
    pub control_capacity: usize,
    /// RT scratch pool capacity in samples.
    pub pool_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            block_size: 512,
            fft_size: 1024,
            hop_size: 512,
            history_size: 32,
            min_tempo: 40.0,
            max_tempo: 240.0,
            adaptation_rate: 0.1,
            threshold_k: 2.5,
            overload_threshold: 0.8,
            report_interval: 16,
            queue_capacity: 256,
            control_capacity: 64,
            pool_capacity: 8192,
        }
    }
}

impl EngineConfig {
    /// Check every field before the builder commits resources.
    ///
    /// Pool sufficiency is not checked here; the detector's reservations
    /// surface an exact shortfall during `build()` if the pool is tight.
    pub fn validate(&self) -> Result<()> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "sample_rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if self.block_size == 0 {
            return Err(Error::InvalidConfig("block_size must be non-zero".into()));
        }
        if !self.fft_size.is_power_of_two() || self.fft_size < 64 {
            return Err(Error::InvalidConfig(format!(
                "fft_size must be a power of two >= 64, got {}",
                self.fft_size
            )));
        }
        if self.hop_size == 0 || self.hop_size > self.fft_size {
            return Err(Error::InvalidConfig(format!(
                "hop_size must be in 1..={}, got {}",
                self.fft_size, self.hop_size
            )));
        }
        if self.history_size < 4 {
            return Err(Error::InvalidConfig(format!(
                "history_size must be at least 4, got {}",
                self.history_size
            )));
        }
        // A span of at least 1 BPM keeps the runtime clamps in
        // `with_update` well ordered.
        if !self.min_tempo.is_finite()
            || !self.max_tempo.is_finite()
            || self.min_tempo < 20.0
            || self.max_tempo > 300.0
            || self.max_tempo - self.min_tempo < 1.0
        {
            return Err(Error::InvalidConfig(format!(
                "tempo range [{}, {}] must span at least 1 BPM inside [20, 300]",
                self.min_tempo, self.max_tempo
            )));
        }
        if !(0.0..=1.0).contains(&self.adaptation_rate) {
            return Err(Error::InvalidConfig(format!(
                "adaptation_rate must be in [0, 1], got {}",
                self.adaptation_rate
            )));
        }
        if !self.threshold_k.is_finite() || self.threshold_k <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "threshold_k must be positive, got {}",
                self.threshold_k
            )));
        }
        if !(self.overload_threshold > 0.0 && self.overload_threshold <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "overload_threshold must be in (0, 1], got {}",
                self.overload_threshold
            )));
        }
        if self.report_interval == 0 {
            return Err(Error::InvalidConfig("report_interval must be non-zero".into()));
        }
        if self.queue_capacity == 0 || self.control_capacity == 0 {
            return Err(Error::InvalidConfig("queue capacities must be non-zero".into()));
        }
        if self.pool_capacity == 0 {
            return Err(Error::InvalidConfig("pool_capacity must be non-zero".into()));
        }
        Ok(())
    }

    /// Return a copy with one field updated, clamped to its legal range.
    ///
    /// Bounds mirror `validate()` so a swapped snapshot is always valid.
    /// Non-finite values from the wire are discarded unchanged.
    #[must_use]
    pub fn with_update(&self, update: ConfigUpdate) -> Self {
        let mut next = self.clone();
        match update {
            ConfigUpdate::ThresholdK(k) if k.is_finite() => {
                next.threshold_k = k.clamp(0.5, 10.0);
            }
            ConfigUpdate::AdaptationRate(rate) if rate.is_finite() => {
                next.adaptation_rate = rate.clamp(0.0, 1.0);
            }
            ConfigUpdate::MinTempo(bpm) if bpm.is_finite() => {
                next.min_tempo = bpm.clamp(20.0, next.max_tempo - 1.0);
            }
            ConfigUpdate::MaxTempo(bpm) if bpm.is_finite() => {
                next.max_tempo = bpm.clamp(next.min_tempo + 1.0, 300.0);
            }
            ConfigUpdate::OverloadThreshold(threshold) if threshold.is_finite() => {
                next.overload_threshold = threshold.clamp(0.1, 1.0);
            }
            ConfigUpdate::ReportInterval(blocks) => {
                next.report_interval = blocks.clamp(1, 1024);
            }
            ConfigUpdate::HistorySize(size) => {
                next.history_size = size.clamp(4, 128) as usize;
            }
            _ => {}
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_power_of_two_fft() {
        let config = EngineConfig {
            fft_size: 1000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_hop_larger_than_fft() {
        let config = EngineConfig {
            fft_size: 512,
            hop_size: 1024,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_tempo_range() {
        let config = EngineConfig {
            min_tempo: 200.0,
            max_tempo: 100.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            min_tempo: 10.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_update_clamps_threshold() {
        let config = EngineConfig::default();
        assert_eq!(config.with_update(ConfigUpdate::ThresholdK(50.0)).threshold_k, 10.0);
        assert_eq!(config.with_update(ConfigUpdate::ThresholdK(0.0)).threshold_k, 0.5);
        assert_eq!(config.with_update(ConfigUpdate::ThresholdK(3.0)).threshold_k, 3.0);
    }

    #[test]
    fn test_update_keeps_tempo_range_ordered() {
        let config = EngineConfig::default();

        // Default range is [40, 240].
        let raised = config.with_update(ConfigUpdate::MinTempo(500.0));
        assert_eq!(raised.min_tempo, 239.0);
        assert!(raised.validate().is_ok());

        let lowered = config.with_update(ConfigUpdate::MaxTempo(10.0));
        assert_eq!(lowered.max_tempo, 41.0);
        assert!(lowered.validate().is_ok());
    }

    #[test]
    fn test_update_ignores_non_finite() {
        let config = EngineConfig::default();
        assert_eq!(config.with_update(ConfigUpdate::ThresholdK(f32::NAN)), config);
        assert_eq!(
            config.with_update(ConfigUpdate::MinTempo(f32::INFINITY)),
            config
        );
    }

    #[test]
    fn test_update_clamps_counts() {
        let config = EngineConfig::default();
        assert_eq!(config.with_update(ConfigUpdate::HistorySize(1000)).history_size, 128);
        assert_eq!(config.with_update(ConfigUpdate::HistorySize(0)).history_size, 4);
        assert_eq!(config.with_update(ConfigUpdate::ReportInterval(0)).report_interval, 1);
    }

    #[test]
    fn test_updated_snapshots_stay_valid() {
        let mut config = EngineConfig::default();
        for update in [
            ConfigUpdate::ThresholdK(-3.0),
            ConfigUpdate::AdaptationRate(7.0),
            ConfigUpdate::MinTempo(299.0),
            ConfigUpdate::MaxTempo(21.0),
            ConfigUpdate::OverloadThreshold(0.0),
            ConfigUpdate::ReportInterval(u32::MAX),
            ConfigUpdate::HistorySize(1),
        ] {
            config = config.with_update(update);
            assert!(config.validate().is_ok(), "after {:?}", update);
        }
    }
}
