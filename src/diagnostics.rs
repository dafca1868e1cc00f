//! Per-block health metrics published from the RT domain.
//!
//! The audio thread records one sample of work per block; everything is
//! stored in cache-line aligned atomics so UI or telemetry threads can
//! poll without touching the callback.

use penta_rt::{AtomicCounter, AtomicFlag, AtomicFloat};
use std::time::Duration;

/// Blocks over which the load average settles. Before this many blocks
/// the smoother is a plain cumulative mean, so startup spikes wash out
/// instead of sticking.
const LOAD_HORIZON: u64 = 100;

/// One coherent snapshot of the block metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiagnosticsReport {
    /// Smoothed fraction of the block budget spent, 1.0 = realtime limit.
    pub load: f32,
    /// Absolute peak of the last block.
    pub peak: f32,
    /// RMS of the last block.
    pub rms: f32,
    /// Load currently above the configured threshold.
    pub overloaded: bool,
}

/// Lock-free block profiler shared between the engine and its observers.
#[derive(Debug, Default)]
pub struct DiagnosticsEngine {
    load: AtomicFloat,
    peak: AtomicFloat,
    rms: AtomicFloat,
    overloaded: AtomicFlag,
    underruns: AtomicCounter,
    blocks: AtomicCounter,
}

impl DiagnosticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one processed block: its samples, how long processing took,
    /// and the wall-clock budget the block represents.
    ///
    /// Load above 1.0 means the callback missed realtime and counts as an
    /// underrun. The overload flag follows the smoothed load against
    /// `overload_threshold` and is re-evaluated every block.
    pub fn record_block(
        &self,
        samples: &[f32],
        elapsed: Duration,
        budget: Duration,
        overload_threshold: f32,
    ) {
        let mut peak = 0.0f32;
        let mut sum_sq = 0.0f32;
        for &sample in samples {
            let magnitude = sample.abs();
            if magnitude > peak {
                peak = magnitude;
            }
            sum_sq += sample * sample;
        }
        let rms = if samples.is_empty() {
            0.0
        } else {
            (sum_sq / samples.len() as f32).sqrt()
        };
        self.peak.set(peak);
        self.rms.set(rms);

        let budget_secs = budget.as_secs_f32();
        let load = if budget_secs > 0.0 {
            elapsed.as_secs_f32() / budget_secs
        } else {
            0.0
        };
        if load > 1.0 {
            self.underruns.increment();
        }

        // Cumulative mean for the first LOAD_HORIZON blocks, then a
        // fixed-alpha EMA. `increment` returns the prior count, so the
        // very first observation lands at full weight.
        let seen = self.blocks.increment().min(LOAD_HORIZON);
        let alpha = 1.0 / (seen as f32 + 1.0);
        let smoothed = self.load.get_relaxed() + alpha * (load - self.load.get_relaxed());
        self.load.set(smoothed);
        self.overloaded.set(smoothed > overload_threshold);
    }

    /// Snapshot for telemetry or UI polling.
    pub fn report(&self) -> DiagnosticsReport {
        DiagnosticsReport {
            load: self.load.get(),
            peak: self.peak.get(),
            rms: self.rms.get(),
            overloaded: self.overloaded.get(),
        }
    }

    /// The engine consults this before optional work each cycle.
    #[inline]
    pub fn is_overloaded(&self) -> bool {
        self.overloaded.get()
    }

    #[inline]
    pub fn load(&self) -> f32 {
        self.load.get()
    }

    /// Blocks whose processing exceeded their wall-clock budget.
    #[inline]
    pub fn underruns(&self) -> u64 {
        self.underruns.get()
    }

    /// Total blocks recorded since construction or reset.
    #[inline]
    pub fn blocks(&self) -> u64 {
        self.blocks.get()
    }

    /// Restore the cold-start state.
    pub fn reset(&self) {
        self.load.set(0.0);
        self.peak.set(0.0);
        self.rms.set(0.0);
        self.overloaded.set(false);
        self.underruns.reset();
        self.blocks.reset();
    }
}
