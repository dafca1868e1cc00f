//! Streaming spectral-flux onset detection.
//!
//! Samples pass through a DC-blocking one-pole highpass into an
//! accumulator; every `hop_size` samples a Hann-windowed frame of
//! `fft_size` is transformed and the positive per-bin magnitude increase
//! versus the previous frame is summed into a flux value. A frame is an
//! onset when its flux clears a running median + k * MAD threshold over
//! the trailing flux window, outside the refractory gap.

use penta_rt::{PoolBuf, Result, RtPool};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Trailing flux window for the adaptive threshold. At the default
/// 512-sample hop this spans roughly 0.75 s at 44.1 kHz.
const FLUX_WINDOW: usize = 64;

/// Absolute flux floor so digital silence can never trigger.
const MIN_FLUX: f32 = 1e-2;

/// Decay of the running flux maximum used for strength normalization.
const MAX_DECAY: f32 = 0.995;

/// DC blocker corner frequency in Hz.
const DC_CORNER_HZ: f64 = 20.0;

/// A detected onset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnsetEvent {
    /// Sample position of the start of the frame that triggered.
    pub position: u64,
    /// Flux relative to the recent maximum, in [0, 1].
    pub strength: f32,
    /// How decisively the flux cleared the threshold, in [0, 1].
    pub confidence: f32,
}

pub struct OnsetDetector {
    fft_size: usize,
    hop_size: usize,
    threshold_k: f32,
    /// Refractory gap in samples (50 ms).
    min_gap: u64,

    fft: Arc<dyn Fft<f32>>,
    fft_buf: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,

    window: PoolBuf,
    acc: PoolBuf,
    acc_len: usize,
    prev_mags: PoolBuf,
    flux_history: PoolBuf,
    flux_len: usize,
    flux_pos: usize,

    dc_r: f32,
    dc_x1: f32,
    dc_y1: f32,

    position: u64,
    last_onset: u64,
    has_onset: bool,
    has_prev_frame: bool,
    recent_max: f32,
}

impl OnsetDetector {
    /// Reserves all frame state from `pool`; the FFT plan and its complex
    /// buffers are the only construction-time heap allocations.
    pub fn new(
        sample_rate: f64,
        fft_size: usize,
        hop_size: usize,
        threshold_k: f32,
        pool: &mut RtPool,
    ) -> Result<Self> {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let fft_buf = vec![Complex::default(); fft_size];
        let fft_scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];

        let window = pool.reserve(fft_size)?;
        let hann = pool.buf_mut(window);
        for (i, w) in hann.iter_mut().enumerate() {
            *w = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (fft_size - 1) as f32).cos());
        }

        let acc = pool.reserve(fft_size)?;
        let prev_mags = pool.reserve(fft_size / 2 + 1)?;
        let flux_history = pool.reserve(FLUX_WINDOW)?;

        Ok(Self {
            fft_size,
            hop_size,
            threshold_k,
            min_gap: (sample_rate * 0.05) as u64,
            fft,
            fft_buf,
            fft_scratch,
            window,
            acc,
            acc_len: 0,
            prev_mags,
            flux_history,
            flux_len: 0,
            flux_pos: 0,
            dc_r: (1.0 - std::f64::consts::TAU * DC_CORNER_HZ / sample_rate) as f32,
            dc_x1: 0.0,
            dc_y1: 0.0,
            position: 0,
            last_onset: 0,
            has_onset: false,
            has_prev_frame: false,
            recent_max: 0.0,
        })
    }

    pub fn set_threshold_k(&mut self, k: f32) {
        self.threshold_k = k.max(0.0);
    }

    /// Feed one block, writing detected onsets into `out`. Returns the
    /// number written. Transient threshold scratch comes from `pool` and
    /// is gone at the caller's next `pool.reset()`.
    pub fn process_block(
        &mut self,
        samples: &[f32],
        pool: &mut RtPool,
        out: &mut [OnsetEvent],
    ) -> Result<usize> {
        let sort_scratch = pool.alloc(FLUX_WINDOW)?;
        let mut count = 0;

        for &x in samples {
            // One-pole DC blocker, 20 Hz corner.
            let y = x - self.dc_x1 + self.dc_r * self.dc_y1;
            self.dc_x1 = x;
            self.dc_y1 = y;

            let acc = pool.buf_mut(self.acc);
            acc[self.acc_len] = y;
            self.acc_len += 1;
            self.position += 1;

            if self.acc_len == self.fft_size {
                if let Some(event) = self.analyze_frame(pool, sort_scratch) {
                    if count < out.len() {
                        out[count] = event;
                        count += 1;
                    }
                }
                pool.buf_mut(self.acc).copy_within(self.hop_size.., 0);
                self.acc_len -= self.hop_size;
            }
        }

        Ok(count)
    }

    fn analyze_frame(&mut self, pool: &mut RtPool, sort_scratch: PoolBuf) -> Option<OnsetEvent> {
        let frame_start = self.position - self.fft_size as u64;

        {
            let hann = pool.buf(self.window);
            let acc = pool.buf(self.acc);
            for i in 0..self.fft_size {
                self.fft_buf[i] = Complex::new(acc[i] * hann[i], 0.0);
            }
        }
        self.fft
            .process_with_scratch(&mut self.fft_buf, &mut self.fft_scratch);

        // Magnitudes and rectified flux against the previous frame in one
        // pass over the non-redundant bins.
        let mut flux = 0.0f32;
        {
            let prev = pool.buf_mut(self.prev_mags);
            for (k, p) in prev.iter_mut().enumerate() {
                let mag = self.fft_buf[k].norm();
                let diff = mag - *p;
                if diff > 0.0 {
                    flux += diff;
                }
                *p = mag;
            }
        }

        if !self.has_prev_frame {
            // The first frame's flux is just its full energy; seed the
            // magnitude history and move on.
            self.has_prev_frame = true;
            return None;
        }

        let (history, scratch) = pool.buf_pair_mut(self.flux_history, sort_scratch);
        let threshold = adaptive_threshold(
            &history[..self.flux_len],
            &mut scratch[..self.flux_len],
            self.threshold_k,
        );
        history[self.flux_pos] = flux;
        self.flux_pos = (self.flux_pos + 1) % FLUX_WINDOW;
        self.flux_len = (self.flux_len + 1).min(FLUX_WINDOW);

        self.recent_max = flux.max(self.recent_max * MAX_DECAY);

        if flux <= threshold.max(MIN_FLUX) {
            return None;
        }
        if self.has_onset && frame_start.saturating_sub(self.last_onset) < self.min_gap {
            return None;
        }

        self.last_onset = frame_start;
        self.has_onset = true;
        Some(OnsetEvent {
            position: frame_start,
            strength: (flux / self.recent_max).clamp(0.0, 1.0),
            confidence: ((flux - threshold) / flux).clamp(0.0, 1.0),
        })
    }

    /// Clear all streaming state, including the absolute sample position.
    pub fn reset(&mut self, pool: &mut RtPool) {
        self.acc_len = 0;
        self.flux_len = 0;
        self.flux_pos = 0;
        self.dc_x1 = 0.0;
        self.dc_y1 = 0.0;
        self.position = 0;
        self.last_onset = 0;
        self.has_onset = false;
        self.has_prev_frame = false;
        self.recent_max = 0.0;
        pool.fill(self.prev_mags, 0.0);
        pool.fill(self.flux_history, 0.0);
    }

    /// Absolute position of the next incoming sample.
    pub fn position(&self) -> u64 {
        self.position
    }
}

/// Running median + k * MAD over the trailing flux window. `scratch` is
/// clobbered. Empty history yields 0, deferring to the absolute floor.
fn adaptive_threshold(history: &[f32], scratch: &mut [f32], k: f32) -> f32 {
    if history.is_empty() {
        return 0.0;
    }
    scratch.copy_from_slice(history);
    let center = median_in_place(scratch);
    for d in scratch.iter_mut() {
        *d = (*d - center).abs();
    }
    let mad = median_in_place(scratch);
    center + k * mad
}

/// Sorts `values` and returns the median (middle-two average when even).
fn median_in_place(values: &mut [f32]) -> f32 {
    values.sort_unstable_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) * 0.5
    } else {
        values[mid]
    }
}
