//! Builder for configuring and constructing an `AnalysisEngine`.

use crate::config::EngineConfig;
use crate::diagnostics::DiagnosticsEngine;
use crate::{AnalysisEngine, Result};
use arc_swap::ArcSwap;
use penta_groove::{OnsetDetector, TempoEstimator};
use penta_rt::{rt_channel, RtConsumer, RtPool, RtProducer};
use penta_telemetry::{ControlCommand, Message};
use std::sync::Arc;

#[cfg(feature = "telemetry")]
use penta_telemetry::{HubHandle, TelemetryConfig, TelemetryHub};

/// Non-RT ends of the engine's queues plus the shared state stores.
///
/// Everything here is safe to move to other threads; the engine keeps
/// only the RT-side halves.
pub struct EngineHandles {
    /// Telemetry consumer. `None` when a spawned hub owns it instead.
    pub messages: Option<RtConsumer<Message>>,
    /// Producer for control commands; applied at the next block boundary.
    pub control: RtProducer<ControlCommand>,
    /// Copy-on-write config store shared with the engine (and hub).
    pub config: Arc<ArcSwap<EngineConfig>>,
    /// Block health metrics, readable from any thread.
    pub diagnostics: Arc<DiagnosticsEngine>,
    /// Running telemetry hub, when one was configured.
    #[cfg(feature = "telemetry")]
    pub hub: Option<HubHandle>,
}

/// Validates the configuration, carves the pool, wires the queues, and
/// optionally spawns the OSC hub.
///
/// # Example
///
/// ```ignore
/// use penta::prelude::*;
///
/// let (engine, handles) = AnalysisEngine::builder()
///     .sample_rate(48_000.0)
///     .tempo_range(60.0, 200.0)
///     .telemetry(TelemetryConfig::default())
///     .build()?;
/// ```
pub struct EngineBuilder {
    config: EngineConfig,

    #[cfg(feature = "telemetry")]
    telemetry: Option<TelemetryConfig>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),

            #[cfg(feature = "telemetry")]
            telemetry: None,
        }
    }
}

impl EngineBuilder {
    /// Default: 44100.0
    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.config.sample_rate = rate;
        self
    }

    /// Default: 512
    pub fn block_size(mut self, samples: usize) -> Self {
        self.config.block_size = samples;
        self
    }

    /// Default: 1024 / 512
    pub fn fft(mut self, fft_size: usize, hop_size: usize) -> Self {
        self.config.fft_size = fft_size;
        self.config.hop_size = hop_size;
        self
    }

    /// Default: 32
    pub fn history_size(mut self, onsets: usize) -> Self {
        self.config.history_size = onsets;
        self
    }

    /// Default: 40-240 BPM
    pub fn tempo_range(mut self, min: f32, max: f32) -> Self {
        self.config.min_tempo = min;
        self.config.max_tempo = max;
        self
    }

    /// Default: 0.1
    pub fn adaptation_rate(mut self, rate: f32) -> Self {
        self.config.adaptation_rate = rate;
        self
    }

    /// Default: 2.5
    pub fn threshold_k(mut self, k: f32) -> Self {
        self.config.threshold_k = k;
        self
    }

    /// Default: 0.8
    pub fn overload_threshold(mut self, threshold: f32) -> Self {
        self.config.overload_threshold = threshold;
        self
    }

    /// Default: every 16 blocks
    pub fn report_interval(mut self, blocks: u32) -> Self {
        self.config.report_interval = blocks;
        self
    }

    /// Default: 256 outbound / 64 inbound
    pub fn queue_capacities(mut self, messages: usize, controls: usize) -> Self {
        self.config.queue_capacity = messages;
        self.config.control_capacity = controls;
        self
    }

    /// Default: 8192 samples
    pub fn pool_capacity(mut self, samples: usize) -> Self {
        self.config.pool_capacity = samples;
        self
    }

    /// Replace the whole configuration at once.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawn a telemetry hub at build time. The hub takes the message
    /// consumer; `EngineHandles::messages` will be `None`.
    #[cfg(feature = "telemetry")]
    pub fn telemetry(mut self, config: TelemetryConfig) -> Self {
        self.telemetry = Some(config);
        self
    }

    pub fn build(self) -> Result<(AnalysisEngine, EngineHandles)> {
        self.config.validate()?;
        let config = self.config;

        let mut pool = RtPool::new(config.pool_capacity);
        let onset = OnsetDetector::new(
            config.sample_rate,
            config.fft_size,
            config.hop_size,
            config.threshold_k,
            &mut pool,
        )?;
        let tempo = TempoEstimator::new(
            config.sample_rate,
            config.history_size,
            config.min_tempo,
            config.max_tempo,
            config.adaptation_rate,
        );
        let diagnostics = Arc::new(DiagnosticsEngine::new());

        let (message_tx, message_rx) = rt_channel(config.queue_capacity);
        let (control_tx, control_rx) = rt_channel(config.control_capacity);
        let store = Arc::new(ArcSwap::from_pointee(config));

        // Inbound config updates go through the same clamped
        // copy-on-write path any other writer uses.
        #[cfg(feature = "telemetry")]
        let (hub, messages) = match self.telemetry {
            Some(telemetry) => {
                let writer = Arc::clone(&store);
                let hub = TelemetryHub::spawn(telemetry, message_rx, control_tx.clone(), move |update| {
                    writer.rcu(|current| current.with_update(update));
                })?;
                (Some(hub), None)
            }
            None => (None, Some(message_rx)),
        };
        #[cfg(not(feature = "telemetry"))]
        let messages = Some(message_rx);

        let engine = AnalysisEngine::from_parts(
            Arc::clone(&store),
            pool,
            onset,
            tempo,
            Arc::clone(&diagnostics),
            message_tx,
            control_rx,
        );

        Ok((
            engine,
            EngineHandles {
                messages,
                control: control_tx,
                config: store,
                diagnostics,
                #[cfg(feature = "telemetry")]
                hub,
            },
        ))
    }
}
