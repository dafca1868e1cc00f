//! Centralized error type for the penta umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Rt(#[from] penta_rt::Error),

    #[cfg(feature = "telemetry")]
    #[error("Telemetry: {0}")]
    Telemetry(#[from] penta_telemetry::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
