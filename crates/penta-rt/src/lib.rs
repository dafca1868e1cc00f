//! # penta-rt - Real-time primitives
//!
//! The pieces of penta that live on the audio callback share three needs:
//! publish small values across threads without locks, carve scratch buffers
//! without touching the heap, and hand finished work to the telemetry side
//! without ever blocking. This crate provides exactly those three things:
//!
//! - [`AtomicFloat`] / [`AtomicFlag`] / [`AtomicCounter`] - cache-line
//!   aligned lock-free cells for metrics published from the RT domain
//! - [`RtPool`] - a fixed-capacity sample arena with init-time reserved
//!   regions and per-cycle transient allocations
//! - [`rt_channel`] - a bounded bridge whose producer displaces the oldest
//!   element on overflow, so the RT side never waits and never loses the
//!   newest data
//!
//! Nothing in this crate allocates after construction.

mod atomic;
mod error;
mod pool;
mod queue;

pub use atomic::{AtomicCounter, AtomicFlag, AtomicFloat};
pub use error::{Error, Result};
pub use pool::{PoolBuf, RtPool};
pub use queue::{rt_channel, RtConsumer, RtProducer};
