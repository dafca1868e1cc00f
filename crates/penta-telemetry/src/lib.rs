//! OSC telemetry for the penta engine.
//!
//! Analysis results travel as fixed-size [`Message`]s over the RT queue;
//! the [`TelemetryHub`] thread encodes them to OSC datagrams for the
//! configured UDP peer and fans them out to in-process [`Subscription`]s.
//! Inbound datagrams on `/penta/control/...` become [`ControlCommand`]s
//! for the RT side or [`ConfigUpdate`]s for the shared config store.

mod message;

pub use message::{ConfigUpdate, ControlCommand, Message, Payload};

#[cfg(feature = "hub")]
mod codec;
#[cfg(feature = "hub")]
mod error;
#[cfg(feature = "hub")]
mod hub;

#[cfg(feature = "hub")]
pub use codec::{decode_inbound, encode, to_packet, AddressFilter, Inbound};
#[cfg(feature = "hub")]
pub use error::{Error, Result};
#[cfg(feature = "hub")]
pub use hub::{HubHandle, HubStats, Subscription, TelemetryConfig, TelemetryHub};
