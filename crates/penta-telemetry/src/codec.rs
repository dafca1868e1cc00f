//! OSC wire codec and address matching.
//!
//! Outbound messages map one payload to one datagram, sequence number
//! leading. Inbound datagrams on the control namespace decode to
//! [`ControlCommand`]s or [`ConfigUpdate`]s; everything else is ignored.

use crate::error::Result;
use crate::message::{ConfigUpdate, ControlCommand, Message, Payload};
use rosc::{encoder, OscMessage, OscPacket, OscType};

const CONTROL_RESET: &str = "/penta/control/reset";
const CONTROL_TEMPO: &str = "/penta/control/tempo";
const CONTROL_CONFIG: &str = "/penta/control/config/";

/// A decoded inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Inbound {
    Control(ControlCommand),
    Config(ConfigUpdate),
}

/// Builds the OSC packet for an outbound message.
pub fn to_packet(message: &Message) -> OscPacket {
    let mut args = vec![OscType::Long(message.seq as i64)];
    match message.payload {
        Payload::Onset(onset) => {
            args.push(OscType::Long(onset.position as i64));
            args.push(OscType::Float(onset.strength));
            args.push(OscType::Float(onset.confidence));
        }
        Payload::Tempo(tempo) => {
            args.push(OscType::Float(tempo.bpm));
            args.push(OscType::Float(tempo.confidence));
        }
        Payload::Chord {
            root,
            quality_id,
            confidence,
            ..
        } => {
            args.push(OscType::Int(i32::from(root)));
            args.push(OscType::Int(i32::from(quality_id)));
            args.push(OscType::Float(confidence));
        }
        Payload::Key {
            tonic,
            mode,
            confidence,
        } => {
            args.push(OscType::Int(i32::from(tonic)));
            args.push(OscType::Int(i32::from(mode)));
            args.push(OscType::Float(confidence));
        }
        Payload::Voicing { notes, len, cost } => {
            args.push(OscType::Float(cost));
            for &note in &notes[..len as usize] {
                args.push(OscType::Int(i32::from(note)));
            }
        }
        Payload::Diagnostics {
            load,
            peak,
            rms,
            overloaded,
        } => {
            args.push(OscType::Float(load));
            args.push(OscType::Float(peak));
            args.push(OscType::Float(rms));
            args.push(OscType::Bool(overloaded));
        }
        Payload::Drops { dropped } => {
            args.push(OscType::Long(dropped as i64));
        }
    }

    OscPacket::Message(OscMessage {
        addr: message.payload.address().to_string(),
        args,
    })
}

/// Encodes a message to a ready-to-send datagram.
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    Ok(encoder::encode(&to_packet(message))?)
}

/// Decodes an inbound packet from the control namespace. Bundles are
/// searched for the first routable message.
pub fn decode_inbound(packet: &OscPacket) -> Option<Inbound> {
    let message = match packet {
        OscPacket::Message(message) => message,
        OscPacket::Bundle(bundle) => return bundle.content.iter().find_map(decode_inbound),
    };

    match message.addr.as_str() {
        CONTROL_RESET => Some(Inbound::Control(ControlCommand::Reset)),
        CONTROL_TEMPO => {
            let bpm = float_arg(&message.args, 0)?;
            Some(Inbound::Control(ControlCommand::TempoOverride(bpm)))
        }
        addr => {
            let field = addr.strip_prefix(CONTROL_CONFIG)?;
            let update = match field {
                "threshold_k" => ConfigUpdate::ThresholdK(float_arg(&message.args, 0)?),
                "adaptation_rate" => ConfigUpdate::AdaptationRate(float_arg(&message.args, 0)?),
                "min_tempo" => ConfigUpdate::MinTempo(float_arg(&message.args, 0)?),
                "max_tempo" => ConfigUpdate::MaxTempo(float_arg(&message.args, 0)?),
                "overload_threshold" => {
                    ConfigUpdate::OverloadThreshold(float_arg(&message.args, 0)?)
                }
                "report_interval" => {
                    ConfigUpdate::ReportInterval(int_arg(&message.args, 0)?.max(0) as u32)
                }
                "history_size" => {
                    ConfigUpdate::HistorySize(int_arg(&message.args, 0)?.max(0) as u32)
                }
                _ => return None,
            };
            Some(Inbound::Config(update))
        }
    }
}

fn float_arg(args: &[OscType], index: usize) -> Option<f32> {
    match args.get(index)? {
        OscType::Float(v) => Some(*v),
        OscType::Double(v) => Some(*v as f32),
        OscType::Int(v) => Some(*v as f32),
        OscType::Long(v) => Some(*v as f32),
        _ => None,
    }
}

fn int_arg(args: &[OscType], index: usize) -> Option<i64> {
    match args.get(index)? {
        OscType::Int(v) => Some(i64::from(*v)),
        OscType::Long(v) => Some(*v),
        _ => None,
    }
}

/// Segment-wise address pattern. `*` matches one segment; a trailing `*`
/// matches the whole remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressFilter {
    segments: Vec<String>,
}

impl AddressFilter {
    pub fn new(pattern: &str) -> Self {
        Self {
            segments: split(pattern).map(str::to_owned).collect(),
        }
    }

    pub fn matches(&self, address: &str) -> bool {
        let addr: Vec<&str> = split(address).collect();
        if self.segments.is_empty() {
            return true;
        }
        for (i, segment) in self.segments.iter().enumerate() {
            let trailing = i == self.segments.len() - 1;
            if trailing && segment == "*" {
                return addr.len() > i;
            }
            match addr.get(i) {
                Some(part) if segment == "*" || segment == part => {}
                _ => return false,
            }
        }
        addr.len() == self.segments.len()
    }
}

fn split(address: &str) -> impl Iterator<Item = &str> {
    address.split('/').filter(|s| !s.is_empty())
}
