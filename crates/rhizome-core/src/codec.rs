//! OSC codec
//!
//! Thin layer over `rosc` translating between OSC packets and rhizome
//! [`Message`]s. Only the argument types the router can carry are accepted
//! (int, float, string, bool, blob); anything else is a decode error rather
//! than being silently dropped.

use bytes::Bytes;
use rosc::{OscMessage, OscPacket, OscType};

use crate::{Arg, Error, Message, Result};

/// Encode an address and its arguments to an OSC packet
pub fn encode(address: &str, args: &[Arg]) -> Result<Bytes> {
    let packet = OscPacket::Message(OscMessage {
        addr: address.to_string(),
        args: args.iter().map(arg_to_osc).collect(),
    });
    rosc::encoder::encode(&packet)
        .map(Bytes::from)
        .map_err(|e| Error::EncodeError(format!("{:?}", e)))
}

/// Decode a single OSC message. Bundles are rejected, see [`decode_packet`].
pub fn decode(data: &[u8]) -> Result<Message> {
    match decode_osc(data)? {
        OscPacket::Message(msg) => osc_to_message(msg),
        OscPacket::Bundle(_) => Err(Error::DecodeError(
            "expected a message, got a bundle".to_string(),
        )),
    }
}

/// Decode an OSC packet, flattening bundles into their messages in order
pub fn decode_packet(data: &[u8]) -> Result<Vec<Message>> {
    let mut messages = Vec::new();
    flatten(decode_osc(data)?, &mut messages)?;
    Ok(messages)
}

fn decode_osc(data: &[u8]) -> Result<OscPacket> {
    rosc::decoder::decode_udp(data)
        .map(|(_, packet)| packet)
        .map_err(|e| Error::DecodeError(format!("{:?}", e)))
}

fn flatten(packet: OscPacket, out: &mut Vec<Message>) -> Result<()> {
    match packet {
        OscPacket::Message(msg) => out.push(osc_to_message(msg)?),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out)?;
            }
        }
    }
    Ok(())
}

fn osc_to_message(msg: OscMessage) -> Result<Message> {
    let args = msg
        .args
        .into_iter()
        .map(osc_to_arg)
        .collect::<Result<Vec<_>>>()?;
    Ok(Message::new(msg.addr, args))
}

fn osc_to_arg(osc: OscType) -> Result<Arg> {
    match osc {
        OscType::Int(i) => Ok(Arg::Int(i)),
        OscType::Float(f) => Ok(Arg::Float(f)),
        OscType::String(s) => Ok(Arg::String(s)),
        OscType::Bool(b) => Ok(Arg::Bool(b)),
        OscType::Blob(b) => Ok(Arg::Blob(Bytes::from(b))),
        other => Err(Error::UnsupportedArgument(format!("{:?}", other))),
    }
}

fn arg_to_osc(arg: &Arg) -> OscType {
    match arg {
        Arg::Int(i) => OscType::Int(*i),
        Arg::Float(f) => OscType::Float(*f),
        Arg::String(s) => OscType::String(s.clone()),
        Arg::Bool(b) => OscType::Bool(*b),
        Arg::Blob(b) => OscType::Blob(b.to_vec()),
    }
}
