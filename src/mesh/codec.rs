//! Wire codec for MQTT service envelopes and the radio stream API.
//!
//! Inbound: MQTT gateways publish a protobuf `ServiceEnvelope` wrapping one `MeshPacket`.
//! Outbound: packets are written to a radio as `ToRadio` messages framed with the
//! stream header `0x94 0xC3 <len_hi> <len_lo>`.

use crate::error::{GatewayError, GatewayResult};
use crate::protobuf::meshtastic_generated as proto;
use prost::Message;
use proto::{to_radio, MeshPacket, ServiceEnvelope, ToRadio};

pub const STREAM_START1: u8 = 0x94;
pub const STREAM_START2: u8 = 0xC3;
/// Largest `ToRadio` payload the radio firmware accepts in one frame.
pub const MAX_STREAM_PAYLOAD: usize = 512;

/// Parse an MQTT payload into a service envelope that carries a packet.
pub fn decode_envelope(bytes: &[u8]) -> GatewayResult<ServiceEnvelope> {
    let envelope = ServiceEnvelope::decode(bytes)?;
    if envelope.packet.is_none() {
        return Err(GatewayError::Parse("service envelope without packet".into()));
    }
    Ok(envelope)
}

pub fn encode_envelope(envelope: &ServiceEnvelope) -> Vec<u8> {
    envelope.encode_to_vec()
}

/// Wrap a packet in an envelope as an MQTT gateway would publish it.
pub fn envelope_for(packet: MeshPacket, channel_id: &str, gateway_id: &str) -> ServiceEnvelope {
    ServiceEnvelope {
        packet: Some(packet),
        channel_id: channel_id.to_string(),
        gateway_id: gateway_id.to_string(),
    }
}

/// Frame an arbitrary `ToRadio` for the stream API.
pub fn frame_to_radio(msg: &ToRadio) -> GatewayResult<Vec<u8>> {
    let payload = msg.encode_to_vec();
    if payload.len() > MAX_STREAM_PAYLOAD {
        return Err(GatewayError::Parse(format!(
            "ToRadio payload too large ({} bytes)",
            payload.len()
        )));
    }
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.push(STREAM_START1);
    out.push(STREAM_START2);
    out.push(((payload.len() >> 8) & 0xFF) as u8);
    out.push((payload.len() & 0xFF) as u8);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Frame a mesh packet for transmission.
pub fn frame_packet(packet: &MeshPacket) -> GatewayResult<Vec<u8>> {
    frame_to_radio(&ToRadio {
        payload_variant: Some(to_radio::PayloadVariant::Packet(packet.clone())),
    })
}

/// Frame the config request a radio expects right after a client connects.
pub fn frame_want_config(config_id: u32) -> GatewayResult<Vec<u8>> {
    frame_to_radio(&ToRadio {
        payload_variant: Some(to_radio::PayloadVariant::WantConfigId(config_id)),
    })
}

/// Split one framed buffer back into its `ToRadio` message.
pub fn unframe_to_radio(frame: &[u8]) -> GatewayResult<ToRadio> {
    if frame.len() < 4 || frame[0] != STREAM_START1 || frame[1] != STREAM_START2 {
        return Err(GatewayError::Parse("missing stream header".into()));
    }
    let len = ((frame[2] as usize) << 8) | frame[3] as usize;
    let body = frame
        .get(4..4 + len)
        .ok_or_else(|| GatewayError::Parse("truncated stream frame".into()))?;
    Ok(ToRadio::decode(body)?)
}
