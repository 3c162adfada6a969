//! Channel encryption for mesh packets.
//!
//! Meshtastic channel traffic is AES-CTR encrypted with the channel PSK. The 16-byte
//! counter block is derived from the packet itself:
//!
//! ```text
//! nonce = le_u64(packet_id) || le_u64(sender_id)
//! ```
//!
//! Key length selects AES-128 or AES-256. Decryption never mutates the source packet;
//! [`decrypt_packet`] returns a new decoded copy.

use crate::error::{GatewayError, GatewayResult};
use crate::mesh;
use crate::protobuf::meshtastic_generated as proto;
use aes::{Aes128, Aes256};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ctr::cipher::{KeyIvInit, StreamCipher};
use prost::Message;
use proto::mesh_packet::PayloadVariant;
use proto::{Data, MeshPacket, PortNum};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Counter block for a packet.
pub fn nonce(packet_id: u32, sender_id: u32) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&u64::from(packet_id).to_le_bytes());
    out[8..].copy_from_slice(&u64::from(sender_id).to_le_bytes());
    out
}

/// Decode a base64 PSK.
pub fn decode_key(channel_key: &str) -> GatewayResult<Vec<u8>> {
    STANDARD
        .decode(channel_key.trim())
        .map_err(|e| GatewayError::Decrypt(format!("invalid base64 key: {}", e)))
}

fn apply_keystream(key: &[u8], nonce: &[u8; 16], buf: &mut [u8]) -> GatewayResult<()> {
    match key.len() {
        16 => {
            let mut cipher = Aes128Ctr::new_from_slices(key, nonce)
                .map_err(|e| GatewayError::Decrypt(e.to_string()))?;
            cipher.apply_keystream(buf);
        }
        32 => {
            let mut cipher = Aes256Ctr::new_from_slices(key, nonce)
                .map_err(|e| GatewayError::Decrypt(e.to_string()))?;
            cipher.apply_keystream(buf);
        }
        n => {
            return Err(GatewayError::Decrypt(format!(
                "unsupported key length {} (expected 16 or 32 bytes)",
                n
            )))
        }
    }
    Ok(())
}

/// Raw AES-CTR transform (encrypt and decrypt are the same operation).
pub fn transform(
    channel_key: &str,
    packet_id: u32,
    sender_id: u32,
    input: &[u8],
) -> GatewayResult<Vec<u8>> {
    let key = decode_key(channel_key)?;
    let mut buf = input.to_vec();
    apply_keystream(&key, &nonce(packet_id, sender_id), &mut buf)?;
    Ok(buf)
}

/// Decrypt `ciphertext` into a [`Data`] payload.
///
/// Plaintext that does not decode as `Data`, or decodes with an unset port number,
/// is reported as a decryption failure: that is what a wrong key looks like.
pub fn decrypt(
    channel_key: &str,
    packet_id: u32,
    sender_id: u32,
    ciphertext: &[u8],
) -> GatewayResult<Data> {
    if ciphertext.is_empty() {
        return Err(GatewayError::Decrypt("empty ciphertext".into()));
    }
    let plaintext = transform(channel_key, packet_id, sender_id, ciphertext)?;
    let data = Data::decode(plaintext.as_slice())
        .map_err(|e| GatewayError::Decrypt(format!("plaintext is not a Data message: {}", e)))?;
    if data.portnum == PortNum::UnknownApp as i32 {
        return Err(GatewayError::Decrypt("decoded portnum is unset".into()));
    }
    Ok(data)
}

/// Encrypt a [`Data`] payload for channel transmission.
pub fn encrypt(
    channel_key: &str,
    packet_id: u32,
    sender_id: u32,
    data: &Data,
) -> GatewayResult<Vec<u8>> {
    let plaintext = data.encode_to_vec();
    transform(channel_key, packet_id, sender_id, &plaintext)
}

/// Return a decoded copy of an encrypted packet; the input is left untouched.
pub fn decrypt_packet(packet: &MeshPacket, channel_key: &str) -> GatewayResult<MeshPacket> {
    let ciphertext = mesh::encrypted(packet)
        .ok_or_else(|| GatewayError::Decrypt("packet has no encrypted payload".into()))?;
    let data = decrypt(channel_key, packet.id, packet.from, ciphertext)?;
    let mut out = packet.clone();
    out.payload_variant = Some(PayloadVariant::Decoded(data));
    Ok(out)
}
