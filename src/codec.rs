//! Encoding of stored statistics blobs.
//!
//! Current rows hold base64 over a zlib stream, where every compressed byte
//! was widened to one UTF-8 code point before base64 (the historical writer
//! produced a "binary string"). Legacy rows hold the plain JSON text.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::stats::StatisticsPayload;

/// Budget for a run-stats blob in `bgs_single_run_stats`.
pub const MAX_RUN_STATS_LENGTH: usize = 51_000;

/// Serialize, deflate and base64 a value.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value).context("Failed to serialize payload")?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let deflated = encoder.finish().context("Failed to deflate payload")?;
    Ok(STANDARD.encode(widen(&deflated)))
}

/// Encode run stats, dropping all but the final board when the blob would
/// not fit `max_encoded_length`. The truncated result is returned as is,
/// even if it is still over budget.
pub fn compress_payload(stats: &StatisticsPayload, max_encoded_length: usize) -> Result<String> {
    let encoded = encode(stats)?;
    if encoded.len() <= max_encoded_length {
        return Ok(encoded);
    }

    warn!(
        length = encoded.len(),
        budget = max_encoded_length,
        turns = stats.board_history.len(),
        "stats too big, keeping only the final board"
    );
    encode(&stats.with_final_board_only())
}

/// How a stored blob was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    PlainJson,
    DeflateBase64,
}

impl PayloadEncoding {
    /// Strategies are tried in this order.
    pub const DECODE_ORDER: [PayloadEncoding; 2] =
        [PayloadEncoding::PlainJson, PayloadEncoding::DeflateBase64];

    pub fn try_decode<T: DeserializeOwned>(self, blob: &str) -> Option<T> {
        match self {
            PayloadEncoding::PlainJson => serde_json::from_str(blob).ok(),
            PayloadEncoding::DeflateBase64 => {
                let raw = STANDARD.decode(blob.trim()).ok()?;
                let deflated = narrow(&raw).unwrap_or(raw);
                let mut json = String::new();
                ZlibDecoder::new(deflated.as_slice())
                    .read_to_string(&mut json)
                    .ok()?;
                serde_json::from_str(&json).ok()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Ok { value: T, encoding: PayloadEncoding },
    Unparseable,
}

impl<T> Decoded<T> {
    pub fn into_value(self) -> Option<T> {
        match self {
            Decoded::Ok { value, .. } => Some(value),
            Decoded::Unparseable => None,
        }
    }
}

pub fn decode<T: DeserializeOwned>(blob: &str) -> Decoded<T> {
    PayloadEncoding::DECODE_ORDER
        .into_iter()
        .find_map(|encoding| {
            encoding
                .try_decode(blob)
                .map(|value| Decoded::Ok { value, encoding })
        })
        .unwrap_or(Decoded::Unparseable)
}

fn widen(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .map(|&b| char::from(b))
        .collect::<String>()
        .into_bytes()
}

/// Inverse of `widen`. `None` when the bytes are not a widened stream.
fn narrow(bytes: &[u8]) -> Option<Vec<u8>> {
    std::str::from_utf8(bytes)
        .ok()?
        .chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect()
}
