//! # Snapshot Frame Codec
//!
//! Encodes a [`SwarmSnapshot`] into the fixed-capacity shared buffer and back.
//!
//! ## Layout
//!
//! ```text
//! +----------------+------+---------+---------+-----------+-----------------+
//! | JSON payload   | 0x00 | version | seq     | crc32     | 0x00 padding    |
//! | (UTF-8, N)     |  (1) |   (1)   | (4, LE) | (4, LE)   | to capacity     |
//! +----------------+------+---------+---------+-----------+-----------------+
//! ```
//!
//! A reader that only looks for the first NUL and decodes the prefix still
//! sees a plain `{ vehicle_id: entry, ... }` JSON object. Readers that know
//! about the trailer verify the CRC and so detect torn reads instead of
//! relying on the JSON failing to parse. A zero version byte marks a frame
//! written without a trailer, which is decoded unverified.

use super::crc::crc32;
use crate::error::{Result, SwarmError};
use crate::telemetry::state::SwarmSnapshot;

/// Default shared buffer capacity in bytes
pub const DEFAULT_CAPACITY: usize = 4096;

/// Payload terminator
pub const FRAME_TERMINATOR: u8 = 0x00;

/// Current trailer version
pub const FRAME_VERSION: u8 = 1;

/// Trailer size: version(1) + seq(4) + crc(4)
pub const TRAILER_SIZE: usize = 9;

/// Bytes a frame needs beyond its payload
pub const FRAME_OVERHEAD: usize = 1 + TRAILER_SIZE;

/// A decoded shared buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub snapshot: SwarmSnapshot,
    /// Sequence number, `None` for frames without a trailer
    pub seq: Option<u32>,
}

/// Serialize a snapshot to its JSON payload
pub fn encode_payload(snapshot: &SwarmSnapshot) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(snapshot)?)
}

/// Parse a JSON payload; an empty payload is an empty snapshot
pub fn decode_payload(payload: &[u8]) -> Result<SwarmSnapshot> {
    if payload.is_empty() {
        return Ok(SwarmSnapshot::new());
    }

    let text = std::str::from_utf8(payload)
        .map_err(|e| SwarmError::Decode(format!("Payload is not UTF-8: {}", e)))?;

    serde_json::from_str(text)
        .map_err(|e| SwarmError::Decode(format!("Payload is not a snapshot: {}", e)))
}

/// Encode a complete frame padded to `capacity`
///
/// # Arguments
///
/// * `snapshot` - Swarm snapshot to write
/// * `seq` - Sequence number stored in the trailer
/// * `capacity` - Size of the shared buffer
///
/// # Returns
///
/// * `Result<Vec<u8>>` - Exactly `capacity` bytes
///
/// # Errors
///
/// Returns `CapacityExceeded` if payload, terminator and trailer do not fit
///
/// # Examples
///
/// ```
/// use swarm_flock::snapshot::frame::{decode_frame, encode_frame};
/// use swarm_flock::telemetry::state::{SwarmSnapshot, VehicleState};
///
/// let mut snapshot = SwarmSnapshot::new();
/// snapshot.insert("1".to_string(), VehicleState::default());
///
/// let buf = encode_frame(&snapshot, 7, 4096)?;
/// assert_eq!(buf.len(), 4096);
///
/// let frame = decode_frame(&buf)?;
/// assert_eq!(frame.snapshot, snapshot);
/// assert_eq!(frame.seq, Some(7));
/// # Ok::<(), swarm_flock::error::SwarmError>(())
/// ```
pub fn encode_frame(snapshot: &SwarmSnapshot, seq: u32, capacity: usize) -> Result<Vec<u8>> {
    let payload = encode_payload(snapshot)?;
    let size = payload.len() + FRAME_OVERHEAD;

    if size > capacity {
        return Err(SwarmError::CapacityExceeded { size, capacity });
    }

    let mut buf = vec![0u8; capacity];
    let len = payload.len();
    buf[..len].copy_from_slice(&payload);
    buf[len] = FRAME_TERMINATOR;
    buf[len + 1] = FRAME_VERSION;
    buf[len + 2..len + 6].copy_from_slice(&seq.to_le_bytes());
    buf[len + 6..len + 10].copy_from_slice(&crc32(&payload).to_le_bytes());

    Ok(buf)
}

/// Decode a shared buffer
///
/// The payload runs up to the first NUL, or the whole buffer if there is none.
///
/// # Errors
///
/// Returns `Decode` if:
/// - The trailer CRC does not match the payload (torn read)
/// - The trailer version is unknown
/// - The payload is not UTF-8 JSON of the snapshot shape
pub fn decode_frame(buf: &[u8]) -> Result<Frame> {
    let Some(end) = buf.iter().position(|&b| b == FRAME_TERMINATOR) else {
        return Ok(Frame { snapshot: decode_payload(buf)?, seq: None });
    };

    let payload = &buf[..end];
    let trailer = &buf[end + 1..];

    if trailer.len() < TRAILER_SIZE || trailer[0] == 0 {
        return Ok(Frame { snapshot: decode_payload(payload)?, seq: None });
    }

    if trailer[0] != FRAME_VERSION {
        return Err(SwarmError::Decode(format!(
            "Unsupported frame version: {}",
            trailer[0]
        )));
    }

    let seq = u32::from_le_bytes([trailer[1], trailer[2], trailer[3], trailer[4]]);
    let expected_crc = u32::from_le_bytes([trailer[5], trailer[6], trailer[7], trailer[8]]);
    let actual_crc = crc32(payload);

    if actual_crc != expected_crc {
        return Err(SwarmError::Decode(format!(
            "CRC mismatch: expected 0x{:08X}, got 0x{:08X}",
            expected_crc, actual_crc
        )));
    }

    Ok(Frame { snapshot: decode_payload(payload)?, seq: Some(seq) })
}

/// Sequence number of a buffer without decoding its payload
pub fn peek_seq(buf: &[u8]) -> Option<u32> {
    let end = buf.iter().position(|&b| b == FRAME_TERMINATOR)?;
    let trailer = buf.get(end + 1..end + 1 + TRAILER_SIZE)?;
    if trailer[0] != FRAME_VERSION {
        return None;
    }
    Some(u32::from_le_bytes([trailer[1], trailer[2], trailer[3], trailer[4]]))
}
