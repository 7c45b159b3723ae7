//! # CRC-32 Implementation
//!
//! CRC-32/ISO-HDLC checksum over the snapshot payload, used to detect torn
//! reads of the shared region.
//!
//! **Polynomial**: 0xEDB88320 (reflected 0x04C11DB7)
//! **Initial Value**: 0xFFFFFFFF
//! **Final XOR**: 0xFFFFFFFF

/// CRC-32 polynomial (reflected form)
const CRC32_POLY: u32 = 0xEDB8_8320;

/// Precomputed CRC32 lookup table for fast calculation
const CRC32_TABLE: [u32; 256] = generate_crc32_table();

/// Generate CRC32 lookup table at compile time
const fn generate_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;

        while j < 8 {
            if (crc & 1) != 0 {
                crc = (crc >> 1) ^ CRC32_POLY;
            } else {
                crc >>= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Calculate CRC-32 checksum using lookup table
///
/// # Examples
///
/// ```
/// use swarm_flock::snapshot::crc::crc32;
///
/// assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
/// ```
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;

    for &byte in data {
        crc = CRC32_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
    }

    crc ^ 0xFFFF_FFFF
}

/// Bitwise CRC-32 (slow, for verifying the table)
#[cfg(test)]
fn crc32_slow(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;

    for &byte in data {
        crc ^= byte as u32;

        for _ in 0..8 {
            if (crc & 1) != 0 {
                crc = (crc >> 1) ^ CRC32_POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc ^ 0xFFFF_FFFF
}
