// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! CRC-32 integrity check shared by both telegram encodings.
//!
//! The sensors append a CRC-32/MPEG-2 word (polynomial 0x04C11DB7, initial
//! value 0xFFFFFFFF, no reflection, no final XOR) in little-endian byte
//! order. Both the COMPACT and MSGPACK decoders verify it over their
//! covered region before parsing.

use crc::{Crc, CRC_32_MPEG_2};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Compute the CRC-32/MPEG-2 checksum of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        // Standard check value for CRC-32/MPEG-2
        assert_eq!(crc32(b"123456789"), 0x0376E6E7);
    }

    #[test]
    fn test_empty_is_initial_value() {
        assert_eq!(crc32(&[]), 0xFFFFFFFF);
    }

    #[test]
    fn test_single_byte_flip_changes_crc() {
        let data = b"scan segment telegram payload";
        let reference = crc32(data);
        for i in 0..data.len() {
            let mut corrupted = data.to_vec();
            corrupted[i] ^= 0x01;
            assert_ne!(crc32(&corrupted), reference, "flip at byte {}", i);
        }
    }

    #[test]
    fn test_incremental_matches_oneshot() {
        let data = b"0123456789abcdef";
        let mut digest = CRC32.digest();
        digest.update(&data[..7]);
        digest.update(&data[7..]);
        assert_eq!(digest.finalize(), crc32(data));
    }
}
