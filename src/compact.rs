// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! COMPACT telegram decoder.
//!
//! COMPACT is the fixed-layout binary encoding of scan-segment telegrams.
//! All multi-byte fields are little-endian.
//!
//! # Telegram Structure
//!
//! ```text
//! | Header | Module 0 | Module 1 | ... | CRC |
//! 0        32
//! ```
//!
//! ## Header - 32 bytes
//! - Start of frame: 0x02 0x02 0x02 0x02
//! - Command id: u32 (1 for measurement data)
//! - Telegram counter: u64
//! - Timestamp transmit: u64, microseconds
//! - Version: u32, must be 4
//! - Size of module 0: u32
//!
//! ## Module - variable size
//! Metadata (36 + 28 × lines bytes): segment counter, frame number, sender
//! id, line/beam/echo counts, per-line timestamps and angles, distance
//! scaling factor, the size of the *next* module (0 terminates the chain)
//! and the channel presence bitfields. The measurement block follows,
//! channel-blocked per line: distances per echo, RSSIs per echo, beam
//! properties, azimuth angles.
//!
//! The CRC covers everything from the start-of-frame sequence through the
//! last module.

use crate::checksum::crc32;
use crate::segment::{Error, Segment, SegmentDecoder};
use serde::Serialize;

/// Start of frame byte sequence
const START_OF_FRAME: [u8; 4] = [0x02, 0x02, 0x02, 0x02];

/// Header size in bytes
const HEADER_SIZE: usize = 32;

/// Fixed leading portion of the module metadata (six u32 counters)
const MODULE_PREFIX_SIZE: usize = 24;

/// Per-line metadata size: two u64 timestamps and three f32 angles
const MODULE_LINE_META_SIZE: usize = 28;

/// Trailing CRC word size
const CRC_SIZE: usize = 4;

/// Supported COMPACT format version
const VERSION: u32 = 4;

/// Distance channel present in the per-echo data
const MASK_DISTANCE: u8 = 0x01;

/// RSSI channel present in the per-echo data
const MASK_RSSI: u8 = 0x02;

/// Beam property channel present in the per-beam data
const MASK_PROPERTIES: u8 = 0x01;

/// Azimuth angle channel present in the per-beam data
const MASK_THETA: u8 = 0x02;

/// Channel presence flags, decoded once from the two content bitfields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChannelContent {
    /// Per-echo distance channel present
    pub distance: bool,
    /// Per-echo RSSI channel present
    pub rssi: bool,
    /// Per-beam property channel present
    pub properties: bool,
    /// Per-beam azimuth channel present
    pub theta: bool,
}

impl ChannelContent {
    /// Decode the `data_content_echos` and `data_content_beams` bitfields.
    pub fn from_bits(echos: u8, beams: u8) -> Self {
        Self {
            distance: echos & MASK_DISTANCE != 0,
            rssi: echos & MASK_RSSI != 0,
            properties: beams & MASK_PROPERTIES != 0,
            theta: beams & MASK_THETA != 0,
        }
    }
}

/// Measurement data of one scan line.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LineData {
    /// Distances in millimetres, `[echo][beam]`. Raw u16 values multiplied
    /// by the module's distance scaling factor.
    pub distance: Vec<Vec<f32>>,
    /// RSSI intensities, `[echo][beam]`. Raw counts, never scaled.
    pub rssi: Vec<Vec<u16>>,
    /// Azimuth angle per beam in radians. Empty when the channel is absent.
    pub channel_theta: Vec<f32>,
    /// Property flags per beam. Empty when the channel is absent.
    pub properties: Vec<u8>,
}

/// One module: a strip of scan lines sharing geometry metadata.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Module {
    /// Index of the segment within its frame
    pub segment_counter: u32,
    /// Frame id shared by all segments of one rotation
    pub frame_number: u32,
    /// Sensor identifier
    pub sender_id: u32,
    /// Number of scan lines bundled in this module
    pub lines_in_module: u32,
    /// Number of beams per scan line
    pub beams_per_scan: u32,
    /// Number of echoes per beam
    pub echos_per_beam: u32,
    /// Line start timestamps in microseconds, one per line
    pub timestamp_start: Vec<u64>,
    /// Line stop timestamps in microseconds, one per line
    pub timestamp_stop: Vec<u64>,
    /// Elevation angle in radians, one per line
    pub phi: Vec<f32>,
    /// Azimuth start angle in radians, one per line
    pub theta_start: Vec<f32>,
    /// Azimuth stop angle in radians, one per line
    pub theta_stop: Vec<f32>,
    /// Raw distance to millimetre conversion factor, kept for auditability
    pub distance_scaling_factor: f32,
    /// Which channels the measurement block carries
    pub content: ChannelContent,
    /// Measurement data, one entry per line
    pub segment_data: Vec<LineData>,
}

/// One decoded COMPACT telegram.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompactSegment {
    /// Command id from the header (1 for measurement data)
    pub command_id: u32,
    /// Monotonic sender-side telegram counter
    pub telegram_counter: u64,
    /// Sender-local transmit time in microseconds
    pub timestamp_transmit: u64,
    /// Format version, always 4
    pub version: u32,
    /// Modules carried by this segment, at least one
    pub modules: Vec<Module>,
}

impl Segment for CompactSegment {
    fn frame_number(&self) -> u32 {
        self.modules.first().map_or(0, |m| m.frame_number)
    }

    fn segment_counter(&self) -> u32 {
        self.modules.first().map_or(0, |m| m.segment_counter)
    }

    fn telegram_counter(&self) -> u64 {
        self.telegram_counter
    }
}

/// COMPACT telegram decoder for use with the generic receiver.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompactDecoder;

impl SegmentDecoder for CompactDecoder {
    type Output = CompactSegment;

    fn decode(&self, telegram: &[u8]) -> Result<CompactSegment, Error> {
        parse_segment(telegram)
    }
}

/// Decode one complete COMPACT telegram including the trailing CRC word.
pub fn parse_segment(data: &[u8]) -> Result<CompactSegment, Error> {
    if data.len() < HEADER_SIZE + CRC_SIZE {
        return Err(Error::MalformedTelegram(format!(
            "telegram too short: {} bytes",
            data.len()
        )));
    }

    if data[0..4] != START_OF_FRAME {
        return Err(Error::MalformedTelegram(
            "missing start of frame sequence".to_string(),
        ));
    }

    // CRC covers everything except the trailing CRC word itself.
    let covered = &data[..data.len() - CRC_SIZE];
    let expected = read_u32(&data[data.len() - CRC_SIZE..], 0);
    let computed = crc32(covered);
    if expected != computed {
        return Err(Error::CrcMismatch { expected, computed });
    }

    let command_id = read_u32(covered, 4);
    let telegram_counter = read_u64(covered, 8);
    let timestamp_transmit = read_u64(covered, 16);
    let version = read_u32(covered, 24);
    let size_module_0 = read_u32(covered, 28);

    if version != VERSION {
        return Err(Error::UnsupportedVersion(version));
    }

    let mut modules = Vec::new();
    let mut offset = HEADER_SIZE;
    let mut module_size = size_module_0 as usize;

    while module_size > 0 {
        let end = offset.checked_add(module_size).ok_or_else(|| {
            Error::MalformedTelegram("module size overflows telegram".to_string())
        })?;
        if end > covered.len() {
            return Err(Error::MalformedTelegram(format!(
                "module of {} bytes at offset {} exceeds telegram length {}",
                module_size,
                offset,
                covered.len()
            )));
        }

        let (module, next_module_size) = parse_module(&covered[offset..end])?;
        modules.push(module);
        offset = end;
        module_size = next_module_size as usize;
    }

    if modules.is_empty() {
        return Err(Error::MalformedTelegram(
            "telegram carries no modules".to_string(),
        ));
    }

    if offset != covered.len() {
        return Err(Error::MalformedTelegram(format!(
            "declared module sizes end at {} but telegram payload is {} bytes",
            offset,
            covered.len()
        )));
    }

    Ok(CompactSegment {
        command_id,
        telegram_counter,
        timestamp_transmit,
        version,
        modules,
    })
}

/// Parse one module from its exact byte slice. Returns the module and the
/// declared size of the following module (0 for the last).
fn parse_module(data: &[u8]) -> Result<(Module, u32), Error> {
    if data.len() < MODULE_PREFIX_SIZE {
        return Err(Error::MalformedTelegram(format!(
            "module too short for metadata prefix: {} bytes",
            data.len()
        )));
    }

    let segment_counter = read_u32(data, 0);
    let frame_number = read_u32(data, 4);
    let sender_id = read_u32(data, 8);
    let lines_in_module = read_u32(data, 12);
    let beams_per_scan = read_u32(data, 16);
    let echos_per_beam = read_u32(data, 20);

    if lines_in_module == 0 || beams_per_scan == 0 || echos_per_beam == 0 {
        return Err(Error::MalformedTelegram(format!(
            "impossible module dimensions: {} lines, {} beams, {} echos",
            lines_in_module, beams_per_scan, echos_per_beam
        )));
    }

    let lines = lines_in_module as usize;
    let meta_size = MODULE_PREFIX_SIZE
        .checked_add(lines.checked_mul(MODULE_LINE_META_SIZE).ok_or_else(dims_overflow)?)
        .and_then(|n| n.checked_add(12))
        .ok_or_else(dims_overflow)?;
    if data.len() < meta_size {
        return Err(Error::MalformedTelegram(format!(
            "module of {} bytes too short for metadata of {} lines",
            data.len(),
            lines
        )));
    }

    let mut offset = MODULE_PREFIX_SIZE;
    let timestamp_start = read_u64_array(data, offset, lines);
    offset += 8 * lines;
    let timestamp_stop = read_u64_array(data, offset, lines);
    offset += 8 * lines;
    let phi = read_f32_array(data, offset, lines);
    offset += 4 * lines;
    let theta_start = read_f32_array(data, offset, lines);
    offset += 4 * lines;
    let theta_stop = read_f32_array(data, offset, lines);
    offset += 4 * lines;

    let distance_scaling_factor = read_f32(data, offset);
    let next_module_size = read_u32(data, offset + 4);
    let data_content_echos = data[offset + 9];
    let data_content_beams = data[offset + 10];
    offset += 12;

    let content = ChannelContent::from_bits(data_content_echos, data_content_beams);
    if !content.distance {
        return Err(Error::MalformedTelegram(
            "module carries no distance channel".to_string(),
        ));
    }

    let beams = beams_per_scan as usize;
    let echos = echos_per_beam as usize;

    // Bytes per line: distances and RSSIs are u16 per beam per echo, the
    // azimuth channel u16 per beam, the property channel u8 per beam.
    let echo_words = echos.checked_mul(beams).ok_or_else(dims_overflow)?;
    let mut line_size = echo_words.checked_mul(2).ok_or_else(dims_overflow)?;
    if content.rssi {
        line_size = line_size.checked_mul(2).ok_or_else(dims_overflow)?;
    }
    if content.properties {
        line_size = line_size.checked_add(beams).ok_or_else(dims_overflow)?;
    }
    if content.theta {
        line_size = line_size.checked_add(2 * beams).ok_or_else(dims_overflow)?;
    }

    let expected_len = lines
        .checked_mul(line_size)
        .and_then(|n| n.checked_add(meta_size))
        .ok_or_else(dims_overflow)?;
    if expected_len != data.len() {
        return Err(Error::MalformedTelegram(format!(
            "module declares {} bytes but metadata and {} lines of beam data need {}",
            data.len(),
            lines,
            expected_len
        )));
    }

    let mut segment_data = Vec::with_capacity(lines);
    for _ in 0..lines {
        let mut line = LineData::default();

        for _ in 0..echos {
            let raw = read_u16_array(data, offset, beams);
            offset += 2 * beams;
            line.distance.push(
                raw.iter()
                    .map(|&v| v as f32 * distance_scaling_factor)
                    .collect(),
            );
        }

        if content.rssi {
            for _ in 0..echos {
                line.rssi.push(read_u16_array(data, offset, beams));
                offset += 2 * beams;
            }
        }

        // Beam properties precede the azimuth block in the byte stream.
        if content.properties {
            line.properties = data[offset..offset + beams].to_vec();
            offset += beams;
        }

        if content.theta {
            line.channel_theta = (0..beams)
                .map(|b| half_to_f32(read_u16(data, offset + 2 * b)))
                .collect();
            offset += 2 * beams;
        }

        segment_data.push(line);
    }

    let module = Module {
        segment_counter,
        frame_number,
        sender_id,
        lines_in_module,
        beams_per_scan,
        echos_per_beam,
        timestamp_start,
        timestamp_stop,
        phi,
        theta_start,
        theta_stop,
        distance_scaling_factor,
        content,
        segment_data,
    };

    Ok((module, next_module_size))
}

fn dims_overflow() -> Error {
    Error::MalformedTelegram("module dimensions overflow".to_string())
}

/// Convert an IEEE 754 binary16 bit pattern to f32.
///
/// Sign bit, 5-bit exponent with bias 15, 10-bit mantissa. Subnormals,
/// infinities and NaN are mapped to their f32 counterparts.
pub(crate) fn half_to_f32(bits: u16) -> f32 {
    let sign = u32::from(bits >> 15) << 31;
    let exponent = (bits >> 10) & 0x1F;
    let mantissa = u32::from(bits & 0x3FF);

    match exponent {
        // Subnormal: mantissa counts steps of 2^-24
        0 => {
            let magnitude = mantissa as f32 * 2.0f32.powi(-24);
            f32::from_bits(sign | magnitude.to_bits())
        }
        0x1F => {
            if mantissa != 0 {
                f32::NAN
            } else {
                f32::from_bits(sign | 0x7F80_0000)
            }
        }
        // Rebias the exponent from 15 to 127 and widen the mantissa
        _ => f32::from_bits(sign | (u32::from(exponent) + 112) << 23 | mantissa << 13),
    }
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

fn read_f32(data: &[u8], offset: usize) -> f32 {
    f32::from_bits(read_u32(data, offset))
}

fn read_u16_array(data: &[u8], offset: usize, count: usize) -> Vec<u16> {
    (0..count).map(|i| read_u16(data, offset + 2 * i)).collect()
}

fn read_u64_array(data: &[u8], offset: usize, count: usize) -> Vec<u64> {
    (0..count).map(|i| read_u64(data, offset + 8 * i)).collect()
}

fn read_f32_array(data: &[u8], offset: usize, count: usize) -> Vec<f32> {
    (0..count).map(|i| read_f32(data, offset + 4 * i)).collect()
}
