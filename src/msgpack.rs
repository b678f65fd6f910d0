// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! MSGPACK telegram decoder.
//!
//! MSGPACK is the self-describing encoding of scan-segment telegrams: a
//! MessagePack map keyed by small integers, followed by a 4-byte CRC over
//! the map bytes. Sensors in the field emit both integer-keyed and
//! string-keyed maps, so every key is resolved through one fixed lookup
//! table accepting either form.
//!
//! # Key Table
//!
//! Segment level: `data` (1, outer), `TelegramCounter` (2),
//! `TimestampTransmit` (3), `SegmentCounter` (4), `FrameNumber` (5),
//! `SenderId` (6), `SegmentData` (7), `LayerId` (8), `Availability` (9).
//!
//! Scan level: `TimestampStart` (20), `TimestampStop` (21), `ThetaStart`
//! (22), `ThetaStop` (23), `Phi` (24), `Distance` (25), `Rssi` (26),
//! `Properties` (27), `ChannelTheta` (28), `BeamCount` (29), `EchoCount`
//! (30), `ScanNumber` (31), `ModuleID` (32).
//!
//! Channel payloads are little-endian binary blobs: f32 for distances
//! (millimetres) and azimuth angles (radians), u16 for RSSI, u8 for beam
//! properties. Distances arrive as one blob per echo.

use crate::checksum::crc32;
use crate::segment::{Error, Segment, SegmentDecoder};
use rmpv::Value;
use serde::Serialize;

/// Trailing CRC word size
const CRC_SIZE: usize = 4;

/// Keys of the telegram maps, shared between both key encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Key {
    Data,
    TelegramCounter,
    TimestampTransmit,
    SegmentCounter,
    FrameNumber,
    SenderId,
    SegmentData,
    LayerId,
    Availability,
    TimestampStart,
    TimestampStop,
    ThetaStart,
    ThetaStop,
    Phi,
    Distance,
    Rssi,
    Properties,
    ChannelTheta,
    BeamCount,
    EchoCount,
    ScanNumber,
    ModuleId,
}

/// Fixed lookup table mapping integer and string key forms to [`Key`].
const KEY_TABLE: &[(Key, u64, &str)] = &[
    (Key::Data, 1, "data"),
    (Key::TelegramCounter, 2, "TelegramCounter"),
    (Key::TimestampTransmit, 3, "TimestampTransmit"),
    (Key::SegmentCounter, 4, "SegmentCounter"),
    (Key::FrameNumber, 5, "FrameNumber"),
    (Key::SenderId, 6, "SenderId"),
    (Key::SegmentData, 7, "SegmentData"),
    (Key::LayerId, 8, "LayerId"),
    (Key::Availability, 9, "Availability"),
    (Key::TimestampStart, 20, "TimestampStart"),
    (Key::TimestampStop, 21, "TimestampStop"),
    (Key::ThetaStart, 22, "ThetaStart"),
    (Key::ThetaStop, 23, "ThetaStop"),
    (Key::Phi, 24, "Phi"),
    (Key::Distance, 25, "Distance"),
    (Key::Rssi, 26, "Rssi"),
    (Key::Properties, 27, "Properties"),
    (Key::ChannelTheta, 28, "ChannelTheta"),
    (Key::BeamCount, 29, "BeamCount"),
    (Key::EchoCount, 30, "EchoCount"),
    (Key::ScanNumber, 31, "ScanNumber"),
    (Key::ModuleId, 32, "ModuleID"),
];

fn lookup_key(value: &Value) -> Option<Key> {
    match value {
        Value::Integer(n) => {
            let n = n.as_u64()?;
            KEY_TABLE.iter().find(|e| e.1 == n).map(|e| e.0)
        }
        Value::String(s) => {
            let s = s.as_str()?;
            KEY_TABLE.iter().find(|e| e.2 == s).map(|e| e.0)
        }
        _ => None,
    }
}

/// One scan line of a MSGPACK segment.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Scan {
    /// Line start timestamp in microseconds
    pub timestamp_start: u64,
    /// Line stop timestamp in microseconds
    pub timestamp_stop: u64,
    /// Azimuth start angle in radians
    pub theta_start: f32,
    /// Azimuth stop angle in radians
    pub theta_stop: f32,
    /// Elevation angle of this line in radians
    pub phi: f32,
    /// Scan sequence number
    pub scan_number: u32,
    /// Module the line belongs to
    pub module_id: u32,
    /// Number of beams per line
    pub beam_count: u32,
    /// Number of echoes per beam
    pub echo_count: u32,
    /// Distances in millimetres, `[echo][beam]`
    pub distance: Vec<Vec<f32>>,
    /// RSSI intensities, `[echo][beam]`
    pub rssi: Vec<Vec<u16>>,
    /// Property flags per beam, when the sensor reports them
    pub properties: Option<Vec<u8>>,
    /// Azimuth angle per beam in radians
    pub channel_theta: Vec<f32>,
}

/// One decoded MSGPACK telegram.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MsgpackSegment {
    /// Monotonic sender-side telegram counter
    pub telegram_counter: u64,
    /// Sender-local transmit time in microseconds
    pub timestamp_transmit: u64,
    /// Index of the segment within its frame
    pub segment_counter: u32,
    /// Frame id shared by all segments of one rotation
    pub frame_number: u32,
    /// Sensor identifier
    pub sender_id: u32,
    /// Availability flag
    pub availability: bool,
    /// Layer ids covered by this segment, empty when not reported
    pub layer_id: Vec<u32>,
    /// Scan lines, at least one
    pub scans: Vec<Scan>,
}

impl Segment for MsgpackSegment {
    fn frame_number(&self) -> u32 {
        self.frame_number
    }

    fn segment_counter(&self) -> u32 {
        self.segment_counter
    }

    fn telegram_counter(&self) -> u64 {
        self.telegram_counter
    }
}

/// MSGPACK telegram decoder for use with the generic receiver.
#[derive(Clone, Copy, Debug, Default)]
pub struct MsgpackDecoder;

impl SegmentDecoder for MsgpackDecoder {
    type Output = MsgpackSegment;

    fn decode(&self, telegram: &[u8]) -> Result<MsgpackSegment, Error> {
        parse_segment(telegram)
    }
}

/// Decode one complete MSGPACK telegram: map body plus trailing CRC word.
pub fn parse_segment(telegram: &[u8]) -> Result<MsgpackSegment, Error> {
    if telegram.len() <= CRC_SIZE {
        return Err(Error::MalformedTelegram(format!(
            "telegram too short: {} bytes",
            telegram.len()
        )));
    }

    let (body, crc_bytes) = telegram.split_at(telegram.len() - CRC_SIZE);
    let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let computed = crc32(body);
    if expected != computed {
        return Err(Error::CrcMismatch { expected, computed });
    }

    let value = rmpv::decode::read_value(&mut &body[..])
        .map_err(|err| Error::MalformedTelegram(format!("invalid msgpack: {}", err)))?;

    let outer = match &value {
        Value::Map(entries) => entries,
        other => {
            return Err(Error::MalformedTelegram(format!(
                "outer value is not a map: {}",
                type_name(other)
            )))
        }
    };
    if outer.len() != 1 || lookup_key(&outer[0].0) != Some(Key::Data) {
        return Err(Error::MalformedTelegram(
            "outer map must have the single data entry".to_string(),
        ));
    }

    let fields = match &outer[0].1 {
        Value::Map(entries) => entries,
        other => {
            return Err(Error::MalformedTelegram(format!(
                "segment entry is not a map: {}",
                type_name(other)
            )))
        }
    };

    let mut telegram_counter = None;
    let mut timestamp_transmit = None;
    let mut segment_counter = None;
    let mut frame_number = None;
    let mut sender_id = None;
    let mut availability = false;
    let mut layer_id = Vec::new();
    let mut segment_data = None;

    for (key, value) in fields {
        match lookup_key(key) {
            Some(Key::TelegramCounter) => {
                telegram_counter = Some(as_u64(value, "TelegramCounter")?)
            }
            Some(Key::TimestampTransmit) => {
                timestamp_transmit = Some(as_u64(value, "TimestampTransmit")?)
            }
            Some(Key::SegmentCounter) => segment_counter = Some(as_u32(value, "SegmentCounter")?),
            Some(Key::FrameNumber) => frame_number = Some(as_u32(value, "FrameNumber")?),
            Some(Key::SenderId) => sender_id = Some(as_u32(value, "SenderId")?),
            Some(Key::Availability) => availability = as_bool(value, "Availability")?,
            Some(Key::LayerId) => layer_id = as_u32_array(value, "LayerId")?,
            Some(Key::SegmentData) => segment_data = Some(value),
            _ => {}
        }
    }

    let scans_raw = match segment_data.ok_or(Error::MissingField("SegmentData"))? {
        Value::Array(scans) => scans,
        other => {
            return Err(Error::TypeMismatch(format!(
                "SegmentData must be an array, got {}",
                type_name(other)
            )))
        }
    };
    if scans_raw.is_empty() {
        return Err(Error::MalformedTelegram(
            "segment carries no scans".to_string(),
        ));
    }

    let mut scans = Vec::with_capacity(scans_raw.len());
    for scan in scans_raw {
        scans.push(parse_scan(scan)?);
    }

    Ok(MsgpackSegment {
        telegram_counter: telegram_counter.ok_or(Error::MissingField("TelegramCounter"))?,
        timestamp_transmit: timestamp_transmit.ok_or(Error::MissingField("TimestampTransmit"))?,
        segment_counter: segment_counter.ok_or(Error::MissingField("SegmentCounter"))?,
        frame_number: frame_number.ok_or(Error::MissingField("FrameNumber"))?,
        sender_id: sender_id.ok_or(Error::MissingField("SenderId"))?,
        availability,
        layer_id,
        scans,
    })
}

fn parse_scan(value: &Value) -> Result<Scan, Error> {
    let fields = match value {
        Value::Map(entries) => entries,
        other => {
            return Err(Error::TypeMismatch(format!(
                "scan entry must be a map, got {}",
                type_name(other)
            )))
        }
    };

    // Collect first: the channel blobs can only be dimensioned once the
    // beam and echo counts are known.
    let mut slots: [Option<&Value>; 13] = [None; 13];
    for (key, value) in fields {
        let slot = match lookup_key(key) {
            Some(Key::TimestampStart) => 0,
            Some(Key::TimestampStop) => 1,
            Some(Key::ThetaStart) => 2,
            Some(Key::ThetaStop) => 3,
            Some(Key::Phi) => 4,
            Some(Key::Distance) => 5,
            Some(Key::Rssi) => 6,
            Some(Key::Properties) => 7,
            Some(Key::ChannelTheta) => 8,
            Some(Key::BeamCount) => 9,
            Some(Key::EchoCount) => 10,
            Some(Key::ScanNumber) => 11,
            Some(Key::ModuleId) => 12,
            _ => continue,
        };
        slots[slot] = Some(value);
    }

    let required = |slot: usize, name: &'static str| slots[slot].ok_or(Error::MissingField(name));

    let beam_count = as_u32(required(9, "BeamCount")?, "BeamCount")?;
    let echo_count = as_u32(required(10, "EchoCount")?, "EchoCount")?;
    let beams = beam_count as usize;

    let distance = echo_blobs(required(5, "Distance")?, echo_count, |blob| {
        f32_channel(blob, beams, "Distance")
    })?;
    let rssi = echo_blobs(required(6, "Rssi")?, echo_count, |blob| {
        u16_channel(blob, beams, "Rssi")
    })?;
    let channel_theta = f32_channel(
        as_bin(required(8, "ChannelTheta")?, "ChannelTheta")?,
        beams,
        "ChannelTheta",
    )?;
    let properties = match slots[7] {
        Some(value) => Some(u8_channel(as_bin(value, "Properties")?, beams, "Properties")?),
        None => None,
    };

    Ok(Scan {
        timestamp_start: as_u64(required(0, "TimestampStart")?, "TimestampStart")?,
        timestamp_stop: as_u64(required(1, "TimestampStop")?, "TimestampStop")?,
        theta_start: as_f32(required(2, "ThetaStart")?, "ThetaStart")?,
        theta_stop: as_f32(required(3, "ThetaStop")?, "ThetaStop")?,
        phi: as_f32(required(4, "Phi")?, "Phi")?,
        scan_number: as_u32(required(11, "ScanNumber")?, "ScanNumber")?,
        module_id: as_u32(required(12, "ModuleID")?, "ModuleID")?,
        beam_count,
        echo_count,
        distance,
        rssi,
        properties,
        channel_theta,
    })
}

/// Decode a per-echo channel: an array of `echo_count` binary blobs.
fn echo_blobs<T>(
    value: &Value,
    echo_count: u32,
    decode: impl Fn(&[u8]) -> Result<Vec<T>, Error>,
) -> Result<Vec<Vec<T>>, Error> {
    let blobs = match value {
        Value::Array(blobs) => blobs,
        other => {
            return Err(Error::TypeMismatch(format!(
                "echo channel must be an array of binaries, got {}",
                type_name(other)
            )))
        }
    };
    if blobs.len() != echo_count as usize {
        return Err(Error::MalformedTelegram(format!(
            "channel has {} echo blobs but EchoCount is {}",
            blobs.len(),
            echo_count
        )));
    }
    blobs
        .iter()
        .map(|blob| decode(as_bin(blob, "echo channel")?))
        .collect()
}

fn f32_channel(blob: &[u8], beams: usize, name: &str) -> Result<Vec<f32>, Error> {
    if blob.len() != 4 * beams {
        return Err(Error::MalformedTelegram(format!(
            "{} blob is {} bytes, expected {} for {} beams",
            name,
            blob.len(),
            4 * beams,
            beams
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn u16_channel(blob: &[u8], beams: usize, name: &str) -> Result<Vec<u16>, Error> {
    if blob.len() != 2 * beams {
        return Err(Error::MalformedTelegram(format!(
            "{} blob is {} bytes, expected {} for {} beams",
            name,
            blob.len(),
            2 * beams,
            beams
        )));
    }
    Ok(blob
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect())
}

fn u8_channel(blob: &[u8], beams: usize, name: &str) -> Result<Vec<u8>, Error> {
    if blob.len() != beams {
        return Err(Error::MalformedTelegram(format!(
            "{} blob is {} bytes, expected {} for {} beams",
            name,
            blob.len(),
            beams,
            beams
        )));
    }
    Ok(blob.to_vec())
}

fn as_u64(value: &Value, name: &str) -> Result<u64, Error> {
    match value {
        Value::Integer(n) => n.as_u64().ok_or_else(|| {
            Error::TypeMismatch(format!("{} must be an unsigned integer", name))
        }),
        other => Err(Error::TypeMismatch(format!(
            "{} must be an integer, got {}",
            name,
            type_name(other)
        ))),
    }
}

fn as_u32(value: &Value, name: &str) -> Result<u32, Error> {
    let n = as_u64(value, name)?;
    u32::try_from(n)
        .map_err(|_| Error::TypeMismatch(format!("{} value {} exceeds 32 bits", name, n)))
}

fn as_f32(value: &Value, name: &str) -> Result<f32, Error> {
    match value {
        Value::F32(x) => Ok(*x),
        Value::F64(x) => Ok(*x as f32),
        Value::Integer(n) => n
            .as_i64()
            .map(|n| n as f32)
            .ok_or_else(|| Error::TypeMismatch(format!("{} must be a number", name))),
        other => Err(Error::TypeMismatch(format!(
            "{} must be a float, got {}",
            name,
            type_name(other)
        ))),
    }
}

fn as_bool(value: &Value, name: &str) -> Result<bool, Error> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::Integer(n) => Ok(n.as_u64().unwrap_or(0) != 0),
        other => Err(Error::TypeMismatch(format!(
            "{} must be a boolean, got {}",
            name,
            type_name(other)
        ))),
    }
}

fn as_bin<'a>(value: &'a Value, name: &str) -> Result<&'a [u8], Error> {
    match value {
        Value::Binary(bytes) => Ok(bytes),
        other => Err(Error::TypeMismatch(format!(
            "{} must be binary data, got {}",
            name,
            type_name(other)
        ))),
    }
}

fn as_u32_array(value: &Value, name: &str) -> Result<Vec<u32>, Error> {
    match value {
        Value::Array(items) => items.iter().map(|item| as_u32(item, name)).collect(),
        other => Err(Error::TypeMismatch(format!(
            "{} must be an array, got {}",
            name,
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Boolean(_) => "boolean",
        Value::Integer(_) => "integer",
        Value::F32(_) => "f32",
        Value::F64(_) => "f64",
        Value::String(_) => "string",
        Value::Binary(_) => "binary",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        Value::Ext(..) => "ext",
    }
}


#[cfg(test)]
mod tests {
    use super::builder::{scan_value, segment_value, telegram};
    use super::*;

    #[test]
    fn test_parse_integer_keyed_telegram() {
        let data = telegram(&segment_value(true, vec![scan_value(true, true)]));
        let segment = parse_segment(&data).unwrap();

        assert_eq!(segment.telegram_counter, 1234);
        assert_eq!(segment.timestamp_transmit, 5678);
        assert_eq!(segment.segment_counter, 7);
        assert_eq!(segment.frame_number, 42);
        assert_eq!(segment.sender_id, 99);
        assert!(segment.availability);
        assert_eq!(segment.layer_id, vec![1]);
        assert_eq!(segment.scans.len(), 1);

        let scan = &segment.scans[0];
        assert_eq!(scan.beam_count, 4);
        assert_eq!(scan.echo_count, 2);
        assert_eq!(scan.timestamp_start, 1_000);
        assert_eq!(scan.timestamp_stop, 2_000);
        assert_eq!(scan.theta_start, -0.1);
        assert_eq!(scan.theta_stop, 0.1);
        assert_eq!(scan.phi, 0.05);
        assert_eq!(scan.scan_number, 3);
        assert_eq!(scan.module_id, 1);
        assert_eq!(scan.distance[0], vec![100.0, 200.0, 300.0, 400.0]);
        assert_eq!(scan.distance[1], vec![110.0, 210.0, 310.0, 410.0]);
        assert_eq!(scan.rssi[0], vec![10, 20, 30, 40]);
        assert_eq!(scan.rssi[1], vec![11, 21, 31, 41]);
        assert_eq!(scan.channel_theta, vec![-0.1, -0.03, 0.03, 0.1]);
        assert_eq!(scan.properties, Some(vec![1, 0, 1, 0]));
    }

    #[test]
    fn test_parse_string_keyed_telegram() {
        let data = telegram(&segment_value(false, vec![scan_value(false, false)]));
        let segment = parse_segment(&data).unwrap();
        assert_eq!(segment.telegram_counter, 1234);
        assert_eq!(segment.scans[0].beam_count, 4);
        assert_eq!(segment.scans[0].properties, None);
    }

    #[test]
    fn test_segment_accessors() {
        let data = telegram(&segment_value(true, vec![scan_value(true, false)]));
        let segment = parse_segment(&data).unwrap();
        assert_eq!(segment.frame_number(), 42);
        assert_eq!(segment.segment_counter(), 7);
        assert_eq!(segment.telegram_counter(), 1234);
    }

    #[test]
    fn test_corrupt_crc_rejected() {
        let mut data = telegram(&segment_value(true, vec![scan_value(true, false)]));
        let len = data.len();
        data[len - 4..].fill(0);
        assert!(matches!(parse_segment(&data), Err(Error::CrcMismatch { .. })));
    }

    #[test]
    fn test_flipped_body_byte_fails_crc() {
        let mut data = telegram(&segment_value(true, vec![scan_value(true, false)]));
        data[3] ^= 0x01;
        assert!(matches!(parse_segment(&data), Err(Error::CrcMismatch { .. })));
    }

    #[test]
    fn test_outer_shape_must_be_single_entry_map() {
        let value = Value::Map(vec![
            (Value::from(1u64), Value::Map(vec![])),
            (Value::from(2u64), Value::Map(vec![])),
        ]);
        let data = telegram(&value);
        assert!(matches!(
            parse_segment(&data),
            Err(Error::MalformedTelegram(_))
        ));

        let data = telegram(&Value::Array(vec![]));
        assert!(matches!(
            parse_segment(&data),
            Err(Error::MalformedTelegram(_))
        ));
    }

    #[test]
    fn test_missing_mandatory_field() {
        // Segment map without a TelegramCounter entry
        let fields = Value::Map(vec![
            (Value::from(3u64), Value::from(5678u64)),
            (Value::from(4u64), Value::from(7u64)),
            (Value::from(5u64), Value::from(42u64)),
            (Value::from(6u64), Value::from(99u64)),
            (
                Value::from(7u64),
                Value::Array(vec![scan_value(true, false)]),
            ),
        ]);
        let value = Value::Map(vec![(Value::from(1u64), fields)]);
        let data = telegram(&value);
        assert!(matches!(
            parse_segment(&data),
            Err(Error::MissingField("TelegramCounter"))
        ));
    }

    #[test]
    fn test_type_mismatch_reported() {
        let fields = Value::Map(vec![
            (Value::from(2u64), Value::from("not a number")),
            (Value::from(3u64), Value::from(5678u64)),
            (Value::from(4u64), Value::from(7u64)),
            (Value::from(5u64), Value::from(42u64)),
            (Value::from(6u64), Value::from(99u64)),
            (
                Value::from(7u64),
                Value::Array(vec![scan_value(true, false)]),
            ),
        ]);
        let value = Value::Map(vec![(Value::from(1u64), fields)]);
        let data = telegram(&value);
        assert!(matches!(parse_segment(&data), Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn test_empty_segment_data_rejected() {
        let data = telegram(&segment_value(true, vec![]));
        assert!(matches!(
            parse_segment(&data),
            Err(Error::MalformedTelegram(_))
        ));
    }

    #[test]
    fn test_channel_dimension_mismatch_rejected() {
        let mut scan = scan_value(true, false);
        if let Value::Map(entries) = &mut scan {
            for (key, value) in entries.iter_mut() {
                // Shrink BeamCount so the blobs no longer fit
                if matches!(key, Value::Integer(n) if n.as_u64() == Some(29)) {
                    *value = Value::from(3u64);
                }
            }
        }
        let data = telegram(&segment_value(true, vec![scan]));
        assert!(matches!(
            parse_segment(&data),
            Err(Error::MalformedTelegram(_))
        ));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let mut scan = scan_value(true, false);
        if let Value::Map(entries) = &mut scan {
            entries.push((Value::from(200u64), Value::from("future field")));
        }
        let data = telegram(&segment_value(true, vec![scan]));
        assert!(parse_segment(&data).is_ok());
    }

    #[test]
    fn test_truncated_body_rejected() {
        let data = telegram(&segment_value(true, vec![scan_value(true, false)]));
        // Recompute the CRC over the truncated body so the msgpack parser
        // itself is what trips.
        let truncated = &data[..data.len() - 5];
        let mut corrupt = truncated.to_vec();
        let crc = crate::checksum::crc32(&corrupt);
        corrupt.extend_from_slice(&crc.to_le_bytes());
        assert!(matches!(
            parse_segment(&corrupt),
            Err(Error::MalformedTelegram(_))
        ));
    }
}
