// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Common types shared across both telegram encodings.
//!
//! This module provides the crate-wide error type, the telegram format
//! selector used by the CLI, and the traits that bind the two decoders to
//! the generic receiver.

use clap::ValueEnum;
use std::fmt;

/// Common error type for telegram reception and decoding.
///
/// This enum consolidates the observable failure kinds of both decoders,
/// both transports and the receiver into a single error type.
#[derive(Debug)]
pub enum Error {
    /// I/O error (socket, file operations)
    Io(std::io::Error),
    /// Socket ended or was closed while a telegram was still incomplete
    TransportClosed,
    /// Bad magic, truncated body, or impossible field dimensions
    MalformedTelegram(String),
    /// COMPACT telegram version other than 4
    UnsupportedVersion(u32),
    /// Computed CRC does not match the trailing CRC word
    CrcMismatch { expected: u32, computed: u32 },
    /// Mandatory MSGPACK key absent
    MissingField(&'static str),
    /// MSGPACK value type contradicts its schema
    TypeMismatch(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::TransportClosed => write!(f, "transport closed mid-telegram"),
            Error::MalformedTelegram(msg) => write!(f, "malformed telegram: {}", msg),
            Error::UnsupportedVersion(version) => {
                write!(f, "unsupported telegram version: {}", version)
            }
            Error::CrcMismatch { expected, computed } => write!(
                f,
                "CRC mismatch: expected {:08X}, computed {:08X}",
                expected, computed
            ),
            Error::MissingField(key) => write!(f, "missing mandatory field: {}", key),
            Error::TypeMismatch(msg) => write!(f, "type mismatch: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

/// Telegram encoding for CLI dispatch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Self-describing map encoding
    #[default]
    Msgpack,
    /// Fixed-layout binary encoding
    Compact,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Format::Msgpack => write!(f, "msgpack"),
            Format::Compact => write!(f, "compact"),
        }
    }
}

/// Accessors common to decoded segments of either encoding.
///
/// The receiver uses these to build its parallel arrays of frame numbers
/// and segment counters without knowing the concrete segment type.
pub trait Segment {
    /// Frame id shared by all segments of one scan rotation.
    fn frame_number(&self) -> u32;

    /// Index of this segment within its frame; wraps at the configured
    /// segment count.
    fn segment_counter(&self) -> u32;

    /// Monotonic sender-side telegram counter; may wrap, never resets
    /// across frames.
    fn telegram_counter(&self) -> u64;
}

/// Decoder seam between telegram byte-blobs and structured segments.
///
/// Implementations are pure: one whole telegram in, one segment out, no
/// state carried between calls.
pub trait SegmentDecoder: Send {
    type Output: Segment + Send;

    /// Decode one complete telegram byte-blob.
    fn decode(&self, telegram: &[u8]) -> Result<Self::Output, Error>;
}
