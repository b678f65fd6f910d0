// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Stream extractors: re-framing state machines for byte transports.
//!
//! UDP delivers one telegram per datagram, but over TCP the telegrams
//! arrive as a continuous byte stream that must be re-framed. Each
//! extractor accumulates chunks in a buffer and walks an explicit state
//! machine over it, emitting whole telegram byte-blobs as they complete.
//! Partial reads simply leave the machine in its current state; bogus
//! bytes between telegrams and implausible length prefixes trigger a
//! resync that discards a single byte, so progress is always guaranteed.
//!
//! Extractors never verify the CRC; that is the decoder's job. Resync
//! events are logged, never surfaced.

use tracing::warn;

/// COMPACT start-of-frame sequence
const START_OF_FRAME: [u8; 4] = [0x02, 0x02, 0x02, 0x02];

/// COMPACT header size in bytes
const COMPACT_HEADER_SIZE: usize = 32;

/// Command id carried by measurement data telegrams
const COMMAND_ID_MEASUREMENT: u32 = 1;

/// Supported COMPACT format version
const COMPACT_VERSION: u32 = 4;

/// Trailing CRC word size
const CRC_SIZE: usize = 4;

/// Ceiling for declared module and body sizes; anything larger is treated
/// as a corrupted length prefix.
const MAX_CHUNK_DECLARED: usize = 16 * 1024 * 1024;

/// Byte source re-framing interface shared by both encodings.
pub trait TelegramExtractor: Send {
    /// Feed one chunk of stream data, returning any telegrams completed by
    /// it, in on-wire order.
    fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>>;

    /// True when the extractor holds no partially received telegram, i.e.
    /// an end of stream at this point is a clean shutdown.
    fn is_idle(&self) -> bool;
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// States of the COMPACT extractor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompactExtractorState {
    /// Scanning for the start-of-frame sequence
    SearchStart,
    /// Accumulating the fixed-size header
    ReadHeader,
    /// Accumulating modules, following the declared size chain
    ReadModules,
    /// Accumulating the trailing CRC word
    ReadCrc,
}

/// Extracts COMPACT telegrams from a byte stream.
///
/// The header declares the size of the first module; each module's
/// metadata declares the size of the next, with 0 terminating the chain.
/// The extractor follows that chain, then collects the CRC word and emits
/// the whole telegram.
#[derive(Debug)]
pub struct CompactStreamExtractor {
    buffer: Vec<u8>,
    state: CompactExtractorState,
    /// Total bytes of all chained modules accepted so far
    payload_size: usize,
    /// Offset of the module currently being chained
    module_offset: usize,
}

impl CompactStreamExtractor {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            state: CompactExtractorState::SearchStart,
            payload_size: 0,
            module_offset: 0,
        }
    }

    /// Current state, mainly for tests and diagnostics.
    pub fn state(&self) -> CompactExtractorState {
        self.state
    }

    /// Discard one byte of the matched magic and rescan. Guarantees
    /// progress past corrupted headers and length prefixes.
    fn resync(&mut self, reason: &str) {
        warn!("compact extractor resync: {}", reason);
        self.buffer.drain(..1);
        self.state = CompactExtractorState::SearchStart;
        self.payload_size = 0;
        self.module_offset = 0;
    }

    /// Returns false when more data is needed.
    fn step(&mut self, out: &mut Vec<Vec<u8>>) -> bool {
        match self.state {
            CompactExtractorState::SearchStart => self.search_start(),
            CompactExtractorState::ReadHeader => self.read_header(),
            CompactExtractorState::ReadModules => self.read_modules(),
            CompactExtractorState::ReadCrc => self.read_crc(out),
        }
    }

    fn search_start(&mut self) -> bool {
        match self
            .buffer
            .windows(START_OF_FRAME.len())
            .position(|window| window == START_OF_FRAME)
        {
            Some(pos) => {
                self.buffer.drain(..pos);
                self.state = CompactExtractorState::ReadHeader;
                true
            }
            None => {
                // Keep only a trailing partial magic so a sequence split
                // across chunks is still found.
                let tail = self
                    .buffer
                    .iter()
                    .rev()
                    .take(START_OF_FRAME.len() - 1)
                    .take_while(|&&b| b == 0x02)
                    .count();
                self.buffer.drain(..self.buffer.len() - tail);
                false
            }
        }
    }

    fn read_header(&mut self) -> bool {
        if self.buffer.len() < COMPACT_HEADER_SIZE {
            return false;
        }

        let command_id = read_u32_le(&self.buffer, 4);
        let version = read_u32_le(&self.buffer, 24);
        let size_module_0 = read_u32_le(&self.buffer, 28) as usize;

        if command_id != COMMAND_ID_MEASUREMENT {
            self.resync(&format!("unexpected command id {}", command_id));
            return true;
        }
        if version != COMPACT_VERSION {
            self.resync(&format!("unexpected version {}", version));
            return true;
        }
        if size_module_0 == 0 || size_module_0 > MAX_CHUNK_DECLARED {
            self.resync(&format!("implausible first module size {}", size_module_0));
            return true;
        }

        self.payload_size = size_module_0;
        self.module_offset = COMPACT_HEADER_SIZE;
        self.state = CompactExtractorState::ReadModules;
        true
    }

    fn read_modules(&mut self) -> bool {
        let payload_end = COMPACT_HEADER_SIZE + self.payload_size;
        if self.buffer.len() < payload_end {
            return false;
        }

        // The current module spans module_offset..payload_end. Its line
        // count positions the next-module-size field within its metadata.
        let module_size = payload_end - self.module_offset;
        if module_size < 36 {
            self.resync(&format!("module of {} bytes below minimum metadata", module_size));
            return true;
        }
        let lines = read_u32_le(&self.buffer, self.module_offset + 12) as usize;
        let metadata_size = match lines
            .checked_mul(28)
            .and_then(|n| n.checked_add(36))
            .filter(|&n| n <= module_size)
        {
            Some(size) => size,
            None => {
                self.resync(&format!("module of {} bytes cannot hold {} lines", module_size, lines));
                return true;
            }
        };

        let next_module_size =
            read_u32_le(&self.buffer, self.module_offset + metadata_size - 8) as usize;
        if next_module_size > MAX_CHUNK_DECLARED {
            self.resync(&format!("implausible module size {}", next_module_size));
            return true;
        }

        if next_module_size == 0 {
            self.state = CompactExtractorState::ReadCrc;
        } else {
            self.module_offset = payload_end;
            self.payload_size += next_module_size;
        }
        true
    }

    fn read_crc(&mut self, out: &mut Vec<Vec<u8>>) -> bool {
        let total = COMPACT_HEADER_SIZE + self.payload_size + CRC_SIZE;
        if self.buffer.len() < total {
            return false;
        }

        out.push(self.buffer.drain(..total).collect());
        self.state = CompactExtractorState::SearchStart;
        self.payload_size = 0;
        self.module_offset = 0;
        true
    }
}

impl Default for CompactStreamExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramExtractor for CompactStreamExtractor {
    fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(data);
        let mut out = Vec::new();
        while self.step(&mut out) {}
        out
    }

    fn is_idle(&self) -> bool {
        self.state == CompactExtractorState::SearchStart && self.buffer.is_empty()
    }
}

/// States of the MSGPACK extractor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MsgpackExtractorState {
    /// Accumulating the 4-byte big-endian length prefix
    ReadLength,
    /// Accumulating the declared body bytes
    ReadBody,
    /// Accumulating the trailing CRC word
    ReadCrc,
}

/// Extracts MSGPACK telegrams from a byte stream.
///
/// Stream framing is a 4-byte big-endian length prefix, the body, and a
/// 4-byte CRC. There is no magic to scan for: an implausible length
/// (zero, or beyond the ceiling) resyncs by discarding one byte and
/// re-reading the prefix. The emitted blob is body plus CRC; the length
/// prefix is framing only.
#[derive(Debug)]
pub struct MsgpackStreamExtractor {
    buffer: Vec<u8>,
    state: MsgpackExtractorState,
    body_size: usize,
}

impl MsgpackStreamExtractor {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            state: MsgpackExtractorState::ReadLength,
            body_size: 0,
        }
    }

    /// Current state, mainly for tests and diagnostics.
    pub fn state(&self) -> MsgpackExtractorState {
        self.state
    }

    /// Returns false when more data is needed.
    fn step(&mut self, out: &mut Vec<Vec<u8>>) -> bool {
        match self.state {
            MsgpackExtractorState::ReadLength => self.read_length(),
            MsgpackExtractorState::ReadBody => self.read_body(),
            MsgpackExtractorState::ReadCrc => self.read_crc(out),
        }
    }

    fn read_length(&mut self) -> bool {
        if self.buffer.len() < 4 {
            return false;
        }

        let length = u32::from_be_bytes([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
        ]) as usize;

        if length == 0 || length > MAX_CHUNK_DECLARED {
            warn!("msgpack extractor resync: implausible body length {}", length);
            self.buffer.drain(..1);
            return true;
        }

        self.body_size = length;
        self.state = MsgpackExtractorState::ReadBody;
        true
    }

    fn read_body(&mut self) -> bool {
        if self.buffer.len() < 4 + self.body_size {
            return false;
        }
        self.state = MsgpackExtractorState::ReadCrc;
        true
    }

    fn read_crc(&mut self, out: &mut Vec<Vec<u8>>) -> bool {
        let total = 4 + self.body_size + CRC_SIZE;
        if self.buffer.len() < total {
            return false;
        }

        let telegram = self.buffer[4..total].to_vec();
        self.buffer.drain(..total);
        out.push(telegram);
        self.state = MsgpackExtractorState::ReadLength;
        self.body_size = 0;
        true
    }
}

impl Default for MsgpackStreamExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramExtractor for MsgpackStreamExtractor {
    fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(data);
        let mut out = Vec::new();
        while self.step(&mut out) {}
        out
    }

    fn is_idle(&self) -> bool {
        self.state == MsgpackExtractorState::ReadLength && self.buffer.is_empty()
    }
}
