// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! EdgeFirst Scan Segment Library
//!
//! This library receives and decodes scan-segment telegrams emitted by
//! multi-layer LiDAR scanners. Each telegram carries one slice (segment)
//! of a rotational frame, encoded either as a self-describing map
//! (MSGPACK) or a fixed-layout binary form (COMPACT), and arrives either
//! one per UDP datagram or as a continuous TCP byte stream that must be
//! re-framed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌────────────────────┐     ┌────────────────┐
//! │  Transport       │ ──► │  TelegramExtractor │ ──► │  SegmentDecoder│
//! │  (UDP/TCP/replay)│     │  (stream only)     │     │  (pure)        │
//! └──────────────────┘     └────────────────────┘     └────────────────┘
//!                                                             │
//!                                                             ▼
//!                                         ┌───────────────────────────┐
//!                                         │  Receiver                 │
//!                                         │  (collect N segments)     │
//!                                         └───────────────────────────┘
//! ```
//!
//! The transport owns the socket and yields whole telegram byte-blobs;
//! over TCP it delegates re-framing to an injected extractor state
//! machine. The decoders are pure functions from one telegram blob to a
//! structured segment, verifying the CRC-32/MPEG-2 word every telegram
//! carries. The receiver binds a transport to a decoder and collects
//! segments in on-wire order.
//!
//! # Modules
//!
//! - [`segment`]: Common error type, format selector and decoder traits
//! - [`checksum`]: CRC-32/MPEG-2 engine shared by both encodings
//! - [`compact`]: COMPACT fixed-layout binary decoder
//! - [`msgpack`]: MSGPACK map decoder
//! - [`framing`]: Stream extractor state machines
//! - [`transport`]: UDP, TCP and replay transports
//! - [`receiver`]: Receiver façade
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_scansegment::{
//!     receiver::CompactReceiver,
//!     transport::DatagramTransport,
//! };
//!
//! let transport = DatagramTransport::bind("localhost", 2115, 65535).await?;
//! let mut receiver = CompactReceiver::new(transport);
//!
//! let (batch, error) = receiver.receive_segments(200).await;
//! for (segment, frame) in batch.segments.iter().zip(&batch.frame_numbers) {
//!     println!("frame {}: {} modules", frame, segment.modules.len());
//! }
//! receiver.close_connection().await?;
//! ```

pub mod checksum;
pub mod compact;
pub mod framing;
pub mod msgpack;
pub mod receiver;
pub mod segment;
pub mod transport;

// Re-exports for convenience
pub use compact::{CompactDecoder, CompactSegment};
pub use framing::{CompactStreamExtractor, MsgpackStreamExtractor, TelegramExtractor};
pub use msgpack::{MsgpackDecoder, MsgpackSegment};
pub use receiver::{CompactReceiver, ErrorPolicy, MsgpackReceiver, Receiver, SegmentBatch};
pub use segment::{Error, Format, Segment, SegmentDecoder};
pub use transport::{DatagramTransport, ReplayTransport, StreamTransport, Transport};
