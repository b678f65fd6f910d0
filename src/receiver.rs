// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Receiver façade binding a transport to a decoder.
//!
//! The receiver synchronously alternates between pulling one telegram from
//! the transport and decoding it; decoding never suspends. Segments are
//! delivered in the exact on-wire order produced by the sensor. A blocked
//! receive is cancelled only by closing the transport.

use crate::compact::CompactDecoder;
use crate::msgpack::MsgpackDecoder;
use crate::segment::{Error, Segment, SegmentDecoder};
use crate::transport::Transport;
use tracing::{debug, warn};

/// What to do when a single telegram fails to decode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop and return the error alongside the partial batch
    #[default]
    FailFast,
    /// Log a warning and keep receiving
    SkipAndLog,
}

/// Parallel result arrays of one `receive_segments` call.
#[derive(Clone, Debug, Default)]
pub struct SegmentBatch<S> {
    /// Decoded segments in on-wire order
    pub segments: Vec<S>,
    /// Frame number of each segment
    pub frame_numbers: Vec<u32>,
    /// Segment counter of each segment
    pub segment_counters: Vec<u32>,
}

impl<S: Segment> SegmentBatch<S> {
    fn new() -> Self {
        Self {
            segments: Vec::new(),
            frame_numbers: Vec::new(),
            segment_counters: Vec::new(),
        }
    }

    /// Number of segments collected.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True when nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    fn push(&mut self, segment: S) {
        self.frame_numbers.push(segment.frame_number());
        self.segment_counters.push(segment.segment_counter());
        self.segments.push(segment);
    }
}

/// Receives telegrams from a transport and decodes them into segments.
pub struct Receiver<D, T> {
    transport: T,
    decoder: D,
    policy: ErrorPolicy,
}

/// Receiver for COMPACT encoded telegrams.
pub type CompactReceiver<T> = Receiver<CompactDecoder, T>;

/// Receiver for MSGPACK encoded telegrams.
pub type MsgpackReceiver<T> = Receiver<MsgpackDecoder, T>;

impl<D, T> Receiver<D, T>
where
    D: SegmentDecoder + Default,
    T: Transport,
{
    /// Create a receiver with the default fail-fast error policy.
    pub fn new(transport: T) -> Self {
        Self::with_policy(transport, ErrorPolicy::FailFast)
    }

    /// Create a receiver with an explicit decode error policy.
    pub fn with_policy(transport: T, policy: ErrorPolicy) -> Self {
        Self {
            transport,
            decoder: D::default(),
            policy,
        }
    }
}

impl<D, T> Receiver<D, T>
where
    D: SegmentDecoder,
    T: Transport,
{
    /// Receive up to `count` segments.
    ///
    /// Returns the batch of parallel arrays together with the error that
    /// stopped the call, if any. The batch is short without an error on a
    /// clean end of stream. Transport errors always stop the call; decode
    /// errors go through the configured [`ErrorPolicy`].
    pub async fn receive_segments(&mut self, count: usize) -> (SegmentBatch<D::Output>, Option<Error>) {
        let mut batch = SegmentBatch::new();

        while batch.len() < count {
            let telegram = match self.transport.recv().await {
                Ok(Some(telegram)) => telegram,
                Ok(None) => {
                    debug!(
                        "transport ended cleanly after {} of {} segments",
                        batch.len(),
                        count
                    );
                    return (batch, None);
                }
                Err(err) => return (batch, Some(err)),
            };

            match self.decoder.decode(&telegram) {
                Ok(segment) => {
                    debug!(
                        "received segment {} of frame {}",
                        segment.segment_counter(),
                        segment.frame_number()
                    );
                    batch.push(segment);
                }
                Err(err) => match self.policy {
                    ErrorPolicy::FailFast => return (batch, Some(err)),
                    ErrorPolicy::SkipAndLog => {
                        warn!("skipping undecodable telegram: {}", err);
                    }
                },
            }
        }

        (batch, None)
    }

    /// Close the underlying transport, cancelling any blocked receive.
    pub async fn close_connection(mut self) -> Result<(), Error> {
        self.transport.close().await
    }
}
