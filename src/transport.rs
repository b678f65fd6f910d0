// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Transport adapters delivering telegram byte-blobs.
//!
//! This module provides a [`Transport`] trait that abstracts where
//! telegrams come from, enabling:
//!
//! - **Live UDP**: one telegram per datagram, no framing work
//! - **Live TCP**: a continuous byte stream re-framed by an injected
//!   extractor
//! - **Testing**: replaying pre-recorded telegrams
//!
//! The transport owns the underlying socket; no other component touches
//! it. Closing the transport is the only way to cancel a blocked receive.
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_scansegment::framing::CompactStreamExtractor;
//! use edgefirst_scansegment::transport::{StreamTransport, Transport};
//!
//! let mut transport =
//!     StreamTransport::connect(CompactStreamExtractor::new(), "localhost", 2115, 1024).await?;
//! while let Some(telegram) = transport.recv().await? {
//!     // Decode telegram
//! }
//! ```

use crate::framing::TelegramExtractor;
use crate::segment::Error;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::{future::Future, pin::Pin};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

/// Trait for telegram sources.
///
/// `recv` resolves to `Ok(Some(telegram))` for each whole telegram,
/// `Ok(None)` on a clean end of stream (EOF at a telegram boundary, or a
/// finite source exhausted), and an error otherwise. An end of stream
/// while a telegram is still incomplete is [`Error::TransportClosed`].
pub trait Transport: Send {
    /// Receive the next whole telegram byte-blob.
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, Error>> + Send + '_>>;

    /// Release the underlying socket. Subsequent receives fail with
    /// [`Error::TransportClosed`].
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, Error>> + Send + '_>> {
        (**self).recv()
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        (**self).close()
    }
}

/// UDP transport: each datagram carries exactly one telegram.
pub struct DatagramTransport {
    socket: Option<UdpSocket>,
    buf: Vec<u8>,
}

impl DatagramTransport {
    /// Bind a UDP socket on the given local address.
    ///
    /// `max_datagram` bounds the size of a single telegram; datagrams
    /// beyond it are truncated by the socket layer.
    pub async fn bind(host: &str, port: u16, max_datagram: usize) -> Result<Self, Error> {
        let socket = UdpSocket::bind((host, port)).await?;
        Ok(Self {
            socket: Some(socket),
            buf: vec![0u8; max_datagram],
        })
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        let socket = self.socket.as_ref().ok_or(Error::TransportClosed)?;
        Ok(socket.local_addr()?)
    }
}

impl Transport for DatagramTransport {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, Error>> + Send + '_>> {
        Box::pin(async move {
            let socket = self.socket.as_ref().ok_or(Error::TransportClosed)?;
            let (len, _) = socket.recv_from(&mut self.buf).await?;
            Ok(Some(self.buf[..len].to_vec()))
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        Box::pin(async move {
            self.socket.take();
            Ok(())
        })
    }
}

/// TCP transport: reads the byte stream in chunks and re-frames it with
/// the injected extractor.
///
/// The chunk size should roughly match one telegram so a segment needs
/// neither many reads nor oversized buffers.
pub struct StreamTransport<E> {
    stream: Option<TcpStream>,
    extractor: E,
    chunk: Vec<u8>,
    pending: VecDeque<Vec<u8>>,
}

impl<E: TelegramExtractor> StreamTransport<E> {
    /// Connect to a sensor's TCP endpoint.
    pub async fn connect(
        extractor: E,
        host: &str,
        port: u16,
        chunk_size: usize,
    ) -> Result<Self, Error> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self::from_stream(extractor, stream, chunk_size))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(extractor: E, stream: TcpStream, chunk_size: usize) -> Self {
        Self {
            stream: Some(stream),
            extractor,
            chunk: vec![0u8; chunk_size],
            pending: VecDeque::new(),
        }
    }
}

impl<E: TelegramExtractor> Transport for StreamTransport<E> {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, Error>> + Send + '_>> {
        Box::pin(async move {
            loop {
                if let Some(telegram) = self.pending.pop_front() {
                    return Ok(Some(telegram));
                }

                let stream = self.stream.as_mut().ok_or(Error::TransportClosed)?;
                let len = stream.read(&mut self.chunk).await?;
                if len == 0 {
                    // EOF: clean only when no telegram is in flight
                    return if self.extractor.is_idle() {
                        Ok(None)
                    } else {
                        Err(Error::TransportClosed)
                    };
                }

                self.pending.extend(self.extractor.feed(&self.chunk[..len]));
            }
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        Box::pin(async move {
            if let Some(mut stream) = self.stream.take() {
                stream.shutdown().await?;
            }
            Ok(())
        })
    }
}

/// Replay transport for unit testing.
///
/// Serves a fixed sequence of telegrams, then reports a clean end of
/// stream.
pub struct ReplayTransport {
    telegrams: Vec<Vec<u8>>,
    index: usize,
}

impl ReplayTransport {
    /// Create a replay transport serving the given telegrams in order.
    pub fn new(telegrams: Vec<Vec<u8>>) -> Self {
        Self {
            telegrams,
            index: 0,
        }
    }

    /// Create an empty replay transport.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Number of telegrams not yet served.
    pub fn remaining(&self) -> usize {
        self.telegrams.len() - self.index
    }
}

impl Transport for ReplayTransport {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, Error>> + Send + '_>> {
        Box::pin(async move {
            match self.telegrams.get(self.index) {
                Some(telegram) => {
                    self.index += 1;
                    Ok(Some(telegram.clone()))
                }
                None => Ok(None),
            }
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        Box::pin(async move {
            self.index = self.telegrams.len();
            Ok(())
        })
    }
}
