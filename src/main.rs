// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Command-line front-end: decode telegram dumps or receive live sensor
//! data in either encoding, over UDP or TCP.

mod args;

use args::{Args, Command, Protocol};
use clap::Parser as _;
use edgefirst_scansegment::{
    compact, msgpack,
    receiver::{CompactReceiver, MsgpackReceiver, Receiver},
    segment::{Format, SegmentDecoder},
    transport::{DatagramTransport, StreamTransport, Transport},
    CompactStreamExtractor, MsgpackStreamExtractor, TelegramExtractor,
};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt as _, Layer as _, Registry};

/// UDP receive buffer: one telegram per datagram, 64 KiB bound
const UDP_BUFFER_SIZE: usize = 65535;

/// TCP read chunk, roughly one scan segment
const TCP_CHUNK_SIZE: usize = 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let stdout_log = tracing_subscriber::fmt::layer().with_filter(args.rust_log);
    let subscriber = Registry::default().with(stdout_log);
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Read { format, input } => run_read(format, &input),
        Command::Receive {
            format,
            ip,
            port,
            num_segments,
            protocol,
        } => run_receive(format, protocol, &ip, port, num_segments).await,
    }
}

/// Feed a telegram dump through the matching extractor and decoder and
/// print every decoded segment as JSON.
fn run_read(format: Format, input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(input)?;

    let telegrams = match format {
        Format::Compact => CompactStreamExtractor::new().feed(&data),
        Format::Msgpack => MsgpackStreamExtractor::new().feed(&data),
    };
    if telegrams.is_empty() {
        return Err(format!("no {} telegrams found in {}", format, input.display()).into());
    }
    info!("{} telegrams in {}", telegrams.len(), input.display());

    for telegram in &telegrams {
        match format {
            Format::Compact => {
                let segment = compact::parse_segment(telegram)?;
                println!("{}", serde_json::to_string_pretty(&segment)?);
            }
            Format::Msgpack => {
                let segment = msgpack::parse_segment(telegram)?;
                println!("{}", serde_json::to_string_pretty(&segment)?);
            }
        }
    }

    Ok(())
}

/// Listen or connect, collect the requested number of segments and print
/// their frame numbers and segment counters.
async fn run_receive(
    format: Format,
    protocol: Protocol,
    ip: &str,
    port: u16,
    num_segments: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let transport: Box<dyn Transport> = match protocol {
        Protocol::Udp => {
            info!("listening on UDP {}:{}", ip, port);
            Box::new(DatagramTransport::bind(ip, port, UDP_BUFFER_SIZE).await?)
        }
        Protocol::Tcp => {
            info!("connecting to TCP {}:{}", ip, port);
            match format {
                Format::Compact => Box::new(
                    StreamTransport::connect(
                        CompactStreamExtractor::new(),
                        ip,
                        port,
                        TCP_CHUNK_SIZE,
                    )
                    .await?,
                ),
                Format::Msgpack => Box::new(
                    StreamTransport::connect(
                        MsgpackStreamExtractor::new(),
                        ip,
                        port,
                        TCP_CHUNK_SIZE,
                    )
                    .await?,
                ),
            }
        }
    };

    match format {
        Format::Compact => collect(CompactReceiver::new(transport), num_segments).await,
        Format::Msgpack => collect(MsgpackReceiver::new(transport), num_segments).await,
    }
}

async fn collect<D: SegmentDecoder>(
    mut receiver: Receiver<D, Box<dyn Transport>>,
    num_segments: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let (batch, error) = receiver.receive_segments(num_segments).await;

    for (frame, counter) in batch.frame_numbers.iter().zip(&batch.segment_counters) {
        println!("frame {:>10}  segment {:>4}", frame, counter);
    }
    info!("received {} of {} segments", batch.len(), num_segments);

    receiver.close_connection().await?;

    match error {
        Some(err) => {
            warn!("reception stopped early: {}", err);
            Err(err.into())
        }
        None => Ok(()),
    }
}
