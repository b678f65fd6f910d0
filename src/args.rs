// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::{Parser, Subcommand, ValueEnum};
use edgefirst_scansegment::Format;
use std::fmt;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Application log level
    #[arg(long, env, default_value = "info", global = true)]
    pub rust_log: LevelFilter,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Read telegrams from a file and print the decoded segments.
    Read {
        /// Format of the stored data
        format: Format,

        /// File with one or more whole telegrams, concatenated
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },

    /// Receive telegrams from a live sensor and decode them.
    Receive {
        /// Format of received data
        format: Format,

        /// For UDP the local address to listen on, for TCP the sensor
        /// address to connect to
        #[arg(long, default_value = "localhost")]
        ip: String,

        /// For UDP the port to listen on, for TCP the sensor port
        #[arg(short, long, default_value_t = 2115)]
        port: u16,

        /// Number of segments to receive
        #[arg(short, long, default_value_t = 200)]
        num_segments: usize,

        /// Transport protocol to use
        #[arg(long, default_value = "udp")]
        protocol: Protocol,
    },
}

/// Transport protocol for the receive subcommand
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Protocol {
    /// One telegram per datagram
    #[default]
    Udp,
    /// Continuous byte stream, re-framed by a stream extractor
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::Udp => write!(f, "udp"),
            Protocol::Tcp => write!(f, "tcp"),
        }
    }
}
