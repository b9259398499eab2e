//! CLI surface and option resolution.
//!
//! Clap resolves short/long aliases; this module folds the parsed flags and
//! the config-file defaults into one validated [`Options`] value. Flag
//! combination errors are [`UsageError`]s: one line on stderr, failure exit.

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use crate::config::Config;

/// Command-line content-transfer client with local streaming.
#[derive(Parser, Debug)]
#[command(name = "tug")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path, URL, or magnet link to transfer (local path with -S)
    pub source: Option<String>,

    /// Enable the stream server on this port, serving the transfer's files
    #[arg(short = 's', long = "stream", value_name = "PORT")]
    pub stream: Option<u16>,

    /// Serve a local path without a transfer engine; the port attaches as
    /// -S=<PORT> (default 8888)
    #[arg(
        short = 'S',
        long = "local",
        value_name = "PORT",
        num_args = 0..=1,
        require_equals = true
    )]
    pub local: Option<Option<u16>>,

    /// Stay resident after the transfer completes
    #[arg(short = 'i', long = "idle")]
    pub idle: bool,

    /// Keep serving until a stream client has come and gone; requires -s
    #[arg(short = 'w', long = "wait")]
    pub wait: bool,

    /// Suppress progress output and banners
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Do not persist transferred data
    #[arg(short = 'e', long = "ephemeral")]
    pub ephemeral: bool,

    /// Peer connection limit
    #[arg(short = 'c', long = "connections", value_name = "N")]
    pub connections: Option<usize>,

    /// Upload slot limit
    #[arg(short = 'u', long = "uploads", value_name = "N")]
    pub uploads: Option<usize>,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Fatal flag/argument errors. Printed as a single line, failure status.
#[derive(Debug, Error, PartialEq)]
pub enum UsageError {
    #[error("Usage: tug <path|url|magnet> [options]")]
    MissingSource,

    #[error("Usage: tug -S[=port] <path>")]
    BadLocalPath,

    #[error("-w option requires -s")]
    WaitRequiresStream,
}

/// Which of the two top-level modes the invocation selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Drive a transfer engine, optionally streaming its files.
    Transfer { source: String },
    /// Serve an enumerated local path; no engine at all.
    Local { port: u16, path: PathBuf },
}

/// Fully resolved invocation options.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub mode: Mode,
    /// Stream server port for transfer mode.
    pub stream_port: Option<u16>,
    /// Disable the transfer-complete exit condition.
    pub stay_resident: bool,
    /// Wait mode: a drained stream lifts the stay-resident hold.
    pub wait: bool,
    pub quiet: bool,
    pub ephemeral: bool,
    pub connections: usize,
    pub uploads: usize,
}

impl Options {
    /// Folds CLI flags over config defaults, validating combinations.
    pub fn resolve(cli: Cli, config: &Config) -> Result<Self, UsageError> {
        if cli.wait && cli.stream.is_none() {
            return Err(UsageError::WaitRequiresStream);
        }

        // Wait mode implies ephemeral and stay-resident.
        let stay_resident = cli.idle || cli.wait;
        let ephemeral = cli.ephemeral || cli.wait;

        let mode = match cli.local {
            Some(port) => Mode::Local {
                port: port.unwrap_or(config.stream.default_port),
                path: PathBuf::from(cli.source.ok_or(UsageError::BadLocalPath)?),
            },
            None => Mode::Transfer {
                source: cli.source.ok_or(UsageError::MissingSource)?,
            },
        };

        Ok(Self {
            mode,
            stream_port: cli.stream,
            stay_resident,
            wait: cli.wait,
            quiet: cli.quiet || config.ui.quiet,
            ephemeral,
            connections: cli.connections.unwrap_or(config.transfer.connections),
            uploads: cli.uploads.unwrap_or(config.transfer.uploads),
        })
    }
}
