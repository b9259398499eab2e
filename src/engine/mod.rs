//! Transfer engine boundary.
//!
//! The session controller never speaks a wire protocol itself; it observes
//! an engine through this trait: a file list, aggregate counters, the peer
//! wire list, and an async shutdown entry point. Readiness and completion
//! arrive as [`SessionEvent`](crate::session::SessionEvent)s on the shared
//! session channel.

pub mod sim;

use std::future::Future;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::vfs::VirtualFile;

/// Errors surfaced while loading or initializing an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The source argument is missing or does not name loadable content.
    #[error("invalid transfer source: {0}")]
    InvalidSource(String),

    /// Backend IO failure during load.
    #[error("engine io error: {0}")]
    Io(#[from] io::Error),
}

/// One entry of the engine's file list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub length: u64,
}

/// Aggregate transfer counters polled on each render tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferStats {
    /// Completed percentage, 0..=100.
    pub percent: u8,
    /// Total bytes downloaded.
    pub downloaded: u64,
    /// Current rate in bytes per second.
    pub rate: u64,
    /// Estimated seconds remaining, when the engine can tell.
    pub eta_seconds: Option<u64>,
}

/// A single peer connection as seen by the engine.
#[derive(Debug, Clone)]
pub struct PeerWire {
    /// Whether the remote side is currently choking us.
    pub choked: bool,
}

impl PeerWire {
    /// A wire counts as active while the peer is not choking us.
    pub fn is_active(&self) -> bool {
        !self.choked
    }
}

/// Contract every transfer backend implements for the session controller.
pub trait TransferEngine: Send + Sync {
    /// The files this transfer produces, in engine order.
    fn files(&self) -> Vec<FileInfo>;

    /// Aggregate counters for the progress renderer.
    fn stats(&self) -> TransferStats;

    /// Current peer wires.
    fn wires(&self) -> Vec<PeerWire>;

    /// Whether the transfer has fully completed.
    fn is_done(&self) -> bool;

    /// Gracefully tears the engine down; resolves when teardown is complete.
    ///
    /// Declared with an explicit `Send` bound so the controller can run the
    /// teardown on a spawned task.
    fn shutdown(&self) -> impl Future<Output = ()> + Send;

    /// File list as servable virtual files for the stream server.
    ///
    /// The default bridges through the backing filesystem path, which is
    /// correct for any engine that materializes content on disk.
    fn virtual_files(&self) -> Vec<VirtualFile> {
        self.files()
            .into_iter()
            .map(|f| VirtualFile::from_disk(f.path, f.length))
            .collect()
    }
}
