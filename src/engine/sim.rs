//! Simulated transfer engine.
//!
//! An in-process reference backend that "transfers" a local path at a fixed
//! rate with synthetic peers. It exists so the session pipeline can be run
//! and tested end to end without a network backend, behind the same trait a
//! real one would implement.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{EngineError, FileInfo, PeerWire, TransferEngine, TransferStats};
use crate::session::SessionEvent;
use crate::vfs;

/// Simulation pacing: progress advances on this tick.
const TICK: Duration = Duration::from_millis(100);

/// Delay before the engine reports ready.
const READY_DELAY: Duration = Duration::from_millis(200);

/// Tuning knobs for the simulated transfer.
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Simulated download rate in bytes per second.
    pub rate: u64,
    /// Peer connection limit; bounds the synthetic wire list.
    pub connections: usize,
    /// Upload slot limit; bounds the unchoked wires.
    pub uploads: usize,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            rate: 2 * 1024 * 1024,
            connections: 100,
            uploads: 10,
        }
    }
}

struct SimState {
    downloaded: AtomicU64,
    done: AtomicBool,
}

/// Reference engine backed by an enumerated local path.
pub struct SimEngine {
    files: Vec<FileInfo>,
    total: u64,
    opts: SimOptions,
    state: Arc<SimState>,
    cancel: CancellationToken,
}

impl SimEngine {
    /// Loads `source` as the transfer descriptor and starts the simulation.
    ///
    /// The file list is the enumeration of `source`; a missing path is an
    /// [`EngineError::InvalidSource`].
    pub fn load(
        source: &str,
        opts: SimOptions,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Self, EngineError> {
        let files: Vec<FileInfo> = vfs::enumerate(Path::new(source))
            .map_err(|e| EngineError::InvalidSource(e.to_string()))?
            .iter()
            .map(|f| FileInfo {
                path: f.name().to_path_buf(),
                length: f.length(),
            })
            .collect();
        let total: u64 = files.iter().map(|f| f.length).sum();

        info!(files = files.len(), total, "simulated engine loaded");

        let state = Arc::new(SimState {
            downloaded: AtomicU64::new(0),
            done: AtomicBool::new(false),
        });
        let cancel = CancellationToken::new();

        tokio::spawn(Self::run(
            Arc::clone(&state),
            total,
            opts.rate,
            events,
            cancel.clone(),
        ));

        Ok(Self {
            files,
            total,
            opts,
            state,
            cancel,
        })
    }

    async fn run(
        state: Arc<SimState>,
        total: u64,
        rate: u64,
        events: mpsc::Sender<SessionEvent>,
        cancel: CancellationToken,
    ) {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = time::sleep(READY_DELAY) => {}
        }
        if events.send(SessionEvent::EngineReady).await.is_err() {
            return;
        }

        let step = rate / (1000 / TICK.as_millis() as u64).max(1);
        let mut ticker = time::interval(TICK);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let downloaded = state
                .downloaded
                .fetch_add(step, Ordering::Relaxed)
                .saturating_add(step);
            if downloaded >= total {
                state.downloaded.store(total, Ordering::Relaxed);
                state.done.store(true, Ordering::Relaxed);
                debug!("simulated transfer complete");
                let _ = events.send(SessionEvent::EngineDone).await;
                return;
            }
        }
    }
}

impl TransferEngine for SimEngine {
    fn files(&self) -> Vec<FileInfo> {
        self.files.clone()
    }

    fn stats(&self) -> TransferStats {
        let downloaded = self.state.downloaded.load(Ordering::Relaxed).min(self.total);
        let percent = if self.total == 0 {
            100
        } else {
            (downloaded * 100 / self.total) as u8
        };
        let eta_seconds = if self.opts.rate == 0 {
            None
        } else {
            Some((self.total - downloaded) / self.opts.rate)
        };
        TransferStats {
            percent,
            downloaded,
            rate: self.opts.rate,
            eta_seconds,
        }
    }

    fn wires(&self) -> Vec<PeerWire> {
        if self.state.done.load(Ordering::Relaxed) {
            return Vec::new();
        }
        // Deterministic synthetic swarm: peers reciprocate one upload slot
        // each, so wires beyond the upload limit choke us.
        let total = self.opts.connections.clamp(1, 8);
        let unchoked = self.opts.uploads.min(total);
        (0..total).map(|i| PeerWire { choked: i >= unchoked }).collect()
    }

    fn is_done(&self) -> bool {
        self.state.done.load(Ordering::Relaxed)
    }

    async fn shutdown(&self) {
        debug!("simulated engine shutting down");
        self.cancel.cancel();
        // Emulates asynchronous teardown of trackers and peer sockets.
        time::sleep(Duration::from_millis(50)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture(bytes: usize) -> (TempDir, String) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("payload.bin"), vec![0u8; bytes]).unwrap();
        let path = dir.path().to_string_lossy().into_owned();
        (dir, path)
    }

    #[tokio::test]
    async fn load_rejects_missing_source() {
        let (tx, _rx) = mpsc::channel(8);
        let err = SimEngine::load("/definitely/not/here", SimOptions::default(), tx);
        assert!(matches!(err, Err(EngineError::InvalidSource(_))));
    }

    #[tokio::test]
    async fn engine_reports_ready_then_done() {
        let (_dir, path) = fixture(1000);
        let (tx, mut rx) = mpsc::channel(8);
        let opts = SimOptions {
            rate: 1_000_000,
            connections: 4,
            ..SimOptions::default()
        };
        let engine = SimEngine::load(&path, opts, tx).unwrap();

        assert_eq!(rx.recv().await, Some(SessionEvent::EngineReady));
        assert_eq!(rx.recv().await, Some(SessionEvent::EngineDone));
        assert!(engine.is_done());
        assert_eq!(engine.stats().percent, 100);
    }

    #[tokio::test]
    async fn stats_and_wires_track_the_simulation() {
        let (_dir, path) = fixture(64);
        let (tx, mut rx) = mpsc::channel(8);
        let opts = SimOptions {
            connections: 4,
            uploads: 3,
            ..SimOptions::default()
        };
        let engine = SimEngine::load(&path, opts, tx).unwrap();

        assert_eq!(engine.wires().len(), 4);
        let active = engine.wires().iter().filter(|w| w.is_active()).count();
        assert_eq!(active, 3);

        rx.recv().await;
        rx.recv().await;
        // Swarm drains once the transfer completes.
        assert!(engine.wires().is_empty());
    }

    #[tokio::test]
    async fn upload_slots_bound_the_active_wires() {
        let (_dir, path) = fixture(1 << 20);
        let active_with = |connections, uploads| {
            let (tx, _rx) = mpsc::channel(8);
            let opts = SimOptions {
                rate: 1,
                connections,
                uploads,
            };
            let engine = SimEngine::load(&path, opts, tx).unwrap();
            let wires = engine.wires();
            (wires.len(), wires.iter().filter(|w| w.is_active()).count())
        };

        // More slots than peers: every wire is active.
        assert_eq!(active_with(4, 10), (4, 4));
        // Fewer slots than peers: the surplus wires choke us.
        assert_eq!(active_with(8, 2), (8, 2));
        // The connection cap still bounds the swarm.
        assert_eq!(active_with(100, 100), (8, 8));
    }

    #[tokio::test]
    async fn shutdown_stops_the_simulation() {
        let (_dir, path) = fixture(usize::pow(2, 24));
        let (tx, mut rx) = mpsc::channel(8);
        let opts = SimOptions {
            rate: 1024,
            connections: 4,
            ..SimOptions::default()
        };
        let engine = SimEngine::load(&path, opts, tx).unwrap();
        assert_eq!(rx.recv().await, Some(SessionEvent::EngineReady));

        engine.shutdown().await;
        assert!(!engine.is_done());
    }
}
