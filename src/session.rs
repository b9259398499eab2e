//! Top-level session orchestration.
//!
//! The controller wires the transfer engine and the optional stream server to
//! the progress renderer and the exit coordinator. All collaborator
//! callbacks are flattened into one typed event channel consumed by a single
//! `select!` loop, so renders never overlap and the terminal release is
//! ordered after any in-flight write.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::TransferEngine;
use crate::exit::{ExitCoordinator, ExitDecision, ExitStatus};
use crate::progress::{ProgressRenderer, ProgressSnapshot, Throttle};
use crate::stream::{StreamServer, TcpStreamServer};
use crate::terminal::Terminal;

/// Capacity of the session event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Default render cadence and throttle cooldown.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// The closed set of events collaborators deliver to the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The transfer engine finished initializing and has a file list.
    EngineReady,
    /// The transfer is fully complete.
    EngineDone,
    /// The stream server's open-stream count returned to zero.
    StreamsClosed,
    /// The engine's graceful shutdown finished.
    ShutdownComplete,
}

/// Controller knobs resolved from CLI flags and the config file.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Bind the stream server on this port once the engine is ready.
    pub stream_port: Option<u16>,
    /// Disable the transfer-complete exit condition.
    pub stay_resident: bool,
    /// Wait mode: a drained stream lifts the stay-resident hold.
    pub exit_on_drain: bool,
    /// Render cadence; also the throttle cooldown.
    pub refresh_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            stream_port: None,
            stay_resident: false,
            exit_on_drain: false,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// Orchestrates one transfer session from initialization to terminal release.
pub struct SessionController<E: TransferEngine, W: Write> {
    id: Uuid,
    engine: Arc<E>,
    server: Option<TcpStreamServer>,
    terminal: Terminal<W>,
    renderer: ProgressRenderer,
    throttle: Throttle,
    exit: ExitCoordinator,
    opts: SessionOptions,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
    ready: bool,
    max_percent: u8,
}

impl<E, W> SessionController<E, W>
where
    E: TransferEngine + 'static,
    W: Write,
{
    /// Creates a controller around an already-loading engine.
    ///
    /// `events_tx` must be the sender half the engine reports on; the
    /// controller reuses it for the shutdown completion notification.
    pub fn new(
        engine: Arc<E>,
        terminal: Terminal<W>,
        opts: SessionOptions,
        events_tx: mpsc::Sender<SessionEvent>,
        events_rx: mpsc::Receiver<SessionEvent>,
    ) -> Self {
        let styled = terminal.styled();
        Self {
            id: Uuid::new_v4(),
            engine,
            server: None,
            terminal,
            renderer: ProgressRenderer::new(styled),
            throttle: Throttle::new(opts.refresh_interval),
            exit: ExitCoordinator::new(opts.stay_resident, opts.exit_on_drain),
            opts,
            events_tx,
            events_rx,
            ready: false,
            max_percent: 0,
        }
    }

    /// Attaches an already-bound stream server instead of binding one on the
    /// engine-ready event.
    pub fn with_server(mut self, server: TcpStreamServer) -> Self {
        self.server = Some(server);
        self
    }

    /// Runs the session to completion and returns the process status.
    pub async fn run(mut self) -> Result<ExitStatus> {
        info!(session = %self.id, "session starting");
        self.terminal
            .write_line("Initializing transfer engine...")?;

        let mut ticker = time::interval(self.opts.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                result = signal::ctrl_c() => {
                    result.context("failed to listen for interrupt")?;
                    return self.interrupt();
                }
                _ = ticker.tick() => {
                    if self.ready {
                        self.render(false)?;
                    }
                }
                Some(event) = self.events_rx.recv() => {
                    debug!(session = %self.id, ?event, "session event");
                    if let Some(status) = self.handle_event(event).await? {
                        return Ok(status);
                    }
                }
            }
        }
    }

    async fn handle_event(&mut self, event: SessionEvent) -> Result<Option<ExitStatus>> {
        match event {
            SessionEvent::EngineReady => {
                self.on_ready().await?;
                Ok(None)
            }
            SessionEvent::EngineDone => {
                // One final untimed render before asking to leave.
                self.render(true)?;
                self.request_exit(false)
            }
            SessionEvent::StreamsClosed => {
                self.exit.note_stream_drained();
                self.request_exit(false)
            }
            SessionEvent::ShutdownComplete => {
                if self.exit.complete_shutdown() {
                    Ok(Some(self.terminate()?))
                } else {
                    Ok(None)
                }
            }
        }
    }

    async fn on_ready(&mut self) -> Result<()> {
        info!(session = %self.id, "transfer engine ready");
        self.terminal.write_line("Downloading files:")?;
        for (i, file) in self.engine.files().iter().enumerate() {
            self.terminal
                .write_line(&format!("  [{}] {}", i + 1, file.path.display()))?;
        }
        self.terminal.blank_line()?;

        if self.server.is_none() {
            if let Some(port) = self.opts.stream_port {
                let server =
                    TcpStreamServer::bind(port, self.engine.virtual_files(), self.events_tx.clone())
                        .await
                        .context("failed to start stream server")?;
                self.server = Some(server);
            }
        }
        if let Some(banner) = self.server.as_ref().map(server_banner) {
            self.terminal.write_line(&banner)?;
            self.terminal.blank_line()?;
        }

        self.ready = true;
        // Initial progress painting.
        self.render(false)?;
        Ok(())
    }

    /// Requests a graceful exit with the current engine/server observations.
    fn request_exit(&mut self, force: bool) -> Result<Option<ExitStatus>> {
        let done = self.engine.is_done();
        let open_streams = self.server.as_ref().map_or(0, |s| s.open_streams());

        match self.exit.request_exit(force, done, open_streams) {
            ExitDecision::Refused => Ok(None),
            ExitDecision::BeginShutdown => {
                let engine = Arc::clone(&self.engine);
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    engine.shutdown().await;
                    let _ = events.send(SessionEvent::ShutdownComplete).await;
                });
                Ok(None)
            }
            ExitDecision::TerminateNow => Ok(Some(self.terminate()?)),
        }
    }

    /// Forced interrupt: bypass the exit machine, restore the terminal, end
    /// immediately without graceful engine shutdown.
    fn interrupt(mut self) -> Result<ExitStatus> {
        info!(session = %self.id, "interrupted, exiting immediately");
        if let Some(server) = &self.server {
            server.shutdown();
        }
        self.terminal.release()?;
        Ok(ExitStatus::Success)
    }

    fn terminate(&mut self) -> Result<ExitStatus> {
        info!(session = %self.id, "session terminated");
        if let Some(server) = &self.server {
            server.shutdown();
        }
        self.terminal.release()?;
        Ok(ExitStatus::Success)
    }

    fn render(&mut self, force: bool) -> Result<()> {
        if !self.throttle.acquire(force) {
            return Ok(());
        }
        let snapshot = self.snapshot();
        let line = self.renderer.render(&snapshot);
        self.terminal.show_progress(&line)?;
        Ok(())
    }

    /// Builds a snapshot from live engine and server state.
    ///
    /// Percent is clamped to the running maximum so displayed progress never
    /// moves backwards even if the engine's totals wobble.
    fn snapshot(&mut self) -> ProgressSnapshot {
        let stats = self.engine.stats();
        let wires = self.engine.wires();
        self.max_percent = self.max_percent.max(stats.percent.min(100));

        ProgressSnapshot {
            percent: self.max_percent,
            downloaded: stats.downloaded,
            rate: stats.rate,
            active_peers: wires.iter().filter(|w| w.is_active()).count(),
            total_peers: wires.len(),
            open_streams: self.server.as_ref().map(|s| s.open_streams()),
            eta_seconds: stats.eta_seconds,
        }
    }
}

/// Banner line announcing the bound stream server.
fn server_banner(server: &TcpStreamServer) -> String {
    let note = if server.use_m3u() {
        "using m3u playlist".to_string()
    } else {
        format!("default file is {}", server.default_index() + 1)
    };
    format!("Streaming enabled on port {} ({note})", server.port())
}
