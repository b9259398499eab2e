//! # tug
//!
//! Session-lifecycle core of a command-line content-transfer client. It
//! coordinates a long-running transfer engine, an optional content-serving
//! subsystem, and a single-line terminal progress interface, and guarantees
//! one race-free shutdown path under every combination of completion, open
//! client streams, and user interruption.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  Session Controller                    │
//! │        one select! loop over a typed event channel     │
//! ├────────────────────────────────────────────────────────┤
//! │  ┌───────────────┐  ┌──────────────┐  ┌─────────────┐  │
//! │  │ Transfer      │  │ Stream       │  │ Exit        │  │
//! │  │ Engine (trait)│  │ Server       │  │ Coordinator │  │
//! │  └───────────────┘  └──────────────┘  └─────────────┘  │
//! │  ┌───────────────┐  ┌──────────────┐  ┌─────────────┐  │
//! │  │ File          │  │ Progress     │  │ Terminal    │  │
//! │  │ Enumerator    │  │ Renderer     │  │ Handle      │  │
//! │  └───────────────┘  └──────────────┘  └─────────────┘  │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine and the serving subsystem are collaborators behind traits;
//! instead of nested callbacks they deliver a small closed set of
//! [`session::SessionEvent`]s over one mpsc channel, so ordering follows
//! from the single consumer loop rather than from locks.
//!
//! ## Modules
//!
//! - [`vfs`]: recursive enumeration of a local path into virtual files
//! - [`progress`]: snapshot rendering, byte/ETA formatting, render throttle
//! - [`exit`]: the forward-only shutdown state machine
//! - [`session`]: the top-level controller and its event loop
//! - [`engine`]: transfer engine boundary plus the simulated backend
//! - [`stream`]: content-serving boundary plus the TCP streamer
//! - [`terminal`]: ordered terminal writes with a release-once guard
//! - [`options`] / [`config`]: CLI flags and TOML defaults

pub mod config;
pub mod engine;
pub mod exit;
pub mod options;
pub mod progress;
pub mod session;
pub mod stream;
pub mod terminal;
pub mod vfs;

// Flat re-exports of the public surface
pub use engine::{EngineError, FileInfo, PeerWire, TransferEngine, TransferStats};
pub use exit::{ExitCoordinator, ExitDecision, ExitState, ExitStatus};
pub use progress::{ProgressRenderer, ProgressSnapshot};
pub use session::{SessionController, SessionEvent, SessionOptions};
pub use stream::{StreamError, StreamServer, TcpStreamServer};
pub use vfs::{enumerate, EnumerateError, VirtualFile};
