//! Exit coordination for the transfer session.
//!
//! A small forward-only state machine decides whether shutdown is currently
//! permitted, serializes shutdown requests, and sequences the engine's own
//! async teardown before the terminal is released. The session controller
//! drives it from the single event loop, so no locking is needed.

use std::process::ExitCode;

use tracing::{debug, warn};

/// Lifecycle state of the exit path. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Normal operation, no shutdown in progress.
    Running,
    /// An exit request was granted but engine teardown has not started.
    ShutdownRequested,
    /// Engine teardown is in flight.
    ShuttingDown,
    /// Teardown finished (or was short-circuited); terminal released.
    Terminated,
}

/// What the caller must do after an exit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    /// Conditions not met; keep running.
    Refused,
    /// Start the engine's async shutdown and report its completion back.
    BeginShutdown,
    /// Release the terminal and end the process right away.
    TerminateNow,
}

/// Final process status, mapped onto an exit code in `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Graceful completion, or a user-requested interrupt.
    Success,
    /// Usage error, enumeration failure, or engine load failure.
    Failure,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => ExitCode::SUCCESS,
            ExitStatus::Failure => ExitCode::FAILURE,
        }
    }
}

/// Serializes exit requests and tracks the shutdown lifecycle.
///
/// A non-forced request is granted only when the transfer is complete, no
/// streaming connections remain open, and the stay-resident flag is unset.
/// In wait mode (`exit_on_drain`) the stay-resident hold lasts only until a
/// streaming client has come and gone. A repeat request while teardown is in
/// flight short-circuits straight to termination; the pending completion
/// then becomes a no-op.
#[derive(Debug)]
pub struct ExitCoordinator {
    state: ExitState,
    stay_resident: bool,
    exit_on_drain: bool,
}

impl ExitCoordinator {
    pub fn new(stay_resident: bool, exit_on_drain: bool) -> Self {
        Self {
            state: ExitState::Running,
            stay_resident,
            exit_on_drain,
        }
    }

    /// Records that the open-stream count drained to zero.
    ///
    /// In wait mode a drained stream lifts the stay-resident hold, so the
    /// next satisfied exit request goes through.
    pub fn note_stream_drained(&mut self) {
        if self.exit_on_drain && self.stay_resident {
            debug!("stream drained, lifting stay-resident hold");
            self.stay_resident = false;
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ExitState {
        self.state
    }

    /// Requests an exit, given the live completion and stream observations.
    pub fn request_exit(
        &mut self,
        force: bool,
        transfer_done: bool,
        open_streams: usize,
    ) -> ExitDecision {
        match self.state {
            ExitState::Running => {
                let satisfied = transfer_done && open_streams == 0 && !self.stay_resident;
                if !force && !satisfied {
                    debug!(
                        transfer_done,
                        open_streams,
                        stay_resident = self.stay_resident,
                        "exit refused"
                    );
                    return ExitDecision::Refused;
                }
                self.state = ExitState::ShutdownRequested;
                self.begin_shutdown()
            }
            ExitState::ShutdownRequested | ExitState::ShuttingDown => {
                // Repeat request: respond immediately instead of waiting for
                // the in-flight teardown. The engine shutdown is not invoked
                // a second time.
                debug!("repeat exit request, terminating immediately");
                self.state = ExitState::Terminated;
                ExitDecision::TerminateNow
            }
            ExitState::Terminated => ExitDecision::Refused,
        }
    }

    fn begin_shutdown(&mut self) -> ExitDecision {
        debug_assert_eq!(self.state, ExitState::ShutdownRequested);
        self.state = ExitState::ShuttingDown;
        debug!("exit granted, beginning engine shutdown");
        ExitDecision::BeginShutdown
    }

    /// Records the engine's shutdown completion.
    ///
    /// Returns `true` when this completion is the one that terminates the
    /// session. A completion arriving after a short-circuited termination is
    /// a harmless no-op and returns `false`.
    pub fn complete_shutdown(&mut self) -> bool {
        match self.state {
            ExitState::ShuttingDown => {
                self.state = ExitState::Terminated;
                true
            }
            ExitState::Terminated => false,
            other => {
                warn!(state = ?other, "unexpected shutdown completion");
                false
            }
        }
    }
}
