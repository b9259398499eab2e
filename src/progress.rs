//! Single-line terminal progress rendering.
//!
//! The renderer is a pure function of a [`ProgressSnapshot`]; writing the
//! produced line (and clearing the previous one) is the session controller's
//! job. Styling uses crossterm and is disabled when stdout is not a terminal
//! so the output stays assertable in tests and pipeable in scripts.

use std::time::{Duration, Instant};

use crossterm::style::Stylize;

/// Width of the progress bar in character cells.
const BAR_WIDTH: u8 = 25;

/// Point-in-time view of the transfer used for one render call.
///
/// Rebuilt from live engine/server state on every tick; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Completed percentage, 0..=100.
    pub percent: u8,
    /// Total bytes downloaded so far.
    pub downloaded: u64,
    /// Current transfer rate in bytes per second.
    pub rate: u64,
    /// Peers actively sending to us.
    pub active_peers: usize,
    /// All connected peers.
    pub total_peers: usize,
    /// Open streaming connections; `None` when streaming is disabled.
    pub open_streams: Option<usize>,
    /// Estimated seconds remaining; `None` when unknown.
    pub eta_seconds: Option<u64>,
}

/// Renders snapshots into a single formatted terminal line.
#[derive(Debug, Clone)]
pub struct ProgressRenderer {
    styled: bool,
}

impl ProgressRenderer {
    /// Creates a renderer. `styled` enables ANSI colors.
    pub fn new(styled: bool) -> Self {
        Self { styled }
    }

    /// Formats one snapshot as a full progress line.
    pub fn render(&self, snapshot: &ProgressSnapshot) -> String {
        let mut line = String::new();

        let percent = format!("{:>3}%", snapshot.percent.min(100));
        line.push_str(&self.paint(percent, |s| s.magenta().to_string()));
        line.push(' ');

        let bar = format!("[{}]", bar(snapshot.percent));
        line.push_str(&self.paint(bar, |s| s.green().bold().to_string()));
        line.push_str("  ");

        line.push_str(&self.paint(format_bytes(snapshot.downloaded), |s| {
            s.yellow().bold().to_string()
        }));
        line.push_str("  ");

        let rate = format!("{}/s", format_bytes(snapshot.rate));
        line.push_str(&self.paint(rate, |s| s.yellow().bold().to_string()));
        line.push_str("  ");

        let peers = format!("{}/{} peers", snapshot.active_peers, snapshot.total_peers);
        line.push_str(&self.paint(peers, |s| s.yellow().bold().to_string()));
        line.push_str("  ");

        if let Some(streams) = snapshot.open_streams {
            let streams = format!("{streams} streams");
            line.push_str(&self.paint(streams, |s| s.yellow().bold().to_string()));
            line.push_str("  ");
        }

        let eta = format!("ETA: {}", format_eta(snapshot.eta_seconds));
        line.push_str(&self.paint(eta, |s| s.yellow().bold().to_string()));

        line
    }

    fn paint(&self, text: String, apply: impl Fn(String) -> String) -> String {
        if self.styled {
            apply(text)
        } else {
            text
        }
    }
}

/// Builds the bar interior: `floor(percent / 4)` filled cells, clamped to
/// `[0, BAR_WIDTH]`, with an arrow head after the last filled cell.
pub fn bar(percent: u8) -> String {
    let cells = usize::from((percent / 4).min(BAR_WIDTH));
    let mut out = String::with_capacity(usize::from(BAR_WIDTH) + 1);
    out.push_str(&"=".repeat(cells));
    out.push(if cells > 0 { '>' } else { ' ' });
    out.push_str(&" ".repeat(usize::from(BAR_WIDTH) - cells));
    out
}

/// Formats a byte count in human units with a truncated fractional digit.
///
/// The value is divided by 1024 up to three times while it is at least 1024,
/// stepping the unit label B -> KB -> MB -> GB. Both digits truncate rather
/// than round, so 1535 bytes is "1.4KB", not "1.5KB".
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = "B";

    for next in ["KB", "MB", "GB"] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }

    let upper = value.floor();
    let lower = ((value - upper) * 10.0).floor();
    format!("{}.{}{}", upper as u64, lower as u64, unit)
}

/// Formats an ETA in compact units, or "unknown".
pub fn format_eta(seconds: Option<u64>) -> String {
    match seconds {
        None => "unknown".to_string(),
        Some(s) if s >= 3600 => format!("{}h {:02}m", s / 3600, (s % 3600) / 60),
        Some(s) if s >= 60 => format!("{}m {:02}s", s / 60, s % 60),
        Some(s) => format!("{s}s"),
    }
}

/// One-render-per-cooldown-window gate.
///
/// A forced render bypasses the check but still resets the window, so the
/// final render on completion cannot be immediately followed by a timed one.
#[derive(Debug)]
pub struct Throttle {
    cooldown: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: None,
        }
    }

    /// Returns whether a render may happen now, recording it if so.
    pub fn acquire(&mut self, force: bool) -> bool {
        self.acquire_at(force, Instant::now())
    }

    fn acquire_at(&mut self, force: bool, now: Instant) -> bool {
        let expired = self
            .last
            .is_none_or(|last| now.duration_since(last) >= self.cooldown);
        if force || expired {
            self.last = Some(now);
            true
        } else {
            false
        }
    }
}
