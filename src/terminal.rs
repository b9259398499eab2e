//! Terminal interface handle.
//!
//! All session output funnels through one [`Terminal`] so banner lines, the
//! in-place progress line, and the final release are strictly ordered. The
//! handle is released at most once; writes after release are dropped.

use std::io::{self, IsTerminal, Stdout, Write};

use crossterm::{
    cursor::MoveToColumn,
    queue,
    terminal::{Clear, ClearType},
};

/// Write-ordered terminal handle with a release-once guard.
#[derive(Debug)]
pub struct Terminal<W: Write> {
    out: W,
    quiet: bool,
    interactive: bool,
    line_open: bool,
    released: bool,
}

impl Terminal<Stdout> {
    /// Terminal over stdout. Line rewriting and styling only make sense on a
    /// real tty, so `interactive` follows `stdout().is_terminal()`.
    pub fn stdout(quiet: bool) -> Self {
        let out = io::stdout();
        let interactive = out.is_terminal();
        Self::new(out, quiet, interactive)
    }
}

impl<W: Write> Terminal<W> {
    pub fn new(out: W, quiet: bool, interactive: bool) -> Self {
        Self {
            out,
            quiet,
            interactive,
            line_open: false,
            released: false,
        }
    }

    /// Whether output may carry ANSI styling.
    pub fn styled(&self) -> bool {
        self.interactive
    }

    /// Writes a full line of session output.
    pub fn write_line(&mut self, text: &str) -> io::Result<()> {
        if self.quiet || self.released {
            return Ok(());
        }
        self.finish_open_line()?;
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    /// Writes a blank separator line.
    pub fn blank_line(&mut self) -> io::Result<()> {
        self.write_line("")
    }

    /// Replaces the current progress line with `line`.
    ///
    /// On an interactive terminal the previous line is erased in place; when
    /// output is piped, each render lands on its own line instead.
    pub fn show_progress(&mut self, line: &str) -> io::Result<()> {
        if self.quiet || self.released {
            return Ok(());
        }
        if self.interactive {
            queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
            write!(self.out, "{line}")?;
            self.line_open = true;
        } else {
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()
    }

    /// Releases the terminal, terminating any open progress line.
    ///
    /// Only the first call has any effect; the return value says whether this
    /// call performed the release.
    pub fn release(&mut self) -> io::Result<bool> {
        if self.released {
            return Ok(false);
        }
        self.released = true;
        if self.line_open {
            writeln!(self.out)?;
            self.line_open = false;
        }
        self.out.flush()?;
        Ok(true)
    }

    fn finish_open_line(&mut self) -> io::Result<()> {
        if self.line_open {
            writeln!(self.out)?;
            self.line_open = false;
        }
        Ok(())
    }
}
