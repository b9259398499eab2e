//! tug CLI entry point.
//!
//! Resolves flags and config, then dispatches to one of two modes: driving a
//! transfer engine session, or serving an enumerated local path with no
//! engine at all.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info};

use tug::config::Config;
use tug::engine::sim::{SimEngine, SimOptions};
use tug::exit::ExitStatus;
use tug::options::{Cli, Mode, Options, UsageError};
use tug::session::{SessionController, SessionOptions, EVENT_CHANNEL_CAPACITY};
use tug::stream::{StreamServer, TcpStreamServer};
use tug::terminal::Terminal;
use tug::vfs::{self, EnumerateError};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; the progress line owns stdout.
    let filter = if cli.verbose { "tug=debug" } else { "tug=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::load_or_default() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tug: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("tug: {e}");
        return ExitCode::FAILURE;
    }

    let opts = match Options::resolve(cli, &config) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match opts.mode.clone() {
        Mode::Local { port, path } => run_local(port, &path, &opts).await,
        Mode::Transfer { source } => run_transfer(&source, &opts, &config).await,
    }
}

/// Local streaming mode: enumerate, serve, stay up until interrupted.
async fn run_local(port: u16, path: &Path, opts: &Options) -> ExitCode {
    let files = match vfs::enumerate(path) {
        Ok(files) => files,
        Err(EnumerateError::PathNotFound(_)) => {
            eprintln!("{}", UsageError::BadLocalPath);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("tug: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (events_tx, mut events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let server = match TcpStreamServer::bind(port, files.clone(), events_tx).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("tug: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut terminal = Terminal::stdout(opts.quiet);
    let banner = (|| {
        terminal.write_line("Available files:")?;
        for (i, file) in files.iter().enumerate() {
            terminal.write_line(&format!("  [{}] {}", i + 1, file.name().display()))?;
        }
        terminal.blank_line()?;
        let note = if server.use_m3u() {
            "using m3u playlist".to_string()
        } else {
            format!("default file is {}", server.default_index() + 1)
        };
        terminal.write_line(&format!(
            "Local streaming enabled on port {} ({note})",
            server.port()
        ))
    })();
    if let Err(e) = banner {
        eprintln!("tug: {e}");
        return ExitCode::FAILURE;
    }

    info!(port = server.port(), files = files.len(), "serving locally");

    // Streams come and go; only the user decides when local mode ends.
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(event) = events_rx.recv() => {
                debug!(?event, "local mode event");
            }
        }
    }

    server.shutdown();
    let _ = terminal.release();
    ExitStatus::Success.into()
}

/// Transfer mode: load the engine and hand the session to the controller.
async fn run_transfer(source: &str, opts: &Options, config: &Config) -> ExitCode {
    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let sim_opts = SimOptions {
        connections: opts.connections,
        uploads: opts.uploads,
        ..SimOptions::default()
    };
    if opts.ephemeral {
        debug!("ephemeral mode requested (no-op for the simulated backend)");
    }

    let engine = match SimEngine::load(source, sim_opts, events_tx.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            // Engine load failures read as usage problems to the user.
            debug!("engine load failed: {e}");
            eprintln!("{}", UsageError::MissingSource);
            return ExitCode::FAILURE;
        }
    };

    let session_opts = SessionOptions {
        stream_port: opts.stream_port,
        stay_resident: opts.stay_resident,
        exit_on_drain: opts.wait,
        refresh_interval: Duration::from_millis(config.ui.refresh_interval_ms),
    };
    let terminal = Terminal::stdout(opts.quiet);
    let controller = SessionController::new(
        Arc::new(engine),
        terminal,
        session_opts,
        events_tx,
        events_rx,
    );

    match controller.run().await {
        Ok(status) => status.into(),
        Err(e) => {
            eprintln!("tug: {e:#}");
            ExitCode::FAILURE
        }
    }
}
