//! Content-serving boundary and the built-in TCP streamer.
//!
//! The session controller only cares about the serving subsystem's boundary:
//! the bound port, the default selection, the open-stream count, and the
//! "all streams closed" notification. [`TcpStreamServer`] is the minimal
//! built-in implementation backing local mode: each accepted connection
//! receives the default file's bytes and is counted while open.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::SessionEvent;
use crate::vfs::VirtualFile;

/// Errors from stream server setup.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Could not bind the requested port.
    #[error("failed to bind stream port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Listener IO failure during setup.
    #[error("stream server io error: {0}")]
    Io(#[from] io::Error),
}

/// Boundary the session controller observes on any serving subsystem.
pub trait StreamServer: Send + Sync {
    /// Port the server is actually bound to.
    fn port(&self) -> u16;

    /// Index of the file served to clients by default.
    fn default_index(&self) -> usize;

    /// Whether clients are offered a playlist instead of one default file.
    /// Display-only; the controller prints a different banner for it.
    fn use_m3u(&self) -> bool;

    /// Number of currently open client streams.
    fn open_streams(&self) -> usize;

    /// Number of files available to clients.
    fn file_count(&self) -> usize;
}

/// Minimal TCP byte-streamer.
///
/// Binds the requested port (0 for an OS-assigned one), serves the default
/// file's bytes to every client through [`VirtualFile::open`], and sends
/// [`SessionEvent::StreamsClosed`] whenever the open-stream count returns to
/// zero.
pub struct TcpStreamServer {
    port: u16,
    default_index: usize,
    use_m3u: bool,
    file_count: usize,
    open: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl TcpStreamServer {
    /// Binds the server and starts accepting connections.
    pub async fn bind(
        port: u16,
        files: Vec<VirtualFile>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Self, StreamError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| StreamError::Bind { port, source })?;
        let port = listener.local_addr()?.port();

        // Default selection: the largest file, which for typical media
        // content is the one a player actually wants.
        let default_index = files
            .iter()
            .enumerate()
            .max_by_key(|(_, f)| f.length())
            .map(|(i, _)| i)
            .unwrap_or(0);
        let use_m3u = files.len() > 1;
        let file_count = files.len();

        let open = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        info!(port, files = file_count, default_index, "stream server bound");

        tokio::spawn(Self::accept_loop(
            listener,
            files.get(default_index).cloned(),
            Arc::clone(&open),
            events,
            cancel.clone(),
        ));

        Ok(Self {
            port,
            default_index,
            use_m3u,
            file_count,
            open,
            cancel,
        })
    }

    async fn accept_loop(
        listener: TcpListener,
        default_file: Option<VirtualFile>,
        open: Arc<AtomicUsize>,
        events: mpsc::Sender<SessionEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("stream server accept loop stopping");
                    return;
                }
                accepted = listener.accept() => accepted,
            };

            let (socket, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept failed: {e}");
                    continue;
                }
            };

            let Some(file) = default_file.clone() else {
                // Nothing to serve; close the connection immediately.
                drop(socket);
                continue;
            };

            open.fetch_add(1, Ordering::SeqCst);
            debug!(%peer, "stream opened");

            let open = Arc::clone(&open);
            let events = events.clone();
            tokio::spawn(async move {
                match Self::serve_client(socket, file).await {
                    Ok(sent) => debug!(%peer, sent, "stream finished"),
                    Err(e) => debug!(%peer, "stream ended: {e}"),
                }
                if open.fetch_sub(1, Ordering::SeqCst) == 1 {
                    let _ = events.send(SessionEvent::StreamsClosed).await;
                }
            });
        }
    }

    /// Streams the whole file to one client.
    ///
    /// The virtual file's reader is blocking, so the copy runs on the
    /// blocking pool against the de-async'd socket.
    async fn serve_client(socket: TcpStream, file: VirtualFile) -> io::Result<u64> {
        let std_socket = socket.into_std()?;
        std_socket.set_nonblocking(false)?;

        task::spawn_blocking(move || {
            let mut reader = file.open_all()?;
            let mut out = std_socket;
            io::copy(&mut reader, &mut out)
        })
        .await
        .map_err(io::Error::other)?
    }

    /// Stops accepting new connections. In-flight streams run to completion.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl StreamServer for TcpStreamServer {
    fn port(&self) -> u16 {
        self.port
    }

    fn default_index(&self) -> usize {
        self.default_index
    }

    fn use_m3u(&self) -> bool {
        self.use_m3u
    }

    fn open_streams(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    fn file_count(&self) -> usize {
        self.file_count
    }
}

impl Drop for TcpStreamServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
