//! End-to-end session lifecycle tests.
//!
//! These drive the full controller loop with a scripted engine: readiness,
//! progress rendering, stream-gated exit, stay-resident mode, and the
//! graceful shutdown handoff.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use tug::engine::{FileInfo, PeerWire, TransferEngine, TransferStats};
use tug::exit::ExitStatus;
use tug::session::{SessionController, SessionEvent, SessionOptions, EVENT_CHANNEL_CAPACITY};
use tug::stream::{StreamServer, TcpStreamServer};
use tug::terminal::Terminal;

/// Engine whose counters the test mutates directly.
struct ScriptedEngine {
    files: Vec<FileInfo>,
    percent: AtomicU8,
    done: AtomicBool,
    shutdowns: AtomicUsize,
}

impl ScriptedEngine {
    fn new(percent: u8, done: bool) -> Arc<Self> {
        Arc::new(Self {
            files: vec![FileInfo {
                path: PathBuf::from("/tmp/movies/a.mp4"),
                length: 1000,
            }],
            percent: AtomicU8::new(percent),
            done: AtomicBool::new(done),
            shutdowns: AtomicUsize::new(0),
        })
    }
}

impl TransferEngine for ScriptedEngine {
    fn files(&self) -> Vec<FileInfo> {
        self.files.clone()
    }

    fn stats(&self) -> TransferStats {
        let percent = self.percent.load(Ordering::SeqCst);
        TransferStats {
            percent,
            downloaded: u64::from(percent) * 10,
            rate: 1024,
            eta_seconds: Some(5),
        }
    }

    fn wires(&self) -> Vec<PeerWire> {
        vec![
            PeerWire { choked: false },
            PeerWire { choked: false },
            PeerWire { choked: true },
        ]
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Terminal sink shareable between the controller and the test.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct Harness {
    engine: Arc<ScriptedEngine>,
    events: mpsc::Sender<SessionEvent>,
    output: SharedBuf,
    controller: SessionController<ScriptedEngine, SharedBuf>,
}

fn harness(engine: Arc<ScriptedEngine>, opts: SessionOptions) -> Harness {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let output = SharedBuf::default();
    let terminal = Terminal::new(output.clone(), false, false);
    let controller = SessionController::new(Arc::clone(&engine), terminal, opts, tx.clone(), rx);
    Harness {
        engine,
        events: tx,
        output,
        controller,
    }
}

#[tokio::test]
async fn completed_transfer_renders_final_line_and_exits_success() {
    let h = harness(ScriptedEngine::new(100, true), SessionOptions::default());

    h.events.send(SessionEvent::EngineReady).await.unwrap();
    h.events.send(SessionEvent::EngineDone).await.unwrap();

    let status = timeout(Duration::from_secs(5), h.controller.run())
        .await
        .expect("session should finish")
        .unwrap();
    assert_eq!(status, ExitStatus::Success);

    // Graceful path: exactly one engine shutdown.
    assert_eq!(h.engine.shutdowns.load(Ordering::SeqCst), 1);

    let out = h.output.contents();
    assert!(out.contains("Initializing transfer engine..."));
    assert!(out.contains("Downloading files:"));
    assert!(out.contains("[1] /tmp/movies/a.mp4"));

    // The final line is the forced 100% render with a full bar.
    let last = out.lines().last().unwrap();
    assert!(last.starts_with("100%"), "unexpected final line: {last}");
    assert!(last.contains(&format!("[{}>]", "=".repeat(25))));
    assert!(last.contains("2/3 peers"));
}

#[tokio::test]
async fn exit_waits_until_open_streams_drain() {
    let dir = TempDir::new().unwrap();
    // Large enough that loopback socket buffers cannot swallow it while the
    // client stalls, keeping the stream open.
    std::fs::write(dir.path().join("movie.bin"), vec![7u8; 8 * 1024 * 1024]).unwrap();
    let files = tug::vfs::enumerate(dir.path()).unwrap();

    let engine = ScriptedEngine::new(100, true);
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let output = SharedBuf::default();
    let terminal = Terminal::new(output.clone(), false, false);
    let server = TcpStreamServer::bind(0, files, tx.clone()).await.unwrap();
    let port = server.port();
    let controller =
        SessionController::new(Arc::clone(&engine), terminal, SessionOptions::default(), tx.clone(), rx)
            .with_server(server);

    // A client connects and stalls without reading.
    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    sleep(Duration::from_millis(200)).await;

    tx.send(SessionEvent::EngineReady).await.unwrap();
    tx.send(SessionEvent::EngineDone).await.unwrap();

    let handle = tokio::spawn(controller.run());
    sleep(Duration::from_millis(300)).await;

    // Transfer is done but a stream is open: the session must still be up
    // and no shutdown may have started.
    assert!(!handle.is_finished());
    assert_eq!(engine.shutdowns.load(Ordering::SeqCst), 0);

    // Client drains and disconnects; the session now winds down.
    let mut sink = Vec::new();
    client.read_to_end(&mut sink).await.unwrap();
    assert_eq!(sink.len(), 8 * 1024 * 1024);

    let status = timeout(Duration::from_secs(5), handle)
        .await
        .expect("session should finish")
        .unwrap()
        .unwrap();
    assert_eq!(status, ExitStatus::Success);
    assert_eq!(engine.shutdowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn wait_mode_exits_after_a_client_has_come_and_gone() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("clip.bin"), vec![3u8; 1024]).unwrap();
    let files = tug::vfs::enumerate(dir.path()).unwrap();

    let engine = ScriptedEngine::new(100, true);
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let output = SharedBuf::default();
    let terminal = Terminal::new(output.clone(), false, false);
    let server = TcpStreamServer::bind(0, files, tx.clone()).await.unwrap();
    let port = server.port();
    let opts = SessionOptions {
        stay_resident: true,
        exit_on_drain: true,
        ..SessionOptions::default()
    };
    let controller =
        SessionController::new(Arc::clone(&engine), terminal, opts, tx.clone(), rx)
            .with_server(server);

    tx.send(SessionEvent::EngineReady).await.unwrap();
    tx.send(SessionEvent::EngineDone).await.unwrap();

    let handle = tokio::spawn(controller.run());
    sleep(Duration::from_millis(300)).await;

    // No client has streamed yet, so completion alone must not end the
    // session.
    assert!(!handle.is_finished());
    assert_eq!(engine.shutdowns.load(Ordering::SeqCst), 0);

    // One client comes and goes; that satisfies the wait condition.
    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut sink = Vec::new();
    client.read_to_end(&mut sink).await.unwrap();
    assert_eq!(sink.len(), 1024);
    drop(client);

    let status = timeout(Duration::from_secs(5), handle)
        .await
        .expect("session should finish")
        .unwrap()
        .unwrap();
    assert_eq!(status, ExitStatus::Success);
    assert_eq!(engine.shutdowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stay_resident_refuses_completion_exit() {
    let opts = SessionOptions {
        stay_resident: true,
        ..SessionOptions::default()
    };
    let h = harness(ScriptedEngine::new(100, true), opts);

    h.events.send(SessionEvent::EngineReady).await.unwrap();
    h.events.send(SessionEvent::EngineDone).await.unwrap();

    let engine = Arc::clone(&h.engine);
    let handle = tokio::spawn(h.controller.run());
    sleep(Duration::from_millis(400)).await;

    // Completion alone must not end a stay-resident session.
    assert!(!handle.is_finished());
    assert_eq!(engine.shutdowns.load(Ordering::SeqCst), 0);
    handle.abort();
}

#[tokio::test]
async fn displayed_percent_never_decreases() {
    let opts = SessionOptions {
        refresh_interval: Duration::from_millis(50),
        ..SessionOptions::default()
    };
    let h = harness(ScriptedEngine::new(80, false), opts);

    h.events.send(SessionEvent::EngineReady).await.unwrap();

    let engine = Arc::clone(&h.engine);
    let events = h.events.clone();
    let output = h.output.clone();
    let handle = tokio::spawn(h.controller.run());

    sleep(Duration::from_millis(150)).await;
    // The engine's percent wobbles backwards; the display must not.
    engine.percent.store(60, Ordering::SeqCst);
    sleep(Duration::from_millis(150)).await;

    engine.done.store(true, Ordering::SeqCst);
    engine.percent.store(100, Ordering::SeqCst);
    events.send(SessionEvent::EngineDone).await.unwrap();

    let status = timeout(Duration::from_secs(5), handle)
        .await
        .expect("session should finish")
        .unwrap()
        .unwrap();
    assert_eq!(status, ExitStatus::Success);

    let out = output.contents();
    let percents: Vec<u8> = out
        .lines()
        .filter_map(|l| l.split('%').next().and_then(|p| p.trim().parse().ok()))
        .collect();
    assert!(!percents.is_empty());
    assert!(
        percents.windows(2).all(|w| w[0] <= w[1]),
        "percent went backwards: {percents:?}"
    );
    assert!(!out.lines().any(|l| l.trim_start().starts_with("60%")));
}

#[tokio::test]
async fn quiet_session_produces_no_output() {
    let engine = ScriptedEngine::new(100, true);
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let output = SharedBuf::default();
    let terminal = Terminal::new(output.clone(), true, false);
    let controller =
        SessionController::new(Arc::clone(&engine), terminal, SessionOptions::default(), tx.clone(), rx);

    tx.send(SessionEvent::EngineReady).await.unwrap();
    tx.send(SessionEvent::EngineDone).await.unwrap();

    let status = timeout(Duration::from_secs(5), controller.run())
        .await
        .expect("session should finish")
        .unwrap();
    assert_eq!(status, ExitStatus::Success);
    assert_eq!(output.contents(), "");
}
