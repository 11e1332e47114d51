//! Kernel subprocess ownership: spawning, the readiness handshake, event
//! plumbing, interrupts, and teardown.

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::KernelError;
use crate::protocol::{KernelEvent, Request};

const DRIVER_SOURCE: &str = include_str!("driver.py");

/// Buffered events between the reader task and the consumer. Large enough
/// that a chatty evaluation does not stall the reader while the consumer is
/// relaying a chunk.
const EVENT_BUFFER: usize = 64;

const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Opaque identity assigned to a kernel at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelId(Uuid);

impl KernelId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Interpreter executable to spawn.
    pub interpreter: String,
    /// How long spawn plus the readiness handshake may take.
    pub spawn_timeout: Duration,
    /// How long one ping round-trip may take.
    pub ping_timeout: Duration,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            spawn_timeout: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(2),
        }
    }
}

/// One interactive interpreter kernel. Implementations own the subprocess
/// (or a stand-in) and expose the event-pump surface the coordinator drives.
///
/// Methods take `&mut self`: a kernel executes at most one operation at a
/// time, and the pool serializes access per session key.
#[async_trait]
pub trait Kernel: Send {
    fn id(&self) -> KernelId;

    /// Cheap local liveness check. May be stale until the process is
    /// actually probed or written to.
    fn is_alive(&mut self) -> bool;

    /// Send one evaluation request; returns its request id. Delivery
    /// failure means the process is gone.
    async fn submit(&mut self, code: &str, working_dir: Option<&Path>)
    -> Result<u64, KernelError>;

    /// Next event from the kernel. `DeadKernel` once the stream closes.
    async fn next_event(&mut self) -> Result<KernelEvent, KernelError>;

    /// Interrupt the current evaluation without tearing the process down.
    async fn interrupt(&mut self) -> Result<(), KernelError>;

    /// Active round-trip health probe with its own short timeout.
    async fn ping(&mut self) -> Result<(), KernelError>;

    /// Request graceful termination. Idempotent; never fails outward.
    async fn shutdown(&mut self);
}

/// Spawns kernels. The seam that lets the pool and tests supply their own
/// kernel implementations.
#[async_trait]
pub trait KernelLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Kernel>, KernelError>;
}

/// Launches real Python driver subprocesses.
pub struct PythonLauncher {
    config: KernelConfig,
}

impl PythonLauncher {
    pub fn new(config: KernelConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl KernelLauncher for PythonLauncher {
    async fn launch(&self) -> Result<Box<dyn Kernel>, KernelError> {
        let kernel = KernelProcess::start(&self.config).await?;
        Ok(Box::new(kernel))
    }
}

/// A live interpreter subprocess speaking the driver protocol.
#[derive(Debug)]
pub struct KernelProcess {
    id: KernelId,
    child: Child,
    stdin: ChildStdin,
    events: mpsc::Receiver<KernelEvent>,
    reader: JoinHandle<()>,
    ping_timeout: Duration,
    next_request: u64,
}

impl KernelProcess {
    /// Spawn the interpreter and wait for its readiness handshake.
    pub async fn start(config: &KernelConfig) -> Result<Self, KernelError> {
        let id = KernelId::new();
        let mut child = Command::new(&config.interpreter)
            .arg("-u")
            .arg("-c")
            .arg(DRIVER_SOURCE)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                KernelError::Spawn(format!("failed to launch {}: {e}", config.interpreter))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| KernelError::Spawn("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| KernelError::Spawn("child stdout unavailable".to_string()))?;

        let (tx, mut events) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(read_events(stdout, tx, id));
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(relay_stderr(stderr, id));
        }

        match tokio::time::timeout(config.spawn_timeout, events.recv()).await {
            Ok(Some(KernelEvent::Ready)) => {}
            Ok(Some(other)) => {
                return Err(KernelError::Protocol(format!(
                    "expected ready handshake, got {other:?}"
                )));
            }
            Ok(None) => {
                return Err(KernelError::Spawn(
                    "interpreter exited before completing the handshake".to_string(),
                ));
            }
            Err(_) => {
                return Err(KernelError::Spawn(format!(
                    "readiness handshake timed out after {:?}",
                    config.spawn_timeout
                )));
            }
        }

        debug!(target: "kernel.process", %id, interpreter = %config.interpreter, "kernel ready");
        Ok(Self {
            id,
            child,
            stdin,
            events,
            reader,
            ping_timeout: config.ping_timeout,
            next_request: 0,
        })
    }

    async fn write_request(&mut self, request: &Request<'_>) -> Result<(), KernelError> {
        let payload =
            serde_json::to_vec(request).map_err(|e| KernelError::Protocol(e.to_string()))?;
        // A write failure means the pipe is closed, i.e. the process is gone.
        self.stdin
            .write_all(&payload)
            .await
            .map_err(|e| KernelError::DeadKernel(e.to_string()))?;
        self.stdin
            .write_all(b"\n")
            .await
            .map_err(|e| KernelError::DeadKernel(e.to_string()))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| KernelError::DeadKernel(e.to_string()))?;
        Ok(())
    }

    fn next_request_id(&mut self) -> u64 {
        self.next_request += 1;
        self.next_request
    }
}

#[async_trait]
impl Kernel for KernelProcess {
    fn id(&self) -> KernelId {
        self.id
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn submit(
        &mut self,
        code: &str,
        working_dir: Option<&Path>,
    ) -> Result<u64, KernelError> {
        let id = self.next_request_id();
        let cwd = working_dir.map(|p| p.to_string_lossy().into_owned());
        self.write_request(&Request::Execute {
            id,
            code,
            cwd: cwd.as_deref(),
        })
        .await?;
        Ok(id)
    }

    async fn next_event(&mut self) -> Result<KernelEvent, KernelError> {
        self.events
            .recv()
            .await
            .ok_or_else(|| KernelError::DeadKernel("kernel output stream closed".to_string()))
    }

    async fn interrupt(&mut self) -> Result<(), KernelError> {
        let pid = self
            .child
            .id()
            .ok_or_else(|| KernelError::InterruptFailed("process already exited".to_string()))?;
        let pid = i32::try_from(pid)
            .map_err(|_| KernelError::InterruptFailed(format!("pid {pid} out of range")))?;
        signal::kill(Pid::from_raw(pid), Signal::SIGINT)
            .map_err(|e| KernelError::InterruptFailed(e.to_string()))?;
        debug!(target: "kernel.process", id = %self.id, "sent interrupt");
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), KernelError> {
        let id = self.next_request_id();
        self.write_request(&Request::Ping { id }).await?;

        let deadline = tokio::time::Instant::now() + self.ping_timeout;
        loop {
            let event = tokio::time::timeout_at(deadline, self.events.recv())
                .await
                .map_err(|_| KernelError::DeadKernel("ping timed out".to_string()))?
                .ok_or_else(|| {
                    KernelError::DeadKernel("kernel output stream closed".to_string())
                })?;
            match event {
                KernelEvent::Pong { id: pong } if pong == id => return Ok(()),
                other => {
                    debug!(target: "kernel.process", ?other, "ignoring event while awaiting pong");
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        let _ = self.write_request(&Request::Shutdown).await;
        if tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait())
            .await
            .is_err()
        {
            let _ = self.child.start_kill();
            let _ = self.child.wait().await;
        }
        self.reader.abort();
        debug!(target: "kernel.process", id = %self.id, "kernel shut down");
    }
}

async fn read_events(stdout: ChildStdout, tx: mpsc::Sender<KernelEvent>, id: KernelId) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<KernelEvent>(line) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(target: "kernel.process", %id, error = %e, "discarding malformed kernel event");
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(target: "kernel.process", %id, error = %e, "kernel stdout read failed");
                break;
            }
        }
    }
    debug!(target: "kernel.process", %id, "kernel output stream closed");
}

async fn relay_stderr(stderr: ChildStderr, id: KernelId) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "kernel.stderr", %id, "{}", line.trim_end());
    }
}
