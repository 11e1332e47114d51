//! Drives a single execute call against a kernel, racing normal completion
//! against the caller's cancellation token and the configured deadline.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::KernelError;
use crate::outcome::{ExecutionResult, OutputChunk, RawOutcome, RawStatus, map_outcome};
use crate::process::Kernel;
use crate::protocol::KernelEvent;

/// How long an interrupted kernel gets to settle the in-flight evaluation
/// before the coordinator declares it dead.
const INTERRUPT_GRACE: Duration = Duration::from_secs(5);

/// One execution request.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub code: String,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub cancellation_token: CancellationToken,
    /// Sink for incremental output. Chunks are relayed in arrival order; a
    /// dropped receiver only disables relay, aggregation continues.
    pub stream: Option<mpsc::Sender<OutputChunk>>,
}

impl ExecRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            working_dir: None,
            timeout: None,
            cancellation_token: CancellationToken::new(),
            stream: None,
        }
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn with_stream(mut self, stream: mpsc::Sender<OutputChunk>) -> Self {
        self.stream = Some(stream);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptKind {
    Timeout,
    Cancel,
}

enum Step {
    Event(KernelEvent),
    Interrupt(InterruptKind),
}

/// Run one execute call to completion and map its outcome.
///
/// Exactly one of normal completion, cancellation, and deadline expiry wins;
/// once a trigger has fired the others are no longer consulted. An interrupt
/// stops the current evaluation only, leaving a session kernel reusable. If
/// the interrupt cannot be delivered, or the kernel never settles after one,
/// the call resolves to `DeadKernel` instead of hanging.
pub async fn run_execution(
    kernel: &mut dyn Kernel,
    request: &ExecRequest,
) -> Result<ExecutionResult, KernelError> {
    let request_id = kernel
        .submit(&request.code, request.working_dir.as_deref())
        .await?;

    let token = request.cancellation_token.clone();
    let deadline = async {
        match request.timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut output = String::new();
    let mut stdin_requested = false;
    let mut interrupted: Option<InterruptKind> = None;

    loop {
        let step = if interrupted.is_some() {
            // The race is settled; drain until the kernel acknowledges the
            // interrupt, bounded so a dead process cannot hang the caller.
            match tokio::time::timeout(INTERRUPT_GRACE, kernel.next_event()).await {
                Ok(event) => Step::Event(event?),
                Err(_) => {
                    warn!(
                        target: "kernel.coordinator",
                        request = request_id,
                        "kernel did not settle after interrupt"
                    );
                    return Err(KernelError::DeadKernel(
                        "no response to interrupt".to_string(),
                    ));
                }
            }
        } else {
            tokio::select! {
                event = kernel.next_event() => Step::Event(event?),
                () = &mut deadline => Step::Interrupt(InterruptKind::Timeout),
                () = token.cancelled() => Step::Interrupt(InterruptKind::Cancel),
            }
        };

        match step {
            Step::Interrupt(kind) => {
                debug!(
                    target: "kernel.coordinator",
                    request = request_id,
                    ?kind,
                    "interrupting evaluation"
                );
                kernel.interrupt().await.map_err(|e| {
                    warn!(
                        target: "kernel.coordinator",
                        request = request_id,
                        error = %e,
                        "interrupt undeliverable, treating kernel as dead"
                    );
                    KernelError::DeadKernel(e.to_string())
                })?;
                interrupted = Some(kind);
            }
            Step::Event(KernelEvent::Stream { text }) => {
                output.push_str(&text);
                if let Some(stream) = &request.stream {
                    let _ = stream.send(OutputChunk { text }).await;
                }
            }
            Step::Event(KernelEvent::StdinRequest) => stdin_requested = true,
            Step::Event(KernelEvent::Result {
                id,
                status,
                cancelled,
                error,
            }) if id == request_id => {
                let outcome = settle(interrupted, status, cancelled, error, stdin_requested);
                return Ok(map_outcome(&outcome, output, request.timeout));
            }
            Step::Event(other) => {
                debug!(target: "kernel.coordinator", ?other, "ignoring stale kernel event");
            }
        }
    }
}

/// Final raw outcome. When the interrupt was ours, the evaluation itself did
/// not fail: the status is forced back to `Ok` and only the flags record
/// what happened.
fn settle(
    interrupted: Option<InterruptKind>,
    status: RawStatus,
    cancelled: bool,
    error: Option<String>,
    stdin_requested: bool,
) -> RawOutcome {
    match interrupted {
        Some(kind) => RawOutcome {
            status: RawStatus::Ok,
            cancelled: true,
            timed_out: kind == InterruptKind::Timeout,
            stdin_requested,
            error: None,
        },
        None => RawOutcome {
            status,
            cancelled,
            timed_out: false,
            stdin_requested,
            error,
        },
    }
}
