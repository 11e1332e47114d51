//! Session pool: maps logical session keys to live kernels and decides,
//! per call, whether to reuse, create, or reset one.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::coordinator::{ExecRequest, run_execution};
use crate::error::KernelError;
use crate::outcome::ExecutionResult;
use crate::process::{Kernel, KernelLauncher};

/// How a request binds to a kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelTarget {
    /// Fresh kernel for this call alone, disposed afterward no matter how
    /// the call ended.
    PerCall,
    /// Reusable kernel bound to a caller-supplied session key.
    Session { key: String, reset: bool },
}

#[derive(Default)]
struct SessionSlot {
    kernel: Mutex<Option<Box<dyn Kernel>>>,
}

/// Owns every pooled kernel. Callers hold session keys, never kernels.
///
/// Calls sharing a session key serialize on that key's slot; calls on
/// different keys (and per-call requests) proceed fully in parallel. The
/// registry map itself is only locked for the atomic insert/remove steps.
pub struct KernelPool {
    launcher: Arc<dyn KernelLauncher>,
    sessions: Mutex<HashMap<String, Arc<SessionSlot>>>,
}

impl KernelPool {
    pub fn new(launcher: Arc<dyn KernelLauncher>) -> Self {
        Self {
            launcher,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Execute one request against the kernel the target resolves to.
    pub async fn execute(
        &self,
        target: &KernelTarget,
        request: &ExecRequest,
    ) -> Result<ExecutionResult, KernelError> {
        match target {
            KernelTarget::PerCall => self.execute_per_call(request).await,
            KernelTarget::Session { key, reset } => {
                self.execute_session(key, *reset, request).await
            }
        }
    }

    async fn execute_per_call(&self, request: &ExecRequest) -> Result<ExecutionResult, KernelError> {
        let mut kernel = self.launcher.launch().await?;
        debug!(target: "kernel.pool", id = %kernel.id(), "spawned per-call kernel");
        let result = run_execution(kernel.as_mut(), request).await;
        kernel.shutdown().await;
        result
    }

    async fn execute_session(
        &self,
        key: &str,
        reset: bool,
        request: &ExecRequest,
    ) -> Result<ExecutionResult, KernelError> {
        let slot = self.slot(key).await;
        let mut guard = slot.kernel.lock().await;

        if reset && let Some(mut old) = guard.take() {
            info!(target: "kernel.pool", session = key, id = %old.id(), "resetting session kernel");
            old.shutdown().await;
        }

        // A kernel already known dead is replaced up front, without spending
        // the recovery retry below.
        if let Some(kernel) = guard.as_mut()
            && !kernel.is_alive()
        {
            debug!(target: "kernel.pool", session = key, id = %kernel.id(), "pooled kernel no longer alive");
            if let Some(mut dead) = guard.take() {
                dead.shutdown().await;
            }
        }

        let reused = guard.is_some();
        let mut kernel = match guard.take() {
            Some(kernel) => kernel,
            None => {
                let kernel = self.launcher.launch().await?;
                debug!(target: "kernel.pool", session = key, id = %kernel.id(), "spawned session kernel");
                kernel
            }
        };

        match run_execution(kernel.as_mut(), request).await {
            Ok(result) => {
                *guard = Some(kernel);
                Ok(result)
            }
            Err(err) if reused && err.is_dead_kernel() => {
                warn!(
                    target: "kernel.pool",
                    session = key,
                    error = %err,
                    "session kernel died, respawning once"
                );
                kernel.shutdown().await;
                let mut replacement = self.launcher.launch().await?;
                replacement.ping().await?;
                match run_execution(replacement.as_mut(), request).await {
                    Ok(result) => {
                        *guard = Some(replacement);
                        Ok(result)
                    }
                    Err(err) => {
                        replacement.shutdown().await;
                        Err(err)
                    }
                }
            }
            Err(err) => {
                if err.is_dead_kernel() {
                    kernel.shutdown().await;
                } else {
                    *guard = Some(kernel);
                }
                Err(err)
            }
        }
    }

    async fn slot(&self, key: &str) -> Arc<SessionSlot> {
        let mut sessions = self.sessions.lock().await;
        sessions.entry(key.to_string()).or_default().clone()
    }

    /// Shut down every pooled kernel and clear the registry. Best-effort:
    /// already-dead kernels are tolerated and one slow teardown never blocks
    /// the rest from being attempted. Safe to call repeatedly.
    pub async fn dispose_all(&self) {
        let drained: Vec<(String, Arc<SessionSlot>)> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().collect()
        };
        for (key, slot) in drained {
            let mut guard = slot.kernel.lock().await;
            if let Some(mut kernel) = guard.take() {
                debug!(target: "kernel.pool", session = %key, id = %kernel.id(), "disposing pooled kernel");
                kernel.shutdown().await;
            }
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
