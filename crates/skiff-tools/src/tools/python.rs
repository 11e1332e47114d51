//! Kernel-backed python tool.
//!
//! Availability is resolved once, when the tool is created: the interpreter
//! is probed (unless the escape hatch disables the check) and the outcome is
//! a tagged capability rather than a per-execution re-probe. Callers holding
//! `Unavailable` fall back to the bash executor when preferences allow it.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use skiff_kernel::{
    ExecRequest, KernelConfig, KernelPool, KernelTarget, OutputChunk, PythonLauncher,
};

use super::PYTHON_TOOL_NAME;
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::preferences::{KernelMode, Preferences, PythonToolMode};
use crate::result::PythonResult;
use crate::schema::{InputSchema, ToolSchema};

/// When set (to anything but `0`), the interpreter availability probe is
/// skipped. Meant for test harnesses that provide their own interpreter.
pub const SKIP_PYTHON_CHECK_ENV: &str = "SKIFF_SKIP_PYTHON_CHECK";

const DEFAULT_INTERPRETER: &str = "python3";
const DEFAULT_TIMEOUT_MS: u64 = 600_000;
const MAX_TIMEOUT_MS: u64 = 3_600_000;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PythonParams {
    /// Python source to evaluate in the session interpreter
    pub code: String,
    /// Optional timeout in milliseconds (default 600000, max 3600000)
    #[schemars(range(min = 1, max = 3_600_000))]
    pub timeout: Option<u64>,
    /// Discard the session interpreter and start fresh before evaluating
    pub reset: Option<bool>,
}

/// Outcome of the one-time capability check.
pub enum PythonBackend {
    /// The kernel path is usable.
    Kernel(PythonTool),
    /// The probe failed or preferences excluded the kernel; in `both` mode
    /// callers fall back to the bash executor, in `ipy-only` mode the reason
    /// is surfaced.
    Unavailable { reason: String },
}

pub struct PythonTool {
    pool: Arc<KernelPool>,
    kernel_mode: KernelMode,
}

impl PythonTool {
    /// Resolve the python capability for the given preferences. Probes the
    /// interpreter once; never probed again per execution.
    pub async fn resolve(prefs: &Preferences) -> PythonBackend {
        if prefs.python.mode == PythonToolMode::BashOnly {
            return PythonBackend::Unavailable {
                reason: "python tool disabled by preferences".to_string(),
            };
        }

        let interpreter = prefs
            .python
            .interpreter
            .clone()
            .unwrap_or_else(|| DEFAULT_INTERPRETER.to_string());

        if skip_probe() {
            debug!(
                target: "tools.python",
                "interpreter availability probe skipped via {SKIP_PYTHON_CHECK_ENV}"
            );
        } else if let Err(reason) = probe_interpreter(&interpreter).await {
            warn!(target: "tools.python", %reason, "python kernel unavailable");
            return PythonBackend::Unavailable { reason };
        }

        let config = KernelConfig {
            interpreter,
            ..KernelConfig::default()
        };
        PythonBackend::Kernel(PythonTool {
            pool: Arc::new(KernelPool::new(Arc::new(PythonLauncher::new(config)))),
            kernel_mode: prefs.python.kernel_mode,
        })
    }

    /// Execute one python tool call. Streams incremental output into
    /// `stream` when given; the aggregated text lands in the result either
    /// way.
    pub async fn run(
        &self,
        params: &PythonParams,
        context: &ExecutionContext,
        stream: Option<mpsc::Sender<OutputChunk>>,
    ) -> Result<PythonResult, ToolError> {
        if context.is_cancelled() {
            return Err(ToolError::Cancelled(PYTHON_TOOL_NAME.to_string()));
        }

        let timeout_ms = params.timeout.unwrap_or(DEFAULT_TIMEOUT_MS).min(MAX_TIMEOUT_MS);
        let mut request = ExecRequest::new(params.code.clone())
            .with_timeout(Duration::from_millis(timeout_ms))
            .with_cancellation_token(context.cancellation_token.clone())
            .with_working_dir(context.working_directory.clone());
        if let Some(stream) = stream {
            request = request.with_stream(stream);
        }

        let target = kernel_target(
            self.kernel_mode,
            &context.session_id,
            params.reset.unwrap_or(false),
        );
        let result = self
            .pool
            .execute(&target, &request)
            .await
            .map_err(|e| ToolError::execution(PYTHON_TOOL_NAME, e.to_string()))?;
        Ok(PythonResult::from(result))
    }

    /// Shut down every pooled kernel. Used at process-wide teardown.
    pub async fn dispose(&self) {
        self.pool.dispose_all().await;
    }

    pub fn schema() -> ToolSchema {
        ToolSchema {
            name: PYTHON_TOOL_NAME.to_string(),
            description:
                "Execute Python code in a stateful interpreter session. Variables and imports \
                 persist between calls within the same session."
                    .to_string(),
            input_schema: InputSchema::from(schemars::schema_for!(PythonParams)),
        }
    }
}

fn kernel_target(mode: KernelMode, session_id: &str, reset: bool) -> KernelTarget {
    match mode {
        KernelMode::PerCall => KernelTarget::PerCall,
        KernelMode::Session => KernelTarget::Session {
            key: session_id.to_string(),
            reset,
        },
    }
}

fn skip_probe() -> bool {
    std::env::var_os(SKIP_PYTHON_CHECK_ENV).is_some_and(|v| v != "0")
}

async fn probe_interpreter(interpreter: &str) -> Result<(), String> {
    let status = Command::new(interpreter)
        .arg("-c")
        .arg("import sys; sys.exit(0)")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    match tokio::time::timeout(PROBE_TIMEOUT, status).await {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => Err(format!("{interpreter} probe exited with {status}")),
        Ok(Err(e)) => Err(format!("failed to launch {interpreter}: {e}")),
        Err(_) => Err(format!(
            "{interpreter} probe did not respond within {PROBE_TIMEOUT:?}"
        )),
    }
}
