//! Raw kernel outcomes and their mapping into the externally visible
//! execution result contract.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What the interpreter reported for an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawStatus {
    Ok,
    Error,
}

/// Kernel-level outcome of a single execute call, before mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutcome {
    pub status: RawStatus,
    pub cancelled: bool,
    pub timed_out: bool,
    pub stdin_requested: bool,
    /// Exception name reported by the interpreter when `status` is `Error`.
    pub error: Option<String>,
}

/// One unit of incremental output relayed during an execute call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub text: String,
}

/// Externally visible result of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// `Some(0)` on clean completion, `Some(1)` on interpreter error, absent
    /// when the evaluation was cancelled before completing.
    pub exit_code: Option<i32>,
    /// Streamed chunks concatenated in arrival order.
    pub output: String,
    pub cancelled: bool,
    pub stdin_requested: bool,
    /// The interpreter's real error identity. The exit code is pinned to 1
    /// for in-process errors because the kernel protocol has no process exit
    /// status for them; this field keeps the information that pinning loses.
    #[serde(default)]
    pub error: Option<String>,
}

/// Normalize a raw outcome into the external contract.
///
/// `timeout` is the deadline that was configured for the call; it is only
/// consulted to render the annotation on timed-out results.
pub fn map_outcome(
    outcome: &RawOutcome,
    output: String,
    timeout: Option<Duration>,
) -> ExecutionResult {
    let exit_code = match outcome.status {
        RawStatus::Error => Some(1),
        RawStatus::Ok if outcome.cancelled => None,
        RawStatus::Ok => Some(0),
    };

    let mut output = output;
    if outcome.timed_out
        && let Some(timeout) = timeout
    {
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(&format!(
            "Command timed out after {} seconds",
            timeout.as_secs()
        ));
    }

    ExecutionResult {
        exit_code,
        output,
        cancelled: outcome.cancelled,
        stdin_requested: outcome.stdin_requested,
        error: outcome.error.clone(),
    }
}
