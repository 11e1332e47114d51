use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use super::BASH_TOOL_NAME;
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::result::BashResult;

const DEFAULT_TIMEOUT_MS: u64 = 600_000;
const MAX_TIMEOUT_MS: u64 = 3_600_000;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BashParams {
    /// The command to execute
    pub command: String,
    /// Optional timeout in milliseconds (default 600000, max 3600000)
    #[schemars(range(min = 1, max = 3_600_000))]
    pub timeout: Option<u64>,
}

/// Run one shell command under the shared cancellation/timeout contract:
/// the caller's token and the deadline race the command, and whichever
/// fires first settles the call.
pub async fn run(params: &BashParams, context: &ExecutionContext) -> Result<BashResult, ToolError> {
    if context.is_cancelled() {
        return Err(ToolError::Cancelled(BASH_TOOL_NAME.to_string()));
    }

    if is_banned_command(&params.command) {
        return Err(ToolError::execution(
            BASH_TOOL_NAME,
            format!(
                "Command '{}' is disallowed for security reasons",
                params.command
            ),
        ));
    }

    let timeout_ms = params.timeout.unwrap_or(DEFAULT_TIMEOUT_MS).min(MAX_TIMEOUT_MS);
    let timeout_duration = Duration::from_millis(timeout_ms);

    tokio::select! {
        () = context.cancellation_token.cancelled() => {
            Err(ToolError::Cancelled(BASH_TOOL_NAME.to_string()))
        }
        res = timeout(timeout_duration, run_command(&params.command, context)) => {
            match res {
                Ok(result) => result,
                Err(_) => Err(ToolError::Timeout(BASH_TOOL_NAME.to_string())),
            }
        }
    }
}

async fn run_command(
    command: &str,
    context: &ExecutionContext,
) -> Result<BashResult, ToolError> {
    let output = Command::new("/bin/bash")
        .arg("-c")
        .arg(command)
        .current_dir(&context.working_directory)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ToolError::io(BASH_TOOL_NAME, e.to_string()))?
        .wait_with_output()
        .await
        .map_err(|e| ToolError::io(BASH_TOOL_NAME, e.to_string()))?;

    Ok(BashResult {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
        command: command.to_string(),
    })
}

static BANNED_COMMAND_REGEXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    let banned_commands = [
        // Network tools
        "curl", "wget", "nc", "telnet", "ssh", "scp", "ftp", "sftp",
        // Shell state manipulation
        "alias", "unalias", "exec", "source", ".", "history",
        // System modification
        "sudo", "su", "chown", "useradd", "userdel",
        // Interactive editors
        "vi", "vim", "nano", "emacs", "ed",
    ];

    banned_commands
        .iter()
        .filter_map(|cmd| Regex::new(&format!(r"^\s*(\S*/)?{}\b", regex::escape(cmd))).ok())
        .collect()
});

fn is_banned_command(command: &str) -> bool {
    BANNED_COMMAND_REGEXES.iter().any(|re| re.is_match(command))
}
