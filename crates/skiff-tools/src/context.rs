use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

/// Execution context passed to tools during execution
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Unique identifier for this tool call
    pub tool_call_id: String,

    /// Logical session this call belongs to; binds session-mode python
    /// execution to one reusable kernel
    pub session_id: String,

    /// Cancellation token for early termination
    pub cancellation_token: CancellationToken,

    /// Current working directory
    pub working_directory: PathBuf,
}

impl ExecutionContext {
    pub fn new(tool_call_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            session_id: session_id.into(),
            cancellation_token: CancellationToken::new(),
            working_directory: std::env::current_dir().unwrap_or_else(|_| "/".into()),
        }
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn with_working_directory(mut self, dir: PathBuf) -> Self {
        self.working_directory = dir;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
