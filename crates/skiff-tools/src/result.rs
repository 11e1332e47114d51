use serde::{Deserialize, Serialize};
use skiff_kernel::ExecutionResult;

use crate::error::ToolError;

/// Core enum for all tool results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ToolResult {
    Python(PythonResult),
    Bash(BashResult),

    // Failure (any tool)
    Error(ToolError),
}

/// Result for python code execution via a kernel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythonResult {
    /// Absent when the evaluation was cancelled or timed out
    pub exit_code: Option<i32>,
    /// Streamed output, concatenated in arrival order
    pub output: String,
    pub cancelled: bool,
    /// The executed code tried to read interactive input
    pub stdin_requested: bool,
    /// Interpreter exception name, kept alongside the fixed exit code 1
    #[serde(default)]
    pub error: Option<String>,
}

impl From<ExecutionResult> for PythonResult {
    fn from(result: ExecutionResult) -> Self {
        Self {
            exit_code: result.exit_code,
            output: result.output,
            cancelled: result.cancelled,
            stdin_requested: result.stdin_requested,
            error: result.error,
        }
    }
}

/// Result for bash command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BashResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub command: String,
}

const MAX_OUTPUT_CHARS: usize = 128 * 1024;
const MAX_OUTPUT_LINES: usize = 2000;
const MAX_STDERR_CHARS: usize = 64 * 1024;
const MAX_STDERR_LINES: usize = 500;

/// Keep the head and tail of oversized output, with a marker for what was
/// dropped.
fn truncate_output(s: &str, max_chars: usize, max_lines: usize) -> String {
    let lines: Vec<&str> = s.lines().collect();
    let char_count = s.len();

    if lines.len() <= max_lines && char_count <= max_chars {
        return s.to_string();
    }

    let head_lines = max_lines / 2;
    let tail_lines = max_lines - head_lines;
    let omitted = lines.len().saturating_sub(max_lines);

    let mut result = String::new();
    for line in lines.iter().take(head_lines) {
        result.push_str(line);
        result.push('\n');
    }
    result.push_str(&format!(
        "\n[... {omitted} lines omitted ({char_count} total chars) ...]\n\n"
    ));
    if lines.len() > head_lines {
        for line in lines.iter().skip(lines.len().saturating_sub(tail_lines)) {
            result.push_str(line);
            result.push('\n');
        }
    }
    result
}

impl ToolResult {
    /// Format the result for LLM consumption
    pub fn llm_format(&self) -> String {
        match self {
            ToolResult::Python(r) => {
                let mut output = truncate_output(&r.output, MAX_OUTPUT_CHARS, MAX_OUTPUT_LINES);
                if let Some(code) = r.exit_code
                    && code != 0
                {
                    if !output.is_empty() && !output.ends_with('\n') {
                        output.push('\n');
                    }
                    output.push_str(&format!("Exit code: {code}"));
                }
                if r.stdin_requested {
                    if !output.is_empty() && !output.ends_with('\n') {
                        output.push('\n');
                    }
                    output.push_str(
                        "[the code requested interactive input; stdin is not available]",
                    );
                }
                output
            }
            ToolResult::Bash(r) => {
                let stdout = truncate_output(&r.stdout, MAX_OUTPUT_CHARS, MAX_OUTPUT_LINES);
                let stderr = truncate_output(&r.stderr, MAX_STDERR_CHARS, MAX_STDERR_LINES);

                let mut output = stdout;
                if r.exit_code != 0 {
                    if !output.is_empty() && !output.ends_with('\n') {
                        output.push('\n');
                    }
                    output.push_str(&format!("Exit code: {}", r.exit_code));
                }
                if !stderr.is_empty() {
                    if !output.is_empty() && !output.ends_with('\n') {
                        output.push('\n');
                    }
                    output.push_str(&format!("Error output:\n{stderr}"));
                }
                output
            }
            ToolResult::Error(e) => format!("Error: {e}"),
        }
    }

    /// Get the variant name as a string for metadata
    pub fn variant_name(&self) -> &'static str {
        match self {
            ToolResult::Python(_) => "Python",
            ToolResult::Bash(_) => "Bash",
            ToolResult::Error(_) => "Error",
        }
    }
}

impl From<PythonResult> for ToolResult {
    fn from(r: PythonResult) -> Self {
        Self::Python(r)
    }
}

impl From<BashResult> for ToolResult {
    fn from(r: BashResult) -> Self {
        Self::Bash(r)
    }
}

impl From<ToolError> for ToolResult {
    fn from(e: ToolError) -> Self {
        Self::Error(e)
    }
}
