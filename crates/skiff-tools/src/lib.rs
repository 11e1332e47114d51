//! Tool layer for Skiff: the python execution tool backed by
//! [`skiff_kernel`]'s session pool, the stateless bash executor it falls
//! back to, and the persisted preferences that select between them.

pub mod context;
pub mod error;
pub mod preferences;
pub mod result;
pub mod schema;
pub mod tools;

pub use context::ExecutionContext;
pub use error::ToolError;
pub use preferences::{KernelMode, Preferences, PythonToolMode};
pub use result::{BashResult, PythonResult, ToolResult};
pub use schema::{InputSchema, ToolCall, ToolSchema};
pub use tools::python::{PythonBackend, PythonTool};
