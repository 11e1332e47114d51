//! Interactive execution kernel management for Skiff.
//!
//! A kernel is a long-lived interpreter subprocess that retains state
//! between code submissions. This crate owns the whole lifecycle: spawning
//! and the readiness handshake ([`process`]), the timeout/cancellation race
//! around each execute call ([`coordinator`]), pooling and reuse keyed by
//! logical session ([`pool`]), and the mapping from raw kernel outcomes to
//! the externally visible result contract ([`outcome`]).

pub mod coordinator;
pub mod error;
pub mod outcome;
pub mod pool;
pub mod process;
pub mod protocol;
#[cfg(test)]
pub(crate) mod test_support;

pub use coordinator::{ExecRequest, run_execution};
pub use error::{KernelError, Result};
pub use outcome::{ExecutionResult, OutputChunk, RawOutcome, RawStatus, map_outcome};
pub use pool::{KernelPool, KernelTarget};
pub use process::{Kernel, KernelConfig, KernelId, KernelLauncher, KernelProcess, PythonLauncher};
pub use protocol::KernelEvent;
