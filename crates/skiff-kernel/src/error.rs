use thiserror::Error;

pub type Result<T> = std::result::Result<T, KernelError>;

#[derive(Debug, Error)]
pub enum KernelError {
    /// The interpreter subprocess failed to start or never completed its
    /// readiness handshake. Not retried at this layer.
    #[error("failed to spawn interpreter: {0}")]
    Spawn(String),

    /// An operation targeted a kernel whose process has exited.
    #[error("kernel process exited: {0}")]
    DeadKernel(String),

    /// A cancellation or timeout signal could not be delivered.
    #[error("failed to interrupt evaluation: {0}")]
    InterruptFailed(String),

    /// The kernel violated the wire protocol.
    #[error("kernel protocol error: {0}")]
    Protocol(String),
}

impl KernelError {
    /// Whether this error means the underlying process is gone. An
    /// undeliverable interrupt counts: the process is no longer reachable,
    /// so the pool treats both the same way (respawn on the next attempt).
    pub fn is_dead_kernel(&self) -> bool {
        matches!(
            self,
            KernelError::DeadKernel(_) | KernelError::InterruptFailed(_)
        )
    }
}
