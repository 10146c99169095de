//! Byte Channel Abstraction
//!
//! The protocol only needs three operations from the process behind a
//! session plus a stream of output chunks. Keeping them behind traits lets
//! the lifecycle manager drive a real PTY in production and a scripted shell
//! in tests.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::ShellConfig;
use crate::error::Result;

/// Bidirectional byte channel to an interactive shell
///
/// Implementations must not block the caller for longer than it takes to
/// hand the bytes to a writer thread or buffer.
pub trait ByteChannel: Send + Sync {
    /// Write raw bytes to the shell's input
    fn write(&self, data: &[u8]) -> Result<()>;

    /// Forward new viewport dimensions
    fn resize(&self, cols: u16, rows: u16) -> Result<()>;

    /// Terminate the shell process
    fn kill(&self) -> Result<()>;
}

/// A freshly spawned shell
pub struct SpawnedChannel {
    /// Input side and control operations
    pub channel: Arc<dyn ByteChannel>,

    /// Output chunks in arrival order; closes when the shell exits
    pub output: UnboundedReceiver<Vec<u8>>,

    /// Program that was launched, used for flavor detection
    pub program: String,
}

impl std::fmt::Debug for SpawnedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedChannel")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

/// Factory for byte channels
#[async_trait]
pub trait ChannelSpawner: Send + Sync {
    /// Spawn an interactive shell as described by `config`
    ///
    /// # Errors
    /// Returns an error if the process or its pseudoterminal cannot be created
    async fn spawn(&self, config: &ShellConfig) -> Result<SpawnedChannel>;
}
