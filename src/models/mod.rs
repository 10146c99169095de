//! Core data models for shellbridge
//!
//! The shell session owned by the lifecycle manager, the in-flight command
//! execution tracked by the completion detector, and the shell flavors.

pub mod command_execution;
pub mod shell_session;
pub mod shell_type;

// Re-exports for convenience
pub use command_execution::{
    CommandExecution, CompletionSignal, ExecutionKind, ExecutionState, OutputBuffer,
};
pub use shell_session::{SessionState, ShellSession};
pub use shell_type::ShellType;
