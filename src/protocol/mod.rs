//! Command Execution Protocol
//!
//! Everything between "run this command" and "here is its output":
//! installing the sentinel, detecting completion, extracting output,
//! tracking the working directory and managing the session lifecycle.

pub mod detector;
pub mod directory;
pub mod output;
pub mod sentinel;
pub mod session;

pub use detector::CompletionDetector;
pub use directory::{CommandRunner, DirectoryTracker};
pub use output::{extract_output, truncate_output, BACKGROUND_STARTED};
pub use sentinel::{Sentinel, SentinelInstaller, ShellProfile, INTERRUPT};
pub use session::{ExecuteOptions, ShellSessionManager};
