//! Pseudoterminal (PTY) Management
//!
//! The byte channel boundary the protocol talks through, its `portable-pty`
//! implementation, and the event bus sessions publish on.

pub mod channel;
pub mod events;
pub mod process;

pub use channel::{ByteChannel, ChannelSpawner, SpawnedChannel};
pub use events::{SessionEvent, SessionEventBus, SessionEventSubscription};
pub use process::{get_default_shell, get_user_shell, PtyChannel, PtySpawner};
