//! Session Event System
//!
//! Broadcasts what happens on a shell session to any number of observers:
//! raw output for rendering, lifecycle transitions, and user-visible notices
//! raised when the protocol has to degrade or fall back.

use tokio::sync::broadcast;

use crate::models::SessionState;

/// Events emitted by a shell session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Raw output chunk from the shell
    Output {
        /// Raw output bytes, escapes included
        data: Vec<u8>,
    },
    /// Session lifecycle transition
    StateChanged {
        /// The new state
        state: SessionState,
    },
    /// Something the user should see
    Notice {
        /// Human-readable message
        message: String,
    },
    /// The shell's output stream closed
    Exited,
}

/// Subscription handle for receiving session events
pub struct SessionEventSubscription {
    receiver: broadcast::Receiver<SessionEvent>,
}

impl SessionEventSubscription {
    /// Receive the next event, waiting if necessary
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!("Session event subscriber lagged by {} events", count);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return None,
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!("Session event subscriber lagged by {} events", count);
                }
            }
        }
    }
}

/// Event bus for publishing and subscribing to session events
#[derive(Clone)]
pub struct SessionEventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEventBus {
    /// Create a new event bus with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> SessionEventSubscription {
        SessionEventSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: SessionEvent) {
        // Ignore errors - they just mean no subscribers are active
        let _ = self.sender.send(event);
    }

    /// Publish a user-visible notice
    pub fn notice(&self, message: impl Into<String>) {
        self.publish(SessionEvent::Notice {
            message: message.into(),
        });
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SessionEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
