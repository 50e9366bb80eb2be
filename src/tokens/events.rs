use chrono::{DateTime, Utc};
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::trace;

const BUFFER_SIZE: usize = 50;

/// Notifications published by the token manager after each refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    Refreshed {
        expires_at: DateTime<Utc>,
    },
    RefreshFailed {
        consecutive_failures: u32,
        reason: &'static str,
        message: String,
    },
    FallbackActivated {
        consecutive_failures: u32,
    },
    FallbackCleared,
}

/// Fan-out of [`TokenEvent`]s. Slow subscribers lag and skip events.
#[derive(Debug, Clone)]
pub struct TokenEvents {
    sender: Sender<TokenEvent>,
}

impl Default for TokenEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUFFER_SIZE);
        Self { sender }
    }

    pub fn subscribe(&self) -> Receiver<TokenEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: TokenEvent) {
        // no subscribers is fine
        if let Err(err) = self.sender.send(event) {
            trace!("token event dropped: {:?}", err.0);
        }
    }
}
