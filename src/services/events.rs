//! Event bus for feed operations
//!
//! Services emit an event after every successful write and every served
//! feed page. Nothing in the write path depends on a listener being present.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Events emitted by services
#[derive(Debug, Clone)]
pub enum FeedEvent {
    ItemCreated {
        id: i64,
        owner_id: i64,
        title: String,
    },
    ItemUpdated {
        id: i64,
    },
    ItemDeleted {
        id: i64,
    },
    InteractionRecorded {
        user_id: i64,
        item_id: i64,
        interaction_type: String,
    },
    CommentAdded {
        id: i64,
        item_id: i64,
        user_id: i64,
    },
    UserFollowed {
        follower_id: i64,
        followee_id: i64,
    },
    UserUnfollowed {
        follower_id: i64,
        followee_id: i64,
    },
    FeedServed {
        user_id: Option<i64>,
        count: usize,
        cache_hit: bool,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &FeedEvent);
}

/// Broadcast bus for feed events
pub struct EventBus {
    sender: broadcast::Sender<FeedEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: FeedEvent) {
        trace!(event = ?event, "Emitting feed event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Audit trail listener
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &FeedEvent) {
        match event {
            FeedEvent::ItemCreated { id, owner_id, title } => {
                info!(id = id, owner_id = owner_id, title = %title, "Item created");
            }
            FeedEvent::ItemDeleted { id } => {
                info!(id = id, "Item deleted");
            }
            FeedEvent::InteractionRecorded { user_id, item_id, interaction_type } => {
                debug!(
                    user_id = user_id,
                    item_id = item_id,
                    interaction_type = %interaction_type,
                    "Interaction recorded"
                );
            }
            FeedEvent::UserFollowed { follower_id, followee_id } => {
                debug!(follower = follower_id, followee = followee_id, "User followed");
            }
            FeedEvent::FeedServed { user_id, count, cache_hit } => {
                debug!(user_id = ?user_id, count = count, cache_hit = cache_hit, "Feed served");
            }
            _ => {
                trace!(event = ?event, "Feed event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
