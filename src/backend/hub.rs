//! Fan-out of tool record changes to every open subscription of an owner.

use std::collections::HashMap;

use futures::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};

use super::Subscription;
use crate::models::{ChangeEvent, UserId};

/// Buffered events per owner before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 64;

/// Tracks broadcast channels keyed by owner.
pub struct RealtimeHub {
    channels: RwLock<HashMap<UserId, broadcast::Sender<ChangeEvent>>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribes to changes of rows owned by `owner`.
    pub async fn subscribe(&self, owner: &UserId) -> broadcast::Receiver<ChangeEvent> {
        let mut channels = self.channels.write().await;

        if let Some(sender) = channels.get(owner) {
            sender.subscribe()
        } else {
            let (sender, receiver) = broadcast::channel(CHANNEL_CAPACITY);
            channels.insert(owner.clone(), sender);
            receiver
        }
    }

    /// Subscribes and wraps the receiver as a [`Subscription`].
    pub async fn subscription(&self, owner: &UserId, topic: &str) -> Subscription {
        let receiver = self.subscribe(owner).await;
        let topic_name = topic.to_string();

        let events = futures::stream::unfold(receiver, move |mut receiver| {
            let topic = topic_name.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(event) => return Some((event, receiver)),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!("[realtime] {} lagged, skipped {} event(s)", topic, skipped);
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        });

        Subscription::new(topic, events.boxed())
    }

    /// Publishes a change to every subscriber of the row's owner.
    ///
    /// An owner whose subscribers are all gone loses its channel.
    pub async fn publish(&self, event: ChangeEvent) {
        let Some(owner) = event.owner_id().cloned() else {
            return;
        };

        let abandoned = {
            let channels = self.channels.read().await;
            match channels.get(&owner) {
                Some(sender) => sender.send(event).is_err(),
                None => false,
            }
        };

        if abandoned {
            let mut channels = self.channels.write().await;
            // Someone may have subscribed between the two locks
            if channels
                .get(&owner)
                .is_some_and(|sender| sender.receiver_count() == 0)
            {
                channels.remove(&owner);
                tracing::debug!("[realtime] dropped channel of {}", owner);
            }
        }
    }

    /// Owners with a live channel.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}
