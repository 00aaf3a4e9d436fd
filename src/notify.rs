//! Fan-out of pipeline updates to subscribers.
//!
//! A single `tokio::sync::broadcast` channel carries every [`Notification`];
//! each [`Subscription`] filters by location on the receiving side. A
//! subscription without a location sees everything.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{AlertRecord, IndexResult};

// ---

/// Default buffer capacity for the broadcast channel.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Wire envelope: `{"type": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum Envelope {
    IndexUpdate(IndexUpdate),
    Alert(AlertRecord),
}

/// Payload of an `index-update` message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexUpdate {
    pub sensor_id: String,
    pub location_id: Uuid,
    #[serde(flatten)]
    pub result: IndexResult,
}

/// An envelope tagged with the location it concerns.
#[derive(Debug, Clone)]
pub struct Notification {
    pub location_id: Uuid,
    pub envelope: Envelope,
}

pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    // ---
    /// When the buffer is full the oldest messages are dropped and slow
    /// subscribers observe a lag.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to every current subscriber. Dropped silently when nobody
    /// is listening.
    pub fn publish(&self, location_id: Uuid, envelope: Envelope) {
        // ---
        let _ = self.sender.send(Notification {
            location_id,
            envelope,
        });
    }

    /// Subscribe to one location, or to all of them with `None`.
    pub fn subscribe(&self, location_id: Option<Uuid>) -> Subscription {
        Subscription {
            location_id,
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

pub struct Subscription {
    location_id: Option<Uuid>,
    receiver: broadcast::Receiver<Notification>,
}

impl Subscription {
    // ---
    /// Next envelope for this subscription's location.
    ///
    /// Returns `None` once the notifier is gone. Lagging is logged and
    /// skipped over.
    pub async fn recv(&mut self) -> Option<Envelope> {
        // ---
        loop {
            match self.receiver.recv().await {
                Ok(n) => {
                    if self.location_id.map_or(true, |loc| loc == n.location_id) {
                        return Some(n.envelope);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{Pollutant, StatusBand};

    fn update(location_id: Uuid, aggregate: f64) -> Envelope {
        // ---
        Envelope::IndexUpdate(IndexUpdate {
            sensor_id: "S1".to_string(),
            location_id,
            result: IndexResult {
                measurement_id: Uuid::nil(),
                pm25_index: aggregate,
                pm10_index: 0.0,
                co_index: 0.0,
                no2_index: 0.0,
                so2_index: 0.0,
                o3_index: 0.0,
                aggregate_index: aggregate,
                status_band: StatusBand::Good,
                dominant_pollutant: Pollutant::Pm25,
            },
        })
    }

    #[tokio::test]
    async fn test_location_filtering() {
        // ---
        let notifier = Notifier::default();
        let here = Uuid::new_v4();
        let there = Uuid::new_v4();

        let mut all = notifier.subscribe(None);
        let mut local = notifier.subscribe(Some(here));

        notifier.publish(there, update(there, 1.0));
        notifier.publish(here, update(here, 2.0));

        assert_eq!(all.recv().await, Some(update(there, 1.0)));
        assert_eq!(all.recv().await, Some(update(here, 2.0)));
        assert_eq!(local.recv().await, Some(update(here, 2.0)));
    }

    #[tokio::test]
    async fn test_closed_notifier_ends_subscription() {
        // ---
        let notifier = Notifier::new(4);
        let mut sub = notifier.subscribe(None);
        drop(notifier);
        assert_eq!(sub.recv().await, None);
    }

    #[test]
    fn test_envelope_shape() {
        // ---
        let loc = Uuid::new_v4();
        let json = serde_json::to_value(update(loc, 41.7)).unwrap();

        assert_eq!(json["type"], "index-update");
        assert_eq!(json["data"]["aggregate_index"], 41.7);
        assert_eq!(json["data"]["status_band"], "GOOD");
        assert_eq!(json["data"]["dominant_pollutant"], "PM25");
        assert_eq!(json["data"]["sensor_id"], "S1");
    }

    #[test]
    fn test_publish_without_subscribers() {
        // ---
        let notifier = Notifier::default();
        assert_eq!(notifier.subscriber_count(), 0);
        notifier.publish(Uuid::nil(), update(Uuid::nil(), 0.0));
    }
}
