//! Trigger Dispatcher (design spec §4.C) — subscribes to a device's
//! configured `listen_subjects` plus its own central subject, acknowledges
//! immediately, and hands decoded [`Trigger`]s up to the runtime for
//! classification.

use crate::bus::{BusAdapter, DeliverPolicy};
use crate::error::Result;
use crate::model::Trigger;
use crate::subject;
use log::{error, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

fn durable_name(device_id: &str, subject: &str) -> String {
    format!(
        "trig-{}-{}",
        device_id.replace(['.', '/'], "_"),
        subject.replace(['.', '/'], "_")
    )
}

/// Owns one consumer (and its reader task) per subscribed subject. Created
/// fresh on every settings change per invariant 1: after `resubscribe`, the
/// active subject set equals exactly `{central} ∪ listen_subjects`.
pub struct TriggerDispatcher {
    bus: Arc<dyn BusAdapter>,
    device_id: String,
    tasks: HashMap<String, JoinHandle<()>>,
    sender: mpsc::UnboundedSender<(String, Vec<u8>, crate::bus::DeliveredMessage)>,
    receiver: mpsc::UnboundedReceiver<(String, Vec<u8>, crate::bus::DeliveredMessage)>,
}

impl TriggerDispatcher {
    pub fn new(bus: Arc<dyn BusAdapter>, device_id: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            bus,
            device_id: device_id.into(),
            tasks: HashMap::new(),
            sender,
            receiver,
        }
    }

    /// The subjects currently subscribed to, for observability/testing
    /// (invariant 1 / scenario S3).
    pub fn active_subjects(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }

    /// Delete every existing consumer and create a fresh set for
    /// `{central_subject} ∪ listen_subjects`.
    pub async fn resubscribe(&mut self, central_subject: &str, listen_subjects: &[String]) -> Result<()> {
        for (subject, task) in self.tasks.drain() {
            task.abort();
            let durable = durable_name(&self.device_id, &subject);
            if let Err(e) = self.bus.delete_consumer(subject::stream::COMMAND, &durable).await {
                warn!("failed to delete trigger consumer for {subject}: {e}");
            }
        }

        let mut subjects: Vec<String> = vec![central_subject.to_string()];
        subjects.extend(listen_subjects.iter().cloned());

        for subject in subjects {
            let filter = crate::subject::trigger(&subject);
            let durable = durable_name(&self.device_id, &subject);
            let mut consumer = self
                .bus
                .create_consumer(
                    crate::subject::stream::COMMAND,
                    &filter,
                    &durable,
                    DeliverPolicy::New,
                )
                .await?;

            let tx = self.sender.clone();
            let subject_label = subject.clone();
            let task = tokio::spawn(async move {
                loop {
                    match consumer.next().await {
                        Ok(Some(msg)) => {
                            let payload = msg.payload.clone();
                            if tx.send((subject_label.clone(), payload, msg)).is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            error!("trigger consumer for {subject_label} failed: {e}");
                            break;
                        }
                    }
                }
            });
            self.tasks.insert(subject, task);
        }

        Ok(())
    }

    /// Wait for the next validly-decoded trigger. Malformed payloads are
    /// `term`-ed (never redelivered) and skipped; valid ones are `ack`-ed
    /// immediately, before classification, per §4.C.
    pub async fn recv(&mut self) -> Option<(String, Trigger)> {
        loop {
            let (subject, payload, msg) = self.receiver.recv().await?;
            match serde_json::from_slice::<Trigger>(&payload) {
                Ok(trigger) => {
                    if let Err(e) = msg.ack().await {
                        warn!("failed to ack trigger on {subject}: {e}");
                    }
                    return Some((subject, trigger));
                }
                Err(e) => {
                    error!("malformed trigger payload on {subject}: {e}");
                    if let Err(e) = msg.term().await {
                        warn!("failed to term malformed trigger on {subject}: {e}");
                    }
                }
            }
        }
    }
}

impl Drop for TriggerDispatcher {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::MockBus;

    #[tokio::test]
    async fn resubscribe_yields_central_plus_listen_subjects() {
        let bus = Arc::new(MockBus::new());
        let mut dispatcher = TriggerDispatcher::new(bus, "relay.hallway");

        dispatcher
            .resubscribe("central.relay.hallway", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        let mut active = dispatcher.active_subjects();
        active.sort();
        assert_eq!(active, vec!["a", "b", "central.relay.hallway"]);
    }

    #[tokio::test]
    async fn resubscribe_drops_stale_subjects() {
        let bus = Arc::new(MockBus::new());
        let mut dispatcher = TriggerDispatcher::new(bus, "relay.hallway");

        dispatcher
            .resubscribe("central.relay.hallway", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        dispatcher
            .resubscribe("central.relay.hallway", &["b".to_string(), "c".to_string()])
            .await
            .unwrap();

        let mut active = dispatcher.active_subjects();
        active.sort();
        assert_eq!(active, vec!["b", "c", "central.relay.hallway"]);
    }

    #[tokio::test]
    async fn receives_and_acks_valid_trigger() {
        let bus = Arc::new(MockBus::new());
        let mut dispatcher = TriggerDispatcher::new(bus.clone(), "relay.hallway");
        dispatcher
            .resubscribe("central.relay.hallway", &["a".to_string()])
            .await
            .unwrap();

        bus.publish("cmd.trigger.a", br#"{"code":100}"#).await.unwrap();

        let (subject, trigger) = dispatcher.recv().await.unwrap();
        assert_eq!(subject, "a");
        assert_eq!(trigger.code, 100);
    }
}
