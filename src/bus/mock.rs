//! An in-memory [`BusAdapter`] used by tests and the demo binaries' dry-run
//! mode. Implements NATS-style subject wildcards (`*` for one token, `>` for
//! the remainder) well enough to exercise the trigger/runtime/ota logic
//! without a live JetStream server.

use super::{AckHandle, BusAdapter, ConsumerHandle, DeliverPolicy, DeliveredMessage};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

struct Published {
    subject: String,
    payload: Vec<u8>,
}

struct Subscriber {
    filter_subject: String,
    sender: mpsc::UnboundedSender<Published>,
}

#[derive(Default)]
struct Inner {
    log: Vec<Published>,
    subscribers: Vec<Subscriber>,
}

/// In-memory stand-in for a JetStream connection. Every publish is appended
/// to a log and fanned out to any matching live consumer; `stream` names are
/// accepted but not partitioned on — subject filters alone decide delivery,
/// exactly as JetStream filters a single shared log.
#[derive(Default)]
pub struct MockBus {
    inner: Mutex<Inner>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message ever published, in publish order. Test helper.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.inner
            .lock()
            .unwrap()
            .log
            .iter()
            .map(|p| (p.subject.clone(), p.payload.clone()))
            .collect()
    }
}

/// `true` if `subject` is matched by NATS-style `filter` (`*` = one token,
/// `>` = this token and all remaining tokens).
fn subject_matches(filter: &str, subject: &str) -> bool {
    let filter_tokens: Vec<&str> = filter.split('.').collect();
    let subject_tokens: Vec<&str> = subject.split('.').collect();

    for (i, ft) in filter_tokens.iter().enumerate() {
        if *ft == ">" {
            return true;
        }
        match subject_tokens.get(i) {
            Some(st) if *ft == "*" || ft == st => continue,
            _ => return false,
        }
    }
    filter_tokens.len() == subject_tokens.len()
}

#[async_trait]
impl BusAdapter for MockBus {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.log.push(Published {
            subject: subject.to_string(),
            payload: payload.to_vec(),
        });
        inner.subscribers.retain(|sub| {
            if subject_matches(&sub.filter_subject, subject) {
                let _ = sub.sender.send(Published {
                    subject: subject.to_string(),
                    payload: payload.to_vec(),
                });
            }
            !sub.sender.is_closed()
        });
        Ok(())
    }

    async fn create_consumer(
        &self,
        _stream: &str,
        filter_subject: &str,
        _durable_name: &str,
        policy: DeliverPolicy,
    ) -> Result<Box<dyn ConsumerHandle>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap();

        if matches!(policy, DeliverPolicy::LastPerSubject) {
            if let Some(last) = inner
                .log
                .iter()
                .rev()
                .find(|p| subject_matches(filter_subject, &p.subject))
            {
                let _ = tx.send(Published {
                    subject: last.subject.clone(),
                    payload: last.payload.clone(),
                });
            }
        }

        inner.subscribers.push(Subscriber {
            filter_subject: filter_subject.to_string(),
            sender: tx,
        });

        Ok(Box::new(MockConsumerHandle { receiver: rx }))
    }

    async fn delete_consumer(&self, _stream: &str, _durable_name: &str) -> Result<()> {
        Ok(())
    }

    async fn get_last(&self, _stream: &str, subject: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .log
            .iter()
            .rev()
            .find(|p| subject_matches(subject, &p.subject))
            .map(|p| p.payload.clone()))
    }
}

struct MockConsumerHandle {
    receiver: mpsc::UnboundedReceiver<Published>,
}

#[async_trait]
impl ConsumerHandle for MockConsumerHandle {
    async fn next(&mut self) -> Result<Option<DeliveredMessage>> {
        match self.receiver.recv().await {
            None => Ok(None),
            Some(msg) => Ok(Some(DeliveredMessage::new(
                msg.subject,
                msg.payload,
                Box::new(NoopAck),
            ))),
        }
    }
}

struct NoopAck;

#[async_trait]
impl AckHandle for NoopAck {
    async fn ack(&self) -> Result<()> {
        Ok(())
    }

    async fn nack(&self) -> Result<()> {
        Ok(())
    }

    async fn term(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_single_token() {
        assert!(subject_matches("log.*", "log.relay"));
        assert!(!subject_matches("log.*", "log.relay.hallway"));
    }

    #[test]
    fn wildcard_multi_token() {
        assert!(subject_matches("log.>", "log.relay.hallway"));
        assert!(subject_matches("log.>", "log.relay"));
        assert!(!subject_matches("log.>", "alert.relay"));
    }

    #[tokio::test]
    async fn publish_then_consume() {
        let bus = MockBus::new();
        bus.connect().await.unwrap();
        let mut consumer = bus
            .create_consumer("commands", "cmd.trigger.>", "d1", DeliverPolicy::New)
            .await
            .unwrap();

        bus.publish("cmd.trigger.relay.hallway", b"{\"code\":100}")
            .await
            .unwrap();

        let msg = consumer.next().await.unwrap().unwrap();
        assert_eq!(msg.subject, "cmd.trigger.relay.hallway");
        msg.ack().await.unwrap();
    }

    #[tokio::test]
    async fn last_per_subject_replays_newest() {
        let bus = MockBus::new();
        bus.publish("settings.relay.hallway", b"{\"heartbeat_interval\":5}")
            .await
            .unwrap();
        bus.publish("settings.relay.hallway", b"{\"heartbeat_interval\":10}")
            .await
            .unwrap();

        let mut consumer = bus
            .create_consumer(
                "settings",
                "settings.relay.hallway",
                "d2",
                DeliverPolicy::LastPerSubject,
            )
            .await
            .unwrap();

        let msg = consumer.next().await.unwrap().unwrap();
        assert_eq!(msg.payload, b"{\"heartbeat_interval\":10}");
    }
}
