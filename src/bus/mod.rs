//! The message bus port (design spec §6) — the hexagonal boundary between
//! the runtime and JetStream.
//!
//! ```text
//!   JetStreamBus ──▶ BusAdapter (trait) ──▶ DeviceRuntime / TriggerDispatcher
//! ```
//!
//! [`nats`] is the production adapter; [`mock`] is an in-memory stand-in
//! used by tests and the demo binaries when no NATS server is reachable.

pub mod mock;
pub mod nats;

use crate::error::Result;
use async_trait::async_trait;

/// Where a newly created consumer should start reading from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverPolicy {
    /// Only messages published after the consumer is created.
    New,
    /// The single newest message recorded per matching subject — used to
    /// fetch the authoritative settings/status record on startup.
    LastPerSubject,
}

/// A message delivered off a consumer, together with the means to
/// acknowledge it. At-least-once delivery: an un-acked message is
/// redelivered after the server's ack-wait timeout.
pub struct DeliveredMessage {
    pub subject: String,
    pub payload: Vec<u8>,
    ack: Box<dyn AckHandle>,
}

impl DeliveredMessage {
    pub fn new(subject: impl Into<String>, payload: Vec<u8>, ack: Box<dyn AckHandle>) -> Self {
        Self {
            subject: subject.into(),
            payload,
            ack,
        }
    }

    pub async fn ack(&self) -> Result<()> {
        self.ack.ack().await
    }

    pub async fn nack(&self) -> Result<()> {
        self.ack.nack().await
    }

    /// Acknowledge terminally — tells the server not to redeliver even on
    /// failure. Used for malformed payloads that will never parse.
    pub async fn term(&self) -> Result<()> {
        self.ack.term().await
    }
}

/// The acknowledgement half of a [`DeliveredMessage`], factored out so test
/// adapters can hand out a trivial no-op implementation.
#[async_trait]
pub trait AckHandle: Send + Sync {
    async fn ack(&self) -> Result<()>;
    async fn nack(&self) -> Result<()>;
    async fn term(&self) -> Result<()>;
}

/// A live pull consumer. Dropping it does not delete the durable consumer
/// server-side — use [`BusAdapter::delete_consumer`] for that.
#[async_trait]
pub trait ConsumerHandle: Send {
    /// Wait for and return the next message, or `None` if the consumer was
    /// closed out from under the caller.
    async fn next(&mut self) -> Result<Option<DeliveredMessage>>;
}

/// The bus boundary the runtime, trigger dispatcher, and OTA manager all
/// depend on. Concrete adapters live in [`nats`] (production) and [`mock`]
/// (tests).
#[async_trait]
pub trait BusAdapter: Send + Sync {
    /// Establish the connection. Idempotent — calling it while already
    /// connected is a no-op.
    async fn connect(&self) -> Result<()>;

    /// Whether the adapter currently believes it holds a live connection.
    fn is_connected(&self) -> bool;

    /// Publish a JSON (or, for the OTA archive, raw binary) payload.
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<()>;

    /// Create (or bind to, if already durable) a pull consumer against
    /// `stream`, filtered to `filter_subject`.
    async fn create_consumer(
        &self,
        stream: &str,
        filter_subject: &str,
        durable_name: &str,
        policy: DeliverPolicy,
    ) -> Result<Box<dyn ConsumerHandle>>;

    /// Remove a durable consumer. Called when `listen_subjects` changes and
    /// the previous subscription set is no longer wanted (design spec
    /// invariant S3).
    async fn delete_consumer(&self, stream: &str, durable_name: &str) -> Result<()>;

    /// Fetch the single newest message recorded for `subject` in `stream`,
    /// without creating a durable consumer. Used on startup to read the
    /// authoritative settings/status record.
    async fn get_last(&self, stream: &str, subject: &str) -> Result<Option<Vec<u8>>>;
}
