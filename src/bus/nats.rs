//! JetStream-backed [`BusAdapter`](super::BusAdapter).

use super::{AckHandle, BusAdapter, ConsumerHandle, DeliverPolicy, DeliveredMessage};
use crate::error::{Error, Result};
use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, DeliverPolicy as NatsDeliverPolicy},
    AckKind,
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::RwLock;

struct Connection {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

/// Connects to a NATS server and drives JetStream pull consumers over it.
/// Connection state is established lazily by [`connect`](Self::connect) and
/// held behind a lock so the adapter can be shared across tasks.
pub struct JetStreamBus {
    server_url: String,
    connection: RwLock<Option<Connection>>,
}

impl JetStreamBus {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            connection: RwLock::new(None),
        }
    }

    async fn jetstream(&self) -> Result<jetstream::Context> {
        let guard = self.connection.read().await;
        match guard.as_ref() {
            Some(conn) => Ok(conn.jetstream.clone()),
            None => Err(Error::NoConnection),
        }
    }
}

#[async_trait]
impl BusAdapter for JetStreamBus {
    async fn connect(&self) -> Result<()> {
        if self.connection.read().await.is_some() {
            return Ok(());
        }
        let mut guard = self.connection.write().await;
        if guard.is_some() {
            return Ok(());
        }
        let client = async_nats::connect(&self.server_url)
            .await
            .map_err(|e| Error::bad_request(format!("nats connect: {e}")))?;
        let jetstream = jetstream::new(client.clone());
        *guard = Some(Connection { client, jetstream });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection
            .try_read()
            .map(|g| g.is_some())
            .unwrap_or(false)
    }

    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<()> {
        let js = self.jetstream().await?;
        let ack = js
            .publish(subject.to_string(), payload.to_vec().into())
            .await
            .map_err(|e| Error::bad_request(format!("publish {subject}: {e}")))?;
        ack.await
            .map_err(|e| Error::bad_request(format!("publish ack {subject}: {e}")))?;
        Ok(())
    }

    async fn create_consumer(
        &self,
        stream: &str,
        filter_subject: &str,
        durable_name: &str,
        policy: DeliverPolicy,
    ) -> Result<Box<dyn ConsumerHandle>> {
        let js = self.jetstream().await?;
        let nats_stream = js
            .get_stream(stream)
            .await
            .map_err(|e| Error::bad_request(format!("stream {stream}: {e}")))?;

        let config = pull::Config {
            durable_name: Some(durable_name.to_string()),
            filter_subject: filter_subject.to_string(),
            ack_policy: AckPolicy::Explicit,
            deliver_policy: match policy {
                DeliverPolicy::New => NatsDeliverPolicy::New,
                DeliverPolicy::LastPerSubject => NatsDeliverPolicy::LastPerSubject,
            },
            ..Default::default()
        };

        let consumer = nats_stream
            .create_consumer(config)
            .await
            .map_err(|e| Error::bad_request(format!("consumer {durable_name}: {e}")))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| Error::bad_request(format!("consumer {durable_name} messages: {e}")))?;

        Ok(Box::new(NatsConsumerHandle {
            messages: Box::pin(messages),
        }))
    }

    async fn delete_consumer(&self, stream: &str, durable_name: &str) -> Result<()> {
        let js = self.jetstream().await?;
        let nats_stream = js
            .get_stream(stream)
            .await
            .map_err(|e| Error::bad_request(format!("stream {stream}: {e}")))?;
        nats_stream
            .delete_consumer(durable_name)
            .await
            .map_err(|e| Error::bad_request(format!("delete consumer {durable_name}: {e}")))?;
        Ok(())
    }

    async fn get_last(&self, stream: &str, subject: &str) -> Result<Option<Vec<u8>>> {
        let js = self.jetstream().await?;
        let mut nats_stream = js
            .get_stream(stream)
            .await
            .map_err(|e| Error::bad_request(format!("stream {stream}: {e}")))?;
        match nats_stream.get_last_raw_message_by_subject(subject).await {
            Ok(msg) => Ok(Some(msg.payload.to_vec())),
            Err(e) if e.to_string().contains("no message found") => Ok(None),
            Err(e) => Err(Error::bad_request(format!("get_last {subject}: {e}"))),
        }
    }
}

struct NatsConsumerHandle {
    messages: BoxStream<'static, std::result::Result<jetstream::Message, pull::MessagesError>>,
}

#[async_trait]
impl ConsumerHandle for NatsConsumerHandle {
    async fn next(&mut self) -> Result<Option<DeliveredMessage>> {
        match self.messages.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(Error::bad_request(format!("consumer stream: {e}"))),
            Some(Ok(msg)) => {
                let subject = msg.subject.to_string();
                let payload = msg.payload.to_vec();
                Ok(Some(DeliveredMessage::new(
                    subject,
                    payload,
                    Box::new(NatsAck(msg)),
                )))
            }
        }
    }
}

struct NatsAck(jetstream::Message);

#[async_trait]
impl AckHandle for NatsAck {
    async fn ack(&self) -> Result<()> {
        self.0
            .ack()
            .await
            .map_err(|e| Error::bad_request(format!("ack: {e}")))
    }

    async fn nack(&self) -> Result<()> {
        self.0
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| Error::bad_request(format!("nack: {e}")))
    }

    async fn term(&self) -> Result<()> {
        self.0
            .ack_with(AckKind::Term)
            .await
            .map_err(|e| Error::bad_request(format!("term: {e}")))
    }
}
