use async_trait::async_trait;
use lapin::options::{BasicAckOptions, BasicGetOptions};
use lapin::{Channel, Connection, ConnectionProperties};
use scalectl_core::ports::{EventBusError, EventQueueClient, RawMessage};

const MAX_BATCH: usize = 10;

pub struct LapinEventQueueClient {
    channel: Channel,
    queue: String,
}

impl LapinEventQueueClient {
    /// Opens a connection to `addr` (an `amqp://` URI) and a channel bound
    /// to `queue`. `queue` is assumed already declared by the operator.
    pub async fn connect(addr: &str, queue: impl Into<String>) -> Result<Self, EventBusError> {
        let conn = Connection::connect(addr, ConnectionProperties::default())
            .await
            .map_err(|e| EventBusError::Transport(e.to_string()))?;
        let channel = conn
            .create_channel()
            .await
            .map_err(|e| EventBusError::Transport(e.to_string()))?;
        Ok(Self {
            channel,
            queue: queue.into(),
        })
    }
}

#[async_trait]
impl EventQueueClient for LapinEventQueueClient {
    async fn receive_batch(&self) -> Result<Vec<RawMessage>, EventBusError> {
        let mut messages = Vec::new();
        for _ in 0..MAX_BATCH {
            let maybe = self
                .channel
                .basic_get(&self.queue, BasicGetOptions::default())
                .await
                .map_err(|e| EventBusError::Transport(e.to_string()))?;
            let Some(message) = maybe else {
                break;
            };
            let body: serde_json::Value = serde_json::from_slice(&message.delivery.data)
                .map_err(|e| EventBusError::Transport(format!("malformed message body: {e}")))?;
            messages.push(RawMessage {
                receipt: message.delivery.delivery_tag.to_string(),
                body,
            });
        }
        Ok(messages)
    }

    async fn delete(&self, receipt: &str) -> Result<(), EventBusError> {
        let tag: u64 = receipt
            .parse()
            .map_err(|_| EventBusError::Transport(format!("malformed receipt: {receipt}")))?;
        self.channel
            .basic_ack(tag, BasicAckOptions::default())
            .await
            .map_err(|e| EventBusError::Transport(e.to_string()))
    }
}
