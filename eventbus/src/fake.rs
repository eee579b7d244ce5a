use std::sync::Mutex;

use async_trait::async_trait;
use scalectl_core::ports::{EventBusError, EventQueueClient, RawMessage};

#[derive(Default)]
pub struct FakeEventQueueClient {
    pending: Mutex<Vec<RawMessage>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeEventQueueClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: RawMessage) {
        self.pending.lock().unwrap().push(message);
    }

    pub fn deleted_receipts(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventQueueClient for FakeEventQueueClient {
    async fn receive_batch(&self) -> Result<Vec<RawMessage>, EventBusError> {
        let mut pending = self.pending.lock().unwrap();
        let batch = pending.drain(..pending.len().min(10)).collect();
        Ok(batch)
    }

    async fn delete(&self, receipt: &str) -> Result<(), EventBusError> {
        self.deleted.lock().unwrap().push(receipt.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receive_batch_drains_pending_messages() {
        let queue = FakeEventQueueClient::new();
        queue.push(RawMessage {
            receipt: "1".into(),
            body: serde_json::json!({"detail-type": "ClusterStateChange"}),
        });
        let batch = queue.receive_batch().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(queue.receive_batch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_recorded() {
        let queue = FakeEventQueueClient::new();
        queue.delete("abc").await.unwrap();
        assert_eq!(queue.deleted_receipts(), vec!["abc".to_string()]);
    }
}
