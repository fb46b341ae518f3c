use super::{DeadLetterEntry, DlqStatistics, DlqStorage};
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Entries in arrival order
#[derive(Default)]
pub struct InMemoryDlqStorage {
    entries: RwLock<Vec<DeadLetterEntry>>,
}

impl InMemoryDlqStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DlqStorage for InMemoryDlqStorage {
    async fn store(&self, entry: DeadLetterEntry) -> Result<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn list(&self, topic: &str, limit: Option<usize>) -> Result<Vec<DeadLetterEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|entry| entry.topic == topic)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<DeadLetterEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().find(|entry| entry.id == id).cloned())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.entries.write().await.retain(|entry| entry.id != id);
        Ok(())
    }

    async fn statistics(&self) -> Result<DlqStatistics> {
        Ok(DlqStatistics::from_entries(self.entries.read().await.iter()))
    }

    async fn clear_topic(&self, topic: &str) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| entry.topic != topic);
        Ok(before - entries.len())
    }
}
