use super::{DeadLetterEntry, DlqStatistics, DlqStorage};
use crate::error::{LikeBridgeError, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

/// Entries as JSON in one hash, indexed per topic by a sorted set scored
/// with the creation time.
///
/// `{prefix}:entries` maps id to entry, `{prefix}:topic:{topic}` orders ids.
pub struct RedisDlqStorage {
    conn: MultiplexedConnection,
    prefix: String,
}

impl RedisDlqStorage {
    pub fn new(conn: MultiplexedConnection, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    fn entries_key(&self) -> String {
        format!("{}:entries", self.prefix)
    }

    fn topic_key(&self, topic: &str) -> String {
        format!("{}:topic:{}", self.prefix, topic)
    }

    async fn load(&self, ids: &[String]) -> Result<Vec<DeadLetterEntry>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let raw: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(self.entries_key())
            .arg(ids)
            .query_async(&mut conn)
            .await?;
        raw.into_iter()
            .flatten()
            .map(|json| serde_json::from_str(&json).map_err(LikeBridgeError::from))
            .collect()
    }

    async fn record_size(&self, topic: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let size: usize = conn.zcard(self.topic_key(topic)).await?;
        crate::metrics::DEAD_LETTER_QUEUE_SIZE
            .with_label_values(&[topic])
            .set(size as f64);
        Ok(())
    }
}

#[async_trait]
impl DlqStorage for RedisDlqStorage {
    async fn store(&self, entry: DeadLetterEntry) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(&entry)?;
        redis::pipe()
            .atomic()
            .hset(self.entries_key(), &entry.id, json)
            .zadd(
                self.topic_key(&entry.topic),
                &entry.id,
                entry.created_at.timestamp_millis(),
            )
            .query_async::<_, ()>(&mut conn)
            .await?;
        self.record_size(&entry.topic).await
    }

    async fn list(&self, topic: &str, limit: Option<usize>) -> Result<Vec<DeadLetterEntry>> {
        let stop = match limit {
            Some(0) => return Ok(Vec::new()),
            Some(limit) => limit as isize - 1,
            None => -1,
        };
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.zrange(self.topic_key(topic), 0, stop).await?;
        self.load(&ids).await
    }

    async fn get(&self, id: &str) -> Result<Option<DeadLetterEntry>> {
        Ok(self.load(&[id.to_string()]).await?.pop())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let Some(entry) = self.get(id).await? else {
            return Ok(());
        };
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .hdel(self.entries_key(), id)
            .zrem(self.topic_key(&entry.topic), id)
            .query_async::<_, ()>(&mut conn)
            .await?;
        self.record_size(&entry.topic).await
    }

    async fn statistics(&self) -> Result<DlqStatistics> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.hvals(self.entries_key()).await?;
        let entries = raw
            .iter()
            .map(|json| serde_json::from_str(json))
            .collect::<std::result::Result<Vec<DeadLetterEntry>, _>>()?;
        Ok(DlqStatistics::from_entries(&entries))
    }

    async fn clear_topic(&self, topic: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let topic_key = self.topic_key(topic);
        let ids: Vec<String> = conn.zrange(&topic_key, 0, -1).await?;
        if ids.is_empty() {
            return Ok(0);
        }

        redis::pipe()
            .atomic()
            .hdel(self.entries_key(), &ids)
            .del(&topic_key)
            .query_async::<_, ()>(&mut conn)
            .await?;
        crate::metrics::DEAD_LETTER_QUEUE_SIZE
            .with_label_values(&[topic])
            .set(0.0);
        Ok(ids.len())
    }
}
