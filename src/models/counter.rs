use crate::error::{LikeBridgeError, Result};
use serde::{Deserialize, Serialize};

/// Latest value of one windowed counter, as emitted by a flush
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSyncRecord {
    pub key: String,
    pub value: i64,
}

impl CounterSyncRecord {
    pub fn new(key: impl Into<String>, value: i64) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let record: CounterSyncRecord = serde_json::from_slice(payload)
            .map_err(|e| LikeBridgeError::MalformedEvent(e.to_string()))?;
        if record.key.trim().is_empty() {
            return Err(LikeBridgeError::MalformedEvent(
                "counter record with blank key".to_string(),
            ));
        }
        Ok(record)
    }
}
