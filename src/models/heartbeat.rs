use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness ledger entry for one named worker. Counters only grow;
/// `last_processed_at` only advances, and only on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub name: String,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub message_count: u64,
    pub error_count: u64,
    pub last_error_message: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl HeartbeatRecord {
    pub fn new(name: String) -> Self {
        Self {
            name,
            last_processed_at: None,
            message_count: 0,
            error_count: 0,
            last_error_message: None,
            last_error_at: None,
        }
    }
}
