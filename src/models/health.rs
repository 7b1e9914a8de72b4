use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComponentStatus {
    Up,
    Degraded,
    Down,
}

/// Point-in-time view of a single probed dependency or worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: ComponentStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub checked_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, serde_json::Value>,
}

impl ComponentHealth {
    pub fn up(name: &str, checked_at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            status: ComponentStatus::Up,
            message: None,
            checked_at,
            details: HashMap::new(),
        }
    }

    pub fn degraded(name: &str, message: String, checked_at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            status: ComponentStatus::Degraded,
            message: Some(message),
            checked_at,
            details: HashMap::new(),
        }
    }

    pub fn down(name: &str, message: String, checked_at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            status: ComponentStatus::Down,
            message: Some(message),
            checked_at,
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: serde_json::Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }
}

/// Composite health view. Computed fresh on every request; `overall_status`
/// is UP only when every component is UP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub overall_status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub generated_at: DateTime<Utc>,
}

impl HealthSnapshot {
    pub fn from_components(
        components: HashMap<String, ComponentHealth>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let all_up = components
            .values()
            .all(|component| component.status == ComponentStatus::Up);

        Self {
            overall_status: if all_up {
                ComponentStatus::Up
            } else {
                ComponentStatus::Down
            },
            components,
            generated_at,
        }
    }
}
