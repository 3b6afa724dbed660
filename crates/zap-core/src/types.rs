//! Domain types shared across the workspace

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status values the document store actually holds.
///
/// `qr_received` and `error` never appear here; they are client-local
/// refinements derived from the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersistedStatus {
    #[default]
    Stopped,
    Starting,
    Connected,
}

/// Status values shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    /// Initial record load in progress
    #[default]
    Loading,
    Stopped,
    Starting,
    /// A stop request is in flight
    Stopping,
    QrReceived,
    Connected,
    Error,
}

impl From<PersistedStatus> for DisplayStatus {
    fn from(status: PersistedStatus) -> Self {
        match status {
            PersistedStatus::Stopped => DisplayStatus::Stopped,
            PersistedStatus::Starting => DisplayStatus::Starting,
            PersistedStatus::Connected => DisplayStatus::Connected,
        }
    }
}

/// A bot configuration document.
///
/// `system_message` is owned by this client and mutated only via explicit
/// save; the counters are owned by the backend and read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: PersistedStatus,
    #[serde(default)]
    pub system_message: String,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
    /// Owning user, set by the creation flow
    #[serde(default)]
    pub user_id: Option<String>,
}

impl BotRecord {
    /// Create a record with defaults for a new bot.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: PersistedStatus::Stopped,
            system_message: String::new(),
            message_count: 0,
            total_cost: 0.0,
            last_active: None,
            user_id: None,
        }
    }
}

/// A transient event delivered out of band on the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotEvent {
    /// A new pairing artifact was issued
    Qr { payload: String },
    /// Session established
    Connected,
    /// Session ended
    Disconnected { reason: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persisted_status_serde() {
        let json = serde_json::to_string(&PersistedStatus::Starting).unwrap();
        assert_eq!(json, r#""starting""#);
        let status: PersistedStatus = serde_json::from_str(r#""connected""#).unwrap();
        assert_eq!(status, PersistedStatus::Connected);
    }

    #[test]
    fn test_display_status_from_persisted() {
        assert_eq!(DisplayStatus::from(PersistedStatus::Stopped), DisplayStatus::Stopped);
        assert_eq!(DisplayStatus::from(PersistedStatus::Connected), DisplayStatus::Connected);
    }

    #[test]
    fn test_bot_record_defaults() {
        let record: BotRecord = serde_json::from_str(r#"{"id":"acme","name":"Acme"}"#).unwrap();
        assert_eq!(record.status, PersistedStatus::Stopped);
        assert_eq!(record.message_count, 0);
        assert!(record.last_active.is_none());
    }

    #[test]
    fn test_bot_event_serde() {
        let event = BotEvent::Qr {
            payload: "2@abcd".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"qr""#));

        let event: BotEvent = serde_json::from_str(r#"{"type":"disconnected","reason":"logout"}"#).unwrap();
        assert_eq!(
            event,
            BotEvent::Disconnected {
                reason: Some("logout".to_string())
            }
        );
    }
}
