//! Wire frames for the push channel
//!
//! JSON messages exchanged with the backend, tagged by `type`.

use serde::{Deserialize, Serialize};

use zap_core::BotEvent;

/// Frame from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Start receiving events for a bot
    Subscribe { bot_id: String },

    /// Stop receiving events for a bot
    Unsubscribe { bot_id: String },

    /// Keepalive
    Ping,
}

/// Frame from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A pairing artifact was issued
    Qr { bot_id: String, payload: String },

    /// Session established
    Connected { bot_id: String },

    /// Session ended
    Disconnected {
        bot_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Keepalive response
    Pong,
}

impl ServerFrame {
    /// Split a frame into its routing key and the event to deliver,
    /// or `None` for frames that carry no bot event.
    pub fn into_event(self) -> Option<(String, BotEvent)> {
        match self {
            ServerFrame::Qr { bot_id, payload } => Some((bot_id, BotEvent::Qr { payload })),
            ServerFrame::Connected { bot_id } => Some((bot_id, BotEvent::Connected)),
            ServerFrame::Disconnected { bot_id, reason } => {
                Some((bot_id, BotEvent::Disconnected { reason }))
            }
            ServerFrame::Pong => None,
        }
    }
}
