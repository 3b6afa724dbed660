//! Collaborator traits implemented by the client crates
//!
//! The synchronizer only sees these traits, so tests can substitute
//! in-memory fakes for the HTTP clients.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::BotRecord;

/// Source of the cached bearer token.
///
/// Absence of a token fails the calling operation locally, without a
/// network call. 401/403 responses invalidate the cache.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Option<String>;
    fn invalidate(&self);
}

/// Read/write access to persisted bot documents.
#[async_trait]
pub trait BotStore: Send + Sync {
    /// Fetch a bot record by id.
    async fn get(&self, bot_id: &str) -> Result<BotRecord>;

    /// Merge the given fields into the stored document.
    async fn update(&self, bot_id: &str, fields: serde_json::Value) -> Result<()>;
}

/// The bot control API (start/stop/blocked numbers).
#[async_trait]
pub trait BotControl: Send + Sync {
    async fn start_bot(&self, bot_id: &str) -> Result<()>;
    async fn stop_bot(&self, bot_id: &str) -> Result<()>;
    async fn blocked_numbers(&self, bot_id: &str) -> Result<Vec<String>>;
}
