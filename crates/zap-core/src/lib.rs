//! zap-core: shared types for the zapsync workspace
//!
//! Domain types (bot records, statuses, push events), the shared error
//! type, configuration loading, and the collaborator traits implemented
//! by the client crates.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{AuthConfig, Config, ControlConfig, PushConfig, StoreConfig, SyncConfig};
pub use error::{Error, Result};
pub use traits::{BotControl, BotStore, TokenSource};
pub use types::{BotEvent, BotRecord, DisplayStatus, PersistedStatus};
