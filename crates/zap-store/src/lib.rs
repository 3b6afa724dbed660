//! zap-store: document store client
//!
//! REST client for the managed document database holding bot
//! configuration records. The synchronizer reads records through the
//! [`zap_core::BotStore`] trait; the dashboard flows (list, create,
//! delete, save) use the concrete client directly.

pub mod client;

pub use client::StoreClient;
