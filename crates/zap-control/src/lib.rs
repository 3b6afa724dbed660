//! zap-control: bot control API client
//!
//! Thin client for the backend endpoints that start and stop a bot's
//! messaging session and expose its blocked-number list. All calls are
//! bearer-authenticated; a missing token fails locally without touching
//! the network.

pub mod client;

pub use client::ControlClient;
