//! zap-auth: identity provider client and token cache
//!
//! Exchanges credentials for a bearer token, caches it in-process, and
//! keeps it fresh in the background. Every authenticated request in the
//! workspace reads the token through [`TokenStore`].

pub mod client;
pub mod token;

pub use client::{spawn_refresh_task, IdentityClient, Session};
pub use token::TokenStore;
