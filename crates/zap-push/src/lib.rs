//! zap-push: push channel client
//!
//! One multiplexed WebSocket connection shared by every bot view in the
//! process. The channel is an explicitly owned object constructed once at
//! application start; views obtain per-bot [`Subscription`]s from it and
//! dropping a subscription tells the backend to stop pushing.
//!
//! Reconnection is bounded: a fixed number of attempts with a fixed
//! backoff and a generous per-attempt timeout. Live subscriptions are
//! re-announced after every reconnect.

pub mod channel;
pub mod error;
pub mod frame;
pub mod subscription;

pub use channel::PushChannel;
pub use error::PushError;
pub use frame::{ClientFrame, ServerFrame};
pub use subscription::Subscription;
