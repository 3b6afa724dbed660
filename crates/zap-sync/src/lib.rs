//! zap-sync: connection state synchronizer
//!
//! Maintains a single coherent displayed state for one bot, fed by two
//! asynchronous, unordered sources of truth: the push channel (low
//! latency, transient) and the polled document store (authoritative,
//! latent). The merge itself is a pure reducer in [`reducer`]; the async
//! driver in [`sync`] owns the timers, the subscription, and the
//! user-invocable start/stop actions.

pub mod reducer;
pub mod sync;
pub mod view;

pub use reducer::{reduce, SyncEffect, SyncInput};
pub use sync::{SyncCommand, SyncDeps, SyncHandle, Synchronizer};
pub use view::ConnectionView;
