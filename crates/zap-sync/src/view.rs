//! The derived, client-local connection view

use serde::Serialize;

use zap_core::{DisplayStatus, PersistedStatus};

/// What one bot detail view displays.
///
/// Ephemeral and never persisted: created when the view mounts, reset on
/// every full reload of the bot record, discarded on unmount.
///
/// Invariants maintained by the reducer:
/// - `qr_payload` is `Some` only while `status == QrReceived` and the
///   current user initiated the start (`user_initiated`).
/// - Reaching `Connected` always clears `qr_payload` and resets
///   `user_initiated`.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct ConnectionView {
    pub status: DisplayStatus,
    /// The current scannable pairing string, if one is outstanding
    pub qr_payload: Option<String>,
    /// Whether the current transition was requested from this view, as
    /// opposed to observed passively (another tab, a stale request)
    pub user_initiated: bool,
    /// Last surfaced error or warning
    pub message: Option<String>,
    pub blocked_numbers: Vec<String>,
    pub scan_attempts: u32,
    /// Sequence of the most recent push event folded into this view;
    /// used to decide whether a poll result is stale
    #[serde(skip)]
    pub(crate) last_push_seq: u64,
}

impl ConnectionView {
    /// Fresh view adopting a just-loaded persisted status.
    pub fn loaded(status: PersistedStatus) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    /// The sequence of the most recent push event applied.
    pub fn last_push_seq(&self) -> u64 {
        self.last_push_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_loading() {
        let view = ConnectionView::default();
        assert_eq!(view.status, DisplayStatus::Loading);
        assert!(view.qr_payload.is_none());
        assert!(!view.user_initiated);
    }

    #[test]
    fn test_loaded_adopts_status() {
        let view = ConnectionView::loaded(PersistedStatus::Connected);
        assert_eq!(view.status, DisplayStatus::Connected);
        assert!(view.message.is_none());
    }
}
