//! Pure state reconciliation
//!
//! `reduce` folds one input (a poll result, a push event, a timer expiry
//! or a user action) into the connection view and returns the side
//! effects the driver must run. Keeping it free of timers and transport
//! makes the merge policy testable on its own: the function is
//! commutative and idempotent under the reorderings the transport can
//! actually produce.

use zap_core::{BotEvent, DisplayStatus, PersistedStatus};

use crate::view::ConnectionView;

/// One observation or action to fold into the view.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncInput {
    /// Full record (re)load completed; resets the view
    RecordLoaded { status: PersistedStatus },
    /// A poll tick came back. `issued_seq` is the push sequence current
    /// when the poll was issued; the result is stale if a push event
    /// arrived after that point.
    Poll {
        status: PersistedStatus,
        issued_seq: u64,
    },
    /// A poll tick (or record load) failed; the next tick is an
    /// independent attempt
    PollFailed { message: String },
    /// A push event arrived, stamped with its arrival sequence
    Push { event: BotEvent, seq: u64 },
    /// The expiry timer for this exact payload fired
    QrExpired { payload: String },
    /// The user asked to start the bot
    StartRequested,
    /// The start request failed (locally or at the backend)
    StartFailed { message: String },
    /// No QR arrived within the start deadline
    StartDeadlineElapsed,
    /// The user asked to stop the bot
    StopRequested,
    StopSucceeded,
    StopFailed { message: String },
    BlockedNumbersLoaded { numbers: Vec<String> },
    BlockedNumbersFailed { message: String },
}

/// Side effects for the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEffect {
    /// (Re)start the expiry timer for this payload, replacing any
    /// previous timer
    ArmQrTimer { payload: String },
    CancelQrTimer,
    /// Refresh the blocked-numbers collaborator
    FetchBlockedNumbers,
    /// Re-query the authoritative store now instead of guessing
    ReconcileNow,
}

const MSG_DISCONNECTED: &str = "Disconnected. Try again.";
const MSG_QR_EXPIRED: &str = "QR code expired. Request a new one.";
const MSG_NO_QR: &str = "no pairing code received";

/// Fold one input into the view.
pub fn reduce(mut view: ConnectionView, input: SyncInput) -> (ConnectionView, Vec<SyncEffect>) {
    let mut effects = Vec::new();

    match input {
        SyncInput::RecordLoaded { status } => {
            view = ConnectionView::loaded(status);
            if status == PersistedStatus::Connected {
                effects.push(SyncEffect::FetchBlockedNumbers);
            }
        }

        SyncInput::Poll { status, issued_seq } => {
            if issued_seq < view.last_push_seq {
                // A push arrived after this poll was issued; the push is
                // the lower-latency source and wins
                return (view, effects);
            }
            apply_polled(&mut view, status, &mut effects);
        }

        SyncInput::PollFailed { message } => {
            view.status = DisplayStatus::Error;
            view.message = Some(message);
        }

        SyncInput::Push { event, seq } => {
            view.last_push_seq = view.last_push_seq.max(seq);
            apply_push(&mut view, event, &mut effects);
        }

        SyncInput::QrExpired { payload } => {
            // A superseding QR event replaced the payload already
            if view.qr_payload.as_deref() == Some(payload.as_str()) {
                view.qr_payload = None;
                view.user_initiated = false;
                view.status = DisplayStatus::Stopped;
                view.message = Some(MSG_QR_EXPIRED.to_string());
            }
        }

        SyncInput::StartRequested => {
            view.user_initiated = true;
            view.qr_payload = None;
            view.message = None;
            view.scan_attempts = 0;
            view.status = DisplayStatus::Starting;
            effects.push(SyncEffect::CancelQrTimer);
        }

        SyncInput::StartFailed { message } => {
            view.status = DisplayStatus::Error;
            view.message = Some(message);
            view.user_initiated = false;
            view.qr_payload = None;
            effects.push(SyncEffect::CancelQrTimer);
        }

        SyncInput::StartDeadlineElapsed => {
            // Guards against a silently-failed backend request; a QR or
            // any status change in the meantime disarms this
            if view.status == DisplayStatus::Starting
                && view.qr_payload.is_none()
                && view.user_initiated
            {
                view.status = DisplayStatus::Error;
                view.message = Some(MSG_NO_QR.to_string());
                view.user_initiated = false;
            }
        }

        SyncInput::StopRequested => {
            view.status = DisplayStatus::Stopping;
            view.message = None;
        }

        SyncInput::StopSucceeded => {
            view.status = DisplayStatus::Stopped;
            view.qr_payload = None;
            view.user_initiated = false;
            effects.push(SyncEffect::CancelQrTimer);
        }

        SyncInput::StopFailed { message } => {
            view.message = Some(message);
            effects.push(SyncEffect::ReconcileNow);
        }

        SyncInput::BlockedNumbersLoaded { numbers } => {
            view.blocked_numbers = numbers;
        }

        SyncInput::BlockedNumbersFailed { message } => {
            view.message = Some(message);
        }
    }

    (view, effects)
}

fn apply_push(view: &mut ConnectionView, event: BotEvent, effects: &mut Vec<SyncEffect>) {
    match event {
        BotEvent::Qr { payload } => {
            if !view.user_initiated {
                // The backend reports activity this view did not ask
                // for (another tab, a stale request); do not flash a
                // QR prompt
                return;
            }
            view.status = DisplayStatus::QrReceived;
            view.qr_payload = Some(payload.clone());
            view.scan_attempts += 1;
            view.message = None;
            effects.push(SyncEffect::ArmQrTimer { payload });
        }
        BotEvent::Connected => {
            let was_connected = view.status == DisplayStatus::Connected;
            view.status = DisplayStatus::Connected;
            view.qr_payload = None;
            view.user_initiated = false;
            view.message = None;
            view.scan_attempts = 0;
            effects.push(SyncEffect::CancelQrTimer);
            if !was_connected {
                effects.push(SyncEffect::FetchBlockedNumbers);
            }
        }
        BotEvent::Disconnected { reason } => {
            view.status = DisplayStatus::Stopped;
            view.qr_payload = None;
            view.user_initiated = false;
            view.message = Some(reason.unwrap_or_else(|| MSG_DISCONNECTED.to_string()));
            effects.push(SyncEffect::CancelQrTimer);
        }
    }
}

fn apply_polled(view: &mut ConnectionView, status: PersistedStatus, effects: &mut Vec<SyncEffect>) {
    match status {
        PersistedStatus::Connected => {
            let was_connected = view.status == DisplayStatus::Connected;
            view.status = DisplayStatus::Connected;
            view.qr_payload = None;
            view.user_initiated = false;
            view.scan_attempts = 0;
            if !was_connected {
                // Unlike an explicit connected event this keeps any
                // surfaced message; a reconciliation poll right after a
                // failed stop must not swallow the failure
                effects.push(SyncEffect::CancelQrTimer);
                effects.push(SyncEffect::FetchBlockedNumbers);
            }
        }
        PersistedStatus::Starting => {
            // qr_received is the client-local refinement of the stored
            // "starting"; a fresh poll must not downgrade it
            if view.status != DisplayStatus::QrReceived {
                view.status = DisplayStatus::Starting;
            }
        }
        PersistedStatus::Stopped => {
            // The store lags a just-requested start; adopting stopped
            // here would drop the initiated flag and suppress the QR
            // this user is waiting for. The start deadline bounds how
            // long the pending state can hold.
            if view.status == DisplayStatus::Starting && view.user_initiated {
                return;
            }
            let had_qr = view.qr_payload.is_some();
            view.status = DisplayStatus::Stopped;
            view.qr_payload = None;
            view.user_initiated = false;
            if had_qr {
                effects.push(SyncEffect::CancelQrTimer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants(view: &ConnectionView) {
        if view.qr_payload.is_some() {
            assert_eq!(view.status, DisplayStatus::QrReceived);
            assert!(view.user_initiated);
        }
        if view.status == DisplayStatus::Connected {
            assert!(view.qr_payload.is_none());
            assert!(!view.user_initiated);
        }
    }

    fn started_view() -> ConnectionView {
        let view = ConnectionView::loaded(PersistedStatus::Stopped);
        let (view, _) = reduce(view, SyncInput::StartRequested);
        view
    }

    #[test]
    fn test_record_loaded_resets_view() {
        let mut view = started_view();
        view.message = Some("old error".to_string());

        let (view, effects) = reduce(
            view,
            SyncInput::RecordLoaded {
                status: PersistedStatus::Stopped,
            },
        );
        assert_eq!(view.status, DisplayStatus::Stopped);
        assert!(view.message.is_none());
        assert!(!view.user_initiated);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_record_loaded_connected_fetches_blocked() {
        let (view, effects) = reduce(
            ConnectionView::default(),
            SyncInput::RecordLoaded {
                status: PersistedStatus::Connected,
            },
        );
        assert_eq!(view.status, DisplayStatus::Connected);
        assert_eq!(effects, vec![SyncEffect::FetchBlockedNumbers]);
    }

    #[test]
    fn test_qr_push_arms_timer_and_shows_payload() {
        let view = started_view();
        let (view, effects) = reduce(
            view,
            SyncInput::Push {
                event: BotEvent::Qr {
                    payload: "2@abcd".to_string(),
                },
                seq: 1,
            },
        );
        assert_eq!(view.status, DisplayStatus::QrReceived);
        assert_eq!(view.qr_payload.as_deref(), Some("2@abcd"));
        assert_eq!(view.scan_attempts, 1);
        assert_eq!(
            effects,
            vec![SyncEffect::ArmQrTimer {
                payload: "2@abcd".to_string()
            }]
        );
        assert_invariants(&view);
    }

    #[test]
    fn test_qr_push_suppressed_without_local_initiation() {
        // The backend may report starting for another tab's request;
        // no QR prompt may appear here
        let view = ConnectionView::loaded(PersistedStatus::Starting);
        let (view, effects) = reduce(
            view,
            SyncInput::Push {
                event: BotEvent::Qr {
                    payload: "2@abcd".to_string(),
                },
                seq: 1,
            },
        );
        assert!(view.qr_payload.is_none());
        assert_ne!(view.status, DisplayStatus::QrReceived);
        assert!(effects.is_empty());
        // The push still counts for freshness
        assert_eq!(view.last_push_seq(), 1);
    }

    #[test]
    fn test_connected_push_clears_qr_and_fetches_blocked_once() {
        let view = started_view();
        let (view, _) = reduce(
            view,
            SyncInput::Push {
                event: BotEvent::Qr {
                    payload: "2@abcd".to_string(),
                },
                seq: 1,
            },
        );

        let (view, effects) = reduce(
            view,
            SyncInput::Push {
                event: BotEvent::Connected,
                seq: 2,
            },
        );
        assert_eq!(view.status, DisplayStatus::Connected);
        assert!(view.qr_payload.is_none());
        assert!(!view.user_initiated);
        assert!(effects.contains(&SyncEffect::FetchBlockedNumbers));
        assert_invariants(&view);

        // Idempotence: a duplicated connected event is a no-op
        let before = view.clone();
        let (view, effects) = reduce(
            view,
            SyncInput::Push {
                event: BotEvent::Connected,
                seq: 3,
            },
        );
        assert_eq!(view.status, before.status);
        assert_eq!(view.qr_payload, before.qr_payload);
        assert_eq!(view.message, before.message);
        assert!(!effects.contains(&SyncEffect::FetchBlockedNumbers));
    }

    #[test]
    fn test_disconnected_push_surfaces_reason() {
        let view = started_view();
        let (view, _) = reduce(
            view,
            SyncInput::Push {
                event: BotEvent::Disconnected {
                    reason: Some("logged out".to_string()),
                },
                seq: 1,
            },
        );
        assert_eq!(view.status, DisplayStatus::Stopped);
        assert_eq!(view.message.as_deref(), Some("logged out"));

        // Default message when the backend gives no reason
        let (view, _) = reduce(
            view,
            SyncInput::Push {
                event: BotEvent::Disconnected { reason: None },
                seq: 2,
            },
        );
        assert!(view.message.is_some());
    }

    #[test]
    fn test_qr_expiry_only_for_current_payload() {
        let view = started_view();
        let (view, _) = reduce(
            view,
            SyncInput::Push {
                event: BotEvent::Qr {
                    payload: "first".to_string(),
                },
                seq: 1,
            },
        );
        let (view, _) = reduce(
            view,
            SyncInput::Push {
                event: BotEvent::Qr {
                    payload: "second".to_string(),
                },
                seq: 2,
            },
        );

        // The stale timer for the superseded payload must not fire
        let (view, _) = reduce(
            view,
            SyncInput::QrExpired {
                payload: "first".to_string(),
            },
        );
        assert_eq!(view.status, DisplayStatus::QrReceived);
        assert_eq!(view.qr_payload.as_deref(), Some("second"));

        let (view, _) = reduce(
            view,
            SyncInput::QrExpired {
                payload: "second".to_string(),
            },
        );
        assert_eq!(view.status, DisplayStatus::Stopped);
        assert!(view.qr_payload.is_none());
        assert!(view.message.as_deref().unwrap().contains("expired"));
        assert_invariants(&view);
    }

    #[test]
    fn test_stale_poll_is_ignored() {
        let view = started_view();
        let (view, _) = reduce(
            view,
            SyncInput::Push {
                event: BotEvent::Qr {
                    payload: "2@abcd".to_string(),
                },
                seq: 3,
            },
        );

        // Issued before the push arrived: the push wins
        let (view, effects) = reduce(
            view,
            SyncInput::Poll {
                status: PersistedStatus::Stopped,
                issued_seq: 1,
            },
        );
        assert_eq!(view.status, DisplayStatus::QrReceived);
        assert_eq!(view.qr_payload.as_deref(), Some("2@abcd"));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_fresh_poll_adopts_stored_status() {
        let view = started_view();
        let (view, effects) = reduce(
            view,
            SyncInput::Poll {
                status: PersistedStatus::Connected,
                issued_seq: 0,
            },
        );
        assert_eq!(view.status, DisplayStatus::Connected);
        assert!(effects.contains(&SyncEffect::FetchBlockedNumbers));
        assert_invariants(&view);
    }

    #[test]
    fn test_polled_starting_does_not_downgrade_qr() {
        let view = started_view();
        let (view, _) = reduce(
            view,
            SyncInput::Push {
                event: BotEvent::Qr {
                    payload: "2@abcd".to_string(),
                },
                seq: 1,
            },
        );

        // Issued after the push, reporting the stored superset state
        let (view, _) = reduce(
            view,
            SyncInput::Poll {
                status: PersistedStatus::Starting,
                issued_seq: 2,
            },
        );
        assert_eq!(view.status, DisplayStatus::QrReceived);
        assert_eq!(view.qr_payload.as_deref(), Some("2@abcd"));
        assert_invariants(&view);
    }

    #[test]
    fn test_polled_stopped_clears_outstanding_qr() {
        let view = started_view();
        let (view, _) = reduce(
            view,
            SyncInput::Push {
                event: BotEvent::Qr {
                    payload: "2@abcd".to_string(),
                },
                seq: 1,
            },
        );
        let (view, effects) = reduce(
            view,
            SyncInput::Poll {
                status: PersistedStatus::Stopped,
                issued_seq: 2,
            },
        );
        assert_eq!(view.status, DisplayStatus::Stopped);
        assert!(view.qr_payload.is_none());
        assert!(effects.contains(&SyncEffect::CancelQrTimer));
        assert_invariants(&view);
    }

    #[test]
    fn test_polled_stopped_does_not_stomp_pending_start() {
        // A poll spawned just before the start request completes after
        // it with the same sequence; adopting its stale "stopped" would
        // clear the initiated flag and suppress this user's own QR
        let view = started_view();
        let (view, effects) = reduce(
            view,
            SyncInput::Poll {
                status: PersistedStatus::Stopped,
                issued_seq: 0,
            },
        );
        assert_eq!(view.status, DisplayStatus::Starting);
        assert!(view.user_initiated);
        assert!(effects.is_empty());

        // The QR for this start still gets through
        let (view, _) = reduce(
            view,
            SyncInput::Push {
                event: BotEvent::Qr {
                    payload: "2@abcd".to_string(),
                },
                seq: 1,
            },
        );
        assert_eq!(view.status, DisplayStatus::QrReceived);

        // And if nothing arrives, the deadline guard still fires
        let (view, _) = reduce(started_view(), SyncInput::StartDeadlineElapsed);
        assert_eq!(view.status, DisplayStatus::Error);
    }

    #[test]
    fn test_polled_stopped_adopted_for_passive_starting() {
        // Starting observed from the store, not requested here; a
        // later stopped is authoritative
        let view = ConnectionView::loaded(PersistedStatus::Starting);
        let (view, _) = reduce(
            view,
            SyncInput::Poll {
                status: PersistedStatus::Stopped,
                issued_seq: 0,
            },
        );
        assert_eq!(view.status, DisplayStatus::Stopped);
    }

    #[test]
    fn test_poll_push_commutativity() {
        // For every deliverable interleaving of a poll result P and a
        // push event E, the final status equals whichever was logically
        // most recent. (A push with a lower sequence than P's issuance
        // cannot be delivered after P in a single-loop driver.)
        let polled = [
            PersistedStatus::Stopped,
            PersistedStatus::Starting,
            PersistedStatus::Connected,
        ];
        for status in polled {
            let base = started_view();
            let push = SyncInput::Push {
                event: BotEvent::Connected,
                seq: 2,
            };
            let poll = SyncInput::Poll {
                status,
                issued_seq: 1,
            };

            // Push is logically most recent in both orders
            let (a, _) = reduce(base.clone(), push.clone());
            let (a, _) = reduce(a, poll.clone());
            let (b, _) = reduce(base.clone(), poll);
            let (b, _) = reduce(b, push);

            assert_eq!(a.status, DisplayStatus::Connected, "polled {:?}", status);
            assert_eq!(a.status, b.status);
            assert_eq!(a.qr_payload, b.qr_payload);
        }
    }

    #[test]
    fn test_start_deadline_only_fires_while_waiting() {
        let view = started_view();
        let (expired, _) = reduce(view.clone(), SyncInput::StartDeadlineElapsed);
        assert_eq!(expired.status, DisplayStatus::Error);
        assert_eq!(expired.message.as_deref(), Some("no pairing code received"));
        assert!(!expired.user_initiated);

        // A QR in the meantime disarms the guard
        let (view, _) = reduce(
            view,
            SyncInput::Push {
                event: BotEvent::Qr {
                    payload: "2@abcd".to_string(),
                },
                seq: 1,
            },
        );
        let (view, _) = reduce(view, SyncInput::StartDeadlineElapsed);
        assert_eq!(view.status, DisplayStatus::QrReceived);
    }

    #[test]
    fn test_stop_failure_requests_reconciliation() {
        let view = ConnectionView::loaded(PersistedStatus::Connected);
        let (view, _) = reduce(view, SyncInput::StopRequested);
        assert_eq!(view.status, DisplayStatus::Stopping);

        let (view, effects) = reduce(
            view,
            SyncInput::StopFailed {
                message: "backend busy".to_string(),
            },
        );
        // Re-query the store rather than guessing the new state
        assert_eq!(effects, vec![SyncEffect::ReconcileNow]);
        assert_eq!(view.message.as_deref(), Some("backend busy"));
    }

    #[test]
    fn test_stop_success() {
        let view = ConnectionView::loaded(PersistedStatus::Connected);
        let (view, _) = reduce(view, SyncInput::StopRequested);
        let (view, _) = reduce(view, SyncInput::StopSucceeded);
        assert_eq!(view.status, DisplayStatus::Stopped);
        assert_invariants(&view);
    }
}
