//! The synchronizer task
//!
//! One task per displayed bot. It owns the push subscription, the poll
//! interval and the expiry timers, folds everything through
//! [`reduce`](crate::reducer::reduce), and publishes the resulting
//! [`ConnectionView`] on a watch channel. Collaborator calls run on
//! spawned tasks and report back through an internal queue, so a call
//! that completes after shutdown has nowhere to write to.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use zap_core::config::SyncConfig;
use zap_core::{BotControl, BotStore, DisplayStatus, Error, TokenSource};
use zap_push::Subscription;

use crate::reducer::{reduce, SyncEffect, SyncInput};
use crate::view::ConnectionView;

const CMD_BUFFER: usize = 16;

/// Collaborators the synchronizer calls out to.
#[derive(Clone)]
pub struct SyncDeps {
    pub store: Arc<dyn BotStore>,
    pub control: Arc<dyn BotControl>,
    pub tokens: Arc<dyn TokenSource>,
}

/// User-invocable actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    Start,
    Stop,
    /// Request a fresh pairing code (restarts the session)
    RefreshQr,
    /// Re-fetch the record and reset the view
    Reload,
    Shutdown,
}

/// Handle to a running synchronizer task.
///
/// Cheap to clone. The task ends on [`SyncCommand::Shutdown`] or when
/// the last handle is dropped.
#[derive(Clone)]
pub struct SyncHandle {
    cmd_tx: mpsc::Sender<SyncCommand>,
    view_rx: watch::Receiver<ConnectionView>,
}

impl SyncHandle {
    pub async fn start(&self) -> zap_core::Result<()> {
        self.send(SyncCommand::Start).await
    }

    pub async fn stop(&self) -> zap_core::Result<()> {
        self.send(SyncCommand::Stop).await
    }

    pub async fn refresh_qr(&self) -> zap_core::Result<()> {
        self.send(SyncCommand::RefreshQr).await
    }

    pub async fn reload(&self) -> zap_core::Result<()> {
        self.send(SyncCommand::Reload).await
    }

    pub async fn shutdown(&self) -> zap_core::Result<()> {
        self.send(SyncCommand::Shutdown).await
    }

    /// Snapshot of the current view.
    pub fn view(&self) -> ConnectionView {
        self.view_rx.borrow().clone()
    }

    /// A receiver that observes every published view.
    pub fn watch(&self) -> watch::Receiver<ConnectionView> {
        self.view_rx.clone()
    }

    async fn send(&self, cmd: SyncCommand) -> zap_core::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| Error::Channel("synchronizer task ended".to_string()))
    }
}

/// The task state behind a [`SyncHandle`].
pub struct Synchronizer {
    bot_id: String,
    deps: SyncDeps,
    timing: SyncConfig,
    view: ConnectionView,
    view_tx: watch::Sender<ConnectionView>,
    /// Completions from spawned collaborator calls come back here; the
    /// receiver dies with the task, so late completions are dropped
    /// instead of mutating a dismantled view
    input_tx: mpsc::UnboundedSender<SyncInput>,
    /// Arrival counter for push events, used to stamp poll issuance
    seq: u64,
    qr_deadline: Option<(Instant, String)>,
    start_deadline: Option<Instant>,
}

impl Synchronizer {
    /// Spawn a synchronizer for one bot and return its handle.
    pub fn spawn(
        bot_id: impl Into<String>,
        deps: SyncDeps,
        subscription: Subscription,
        timing: SyncConfig,
    ) -> SyncHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_BUFFER);
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ConnectionView::default());

        let sync = Self {
            bot_id: bot_id.into(),
            deps,
            timing,
            view: ConnectionView::default(),
            view_tx,
            input_tx,
            seq: 0,
            qr_deadline: None,
            start_deadline: None,
        };
        tokio::spawn(sync.run(cmd_rx, input_rx, subscription));

        SyncHandle { cmd_tx, view_rx }
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<SyncCommand>,
        mut input_rx: mpsc::UnboundedReceiver<SyncInput>,
        mut subscription: Subscription,
    ) {
        info!(bot_id = %self.bot_id, "synchronizer started");
        self.initial_load().await;

        let mut poll = time::interval(Duration::from_secs(self.timing.poll_interval_secs));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and the initial load just
        // ran; consume it
        poll.tick().await;

        let mut push_closed = false;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    None | Some(SyncCommand::Shutdown) => break,
                    Some(SyncCommand::Start) | Some(SyncCommand::RefreshQr) => self.do_start(),
                    Some(SyncCommand::Stop) => self.do_stop(),
                    Some(SyncCommand::Reload) => self.do_reload(),
                },

                Some(input) = input_rx.recv() => self.apply(input),

                event = subscription.recv(), if !push_closed => match event {
                    Some(event) => {
                        self.seq += 1;
                        let seq = self.seq;
                        debug!(bot_id = %self.bot_id, seq, ?event, "push event");
                        self.apply(SyncInput::Push { event, seq });
                    }
                    None => {
                        // Polling remains as the fallback source
                        warn!(bot_id = %self.bot_id, "push subscription closed");
                        push_closed = true;
                    }
                },

                _ = poll.tick() => self.poll_now(),

                _ = time::sleep_until(deadline_or_distant(self.qr_deadline.as_ref().map(|(at, _)| *at))),
                    if self.qr_deadline.is_some() =>
                {
                    if let Some((_, payload)) = self.qr_deadline.take() {
                        debug!(bot_id = %self.bot_id, "pairing code expired");
                        self.apply(SyncInput::QrExpired { payload });
                    }
                }

                _ = time::sleep_until(deadline_or_distant(self.start_deadline)),
                    if self.start_deadline.is_some() =>
                {
                    self.start_deadline = None;
                    self.apply(SyncInput::StartDeadlineElapsed);
                }
            }
        }

        info!(bot_id = %self.bot_id, "synchronizer stopped");
    }

    async fn initial_load(&mut self) {
        let input = match self.deps.store.get(&self.bot_id).await {
            Ok(record) => SyncInput::RecordLoaded {
                status: record.status,
            },
            Err(e) => {
                warn!(bot_id = %self.bot_id, error = %e, "initial load failed");
                SyncInput::PollFailed {
                    message: e.to_string(),
                }
            }
        };
        self.apply(input);
    }

    /// Fold one input into the view and run the resulting effects.
    fn apply(&mut self, input: SyncInput) {
        let (view, effects) = reduce(self.view.clone(), input);
        self.view = view;

        for effect in effects {
            match effect {
                SyncEffect::ArmQrTimer { payload } => {
                    let at = Instant::now() + Duration::from_secs(self.timing.qr_timeout_secs);
                    self.qr_deadline = Some((at, payload));
                }
                SyncEffect::CancelQrTimer => self.qr_deadline = None,
                SyncEffect::FetchBlockedNumbers => self.fetch_blocked(),
                SyncEffect::ReconcileNow => self.poll_now(),
            }
        }

        // The deadline only guards the window between a start request
        // and the first sign of progress
        if self.view.status != DisplayStatus::Starting {
            self.start_deadline = None;
        }

        self.view_tx.send_replace(self.view.clone());
    }

    fn do_start(&mut self) {
        if self.deps.tokens.token().is_none() {
            // Fail locally; no request goes out without a token
            self.apply(SyncInput::StartFailed {
                message: Error::Unauthenticated.to_string(),
            });
            return;
        }

        self.apply(SyncInput::StartRequested);
        self.start_deadline =
            Some(Instant::now() + Duration::from_secs(self.timing.start_timeout_secs));

        let control = Arc::clone(&self.deps.control);
        let bot_id = self.bot_id.clone();
        let tx = self.input_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = control.start_bot(&bot_id).await {
                let _ = tx.send(SyncInput::StartFailed {
                    message: e.to_string(),
                });
            }
            // Success is not a state change; the QR or connected event
            // arrives out of band
        });
    }

    fn do_stop(&mut self) {
        if self.deps.tokens.token().is_none() {
            // Same local failure as a start; nothing goes out without a
            // token and no transient stopping state is shown
            self.apply(SyncInput::StopFailed {
                message: Error::Unauthenticated.to_string(),
            });
            return;
        }

        self.apply(SyncInput::StopRequested);

        let control = Arc::clone(&self.deps.control);
        let bot_id = self.bot_id.clone();
        let tx = self.input_tx.clone();
        tokio::spawn(async move {
            let input = match control.stop_bot(&bot_id).await {
                Ok(()) => SyncInput::StopSucceeded,
                Err(e) => SyncInput::StopFailed {
                    message: e.to_string(),
                },
            };
            let _ = tx.send(input);
        });
    }

    fn do_reload(&mut self) {
        let store = Arc::clone(&self.deps.store);
        let bot_id = self.bot_id.clone();
        let tx = self.input_tx.clone();
        tokio::spawn(async move {
            let input = match store.get(&bot_id).await {
                Ok(record) => SyncInput::RecordLoaded {
                    status: record.status,
                },
                Err(e) => SyncInput::PollFailed {
                    message: e.to_string(),
                },
            };
            let _ = tx.send(input);
        });
    }

    /// Query the store; the result carries the push sequence current at
    /// issuance so the reducer can detect that a later push supersedes it.
    fn poll_now(&self) {
        let issued_seq = self.seq;
        let store = Arc::clone(&self.deps.store);
        let bot_id = self.bot_id.clone();
        let tx = self.input_tx.clone();
        tokio::spawn(async move {
            let input = match store.get(&bot_id).await {
                Ok(record) => SyncInput::Poll {
                    status: record.status,
                    issued_seq,
                },
                Err(e) => SyncInput::PollFailed {
                    message: e.to_string(),
                },
            };
            let _ = tx.send(input);
        });
    }

    fn fetch_blocked(&self) {
        let control = Arc::clone(&self.deps.control);
        let bot_id = self.bot_id.clone();
        let tx = self.input_tx.clone();
        tokio::spawn(async move {
            let input = match control.blocked_numbers(&bot_id).await {
                Ok(numbers) => SyncInput::BlockedNumbersLoaded { numbers },
                Err(e) => SyncInput::BlockedNumbersFailed {
                    message: e.to_string(),
                },
            };
            let _ = tx.send(input);
        });
    }
}

fn deadline_or_distant(deadline: Option<Instant>) -> Instant {
    deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(86400))
}
