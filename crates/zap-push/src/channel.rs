//! Push channel connection management
//!
//! A single background task owns the WebSocket connection and a routing
//! table from bot identifier to subscriber queue. Commands from handles
//! and subscriptions are applied to the table whether or not the socket
//! is currently up; subscribe frames for live entries are re-emitted
//! after every reconnect.

use std::collections::HashMap;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

use zap_core::config::PushConfig;
use zap_core::BotEvent;

use crate::error::PushError;
use crate::frame::{ClientFrame, ServerFrame};
use crate::subscription::Subscription;

/// Per-subscription delivery queue depth
const SUBSCRIPTION_BUFFER: usize = 32;

#[derive(Debug)]
pub(crate) enum Command {
    Subscribe {
        bot_id: String,
        tx: mpsc::Sender<BotEvent>,
    },
    Unsubscribe {
        bot_id: String,
    },
}

/// Handle to the shared push channel.
///
/// Constructed once at application start and passed by reference to any
/// view that needs a subscription. Dropping the handle tears the
/// connection down.
pub struct PushChannel {
    cmd_tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl PushChannel {
    /// Spawn the channel task. The connection itself is established (and
    /// re-established) in the background.
    pub fn connect(config: PushConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_channel(config, cmd_rx));
        Self { cmd_tx, task }
    }

    /// Subscribe to one bot's events.
    ///
    /// A second subscription for the same identifier replaces the first;
    /// the replaced subscription's queue closes.
    pub fn subscribe(&self, bot_id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        // Delivery is best effort once the task is gone
        let _ = self.cmd_tx.send(Command::Subscribe {
            bot_id: bot_id.to_string(),
            tx,
        });
        Subscription::new(bot_id.to_string(), rx, self.cmd_tx.clone())
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_channel(config: PushConfig, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
    let mut subs: HashMap<String, mpsc::Sender<BotEvent>> = HashMap::new();
    let mut attempts: u32 = 0;
    let backoff = Duration::from_secs(config.reconnect_delay_secs);
    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

    loop {
        let stream = match tokio::time::timeout(connect_timeout, connect_async(&config.url)).await {
            Ok(Ok((stream, _))) => {
                info!("Push channel connected to {}", config.url);
                attempts = 0;
                stream
            }
            Ok(Err(e)) => {
                attempts += 1;
                warn!(
                    "Push channel connect failed (attempt {}/{}): {}",
                    attempts, config.reconnect_attempts, e
                );
                if attempts >= config.reconnect_attempts {
                    error!("Push channel reconnect attempts exhausted");
                    return;
                }
                if !wait_backoff(backoff, &mut cmd_rx, &mut subs).await {
                    return;
                }
                continue;
            }
            Err(_) => {
                attempts += 1;
                warn!(
                    "Push channel connect timed out (attempt {}/{})",
                    attempts, config.reconnect_attempts
                );
                if attempts >= config.reconnect_attempts {
                    error!("Push channel reconnect attempts exhausted");
                    return;
                }
                if !wait_backoff(backoff, &mut cmd_rx, &mut subs).await {
                    return;
                }
                continue;
            }
        };

        let (mut write, mut read) = stream.split();

        // Re-announce every live subscription after a (re)connect
        for bot_id in subs.keys() {
            if let Err(e) = send_frame(
                &mut write,
                &ClientFrame::Subscribe {
                    bot_id: bot_id.clone(),
                },
            )
            .await
            {
                warn!("Failed to re-subscribe {}: {}", bot_id, e);
            }
        }

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Subscribe { bot_id, tx }) => {
                            debug!("Subscribing to events for bot {}", bot_id);
                            subs.insert(bot_id.clone(), tx);
                            if let Err(e) = send_frame(&mut write, &ClientFrame::Subscribe { bot_id }).await {
                                warn!("Subscribe frame failed: {}", e);
                                break;
                            }
                        }
                        Some(Command::Unsubscribe { bot_id }) => {
                            // A stale drop must not clobber a replacement
                            // subscription that is still being consumed.
                            let gone = subs.get(&bot_id).is_none_or(|tx| tx.is_closed());
                            if gone {
                                debug!("Unsubscribing from events for bot {}", bot_id);
                                subs.remove(&bot_id);
                                if let Err(e) = send_frame(&mut write, &ClientFrame::Unsubscribe { bot_id }).await {
                                    warn!("Unsubscribe frame failed: {}", e);
                                    break;
                                }
                            }
                        }
                        None => {
                            debug!("Push channel handle dropped, closing");
                            return;
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            handle_text(&text, &subs).await;
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            if write.send(WsMessage::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            info!("Push channel connection closed by server");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!("Push channel read error: {}", e);
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        // Connection lost; keep the routing table and reconnect
        if !wait_backoff(backoff, &mut cmd_rx, &mut subs).await {
            return;
        }
    }
}

/// Sleep out the backoff while still applying table updates.
/// Returns false when the owning handle is gone.
async fn wait_backoff(
    backoff: Duration,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    subs: &mut HashMap<String, mpsc::Sender<BotEvent>>,
) -> bool {
    let deadline = tokio::time::Instant::now() + backoff;
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return true,
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Subscribe { bot_id, tx }) => {
                        subs.insert(bot_id, tx);
                    }
                    Some(Command::Unsubscribe { bot_id }) => {
                        if subs.get(&bot_id).is_none_or(|tx| tx.is_closed()) {
                            subs.remove(&bot_id);
                        }
                    }
                    None => return false,
                }
            }
        }
    }
}

async fn handle_text(text: &str, subs: &HashMap<String, mpsc::Sender<BotEvent>>) {
    let frame: ServerFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Dropping unparseable push frame: {}", e);
            return;
        }
    };

    let Some((bot_id, event)) = frame.into_event() else {
        return;
    };

    match subs.get(&bot_id) {
        Some(tx) => {
            if tx.send(event).await.is_err() {
                debug!("Subscriber for bot {} is gone, dropping event", bot_id);
            }
        }
        None => {
            debug!("No live subscription for bot {}, dropping event", bot_id);
        }
    }
}

async fn send_frame<S>(write: &mut S, frame: &ClientFrame) -> crate::error::Result<()>
where
    S: SinkExt<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = serde_json::to_string(frame).map_err(|e| PushError::InvalidFrame(e.to_string()))?;
    write
        .send(WsMessage::Text(json.into()))
        .await
        .map_err(|e| PushError::WebSocket(e.to_string()))
}
