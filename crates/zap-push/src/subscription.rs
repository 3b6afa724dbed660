//! Per-bot event subscriptions

use tokio::sync::mpsc;

use zap_core::BotEvent;

use crate::channel::Command;

/// Events for one bot identifier, delivered in arrival order.
///
/// Dropping the subscription sends an explicit unsubscribe so the backend
/// stops pushing events to a no-longer-interested client.
pub struct Subscription {
    bot_id: String,
    rx: mpsc::Receiver<BotEvent>,
    cmd_tx: Option<mpsc::UnboundedSender<Command>>,
}

impl Subscription {
    pub(crate) fn new(
        bot_id: String,
        rx: mpsc::Receiver<BotEvent>,
        cmd_tx: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            bot_id,
            rx,
            cmd_tx: Some(cmd_tx),
        }
    }

    /// Build a subscription that is not backed by a channel connection.
    ///
    /// The returned sender delivers events directly; useful for driving a
    /// consumer without a live WebSocket.
    pub fn detached(bot_id: impl Into<String>, capacity: usize) -> (mpsc::Sender<BotEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            Self {
                bot_id: bot_id.into(),
                rx,
                cmd_tx: None,
            },
        )
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    /// Receive the next event. Returns `None` once the channel task has
    /// dropped this subscription's binding (replaced or shut down).
    pub async fn recv(&mut self) -> Option<BotEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cmd_tx) = self.cmd_tx.take() {
            // Best effort: the channel task may already be gone
            let _ = cmd_tx.send(Command::Unsubscribe {
                bot_id: self.bot_id.clone(),
            });
        }
    }
}
