//! Channel-backed messenger.
//!
//! Each connection registers the sending half of its outbound queue. Sends
//! never wait: when a client cannot keep up, its messages are dropped.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{trace, warn};

use crate::game::events::{GameEvent, PlayerId};
use crate::game::messenger::Messenger;
use crate::network::protocol::ServerMessage;

/// [`Messenger`] over per-connection bounded channels.
#[derive(Debug, Default)]
pub struct ChannelMessenger {
    outboxes: DashMap<PlayerId, mpsc::Sender<ServerMessage>>,
}

impl ChannelMessenger {
    /// Create with no registered players.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route events for `player_id` into `sender`.
    pub fn register(&self, player_id: PlayerId, sender: mpsc::Sender<ServerMessage>) {
        self.outboxes.insert(player_id, sender);
    }

    /// Stop routing events to `player_id`.
    pub fn unregister(&self, player_id: PlayerId) {
        self.outboxes.remove(&player_id);
    }

    /// Number of registered players.
    pub fn len(&self) -> usize {
        self.outboxes.len()
    }

    /// True when nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.outboxes.is_empty()
    }

    fn deliver(player_id: PlayerId, sender: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
        match sender.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for player {}, dropping message", player_id);
            }
            Err(TrySendError::Closed(_)) => {
                trace!("Outbound queue closed for player {}", player_id);
            }
        }
    }
}

impl Messenger for ChannelMessenger {
    fn send_to(&self, player_id: PlayerId, event: GameEvent) {
        if let Some(sender) = self.outboxes.get(&player_id) {
            Self::deliver(player_id, sender.value(), ServerMessage::Event(event));
        }
    }

    fn broadcast(&self, event: GameEvent) {
        let recipients: Vec<(PlayerId, mpsc::Sender<ServerMessage>)> = self
            .outboxes
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        for (player_id, sender) in recipients {
            Self::deliver(player_id, &sender, ServerMessage::Event(event.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::Vec2;

    #[tokio::test]
    async fn test_send_to_and_broadcast() {
        let messenger = ChannelMessenger::new();
        let a = PlayerId::generate();
        let b = PlayerId::generate();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        messenger.register(a, tx_a);
        messenger.register(b, tx_b);

        let stopped = GameEvent::player_stopped(a, Vec2::new(1.0, 1.0));
        messenger.send_to(b, stopped.clone());
        messenger.broadcast(GameEvent::PlayerLeft { player_id: a });

        assert_eq!(rx_b.recv().await, Some(ServerMessage::Event(stopped)));
        assert_eq!(rx_b.recv().await, Some(ServerMessage::Event(GameEvent::PlayerLeft { player_id: a })));
        assert_eq!(rx_a.recv().await, Some(ServerMessage::Event(GameEvent::PlayerLeft { player_id: a })));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let messenger = ChannelMessenger::new();
        let id = PlayerId::generate();
        let (tx, mut rx) = mpsc::channel(1);
        messenger.register(id, tx);

        messenger.broadcast(GameEvent::PlayerLeft { player_id: id });
        messenger.broadcast(GameEvent::PlayerLeft { player_id: id });

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unregister() {
        let messenger = ChannelMessenger::new();
        let id = PlayerId::generate();
        let (tx, mut rx) = mpsc::channel(4);
        messenger.register(id, tx);
        assert_eq!(messenger.len(), 1);

        messenger.unregister(id);
        assert!(messenger.is_empty());
        messenger.send_to(id, GameEvent::PlayerLeft { player_id: id });
        assert!(rx.try_recv().is_err());
    }
}
