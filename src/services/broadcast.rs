//! Fan-out of game and room events to subscribed WebSocket connections.
//!
//! Each connection owns an unbounded channel drained by a single writer task, so events reach
//! a connection in the order they were published. Delivery is at-most-once: a connection
//! whose channel is closed is dropped on the next send and nothing is replayed.

use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::models::game::{AttackResult, GameResult, Turn};
use crate::models::room::RoomStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    Game(Uuid),
    Room(Uuid),
}

pub type ConnectionId = u64;

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    GameStateUpdate {
        game_id: Uuid,
        #[serde(flatten)]
        state: AttackResult,
    },
    #[serde(rename_all = "camelCase")]
    AttackResult {
        game_id: Uuid,
        #[serde(flatten)]
        result: AttackResult,
    },
    #[serde(rename_all = "camelCase")]
    GameFinished {
        game_id: Uuid,
        winner: Option<GameResult>,
        game_finished: bool,
    },
    #[serde(rename_all = "camelCase")]
    PlayerReady {
        game_id: Uuid,
        is_host: bool,
        host_ready: bool,
        guest_ready: bool,
        both_ready: bool,
        game_started: bool,
        current_turn: Option<Turn>,
    },
    #[serde(rename_all = "camelCase")]
    PlayerJoined { room_token: Uuid, username: String },
    #[serde(rename_all = "camelCase")]
    StatusUpdate {
        room_token: Uuid,
        status: RoomStatus,
        game_id: Option<Uuid>,
    },
    #[serde(rename_all = "camelCase")]
    Subscribed {
        #[serde(skip_serializing_if = "Option::is_none")]
        game_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_token: Option<Uuid>,
    },
    Error { message: String },
}

struct Subscriber {
    id: ConnectionId,
    username: Option<String>,
    tx: UnboundedSender<Event>,
}

#[derive(Default)]
pub struct Broadcaster {
    next_id: AtomicU64,
    topics: Mutex<HashMap<Topic, Vec<Subscriber>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Broadcaster::default()
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<Topic, Vec<Subscriber>>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Adds a connection to `topic`. Subscribing twice replaces the earlier entry.
    pub fn subscribe(&self, topic: Topic, id: ConnectionId, username: Option<String>, tx: UnboundedSender<Event>) {
        debug!("Connection {} ({:?}) subscribed to {:?}", id, username, topic);
        let mut topics = self.topics();
        let subscribers = topics.entry(topic).or_default();
        subscribers.retain(|s| s.id != id);
        subscribers.push(Subscriber { id, username, tx });
    }

    /// Forgets a closed connection everywhere.
    pub fn unsubscribe_all(&self, id: ConnectionId) {
        let mut topics = self.topics();
        for subscribers in topics.values_mut() {
            subscribers.retain(|s| s.id != id);
        }
        topics.retain(|_, subscribers| !subscribers.is_empty());
    }

    /// Sends `event` to every subscriber of `topic`. Returns how many received it.
    pub fn publish(&self, topic: Topic, event: &Event) -> usize {
        self.deliver(topic, event, |_| true)
    }

    /// Sends `event` only to the connections of `username` on `topic`.
    pub fn send_to_user(&self, topic: Topic, username: &str, event: &Event) -> usize {
        self.deliver(topic, event, |s| s.username.as_deref() == Some(username))
    }

    fn deliver(&self, topic: Topic, event: &Event, wanted: impl Fn(&Subscriber) -> bool) -> usize {
        let mut topics = self.topics();
        let subscribers = match topics.get_mut(&topic) {
            Some(subscribers) => subscribers,
            None => return 0,
        };

        let mut delivered = 0;
        subscribers.retain(|s| {
            if !wanted(s) {
                return true;
            }
            match s.tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => {
                    debug!("Dropping closed connection {} from {:?}", s.id, topic);
                    false
                }
            }
        });
        if subscribers.is_empty() {
            topics.remove(&topic);
        }
        delivered
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics().get(&topic).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn error(message: &str) -> Event {
        Event::Error { message: message.to_string() }
    }

    #[test]
    fn events_arrive_in_publish_order() {
        let broadcaster = Broadcaster::new();
        let topic = Topic::Game(Uuid::new_v4());
        let (tx, mut rx) = unbounded_channel();
        broadcaster.subscribe(topic, broadcaster.next_connection_id(), None, tx);

        for i in 0..5 {
            assert_eq!(broadcaster.publish(topic, &error(&i.to_string())), 1);
        }
        for i in 0..5 {
            assert_eq!(rx.try_recv().unwrap(), error(&i.to_string()));
        }
    }

    #[test]
    fn per_user_delivery_skips_other_players() {
        let broadcaster = Broadcaster::new();
        let topic = Topic::Game(Uuid::new_v4());
        let (alice_tx, mut alice_rx) = unbounded_channel();
        let (bob_tx, mut bob_rx) = unbounded_channel();
        broadcaster.subscribe(topic, 1, Some("alice".to_string()), alice_tx);
        broadcaster.subscribe(topic, 2, Some("bob".to_string()), bob_tx);

        assert_eq!(broadcaster.send_to_user(topic, "bob", &error("yours")), 1);
        assert!(alice_rx.try_recv().is_err());
        assert_eq!(bob_rx.try_recv().unwrap(), error("yours"));
    }

    #[test]
    fn closed_connections_are_dropped() {
        let broadcaster = Broadcaster::new();
        let topic = Topic::Room(Uuid::new_v4());
        let (tx, rx) = unbounded_channel();
        broadcaster.subscribe(topic, 1, None, tx);
        drop(rx);

        assert_eq!(broadcaster.publish(topic, &error("gone")), 0);
        assert_eq!(broadcaster.subscriber_count(topic), 0);
    }

    #[test]
    fn unsubscribe_removes_connection_from_every_topic() {
        let broadcaster = Broadcaster::new();
        let game = Topic::Game(Uuid::new_v4());
        let room = Topic::Room(Uuid::new_v4());
        let (tx, _rx) = unbounded_channel();
        broadcaster.subscribe(game, 7, None, tx.clone());
        broadcaster.subscribe(room, 7, None, tx);

        broadcaster.unsubscribe_all(7);
        assert_eq!(broadcaster.subscriber_count(game), 0);
        assert_eq!(broadcaster.subscriber_count(room), 0);
    }

    #[test]
    fn events_are_tagged_by_type() {
        let token = Uuid::new_v4();
        let json = serde_json::to_value(Event::PlayerJoined {
            room_token: token,
            username: "bob".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "playerJoined");
        assert_eq!(json["roomToken"], token.to_string());
        assert_eq!(json["username"], "bob");
    }
}
