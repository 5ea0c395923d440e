use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::errors::CustomError;
use crate::models::room::{Room, RoomStatus, RoomView};
use crate::services::broadcast::{Broadcaster, Event, Topic};
use crate::services::games::GameService;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRoom {
    pub room_token: Uuid,
    pub shareable_link: String,
    pub message: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct JoinedRoom {
    pub message: String,
    pub host_username: String,
    pub room_token: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<Uuid>,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartedGame {
    pub message: String,
    pub game_id: Uuid,
}

pub struct RoomService {
    rooms: RwLock<HashMap<Uuid, Arc<Mutex<Room>>>>,
    broadcaster: Arc<Broadcaster>,
    ttl: Duration,
    public_url: String,
}

impl RoomService {
    pub fn new(broadcaster: Arc<Broadcaster>, ttl: Duration, public_url: &str) -> Self {
        RoomService {
            rooms: RwLock::new(HashMap::new()),
            broadcaster,
            ttl,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, token: Uuid) -> Result<Arc<Mutex<Room>>, CustomError> {
        self.rooms
            .read()
            .await
            .get(&token)
            .cloned()
            .ok_or(CustomError::RoomNotFound)
    }

    pub async fn create(&self, host: &str) -> CreatedRoom {
        let room = Room::new(host, self.ttl, Utc::now());
        let token = room.token;
        self.rooms.write().await.insert(token, Arc::new(Mutex::new(room)));
        info!("Room {} created by {}", token, host);
        CreatedRoom {
            room_token: token,
            shareable_link: format!("{}/lobby/join/{}", self.public_url, token),
            message: "Room created successfully".to_string(),
        }
    }

    pub async fn join(&self, token: Uuid, username: &str) -> Result<JoinedRoom, CustomError> {
        let room = self.get(token).await?;
        let (joined, newly) = {
            let mut room = room.lock().await;
            let newly = room.join(username, Utc::now())?;
            let joined = JoinedRoom {
                message: "Successfully joined room".to_string(),
                host_username: room.host_username.clone(),
                room_token: token,
                game_id: room.game_id,
            };
            (joined, newly)
        };
        if newly {
            info!("{} joined room {}", username, token);
            self.broadcaster.publish(
                Topic::Room(token),
                &Event::PlayerJoined {
                    room_token: token,
                    username: username.to_string(),
                },
            );
        }
        Ok(joined)
    }

    pub async fn view(&self, token: Uuid, username: &str) -> Result<RoomView, CustomError> {
        let room = self.get(token).await?;
        let room = room.lock().await;
        room.view(username, Utc::now())
    }

    pub async fn is_participant(&self, token: Uuid, username: &str) -> Result<(), CustomError> {
        let room = self.get(token).await?;
        let room = room.lock().await;
        if room.is_participant(username) {
            Ok(())
        } else {
            Err(CustomError::NotParticipant)
        }
    }

    /// Creates the room's game. Calling it again returns the same game.
    pub async fn start(&self, token: Uuid, username: &str, games: &GameService) -> Result<StartedGame, CustomError> {
        let room = self.get(token).await?;
        let game_id = {
            let mut room = room.lock().await;
            if let Some(game_id) = room.check_start(username, Utc::now())? {
                return Ok(StartedGame {
                    message: "Game already started".to_string(),
                    game_id,
                });
            }
            let guest = room.guest_username.clone().ok_or(CustomError::RoomNotReady)?;
            let game_id = games.create_online_game(&room.host_username, &guest, token).await;
            room.mark_started(game_id);
            game_id
        };
        self.broadcaster.publish(
            Topic::Room(token),
            &Event::StatusUpdate {
                room_token: token,
                status: RoomStatus::InGame,
                game_id: Some(game_id),
            },
        );
        Ok(StartedGame {
            message: "Game started successfully".to_string(),
            game_id,
        })
    }

    pub async fn delete(&self, token: Uuid, username: &str) -> Result<(), CustomError> {
        // map before room; nothing waits on the map while holding a room
        let mut rooms = self.rooms.write().await;
        let room = rooms.get(&token).cloned().ok_or(CustomError::RoomNotFound)?;
        room.lock().await.check_delete(username)?;
        rooms.remove(&token);
        info!("Room {} deleted by {}", token, username);
        Ok(())
    }

    /// Expires lapsed lobbies and drops the ones expired long ago, along with started rooms
    /// whose game is not in `live_games` any more. Returns (expired, removed).
    pub async fn sweep(&self, now: DateTime<Utc>, live_games: &HashSet<Uuid>) -> (usize, usize) {
        let rooms: Vec<Arc<Mutex<Room>>> = self.rooms.read().await.values().cloned().collect();
        let mut expired = Vec::new();
        let mut stale = Vec::new();
        for room in rooms {
            let mut room = room.lock().await;
            if room.expire_if_due(now) {
                expired.push(room.token);
            }
            if room.is_stale(now, self.ttl, live_games) {
                stale.push(room.token);
            }
        }

        for token in &expired {
            debug!("Room {} expired", token);
            self.broadcaster.publish(
                Topic::Room(*token),
                &Event::StatusUpdate {
                    room_token: *token,
                    status: RoomStatus::Expired,
                    game_id: None,
                },
            );
        }
        if !stale.is_empty() {
            let mut rooms = self.rooms.write().await;
            for token in &stale {
                rooms.remove(token);
            }
        }
        (expired.len(), stale.len())
    }
}
