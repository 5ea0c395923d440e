use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

use crate::errors::CustomError;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Waiting,
    Ready,
    InGame,
    Expired,
}

/// A pairing lobby. It produces at most one game and is never reused.
#[derive(Clone, Debug)]
pub struct Room {
    pub token: Uuid,
    pub host_username: String,
    pub guest_username: Option<String>,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub game_id: Option<Uuid>,
}

// The struct used to respond to GET /rooms/{token}
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub token: Uuid,
    pub status: RoomStatus,
    pub host_username: String,
    pub guest_username: Option<String>,
    pub is_host: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub expired: bool,
    pub game_id: Option<Uuid>,
}

impl Room {
    pub fn new(host: &str, ttl: Duration, now: DateTime<Utc>) -> Self {
        Room {
            token: Uuid::new_v4(),
            host_username: host.to_string(),
            guest_username: None,
            status: RoomStatus::Waiting,
            created_at: now,
            expires_at: now + ttl,
            game_id: None,
        }
    }

    /// A room that already produced its game never expires.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            RoomStatus::Expired => true,
            RoomStatus::InGame => false,
            _ => now > self.expires_at,
        }
    }

    pub fn effective_status(&self, now: DateTime<Utc>) -> RoomStatus {
        if self.is_expired(now) {
            RoomStatus::Expired
        } else {
            self.status
        }
    }

    pub fn is_participant(&self, username: &str) -> bool {
        self.host_username == username || self.guest_username.as_deref() == Some(username)
    }

    /// Records `username` as guest. Returns false when they had already joined.
    pub fn join(&mut self, username: &str, now: DateTime<Utc>) -> Result<bool, CustomError> {
        if self.is_expired(now) {
            return Err(CustomError::RoomExpired);
        }
        if self.host_username == username {
            return Err(CustomError::CannotJoinOwnRoom);
        }
        match self.guest_username.as_deref() {
            Some(guest) if guest == username => Ok(false),
            Some(_) => Err(CustomError::RoomFull),
            None => {
                self.guest_username = Some(username.to_string());
                self.status = RoomStatus::Ready;
                Ok(true)
            }
        }
    }

    /// Checks that `username` may start the game. `Some(id)` means it already started.
    pub fn check_start(&self, username: &str, now: DateTime<Utc>) -> Result<Option<Uuid>, CustomError> {
        if self.host_username != username {
            return Err(CustomError::NotHost);
        }
        if let Some(game_id) = self.game_id {
            return Ok(Some(game_id));
        }
        if self.is_expired(now) {
            return Err(CustomError::RoomExpired);
        }
        if self.status != RoomStatus::Ready || self.guest_username.is_none() {
            return Err(CustomError::RoomNotReady);
        }
        Ok(None)
    }

    pub fn mark_started(&mut self, game_id: Uuid) {
        self.game_id = Some(game_id);
        self.status = RoomStatus::InGame;
    }

    pub fn check_delete(&self, username: &str) -> Result<(), CustomError> {
        if self.host_username != username {
            return Err(CustomError::NotHost);
        }
        if self.status == RoomStatus::InGame {
            return Err(CustomError::RoomInGame);
        }
        Ok(())
    }

    pub fn view(&self, username: &str, now: DateTime<Utc>) -> Result<RoomView, CustomError> {
        if !self.is_participant(username) {
            return Err(CustomError::NotParticipant);
        }
        Ok(RoomView {
            token: self.token,
            status: self.effective_status(now),
            host_username: self.host_username.clone(),
            guest_username: self.guest_username.clone(),
            is_host: self.host_username == username,
            created_at: self.created_at,
            expires_at: self.expires_at,
            expired: self.is_expired(now),
            game_id: self.game_id,
        })
    }

    /// Moves a lapsed lobby to Expired. Returns true if it changed.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        let due = matches!(self.status, RoomStatus::Waiting | RoomStatus::Ready) && now > self.expires_at;
        if due {
            self.status = RoomStatus::Expired;
        }
        due
    }

    /// Safe to forget: expired for longer than `ttl`, or its game is no longer in `live_games`.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration, live_games: &HashSet<Uuid>) -> bool {
        match self.status {
            RoomStatus::Expired => now > self.expires_at + ttl,
            RoomStatus::InGame => self.game_id.map_or(true, |id| !live_games.contains(&id)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> (Room, DateTime<Utc>) {
        let now = Utc::now();
        (Room::new("alice", Duration::minutes(30), now), now)
    }

    #[test]
    fn guest_joins_once() {
        let (mut room, now) = room();
        assert_eq!(room.join("alice", now), Err(CustomError::CannotJoinOwnRoom));
        assert_eq!(room.join("bob", now), Ok(true));
        assert_eq!(room.status, RoomStatus::Ready);
        assert_eq!(room.join("bob", now), Ok(false));
        assert_eq!(room.join("carol", now), Err(CustomError::RoomFull));
    }

    #[test]
    fn expiry_blocks_join_and_start() {
        let (mut room, now) = room();
        let later = now + Duration::minutes(31);
        assert_eq!(room.effective_status(later), RoomStatus::Expired);
        assert_eq!(room.join("bob", later), Err(CustomError::RoomExpired));

        room.join("bob", now).unwrap();
        assert_eq!(room.check_start("alice", later), Err(CustomError::RoomExpired));
        assert!(room.expire_if_due(later));
        let none = HashSet::new();
        assert!(!room.is_stale(later, Duration::minutes(30), &none));
        assert!(room.is_stale(later + Duration::minutes(31), Duration::minutes(30), &none));
    }

    #[test]
    fn start_is_host_only_and_needs_a_guest() {
        let (mut room, now) = room();
        assert_eq!(room.check_start("alice", now), Err(CustomError::RoomNotReady));
        room.join("bob", now).unwrap();
        assert_eq!(room.check_start("bob", now), Err(CustomError::NotHost));
        assert_eq!(room.check_start("alice", now), Ok(None));

        let game_id = Uuid::new_v4();
        room.mark_started(game_id);
        assert_eq!(room.check_start("alice", now), Ok(Some(game_id)));
        assert_eq!(room.check_delete("alice"), Err(CustomError::RoomInGame));
        // a started room stays usable after its lobby deadline
        assert!(!room.is_expired(now + Duration::days(1)));
    }

    #[test]
    fn started_room_lives_as_long_as_its_game() {
        let (mut room, now) = room();
        room.join("bob", now).unwrap();
        let game_id = Uuid::new_v4();
        room.mark_started(game_id);

        let later = now + Duration::days(365);
        let live = HashSet::from([game_id]);
        assert!(!room.is_stale(later, Duration::minutes(30), &live));
        assert!(room.is_stale(now, Duration::minutes(30), &HashSet::new()));
    }

    #[test]
    fn view_is_for_participants_only() {
        let (mut room, now) = room();
        assert_eq!(room.view("bob", now).unwrap_err(), CustomError::NotParticipant);
        room.join("bob", now).unwrap();
        let view = room.view("bob", now).unwrap();
        assert!(!view.is_host);
        assert_eq!(view.guest_username.as_deref(), Some("bob"));
        assert_eq!(view.status, RoomStatus::Ready);
    }
}
