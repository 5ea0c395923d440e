//! In-memory registry of running games.
//!
//! Every game sits behind its own mutex. Each operation holds that lock for its whole
//! duration, bot replies included, and publishes events only after releasing it.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::TurnRule;
use crate::engine::placement::{self, ShipSpec};
use crate::errors::CustomError;
use crate::models::board::{Coord, Ship, ShotOutcome};
use crate::models::game::{AttackResult, BoardsView, FinishedGame, Game, ReadyState, Turn};
use crate::services::broadcast::{Broadcaster, Event, Topic};

// Body of POST /games/{id}/place-ships
#[derive(Deserialize, Debug)]
pub struct PlaceShipsRequest {
    pub size: Option<usize>,
    pub cells: Option<Vec<Vec<u8>>>,
    pub ships: Vec<ShipSpec>,
}

#[derive(Serialize, Debug)]
pub struct AutoPlaceResponse {
    pub message: String,
    pub grid: Vec<Vec<u8>>,
    pub ships: Vec<Ship>,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnfinishedGame {
    pub game_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// Snapshot of what to publish once the game lock is gone
struct Outbox {
    game_id: Uuid,
    per_user: Vec<(String, Event)>,
    finished: Option<Event>,
}

impl Outbox {
    // Only the shooter's own view carries the shot outcome.
    fn new(game: &Game, shot: Option<(Turn, &ShotOutcome)>, finished: bool) -> Self {
        let per_user = [Turn::Host, Turn::Guest]
            .into_iter()
            .filter_map(|side| {
                let username = match side {
                    Turn::Host => Some(game.host.clone()),
                    Turn::Guest => game.guest.clone(),
                }?;
                let own = shot.and_then(|(shooter, outcome)| (shooter == side).then_some(outcome));
                let state = game.attack_result(side, own, &[]);
                Some((username, Event::GameStateUpdate { game_id: game.id, state }))
            })
            .collect();
        let finished = finished.then(|| Event::GameFinished {
            game_id: game.id,
            winner: game.winner,
            game_finished: true,
        });
        Outbox {
            game_id: game.id,
            per_user,
            finished,
        }
    }

    fn send(self, broadcaster: &Broadcaster) {
        let topic = Topic::Game(self.game_id);
        for (username, event) in &self.per_user {
            broadcaster.send_to_user(topic, username, event);
        }
        if let Some(event) = &self.finished {
            broadcaster.publish(topic, event);
        }
    }
}

pub struct GameService {
    games: RwLock<HashMap<Uuid, Arc<Mutex<Game>>>>,
    broadcaster: Arc<Broadcaster>,
    turn_rule: TurnRule,
}

impl GameService {
    pub fn new(broadcaster: Arc<Broadcaster>, turn_rule: TurnRule) -> Self {
        GameService {
            games: RwLock::new(HashMap::new()),
            broadcaster,
            turn_rule,
        }
    }

    async fn insert(&self, game: Game) -> Uuid {
        let id = game.id;
        self.games.write().await.insert(id, Arc::new(Mutex::new(game)));
        id
    }

    async fn get(&self, id: Uuid) -> Result<Arc<Mutex<Game>>, CustomError> {
        self.games
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(CustomError::GameNotFound)
    }

    async fn snapshot(&self) -> Vec<Arc<Mutex<Game>>> {
        self.games.read().await.values().cloned().collect()
    }

    pub async fn create_bot_game(&self, username: &str) -> Result<Uuid, CustomError> {
        let game = Game::new_bot(username, self.turn_rule, &mut rand::thread_rng())?;
        let id = self.insert(game).await;
        info!("Bot game {} created for {}", id, username);
        Ok(id)
    }

    pub async fn unfinished_bot_games(&self, username: &str) -> Vec<UnfinishedGame> {
        let mut unfinished = Vec::new();
        for game in self.snapshot().await {
            let game = game.lock().await;
            if game.is_bot_game() && !game.is_finished() && game.host == username {
                unfinished.push(UnfinishedGame {
                    game_id: game.id,
                    created_at: game.created_at,
                });
            }
        }
        unfinished.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        unfinished
    }

    pub async fn create_online_game(&self, host: &str, guest: &str, room_token: Uuid) -> Uuid {
        let game = Game::new_online(host, guest, Some(room_token), self.turn_rule);
        let id = self.insert(game).await;
        info!("Online game {} created for {} and {}", id, host, guest);
        id
    }

    pub async fn auto_place(&self, id: Uuid, username: &str) -> Result<AutoPlaceResponse, CustomError> {
        let game = self.get(id).await?;
        let mut game = game.lock().await;
        let side = game.role_of(username)?;
        let layout = placement::auto_place(&mut rand::thread_rng())?;
        game.place_ships(side, &layout)?;
        debug!("Auto placed fleet for {} in game {}", username, id);
        Ok(AutoPlaceResponse {
            message: "Ships placed automatically".to_string(),
            grid: layout.grid,
            ships: layout.ships,
        })
    }

    pub async fn place_ships(&self, id: Uuid, username: &str, request: &PlaceShipsRequest) -> Result<(), CustomError> {
        let game = self.get(id).await?;
        let mut game = game.lock().await;
        let side = game.role_of(username)?;
        let layout = placement::validate(&request.ships, request.size, request.cells.as_deref())
            .map_err(CustomError::InvalidPlacement)?;
        game.place_ships(side, &layout)
    }

    pub async fn ready(&self, id: Uuid, username: &str) -> Result<ReadyState, CustomError> {
        let game = self.get(id).await?;
        let (state, event) = {
            let mut game = game.lock().await;
            let side = game.role_of(username)?;
            let state = game.ready(side)?;
            let event = Event::PlayerReady {
                game_id: id,
                is_host: side == Turn::Host,
                host_ready: state.host_ready,
                guest_ready: state.guest_ready,
                both_ready: state.both_ready,
                game_started: state.game_started,
                current_turn: game.current_turn,
            };
            (state, event)
        };
        self.broadcaster.publish(Topic::Game(id), &event);
        Ok(state)
    }

    pub async fn board(&self, id: Uuid, username: &str) -> Result<Vec<Vec<u8>>, CustomError> {
        let game = self.get(id).await?;
        let game = game.lock().await;
        let side = game.role_of(username)?;
        Ok(game.board(side).to_grid(true))
    }

    pub async fn boards(&self, id: Uuid, username: &str) -> Result<BoardsView, CustomError> {
        let game = self.get(id).await?;
        let game = game.lock().await;
        let side = game.role_of(username)?;
        Ok(game.boards_view(side))
    }

    pub async fn is_participant(&self, id: Uuid, username: &str) -> Result<(), CustomError> {
        let game = self.get(id).await?;
        let game = game.lock().await;
        game.role_of(username).map(|_| ())
    }

    /// A player's shot, followed by the bot's answer in bot games.
    pub async fn attack(&self, id: Uuid, username: &str, x: i64, y: i64) -> Result<(AttackResult, Option<FinishedGame>), CustomError> {
        let game = self.get(id).await?;
        let (result, finished, outbox) = {
            let mut game = game.lock().await;
            let side = game.role_of(username)?;
            game.ensure_turn(side)?;
            let at = Coord::checked(x, y)?;

            let (outcome, bot_shots) = game.attack(side, at, &mut rand::thread_rng())?;
            for shot in &bot_shots {
                debug!("Bot fired at ({}, {}) in game {}: hit={} sunk={}", shot.x, shot.y, id, shot.hit, shot.sunk);
            }

            let finished = if outcome.already { None } else { game.finished_game() };
            let result = game.attack_result(side, Some(&outcome), &bot_shots);
            let outbox = Outbox::new(&game, Some((side, &outcome)), finished.is_some());
            (result, finished, outbox)
        };
        if let Some(finished) = &finished {
            info!("Game {} finished, victor {:?}", id, finished.victor);
        }
        outbox.send(&self.broadcaster);
        Ok((result, finished))
    }

    /// Exactly one bot shot, when the bot holds the turn.
    pub async fn bot_move(&self, id: Uuid, username: &str) -> Result<(AttackResult, Option<FinishedGame>), CustomError> {
        let game = self.get(id).await?;
        let (result, finished, outbox) = {
            let mut game = game.lock().await;
            let side = game.role_of(username)?;
            let shot = game.bot_move(&mut rand::thread_rng())?;
            let finished = game.finished_game();
            let result = game.attack_result(side, None, &[shot]);
            let outbox = Outbox::new(&game, None, finished.is_some());
            (result, finished, outbox)
        };
        outbox.send(&self.broadcaster);
        Ok((result, finished))
    }

    pub async fn surrender(&self, id: Uuid, username: &str) -> Result<FinishedGame, CustomError> {
        let game = self.get(id).await?;
        let (finished, outbox) = {
            let mut game = game.lock().await;
            let side = game.role_of(username)?;
            game.surrender(side)?;
            let finished = game.finished_game().ok_or(CustomError::InternalServerError)?;
            (finished, Outbox::new(&game, None, true))
        };
        info!("{} surrendered game {}", username, id);
        outbox.send(&self.broadcaster);
        Ok(finished)
    }

    /// Fresh bot game for the player of a finished one.
    pub async fn rematch(&self, id: Uuid, username: &str) -> Result<Uuid, CustomError> {
        {
            let game = self.get(id).await?;
            let game = game.lock().await;
            game.role_of(username)?;
            if !game.is_bot_game() || !game.is_finished() {
                return Err(CustomError::BadRequest);
            }
        }
        self.create_bot_game(username).await
    }

    /// Ids of every game still held in memory.
    pub async fn ids(&self) -> HashSet<Uuid> {
        self.games.read().await.keys().copied().collect()
    }

    /// Forgets games that finished more than `retention` ago and unfinished ones
    /// nobody touched for longer than `idle`.
    pub async fn sweep(&self, now: DateTime<Utc>, retention: Duration, idle: Duration) -> usize {
        let mut stale = Vec::new();
        for game in self.snapshot().await {
            let game = game.lock().await;
            let expired = match game.finished_at {
                Some(at) => now - at > retention,
                None => game.is_idle(now, idle),
            };
            if expired {
                debug!("Dropping game {} (finished: {})", game.id, game.is_finished());
                stale.push(game.id);
            }
        }
        if !stale.is_empty() {
            let mut games = self.games.write().await;
            for id in &stale {
                games.remove(id);
            }
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::placement::classic_specs;
    use crate::models::game::GameStatus;
    use tokio::sync::mpsc::unbounded_channel;

    fn service(rule: TurnRule) -> GameService {
        GameService::new(Arc::new(Broadcaster::new()), rule)
    }

    fn classic_request() -> PlaceShipsRequest {
        PlaceShipsRequest {
            size: Some(10),
            cells: None,
            ships: classic_specs(),
        }
    }

    async fn started_online(service: &GameService) -> Uuid {
        let id = service.create_online_game("alice", "bob", Uuid::new_v4()).await;
        for user in ["alice", "bob"] {
            service.place_ships(id, user, &classic_request()).await.unwrap();
            service.ready(id, user).await.unwrap();
        }
        id
    }

    #[tokio::test]
    async fn bot_game_lifecycle() {
        let service = service(TurnRule::AlwaysFlip);
        let id = service.create_bot_game("alice").await.unwrap();
        assert_eq!(service.unfinished_bot_games("alice").await.len(), 1);
        assert!(service.unfinished_bot_games("bob").await.is_empty());

        let placed = service.auto_place(id, "alice").await.unwrap();
        assert_eq!(placed.ships.len(), 10);

        let (result, finished) = service.attack(id, "alice", 0, 0).await.unwrap();
        assert!(finished.is_none());
        assert!(result.bot_x.is_some());
        assert_eq!(result.current_turn, Some(Turn::Host));

        let finished = service.surrender(id, "alice").await.unwrap();
        assert_eq!(finished.victor, Turn::Guest);
        assert!(finished.guest.is_none());
        assert!(service.unfinished_bot_games("alice").await.is_empty());

        let again = service.rematch(id, "alice").await.unwrap();
        assert_ne!(again, id);
    }

    #[tokio::test]
    async fn invalid_placement_reports_details() {
        let service = service(TurnRule::AlwaysFlip);
        let id = service.create_online_game("alice", "bob", Uuid::new_v4()).await;
        let mut request = classic_request();
        request.ships.pop();

        match service.place_ships(id, "alice", &request).await {
            Err(CustomError::InvalidPlacement(details)) => assert!(!details.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            service.place_ships(id, "mallory", &classic_request()).await,
            Err(CustomError::NotParticipant)
        );
    }

    #[tokio::test]
    async fn turn_is_checked_before_coordinates() {
        let service = service(TurnRule::AlwaysFlip);
        let id = started_online(&service).await;
        assert_eq!(service.attack(id, "bob", 42, 0).await.unwrap_err(), CustomError::NotYourTurn);
        assert_eq!(service.attack(id, "alice", 42, 0).await.unwrap_err(), CustomError::OutOfBounds);
    }

    #[tokio::test]
    async fn attack_sends_each_player_their_own_view() {
        let service = service(TurnRule::AlwaysFlip);
        let id = started_online(&service).await;
        let topic = Topic::Game(id);
        let (alice_tx, mut alice_rx) = unbounded_channel();
        let (bob_tx, mut bob_rx) = unbounded_channel();
        service.broadcaster.subscribe(topic, 1, Some("alice".to_string()), alice_tx);
        service.broadcaster.subscribe(topic, 2, Some("bob".to_string()), bob_tx);

        let (result, _) = service.attack(id, "alice", 0, 0).await.unwrap();
        assert!(result.hit);

        match alice_rx.try_recv().unwrap() {
            Event::GameStateUpdate { state, .. } => {
                assert_eq!(state.enemy_board[0][0], 3);
                assert!(state.hit);
            }
            other => panic!("unexpected {:?}", other),
        }
        match bob_rx.try_recv().unwrap() {
            Event::GameStateUpdate { state, .. } => {
                assert_eq!(state.player_board[0][0], 3);
                assert_eq!(state.current_turn, Some(Turn::Guest));
                assert!(!state.hit && !state.sunk && !state.already);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn simultaneous_attacks_accept_only_one() {
        let service = Arc::new(service(TurnRule::AlwaysFlip));
        let id = started_online(&service).await;

        let (a, b) = tokio::join!(service.attack(id, "alice", 9, 9), service.attack(id, "alice", 9, 8));
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let game = service.get(id).await.unwrap();
        assert_eq!(game.lock().await.current_turn, Some(Turn::Guest));
    }

    #[tokio::test]
    async fn ready_is_broadcast_to_the_game() {
        let service = service(TurnRule::AlwaysFlip);
        let id = service.create_online_game("alice", "bob", Uuid::new_v4()).await;
        let (tx, mut rx) = unbounded_channel();
        service.broadcaster.subscribe(Topic::Game(id), 1, Some("bob".to_string()), tx);

        service.place_ships(id, "alice", &classic_request()).await.unwrap();
        let state = service.ready(id, "alice").await.unwrap();
        assert!(!state.both_ready);
        match rx.try_recv().unwrap() {
            Event::PlayerReady { is_host, host_ready, game_started, .. } => {
                assert!(is_host && host_ready && !game_started)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn sweep_drops_only_old_finished_games() {
        let service = service(TurnRule::AlwaysFlip);
        let done = started_online(&service).await;
        let running = started_online(&service).await;
        service.surrender(done, "bob").await.unwrap();

        let retention = Duration::minutes(120);
        let idle = Duration::minutes(240);
        assert_eq!(service.sweep(Utc::now(), retention, idle).await, 0);
        assert_eq!(service.sweep(Utc::now() + Duration::minutes(121), retention, idle).await, 1);
        assert_eq!(service.get(done).await.unwrap_err(), CustomError::GameNotFound);
        let running = service.get(running).await.unwrap();
        assert_eq!(running.lock().await.status, GameStatus::InProgress);
    }

    #[tokio::test]
    async fn sweep_drops_abandoned_games() {
        let service = service(TurnRule::AlwaysFlip);
        let abandoned = service.create_bot_game("alice").await.unwrap();
        let retention = Duration::minutes(120);
        let idle = Duration::minutes(240);

        assert_eq!(service.sweep(Utc::now() + Duration::minutes(200), retention, idle).await, 0);
        assert_eq!(service.sweep(Utc::now() + Duration::minutes(241), retention, idle).await, 1);
        assert!(!service.ids().await.contains(&abandoned));
        assert!(service.unfinished_bot_games("alice").await.is_empty());
    }

    #[tokio::test]
    async fn attacks_after_surrender_are_rejected() {
        let service = service(TurnRule::AlwaysFlip);
        let id = started_online(&service).await;
        service.attack(id, "alice", 9, 9).await.unwrap();
        service.surrender(id, "alice").await.unwrap();

        assert_eq!(service.attack(id, "bob", 9, 9).await.unwrap_err(), CustomError::GameAlreadyFinished);
        assert_eq!(service.attack(id, "alice", 9, 9).await.unwrap_err(), CustomError::GameAlreadyFinished);
        assert_eq!(service.surrender(id, "bob").await.unwrap_err(), CustomError::GameAlreadyFinished);
    }
}
