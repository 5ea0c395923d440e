use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{TurnRule, BOARD_SIZE, BOT_NAME};
use crate::engine::bot::BotEngine;
use crate::engine::placement::{auto_place, Layout};
use crate::errors::CustomError;
use crate::models::board::{Board, Coord, ShotOutcome};

/// A side of the table. In bot games the bot is always the guest.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Turn {
    Host,
    Guest,
}

impl Turn {
    pub fn other(self) -> Turn {
        match self {
            Turn::Host => Turn::Guest,
            Turn::Guest => Turn::Host,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Turn::Host => "HOST",
            Turn::Guest => "GUEST",
        }
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameKind {
    Bot,
    Online,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Setup,
    AwaitingHostReady,
    AwaitingGuestReady,
    InProgress,
    Finished,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameResult {
    HostWin,
    GuestWin,
    Surrender,
}

impl GameResult {
    pub fn as_str(self) -> &'static str {
        match self {
            GameResult::HostWin => "HOST_WIN",
            GameResult::GuestWin => "GUEST_WIN",
            GameResult::Surrender => "SURRENDER",
        }
    }

    fn win_for(side: Turn) -> GameResult {
        match side {
            Turn::Host => GameResult::HostWin,
            Turn::Guest => GameResult::GuestWin,
        }
    }
}

// One shot fired by the bot during a human's attack
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct BotShot {
    pub x: usize,
    pub y: usize,
    pub hit: bool,
    pub sunk: bool,
}

// Returned after an attack or a bot move, from the point of view of one player
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttackResult {
    pub player_board: Vec<Vec<u8>>,
    pub enemy_board: Vec<Vec<u8>>,
    pub hit: bool,
    pub sunk: bool,
    pub already: bool,
    pub bot_x: Option<usize>,
    pub bot_y: Option<usize>,
    pub bot_hit: Option<bool>,
    pub bot_sunk: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bot_shots: Vec<BotShot>,
    pub game_finished: bool,
    pub winner: Option<GameResult>,
    pub current_turn: Option<Turn>,
}

// Response of GET /games/{id}/boards
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BoardsView {
    pub player_board: Vec<Vec<u8>>,
    pub enemy_board: Vec<Vec<u8>>,
    pub current_turn: &'static str,
    pub game_finished: bool,
    pub winner: &'static str,
    pub opponent_name: String,
    pub is_bot_game: bool,
    pub is_host: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadyState {
    pub host_ready: bool,
    pub guest_ready: bool,
    pub both_ready: bool,
    pub game_started: bool,
}

/// Summary of a finished game, used for ratings and history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinishedGame {
    pub game_id: Uuid,
    pub host: String,
    pub guest: Option<String>,
    pub victor: Turn,
    pub surrendered: bool,
}

impl FinishedGame {
    pub fn player(&self, side: Turn) -> Option<&str> {
        match side {
            Turn::Host => Some(self.host.as_str()),
            Turn::Guest => self.guest.as_deref(),
        }
    }
}

#[derive(Debug)]
pub struct Game {
    pub id: Uuid,
    pub kind: GameKind,
    pub host: String,
    pub guest: Option<String>,
    host_board: Board,
    guest_board: Board,
    pub status: GameStatus,
    pub current_turn: Option<Turn>,
    pub winner: Option<GameResult>,
    pub surrendered_by: Option<Turn>,
    pub host_ready: bool,
    pub guest_ready: bool,
    pub room_token: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    bot: Option<BotEngine>,
    turn_rule: TurnRule,
}

impl Game {
    fn blank(kind: GameKind, host: String, guest: Option<String>, turn_rule: TurnRule) -> Self {
        let now = Utc::now();
        Game {
            id: Uuid::new_v4(),
            kind,
            host,
            guest,
            host_board: Board::new(),
            guest_board: Board::new(),
            status: GameStatus::Setup,
            current_turn: None,
            winner: None,
            surrendered_by: None,
            host_ready: false,
            guest_ready: false,
            room_token: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            last_activity: now,
            bot: None,
            turn_rule,
        }
    }

    /// New game against the bot. The bot's fleet is placed right away.
    pub fn new_bot<R: Rng + ?Sized>(host: &str, turn_rule: TurnRule, rng: &mut R) -> Result<Self, CustomError> {
        Game::with_bot_fleet(host, turn_rule, &auto_place(rng)?)
    }

    fn with_bot_fleet(host: &str, turn_rule: TurnRule, fleet: &Layout) -> Result<Self, CustomError> {
        let mut game = Game::blank(GameKind::Bot, host.to_string(), None, turn_rule);
        game.guest_board.place_ships(fleet)?;
        game.guest_ready = true;
        game.bot = Some(BotEngine::new());
        Ok(game)
    }

    pub fn new_online(host: &str, guest: &str, room_token: Option<Uuid>, turn_rule: TurnRule) -> Self {
        let mut game = Game::blank(GameKind::Online, host.to_string(), Some(guest.to_string()), turn_rule);
        game.room_token = room_token;
        game
    }

    pub fn is_bot_game(&self) -> bool {
        self.kind == GameKind::Bot
    }

    pub fn is_finished(&self) -> bool {
        self.status == GameStatus::Finished
    }

    pub fn role_of(&self, username: &str) -> Result<Turn, CustomError> {
        if self.host == username {
            Ok(Turn::Host)
        } else if self.guest.as_deref() == Some(username) {
            Ok(Turn::Guest)
        } else {
            Err(CustomError::NotParticipant)
        }
    }

    pub fn board(&self, side: Turn) -> &Board {
        match side {
            Turn::Host => &self.host_board,
            Turn::Guest => &self.guest_board,
        }
    }

    fn board_mut(&mut self, side: Turn) -> &mut Board {
        match side {
            Turn::Host => &mut self.host_board,
            Turn::Guest => &mut self.guest_board,
        }
    }

    fn ensure_not_finished(&self) -> Result<(), CustomError> {
        if self.is_finished() {
            Err(CustomError::GameAlreadyFinished)
        } else {
            Ok(())
        }
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// True once nobody has played in this game for longer than `idle`.
    pub fn is_idle(&self, now: DateTime<Utc>, idle: Duration) -> bool {
        now - self.last_activity > idle
    }

    fn start(&mut self) {
        self.status = GameStatus::InProgress;
        self.current_turn = Some(Turn::Host);
        self.started_at = Some(Utc::now());
    }

    fn finish(&mut self, result: GameResult) {
        self.status = GameStatus::Finished;
        self.winner = Some(result);
        self.current_turn = None;
        self.finished_at = Some(Utc::now());
        self.touch();
    }

    /// Installs a validated layout for `side`. Placing the human fleet starts a bot game.
    pub fn place_ships(&mut self, side: Turn, layout: &Layout) -> Result<(), CustomError> {
        self.ensure_not_finished()?;
        if self.status == GameStatus::InProgress {
            return Err(CustomError::PlacementLocked);
        }
        self.board_mut(side).place_ships(layout)?;
        self.touch();
        if self.is_bot_game() && side == Turn::Host {
            self.host_ready = true;
            self.start();
        }
        Ok(())
    }

    pub fn ready(&mut self, side: Turn) -> Result<ReadyState, CustomError> {
        self.ensure_not_finished()?;
        self.touch();
        if self.status != GameStatus::InProgress {
            if !self.board(side).is_placed() {
                return Err(CustomError::BoardNotPlaced);
            }
            match side {
                Turn::Host => self.host_ready = true,
                Turn::Guest => self.guest_ready = true,
            }
            if self.host_ready && self.guest_ready {
                self.start();
            } else if self.host_ready {
                self.status = GameStatus::AwaitingGuestReady;
            } else {
                self.status = GameStatus::AwaitingHostReady;
            }
        }
        Ok(self.ready_state())
    }

    pub fn ready_state(&self) -> ReadyState {
        ReadyState {
            host_ready: self.host_ready,
            guest_ready: self.guest_ready,
            both_ready: self.host_ready && self.guest_ready,
            game_started: matches!(self.status, GameStatus::InProgress | GameStatus::Finished),
        }
    }

    /// Fails unless `side` may shoot right now.
    pub fn ensure_turn(&self, side: Turn) -> Result<(), CustomError> {
        self.ensure_not_finished()?;
        if self.status != GameStatus::InProgress {
            return Err(CustomError::GameNotStarted);
        }
        if self.current_turn != Some(side) {
            return Err(CustomError::NotYourTurn);
        }
        Ok(())
    }

    /// One shot by `attacker` at the opposing board.
    pub fn fire(&mut self, attacker: Turn, at: Coord) -> Result<ShotOutcome, CustomError> {
        self.ensure_turn(attacker)?;

        let defender = attacker.other();
        let outcome = self.board_mut(defender).apply_shot(at)?;
        self.touch();
        if outcome.already {
            return Ok(outcome);
        }

        if self.board(defender).is_fleet_destroyed() {
            self.finish(GameResult::win_for(attacker));
        } else {
            self.current_turn = match (self.turn_rule, outcome.hit) {
                (TurnRule::HitKeepsTurn, true) => Some(attacker),
                _ => Some(defender),
            };
        }
        Ok(outcome)
    }

    /// A human shot. In bot games the bot answers for as long as it holds the turn.
    pub fn attack<R: Rng + ?Sized>(
        &mut self,
        attacker: Turn,
        at: Coord,
        rng: &mut R,
    ) -> Result<(ShotOutcome, Vec<BotShot>), CustomError> {
        let outcome = self.fire(attacker, at)?;
        let mut bot_shots = Vec::new();
        if self.is_bot_game() && !outcome.already {
            while self.status == GameStatus::InProgress
                && self.current_turn == Some(Turn::Guest)
                && bot_shots.len() < BOARD_SIZE * BOARD_SIZE
            {
                match self.bot_fire(rng)? {
                    Some(shot) => bot_shots.push(shot),
                    None => break,
                }
            }
        }
        Ok((outcome, bot_shots))
    }

    /// Exactly one bot shot, only when the bot holds the turn.
    pub fn bot_move<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<BotShot, CustomError> {
        self.ensure_not_finished()?;
        if !self.is_bot_game() {
            return Err(CustomError::BadRequest);
        }
        self.ensure_turn(Turn::Guest)?;
        self.bot_fire(rng)?.ok_or(CustomError::InternalServerError)
    }

    fn bot_fire<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Option<BotShot>, CustomError> {
        let mut bot = match self.bot.take() {
            Some(bot) => bot,
            None => return Ok(None),
        };
        let result = match bot.select(&self.host_board, rng) {
            Some(at) => self.fire(Turn::Guest, at).map(|outcome| {
                bot.observe(&self.host_board, at, &outcome);
                Some(BotShot {
                    x: at.x,
                    y: at.y,
                    hit: outcome.hit,
                    sunk: outcome.sunk,
                })
            }),
            None => Ok(None),
        };
        self.bot = Some(bot);
        result
    }

    pub fn surrender(&mut self, side: Turn) -> Result<(), CustomError> {
        self.ensure_not_finished()?;
        self.surrendered_by = Some(side);
        self.finish(GameResult::Surrender);
        Ok(())
    }

    /// The side credited with the win, once the game is over.
    pub fn victor(&self) -> Option<Turn> {
        match self.winner? {
            GameResult::HostWin => Some(Turn::Host),
            GameResult::GuestWin => Some(Turn::Guest),
            GameResult::Surrender => self.surrendered_by.map(Turn::other),
        }
    }

    pub fn finished_game(&self) -> Option<FinishedGame> {
        Some(FinishedGame {
            game_id: self.id,
            host: self.host.clone(),
            guest: self.guest.clone(),
            victor: self.victor()?,
            surrendered: self.winner == Some(GameResult::Surrender),
        })
    }

    pub fn attack_result(&self, side: Turn, outcome: Option<&ShotOutcome>, bot_shots: &[BotShot]) -> AttackResult {
        let shot = outcome.copied().unwrap_or_default();
        let last = bot_shots.last();
        AttackResult {
            player_board: self.board(side).to_grid(true),
            enemy_board: self.board(side.other()).to_grid(false),
            hit: shot.hit,
            sunk: shot.sunk,
            already: shot.already,
            bot_x: last.map(|s| s.x),
            bot_y: last.map(|s| s.y),
            bot_hit: last.map(|s| s.hit),
            bot_sunk: last.map(|s| s.sunk),
            bot_shots: bot_shots.to_vec(),
            game_finished: self.is_finished(),
            winner: self.winner,
            current_turn: self.current_turn,
        }
    }

    pub fn boards_view(&self, side: Turn) -> BoardsView {
        let opponent_name = match (self.kind, side) {
            (GameKind::Bot, _) => BOT_NAME.to_string(),
            (GameKind::Online, Turn::Host) => self
                .guest
                .clone()
                .unwrap_or_else(|| "Waiting for opponent...".to_string()),
            (GameKind::Online, Turn::Guest) => self.host.clone(),
        };
        BoardsView {
            player_board: self.board(side).to_grid(true),
            enemy_board: self.board(side.other()).to_grid(false),
            current_turn: self.current_turn.map_or("NONE", Turn::as_str),
            game_finished: self.is_finished(),
            winner: self.winner.map_or("NONE", GameResult::as_str),
            opponent_name,
            is_bot_game: self.is_bot_game(),
            is_host: side == Turn::Host,
        }
    }
}
