use anyhow::Context;
use axum::{
    error_handling::HandleErrorLayer,
    extract::Extension,
    headers::{authorization::Bearer, Authorization},
    http::StatusCode,
    routing::{get, post},
    BoxError, Router,
};
use axum_macros::FromRef;
use chrono::Utc;
use jsonwebtoken::{decode, DecodingKey, Validation};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use simplelog::SimpleLogger;
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use tower::ServiceBuilder;

mod config;
mod controllers;
mod engine;
mod errors;
mod models;
mod retry;
mod services;

use crate::config::Config;
use crate::errors::CustomError;
use crate::retry::{with_retry, RetryPolicy};
use crate::services::{broadcast::Broadcaster, games::GameService, rooms::RoomService};

// The claims struct used for creating a Bearer token
#[derive(Deserialize, Serialize, Debug)]
struct Claims {
    sub: String,
    iat: usize,
    exp: usize,
}

// Shared state, the services are internally synchronised
#[derive(Clone, FromRef)]
pub struct AppState {
    pub config: Arc<Config>,
    pub games: Arc<GameService>,
    pub rooms: Arc<RoomService>,
    pub broadcaster: Arc<Broadcaster>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;

    // set up tracing facility
    let _ = SimpleLogger::init(config.log_level, simplelog::Config::default());
    info!("Starting..");
    debug!("database_url: {:?}", config.database_url);

    let policy = RetryPolicy::new(config.db_connect_attempts, config.db_connect_delay);
    let pool = with_retry(policy, "Connecting to the database", || {
        MySqlPoolOptions::new()
            .acquire_timeout(config.request_timeout)
            .connect(&config.database_url)
    })
    .await
    .context("Database is not reachable")?;

    let broadcaster = Arc::new(Broadcaster::new());
    let state = AppState {
        games: Arc::new(GameService::new(Arc::clone(&broadcaster), config.turn_rule)),
        rooms: Arc::new(RoomService::new(Arc::clone(&broadcaster), config.room_ttl, &config.public_url)),
        broadcaster,
        config: Arc::new(config),
    };

    spawn_sweeper(state.clone());

    // Define routes
    let app = Router::new()
        .route("/login", get(controllers::user::login))
        .route("/signup", post(controllers::user::signup))
        .route("/users/profile", get(controllers::user::profile))
        .route("/users/top", get(controllers::user::top))
        .route("/bot/create", post(controllers::bot::create))
        .route("/bot/unfinished", get(controllers::bot::unfinished))
        .route("/bot/:game_id/place/auto", post(controllers::bot::auto_place))
        .route("/bot/:game_id/surrender", post(controllers::bot::surrender))
        .route("/bot/:game_id/rematch", post(controllers::bot::rematch))
        .route("/games/online/create", post(controllers::game::create_online))
        .route("/games/:game_id/place-ships", post(controllers::game::place_ships))
        .route("/games/:game_id/ready", post(controllers::game::ready))
        .route("/games/:game_id/board", get(controllers::game::board))
        .route("/games/:game_id/boards", get(controllers::game::boards))
        .route("/games/:game_id/attack", post(controllers::game::attack))
        .route("/games/:game_id/bot-move", post(controllers::game::bot_move))
        .route("/games/:game_id/surrender", post(controllers::game::surrender))
        .route("/rooms/create", post(controllers::room::create))
        .route("/rooms/join/:token", post(controllers::room::join))
        .route("/rooms/start/:token", post(controllers::room::start))
        .route("/rooms/:token", get(controllers::room::get_room).delete(controllers::room::delete_room))
        .route("/ws/game", get(controllers::ws::game_socket))
        .route("/ws/room", get(controllers::ws::room_socket))
        .with_state(state.clone())
        .layer(Extension(pool))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .timeout(state.config.request_timeout),
        );

    // Start the server
    let addr = state.config.listen_addr;
    debug!("Listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

async fn handle_timeout_error(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "Request took too long".to_string())
    } else {
        error!("Unhandled internal error: {}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Unhandled internal error: {}", err))
    }
}

// Expires rooms and forgets old games in the background
fn spawn_sweeper(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.sweep_interval);
        loop {
            interval.tick().await;
            let now = Utc::now();
            let games = state
                .games
                .sweep(now, state.config.game_retention, state.config.game_idle)
                .await;
            let (expired, removed) = state.rooms.sweep(now, &state.games.ids().await).await;
            if expired + removed + games > 0 {
                info!("Sweep: {} rooms expired, {} rooms and {} games dropped", expired, removed, games);
            }
        }
    });
}

// Decodes a JWT and returns the user name (sub field)
fn decode_token(config: &Config, token: &str) -> Result<String, CustomError> {
    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(token_data) => Ok(token_data.claims.sub),
        Err(err) => {
            error!("Invalid token: {:?}", err.kind());
            Err(CustomError::InvalidToken)
        }
    }
}

// Helper function to check if a bearer token is valid (user is logged in).
// It's here because basically every controller function needs it.
async fn check_access(config: &Config, bearer: &Authorization<Bearer>) -> Result<String, CustomError> {
    decode_token(config, bearer.token())
}
