use axum::{
    extract::{Path, Query, State, TypedHeader},
    headers::{authorization::Bearer, Authorization},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::errors::{logged, CustomError};
use crate::services::{games::PlaceShipsRequest, history};
use crate::{check_access, AppState};

// The struct used to answer a newly created game
#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GameCreated {
    pub game_id: Uuid,
    pub message: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OnlineGameQuery {
    room_token: Uuid,
}

// The struct used for receiving a shot
#[derive(Deserialize, Debug)]
pub struct Shot {
    x: i64,
    y: i64,
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
//handler for creating the online game of a room. Same as starting the room, so a room still has one game.
pub async fn create_online(
    Query(query): Query<OnlineGameQuery>,
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("new online game request for room {}", query.room_token);

    let user_name = check_access(&state.config, &bearer).await?;
    let started = state
        .rooms
        .start(query.room_token, &user_name, &state.games)
        .await
        .map_err(logged("Error creating online game"))?;

    Ok((StatusCode::OK, Json(started)))
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
//handler for placing ships. The layout is validated completely before anything is stored.
pub async fn place_ships(
    Path(game_id): Path<Uuid>,
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<PlaceShipsRequest>,
) -> Result<impl IntoResponse, CustomError> {
    info!("place ships request for game {}", game_id);

    let user_name = check_access(&state.config, &bearer).await?;
    state
        .games
        .place_ships(game_id, &user_name, &request)
        .await
        .map_err(logged("Error placing ships"))?;

    Ok((StatusCode::OK, Json(json!({"message": "Board saved"}))))
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
pub async fn ready(
    Path(game_id): Path<Uuid>,
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("ready request for game {}", game_id);

    let user_name = check_access(&state.config, &bearer).await?;
    let ready = state
        .games
        .ready(game_id, &user_name)
        .await
        .map_err(logged("Error marking ready"))?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Ready",
            "bothReady": ready.both_ready,
            "gameStarted": ready.game_started,
        })),
    ))
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
//handler returning the caller's own board with the ships visible
pub async fn board(
    Path(game_id): Path<Uuid>,
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("board request for game {}", game_id);

    let user_name = check_access(&state.config, &bearer).await?;
    let grid = state
        .games
        .board(game_id, &user_name)
        .await
        .map_err(logged("Error fetching board"))?;

    Ok(Json(json!({ "grid": grid })))
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
//handler returning both boards from the caller's point of view. Also used to resync after a reconnect.
pub async fn boards(
    Path(game_id): Path<Uuid>,
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("boards request for game {}", game_id);

    let user_name = check_access(&state.config, &bearer).await?;
    let view = state
        .games
        .boards(game_id, &user_name)
        .await
        .map_err(logged("Error fetching boards"))?;

    Ok(Json(view))
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
pub async fn attack(
    Path(game_id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(pool): Extension<MySqlPool>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
    Json(shot): Json<Shot>,
) -> Result<impl IntoResponse, CustomError> {
    info!("attack request for game {} at ({}, {})", game_id, shot.x, shot.y);

    let user_name = check_access(&state.config, &bearer).await?;
    let (result, finished) = state
        .games
        .attack(game_id, &user_name, shot.x, shot.y)
        .await
        .map_err(logged("Error attacking"))?;

    history::record_quietly(&pool, finished).await;
    Ok(Json(result))
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
//handler asking the bot for a single shot while it holds the turn
pub async fn bot_move(
    Path(game_id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(pool): Extension<MySqlPool>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("bot move request for game {}", game_id);

    let user_name = check_access(&state.config, &bearer).await?;
    let (result, finished) = state
        .games
        .bot_move(game_id, &user_name)
        .await
        .map_err(logged("Error making bot move"))?;

    history::record_quietly(&pool, finished).await;
    Ok(Json(result))
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
pub async fn surrender(
    Path(game_id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(pool): Extension<MySqlPool>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("surrender request for game {}", game_id);

    let user_name = check_access(&state.config, &bearer).await?;
    let finished = state
        .games
        .surrender(game_id, &user_name)
        .await
        .map_err(logged("Error surrendering"))?;

    history::record_quietly(&pool, Some(finished)).await;
    Ok((StatusCode::OK, "You surrendered".to_string()))
}
