use axum::{
    extract::{Path, State, TypedHeader},
    headers::{authorization::Bearer, Authorization},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use log::info;
use sqlx::MySqlPool;
use uuid::Uuid;

use crate::controllers::game::GameCreated;
use crate::errors::{logged, CustomError};
use crate::services::history;
use crate::{check_access, AppState};

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
//handler for creating a game against the bot. The bot's fleet is placed right away.
pub async fn create(
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("new bot game request");

    //check if user is logged in, bail out if not. Retrieve the user_name from the bearer token
    let user_name = check_access(&state.config, &bearer).await?;

    let game_id = state
        .games
        .create_bot_game(&user_name)
        .await
        .map_err(logged("Error creating bot game"))?;

    Ok((
        StatusCode::OK,
        Json(GameCreated {
            game_id,
            message: "Game started, place your ships".to_string(),
        }),
    ))
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
//handler listing the caller's bot games that are still running
pub async fn unfinished(
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("unfinished bot games request");

    let user_name = check_access(&state.config, &bearer).await?;
    Ok(Json(state.games.unfinished_bot_games(&user_name).await))
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
//handler placing the caller's fleet at random. This starts the game.
pub async fn auto_place(
    Path(game_id): Path<Uuid>,
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("auto place request for game {}", game_id);

    let user_name = check_access(&state.config, &bearer).await?;
    let placed = state
        .games
        .auto_place(game_id, &user_name)
        .await
        .map_err(logged("Error placing ships"))?;

    Ok((StatusCode::OK, Json(placed)))
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
pub async fn surrender(
    Path(game_id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(pool): Extension<MySqlPool>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("bot game surrender request for game {}", game_id);

    let user_name = check_access(&state.config, &bearer).await?;
    let finished = state
        .games
        .surrender(game_id, &user_name)
        .await
        .map_err(logged("Error surrendering"))?;

    history::record_quietly(&pool, Some(finished)).await;
    Ok((StatusCode::OK, "You surrendered, the bot wins".to_string()))
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
//handler starting a new bot game once the previous one is over
pub async fn rematch(
    Path(game_id): Path<Uuid>,
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("rematch request for game {}", game_id);

    let user_name = check_access(&state.config, &bearer).await?;
    let new_game_id = state
        .games
        .rematch(game_id, &user_name)
        .await
        .map_err(logged("Error starting rematch"))?;

    Ok((
        StatusCode::OK,
        Json(GameCreated {
            game_id: new_game_id,
            message: "Rematch started, place your ships".to_string(),
        }),
    ))
}
