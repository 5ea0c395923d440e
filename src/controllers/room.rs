use axum::{
    extract::{Path, State, TypedHeader},
    headers::{authorization::Bearer, Authorization},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use log::info;
use serde_json::json;
use uuid::Uuid;

use crate::errors::{logged, CustomError};
use crate::{check_access, AppState};

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
//handler for opening a room. The answer carries the link to share with the opponent.
pub async fn create(
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("create room request");

    let user_name = check_access(&state.config, &bearer).await?;
    Ok((StatusCode::OK, Json(state.rooms.create(&user_name).await)))
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
pub async fn join(
    Path(token): Path<Uuid>,
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("join room request for {}", token);

    let user_name = check_access(&state.config, &bearer).await?;
    let joined = state
        .rooms
        .join(token, &user_name)
        .await
        .map_err(logged("Error joining room"))?;

    Ok((StatusCode::OK, Json(joined)))
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
pub async fn get_room(
    Path(token): Path<Uuid>,
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("room status request for {}", token);

    let user_name = check_access(&state.config, &bearer).await?;
    let view = state
        .rooms
        .view(token, &user_name)
        .await
        .map_err(logged("Error fetching room"))?;

    Ok(Json(view))
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
//handler for starting the game of a room. Only the host may do this, calling it twice is harmless.
pub async fn start(
    Path(token): Path<Uuid>,
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("start room request for {}", token);

    let user_name = check_access(&state.config, &bearer).await?;
    let started = state
        .rooms
        .start(token, &user_name, &state.games)
        .await
        .map_err(logged("Error starting room"))?;

    Ok((StatusCode::OK, Json(started)))
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
pub async fn delete_room(
    Path(token): Path<Uuid>,
    State(state): State<AppState>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("delete room request for {}", token);

    let user_name = check_access(&state.config, &bearer).await?;
    state
        .rooms
        .delete(token, &user_name)
        .await
        .map_err(logged("Error deleting room"))?;

    Ok((StatusCode::OK, Json(json!({"message": "Room deleted successfully"}))))
}
