use axum::{http::StatusCode, response::IntoResponse, Json};
use log::{error, info};
use serde_json::json;
use std::fmt;

use crate::engine::placement::PlacementViolation;

// Custom Errors used in handlers and in the game core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomError {
    BadRequest,
    InternalServerError,
    InvalidToken,
    UserNotFound,
    UserExists,
    WrongPassword,
    InvalidPlacement(Vec<PlacementViolation>),
    PlacementLocked,
    PlacementExhausted,
    OutOfBounds,
    NotYourTurn,
    GameAlreadyFinished,
    GameNotStarted,
    BoardNotPlaced,
    GameNotFound,
    NotParticipant,
    RoomNotFound,
    RoomExpired,
    RoomFull,
    RoomNotReady,
    RoomInGame,
    CannotJoinOwnRoom,
    NotHost,
    ConnectionLost,
}

impl CustomError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest | Self::OutOfBounds | Self::CannotJoinOwnRoom | Self::UserExists => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidPlacement(_) => StatusCode::BAD_REQUEST,
            Self::InternalServerError | Self::PlacementExhausted => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidToken | Self::WrongPassword => StatusCode::UNAUTHORIZED,
            Self::NotYourTurn | Self::NotParticipant | Self::NotHost => StatusCode::FORBIDDEN,
            Self::UserNotFound | Self::GameNotFound | Self::RoomNotFound => StatusCode::NOT_FOUND,
            Self::RoomExpired => StatusCode::GONE,
            Self::PlacementLocked
            | Self::GameAlreadyFinished
            | Self::GameNotStarted
            | Self::BoardNotPlaced
            | Self::RoomFull
            | Self::RoomNotReady
            | Self::RoomInGame => StatusCode::CONFLICT,
            Self::ConnectionLost => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::BadRequest => "Bad Request",
            Self::InternalServerError => "Internal Server Error",
            Self::InvalidToken => "Token is not valid",
            Self::UserNotFound => "User not Found",
            Self::UserExists => "User already exists",
            Self::WrongPassword => "Wrong Password",
            Self::InvalidPlacement(_) => "Invalid ship placement",
            Self::PlacementLocked => "Ships can no longer be moved",
            Self::PlacementExhausted => "Could not generate a ship layout",
            Self::OutOfBounds => "Coordinates are outside the board",
            Self::NotYourTurn => "It is not your turn",
            Self::GameAlreadyFinished => "Game is already finished",
            Self::GameNotStarted => "Game has not started yet",
            Self::BoardNotPlaced => "Place your ships first",
            Self::GameNotFound => "Game not found",
            Self::NotParticipant => "You are not a participant in this game",
            Self::RoomNotFound => "Room not found",
            Self::RoomExpired => "Room has expired",
            Self::RoomFull => "Room already has a guest",
            Self::RoomNotReady => "Cannot start game without opponent",
            Self::RoomInGame => "Room is already in game",
            Self::CannotJoinOwnRoom => "You cannot join your own room",
            Self::NotHost => "Only the room host can do this",
            Self::ConnectionLost => "Connection lost",
        }
    }
}

impl fmt::Display for CustomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for CustomError {}

// Logs a failed request before it turns into a response.
// Client mistakes go to info, server faults to error.
pub fn logged(context: &'static str) -> impl Fn(CustomError) -> CustomError {
    move |err| {
        if err.status().is_server_error() {
            error!("{}: {}", context, err);
        } else {
            info!("{}: {}", context, err);
        }
        err
    }
}

//implementation of custom errors that are used in handlers
impl IntoResponse for CustomError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = match &self {
            Self::InvalidPlacement(details) => json!({"error": self.message(), "details": details}),
            _ => json!({"error": self.message()}),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::placement::PlacementRule;

    #[test]
    fn errors_map_to_expected_status() {
        assert_eq!(CustomError::NotYourTurn.status(), StatusCode::FORBIDDEN);
        assert_eq!(CustomError::RoomFull.status(), StatusCode::CONFLICT);
        assert_eq!(CustomError::RoomExpired.status(), StatusCode::GONE);
        assert_eq!(CustomError::InvalidToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(CustomError::ConnectionLost.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn placement_errors_carry_details() {
        let err = CustomError::InvalidPlacement(vec![PlacementViolation {
            ship_id: Some(3),
            rule: PlacementRule::Adjacent,
        }]);
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
