use log::{error, info};
use sqlx::MySqlPool;

use crate::config::{SURRENDER_DELTA, WIN_DELTA};
use crate::errors::CustomError;
use crate::models::game::{FinishedGame, Turn};

/// What a finished game does to one human player's record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RatingChange {
    pub player: String,
    pub opponent: Option<String>,
    pub won: bool,
    pub delta: i32,
}

impl RatingChange {
    pub fn result(&self) -> &'static str {
        if self.won {
            "WIN"
        } else {
            "LOSS"
        }
    }
}

/// One change per human player. The bot has no record.
pub fn rating_changes(finished: &FinishedGame) -> Vec<RatingChange> {
    let points = if finished.surrendered { SURRENDER_DELTA } else { WIN_DELTA };
    [Turn::Host, Turn::Guest]
        .into_iter()
        .filter_map(|side| {
            let player = finished.player(side)?;
            let won = side == finished.victor;
            Some(RatingChange {
                player: player.to_string(),
                opponent: finished.player(side.other()).map(str::to_string),
                won,
                delta: if won { points } else { -points },
            })
        })
        .collect()
}

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////
// Writes the history rows and updates wins, losses and rating in one transaction.
// The rating never drops below zero.
///////////////////////////////////////////////////////////////////////////////////////////////////////////////////

pub async fn record(pool: &MySqlPool, finished: &FinishedGame) -> Result<(), CustomError> {
    let mut tx = pool.begin().await.map_err(|err| {
        error!("Error starting history transaction: {:?}", err);
        CustomError::InternalServerError
    })?;

    for change in rating_changes(finished) {
        let sql = "INSERT INTO game_history (game_id, player, opponent, result, delta_rating) VALUES (?, ?, ?, ?, ?)";
        sqlx::query(sql)
            .bind(finished.game_id.to_string())
            .bind(&change.player)
            .bind(change.opponent.clone())
            .bind(change.result())
            .bind(change.delta)
            .execute(&mut tx)
            .await
            .map_err(|err| {
                error!("Error writing game history: {:?}", err);
                CustomError::InternalServerError
            })?;

        let sql = "UPDATE user SET wins = wins + ?, losses = losses + ?, rating = GREATEST(rating + ?, 0) WHERE name = ?";
        sqlx::query(sql)
            .bind(change.won as u32)
            .bind(!change.won as u32)
            .bind(change.delta)
            .bind(&change.player)
            .execute(&mut tx)
            .await
            .map_err(|err| {
                error!("Error updating rating: {:?}", err);
                CustomError::InternalServerError
            })?;
    }

    tx.commit().await.map_err(|err| {
        error!("Error committing game history: {:?}", err);
        CustomError::InternalServerError
    })?;

    info!("Recorded result of game {}", finished.game_id);
    Ok(())
}

/// Persists a finished game from a handler. Failures are logged and never fail the move.
pub async fn record_quietly(pool: &MySqlPool, finished: Option<FinishedGame>) {
    if let Some(finished) = finished {
        if let Err(err) = record(pool, &finished).await {
            error!("Result of game {} was not recorded: {}", finished.game_id, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn finished(guest: Option<&str>, victor: Turn, surrendered: bool) -> FinishedGame {
        FinishedGame {
            game_id: Uuid::new_v4(),
            host: "alice".to_string(),
            guest: guest.map(str::to_string),
            victor,
            surrendered,
        }
    }

    #[test]
    fn online_win_moves_both_ratings() {
        let changes = rating_changes(&finished(Some("bob"), Turn::Guest, false));
        assert_eq!(
            changes,
            vec![
                RatingChange {
                    player: "alice".to_string(),
                    opponent: Some("bob".to_string()),
                    won: false,
                    delta: -WIN_DELTA,
                },
                RatingChange {
                    player: "bob".to_string(),
                    opponent: Some("alice".to_string()),
                    won: true,
                    delta: WIN_DELTA,
                },
            ]
        );
    }

    #[test]
    fn surrender_uses_the_smaller_delta_and_skips_the_bot() {
        let changes = rating_changes(&finished(None, Turn::Guest, true));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].delta, -SURRENDER_DELTA);
        assert_eq!(changes[0].opponent, None);
        assert_eq!(changes[0].result(), "LOSS");
    }
}
