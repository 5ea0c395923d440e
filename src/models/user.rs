use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, sqlx::FromRow, Debug)]
pub struct User {
    pub name: String,
    pub password_hash: String,
    pub wins: u32,
    pub losses: u32,
    pub rating: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// The struct used for receiving user data for creating a user record as json
#[derive(Deserialize, Serialize)]
pub struct SignUp {
    pub name: String,
    pub password: String,
}

// The struct used to respond with an official json for the bearer token
#[derive(Deserialize, Serialize, Debug)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Deserialize)]
pub struct ProfileQuery {
    pub username: Option<String>,
}

#[derive(Deserialize)]
pub struct TopQuery {
    pub limit: Option<u32>,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub username: String,
    pub total_games: u32,
    pub wins: u32,
    pub losses: u32,
    pub winrate: f64,
    pub rating: i32,
    pub position: u32,
}

impl Profile {
    pub fn new(user: &User, position: u32) -> Self {
        let total_games = user.wins + user.losses;
        let winrate = if total_games == 0 {
            0.0
        } else {
            (user.wins as f64 * 1000.0 / total_games as f64).round() / 10.0
        };
        Profile {
            username: user.name.clone(),
            total_games,
            wins: user.wins,
            losses: user.losses,
            winrate,
            rating: user.rating,
            position,
        }
    }
}

#[derive(Serialize, sqlx::FromRow, Debug)]
pub struct TopPlayer {
    #[sqlx(rename = "name")]
    pub username: String,
    pub rating: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winrate_is_a_rounded_percentage() {
        let user = User {
            name: "alice".to_string(),
            password_hash: String::new(),
            wins: 2,
            losses: 1,
            rating: 20,
            created_at: chrono::Utc::now(),
        };
        let profile = Profile::new(&user, 1);
        assert_eq!(profile.total_games, 3);
        assert_eq!(profile.winrate, 66.7);
    }
}
