use anyhow::{anyhow, Context};
use log::LevelFilter;
use std::{env, fmt::Display, net::SocketAddr, str::FromStr, time::Duration};

/// Side length of every board.
pub const BOARD_SIZE: usize = 10;

/// Ship lengths every board must carry, largest first.
pub const FLEET: [usize; 10] = [4, 3, 3, 2, 2, 2, 1, 1, 1, 1];

pub const MAX_SHIP_LENGTH: usize = 4;

/// Random tries per ship before the automatic placer restarts from an empty board.
pub const ATTEMPTS_PER_SHIP: usize = 200;

/// Restarts before the automatic placer gives up.
pub const MAX_RESTARTS: usize = 100;

/// Rating points for a finished game (won by sinking the fleet).
pub const WIN_DELTA: i32 = 10;

/// Rating points when the game ended by surrender.
pub const SURRENDER_DELTA: i32 = 5;

pub const BOT_NAME: &str = "Bot";

/// What happens to the turn after a resolved shot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TurnRule {
    /// The turn passes to the other side after every resolved shot.
    #[default]
    AlwaysFlip,
    /// A hit lets the shooter fire again, a miss passes the turn.
    HitKeepsTurn,
}

impl FromStr for TurnRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always-flip" => Ok(TurnRule::AlwaysFlip),
            "hit-keeps-turn" => Ok(TurnRule::HitKeepsTurn),
            other => Err(format!("unknown turn rule '{}'", other)),
        }
    }
}

// Everything read from the environment at startup
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub token_duration: i64,
    pub listen_addr: SocketAddr,
    pub public_url: String,
    pub room_ttl: chrono::Duration,
    pub game_retention: chrono::Duration,
    pub game_idle: chrono::Duration,
    pub sweep_interval: Duration,
    pub request_timeout: Duration,
    pub db_connect_attempts: u32,
    pub db_connect_delay: Duration,
    pub turn_rule: TurnRule,
    pub log_level: LevelFilter,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let room_ttl_minutes: i64 = optional("ROOM_TTL_MINUTES", 30)?;
        let retention_minutes: i64 = optional("GAME_RETENTION_MINUTES", 120)?;
        let idle_minutes: i64 = optional("GAME_IDLE_MINUTES", 240)?;

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            token_duration: required("TOKEN_DURATION")?
                .parse::<i64>()
                .context("$TOKEN_DURATION is not numeric")?,
            listen_addr: optional("LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            public_url: optional("PUBLIC_URL", "http://localhost:4200".to_string())?,
            room_ttl: chrono::Duration::minutes(room_ttl_minutes),
            game_retention: chrono::Duration::minutes(retention_minutes),
            game_idle: chrono::Duration::minutes(idle_minutes),
            sweep_interval: nonzero_secs("SWEEP_INTERVAL_SECS", optional("SWEEP_INTERVAL_SECS", 60)?)?,
            request_timeout: Duration::from_secs(optional("REQUEST_TIMEOUT_SECS", 10)?),
            db_connect_attempts: optional("DB_CONNECT_ATTEMPTS", 3)?,
            db_connect_delay: Duration::from_secs(optional("DB_CONNECT_DELAY_SECS", 2)?),
            turn_rule: optional("TURN_RULE", TurnRule::AlwaysFlip)?,
            log_level: optional("LOG_LEVEL", LevelFilter::Info)?,
        })
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name).with_context(|| format!("${} is not set", name))
}

fn optional<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|err| anyhow!("${} is invalid: {}", name, err)),
        Err(_) => Ok(default),
    }
}

// tokio intervals panic on a zero period
fn nonzero_secs(name: &str, secs: u64) -> anyhow::Result<Duration> {
    if secs == 0 {
        return Err(anyhow!("${} must be greater than zero", name));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_rule_parses_both_variants() {
        assert_eq!("always-flip".parse::<TurnRule>(), Ok(TurnRule::AlwaysFlip));
        assert_eq!("Hit-Keeps-Turn".parse::<TurnRule>(), Ok(TurnRule::HitKeepsTurn));
        assert!("sometimes".parse::<TurnRule>().is_err());
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let err = nonzero_secs("SWEEP_INTERVAL_SECS", 0).unwrap_err();
        assert!(err.to_string().contains("SWEEP_INTERVAL_SECS"));
        assert_eq!(nonzero_secs("SWEEP_INTERVAL_SECS", 60).unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn fleet_matches_the_classic_composition() {
        assert_eq!(FLEET.iter().sum::<usize>(), 20);
        assert!(FLEET.iter().all(|&len| (1..=MAX_SHIP_LENGTH).contains(&len)));
    }
}
