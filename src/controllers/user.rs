use axum::{
    extract::{Query, State, TypedHeader},
    headers::{
        authorization::{Basic, Bearer},
        Authorization,
    },
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use log::{debug, error, info};
use pwhash::bcrypt;
use sqlx::MySqlPool;

use crate::errors::CustomError;
use crate::models::user::*;
use crate::{check_access, AppState, Claims};

const DEFAULT_TOP_LIMIT: u32 = 5;
const MAX_TOP_LIMIT: u32 = 100;

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////
//handler logging in. We extract Basic authentication to retrieve username and password from db. If password
//checks out we generate and return the JWT Bearer token which has the expiration encoded within
///////////////////////////////////////////////////////////////////////////////////////////////////////////////////

pub async fn login(
    State(state): State<AppState>,
    Extension(pool): Extension<MySqlPool>,
    TypedHeader(basic): TypedHeader<Authorization<Basic>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("login request by user: {}", basic.username());

    // Fetch the user using the username from the basic authentication header
    let sql = "SELECT * FROM user WHERE name = ?";
    let user: User = sqlx::query_as(sql)
        .bind(basic.username())
        .fetch_one(&pool)
        .await
        .map_err(|err| {
            error!("error retrieving user: {:?}", err);
            CustomError::UserNotFound
        })?;

    //Check password hash is equal to stored password hash. if not, error out
    if !bcrypt::verify(basic.password(), &user.password_hash) {
        info!("wrong password for user: {}", basic.username());
        return Err(CustomError::WrongPassword);
    }

    // Define the registered <Expiration Time> claim (exp) which is the current timestmap plus the defined offset
    let now = Utc::now();
    let my_exp = now
        .checked_add_signed(Duration::seconds(state.config.token_duration))
        .ok_or(CustomError::InternalServerError)?
        .timestamp();

    // Define the Claims struct
    let my_claims = Claims {
        sub: user.name,                 // username
        iat: now.timestamp() as usize,  // valid from
        exp: my_exp as usize,           // valid until
    };

    // generate the Bearer token
    match encode(
        &Header::default(),
        &my_claims,
        &EncodingKey::from_secret(state.config.jwt_secret.as_bytes()),
    ) {
        Ok(token) => {
            debug!("Generated token for {}", my_claims.sub);
            Ok((
                StatusCode::OK,
                Json(AuthResponse {
                    access_token: token,
                    token_type: "bearer".to_string(),
                    expires_in: state.config.token_duration,
                }),
            ))
        }
        Err(err) => {
            error!("Unexpected error while encoding the bearer token ({:?})", err);
            Err(CustomError::InternalServerError)
        }
    }
}

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////
// Handler for signing up. New players start without games and with a rating of zero.
///////////////////////////////////////////////////////////////////////////////////////////////////////////////////

pub async fn signup(
    Extension(pool): Extension<MySqlPool>,
    Json(user): Json<SignUp>,
) -> Result<(StatusCode, String), CustomError> {
    info!("signup request");

    if user.name.trim().is_empty() || user.password.is_empty() {
        info!("signup without name or password");
        return Err(CustomError::BadRequest);
    }

    // check if user already exists, bail out if that is the case
    let sql = "SELECT * FROM user where name=?";
    if sqlx::query_as::<_, User>(sql)
        .bind(&user.name)
        .fetch_one(&pool)
        .await
        .is_ok()
    {
        error!("Trying to signup with a username that already exists");
        return Err(CustomError::UserExists);
    }

    // Create the password hash
    let password_hash = match bcrypt::hash(user.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Unexpected error encrypting password {:?}", err);
            return Err(CustomError::InternalServerError);
        }
    };

    // Create user
    let sql = "INSERT INTO user (name, password_hash) VALUES (?, ?)";
    match sqlx::query(sql)
        .bind(user.name)
        .bind(password_hash)
        .execute(&pool)
        .await
    {
        Ok(_) => Ok((StatusCode::CREATED, "User registered successfully".to_string())),
        Err(err) => {
            error!("Error creating user: {:?}", err);
            Err(CustomError::BadRequest)
        }
    }
}

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////
// Handler for a player's statistics. Without a username the caller's own profile is returned.
///////////////////////////////////////////////////////////////////////////////////////////////////////////////////

pub async fn profile(
    Query(query): Query<ProfileQuery>,
    State(state): State<AppState>,
    Extension(pool): Extension<MySqlPool>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("profile request");

    let user_name = check_access(&state.config, &bearer).await?;
    let name = query.username.unwrap_or(user_name);

    let sql = "SELECT * FROM user where name=?";
    let user = match sqlx::query_as::<_, User>(sql)
        .bind(&name)
        .fetch_one(&pool)
        .await
    {
        Ok(user) => user,
        Err(err) => {
            info!("Profile of {} not found: {:?}", name, err);
            return Err(CustomError::UserNotFound);
        }
    };

    // Position on the leaderboard, ties share a place
    let sql = "SELECT COUNT(*) FROM user WHERE rating > ?";
    let ahead = match sqlx::query_scalar::<_, i64>(sql).bind(user.rating).fetch_one(&pool).await {
        Ok(count) => count,
        Err(err) => {
            error!("Error computing leaderboard position: {:?}", err);
            return Err(CustomError::InternalServerError);
        }
    };

    Ok((StatusCode::OK, Json(Profile::new(&user, ahead as u32 + 1))))
}

///////////////////////////////////////////////////////////////////////////////////////////////////////////////////
// Handler for the leaderboard
///////////////////////////////////////////////////////////////////////////////////////////////////////////////////

pub async fn top(
    Query(query): Query<TopQuery>,
    State(state): State<AppState>,
    Extension(pool): Extension<MySqlPool>,
    TypedHeader(bearer): TypedHeader<Authorization<Bearer>>,
) -> Result<impl IntoResponse, CustomError> {
    info!("leaderboard request");

    check_access(&state.config, &bearer).await?;
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT).clamp(1, MAX_TOP_LIMIT);

    let sql = "SELECT name, rating FROM user ORDER BY rating DESC, name LIMIT ?";
    match sqlx::query_as::<_, TopPlayer>(sql)
        .bind(limit)
        .fetch_all(&pool)
        .await
    {
        Ok(players) => Ok((StatusCode::OK, Json(players))),
        Err(err) => {
            error!("Error fetching leaderboard: {:?}", err);
            Err(CustomError::InternalServerError)
        }
    }
}
