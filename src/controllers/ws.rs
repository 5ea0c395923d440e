//! WebSocket endpoints for live game and room updates.
//!
//! The JWT travels in the `token` query parameter and is checked before the upgrade.
//! Every socket gets one writer task fed by an unbounded channel; that channel is also
//! what the broadcaster holds for the connection's subscriptions.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    Extension,
};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info};
use serde::Deserialize;
use sqlx::MySqlPool;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use uuid::Uuid;

use crate::errors::CustomError;
use crate::services::broadcast::{Broadcaster, ConnectionId, Event, Topic};
use crate::services::history;
use crate::{decode_token, AppState};

#[derive(Deserialize)]
pub struct TokenQuery {
    token: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Channel {
    Game,
    Room,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Subscribe {
        game_id: Option<Uuid>,
        room_token: Option<Uuid>,
    },
    #[serde(rename_all = "camelCase")]
    Attack { game_id: Uuid, x: i64, y: i64 },
    #[serde(rename_all = "camelCase")]
    Ready { game_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Surrender { game_id: Uuid },
}

// Everything a message handler needs from its connection
struct Connection {
    id: ConnectionId,
    username: String,
    channel: Channel,
    tx: UnboundedSender<Event>,
    state: AppState,
    pool: MySqlPool,
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
pub async fn game_socket(
    ws: WebSocketUpgrade,
    Query(query): Query<TokenQuery>,
    State(state): State<AppState>,
    Extension(pool): Extension<MySqlPool>,
) -> Result<Response, CustomError> {
    info!("game socket request");
    upgrade(ws, query, state, pool, Channel::Game)
}

/////////////////////////////////////////////////////////////////////////////////////////////////////////////////
pub async fn room_socket(
    ws: WebSocketUpgrade,
    Query(query): Query<TokenQuery>,
    State(state): State<AppState>,
    Extension(pool): Extension<MySqlPool>,
) -> Result<Response, CustomError> {
    info!("room socket request");
    upgrade(ws, query, state, pool, Channel::Room)
}

fn upgrade(
    ws: WebSocketUpgrade,
    query: TokenQuery,
    state: AppState,
    pool: MySqlPool,
    channel: Channel,
) -> Result<Response, CustomError> {
    let token = query.token.ok_or_else(|| {
        info!("socket request without token");
        CustomError::InvalidToken
    })?;
    let username = decode_token(&state.config, &token)?;
    Ok(ws.on_upgrade(move |socket| serve(socket, username, state, pool, channel)))
}

async fn serve(socket: WebSocket, username: String, state: AppState, pool: MySqlPool, channel: Channel) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let broadcaster: Arc<Broadcaster> = Arc::clone(&state.broadcaster);
    let id = broadcaster.next_connection_id();
    debug!("{:?} socket {} opened by {}", channel, id, username);

    // single writer keeps the per-connection order
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    error!("Error serializing event: {:?}", err);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let connection = Connection {
        id,
        username,
        channel,
        tx,
        state,
        pool,
    };

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let reply = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(message) => connection.handle(message).await,
            Err(err) => {
                debug!("Unreadable socket message on {}: {}", id, err);
                Err(CustomError::BadRequest)
            }
        };
        let event = match reply {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(err) => Event::Error {
                message: err.to_string(),
            },
        };
        if connection.tx.send(event).is_err() {
            break;
        }
    }

    debug!("{:?} socket {} closed", connection.channel, id);
    broadcaster.unsubscribe_all(id);
    writer.abort();
}

impl Connection {
    async fn handle(&self, message: ClientMessage) -> Result<Option<Event>, CustomError> {
        let games = &self.state.games;
        match (self.channel, message) {
            (Channel::Game, ClientMessage::Subscribe { game_id: Some(game_id), .. }) => {
                games.is_participant(game_id, &self.username).await?;
                self.subscribe(Topic::Game(game_id));
                Ok(Some(Event::Subscribed {
                    game_id: Some(game_id),
                    room_token: None,
                }))
            }
            (Channel::Room, ClientMessage::Subscribe { room_token: Some(token), .. }) => {
                self.state.rooms.is_participant(token, &self.username).await?;
                self.subscribe(Topic::Room(token));
                Ok(Some(Event::Subscribed {
                    game_id: None,
                    room_token: Some(token),
                }))
            }
            (Channel::Game, ClientMessage::Attack { game_id, x, y }) => {
                let (result, finished) = games.attack(game_id, &self.username, x, y).await?;
                history::record_quietly(&self.pool, finished).await;
                Ok(Some(Event::AttackResult { game_id, result }))
            }
            (Channel::Game, ClientMessage::Ready { game_id }) => {
                games.ready(game_id, &self.username).await?;
                Ok(None)
            }
            (Channel::Game, ClientMessage::Surrender { game_id }) => {
                let finished = games.surrender(game_id, &self.username).await?;
                history::record_quietly(&self.pool, Some(finished)).await;
                Ok(None)
            }
            (channel, message) => {
                debug!("{:?} socket {} ignored {:?}", channel, self.id, message);
                Err(CustomError::BadRequest)
            }
        }
    }

    fn subscribe(&self, topic: Topic) {
        self.state
            .broadcaster
            .subscribe(topic, self.id, Some(self.username.clone()), self.tx.clone());
    }
}
