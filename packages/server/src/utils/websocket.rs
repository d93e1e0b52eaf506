use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::models::{
    message::{ClientMessage, ServerMessage},
    player::UserId,
};
use crate::services::game_service;
use crate::state::AppState;
use crate::utils::auth::verify_token;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: String,
}

pub async fn handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    match verify_token(&params.token) {
        Ok(user_id) => ws
            .on_upgrade(move |socket| handle_socket(socket, state, user_id))
            .into_response(),
        Err(e) => {
            warn!("Rejected WebSocket connection: {}", e);
            (StatusCode::UNAUTHORIZED, e.to_string()).into_response()
        }
    }
}

pub async fn handle_socket(ws: WebSocket, state: AppState, user_id: UserId) {
    info!("New WebSocket connection established for user: {}", user_id);
    let (mut sender, mut receiver) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let connection_id = state.router.connect(user_id, tx.clone()).await;
    // 進行中のゲームがあれば状態を再送
    game_service::restore_state(&state, user_id).await;

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(text)).await {
                warn!("Error sending message to user {}: {}", user_id, e);
                break;
            }
        }
    });

    let receive_state = state.clone();
    let mut receive_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => {
                        game_service::handle_client_message(&receive_state, user_id, message)
                            .await
                    }
                    Err(e) => {
                        // 不正なフォーマットは送信者にだけ返す
                        info!("Malformed message from user {}: {}", user_id, e);
                        let _ = tx.send(ServerMessage::Error {
                            message: format!("malformed message: {}", e),
                        });
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => receive_task.abort(),
        _ = &mut receive_task => send_task.abort(),
    }

    state.router.disconnect(user_id, connection_id).await;
    info!("WebSocket connection closed for user: {}", user_id);
}
