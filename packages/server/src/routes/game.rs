use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::models::{game::StartGameRequest, player::UserId};
use crate::services::game_service::{self, GameError};
use crate::state::AppState;
use crate::utils::websocket;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(websocket::handler))
        .nest(
            "/:roomid",
            Router::new()
                // ロビーからの呼び出し
                .route("/start", post(start_game))
                .route("/end", post(end_game_handler))
                .route("/state", get(get_game_state))
                .route("/leave/:playerid", post(leave_game_handler)),
        )
        .with_state(state)
}

fn error_response(err: GameError) -> Response {
    let status = match err {
        GameError::AlreadyStarted => StatusCode::CONFLICT,
        GameError::NotEnoughPlayers { .. } | GameError::InvalidSetup(_) => StatusCode::BAD_REQUEST,
        GameError::GameNotFound | GameError::PlayerNotFound => StatusCode::NOT_FOUND,
    };
    (status, Json(err.to_string())).into_response()
}

pub async fn start_game(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(request): Json<StartGameRequest>,
) -> Response {
    match game_service::start_game(&state, &room_id, request).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_game_state(
    Path(room_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    match game_service::get_game_state(&state, &room_id).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn end_game_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Response {
    match game_service::end_game(&state, &room_id).await {
        Ok(()) => (StatusCode::OK, Json("Game ended".to_string())).into_response(),
        Err(e) => error_response(e),
    }
}

async fn leave_game_handler(
    State(state): State<AppState>,
    Path((room_id, player_id)): Path<(String, UserId)>,
) -> impl IntoResponse {
    match game_service::leave_game(&state, &room_id, player_id).await {
        Ok(()) => (StatusCode::OK, Json("Left the game".to_string())).into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use serde_json::json;
    use tower::ServiceExt;

    fn start_request(room_id: &str) -> Request<Body> {
        let body = json!({
            "roster": (1..=5)
                .map(|id| json!({"userId": id, "displayName": format!("Player{}", id), "avatarId": 1}))
                .collect::<Vec<_>>(),
            "rolePool": ["healer", "detective"],
            "mafiaCount": 1,
            "minPlayers": 5,
        });
        Request::builder()
            .method("POST")
            .uri(format!("/{}/start", room_id))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_game() {
        let state = AppState::new();
        let app = routes(state.clone());

        let response = app.oneshot(start_request("room1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.sessions.contains("room1").await);
    }

    #[tokio::test]
    async fn test_start_twice_conflicts() {
        let state = AppState::new();
        let app = routes(state.clone());

        let response = app.clone().oneshot(start_request("room1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.oneshot(start_request("room1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_end_game() {
        let state = AppState::new();
        let app = routes(state.clone());
        app.clone().oneshot(start_request("room1")).await.unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/room1/end")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder()
            .method("GET")
            .uri("/room1/state")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
