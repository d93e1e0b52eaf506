use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use log::{debug, info};
use tokio::sync::Mutex;

use crate::{
    models::{
        game::{GameSnapshot, StartGameRequest, Winner},
        message::{parse_target_id, ClientMessage, Envelope, ServerMessage},
        player::UserId,
    },
    state::AppState,
};

use super::game_session::{GameSession, IntentError, NextStep, Step, TimerAction};
use super::session_registry::SharedSession;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("game already started in this room")]
    AlreadyStarted,
    #[error("not enough players: {have}/{need}")]
    NotEnoughPlayers { have: usize, need: usize },
    #[error("invalid game setup: {0}")]
    InvalidSetup(String),
    #[error("game not found")]
    GameNotFound,
    #[error("player not found")]
    PlayerNotFound,
}

pub async fn start_game(
    state: &AppState,
    room_id: &str,
    request: StartGameRequest,
) -> Result<GameSnapshot, GameError> {
    if state.sessions.contains(room_id).await {
        return Err(GameError::AlreadyStarted);
    }
    let session = {
        let mut rng = rand::thread_rng();
        GameSession::create(
            room_id,
            request.roster,
            &request.role_pool,
            request.mafia_count,
            request.min_players,
            (*state.config).clone(),
            &mut rng,
        )?
    };
    let members: Vec<UserId> = session.players().iter().map(|p| p.user_id).collect();
    let shared = state.sessions.insert(session).await?;

    for user_id in members {
        state.router.join_room(user_id, room_id).await;
    }

    let mut session = shared.lock().await;
    if state.debug_config.enabled && state.debug_config.verbose_logging {
        for player in session.players() {
            debug!("room {}: {} is {}", room_id, player.user_id, player.role);
        }
    }
    let step = session.start();
    drive(state, &shared, &mut session, step).await;
    Ok(session.snapshot(state.debug_config.show_player_roles))
}

pub async fn get_game_state(state: &AppState, room_id: &str) -> Result<GameSnapshot, GameError> {
    let shared = state
        .sessions
        .get(room_id)
        .await
        .ok_or(GameError::GameNotFound)?;
    let session = shared.lock().await;
    Ok(session.snapshot(state.debug_config.show_player_roles))
}

/// プレイヤーの退出。全員が退出したらセッションを破棄する。
pub async fn leave_game(state: &AppState, room_id: &str, user_id: UserId) -> Result<(), GameError> {
    let shared = state
        .sessions
        .get(room_id)
        .await
        .ok_or(GameError::GameNotFound)?;
    let mut session = shared.lock().await;
    if session.player(user_id).is_none() {
        return Err(GameError::PlayerNotFound);
    }

    let everyone_left = session.mark_departed(user_id);
    if state.router.room_of(user_id).await.as_deref() == Some(room_id) {
        state.router.leave_room(user_id).await;
    }
    info!("room {}: user {} left the game", room_id, user_id);

    if everyone_left {
        destroy(state, &shared, &mut session, None).await;
    }
    Ok(())
}

/// 勝敗をつけずにゲームを打ち切る
pub async fn end_game(state: &AppState, room_id: &str) -> Result<(), GameError> {
    let shared = state
        .sessions
        .get(room_id)
        .await
        .ok_or(GameError::GameNotFound)?;
    let mut session = shared.lock().await;
    destroy(state, &shared, &mut session, None).await;
    Ok(())
}

pub async fn handle_client_message(state: &AppState, user_id: UserId, message: ClientMessage) {
    match message {
        ClientMessage::NightAction { target_id } => {
            handle_night_action(state, user_id, parse_target_id(&target_id)).await
        }
        ClientMessage::DayVote { target_id } => {
            handle_day_vote(state, user_id, parse_target_id(&target_id)).await
        }
        ClientMessage::SendChat { text } => send_chat(state, user_id, text).await,
        ClientMessage::RestoreState => restore_state(state, user_id).await,
    }
}

pub async fn handle_night_action(state: &AppState, user_id: UserId, target_id: Option<UserId>) {
    let Some(shared) = session_of(state, user_id).await else {
        debug!("night action from user {} without a session", user_id);
        return;
    };
    let mut session = shared.lock().await;
    let result = session.night_action(user_id, target_id);
    deliver_intent(state, &session, user_id, result).await;
}

pub async fn handle_day_vote(state: &AppState, user_id: UserId, target_id: Option<UserId>) {
    let Some(shared) = session_of(state, user_id).await else {
        debug!("day vote from user {} without a session", user_id);
        return;
    };
    let mut session = shared.lock().await;
    let result = session.day_vote(user_id, target_id);
    deliver_intent(state, &session, user_id, result).await;
}

async fn deliver_intent(
    state: &AppState,
    session: &GameSession,
    user_id: UserId,
    result: Result<Vec<Envelope>, IntentError>,
) {
    match result {
        Ok(envelopes) => state.router.dispatch(session.room_id(), envelopes).await,
        Err(IntentError::Rejected(rejection)) => {
            debug!(
                "room {}: vote from {} rejected: {}",
                session.room_id(),
                user_id,
                rejection
            );
            state
                .router
                .send(
                    user_id,
                    ServerMessage::VoteFailed {
                        reason: rejection.to_string(),
                    },
                )
                .await
        }
        Err(err @ IntentError::UnknownPlayer(_)) => {
            debug!("room {}: {}", session.room_id(), err)
        }
    }
}

pub async fn send_chat(state: &AppState, user_id: UserId, text: String) {
    let Some(shared) = session_of(state, user_id).await else {
        debug!("chat from user {} without a session", user_id);
        return;
    };
    let session = shared.lock().await;
    let envelopes = session.chat(user_id, text);
    state.router.dispatch(session.room_id(), envelopes).await;
}

/// 現在の状態を再送する。セッションには何も書き込まない。
pub async fn restore_state(state: &AppState, user_id: UserId) {
    let Some(shared) = session_of(state, user_id).await else {
        debug!("nothing to restore for user {}", user_id);
        return;
    };
    let session = shared.lock().await;
    if let Some(envelopes) = session.replay(user_id) {
        state.router.dispatch(session.room_id(), envelopes).await;
    }
}

async fn session_of(state: &AppState, user_id: UserId) -> Option<SharedSession> {
    let room_id = state.router.room_of(user_id).await?;
    state.sessions.get(&room_id).await
}

/// 遷移結果を送信し、次の期限タスクを登録する（決着していれば破棄）
async fn drive(state: &AppState, shared: &SharedSession, session: &mut GameSession, step: Step) {
    state.router.dispatch(session.room_id(), step.envelopes).await;
    match step.next {
        NextStep::Schedule {
            after,
            action,
            countdown,
        } => arm(state, shared, session, after, action, countdown),
        NextStep::GameOver(winner) => destroy(state, shared, session, Some(winner)).await,
    }
}

fn arm(
    state: &AppState,
    shared: &SharedSession,
    session: &mut GameSession,
    after: Duration,
    action: TimerAction,
    countdown: bool,
) {
    let epoch = session.timer_epoch();
    let weak = Arc::downgrade(shared);

    if countdown {
        let state = state.clone();
        let weak = weak.clone();
        session
            .scheduler
            .start_countdown(state.config.tick_interval, move || {
                on_countdown(state.clone(), weak.clone(), epoch)
            });
    } else {
        session.scheduler.stop_countdown();
    }
    session
        .scheduler
        .schedule_deadline(after, on_deadline(state.clone(), weak, epoch, action));
}

fn on_deadline(
    state: AppState,
    weak: Weak<Mutex<GameSession>>,
    epoch: u64,
    action: TimerAction,
) -> BoxFuture<'static, ()> {
    async move {
        let Some(shared) = weak.upgrade() else {
            debug!("{:?} fired after the session was dropped", action);
            return;
        };
        let mut session = shared.lock().await;
        if !session.accepts_timer(epoch, action) {
            debug!(
                "room {}: stale {:?} ignored (phase {})",
                session.room_id(),
                action,
                session.phase()
            );
            return;
        }
        session.scheduler.release_fired_deadline();
        let step = session.fire(action);
        drive(&state, &shared, &mut session, step).await;
    }
    .boxed()
}

fn on_countdown(
    state: AppState,
    weak: Weak<Mutex<GameSession>>,
    epoch: u64,
) -> BoxFuture<'static, ()> {
    async move {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let session = shared.lock().await;
        if let Some(message) = session.countdown_tick(epoch) {
            state.router.broadcast_room(session.room_id(), message).await;
        }
    }
    .boxed()
}

/// セッションを終了させてレジストリから外す。何度呼んでもよい。
async fn destroy(
    state: &AppState,
    shared: &SharedSession,
    session: &mut GameSession,
    winner: Option<Winner>,
) {
    let envelopes = session.finish(winner);
    let room_id = session.room_id().to_string();
    state.router.dispatch(&room_id, envelopes).await;

    if !state.sessions.remove(&room_id, shared).await {
        debug!("room {}: session already destroyed", room_id);
        return;
    }
    for player in session.players() {
        if state.router.room_of(player.user_id).await.as_deref() == Some(room_id.as_str()) {
            state.router.leave_room(player.user_id).await;
        }
    }
    info!("room {}: session destroyed", room_id);
    state.lobby.on_game_end(&room_id, winner);
}
