use std::collections::HashMap;
use std::sync::Arc;

use log::info;
use tokio::sync::Mutex;

use super::connection_router::RoomId;
use super::game_service::GameError;
use super::game_session::GameSession;

pub type SharedSession = Arc<Mutex<GameSession>>;

/// ルームID -> 進行中のセッション
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<RoomId, SharedSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// ルームにセッションを登録する。既にあれば `AlreadyStarted`。
    pub async fn insert(&self, session: GameSession) -> Result<SharedSession, GameError> {
        let mut sessions = self.sessions.lock().await;
        let room_id = session.room_id().to_string();
        if sessions.contains_key(&room_id) {
            return Err(GameError::AlreadyStarted);
        }
        let shared = Arc::new(Mutex::new(session));
        sessions.insert(room_id.clone(), shared.clone());
        info!("room {}: session created", room_id);
        Ok(shared)
    }

    pub async fn get(&self, room_id: &str) -> Option<SharedSession> {
        self.sessions.lock().await.get(room_id).cloned()
    }

    pub async fn contains(&self, room_id: &str) -> bool {
        self.sessions.lock().await.contains_key(room_id)
    }

    /// 登録されているのが `session` 自身のときだけ削除する。二回目以降は `false`。
    pub async fn remove(&self, room_id: &str, session: &SharedSession) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(room_id) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(room_id);
                true
            }
            _ => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::Role;
    use crate::services::game_session::test_support::session_with_roles;

    #[tokio::test]
    async fn second_session_for_room_is_rejected() {
        let registry = SessionRegistry::new();
        registry
            .insert(session_with_roles(&[Role::Mafia, Role::Citizen]))
            .await
            .unwrap();
        let err = registry
            .insert(session_with_roles(&[Role::Mafia, Role::Citizen]))
            .await
            .unwrap_err();
        assert_eq!(err, GameError::AlreadyStarted);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent_and_identity_checked() {
        let registry = SessionRegistry::new();
        let first = registry
            .insert(session_with_roles(&[Role::Mafia, Role::Citizen]))
            .await
            .unwrap();
        assert!(registry.remove("test_room", &first).await);
        assert!(!registry.remove("test_room", &first).await);

        let second = registry
            .insert(session_with_roles(&[Role::Mafia, Role::Citizen]))
            .await
            .unwrap();
        // 古いセッションの後始末で新しいセッションを消さない
        assert!(!registry.remove("test_room", &first).await);
        assert!(registry.contains("test_room").await);
        assert!(registry.remove("test_room", &second).await);
        assert!(registry.is_empty().await);
    }
}
