use std::sync::Arc;

use crate::models::config::{DebugConfig, GameConfig};
use crate::services::{
    connection_router::ConnectionRouter,
    lobby::{LobbyHooks, LoggingLobby},
    session_registry::SessionRegistry,
};

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    pub router: ConnectionRouter,
    pub config: Arc<GameConfig>,
    pub debug_config: Arc<DebugConfig>,
    pub lobby: Arc<dyn LobbyHooks>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_config(GameConfig::default(), DebugConfig::default())
    }

    pub fn from_env() -> Self {
        Self::with_config(GameConfig::from_env(), DebugConfig::from_env())
    }

    pub fn with_config(config: GameConfig, debug_config: DebugConfig) -> Self {
        AppState {
            sessions: SessionRegistry::new(),
            router: ConnectionRouter::new(),
            config: Arc::new(config),
            debug_config: Arc::new(debug_config),
            lobby: Arc::new(LoggingLobby),
        }
    }

    /// ゲーム終了の通知先を差し替える
    pub fn with_lobby(mut self, lobby: Arc<dyn LobbyHooks>) -> Self {
        self.lobby = lobby;
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
