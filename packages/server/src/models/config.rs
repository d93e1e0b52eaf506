use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DebugConfig {
    pub enabled: bool,
    pub verbose_logging: bool,
    // HTTPのスナップショットに役職を含めるかどうか
    pub show_player_roles: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        let debug_mode = cfg!(debug_assertions) || env::var("DEBUG_MODE").is_ok();

        Self {
            enabled: debug_mode,
            verbose_logging: debug_mode,
            show_player_roles: false,
        }
    }
}

impl DebugConfig {
    pub fn from_env() -> Self {
        let enabled = env_flag("DEBUG_ENABLED").unwrap_or(cfg!(debug_assertions));
        let verbose_logging = env_flag("DEBUG_VERBOSE_LOGGING").unwrap_or(enabled);
        let show_player_roles = env_flag("DEBUG_SHOW_PLAYER_ROLES").unwrap_or(false);

        Self {
            enabled,
            verbose_logging,
            show_player_roles,
        }
    }
}

/// フェーズの長さなどゲーム進行のタイミング
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    pub day_duration: Duration,
    pub vote_duration: Duration,
    pub night_duration: Duration,
    // 残り時間通知の間隔
    pub tick_interval: Duration,
    // 投票結果の表示から夜までの待ち時間
    pub day_results_delay: Duration,
    // 夜の結果から次の昼までの待ち時間
    pub night_results_delay: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            day_duration: Duration::from_secs(20),
            vote_duration: Duration::from_secs(20),
            night_duration: Duration::from_secs(30),
            tick_interval: Duration::from_millis(5000),
            day_results_delay: Duration::from_millis(5000),
            night_results_delay: Duration::from_millis(4000),
        }
    }
}

impl GameConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            day_duration: env_secs("DAY_DURATION_SECONDS").unwrap_or(defaults.day_duration),
            vote_duration: env_secs("VOTE_DURATION_SECONDS").unwrap_or(defaults.vote_duration),
            night_duration: env_secs("NIGHT_DURATION_SECONDS")
                .unwrap_or(defaults.night_duration),
            // 間隔 0 では通知タスクが作れない
            tick_interval: env_millis("PHASE_TICK_MILLIS")
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.tick_interval),
            day_results_delay: env_millis("DAY_RESULTS_DELAY_MILLIS")
                .unwrap_or(defaults.day_results_delay),
            night_results_delay: env_millis("NIGHT_RESULTS_DELAY_MILLIS")
                .unwrap_or(defaults.night_results_delay),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub cors_origin: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            addr: env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key).ok().map(|v| v == "true")
}

fn env_secs(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn env_millis(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}
