use serde::{Deserialize, Serialize};

use super::chat::ChatMessage;
use super::game::{FactionStats, GamePhase, VoteCategory, Winner};
use super::player::{
    FinalPlayer, PlayerSummary, RevealedPlayer, TalliedPlayer, UserId, VisiblePlayer,
};
use super::role::Role;

/// サーバーからクライアントへの通知
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    PhaseUpdate {
        phase: GamePhase,
        duration: u64,
    },
    PhaseTimer {
        phase: GamePhase,
        seconds_left: u64,
    },
    DayPlayersList {
        day: u32,
        players: Vec<VisiblePlayer>,
        stats: FactionStats,
    },
    NightActionStart {
        role: Role,
        duration: u64,
        players: Vec<VisiblePlayer>,
    },
    VoteStateUpdate {
        category: VoteCategory,
        players: Vec<TalliedPlayer>,
    },
    VoteFailed {
        reason: String,
    },
    DayEndSummary {
        votes: Vec<VoteRecord>,
        killed: Option<RevealedPlayer>,
    },
    NightEndSummary {
        deaths: Vec<RevealedPlayer>,
        healed: Option<PlayerSummary>,
        blocked: Option<PlayerSummary>,
    },
    YourRole {
        role: Role,
        #[serde(skip_serializing_if = "Option::is_none")]
        mafia_roster: Option<Vec<UserId>>,
    },
    DetectiveResult {
        target: RevealedPlayer,
    },
    GameOver {
        winner: Winner,
        players: Vec<FinalPlayer>,
    },
    ChatMessage(ChatMessage),
    Error {
        message: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub from: PlayerSummary,
    pub to: PlayerSummary,
}

/// クライアントからの入力
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    NightAction {
        #[serde(default)]
        target_id: serde_json::Value,
    },
    DayVote {
        #[serde(default)]
        target_id: serde_json::Value,
    },
    SendChat {
        text: String,
    },
    RestoreState,
}

/// 対象IDは数値でも数値文字列でもよい。それ以外は `None`。
pub fn parse_target_id(raw: &serde_json::Value) -> Option<UserId> {
    match raw {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Audience {
    User(UserId),
    Room,
}

/// セッションが生成した送信予定のメッセージ
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub to: Audience,
    pub message: ServerMessage,
}

impl Envelope {
    pub fn user(user_id: UserId, message: ServerMessage) -> Self {
        Envelope {
            to: Audience::User(user_id),
            message,
        }
    }

    pub fn room(message: ServerMessage) -> Self {
        Envelope {
            to: Audience::Room,
            message,
        }
    }
}
