use serde::{Deserialize, Serialize};

use super::role::Role;

pub type UserId = u64;

/// ロビーから渡されるプレイヤー情報
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_id: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_id: u32,
    pub role: Role,
    pub is_alive: bool,
    pub has_shot: bool,                   // 狙撃手の一回限りのフラグ
    pub last_self_heal: bool,             // 医者が前夜に自分を治療したか
    pub last_block_target: Option<UserId>, // ブロッカーの前夜の対象
}

impl PlayerState {
    pub fn new(summary: PlayerSummary, role: Role) -> Self {
        Self {
            user_id: summary.user_id,
            display_name: summary.display_name,
            avatar_id: summary.avatar_id,
            role,
            is_alive: true,
            has_shot: false,
            last_self_heal: false,
            last_block_target: None,
        }
    }

    pub fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            user_id: self.user_id,
            display_name: self.display_name.clone(),
            avatar_id: self.avatar_id,
        }
    }

    /// 死亡時は役職が公開される
    pub fn revealed(&self) -> RevealedPlayer {
        RevealedPlayer {
            player: self.summary(),
            role: self.role,
        }
    }

    /// `viewer` から見た表示。マフィア同士のみ互いのマフィアフラグが見える。
    pub fn visible_to(&self, viewer: Role) -> VisiblePlayer {
        VisiblePlayer {
            player: self.summary(),
            is_mafia_visible: viewer.is_mafia() && self.role.is_mafia(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisiblePlayer {
    #[serde(flatten)]
    pub player: PlayerSummary,
    pub is_mafia_visible: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealedPlayer {
    #[serde(flatten)]
    pub player: PlayerSummary,
    pub role: Role,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TalliedPlayer {
    #[serde(flatten)]
    pub player: PlayerSummary,
    pub votes: u32,
    pub is_mafia_visible: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalPlayer {
    #[serde(flatten)]
    pub player: PlayerSummary,
    pub role: Role,
    pub is_alive: bool,
}

impl From<&PlayerState> for FinalPlayer {
    fn from(state: &PlayerState) -> Self {
        FinalPlayer {
            player: state.summary(),
            role: state.role,
            is_alive: state.is_alive,
        }
    }
}
