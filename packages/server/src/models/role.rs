use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::game::VoteCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Mafia,     // マフィア
    Citizen,   // 市民（夜の行動なし）
    Healer,    // 医者
    Detective, // 探偵
    Blocker,   // 夜の行動を封じる
    Bodyguard, // ボディガード
    Marksman,  // 狙撃手（一度だけ撃てる）
    Silencer,  // 翌日の投票権を奪う
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    Mafia,
    Peaceful,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Mafia,
        Role::Citizen,
        Role::Healer,
        Role::Detective,
        Role::Blocker,
        Role::Bodyguard,
        Role::Marksman,
        Role::Silencer,
    ];

    pub fn faction(self) -> Faction {
        match self {
            Role::Mafia => Faction::Mafia,
            _ => Faction::Peaceful,
        }
    }

    pub fn is_mafia(self) -> bool {
        self.faction() == Faction::Mafia
    }

    /// 夜に使う投票カテゴリ。市民は `None`。
    pub fn night_category(self) -> Option<VoteCategory> {
        match self {
            Role::Mafia => Some(VoteCategory::Mafia),
            Role::Citizen => None,
            Role::Healer => Some(VoteCategory::Healer),
            Role::Detective => Some(VoteCategory::Detective),
            Role::Blocker => Some(VoteCategory::Blocker),
            Role::Bodyguard => Some(VoteCategory::Bodyguard),
            Role::Marksman => Some(VoteCategory::Marksman),
            Role::Silencer => Some(VoteCategory::Silencer),
        }
    }

    pub fn is_night_capable(self) -> bool {
        self.night_category().is_some()
    }

    /// 集計を見られるかどうか（自分の役職と一致するカテゴリのみ）
    pub fn sees_category(self, category: VoteCategory) -> bool {
        match category {
            VoteCategory::Day => true,
            other => self.night_category() == Some(other),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Mafia => "mafia",
            Role::Citizen => "citizen",
            Role::Healer => "healer",
            Role::Detective => "detective",
            Role::Blocker => "blocker",
            Role::Bodyguard => "bodyguard",
            Role::Marksman => "marksman",
            Role::Silencer => "silencer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == name)
            .ok_or(UnknownRole(s.to_string()))
    }
}
