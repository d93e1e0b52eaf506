use std::collections::BTreeMap;
use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize};

use super::player::{PlayerSummary, UserId};
use super::role::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Day,      // 議論フェーズ
    Vote,     // 投票フェーズ（2日目以降）
    Night,    // 夜フェーズ
    Finished, // ゲーム終了
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GamePhase::Day => write!(f, "day"),
            GamePhase::Vote => write!(f, "vote"),
            GamePhase::Night => write!(f, "night"),
            GamePhase::Finished => write!(f, "finished"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteCategory {
    Day,
    Mafia,
    Healer,
    Detective,
    Blocker,
    Bodyguard,
    Marksman,
    Silencer,
}

impl VoteCategory {
    pub const NIGHT: [VoteCategory; 7] = [
        VoteCategory::Mafia,
        VoteCategory::Healer,
        VoteCategory::Detective,
        VoteCategory::Blocker,
        VoteCategory::Bodyguard,
        VoteCategory::Marksman,
        VoteCategory::Silencer,
    ];

    /// このカテゴリの投票が受け付けられるフェーズ
    pub fn phase(self) -> GamePhase {
        match self {
            VoteCategory::Day => GamePhase::Vote,
            _ => GamePhase::Night,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Mafia,    // マフィア陣営勝利
    Peaceful, // 市民陣営勝利
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Mafia => write!(f, "mafia"),
            Winner::Peaceful => write!(f, "peaceful"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactionStats {
    pub alive_mafia: u32,
    pub dead_mafia: u32,
    pub alive_peaceful: u32,
    pub dead_peaceful: u32,
}

/// カテゴリごとの投票台帳（投票者 -> 対象）。
/// `BTreeMap` なので同じ台帳からは常に同じ順序で取り出される。
#[derive(Clone, Debug, Default)]
pub struct VoteLedgers {
    ledgers: BTreeMap<VoteCategory, BTreeMap<UserId, UserId>>,
}

impl VoteLedgers {
    pub fn target_of(&self, category: VoteCategory, voter: UserId) -> Option<UserId> {
        self.ledgers.get(&category)?.get(&voter).copied()
    }

    pub fn has_voted(&self, category: VoteCategory, voter: UserId) -> bool {
        self.target_of(category, voter).is_some()
    }

    /// 既に投票済みなら上書きせずに `false` を返す
    pub fn record(&mut self, category: VoteCategory, voter: UserId, target: UserId) -> bool {
        let ledger = self.ledgers.entry(category).or_default();
        if ledger.contains_key(&voter) {
            return false;
        }
        ledger.insert(voter, target);
        true
    }

    pub fn entries(&self, category: VoteCategory) -> impl Iterator<Item = (UserId, UserId)> + '_ {
        self.ledgers
            .get(&category)
            .into_iter()
            .flat_map(|ledger| ledger.iter().map(|(voter, target)| (*voter, *target)))
    }

    pub fn first_target(&self, category: VoteCategory) -> Option<UserId> {
        self.entries(category).next().map(|(_, target)| target)
    }

    pub fn tally(&self, category: VoteCategory) -> BTreeMap<UserId, u32> {
        let mut counts = BTreeMap::new();
        for (_, target) in self.entries(category) {
            *counts.entry(target).or_insert(0) += 1;
        }
        counts
    }

    pub fn clear(&mut self, category: VoteCategory) {
        self.ledgers.remove(&category);
    }

    pub fn clear_night(&mut self) {
        for category in VoteCategory::NIGHT {
            self.clear(category);
        }
    }
}

/// 票数が単独最多の対象。同数トップ、または票がなければ `None`。
pub fn unique_plurality(counts: &BTreeMap<UserId, u32>) -> Option<UserId> {
    let max = counts.values().copied().max().filter(|max| *max > 0)?;
    let mut leaders = counts.iter().filter(|(_, votes)| **votes == max);
    let (leader, _) = leaders.next()?;
    if leaders.next().is_some() {
        return None;
    }
    Some(*leader)
}

/// HTTP で返すセッションのスナップショット
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub room_id: String,
    pub phase: GamePhase,
    pub day_number: u32,
    pub seconds_left: Option<u64>,
    pub players: Vec<SnapshotPlayer>,
    pub stats: FactionStats,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPlayer {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_id: u32,
    pub is_alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// ロビーから渡されるゲーム開始リクエスト
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameRequest {
    pub roster: Vec<PlayerSummary>,
    #[serde(default, deserialize_with = "deserialize_role_pool")]
    pub role_pool: Vec<Role>,
    pub mafia_count: usize,
    pub min_players: usize,
}

/// ロビーの役職名は大文字小文字を区別しない
fn deserialize_role_pool<'de, D>(deserializer: D) -> Result<Vec<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<String>::deserialize(deserializer)?
        .iter()
        .map(|name| name.parse().map_err(de::Error::custom))
        .collect()
}
