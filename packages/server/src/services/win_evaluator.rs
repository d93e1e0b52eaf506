use crate::models::{
    game::{FactionStats, Winner},
    player::PlayerState,
};

pub fn faction_stats(players: &[PlayerState]) -> FactionStats {
    let mut stats = FactionStats::default();
    for player in players {
        match (player.role.is_mafia(), player.is_alive) {
            (true, true) => stats.alive_mafia += 1,
            (true, false) => stats.dead_mafia += 1,
            (false, true) => stats.alive_peaceful += 1,
            (false, false) => stats.dead_peaceful += 1,
        }
    }
    stats
}

/// 勝敗判定。決着がついていなければ `None`。
pub fn evaluate(players: &[PlayerState]) -> Option<Winner> {
    let stats = faction_stats(players);
    let total_alive = stats.alive_mafia + stats.alive_peaceful;

    if stats.alive_mafia == 0 && total_alive > 0 {
        return Some(Winner::Peaceful);
    }
    if stats.alive_mafia > 0 && stats.alive_mafia >= stats.alive_peaceful {
        return Some(Winner::Mafia);
    }
    None
}
