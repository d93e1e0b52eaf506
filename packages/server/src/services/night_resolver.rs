use std::collections::{BTreeMap, BTreeSet};

use crate::models::{
    game::{unique_plurality, VoteCategory, VoteLedgers},
    player::{PlayerState, PlayerSummary, RevealedPlayer, UserId},
    role::Role,
};

/// 一晩の解決結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NightOutcome {
    // 実際に死亡したプレイヤー（役職公開）
    pub deaths: Vec<RevealedPlayer>,
    // 治療が実際に命を救った場合のみ（役職は含めない）
    pub healed: Option<PlayerSummary>,
    pub blocked: Option<PlayerSummary>,
    // 探偵ID -> 調べた相手
    pub detective_reports: Vec<(UserId, RevealedPlayer)>,
    // 翌日投票できないプレイヤー
    pub silenced: BTreeSet<UserId>,
}

/// 夜の行動を決められた順序で解決し、死亡をその場でプレイヤーに反映する。
///
/// 順序: 狙撃手 → マフィア → 探偵 → ブロッカー/沈黙 → 医者の記録 → 治療の判定
pub fn resolve(players: &mut [PlayerState], ledgers: &VoteLedgers) -> NightOutcome {
    let block_target = ledgers.first_target(VoteCategory::Blocker);
    let is_blocked = |user_id: UserId| block_target == Some(user_id);

    let mut outcome = NightOutcome::default();

    // 狙撃手
    let mut marksman_attack = None;
    if let Some((shooter_id, target_id)) = ledgers.entries(VoteCategory::Marksman).next() {
        let shooter_ready = find(players, shooter_id)
            .is_some_and(|p| p.is_alive && p.role == Role::Marksman && !p.has_shot)
            && !is_blocked(shooter_id);
        let target_role = find(players, target_id)
            .filter(|p| p.is_alive)
            .map(|p| p.role);

        if let (true, Some(target_role)) = (shooter_ready, target_role) {
            if let Some(shooter) = find_mut(players, shooter_id) {
                shooter.has_shot = true;
            }
            marksman_attack = Some(target_id);

            if let Some(guard_id) = guard_on(players, ledgers, target_id) {
                // 護衛されている相手を撃つと護衛と狙撃手の両方が死ぬ
                kill(players, guard_id, &mut outcome.deaths);
                kill(players, shooter_id, &mut outcome.deaths);
            } else if healed_by(players, ledgers, target_id, &is_blocked) {
                // 治療により無効
            } else {
                kill(players, target_id, &mut outcome.deaths);
                if !target_role.is_mafia() {
                    kill(players, shooter_id, &mut outcome.deaths);
                }
            }
        }
    }

    // マフィア
    let mut mafia_attack = None;
    let mafia_can_act = players
        .iter()
        .any(|p| p.is_alive && p.role.is_mafia() && !is_blocked(p.user_id));
    if mafia_can_act {
        let mut counts: BTreeMap<UserId, u32> = BTreeMap::new();
        for (voter_id, target_id) in ledgers.entries(VoteCategory::Mafia) {
            let counts_vote = find(players, voter_id)
                .is_some_and(|p| p.is_alive && p.role.is_mafia())
                && !is_blocked(voter_id);
            if counts_vote {
                *counts.entry(target_id).or_insert(0) += 1;
            }
        }
        mafia_attack = unique_plurality(&counts);

        let live_target = match mafia_attack {
            Some(id) if find(players, id).is_some_and(|p| p.is_alive) => Some(id),
            _ => None,
        };
        if let Some(target_id) = live_target {
            if let Some(guard_id) = guard_on(players, ledgers, target_id) {
                kill(players, guard_id, &mut outcome.deaths);
            } else if healed_by(players, ledgers, target_id, &is_blocked) {
                // 治療により無効
            } else {
                kill(players, target_id, &mut outcome.deaths);
            }
        }
    }

    // 探偵（本人にのみ結果を届ける）
    for (detective_id, target_id) in ledgers.entries(VoteCategory::Detective) {
        let can_act = find(players, detective_id)
            .is_some_and(|p| p.is_alive && p.role == Role::Detective)
            && !is_blocked(detective_id);
        if !can_act {
            continue;
        }
        if let Some(target) = find(players, target_id) {
            outcome
                .detective_reports
                .push((detective_id, target.revealed()));
        }
    }

    // ブロッカーと沈黙の後処理
    for player in players.iter_mut() {
        if player.role == Role::Blocker && player.is_alive {
            player.last_block_target = ledgers.target_of(VoteCategory::Blocker, player.user_id);
        }
    }
    // ブロックされた・死亡した沈黙役の行動は無効
    let active_silencers: BTreeSet<UserId> = players
        .iter()
        .filter(|p| p.is_alive && p.role == Role::Silencer && !is_blocked(p.user_id))
        .map(|p| p.user_id)
        .collect();
    outcome.silenced = ledgers
        .entries(VoteCategory::Silencer)
        .filter(|(silencer_id, _)| active_silencers.contains(silencer_id))
        .map(|(_, target_id)| target_id)
        .collect();

    // 医者の連続自己治療の記録（結果に関係なく）
    for player in players.iter_mut() {
        if player.role == Role::Healer && player.is_alive {
            player.last_self_heal =
                ledgers.target_of(VoteCategory::Healer, player.user_id) == Some(player.user_id);
        }
    }

    let players: &[PlayerState] = players;

    // 実際に攻撃を防いだ治療だけを報告する
    let healed_id = ledgers
        .entries(VoteCategory::Healer)
        .filter(|(healer_id, _)| !is_blocked(*healer_id))
        .map(|(_, target_id)| target_id)
        .find(|target_id| {
            (marksman_attack == Some(*target_id) || mafia_attack == Some(*target_id))
                && outcome.deaths.iter().all(|d| d.player.user_id != *target_id)
        });
    outcome.healed = healed_id.and_then(|id| find(players, id)).map(|p| p.summary());
    outcome.blocked = block_target
        .and_then(|id| find(players, id))
        .map(|p| p.summary());

    outcome
}

fn find(players: &[PlayerState], user_id: UserId) -> Option<&PlayerState> {
    players.iter().find(|p| p.user_id == user_id)
}

fn find_mut(players: &mut [PlayerState], user_id: UserId) -> Option<&mut PlayerState> {
    players.iter_mut().find(|p| p.user_id == user_id)
}

/// `target_id` を護衛している生存中のボディガード
fn guard_on(players: &[PlayerState], ledgers: &VoteLedgers, target_id: UserId) -> Option<UserId> {
    ledgers
        .entries(VoteCategory::Bodyguard)
        .filter(|(_, guarded)| *guarded == target_id)
        .map(|(guard_id, _)| guard_id)
        .find(|guard_id| {
            find(players, *guard_id).is_some_and(|p| p.is_alive && p.role == Role::Bodyguard)
        })
}

fn healed_by(
    players: &[PlayerState],
    ledgers: &VoteLedgers,
    target_id: UserId,
    is_blocked: &impl Fn(UserId) -> bool,
) -> bool {
    ledgers
        .entries(VoteCategory::Healer)
        .filter(|(_, healed)| *healed == target_id)
        .any(|(healer_id, _)| {
            !is_blocked(healer_id)
                && find(players, healer_id).is_some_and(|p| p.is_alive && p.role == Role::Healer)
        })
}

fn kill(players: &mut [PlayerState], user_id: UserId, deaths: &mut Vec<RevealedPlayer>) {
    if let Some(player) = find_mut(players, user_id).filter(|p| p.is_alive) {
        player.is_alive = false;
        deaths.push(player.revealed());
    }
}
