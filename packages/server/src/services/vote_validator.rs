use crate::models::{
    game::VoteCategory,
    player::{PlayerState, UserId},
};

use super::game_session::GameSession;

/// 投票・夜の行動が拒否された理由。`Display` がそのまま `vote_failed` の理由になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VoteRejection {
    #[error("invalid target")]
    InvalidTarget,
    #[error("dead players cannot act")]
    VoterDead,
    #[error("target not alive")]
    TargetNotAlive,
    #[error("wrong phase")]
    WrongPhase,
    #[error("silenced")]
    Silenced,
    #[error("already voted")]
    AlreadyVoted,
    #[error("cannot heal yourself two nights in a row")]
    ConsecutiveSelfHeal,
    #[error("cannot block yourself")]
    SelfBlock,
    #[error("cannot block the same player two nights in a row")]
    RepeatBlock,
    #[error("cannot guard yourself")]
    SelfGuard,
    #[error("shot already used")]
    ShotUsed,
    #[error("cannot vote for yourself")]
    SelfVote,
    #[error("mafia cannot target mafia")]
    MafiaOnMafia,
    #[error("cannot check yourself")]
    SelfCheck,
    #[error("no night action")]
    NoNightAction,
}

/// 投票の可否を判定する。上から順に評価し、最初に当たった理由で拒否する。
pub fn validate(
    session: &GameSession,
    voter: &PlayerState,
    target_id: Option<UserId>,
    category: VoteCategory,
) -> Result<(), VoteRejection> {
    let target_id = target_id.ok_or(VoteRejection::InvalidTarget)?;

    if !voter.is_alive {
        return Err(VoteRejection::VoterDead);
    }

    let target = session
        .player(target_id)
        .filter(|p| p.is_alive)
        .ok_or(VoteRejection::TargetNotAlive)?;

    if session.phase() != category.phase() || !session.accepts_actions() {
        return Err(VoteRejection::WrongPhase);
    }

    // 沈黙させられたプレイヤーはその日の投票に参加できない
    if category == VoteCategory::Day && session.is_silenced(voter.user_id) {
        return Err(VoteRejection::Silenced);
    }

    if session.ledgers().has_voted(category, voter.user_id) {
        return Err(VoteRejection::AlreadyVoted);
    }

    let is_self = voter.user_id == target.user_id;

    // 役職ごとの例外（自己投票の一般禁止より先に評価する）
    match category {
        VoteCategory::Healer => {
            if is_self && voter.last_self_heal {
                return Err(VoteRejection::ConsecutiveSelfHeal);
            }
            // 医者は自分を治療できる
            return Ok(());
        }
        VoteCategory::Blocker => {
            if is_self {
                return Err(VoteRejection::SelfBlock);
            }
            if voter.last_block_target == Some(target.user_id) {
                return Err(VoteRejection::RepeatBlock);
            }
        }
        VoteCategory::Bodyguard if is_self => return Err(VoteRejection::SelfGuard),
        VoteCategory::Marksman if voter.has_shot => return Err(VoteRejection::ShotUsed),
        _ => {}
    }

    if is_self {
        return Err(VoteRejection::SelfVote);
    }

    if category == VoteCategory::Mafia && voter.role.is_mafia() && target.role.is_mafia() {
        return Err(VoteRejection::MafiaOnMafia);
    }

    if category == VoteCategory::Detective && is_self {
        return Err(VoteRejection::SelfCheck);
    }

    Ok(())
}
