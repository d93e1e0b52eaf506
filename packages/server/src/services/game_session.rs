use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::time::Instant;

use crate::models::{
    chat::{ChatChannel, ChatMessage},
    config::GameConfig,
    game::{
        unique_plurality, GamePhase, GameSnapshot, SnapshotPlayer, VoteCategory, VoteLedgers,
        Winner,
    },
    message::{Envelope, ServerMessage, VoteRecord},
    player::{FinalPlayer, PlayerState, PlayerSummary, TalliedPlayer, UserId, VisiblePlayer},
    role::Role,
};

use super::connection_router::RoomId;
use super::game_service::GameError;
use super::night_resolver;
use super::scheduler::PhaseScheduler;
use super::vote_validator::{self, VoteRejection};
use super::win_evaluator;

/// 期限タスクが発火したときに行う処理
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    EndDay,
    EndVote,
    EndNight,
    BeginNight, // 投票結果の表示後
    BeginDay,   // 夜の結果の表示後
}

impl TimerAction {
    /// 発火時にセッションがいるはずのフェーズ
    pub fn expected_phase(self) -> GamePhase {
        match self {
            TimerAction::EndDay => GamePhase::Day,
            TimerAction::EndVote | TimerAction::BeginNight => GamePhase::Vote,
            TimerAction::EndNight | TimerAction::BeginDay => GamePhase::Night,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Schedule {
        after: Duration,
        action: TimerAction,
        countdown: bool,
    },
    GameOver(Winner),
}

/// 遷移の結果：送るメッセージと次にやること
#[derive(Debug)]
pub struct Step {
    pub envelopes: Vec<Envelope>,
    pub next: NextStep,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum IntentError {
    #[error("user {0} is not part of this game")]
    UnknownPlayer(UserId),
    #[error(transparent)]
    Rejected(#[from] VoteRejection),
}

/// ルームごとのゲーム本体
#[derive(Debug)]
pub struct GameSession {
    room_id: RoomId,
    phase: GamePhase,
    day_number: u32,
    players: Vec<PlayerState>,
    ledgers: VoteLedgers,
    day_blocked: BTreeSet<UserId>, // 沈黙させられたプレイヤー（その日のみ）
    departed: BTreeSet<UserId>,
    phase_deadline: Option<Instant>,
    timer_epoch: u64,
    config: GameConfig,
    pub(crate) scheduler: PhaseScheduler,
}

impl GameSession {
    /// 役職を割り当ててセッションを作る。マフィアを先に決め、残りに役職プールを配る。
    pub fn create<R: Rng + ?Sized>(
        room_id: &str,
        roster: Vec<PlayerSummary>,
        role_pool: &[Role],
        mafia_count: usize,
        min_players: usize,
        config: GameConfig,
        rng: &mut R,
    ) -> Result<Self, GameError> {
        if roster.len() < min_players {
            return Err(GameError::NotEnoughPlayers {
                have: roster.len(),
                need: min_players,
            });
        }
        if mafia_count == 0 || mafia_count >= roster.len() {
            return Err(GameError::InvalidSetup(format!(
                "mafia count {} does not fit {} players",
                mafia_count,
                roster.len()
            )));
        }
        if role_pool.contains(&Role::Mafia) {
            return Err(GameError::InvalidSetup(
                "mafia is assigned through the mafia count, not the role pool".to_string(),
            ));
        }
        let peaceful_seats = roster.len() - mafia_count;
        if role_pool.len() > peaceful_seats {
            return Err(GameError::InvalidSetup(format!(
                "too many peaceful roles: at most {} allowed",
                peaceful_seats
            )));
        }
        let unique: BTreeSet<UserId> = roster.iter().map(|p| p.user_id).collect();
        if unique.len() != roster.len() {
            return Err(GameError::InvalidSetup("duplicate user id in roster".to_string()));
        }

        let mut seats: Vec<usize> = (0..roster.len()).collect();
        seats.shuffle(rng);
        let mut pool = role_pool.to_vec();
        pool.shuffle(rng);

        let mut roles = vec![Role::Citizen; roster.len()];
        for (order, seat) in seats.into_iter().enumerate() {
            roles[seat] = if order < mafia_count {
                Role::Mafia
            } else {
                pool.get(order - mafia_count).copied().unwrap_or(Role::Citizen)
            };
        }

        Ok(Self::with_roles(
            room_id,
            roster.into_iter().zip(roles).collect(),
            config,
        ))
    }

    /// 役職が決まっているプレイヤーでセッションを作る（1日目の昼から）
    pub fn with_roles(room_id: &str, players: Vec<(PlayerSummary, Role)>, config: GameConfig) -> Self {
        GameSession {
            room_id: room_id.to_string(),
            phase: GamePhase::Day,
            day_number: 1,
            players: players
                .into_iter()
                .map(|(summary, role)| PlayerState::new(summary, role))
                .collect(),
            ledgers: VoteLedgers::default(),
            day_blocked: BTreeSet::new(),
            departed: BTreeSet::new(),
            phase_deadline: None,
            timer_epoch: 0,
            config,
            scheduler: PhaseScheduler::new(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn day_number(&self) -> u32 {
        self.day_number
    }

    pub fn players(&self) -> &[PlayerState] {
        &self.players
    }

    pub fn player(&self, user_id: UserId) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.user_id == user_id)
    }

    pub fn ledgers(&self) -> &VoteLedgers {
        &self.ledgers
    }

    pub fn is_silenced(&self, user_id: UserId) -> bool {
        self.day_blocked.contains(&user_id)
    }

    pub fn timer_epoch(&self) -> u64 {
        self.timer_epoch
    }

    /// フェーズの残り時間中だけ投票・行動を受け付ける（結果表示中は不可）
    pub fn accepts_actions(&self) -> bool {
        !self.is_finished() && self.phase_deadline.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.phase == GamePhase::Finished
    }

    pub fn seconds_left(&self) -> Option<u64> {
        let remaining = self
            .phase_deadline?
            .saturating_duration_since(Instant::now());
        Some(remaining.as_millis().div_ceil(1000) as u64)
    }

    pub fn mafia_roster(&self) -> Vec<UserId> {
        self.players
            .iter()
            .filter(|p| p.role.is_mafia())
            .map(|p| p.user_id)
            .collect()
    }

    /// ゲーム開始：各自に役職を知らせ、1日目の昼に入る
    pub fn start(&mut self) -> Step {
        info!(
            "room {}: game started with {} players",
            self.room_id,
            self.players.len()
        );
        let mut envelopes: Vec<Envelope> = self
            .players
            .iter()
            .map(|p| Envelope::user(p.user_id, self.role_message(p)))
            .collect();
        let mut step = self.enter_day();
        envelopes.append(&mut step.envelopes);
        step.envelopes = envelopes;
        step
    }

    /// 期限タスクがまだ有効か。古いタスクやフェーズが変わった後のタスクは無視する。
    pub fn accepts_timer(&self, epoch: u64, action: TimerAction) -> bool {
        !self.is_finished() && self.timer_epoch == epoch && self.phase == action.expected_phase()
    }

    pub fn fire(&mut self, action: TimerAction) -> Step {
        match action {
            TimerAction::EndDay => self.end_day(),
            TimerAction::EndVote => self.end_vote(),
            TimerAction::EndNight => self.end_night(),
            TimerAction::BeginNight => self.enter_night(),
            TimerAction::BeginDay => {
                self.day_number += 1;
                self.enter_day()
            }
        }
    }

    /// 残り時間通知。古い通知タスクからの呼び出しなら `None`。
    pub fn countdown_tick(&self, epoch: u64) -> Option<ServerMessage> {
        if self.is_finished() || self.timer_epoch != epoch {
            return None;
        }
        self.phase_timer()
    }

    fn phase_timer(&self) -> Option<ServerMessage> {
        Some(ServerMessage::PhaseTimer {
            phase: self.phase,
            seconds_left: self.seconds_left()?,
        })
    }

    fn begin_phase(&mut self, phase: GamePhase, duration: Duration) -> Vec<Envelope> {
        debug!(
            "room {}: {} -> {} (day {})",
            self.room_id, self.phase, phase, self.day_number
        );
        self.phase = phase;
        self.timer_epoch += 1;
        self.phase_deadline = Some(Instant::now() + duration);

        let mut envelopes = vec![Envelope::room(ServerMessage::PhaseUpdate {
            phase,
            duration: duration.as_secs(),
        })];
        envelopes.extend(self.phase_timer().map(Envelope::room));
        envelopes
    }

    /// 結果表示などフェーズの残り時間がない待ち状態に入る
    fn end_phase(&mut self) {
        self.timer_epoch += 1;
        self.phase_deadline = None;
    }

    fn enter_day(&mut self) -> Step {
        // day_blocked は前夜の沈黙の結果なのでここでは消さない
        self.ledgers.clear(VoteCategory::Day);
        let duration = self.config.day_duration;
        let mut envelopes = self.begin_phase(GamePhase::Day, duration);
        envelopes.extend(self.day_players_lists());
        Step {
            envelopes,
            next: NextStep::Schedule {
                after: duration,
                action: TimerAction::EndDay,
                countdown: true,
            },
        }
    }

    fn end_day(&mut self) -> Step {
        // 1日目は投票なし
        if self.day_number > 1 {
            self.enter_vote()
        } else {
            self.enter_night()
        }
    }

    fn enter_vote(&mut self) -> Step {
        self.ledgers.clear(VoteCategory::Day);
        let duration = self.config.vote_duration;
        let envelopes = self.begin_phase(GamePhase::Vote, duration);
        Step {
            envelopes,
            next: NextStep::Schedule {
                after: duration,
                action: TimerAction::EndVote,
                countdown: true,
            },
        }
    }

    fn end_vote(&mut self) -> Step {
        self.end_phase();

        let mut counts: BTreeMap<UserId, u32> = BTreeMap::new();
        for (_, target_id) in self.ledgers.entries(VoteCategory::Day) {
            if self.player(target_id).is_some_and(|p| p.is_alive) {
                *counts.entry(target_id).or_insert(0) += 1;
            }
        }

        let votes: Vec<VoteRecord> = self
            .ledgers
            .entries(VoteCategory::Day)
            .filter_map(|(from_id, to_id)| {
                let from = self.player(from_id).filter(|p| p.is_alive)?;
                let to = self.player(to_id)?;
                Some(VoteRecord {
                    from: from.summary(),
                    to: to.summary(),
                })
            })
            .collect();

        // 同数トップなら誰も処刑されない
        let killed = unique_plurality(&counts).and_then(|id| {
            let player = self.player_state_mut(id)?;
            player.is_alive = false;
            Some(player.revealed())
        });
        if let Some(killed) = &killed {
            info!(
                "room {}: day {} vote eliminated {}",
                self.room_id, self.day_number, killed.player.user_id
            );
        }

        let mut envelopes = self.day_players_lists();
        envelopes.push(Envelope::room(ServerMessage::DayEndSummary { votes, killed }));
        self.ledgers.clear(VoteCategory::Day);

        self.conclude(
            envelopes,
            self.config.day_results_delay,
            TimerAction::BeginNight,
        )
    }

    fn enter_night(&mut self) -> Step {
        self.ledgers.clear_night();
        let duration = self.config.night_duration;
        let mut envelopes = self.begin_phase(GamePhase::Night, duration);
        envelopes.extend(
            self.players
                .iter()
                .filter_map(|p| self.night_prompt(p).map(|m| Envelope::user(p.user_id, m))),
        );
        Step {
            envelopes,
            next: NextStep::Schedule {
                after: duration,
                action: TimerAction::EndNight,
                countdown: true,
            },
        }
    }

    fn end_night(&mut self) -> Step {
        self.end_phase();

        let outcome = night_resolver::resolve(&mut self.players, &self.ledgers);
        info!(
            "room {}: night {} resolved with {} deaths",
            self.room_id,
            self.day_number,
            outcome.deaths.len()
        );

        let mut envelopes: Vec<Envelope> = outcome
            .detective_reports
            .into_iter()
            .map(|(detective_id, target)| {
                Envelope::user(detective_id, ServerMessage::DetectiveResult { target })
            })
            .collect();
        envelopes.push(Envelope::room(ServerMessage::NightEndSummary {
            deaths: outcome.deaths,
            healed: outcome.healed,
            blocked: outcome.blocked,
        }));
        self.day_blocked = outcome.silenced;
        self.ledgers.clear_night();

        self.conclude(
            envelopes,
            self.config.night_results_delay,
            TimerAction::BeginDay,
        )
    }

    /// 勝敗判定をして、決着していなければ次のフェーズを予約する
    fn conclude(&mut self, mut envelopes: Vec<Envelope>, delay: Duration, next: TimerAction) -> Step {
        match win_evaluator::evaluate(&self.players) {
            Some(winner) => {
                envelopes.extend(self.finish(Some(winner)));
                Step {
                    envelopes,
                    next: NextStep::GameOver(winner),
                }
            }
            None => Step {
                envelopes,
                next: NextStep::Schedule {
                    after: delay,
                    action: next,
                    countdown: false,
                },
            },
        }
    }

    /// ゲームを終了させる。二回目以降は何もしない。
    pub fn finish(&mut self, winner: Option<Winner>) -> Vec<Envelope> {
        if self.is_finished() {
            return Vec::new();
        }
        self.phase = GamePhase::Finished;
        self.timer_epoch += 1;
        self.phase_deadline = None;
        self.scheduler.cancel();

        match winner {
            Some(winner) => {
                info!("room {}: {} win", self.room_id, winner);
                vec![Envelope::room(ServerMessage::GameOver {
                    winner,
                    players: self.players.iter().map(FinalPlayer::from).collect(),
                })]
            }
            None => {
                info!("room {}: game aborted", self.room_id);
                Vec::new()
            }
        }
    }

    pub fn night_action(
        &mut self,
        user_id: UserId,
        target_id: Option<UserId>,
    ) -> Result<Vec<Envelope>, IntentError> {
        let role = self
            .player(user_id)
            .ok_or(IntentError::UnknownPlayer(user_id))?
            .role;
        let category = role.night_category().ok_or(VoteRejection::NoNightAction)?;
        self.submit(user_id, target_id, category)
    }

    pub fn day_vote(
        &mut self,
        user_id: UserId,
        target_id: Option<UserId>,
    ) -> Result<Vec<Envelope>, IntentError> {
        self.submit(user_id, target_id, VoteCategory::Day)
    }

    /// 検証して台帳に記録し、そのカテゴリを見られるプレイヤーに集計を送る
    pub fn submit(
        &mut self,
        voter_id: UserId,
        target_id: Option<UserId>,
        category: VoteCategory,
    ) -> Result<Vec<Envelope>, IntentError> {
        let voter = self
            .player(voter_id)
            .ok_or(IntentError::UnknownPlayer(voter_id))?;
        vote_validator::validate(self, voter, target_id, category)?;

        let target_id = target_id.ok_or(VoteRejection::InvalidTarget)?;
        if !self.ledgers.record(category, voter_id, target_id) {
            return Err(VoteRejection::AlreadyVoted.into());
        }
        debug!(
            "room {}: {:?} vote {} -> {}",
            self.room_id, category, voter_id, target_id
        );
        Ok(self.vote_state(category))
    }

    fn vote_state(&self, category: VoteCategory) -> Vec<Envelope> {
        let counts = self.ledgers.tally(category);
        self.players
            .iter()
            .filter(|viewer| viewer.role.sees_category(category))
            .map(|viewer| {
                let players = self
                    .players
                    .iter()
                    .filter(|p| p.is_alive)
                    .map(|p| TalliedPlayer {
                        player: p.summary(),
                        votes: counts.get(&p.user_id).copied().unwrap_or(0),
                        is_mafia_visible: viewer.role.is_mafia() && p.role.is_mafia(),
                    })
                    .collect();
                Envelope::user(
                    viewer.user_id,
                    ServerMessage::VoteStateUpdate { category, players },
                )
            })
            .collect()
    }

    fn alive_view(&self, viewer: Role) -> Vec<VisiblePlayer> {
        self.players
            .iter()
            .filter(|p| p.is_alive)
            .map(|p| p.visible_to(viewer))
            .collect()
    }

    fn day_players_list(&self, viewer: &PlayerState) -> ServerMessage {
        ServerMessage::DayPlayersList {
            day: self.day_number,
            players: self.alive_view(viewer.role),
            stats: win_evaluator::faction_stats(&self.players),
        }
    }

    fn day_players_lists(&self) -> Vec<Envelope> {
        self.players
            .iter()
            .map(|p| Envelope::user(p.user_id, self.day_players_list(p)))
            .collect()
    }

    fn night_prompt(&self, player: &PlayerState) -> Option<ServerMessage> {
        if self.phase != GamePhase::Night
            || !self.accepts_actions()
            || !player.is_alive
            || !player.role.is_night_capable()
        {
            return None;
        }
        Some(ServerMessage::NightActionStart {
            role: player.role,
            duration: self.config.night_duration.as_secs(),
            players: self.alive_view(player.role),
        })
    }

    fn role_message(&self, player: &PlayerState) -> ServerMessage {
        ServerMessage::YourRole {
            role: player.role,
            mafia_roster: player.role.is_mafia().then(|| self.mafia_roster()),
        }
    }

    fn phase_duration(&self) -> Duration {
        match self.phase {
            GamePhase::Night => self.config.night_duration,
            GamePhase::Vote => self.config.vote_duration,
            GamePhase::Day | GamePhase::Finished => self.config.day_duration,
        }
    }

    /// 再接続時の状態再送。セッションの状態は変えない。
    pub fn replay(&self, user_id: UserId) -> Option<Vec<Envelope>> {
        if self.is_finished() {
            return None;
        }
        let player = self.player(user_id)?;

        let mut messages = vec![
            self.role_message(player),
            ServerMessage::PhaseUpdate {
                phase: self.phase,
                duration: self.phase_duration().as_secs(),
            },
            self.day_players_list(player),
        ];
        messages.extend(self.night_prompt(player));
        messages.extend(self.phase_timer());

        Some(
            messages
                .into_iter()
                .map(|m| Envelope::user(user_id, m))
                .collect(),
        )
    }

    /// チャットの宛先を決める。夜はマフィア同士のみ、昼は生存者全員。
    pub fn chat(&self, user_id: UserId, text: String) -> Vec<Envelope> {
        let Some(sender) = self.player(user_id).filter(|p| p.is_alive) else {
            return Vec::new();
        };
        let channel = match self.phase {
            GamePhase::Night if sender.role.is_mafia() => ChatChannel::Mafia,
            GamePhase::Night | GamePhase::Finished => return Vec::new(),
            GamePhase::Day | GamePhase::Vote => ChatChannel::Public,
        };

        let message = ChatMessage::new(sender.summary(), text, channel);
        self.players
            .iter()
            .filter(|p| p.is_alive && (channel == ChatChannel::Public || p.role.is_mafia()))
            .map(|p| Envelope::user(p.user_id, ServerMessage::ChatMessage(message.clone())))
            .collect()
    }

    /// 退出を記録する。全員いなくなったら `true`。
    pub fn mark_departed(&mut self, user_id: UserId) -> bool {
        if self.player(user_id).is_some() {
            self.departed.insert(user_id);
        }
        self.players
            .iter()
            .all(|p| self.departed.contains(&p.user_id))
    }

    pub fn snapshot(&self, show_roles: bool) -> GameSnapshot {
        GameSnapshot {
            room_id: self.room_id.clone(),
            phase: self.phase,
            day_number: self.day_number,
            seconds_left: self.seconds_left(),
            players: self
                .players
                .iter()
                .map(|p| SnapshotPlayer {
                    user_id: p.user_id,
                    display_name: p.display_name.clone(),
                    avatar_id: p.avatar_id,
                    is_alive: p.is_alive,
                    role: show_roles.then_some(p.role),
                })
                .collect(),
            stats: win_evaluator::faction_stats(&self.players),
        }
    }

    fn player_state_mut(&mut self, user_id: UserId) -> Option<&mut PlayerState> {
        self.players.iter_mut().find(|p| p.user_id == user_id)
    }
}

#[cfg(test)]
impl GameSession {
    pub(crate) fn force_phase(&mut self, phase: GamePhase) {
        self.phase = phase;
        self.phase_deadline = Some(Instant::now() + self.phase_duration());
    }

    pub(crate) fn player_mut(&mut self, user_id: UserId) -> Option<&mut PlayerState> {
        self.player_state_mut(user_id)
    }

    pub(crate) fn ledgers_mut(&mut self) -> &mut VoteLedgers {
        &mut self.ledgers
    }

    pub(crate) fn set_silenced(&mut self, users: impl IntoIterator<Item = UserId>) {
        self.day_blocked = users.into_iter().collect();
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::session_with_roles;
    use super::*;
    use crate::models::message::Audience;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn roster(n: u64) -> Vec<PlayerSummary> {
        (1..=n)
            .map(|id| PlayerSummary {
                user_id: id,
                display_name: format!("Player{}", id),
                avatar_id: 1,
            })
            .collect()
    }

    fn seven_player_session() -> GameSession {
        // 1,2: マフィア 3: 医者 4: 探偵 5-7: 市民
        session_with_roles(&[
            Role::Mafia,
            Role::Mafia,
            Role::Healer,
            Role::Detective,
            Role::Citizen,
            Role::Citizen,
            Role::Citizen,
        ])
    }

    fn messages_for(envelopes: &[Envelope], user_id: UserId) -> Vec<&ServerMessage> {
        envelopes
            .iter()
            .filter(|e| e.to == Audience::User(user_id))
            .map(|e| &e.message)
            .collect()
    }

    fn room_messages(envelopes: &[Envelope]) -> Vec<&ServerMessage> {
        envelopes
            .iter()
            .filter(|e| e.to == Audience::Room)
            .map(|e| &e.message)
            .collect()
    }

    fn night_summary(envelopes: &[Envelope]) -> &ServerMessage {
        room_messages(envelopes)
            .into_iter()
            .find(|m| matches!(m, ServerMessage::NightEndSummary { .. }))
            .expect("night summary")
    }

    #[test]
    fn create_assigns_mafia_count_and_pool() {
        let mut rng = StdRng::seed_from_u64(7);
        let session = GameSession::create(
            "room",
            roster(7),
            &[Role::Healer, Role::Detective],
            2,
            5,
            GameConfig::default(),
            &mut rng,
        )
        .unwrap();

        let count = |role: Role| session.players().iter().filter(|p| p.role == role).count();
        assert_eq!(count(Role::Mafia), 2);
        assert_eq!(count(Role::Healer), 1);
        assert_eq!(count(Role::Detective), 1);
        assert_eq!(count(Role::Citizen), 3);
        assert_eq!(session.phase(), GamePhase::Day);
        assert_eq!(session.day_number(), 1);
        // 名簿の順序は保たれる
        let ids: Vec<UserId> = session.players().iter().map(|p| p.user_id).collect();
        assert_eq!(ids, (1..=7).collect::<Vec<_>>());
    }

    #[test]
    fn create_rejects_bad_setups() {
        let mut rng = StdRng::seed_from_u64(1);
        let config = GameConfig::default;
        assert_eq!(
            GameSession::create("r", roster(4), &[], 1, 5, config(), &mut rng).unwrap_err(),
            GameError::NotEnoughPlayers { have: 4, need: 5 }
        );
        assert!(matches!(
            GameSession::create("r", roster(5), &[], 5, 5, config(), &mut rng),
            Err(GameError::InvalidSetup(_))
        ));
        assert!(matches!(
            GameSession::create(
                "r",
                roster(5),
                &[Role::Healer, Role::Detective, Role::Blocker, Role::Bodyguard],
                2,
                5,
                config(),
                &mut rng
            ),
            Err(GameError::InvalidSetup(_))
        ));
        let mut duplicated = roster(5);
        duplicated[4].user_id = 1;
        assert!(matches!(
            GameSession::create("r", duplicated, &[], 1, 5, config(), &mut rng),
            Err(GameError::InvalidSetup(_))
        ));
    }

    #[test]
    fn start_sends_roles_and_enters_day() {
        let mut session = seven_player_session();
        let step = session.start();

        assert_eq!(
            messages_for(&step.envelopes, 1)[0],
            &ServerMessage::YourRole {
                role: Role::Mafia,
                mafia_roster: Some(vec![1, 2]),
            }
        );
        assert_eq!(
            messages_for(&step.envelopes, 3)[0],
            &ServerMessage::YourRole {
                role: Role::Healer,
                mafia_roster: None,
            }
        );
        assert!(matches!(
            room_messages(&step.envelopes)[0],
            ServerMessage::PhaseUpdate {
                phase: GamePhase::Day,
                duration: 20
            }
        ));
        assert_eq!(
            step.next,
            NextStep::Schedule {
                after: Duration::from_secs(20),
                action: TimerAction::EndDay,
                countdown: true,
            }
        );
    }

    #[test]
    fn day_players_list_flags_mafia_only_for_mafia() {
        let mut session = seven_player_session();
        let step = session.start();

        let mafia_view = messages_for(&step.envelopes, 1);
        let ServerMessage::DayPlayersList { players, stats, .. } = mafia_view[1] else {
            panic!("unexpected message: {:?}", mafia_view[1]);
        };
        assert!(players.iter().find(|p| p.player.user_id == 2).unwrap().is_mafia_visible);
        assert_eq!(stats.alive_mafia, 2);
        assert_eq!(stats.alive_peaceful, 5);

        let citizen_view = messages_for(&step.envelopes, 5);
        let ServerMessage::DayPlayersList { players, .. } = citizen_view[1] else {
            panic!("unexpected message: {:?}", citizen_view[1]);
        };
        assert!(players.iter().all(|p| !p.is_mafia_visible));
    }

    #[test]
    fn first_day_skips_vote() {
        let mut session = seven_player_session();
        session.start();
        let step = session.fire(TimerAction::EndDay);
        assert_eq!(session.phase(), GamePhase::Night);
        assert!(matches!(
            step.next,
            NextStep::Schedule {
                action: TimerAction::EndNight,
                ..
            }
        ));
    }

    #[test]
    fn later_days_go_through_vote() {
        let mut session = seven_player_session();
        session.start();
        session.fire(TimerAction::EndDay);
        session.fire(TimerAction::EndNight);
        session.fire(TimerAction::BeginDay);
        assert_eq!(session.day_number(), 2);
        assert_eq!(session.phase(), GamePhase::Day);

        session.fire(TimerAction::EndDay);
        assert_eq!(session.phase(), GamePhase::Vote);
        let step = session.fire(TimerAction::EndVote);
        assert!(matches!(
            step.next,
            NextStep::Schedule {
                action: TimerAction::BeginNight,
                countdown: false,
                ..
            }
        ));
        session.fire(TimerAction::BeginNight);
        assert_eq!(session.phase(), GamePhase::Night);
    }

    #[test]
    fn night_prompts_only_living_night_roles() {
        let mut session = seven_player_session();
        session.start();
        session.player_mut(4).unwrap().is_alive = false;
        let step = session.fire(TimerAction::EndDay);

        let prompted: BTreeSet<UserId> = step
            .envelopes
            .iter()
            .filter(|e| matches!(e.message, ServerMessage::NightActionStart { .. }))
            .filter_map(|e| match e.to {
                Audience::User(id) => Some(id),
                Audience::Room => None,
            })
            .collect();
        assert_eq!(prompted, BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn mafia_kill_with_mismatched_heal() {
        let mut session = seven_player_session();
        session.start();
        session.fire(TimerAction::EndDay);

        session.night_action(1, Some(5)).unwrap();
        session.night_action(2, Some(5)).unwrap();
        session.night_action(3, Some(6)).unwrap();
        let step = session.fire(TimerAction::EndNight);

        let ServerMessage::NightEndSummary { deaths, healed, .. } = night_summary(&step.envelopes)
        else {
            unreachable!();
        };
        assert_eq!(deaths.len(), 1);
        assert_eq!(deaths[0].player.user_id, 5);
        assert_eq!(deaths[0].role, Role::Citizen);
        assert_eq!(healed, &None);
        assert!(!session.player(5).unwrap().is_alive);
    }

    #[test]
    fn heal_on_attack_target_saves() {
        let mut session = seven_player_session();
        session.start();
        session.fire(TimerAction::EndDay);

        session.night_action(1, Some(5)).unwrap();
        session.night_action(3, Some(5)).unwrap();
        let step = session.fire(TimerAction::EndNight);

        let ServerMessage::NightEndSummary { deaths, healed, .. } = night_summary(&step.envelopes)
        else {
            unreachable!();
        };
        assert!(deaths.is_empty());
        assert_eq!(healed.as_ref().map(|p| p.user_id), Some(5));
        assert!(session.player(5).unwrap().is_alive);
    }

    #[test]
    fn vote_tally_is_scoped_to_category() {
        let mut session = seven_player_session();
        session.start();
        session.fire(TimerAction::EndDay);

        let envelopes = session.night_action(1, Some(5)).unwrap();
        let recipients: Vec<_> = envelopes.iter().map(|e| e.to.clone()).collect();
        assert_eq!(recipients, vec![Audience::User(1), Audience::User(2)]);

        let ServerMessage::VoteStateUpdate { category, players } = &envelopes[0].message else {
            panic!("unexpected message: {:?}", envelopes[0].message);
        };
        assert_eq!(*category, VoteCategory::Mafia);
        assert_eq!(players.iter().find(|p| p.player.user_id == 5).unwrap().votes, 1);
    }

    #[test]
    fn second_submission_keeps_first() {
        let mut session = seven_player_session();
        session.start();
        session.fire(TimerAction::EndDay);

        session.night_action(1, Some(5)).unwrap();
        assert_eq!(
            session.night_action(1, Some(6)),
            Err(IntentError::Rejected(VoteRejection::AlreadyVoted))
        );
        assert_eq!(session.ledgers().target_of(VoteCategory::Mafia, 1), Some(5));
    }

    #[test]
    fn citizen_has_no_night_action_and_strangers_are_stale() {
        let mut session = seven_player_session();
        session.start();
        session.fire(TimerAction::EndDay);
        assert_eq!(
            session.night_action(5, Some(6)),
            Err(IntentError::Rejected(VoteRejection::NoNightAction))
        );
        assert_eq!(
            session.night_action(42, Some(6)),
            Err(IntentError::UnknownPlayer(42))
        );
    }

    #[test]
    fn day_vote_eliminates_unique_leader() {
        let mut session = seven_player_session();
        session.force_phase(GamePhase::Vote);
        session.day_vote(3, Some(1)).unwrap();
        session.day_vote(4, Some(1)).unwrap();
        session.day_vote(5, Some(6)).unwrap();
        let step = session.fire(TimerAction::EndVote);

        let summary = room_messages(&step.envelopes)
            .into_iter()
            .find(|m| matches!(m, ServerMessage::DayEndSummary { .. }))
            .unwrap();
        let ServerMessage::DayEndSummary { votes, killed } = summary else {
            unreachable!();
        };
        assert_eq!(votes.len(), 3);
        assert_eq!(killed.as_ref().map(|k| (k.player.user_id, k.role)), Some((1, Role::Mafia)));
        assert!(!session.player(1).unwrap().is_alive);
    }

    #[test]
    fn day_vote_tie_eliminates_nobody() {
        let mut session = seven_player_session();
        session.force_phase(GamePhase::Vote);
        session.day_vote(3, Some(1)).unwrap();
        session.day_vote(4, Some(6)).unwrap();
        let step = session.fire(TimerAction::EndVote);

        assert!(room_messages(&step.envelopes).into_iter().any(|m| matches!(
            m,
            ServerMessage::DayEndSummary { killed: None, .. }
        )));
        assert!(session.players().iter().all(|p| p.is_alive));
    }

    #[test]
    fn silenced_player_cannot_vote_next_day() {
        let mut session = session_with_roles(&[
            Role::Mafia,
            Role::Silencer,
            Role::Citizen,
            Role::Citizen,
            Role::Citizen,
        ]);
        session.start();
        session.fire(TimerAction::EndDay);
        session.night_action(2, Some(3)).unwrap();
        session.fire(TimerAction::EndNight);
        session.fire(TimerAction::BeginDay);
        session.fire(TimerAction::EndDay);
        assert_eq!(session.phase(), GamePhase::Vote);

        assert_eq!(
            session.day_vote(3, Some(1)),
            Err(IntentError::Rejected(VoteRejection::Silenced))
        );
        assert!(session.day_vote(4, Some(1)).is_ok());
    }

    #[test]
    fn mafia_parity_ends_game() {
        let mut session = session_with_roles(&[
            Role::Mafia,
            Role::Citizen,
            Role::Citizen,
        ]);
        session.start();
        session.fire(TimerAction::EndDay);
        session.night_action(1, Some(2)).unwrap();
        let step = session.fire(TimerAction::EndNight);

        assert_eq!(step.next, NextStep::GameOver(Winner::Mafia));
        assert!(session.is_finished());
        let ServerMessage::GameOver { winner, players } = room_messages(&step.envelopes)
            .into_iter()
            .last()
            .unwrap()
        else {
            panic!("game over expected");
        };
        assert_eq!(*winner, Winner::Mafia);
        assert_eq!(players.len(), 3);
        assert!(players.iter().any(|p| p.role == Role::Mafia && p.is_alive));
    }

    #[test]
    fn stale_timers_are_refused() {
        let mut session = seven_player_session();
        session.start();
        let epoch = session.timer_epoch();
        assert!(session.accepts_timer(epoch, TimerAction::EndDay));
        assert!(!session.accepts_timer(epoch, TimerAction::EndNight));

        session.fire(TimerAction::EndDay);
        assert!(!session.accepts_timer(epoch, TimerAction::EndDay));
        assert!(session.countdown_tick(epoch).is_none());

        let epoch = session.timer_epoch();
        session.finish(None);
        assert!(!session.accepts_timer(epoch, TimerAction::EndNight));
        assert!(session.finish(None).is_empty());
    }

    #[test]
    fn replay_restores_night_prompt_without_results() {
        let mut session = seven_player_session();
        session.start();
        session.fire(TimerAction::EndDay);
        session.night_action(4, Some(1)).unwrap();

        let before = session.ledgers().target_of(VoteCategory::Detective, 4);
        let replay = session.replay(4).unwrap();
        let kinds: Vec<&ServerMessage> = replay.iter().map(|e| &e.message).collect();

        assert!(matches!(kinds[0], ServerMessage::YourRole { role: Role::Detective, .. }));
        assert!(matches!(kinds[1], ServerMessage::PhaseUpdate { phase: GamePhase::Night, .. }));
        assert!(matches!(kinds[2], ServerMessage::DayPlayersList { .. }));
        assert!(matches!(kinds[3], ServerMessage::NightActionStart { role: Role::Detective, .. }));
        assert!(!kinds
            .iter()
            .any(|m| matches!(m, ServerMessage::DetectiveResult { .. })));
        assert_eq!(session.ledgers().target_of(VoteCategory::Detective, 4), before);
        assert!(session.replay(99).is_none());
    }

    #[test]
    fn chat_is_scoped_by_phase() {
        let mut session = seven_player_session();
        session.start();
        assert_eq!(session.chat(5, "hi".to_string()).len(), 7);

        session.fire(TimerAction::EndDay);
        assert!(session.chat(5, "psst".to_string()).is_empty());
        let mafia_chat = session.chat(1, "tonight".to_string());
        let recipients: Vec<_> = mafia_chat.iter().map(|e| e.to.clone()).collect();
        assert_eq!(recipients, vec![Audience::User(1), Audience::User(2)]);

        session.player_mut(2).unwrap().is_alive = false;
        assert!(session.chat(2, "boo".to_string()).is_empty());
    }

    #[test]
    fn results_delay_refuses_actions_and_prompts() {
        let mut session = seven_player_session();
        session.start();
        session.fire(TimerAction::EndDay);
        session.fire(TimerAction::EndNight);
        assert_eq!(session.phase(), GamePhase::Night);
        assert!(!session.accepts_actions());

        assert_eq!(
            session.night_action(1, Some(5)),
            Err(IntentError::Rejected(VoteRejection::WrongPhase))
        );
        assert!(session.ledgers().entries(VoteCategory::Mafia).next().is_none());
        let replay = session.replay(1).unwrap();
        assert!(!replay
            .iter()
            .any(|e| matches!(e.message, ServerMessage::NightActionStart { .. })));

        session.fire(TimerAction::BeginDay);
        session.fire(TimerAction::EndDay);
        session.fire(TimerAction::EndVote);
        assert_eq!(session.phase(), GamePhase::Vote);
        assert_eq!(
            session.day_vote(3, Some(1)),
            Err(IntentError::Rejected(VoteRejection::WrongPhase))
        );
    }

    #[test]
    fn departure_of_everyone_is_detected() {
        let mut session = session_with_roles(&[Role::Mafia, Role::Citizen]);
        assert!(!session.mark_departed(1));
        assert!(!session.mark_departed(99));
        assert!(session.mark_departed(2));
    }
}
