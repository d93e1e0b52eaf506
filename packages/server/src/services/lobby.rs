use log::info;

use crate::models::game::Winner;

/// ルーム・ロビー側への通知口。ゲーム終了時にルームを待機状態へ戻すのはロビー側の責務。
pub trait LobbyHooks: Send + Sync {
    /// 勝敗が決まらずに終わった場合（全員退出・強制終了）は `winner` が `None`
    fn on_game_end(&self, room_id: &str, winner: Option<Winner>);
}

/// ログに残すだけのデフォルト実装
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingLobby;

impl LobbyHooks for LoggingLobby {
    fn on_game_end(&self, room_id: &str, winner: Option<Winner>) {
        match winner {
            Some(winner) => info!("room {}: game ended, {} won", room_id, winner),
            None => info!("room {}: game ended without a winner", room_id),
        }
    }
}
