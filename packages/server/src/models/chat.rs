use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::player::{PlayerSummary, UserId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatChannel {
    Public, // 生存者全員（昼）
    Mafia,  // マフィアのみ（夜）
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub message_id: String,
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_id: u32,
    pub text: String,
    pub channel: ChatChannel,
    pub time: String,
}

impl ChatMessage {
    pub fn new(sender: PlayerSummary, text: String, channel: ChatChannel) -> Self {
        Self::at(sender, text, channel, Local::now())
    }

    pub fn at(
        sender: PlayerSummary,
        text: String,
        channel: ChatChannel,
        sent_at: DateTime<Local>,
    ) -> Self {
        ChatMessage {
            message_id: uuid::Uuid::new_v4().to_string(),
            user_id: sender.user_id,
            display_name: sender.display_name,
            avatar_id: sender.avatar_id,
            text,
            channel,
            time: sent_at.format("%H:%M").to_string(),
        }
    }
}
