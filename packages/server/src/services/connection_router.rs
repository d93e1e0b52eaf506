use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::debug;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::models::{
    message::{Audience, Envelope, ServerMessage},
    player::UserId,
};

pub type RoomId = String;
pub type ConnectionId = Uuid;
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

struct Endpoint {
    connection_id: ConnectionId,
    tx: Outbox,
}

#[derive(Default)]
struct RouterInner {
    endpoints: HashMap<UserId, Endpoint>,
    members: HashMap<RoomId, HashSet<UserId>>,
    room_of: HashMap<UserId, RoomId>,
}

/// ユーザーID -> 接続先 の索引と、ルームへの所属。
///
/// 送信はすべてベストエフォートで、接続がなければ黙って捨てる（再送・キューイングはしない）。
#[derive(Clone, Default)]
pub struct ConnectionRouter {
    inner: Arc<RwLock<RouterInner>>,
}

impl ConnectionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接続を登録する。同じユーザーの古い接続は置き換えられる。
    pub async fn connect(&self, user_id: UserId, tx: Outbox) -> ConnectionId {
        let connection_id = Uuid::new_v4();
        let mut inner = self.inner.write().await;
        inner
            .endpoints
            .insert(user_id, Endpoint { connection_id, tx });
        connection_id
    }

    /// 自分が登録した接続のときだけ削除する（再接続後の古いソケットの切断で消さないため）
    pub async fn disconnect(&self, user_id: UserId, connection_id: ConnectionId) {
        let mut inner = self.inner.write().await;
        if inner
            .endpoints
            .get(&user_id)
            .is_some_and(|e| e.connection_id == connection_id)
        {
            inner.endpoints.remove(&user_id);
        }
    }

    pub async fn join_room(&self, user_id: UserId, room_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(previous) = inner.room_of.insert(user_id, room_id.to_string()) {
            if let Some(members) = inner.members.get_mut(&previous) {
                members.remove(&user_id);
            }
        }
        inner
            .members
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id);
    }

    pub async fn leave_room(&self, user_id: UserId) {
        let mut inner = self.inner.write().await;
        let Some(room_id) = inner.room_of.remove(&user_id) else {
            return;
        };
        if let Some(members) = inner.members.get_mut(&room_id) {
            members.remove(&user_id);
            if members.is_empty() {
                inner.members.remove(&room_id);
            }
        }
    }

    pub async fn room_of(&self, user_id: UserId) -> Option<RoomId> {
        self.inner.read().await.room_of.get(&user_id).cloned()
    }

    pub async fn is_connected(&self, user_id: UserId) -> bool {
        self.inner.read().await.endpoints.contains_key(&user_id)
    }

    pub async fn send(&self, user_id: UserId, message: ServerMessage) {
        let inner = self.inner.read().await;
        deliver(&inner, user_id, message);
    }

    pub async fn broadcast_room(&self, room_id: &str, message: ServerMessage) {
        let inner = self.inner.read().await;
        let Some(members) = inner.members.get(room_id) else {
            return;
        };
        for user_id in members {
            deliver(&inner, *user_id, message.clone());
        }
    }

    /// セッションが生成したメッセージを順番どおりに配送する
    pub async fn dispatch(&self, room_id: &str, envelopes: Vec<Envelope>) {
        if envelopes.is_empty() {
            return;
        }
        let inner = self.inner.read().await;
        let members = inner.members.get(room_id);
        for envelope in envelopes {
            match envelope.to {
                Audience::User(user_id) => deliver(&inner, user_id, envelope.message),
                Audience::Room => {
                    for user_id in members.into_iter().flatten() {
                        deliver(&inner, *user_id, envelope.message.clone());
                    }
                }
            }
        }
    }
}

fn deliver(inner: &RouterInner, user_id: UserId, message: ServerMessage) {
    match inner.endpoints.get(&user_id) {
        Some(endpoint) => {
            if endpoint.tx.send(message).is_err() {
                debug!("endpoint for user {} already closed", user_id);
            }
        }
        None => debug!("user {} has no live endpoint, dropping message", user_id),
    }
}
