use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// セッションごとの期限タスクと残り時間通知タスク。
///
/// 新しいタスクを登録すると古いタスクは必ず中断される。中断は即座に効くとは限らないので、
/// コールバック側でもセッションの状態を確認すること。
#[derive(Debug, Default)]
pub struct PhaseScheduler {
    deadline: Option<JoinHandle<()>>,
    countdown: Option<JoinHandle<()>>,
}

impl PhaseScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// `after` 経過後に `on_deadline` を一度だけ実行する
    pub fn schedule_deadline<F>(&mut self, after: Duration, on_deadline: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel_deadline();
        self.deadline = Some(tokio::spawn(async move {
            time::sleep(after).await;
            on_deadline.await;
        }));
    }

    /// `period` ごとに `on_tick` を実行する。最初の通知は呼び出し側で即時に送る前提なので、
    /// ここでの最初の実行は `period` 後になる。
    pub fn start_countdown<F, Fut>(&mut self, period: Duration, mut on_tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop_countdown();
        if period.is_zero() {
            warn!("countdown period is zero; no ticks will be sent");
            return;
        }
        self.countdown = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                on_tick().await;
            }
        }));
    }

    pub fn stop_countdown(&mut self) {
        if let Some(handle) = self.countdown.take() {
            handle.abort();
        }
    }

    pub fn cancel_deadline(&mut self) {
        if let Some(handle) = self.deadline.take() {
            handle.abort();
        }
    }

    /// 実行中の期限タスク自身から呼ぶ。自分を中断しないようにハンドルだけ手放す。
    pub fn release_fired_deadline(&mut self) {
        self.deadline.take();
    }

    pub fn cancel(&mut self) {
        self.cancel_deadline();
        self.stop_countdown();
    }

    pub fn has_pending(&self) -> bool {
        self.deadline.as_ref().is_some_and(|h| !h.is_finished())
            || self.countdown.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for PhaseScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
