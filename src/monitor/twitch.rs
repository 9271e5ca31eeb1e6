//! Twitch配信状態のウォッチャー

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{error, info, warn};

use crate::api::twitch::{TwitchClient, TwitchError};
use crate::config::TwitchConfig;
use crate::models::twitch::TwitchStatusResponse;
use crate::models::Platform;
use crate::monitor::{random_interval, BroadcastEnded, LiveStateTable};
use crate::store::roster::{RosterStore, StreamerInfo};

pub struct TwitchMonitor {
    config: TwitchConfig,
    client: Arc<TwitchClient>,
    roster: Arc<RosterStore>,
    states: Arc<LiveStateTable<TwitchStatusResponse>>,
    events: mpsc::UnboundedSender<BroadcastEnded>,
    check_now: Arc<Notify>,
    probe_errors: AtomicU64,
}

impl TwitchMonitor {
    pub fn new(
        config: TwitchConfig,
        client: Arc<TwitchClient>,
        roster: Arc<RosterStore>,
        states: Arc<LiveStateTable<TwitchStatusResponse>>,
        events: mpsc::UnboundedSender<BroadcastEnded>,
        check_now: Arc<Notify>,
    ) -> Self {
        Self {
            config,
            client,
            roster,
            states,
            events,
            check_now,
            probe_errors: AtomicU64::new(0),
        }
    }

    /// 監視ループ本体
    ///
    /// 起動直後に1回チェックし、以降は[min,max]秒の乱数間隔で巡回する。
    /// ロースターの再読み込みはreload_interval_minutesごと。
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        info!(
            "🎬 Twitch monitor started, tracking {} streamers",
            self.roster.len()
        );

        let reload_interval =
            Duration::from_secs(self.config.reload_interval_minutes.max(1) * 60);
        let mut last_reload = Instant::now();

        self.check_all_streamers().await;

        loop {
            // ロースターはストアが正なので、ここでは周期的に規模を記録するだけ
            if last_reload.elapsed() >= reload_interval {
                info!(
                    "Roster snapshot refreshed: {} streamers tracked",
                    self.roster.len()
                );
                last_reload = Instant::now();
            }

            let interval = random_interval(
                self.config.min_interval_seconds,
                self.config.max_interval_seconds,
            );
            info!("Next Twitch check in {} seconds", interval);

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(interval)) => {
                    self.check_all_streamers().await;
                }
                _ = self.check_now.notified() => {
                    info!("Immediate Twitch check requested");
                    self.check_all_streamers().await;
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("Twitch monitor stopped");
                        return;
                    }
                }
            }
        }
    }

    /// 全主播を1巡チェックする
    pub async fn check_all_streamers(&self) {
        let streamers = self.roster.snapshot();
        if streamers.is_empty() {
            info!("No streamers to monitor on Twitch");
            return;
        }

        info!("Checking live status of {} streamers...", streamers.len());

        for streamer in streamers {
            self.check_streamer(&streamer).await;
            // バースト防止の小休止
            let delay = random_interval(1, 3);
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }
    }

    async fn check_streamer(&self, streamer: &StreamerInfo) {
        let Some(handle) = streamer.handle_for(Platform::Twitch) else {
            return;
        };

        // プロフィール画像が未解決なら取得して書き戻す。ユーザーが
        // 存在しなければロースターから除去する。
        if streamer.profile_image_url.is_none() {
            match self.client.get_user_info(&handle).await {
                Ok(user) => {
                    self.roster
                        .update_profile_image(&streamer.id, &user.profile_image_url);
                }
                Err(TwitchError::UserNotFound(_)) => {
                    warn!(
                        "Streamer {} ({}) does not exist on Twitch, evicting",
                        streamer.name, handle
                    );
                    self.roster.remove_streamer(&streamer.id);
                    self.states.remove(&streamer.id);
                    return;
                }
                Err(e) => {
                    warn!("Failed to fetch user info for {}: {}", handle, e);
                }
            }
        }

        let stream = match self.client.check_stream_status(&handle).await {
            Ok(stream) => stream,
            Err(e) => {
                // プローブ失敗では状態を更新しない（エッジを見逃さないため）
                self.probe_errors.fetch_add(1, Ordering::Relaxed);
                error!("Failed to check stream status for {}: {}", streamer.name, e);
                return;
            }
        };

        let is_live = stream.is_some();
        let snapshot = TwitchStatusResponse {
            is_live,
            stream_data: stream.clone(),
            checked_at: Utc::now().to_rfc3339(),
            streamer_name: streamer.name.clone(),
        };

        let ended = self.states.observe(&streamer.id, is_live, Some(snapshot));

        if let Some(stream) = &stream {
            info!(
                "🔴 {} is live! title: {}, viewers: {}",
                stream.user_name, stream.title, stream.viewer_count
            );
        } else {
            info!("⚫ {} is offline", streamer.name);
        }

        if ended {
            info!(
                "🎬 Broadcast end detected for {}, queueing post-processing",
                streamer.name
            );
            if self
                .events
                .send(BroadcastEnded {
                    streamer: streamer.clone(),
                    platform: Platform::Twitch,
                })
                .is_err()
            {
                error!("Supervisor channel closed, dropping BroadcastEnded event");
            }
        }
    }

    pub fn probe_error_count(&self) -> u64 {
        self.probe_errors.load(Ordering::Relaxed)
    }
}
