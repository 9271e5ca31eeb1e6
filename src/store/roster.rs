//! 追跡主播リスト（ロースター）のストア
//!
//! メモリ上のキャッシュが正で、変更はdirtyフラグを立てるだけ。
//! 5分周期のパーシスタが汚れていればファイルへ書き出す。読み取りは
//! スナップショットのコピーを返す。

use std::path::PathBuf;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::Platform;
use crate::store::StoreError;

/// 主播のプラットフォーム紐付け
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamerPlatform {
    pub platform: String,
    pub url: String,
}

/// 主播情報
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamerInfo {
    /// 小文字化されたハンドル（一意）
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub platforms: Vec<StreamerPlatform>,
    /// "UC"で始まるYouTubeチャンネルID（解決後にキャッシュ）
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub youtube_channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub profile_image_url: Option<String>,
}

impl StreamerInfo {
    /// 指定プラットフォームのURL末尾（ハンドル部分）を返す
    pub fn handle_for(&self, platform: Platform) -> Option<String> {
        self.platforms
            .iter()
            .find(|p| Platform::parse(&p.platform) == Some(platform))
            .and_then(|p| p.url.rsplit('/').next())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    }
}

/// 永続化形式
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackedStreamers {
    pub streamers: Vec<StreamerInfo>,
}

pub struct RosterStore {
    path: PathBuf,
    cache: RwLock<TrackedStreamers>,
    dirty: RwLock<bool>,
    file_lock: Mutex<()>,
}

impl RosterStore {
    /// ファイルからロースターを読み込む（無ければ空で開始）
    pub fn load(path: PathBuf) -> Result<Self, StoreError> {
        let cache = match std::fs::read(&path) {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Roster file not found, starting with an empty roster");
                TrackedStreamers::default()
            }
            Err(e) => return Err(e.into()),
        };

        info!("Loaded {} tracked streamers", cache.streamers.len());

        Ok(Self {
            path,
            cache: RwLock::new(cache),
            dirty: RwLock::new(false),
            file_lock: Mutex::new(()),
        })
    }

    /// 全主播のスナップショットコピーを返す
    pub fn snapshot(&self) -> Vec<StreamerInfo> {
        self.cache.read().streamers.clone()
    }

    pub fn get(&self, streamer_id: &str) -> Option<StreamerInfo> {
        let id = streamer_id.to_lowercase();
        self.cache
            .read()
            .streamers
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.cache.read().streamers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().streamers.is_empty()
    }

    fn mark_dirty(&self) {
        *self.dirty.write() = true;
    }

    /// 主播を追加する（既存ならfalse）。IDは小文字化・@除去で正規化する
    pub fn add_streamer(&self, raw_id: &str, name: &str, platform: StreamerPlatform) -> bool {
        let id = normalize_streamer_id(raw_id);

        let mut cache = self.cache.write();
        if cache.streamers.iter().any(|s| s.id == id) {
            return false;
        }

        cache.streamers.push(StreamerInfo {
            id: id.clone(),
            name: name.to_string(),
            platforms: vec![platform],
            youtube_channel_id: None,
            profile_image_url: None,
        });
        drop(cache);

        self.mark_dirty();
        info!("Streamer added to roster: {}", id);
        true
    }

    /// 既存主播にプラットフォームを追加する（既にあればfalse）
    pub fn add_platform(&self, streamer_id: &str, platform: StreamerPlatform) -> bool {
        let id = normalize_streamer_id(streamer_id);

        let mut cache = self.cache.write();
        let Some(streamer) = cache.streamers.iter_mut().find(|s| s.id == id) else {
            return false;
        };

        if streamer
            .platforms
            .iter()
            .any(|p| p.platform.eq_ignore_ascii_case(&platform.platform))
        {
            return false;
        }

        streamer.platforms.push(platform);
        drop(cache);

        self.mark_dirty();
        true
    }

    /// 主播をロースターから除去する
    pub fn remove_streamer(&self, streamer_id: &str) -> bool {
        let id = normalize_streamer_id(streamer_id);

        let mut cache = self.cache.write();
        let before = cache.streamers.len();
        cache.streamers.retain(|s| s.id != id);
        let removed = cache.streamers.len() < before;
        drop(cache);

        if removed {
            self.mark_dirty();
            info!("Streamer removed from roster: {}", id);
        }
        removed
    }

    /// 解決済みYouTubeチャンネルIDを書き戻す
    pub fn update_youtube_channel_id(&self, streamer_id: &str, channel_id: &str) -> bool {
        let id = normalize_streamer_id(streamer_id);

        let mut cache = self.cache.write();
        let Some(streamer) = cache.streamers.iter_mut().find(|s| s.id == id) else {
            return false;
        };

        if streamer.youtube_channel_id.as_deref() == Some(channel_id) {
            return false;
        }

        streamer.youtube_channel_id = Some(channel_id.to_string());
        drop(cache);

        self.mark_dirty();
        info!("✅ Cached YouTube channel id: {} -> {}", id, channel_id);
        true
    }

    /// プロフィール画像URLを初回のみ書き込む
    pub fn update_profile_image(&self, streamer_id: &str, image_url: &str) -> bool {
        if image_url.is_empty() {
            return false;
        }

        let id = normalize_streamer_id(streamer_id);

        let mut cache = self.cache.write();
        let Some(streamer) = cache.streamers.iter_mut().find(|s| s.id == id) else {
            return false;
        };

        if streamer.profile_image_url.is_some() {
            return false;
        }

        streamer.profile_image_url = Some(image_url.to_string());
        drop(cache);

        self.mark_dirty();
        true
    }

    /// 汚れていればファイルへ書き出す
    pub fn persist_if_dirty(&self) -> Result<bool, StoreError> {
        {
            let dirty = self.dirty.read();
            if !*dirty {
                return Ok(false);
            }
        }

        self.persist()?;
        Ok(true)
    }

    /// 無条件でファイルへ書き出す（tmp + rename）
    pub fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.file_lock.lock();

        let snapshot = self.cache.read().clone();

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_vec_pretty(&snapshot)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;

        *self.dirty.write() = false;
        info!(
            "💾 Roster persisted: {} streamers -> {}",
            snapshot.streamers.len(),
            self.path.display()
        );

        Ok(())
    }

    /// 5分周期のパーシスタタスク。停止時に最後のフラッシュを行う
    pub async fn run_persister(&self, mut stop: tokio::sync::watch::Receiver<bool>) {
        let interval = Duration::from_secs(300);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.persist_if_dirty() {
                        warn!("Periodic roster persist failed: {}", e);
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        if let Err(e) = self.persist_if_dirty() {
                            warn!("Final roster persist failed: {}", e);
                        }
                        info!("Roster persister stopped");
                        return;
                    }
                }
            }
        }
    }
}

/// IDを小文字化し、先頭の@を除去する
pub fn normalize_streamer_id(raw: &str) -> String {
    raw.trim_start_matches('@').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn twitch_platform(handle: &str) -> StreamerPlatform {
        StreamerPlatform {
            platform: "twitch".to_string(),
            url: format!("https://www.twitch.tv/{}", handle),
        }
    }

    #[test]
    fn test_normalize_streamer_id() {
        assert_eq!(normalize_streamer_id("@KanekoLumi"), "kanekolumi");
        assert_eq!(normalize_streamer_id("lumi"), "lumi");
    }

    #[test]
    fn test_add_and_get_streamer() {
        let dir = tempfile::tempdir().unwrap();
        let store = RosterStore::load(dir.path().join("roster.json")).unwrap();

        assert!(store.add_streamer("@KanekoLumi", "kanekolumi", twitch_platform("kanekolumi")));
        assert!(!store.add_streamer("kanekolumi", "dup", twitch_platform("kanekolumi")));

        let streamer = store.get("KANEKOLUMI").unwrap();
        assert_eq!(streamer.id, "kanekolumi");
        assert_eq!(
            streamer.handle_for(Platform::Twitch).unwrap(),
            "kanekolumi"
        );
        assert!(streamer.handle_for(Platform::Youtube).is_none());
    }

    #[test]
    fn test_add_platform_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let store = RosterStore::load(dir.path().join("roster.json")).unwrap();
        store.add_streamer("lumi", "lumi", twitch_platform("lumi"));

        let yt = StreamerPlatform {
            platform: "youtube".to_string(),
            url: "https://www.youtube.com/@lumi".to_string(),
        };
        assert!(store.add_platform("lumi", yt.clone()));
        assert!(!store.add_platform("lumi", yt));

        assert_eq!(store.get("lumi").unwrap().platforms.len(), 2);
    }

    #[test]
    fn test_persist_load_fixed_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("App_Data").join("tracked_streamers.json");

        let store = RosterStore::load(path.clone()).unwrap();
        store.add_streamer("lumi", "lumi", twitch_platform("lumi"));
        store.update_youtube_channel_id("lumi", "UCabc123");
        store.update_profile_image("lumi", "https://img.example/lumi.png");
        store.persist().unwrap();

        let reloaded = RosterStore::load(path.clone()).unwrap();
        assert_eq!(reloaded.snapshot(), store.snapshot());

        // 恒等変換の後の保存でも内容は変わらない
        reloaded.persist().unwrap();
        let again = RosterStore::load(path).unwrap();
        assert_eq!(again.snapshot(), store.snapshot());
    }

    #[test]
    fn test_dirty_flag_drives_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        let store = RosterStore::load(path.clone()).unwrap();

        // 変更なし: 書き込まれない
        assert!(!store.persist_if_dirty().unwrap());
        assert!(!path.exists());

        store.add_streamer("lumi", "lumi", twitch_platform("lumi"));
        assert!(store.persist_if_dirty().unwrap());
        assert!(path.exists());

        // フラッシュ後はまた汚れるまで書かない
        assert!(!store.persist_if_dirty().unwrap());
    }

    #[test]
    fn test_update_profile_image_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = RosterStore::load(dir.path().join("roster.json")).unwrap();
        store.add_streamer("lumi", "lumi", twitch_platform("lumi"));

        assert!(store.update_profile_image("lumi", "https://img/1.png"));
        assert!(!store.update_profile_image("lumi", "https://img/2.png"));
        assert_eq!(
            store.get("lumi").unwrap().profile_image_url.as_deref(),
            Some("https://img/1.png")
        );
    }

    #[test]
    fn test_remove_streamer() {
        let dir = tempfile::tempdir().unwrap();
        let store = RosterStore::load(dir.path().join("roster.json")).unwrap();
        store.add_streamer("lumi", "lumi", twitch_platform("lumi"));

        assert!(store.remove_streamer("LUMI"));
        assert!(!store.remove_streamer("lumi"));
        assert!(store.is_empty());
    }
}
