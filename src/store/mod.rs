//! 成果物のファイルストア
//!
//! チャットログ・分析結果・要約をvideo idをキーに保存する。書き込みは
//! すべて `<target>.tmp` へ書いてからrenameするため、読み手が不完全な
//! ファイルを見ることはない。chat_logsのファイル存在が「処理済み」の
//! 唯一の判定源になる。

pub mod roster;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info};

use crate::analysis::{AnalysisResult, PeakDetectionParams};
use crate::ingest::ChatDownload;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
}

/// 分析一覧のエントリ
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisListItem {
    pub video_id: String,
    pub streamer_name: String,
    pub title: String,
    pub analyzed_at: chrono::DateTime<chrono::Utc>,
    pub hot_moments_count: usize,
    pub params: String,
}

pub struct ResultStore {
    base_dir: PathBuf,
}

impl ResultStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn chat_logs_dir(&self) -> PathBuf {
        self.base_dir.join("chat_logs")
    }

    pub fn analysis_dir(&self) -> PathBuf {
        self.base_dir.join("analysis_results")
    }

    pub fn video_analysis_dir(&self, video_id: &str) -> PathBuf {
        self.analysis_dir().join(video_id)
    }

    pub fn clip_dir(&self, video_id: &str) -> PathBuf {
        self.base_dir.join("downloads").join("hot_clips").join(video_id)
    }

    pub fn roster_path(&self) -> PathBuf {
        self.base_dir.join("App_Data").join("tracked_streamers.json")
    }

    /// tmpファイルに書いてからrenameするアトミック書き込み
    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;

        Ok(())
    }

    fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        Self::write_atomic(path, &bytes)
    }

    // --- チャットログ ---

    /// チャットログが既に存在するか（＝この配信は処理済みか）
    pub fn chat_log_exists(&self, video_id: &str) -> bool {
        !self.chat_log_files(video_id).is_empty()
    }

    fn chat_log_files(&self, video_id: &str) -> Vec<PathBuf> {
        let prefix = format!("chat_{}_", video_id);
        let mut files: Vec<PathBuf> = match fs::read_dir(self.chat_logs_dir()) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.starts_with(&prefix) && n.ends_with(".json"))
                        .unwrap_or(false)
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        files.sort();
        files
    }

    /// チャットログを保存する
    pub fn save_chat(&self, download: &ChatDownload) -> Result<PathBuf, StoreError> {
        let filename = format!(
            "chat_{}_{}.json",
            download.video_id,
            Local::now().format("%Y%m%d_%H%M%S")
        );
        let path = self.chat_logs_dir().join(filename);

        Self::write_json_atomic(&path, download)?;
        info!(
            "💾 Chat log saved: {} ({} comments)",
            path.display(),
            download.total_comments
        );

        Ok(path)
    }

    /// チャットログを読み込む（複数あれば辞書順で最後のもの）
    pub fn read_chat(&self, video_id: &str) -> Result<ChatDownload, StoreError> {
        let files = self.chat_log_files(video_id);
        let Some(path) = files.last() else {
            return Err(StoreError::NotFound(format!(
                "chat log for video {}",
                video_id
            )));
        };

        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    // --- 分析結果 ---

    pub fn analysis_path(&self, video_id: &str, params: &PeakDetectionParams) -> PathBuf {
        self.video_analysis_dir(video_id)
            .join(format!("analysis_{}.json", params.file_tag()))
    }

    pub fn analysis_exists(&self, video_id: &str, params: &PeakDetectionParams) -> bool {
        self.analysis_path(video_id, params).exists()
    }

    pub fn save_analysis(&self, result: &AnalysisResult) -> Result<PathBuf, StoreError> {
        let path = self.analysis_path(&result.video_id, &result.params);
        Self::write_json_atomic(&path, result)?;
        info!("💾 Analysis saved: {}", path.display());
        Ok(path)
    }

    pub fn read_analysis(
        &self,
        video_id: &str,
        params: &PeakDetectionParams,
    ) -> Result<AnalysisResult, StoreError> {
        let path = self.analysis_path(video_id, params);
        if !path.exists() {
            return Err(StoreError::NotFound(format!(
                "analysis for video {} with params {}",
                video_id,
                params.file_tag()
            )));
        }

        let data = fs::read(&path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// 全動画の分析結果を列挙する（分析日時の新しい順）
    pub fn list_analyses(&self) -> Result<Vec<AnalysisListItem>, StoreError> {
        let mut items = Vec::new();

        let dirs = match fs::read_dir(self.analysis_dir()) {
            Ok(dirs) => dirs,
            Err(_) => return Ok(items),
        };

        for dir in dirs.filter_map(|e| e.ok()) {
            if !dir.path().is_dir() {
                continue;
            }

            let Ok(files) = fs::read_dir(dir.path()) else {
                continue;
            };

            for file in files.filter_map(|e| e.ok()) {
                let name = file.file_name().to_string_lossy().to_string();
                if !name.starts_with("analysis_") || !name.ends_with(".json") {
                    continue;
                }

                let Ok(data) = fs::read(file.path()) else {
                    continue;
                };
                let Ok(result) = serde_json::from_slice::<AnalysisResult>(&data) else {
                    debug!("Skipping unreadable analysis file: {}", name);
                    continue;
                };

                let params = name
                    .trim_start_matches("analysis_")
                    .trim_end_matches(".json")
                    .to_string();

                items.push(AnalysisListItem {
                    video_id: result.video_id,
                    streamer_name: result.streamer_name,
                    title: result.video_info.title,
                    analyzed_at: result.analyzed_at,
                    hot_moments_count: result.hot_moments.len(),
                    params,
                });
            }
        }

        items.sort_by(|a, b| b.analyzed_at.cmp(&a.analyzed_at));
        Ok(items)
    }

    // --- クリップ要約 ---

    /// 盛り上がりポイントの要約ファイルパス（offsetはprintf風のfloat表記）
    pub fn summary_path(&self, video_id: &str, offset_seconds: f64) -> PathBuf {
        self.video_analysis_dir(video_id)
            .join(format!("{:.6}.txt", offset_seconds))
    }

    pub fn save_summary(
        &self,
        video_id: &str,
        offset_seconds: f64,
        summary: &str,
    ) -> Result<PathBuf, StoreError> {
        let path = self.summary_path(video_id, offset_seconds);
        Self::write_atomic(&path, summary.as_bytes())?;
        info!("💾 Clip summary saved: {}", path.display());
        Ok(path)
    }

    /// クエリのoffsetに最も近い要約を返す（実際のoffsetと本文）
    pub fn closest_summary(
        &self,
        video_id: &str,
        offset_seconds: f64,
    ) -> Result<(f64, String), StoreError> {
        let dir = self.video_analysis_dir(video_id);

        let files = fs::read_dir(&dir).map_err(|_| {
            StoreError::NotFound(format!("analysis results for video {}", video_id))
        })?;

        let mut best: Option<(f64, PathBuf)> = None;

        for file in files.filter_map(|e| e.ok()) {
            let path = file.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".txt") {
                continue;
            }

            let Ok(file_offset) = name.trim_end_matches(".txt").parse::<f64>() else {
                continue;
            };

            let diff = (file_offset - offset_seconds).abs();
            match &best {
                Some((best_offset, _)) if (best_offset - offset_seconds).abs() <= diff => {}
                _ => best = Some((file_offset, path.clone())),
            }
        }

        let Some((actual_offset, path)) = best else {
            return Err(StoreError::NotFound(format!(
                "summary files for video {}",
                video_id
            )));
        };

        let content = fs::read_to_string(&path)?;
        Ok((actual_offset, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Analysis, SignalStats};
    use crate::ingest::Comment;
    use crate::models::VideoInfo;

    fn store() -> (tempfile::TempDir, ResultStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        (dir, store)
    }

    fn sample_chat(video_id: &str) -> ChatDownload {
        let comments = vec![
            Comment {
                id: "c1".to_string(),
                content_offset_seconds: 1.0,
                ..Default::default()
            },
            Comment {
                id: "c2".to_string(),
                content_offset_seconds: 2.5,
                ..Default::default()
            },
        ];
        ChatDownload::new(video_id.to_string(), comments, None)
    }

    #[test]
    fn test_chat_save_read_roundtrip() {
        let (_dir, store) = store();

        assert!(!store.chat_log_exists("v1"));

        store.save_chat(&sample_chat("v1")).unwrap();
        assert!(store.chat_log_exists("v1"));
        assert!(!store.chat_log_exists("v2"));

        let loaded = store.read_chat("v1").unwrap();
        assert_eq!(loaded.video_id, "v1");
        assert_eq!(loaded.total_comments, 2);
        assert_eq!(loaded.comments[1].content_offset_seconds, 2.5);
    }

    #[test]
    fn test_chat_exists_does_not_match_prefix_ids() {
        let (_dir, store) = store();
        store.save_chat(&sample_chat("123456")).unwrap();

        // "123" is a prefix of "123456" but a different video
        assert!(!store.chat_log_exists("123"));
    }

    #[test]
    fn test_no_tmp_files_left_behind() {
        let (_dir, store) = store();
        store.save_chat(&sample_chat("v1")).unwrap();

        let leftovers: Vec<_> = fs::read_dir(store.chat_logs_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    fn sample_analysis(video_id: &str) -> AnalysisResult {
        let analysis = Analysis {
            hot_moments: Vec::new(),
            time_series_data: Vec::new(),
            stats: SignalStats::default(),
        };
        AnalysisResult {
            video_id: video_id.to_string(),
            streamer_name: "lumi".to_string(),
            params: PeakDetectionParams::default(),
            hot_moments: analysis.hot_moments,
            time_series_data: analysis.time_series_data,
            stats: analysis.stats,
            video_info: VideoInfo {
                id: video_id.to_string(),
                title: "stream".to_string(),
                ..Default::default()
            },
            analyzed_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_analysis_save_read_and_list() {
        let (_dir, store) = store();
        let params = PeakDetectionParams::default();

        assert!(!store.analysis_exists("v1", &params));
        store.save_analysis(&sample_analysis("v1")).unwrap();
        assert!(store.analysis_exists("v1", &params));

        let loaded = store.read_analysis("v1", &params).unwrap();
        assert_eq!(loaded.streamer_name, "lumi");

        let list = store.list_analyses().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].video_id, "v1");
        assert_eq!(list[0].params, "420_0.90_210");
    }

    #[test]
    fn test_analysis_filename_embeds_params() {
        let (_dir, store) = store();
        let path = store.analysis_path("v1", &PeakDetectionParams::default());
        assert!(path.to_string_lossy().ends_with("analysis_420_0.90_210.json"));
    }

    #[test]
    fn test_closest_summary() {
        let (_dir, store) = store();

        store.save_summary("v1", 100.0, "first").unwrap();
        store.save_summary("v1", 500.0, "second").unwrap();

        let (offset, content) = store.closest_summary("v1", 120.0).unwrap();
        assert_eq!(offset, 100.0);
        assert_eq!(content, "first");

        let (offset, content) = store.closest_summary("v1", 400.0).unwrap();
        assert_eq!(offset, 500.0);
        assert_eq!(content, "second");

        assert!(store.closest_summary("missing", 0.0).is_err());
    }

    #[test]
    fn test_summary_path_renders_offset_as_float() {
        let (_dir, store) = store();
        let path = store.summary_path("v1", 3600.0);
        assert!(path.to_string_lossy().ends_with("3600.000000.txt"));
    }
}
