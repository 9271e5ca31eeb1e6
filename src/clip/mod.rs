//! 盛り上がりクリップの抽出パイプライン
//!
//! 再生トークン取得 → マスタープレイリスト解析 → ffmpegで切り出し →
//! 音声分離 → ASRで字幕生成 → SRT保存、の一連を実行する。
//! 切り出した動画・音声は後段のスイープで削除され、SRTだけが残る。

pub mod ffmpeg;
pub mod srt;

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, warn};

use crate::api::hls::{self, HlsError};
use crate::api::twitch_gql::{GqlError, TwitchGqlClient};
use crate::asr::{AsrError, BcutAsrClient};

#[derive(thiserror::Error, Debug)]
pub enum ClipError {
    #[error("Playback token error: {0}")]
    Gql(#[from] GqlError),
    #[error("Playlist error: {0}")]
    Hls(#[from] HlsError),
    #[error("Quality '{0}' not available")]
    QualityUnavailable(String),
    #[error("ffmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg::FfmpegError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// クリップ抽出リクエスト
#[derive(Debug, Clone)]
pub struct ClipRequest {
    pub vod_id: String,
    /// 切り出し開始位置（秒）
    pub start_time: f64,
    /// 切り出し長（秒）
    pub end_time: f64,
    /// 希望画質（部分一致、デフォルト"720p"）
    pub quality: String,
    pub output_dir: PathBuf,
}

/// クリップ抽出結果
#[derive(Debug, Clone)]
pub struct ClipOutcome {
    pub video_path: PathBuf,
    pub audio_path: Option<PathBuf>,
    pub subtitle_path: Option<PathBuf>,
    pub duration: f64,
    pub download_time: f64,
}

/// スイープ対象の一時ファイル拡張子
const TEMP_EXTENSIONS: [&str; 6] = [".ts", ".tmp", ".part", ".download", ".mp4", ".mp3"];

pub struct ClipExtractor {
    gql: TwitchGqlClient,
    http: reqwest::Client,
    asr: BcutAsrClient,
}

impl Default for ClipExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipExtractor {
    pub fn new() -> Self {
        Self {
            gql: TwitchGqlClient::new(),
            http: reqwest::Client::new(),
            asr: BcutAsrClient::new(),
        }
    }

    /// 1つのクリップを抽出し、音声分離とASRまで行う
    ///
    /// ASRの失敗はクリップ全体を失敗させない（SRTなしで返す）。
    pub async fn extract(&self, req: &ClipRequest) -> Result<ClipOutcome, ClipError> {
        let started = Instant::now();

        ffmpeg::check_ffmpeg().await?;

        let token = self.gql.fetch_playback_access_token(&req.vod_id).await?;
        let playlist_url = hls::playlist_url(&req.vod_id, &token.value, &token.signature);
        let qualities = hls::fetch_master_playlist(&self.http, &playlist_url).await?;

        let quality = hls::select_quality(&qualities, &req.quality)
            .ok_or_else(|| ClipError::QualityUnavailable(req.quality.clone()))?;

        info!(
            "Extracting clip of {} ({}) at {:.2}s, quality {}",
            req.vod_id, token.title, req.start_time, quality.name
        );

        std::fs::create_dir_all(&req.output_dir)?;

        let safe_title = sanitize_filename(&token.title);
        let video_path = req
            .output_dir
            .join(format!("{}_{}.mp4", req.vod_id, safe_title));

        ffmpeg::download_clip(&quality.url, &video_path, req.start_time, req.end_time).await?;

        let mut outcome = ClipOutcome {
            video_path: video_path.clone(),
            audio_path: None,
            subtitle_path: None,
            duration: token.length_seconds as f64,
            download_time: started.elapsed().as_secs_f64(),
        };

        let audio_path = req
            .output_dir
            .join(format!("{}_{}.mp3", req.vod_id, safe_title));

        if let Err(e) = ffmpeg::extract_audio(&video_path, &audio_path).await {
            warn!("Audio demux failed for {}: {}", req.vod_id, e);
            return Ok(outcome);
        }
        outcome.audio_path = Some(audio_path.clone());

        // 音声をASRに投げてSRTを書く。失敗してもクリップは保持する。
        let audio = std::fs::read(&audio_path)?;
        match self.transcribe(&audio).await {
            Ok(srt_content) => {
                let subtitle_path = req
                    .output_dir
                    .join(format!("{}_{}.srt", req.vod_id, safe_title));
                std::fs::write(&subtitle_path, srt_content)?;
                info!("Subtitles saved to {}", subtitle_path.display());
                outcome.subtitle_path = Some(subtitle_path);
            }
            Err(e) => {
                warn!("ASR failed for {}: {}", req.vod_id, e);
            }
        }

        Ok(outcome)
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<String, AsrError> {
        let segments = self.asr.run(audio).await?;
        Ok(srt::render_srt(&segments))
    }
}

/// ファイル名に使えない文字を置換し、長さを制限する
pub fn sanitize_filename(filename: &str) -> String {
    let mut out: String = filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect();

    if out.chars().count() > 100 {
        out = out.chars().take(100).collect();
    }

    out
}

/// クリップディレクトリの一時ファイルを削除する（SRTは残す）
pub fn clean_temp_files(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    let mut deleted_count = 0_u64;
    let mut deleted_size = 0_u64;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_lowercase();
        if !TEMP_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("Failed to delete temp file {}: {}", path.display(), e);
            continue;
        }

        deleted_count += 1;
        deleted_size += size;
    }

    if deleted_count > 0 {
        info!(
            "🧹 Swept {} temp files ({:.2} MB) from {}",
            deleted_count,
            deleted_size as f64 / 1024.0 / 1024.0,
            dir.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b:c*d"), "a_b_c_d");
        assert_eq!(sanitize_filename("普通のタイトル"), "普通のタイトル");

        let long: String = "x".repeat(200);
        assert_eq!(sanitize_filename(&long).chars().count(), 100);
    }

    #[test]
    fn test_clean_temp_files_leaves_srt() {
        let dir = tempfile::tempdir().unwrap();

        for name in ["clip.mp4", "clip.mp3", "seg.ts", "x.part", "clip.srt", "note.txt"] {
            std::fs::write(dir.path().join(name), b"data").unwrap();
        }

        clean_temp_files(dir.path()).unwrap();

        let remaining: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();

        assert!(remaining.contains(&"clip.srt".to_string()));
        assert!(remaining.contains(&"note.txt".to_string()));
        assert_eq!(remaining.len(), 2);
    }

    #[test]
    fn test_clean_temp_files_missing_dir_is_ok() {
        clean_temp_files(Path::new("/nonexistent/oshiwatch-test")).unwrap();
    }
}
