//! アプリケーション設定管理モジュール
//!
//! TOML設定ファイルの読み込み・保存と各セクションのデフォルト値を提供します。

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Twitch監視設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitchConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default, skip_serializing)]
    pub client_secret: String,
    /// 最小チェック間隔（秒）
    #[serde(default = "default_min_interval")]
    pub min_interval_seconds: u64,
    /// 最大チェック間隔（秒）
    #[serde(default = "default_max_interval")]
    pub max_interval_seconds: u64,
    /// 主播リスト再読み込み間隔（分）
    #[serde(default = "default_reload_interval")]
    pub reload_interval_minutes: u64,
    /// 自動処理で取得する直近VOD数
    #[serde(default = "default_fetch_vod_count")]
    pub fetch_vod_count: u32,
}

impl Default for TwitchConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            min_interval_seconds: default_min_interval(),
            max_interval_seconds: default_max_interval(),
            reload_interval_minutes: default_reload_interval(),
            fetch_vod_count: default_fetch_vod_count(),
        }
    }
}

/// YouTube監視設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeConfig {
    /// APIキーのプール（403/429でローテーション）
    #[serde(default, skip_serializing)]
    pub api_keys: Vec<String>,
    #[serde(default)]
    pub referer: String,
    #[serde(default = "default_min_interval")]
    pub min_interval_seconds: u64,
    #[serde(default = "default_max_interval")]
    pub max_interval_seconds: u64,
    #[serde(default = "default_reload_interval")]
    pub reload_interval_minutes: u64,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            referer: String::new(),
            min_interval_seconds: default_min_interval(),
            max_interval_seconds: default_max_interval(),
            reload_interval_minutes: default_reload_interval(),
        }
    }
}

/// AIプロバイダ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// "aliyun" または "google"
    #[serde(default = "default_ai_provider")]
    pub provider: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_ai_provider(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleApiConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlibabaApiConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_qwen_model")]
    pub model: String,
}

impl Default for AlibabaApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_qwen_model(),
        }
    }
}

/// 外部RPCサービス設定（未設定でもコアは動作する）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default)]
    pub address: String,
    #[serde(default = "default_rpc_timeout")]
    pub timeout_seconds: u64,
}

/// 保存先設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// chat_logs / analysis_results / downloads / App_Data の親ディレクトリ
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// ログレベル (trace/debug/info/warn/error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub twitch: TwitchConfig,
    #[serde(default)]
    pub youtube: YouTubeConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub google_api: GoogleApiConfig,
    #[serde(default)]
    pub alibaba_api: AlibabaApiConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_min_interval() -> u64 {
    30
}

fn default_max_interval() -> u64 {
    120
}

fn default_reload_interval() -> u64 {
    10
}

fn default_fetch_vod_count() -> u32 {
    1
}

fn default_ai_provider() -> String {
    "aliyun".to_string()
}

fn default_qwen_model() -> String {
    "qwen-flash".to_string()
}

fn default_rpc_timeout() -> u64 {
    10
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 設定管理マネージャー
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// 新しい設定マネージャーを作成
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::with_path(config_path)
    }

    /// 明示的なパスで設定マネージャーを作成（CLIの --config 用）
    pub fn with_path(config_path: PathBuf) -> Result<Self> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }

        Ok(Self { config_path })
    }

    /// XDGディレクトリに基づく設定ファイルパスを取得
    fn default_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("dev", "oshiwatch", "oshiwatch")
            .context("Failed to get project directories")?;

        let config_file = project_dirs.config_dir().join("config.toml");
        debug!("Config file path: {}", config_file.display());

        Ok(config_file)
    }

    /// 設定を読み込み
    pub fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!(
                "Config file not found, using default settings: {}",
                self.config_path.display()
            );
            return Ok(AppConfig::default());
        }

        let config_content = fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;

        let config: AppConfig = toml::from_str(&config_content).with_context(|| {
            format!(
                "Failed to parse config file: {}",
                self.config_path.display()
            )
        })?;

        info!(
            "✅ Configuration loaded from: {}",
            self.config_path.display()
        );

        Ok(config)
    }

    /// 設定を保存
    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        let config_content =
            toml::to_string_pretty(config).context("Failed to serialize config")?;

        fs::write(&self.config_path, config_content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;

        info!("💾 Configuration saved to: {}", self.config_path.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_intervals() {
        let config = AppConfig::default();
        assert_eq!(config.twitch.min_interval_seconds, 30);
        assert_eq!(config.twitch.max_interval_seconds, 120);
        assert_eq!(config.twitch.reload_interval_minutes, 10);
        assert_eq!(config.twitch.fetch_vod_count, 1);
        assert_eq!(config.youtube.min_interval_seconds, 30);
        assert_eq!(config.ai.provider, "aliyun");
    }

    #[test]
    fn test_partial_toml_gets_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [twitch]
            client_id = "abc"
            client_secret = "def"

            [youtube]
            api_keys = ["k1", "k2"]
            "#,
        )
        .unwrap();

        assert_eq!(config.twitch.client_id, "abc");
        assert_eq!(config.twitch.min_interval_seconds, 30);
        assert_eq!(config.youtube.api_keys.len(), 2);
        assert_eq!(config.ai.provider, "aliyun");
        assert!(config.rpc.address.is_empty());
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.toml")).unwrap();
        let config = manager.load_config().unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_save_load_roundtrip_keeps_settings() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.toml")).unwrap();

        let mut config = AppConfig::default();
        config.twitch.min_interval_seconds = 45;
        config.server.bind = "127.0.0.1:9090".to_string();
        config.ai.provider = "google".to_string();
        manager.save_config(&config).unwrap();

        let loaded = manager.load_config().unwrap();
        assert_eq!(loaded.twitch.min_interval_seconds, 45);
        assert_eq!(loaded.server.bind, "127.0.0.1:9090");
        assert_eq!(loaded.ai.provider, "google");
    }
}
