//! 各プラットフォームAPIレスポンスの型定義

pub mod twitch;
pub mod youtube;

use serde::{Deserialize, Serialize};

/// 対応プラットフォーム
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitch,
    Youtube,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Twitch => write!(f, "twitch"),
            Platform::Youtube => write!(f, "youtube"),
        }
    }
}

impl Platform {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "twitch" => Some(Platform::Twitch),
            "youtube" => Some(Platform::Youtube),
            _ => None,
        }
    }
}

/// 配信済み録画（VOD）の共通スナップショット
///
/// Twitch/YouTubeどちらの録画でも分析結果へ埋め込むのはこの形。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_login: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parse_roundtrip() {
        assert_eq!(Platform::parse("twitch"), Some(Platform::Twitch));
        assert_eq!(Platform::parse("YouTube"), Some(Platform::Youtube));
        assert_eq!(Platform::parse("bilibili"), None);
        assert_eq!(Platform::Twitch.to_string(), "twitch");
        assert_eq!(Platform::Youtube.to_string(), "youtube");
    }
}
