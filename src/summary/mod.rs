//! SRT字幕のAI要約（map-reduce）
//!
//! SRTをタイムスタンプ付きトランスクリプトに変換し、ブロック単位で
//! チャンク化して各チャンクを要約、最後に中国語で統合要約を生成する。
//! プロバイダ（Gemini / Qwen）は同一のcapabilityセットを実装する。

pub mod gemini;
pub mod qwen;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::AppConfig;

#[derive(thiserror::Error, Debug)]
pub enum AiError {
    #[error("Request failed")]
    Request(#[from] reqwest::Error),
    #[error("Provider returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("No generated text found in response")]
    EmptyResponse,
    #[error("API key not configured for {0}")]
    NotConfigured(&'static str),
    #[error("SRT parse error: {0}")]
    Srt(String),
    #[error("Failed to write summary file: {0}")]
    Io(#[from] std::io::Error),
}

/// チャンクあたりの最大文字数のデフォルト
pub const DEFAULT_CHUNK_CHARS: usize = 10000;
/// チャンク要約の出力トークン上限
const CHUNK_MAX_TOKENS: u32 = 600;

/// AIプロバイダの共通インターフェース
///
/// パイプラインはプロバイダ固有の詳細に依存してはならない。
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// プロンプトからテキストを生成する
    async fn generate_content(&self, prompt: &str, max_output_tokens: u32)
        -> Result<String, AiError>;

    /// SRT字幕をmap-reduceで要約する
    ///
    /// 返り値は（最終要約, チャンクごとの要約）。
    async fn summarize_srt(
        &self,
        srt_content: &str,
        chunk_chars: usize,
    ) -> Result<(String, Vec<String>), AiError> {
        let transcript = parse_srt_transcript(srt_content).map_err(AiError::Srt)?;

        let chunk_chars = if chunk_chars == 0 {
            DEFAULT_CHUNK_CHARS
        } else {
            chunk_chars
        };

        debug!("Parsed transcript length: {} characters", transcript.len());

        let chunks = chunk_text(&transcript, chunk_chars);
        let mut summaries = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            let prompt = format!(
                "This is a clip from a streamer's live broadcast. To summarize, what topics are being discussed in this segment: \n\n{}",
                chunk
            );
            let summary = self.generate_content(&prompt, CHUNK_MAX_TOKENS).await?;
            summaries.push(summary);
            info!("Summarized chunk {}/{}", i + 1, chunks.len());

            // レートバーストを避ける
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        let combined = summaries.join("\n\n");
        let final_prompt = format!(
            "Below are summaries of each section. Please consolidate them into a final summary, presenting key points in Chinese and keeping the length within 300 words: \n\n{}",
            combined
        );
        let final_summary = self.generate_content(&final_prompt, CHUNK_MAX_TOKENS).await?;

        Ok((final_summary, summaries))
    }

    /// 要約をテキストファイルに保存する
    ///
    /// 拡張子を取り除いたパスに `_summary.txt` を付けて書き出す。
    fn save_summary_to_file(&self, srt_path: &Path, summary: &str) -> Result<(), AiError> {
        let mut stem = srt_path.with_extension("").into_os_string();
        stem.push("_summary.txt");
        let summary_path = std::path::PathBuf::from(stem);

        std::fs::write(&summary_path, summary)?;
        info!("💾 Summary saved to: {}", summary_path.display());

        Ok(())
    }
}

/// 設定のプロバイダキーからAIプロバイダを生成する
///
/// 未知の値は"aliyun"にフォールバックする。
pub fn create_provider(config: &AppConfig) -> Box<dyn AiProvider> {
    match config.ai.provider.as_str() {
        "google" => Box::new(gemini::GeminiProvider::new(config.google_api.api_key.clone())),
        _ => Box::new(qwen::QwenProvider::new(
            config.alibaba_api.api_key.clone(),
            config.alibaba_api.model.clone(),
        )),
    }
}

/// SRT本文をタイムスタンプ付きトランスクリプトに変換する
///
/// 各ブロックの索引行を捨て、`タイムスタンプ行\nテキスト` を空行で
/// 連結した形を返す。
pub fn parse_srt_transcript(content: &str) -> Result<String, String> {
    let content = content.trim();
    if content.is_empty() {
        return Err("empty SRT content".to_string());
    }

    let mut parts = Vec::new();

    for block in split_blocks(content) {
        let lines: Vec<&str> = block.lines().collect();
        if lines.len() < 3 {
            continue;
        }

        let timestamp = lines[1].trim();
        let text = lines[2..].join("\n").trim().to_string();

        if !text.is_empty() {
            parts.push(format!("{}\n{}", timestamp, text));
        }
    }

    if parts.is_empty() {
        return Err("no valid subtitles found in SRT file".to_string());
    }

    Ok(parts.join("\n\n"))
}

/// 空白のみの行も区切りとして扱うブロック分割
fn split_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }

    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }

    blocks
}

/// テキストをブロック境界を尊重しつつ最大max_chars文字のチャンクに分ける
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for entry in text.split("\n\n") {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        if !current.is_empty() && current.len() + 2 + entry.len() > max_chars {
            chunks.push(current.trim().to_string());
            current = entry.to_string();
        } else if current.is_empty() {
            current = entry.to_string();
        } else {
            current.push_str("\n\n");
            current.push_str(entry);
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_SRT: &str = "1\n00:00:00,000 --> 00:00:02,500\nこんにちは\n\n2\n00:00:03,000 --> 00:00:07,250\ntoday we play Factorio\n";

    #[test]
    fn test_parse_srt_transcript() {
        let transcript = parse_srt_transcript(SAMPLE_SRT).unwrap();
        assert_eq!(
            transcript,
            "00:00:00,000 --> 00:00:02,500\nこんにちは\n\n00:00:03,000 --> 00:00:07,250\ntoday we play Factorio"
        );
    }

    #[test]
    fn test_parse_srt_transcript_empty() {
        assert!(parse_srt_transcript("").is_err());
        assert!(parse_srt_transcript("1\nonly two lines").is_err());
    }

    #[test]
    fn test_chunk_text_single_chunk() {
        let chunks = chunk_text("short text", 100);
        assert_eq!(chunks, vec!["short text"]);
    }

    #[test]
    fn test_chunk_text_respects_block_boundaries() {
        let blocks: Vec<String> = (0..10).map(|i| format!("block number {:02}", i)).collect();
        let text = blocks.join("\n\n");

        let chunks = chunk_text(&text, 40);

        // each block is 15 chars; two blocks + separator = 32 <= 40, three = 49 > 40
        assert!(chunks.iter().all(|c| c.len() <= 40));

        // concatenating back yields the original modulo inter-block whitespace
        let rejoined = chunks.join("\n\n");
        assert_eq!(rejoined, text);
    }

    #[test]
    fn test_chunk_text_oversized_block_is_own_chunk() {
        let big = "x".repeat(100);
        let text = format!("small\n\n{}\n\nsmall2", big);

        let chunks = chunk_text(&text, 50);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], big);
    }

    #[test]
    fn test_chunk_text_empty() {
        assert!(chunk_text("", 100).is_empty());
        assert!(chunk_text("   ", 100).is_empty());
    }
}
