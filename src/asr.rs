//! 必剪（bcut）音声認識サービスのクライアント
//!
//! 3段階アップロード（resource/create → 分片PUT → create/complete）の後、
//! タスクを作成して結果を1秒間隔でポーリングする。

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::clip::srt::SrtSegment;

const API_BASE_URL: &str = "https://member.bilibili.com/x/bcut/rubick-interface";
const MODEL_ID: &str = "8";
const POLL_MAX_ATTEMPTS: u32 = 500;

const ASR_USER_AGENT: &str = "Bilibili/1.0.0 (https://www.bilibili.com)";

#[derive(thiserror::Error, Debug)]
pub enum AsrError {
    #[error("Request failed")]
    Request(#[from] reqwest::Error),
    #[error("{step} failed with status {status}: {body}")]
    Status {
        step: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Malformed response in {step}: missing {field}")]
    Malformed {
        step: &'static str,
        field: &'static str,
    },
    #[error("ASR task failed")]
    TaskFailed,
    #[error("ASR task timed out after {0} polls")]
    Timeout(u32),
}

#[derive(Debug)]
struct UploadTicket {
    in_boss_key: String,
    resource_id: String,
    upload_id: String,
    per_size: usize,
    upload_urls: Vec<String>,
}

/// 音声バイト列をアップロードして字幕セグメントを得るクライアント
pub struct BcutAsrClient {
    client: reqwest::Client,
}

impl Default for BcutAsrClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BcutAsrClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// 完全なASRワークフローを実行する
    pub async fn run(&self, audio: &[u8]) -> Result<Vec<SrtSegment>, AsrError> {
        let ticket = self.request_upload(audio).await?;
        let etags = self.upload_parts(audio, &ticket).await?;
        let download_url = self.commit_upload(&ticket, &etags).await?;
        let task_id = self.create_task(&download_url).await?;
        self.poll_result(&task_id).await
    }

    /// アップロード枠を申請する
    async fn request_upload(&self, audio: &[u8]) -> Result<UploadTicket, AsrError> {
        let payload = json!({
            "type": 2,
            "name": "audio.mp3",
            "size": audio.len(),
            "ResourceFileType": "mp3",
            "model_id": MODEL_ID,
        });

        let data = self
            .post_json("request upload", &format!("{}/resource/create", API_BASE_URL), &payload)
            .await?;

        let str_field = |field: &'static str| -> Result<String, AsrError> {
            data.get(field)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .ok_or(AsrError::Malformed {
                    step: "request upload",
                    field,
                })
        };

        let upload_urls: Vec<String> = data
            .get("upload_urls")
            .and_then(|v| v.as_array())
            .map(|urls| {
                urls.iter()
                    .filter_map(|u| u.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .ok_or(AsrError::Malformed {
                step: "request upload",
                field: "upload_urls",
            })?;

        let per_size = data
            .get("per_size")
            .and_then(|v| v.as_u64())
            .ok_or(AsrError::Malformed {
                step: "request upload",
                field: "per_size",
            })? as usize;

        info!(
            "ASR upload granted: {}KB total, {} parts of {}KB",
            audio.len() / 1024,
            upload_urls.len(),
            per_size / 1024
        );

        Ok(UploadTicket {
            in_boss_key: str_field("in_boss_key")?,
            resource_id: str_field("resource_id")?,
            upload_id: str_field("upload_id")?,
            per_size,
            upload_urls,
        })
    }

    /// 分片を順番にPUTし、Etagを収集する
    async fn upload_parts(
        &self,
        audio: &[u8],
        ticket: &UploadTicket,
    ) -> Result<Vec<String>, AsrError> {
        let mut etags = Vec::with_capacity(ticket.upload_urls.len());

        for (i, url) in ticket.upload_urls.iter().enumerate() {
            let start = i * ticket.per_size;
            let end = ((i + 1) * ticket.per_size).min(audio.len());

            debug!("Uploading ASR part {}: bytes {}-{}", i, start, end);

            let resp = self
                .client
                .put(url)
                .header("User-Agent", ASR_USER_AGENT)
                .timeout(Duration::from_secs(300))
                .body(audio[start..end].to_vec())
                .send()
                .await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(AsrError::Status {
                    step: "upload part",
                    status,
                    body,
                });
            }

            let etag = resp
                .headers()
                .get("Etag")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();

            etags.push(etag);
        }

        Ok(etags)
    }

    /// アップロード完了をコミットし、ダウンロードURLを得る
    async fn commit_upload(
        &self,
        ticket: &UploadTicket,
        etags: &[String],
    ) -> Result<String, AsrError> {
        let payload = json!({
            "InBossKey": ticket.in_boss_key,
            "ResourceId": ticket.resource_id,
            "Etags": etags.join(","),
            "UploadId": ticket.upload_id,
            "model_id": MODEL_ID,
        });

        let data = self
            .post_json(
                "commit upload",
                &format!("{}/resource/create/complete", API_BASE_URL),
                &payload,
            )
            .await?;

        data.get("download_url")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or(AsrError::Malformed {
                step: "commit upload",
                field: "download_url",
            })
    }

    /// 変換タスクを作成する
    async fn create_task(&self, download_url: &str) -> Result<String, AsrError> {
        let payload = json!({
            "resource": download_url,
            "model_id": MODEL_ID,
        });

        let data = self
            .post_json("create task", &format!("{}/task", API_BASE_URL), &payload)
            .await?;

        let task_id = data
            .get("task_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or(AsrError::Malformed {
                step: "create task",
                field: "task_id",
            })?;

        info!("ASR task created: {}", task_id);
        Ok(task_id)
    }

    /// 結果をポーリングする（state 4=完了, 3=失敗）
    async fn poll_result(&self, task_id: &str) -> Result<Vec<SrtSegment>, AsrError> {
        // クエリ側のmodel_idは7（上流APIの仕様）
        let url = format!(
            "{}/task/result?model_id=7&task_id={}",
            API_BASE_URL, task_id
        );

        for _ in 0..POLL_MAX_ATTEMPTS {
            tokio::time::sleep(Duration::from_secs(1)).await;

            let resp = self
                .client
                .get(&url)
                .header("User-Agent", ASR_USER_AGENT)
                .timeout(Duration::from_secs(30))
                .send()
                .await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(AsrError::Status {
                    step: "query result",
                    status,
                    body,
                });
            }

            let value: Value = resp.json().await?;
            let data = value.get("data").cloned().unwrap_or(Value::Null);

            let state = data.get("state").and_then(|v| v.as_i64()).unwrap_or(0);
            match state {
                4 => {
                    info!("ASR task {} completed", task_id);
                    let result_str = data
                        .get("result")
                        .and_then(|v| v.as_str())
                        .ok_or(AsrError::Malformed {
                            step: "query result",
                            field: "result",
                        })?;

                    let result: Value =
                        serde_json::from_str(result_str).map_err(|_| AsrError::Malformed {
                            step: "query result",
                            field: "result JSON",
                        })?;

                    return Ok(make_segments(&result));
                }
                3 => return Err(AsrError::TaskFailed),
                _ => continue,
            }
        }

        Err(AsrError::Timeout(POLL_MAX_ATTEMPTS))
    }

    async fn post_json(
        &self,
        step: &'static str,
        url: &str,
        payload: &Value,
    ) -> Result<Value, AsrError> {
        let resp = self
            .client
            .post(url)
            .header("User-Agent", ASR_USER_AGENT)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(30))
            .json(payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AsrError::Status { step, status, body });
        }

        let value: Value = resp.json().await?;
        value
            .get("data")
            .cloned()
            .ok_or(AsrError::Malformed { step, field: "data" })
    }
}

/// `utterances[*]`から字幕セグメントを組み立てる
fn make_segments(result: &Value) -> Vec<SrtSegment> {
    let Some(utterances) = result.get("utterances").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    utterances
        .iter()
        .filter_map(|u| {
            let text = u.get("transcript")?.as_str()?.to_string();
            let start_time = u.get("start_time")?.as_f64()? as i64;
            let end_time = u.get("end_time")?.as_f64()? as i64;
            Some(SrtSegment {
                text,
                start_time,
                end_time,
            })
        })
        .collect()
}
