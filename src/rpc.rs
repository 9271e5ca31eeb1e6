//! 外部サブスクリプション永続化サービスとの境界
//!
//! 実体は別プロセスのRPCサービスで、コアは未設定でも動作する。
//! ここではインターフェースのみ定義し、リーパーとVOD通知が利用する。

use async_trait::async_trait;

/// 外部サブスクリプションサービスのcapability
#[async_trait]
pub trait SubscriptionService: Send + Sync {
    /// 主播の購読者数を問い合わせる
    async fn subscriber_count(&self, streamer_id: &str) -> anyhow::Result<u64>;

    /// 配信メタデータを外部に記録する
    async fn record_vod(
        &self,
        streamer_name: &str,
        title: &str,
        platform: &str,
        duration: &str,
        video_id: &str,
    ) -> anyhow::Result<()>;
}
