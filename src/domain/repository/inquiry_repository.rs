use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::entity::inquiry_request::{InquiryRequest, InquiryStatus};
use crate::domain::entity::ledger::LedgerEntry;

/// CreateOutcome は create_with_quota の結果。
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// 作成済み。ledger は加算後の送信者の台帳。
    Created { ledger: LedgerEntry },
    /// 同じ (sender, recipient, anonymous_recipient) の未拒否リクエストが既にある。
    Duplicate(InquiryRequest),
    /// 上限に達しているため何も変更していない。
    QuotaExceeded { counter: u32, limit: u32 },
    /// 逆方向の未拒否リクエストがトランザクション内で見つかった。
    CrossRequestDetected(InquiryRequest),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InquiryRequestRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<InquiryRequest>>;

    /// sender -> recipient 方向の最新の未拒否リクエスト (匿名フラグは問わない)。
    async fn find_latest_open(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
    ) -> anyhow::Result<Option<InquiryRequest>>;

    async fn find_open_for_triple(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        anonymous_recipient: bool,
    ) -> anyhow::Result<Option<InquiryRequest>>;

    async fn list_sent(&self, sender_id: Uuid) -> anyhow::Result<Vec<InquiryRequest>>;
    async fn list_received(&self, recipient_id: Uuid) -> anyhow::Result<Vec<InquiryRequest>>;
    /// ACCEPTED で、user_id が送信者・受信者のどちらかであるもの。
    async fn list_contacts(&self, user_id: Uuid) -> anyhow::Result<Vec<InquiryRequest>>;

    /// 保存されている status が expected の場合のみ更新する。更新できたら true。
    async fn update_status(
        &self,
        request: &InquiryRequest,
        expected: InquiryStatus,
    ) -> anyhow::Result<bool>;

    /// 送信者の台帳への加算とリクエストの挿入を 1 トランザクションで行う。
    /// 送信者の台帳は事前に存在している必要がある。
    async fn create_with_quota(&self, request: &InquiryRequest) -> anyhow::Result<CreateOutcome>;

    /// cutoff より前に作成された SENT / RECEIVED のリクエスト。
    async fn list_pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<InquiryRequest>>;

    /// 送信者に 1 件分の枠を返却し sender_restored を立てる。
    /// 既に返却済み、または回答済みの場合は None。
    async fn restore_sender_quota(&self, request_id: Uuid)
        -> anyhow::Result<Option<LedgerEntry>>;

    /// reminders_sent が expected の場合のみ 1 増やす。
    async fn record_reminder(&self, request_id: Uuid, expected: u8) -> anyhow::Result<bool>;
}
