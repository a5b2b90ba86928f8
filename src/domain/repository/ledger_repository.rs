use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::entity::ledger::{InquiryPlan, LedgerEntry, PlanKind};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn find(&self, user_id: Uuid) -> anyhow::Result<Option<LedgerEntry>>;

    /// 未作成なら entry を保存する。いずれの場合も保存済みの台帳を返す。
    async fn create_if_absent(&self, entry: &LedgerEntry) -> anyhow::Result<LedgerEntry>;

    /// プランを切り替える。消費数とサイクルは変更しない。
    async fn switch_plan(&self, user_id: Uuid, plan: &InquiryPlan) -> anyhow::Result<LedgerEntry>;

    /// cycle_reset_at <= now の場合のみ消費数を 0 にして新しいサイクルを開始する。
    async fn reset_cycle(
        &self,
        user_id: Uuid,
        plan: &InquiryPlan,
        now: DateTime<Utc>,
    ) -> anyhow::Result<LedgerEntry>;

    /// サイクルが経過した全台帳をリセットし、対象ユーザーを返す。
    async fn reset_elapsed(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Uuid>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<InquiryPlan>>;
    async fn find_by_kind(&self, kind: PlanKind) -> anyhow::Result<Option<InquiryPlan>>;
    async fn find_default(&self) -> anyhow::Result<Option<InquiryPlan>>;
    async fn list(&self) -> anyhow::Result<Vec<InquiryPlan>>;
}
