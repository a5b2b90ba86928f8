use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::ledger::{InquiryPlan, LedgerEntry, PlanKind, QuotaPool};
use crate::domain::repository::LedgerRepository;

pub(crate) const LEDGER_COLUMNS: &str = "user_id, plan_id, plan_kind, inquiry_limit, unlimited, \
     premium_pool_limit, regular_pool_limit, premium_used, regular_used, \
     cycle_started_at, cycle_reset_at";

pub struct LedgerPostgresRepository {
    pool: Arc<PgPool>,
}

impl LedgerPostgresRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct LedgerRow {
    user_id: Uuid,
    plan_id: Uuid,
    plan_kind: String,
    inquiry_limit: i32,
    unlimited: bool,
    premium_pool_limit: Option<i32>,
    regular_pool_limit: Option<i32>,
    premium_used: i32,
    regular_used: i32,
    cycle_started_at: DateTime<Utc>,
    cycle_reset_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = anyhow::Error;

    fn try_from(r: LedgerRow) -> Result<Self, Self::Error> {
        let plan_kind = PlanKind::from_str(&r.plan_kind)
            .ok_or_else(|| anyhow::anyhow!("unknown plan kind: {}", r.plan_kind))?;
        Ok(LedgerEntry {
            user_id: r.user_id,
            plan_id: r.plan_id,
            plan_kind,
            limit: r.inquiry_limit.max(0) as u32,
            unlimited: r.unlimited,
            premium_pool_limit: r.premium_pool_limit.map(|v| v.max(0) as u32),
            regular_pool_limit: r.regular_pool_limit.map(|v| v.max(0) as u32),
            premium_used: r.premium_used.max(0) as u32,
            regular_used: r.regular_used.max(0) as u32,
            cycle_started_at: r.cycle_started_at,
            cycle_reset_at: r.cycle_reset_at,
        })
    }
}

/// 上限付きで 1 件加算する UPDATE。create_with_quota のトランザクション内で、
/// 台帳行を FOR UPDATE で確保した後に実行する。
/// 合計上限とプール上限 (未設定なら合計上限) の両方を満たす場合のみ加算し、行を返す。
pub(crate) fn increment_sql(pool: QuotaPool) -> String {
    let (column, pool_limit) = match pool {
        QuotaPool::PremiumProfile => ("premium_used", "premium_pool_limit"),
        QuotaPool::Regular => ("regular_used", "regular_pool_limit"),
    };
    format!(
        "UPDATE inquiry.ledgers SET {col} = {col} + 1 \
         WHERE user_id = $1 AND (unlimited OR ( \
             premium_used + regular_used < inquiry_limit \
             AND {col} < LEAST(COALESCE({lim}, inquiry_limit), inquiry_limit))) \
         RETURNING {cols}",
        col = column,
        lim = pool_limit,
        cols = LEDGER_COLUMNS
    )
}

/// 枠を 1 件戻す。0 未満にはしない。
pub(crate) fn release_sql(pool: QuotaPool) -> String {
    let column = match pool {
        QuotaPool::PremiumProfile => "premium_used",
        QuotaPool::Regular => "regular_used",
    };
    format!(
        "UPDATE inquiry.ledgers SET {col} = GREATEST({col} - 1, 0) \
         WHERE user_id = $1 RETURNING {cols}",
        col = column,
        cols = LEDGER_COLUMNS
    )
}

impl LedgerPostgresRepository {
    async fn fetch(&self, user_id: Uuid) -> anyhow::Result<LedgerEntry> {
        self.find(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("ledger not found for user {}", user_id))
    }
}

#[async_trait]
impl LedgerRepository for LedgerPostgresRepository {
    async fn find(&self, user_id: Uuid) -> anyhow::Result<Option<LedgerEntry>> {
        let row: Option<LedgerRow> = sqlx::query_as(&format!(
            "SELECT {} FROM inquiry.ledgers WHERE user_id = $1",
            LEDGER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(LedgerEntry::try_from).transpose()
    }

    async fn create_if_absent(&self, entry: &LedgerEntry) -> anyhow::Result<LedgerEntry> {
        sqlx::query(
            "INSERT INTO inquiry.ledgers \
             (user_id, plan_id, plan_kind, inquiry_limit, unlimited, premium_pool_limit, \
              regular_pool_limit, premium_used, regular_used, cycle_started_at, cycle_reset_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(entry.user_id)
        .bind(entry.plan_id)
        .bind(entry.plan_kind.as_str())
        .bind(entry.limit as i32)
        .bind(entry.unlimited)
        .bind(entry.premium_pool_limit.map(|v| v as i32))
        .bind(entry.regular_pool_limit.map(|v| v as i32))
        .bind(entry.premium_used as i32)
        .bind(entry.regular_used as i32)
        .bind(entry.cycle_started_at)
        .bind(entry.cycle_reset_at)
        .execute(self.pool.as_ref())
        .await?;

        self.fetch(entry.user_id).await
    }

    async fn switch_plan(&self, user_id: Uuid, plan: &InquiryPlan) -> anyhow::Result<LedgerEntry> {
        let row: Option<LedgerRow> = sqlx::query_as(&format!(
            "UPDATE inquiry.ledgers \
             SET plan_id = $2, plan_kind = $3, inquiry_limit = $4, unlimited = $5, \
                 premium_pool_limit = $6, regular_pool_limit = $7 \
             WHERE user_id = $1 RETURNING {}",
            LEDGER_COLUMNS
        ))
        .bind(user_id)
        .bind(plan.id)
        .bind(plan.kind.as_str())
        .bind(plan.limit as i32)
        .bind(plan.unlimited)
        .bind(plan.premium_pool_limit.map(|v| v as i32))
        .bind(plan.regular_pool_limit.map(|v| v as i32))
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(LedgerEntry::try_from)
            .transpose()?
            .ok_or_else(|| anyhow::anyhow!("ledger not found for user {}", user_id))
    }

    async fn reset_cycle(
        &self,
        user_id: Uuid,
        plan: &InquiryPlan,
        now: DateTime<Utc>,
    ) -> anyhow::Result<LedgerEntry> {
        sqlx::query(
            "UPDATE inquiry.ledgers \
             SET premium_used = 0, regular_used = 0, cycle_started_at = $2, cycle_reset_at = $3 \
             WHERE user_id = $1 AND cycle_reset_at <= $2",
        )
        .bind(user_id)
        .bind(now)
        .bind(now + plan.reset_period())
        .execute(self.pool.as_ref())
        .await?;

        self.fetch(user_id).await
    }

    async fn reset_elapsed(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "UPDATE inquiry.ledgers AS l \
             SET premium_used = 0, regular_used = 0, cycle_started_at = $1, \
                 cycle_reset_at = $1 + make_interval(days => p.reset_period_days) \
             FROM inquiry.plans AS p \
             WHERE p.id = l.plan_id AND l.cycle_reset_at <= $1 \
             RETURNING l.user_id",
        )
        .bind(now)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_sql_uses_pool_column() {
        let sql = increment_sql(QuotaPool::PremiumProfile);
        assert!(sql.contains("SET premium_used = premium_used + 1"));
        assert!(sql.contains("COALESCE(premium_pool_limit, inquiry_limit)"));

        let sql = increment_sql(QuotaPool::Regular);
        assert!(sql.contains("SET regular_used = regular_used + 1"));
    }

    #[test]
    fn test_release_sql_never_goes_negative() {
        let sql = release_sql(QuotaPool::Regular);
        assert!(sql.contains("GREATEST(regular_used - 1, 0)"));
    }
}
