use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::ledger::{InquiryPlan, PlanKind};
use crate::domain::repository::PlanRepository;

const PLAN_COLUMNS: &str = "id, kind, name, inquiry_limit, unlimited, premium_pool_limit, \
                            regular_pool_limit, reset_period_days, is_default, sort, description";

pub struct PlanPostgresRepository {
    pool: Arc<PgPool>,
}

impl PlanPostgresRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    kind: String,
    name: String,
    inquiry_limit: i32,
    unlimited: bool,
    premium_pool_limit: Option<i32>,
    regular_pool_limit: Option<i32>,
    reset_period_days: i32,
    is_default: bool,
    sort: i32,
    description: Option<String>,
}

impl TryFrom<PlanRow> for InquiryPlan {
    type Error = anyhow::Error;

    fn try_from(r: PlanRow) -> Result<Self, Self::Error> {
        let kind = PlanKind::from_str(&r.kind)
            .ok_or_else(|| anyhow::anyhow!("unknown plan kind: {}", r.kind))?;
        Ok(InquiryPlan {
            id: r.id,
            kind,
            name: r.name,
            limit: r.inquiry_limit.max(0) as u32,
            unlimited: r.unlimited,
            premium_pool_limit: r.premium_pool_limit.map(|v| v.max(0) as u32),
            regular_pool_limit: r.regular_pool_limit.map(|v| v.max(0) as u32),
            reset_period_days: r.reset_period_days.max(1) as u32,
            is_default: r.is_default,
            sort: r.sort.max(0) as u32,
            description: r.description,
        })
    }
}

#[async_trait]
impl PlanRepository for PlanPostgresRepository {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<InquiryPlan>> {
        let row: Option<PlanRow> = sqlx::query_as(&format!(
            "SELECT {} FROM inquiry.plans WHERE id = $1",
            PLAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(InquiryPlan::try_from).transpose()
    }

    async fn find_by_kind(&self, kind: PlanKind) -> anyhow::Result<Option<InquiryPlan>> {
        let row: Option<PlanRow> = sqlx::query_as(&format!(
            "SELECT {} FROM inquiry.plans WHERE kind = $1",
            PLAN_COLUMNS
        ))
        .bind(kind.as_str())
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(InquiryPlan::try_from).transpose()
    }

    async fn find_default(&self) -> anyhow::Result<Option<InquiryPlan>> {
        let row: Option<PlanRow> = sqlx::query_as(&format!(
            "SELECT {} FROM inquiry.plans WHERE is_default ORDER BY sort LIMIT 1",
            PLAN_COLUMNS
        ))
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(InquiryPlan::try_from).transpose()
    }

    async fn list(&self) -> anyhow::Result<Vec<InquiryPlan>> {
        let rows: Vec<PlanRow> = sqlx::query_as(&format!(
            "SELECT {} FROM inquiry.plans ORDER BY sort",
            PLAN_COLUMNS
        ))
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.into_iter().map(InquiryPlan::try_from).collect()
    }
}
