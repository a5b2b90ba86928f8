use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::adapter::repository::ledger_postgres::{
    increment_sql, release_sql, LedgerRow, LEDGER_COLUMNS,
};
use crate::domain::entity::inquiry_request::{InquiryRequest, InquiryStatus};
use crate::domain::entity::ledger::{LedgerEntry, QuotaPool};
use crate::domain::repository::{CreateOutcome, InquiryRequestRepository};

const REQUEST_COLUMNS: &str = "id, sender_id, recipient_id, status, anonymous_recipient, \
     recipient_anonymous_uuid, target_pool, is_read_by_sender, is_read_by_recipient, \
     reminders_sent, sender_restored, created_at, updated_at";

/// InquiryPostgresRepository はリクエストの保存と、台帳と一体の作成トランザクションを扱う。
pub struct InquiryPostgresRepository {
    pool: Arc<PgPool>,
}

impl InquiryPostgresRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: Uuid,
    sender_id: Uuid,
    recipient_id: Uuid,
    status: String,
    anonymous_recipient: bool,
    recipient_anonymous_uuid: Option<Uuid>,
    target_pool: String,
    is_read_by_sender: bool,
    is_read_by_recipient: bool,
    reminders_sent: i16,
    sender_restored: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for InquiryRequest {
    type Error = anyhow::Error;

    fn try_from(r: RequestRow) -> Result<Self, Self::Error> {
        let status = InquiryStatus::from_str(&r.status)
            .ok_or_else(|| anyhow::anyhow!("unknown inquiry status: {}", r.status))?;
        let target_pool = QuotaPool::from_str(&r.target_pool)
            .ok_or_else(|| anyhow::anyhow!("unknown quota pool: {}", r.target_pool))?;
        Ok(InquiryRequest {
            id: r.id,
            sender_id: r.sender_id,
            recipient_id: r.recipient_id,
            status,
            anonymous_recipient: r.anonymous_recipient,
            recipient_anonymous_uuid: r.recipient_anonymous_uuid,
            target_pool,
            is_read_by_sender: r.is_read_by_sender,
            is_read_by_recipient: r.is_read_by_recipient,
            reminders_sent: r.reminders_sent.clamp(0, i16::from(u8::MAX)) as u8,
            sender_restored: r.sender_restored,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn into_requests(rows: Vec<RequestRow>) -> anyhow::Result<Vec<InquiryRequest>> {
    rows.into_iter().map(InquiryRequest::try_from).collect()
}

async fn latest_open_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    sender_id: Uuid,
    recipient_id: Uuid,
) -> anyhow::Result<Option<InquiryRequest>> {
    let row: Option<RequestRow> = sqlx::query_as(&format!(
        "SELECT {} FROM inquiry.requests \
         WHERE sender_id = $1 AND recipient_id = $2 AND status <> 'REJECTED' \
         ORDER BY created_at DESC LIMIT 1",
        REQUEST_COLUMNS
    ))
    .bind(sender_id)
    .bind(recipient_id)
    .fetch_optional(&mut **tx)
    .await?;

    row.map(InquiryRequest::try_from).transpose()
}

#[async_trait]
impl InquiryRequestRepository for InquiryPostgresRepository {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<InquiryRequest>> {
        let row: Option<RequestRow> = sqlx::query_as(&format!(
            "SELECT {} FROM inquiry.requests WHERE id = $1",
            REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(InquiryRequest::try_from).transpose()
    }

    async fn find_latest_open(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
    ) -> anyhow::Result<Option<InquiryRequest>> {
        let row: Option<RequestRow> = sqlx::query_as(&format!(
            "SELECT {} FROM inquiry.requests \
             WHERE sender_id = $1 AND recipient_id = $2 AND status <> 'REJECTED' \
             ORDER BY created_at DESC LIMIT 1",
            REQUEST_COLUMNS
        ))
        .bind(sender_id)
        .bind(recipient_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(InquiryRequest::try_from).transpose()
    }

    async fn find_open_for_triple(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        anonymous_recipient: bool,
    ) -> anyhow::Result<Option<InquiryRequest>> {
        let row: Option<RequestRow> = sqlx::query_as(&format!(
            "SELECT {} FROM inquiry.requests \
             WHERE sender_id = $1 AND recipient_id = $2 AND anonymous_recipient = $3 \
               AND status <> 'REJECTED'",
            REQUEST_COLUMNS
        ))
        .bind(sender_id)
        .bind(recipient_id)
        .bind(anonymous_recipient)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(InquiryRequest::try_from).transpose()
    }

    async fn list_sent(&self, sender_id: Uuid) -> anyhow::Result<Vec<InquiryRequest>> {
        let rows: Vec<RequestRow> = sqlx::query_as(&format!(
            "SELECT {} FROM inquiry.requests WHERE sender_id = $1 ORDER BY created_at DESC",
            REQUEST_COLUMNS
        ))
        .bind(sender_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        into_requests(rows)
    }

    async fn list_received(&self, recipient_id: Uuid) -> anyhow::Result<Vec<InquiryRequest>> {
        let rows: Vec<RequestRow> = sqlx::query_as(&format!(
            "SELECT {} FROM inquiry.requests WHERE recipient_id = $1 ORDER BY created_at DESC",
            REQUEST_COLUMNS
        ))
        .bind(recipient_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        into_requests(rows)
    }

    async fn list_contacts(&self, user_id: Uuid) -> anyhow::Result<Vec<InquiryRequest>> {
        let rows: Vec<RequestRow> = sqlx::query_as(&format!(
            "SELECT {} FROM inquiry.requests \
             WHERE status = 'ACCEPTED' AND (sender_id = $1 OR recipient_id = $1) \
             ORDER BY updated_at DESC",
            REQUEST_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        into_requests(rows)
    }

    async fn update_status(
        &self,
        request: &InquiryRequest,
        expected: InquiryStatus,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE inquiry.requests \
             SET status = $2, is_read_by_sender = $3, is_read_by_recipient = $4, updated_at = $5 \
             WHERE id = $1 AND status = $6",
        )
        .bind(request.id)
        .bind(request.status.as_str())
        .bind(request.is_read_by_sender)
        .bind(request.is_read_by_recipient)
        .bind(request.updated_at)
        .bind(expected.as_str())
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn create_with_quota(&self, request: &InquiryRequest) -> anyhow::Result<CreateOutcome> {
        let mut tx = self.pool.begin().await?;

        // 2 人の組み合わせ単位で直列化する (方向は問わない)
        sqlx::query(
            "SELECT pg_advisory_xact_lock(hashtext( \
                 LEAST($1::text, $2::text) || ':' || GREATEST($1::text, $2::text)))",
        )
        .bind(request.sender_id)
        .bind(request.recipient_id)
        .execute(&mut *tx)
        .await?;

        if let Some(inverse) =
            latest_open_in_tx(&mut tx, request.recipient_id, request.sender_id).await?
        {
            tx.rollback().await?;
            return Ok(CreateOutcome::CrossRequestDetected(inverse));
        }

        let duplicate: Option<RequestRow> = sqlx::query_as(&format!(
            "SELECT {} FROM inquiry.requests \
             WHERE sender_id = $1 AND recipient_id = $2 AND anonymous_recipient = $3 \
               AND status <> 'REJECTED'",
            REQUEST_COLUMNS
        ))
        .bind(request.sender_id)
        .bind(request.recipient_id)
        .bind(request.anonymous_recipient)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(existing) = duplicate {
            tx.rollback().await?;
            return Ok(CreateOutcome::Duplicate(existing.try_into()?));
        }

        let current: Option<LedgerRow> = sqlx::query_as(&format!(
            "SELECT {} FROM inquiry.ledgers WHERE user_id = $1 FOR UPDATE",
            LEDGER_COLUMNS
        ))
        .bind(request.sender_id)
        .fetch_optional(&mut *tx)
        .await?;
        let current: LedgerEntry = current
            .ok_or_else(|| anyhow::anyhow!("ledger not found for user {}", request.sender_id))?
            .try_into()?;

        let incremented: Option<LedgerRow> = sqlx::query_as(&increment_sql(request.target_pool))
            .bind(request.sender_id)
            .fetch_optional(&mut *tx)
            .await?;
        let ledger: LedgerEntry = match incremented {
            Some(row) => row.try_into()?,
            None => {
                tx.rollback().await?;
                let exceeded = current.exceeded(request.target_pool);
                return Ok(CreateOutcome::QuotaExceeded {
                    counter: exceeded.counter,
                    limit: exceeded.limit,
                });
            }
        };

        sqlx::query(
            "INSERT INTO inquiry.requests \
             (id, sender_id, recipient_id, status, anonymous_recipient, recipient_anonymous_uuid, \
              target_pool, is_read_by_sender, is_read_by_recipient, reminders_sent, \
              sender_restored, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(request.id)
        .bind(request.sender_id)
        .bind(request.recipient_id)
        .bind(request.status.as_str())
        .bind(request.anonymous_recipient)
        .bind(request.recipient_anonymous_uuid)
        .bind(request.target_pool.as_str())
        .bind(request.is_read_by_sender)
        .bind(request.is_read_by_recipient)
        .bind(i16::from(request.reminders_sent))
        .bind(request.sender_restored)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CreateOutcome::Created { ledger })
    }

    async fn list_pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<InquiryRequest>> {
        let rows: Vec<RequestRow> = sqlx::query_as(&format!(
            "SELECT {} FROM inquiry.requests \
             WHERE status IN ('SENT', 'RECEIVED') AND created_at < $1 \
             ORDER BY created_at",
            REQUEST_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(self.pool.as_ref())
        .await?;

        into_requests(rows)
    }

    async fn restore_sender_quota(
        &self,
        request_id: Uuid,
    ) -> anyhow::Result<Option<LedgerEntry>> {
        let mut tx = self.pool.begin().await?;

        let marked: Option<(Uuid, String)> = sqlx::query_as(
            "UPDATE inquiry.requests SET sender_restored = TRUE, updated_at = NOW() \
             WHERE id = $1 AND NOT sender_restored AND status IN ('SENT', 'RECEIVED') \
             RETURNING sender_id, target_pool",
        )
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (sender_id, pool) = match marked {
            Some((sender_id, pool)) => {
                let pool = QuotaPool::from_str(&pool)
                    .ok_or_else(|| anyhow::anyhow!("unknown quota pool: {}", pool))?;
                (sender_id, pool)
            }
            None => {
                tx.rollback().await?;
                return Ok(None);
            }
        };

        let row: Option<LedgerRow> = sqlx::query_as(&release_sql(pool))
            .bind(sender_id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        row.map(LedgerEntry::try_from).transpose()
    }

    async fn record_reminder(&self, request_id: Uuid, expected: u8) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE inquiry.requests SET reminders_sent = reminders_sent + 1 \
             WHERE id = $1 AND reminders_sent = $2 AND status IN ('SENT', 'RECEIVED')",
        )
        .bind(request_id)
        .bind(i16::from(expected))
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
