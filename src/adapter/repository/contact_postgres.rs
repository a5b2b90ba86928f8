use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::contact::InquiryContact;
use crate::domain::repository::ContactRepository;

pub struct ContactPostgresRepository {
    pool: Arc<PgPool>,
}

impl ContactPostgresRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ContactRow {
    user_id: Uuid,
    phone: Option<String>,
    email: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<ContactRow> for InquiryContact {
    fn from(r: ContactRow) -> Self {
        InquiryContact {
            user_id: r.user_id,
            phone: r.phone,
            email: r.email,
            updated_at: r.updated_at,
        }
    }
}

#[async_trait]
impl ContactRepository for ContactPostgresRepository {
    async fn find(&self, user_id: Uuid) -> anyhow::Result<Option<InquiryContact>> {
        let row: Option<ContactRow> = sqlx::query_as(
            "SELECT user_id, phone, email, updated_at FROM inquiry.contacts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(Into::into))
    }

    async fn upsert(&self, contact: &InquiryContact) -> anyhow::Result<InquiryContact> {
        let row: ContactRow = sqlx::query_as(
            "INSERT INTO inquiry.contacts (user_id, phone, email, updated_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id) \
             DO UPDATE SET phone = EXCLUDED.phone, email = EXCLUDED.email, \
                           updated_at = EXCLUDED.updated_at \
             RETURNING user_id, phone, email, updated_at",
        )
        .bind(contact.user_id)
        .bind(&contact.phone)
        .bind(&contact.email)
        .bind(contact.updated_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row.into())
    }
}
