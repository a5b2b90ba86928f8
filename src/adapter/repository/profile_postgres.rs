use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::profile::{AnonymousPromotion, Profile, ProfileBase, ProfileKind};
use crate::domain::repository::ProfileDirectory;

const PROFILE_COLUMNS: &str = "id, uuid, user_id, kind, slug, first_name, last_name, picture_url, \
     premium_until, anonymous_uuid, promoted_at, affiliation";

/// ProfilePostgresRepository はプロフィールサービスから複製されたテーブルを読む。
pub struct ProfilePostgresRepository {
    pool: Arc<PgPool>,
}

impl ProfilePostgresRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn find_where(&self, column: &str, value: Uuid) -> anyhow::Result<Option<Profile>> {
        let row: Option<ProfileRow> = sqlx::query_as(&format!(
            "SELECT {} FROM inquiry.profiles WHERE {} = $1",
            PROFILE_COLUMNS, column
        ))
        .bind(value)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Profile::try_from).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: i64,
    uuid: Uuid,
    user_id: Uuid,
    kind: String,
    slug: String,
    first_name: String,
    last_name: String,
    picture_url: Option<String>,
    premium_until: Option<DateTime<Utc>>,
    anonymous_uuid: Option<Uuid>,
    promoted_at: Option<DateTime<Utc>>,
    affiliation: Option<String>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = anyhow::Error;

    fn try_from(r: ProfileRow) -> Result<Self, Self::Error> {
        let kind = ProfileKind::from_str(&r.kind)
            .ok_or_else(|| anyhow::anyhow!("unknown profile kind: {}", r.kind))?;
        let anonymous_promotion = match (r.anonymous_uuid, r.promoted_at) {
            (Some(anonymous_uuid), Some(promoted_at)) => Some(AnonymousPromotion {
                anonymous_uuid,
                promoted_at,
            }),
            _ => None,
        };
        let base = ProfileBase {
            id: r.id,
            uuid: r.uuid,
            user_id: r.user_id,
            slug: r.slug,
            first_name: r.first_name,
            last_name: r.last_name,
            picture_url: r.picture_url,
            premium_until: r.premium_until,
            anonymous_promotion,
        };
        Ok(match kind {
            ProfileKind::Player => Profile::Player {
                base,
                team: r.affiliation,
            },
            ProfileKind::Coach => Profile::Coach {
                base,
                club: r.affiliation,
            },
            ProfileKind::Club => Profile::Club {
                base,
                club_name: r.affiliation.unwrap_or_default(),
            },
            ProfileKind::Scout => Profile::Scout {
                base,
                agency: r.affiliation,
            },
            ProfileKind::Guest => Profile::Guest { base },
        })
    }
}

#[async_trait]
impl ProfileDirectory for ProfilePostgresRepository {
    async fn find_by_uuid(&self, uuid: Uuid) -> anyhow::Result<Option<Profile>> {
        self.find_where("uuid", uuid).await
    }

    async fn find_by_anonymous_uuid(
        &self,
        anonymous_uuid: Uuid,
    ) -> anyhow::Result<Option<Profile>> {
        self.find_where("anonymous_uuid", anonymous_uuid).await
    }

    async fn find_by_user(&self, user_id: Uuid) -> anyhow::Result<Option<Profile>> {
        self.find_where("user_id", user_id).await
    }
}
