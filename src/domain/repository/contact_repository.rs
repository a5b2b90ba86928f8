use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::entity::contact::InquiryContact;
use crate::domain::entity::profile::Profile;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn find(&self, user_id: Uuid) -> anyhow::Result<Option<InquiryContact>>;
    async fn upsert(&self, contact: &InquiryContact) -> anyhow::Result<InquiryContact>;
}

/// ProfileDirectory は外部のプロフィールサービスへの読み取り専用の窓口。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn find_by_uuid(&self, uuid: Uuid) -> anyhow::Result<Option<Profile>>;
    async fn find_by_anonymous_uuid(&self, anonymous_uuid: Uuid)
        -> anyhow::Result<Option<Profile>>;
    async fn find_by_user(&self, user_id: Uuid) -> anyhow::Result<Option<Profile>>;
}
