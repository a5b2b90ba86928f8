use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::entity::inquiry_request::{InquiryRequest, InquiryStatus};
use crate::domain::entity::profile::{AddressableProfile, Identity, Profile};
use crate::domain::repository::{ContactRepository, ProfileDirectory};
use crate::domain::service::AnonymityResolver;

/// RenderContext は表示の文脈。Anonymous では双方のアイデンティティを完全に伏せる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderContext {
    #[default]
    Standard,
    Anonymous,
}

/// RequestView は API レスポンスとして返すリクエストの表示形。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestView {
    pub id: Uuid,
    pub status: InquiryStatus,
    pub anonymous_recipient: bool,
    pub is_read_by_sender: bool,
    pub is_read_by_recipient: bool,
    pub sender_object: Identity,
    pub recipient_object: Identity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderInquiryError {
    #[error("viewer {0} is not a participant of the request")]
    NotParticipant(Uuid),

    #[error("internal error: {0}")]
    Internal(String),
}

pub struct RenderInquiryUseCase {
    profiles: Arc<dyn ProfileDirectory>,
    contacts: Arc<dyn ContactRepository>,
    resolver: AnonymityResolver,
}

impl RenderInquiryUseCase {
    pub fn new(profiles: Arc<dyn ProfileDirectory>, contacts: Arc<dyn ContactRepository>) -> Self {
        Self {
            profiles,
            contacts,
            resolver: AnonymityResolver::new(),
        }
    }

    pub async fn render(
        &self,
        request: &InquiryRequest,
        viewer: Uuid,
        context: RenderContext,
    ) -> Result<RequestView, RenderInquiryError> {
        if request.role_of(viewer).is_none() {
            return Err(RenderInquiryError::NotParticipant(viewer));
        }

        let sender_profile = self.profile(request.sender_id).await?;
        let recipient_profile = self.profile(request.recipient_id).await?;

        let mut sender_object = match sender_profile.as_ref() {
            Some(p) => p.display_identity(),
            None => Identity::unknown(None),
        };
        let mut recipient_object = self
            .resolver
            .resolve_display_identity(request, recipient_profile.as_ref());

        match context {
            RenderContext::Anonymous => {
                sender_object = scrub(sender_object, sender_profile.as_ref());
                recipient_object = scrub(recipient_object, recipient_profile.as_ref());
            }
            RenderContext::Standard if request.status == InquiryStatus::Accepted => {
                // 承認済みの場合のみ相手側の連絡先を開示する
                if viewer == request.sender_id {
                    recipient_object = self.disclose(recipient_object, request.recipient_id).await?;
                } else {
                    sender_object = self.disclose(sender_object, request.sender_id).await?;
                }
            }
            RenderContext::Standard => {}
        }

        Ok(RequestView {
            id: request.id,
            status: request.status,
            anonymous_recipient: request.anonymous_recipient,
            is_read_by_sender: request.is_read_by_sender,
            is_read_by_recipient: request.is_read_by_recipient,
            sender_object,
            recipient_object,
            created_at: request.created_at,
            updated_at: request.updated_at,
        })
    }

    pub async fn render_all(
        &self,
        requests: &[InquiryRequest],
        viewer: Uuid,
        context: RenderContext,
    ) -> Result<Vec<RequestView>, RenderInquiryError> {
        let mut views = Vec::with_capacity(requests.len());
        for request in requests {
            views.push(self.render(request, viewer, context).await?);
        }
        Ok(views)
    }

    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>, RenderInquiryError> {
        self.profiles
            .find_by_user(user_id)
            .await
            .map_err(|e| RenderInquiryError::Internal(e.to_string()))
    }

    async fn disclose(
        &self,
        identity: Identity,
        owner: Uuid,
    ) -> Result<Identity, RenderInquiryError> {
        let contact = self
            .contacts
            .find(owner)
            .await
            .map_err(|e| RenderInquiryError::Internal(e.to_string()))?;
        Ok(match contact {
            Some(c) => identity.with_contact(c.phone, c.email),
            None => identity,
        })
    }
}

/// 既に匿名化済みならそのまま、そうでなければプロフィールの匿名 UUID か unknown に置き換える。
fn scrub(identity: Identity, profile: Option<&Profile>) -> Identity {
    if identity.is_anonymous {
        return identity;
    }
    match profile.and_then(|p| p.anonymous_uuid()) {
        Some(anonymous_uuid) => Identity::anonymous(anonymous_uuid, identity.kind),
        None => Identity::unknown(identity.kind),
    }
}
