//! Anonymity resolver domain service.

use uuid::Uuid;

use crate::domain::entity::inquiry_request::{InquiryRequest, InquiryStatus};
use crate::domain::entity::profile::{AddressableProfile, Identity, Profile};

/// AnonymityResolver は受信者の実名と匿名アイデンティティの対応を扱う。
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymityResolver;

impl AnonymityResolver {
    pub fn new() -> Self {
        Self
    }

    /// 匿名で宛てる場合のみ、受信者の現在の匿名 UUID を作成時点の値として返す。
    pub fn capture_identity_at_creation(&self, recipient: &Profile, anonymous: bool) -> Option<Uuid> {
        if !anonymous {
            return None;
        }
        recipient.anonymous_uuid()
    }

    /// 匿名化が必要なリクエストかどうか。承認後は常に実名。
    pub fn must_mask(&self, request: &InquiryRequest) -> bool {
        request.anonymous_recipient && request.status != InquiryStatus::Accepted
    }

    /// 受信者側として表示するアイデンティティを返す。
    ///
    /// 匿名 UUID は次の順で探す:
    /// 1. リクエスト作成時に凍結した値
    /// 2. プロフィールの現在のプロモーション
    /// 3. どちらもなければ "unknown" の縮退表示 (警告ログを出す)
    pub fn resolve_display_identity(
        &self,
        request: &InquiryRequest,
        profile: Option<&Profile>,
    ) -> Identity {
        if !self.must_mask(request) {
            if let Some(profile) = profile {
                return profile.display_identity();
            }
            tracing::warn!(
                request_id = %request.id,
                recipient_id = %request.recipient_id,
                "recipient profile missing, rendering placeholder"
            );
            return Identity::unknown(None);
        }

        let kind = profile.map(|p| p.kind());
        if let Some(anonymous_uuid) = request.recipient_anonymous_uuid {
            return Identity::anonymous(anonymous_uuid, kind);
        }
        if let Some(anonymous_uuid) = profile.and_then(|p| p.anonymous_uuid()) {
            return Identity::anonymous(anonymous_uuid, kind);
        }

        tracing::warn!(
            request_id = %request.id,
            recipient_id = %request.recipient_id,
            "anonymous request has no anonymous uuid, falling back to unknown identity"
        );
        Identity::unknown(kind)
    }
}
