use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::entity::event::InquiryEvent;
use crate::domain::entity::inquiry_request::InquiryRequest;
use crate::domain::entity::ledger::QuotaPool;
use crate::domain::entity::profile::{AddressableProfile, Profile};
use crate::domain::repository::{CreateOutcome, InquiryRequestRepository, ProfileDirectory};
use crate::domain::service::AnonymityResolver;
use crate::usecase::quota_ledger::{QuotaLedger, QuotaLedgerError};
use crate::usecase::reconcile_cross_request::{
    CrossRequestReconciler, ReconcileError, Reconciliation,
};

/// 作成トランザクション中に逆方向のリクエストが現れた場合の最大試行回数。
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct OpenInquiryInput {
    pub sender_user_id: Uuid,
    /// 受信者のプロフィール UUID、または匿名 UUID。
    pub target: Uuid,
    pub anonymous_recipient: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct OpenInquiryOutput {
    pub request: InquiryRequest,
    /// 相互リクエストとして既存のリクエストを承認した場合は true。
    pub matched: bool,
    pub events: Vec<InquiryEvent>,
}

#[derive(Debug, thiserror::Error)]
pub enum OpenInquiryError {
    #[error("validation error on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("You can't send inquiry to yourself")]
    SelfInquiry,

    #[error("Recipient does not exist: {0}")]
    RecipientNotFound(Uuid),

    #[error("You have already sent an inquiry to this profile")]
    Duplicate(Uuid),

    #[error("The other side has already accepted your contact request")]
    AlreadyAccepted(Uuid),

    #[error("You have reached your limit of inquiries ({counter}/{limit}).")]
    QuotaExceeded { counter: u32, limit: u32 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<QuotaLedgerError> for OpenInquiryError {
    fn from(e: QuotaLedgerError) -> Self {
        OpenInquiryError::Internal(e.to_string())
    }
}

impl From<ReconcileError> for OpenInquiryError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::AlreadyAccepted(id) => OpenInquiryError::AlreadyAccepted(id),
            other => OpenInquiryError::Internal(other.to_string()),
        }
    }
}

pub struct OpenInquiryUseCase {
    inquiry_repo: Arc<dyn InquiryRequestRepository>,
    profiles: Arc<dyn ProfileDirectory>,
    ledger: Arc<QuotaLedger>,
    reconciler: Arc<CrossRequestReconciler>,
    resolver: AnonymityResolver,
}

impl OpenInquiryUseCase {
    pub fn new(
        inquiry_repo: Arc<dyn InquiryRequestRepository>,
        profiles: Arc<dyn ProfileDirectory>,
        ledger: Arc<QuotaLedger>,
        reconciler: Arc<CrossRequestReconciler>,
    ) -> Self {
        Self {
            inquiry_repo,
            profiles,
            ledger,
            reconciler,
            resolver: AnonymityResolver::new(),
        }
    }

    pub async fn execute(
        &self,
        input: &OpenInquiryInput,
    ) -> Result<OpenInquiryOutput, OpenInquiryError> {
        let sender = self
            .profiles
            .find_by_user(input.sender_user_id)
            .await
            .map_err(|e| OpenInquiryError::Internal(e.to_string()))?
            .ok_or_else(|| OpenInquiryError::Validation {
                field: "sender".to_string(),
                message: "caller has no profile".to_string(),
            })?;

        let (recipient, anonymous) = self.resolve_recipient(input).await?;
        let recipient_id = recipient.user_id();

        if recipient_id == input.sender_user_id {
            return Err(OpenInquiryError::SelfInquiry);
        }
        if anonymous && recipient.anonymous_uuid().is_none() {
            return Err(OpenInquiryError::Validation {
                field: "anonymous_recipient".to_string(),
                message: "recipient is not anonymously promoted".to_string(),
            });
        }

        for attempt in 0..MAX_ATTEMPTS {
            if let Reconciliation::Matched { request, events } = self
                .reconciler
                .reconcile(input.sender_user_id, recipient_id)
                .await?
            {
                return Ok(OpenInquiryOutput {
                    request,
                    matched: true,
                    events,
                });
            }

            if let Some(existing) = self
                .inquiry_repo
                .find_open_for_triple(input.sender_user_id, recipient_id, anonymous)
                .await
                .map_err(|e| OpenInquiryError::Internal(e.to_string()))?
            {
                return Err(OpenInquiryError::Duplicate(existing.id));
            }

            let entry = self
                .ledger
                .ensure_entry(input.sender_user_id, &sender)
                .await?;
            let target_is_premium = recipient.is_premium(Utc::now());
            let decision = self
                .ledger
                .can_open(input.sender_user_id, target_is_premium)
                .await;
            if !decision.allowed {
                let exceeded = entry.exceeded(QuotaPool::for_target(target_is_premium));
                return Err(OpenInquiryError::QuotaExceeded {
                    counter: exceeded.counter,
                    limit: exceeded.limit,
                });
            }

            let request = self.build_request(
                input.sender_user_id,
                &recipient,
                anonymous,
                target_is_premium,
            )?;

            match self
                .inquiry_repo
                .create_with_quota(&request)
                .await
                .map_err(|e| OpenInquiryError::Internal(e.to_string()))?
            {
                CreateOutcome::Created { ledger } => {
                    tracing::info!(
                        request_id = %request.id,
                        sender_id = %request.sender_id,
                        recipient_id = %request.recipient_id,
                        anonymous_recipient = request.anonymous_recipient,
                        pool = request.target_pool.as_str(),
                        counter = ledger.counter(),
                        limit = ledger.limit,
                        "inquiry sent"
                    );
                    let now = Utc::now();
                    let mut events = vec![InquiryEvent::InquirySent {
                        request_id: request.id,
                        sender_id: request.sender_id,
                        recipient_id: request.recipient_id,
                        anonymous_recipient: request.anonymous_recipient,
                        occurred_at: now,
                    }];
                    if ledger.is_exhausted() {
                        events.push(InquiryEvent::QuotaExhausted {
                            user_id: request.sender_id,
                            counter: ledger.counter(),
                            limit: ledger.limit,
                            occurred_at: now,
                        });
                    }
                    return Ok(OpenInquiryOutput {
                        request,
                        matched: false,
                        events,
                    });
                }
                CreateOutcome::Duplicate(existing) => {
                    return Err(OpenInquiryError::Duplicate(existing.id));
                }
                CreateOutcome::QuotaExceeded { counter, limit } => {
                    return Err(OpenInquiryError::QuotaExceeded { counter, limit });
                }
                CreateOutcome::CrossRequestDetected(inverse) => {
                    tracing::debug!(
                        attempt,
                        inverse_id = %inverse.id,
                        "inverse request appeared during creation, reconciling"
                    );
                }
            }
        }

        Err(OpenInquiryError::Internal(
            "cross request reconciliation did not settle".to_string(),
        ))
    }

    /// target をプロフィール UUID、次に匿名 UUID として解決する。
    /// 匿名 UUID で解決した場合は常に匿名扱い。
    async fn resolve_recipient(
        &self,
        input: &OpenInquiryInput,
    ) -> Result<(Profile, bool), OpenInquiryError> {
        if let Some(profile) = self
            .profiles
            .find_by_uuid(input.target)
            .await
            .map_err(|e| OpenInquiryError::Internal(e.to_string()))?
        {
            return Ok((profile, input.anonymous_recipient.unwrap_or(false)));
        }
        if let Some(profile) = self
            .profiles
            .find_by_anonymous_uuid(input.target)
            .await
            .map_err(|e| OpenInquiryError::Internal(e.to_string()))?
        {
            return Ok((profile, true));
        }
        Err(OpenInquiryError::RecipientNotFound(input.target))
    }

    fn build_request(
        &self,
        sender_id: Uuid,
        recipient: &Profile,
        anonymous: bool,
        target_is_premium: bool,
    ) -> Result<InquiryRequest, OpenInquiryError> {
        let anonymous_uuid = self.resolver.capture_identity_at_creation(recipient, anonymous);
        InquiryRequest::new(
            sender_id,
            recipient.user_id(),
            anonymous,
            anonymous_uuid,
            QuotaPool::for_target(target_is_premium),
        )
        .ok_or(OpenInquiryError::SelfInquiry)
    }
}
