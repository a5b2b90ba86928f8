use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::entity::event::InquiryEvent;
use crate::domain::entity::inquiry_request::{
    ActorRole, InquiryAction, InquiryRequest, InquiryStatus, TransitionError,
};
use crate::domain::repository::InquiryRequestRepository;

/// 保存済み status の条件付き更新に負けた場合は 1 回だけ再試行する。
const MAX_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    fn action(&self) -> InquiryAction {
        match self {
            Decision::Accept => InquiryAction::Accept,
            Decision::Reject => InquiryAction::Reject,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RespondInquiryInput {
    pub request_id: Uuid,
    pub actor_user_id: Uuid,
    pub decision: Decision,
}

#[derive(Debug, Clone)]
pub struct RespondInquiryOutput {
    pub request: InquiryRequest,
    pub events: Vec<InquiryEvent>,
}

#[derive(Debug, thiserror::Error)]
pub enum RespondInquiryError {
    #[error("InquiryRequest does not exist: {0}")]
    NotFound(Uuid),

    #[error("You are not the owner of this object")]
    NotOwner,

    #[error("You can't {action} this request")]
    TransitionNotAllowed { action: &'static str },

    #[error("inquiry request {0} changed concurrently")]
    Conflict(Uuid),

    #[error("internal error: {0}")]
    Internal(String),
}

/// RespondInquiryUseCase は受信者による承認・拒否を行う。
pub struct RespondInquiryUseCase {
    inquiry_repo: Arc<dyn InquiryRequestRepository>,
}

impl RespondInquiryUseCase {
    pub fn new(inquiry_repo: Arc<dyn InquiryRequestRepository>) -> Self {
        Self { inquiry_repo }
    }

    pub async fn execute(
        &self,
        input: &RespondInquiryInput,
    ) -> Result<RespondInquiryOutput, RespondInquiryError> {
        let action = input.decision.action();

        for _ in 0..MAX_ATTEMPTS {
            let request = self
                .inquiry_repo
                .find_by_id(input.request_id)
                .await
                .map_err(|e| RespondInquiryError::Internal(e.to_string()))?
                .ok_or(RespondInquiryError::NotFound(input.request_id))?;

            let role = request
                .role_of(input.actor_user_id)
                .ok_or(RespondInquiryError::NotOwner)?;
            let updated = request.apply(action, role).map_err(|e| match e {
                TransitionError::NotOwner { .. } => RespondInquiryError::NotOwner,
                TransitionError::NotAllowed { action, .. } => {
                    RespondInquiryError::TransitionNotAllowed { action }
                }
            })?;

            let stored = self
                .inquiry_repo
                .update_status(&updated, request.status)
                .await
                .map_err(|e| RespondInquiryError::Internal(e.to_string()))?;
            if !stored {
                tracing::debug!(request_id = %request.id, "status changed concurrently, retrying");
                continue;
            }

            tracing::info!(
                request_id = %updated.id,
                from = request.status.as_str(),
                to = updated.status.as_str(),
                "inquiry status changed"
            );

            let now = Utc::now();
            let event = match input.decision {
                Decision::Accept => InquiryEvent::InquiryAccepted {
                    request_id: updated.id,
                    sender_id: updated.sender_id,
                    recipient_id: updated.recipient_id,
                    occurred_at: now,
                },
                Decision::Reject => InquiryEvent::InquiryRejected {
                    request_id: updated.id,
                    sender_id: updated.sender_id,
                    recipient_id: updated.recipient_id,
                    occurred_at: now,
                },
            };
            return Ok(RespondInquiryOutput {
                request: updated,
                events: vec![event],
            });
        }

        Err(RespondInquiryError::Conflict(input.request_id))
    }
}

/// 受信者が受信一覧を開いたときに SENT を RECEIVED へ進める。
/// 他の操作と競合して更新できなかった場合は現在の状態のまま返す。
pub async fn mark_received(
    inquiry_repo: &dyn InquiryRequestRepository,
    request: InquiryRequest,
) -> anyhow::Result<InquiryRequest> {
    if request.status != InquiryStatus::Sent {
        return Ok(request);
    }
    let read = match request.apply(InquiryAction::Read, ActorRole::Recipient) {
        Ok(read) => read,
        Err(_) => return Ok(request),
    };
    if inquiry_repo.update_status(&read, request.status).await? {
        Ok(read)
    } else {
        Ok(request)
    }
}
