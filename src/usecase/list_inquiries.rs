use std::sync::Arc;

use uuid::Uuid;

use crate::domain::repository::InquiryRequestRepository;
use crate::usecase::render_inquiry::{RenderContext, RenderInquiryUseCase, RequestView};
use crate::usecase::respond_inquiry::mark_received;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InquiryListKind {
    Sent,
    Received,
    Contacts,
}

#[derive(Debug, thiserror::Error)]
pub enum ListInquiriesError {
    #[error("internal error: {0}")]
    Internal(String),
}

pub struct ListInquiriesUseCase {
    inquiry_repo: Arc<dyn InquiryRequestRepository>,
    renderer: Arc<RenderInquiryUseCase>,
}

impl ListInquiriesUseCase {
    pub fn new(
        inquiry_repo: Arc<dyn InquiryRequestRepository>,
        renderer: Arc<RenderInquiryUseCase>,
    ) -> Self {
        Self {
            inquiry_repo,
            renderer,
        }
    }

    /// 受信一覧を取得すると、未読 (SENT) のリクエストは RECEIVED になる。
    pub async fn execute(
        &self,
        user_id: Uuid,
        kind: InquiryListKind,
        context: RenderContext,
    ) -> Result<Vec<RequestView>, ListInquiriesError> {
        let requests = match kind {
            InquiryListKind::Sent => self.inquiry_repo.list_sent(user_id).await,
            InquiryListKind::Contacts => self.inquiry_repo.list_contacts(user_id).await,
            InquiryListKind::Received => {
                let received = self
                    .inquiry_repo
                    .list_received(user_id)
                    .await
                    .map_err(|e| ListInquiriesError::Internal(e.to_string()))?;
                let mut promoted = Vec::with_capacity(received.len());
                for request in received {
                    promoted.push(
                        mark_received(self.inquiry_repo.as_ref(), request)
                            .await
                            .map_err(|e| ListInquiriesError::Internal(e.to_string()))?,
                    );
                }
                Ok(promoted)
            }
        }
        .map_err(|e| ListInquiriesError::Internal(e.to_string()))?;

        self.renderer
            .render_all(&requests, user_id, context)
            .await
            .map_err(|e| ListInquiriesError::Internal(e.to_string()))
    }
}
