use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::domain::entity::event::InquiryEvent;
use crate::domain::repository::InquiryRequestRepository;

#[derive(Debug, thiserror::Error)]
pub enum RestoreStaleInquiriesError {
    #[error("internal error: {0}")]
    Internal(String),
}

/// RestoreStaleInquiriesUseCase は一定期間回答のないリクエストの枠を送信者に返却する。
pub struct RestoreStaleInquiriesUseCase {
    inquiry_repo: Arc<dyn InquiryRequestRepository>,
    stale_after: Duration,
}

impl RestoreStaleInquiriesUseCase {
    pub fn new(inquiry_repo: Arc<dyn InquiryRequestRepository>, stale_after_days: u32) -> Self {
        Self {
            inquiry_repo,
            stale_after: Duration::days(i64::from(stale_after_days)),
        }
    }

    /// 1 件ごとに独立して返却する。個別の失敗はログに残して続行する。
    pub async fn execute(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<InquiryEvent>, RestoreStaleInquiriesError> {
        let stale = self
            .inquiry_repo
            .list_pending_created_before(now - self.stale_after)
            .await
            .map_err(|e| RestoreStaleInquiriesError::Internal(e.to_string()))?;

        let mut events = Vec::new();
        for request in stale.into_iter().filter(|r| !r.sender_restored) {
            match self.inquiry_repo.restore_sender_quota(request.id).await {
                Ok(Some(ledger)) => {
                    tracing::info!(
                        request_id = %request.id,
                        user_id = %request.sender_id,
                        pool = request.target_pool.as_str(),
                        counter = ledger.counter(),
                        "stale inquiry quota restored"
                    );
                    events.push(InquiryEvent::QuotaRestored {
                        request_id: request.id,
                        user_id: request.sender_id,
                        pool: request.target_pool,
                        occurred_at: now,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        request_id = %request.id,
                        error = %e,
                        "failed to restore stale inquiry quota"
                    );
                }
            }
        }
        Ok(events)
    }
}
