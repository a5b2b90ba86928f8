use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::domain::entity::event::InquiryEvent;
use crate::domain::entity::inquiry_request::InquiryRequest;
use crate::domain::repository::InquiryRequestRepository;

#[derive(Debug, thiserror::Error)]
pub enum RemindPendingInquiriesError {
    #[error("internal error: {0}")]
    Internal(String),
}

/// RemindPendingInquiriesUseCase は回答待ちのリクエストについて受信者に催促を送る。
/// 1 回目は first_after_days 経過後、2 回目は second_after_days 経過後。
pub struct RemindPendingInquiriesUseCase {
    inquiry_repo: Arc<dyn InquiryRequestRepository>,
    first_after_days: i64,
    second_after_days: i64,
}

impl RemindPendingInquiriesUseCase {
    pub fn new(
        inquiry_repo: Arc<dyn InquiryRequestRepository>,
        first_after_days: u32,
        second_after_days: u32,
    ) -> Self {
        Self {
            inquiry_repo,
            first_after_days: i64::from(first_after_days),
            second_after_days: i64::from(second_after_days),
        }
    }

    fn is_due(&self, request: &InquiryRequest, now: DateTime<Utc>) -> bool {
        let days = request.pending_days(now);
        match request.reminders_sent {
            0 => days >= self.first_after_days,
            1 => days >= self.second_after_days,
            _ => false,
        }
    }

    pub async fn execute(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<InquiryEvent>, RemindPendingInquiriesError> {
        let pending = self
            .inquiry_repo
            .list_pending_created_before(now - Duration::days(self.first_after_days))
            .await
            .map_err(|e| RemindPendingInquiriesError::Internal(e.to_string()))?;

        let mut events = Vec::new();
        for request in pending.into_iter().filter(|r| self.is_due(r, now)) {
            let recorded = self
                .inquiry_repo
                .record_reminder(request.id, request.reminders_sent)
                .await
                .map_err(|e| RemindPendingInquiriesError::Internal(e.to_string()))?;
            if !recorded {
                continue;
            }
            let reminder_number = request.reminders_sent + 1;
            tracing::info!(
                request_id = %request.id,
                recipient_id = %request.recipient_id,
                reminder_number,
                "inquiry decision reminder queued"
            );
            events.push(InquiryEvent::DecisionReminder {
                request_id: request.id,
                recipient_id: request.recipient_id,
                reminder_number,
                occurred_at: now,
            });
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::ledger::QuotaPool;
    use crate::domain::repository::inquiry_repository::MockInquiryRequestRepository;
    use uuid::Uuid;

    fn pending(age_days: i64, reminders_sent: u8) -> InquiryRequest {
        let mut request =
            InquiryRequest::new(Uuid::new_v4(), Uuid::new_v4(), false, None, QuotaPool::Regular)
                .unwrap();
        request.created_at = Utc::now() - Duration::days(age_days) - Duration::minutes(1);
        request.reminders_sent = reminders_sent;
        request
    }

    #[tokio::test]
    async fn test_reminder_schedule() {
        let first_due = pending(3, 0);
        let not_yet_second = pending(4, 1);
        let second_due = pending(6, 1);
        let exhausted = pending(9, 2);
        let all = vec![
            first_due.clone(),
            not_yet_second,
            second_due.clone(),
            exhausted,
        ];

        let mut mock = MockInquiryRequestRepository::new();
        mock.expect_list_pending_created_before()
            .returning(move |_| Ok(all.clone()));
        mock.expect_record_reminder()
            .times(2)
            .returning(|_, _| Ok(true));

        let uc = RemindPendingInquiriesUseCase::new(Arc::new(mock), 3, 6);
        let events = uc.execute(Utc::now()).await.unwrap();
        assert_eq!(events.len(), 2);

        let numbers: Vec<(uuid::Uuid, u8)> = events
            .iter()
            .filter_map(|e| match e {
                InquiryEvent::DecisionReminder {
                    request_id,
                    reminder_number,
                    ..
                } => Some((*request_id, *reminder_number)),
                _ => None,
            })
            .collect();
        assert!(numbers.contains(&(first_due.id, 1)));
        assert!(numbers.contains(&(second_due.id, 2)));
    }

    #[tokio::test]
    async fn test_lost_compare_and_set_skips_event() {
        let request = pending(3, 0);
        let mut mock = MockInquiryRequestRepository::new();
        mock.expect_list_pending_created_before()
            .returning(move |_| Ok(vec![request.clone()]));
        mock.expect_record_reminder().returning(|_, _| Ok(false));

        let uc = RemindPendingInquiriesUseCase::new(Arc::new(mock), 3, 6);
        assert!(uc.execute(Utc::now()).await.unwrap().is_empty());
    }
}
