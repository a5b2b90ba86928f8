use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::entity::event::InquiryEvent;
use crate::domain::entity::inquiry_request::{
    ActorRole, InquiryAction, InquiryRequest, InquiryStatus,
};
use crate::domain::repository::InquiryRequestRepository;

/// CAS に負けた場合の再試行回数。
const MAX_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// 逆方向の未回答リクエストはない。通常どおり作成する。
    Proceed,
    /// 逆方向のリクエストを承認した。新しいリクエストは作らない。
    Matched {
        request: InquiryRequest,
        events: Vec<InquiryEvent>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("the other side has already accepted your contact request: {0}")]
    AlreadyAccepted(Uuid),

    #[error("inquiry request {0} changed concurrently")]
    Conflict(Uuid),

    #[error("internal error: {0}")]
    Internal(String),
}

/// CrossRequestReconciler は相互リクエストを 1 件の承認にまとめる。
pub struct CrossRequestReconciler {
    inquiry_repo: Arc<dyn InquiryRequestRepository>,
}

impl CrossRequestReconciler {
    pub fn new(inquiry_repo: Arc<dyn InquiryRequestRepository>) -> Self {
        Self { inquiry_repo }
    }

    /// sender -> recipient を開く前に recipient -> sender の未拒否リクエストを確認する。
    pub async fn reconcile(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
    ) -> Result<Reconciliation, ReconcileError> {
        let mut last_id = None;
        for _ in 0..MAX_ATTEMPTS {
            let inverse = self
                .inquiry_repo
                .find_latest_open(recipient_id, sender_id)
                .await
                .map_err(|e| ReconcileError::Internal(e.to_string()))?;

            let inverse = match inverse {
                None => return Ok(Reconciliation::Proceed),
                Some(r) if r.status == InquiryStatus::Rejected => {
                    return Ok(Reconciliation::Proceed)
                }
                Some(r) if r.status == InquiryStatus::Accepted => {
                    return Err(ReconcileError::AlreadyAccepted(r.id))
                }
                Some(r) => r,
            };
            last_id = Some(inverse.id);

            let accepted = inverse
                .apply(InquiryAction::Accept, ActorRole::Recipient)
                .map_err(|e| ReconcileError::Internal(e.to_string()))?;

            let updated = self
                .inquiry_repo
                .update_status(&accepted, inverse.status)
                .await
                .map_err(|e| ReconcileError::Internal(e.to_string()))?;
            if !updated {
                tracing::debug!(request_id = %inverse.id, "cross request changed concurrently, retrying");
                continue;
            }

            tracing::info!(
                request_id = %accepted.id,
                first_user_id = %accepted.sender_id,
                second_user_id = %sender_id,
                "cross request matched"
            );

            let now = Utc::now();
            let events = vec![
                InquiryEvent::CrossRequestMatched {
                    request_id: accepted.id,
                    first_user_id: accepted.sender_id,
                    second_user_id: sender_id,
                    occurred_at: now,
                },
                InquiryEvent::InquiryAccepted {
                    request_id: accepted.id,
                    sender_id: accepted.sender_id,
                    recipient_id: accepted.recipient_id,
                    occurred_at: now,
                },
            ];
            return Ok(Reconciliation::Matched {
                request: accepted,
                events,
            });
        }

        Err(ReconcileError::Conflict(last_id.unwrap_or_else(Uuid::nil)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::ledger::QuotaPool;
    use crate::domain::repository::inquiry_repository::MockInquiryRequestRepository;

    fn pending(sender: Uuid, recipient: Uuid) -> InquiryRequest {
        InquiryRequest::new(sender, recipient, false, None, QuotaPool::Regular).unwrap()
    }

    #[tokio::test]
    async fn test_no_inverse_request_proceeds() {
        let mut mock = MockInquiryRequestRepository::new();
        mock.expect_find_latest_open().returning(|_, _| Ok(None));
        mock.expect_update_status().never();

        let reconciler = CrossRequestReconciler::new(Arc::new(mock));
        let result = reconciler
            .reconcile(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(result, Reconciliation::Proceed);
    }

    #[tokio::test]
    async fn test_pending_inverse_is_accepted() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let inverse = pending(b, a);
        let found = inverse.clone();

        let mut mock = MockInquiryRequestRepository::new();
        mock.expect_find_latest_open()
            .withf(move |sender, recipient| *sender == b && *recipient == a)
            .returning(move |_, _| Ok(Some(found.clone())));
        mock.expect_update_status()
            .withf(|request, expected| {
                request.status == InquiryStatus::Accepted && *expected == InquiryStatus::Sent
            })
            .once()
            .returning(|_, _| Ok(true));

        let reconciler = CrossRequestReconciler::new(Arc::new(mock));
        match reconciler.reconcile(a, b).await.unwrap() {
            Reconciliation::Matched { request, events } => {
                assert_eq!(request.id, inverse.id);
                assert_eq!(request.status, InquiryStatus::Accepted);
                assert_eq!(events.len(), 2);
                assert_eq!(events[0].event_type(), "CROSS_REQUEST_MATCHED");
                assert_eq!(events[1].event_type(), "INQUIRY_ACCEPTED");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_accepted_inverse_fails() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let accepted = pending(b, a)
            .apply(InquiryAction::Accept, ActorRole::Recipient)
            .unwrap();

        let mut mock = MockInquiryRequestRepository::new();
        mock.expect_find_latest_open()
            .returning(move |_, _| Ok(Some(accepted.clone())));

        let reconciler = CrossRequestReconciler::new(Arc::new(mock));
        let err = reconciler.reconcile(a, b).await.unwrap_err();
        assert!(matches!(err, ReconcileError::AlreadyAccepted(_)));
    }

    #[tokio::test]
    async fn test_lost_race_is_retried_once() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let inverse = pending(b, a);

        let mut mock = MockInquiryRequestRepository::new();
        mock.expect_find_latest_open()
            .times(2)
            .returning(move |_, _| Ok(Some(inverse.clone())));
        mock.expect_update_status().times(2).returning(|_, _| Ok(false));

        let reconciler = CrossRequestReconciler::new(Arc::new(mock));
        let err = reconciler.reconcile(a, b).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Conflict(_)));
    }
}
