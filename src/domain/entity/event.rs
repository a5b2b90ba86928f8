use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ledger::QuotaPool;

/// InquiryEvent はエンジンの操作結果として返され、通知キューへ発行されるイベント。
/// 通知を受け取るユーザーは partition_key で決まる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InquiryEvent {
    InquirySent {
        request_id: Uuid,
        sender_id: Uuid,
        recipient_id: Uuid,
        anonymous_recipient: bool,
        occurred_at: DateTime<Utc>,
    },
    InquiryAccepted {
        request_id: Uuid,
        sender_id: Uuid,
        recipient_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    InquiryRejected {
        request_id: Uuid,
        sender_id: Uuid,
        recipient_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    CrossRequestMatched {
        request_id: Uuid,
        first_user_id: Uuid,
        second_user_id: Uuid,
        occurred_at: DateTime<Utc>,
    },
    QuotaExhausted {
        user_id: Uuid,
        counter: u32,
        limit: u32,
        occurred_at: DateTime<Utc>,
    },
    QuotaRestored {
        request_id: Uuid,
        user_id: Uuid,
        pool: QuotaPool,
        occurred_at: DateTime<Utc>,
    },
    DecisionReminder {
        request_id: Uuid,
        recipient_id: Uuid,
        reminder_number: u8,
        occurred_at: DateTime<Utc>,
    },
}

impl InquiryEvent {
    pub fn event_type(&self) -> &str {
        match self {
            InquiryEvent::InquirySent { .. } => "INQUIRY_SENT",
            InquiryEvent::InquiryAccepted { .. } => "INQUIRY_ACCEPTED",
            InquiryEvent::InquiryRejected { .. } => "INQUIRY_REJECTED",
            InquiryEvent::CrossRequestMatched { .. } => "CROSS_REQUEST_MATCHED",
            InquiryEvent::QuotaExhausted { .. } => "QUOTA_EXHAUSTED",
            InquiryEvent::QuotaRestored { .. } => "QUOTA_RESTORED",
            InquiryEvent::DecisionReminder { .. } => "DECISION_REMINDER",
        }
    }

    /// Kafka のパーティションキー。通知先ユーザーでまとめる。
    pub fn partition_key(&self) -> Uuid {
        match self {
            InquiryEvent::InquirySent { recipient_id, .. } => *recipient_id,
            InquiryEvent::InquiryAccepted { sender_id, .. } => *sender_id,
            InquiryEvent::InquiryRejected { sender_id, .. } => *sender_id,
            InquiryEvent::CrossRequestMatched { first_user_id, .. } => *first_user_id,
            InquiryEvent::QuotaExhausted { user_id, .. } => *user_id,
            InquiryEvent::QuotaRestored { user_id, .. } => *user_id,
            InquiryEvent::DecisionReminder { recipient_id, .. } => *recipient_id,
        }
    }
}
