use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ledger::QuotaPool;

/// InquiryStatus は問い合わせリクエストのライフサイクル状態を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InquiryStatus {
    New,
    Sent,
    Received,
    Accepted,
    Rejected,
}

impl InquiryStatus {
    pub fn as_str(&self) -> &str {
        match self {
            InquiryStatus::New => "NEW",
            InquiryStatus::Sent => "SENT",
            InquiryStatus::Received => "RECEIVED",
            InquiryStatus::Accepted => "ACCEPTED",
            InquiryStatus::Rejected => "REJECTED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(InquiryStatus::New),
            "SENT" => Some(InquiryStatus::Sent),
            "RECEIVED" => Some(InquiryStatus::Received),
            "ACCEPTED" => Some(InquiryStatus::Accepted),
            "REJECTED" => Some(InquiryStatus::Rejected),
            _ => None,
        }
    }

    /// ACCEPTED / REJECTED は終端状態で、以降の遷移は存在しない。
    pub fn is_terminal(&self) -> bool {
        matches!(self, InquiryStatus::Accepted | InquiryStatus::Rejected)
    }

    /// 受信者の回答待ちの状態かどうか。
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            InquiryStatus::New | InquiryStatus::Sent | InquiryStatus::Received
        )
    }
}

impl std::fmt::Display for InquiryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// InquiryAction は状態遷移を引き起こす操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InquiryAction {
    Send,
    Read,
    Accept,
    Reject,
}

impl InquiryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InquiryAction::Send => "send",
            InquiryAction::Read => "read",
            InquiryAction::Accept => "accept",
            InquiryAction::Reject => "reject",
        }
    }
}

/// ActorRole は操作を実行する主体のリクエストに対する立場。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRole {
    System,
    Sender,
    Recipient,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("transition not allowed: cannot {action} a request in status {from}")]
    NotAllowed { from: InquiryStatus, action: &'static str },

    #[error("not owner of request: only the recipient may {action}")]
    NotOwner { action: &'static str },
}

/// 遷移表: (現在の状態, 操作, 実行者) -> 次の状態。
/// 表にない組み合わせはすべて拒否される。
const TRANSITIONS: &[(InquiryStatus, InquiryAction, ActorRole, InquiryStatus)] = &[
    (InquiryStatus::New, InquiryAction::Send, ActorRole::System, InquiryStatus::Sent),
    (InquiryStatus::Sent, InquiryAction::Read, ActorRole::Recipient, InquiryStatus::Received),
    (InquiryStatus::Received, InquiryAction::Read, ActorRole::Recipient, InquiryStatus::Received),
    (InquiryStatus::Sent, InquiryAction::Accept, ActorRole::Recipient, InquiryStatus::Accepted),
    (InquiryStatus::Received, InquiryAction::Accept, ActorRole::Recipient, InquiryStatus::Accepted),
    (InquiryStatus::Sent, InquiryAction::Reject, ActorRole::Recipient, InquiryStatus::Rejected),
    (InquiryStatus::Received, InquiryAction::Reject, ActorRole::Recipient, InquiryStatus::Rejected),
];

/// next_status は遷移表を引いて次の状態を返す。
///
/// 実行者の立場がその操作のどの行にも現れない場合は `NotOwner`、
/// 立場は正しいが現在の状態からの行がない場合は `NotAllowed` を返す。
pub fn next_status(
    current: InquiryStatus,
    action: InquiryAction,
    role: ActorRole,
) -> Result<InquiryStatus, TransitionError> {
    let role_permitted = TRANSITIONS
        .iter()
        .any(|(_, a, r, _)| *a == action && *r == role);
    if !role_permitted {
        return Err(TransitionError::NotOwner {
            action: action.as_str(),
        });
    }

    TRANSITIONS
        .iter()
        .find(|(from, a, r, _)| *from == current && *a == action && *r == role)
        .map(|(_, _, _, to)| *to)
        .ok_or(TransitionError::NotAllowed {
            from: current,
            action: action.as_str(),
        })
}

/// InquiryRequest はあるプロフィールから別のプロフィールへの連絡先開示リクエスト。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InquiryRequest {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub status: InquiryStatus,
    pub anonymous_recipient: bool,
    /// 作成時点で凍結した受信者の匿名 UUID。後からプロモーションが失効しても変わらない。
    pub recipient_anonymous_uuid: Option<Uuid>,
    pub target_pool: QuotaPool,
    pub is_read_by_sender: bool,
    pub is_read_by_recipient: bool,
    pub reminders_sent: u8,
    pub sender_restored: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InquiryRequest {
    /// 新しいリクエストを NEW で生成し、直ちに SENT へ昇格させる。
    /// 自分自身へのリクエストは `None` を返す。
    pub fn new(
        sender_id: Uuid,
        recipient_id: Uuid,
        anonymous_recipient: bool,
        recipient_anonymous_uuid: Option<Uuid>,
        target_pool: QuotaPool,
    ) -> Option<Self> {
        if sender_id == recipient_id {
            return None;
        }
        let now = Utc::now();
        let mut request = Self {
            id: Uuid::new_v4(),
            sender_id,
            recipient_id,
            status: InquiryStatus::New,
            anonymous_recipient,
            recipient_anonymous_uuid,
            target_pool,
            is_read_by_sender: true,
            is_read_by_recipient: false,
            reminders_sent: 0,
            sender_restored: false,
            created_at: now,
            updated_at: now,
        };
        // NEW -> SENT は表に必ず存在する
        request.status = next_status(request.status, InquiryAction::Send, ActorRole::System)
            .unwrap_or(InquiryStatus::Sent);
        Some(request)
    }

    /// user_id がこのリクエストにおいてどの立場かを返す。
    pub fn role_of(&self, user_id: Uuid) -> Option<ActorRole> {
        if user_id == self.recipient_id {
            Some(ActorRole::Recipient)
        } else if user_id == self.sender_id {
            Some(ActorRole::Sender)
        } else {
            None
        }
    }

    /// apply は遷移を適用した新しいリクエストを返す。自身は変更しない。
    pub fn apply(&self, action: InquiryAction, role: ActorRole) -> Result<Self, TransitionError> {
        let next = next_status(self.status, action, role)?;
        let mut updated = self.clone();
        updated.status = next;
        updated.updated_at = Utc::now();
        if role == ActorRole::Recipient {
            updated.is_read_by_recipient = true;
        }
        Ok(updated)
    }

    /// 参加者を問わず、2 人の間のリクエストかどうか。
    pub fn involves_pair(&self, a: Uuid, b: Uuid) -> bool {
        (self.sender_id == a && self.recipient_id == b)
            || (self.sender_id == b && self.recipient_id == a)
    }

    /// 同一性キー (sender, recipient, anonymous_recipient) が一致するかどうか。
    pub fn same_triple(&self, other: &InquiryRequest) -> bool {
        self.sender_id == other.sender_id
            && self.recipient_id == other.recipient_id
            && self.anonymous_recipient == other.anonymous_recipient
    }

    /// 受信者が回答しないまま経過した日数。
    pub fn pending_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days()
    }
}
