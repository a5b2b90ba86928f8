use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// InquiryContact は承認済みリクエストの相手にだけ開示される連絡先。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InquiryContact {
    pub user_id: Uuid,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl InquiryContact {
    pub fn new(user_id: Uuid, phone: Option<String>, email: Option<String>) -> Self {
        Self {
            user_id,
            phone,
            email,
            updated_at: Utc::now(),
        }
    }
}

/// 電話番号は 6〜20 文字で、数字・空白・'+'・'-' のみ。
pub fn is_valid_phone(phone: &str) -> bool {
    let len = phone.chars().count();
    (6..=20).contains(&len)
        && phone
            .chars()
            .all(|c| c.is_ascii_digit() || c == ' ' || c == '+' || c == '-')
}

pub fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty(),
        None => false,
    }
}
