use std::sync::Arc;

use uuid::Uuid;

use crate::domain::entity::contact::{is_valid_email, is_valid_phone, InquiryContact};
use crate::domain::repository::ContactRepository;

#[derive(Debug, Clone)]
pub struct UpdateInquiryContactInput {
    pub user_id: Uuid,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateInquiryContactError {
    #[error("validation error on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

pub struct UpdateInquiryContactUseCase {
    contacts: Arc<dyn ContactRepository>,
}

impl UpdateInquiryContactUseCase {
    pub fn new(contacts: Arc<dyn ContactRepository>) -> Self {
        Self { contacts }
    }

    /// 空文字は未設定として扱う。
    pub async fn execute(
        &self,
        input: &UpdateInquiryContactInput,
    ) -> Result<InquiryContact, UpdateInquiryContactError> {
        let phone = normalize(input.phone.as_deref());
        let email = normalize(input.email.as_deref());

        if let Some(ref phone) = phone {
            if !is_valid_phone(phone) {
                return Err(UpdateInquiryContactError::Validation {
                    field: "phone".to_string(),
                    message: "phone must be 6-20 characters of digits, spaces, '+' or '-'"
                        .to_string(),
                });
            }
        }
        if let Some(ref email) = email {
            if !is_valid_email(email) {
                return Err(UpdateInquiryContactError::Validation {
                    field: "email".to_string(),
                    message: "Enter a valid email address.".to_string(),
                });
            }
        }

        let contact = InquiryContact::new(input.user_id, phone, email);
        let saved = self
            .contacts
            .upsert(&contact)
            .await
            .map_err(|e| UpdateInquiryContactError::Internal(e.to_string()))?;

        tracing::info!(user_id = %input.user_id, "inquiry contact updated");
        Ok(saved)
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::contact_repository::MockContactRepository;

    #[tokio::test]
    async fn test_upsert_valid_contact() {
        let mut mock = MockContactRepository::new();
        mock.expect_upsert()
            .withf(|c| c.phone.as_deref() == Some("+48 500 600 700") && c.email.is_none())
            .once()
            .returning(|c| Ok(c.clone()));

        let uc = UpdateInquiryContactUseCase::new(Arc::new(mock));
        let saved = uc
            .execute(&UpdateInquiryContactInput {
                user_id: Uuid::new_v4(),
                phone: Some(" +48 500 600 700 ".to_string()),
                email: Some("".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(saved.phone.as_deref(), Some("+48 500 600 700"));
    }

    #[tokio::test]
    async fn test_invalid_email_is_rejected_before_write() {
        let mut mock = MockContactRepository::new();
        mock.expect_upsert().never();

        let uc = UpdateInquiryContactUseCase::new(Arc::new(mock));
        let err = uc
            .execute(&UpdateInquiryContactInput {
                user_id: Uuid::new_v4(),
                phone: None,
                email: Some("not-an-email".to_string()),
            })
            .await
            .unwrap_err();
        match err {
            UpdateInquiryContactError::Validation { field, .. } => assert_eq!(field, "email"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_phone_is_rejected() {
        let uc = UpdateInquiryContactUseCase::new(Arc::new(MockContactRepository::new()));
        let err = uc
            .execute(&UpdateInquiryContactInput {
                user_id: Uuid::new_v4(),
                phone: Some("12ab".to_string()),
                email: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UpdateInquiryContactError::Validation { ref field, .. } if field == "phone"
        ));
    }
}
