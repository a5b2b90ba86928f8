use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::entity::contact::InquiryContact;
use crate::domain::repository::{ContactRepository, ProfileDirectory};
use crate::usecase::quota_ledger::{LedgerSnapshot, QuotaLedger, QuotaLedgerError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactView {
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl From<InquiryContact> for ContactView {
    fn from(c: InquiryContact) -> Self {
        Self {
            phone: c.phone,
            email: c.email,
        }
    }
}

/// InquiryMetadata は my/meta-data のレスポンス。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InquiryMetadata {
    #[serde(flatten)]
    pub ledger: LedgerSnapshot,
    pub contact: Option<ContactView>,
}

#[derive(Debug, thiserror::Error)]
pub enum GetInquiryMetadataError {
    #[error("profile not found for user {0}")]
    ProfileNotFound(Uuid),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<QuotaLedgerError> for GetInquiryMetadataError {
    fn from(e: QuotaLedgerError) -> Self {
        GetInquiryMetadataError::Internal(e.to_string())
    }
}

pub struct GetInquiryMetadataUseCase {
    ledger: Arc<QuotaLedger>,
    profiles: Arc<dyn ProfileDirectory>,
    contacts: Arc<dyn ContactRepository>,
}

impl GetInquiryMetadataUseCase {
    pub fn new(
        ledger: Arc<QuotaLedger>,
        profiles: Arc<dyn ProfileDirectory>,
        contacts: Arc<dyn ContactRepository>,
    ) -> Self {
        Self {
            ledger,
            profiles,
            contacts,
        }
    }

    pub async fn execute(&self, user_id: Uuid) -> Result<InquiryMetadata, GetInquiryMetadataError> {
        let profile = self
            .profiles
            .find_by_user(user_id)
            .await
            .map_err(|e| GetInquiryMetadataError::Internal(e.to_string()))?
            .ok_or(GetInquiryMetadataError::ProfileNotFound(user_id))?;

        let ledger = self.ledger.snapshot(user_id, &profile).await?;
        let contact = self
            .contacts
            .find(user_id)
            .await
            .map_err(|e| GetInquiryMetadataError::Internal(e.to_string()))?
            .map(ContactView::from);

        Ok(InquiryMetadata { ledger, contact })
    }
}
