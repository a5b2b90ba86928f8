use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::repository::LedgerRepository;

#[derive(Debug, thiserror::Error)]
pub enum ResetQuotaCyclesError {
    #[error("internal error: {0}")]
    Internal(String),
}

/// ResetQuotaCyclesUseCase はサイクルが経過した台帳をまとめてリセットする。
pub struct ResetQuotaCyclesUseCase {
    ledger_repo: Arc<dyn LedgerRepository>,
}

impl ResetQuotaCyclesUseCase {
    pub fn new(ledger_repo: Arc<dyn LedgerRepository>) -> Self {
        Self { ledger_repo }
    }

    /// リセットした台帳の件数を返す。
    pub async fn execute(&self, now: DateTime<Utc>) -> Result<usize, ResetQuotaCyclesError> {
        let reset = self
            .ledger_repo
            .reset_elapsed(now)
            .await
            .map_err(|e| ResetQuotaCyclesError::Internal(e.to_string()))?;
        if !reset.is_empty() {
            tracing::info!(count = reset.len(), "inquiry quota cycles reset");
        }
        Ok(reset.len())
    }
}
