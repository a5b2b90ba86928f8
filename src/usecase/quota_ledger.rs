use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::entity::ledger::{
    InquiryPlan, LedgerEntry, PlanKind, PoolUsage, QuotaDecision, QuotaPool,
};
use crate::domain::entity::profile::{AddressableProfile, Profile};
use crate::domain::repository::{LedgerRepository, PlanRepository};

#[derive(Debug, thiserror::Error)]
pub enum QuotaLedgerError {
    #[error("no inquiry plan configured for {0}")]
    PlanNotConfigured(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolSnapshot {
    pub premium_profile: PoolUsage,
    pub regular: PoolUsage,
}

/// LedgerSnapshot は meta-data 表示用の台帳の状態。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerSnapshot {
    pub plan: PlanKind,
    pub plan_name: String,
    pub inquiries_left: Option<u32>,
    pub limit: u32,
    pub counter: u32,
    pub unlimited: bool,
    pub days_until_expiry: i64,
    pub pools: PoolSnapshot,
}

/// QuotaLedger はユーザーごとの問い合わせ枠を管理する。
pub struct QuotaLedger {
    ledger_repo: Arc<dyn LedgerRepository>,
    plan_repo: Arc<dyn PlanRepository>,
}

impl QuotaLedger {
    pub fn new(ledger_repo: Arc<dyn LedgerRepository>, plan_repo: Arc<dyn PlanRepository>) -> Self {
        Self {
            ledger_repo,
            plan_repo,
        }
    }

    /// 送信者のプロフィールに対応するプラン。見つからなければデフォルトプラン。
    pub async fn plan_for(
        &self,
        sender: &Profile,
        now: DateTime<Utc>,
    ) -> Result<InquiryPlan, QuotaLedgerError> {
        let kind = PlanKind::for_sender(sender.kind(), sender.is_premium(now));
        if let Some(plan) = self
            .plan_repo
            .find_by_kind(kind)
            .await
            .map_err(|e| QuotaLedgerError::Internal(e.to_string()))?
        {
            return Ok(plan);
        }
        tracing::warn!(plan = kind.as_str(), "plan not found, using default plan");
        self.default_plan().await
    }

    async fn default_plan(&self) -> Result<InquiryPlan, QuotaLedgerError> {
        self.plan_repo
            .find_default()
            .await
            .map_err(|e| QuotaLedgerError::Internal(e.to_string()))?
            .ok_or_else(|| QuotaLedgerError::PlanNotConfigured("default".to_string()))
    }

    /// 台帳を用意する。
    ///
    /// 未作成なら選択されたプランで作成し、プレミアム状態の変化があればプランを切り替え、
    /// サイクルが経過していれば新しいサイクルを開始する。UNLIMITED の台帳はプランを切り替えない。
    pub async fn ensure_entry(
        &self,
        user_id: Uuid,
        sender: &Profile,
    ) -> Result<LedgerEntry, QuotaLedgerError> {
        let now = Utc::now();
        let selected = self.plan_for(sender, now).await?;

        let existing = self
            .ledger_repo
            .find(user_id)
            .await
            .map_err(|e| QuotaLedgerError::Internal(e.to_string()))?;

        let (entry, plan) = match existing {
            None => {
                let entry = self
                    .ledger_repo
                    .create_if_absent(&LedgerEntry::new(user_id, &selected, now))
                    .await
                    .map_err(|e| QuotaLedgerError::Internal(e.to_string()))?;
                tracing::info!(
                    user_id = %user_id,
                    plan = entry.plan_kind.as_str(),
                    "inquiry ledger created"
                );
                (entry, selected)
            }
            Some(entry)
                if entry.plan_kind != selected.kind && entry.plan_kind != PlanKind::Unlimited =>
            {
                let switched = self
                    .ledger_repo
                    .switch_plan(user_id, &selected)
                    .await
                    .map_err(|e| QuotaLedgerError::Internal(e.to_string()))?;
                tracing::info!(
                    user_id = %user_id,
                    from = entry.plan_kind.as_str(),
                    to = selected.kind.as_str(),
                    "inquiry plan switched"
                );
                (switched, selected)
            }
            Some(entry) => {
                let plan = if entry.plan_id == selected.id {
                    selected
                } else {
                    self.plan_repo
                        .find_by_id(entry.plan_id)
                        .await
                        .map_err(|e| QuotaLedgerError::Internal(e.to_string()))?
                        .unwrap_or(selected)
                };
                (entry, plan)
            }
        };

        if entry.is_cycle_elapsed(now) {
            let reset = self
                .ledger_repo
                .reset_cycle(user_id, &plan, now)
                .await
                .map_err(|e| QuotaLedgerError::Internal(e.to_string()))?;
            tracing::info!(user_id = %user_id, "inquiry cycle reset");
            return Ok(reset);
        }
        Ok(entry)
    }

    /// 開けるかどうかを判定する。参照に失敗した場合は拒否側に倒す。
    pub async fn can_open(&self, user_id: Uuid, target_is_premium: bool) -> QuotaDecision {
        let pool = QuotaPool::for_target(target_is_premium);
        match self.current_entry(user_id).await {
            Ok(entry) => entry.can_open(pool),
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "quota lookup failed, denying");
                QuotaDecision::denied()
            }
        }
    }

    pub async fn snapshot(
        &self,
        user_id: Uuid,
        sender: &Profile,
    ) -> Result<LedgerSnapshot, QuotaLedgerError> {
        let entry = self.ensure_entry(user_id, sender).await?;
        let plan_name = self
            .plan_repo
            .find_by_id(entry.plan_id)
            .await
            .map_err(|e| QuotaLedgerError::Internal(e.to_string()))?
            .map(|p| p.name)
            .unwrap_or_else(|| entry.plan_kind.as_str().to_string());

        Ok(LedgerSnapshot {
            plan: entry.plan_kind,
            plan_name,
            inquiries_left: entry.left(),
            limit: entry.limit,
            counter: entry.counter(),
            unlimited: entry.unlimited,
            days_until_expiry: entry.days_until_reset(Utc::now()),
            pools: PoolSnapshot {
                premium_profile: entry.pool_usage(QuotaPool::PremiumProfile),
                regular: entry.pool_usage(QuotaPool::Regular),
            },
        })
    }

    /// 保存済みの台帳、なければデフォルトプランによる未保存の台帳。
    async fn current_entry(&self, user_id: Uuid) -> Result<LedgerEntry, QuotaLedgerError> {
        let existing = self
            .ledger_repo
            .find(user_id)
            .await
            .map_err(|e| QuotaLedgerError::Internal(e.to_string()))?;
        match existing {
            Some(entry) => Ok(entry),
            None => {
                let plan = self.default_plan().await?;
                Ok(LedgerEntry::new(user_id, &plan, Utc::now()))
            }
        }
    }
}
