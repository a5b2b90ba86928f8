use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::entity::contact::InquiryContact;
use crate::domain::entity::inquiry_request::{InquiryRequest, InquiryStatus};
use crate::domain::entity::ledger::{InquiryPlan, LedgerEntry, PlanKind};
use crate::domain::entity::profile::{AddressableProfile, Profile};
use crate::domain::repository::{
    ContactRepository, CreateOutcome, InquiryRequestRepository,
    LedgerRepository, PlanRepository, ProfileDirectory,
};

#[derive(Default)]
struct StoreState {
    requests: HashMap<Uuid, InquiryRequest>,
    ledgers: HashMap<Uuid, LedgerEntry>,
    plans: HashMap<Uuid, InquiryPlan>,
    contacts: HashMap<Uuid, InquiryContact>,
    profiles: Vec<Profile>,
}

impl StoreState {
    fn latest_open(&self, sender_id: Uuid, recipient_id: Uuid) -> Option<&InquiryRequest> {
        self.requests
            .values()
            .filter(|r| {
                r.sender_id == sender_id
                    && r.recipient_id == recipient_id
                    && r.status != InquiryStatus::Rejected
            })
            .max_by_key(|r| r.created_at)
    }

    fn open_for_triple(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        anonymous_recipient: bool,
    ) -> Option<&InquiryRequest> {
        self.requests.values().find(|r| {
            r.sender_id == sender_id
                && r.recipient_id == recipient_id
                && r.anonymous_recipient == anonymous_recipient
                && r.status != InquiryStatus::Rejected
        })
    }

    fn collect<F>(&self, predicate: F) -> Vec<InquiryRequest>
    where
        F: Fn(&InquiryRequest) -> bool,
    {
        let mut out: Vec<InquiryRequest> = self
            .requests
            .values()
            .filter(|r| predicate(r))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }
}

/// InMemoryInquiryStore はデータベース未設定時に使うインメモリのストア。
/// すべての書き込みは 1 つの RwLock の書き込みガード内で行う。
pub struct InMemoryInquiryStore {
    state: RwLock<StoreState>,
}

impl InMemoryInquiryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
        }
    }

    /// プランカタログを投入した状態で作成する。
    pub fn with_catalog() -> Self {
        let state = StoreState {
            plans: InquiryPlan::catalog()
                .into_iter()
                .map(|p| (p.id, p))
                .collect(),
            ..StoreState::default()
        };
        Self {
            state: RwLock::new(state),
        }
    }

    pub async fn seed_profiles(&self, profiles: Vec<Profile>) {
        let mut state = self.state.write().await;
        for profile in profiles {
            state.profiles.retain(|p| p.base().uuid != profile.base().uuid);
            state.profiles.push(profile);
        }
    }

    /// 既存のプロフィールを置き換える。プレミアムや匿名プロモーションの変更に使う。
    pub async fn upsert_profile(&self, profile: Profile) {
        self.seed_profiles(vec![profile]).await;
    }
}

impl Default for InMemoryInquiryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InquiryRequestRepository for InMemoryInquiryStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<InquiryRequest>> {
        let state = self.state.read().await;
        Ok(state.requests.get(&id).cloned())
    }

    async fn find_latest_open(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
    ) -> anyhow::Result<Option<InquiryRequest>> {
        let state = self.state.read().await;
        Ok(state.latest_open(sender_id, recipient_id).cloned())
    }

    async fn find_open_for_triple(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        anonymous_recipient: bool,
    ) -> anyhow::Result<Option<InquiryRequest>> {
        let state = self.state.read().await;
        Ok(state
            .open_for_triple(sender_id, recipient_id, anonymous_recipient)
            .cloned())
    }

    async fn list_sent(&self, sender_id: Uuid) -> anyhow::Result<Vec<InquiryRequest>> {
        let state = self.state.read().await;
        Ok(state.collect(|r| r.sender_id == sender_id))
    }

    async fn list_received(&self, recipient_id: Uuid) -> anyhow::Result<Vec<InquiryRequest>> {
        let state = self.state.read().await;
        Ok(state.collect(|r| r.recipient_id == recipient_id))
    }

    async fn list_contacts(&self, user_id: Uuid) -> anyhow::Result<Vec<InquiryRequest>> {
        let state = self.state.read().await;
        Ok(state.collect(|r| {
            r.status == InquiryStatus::Accepted
                && (r.sender_id == user_id || r.recipient_id == user_id)
        }))
    }

    async fn update_status(
        &self,
        request: &InquiryRequest,
        expected: InquiryStatus,
    ) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        match state.requests.get_mut(&request.id) {
            Some(stored) if stored.status == expected => {
                stored.status = request.status;
                stored.is_read_by_sender = request.is_read_by_sender;
                stored.is_read_by_recipient = request.is_read_by_recipient;
                stored.updated_at = request.updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_with_quota(&self, request: &InquiryRequest) -> anyhow::Result<CreateOutcome> {
        let mut state = self.state.write().await;

        if let Some(inverse) = state.latest_open(request.recipient_id, request.sender_id) {
            return Ok(CreateOutcome::CrossRequestDetected(inverse.clone()));
        }
        if let Some(existing) = state.open_for_triple(
            request.sender_id,
            request.recipient_id,
            request.anonymous_recipient,
        ) {
            return Ok(CreateOutcome::Duplicate(existing.clone()));
        }

        let ledger = state
            .ledgers
            .get_mut(&request.sender_id)
            .ok_or_else(|| anyhow::anyhow!("ledger not found for user {}", request.sender_id))?;
        if let Err(exceeded) = ledger.record_open(request.target_pool) {
            return Ok(CreateOutcome::QuotaExceeded {
                counter: exceeded.counter,
                limit: exceeded.limit,
            });
        }
        let ledger = ledger.clone();

        state.requests.insert(request.id, request.clone());
        Ok(CreateOutcome::Created { ledger })
    }

    async fn list_pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<InquiryRequest>> {
        let state = self.state.read().await;
        Ok(state.collect(|r| r.status.is_pending() && r.created_at < cutoff))
    }

    async fn restore_sender_quota(
        &self,
        request_id: Uuid,
    ) -> anyhow::Result<Option<LedgerEntry>> {
        let mut state = self.state.write().await;
        let (sender_id, pool) = match state.requests.get_mut(&request_id) {
            Some(r) if !r.sender_restored && r.status.is_pending() => {
                r.sender_restored = true;
                (r.sender_id, r.target_pool)
            }
            _ => return Ok(None),
        };
        match state.ledgers.get_mut(&sender_id) {
            Some(ledger) => {
                ledger.release(pool);
                Ok(Some(ledger.clone()))
            }
            None => Ok(None),
        }
    }

    async fn record_reminder(&self, request_id: Uuid, expected: u8) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        match state.requests.get_mut(&request_id) {
            Some(r) if r.reminders_sent == expected && r.status.is_pending() => {
                r.reminders_sent += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl LedgerRepository for InMemoryInquiryStore {
    async fn find(&self, user_id: Uuid) -> anyhow::Result<Option<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state.ledgers.get(&user_id).cloned())
    }

    async fn create_if_absent(&self, entry: &LedgerEntry) -> anyhow::Result<LedgerEntry> {
        let mut state = self.state.write().await;
        Ok(state
            .ledgers
            .entry(entry.user_id)
            .or_insert_with(|| entry.clone())
            .clone())
    }

    async fn switch_plan(&self, user_id: Uuid, plan: &InquiryPlan) -> anyhow::Result<LedgerEntry> {
        let mut state = self.state.write().await;
        let ledger = state
            .ledgers
            .get_mut(&user_id)
            .ok_or_else(|| anyhow::anyhow!("ledger not found for user {}", user_id))?;
        ledger.switch_plan(plan);
        Ok(ledger.clone())
    }

    async fn reset_cycle(
        &self,
        user_id: Uuid,
        plan: &InquiryPlan,
        now: DateTime<Utc>,
    ) -> anyhow::Result<LedgerEntry> {
        let mut state = self.state.write().await;
        let ledger = state
            .ledgers
            .get_mut(&user_id)
            .ok_or_else(|| anyhow::anyhow!("ledger not found for user {}", user_id))?;
        if ledger.is_cycle_elapsed(now) {
            ledger.start_new_cycle(plan, now);
        }
        Ok(ledger.clone())
    }

    async fn reset_elapsed(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Uuid>> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut reset = Vec::new();
        for ledger in state.ledgers.values_mut() {
            if !ledger.is_cycle_elapsed(now) {
                continue;
            }
            let plan = match state.plans.get(&ledger.plan_id) {
                Some(plan) => plan.clone(),
                None => {
                    let mut fallback = InquiryPlan::new(ledger.plan_kind, ledger.limit, 30);
                    fallback.id = ledger.plan_id;
                    fallback
                }
            };
            ledger.start_new_cycle(&plan, now);
            reset.push(ledger.user_id);
        }
        Ok(reset)
    }
}

#[async_trait]
impl PlanRepository for InMemoryInquiryStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<InquiryPlan>> {
        let state = self.state.read().await;
        Ok(state.plans.get(&id).cloned())
    }

    async fn find_by_kind(&self, kind: PlanKind) -> anyhow::Result<Option<InquiryPlan>> {
        let state = self.state.read().await;
        Ok(state.plans.values().find(|p| p.kind == kind).cloned())
    }

    async fn find_default(&self) -> anyhow::Result<Option<InquiryPlan>> {
        let state = self.state.read().await;
        Ok(state.plans.values().find(|p| p.is_default).cloned())
    }

    async fn list(&self) -> anyhow::Result<Vec<InquiryPlan>> {
        let state = self.state.read().await;
        let mut plans: Vec<InquiryPlan> = state.plans.values().cloned().collect();
        plans.sort_by_key(|p| p.sort);
        Ok(plans)
    }
}

#[async_trait]
impl ContactRepository for InMemoryInquiryStore {
    async fn find(&self, user_id: Uuid) -> anyhow::Result<Option<InquiryContact>> {
        let state = self.state.read().await;
        Ok(state.contacts.get(&user_id).cloned())
    }

    async fn upsert(&self, contact: &InquiryContact) -> anyhow::Result<InquiryContact> {
        let mut state = self.state.write().await;
        state.contacts.insert(contact.user_id, contact.clone());
        Ok(contact.clone())
    }
}

#[async_trait]
impl ProfileDirectory for InMemoryInquiryStore {
    async fn find_by_uuid(&self, uuid: Uuid) -> anyhow::Result<Option<Profile>> {
        let state = self.state.read().await;
        Ok(state.profiles.iter().find(|p| p.base().uuid == uuid).cloned())
    }

    async fn find_by_anonymous_uuid(
        &self,
        anonymous_uuid: Uuid,
    ) -> anyhow::Result<Option<Profile>> {
        let state = self.state.read().await;
        Ok(state
            .profiles
            .iter()
            .find(|p| p.anonymous_uuid() == Some(anonymous_uuid))
            .cloned())
    }

    async fn find_by_user(&self, user_id: Uuid) -> anyhow::Result<Option<Profile>> {
        let state = self.state.read().await;
        Ok(state.profiles.iter().find(|p| p.user_id() == user_id).cloned())
    }
}
