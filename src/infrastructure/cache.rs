/// PlanCache は問い合わせプランのインメモリキャッシュ。
/// moka::future::Cache を使用し、TTL 付きでプランをキャッシュする。
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::domain::entity::ledger::{InquiryPlan, PlanKind};

const DEFAULT_KEY: &str = "default";

/// キーは "id:{uuid}"、"kind:{KIND}"、"default" のいずれか。
pub struct PlanCache {
    inner: Cache<String, Arc<InquiryPlan>>,
}

impl PlanCache {
    pub fn new(max_capacity: u64, ttl_secs: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        Self { inner }
    }

    pub async fn get_by_id(&self, id: &Uuid) -> Option<Arc<InquiryPlan>> {
        self.inner.get(&format!("id:{}", id)).await
    }

    pub async fn get_by_kind(&self, kind: PlanKind) -> Option<Arc<InquiryPlan>> {
        self.inner.get(&format!("kind:{}", kind.as_str())).await
    }

    pub async fn get_default(&self) -> Option<Arc<InquiryPlan>> {
        self.inner.get(DEFAULT_KEY).await
    }

    /// プランを id と kind の両方のキーで格納する。
    pub async fn insert(&self, plan: &InquiryPlan) {
        let arc_plan = Arc::new(plan.clone());
        self.inner
            .insert(format!("kind:{}", plan.kind.as_str()), arc_plan.clone())
            .await;
        if plan.is_default {
            self.inner
                .insert(DEFAULT_KEY.to_string(), arc_plan.clone())
                .await;
        }
        self.inner.insert(format!("id:{}", plan.id), arc_plan).await;
    }

    /// プランの変更後に呼び出す。
    pub async fn invalidate_all(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
    }
}
