use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::entity::ledger::{InquiryPlan, PlanKind};
use crate::domain::repository::PlanRepository;
use crate::infrastructure::cache::PlanCache;
use crate::infrastructure::metrics::Metrics;

const CACHE_NAME: &str = "inquiry_plans";

/// CachedPlanRepository は PlanRepository を読み取りキャッシュでラップする。
/// list は常に inner に委譲し、取得結果でキャッシュを埋める。
pub struct CachedPlanRepository {
    inner: Arc<dyn PlanRepository>,
    cache: Arc<PlanCache>,
    metrics: Option<Arc<Metrics>>,
}

impl CachedPlanRepository {
    pub fn new(inner: Arc<dyn PlanRepository>, cache: Arc<PlanCache>) -> Self {
        Self {
            inner,
            cache,
            metrics: None,
        }
    }

    pub fn with_metrics(
        inner: Arc<dyn PlanRepository>,
        cache: Arc<PlanCache>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            inner,
            cache,
            metrics: Some(metrics),
        }
    }

    /// プラン定義を更新した場合に呼び出す。
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all().await;
    }

    fn record(&self, hit: bool) {
        if let Some(ref m) = self.metrics {
            if hit {
                m.record_cache_hit(CACHE_NAME);
            } else {
                m.record_cache_miss(CACHE_NAME);
            }
        }
    }

    async fn store(&self, plan: Option<InquiryPlan>) -> Option<InquiryPlan> {
        if let Some(ref p) = plan {
            self.cache.insert(p).await;
        }
        plan
    }
}

#[async_trait]
impl PlanRepository for CachedPlanRepository {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<InquiryPlan>> {
        if let Some(cached) = self.cache.get_by_id(&id).await {
            self.record(true);
            return Ok(Some((*cached).clone()));
        }
        self.record(false);
        let plan = self.inner.find_by_id(id).await?;
        Ok(self.store(plan).await)
    }

    async fn find_by_kind(&self, kind: PlanKind) -> anyhow::Result<Option<InquiryPlan>> {
        if let Some(cached) = self.cache.get_by_kind(kind).await {
            self.record(true);
            return Ok(Some((*cached).clone()));
        }
        self.record(false);
        let plan = self.inner.find_by_kind(kind).await?;
        Ok(self.store(plan).await)
    }

    async fn find_default(&self) -> anyhow::Result<Option<InquiryPlan>> {
        if let Some(cached) = self.cache.get_default().await {
            self.record(true);
            return Ok(Some((*cached).clone()));
        }
        self.record(false);
        let plan = self.inner.find_default().await?;
        Ok(self.store(plan).await)
    }

    async fn list(&self) -> anyhow::Result<Vec<InquiryPlan>> {
        let plans = self.inner.list().await?;
        for plan in &plans {
            self.cache.insert(plan).await;
        }
        Ok(plans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::ledger_repository::MockPlanRepository;

    fn make_cache() -> Arc<PlanCache> {
        Arc::new(PlanCache::new(100, 60))
    }

    #[tokio::test]
    async fn test_find_by_kind_cache_hit_skips_db() {
        let mut mock = MockPlanRepository::new();
        mock.expect_find_by_kind().never();

        let cache = make_cache();
        let plan = InquiryPlan::new(PlanKind::FreemiumStandard, 5, 30);
        cache.insert(&plan).await;

        let repo = CachedPlanRepository::new(Arc::new(mock), cache);
        let found = repo
            .find_by_kind(PlanKind::FreemiumStandard)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, plan.id);
    }

    #[tokio::test]
    async fn test_find_by_id_cache_miss_then_store() {
        let plan = InquiryPlan::new(PlanKind::PremiumStandard, 30, 90);
        let id = plan.id;
        let returned = plan.clone();

        let mut mock = MockPlanRepository::new();
        mock.expect_find_by_id()
            .withf(move |candidate| *candidate == id)
            .once()
            .returning(move |_| Ok(Some(returned.clone())));

        let cache = make_cache();
        let repo = CachedPlanRepository::new(Arc::new(mock), cache.clone());

        assert!(repo.find_by_id(id).await.unwrap().is_some());
        // 2 回目はキャッシュから返る (once 制約)
        assert!(repo.find_by_id(id).await.unwrap().is_some());
        assert!(cache.get_by_kind(PlanKind::PremiumStandard).await.is_some());
    }

    #[tokio::test]
    async fn test_missing_plan_is_not_cached() {
        let mut mock = MockPlanRepository::new();
        mock.expect_find_default().times(2).returning(|| Ok(None));

        let repo = CachedPlanRepository::new(Arc::new(mock), make_cache());
        assert!(repo.find_default().await.unwrap().is_none());
        assert!(repo.find_default().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_all_forces_reload() {
        let plan = InquiryPlan::new(PlanKind::Basic, 2, 30);
        let returned = plan.clone();

        let mut mock = MockPlanRepository::new();
        mock.expect_find_by_kind()
            .times(2)
            .returning(move |_| Ok(Some(returned.clone())));

        let repo = CachedPlanRepository::new(Arc::new(mock), make_cache());
        repo.find_by_kind(PlanKind::Basic).await.unwrap();
        repo.invalidate_all().await;
        repo.find_by_kind(PlanKind::Basic).await.unwrap();
    }
}
