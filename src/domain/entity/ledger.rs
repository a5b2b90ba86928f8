use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::profile::ProfileKind;

/// QuotaPool は問い合わせ枠の 2 つのプール。宛先プロフィールがプレミアムかどうかで分かれる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPool {
    PremiumProfile,
    Regular,
}

impl QuotaPool {
    pub fn for_target(target_is_premium: bool) -> Self {
        if target_is_premium {
            QuotaPool::PremiumProfile
        } else {
            QuotaPool::Regular
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            QuotaPool::PremiumProfile => "premium_profile",
            QuotaPool::Regular => "regular",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "premium_profile" => Some(QuotaPool::PremiumProfile),
            "regular" => Some(QuotaPool::Regular),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanKind {
    Basic,
    FreemiumStandard,
    FreemiumPlayer,
    PremiumStandard,
    PremiumPlayer,
    Unlimited,
}

impl PlanKind {
    pub fn as_str(&self) -> &str {
        match self {
            PlanKind::Basic => "BASIC",
            PlanKind::FreemiumStandard => "FREEMIUM_STANDARD",
            PlanKind::FreemiumPlayer => "FREEMIUM_PLAYER",
            PlanKind::PremiumStandard => "PREMIUM_STANDARD",
            PlanKind::PremiumPlayer => "PREMIUM_PLAYER",
            PlanKind::Unlimited => "UNLIMITED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "BASIC" => Some(PlanKind::Basic),
            "FREEMIUM_STANDARD" => Some(PlanKind::FreemiumStandard),
            "FREEMIUM_PLAYER" => Some(PlanKind::FreemiumPlayer),
            "PREMIUM_STANDARD" => Some(PlanKind::PremiumStandard),
            "PREMIUM_PLAYER" => Some(PlanKind::PremiumPlayer),
            "UNLIMITED" => Some(PlanKind::Unlimited),
            _ => None,
        }
    }

    /// 送信者のプロフィール種別とプレミアム状態からプランを選ぶ。
    /// プレミアムはフリーミアムの枠に加算されるのではなく置き換える。
    pub fn for_sender(kind: ProfileKind, is_premium: bool) -> Self {
        match (kind, is_premium) {
            (ProfileKind::Guest, _) => PlanKind::Basic,
            (ProfileKind::Player, false) => PlanKind::FreemiumPlayer,
            (ProfileKind::Player, true) => PlanKind::PremiumPlayer,
            (_, false) => PlanKind::FreemiumStandard,
            (_, true) => PlanKind::PremiumStandard,
        }
    }
}

/// InquiryPlan は問い合わせ枠のテンプレート。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InquiryPlan {
    pub id: Uuid,
    pub kind: PlanKind,
    pub name: String,
    pub limit: u32,
    pub unlimited: bool,
    pub premium_pool_limit: Option<u32>,
    pub regular_pool_limit: Option<u32>,
    pub reset_period_days: u32,
    pub is_default: bool,
    pub sort: u32,
    pub description: Option<String>,
}

impl InquiryPlan {
    pub fn new(kind: PlanKind, limit: u32, reset_period_days: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name: kind.as_str().to_string(),
            limit,
            unlimited: false,
            premium_pool_limit: None,
            regular_pool_limit: None,
            reset_period_days,
            is_default: false,
            sort: 0,
            description: None,
        }
    }

    /// 初期投入されるプラン一覧。
    pub fn catalog() -> Vec<InquiryPlan> {
        let mut basic = InquiryPlan::new(PlanKind::Basic, 2, 30);
        basic.is_default = true;
        basic.sort = 1;

        // プレミアム宛てプールの上限は初期値。plans テーブルの行でプランごとに変更できる。
        let mut freemium_standard = InquiryPlan::new(PlanKind::FreemiumStandard, 5, 30);
        freemium_standard.premium_pool_limit = Some(2);
        freemium_standard.sort = 2;

        let mut freemium_player = InquiryPlan::new(PlanKind::FreemiumPlayer, 10, 30);
        freemium_player.premium_pool_limit = Some(3);
        freemium_player.sort = 3;

        let mut premium_standard = InquiryPlan::new(PlanKind::PremiumStandard, 30, 90);
        premium_standard.sort = 4;

        let mut premium_player = InquiryPlan::new(PlanKind::PremiumPlayer, 30, 30);
        premium_player.sort = 5;

        let mut unlimited = InquiryPlan::new(PlanKind::Unlimited, 0, 30);
        unlimited.unlimited = true;
        unlimited.sort = 6;

        vec![
            basic,
            freemium_standard,
            freemium_player,
            premium_standard,
            premium_player,
            unlimited,
        ]
    }

    pub fn reset_period(&self) -> Duration {
        Duration::days(i64::from(self.reset_period_days.max(1)))
    }
}

/// QuotaDecision は can_open の結果。remaining が None なら無制限。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub remaining: Option<u32>,
}

impl QuotaDecision {
    pub fn denied() -> Self {
        Self {
            allowed: false,
            remaining: Some(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolUsage {
    pub used: u32,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("You have reached your limit of inquiries ({counter}/{limit}).")]
pub struct QuotaExceeded {
    pub counter: u32,
    pub limit: u32,
}

/// LedgerEntry はユーザーごとの問い合わせ枠の消費状況。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub plan_kind: PlanKind,
    pub limit: u32,
    pub unlimited: bool,
    pub premium_pool_limit: Option<u32>,
    pub regular_pool_limit: Option<u32>,
    pub premium_used: u32,
    pub regular_used: u32,
    pub cycle_started_at: DateTime<Utc>,
    pub cycle_reset_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(user_id: Uuid, plan: &InquiryPlan, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            plan_id: plan.id,
            plan_kind: plan.kind,
            limit: plan.limit,
            unlimited: plan.unlimited,
            premium_pool_limit: plan.premium_pool_limit,
            regular_pool_limit: plan.regular_pool_limit,
            premium_used: 0,
            regular_used: 0,
            cycle_started_at: now,
            cycle_reset_at: now + plan.reset_period(),
        }
    }

    /// counter_raw: 全プールの消費数の合計。
    pub fn counter(&self) -> u32 {
        self.premium_used + self.regular_used
    }

    pub fn pool_used(&self, pool: QuotaPool) -> u32 {
        match pool {
            QuotaPool::PremiumProfile => self.premium_used,
            QuotaPool::Regular => self.regular_used,
        }
    }

    /// プールの上限。プール個別の上限がなければ全体上限に従う。
    pub fn pool_total(&self, pool: QuotaPool) -> u32 {
        let pool_limit = match pool {
            QuotaPool::PremiumProfile => self.premium_pool_limit,
            QuotaPool::Regular => self.regular_pool_limit,
        };
        pool_limit.unwrap_or(self.limit).min(self.limit)
    }

    pub fn pool_usage(&self, pool: QuotaPool) -> PoolUsage {
        PoolUsage {
            used: self.pool_used(pool),
            total: self.pool_total(pool),
        }
    }

    /// 全体の残り枠。無制限の場合は None。
    pub fn left(&self) -> Option<u32> {
        if self.unlimited {
            None
        } else {
            Some(self.limit.saturating_sub(self.counter()))
        }
    }

    pub fn can_open(&self, pool: QuotaPool) -> QuotaDecision {
        if self.unlimited {
            return QuotaDecision {
                allowed: true,
                remaining: None,
            };
        }
        let total_left = self.limit.saturating_sub(self.counter());
        let pool_left = self.pool_total(pool).saturating_sub(self.pool_used(pool));
        let remaining = total_left.min(pool_left);
        QuotaDecision {
            allowed: remaining > 0,
            remaining: Some(remaining),
        }
    }

    /// 上限付きで 1 件消費する。上限に達している場合は何も変更しない。
    pub fn record_open(&mut self, pool: QuotaPool) -> Result<(), QuotaExceeded> {
        if !self.can_open(pool).allowed {
            return Err(self.exceeded(pool));
        }
        match pool {
            QuotaPool::PremiumProfile => self.premium_used += 1,
            QuotaPool::Regular => self.regular_used += 1,
        }
        Ok(())
    }

    /// 拒否時に報告する消費数と上限。全体に余裕があればプール側で止まっている。
    pub fn exceeded(&self, pool: QuotaPool) -> QuotaExceeded {
        if self.counter() < self.limit {
            let usage = self.pool_usage(pool);
            return QuotaExceeded {
                counter: usage.used,
                limit: usage.total,
            };
        }
        QuotaExceeded {
            counter: self.counter(),
            limit: self.limit,
        }
    }

    /// 1 件分をプールに戻す。0 未満にはならない。
    pub fn release(&mut self, pool: QuotaPool) {
        match pool {
            QuotaPool::PremiumProfile => self.premium_used = self.premium_used.saturating_sub(1),
            QuotaPool::Regular => self.regular_used = self.regular_used.saturating_sub(1),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        !self.unlimited && self.counter() >= self.limit
    }

    pub fn is_cycle_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.cycle_reset_at
    }

    /// 消費数を 0 に戻し、新しいサイクルを開始する。
    pub fn start_new_cycle(&mut self, plan: &InquiryPlan, now: DateTime<Utc>) {
        self.premium_used = 0;
        self.regular_used = 0;
        self.cycle_started_at = now;
        self.cycle_reset_at = now + plan.reset_period();
    }

    /// プランを切り替える。消費数とサイクルはそのまま。
    pub fn switch_plan(&mut self, plan: &InquiryPlan) {
        self.plan_id = plan.id;
        self.plan_kind = plan.kind;
        self.limit = plan.limit;
        self.unlimited = plan.unlimited;
        self.premium_pool_limit = plan.premium_pool_limit;
        self.regular_pool_limit = plan.regular_pool_limit;
    }

    /// 次のリセットまでの日数（切り上げ、0 以上）。
    pub fn days_until_reset(&self, now: DateTime<Utc>) -> i64 {
        let remaining = self.cycle_reset_at - now;
        if remaining <= Duration::zero() {
            return 0;
        }
        let days = remaining.num_days();
        if remaining > Duration::days(days) {
            days + 1
        } else {
            days
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(limit: u32) -> InquiryPlan {
        InquiryPlan::new(PlanKind::FreemiumStandard, limit, 30)
    }

    #[test]
    fn test_pool_roundtrip() {
        assert_eq!(QuotaPool::from_str("premium_profile"), Some(QuotaPool::PremiumProfile));
        assert_eq!(QuotaPool::from_str("regular"), Some(QuotaPool::Regular));
        assert_eq!(QuotaPool::from_str("gold"), None);
        assert_eq!(QuotaPool::for_target(true), QuotaPool::PremiumProfile);
        assert_eq!(QuotaPool::for_target(false), QuotaPool::Regular);
    }

    #[test]
    fn test_plan_kind_roundtrip() {
        for plan in InquiryPlan::catalog() {
            assert_eq!(PlanKind::from_str(plan.kind.as_str()), Some(plan.kind));
        }
        assert_eq!(PlanKind::from_str("PREMIUM_INQUIRIES_L"), None);
    }

    #[test]
    fn test_plan_selection() {
        assert_eq!(PlanKind::for_sender(ProfileKind::Player, false), PlanKind::FreemiumPlayer);
        assert_eq!(PlanKind::for_sender(ProfileKind::Player, true), PlanKind::PremiumPlayer);
        assert_eq!(PlanKind::for_sender(ProfileKind::Coach, false), PlanKind::FreemiumStandard);
        assert_eq!(PlanKind::for_sender(ProfileKind::Club, true), PlanKind::PremiumStandard);
        assert_eq!(PlanKind::for_sender(ProfileKind::Guest, true), PlanKind::Basic);
    }

    #[test]
    fn test_catalog_has_single_default() {
        let catalog = InquiryPlan::catalog();
        assert_eq!(catalog.iter().filter(|p| p.is_default).count(), 1);
        let premium = catalog
            .iter()
            .find(|p| p.kind == PlanKind::PremiumStandard)
            .unwrap();
        assert_eq!(premium.reset_period_days, 90);
    }

    #[test]
    fn test_record_open_until_limit() {
        let now = Utc::now();
        let mut entry = LedgerEntry::new(Uuid::new_v4(), &plan(2), now);

        assert!(entry.record_open(QuotaPool::Regular).is_ok());
        assert!(entry.record_open(QuotaPool::PremiumProfile).is_ok());
        assert_eq!(entry.counter(), 2);

        let err = entry.record_open(QuotaPool::Regular).unwrap_err();
        assert_eq!(err, QuotaExceeded { counter: 2, limit: 2 });
        assert_eq!(entry.counter(), 2);
        assert!(entry.is_exhausted());
    }

    #[test]
    fn test_pool_sub_limit() {
        let now = Utc::now();
        let mut p = plan(5);
        p.premium_pool_limit = Some(1);
        let mut entry = LedgerEntry::new(Uuid::new_v4(), &p, now);

        entry.record_open(QuotaPool::PremiumProfile).unwrap();
        let decision = entry.can_open(QuotaPool::PremiumProfile);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, Some(0));

        let decision = entry.can_open(QuotaPool::Regular);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, Some(4));
        assert_eq!(entry.pool_usage(QuotaPool::PremiumProfile), PoolUsage { used: 1, total: 1 });
        assert_eq!(entry.pool_usage(QuotaPool::Regular), PoolUsage { used: 0, total: 5 });
    }

    #[test]
    fn test_pool_ceiling_reports_pool_usage() {
        let now = Utc::now();
        let mut p = plan(5);
        p.premium_pool_limit = Some(2);
        let mut entry = LedgerEntry::new(Uuid::new_v4(), &p, now);
        entry.record_open(QuotaPool::PremiumProfile).unwrap();
        entry.record_open(QuotaPool::PremiumProfile).unwrap();

        let err = entry.record_open(QuotaPool::PremiumProfile).unwrap_err();
        assert_eq!(err, QuotaExceeded { counter: 2, limit: 2 });
        assert_eq!(err.to_string(), "You have reached your limit of inquiries (2/2).");

        entry.regular_used = 3;
        assert_eq!(
            entry.exceeded(QuotaPool::Regular),
            QuotaExceeded { counter: 5, limit: 5 }
        );
    }

    #[test]
    fn test_pool_limit_never_exceeds_total() {
        let mut p = plan(3);
        p.regular_pool_limit = Some(10);
        let entry = LedgerEntry::new(Uuid::new_v4(), &p, Utc::now());
        assert_eq!(entry.pool_total(QuotaPool::Regular), 3);
    }

    #[test]
    fn test_unlimited_always_allowed() {
        let mut p = plan(0);
        p.unlimited = true;
        let mut entry = LedgerEntry::new(Uuid::new_v4(), &p, Utc::now());
        for _ in 0..50 {
            entry.record_open(QuotaPool::Regular).unwrap();
        }
        let decision = entry.can_open(QuotaPool::PremiumProfile);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, None);
        assert_eq!(entry.left(), None);
        assert!(!entry.is_exhausted());
    }

    #[test]
    fn test_release_saturates() {
        let mut entry = LedgerEntry::new(Uuid::new_v4(), &plan(5), Utc::now());
        entry.release(QuotaPool::Regular);
        assert_eq!(entry.counter(), 0);
        entry.record_open(QuotaPool::Regular).unwrap();
        entry.release(QuotaPool::Regular);
        assert_eq!(entry.regular_used, 0);
    }

    #[test]
    fn test_cycle_reset() {
        let start = Utc::now() - Duration::days(31);
        let p = plan(5);
        let mut entry = LedgerEntry::new(Uuid::new_v4(), &p, start);
        entry.record_open(QuotaPool::Regular).unwrap();

        let now = Utc::now();
        assert!(entry.is_cycle_elapsed(now));
        entry.start_new_cycle(&p, now);
        assert_eq!(entry.counter(), 0);
        assert!(!entry.is_cycle_elapsed(now));
        assert_eq!(entry.days_until_reset(now), 30);
    }

    #[test]
    fn test_days_until_reset_rounds_up_and_never_negative() {
        let now = Utc::now();
        let mut entry = LedgerEntry::new(Uuid::new_v4(), &plan(5), now);
        entry.cycle_reset_at = now + Duration::hours(36);
        assert_eq!(entry.days_until_reset(now), 2);
        entry.cycle_reset_at = now - Duration::days(3);
        assert_eq!(entry.days_until_reset(now), 0);
    }

    #[test]
    fn test_switch_plan_keeps_counters() {
        let now = Utc::now();
        let mut entry = LedgerEntry::new(Uuid::new_v4(), &plan(5), now);
        entry.record_open(QuotaPool::Regular).unwrap();

        let premium = InquiryPlan::new(PlanKind::PremiumStandard, 30, 90);
        entry.switch_plan(&premium);
        assert_eq!(entry.limit, 30);
        assert_eq!(entry.plan_kind, PlanKind::PremiumStandard);
        assert_eq!(entry.counter(), 1);
    }

    #[test]
    fn test_quota_exceeded_message() {
        let err = QuotaExceeded { counter: 5, limit: 5 };
        assert_eq!(err.to_string(), "You have reached your limit of inquiries (5/5).");
    }
}
