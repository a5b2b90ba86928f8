//! 問い合わせエンジンのシナリオテスト。インメモリストアで use case を通しで動かす。

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use inquiry_server::adapter::handler::{AppState, Repositories};
use inquiry_server::adapter::repository::InMemoryInquiryStore;
use inquiry_server::domain::entity::event::InquiryEvent;
use inquiry_server::domain::entity::inquiry_request::InquiryStatus;
use inquiry_server::domain::entity::ledger::QuotaPool;
use inquiry_server::domain::entity::profile::{
    AddressableProfile, AnonymousPromotion, Profile, ProfileBase,
};
use inquiry_server::domain::repository::{InquiryRequestRepository, LedgerRepository};
use inquiry_server::infrastructure::kafka_producer::NoopInquiryEventPublisher;
use inquiry_server::infrastructure::metrics::Metrics;
use inquiry_server::usecase::list_inquiries::InquiryListKind;
use inquiry_server::usecase::open_inquiry::{OpenInquiryError, OpenInquiryInput, OpenInquiryOutput};
use inquiry_server::usecase::render_inquiry::RenderContext;
use inquiry_server::usecase::respond_inquiry::{
    Decision, RespondInquiryError, RespondInquiryInput,
};
use inquiry_server::usecase::{
    RemindPendingInquiriesUseCase, ResetQuotaCyclesUseCase, RestoreStaleInquiriesUseCase,
};

struct Engine {
    store: Arc<InMemoryInquiryStore>,
    state: AppState,
}

impl Engine {
    async fn new(profiles: &[Profile]) -> Self {
        let store = Arc::new(InMemoryInquiryStore::with_catalog());
        store.seed_profiles(profiles.to_vec()).await;
        let state = AppState::new(
            &Repositories::in_memory(store.clone()),
            Arc::new(NoopInquiryEventPublisher),
            Arc::new(Metrics::new("inquiry-engine-test").unwrap()),
            None,
        );
        Self { store, state }
    }

    async fn open(&self, sender: &Profile, target: Uuid) -> Result<OpenInquiryOutput, OpenInquiryError> {
        self.open_with(sender, target, None).await
    }

    async fn open_with(
        &self,
        sender: &Profile,
        target: Uuid,
        anonymous_recipient: Option<bool>,
    ) -> Result<OpenInquiryOutput, OpenInquiryError> {
        self.state
            .open_inquiry_uc
            .execute(&OpenInquiryInput {
                sender_user_id: sender.user_id(),
                target,
                anonymous_recipient,
            })
            .await
    }

    async fn respond(
        &self,
        actor: &Profile,
        request_id: Uuid,
        decision: Decision,
    ) -> Result<InquiryStatus, RespondInquiryError> {
        self.state
            .respond_inquiry_uc
            .execute(&RespondInquiryInput {
                request_id,
                actor_user_id: actor.user_id(),
                decision,
            })
            .await
            .map(|output| output.request.status)
    }

    async fn counter(&self, user: &Profile) -> u32 {
        LedgerRepository::find(self.store.as_ref(), user.user_id())
            .await
            .unwrap()
            .map_or(0, |ledger| ledger.counter())
    }

    async fn status(&self, request_id: Uuid) -> InquiryStatus {
        InquiryRequestRepository::find_by_id(self.store.as_ref(), request_id)
            .await
            .unwrap()
            .unwrap()
            .status
    }
}

fn base(slug: &str, premium: bool, anonymous_uuid: Option<Uuid>) -> ProfileBase {
    ProfileBase {
        id: 0,
        uuid: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        slug: slug.to_string(),
        first_name: slug.to_string(),
        last_name: "Test".to_string(),
        picture_url: None,
        premium_until: premium.then(|| Utc::now() + Duration::days(30)),
        anonymous_promotion: anonymous_uuid.map(|anonymous_uuid| AnonymousPromotion {
            anonymous_uuid,
            promoted_at: Utc::now() - Duration::days(1),
        }),
    }
}

fn guest(slug: &str) -> Profile {
    Profile::Guest {
        base: base(slug, false, None),
    }
}

fn coach(slug: &str) -> Profile {
    Profile::Coach {
        base: base(slug, false, None),
        club: None,
    }
}

fn player(slug: &str, premium: bool, anonymous_uuid: Option<Uuid>) -> Profile {
    Profile::Player {
        base: base(slug, premium, anonymous_uuid),
        team: None,
    }
}

fn uuid_of(profile: &Profile) -> Uuid {
    profile.base().uuid
}

#[tokio::test]
async fn test_basic_plan_quota_is_enforced() {
    let alice = guest("alice");
    let bob = player("bob", false, None);
    let carol = player("carol", false, None);
    let dave = player("dave", false, None);
    let engine = Engine::new(&[alice.clone(), bob.clone(), carol.clone(), dave.clone()]).await;

    engine.open(&alice, uuid_of(&bob)).await.unwrap();
    engine.open(&alice, uuid_of(&carol)).await.unwrap();

    let err = engine.open(&alice, uuid_of(&dave)).await.unwrap_err();
    assert!(matches!(
        err,
        OpenInquiryError::QuotaExceeded {
            counter: 2,
            limit: 2
        }
    ));
    assert_eq!(engine.counter(&alice).await, 2);

    let metadata = engine.state.get_metadata_uc.execute(alice.user_id()).await.unwrap();
    assert_eq!(metadata.ledger.inquiries_left, Some(0));
}

#[tokio::test]
async fn test_last_unit_to_premium_then_limit_reached() {
    let alice = coach("alice");
    let regular: Vec<Profile> = (0..4)
        .map(|i| player(&format!("regular-{i}"), false, None))
        .collect();
    let star = player("star", true, None);
    let late = player("late", false, None);
    let mut all = regular.clone();
    all.extend([alice.clone(), star.clone(), late.clone()]);
    let engine = Engine::new(&all).await;

    for target in &regular {
        engine.open(&alice, uuid_of(target)).await.unwrap();
    }
    assert_eq!(engine.counter(&alice).await, 4);

    let last = engine.open(&alice, uuid_of(&star)).await.unwrap();
    assert_eq!(last.request.target_pool, QuotaPool::PremiumProfile);
    assert_eq!(engine.counter(&alice).await, 5);

    let err = engine.open(&alice, uuid_of(&late)).await.unwrap_err();
    assert!(matches!(
        err,
        OpenInquiryError::QuotaExceeded {
            counter: 5,
            limit: 5
        }
    ));
    assert_eq!(err.to_string(), "You have reached your limit of inquiries (5/5).");
    assert_eq!(engine.counter(&alice).await, 5);
}

#[tokio::test]
async fn test_premium_pool_is_capped_separately() {
    let alice = coach("alice");
    let premium: Vec<Profile> = (0..3)
        .map(|i| player(&format!("premium-{i}"), true, None))
        .collect();
    let regular = player("regular", false, None);
    let mut all = premium.clone();
    all.push(alice.clone());
    all.push(regular.clone());
    let engine = Engine::new(&all).await;

    let first = engine.open(&alice, uuid_of(&premium[0])).await.unwrap();
    assert_eq!(first.request.target_pool, QuotaPool::PremiumProfile);
    engine.open(&alice, uuid_of(&premium[1])).await.unwrap();

    let err = engine.open(&alice, uuid_of(&premium[2])).await.unwrap_err();
    assert!(matches!(
        err,
        OpenInquiryError::QuotaExceeded {
            counter: 2,
            limit: 2
        }
    ));

    let out = engine.open(&alice, uuid_of(&regular)).await.unwrap();
    assert_eq!(out.request.target_pool, QuotaPool::Regular);
    assert_eq!(engine.counter(&alice).await, 3);
}

#[tokio::test]
async fn test_anonymous_identity_is_frozen_at_creation() {
    let x = Uuid::new_v4();
    let carol = coach("carol");
    let dave = player("dave", false, Some(x));
    let engine = Engine::new(&[carol.clone(), dave.clone()]).await;

    let out = engine.open_with(&carol, uuid_of(&dave), Some(true)).await.unwrap();
    assert!(out.request.anonymous_recipient);
    assert_eq!(out.request.recipient_anonymous_uuid, Some(x));

    // プロモーション終了後も作成時の匿名 UUID で表示される
    let mut lapsed = dave.clone();
    if let Profile::Player { base, .. } = &mut lapsed {
        base.anonymous_promotion = None;
    }
    engine.store.upsert_profile(lapsed).await;

    let views = engine
        .state
        .list_inquiries_uc
        .execute(carol.user_id(), InquiryListKind::Sent, RenderContext::Standard)
        .await
        .unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].recipient_object.slug, format!("anonymous-{x}"));
    assert!(views[0].recipient_object.is_anonymous);

    engine
        .respond(&dave, out.request.id, Decision::Accept)
        .await
        .unwrap();
    let view = engine
        .state
        .render_inquiry_uc
        .render(
            &InquiryRequestRepository::find_by_id(engine.store.as_ref(), out.request.id)
                .await
                .unwrap()
                .unwrap(),
            carol.user_id(),
            RenderContext::Standard,
        )
        .await
        .unwrap();
    assert_eq!(view.recipient_object.slug, "dave");
}

#[tokio::test]
async fn test_opening_by_anonymous_uuid_is_always_anonymous() {
    let x = Uuid::new_v4();
    let carol = coach("carol");
    let dave = player("dave", false, Some(x));
    let engine = Engine::new(&[carol.clone(), dave.clone()]).await;

    let out = engine.open(&carol, x).await.unwrap();
    assert!(out.request.anonymous_recipient);
    assert_eq!(out.request.recipient_id, dave.user_id());
}

#[tokio::test]
async fn test_anonymous_flag_requires_promotion() {
    let carol = coach("carol");
    let bob = player("bob", false, None);
    let engine = Engine::new(&[carol.clone(), bob.clone()]).await;

    let err = engine
        .open_with(&carol, uuid_of(&bob), Some(true))
        .await
        .unwrap_err();
    assert!(matches!(err, OpenInquiryError::Validation { .. }));
    assert_eq!(engine.counter(&carol).await, 0);
}

#[tokio::test]
async fn test_cross_request_matches_and_consumes_one_unit() {
    let alice = coach("alice");
    let bob = coach("bob");
    let engine = Engine::new(&[alice.clone(), bob.clone()]).await;

    let first = engine.open(&alice, uuid_of(&bob)).await.unwrap();
    assert!(!first.matched);

    let second = engine.open(&bob, uuid_of(&alice)).await.unwrap();
    assert!(second.matched);
    assert_eq!(second.request.id, first.request.id);
    assert_eq!(second.request.status, InquiryStatus::Accepted);
    assert!(second
        .events
        .iter()
        .any(|e| matches!(e, InquiryEvent::CrossRequestMatched { .. })));

    assert_eq!(engine.counter(&alice).await, 1);
    assert_eq!(engine.counter(&bob).await, 0);
    assert_eq!(engine.status(first.request.id).await, InquiryStatus::Accepted);

    let err = engine.open(&bob, uuid_of(&alice)).await.unwrap_err();
    assert!(matches!(err, OpenInquiryError::AlreadyAccepted(_)));
    let err = engine.open(&alice, uuid_of(&bob)).await.unwrap_err();
    assert!(matches!(err, OpenInquiryError::Duplicate(_)));
}

#[tokio::test]
async fn test_cross_request_in_reverse_order() {
    let alice = coach("alice");
    let bob = coach("bob");
    let engine = Engine::new(&[alice.clone(), bob.clone()]).await;

    let first = engine.open(&bob, uuid_of(&alice)).await.unwrap();
    let second = engine.open(&alice, uuid_of(&bob)).await.unwrap();
    assert!(second.matched);
    assert_eq!(second.request.id, first.request.id);

    assert_eq!(engine.counter(&bob).await, 1);
    assert_eq!(engine.counter(&alice).await, 0);
}

#[tokio::test]
async fn test_reopen_after_reject_consumes_again() {
    let alice = coach("alice");
    let bob = coach("bob");
    let engine = Engine::new(&[alice.clone(), bob.clone()]).await;

    let first = engine.open(&alice, uuid_of(&bob)).await.unwrap();
    let status = engine
        .respond(&bob, first.request.id, Decision::Reject)
        .await
        .unwrap();
    assert_eq!(status, InquiryStatus::Rejected);
    assert_eq!(engine.counter(&alice).await, 1);

    let again = engine.open(&alice, uuid_of(&bob)).await.unwrap();
    assert_ne!(again.request.id, first.request.id);
    assert_eq!(engine.counter(&alice).await, 2);
}

#[tokio::test]
async fn test_self_inquiry_is_rejected_without_charge() {
    let alice = coach("alice");
    let engine = Engine::new(&[alice.clone()]).await;

    let err = engine.open(&alice, uuid_of(&alice)).await.unwrap_err();
    assert!(matches!(err, OpenInquiryError::SelfInquiry));
    assert_eq!(engine.counter(&alice).await, 0);
}

#[tokio::test]
async fn test_terminal_states_are_immutable() {
    let alice = coach("alice");
    let bob = coach("bob");
    let carol = coach("carol");
    let engine = Engine::new(&[alice.clone(), bob.clone(), carol.clone()]).await;

    let accepted = engine.open(&alice, uuid_of(&bob)).await.unwrap().request;
    engine
        .respond(&bob, accepted.id, Decision::Accept)
        .await
        .unwrap();
    for decision in [Decision::Accept, Decision::Reject] {
        let err = engine.respond(&bob, accepted.id, decision).await.unwrap_err();
        assert!(matches!(err, RespondInquiryError::TransitionNotAllowed { .. }));
    }
    assert_eq!(engine.status(accepted.id).await, InquiryStatus::Accepted);

    let rejected = engine.open(&alice, uuid_of(&carol)).await.unwrap().request;
    engine
        .respond(&carol, rejected.id, Decision::Reject)
        .await
        .unwrap();
    let err = engine
        .respond(&carol, rejected.id, Decision::Accept)
        .await
        .unwrap_err();
    assert!(matches!(err, RespondInquiryError::TransitionNotAllowed { .. }));
    assert_eq!(engine.status(rejected.id).await, InquiryStatus::Rejected);
}

#[tokio::test]
async fn test_only_recipient_can_respond() {
    let alice = coach("alice");
    let bob = coach("bob");
    let engine = Engine::new(&[alice.clone(), bob.clone()]).await;

    let request = engine.open(&alice, uuid_of(&bob)).await.unwrap().request;
    let err = engine
        .respond(&alice, request.id, Decision::Accept)
        .await
        .unwrap_err();
    assert!(matches!(err, RespondInquiryError::NotOwner));
    assert_eq!(engine.status(request.id).await, InquiryStatus::Sent);
}

#[tokio::test]
async fn test_stale_request_restores_quota_once() {
    let alice = coach("alice");
    let bob = coach("bob");
    let engine = Engine::new(&[alice.clone(), bob.clone()]).await;
    engine.open(&alice, uuid_of(&bob)).await.unwrap();
    assert_eq!(engine.counter(&alice).await, 1);

    let restore = RestoreStaleInquiriesUseCase::new(engine.store.clone(), 7);
    let now = Utc::now();

    assert!(restore.execute(now + Duration::days(6)).await.unwrap().is_empty());

    let events = restore.execute(now + Duration::days(8)).await.unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], InquiryEvent::QuotaRestored { .. }));
    assert_eq!(engine.counter(&alice).await, 0);

    assert!(restore.execute(now + Duration::days(9)).await.unwrap().is_empty());
    assert_eq!(engine.counter(&alice).await, 0);
}

#[tokio::test]
async fn test_reminders_are_sent_at_most_twice() {
    let alice = coach("alice");
    let bob = coach("bob");
    let engine = Engine::new(&[alice.clone(), bob.clone()]).await;
    engine.open(&alice, uuid_of(&bob)).await.unwrap();

    let remind = RemindPendingInquiriesUseCase::new(engine.store.clone(), 3, 6);
    let now = Utc::now();

    assert!(remind.execute(now + Duration::days(1)).await.unwrap().is_empty());
    assert_eq!(remind.execute(now + Duration::days(4)).await.unwrap().len(), 1);
    assert!(remind.execute(now + Duration::days(4)).await.unwrap().is_empty());
    assert_eq!(remind.execute(now + Duration::days(7)).await.unwrap().len(), 1);
    assert!(remind.execute(now + Duration::days(10)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cycle_reset_clears_counter() {
    let alice = guest("alice");
    let bob = coach("bob");
    let carol = coach("carol");
    let engine = Engine::new(&[alice.clone(), bob.clone(), carol.clone()]).await;
    engine.open(&alice, uuid_of(&bob)).await.unwrap();
    engine.open(&alice, uuid_of(&carol)).await.unwrap();
    assert_eq!(engine.counter(&alice).await, 2);

    let reset = ResetQuotaCyclesUseCase::new(engine.store.clone());
    assert_eq!(reset.execute(Utc::now()).await.unwrap(), 0);
    assert_eq!(reset.execute(Utc::now() + Duration::days(31)).await.unwrap(), 1);
    assert_eq!(engine.counter(&alice).await, 0);
}
