pub mod error;
pub mod health;
pub mod inquiry_handler;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;

use crate::adapter::repository::InMemoryInquiryStore;
use crate::domain::entity::event::InquiryEvent;
use crate::domain::repository::{
    ContactRepository, InquiryRequestRepository, LedgerRepository, PlanRepository,
    ProfileDirectory,
};
use crate::infrastructure::kafka_producer::InquiryEventPublisher;
use crate::infrastructure::metrics::Metrics;
use crate::usecase::{
    CrossRequestReconciler, GetInquiryMetadataUseCase, ListInquiriesUseCase, OpenInquiryUseCase,
    QuotaLedger, RenderInquiryUseCase, RespondInquiryUseCase, UpdateInquiryContactUseCase,
};

/// Repositories はストレージ実装 (Postgres またはインメモリ) の組。
#[derive(Clone)]
pub struct Repositories {
    pub inquiries: Arc<dyn InquiryRequestRepository>,
    pub ledgers: Arc<dyn LedgerRepository>,
    pub plans: Arc<dyn PlanRepository>,
    pub contacts: Arc<dyn ContactRepository>,
    pub profiles: Arc<dyn ProfileDirectory>,
}

impl Repositories {
    /// すべてのリポジトリを 1 つのインメモリストアで賄う。
    pub fn in_memory(store: Arc<InMemoryInquiryStore>) -> Self {
        Self {
            inquiries: store.clone(),
            ledgers: store.clone(),
            plans: store.clone(),
            contacts: store.clone(),
            profiles: store,
        }
    }
}

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub open_inquiry_uc: Arc<OpenInquiryUseCase>,
    pub respond_inquiry_uc: Arc<RespondInquiryUseCase>,
    pub render_inquiry_uc: Arc<RenderInquiryUseCase>,
    pub list_inquiries_uc: Arc<ListInquiriesUseCase>,
    pub get_metadata_uc: Arc<GetInquiryMetadataUseCase>,
    pub update_contact_uc: Arc<UpdateInquiryContactUseCase>,
    pub publisher: Arc<dyn InquiryEventPublisher>,
    pub metrics: Arc<Metrics>,
    /// None の場合はインメモリで動作している。
    pub db_pool: Option<Arc<PgPool>>,
}

impl AppState {
    pub fn new(
        repos: &Repositories,
        publisher: Arc<dyn InquiryEventPublisher>,
        metrics: Arc<Metrics>,
        db_pool: Option<Arc<PgPool>>,
    ) -> Self {
        let ledger = Arc::new(QuotaLedger::new(repos.ledgers.clone(), repos.plans.clone()));
        let reconciler = Arc::new(CrossRequestReconciler::new(repos.inquiries.clone()));
        let render_inquiry_uc = Arc::new(RenderInquiryUseCase::new(
            repos.profiles.clone(),
            repos.contacts.clone(),
        ));
        Self {
            open_inquiry_uc: Arc::new(OpenInquiryUseCase::new(
                repos.inquiries.clone(),
                repos.profiles.clone(),
                ledger.clone(),
                reconciler,
            )),
            respond_inquiry_uc: Arc::new(RespondInquiryUseCase::new(repos.inquiries.clone())),
            list_inquiries_uc: Arc::new(ListInquiriesUseCase::new(
                repos.inquiries.clone(),
                render_inquiry_uc.clone(),
            )),
            render_inquiry_uc,
            get_metadata_uc: Arc::new(GetInquiryMetadataUseCase::new(
                ledger,
                repos.profiles.clone(),
                repos.contacts.clone(),
            )),
            update_contact_uc: Arc::new(UpdateInquiryContactUseCase::new(
                repos.contacts.clone(),
            )),
            publisher,
            metrics,
            db_pool,
        }
    }

    /// 通知の発行に失敗してもリクエスト自体は成功させる。
    pub async fn publish_events(&self, events: &[InquiryEvent]) {
        publish_all(self.publisher.as_ref(), events).await;
    }
}

/// 失敗はログに残して続行する。メンテナンスジョブからも使う。
pub async fn publish_all(publisher: &dyn InquiryEventPublisher, events: &[InquiryEvent]) {
    for event in events {
        if let Err(e) = publisher.publish(event).await {
            tracing::warn!(
                event_type = event.event_type(),
                error = %e,
                "failed to publish inquiry event"
            );
        }
    }
}

/// Build the REST API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(metrics_handler))
        .route("/inquiries/my/sent", get(inquiry_handler::list_sent))
        .route("/inquiries/my/received", get(inquiry_handler::list_received))
        .route("/inquiries/my/contacts", get(inquiry_handler::list_contacts))
        .route("/inquiries/my/meta-data", get(inquiry_handler::get_metadata))
        .route(
            "/inquiries/my/meta-data/update-contact",
            post(inquiry_handler::update_contact),
        )
        .route("/inquiries/:id/send", post(inquiry_handler::send_inquiry))
        .route("/inquiries/:id/accept", post(inquiry_handler::accept_inquiry))
        .route("/inquiries/:id/reject", post(inquiry_handler::reject_inquiry))
        .with_state(state)
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics.gather_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
