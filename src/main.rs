use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::info;

use inquiry_server::adapter;
use inquiry_server::adapter::handler::{publish_all, AppState, Repositories};
use inquiry_server::adapter::repository::{
    CachedPlanRepository, ContactPostgresRepository, InMemoryInquiryStore,
    InquiryPostgresRepository, LedgerPostgresRepository, PlanPostgresRepository,
    ProfilePostgresRepository,
};
use inquiry_server::domain::entity::event::InquiryEvent;
use inquiry_server::domain::repository::PlanRepository;
use inquiry_server::infrastructure;
use inquiry_server::infrastructure::cache::PlanCache;
use inquiry_server::infrastructure::config::{Config, InquiryConfig};
use inquiry_server::infrastructure::kafka_producer::{
    InquiryEventPublisher, KafkaInquiryProducer, NoopInquiryEventPublisher,
};
use inquiry_server::infrastructure::metrics::Metrics;
use inquiry_server::infrastructure::telemetry::{init_tracing, TelemetryConfig};
use inquiry_server::usecase;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());
    let cfg = Config::load(&config_path)?;

    init_tracing(&TelemetryConfig {
        log_level: cfg.observability.log_level.clone(),
        log_format: cfg.observability.log_format.clone(),
    })?;

    info!(
        app_name = %cfg.app.name,
        version = %cfg.app.version,
        environment = %cfg.app.environment,
        "starting inquiry server"
    );

    let metrics = Arc::new(Metrics::new(&cfg.app.name)?);
    let plan_cache = Arc::new(PlanCache::new(
        cfg.inquiry.plan_cache_max_capacity,
        cfg.inquiry.plan_cache_ttl_secs,
    ));

    // --- Repository initialization: PostgreSQL → InMemory fallback ---
    let (repos, db_pool) = if let Some(ref db_cfg) = cfg.database {
        info!(schema = %db_cfg.schema, "connecting to PostgreSQL");
        match infrastructure::database::create_pool(&db_cfg.url, db_cfg.max_connections).await {
            Ok(pool) => {
                if db_cfg.run_migrations {
                    infrastructure::database::run_migrations(&pool).await?;
                    info!("database migrations applied");
                }
                let pool = Arc::new(pool);
                let plans: Arc<dyn PlanRepository> = Arc::new(CachedPlanRepository::with_metrics(
                    Arc::new(PlanPostgresRepository::new(pool.clone())),
                    plan_cache.clone(),
                    metrics.clone(),
                ));
                let repos = Repositories {
                    inquiries: Arc::new(InquiryPostgresRepository::new(pool.clone())),
                    ledgers: Arc::new(LedgerPostgresRepository::new(pool.clone())),
                    plans,
                    contacts: Arc::new(ContactPostgresRepository::new(pool.clone())),
                    profiles: Arc::new(ProfilePostgresRepository::new(pool.clone())),
                };
                info!("PostgreSQL connection pool created successfully");
                (repos, Some(pool))
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "failed to connect to PostgreSQL, falling back to InMemory"
                );
                (in_memory_repositories(&cfg, plan_cache, metrics.clone()).await, None)
            }
        }
    } else {
        info!("no database config found, using InMemory repositories");
        (in_memory_repositories(&cfg, plan_cache, metrics.clone()).await, None)
    };

    // --- Kafka event publisher initialization ---
    let publisher: Arc<dyn InquiryEventPublisher> = if let Some(ref kafka_cfg) = cfg.kafka {
        match KafkaInquiryProducer::new(
            &kafka_cfg.brokers.join(","),
            &kafka_cfg.security_protocol,
            &kafka_cfg.topic,
        ) {
            Ok(producer) => {
                info!(topic = %kafka_cfg.topic, "Kafka producer initialized for inquiry events");
                Arc::new(producer.with_metrics(metrics.clone()))
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "failed to create Kafka producer, using NoopInquiryEventPublisher"
                );
                Arc::new(NoopInquiryEventPublisher)
            }
        }
    } else {
        info!("no Kafka config found, using NoopInquiryEventPublisher");
        Arc::new(NoopInquiryEventPublisher)
    };

    // Maintenance cron
    {
        let jobs = MaintenanceJobs {
            reset_uc: Arc::new(usecase::ResetQuotaCyclesUseCase::new(repos.ledgers.clone())),
            restore_uc: Arc::new(usecase::RestoreStaleInquiriesUseCase::new(
                repos.inquiries.clone(),
                cfg.inquiry.stale_after_days,
            )),
            remind_uc: Arc::new(usecase::RemindPendingInquiriesUseCase::new(
                repos.inquiries.clone(),
                cfg.inquiry.first_reminder_days,
                cfg.inquiry.second_reminder_days,
            )),
            publisher: publisher.clone(),
            metrics: metrics.clone(),
        };
        let inquiry_cfg = cfg.inquiry.clone();
        tokio::spawn(async move {
            run_maintenance_cron(inquiry_cfg, jobs).await;
        });
    }

    let state = AppState::new(&repos, publisher.clone(), metrics, db_pool);
    let app = adapter::handler::router(state).layer(TraceLayer::new_for_http());

    let host: std::net::IpAddr = cfg.server.host.parse()?;
    let addr = SocketAddr::new(host, cfg.server.port);
    info!("REST server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = publisher.close().await {
        tracing::warn!(error = %e, "failed to flush inquiry event publisher");
    }
    info!("inquiry server exited");
    Ok(())
}

async fn in_memory_repositories(
    cfg: &Config,
    plan_cache: Arc<PlanCache>,
    metrics: Arc<Metrics>,
) -> Repositories {
    let store = Arc::new(InMemoryInquiryStore::with_catalog());
    if let Some(ref profiles) = cfg.profiles_seed {
        info!(count = profiles.len(), "seeding in-memory profile directory");
        store.seed_profiles(profiles.clone()).await;
    }
    let mut repos = Repositories::in_memory(store.clone());
    repos.plans = Arc::new(CachedPlanRepository::with_metrics(store, plan_cache, metrics));
    repos
}

async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = signal::ctrl_c() => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

// --- Cron-based maintenance ---

struct MaintenanceJobs {
    reset_uc: Arc<usecase::ResetQuotaCyclesUseCase>,
    restore_uc: Arc<usecase::RestoreStaleInquiriesUseCase>,
    remind_uc: Arc<usecase::RemindPendingInquiriesUseCase>,
    publisher: Arc<dyn InquiryEventPublisher>,
    metrics: Arc<Metrics>,
}

async fn run_maintenance_cron(cfg: InquiryConfig, jobs: MaintenanceJobs) {
    use std::str::FromStr;

    let schedules: Vec<(&str, croner::Cron)> = [
        ("cycle_reset", cfg.schedule.cycle_reset.as_str()),
        ("maintenance", cfg.schedule.maintenance.as_str()),
    ]
    .into_iter()
    .filter_map(|(label, expr)| match croner::Cron::from_str(expr) {
        Ok(cron) => {
            info!(schedule = label, expression = expr, "cron schedule registered");
            Some((label, cron))
        }
        Err(e) => {
            tracing::error!(
                schedule = label,
                expression = expr,
                error = %e,
                "failed to parse cron expression, skipping"
            );
            None
        }
    })
    .collect();

    if schedules.is_empty() {
        tracing::warn!("no valid cron schedules, maintenance cron task exiting");
        return;
    }

    loop {
        let now = chrono::Utc::now();
        let mut next_fire: Option<(chrono::DateTime<chrono::Utc>, &str)> = None;

        for (label, cron) in &schedules {
            if let Ok(next) = cron.find_next_occurrence(&now, false) {
                if next_fire.map_or(true, |(at, _)| next < at) {
                    next_fire = Some((next, *label));
                }
            }
        }

        let (fire_at, label) = match next_fire {
            Some(v) => v,
            None => {
                tracing::error!("no next cron occurrence found, maintenance cron task exiting");
                return;
            }
        };

        let wait = (fire_at - chrono::Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(1));

        info!(
            schedule = label,
            next_run = %fire_at,
            wait_secs = wait.as_secs(),
            "sleeping until next maintenance run"
        );

        tokio::time::sleep(wait).await;

        match label {
            "cycle_reset" => reset_cycles(&jobs).await,
            _ => run_inquiry_maintenance(&jobs).await,
        }
    }
}

async fn reset_cycles(jobs: &MaintenanceJobs) {
    match jobs.reset_uc.execute(chrono::Utc::now()).await {
        Ok(count) => info!(reset = count, "quota cycles reset"),
        Err(e) => tracing::error!(error = %e, "failed to reset quota cycles"),
    }
}

/// 放置されたリクエストの枠返却とリマインダー送信。
async fn run_inquiry_maintenance(jobs: &MaintenanceJobs) {
    let now = chrono::Utc::now();

    match jobs.restore_uc.execute(now).await {
        Ok(events) => {
            for event in &events {
                if let InquiryEvent::QuotaRestored { pool, .. } = event {
                    jobs.metrics.record_quota_restored(pool.as_str());
                }
            }
            info!(restored = events.len(), "stale inquiries restored");
            publish_all(jobs.publisher.as_ref(), &events).await;
        }
        Err(e) => tracing::error!(error = %e, "failed to restore stale inquiries"),
    }

    match jobs.remind_uc.execute(now).await {
        Ok(events) => {
            info!(reminders = events.len(), "decision reminders scheduled");
            publish_all(jobs.publisher.as_ref(), &events).await;
        }
        Err(e) => tracing::error!(error = %e, "failed to remind pending inquiries"),
    }
}
