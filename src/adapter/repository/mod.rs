pub mod cached_plan_repository;
pub mod contact_postgres;
pub mod in_memory;
pub mod inquiry_postgres;
pub mod ledger_postgres;
pub mod plan_postgres;
pub mod profile_postgres;

pub use cached_plan_repository::CachedPlanRepository;
pub use contact_postgres::ContactPostgresRepository;
pub use in_memory::InMemoryInquiryStore;
pub use inquiry_postgres::InquiryPostgresRepository;
pub use ledger_postgres::LedgerPostgresRepository;
pub use plan_postgres::PlanPostgresRepository;
pub use profile_postgres::ProfilePostgresRepository;
