pub mod contact_repository;
pub mod inquiry_repository;
pub mod ledger_repository;

pub use contact_repository::{ContactRepository, ProfileDirectory};
pub use inquiry_repository::{CreateOutcome, InquiryRequestRepository};
pub use ledger_repository::{LedgerRepository, PlanRepository};
