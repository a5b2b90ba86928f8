pub mod get_inquiry_metadata;
pub mod list_inquiries;
pub mod open_inquiry;
pub mod quota_ledger;
pub mod reconcile_cross_request;
pub mod remind_pending_inquiries;
pub mod render_inquiry;
pub mod reset_quota_cycles;
pub mod respond_inquiry;
pub mod restore_stale_inquiries;
pub mod update_inquiry_contact;

pub use get_inquiry_metadata::GetInquiryMetadataUseCase;
pub use list_inquiries::ListInquiriesUseCase;
pub use open_inquiry::OpenInquiryUseCase;
pub use quota_ledger::QuotaLedger;
pub use reconcile_cross_request::CrossRequestReconciler;
pub use remind_pending_inquiries::RemindPendingInquiriesUseCase;
pub use render_inquiry::RenderInquiryUseCase;
pub use reset_quota_cycles::ResetQuotaCyclesUseCase;
pub use respond_inquiry::RespondInquiryUseCase;
pub use restore_stale_inquiries::RestoreStaleInquiriesUseCase;
pub use update_inquiry_contact::UpdateInquiryContactUseCase;
