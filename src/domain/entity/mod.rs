pub mod contact;
pub mod event;
pub mod inquiry_request;
pub mod ledger;
pub mod profile;
