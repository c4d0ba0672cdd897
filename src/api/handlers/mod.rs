pub mod admin;
pub mod payments;
pub mod plans;
pub mod refunds;
pub mod root;
