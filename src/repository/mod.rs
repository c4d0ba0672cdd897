//! SQLite storage for the booking core.
//!
//! Repositories take a `&mut SqliteConnection` rather than owning a pool so
//! that services can run several of them inside one transaction
//! (`&mut *tx`) or against a plain pooled connection for reads.

pub mod plan_repository;
pub mod slot_repository;
pub mod payment_repository;
pub mod refund_repository;

pub use plan_repository::SqlitePlanRepository;
pub use slot_repository::SqliteSlotRepository;
pub use payment_repository::SqlitePaymentRepository;
pub use refund_repository::SqliteRefundRepository;
