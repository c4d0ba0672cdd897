pub mod booking_plan;
pub mod slot;
pub mod payment;
pub mod refund;

pub use booking_plan::*;
pub use slot::*;
pub use payment::*;
pub use refund::*;
