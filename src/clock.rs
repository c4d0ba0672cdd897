use chrono::{DateTime, Utc};
use rand::Rng;

/// Source of "now" for every timestamp the core writes or compares.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Generates provider-facing order codes.
///
/// Codes are `millis * 1000 + random(0..1000)`, which stays below 2^53 for
/// the foreseeable future so JSON consumers can hold them as doubles.
/// Uniqueness is ultimately enforced by the `payments.order_code` constraint.
pub struct OrderCodeGenerator;

impl OrderCodeGenerator {
    pub fn next(now: DateTime<Utc>) -> i64 {
        let suffix: i64 = rand::thread_rng().gen_range(0..1000);
        now.timestamp_millis() * 1000 + suffix
    }
}
