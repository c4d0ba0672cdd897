use std::{sync::Arc, time::Duration};

use tokio::time;

use crate::service::{payment_ledger::PaymentLedger, slot_allocator::SlotAllocator};

/// Background expiry of stale payments and lapsed slot locks. Readers
/// already treat lapsed locks as Open, so a late sweep only delays cleanup.
pub struct Sweeper {
    ledger: Arc<PaymentLedger>,
    slots: Arc<SlotAllocator>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_payments: usize,
    pub released_slots: u64,
}

impl Sweeper {
    pub fn new(ledger: Arc<PaymentLedger>, slots: Arc<SlotAllocator>) -> Self {
        Self { ledger, slots }
    }

    /// Payments first, so slots freed by their expiry are counted there
    /// rather than as lapsed locks.
    pub async fn run_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        match self.ledger.expire_stale_payments().await {
            Ok(expired) => report.expired_payments = expired.len(),
            Err(e) => tracing::error!("Payment expiry sweep failed: {}", e),
        }

        match self.slots.release_expired_locks().await {
            Ok(released) => report.released_slots = released,
            Err(e) => tracing::error!("Slot lock sweep failed: {}", e),
        }

        report
    }

    pub fn spawn(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = self.run_once().await;
                if report != SweepReport::default() {
                    tracing::debug!("Sweep finished: {:?}", report);
                }
            }
        })
    }
}
