pub mod locks;
pub mod payment_ledger;
pub mod plan_registry;
pub mod refund_workflow;
pub mod slot_allocator;
pub mod sweeper;

use std::{sync::Arc, time::Duration};

use sqlx::SqlitePool;

use crate::{
    clock::Clock,
    config::Settings,
    integrations::{course::CourseGateway, IntegrationManager},
    payments::PaymentProvider,
};
use locks::LockManager;
use payment_ledger::PaymentLedger;
use plan_registry::PlanRegistry;
use refund_workflow::RefundWorkflow;
use slot_allocator::SlotAllocator;
use sweeper::Sweeper;

/// Everything the HTTP layer and the background sweeper share, built once
/// at startup.
pub struct ServiceContext {
    pub settings: Arc<Settings>,
    pub plan_registry: Arc<PlanRegistry>,
    pub slot_allocator: Arc<SlotAllocator>,
    pub payment_ledger: Arc<PaymentLedger>,
    pub refund_workflow: Arc<RefundWorkflow>,
    pub sweeper: Arc<Sweeper>,
    pub integration_manager: Arc<IntegrationManager>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(
        settings: Arc<Settings>,
        db_pool: SqlitePool,
        clock: Arc<dyn Clock>,
        courses: Arc<dyn CourseGateway>,
        provider: Option<Arc<dyn PaymentProvider>>,
        integration_manager: Arc<IntegrationManager>,
    ) -> Self {
        let locks = Arc::new(LockManager::new(Duration::from_millis(
            settings.booking.lock_timeout_ms,
        )));

        let plan_registry = Arc::new(PlanRegistry::new(
            db_pool.clone(),
            clock.clone(),
            locks.clone(),
            &settings.booking,
        ));
        let slot_allocator = Arc::new(SlotAllocator::new(db_pool.clone(), clock.clone()));
        let refund_workflow = Arc::new(RefundWorkflow::new(
            db_pool.clone(),
            clock.clone(),
            integration_manager.clone(),
        ));
        let payment_ledger = Arc::new(PaymentLedger::new(
            db_pool.clone(),
            clock,
            settings.clone(),
            locks,
            slot_allocator.clone(),
            refund_workflow.clone(),
            courses,
            provider,
            integration_manager.clone(),
        ));
        let sweeper = Arc::new(Sweeper::new(payment_ledger.clone(), slot_allocator.clone()));

        Self {
            settings,
            plan_registry,
            slot_allocator,
            payment_ledger,
            refund_workflow,
            sweeper,
            integration_manager,
            db_pool,
        }
    }
}
