#![allow(dead_code)]

use std::{sync::Arc, time::Duration as StdDuration};

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde_json::{json, Map, Value};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use tempfile::TempDir;
use tutorhub::{
    config::Settings,
    domain::{BookingPlan, CreatePlanRequest, InitiatePayment, Payment, PaymentType, Slot, Weekday},
    integrations::IntegrationManager,
    payments::webhook::{canonical_data, sign},
    service::ServiceContext,
    testing::{FakePaymentProvider, ManualClock, RecordingIntegration, StaticCourseGateway},
};
use uuid::Uuid;

pub const CHECKSUM_KEY: &str = "test-checksum-key";
pub const PRICE_PER_HOUR: i64 = 200_000;

pub struct TestApp {
    pub ctx: Arc<ServiceContext>,
    pub pool: SqlitePool,
    pub clock: Arc<ManualClock>,
    pub provider: Arc<FakePaymentProvider>,
    pub recorder: Arc<RecordingIntegration>,
    pub courses: Arc<StaticCourseGateway>,
    // Keeps an on-disk database alive for the test's lifetime
    _db_dir: Option<TempDir>,
}

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.payment.checksum_key = CHECKSUM_KEY.to_string();
    settings.auth.jwt_secret = "test-jwt-secret".to_string();
    settings.booking.lock_timeout_ms = 10_000;
    settings
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

pub async fn setup() -> anyhow::Result<TestApp> {
    setup_with(test_settings(), StaticCourseGateway::new()).await
}

pub async fn setup_with(settings: Settings, courses: StaticCourseGateway) -> anyhow::Result<TestApp> {
    // One connection: every connection to :memory: is a separate database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    build(pool, settings, courses, None).await
}

/// A WAL database file with several pooled connections, configured the way
/// the server configures its own pool.
pub async fn setup_on_disk(max_connections: u32) -> anyhow::Result<TestApp> {
    let dir = tempfile::tempdir()?;
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("tutorhub.db"))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(StdDuration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    build(pool, test_settings(), StaticCourseGateway::new(), Some(dir)).await
}

async fn build(
    pool: SqlitePool,
    settings: Settings,
    courses: StaticCourseGateway,
    db_dir: Option<TempDir>,
) -> anyhow::Result<TestApp> {
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await?;

    let clock = Arc::new(ManualClock::new(start_time()));
    let provider = Arc::new(FakePaymentProvider::new());
    let recorder = Arc::new(RecordingIntegration::new());
    let courses = Arc::new(courses);

    let integration_manager = Arc::new(IntegrationManager::new());
    integration_manager.register(recorder.clone()).await;

    let ctx = Arc::new(ServiceContext::new(
        Arc::new(settings),
        pool.clone(),
        clock.clone(),
        courses.clone(),
        Some(provider.clone()),
        integration_manager,
    ));

    Ok(TestApp {
        ctx,
        pool,
        clock,
        provider,
        recorder,
        courses,
        _db_dir: db_dir,
    })
}

pub fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn plan_request(weekday: Weekday, start: NaiveTime, end: NaiveTime, duration: i32) -> CreatePlanRequest {
    CreatePlanRequest {
        weekday,
        start_time: start,
        end_time: end,
        slot_duration_minutes: duration,
        price_per_hour: PRICE_PER_HOUR,
        meeting_url: "https://meet.example.com/room".to_string(),
    }
}

impl TestApp {
    /// Monday 09:00-10:00 in 30 minute slots.
    pub async fn monday_plan(&self, tutor_id: Uuid) -> anyhow::Result<(BookingPlan, Vec<Slot>)> {
        let plan = self.ctx.plan_registry
            .create_plan(tutor_id, plan_request(Weekday::Monday, t(9, 0), t(10, 0), 30))
            .await?;
        let slots = self.ctx.slot_allocator.list_slots(plan.id).await?;
        Ok((plan, slots))
    }

    pub async fn book(&self, learner_id: Uuid, plan_id: Uuid, slot_ids: &[Uuid]) -> tutorhub::error::Result<Payment> {
        self.ctx.payment_ledger
            .initiate(InitiatePayment {
                user_id: learner_id,
                target_id: plan_id,
                payment_type: PaymentType::Booking,
                slot_ids: slot_ids.to_vec(),
            })
            .await
    }

    pub async fn slots(&self, plan_id: Uuid) -> Vec<Slot> {
        self.ctx.slot_allocator.list_slots(plan_id).await.unwrap()
    }

    pub async fn payment(&self, id: Uuid) -> Payment {
        self.ctx.payment_ledger.get_payment(id).await.unwrap()
    }

    /// Waits for spawned notification deliveries to land.
    pub async fn wait_for_event(&self, name: &str, count: usize) {
        for _ in 0..100 {
            if self.recorder.count(name) >= count {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        // Give any extra (unexpected) deliveries a chance to show up
        tokio::time::sleep(StdDuration::from_millis(30)).await;
    }
}

pub fn signed_webhook(data: Value, success: bool, code: &str) -> Vec<u8> {
    let data: Map<String, Value> = data.as_object().cloned().unwrap();
    let signature = sign(CHECKSUM_KEY, &canonical_data(&data)).unwrap();

    serde_json::to_vec(&json!({
        "code": code,
        "desc": if success { "success" } else { "failed" },
        "success": success,
        "data": data,
        "signature": signature,
    }))
    .unwrap()
}

pub fn paid_webhook(payment: &Payment) -> Vec<u8> {
    signed_webhook(
        json!({
            "orderCode": payment.order_code,
            "amount": payment.amount,
            "description": payment.description,
            "reference": format!("FT{}", payment.order_code),
            "counterAccountName": null,
        }),
        true,
        "00",
    )
}

pub fn failed_webhook(payment: &Payment) -> Vec<u8> {
    signed_webhook(
        json!({
            "orderCode": payment.order_code,
            "amount": payment.amount,
            "description": payment.description,
        }),
        false,
        "01",
    )
}

pub fn status_webhook(payment: &Payment, status: &str) -> Vec<u8> {
    signed_webhook(
        json!({
            "orderCode": payment.order_code,
            "amount": payment.amount,
            "status": status,
        }),
        true,
        "00",
    )
}
