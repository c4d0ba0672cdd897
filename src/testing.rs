//! Deterministic stand-ins for the clock and the external collaborators,
//! shared by unit and integration tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    clock::Clock,
    domain::Payment,
    error::{AppError, Result},
    integrations::{
        course::{CourseGateway, CourseOffer},
        Integration, IntegrationEvent,
    },
    payments::{CheckoutLink, PaymentProvider},
};

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Issues `https://pay.test/{order_code}` links, or fails when told to.
#[derive(Default)]
pub struct FakePaymentProvider {
    fail: Mutex<bool>,
    issued: Mutex<Vec<i64>>,
}

impl FakePaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_links(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(|p| p.into_inner()) = fail;
    }

    pub fn issued(&self) -> Vec<i64> {
        self.issued.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl PaymentProvider for FakePaymentProvider {
    async fn create_payment_link(&self, payment: &Payment) -> Result<CheckoutLink> {
        if *self.fail.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(AppError::External("provider unavailable".to_string()));
        }

        self.issued.lock().unwrap_or_else(|p| p.into_inner()).push(payment.order_code);
        Ok(CheckoutLink {
            checkout_url: format!("https://pay.test/{}", payment.order_code),
            provider_reference: Some(format!("link-{}", payment.order_code)),
        })
    }
}

/// Records the name of every event it receives.
#[derive(Default)]
pub struct RecordingIntegration {
    events: Mutex<Vec<&'static str>>,
}

impl RecordingIntegration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|event| **event == name).count()
    }
}

#[async_trait]
impl Integration for RecordingIntegration {
    fn name(&self) -> &str {
        "recording"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn handle_event(&self, event: &IntegrationEvent) -> Result<()> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).push(event.name());
        Ok(())
    }
}

/// In-memory course catalogue.
#[derive(Default)]
pub struct StaticCourseGateway {
    offers: Mutex<HashMap<Uuid, CourseOffer>>,
    enrolled: Mutex<HashSet<(Uuid, Uuid)>>,
}

impl StaticCourseGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_course(self, course_id: Uuid, title: &str, price: i64) -> Self {
        self.offers.lock().unwrap_or_else(|p| p.into_inner()).insert(
            course_id,
            CourseOffer {
                title: title.to_string(),
                price,
            },
        );
        self
    }

    pub fn is_enrolled(&self, course_id: Uuid, user_id: Uuid) -> bool {
        self.enrolled
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&(course_id, user_id))
    }
}

#[async_trait]
impl CourseGateway for StaticCourseGateway {
    async fn find_offer(&self, course_id: Uuid) -> Result<Option<CourseOffer>> {
        Ok(self.offers.lock().unwrap_or_else(|p| p.into_inner()).get(&course_id).cloned())
    }

    async fn enroll(&self, course_id: Uuid, user_id: Uuid, _payment_id: Uuid, _at: DateTime<Utc>) -> Result<()> {
        self.enrolled
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert((course_id, user_id));
        Ok(())
    }
}
