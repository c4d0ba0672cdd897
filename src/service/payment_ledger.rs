use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    clock::{Clock, OrderCodeGenerator},
    config::Settings,
    domain::{
        InitiatePayment, Payment, PaymentStatus, PaymentType, RefundActor, RefundRequest,
        WebhookOutcome,
    },
    error::{AppError, Result},
    integrations::{course::CourseGateway, IntegrationEvent, IntegrationManager},
    payments::{PaymentProvider, WebhookData, WebhookPayload},
    repository::{SqlitePaymentRepository, SqlitePlanRepository, SqliteRefundRepository},
    service::{
        locks::{checkout_key, payment_key, LockManager},
        refund_workflow::RefundWorkflow,
        slot_allocator::SlotAllocator,
    },
};

const EXPIRY_BATCH: i64 = 100;
const ORDER_CODE_ATTEMPTS: usize = 5;
const CAS_ATTEMPTS: usize = 3;

/// What to do with an inbound provider status given the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WebhookStep {
    Apply(PaymentStatus),
    Duplicate,
    LateRefund,
    Reject,
}

fn classify(current: PaymentStatus, inbound: PaymentStatus) -> WebhookStep {
    use PaymentStatus::*;

    match (current, inbound) {
        (Pending, next) if current.can_transition_to(next) => WebhookStep::Apply(next),
        (current, inbound) if current == inbound => WebhookStep::Duplicate,
        (Refund, Paid) => WebhookStep::Duplicate,
        (Expired | Cancelled, Paid) => WebhookStep::LateRefund,
        (Expired | Cancelled, _) => WebhookStep::Duplicate,
        _ => WebhookStep::Reject,
    }
}

pub struct PaymentLedger {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    settings: Arc<Settings>,
    locks: Arc<LockManager>,
    slots: Arc<SlotAllocator>,
    refunds: Arc<RefundWorkflow>,
    courses: Arc<dyn CourseGateway>,
    provider: Option<Arc<dyn PaymentProvider>>,
    integrations: Arc<IntegrationManager>,
}

impl PaymentLedger {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: SqlitePool,
        clock: Arc<dyn Clock>,
        settings: Arc<Settings>,
        locks: Arc<LockManager>,
        slots: Arc<SlotAllocator>,
        refunds: Arc<RefundWorkflow>,
        courses: Arc<dyn CourseGateway>,
        provider: Option<Arc<dyn PaymentProvider>>,
        integrations: Arc<IntegrationManager>,
    ) -> Self {
        Self {
            pool,
            clock,
            settings,
            locks,
            slots,
            refunds,
            courses,
            provider,
            integrations,
        }
    }

    /// Starts a checkout: reserves slots (for bookings) and records a Pending
    /// payment in one transaction, then asks the provider for a payment link.
    pub async fn initiate(&self, request: InitiatePayment) -> Result<Payment> {
        let slot_ids = SlotAllocator::canonical_ids(&request.slot_ids);

        let mut keys = vec![checkout_key(request.user_id, request.target_id)];
        if request.payment_type == PaymentType::Booking {
            keys.extend(SlotAllocator::reservation_keys(&slot_ids));
        }
        let guard = self.locks.acquire(keys).await?;

        let now = self.clock.now();
        let expires_at = now + Duration::minutes(self.settings.booking.reservation_ttl_minutes);

        let (amount, tutor_id, description) = match request.payment_type {
            PaymentType::Booking => self.price_booking(&request, &slot_ids).await?,
            PaymentType::Course => self.price_course(&request).await?,
        };

        if amount <= 0 {
            return Err(AppError::Validation("Payment amount must be positive".to_string()));
        }

        self.check_admission(request.user_id, request.target_id, now).await?;
        let order_code = self.next_order_code(now).await?;

        let mut payment = Payment {
            id: Uuid::new_v4(),
            order_code,
            user_id: request.user_id,
            tutor_id,
            target_id: request.target_id,
            payment_type: request.payment_type,
            amount,
            status: PaymentStatus::Pending,
            reservation_id: None,
            slot_count: 0,
            checkout_url: None,
            description,
            paid_at: None,
            closed_at: None,
            expires_at,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;
        if payment.payment_type == PaymentType::Booking {
            let handle = self.slots
                .reserve(&mut tx, &slot_ids, request.user_id, now, expires_at)
                .await?;
            payment.reservation_id = Some(handle.id);
            payment.slot_count = handle.slot_ids.len() as i32;
        }
        SqlitePaymentRepository::insert(&mut tx, &payment).await?;
        tx.commit().await?;
        drop(guard);

        tracing::info!(
            "Payment {} (order {}) created for user {}: {} {}",
            payment.id,
            payment.order_code,
            payment.user_id,
            payment.payment_type.as_str(),
            payment.amount
        );

        let Some(provider) = &self.provider else {
            tracing::warn!("No payment provider configured, order {} has no checkout link", order_code);
            return Ok(payment);
        };

        match provider.create_payment_link(&payment).await {
            Ok(link) => {
                let mut conn = self.pool.acquire().await?;
                SqlitePaymentRepository::set_checkout_url(&mut conn, payment.id, &link.checkout_url, self.clock.now()).await?;
                payment.checkout_url = Some(link.checkout_url);
                Ok(payment)
            }
            Err(e) => {
                tracing::error!("Payment link for order {} failed: {}", order_code, e);
                self.abandon_checkout(&payment).await?;
                Err(e)
            }
        }
    }

    /// Processes a signed provider callback. Safe to call any number of times
    /// with the same body.
    pub async fn apply_webhook(&self, raw: &[u8]) -> Result<WebhookOutcome> {
        let payload = WebhookPayload::parse(raw)?;
        if let Err(e) = payload.verify(&self.settings.payment.checksum_key) {
            tracing::warn!("Rejected webhook with bad signature");
            return Err(e);
        }

        let data = payload.data()?;
        let inbound = payload.inbound_status()?;

        let _guard = self.locks.acquire([payment_key(data.order_code)]).await?;

        let mut payment = {
            let mut conn = self.pool.acquire().await?;
            SqlitePaymentRepository::find_by_order_code(&mut conn, data.order_code)
                .await?
                .ok_or(AppError::PaymentNotFound(data.order_code))?
        };

        for _ in 0..CAS_ATTEMPTS {
            let step = classify(payment.status, inbound);

            let applied = match step {
                WebhookStep::Apply(PaymentStatus::Paid) => {
                    self.check_amount(&payment, &data)?;
                    self.settle(&payment, data.reference.as_deref()).await?
                }
                WebhookStep::Apply(next) => self.close(&payment, next).await?,
                WebhookStep::Duplicate => {
                    tracing::debug!(
                        "Duplicate webhook for order {}: already {}",
                        payment.order_code,
                        payment.status.as_str()
                    );
                    if payment.status == PaymentStatus::Paid {
                        self.fulfil_course(&payment).await?;
                    }
                    Some(WebhookOutcome::Duplicate)
                }
                WebhookStep::LateRefund => {
                    self.check_amount(&payment, &data)?;
                    Some(self.refund_late_payment(&payment).await?)
                }
                WebhookStep::Reject => {
                    tracing::error!(
                        "Webhook for order {} asks for {} but payment is {}",
                        payment.order_code,
                        inbound.as_str(),
                        payment.status.as_str()
                    );
                    return Err(AppError::InvalidStateTransition {
                        from: payment.status.as_str().to_string(),
                        to: inbound.as_str().to_string(),
                    });
                }
            };

            if let Some(outcome) = applied {
                return Ok(outcome);
            }

            // Another writer moved the row first; re-read and classify again
            let mut conn = self.pool.acquire().await?;
            payment = SqlitePaymentRepository::find_by_id(&mut conn, payment.id)
                .await?
                .ok_or(AppError::PaymentNotFound(data.order_code))?;
        }

        Err(AppError::Conflict(format!(
            "Payment {} kept changing while applying webhook",
            payment.order_code
        )))
    }

    /// Expires every Pending payment past its deadline and frees its slots.
    pub async fn expire_stale_payments(&self) -> Result<Vec<Payment>> {
        let now = self.clock.now();
        let stale = {
            let mut conn = self.pool.acquire().await?;
            SqlitePaymentRepository::list_stale_pending(&mut conn, now, EXPIRY_BATCH).await?
        };

        let mut expired = Vec::new();
        for payment in stale {
            let _guard = self.locks.acquire([payment_key(payment.order_code)]).await?;

            match self.close(&payment, PaymentStatus::Expired).await? {
                Some(_) => {
                    let mut conn = self.pool.acquire().await?;
                    if let Some(updated) = SqlitePaymentRepository::find_by_id(&mut conn, payment.id).await? {
                        expired.push(updated);
                    }
                }
                None => {
                    tracing::debug!("Order {} settled before it could expire", payment.order_code);
                }
            }
        }

        if !expired.is_empty() {
            tracing::info!("Expired {} stale payments", expired.len());
        }

        Ok(expired)
    }

    /// Learner abandons a checkout they started.
    pub async fn cancel_pending(&self, payment_id: Uuid, user_id: Uuid) -> Result<Payment> {
        let payment = self.get_payment(payment_id).await?;
        if payment.user_id != user_id {
            return Err(AppError::Forbidden);
        }

        let _guard = self.locks.acquire([payment_key(payment.order_code)]).await?;

        if self.close(&payment, PaymentStatus::Cancelled).await?.is_none() {
            let current = self.get_payment(payment_id).await?;
            if current.status == PaymentStatus::Cancelled {
                return Ok(current);
            }
            return Err(AppError::InvalidState(format!(
                "Payment is {}, only Pending payments can be cancelled",
                current.status.as_str()
            )));
        }

        self.get_payment(payment_id).await
    }

    /// Reverses a paid booking on behalf of its tutor or learner: the slots
    /// go back on sale and a full refund is opened.
    pub async fn refund_paid_booking(
        &self,
        payment_id: Uuid,
        actor: RefundActor,
        reason: &str,
    ) -> Result<RefundRequest> {
        let payment = self.get_payment(payment_id).await?;

        if payment.payment_type != PaymentType::Booking {
            return Err(AppError::InvalidState("Only booking payments can be rejected".to_string()));
        }

        let allowed = match actor {
            RefundActor::Tutor(id) => payment.tutor_id == Some(id),
            RefundActor::Learner(id) => payment.user_id == id,
        };
        if !allowed {
            return Err(AppError::Forbidden);
        }

        let _guard = self.locks.acquire([payment_key(payment.order_code)]).await?;

        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;
        if !SqlitePaymentRepository::transition(&mut tx, payment.id, PaymentStatus::Paid, PaymentStatus::Refund, now).await? {
            let current = SqlitePaymentRepository::find_by_id(&mut tx, payment.id)
                .await?
                .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;
            return Err(AppError::InvalidState(format!(
                "Payment is {}, only Paid bookings can be rejected",
                current.status.as_str()
            )));
        }

        if let Some(reservation_id) = payment.reservation_id {
            self.slots.release(&mut tx, reservation_id, now).await?;
        }
        let refund = self.refunds.open_automatic(&mut tx, &payment, reason, now).await?;
        tx.commit().await?;

        tracing::info!("Paid booking {} reversed by {:?}", payment.order_code, actor);
        self.integrations.dispatch(IntegrationEvent::RefundOpened(refund.clone()));

        Ok(refund)
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> Result<Payment> {
        let mut conn = self.pool.acquire().await?;
        SqlitePaymentRepository::find_by_id(&mut conn, payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))
    }

    pub async fn list_payments(&self, user_id: Uuid) -> Result<Vec<Payment>> {
        let mut conn = self.pool.acquire().await?;
        SqlitePaymentRepository::list_by_user(&mut conn, user_id).await
    }

    async fn price_booking(
        &self,
        request: &InitiatePayment,
        slot_ids: &[Uuid],
    ) -> Result<(i64, Option<Uuid>, String)> {
        if slot_ids.is_empty() {
            return Err(AppError::Validation("Booking requires at least one slot".to_string()));
        }

        let mut conn = self.pool.acquire().await?;
        let plan = SqlitePlanRepository::find_by_id(&mut conn, request.target_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;

        if !plan.active {
            return Err(AppError::InvalidState("Plan is not accepting bookings".to_string()));
        }
        if plan.tutor_id == request.user_id {
            return Err(AppError::Validation("Tutors cannot book their own plan".to_string()));
        }

        let slots = self.slots.find_slots(&mut conn, slot_ids).await?;
        if slots.len() != slot_ids.len() || slots.iter().any(|slot| slot.plan_id != plan.id) {
            return Err(AppError::Validation(format!(
                "Every slot must belong to plan {}",
                plan.id
            )));
        }

        let amount = plan.slot_price() * slots.len() as i64;
        let description = format!(
            "{} {} x{}",
            plan.weekday.as_str(),
            plan.start_time.format("%H:%M"),
            slots.len()
        );

        Ok((amount, Some(plan.tutor_id), description))
    }

    async fn price_course(&self, request: &InitiatePayment) -> Result<(i64, Option<Uuid>, String)> {
        if !request.slot_ids.is_empty() {
            return Err(AppError::Validation("Course payments do not take slots".to_string()));
        }

        let offer = self.courses
            .find_offer(request.target_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

        Ok((offer.price, None, offer.title))
    }

    async fn check_admission(&self, user_id: Uuid, target_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let admission = &self.settings.admission;
        let since = now - Duration::minutes(admission.window_minutes);

        let mut conn = self.pool.acquire().await?;
        let abandoned = SqlitePaymentRepository::count_abandoned(&mut conn, user_id, target_id, since).await?;

        if abandoned > admission.cancellation_threshold {
            tracing::warn!(
                "User {} blocked from checkout on {}: {} abandoned payments in {} minutes",
                user_id,
                target_id,
                abandoned,
                admission.window_minutes
            );
            return Err(AppError::TooManyCancellations);
        }

        Ok(())
    }

    async fn next_order_code(&self, now: DateTime<Utc>) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;

        for _ in 0..ORDER_CODE_ATTEMPTS {
            let code = OrderCodeGenerator::next(now);
            if !SqlitePaymentRepository::order_code_exists(&mut conn, code).await? {
                return Ok(code);
            }
        }

        Err(AppError::Internal("Could not allocate a unique order code".to_string()))
    }

    fn check_amount(&self, payment: &Payment, data: &WebhookData) -> Result<()> {
        if data.amount != payment.amount {
            tracing::error!(
                "Order {} paid {} but {} was due",
                payment.order_code,
                data.amount,
                payment.amount
            );
            return Err(AppError::BadRequest(format!(
                "Amount {} does not match order {}",
                data.amount, payment.order_code
            )));
        }
        Ok(())
    }

    /// Pending -> Paid. Returns `None` when the compare-and-set lost.
    async fn settle(&self, payment: &Payment, reference: Option<&str>) -> Result<Option<WebhookOutcome>> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        if !SqlitePaymentRepository::transition(&mut tx, payment.id, PaymentStatus::Pending, PaymentStatus::Paid, now).await? {
            return Ok(None);
        }

        let mut paid = payment.clone();
        paid.status = PaymentStatus::Paid;
        paid.paid_at = Some(now);
        paid.updated_at = now;

        if let Some(reservation_id) = payment.reservation_id {
            let held = self.slots.confirm(&mut tx, reservation_id, now).await?;

            if (held as i32) < payment.slot_count {
                // A lapsed lock let someone else take part of the booking
                tracing::warn!(
                    "Order {} paid but only {} of {} slots were still held",
                    payment.order_code,
                    held,
                    payment.slot_count
                );
                SqlitePaymentRepository::transition(&mut tx, payment.id, PaymentStatus::Paid, PaymentStatus::Refund, now).await?;
                self.slots.release(&mut tx, reservation_id, now).await?;
                let refund = self.refunds
                    .open_automatic(&mut tx, &paid, "Reserved slots were released before payment arrived", now)
                    .await?;
                tx.commit().await?;

                self.integrations.dispatch(IntegrationEvent::RefundOpened(refund));
                return Ok(Some(WebhookOutcome::LatePaymentRefunded));
            }
        }

        tx.commit().await?;

        tracing::info!(
            "Order {} paid (reference {})",
            payment.order_code,
            reference.unwrap_or("-")
        );

        self.fulfil_course(&paid).await?;
        self.integrations.dispatch(IntegrationEvent::PaymentPaid(paid));

        Ok(Some(WebhookOutcome::Applied(PaymentStatus::Paid)))
    }

    /// Pending -> Cancelled | Failed | Expired and the reservation released.
    /// Returns `None` when the compare-and-set lost.
    async fn close(&self, payment: &Payment, next: PaymentStatus) -> Result<Option<WebhookOutcome>> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        if !SqlitePaymentRepository::transition(&mut tx, payment.id, PaymentStatus::Pending, next, now).await? {
            return Ok(None);
        }

        if let Some(reservation_id) = payment.reservation_id {
            self.slots.release(&mut tx, reservation_id, now).await?;
        }
        tx.commit().await?;

        tracing::info!("Order {} closed as {}", payment.order_code, next.as_str());

        let mut closed = payment.clone();
        closed.status = next;
        closed.closed_at = Some(now);
        closed.updated_at = now;
        self.integrations.dispatch(IntegrationEvent::PaymentClosed(closed));

        Ok(Some(WebhookOutcome::Applied(next)))
    }

    /// Money arrived for a payment that had already expired or been
    /// cancelled. The status stays put; a refund is opened once per payment,
    /// even after that refund has been decided.
    async fn refund_late_payment(&self, payment: &Payment) -> Result<WebhookOutcome> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;
        SqlitePaymentRepository::touch(&mut tx, payment.id, now).await?;

        if let Some(existing) = SqliteRefundRepository::find_latest_for_payment(&mut tx, payment.id).await? {
            tx.rollback().await?;
            tracing::debug!(
                "Late payment for order {} already has refund {} ({})",
                payment.order_code,
                existing.id,
                existing.status.as_str()
            );
            return Ok(WebhookOutcome::Duplicate);
        }

        let refund = self.refunds
            .open_automatic(&mut tx, payment, "Payment received after the order closed", now)
            .await?;
        tx.commit().await?;

        tracing::warn!(
            "Late payment for {} order {}, refund {} opened",
            payment.status.as_str(),
            payment.order_code,
            refund.id
        );
        self.integrations.dispatch(IntegrationEvent::RefundOpened(refund));

        Ok(WebhookOutcome::LatePaymentRefunded)
    }

    async fn fulfil_course(&self, payment: &Payment) -> Result<()> {
        if payment.payment_type != PaymentType::Course {
            return Ok(());
        }

        let at = payment.paid_at.unwrap_or_else(|| self.clock.now());
        self.courses
            .enroll(payment.target_id, payment.user_id, payment.id, at)
            .await
            .map_err(|e| {
                tracing::error!("Enrolment for order {} failed: {}", payment.order_code, e);
                AppError::Integration(format!("Enrolment failed: {}", e))
            })
    }

    /// Provider could not issue a link: fail the payment and free its slots.
    async fn abandon_checkout(&self, payment: &Payment) -> Result<()> {
        let _guard = self.locks.acquire([payment_key(payment.order_code)]).await?;
        self.close(payment, PaymentStatus::Failed).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PaymentStatus::*;

    #[test]
    fn test_pending_accepts_every_provider_status() {
        for inbound in [Paid, Cancelled, Failed, Expired] {
            assert_eq!(classify(Pending, inbound), WebhookStep::Apply(inbound));
        }
    }

    #[test]
    fn test_repeated_terminal_status_is_duplicate() {
        for status in [Paid, Cancelled, Failed, Expired] {
            assert_eq!(classify(status, status), WebhookStep::Duplicate);
        }
        assert_eq!(classify(Refund, Paid), WebhookStep::Duplicate);
        assert_eq!(classify(Expired, Cancelled), WebhookStep::Duplicate);
        assert_eq!(classify(Cancelled, Failed), WebhookStep::Duplicate);
    }

    #[test]
    fn test_paid_after_close_opens_refund() {
        assert_eq!(classify(Expired, Paid), WebhookStep::LateRefund);
        assert_eq!(classify(Cancelled, Paid), WebhookStep::LateRefund);
    }

    #[test]
    fn test_contradicting_status_is_rejected() {
        assert_eq!(classify(Paid, Cancelled), WebhookStep::Reject);
        assert_eq!(classify(Paid, Failed), WebhookStep::Reject);
        assert_eq!(classify(Failed, Paid), WebhookStep::Reject);
        assert_eq!(classify(Refund, Failed), WebhookStep::Reject);
    }
}
