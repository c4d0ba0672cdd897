mod common;

use common::*;
use tutorhub::{
    domain::{BankInfo, Payment, RefundActor, RefundDecision, RefundStatus},
    error::AppError,
};
use uuid::Uuid;

fn bank_info() -> BankInfo {
    BankInfo {
        bank_name: "Vietcombank".to_string(),
        account_owner: "NGUYEN VAN A".to_string(),
        account_number: "0123456789".to_string(),
    }
}

async fn paid_booking(app: &TestApp, tutor: Uuid, learner: Uuid) -> anyhow::Result<Payment> {
    let (plan, slots) = app.monday_plan(tutor).await?;
    let payment = app.book(learner, plan.id, &[slots[0].id, slots[1].id]).await?;
    app.ctx.payment_ledger.apply_webhook(&paid_webhook(&payment)).await?;
    Ok(app.payment(payment.id).await)
}

#[tokio::test]
async fn test_refund_runs_pending_submitted_approved() -> anyhow::Result<()> {
    let app = setup().await?;
    let tutor = Uuid::new_v4();
    let learner = Uuid::new_v4();
    let payment = paid_booking(&app, tutor, learner).await?;

    let refund = app.ctx.payment_ledger
        .refund_paid_booking(payment.id, RefundActor::Tutor(tutor), "Tutor is ill")
        .await?;
    assert_eq!(refund.reason, "Tutor is ill");
    assert!(refund.bank_name.is_none());

    let workflow = &app.ctx.refund_workflow;

    // Nothing to decide until bank details arrive
    let early = workflow
        .decide(refund.id, RefundDecision { approve: true, admin_note: None })
        .await;
    assert!(matches!(early, Err(AppError::InvalidState(_))));

    let submitted = workflow.submit_bank_info(refund.id, learner, bank_info()).await?;
    assert_eq!(submitted.status, RefundStatus::Submitted);
    assert_eq!(submitted.account_number.as_deref(), Some("0123456789"));

    // Details are frozen once submitted
    let again = workflow.submit_bank_info(refund.id, learner, bank_info()).await;
    assert!(matches!(again, Err(AppError::InvalidState(_))));

    assert_eq!(workflow.list_by_status(RefundStatus::Submitted).await?.len(), 1);

    let approved = workflow
        .decide(
            refund.id,
            RefundDecision {
                approve: true,
                admin_note: Some("Transferred".to_string()),
            },
        )
        .await?;
    assert_eq!(approved.status, RefundStatus::Approved);
    assert_eq!(approved.admin_note.as_deref(), Some("Transferred"));

    // Decisions are final
    let flip = workflow
        .decide(refund.id, RefundDecision { approve: false, admin_note: None })
        .await;
    assert!(matches!(flip, Err(AppError::InvalidState(_))));
    assert!(workflow.list_by_status(RefundStatus::Submitted).await?.is_empty());

    app.wait_for_event("refund.updated", 2).await;
    assert_eq!(app.recorder.count("refund.updated"), 2);
    Ok(())
}

#[tokio::test]
async fn test_admin_can_reject_refund() -> anyhow::Result<()> {
    let app = setup().await?;
    let tutor = Uuid::new_v4();
    let learner = Uuid::new_v4();
    let payment = paid_booking(&app, tutor, learner).await?;

    let refund = app.ctx.payment_ledger
        .refund_paid_booking(payment.id, RefundActor::Tutor(tutor), "No show")
        .await?;
    app.ctx.refund_workflow.submit_bank_info(refund.id, learner, bank_info()).await?;

    let rejected = app.ctx.refund_workflow
        .decide(
            refund.id,
            RefundDecision {
                approve: false,
                admin_note: Some("Lesson took place".to_string()),
            },
        )
        .await?;
    assert_eq!(rejected.status, RefundStatus::Rejected);
    Ok(())
}

#[tokio::test]
async fn test_bank_info_only_from_refund_owner() -> anyhow::Result<()> {
    let app = setup().await?;
    let tutor = Uuid::new_v4();
    let learner = Uuid::new_v4();
    let payment = paid_booking(&app, tutor, learner).await?;
    let refund = app.ctx.payment_ledger
        .refund_paid_booking(payment.id, RefundActor::Tutor(tutor), "Cancelled")
        .await?;
    let workflow = &app.ctx.refund_workflow;

    assert!(matches!(
        workflow.submit_bank_info(refund.id, tutor, bank_info()).await,
        Err(AppError::Forbidden)
    ));

    let mut short = bank_info();
    short.account_number = "12".to_string();
    assert!(matches!(
        workflow.submit_bank_info(refund.id, learner, short).await,
        Err(AppError::Validation(_))
    ));

    assert!(matches!(
        workflow.submit_bank_info(Uuid::new_v4(), learner, bank_info()).await,
        Err(AppError::NotFound(_))
    ));

    assert_eq!(workflow.get(refund.id).await?.status, RefundStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn test_learner_can_cancel_paid_booking() -> anyhow::Result<()> {
    let app = setup().await?;
    let tutor = Uuid::new_v4();
    let learner = Uuid::new_v4();
    let payment = paid_booking(&app, tutor, learner).await?;
    let ledger = &app.ctx.payment_ledger;

    assert!(matches!(
        ledger
            .refund_paid_booking(payment.id, RefundActor::Learner(Uuid::new_v4()), "Not mine")
            .await,
        Err(AppError::Forbidden)
    ));
    assert!(matches!(
        ledger
            .refund_paid_booking(payment.id, RefundActor::Tutor(Uuid::new_v4()), "Not mine")
            .await,
        Err(AppError::Forbidden)
    ));

    let refund = ledger
        .refund_paid_booking(payment.id, RefundActor::Learner(learner), "Schedule changed")
        .await?;
    assert_eq!(refund.user_id, learner);

    // A second reversal finds the payment already refunded
    let twice = ledger
        .refund_paid_booking(payment.id, RefundActor::Tutor(tutor), "Again")
        .await;
    assert!(matches!(twice, Err(AppError::InvalidState(_))));

    assert_eq!(app.ctx.refund_workflow.list_for_user(learner).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_only_paid_bookings_can_be_reversed() -> anyhow::Result<()> {
    let app = setup().await?;
    let tutor = Uuid::new_v4();
    let learner = Uuid::new_v4();
    let (plan, slots) = app.monday_plan(tutor).await?;

    let pending = app.book(learner, plan.id, &[slots[0].id]).await?;
    let result = app.ctx.payment_ledger
        .refund_paid_booking(pending.id, RefundActor::Tutor(tutor), "Too early")
        .await;
    assert!(matches!(result, Err(AppError::InvalidState(_))));
    assert!(app.ctx.refund_workflow.list_for_user(learner).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_course_payments_cannot_be_rejected() -> anyhow::Result<()> {
    let course = Uuid::new_v4();
    let app = setup_with(
        test_settings(),
        tutorhub::testing::StaticCourseGateway::new().with_course(course, "Physics", 300_000),
    )
    .await?;
    let learner = Uuid::new_v4();

    let payment = app.ctx.payment_ledger
        .initiate(tutorhub::domain::InitiatePayment {
            user_id: learner,
            target_id: course,
            payment_type: tutorhub::domain::PaymentType::Course,
            slot_ids: vec![],
        })
        .await?;
    app.ctx.payment_ledger.apply_webhook(&paid_webhook(&payment)).await?;

    let result = app.ctx.payment_ledger
        .refund_paid_booking(payment.id, RefundActor::Learner(learner), "Changed mind")
        .await;
    assert!(matches!(result, Err(AppError::InvalidState(_))));
    Ok(())
}
