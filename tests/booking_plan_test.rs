mod common;

use std::collections::HashSet;

use common::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tutorhub::{
    domain::{SlotState, UpdatePlanRequest, Weekday},
    error::AppError,
};
use uuid::Uuid;

#[tokio::test]
async fn test_create_plan_materialises_slots() -> anyhow::Result<()> {
    let app = setup().await?;
    let tutor = Uuid::new_v4();

    let (plan, slots) = app.monday_plan(tutor).await?;

    assert!(plan.active);
    assert_eq!(plan.tutor_id, tutor);
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0].slot_index, 0);
    assert_eq!((slots[0].start_time, slots[0].end_time), (t(9, 0), t(9, 30)));
    assert_eq!((slots[1].start_time, slots[1].end_time), (t(9, 30), t(10, 0)));
    assert!(slots.iter().all(|slot| slot.state == SlotState::Open));

    Ok(())
}

#[tokio::test]
async fn test_overlapping_window_is_rejected_with_conflict_details() -> anyhow::Result<()> {
    let app = setup().await?;
    let tutor = Uuid::new_v4();
    let registry = &app.ctx.plan_registry;

    let (existing, _) = app.monday_plan(tutor).await?;

    let result = registry
        .create_plan(tutor, plan_request(Weekday::Monday, t(9, 30), t(11, 0), 30))
        .await;

    match result {
        Err(AppError::OverlapConflict { plan_id, weekday, start, end }) => {
            assert_eq!(plan_id, existing.id);
            assert_eq!(weekday, "Monday");
            assert_eq!(start, "09:00");
            assert_eq!(end, "10:00");
        }
        other => panic!("expected overlap conflict, got {:?}", other),
    }

    // Touching windows are fine, as is the same window on another day
    registry
        .create_plan(tutor, plan_request(Weekday::Monday, t(10, 0), t(11, 0), 30))
        .await?;
    registry
        .create_plan(tutor, plan_request(Weekday::Tuesday, t(9, 0), t(10, 0), 30))
        .await?;

    // Other tutors are unaffected
    registry
        .create_plan(Uuid::new_v4(), plan_request(Weekday::Monday, t(9, 0), t(10, 0), 30))
        .await?;

    Ok(())
}

#[tokio::test]
async fn test_weekly_day_cap() -> anyhow::Result<()> {
    let app = setup().await?;
    let tutor = Uuid::new_v4();
    let registry = &app.ctx.plan_registry;

    let mut plans = Vec::new();
    for day in [Weekday::Monday, Weekday::Tuesday, Weekday::Wednesday, Weekday::Thursday] {
        plans.push(registry.create_plan(tutor, plan_request(day, t(9, 0), t(10, 0), 30)).await?);
    }

    let fifth = registry
        .create_plan(tutor, plan_request(Weekday::Friday, t(9, 0), t(10, 0), 30))
        .await;
    assert!(matches!(fifth, Err(AppError::WeeklyDayLimitExceeded { max: 4 })));

    // A second window on an existing day does not add a day
    registry
        .create_plan(tutor, plan_request(Weekday::Monday, t(14, 0), t(15, 0), 30))
        .await?;

    // Inactive plans do not count toward the cap
    registry.deactivate_plan(plans[3].id, tutor).await?;
    registry
        .create_plan(tutor, plan_request(Weekday::Friday, t(9, 0), t(10, 0), 30))
        .await?;

    Ok(())
}

#[tokio::test]
async fn test_invalid_windows_are_rejected() -> anyhow::Result<()> {
    let app = setup().await?;
    let tutor = Uuid::new_v4();
    let registry = &app.ctx.plan_registry;

    let backwards = registry
        .create_plan(tutor, plan_request(Weekday::Monday, t(10, 0), t(9, 0), 30))
        .await;
    assert!(matches!(backwards, Err(AppError::Validation(_))));

    let too_short = registry
        .create_plan(tutor, plan_request(Weekday::Monday, t(9, 0), t(9, 20), 30))
        .await;
    assert!(matches!(too_short, Err(AppError::Validation(_))));

    let mut bad_price = plan_request(Weekday::Monday, t(9, 0), t(10, 0), 30);
    bad_price.price_per_hour = 0;
    assert!(matches!(registry.create_plan(tutor, bad_price).await, Err(AppError::Validation(_))));

    let mut bad_url = plan_request(Weekday::Monday, t(9, 0), t(10, 0), 30);
    bad_url.meeting_url = "not a url".to_string();
    assert!(matches!(registry.create_plan(tutor, bad_url).await, Err(AppError::Validation(_))));

    assert!(registry.list_plans(tutor, true).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_random_windows_never_produce_overlaps_or_exceed_cap() -> anyhow::Result<()> {
    let app = setup().await?;
    let registry = &app.ctx.plan_registry;
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let tutors: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

    for _ in 0..150 {
        let tutor = tutors[rng.gen_range(0..tutors.len())];
        let weekday = Weekday::ALL[rng.gen_range(0..7)];
        let start_minutes = rng.gen_range(6 * 60..20 * 60) / 15 * 15;
        let length = rng.gen_range(1..=12) * 15;
        let start = t(start_minutes / 60, start_minutes % 60);
        let end = t((start_minutes + length) / 60, (start_minutes + length) % 60);

        match registry.create_plan(tutor, plan_request(weekday, start, end, 15)).await {
            Ok(_)
            | Err(AppError::OverlapConflict { .. })
            | Err(AppError::WeeklyDayLimitExceeded { .. }) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }

        // Occasionally retire a plan so the cap gets exercised both ways
        if rng.gen_bool(0.1) {
            let active = registry.list_plans(tutor, false).await?;
            if !active.is_empty() {
                let victim = &active[rng.gen_range(0..active.len())];
                registry.deactivate_plan(victim.id, tutor).await?;
            }
        }
    }

    for tutor in tutors {
        let active = registry.list_plans(tutor, false).await?;

        let days: HashSet<Weekday> = active.iter().map(|plan| plan.weekday).collect();
        assert!(days.len() <= 4, "tutor has {} active days", days.len());

        for (i, a) in active.iter().enumerate() {
            for b in &active[i + 1..] {
                if a.weekday == b.weekday {
                    assert!(
                        !a.overlaps(b.start_time, b.end_time),
                        "{:?} {}-{} overlaps {}-{}",
                        a.weekday,
                        a.start_time,
                        a.end_time,
                        b.start_time,
                        b.end_time
                    );
                }
            }
        }
    }

    Ok(())
}

#[tokio::test]
async fn test_deactivate_removes_open_slots_and_is_idempotent() -> anyhow::Result<()> {
    let app = setup().await?;
    let tutor = Uuid::new_v4();
    let (plan, _) = app.monday_plan(tutor).await?;

    let first = app.ctx.plan_registry.deactivate_plan(plan.id, tutor).await?;
    assert!(!first.active);
    assert!(app.slots(plan.id).await.is_empty());

    let second = app.ctx.plan_registry.deactivate_plan(plan.id, tutor).await?;
    assert!(!second.active);

    assert!(app.ctx.plan_registry.list_plans(tutor, false).await?.is_empty());
    assert_eq!(app.ctx.plan_registry.list_plans(tutor, true).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_deactivate_with_booked_slot_is_rejected() -> anyhow::Result<()> {
    let app = setup().await?;
    let tutor = Uuid::new_v4();
    let learner = Uuid::new_v4();
    let (plan, slots) = app.monday_plan(tutor).await?;

    let payment = app.book(learner, plan.id, &[slots[0].id]).await?;
    app.ctx.payment_ledger.apply_webhook(&paid_webhook(&payment)).await?;

    let result = app.ctx.plan_registry.deactivate_plan(plan.id, tutor).await;
    assert!(matches!(result, Err(AppError::PlanHasBookedSlots)));
    assert!(app.ctx.plan_registry.get_plan(plan.id).await?.active);

    Ok(())
}

#[tokio::test]
async fn test_only_owner_can_change_plan() -> anyhow::Result<()> {
    let app = setup().await?;
    let tutor = Uuid::new_v4();
    let (plan, _) = app.monday_plan(tutor).await?;
    let stranger = Uuid::new_v4();

    assert!(matches!(
        app.ctx.plan_registry.deactivate_plan(plan.id, stranger).await,
        Err(AppError::Forbidden)
    ));
    assert!(matches!(
        app.ctx.plan_registry.update_plan(plan.id, stranger, UpdatePlanRequest::default()).await,
        Err(AppError::Forbidden)
    ));
    assert!(matches!(
        app.ctx.plan_registry.get_plan(Uuid::new_v4()).await,
        Err(AppError::NotFound(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_update_plan_rebuilds_slots() -> anyhow::Result<()> {
    let app = setup().await?;
    let tutor = Uuid::new_v4();
    let (plan, _) = app.monday_plan(tutor).await?;
    let registry = &app.ctx.plan_registry;

    let updated = registry
        .update_plan(
            plan.id,
            tutor,
            UpdatePlanRequest {
                end_time: Some(t(11, 0)),
                slot_duration_minutes: Some(60),
                price_per_hour: Some(300_000),
                ..Default::default()
            },
        )
        .await?;

    assert_eq!(updated.end_time, t(11, 0));
    assert_eq!(updated.price_per_hour, 300_000);

    let slots = app.slots(plan.id).await;
    assert_eq!(slots.len(), 2);
    assert_eq!((slots[1].start_time, slots[1].end_time), (t(10, 0), t(11, 0)));

    // Growing into a neighbouring window is an overlap
    registry
        .create_plan(tutor, plan_request(Weekday::Monday, t(12, 0), t(13, 0), 30))
        .await?;
    let grow = registry
        .update_plan(
            plan.id,
            tutor,
            UpdatePlanRequest {
                end_time: Some(t(12, 30)),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(grow, Err(AppError::OverlapConflict { .. })));

    Ok(())
}

#[tokio::test]
async fn test_update_plan_refused_while_slot_reserved() -> anyhow::Result<()> {
    let app = setup().await?;
    let tutor = Uuid::new_v4();
    let (plan, slots) = app.monday_plan(tutor).await?;

    app.book(Uuid::new_v4(), plan.id, &[slots[1].id]).await?;

    let result = app.ctx.plan_registry
        .update_plan(
            plan.id,
            tutor,
            UpdatePlanRequest {
                price_per_hour: Some(1_000),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::PlanHasBookedSlots)));

    Ok(())
}
