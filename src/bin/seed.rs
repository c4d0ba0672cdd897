use std::{sync::Arc, time::Duration as StdDuration};

use chrono::{Duration, NaiveTime};
use clap::Parser;
use fake::{faker::company::en::CatchPhrase, Fake};
use sqlx::sqlite::SqlitePoolOptions;
use tutorhub::{
    auth::{Claims, JwtVerifier, Role},
    clock::SystemClock,
    config::BookingConfig,
    domain::{CreatePlanRequest, Weekday},
    error::AppError,
    service::{locks::LockManager, plan_registry::PlanRegistry},
};
use uuid::Uuid;

/// Fills a database with demo tutors, weekly plans and courses.
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://tutorhub.db?mode=rwc")]
    database_url: String,

    #[arg(long, default_value_t = 3)]
    tutors: usize,

    #[arg(long, default_value_t = 2)]
    courses_per_tutor: usize,

    /// Print bearer tokens for the seeded users, signed with this secret.
    #[arg(long, env = "TUTORHUB__AUTH__JWT_SECRET")]
    jwt_secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    println!("🌱 Starting database seeding...");

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&args.database_url)
        .await?;

    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    let registry = PlanRegistry::new(
        db_pool.clone(),
        Arc::new(SystemClock),
        Arc::new(LockManager::new(StdDuration::from_secs(5))),
        &BookingConfig::default(),
    );

    println!("🧑‍🏫 Creating tutors and plans...");
    let mut tutor_ids = Vec::with_capacity(args.tutors);

    for _ in 0..args.tutors {
        let tutor_id = Uuid::new_v4();
        tutor_ids.push(tutor_id);

        let days: usize = (2..=4).fake();
        for weekday in Weekday::ALL.into_iter().take(days) {
            let start_hour: u32 = (8..16).fake();
            let hours: u32 = (1..4).fake();
            let duration = [30, 45, 60][(0..3).fake::<usize>()];

            let request = CreatePlanRequest {
                weekday,
                start_time: hour(start_hour),
                end_time: hour(start_hour + hours),
                slot_duration_minutes: duration,
                price_per_hour: (100..500).fake::<i64>() * 1000,
                meeting_url: format!("https://meet.example.com/{}", Uuid::new_v4().simple()),
            };

            match registry.create_plan(tutor_id, request).await {
                Ok(plan) => println!(
                    "  ✅ {} {} {}-{}",
                    tutor_id,
                    plan.weekday.as_str(),
                    plan.start_time,
                    plan.end_time
                ),
                Err(AppError::OverlapConflict { .. }) | Err(AppError::WeeklyDayLimitExceeded { .. }) => {
                    println!("  ⏭️  Skipped conflicting window for {}", tutor_id);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    println!("📚 Creating courses...");
    for tutor_id in &tutor_ids {
        for _ in 0..args.courses_per_tutor {
            let title: String = CatchPhrase().fake();
            let price = (200..2000).fake::<i64>() * 1000;

            sqlx::query("INSERT INTO courses (id, tutor_id, title, price) VALUES (?, ?, ?, ?)")
                .bind(Uuid::new_v4().to_string())
                .bind(tutor_id.to_string())
                .bind(&title)
                .bind(price)
                .execute(&db_pool)
                .await?;

            println!("  ✅ {} ({})", title, price);
        }
    }

    if let Some(secret) = args.jwt_secret {
        let verifier = JwtVerifier::new(&secret);
        let ttl = Duration::days(7);

        println!("🔑 Bearer tokens (valid 7 days):");
        for tutor_id in &tutor_ids {
            let token = verifier.issue(&Claims::new(*tutor_id, vec![Role::Tutor], ttl))?;
            println!("  tutor   {}: {}", tutor_id, token);
        }

        let learner = Uuid::new_v4();
        let token = verifier.issue(&Claims::new(learner, vec![Role::Learner], ttl))?;
        println!("  learner {}: {}", learner, token);

        let admin = Uuid::new_v4();
        let token = verifier.issue(&Claims::new(admin, vec![Role::Admin], ttl))?;
        println!("  admin   {}: {}", admin, token);
    }

    println!("✨ Seeding complete!");
    Ok(())
}

fn hour(h: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h.min(23), 0, 0).unwrap_or(NaiveTime::MIN)
}
