use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{AppError, Result};

const PRUNE_THRESHOLD: usize = 1024;

/// In-process keyed locks guarding validate-then-write sections.
///
/// Keys are always taken in sorted order so two callers wanting overlapping
/// key sets cannot deadlock. Acquisition is bounded by a timeout that
/// surfaces as the retryable `AppError::LockTimeout`.
pub struct LockManager {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
}

/// Holds every acquired key until dropped.
#[must_use = "locks are released as soon as the guard is dropped"]
pub struct LockGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub async fn acquire<I, K>(&self, keys: I) -> Result<LockGuard>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            let mutex = self.entry(&key);
            // Partial guards acquired so far are released on the error path
            let guard = tokio::time::timeout(self.timeout, mutex.lock_owned())
                .await
                .map_err(|_| {
                    tracing::warn!("Timed out waiting for lock {}", key);
                    AppError::LockTimeout
                })?;
            guards.push(guard);
        }

        Ok(LockGuard { _guards: guards })
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if locks.len() > PRUNE_THRESHOLD {
            locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        }

        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

pub fn plan_key(tutor_id: uuid::Uuid, weekday: crate::domain::Weekday) -> String {
    format!("plan:{}:{}", tutor_id, weekday.as_str())
}

pub fn tutor_key(tutor_id: uuid::Uuid) -> String {
    format!("tutor:{}", tutor_id)
}

pub fn slot_key(slot_id: uuid::Uuid) -> String {
    format!("slot:{}", slot_id)
}

pub fn payment_key(order_code: i64) -> String {
    format!("payment:{}", order_code)
}

/// Serialises checkouts by one user on one target so admission control
/// sees every earlier attempt.
pub fn checkout_key(user_id: uuid::Uuid, target_id: uuid::Uuid) -> String {
    format!("checkout:{}:{}", user_id, target_id)
}
