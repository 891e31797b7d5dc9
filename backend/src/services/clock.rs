//! Time and identifier sources
//!
//! Services never read the system clock or a random source directly, so
//! tests can pin both.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use shared::{generate_request_id, generate_set_id, random_suffix, RecordIds};
use uuid::Uuid;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

pub trait IdGenerator: Send + Sync {
    fn request_ids(&self, at: DateTime<Utc>) -> RecordIds;

    fn set_id(&self, at: DateTime<Utc>) -> String;
}

/// Random v4 UUIDs and random id suffixes
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn request_ids(&self, at: DateTime<Utc>) -> RecordIds {
        RecordIds {
            id: Uuid::new_v4(),
            request_id: generate_request_id(at, &random_suffix(Uuid::new_v4())),
        }
    }

    fn set_id(&self, at: DateTime<Utc>) -> String {
        generate_set_id(at, &random_suffix(Uuid::new_v4()))
    }
}

/// Deterministic ids from a counter
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl IdGenerator for SequentialIds {
    fn request_ids(&self, at: DateTime<Utc>) -> RecordIds {
        let n = self.bump();
        RecordIds {
            id: Uuid::from_u128(u128::from(n)),
            request_id: generate_request_id(at, &format!("{:06X}", n)),
        }
    }

    fn set_id(&self, at: DateTime<Utc>) -> String {
        generate_set_id(at, &format!("{:06X}", self.bump()))
    }
}
