//! Identifier and timestamp assignment shared by store implementations.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::Utc;

/// Hex digits kept from the blake3 digest.
const ID_HEX_LEN: usize = 12;

/// Generates opaque, collision-resistant record ids.
///
/// Ids are the first 12 hex digits of a blake3 digest over the entity id,
/// the creation timestamp, a per-generator sequence and a random nonce.
#[derive(Debug, Default)]
pub struct IdGenerator {
    seq: AtomicU64,
}

impl IdGenerator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
        }
    }

    /// Produce an id of the form `<prefix>-<hex>`.
    pub fn next(&self, prefix: &str, entity_id: &str, timestamp_us: i64) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let nonce: u64 = rand::random();

        let mut hasher = blake3::Hasher::new();
        hasher.update(entity_id.as_bytes());
        hasher.update(&timestamp_us.to_le_bytes());
        hasher.update(&seq.to_le_bytes());
        hasher.update(&nonce.to_le_bytes());
        let hex = hasher.finalize().to_hex();

        format!("{prefix}-{}", &hex[..ID_HEX_LEN])
    }
}

/// Wall clock in microseconds that never returns the same value twice.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_us: AtomicI64,
}

impl MonotonicClock {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_us: AtomicI64::new(0),
        }
    }

    /// Current time, bumped past both the last issued value and `floor_us`.
    pub fn now_after(&self, floor_us: i64) -> i64 {
        let wall = Utc::now().timestamp_micros();
        let next = |last: i64| wall.max(last + 1).max(floor_us + 1);
        match self
            .last_us
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(next(last)))
        {
            Ok(prev) | Err(prev) => next(prev),
        }
    }

    pub fn now(&self) -> i64 {
        self.now_after(i64::MIN + 1)
    }
}
