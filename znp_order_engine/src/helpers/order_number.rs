use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};

/// Hands out `ORD-<nanoseconds>` order numbers and `PI-<nanoseconds>` payment intent ids.
///
/// The nanosecond stamp comes from the supplied timestamp, but is forced to be strictly increasing across every clone
/// of the generator, so two orders created in the same nanosecond (or with a clock that stands still) never collide.
/// Numbers from separate processes may still collide. The unique index on `orders.number` catches that case.
#[derive(Debug, Clone, Default)]
pub struct OrderNumberGenerator {
    last: Arc<AtomicI64>,
}

impl OrderNumberGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_stamp(&self, now: DateTime<Utc>) -> i64 {
        let wanted = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000));
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let next = wanted.max(last + 1);
            match self.last.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    pub fn order_number(&self, now: DateTime<Utc>) -> String {
        format!("ORD-{}", self.next_stamp(now))
    }

    pub fn payment_intent_id(&self, now: DateTime<Utc>) -> String {
        format!("PI-{}", self.next_stamp(now))
    }
}
