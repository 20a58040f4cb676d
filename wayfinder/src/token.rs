use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of names for newly created items.
pub trait TokenSupplier: Send + Sync {
    /// A token distinct from every other token this supplier has returned
    fn next_token(&self) -> String;
}

/// Millisecond clock tokens, bumped when the clock has not advanced
/// (or went backwards) since the previous call.
#[derive(Debug, Default)]
pub struct ClockTokens {
    last: AtomicU64,
}

impl ClockTokens {
    pub fn new() -> Self {
        Self::default()
    }

    fn now_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

impl TokenSupplier for ClockTokens {
    fn next_token(&self) -> String {
        let now = Self::now_millis();
        let mut previous = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(previous + 1);
            match self
                .last
                .compare_exchange_weak(previous, next, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return next.to_string(),
                Err(actual) => previous = actual,
            }
        }
    }
}
