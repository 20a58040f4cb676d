//! Bounded scroll-and-retry around element lookups.
//!
//! This is the only place where scroll gestures and settle delays are used to
//! absorb a target that is off-screen or still animating in.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::platforms::{MobileDriver, ScrollParams};

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollRetry {
    pub scroll: ScrollParams,
    /// Total lookups, including the first one made before any scrolling
    pub max_attempts: usize,
    pub settle: Duration,
}

impl Default for ScrollRetry {
    fn default() -> Self {
        Self {
            scroll: ScrollParams::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            settle: DEFAULT_SETTLE_DELAY,
        }
    }
}

impl ScrollRetry {
    pub fn new(scroll: ScrollParams, max_attempts: usize) -> Self {
        Self {
            scroll,
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Run `lookup` until it finds something, scrolling and settling between
    /// misses. Errors that are not "not found" end the loop immediately.
    #[instrument(level = "debug", skip(self, driver, lookup), fields(direction = ?self.scroll.direction))]
    pub async fn find<F, Fut>(
        &self,
        driver: &Arc<dyn MobileDriver>,
        mut lookup: F,
    ) -> Result<UIElement, AutomationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<UIElement, AutomationError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_miss = None;

        for attempt in 1..=attempts {
            match lookup().await {
                Ok(element) => {
                    debug!(attempt, "lookup succeeded");
                    return Ok(element);
                }
                Err(e) if e.is_not_found() => {
                    debug!(attempt, attempts, "lookup missed: {e}");
                    last_miss = Some(e);
                }
                Err(e) => return Err(e),
            }

            if attempt < attempts {
                driver
                    .scroll(self.scroll.direction, self.scroll.velocity)
                    .await?;
                tokio::time::sleep(self.settle).await;
            }
        }

        Err(AutomationError::ElementNotFound(format!(
            "Not found after {attempts} attempts scrolling {:?}: {}",
            self.scroll.direction,
            last_miss.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Locate with [`find`](Self::find), then apply `action` exactly once.
    /// A failing action is reported as-is and never retried.
    pub async fn perform<F, Fut, A, AFut, T>(
        &self,
        driver: &Arc<dyn MobileDriver>,
        lookup: F,
        action: A,
    ) -> Result<T, AutomationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<UIElement, AutomationError>>,
        A: FnOnce(UIElement) -> AFut,
        AFut: Future<Output = Result<T, AutomationError>>,
    {
        let element = self.find(driver, lookup).await?;
        action(element).await
    }
}

/// Standalone form of [`ScrollRetry::find`] with the default settle delay.
pub async fn retry_with_scroll<F, Fut>(
    driver: &Arc<dyn MobileDriver>,
    lookup: F,
    scroll: ScrollParams,
    max_attempts: usize,
) -> Result<UIElement, AutomationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<UIElement, AutomationError>>,
{
    ScrollRetry::new(scroll, max_attempts)
        .find(driver, lookup)
        .await
}
