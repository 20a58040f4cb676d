use tracing::{debug, instrument};

use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::platforms::MobileDriver;
use crate::selector::Selector;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

// Default timeout if none is specified on the locator itself
const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Finds one displayed element for a single selector, polling until a timeout.
#[derive(Clone)]
pub struct Locator {
    driver: Arc<dyn MobileDriver>,
    selector: Selector,
    timeout: Duration, // Default timeout for this locator instance
    poll_interval: Duration,
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locator")
            .field("selector", &self.selector)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Locator {
    /// Create a new locator with the given selector
    pub fn new(driver: Arc<dyn MobileDriver>, selector: impl Into<Selector>) -> Self {
        Self {
            driver,
            selector: selector.into(),
            timeout: DEFAULT_LOCATOR_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set a default timeout for waiting operations on this locator instance.
    /// This timeout is used if no specific timeout is passed to `wait`.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// All elements currently matching the selector, without waiting.
    pub async fn all(&self) -> Result<Vec<UIElement>, AutomationError> {
        self.driver.find_elements(&self.selector).await
    }

    /// Wait for a displayed element matching the locator, up to the specified
    /// timeout. If no timeout is provided, uses the locator's default timeout.
    ///
    /// Returns `Timeout` when nothing displayed shows up in time. Errors other
    /// than "not found" from the driver are returned immediately.
    #[instrument(level = "debug", skip(self, timeout), fields(selector = %self.selector))]
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<UIElement, AutomationError> {
        if let Selector::Invalid(reason) = &self.selector {
            return Err(AutomationError::InvalidSelector(reason.clone()));
        }
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let deadline = Instant::now() + effective_timeout;

        loop {
            if let Some(element) = self.first_displayed().await? {
                return Ok(element);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(AutomationError::Timeout(format!(
                    "Timed out after {effective_timeout:?} waiting for element {}",
                    self.selector_string()
                )));
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn first_displayed(&self) -> Result<Option<UIElement>, AutomationError> {
        let candidates = match self.driver.find_elements(&self.selector).await {
            Ok(found) => found,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        for candidate in candidates {
            match candidate.is_displayed().await {
                Ok(true) => return Ok(Some(candidate)),
                Ok(false) => continue,
                // the element vanished between the query and the check
                Err(AutomationError::ElementDetached(_)) => continue,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn selector_string(&self) -> String {
        format!("{:?}", self.selector)
    }
}

/// One lookup predicate with its own time budget
#[derive(Debug, Clone, PartialEq)]
pub struct LocatorStrategy {
    pub selector: Selector,
    pub timeout: Duration,
}

impl LocatorStrategy {
    pub fn new(selector: impl Into<Selector>, timeout: Duration) -> Self {
        Self {
            selector: selector.into(),
            timeout,
        }
    }
}

/// Ordered strategies for one semantic target, most reliable first.
///
/// Evaluation only queries the driver, so a chain can be re-run freely.
#[derive(Debug, Clone)]
pub struct StrategyChain {
    target: String,
    strategies: Vec<LocatorStrategy>,
    poll_interval: Duration,
}

impl StrategyChain {
    pub fn new(target: impl Into<String>, strategies: Vec<LocatorStrategy>) -> Self {
        Self {
            target: target.into(),
            strategies,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Build a chain where every selector shares the same timeout
    pub fn from_selectors<I, S>(target: impl Into<String>, selectors: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Selector>,
    {
        let strategies = selectors
            .into_iter()
            .map(|s| LocatorStrategy::new(s, timeout))
            .collect();
        Self::new(target, strategies)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn strategies(&self) -> &[LocatorStrategy] {
        &self.strategies
    }

    /// Try each strategy in order and return the first displayed match.
    #[instrument(level = "debug", skip(self, driver), fields(target = %self.target))]
    pub async fn locate(&self, driver: &Arc<dyn MobileDriver>) -> Result<UIElement, AutomationError> {
        for (index, strategy) in self.strategies.iter().enumerate() {
            let locator = Locator::new(driver.clone(), strategy.selector.clone())
                .set_poll_interval(self.poll_interval);
            match locator.wait(Some(strategy.timeout)).await {
                Ok(element) => {
                    debug!(strategy = index, selector = %strategy.selector, "resolved {}", self.target);
                    return Ok(element);
                }
                Err(e) if e.is_not_found() => {
                    debug!(strategy = index, selector = %strategy.selector, "strategy missed: {e}");
                }
                Err(AutomationError::InvalidSelector(reason)) => {
                    debug!(strategy = index, "skipping invalid selector: {reason}");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AutomationError::ElementNotFound(format!(
            "All {} strategies exhausted for {}",
            self.strategies.len(),
            self.target
        )))
    }
}

/// Standalone form of [`StrategyChain::locate`].
pub async fn locate(
    driver: &Arc<dyn MobileDriver>,
    target: &str,
    strategies: &[LocatorStrategy],
) -> Result<UIElement, AutomationError> {
    StrategyChain::new(target, strategies.to_vec())
        .locate(driver)
        .await
}
