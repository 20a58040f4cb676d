//! Mobile UI automation for hierarchical location pickers
//!
//! Drives an app's Building → Floor → Room picker through a remote-control
//! backend such as Appium: opens the picker, chooses or creates an item at
//! each level, and dismisses it again. Element lookups go through ordered
//! strategy chains and a bounded scroll-and-retry scheduler, so callers never
//! hand-roll waits or scrolls.

use std::sync::Arc;
use tracing::{info, instrument};

pub mod classifier;
pub mod config;
pub mod creation;
pub mod element;
pub mod errors;
pub mod locator;
pub mod platforms;
pub mod resolver;
pub mod retry;
pub mod selector;
#[cfg(test)]
mod tests;
pub mod token;

pub use classifier::{HierarchyLevel, Label};
pub use config::ResolverConfig;
pub use element::{Bounds, ElementDescriptor, Point, Size, UIElement, UIElementImpl};
pub use errors::{AutomationError, CreationStep};
pub use locator::{locate, Locator, LocatorStrategy, StrategyChain};
pub use platforms::appium::{AppiumConfig, AppiumDriver, MobilePlatform};
pub use platforms::{MobileDriver, ScrollDirection, ScrollParams};
pub use resolver::{
    Diagnostic, DismissTechnique, HierarchyPath, LocationRequest, ResolutionOutcome,
    ResolutionStatus, ResolverState,
};
pub use retry::{retry_with_scroll, ScrollRetry};
pub use selector::Selector;
pub use token::{ClockTokens, TokenSupplier};

/// The main entry point: one driver session plus the configuration for the
/// app under test.
///
/// Clones share the driver and the run guard, so at most one location
/// resolution runs per session at any time.
#[derive(Clone)]
pub struct Session {
    driver: Arc<dyn MobileDriver>,
    config: Arc<ResolverConfig>,
    tokens: Arc<dyn TokenSupplier>,
    run_guard: Arc<tokio::sync::Mutex<()>>,
}

impl Session {
    pub fn new(driver: Arc<dyn MobileDriver>, config: ResolverConfig) -> Result<Self, AutomationError> {
        config.validate()?;
        Ok(Self {
            driver,
            config: Arc::new(config),
            tokens: Arc::new(ClockTokens::new()),
            run_guard: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    /// Start an Appium session and wrap it.
    ///
    /// ```no_run
    /// use wayfinder::{AppiumConfig, ResolverConfig, Session};
    /// # async fn run() -> Result<(), wayfinder::AutomationError> {
    /// let session = Session::connect(&AppiumConfig::default(), ResolverConfig::default()).await?;
    /// let outcome = session.resolve_location().await;
    /// println!("{:?}", outcome.path);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(appium: &AppiumConfig, config: ResolverConfig) -> Result<Self, AutomationError> {
        let driver = AppiumDriver::connect(appium).await?;
        Self::new(Arc::new(driver), config)
    }

    /// Replace the source of names for created items
    pub fn with_tokens(mut self, tokens: Arc<dyn TokenSupplier>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn driver(&self) -> &Arc<dyn MobileDriver> {
        &self.driver
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    #[instrument(skip(self, selector))]
    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        Locator::new(self.driver.clone(), selector)
            .set_default_timeout(self.config.strategy_timeout())
            .set_poll_interval(self.config.poll_interval())
    }

    /// Strategy chain over compact selector strings, with the configured
    /// per-strategy timeout
    pub fn chain(&self, target: &str, selectors: &[String]) -> StrategyChain {
        self.config.chain(target, selectors)
    }

    /// Locate through a chain, scrolling between full passes if the target
    /// is not on screen
    pub async fn find_scrolling(
        &self,
        chain: &StrategyChain,
        direction: ScrollDirection,
    ) -> Result<UIElement, AutomationError> {
        self.config
            .scroll_retry(direction)
            .find(&self.driver, || chain.locate(&self.driver))
            .await
    }

    /// Run the add → name → save workflow for one item without selecting it
    pub async fn create_item(&self, level: HierarchyLevel, name: &str) -> Result<(), AutomationError> {
        creation::CreationWorkflow::new(&self.driver, &self.config)
            .create(level, name)
            .await
    }

    /// Select any room, creating whatever levels are missing
    pub async fn resolve_location(&self) -> ResolutionOutcome {
        self.resolve(&LocationRequest::any()).await
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, request: &LocationRequest) -> ResolutionOutcome {
        let Ok(_guard) = self.run_guard.try_lock() else {
            info!("resolution already in progress on this session");
            return ResolutionOutcome::aborted(AutomationError::SessionBusy);
        };
        resolver::LocationResolver::new(self.driver.clone(), &self.config, self.tokens.as_ref())
            .run(request)
            .await
    }
}
