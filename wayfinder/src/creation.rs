use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::classifier::HierarchyLevel;
use crate::config::ResolverConfig;
use crate::element::UIElement;
use crate::errors::{AutomationError, CreationStep};
use crate::locator::{Locator, StrategyChain};
use crate::platforms::MobileDriver;
use crate::selector::Selector;

/// Add → name → save for one hierarchy item.
///
/// The workflow only creates the item. It does not select it, and callers
/// must find it by name in a fresh snapshot afterwards.
pub struct CreationWorkflow<'a> {
    driver: &'a Arc<dyn MobileDriver>,
    config: &'a ResolverConfig,
}

impl<'a> CreationWorkflow<'a> {
    pub fn new(driver: &'a Arc<dyn MobileDriver>, config: &'a ResolverConfig) -> Self {
        Self { driver, config }
    }

    #[instrument(skip(self), fields(level = %level))]
    pub async fn create(&self, level: HierarchyLevel, item_name: &str) -> Result<(), AutomationError> {
        if item_name.trim().is_empty() {
            return Err(AutomationError::InvalidArgument(
                "Cannot create an item with an empty name".to_string(),
            ));
        }

        let add = self
            .required(
                self.config.chain("add affordance", &self.config.add_affordance),
                level,
                CreationStep::AddAffordance,
            )
            .await?;
        add.click().await?;
        tokio::time::sleep(self.config.settle_delay()).await;

        let input = self.name_input(level).await?;
        input.clear().await?;
        input.send_keys(item_name).await?;
        tokio::time::sleep(self.config.settle_delay()).await;

        let save = self
            .required(
                self.config.chain("save control", &self.config.save_control),
                level,
                CreationStep::SaveControl,
            )
            .await?;
        save.click().await?;
        tokio::time::sleep(self.config.creation_settle()).await;

        info!("created {level} item '{item_name}'");
        Ok(())
    }

    async fn required(
        &self,
        chain: StrategyChain,
        level: HierarchyLevel,
        step: CreationStep,
    ) -> Result<UIElement, AutomationError> {
        match chain.locate(self.driver).await {
            Ok(element) => Ok(element),
            Err(e) if e.is_not_found() => {
                warn!("{step} missing while creating {level}: {e}");
                Err(AutomationError::CreationFailed { level, step })
            }
            Err(e) => Err(e),
        }
    }

    /// The single free-text input on the creation surface: matched by
    /// placeholder first, otherwise the first visible text input.
    async fn name_input(&self, level: HierarchyLevel) -> Result<UIElement, AutomationError> {
        let level_placeholder = format!(
            "{} name",
            self.config.creation_prefixes.for_level(level)
        );
        let placeholders = std::iter::once(level_placeholder)
            .chain(self.config.name_placeholders.iter().cloned())
            .map(Selector::Placeholder);
        let by_placeholder = StrategyChain::from_selectors(
            "name input by placeholder",
            placeholders,
            self.config.strategy_timeout(),
        )
        .with_poll_interval(self.config.poll_interval());

        match by_placeholder.locate(self.driver).await {
            Ok(input) => return Ok(input),
            Err(e) if e.is_not_found() => debug!("no placeholder match, using any text input"),
            Err(e) => return Err(e),
        }

        for raw in &self.config.text_inputs {
            let locator = Locator::new(self.driver.clone(), raw.as_str())
                .set_poll_interval(self.config.poll_interval());
            match locator.wait(Some(self.config.strategy_timeout())).await {
                Ok(input) => return Ok(input),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }

        warn!("no text input visible while creating {level}");
        Err(AutomationError::CreationFailed {
            level,
            step: CreationStep::TextInput,
        })
    }
}
