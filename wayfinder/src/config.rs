use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::classifier::{ClassifierRules, CreationPrefixes, DEFAULT_CHROME_NAMES};
use crate::errors::AutomationError;
use crate::locator::StrategyChain;
use crate::platforms::{ScrollDirection, ScrollParams};
use crate::retry::ScrollRetry;
use crate::selector::Selector;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Tunables and selector vocabulary for one application under test.
///
/// Every selector list is ordered most reliable first and uses the compact
/// string syntax understood by [`Selector::from`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Time budget for each individual locator strategy
    pub strategy_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Pause after clicks, scrolls and text entry
    pub settle_delay_ms: u64,
    /// Pause after saving a newly created item
    pub creation_settle_ms: u64,
    /// Lookups made by the scroll scheduler, including the first
    pub scroll_attempts: usize,
    pub scroll_velocity: f64,
    pub swipe_duration_ms: u64,
    /// How many structural nodes may be expanded below a floor
    pub max_descent_depth: usize,
    pub min_name_len: usize,
    pub chrome_names: Vec<String>,
    pub creation_prefixes: CreationPrefixes,

    pub picker_opener: Vec<String>,
    /// Anything that is only on screen while the picker is open
    pub picker_marker: Vec<String>,
    pub picker_header: Vec<String>,
    /// Query returning every hierarchy item button in traversal order
    pub hierarchy_items: String,
    pub add_affordance: Vec<String>,
    pub save_control: Vec<String>,
    pub dismiss_controls: Vec<String>,
    pub text_inputs: Vec<String>,
    pub name_placeholders: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            strategy_timeout_ms: 2000,
            poll_interval_ms: 250,
            settle_delay_ms: 300,
            creation_settle_ms: 1000,
            scroll_attempts: 3,
            scroll_velocity: 600.0,
            swipe_duration_ms: 300,
            max_descent_depth: 3,
            min_name_len: 2,
            chrome_names: strings(DEFAULT_CHROME_NAMES),
            creation_prefixes: CreationPrefixes::default(),
            picker_opener: strings(&["id:location_picker", "name:Location", "contains:Select location"]),
            picker_marker: strings(&["id:location_picker_list", "name:Select Location"]),
            picker_header: strings(&["id:location_picker_header", "name:Select Location", "role:navigationbar"]),
            hierarchy_items: "role:button".to_string(),
            add_affordance: strings(&["id:add_button", "name:plus", "id:Add", "label:Add", "name:Add"]),
            save_control: strings(&["id:save_button", "id:Save", "label:Save", "name:Save", "label:Done"]),
            dismiss_controls: strings(&["name:Cancel", "label:Cancel", "name:Done", "label:Done", "id:close"]),
            text_inputs: strings(&["role:textfield"]),
            name_placeholders: strings(&["Name", "Enter name"]),
        }
    }
}

impl ResolverConfig {
    pub fn from_json_str(json: &str) -> Result<Self, AutomationError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AutomationError::Config(format!("Invalid resolver config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AutomationError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            AutomationError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Rejects selector strings that do not parse and lists that would make a
    /// required lookup impossible.
    pub fn validate(&self) -> Result<(), AutomationError> {
        let required = [
            ("picker_opener", &self.picker_opener),
            ("picker_marker", &self.picker_marker),
            ("add_affordance", &self.add_affordance),
            ("save_control", &self.save_control),
            ("text_inputs", &self.text_inputs),
        ];
        for (field, selectors) in required {
            if selectors.is_empty() {
                return Err(AutomationError::Config(format!("{field} must not be empty")));
            }
        }

        let lists = [
            ("picker_opener", &self.picker_opener),
            ("picker_marker", &self.picker_marker),
            ("picker_header", &self.picker_header),
            ("add_affordance", &self.add_affordance),
            ("save_control", &self.save_control),
            ("dismiss_controls", &self.dismiss_controls),
            ("text_inputs", &self.text_inputs),
        ];
        for (field, selectors) in lists {
            for raw in selectors {
                if let Selector::Invalid(reason) = Selector::from(raw.as_str()) {
                    return Err(AutomationError::Config(format!("{field}: {reason}")));
                }
            }
        }
        if let Selector::Invalid(reason) = Selector::from(self.hierarchy_items.as_str()) {
            return Err(AutomationError::Config(format!("hierarchy_items: {reason}")));
        }

        if self.scroll_attempts == 0 {
            return Err(AutomationError::Config(
                "scroll_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.scroll_velocity.is_finite() && self.scroll_velocity > 0.0) {
            return Err(AutomationError::Config(format!(
                "scroll_velocity must be positive, got {}",
                self.scroll_velocity
            )));
        }
        Ok(())
    }

    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn creation_settle(&self) -> Duration {
        Duration::from_millis(self.creation_settle_ms)
    }

    pub fn swipe_duration(&self) -> Duration {
        Duration::from_millis(self.swipe_duration_ms)
    }

    /// Strategy chain over one of the selector lists
    pub fn chain(&self, target: &str, selectors: &[String]) -> StrategyChain {
        StrategyChain::from_selectors(
            target,
            selectors.iter().map(String::as_str),
            self.strategy_timeout(),
        )
        .with_poll_interval(self.poll_interval())
    }

    pub fn hierarchy_item_selector(&self) -> Selector {
        Selector::from(self.hierarchy_items.as_str())
    }

    pub fn classifier_rules(&self) -> ClassifierRules {
        ClassifierRules {
            chrome_names: self.chrome_names.clone(),
            min_name_len: self.min_name_len,
            creation_prefixes: self.creation_prefixes.clone(),
        }
    }

    pub fn scroll_retry(&self, direction: ScrollDirection) -> ScrollRetry {
        ScrollRetry::new(
            ScrollParams::new(direction, self.scroll_velocity),
            self.scroll_attempts,
        )
        .with_settle(self.settle_delay())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ResolverConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ResolverConfig::from_json_str(
            r#"{ "settle_delay_ms": 0, "add_affordance": ["id:new_item", "label:New"] }"#,
        )
        .unwrap();
        assert_eq!(config.settle_delay(), Duration::ZERO);
        assert_eq!(config.add_affordance, vec!["id:new_item", "label:New"]);
        assert_eq!(config.strategy_timeout_ms, 2000);
        assert_eq!(config.creation_prefixes.floor, "Floor");
    }

    #[test]
    fn invalid_selector_is_rejected() {
        let err = ResolverConfig::from_json_str(r#"{ "save_control": ["Save"] }"#).unwrap_err();
        assert!(matches!(err, AutomationError::Config(msg) if msg.starts_with("save_control")));
    }

    #[test]
    fn empty_required_list_is_rejected() {
        let err = ResolverConfig::from_json_str(r#"{ "add_affordance": [] }"#).unwrap_err();
        assert!(matches!(err, AutomationError::Config(_)));
    }

    #[test]
    fn chain_preserves_order_and_timeout() {
        let config = ResolverConfig {
            strategy_timeout_ms: 1500,
            ..Default::default()
        };
        let chain = config.chain("save control", &config.save_control);
        assert_eq!(chain.strategies().len(), config.save_control.len());
        assert_eq!(
            chain.strategies()[0].selector,
            Selector::AccessibilityId("save_button".to_string())
        );
        assert!(chain
            .strategies()
            .iter()
            .all(|s| s.timeout == Duration::from_millis(1500)));
    }
}
