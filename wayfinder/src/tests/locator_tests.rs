use std::time::Duration;

use super::mock_driver::{Hidden, MockDriver};
use super::{init_tracing, session_for};
use crate::errors::AutomationError;
use crate::locator::{locate, Locator, LocatorStrategy, StrategyChain};
use crate::platforms::ScrollDirection;
use crate::selector::Selector;

#[tokio::test]
async fn chain_falls_through_to_later_strategy() {
    init_tracing();
    let mock = MockDriver::new().picker_open();
    let driver = mock.shared();
    let chain = StrategyChain::from_selectors(
        "add affordance",
        ["id:new_item", "Add", "label:Add", "name:plus"],
        Duration::ZERO,
    );

    let element = chain.locate(&driver).await.unwrap();
    assert_eq!(element.name().await.unwrap().as_deref(), Some("plus"));
}

#[tokio::test]
async fn exhausted_chain_reports_not_found() {
    init_tracing();
    let driver = MockDriver::new().shared();
    let strategies = [
        LocatorStrategy::new("id:add_button", Duration::ZERO),
        LocatorStrategy::new("name:Add", Duration::ZERO),
    ];

    let err = locate(&driver, "add affordance", &strategies).await.unwrap_err();
    match err {
        AutomationError::ElementNotFound(msg) => {
            assert!(msg.contains("All 2 strategies exhausted for add affordance"), "{msg}")
        }
        e => panic!("Expected ElementNotFound, got {e:?}"),
    }
}

#[tokio::test]
async fn empty_chain_is_not_found() {
    let driver = MockDriver::new().shared();
    let err = StrategyChain::new("nothing", Vec::new())
        .locate(&driver)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn wait_times_out_for_missing_element() {
    init_tracing();
    let driver = MockDriver::new().shared();
    let locator = Locator::new(driver, "name:Nowhere").set_poll_interval(Duration::from_millis(5));

    let err = locator.wait(Some(Duration::from_millis(20))).await.unwrap_err();
    assert!(matches!(err, AutomationError::Timeout(_)), "{err:?}");
}

#[tokio::test]
async fn wait_rejects_invalid_selector_without_querying() {
    let driver = MockDriver::new().shared();
    let locator = Locator::new(driver, "Location");
    assert!(matches!(locator.selector(), Selector::Invalid(_)));

    let err = locator.wait(Some(Duration::from_secs(5))).await.unwrap_err();
    assert!(matches!(err, AutomationError::InvalidSelector(_)));
}

#[tokio::test]
async fn all_lists_matches_in_traversal_order() {
    let driver = MockDriver::new()
        .picker_open()
        .with_items(&["HQ Tower, 2 floors", "Level 1, 3 rooms"])
        .shared();
    let buttons = Locator::new(driver, "role:button").all().await.unwrap();

    let mut names = Vec::new();
    for button in &buttons {
        names.push(button.name().await.unwrap().unwrap_or_default());
    }
    assert_eq!(names, vec!["Cancel", "plus", "HQ Tower, 2 floors", "Level 1, 3 rooms"]);
}

#[tokio::test]
async fn wait_skips_hidden_match_for_a_displayed_one() {
    init_tracing();
    let driver = MockDriver::new()
        .picker_open()
        .with_items(&["Room B", "Room C"])
        .hidden(Hidden::Item("Room B".to_string()))
        .shared();

    let element = Locator::new(driver, "contains:Room")
        .wait(Some(Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(element.name().await.unwrap().as_deref(), Some("Room C"));
}

#[tokio::test]
async fn wait_times_out_when_every_match_is_hidden() {
    let driver = MockDriver::new()
        .picker_open()
        .with_items(&["Room B"])
        .hidden(Hidden::Item("Room B".to_string()))
        .shared();
    let locator = Locator::new(driver.clone(), "name:Room B");

    assert_eq!(locator.all().await.unwrap().len(), 1);
    let err = locator.wait(Some(Duration::ZERO)).await.unwrap_err();
    assert!(matches!(err, AutomationError::Timeout(_)), "{err:?}");
}

#[tokio::test]
async fn chain_passes_over_hidden_element_to_next_strategy() {
    init_tracing();
    let driver = MockDriver::new().picker_open().hidden(Hidden::Add).shared();
    let chain = StrategyChain::from_selectors(
        "first visible control",
        ["name:plus", "name:Cancel"],
        Duration::ZERO,
    );

    let element = chain.locate(&driver).await.unwrap();
    assert_eq!(element.name().await.unwrap().as_deref(), Some("Cancel"));
}

#[tokio::test]
async fn session_scrolls_between_chain_passes() {
    init_tracing();
    let mock = MockDriver::new()
        .picker_open()
        .with_items(&["Room A", "Room Z"])
        .below_fold("Room Z", 2);
    let session = session_for(&mock);
    let chain = session.chain("far room", &["id:room_z".to_string(), "name:Room Z".to_string()]);

    let element = session
        .find_scrolling(&chain, ScrollDirection::Down)
        .await
        .unwrap();
    assert_eq!(element.name().await.unwrap().as_deref(), Some("Room Z"));
    assert_eq!(mock.scrolls(), 2);
}
