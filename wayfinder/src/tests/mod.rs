mod locator_tests;
mod mock_driver;

use std::sync::Arc;

use crate::{ResolverConfig, Session};
use mock_driver::{MockDriver, SequenceTokens};

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_test_writer()
        .try_init();
}

/// Single-probe lookups and no settle delays
pub fn fast_config() -> ResolverConfig {
    ResolverConfig {
        strategy_timeout_ms: 0,
        poll_interval_ms: 0,
        settle_delay_ms: 0,
        creation_settle_ms: 0,
        ..Default::default()
    }
}

pub fn session_for(mock: &MockDriver) -> Session {
    Session::new(mock.shared(), fast_config())
        .unwrap()
        .with_tokens(Arc::new(SequenceTokens::default()))
}
