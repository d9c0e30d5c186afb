//! Integration test infrastructure for Gantry CI.
//!
//! Provides pipeline fixtures and stub implementations of the execution
//! ports so scenario tests can script job and step outcomes
//! deterministically.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,gantry_tests=debug")),
        )
        .with_test_writer()
        .try_init();
}
