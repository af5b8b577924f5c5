//! Tracing initialisation helpers for tests.
//!
//! The subscriber is initialised at most once per process, so
//! [`init_test_tracing`] is safe to call from every test function.

use tracing_subscriber::EnvFilter;

/// Initialise a tracing subscriber that writes to the test-harness writer
/// and respects `RUST_LOG` (default `wpactrl_core=debug,wpactrl_test_utils=debug`).
///
/// # Example
///
/// ```ignore
/// #[tokio::test]
/// async fn my_test() {
///     wpactrl_test_utils::tracing_setup::init_test_tracing();
///     let daemon = wpactrl_test_utils::MockDaemon::start().await;
/// }
/// ```
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wpactrl_core=debug,wpactrl_test_utils=debug")),
        )
        .with_test_writer()
        .try_init();
}
