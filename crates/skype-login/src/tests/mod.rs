mod launcher_tests;
mod locator_tests;

// Initialize tracing for tests that want log output under RUST_LOG.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
