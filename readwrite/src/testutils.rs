use tracing_subscriber::EnvFilter;

/// Initialize the logger for testing.
///
/// This logs to the stdout registered by the Rust test runner, and only captures logs from this
/// crate.
pub fn init_tracing() {
    let env_filter = EnvFilter::new("ERROR").add_directive("readwrite=TRACE".parse().unwrap());

    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}
