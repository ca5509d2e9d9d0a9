use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Logs go to stderr so stdout carries only
/// the transcript. `RUST_LOG` overrides the level chosen by `debug`.
pub fn init(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
