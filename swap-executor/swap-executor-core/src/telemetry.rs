//! Logging setup for binaries embedding the executor

use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Configure the logging subscriber
///
/// The filter is read from `RUST_LOG`, defaulting to `INFO`
pub fn setup_logging(json: bool) {
    let filter =
        EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy();

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_file(true).with_line_number(true).json().flatten_event(true))
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(fmt::layer().pretty()).init();
    }
}
