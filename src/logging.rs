use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes console logging.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` (from config) applies.
/// Safe to call more than once: later calls are ignored.
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init();
}
