//! Logging bootstrap for Genesis.

use genesis_types::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system.
///
/// `verbosity` stacks on top of `GENESIS_LOG` / `RUST_LOG`: 0 follows the
/// environment (default `warn`), 1 is `info`, 2 is `debug`, 3+ is `trace`.
pub fn init(verbosity: u8) -> Result<()> {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_env("GENESIS_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    Ok(())
}
