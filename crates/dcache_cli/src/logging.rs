//! Log output setup for the CLI.
//!
//! Library crates log through `tracing`; this installs a `tracing-subscriber`
//! formatter writing to stderr. `RUST_LOG` takes precedence over the
//! `--verbose` / `--quiet` flags.

use std::io;

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Returns the filter directive implied by the CLI flags.
pub fn default_directive(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "dcache=debug,dcache_cli=debug"
    } else {
        "warn"
    }
}

/// Installs the global subscriber.
pub fn init_logging(verbose: bool, quiet: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(verbose, quiet)))?;

    let layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(io::stderr)
        .with_target(verbose);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()?;
    Ok(())
}
