pub mod analysis;
pub mod cancel;
pub mod commands;
pub mod config;
pub mod db;
pub mod drive;
pub mod import;
pub mod insights;
pub mod intervals;
pub mod models;
pub mod paste;
pub mod progression;
pub mod reconcile;
pub mod store;
pub mod sync;
pub mod zones;

#[cfg(test)]
pub(crate) mod test_utils;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "casey_rides_lib=info,casey_rides=info,warn";

/// Install the global subscriber. `RUST_LOG` overrides the default filter;
/// `verbose` raises this crate to debug. Logs go to stderr so command
/// output on stdout stays clean.
pub fn init_logging(verbose: bool) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    if verbose {
      EnvFilter::new("casey_rides_lib=debug,casey_rides=debug,info")
    } else {
      EnvFilter::new(DEFAULT_LOG_FILTER)
    }
  });

  let format = tracing_subscriber::fmt::layer()
    .with_target(false)
    .with_writer(std::io::stderr);

  tracing_subscriber::registry().with(filter).with(format).init();
}
