// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Tracing subscriber setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Env var holding the filter directive.
pub const LOG_ENV: &str = "TANDEM_LOG";

/// Install a stderr subscriber. Filter comes from `TANDEM_LOG`, default `warn`.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    // A second init (tests) is harmless.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
