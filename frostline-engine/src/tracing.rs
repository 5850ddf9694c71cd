//! Logging setup and the macro prelude used across the crate.
//!
//! Modules import `crate::tracing::prelude::*` instead of naming the
//! `tracing` macros one by one.

use tracing_subscriber::filter::EnvFilter;

pub mod prelude {
    pub use tracing::{debug, error, info, trace, warn};
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` (from configuration) is used,
/// with reqwest/rumqttc internals held at `warn`.
pub fn init(level: &str) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(format!("{level},hyper=warn,reqwest=warn,rumqttc=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(filter)
        .compact()
        .init();
}
