//! Log output setup.
//!
//! Log lines go to stderr with a compact `HH:MM:SS.mmm` timestamp, leaving
//! stdout for command output. Levels come from the `[logging]` config
//! section unless `RUST_LOG` is set:
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! "fitflix::server" = "info"
//! "fitflix_core::retrieve" = "debug"
//! ```
//!
//! ```bash
//! RUST_LOG=fitflix=debug fitflix chat
//! ```

use std::sync::Once;

use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter directive string from config: the default level
/// followed by `target=level` for each module override.
fn filter_directives(config: &LoggingConfig) -> String {
    let mut modules: Vec<_> = config.modules.iter().collect();
    modules.sort();
    let mut directives = config.default.clone();
    for (module, level) in modules {
        directives.push_str(&format!(",{module}={level}"));
    }
    directives
}

/// Install the global subscriber. Only the first call has any effect.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        // A subscriber installed by an embedding application wins.
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}

/// Install the global subscriber with the default (`warn`) level.
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_filter_directives() {
        let mut modules = HashMap::new();
        modules.insert("fitflix::server".to_string(), "info".to_string());
        modules.insert("fitflix::loader".to_string(), "debug".to_string());
        let config = LoggingConfig {
            default: "warn".to_string(),
            modules,
        };
        assert_eq!(
            filter_directives(&config),
            "warn,fitflix::loader=debug,fitflix::server=info"
        );
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
    }
}
