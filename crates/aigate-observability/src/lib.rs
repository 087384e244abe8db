pub mod config;
pub mod exporters;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub use config::ObservabilityConfig;
use exporters::stdout::{LogExporterKind, span_events_mask};

const CRATE_TARGETS: [&str; 4] =
    ["aigate_app", "aigate_core", "aigate_clients_workers", "aigate_clients_kv"];

/// Directive used when `RUST_LOG` is unset or unparsable.
pub fn fallback_filter(level: &str) -> String {
    std::iter::once(level.to_string())
        .chain(CRATE_TARGETS.iter().map(|target| format!("{target}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Installs the global subscriber. A second call is a no-op.
pub fn init_observability(service_name: &str, config: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_filter(&config.log_level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match config.log_exporter {
        LogExporterKind::Stdout => Some(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(true)
                .with_writer(std::io::stdout)
                .with_span_events(span_events_mask(config.log_span_events)),
        ),
        LogExporterKind::None => None,
    };

    let installed = tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init();
    if installed.is_ok() {
        tracing::info!(
            event = "observability.initialized",
            service = service_name,
            log_level = %config.log_level,
            exporter = ?config.log_exporter,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_filter_covers_workspace_crates() {
        let filter = fallback_filter("debug");
        assert!(filter.starts_with("debug,"));
        assert!(filter.contains("aigate_core=debug"));
        assert!(EnvFilter::try_new(filter).is_ok());
    }
}
