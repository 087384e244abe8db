use std::env;

use crate::exporters::stdout::{LogExporterKind, parse_log_exporter_kind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_span_events: bool,
    pub log_exporter: LogExporterKind,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_span_events: false,
            log_exporter: LogExporterKind::Stdout,
        }
    }
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let log_level = lookup("AIGATE_LOG_LEVEL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "info".to_string());
        let log_span_events = lookup("AIGATE_LOG_SPAN_EVENTS").is_some_and(|value| truthy(&value));
        let log_exporter =
            parse_log_exporter_kind(&lookup("AIGATE_LOG_EXPORTER").unwrap_or_default());

        Self { log_level, log_span_events, log_exporter }
    }
}

fn truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
