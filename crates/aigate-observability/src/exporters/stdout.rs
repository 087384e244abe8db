use tracing_subscriber::fmt::format::FmtSpan;

/// Where formatted log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogExporterKind {
    Stdout,
    None,
}

/// Anything other than `none` keeps stdout.
pub fn parse_log_exporter_kind(raw: &str) -> LogExporterKind {
    match raw.trim().to_ascii_lowercase().as_str() {
        "none" | "off" => LogExporterKind::None,
        _ => LogExporterKind::Stdout,
    }
}

pub fn span_events_mask(log_span_events: bool) -> FmtSpan {
    if log_span_events { FmtSpan::NEW | FmtSpan::CLOSE } else { FmtSpan::NONE }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_exporters_fall_back_to_stdout() {
        assert_eq!(parse_log_exporter_kind(""), LogExporterKind::Stdout);
        assert_eq!(parse_log_exporter_kind("otlp"), LogExporterKind::Stdout);
    }

    #[test]
    fn none_and_off_disable_output() {
        assert_eq!(parse_log_exporter_kind("NONE"), LogExporterKind::None);
        assert_eq!(parse_log_exporter_kind(" off "), LogExporterKind::None);
    }

    #[test]
    fn span_events_only_when_requested() {
        assert_eq!(span_events_mask(false), FmtSpan::NONE);
        assert_eq!(span_events_mask(true), FmtSpan::NEW | FmtSpan::CLOSE);
    }
}
