use std::collections::HashMap;

use serde::Deserialize;
use url::Url;

/// Telemetry configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Service name for telemetry metadata
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Log filter directive used when `RUST_LOG` is unset
    #[serde(default)]
    pub log_filter: Option<String>,
    /// Additional resource attributes
    #[serde(default)]
    pub resource_attributes: HashMap<String, String>,
    /// OTLP exporter shared by traces and metrics
    #[serde(default)]
    pub exporter: Option<ExporterConfig>,
    /// Tracing-specific configuration
    #[serde(default)]
    pub tracing: Option<TracingConfig>,
}

/// OTLP exporter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    /// OTLP endpoint URL
    pub endpoint: Url,
    /// Export protocol
    #[serde(default)]
    pub protocol: ExportProtocol,
    /// Metrics export interval in seconds
    #[serde(default = "default_export_interval")]
    pub export_interval: u64,
}

/// OTLP export protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportProtocol {
    /// gRPC (default)
    #[default]
    Grpc,
    /// HTTP/protobuf
    HttpProto,
}

/// Tracing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TracingConfig {
    /// Sampling rate (0.0 to 1.0)
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
    /// Respect the parent span's sampling decision
    #[serde(default = "default_parent_based")]
    pub parent_based: bool,
}

fn default_service_name() -> String {
    "conduit".to_owned()
}

const fn default_export_interval() -> u64 {
    30
}

const fn default_sampling_rate() -> f64 {
    1.0
}

const fn default_parent_based() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn defaults_apply() {
        let config: TelemetryConfig = toml::from_str("").unwrap();
        assert_eq!(config.service_name, "conduit");
        assert!(config.exporter.is_none());
        assert!(config.log_filter.is_none());
    }

    #[test]
    fn exporter_with_protocol() {
        let toml = indoc! {r#"
            log_filter = "conduit_llm=debug"

            [exporter]
            endpoint = "http://localhost:4318"
            protocol = "http_proto"

            [tracing]
            sampling_rate = 0.25
        "#};

        let config: TelemetryConfig = toml::from_str(toml).unwrap();
        let exporter = config.exporter.unwrap();
        assert_eq!(exporter.protocol, ExportProtocol::HttpProto);
        assert_eq!(exporter.export_interval, 30);
        assert!((config.tracing.unwrap().sampling_rate - 0.25).abs() < f64::EPSILON);
    }
}
