//! Logging and Span Export
//!
//! Installs the global `tracing` subscriber for applications built on the
//! client. The library only emits events; nothing here runs unless the
//! application calls [`init`].
//!
//! Output is filtered per target: the client's own events at one level,
//! the HTTP/2 transport underneath tonic at another. `RUST_LOG`, when set,
//! replaces both. Spans go to an OTLP collector only when an endpoint is
//! configured, and carry the broker endpoint as a resource attribute.
//!
//! # Environment Variables
//!
//! - `FINAM_LOG_LEVEL`: Level for `trade_api_client` events (default: info)
//! - `FINAM_TRANSPORT_LOG_LEVEL`: Level for `h2` and `hyper` (default: warn)
//! - `FINAM_OTLP_ENDPOINT`: OTLP gRPC collector; span export is off when unset
//! - `FINAM_SERVICE_NAME`: Service name on exported spans (default: trade-api-client)
//!
//! # Usage
//!
//! ```ignore
//! let config = ClientConfig::from_env()?;
//! let _guard = telemetry::init(&TelemetryConfig::from_env().for_client(&config));
//! ```

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::infrastructure::config::ClientConfig;

/// Target of every event this crate emits.
const CLIENT_TARGET: &str = "trade_api_client";

/// Transport crates under tonic. `hyper` also covers `hyper_util`.
const TRANSPORT_TARGETS: [&str; 2] = ["h2", "hyper"];

const DEFAULT_SERVICE_NAME: &str = "trade-api-client";

/// Resource attribute naming the broker the client talks to.
const BROKER_ENDPOINT_KEY: &str = "broker.endpoint";

/// Flushes exported spans when dropped. Keep it alive for the program's
/// lifetime.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Check whether spans are being exported.
    #[must_use]
    pub const fn is_exporting(&self) -> bool {
        self.tracer_provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!(error = %e, "Span exporter did not flush");
        }
    }
}

/// Logging and span export settings for a client application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Level for the client's own events.
    pub client_level: LevelFilter,
    /// Level for the HTTP/2 transport.
    pub transport_level: LevelFilter,
    /// OTLP collector; `None` disables span export.
    pub otlp_endpoint: Option<String>,
    /// Service name on exported spans.
    pub service_name: String,
    /// Broker endpoint recorded on exported spans.
    pub broker_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            client_level: LevelFilter::INFO,
            transport_level: LevelFilter::WARN,
            otlp_endpoint: None,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            broker_endpoint: None,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from `FINAM_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            client_level: parse_level(std::env::var("FINAM_LOG_LEVEL").ok(), defaults.client_level),
            transport_level: parse_level(
                std::env::var("FINAM_TRANSPORT_LOG_LEVEL").ok(),
                defaults.transport_level,
            ),
            otlp_endpoint: std::env::var("FINAM_OTLP_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            service_name: std::env::var("FINAM_SERVICE_NAME")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.service_name),
            broker_endpoint: None,
        }
    }

    /// Record which broker the client is configured for.
    #[must_use]
    pub fn for_client(mut self, client: &ClientConfig) -> Self {
        self.broker_endpoint = Some(client.endpoint.clone());
        self
    }

    /// Filter directives built from the levels, e.g.
    /// `trade_api_client=info,h2=warn,hyper=warn`.
    #[must_use]
    pub fn directives(&self) -> String {
        let transport = level_name(self.transport_level);
        std::iter::once(format!("{CLIENT_TARGET}={}", level_name(self.client_level)))
            .chain(
                TRANSPORT_TARGETS
                    .iter()
                    .map(|target| format!("{target}={transport}")),
            )
            .collect::<Vec<_>>()
            .join(",")
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .parse_lossy(self.directives())
        })
    }

    fn resource(&self) -> Resource {
        let builder = Resource::builder().with_service_name(self.service_name.clone());
        match &self.broker_endpoint {
            Some(endpoint) => builder
                .with_attribute(KeyValue::new(BROKER_ENDPOINT_KEY, endpoint.clone()))
                .build(),
            None => builder.build(),
        }
    }
}

fn parse_level(value: Option<String>, default: LevelFilter) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse::<LevelFilter>().ok())
        .unwrap_or(default)
}

fn level_name(level: LevelFilter) -> String {
    level.to_string().to_lowercase()
}

/// Install the global subscriber.
///
/// Falls back to console output when the OTLP exporter cannot be built.
/// Installing twice is a no-op for the second call.
#[must_use]
pub fn init(config: &TelemetryConfig) -> TelemetryGuard {
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let registry = tracing_subscriber::registry()
        .with(config.filter())
        .with(fmt_layer);

    let Some(endpoint) = config.otlp_endpoint.as_deref() else {
        let _ = registry.try_init();
        return TelemetryGuard {
            tracer_provider: None,
        };
    };

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            let _ = registry.try_init();
            tracing::warn!(error = %e, endpoint, "Span export disabled");
            return TelemetryGuard {
                tracer_provider: None,
            };
        }
    };

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(config.resource())
        .build();
    let tracer = tracer_provider.tracer(config.service_name.clone());

    if registry
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init()
        .is_err()
    {
        let _ = tracer_provider.shutdown();
        return TelemetryGuard {
            tracer_provider: None,
        };
    }

    tracing::info!(
        endpoint,
        service_name = %config.service_name,
        "Exporting spans over OTLP"
    );
    TelemetryGuard {
        tracer_provider: Some(tracer_provider),
    }
}
