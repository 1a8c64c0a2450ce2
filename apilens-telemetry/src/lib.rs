// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Apilens telemetry: the journey batching client plus process-wide
//! logging, tracing and metrics setup.

pub mod batcher;
pub mod error;
pub mod journey;
pub mod transport;

use opentelemetry::trace::TracerProvider;
use opentelemetry::{
    metrics::{Counter, Histogram, Meter, MeterProvider},
    KeyValue,
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{metrics::SdkMeterProvider, runtime, trace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use batcher::{
    FlushReport, JourneyBatcher, TelemetryConfig, TelemetryObserver, TelemetryStats,
};
pub use error::{Result, TelemetryError};
pub use journey::{
    EventData, JourneyBatch, JourneyContext, JourneyEvent, JourneyEventType, JourneyMilestone,
    MilestoneType, Outcome,
};
pub use transport::{CollectorTransport, HttpCollector};

/// Metrics registry.
pub struct Metrics {
    pub protocol_events_tracked: Counter<u64>,
    pub protocol_events_evicted: Counter<u64>,
    pub protocol_event_latency_ms: Histogram<f64>,
    pub routing_decisions_recorded: Counter<u64>,
    pub pattern_searches: Counter<u64>,
    pub pattern_matches: Counter<u64>,
    pub telemetry_flushes: Counter<u64>,
    pub telemetry_flush_failures: Counter<u64>,
    pub telemetry_batch_size: Histogram<u64>,
}

impl Metrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            protocol_events_tracked: meter
                .u64_counter("apilens.protocol_events.tracked")
                .with_description("Total protocol events tracked")
                .init(),
            protocol_events_evicted: meter
                .u64_counter("apilens.protocol_events.evicted")
                .with_description("Protocol events removed by the retention sweep")
                .init(),
            protocol_event_latency_ms: meter
                .f64_histogram("apilens.protocol_events.latency_ms")
                .with_description("Protocol event duration in milliseconds")
                .init(),
            routing_decisions_recorded: meter
                .u64_counter("apilens.routing_decisions.recorded")
                .with_description("Total routing decisions recorded")
                .init(),
            pattern_searches: meter
                .u64_counter("apilens.pattern.searches")
                .with_description("Total pattern searches")
                .init(),
            pattern_matches: meter
                .u64_counter("apilens.pattern.matches")
                .with_description("Pattern matches returned by searches")
                .init(),
            telemetry_flushes: meter
                .u64_counter("apilens.telemetry.flushes")
                .with_description("Journey batches delivered")
                .init(),
            telemetry_flush_failures: meter
                .u64_counter("apilens.telemetry.flush_failures")
                .with_description("Journey batches that failed to deliver")
                .init(),
            telemetry_batch_size: meter
                .u64_histogram("apilens.telemetry.batch_size")
                .with_description("Items per journey batch")
                .init(),
        }
    }

    /// Metrics backed by an in-process provider with no exporter.
    pub fn noop() -> Self {
        let provider = SdkMeterProvider::default();
        Self::new(&provider.meter("apilens"))
    }

    pub fn record_protocol_event(&self, protocol: &str, duration_ms: f64) {
        let attrs = [KeyValue::new("protocol", protocol.to_string())];
        self.protocol_events_tracked.add(1, &attrs);
        self.protocol_event_latency_ms.record(duration_ms, &attrs);
    }

    pub fn record_eviction(&self, evicted: usize) {
        if evicted > 0 {
            self.protocol_events_evicted.add(evicted as u64, &[]);
        }
    }

    pub fn record_routing_decision(&self, strategy: &str) {
        self.routing_decisions_recorded
            .add(1, &[KeyValue::new("strategy", strategy.to_string())]);
    }

    pub fn record_search(&self, matches: usize) {
        self.pattern_searches.add(1, &[]);
        self.pattern_matches.add(matches as u64, &[]);
    }

    pub fn record_flush(&self, report: &FlushReport) {
        self.telemetry_flushes.add(1, &[]);
        self.telemetry_batch_size
            .record(report.batch_size() as u64, &[]);
    }

    pub fn record_flush_failure(&self, report: &FlushReport) {
        self.telemetry_flush_failures.add(1, &[]);
        self.telemetry_batch_size
            .record(report.batch_size() as u64, &[KeyValue::new("failed", true)]);
    }
}

/// Transport crates that log every frame at debug level.
const QUIET_DEPENDENCIES: &str = "h2=warn,hyper=warn,tonic=warn,tower=warn,reqwest=warn";

/// `RUST_LOG` when set, otherwise `level` with transport crates held at warn.
pub fn env_filter(level: &str) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(format!("{level},{QUIET_DEPENDENCIES}"))?),
    }
}

/// Resource attached to exported spans and metrics.
pub fn service_resource(service_name: &str) -> Resource {
    Resource::new(vec![
        KeyValue::new("service.name", service_name.to_string()),
        KeyValue::new("service.namespace", "apilens"),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ])
}

/// Initialize telemetry (tracing + metrics).
///
/// Traces and metrics go to `otlp_endpoint` over gRPC when given;
/// otherwise in-process providers are used and only logs leave the process.
pub fn init_telemetry(
    service_name: &str,
    otlp_endpoint: Option<&str>,
    level: &str,
) -> anyhow::Result<Metrics> {
    let resource = service_resource(service_name);

    let tracer_provider = match otlp_endpoint {
        Some(endpoint) => opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint))
            .with_trace_config(trace::Config::default().with_resource(resource.clone()))
            .install_batch(runtime::Tokio)?,
        None => trace::TracerProvider::builder()
            .with_config(trace::Config::default().with_resource(resource.clone()))
            .build(),
    };
    let tracer = tracer_provider.tracer(service_name.to_string());

    let meter_provider = match otlp_endpoint {
        Some(endpoint) => opentelemetry_otlp::new_pipeline()
            .metrics(runtime::Tokio)
            .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint))
            .with_resource(resource)
            .build()?,
        None => SdkMeterProvider::builder().with_resource(resource).build(),
    };
    let metrics = Metrics::new(&meter_provider.meter(service_name.to_string()));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter(level)?)
        .with(fmt_layer)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init()?;

    Ok(metrics)
}

/// Plain stderr logging; see [`env_filter`] for how `level` applies.
pub fn init_logging(level: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level)?)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}
