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

//! Bridges engine notifications into logs and OpenTelemetry metrics.

use apilens_index::{ApiPattern, MatcherObserver, SearchEvent};
use apilens_observability::{CleanupReport, ProtocolEvent, RoutingRecord, TrackerObserver};
use apilens_telemetry::{FlushReport, Metrics, TelemetryError, TelemetryObserver};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Subscribed to every engine the CLI builds.
pub struct MetricsObserver {
    metrics: Arc<Metrics>,
}

impl MetricsObserver {
    pub fn new(metrics: Arc<Metrics>) -> Arc<Self> {
        Arc::new(Self { metrics })
    }
}

impl MatcherObserver for MetricsObserver {
    fn on_pattern_added(&self, pattern: &ApiPattern) {
        debug!(id = %pattern.id, category = %pattern.category, "catalog pattern added");
    }

    fn on_pattern_removed(&self, id: &str) {
        debug!(id, "catalog pattern removed");
    }

    fn on_search(&self, event: &SearchEvent) {
        self.metrics.record_search(event.matches.len());
        debug!(
            session = %event.session_id,
            matches = event.matches.len(),
            top = event.matches.first().map(|m| m.pattern.id.as_str()),
            "pattern search"
        );
    }
}

impl TrackerObserver for MetricsObserver {
    fn on_event(&self, event: &ProtocolEvent) {
        self.metrics
            .record_protocol_event(event.protocol.as_str(), event.duration_ms);
    }

    fn on_routing_decision(&self, record: &RoutingRecord) {
        self.metrics
            .record_routing_decision(record.decision.strategy.as_str());
    }

    fn on_cleanup(&self, report: &CleanupReport) {
        self.metrics.record_eviction(report.evicted_events());
        if report.overflow_evicted > 0 {
            warn!(
                evicted = report.overflow_evicted,
                remaining = report.remaining_events,
                "event store overflowed, oldest events dropped"
            );
        }
    }
}

impl TelemetryObserver for MetricsObserver {
    fn on_flush(&self, report: &FlushReport) {
        self.metrics.record_flush(report);
        info!(items = report.batch_size(), "journey batch delivered");
    }

    fn on_error(&self, error: &TelemetryError, report: &FlushReport) {
        self.metrics.record_flush_failure(report);
        warn!(
            error = %error,
            requeued = report.requeued,
            dropped = report.dropped,
            "journey batch not delivered"
        );
    }
}
