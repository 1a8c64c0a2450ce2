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

//! Aggregations over tracked events and routing decisions.

use crate::event::{Protocol, ProtocolEvent, Transport};
use crate::routing::{RoutingRecord, RoutingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Endpoints reported by [`GroupAnalytics::top_endpoints`].
const TOP_ENDPOINTS: usize = 10;

/// Example ids kept per error bucket.
const ERROR_EXAMPLES: usize = 3;

/// Running count/sum for averages.
#[derive(Debug, Clone, Copy, Default)]
struct LatencyAccumulator {
    count: u64,
    sum: f64,
}

impl LatencyAccumulator {
    fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
    }

    fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStats {
    pub endpoint: String,
    pub count: usize,
    pub average_latency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPattern {
    /// `HTTP_<code>` or `UNKNOWN_ERROR`.
    pub error_type: String,
    pub count: usize,
    /// Up to three event ids from this bucket.
    pub examples: Vec<String>,
}

/// Aggregates for one group within a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAnalytics {
    pub group_id: String,
    pub time_window_hours: u32,
    pub total_requests: usize,
    /// Fraction in `[0, 1]`.
    pub success_rate: f64,
    /// Mean `duration_ms`.
    pub average_latency: f64,
    pub protocol_breakdown: BTreeMap<Protocol, usize>,
    pub transport_breakdown: BTreeMap<Transport, usize>,
    pub top_endpoints: Vec<EndpointStats>,
    pub error_patterns: Vec<ErrorPattern>,
}

impl GroupAnalytics {
    /// Aggregate `events`; `None` when the slice is empty.
    pub fn compute(
        group_id: &str,
        time_window_hours: u32,
        events: &[&ProtocolEvent],
    ) -> Option<Self> {
        if events.is_empty() {
            return None;
        }

        let mut latency = LatencyAccumulator::default();
        let mut successes = 0usize;
        let mut protocol_breakdown = BTreeMap::new();
        let mut transport_breakdown = BTreeMap::new();
        let mut endpoints: HashMap<&str, LatencyAccumulator> = HashMap::new();
        let mut errors: HashMap<String, (usize, Vec<String>)> = HashMap::new();

        for event in events {
            latency.add(event.duration_ms);
            if event.is_success() {
                successes += 1;
            }
            *protocol_breakdown.entry(event.protocol).or_insert(0) += 1;
            *transport_breakdown.entry(event.transport).or_insert(0) += 1;
            endpoints
                .entry(event.endpoint.as_str())
                .or_default()
                .add(event.duration_ms);

            if event.is_error() {
                let bucket = errors.entry(event.error_type()).or_default();
                bucket.0 += 1;
                if bucket.1.len() < ERROR_EXAMPLES {
                    bucket.1.push(event.id.clone());
                }
            }
        }

        let mut top_endpoints: Vec<EndpointStats> = endpoints
            .into_iter()
            .map(|(endpoint, acc)| EndpointStats {
                endpoint: endpoint.to_string(),
                count: acc.count as usize,
                average_latency: acc.avg(),
            })
            .collect();
        top_endpoints.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.endpoint.cmp(&b.endpoint)));
        top_endpoints.truncate(TOP_ENDPOINTS);

        let mut error_patterns: Vec<ErrorPattern> = errors
            .into_iter()
            .map(|(error_type, (count, examples))| ErrorPattern {
                error_type,
                count,
                examples,
            })
            .collect();
        error_patterns.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.error_type.cmp(&b.error_type))
        });

        Some(Self {
            group_id: group_id.to_string(),
            time_window_hours,
            total_requests: events.len(),
            success_rate: successes as f64 / events.len() as f64,
            average_latency: latency.avg(),
            protocol_breakdown,
            transport_breakdown,
            top_endpoints,
            error_patterns,
        })
    }
}

/// Aggregates over routing decisions within a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingAnalytics {
    pub time_window_hours: u32,
    pub total_decisions: usize,
    pub strategy_breakdown: BTreeMap<RoutingStrategy, usize>,
    pub server_selections: BTreeMap<String, usize>,
    /// Mean over decisions that carry a score; 0 when none do.
    pub average_semantic_score: f64,
}

impl RoutingAnalytics {
    pub fn compute(time_window_hours: u32, records: &[&RoutingRecord]) -> Self {
        let mut strategy_breakdown = BTreeMap::new();
        let mut server_selections = BTreeMap::new();
        let mut scores = LatencyAccumulator::default();

        for record in records {
            let decision = &record.decision;
            *strategy_breakdown.entry(decision.strategy).or_insert(0) += 1;
            *server_selections
                .entry(decision.selected_server.clone())
                .or_insert(0) += 1;
            if let Some(score) = decision.semantic_score {
                scores.add(score);
            }
        }

        Self {
            time_window_hours,
            total_decisions: records.len(),
            strategy_breakdown,
            server_selections,
            average_semantic_score: scores.avg(),
        }
    }
}

/// Point-in-time tracker summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerStats {
    pub total_events: usize,
    pub total_groups: usize,
    pub total_routing_decisions: usize,
    /// Age of the oldest retained event, if any.
    pub oldest_event_age_ms: Option<i64>,
    /// Serialized size of retained events and decisions; an estimate.
    pub memory_usage_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventMetadata, NewProtocolEvent};
    use crate::routing::RoutingDecision;
    use chrono::Utc;

    fn event(id: &str, endpoint: &str, status: Option<u16>, duration: f64) -> ProtocolEvent {
        ProtocolEvent::from_new(
            id.to_string(),
            Utc::now(),
            NewProtocolEvent {
                protocol: Protocol::Http,
                transport: Transport::RequestResponse,
                endpoint: endpoint.to_string(),
                method: Some("GET".to_string()),
                status_code: status,
                duration_ms: duration,
                session_id: "s".to_string(),
                metadata: EventMetadata::default(),
            },
        )
    }

    #[test]
    fn test_empty_group_is_none() {
        assert!(GroupAnalytics::compute("g", 24, &[]).is_none());
    }

    #[test]
    fn test_group_aggregates() {
        let events = vec![
            event("e1", "/a", Some(200), 10.0),
            event("e2", "/a", Some(500), 30.0),
            event("e3", "/b", None, 20.0),
            event("e4", "/a", Some(500), 40.0),
        ];
        let refs: Vec<&ProtocolEvent> = events.iter().collect();
        let analytics = GroupAnalytics::compute("g", 24, &refs).unwrap();

        assert_eq!(analytics.total_requests, 4);
        assert!((analytics.success_rate - 0.5).abs() < 1e-9);
        assert!((analytics.average_latency - 25.0).abs() < 1e-9);
        assert_eq!(analytics.protocol_breakdown[&Protocol::Http], 4);

        assert_eq!(analytics.top_endpoints[0].endpoint, "/a");
        assert_eq!(analytics.top_endpoints[0].count, 3);
        assert!((analytics.top_endpoints[0].average_latency - 80.0 / 3.0).abs() < 1e-9);

        assert_eq!(analytics.error_patterns.len(), 1);
        assert_eq!(analytics.error_patterns[0].error_type, "HTTP_500");
        assert_eq!(analytics.error_patterns[0].count, 2);
        assert_eq!(analytics.error_patterns[0].examples, vec!["e2", "e4"]);
    }

    #[test]
    fn test_error_examples_capped_and_sorted() {
        let mut events: Vec<ProtocolEvent> = (0..5)
            .map(|i| event(&format!("n{i}"), "/x", Some(404), 1.0))
            .collect();
        events.push(event("s1", "/x", Some(503), 1.0));
        let refs: Vec<&ProtocolEvent> = events.iter().collect();
        let analytics = GroupAnalytics::compute("g", 1, &refs).unwrap();

        assert_eq!(analytics.error_patterns[0].error_type, "HTTP_404");
        assert_eq!(analytics.error_patterns[0].count, 5);
        assert_eq!(analytics.error_patterns[0].examples.len(), 3);
        assert_eq!(analytics.error_patterns[1].error_type, "HTTP_503");
    }

    #[test]
    fn test_top_endpoints_limited_to_ten() {
        let events: Vec<ProtocolEvent> = (0..15)
            .map(|i| event(&format!("e{i}"), &format!("/ep{i:02}"), Some(200), 1.0))
            .collect();
        let refs: Vec<&ProtocolEvent> = events.iter().collect();
        let analytics = GroupAnalytics::compute("g", 24, &refs).unwrap();
        assert_eq!(analytics.top_endpoints.len(), 10);
        assert_eq!(analytics.top_endpoints[0].endpoint, "/ep00");
    }

    #[test]
    fn test_routing_aggregates() {
        let records: Vec<RoutingRecord> = vec![
            RoutingDecision::new("r1", RoutingStrategy::Semantic, vec![], "a", "best match")
                .with_semantic_score(0.8),
            RoutingDecision::new("r2", RoutingStrategy::Semantic, vec![], "b", "best match")
                .with_semantic_score(0.6),
            RoutingDecision::new("r3", RoutingStrategy::RoundRobin, vec![], "a", "next"),
        ]
        .into_iter()
        .map(|decision| RoutingRecord {
            decision,
            recorded_at: Utc::now(),
        })
        .collect();
        let refs: Vec<&RoutingRecord> = records.iter().collect();
        let analytics = RoutingAnalytics::compute(24, &refs);

        assert_eq!(analytics.total_decisions, 3);
        assert_eq!(analytics.strategy_breakdown[&RoutingStrategy::Semantic], 2);
        assert_eq!(analytics.server_selections["a"], 2);
        assert!((analytics.average_semantic_score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_routing_without_scores_averages_zero() {
        let analytics = RoutingAnalytics::compute(24, &[]);
        assert_eq!(analytics.total_decisions, 0);
        assert_eq!(analytics.average_semantic_score, 0.0);
    }
}
