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

//! Subcommand bodies. Each returns a JSON-serializable result for `main`
//! to print.

use crate::config::AppConfig;
use crate::observer::MetricsObserver;
use anyhow::{bail, Context, Result};
use apilens_index::{MatchContext, PatternAnalytics, PatternCategory, PatternMatcher, SearchOptions};
use apilens_observability::{
    GroupAnalytics, NewProtocolEvent, ProtocolTracker, RoutingAnalytics, RoutingDecision,
    TrackerStats,
};
use apilens_telemetry::{JourneyBatcher, MilestoneType, TelemetryStats};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One ranked search hit, without the pattern vector.
#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub id: String,
    pub category: PatternCategory,
    pub description: String,
    pub similarity: f32,
    pub confidence: f32,
    pub context: MatchContext,
}

pub fn build_matcher(
    config: &AppConfig,
    observer: &Arc<MetricsObserver>,
) -> Result<PatternMatcher> {
    let matcher =
        PatternMatcher::new(config.matcher.clone()).context("failed to build matcher")?;
    matcher.subscribe(observer.clone());
    Ok(matcher)
}

pub fn run_match(
    config: &AppConfig,
    observer: &Arc<MetricsObserver>,
    query: &str,
    options: &SearchOptions,
) -> Result<Vec<MatchSummary>> {
    let matcher = build_matcher(config, observer)?;
    let matches = matcher.search(query, options)?;
    Ok(matches
        .into_iter()
        .map(|m| MatchSummary {
            id: m.pattern.id,
            category: m.pattern.category,
            description: m.pattern.description,
            similarity: m.similarity,
            confidence: m.confidence,
            context: m.context,
        })
        .collect())
}

pub fn run_patterns(
    config: &AppConfig,
    observer: &Arc<MetricsObserver>,
) -> Result<PatternAnalytics> {
    let matcher = build_matcher(config, observer)?;
    Ok(matcher.pattern_analytics()?)
}

/// A replay line: a protocol event or a routing decision.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ReplayRecord {
    Event(NewProtocolEvent),
    Routing(RoutingDecision),
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub events: usize,
    pub routing_decisions: usize,
    pub stats: TrackerStats,
    pub group: Option<GroupAnalytics>,
    pub routing: RoutingAnalytics,
}

/// Feed JSON lines into a fresh tracker. Blank lines are skipped.
pub async fn run_replay(
    config: &AppConfig,
    observer: &Arc<MetricsObserver>,
    path: &Path,
    group: Option<&str>,
    window_hours: u32,
) -> Result<ReplayReport> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let tracker =
        ProtocolTracker::new(config.tracker.clone()).context("failed to build tracker")?;
    tracker.subscribe(observer.clone());

    let mut events = 0;
    let mut routing_decisions = 0;
    for (index, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ReplayRecord = serde_json::from_str(&line).with_context(|| {
            format!(
                "{}:{}: not a protocol event or routing decision",
                path.display(),
                index + 1
            )
        })?;
        match record {
            ReplayRecord::Event(new) => {
                let event = tracker.track_event(new);
                if let Some(group) = group {
                    tracker.add_event_to_group(&event.id, group)?;
                }
                events += 1;
            }
            ReplayRecord::Routing(decision) => {
                tracker.record_routing_decision(decision);
                routing_decisions += 1;
            }
        }
    }
    info!(events, routing_decisions, file = %path.display(), "replay loaded");

    let report = ReplayReport {
        events,
        routing_decisions,
        stats: tracker.stats(),
        group: group.and_then(|g| tracker.group_analytics(g, window_hours)),
        routing: tracker.routing_analytics(window_hours),
    };
    tracker.shutdown().await;
    Ok(report)
}

/// Send one journey progression and one milestone, then shut down.
pub async fn run_emit(
    config: &AppConfig,
    observer: &Arc<MetricsObserver>,
    from: &str,
    to: &str,
    milestone: MilestoneType,
) -> Result<TelemetryStats> {
    let Some(telemetry) = config.telemetry.clone() else {
        bail!("no analytics endpoint configured (set [telemetry] analytics_endpoint or --endpoint)");
    };

    let batcher = Arc::new(JourneyBatcher::new(telemetry).context("failed to build batcher")?);
    batcher.subscribe(observer.clone());
    batcher.start();

    batcher.track_journey_progression(from, to, Map::new()).await;
    batcher.track_milestone(milestone, Map::new()).await;

    if let Err(e) = batcher.shutdown().await {
        tracing::warn!(error = %e, "final flush failed");
    }
    Ok(batcher.stats())
}
