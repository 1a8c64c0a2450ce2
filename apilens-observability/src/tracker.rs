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

//! The protocol event tracker.
//!
//! Events, group membership and routing decisions live behind one lock.
//! A periodic sweep drops anything older than the retention window, and
//! an overflowing store is swept immediately on insert.

use crate::analytics::{GroupAnalytics, RoutingAnalytics, TrackerStats};
use crate::error::{Result, TrackerError};
use crate::event::{
    GrpcCall, HttpRequest, NewProtocolEvent, ProtocolEvent, SseStream, StdioCommunication,
    WebSocketConnection,
};
use crate::routing::{RoutingDecision, RoutingRecord};
use apilens_core::{generate_id, BackgroundTask, ObserverSet, SharedClock, SystemClock};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::env;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

/// Default analytics window.
pub const DEFAULT_TIME_WINDOW_HOURS: u32 = 24;

/// Tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Store size that triggers an immediate sweep.
    pub max_events: usize,
    /// Period of the background sweep.
    pub cleanup_interval_ms: u64,
    /// Events and routing decisions older than this are dropped.
    pub retention_hours: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_events: 10_000,
            cleanup_interval_ms: 300_000,
            retention_hours: 24,
        }
    }
}

impl TrackerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `APILENS_MAX_EVENTS`,
    /// `APILENS_CLEANUP_INTERVAL_MS` and `APILENS_RETENTION_HOURS`.
    pub fn apply_env(&mut self) {
        fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
            env::var(key).ok().and_then(|v| v.parse().ok())
        }
        if let Some(v) = parsed("APILENS_MAX_EVENTS") {
            self.max_events = v;
        }
        if let Some(v) = parsed("APILENS_CLEANUP_INTERVAL_MS") {
            self.cleanup_interval_ms = v;
        }
        if let Some(v) = parsed("APILENS_RETENTION_HOURS") {
            self.retention_hours = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_events == 0 {
            return Err(TrackerError::InvalidConfig(
                "max_events must be greater than zero".to_string(),
            ));
        }
        if self.cleanup_interval_ms == 0 {
            return Err(TrackerError::InvalidConfig(
                "cleanup_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.retention_hours == 0 {
            return Err(TrackerError::InvalidConfig(
                "retention_hours must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

/// Outcome of one eviction sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Events older than the retention window.
    pub expired_events: usize,
    /// Events dropped oldest-first to get back under `max_events`.
    pub overflow_evicted: usize,
    /// Groups deleted because their last event went away.
    pub removed_groups: Vec<String>,
    pub expired_routing_decisions: usize,
    pub remaining_events: usize,
    pub timestamp: DateTime<Utc>,
}

impl CleanupReport {
    pub fn evicted_events(&self) -> usize {
        self.expired_events + self.overflow_evicted
    }

    pub fn is_empty(&self) -> bool {
        self.evicted_events() == 0
            && self.removed_groups.is_empty()
            && self.expired_routing_decisions == 0
    }
}

/// Receives tracker notifications. All methods default to no-ops.
pub trait TrackerObserver: Send + Sync {
    fn on_event(&self, _event: &ProtocolEvent) {}
    fn on_group_updated(&self, _group_id: &str, _event_id: &str) {}
    fn on_routing_decision(&self, _record: &RoutingRecord) {}
    fn on_cleanup(&self, _report: &CleanupReport) {}
}

#[derive(Debug, Default)]
struct TrackerState {
    events: HashMap<String, ProtocolEvent>,
    /// Event ids in insertion order.
    order: VecDeque<String>,
    groups: HashMap<String, HashSet<String>>,
    /// event id -> groups referencing it
    memberships: HashMap<String, HashSet<String>>,
    routing: HashMap<String, RoutingRecord>,
}

impl TrackerState {
    /// Drop one event and its group references, collecting groups left empty.
    fn remove_event(&mut self, id: &str, removed_groups: &mut Vec<String>) -> bool {
        if self.events.remove(id).is_none() {
            return false;
        }
        if let Some(groups) = self.memberships.remove(id) {
            for group_id in groups {
                let now_empty = match self.groups.get_mut(&group_id) {
                    Some(members) => {
                        members.remove(id);
                        members.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    self.groups.remove(&group_id);
                    removed_groups.push(group_id);
                }
            }
        }
        true
    }

    fn sweep(
        &mut self,
        cutoff: DateTime<Utc>,
        max_events: usize,
        now: DateTime<Utc>,
    ) -> CleanupReport {
        let mut removed_groups = Vec::new();

        let expired: Vec<String> = self
            .events
            .values()
            .filter(|e| e.timestamp < cutoff)
            .map(|e| e.id.clone())
            .collect();
        for id in &expired {
            self.remove_event(id, &mut removed_groups);
        }
        if !expired.is_empty() {
            let events = &self.events;
            self.order.retain(|id| events.contains_key(id));
        }

        let mut overflow_evicted = 0;
        while self.events.len() > max_events {
            let Some(id) = self.order.pop_front() else {
                break;
            };
            if self.remove_event(&id, &mut removed_groups) {
                overflow_evicted += 1;
            }
        }

        let routing_before = self.routing.len();
        self.routing.retain(|_, r| r.recorded_at >= cutoff);

        removed_groups.sort();
        CleanupReport {
            expired_events: expired.len(),
            overflow_evicted,
            removed_groups,
            expired_routing_decisions: routing_before - self.routing.len(),
            remaining_events: self.events.len(),
            timestamp: now,
        }
    }
}

/// In-memory multi-protocol event store with grouping and routing analytics.
pub struct ProtocolTracker {
    config: TrackerConfig,
    state: RwLock<TrackerState>,
    observers: ObserverSet<dyn TrackerObserver>,
    clock: SharedClock,
    sweeper: Mutex<Option<BackgroundTask>>,
}

impl ProtocolTracker {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: RwLock::new(TrackerState::default()),
            observers: ObserverSet::new(),
            clock: SystemClock::shared(),
            sweeper: Mutex::new(None),
        })
    }

    /// Replace the clock used for timestamps and windows.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn subscribe(&self, observer: Arc<dyn TrackerObserver>) {
        self.observers.subscribe(observer);
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn retention_hours(&self) -> u32 {
        self.config.retention_hours
    }

    /// Store an event, stamping its id and timestamp.
    ///
    /// Exceeding `max_events` runs the eviction sweep before returning.
    pub fn track_event(&self, new: NewProtocolEvent) -> ProtocolEvent {
        let now = self.clock.now();
        let id = generate_id(new.protocol.as_str(), now);
        let event = ProtocolEvent::from_new(id, now, new);

        let overflowing = {
            let mut state = self.state.write();
            state.order.push_back(event.id.clone());
            state.events.insert(event.id.clone(), event.clone());
            state.events.len() > self.config.max_events
        };
        debug!(
            id = %event.id,
            protocol = %event.protocol,
            endpoint = %event.endpoint,
            status = ?event.status_code,
            "protocol event tracked"
        );

        self.observers.notify(|o| o.on_event(&event));

        if overflowing {
            self.cleanup();
        }
        event
    }

    pub fn track_http_request(&self, request: HttpRequest) -> ProtocolEvent {
        self.track_event(request.into())
    }

    pub fn track_sse_stream(&self, stream: SseStream) -> ProtocolEvent {
        self.track_event(stream.into())
    }

    pub fn track_websocket_connection(&self, connection: WebSocketConnection) -> ProtocolEvent {
        self.track_event(connection.into())
    }

    pub fn track_stdio_communication(&self, communication: StdioCommunication) -> ProtocolEvent {
        self.track_event(communication.into())
    }

    pub fn track_grpc_call(&self, call: GrpcCall) -> ProtocolEvent {
        self.track_event(call.into())
    }

    pub fn get_event(&self, id: &str) -> Option<ProtocolEvent> {
        self.state.read().events.get(id).cloned()
    }

    /// Add a stored event to a group, creating the group if needed.
    pub fn add_event_to_group(&self, event_id: &str, group_id: &str) -> Result<()> {
        {
            let mut state = self.state.write();
            if !state.events.contains_key(event_id) {
                return Err(TrackerError::UnknownEvent(event_id.to_string()));
            }
            state
                .groups
                .entry(group_id.to_string())
                .or_default()
                .insert(event_id.to_string());
            state
                .memberships
                .entry(event_id.to_string())
                .or_default()
                .insert(group_id.to_string());
        }
        debug!(event_id, group_id, "event grouped");

        self.observers.notify(|o| o.on_group_updated(group_id, event_id));
        Ok(())
    }

    /// Events in a group, oldest first.
    pub fn group_events(&self, group_id: &str) -> Vec<ProtocolEvent> {
        let state = self.state.read();
        let Some(members) = state.groups.get(group_id) else {
            return Vec::new();
        };
        let mut events: Vec<ProtocolEvent> = members
            .iter()
            .filter_map(|id| state.events.get(id).cloned())
            .collect();
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        events
    }

    /// Delete a group. Its events stay in the store.
    pub fn remove_group(&self, group_id: &str) -> bool {
        let mut state = self.state.write();
        let Some(members) = state.groups.remove(group_id) else {
            return false;
        };
        for id in members {
            let now_empty = match state.memberships.get_mut(&id) {
                Some(groups) => {
                    groups.remove(group_id);
                    groups.is_empty()
                }
                None => false,
            };
            if now_empty {
                state.memberships.remove(&id);
            }
        }
        true
    }

    /// Store a routing decision by request id, replacing any earlier one.
    pub fn record_routing_decision(&self, decision: RoutingDecision) -> RoutingRecord {
        let record = RoutingRecord {
            decision,
            recorded_at: self.clock.now(),
        };
        self.state
            .write()
            .routing
            .insert(record.decision.request_id.clone(), record.clone());
        debug!(
            request_id = %record.decision.request_id,
            strategy = %record.decision.strategy,
            server = %record.decision.selected_server,
            "routing decision recorded"
        );

        self.observers.notify(|o| o.on_routing_decision(&record));
        record
    }

    /// The stored decision for a request, if still retained.
    pub fn recent_routing_decision(&self, request_id: &str) -> Option<RoutingRecord> {
        self.state.read().routing.get(request_id).cloned()
    }

    /// Analytics over a group's events from the last `time_window_hours`.
    ///
    /// `None` when the group is unknown or nothing falls in the window.
    pub fn group_analytics(&self, group_id: &str, time_window_hours: u32) -> Option<GroupAnalytics> {
        let cutoff = self.window_start(time_window_hours);
        let state = self.state.read();
        let members = state.groups.get(group_id)?;

        let mut events: Vec<&ProtocolEvent> = members
            .iter()
            .filter_map(|id| state.events.get(id))
            .filter(|e| e.timestamp >= cutoff)
            .collect();
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        GroupAnalytics::compute(group_id, time_window_hours, &events)
    }

    /// Analytics over routing decisions recorded in the last `time_window_hours`.
    pub fn routing_analytics(&self, time_window_hours: u32) -> RoutingAnalytics {
        let cutoff = self.window_start(time_window_hours);
        let state = self.state.read();
        let records: Vec<&RoutingRecord> = state
            .routing
            .values()
            .filter(|r| r.recorded_at >= cutoff)
            .collect();
        RoutingAnalytics::compute(time_window_hours, &records)
    }

    pub fn stats(&self) -> TrackerStats {
        let now = self.clock.now();
        let state = self.state.read();

        let oldest_event_age_ms = state
            .events
            .values()
            .map(|e| e.timestamp)
            .min()
            .map(|oldest| (now - oldest).num_milliseconds());

        let memory_usage_bytes = state
            .events
            .values()
            .map(|e| serde_json::to_vec(e).map(|b| b.len()).unwrap_or(0))
            .chain(
                state
                    .routing
                    .values()
                    .map(|r| serde_json::to_vec(r).map(|b| b.len()).unwrap_or(0)),
            )
            .sum();

        TrackerStats {
            total_events: state.events.len(),
            total_groups: state.groups.len(),
            total_routing_decisions: state.routing.len(),
            oldest_event_age_ms,
            memory_usage_bytes,
        }
    }

    /// Run the eviction sweep now.
    pub fn cleanup(&self) -> CleanupReport {
        let now = self.clock.now();
        let cutoff = self.window_start_at(now, self.config.retention_hours);
        let report = self
            .state
            .write()
            .sweep(cutoff, self.config.max_events, now);

        if report.is_empty() {
            debug!(remaining = report.remaining_events, "cleanup found nothing to evict");
        } else {
            info!(
                expired = report.expired_events,
                overflow = report.overflow_evicted,
                groups = report.removed_groups.len(),
                routing = report.expired_routing_decisions,
                remaining = report.remaining_events,
                "tracker cleanup"
            );
        }

        self.observers.notify(|o| o.on_cleanup(&report));
        report
    }

    /// Start the periodic sweep. Must be called inside a tokio runtime.
    /// A second call replaces the running task.
    pub fn start_cleanup(self: &Arc<Self>) {
        let tracker: Weak<Self> = Arc::downgrade(self);
        let task = BackgroundTask::spawn_interval(
            "tracker-cleanup",
            self.config.cleanup_interval(),
            move || {
                let tracker = tracker.clone();
                async move {
                    if let Some(tracker) = tracker.upgrade() {
                        tracker.cleanup();
                    }
                }
            },
        );
        info!(interval_ms = self.config.cleanup_interval_ms, "tracker cleanup scheduled");
        // Dropping a replaced task cancels it.
        *self.sweeper.lock() = Some(task);
    }

    pub fn is_cleanup_running(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .map(BackgroundTask::is_running)
            .unwrap_or(false)
    }

    /// Stop the periodic sweep and run one final pass.
    pub async fn shutdown(&self) -> CleanupReport {
        let task = self.sweeper.lock().take();
        if let Some(task) = task {
            task.stop().await;
        }
        info!("tracker shut down");
        self.cleanup()
    }

    fn window_start(&self, hours: u32) -> DateTime<Utc> {
        self.window_start_at(self.clock.now(), hours)
    }

    fn window_start_at(&self, now: DateTime<Utc>, hours: u32) -> DateTime<Utc> {
        now - ChronoDuration::hours(i64::from(hours))
    }
}

impl std::fmt::Debug for ProtocolTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ProtocolTracker")
            .field("config", &self.config)
            .field("events", &state.events.len())
            .field("groups", &state.groups.len())
            .field("routing_decisions", &state.routing.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Protocol, Transport};
    use crate::routing::RoutingStrategy;
    use apilens_core::{Clock, ManualClock};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tracker_with_clock(config: TrackerConfig) -> (ProtocolTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let tracker = ProtocolTracker::new(config)
            .unwrap()
            .with_clock(clock.clone());
        (tracker, clock)
    }

    fn http(endpoint: &str, status: u16, duration_ms: f64) -> HttpRequest {
        HttpRequest {
            endpoint: endpoint.to_string(),
            method: "get".to_string(),
            status_code: status,
            duration_ms,
            session_id: "s1".to_string(),
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct Counting {
        events: AtomicUsize,
        groups: AtomicUsize,
        routing: AtomicUsize,
        cleanups: AtomicUsize,
    }

    impl TrackerObserver for Counting {
        fn on_event(&self, _event: &ProtocolEvent) {
            self.events.fetch_add(1, Ordering::SeqCst);
        }
        fn on_group_updated(&self, _group_id: &str, _event_id: &str) {
            self.groups.fetch_add(1, Ordering::SeqCst);
        }
        fn on_routing_decision(&self, _record: &RoutingRecord) {
            self.routing.fetch_add(1, Ordering::SeqCst);
        }
        fn on_cleanup(&self, _report: &CleanupReport) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(TrackerConfig::default().validate().is_ok());
        let zero = TrackerConfig {
            max_events: 0,
            ..Default::default()
        };
        assert!(matches!(
            ProtocolTracker::new(zero),
            Err(TrackerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_track_assigns_id_and_timestamp() {
        let (tracker, clock) = tracker_with_clock(TrackerConfig::default());
        let event = tracker.track_http_request(http("/v1/x", 200, 50.0));

        assert!(event.id.starts_with("http_"));
        assert_eq!(event.timestamp, clock.now());
        assert_eq!(event.method.as_deref(), Some("GET"));
        assert_eq!(tracker.get_event(&event.id), Some(event));
    }

    #[test]
    fn test_stdio_and_grpc_wrappers() {
        let tracker = ProtocolTracker::new(TrackerConfig::default()).unwrap();
        let ok = tracker.track_stdio_communication(StdioCommunication {
            command: "tools/list".to_string(),
            success: true,
            session_id: "s".to_string(),
            ..Default::default()
        });
        let failed = tracker.track_stdio_communication(StdioCommunication {
            command: "tools/call".to_string(),
            success: false,
            session_id: "s".to_string(),
            ..Default::default()
        });
        assert_eq!(ok.status_code, Some(200));
        assert_eq!(failed.status_code, Some(500));

        let streaming = tracker.track_grpc_call(GrpcCall {
            service: "search.v1.Search".to_string(),
            method: "Watch".to_string(),
            is_streaming: true,
            session_id: "s".to_string(),
            ..Default::default()
        });
        assert_eq!(streaming.protocol, Protocol::Grpc);
        assert_eq!(streaming.transport, Transport::Streaming);
        assert_eq!(streaming.endpoint, "search.v1.Search/Watch");
    }

    #[test]
    fn test_unknown_event_cannot_be_grouped() {
        let tracker = ProtocolTracker::new(TrackerConfig::default()).unwrap();
        let err = tracker.add_event_to_group("missing", "g").unwrap_err();
        assert!(matches!(err, TrackerError::UnknownEvent(id) if id == "missing"));
        assert!(tracker.group_analytics("g", 24).is_none());
    }

    #[test]
    fn test_notifications() {
        let tracker = ProtocolTracker::new(TrackerConfig::default()).unwrap();
        let counting = Arc::new(Counting::default());
        tracker.subscribe(counting.clone());

        let event = tracker.track_http_request(http("/a", 200, 1.0));
        tracker.add_event_to_group(&event.id, "g").unwrap();
        tracker.record_routing_decision(RoutingDecision::new(
            "req_1",
            RoutingStrategy::Sticky,
            vec!["a".to_string()],
            "a",
            "session affinity",
        ));
        tracker.cleanup();

        assert_eq!(counting.events.load(Ordering::SeqCst), 1);
        assert_eq!(counting.groups.load(Ordering::SeqCst), 1);
        assert_eq!(counting.routing.load(Ordering::SeqCst), 1);
        assert_eq!(counting.cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expired_events_leave_groups() {
        let (tracker, clock) = tracker_with_clock(TrackerConfig::default());
        let old = tracker.track_http_request(http("/old", 200, 1.0));
        tracker.add_event_to_group(&old.id, "stale").unwrap();
        tracker.add_event_to_group(&old.id, "mixed").unwrap();

        clock.advance(ChronoDuration::hours(23));
        let fresh = tracker.track_http_request(http("/new", 200, 1.0));
        tracker.add_event_to_group(&fresh.id, "mixed").unwrap();

        clock.advance(ChronoDuration::hours(2));
        let report = tracker.cleanup();

        assert_eq!(report.expired_events, 1);
        assert_eq!(report.overflow_evicted, 0);
        assert_eq!(report.removed_groups, vec!["stale".to_string()]);
        assert!(tracker.get_event(&old.id).is_none());
        assert_eq!(tracker.group_events("mixed"), vec![fresh]);
        assert_eq!(tracker.stats().total_groups, 1);
    }

    #[test]
    fn test_overflow_sweeps_immediately() {
        let config = TrackerConfig {
            max_events: 3,
            ..Default::default()
        };
        let (tracker, _clock) = tracker_with_clock(config);
        let counting = Arc::new(Counting::default());
        tracker.subscribe(counting.clone());

        let first = tracker.track_http_request(http("/1", 200, 1.0));
        for i in 2..=4 {
            tracker.track_http_request(http(&format!("/{i}"), 200, 1.0));
        }

        assert_eq!(tracker.stats().total_events, 3);
        assert!(tracker.get_event(&first.id).is_none());
        assert_eq!(counting.cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_routing_decisions_expire() {
        let (tracker, clock) = tracker_with_clock(TrackerConfig::default());
        tracker.record_routing_decision(RoutingDecision::new(
            "opaque-id-without-timestamp",
            RoutingStrategy::LeastLoaded,
            vec!["a".to_string(), "b".to_string()],
            "b",
            "lowest load",
        ));
        assert!(tracker
            .recent_routing_decision("opaque-id-without-timestamp")
            .is_some());
        assert_eq!(tracker.routing_analytics(24).total_decisions, 1);

        clock.advance(ChronoDuration::hours(25));
        assert_eq!(tracker.routing_analytics(24).total_decisions, 0);

        let report = tracker.cleanup();
        assert_eq!(report.expired_routing_decisions, 1);
        assert!(tracker
            .recent_routing_decision("opaque-id-without-timestamp")
            .is_none());
    }

    #[test]
    fn test_routing_decision_overwrites_by_request_id() {
        let tracker = ProtocolTracker::new(TrackerConfig::default()).unwrap();
        for server in ["a", "b"] {
            tracker.record_routing_decision(RoutingDecision::new(
                "req",
                RoutingStrategy::RoundRobin,
                vec!["a".to_string(), "b".to_string()],
                server,
                "next in rotation",
            ));
        }
        let analytics = tracker.routing_analytics(24);
        assert_eq!(analytics.total_decisions, 1);
        assert_eq!(analytics.server_selections.get("b"), Some(&1));
    }

    #[test]
    fn test_remove_group_keeps_events() {
        let tracker = ProtocolTracker::new(TrackerConfig::default()).unwrap();
        let event = tracker.track_http_request(http("/a", 200, 1.0));
        tracker.add_event_to_group(&event.id, "g").unwrap();

        assert!(tracker.remove_group("g"));
        assert!(!tracker.remove_group("g"));
        assert!(tracker.get_event(&event.id).is_some());
        assert!(tracker.group_events("g").is_empty());
    }

    #[test]
    fn test_stats() {
        let (tracker, clock) = tracker_with_clock(TrackerConfig::default());
        assert_eq!(tracker.stats().oldest_event_age_ms, None);

        tracker.track_http_request(http("/a", 200, 1.0));
        clock.advance(ChronoDuration::milliseconds(1500));
        tracker.track_http_request(http("/b", 200, 1.0));

        let stats = tracker.stats();
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.oldest_event_age_ms, Some(1500));
        assert!(stats.memory_usage_bytes > 0);
    }

    #[test]
    fn test_apply_env_overrides_retention() {
        std::env::set_var("APILENS_RETENTION_HOURS", "6");
        let mut config = TrackerConfig {
            max_events: 50,
            ..Default::default()
        };
        config.apply_env();
        let from_env = TrackerConfig::from_env();
        std::env::remove_var("APILENS_RETENTION_HOURS");

        assert_eq!(config.retention_hours, 6);
        assert_eq!(config.max_events, 50);
        assert_eq!(from_env.retention_hours, 6);
        assert_eq!(from_env.max_events, 10_000);
    }
}
