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

//! Journey event batching client.
//!
//! Events and milestones are buffered in memory and posted to the collector
//! in batches: when the event buffer reaches `batch_size`, when a high-value
//! milestone arrives, on the flush timer, and on shutdown.
//!
//! A failed flush re-buffers at most `batch_size` events and `batch_size`
//! milestones from the failed payload, newest kept. Anything older is
//! dropped and counted in [`TelemetryStats::dropped`]. Delivery is best
//! effort; there is no durable queue.

use crate::error::{Result, TelemetryError};
use crate::journey::{
    EventData, JourneyBatch, JourneyContext, JourneyEvent, JourneyEventType, JourneyMilestone,
    MilestoneType, Outcome,
};
use crate::transport::{CollectorTransport, HttpCollector};
use apilens_core::{
    time_based_session_id, BackgroundTask, Clock, ObserverSet, SharedClock, SystemClock,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

fn default_batch_size() -> usize {
    10
}

fn default_flush_interval_ms() -> u64 {
    30_000
}

/// Batching client configuration. `analytics_endpoint` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub analytics_endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Buffered events that trigger a flush; also the re-buffer bound.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default)]
    pub environment: Option<String>,
    /// Session used by [`JourneyBatcher::track_journey_progression`].
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl TelemetryConfig {
    pub fn new(analytics_endpoint: impl Into<String>) -> Self {
        Self {
            analytics_endpoint: analytics_endpoint.into(),
            api_key: None,
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            environment: None,
            session_id: None,
            request_timeout_ms: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_flush_interval_ms(mut self, flush_interval_ms: u64) -> Self {
        self.flush_interval_ms = flush_interval_ms;
        self
    }

    /// Read `APILENS_ANALYTICS_ENDPOINT` (required) plus the optional
    /// variables handled by [`Self::apply_env`].
    pub fn from_env() -> Result<Self> {
        let endpoint = env::var("APILENS_ANALYTICS_ENDPOINT").map_err(|_| {
            TelemetryError::InvalidConfig("APILENS_ANALYTICS_ENDPOINT is not set".to_string())
        })?;
        let mut config = Self::new(endpoint);
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `APILENS_API_KEY`, `APILENS_BATCH_SIZE`,
    /// `APILENS_FLUSH_INTERVAL_MS`, `APILENS_ENVIRONMENT`,
    /// `APILENS_SESSION_ID` and `APILENS_REQUEST_TIMEOUT_MS`.
    /// The endpoint is left to the caller.
    pub fn apply_env(&mut self) {
        if let Ok(key) = env::var("APILENS_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(size) = env::var("APILENS_BATCH_SIZE").ok().and_then(|v| v.parse().ok()) {
            self.batch_size = size;
        }
        if let Some(ms) = env::var("APILENS_FLUSH_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.flush_interval_ms = ms;
        }
        if let Ok(v) = env::var("APILENS_ENVIRONMENT") {
            self.environment = Some(v);
        }
        if let Ok(v) = env::var("APILENS_SESSION_ID") {
            self.session_id = Some(v);
        }
        if let Some(ms) = env::var("APILENS_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.request_timeout_ms = Some(ms);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.analytics_endpoint.trim().is_empty() {
            return Err(TelemetryError::InvalidConfig(
                "analytics_endpoint must not be empty".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(TelemetryError::InvalidConfig(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(TelemetryError::InvalidConfig(
                "flush_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Outcome of one non-empty flush.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlushReport {
    pub events: usize,
    pub milestones: usize,
    /// Items put back into the buffer after a failure.
    pub requeued: usize,
    /// Items discarded after a failure.
    pub dropped: usize,
    pub timestamp: DateTime<Utc>,
}

impl FlushReport {
    pub fn batch_size(&self) -> usize {
        self.events + self.milestones
    }
}

/// Lifetime counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetryStats {
    pub flushes: u64,
    pub failed_flushes: u64,
    pub events_sent: u64,
    pub milestones_sent: u64,
    pub dropped: u64,
}

/// Receives batcher notifications. All methods default to no-ops.
pub trait TelemetryObserver: Send + Sync {
    fn on_event(&self, _event: &JourneyEvent) {}
    fn on_milestone(&self, _milestone: &JourneyMilestone) {}
    fn on_flush(&self, _report: &FlushReport) {}
    fn on_error(&self, _error: &TelemetryError, _report: &FlushReport) {}
}

#[derive(Debug, Default)]
struct BatcherState {
    events: Vec<JourneyEvent>,
    milestones: Vec<JourneyMilestone>,
    stats: TelemetryStats,
}

/// Keep the newest `bound` items of a failed payload ahead of `current`.
fn requeue<T>(mut failed: Vec<T>, current: &mut Vec<T>, bound: usize) -> (usize, usize) {
    let dropped = failed.len().saturating_sub(bound);
    let mut kept = failed.split_off(dropped);
    let requeued = kept.len();
    kept.append(current);
    *current = kept;
    (requeued, dropped)
}

/// Buffers journey events and ships them to the collector in batches.
pub struct JourneyBatcher {
    config: TelemetryConfig,
    session_id: String,
    transport: Arc<dyn CollectorTransport>,
    state: RwLock<BatcherState>,
    observers: ObserverSet<dyn TelemetryObserver>,
    clock: SharedClock,
    flusher: Mutex<Option<BackgroundTask>>,
}

impl JourneyBatcher {
    /// Create a batcher posting to `config.analytics_endpoint` over HTTP.
    pub fn new(config: TelemetryConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpCollector::new(
            config.analytics_endpoint.clone(),
            config.api_key.clone(),
            config.request_timeout(),
        )?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a batcher with a custom transport.
    pub fn with_transport(
        config: TelemetryConfig,
        transport: Arc<dyn CollectorTransport>,
    ) -> Result<Self> {
        config.validate()?;
        let clock = SystemClock::shared();
        let session_id = config
            .session_id
            .clone()
            .unwrap_or_else(|| time_based_session_id(clock.now()));
        debug!(transport = transport.name(), %session_id, "journey batcher ready");
        Ok(Self {
            config,
            session_id,
            transport,
            state: RwLock::new(BatcherState::default()),
            observers: ObserverSet::new(),
            clock,
            flusher: Mutex::new(None),
        })
    }

    /// Replace the clock used for stamping.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn subscribe(&self, observer: Arc<dyn TelemetryObserver>) {
        self.observers.subscribe(observer);
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Buffer an event, flushing once `batch_size` events are pending.
    ///
    /// `context.timestamp` is overwritten with the batcher's clock. Flush
    /// failures are logged and reported to observers, never returned.
    pub async fn track(&self, mut event: JourneyEvent) {
        event.context.timestamp = Some(self.clock.now());

        let should_flush = {
            let mut state = self.state.write();
            state.events.push(event.clone());
            state.events.len() >= self.config.batch_size
        };
        debug!(
            event_type = %event.event_type,
            tool = %event.event_data.tool,
            "journey event tracked"
        );

        self.observers.notify(|o| o.on_event(&event));

        if should_flush {
            self.flush_logged("batch full").await;
        }
    }

    /// Buffer a milestone. `prod` and `high_value_lead_captured` flush at once.
    pub async fn track_milestone(
        &self,
        milestone_type: MilestoneType,
        mut metadata: Map<String, Value>,
    ) {
        metadata.insert(
            "timestamp".to_string(),
            Value::String(self.clock.now().to_rfc3339()),
        );
        let milestone = JourneyMilestone {
            milestone_type,
            metadata,
        };

        self.state.write().milestones.push(milestone.clone());
        debug!(milestone = %milestone.milestone_type, "journey milestone tracked");

        self.observers.notify(|o| o.on_milestone(&milestone));

        if milestone.milestone_type.is_high_value() {
            self.flush_logged("high-value milestone").await;
        }
    }

    /// Record a move between journey stages as a `query` event.
    pub async fn track_journey_progression(
        &self,
        from: &str,
        to: &str,
        metadata: Map<String, Value>,
    ) {
        let mut data = EventData::new("journey", "progression").with_result(Outcome::Success);
        data.metadata = metadata;
        data.metadata.insert("from".to_string(), Value::from(from));
        data.metadata.insert("to".to_string(), Value::from(to));

        let mut context = JourneyContext::new(self.session_id.clone());
        context.environment = self.config.environment.clone();

        self.track(JourneyEvent::new(JourneyEventType::Query, data, context))
            .await;
    }

    /// Post everything buffered. `Ok(None)` when there was nothing to send.
    ///
    /// Both buffers are emptied before the request goes out. On failure the
    /// bounded re-buffer runs, observers get `on_error`, and the error is
    /// returned.
    pub async fn flush(&self) -> Result<Option<FlushReport>> {
        let (events, milestones) = {
            let mut state = self.state.write();
            if state.events.is_empty() && state.milestones.is_empty() {
                return Ok(None);
            }
            (
                std::mem::take(&mut state.events),
                std::mem::take(&mut state.milestones),
            )
        };

        let batch = JourneyBatch {
            events,
            milestones,
            timestamp: self.clock.now(),
        };
        let event_count = batch.events.len();
        let milestone_count = batch.milestones.len();

        match self.transport.send(&batch).await {
            Ok(()) => {
                {
                    let mut state = self.state.write();
                    state.stats.flushes += 1;
                    state.stats.events_sent += event_count as u64;
                    state.stats.milestones_sent += milestone_count as u64;
                }
                let report = FlushReport {
                    events: event_count,
                    milestones: milestone_count,
                    requeued: 0,
                    dropped: 0,
                    timestamp: batch.timestamp,
                };
                info!(
                    events = event_count,
                    milestones = milestone_count,
                    "journey batch flushed"
                );
                self.observers.notify(|o| o.on_flush(&report));
                Ok(Some(report))
            }
            Err(err) => {
                let bound = self.config.batch_size;
                let (requeued, dropped) = {
                    let mut state = self.state.write();
                    let (ev_requeued, ev_dropped) = requeue(batch.events, &mut state.events, bound);
                    let (ms_requeued, ms_dropped) =
                        requeue(batch.milestones, &mut state.milestones, bound);
                    let dropped = ev_dropped + ms_dropped;
                    state.stats.failed_flushes += 1;
                    state.stats.dropped += dropped as u64;
                    (ev_requeued + ms_requeued, dropped)
                };
                let report = FlushReport {
                    events: event_count,
                    milestones: milestone_count,
                    requeued,
                    dropped,
                    timestamp: batch.timestamp,
                };
                warn!(
                    error = %err,
                    events = event_count,
                    milestones = milestone_count,
                    requeued,
                    dropped,
                    "journey batch flush failed"
                );
                self.observers.notify(|o| o.on_error(&err, &report));
                Err(err)
            }
        }
    }

    async fn flush_logged(&self, trigger: &str) {
        if let Err(e) = self.flush().await {
            debug!(trigger, error = %e, "flush not delivered");
        }
    }

    /// Buffered events plus milestones.
    pub fn pending_event_count(&self) -> usize {
        let state = self.state.read();
        state.events.len() + state.milestones.len()
    }

    pub fn stats(&self) -> TelemetryStats {
        self.state.read().stats.clone()
    }

    /// Start the periodic flush. Must be called inside a tokio runtime.
    /// A second call replaces the running task.
    pub fn start(self: &Arc<Self>) {
        let batcher: Weak<Self> = Arc::downgrade(self);
        let task = BackgroundTask::spawn_interval(
            "journey-flush",
            self.config.flush_interval(),
            move || {
                let batcher = batcher.clone();
                async move {
                    if let Some(batcher) = batcher.upgrade() {
                        batcher.flush_logged("interval").await;
                    }
                }
            },
        );
        info!(interval_ms = self.config.flush_interval_ms, "journey auto-flush scheduled");
        *self.flusher.lock() = Some(task);
    }

    pub fn is_running(&self) -> bool {
        self.flusher
            .lock()
            .as_ref()
            .map(BackgroundTask::is_running)
            .unwrap_or(false)
    }

    /// Stop the flush timer and send whatever is still buffered.
    pub async fn shutdown(&self) -> Result<Option<FlushReport>> {
        let task = self.flusher.lock().take();
        if let Some(task) = task {
            task.stop().await;
        }
        let result = self.flush().await;
        info!(pending = self.pending_event_count(), "journey batcher shut down");
        result
    }
}

impl std::fmt::Debug for JourneyBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JourneyBatcher")
            .field("endpoint", &self.config.analytics_endpoint)
            .field("transport", &self.transport.name())
            .field("pending", &self.pending_event_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apilens_core::ManualClock;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryTransport {
        fail: AtomicBool,
        batches: Mutex<Vec<JourneyBatch>>,
    }

    #[async_trait]
    impl CollectorTransport for MemoryTransport {
        async fn send(&self, batch: &JourneyBatch) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(TelemetryError::Status { status: 503 });
            }
            self.batches.lock().push(batch.clone());
            Ok(())
        }
    }

    fn batcher(batch_size: usize) -> (JourneyBatcher, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::default());
        let config = TelemetryConfig::new("http://collector.test/ingest").with_batch_size(batch_size);
        let batcher = JourneyBatcher::with_transport(config, transport.clone()).unwrap();
        (batcher, transport)
    }

    fn event(action: &str) -> JourneyEvent {
        JourneyEvent::new(
            JourneyEventType::Query,
            EventData::new("sql", action),
            JourneyContext::new("s1"),
        )
    }

    #[test]
    fn test_config_validation() {
        assert!(TelemetryConfig::new("http://x").validate().is_ok());
        assert!(TelemetryConfig::new("").validate().is_err());
        assert!(TelemetryConfig::new("http://x")
            .with_batch_size(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: TelemetryConfig =
            serde_json::from_str(r#"{"analytics_endpoint":"http://x"}"#).unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.flush_interval_ms, 30_000);
        assert!(serde_json::from_str::<TelemetryConfig>("{}").is_err());
    }

    #[test]
    fn test_requeue_keeps_newest() {
        let mut current = vec![100, 101];
        let (requeued, dropped) = requeue((0..25).collect(), &mut current, 10);
        assert_eq!(requeued, 10);
        assert_eq!(dropped, 15);
        assert_eq!(current, vec![15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 100, 101]);
    }

    #[tokio::test]
    async fn test_empty_flush_is_noop() {
        let (batcher, transport) = batcher(10);
        assert!(batcher.flush().await.unwrap().is_none());
        assert!(transport.batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_track_stamps_timestamp() {
        let (batcher, transport) = batcher(1);
        let clock = Arc::new(ManualClock::starting_now());
        let batcher = batcher.with_clock(clock.clone());

        let mut stale = event("select");
        stale.context.timestamp = Some(clock.now() - chrono::Duration::days(3));
        batcher.track(stale).await;

        let batches = transport.batches.lock();
        assert_eq!(batches[0].events[0].context.timestamp, Some(clock.now()));
    }

    #[tokio::test]
    async fn test_flush_at_batch_size() {
        let (batcher, transport) = batcher(3);
        batcher.track(event("a")).await;
        batcher.track(event("b")).await;
        assert_eq!(batcher.pending_event_count(), 2);
        assert!(transport.batches.lock().is_empty());

        batcher.track(event("c")).await;
        assert_eq!(batcher.pending_event_count(), 0);
        assert_eq!(transport.batches.lock().len(), 1);
        assert_eq!(batcher.stats().events_sent, 3);
    }

    #[tokio::test]
    async fn test_prod_milestone_flushes_immediately() {
        let (batcher, transport) = batcher(10);
        batcher.track(event("a")).await;
        batcher.track_milestone(MilestoneType::Dev, Map::new()).await;
        assert!(transport.batches.lock().is_empty());

        batcher.track_milestone(MilestoneType::Prod, Map::new()).await;
        let batches = transport.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].events.len(), 1);
        assert_eq!(batches[0].milestones.len(), 2);
        assert!(batches[0].milestones[1].metadata.contains_key("timestamp"));
    }

    #[tokio::test]
    async fn test_failure_requeues_and_notifies() {
        #[derive(Default)]
        struct Errors(AtomicUsize);
        impl TelemetryObserver for Errors {
            fn on_error(&self, _error: &TelemetryError, _report: &FlushReport) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (batcher, transport) = batcher(10);
        let errors = Arc::new(Errors::default());
        batcher.subscribe(errors.clone());
        transport.fail.store(true, Ordering::SeqCst);

        batcher.track(event("a")).await;
        let err = batcher.flush().await.unwrap_err();
        assert!(matches!(err, TelemetryError::Status { status: 503 }));
        assert_eq!(batcher.pending_event_count(), 1);
        assert_eq!(errors.0.load(Ordering::SeqCst), 1);
        assert_eq!(batcher.stats().failed_flushes, 1);

        transport.fail.store(false, Ordering::SeqCst);
        let report = batcher.flush().await.unwrap().unwrap();
        assert_eq!(report.events, 1);
        assert_eq!(batcher.pending_event_count(), 0);
    }

    #[tokio::test]
    async fn test_progression_event() {
        let (batcher, transport) = batcher(1);
        batcher
            .track_journey_progression("explore", "adopt", Map::new())
            .await;

        let batches = transport.batches.lock();
        let event = &batches[0].events[0];
        assert_eq!(event.event_type, JourneyEventType::Query);
        assert_eq!(event.event_data.metadata["from"], "explore");
        assert_eq!(event.event_data.metadata["to"], "adopt");
        assert_eq!(event.context.session_id, batcher.session_id());
    }

    #[test]
    fn test_config_from_env() {
        std::env::remove_var("APILENS_ANALYTICS_ENDPOINT");
        assert!(TelemetryConfig::from_env().is_err());

        std::env::set_var("APILENS_ANALYTICS_ENDPOINT", "http://collector");
        std::env::set_var("APILENS_BATCH_SIZE", "4");
        std::env::set_var("APILENS_FLUSH_INTERVAL_MS", "not-a-number");
        let config = TelemetryConfig::from_env();
        std::env::remove_var("APILENS_ANALYTICS_ENDPOINT");
        std::env::remove_var("APILENS_BATCH_SIZE");
        std::env::remove_var("APILENS_FLUSH_INTERVAL_MS");

        let config = config.unwrap();
        assert_eq!(config.analytics_endpoint, "http://collector");
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.flush_interval_ms, 30_000);
    }
}
