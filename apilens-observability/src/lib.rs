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

//! Apilens Observability
//!
//! The protocol event tracker: records HTTP, SSE, WebSocket, STDIO and gRPC
//! traffic under one event shape, groups events for scoped analytics, keeps
//! routing decisions, and bounds memory with a retention sweep.
//!
//! Nothing is persisted. Events older than the retention window, or beyond
//! `max_events` when the store overflows, are gone for good.

pub mod analytics;
pub mod error;
pub mod event;
pub mod routing;
pub mod tracker;

pub use analytics::{
    EndpointStats, ErrorPattern, GroupAnalytics, RoutingAnalytics, TrackerStats,
};
pub use error::{Result, TrackerError};
pub use event::{
    EventMetadata, GrpcCall, HttpRequest, NewProtocolEvent, Protocol, ProtocolEvent, RoutingInfo,
    SseStream, StdioCommunication, Transport, WebSocketConnection,
};
pub use routing::{RoutingDecision, RoutingRecord, RoutingStrategy};
pub use tracker::{
    CleanupReport, ProtocolTracker, TrackerConfig, TrackerObserver, DEFAULT_TIME_WINDOW_HOURS,
};
