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

//! Protocol event model.
//!
//! Every observed unit of traffic, whatever its transport, is stored as one
//! [`ProtocolEvent`]. Callers build a [`NewProtocolEvent`] (or one of the
//! per-protocol inputs) and the tracker assigns the id and timestamp.

use crate::routing::RoutingStrategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Sse,
    WebSocket,
    Stdio,
    Grpc,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Sse => "sse",
            Protocol::WebSocket => "websocket",
            Protocol::Stdio => "stdio",
            Protocol::Grpc => "grpc",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    RequestResponse,
    Streaming,
    Bidirectional,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::RequestResponse => "request-response",
            Transport::Streaming => "streaming",
            Transport::Bidirectional => "bidirectional",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing details attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingInfo {
    pub strategy: RoutingStrategy,
    pub selected_server: String,
    pub server_count: usize,
}

/// Free-form event metadata. Unknown keys land in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingInfo>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Event fields supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProtocolEvent {
    pub protocol: Protocol,
    pub transport: Transport,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub duration_ms: f64,
    pub session_id: String,
    #[serde(default)]
    pub metadata: EventMetadata,
}

/// A recorded event. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolEvent {
    pub id: String,
    pub protocol: Protocol,
    pub transport: Transport,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub metadata: EventMetadata,
}

impl ProtocolEvent {
    pub(crate) fn from_new(id: String, timestamp: DateTime<Utc>, new: NewProtocolEvent) -> Self {
        let duration_ms = if new.duration_ms.is_finite() && new.duration_ms > 0.0 {
            new.duration_ms
        } else {
            0.0
        };
        Self {
            id,
            protocol: new.protocol,
            transport: new.transport,
            endpoint: new.endpoint,
            method: new.method,
            status_code: new.status_code,
            duration_ms,
            timestamp,
            session_id: new.session_id,
            metadata: new.metadata,
        }
    }

    /// No status code, or a status code in `[200, 400)`.
    pub fn is_success(&self) -> bool {
        match self.status_code {
            None => true,
            Some(code) => (200..400).contains(&code),
        }
    }

    /// Failed by status code, or carries an error message without any status.
    pub fn is_error(&self) -> bool {
        !self.is_success() || (self.status_code.is_none() && self.metadata.error_message.is_some())
    }

    /// Bucket label for error analytics: `HTTP_<code>` or `UNKNOWN_ERROR`.
    pub fn error_type(&self) -> String {
        match self.status_code {
            Some(code) => format!("HTTP_{code}"),
            None => "UNKNOWN_ERROR".to_string(),
        }
    }
}

/// A plain HTTP request/response exchange.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpRequest {
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub duration_ms: f64,
    pub session_id: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub response_size: Option<u64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub routing: Option<RoutingInfo>,
}

impl From<HttpRequest> for NewProtocolEvent {
    fn from(req: HttpRequest) -> Self {
        NewProtocolEvent {
            protocol: Protocol::Http,
            transport: Transport::RequestResponse,
            endpoint: req.endpoint,
            method: Some(req.method.to_ascii_uppercase()),
            status_code: Some(req.status_code),
            duration_ms: req.duration_ms,
            session_id: req.session_id,
            metadata: EventMetadata {
                user_agent: req.user_agent,
                content_type: req.content_type,
                response_size: req.response_size,
                error_message: req.error_message,
                routing: req.routing,
                extra: Map::new(),
            },
        }
    }
}

/// A server-sent events stream, recorded when it closes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SseStream {
    pub endpoint: String,
    pub duration_ms: f64,
    pub session_id: String,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub events_sent: Option<u64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl From<SseStream> for NewProtocolEvent {
    fn from(stream: SseStream) -> Self {
        let mut extra = Map::new();
        if let Some(count) = stream.events_sent {
            extra.insert("events_sent".to_string(), Value::from(count));
        }
        NewProtocolEvent {
            protocol: Protocol::Sse,
            transport: Transport::Streaming,
            endpoint: stream.endpoint,
            method: Some("GET".to_string()),
            status_code: stream.status_code,
            duration_ms: stream.duration_ms,
            session_id: stream.session_id,
            metadata: EventMetadata {
                content_type: Some("text/event-stream".to_string()),
                error_message: stream.error_message,
                extra,
                ..Default::default()
            },
        }
    }
}

/// A WebSocket connection, recorded when it closes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSocketConnection {
    pub endpoint: String,
    pub duration_ms: f64,
    pub session_id: String,
    #[serde(default)]
    pub messages_sent: Option<u64>,
    #[serde(default)]
    pub messages_received: Option<u64>,
    #[serde(default)]
    pub close_code: Option<u16>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl From<WebSocketConnection> for NewProtocolEvent {
    fn from(conn: WebSocketConnection) -> Self {
        let mut extra = Map::new();
        if let Some(sent) = conn.messages_sent {
            extra.insert("messages_sent".to_string(), Value::from(sent));
        }
        if let Some(received) = conn.messages_received {
            extra.insert("messages_received".to_string(), Value::from(received));
        }
        if let Some(code) = conn.close_code {
            extra.insert("close_code".to_string(), Value::from(code));
        }
        NewProtocolEvent {
            protocol: Protocol::WebSocket,
            transport: Transport::Bidirectional,
            endpoint: conn.endpoint,
            method: None,
            status_code: None,
            duration_ms: conn.duration_ms,
            session_id: conn.session_id,
            metadata: EventMetadata {
                error_message: conn.error_message,
                extra,
                ..Default::default()
            },
        }
    }
}

/// One exchange with a child process over stdin/stdout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StdioCommunication {
    /// Command or tool invoked; stored as the endpoint.
    pub command: String,
    pub duration_ms: f64,
    pub session_id: String,
    pub success: bool,
    #[serde(default)]
    pub bytes_transferred: Option<u64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl From<StdioCommunication> for NewProtocolEvent {
    fn from(io: StdioCommunication) -> Self {
        NewProtocolEvent {
            protocol: Protocol::Stdio,
            transport: Transport::Bidirectional,
            endpoint: io.command,
            method: None,
            status_code: Some(if io.success { 200 } else { 500 }),
            duration_ms: io.duration_ms,
            session_id: io.session_id,
            metadata: EventMetadata {
                response_size: io.bytes_transferred,
                error_message: io.error_message,
                ..Default::default()
            },
        }
    }
}

/// A gRPC call, unary or streaming.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrpcCall {
    pub service: String,
    pub method: String,
    pub duration_ms: f64,
    pub session_id: String,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl From<GrpcCall> for NewProtocolEvent {
    fn from(call: GrpcCall) -> Self {
        NewProtocolEvent {
            protocol: Protocol::Grpc,
            transport: if call.is_streaming {
                Transport::Streaming
            } else {
                Transport::RequestResponse
            },
            endpoint: format!("{}/{}", call.service, call.method),
            method: Some(call.method),
            status_code: call.status_code,
            duration_ms: call.duration_ms,
            session_id: call.session_id,
            metadata: EventMetadata {
                content_type: Some("application/grpc".to_string()),
                error_message: call.error_message,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_with(status: Option<u16>, error: Option<&str>) -> ProtocolEvent {
        let new = NewProtocolEvent {
            protocol: Protocol::Http,
            transport: Transport::RequestResponse,
            endpoint: "/x".to_string(),
            method: None,
            status_code: status,
            duration_ms: 1.0,
            session_id: "s".to_string(),
            metadata: EventMetadata {
                error_message: error.map(str::to_string),
                ..Default::default()
            },
        };
        ProtocolEvent::from_new("id".to_string(), Utc::now(), new)
    }

    #[test]
    fn test_success_classification() {
        assert!(event_with(None, None).is_success());
        assert!(event_with(Some(200), None).is_success());
        assert!(event_with(Some(302), None).is_success());
        assert!(!event_with(Some(404), None).is_success());
        assert!(!event_with(Some(500), None).is_success());
        assert!(!event_with(Some(101), None).is_success());
    }

    #[test]
    fn test_error_classification() {
        assert!(!event_with(None, None).is_error());
        assert!(event_with(None, Some("boom")).is_error());
        assert!(!event_with(Some(200), Some("warning")).is_error());
        assert!(event_with(Some(503), None).is_error());
        assert_eq!(event_with(Some(503), None).error_type(), "HTTP_503");
        assert_eq!(event_with(None, Some("boom")).error_type(), "UNKNOWN_ERROR");
    }

    #[test]
    fn test_negative_duration_clamped() {
        let new = NewProtocolEvent {
            protocol: Protocol::Sse,
            transport: Transport::Streaming,
            endpoint: "/s".to_string(),
            method: None,
            status_code: None,
            duration_ms: -5.0,
            session_id: "s".to_string(),
            metadata: EventMetadata::default(),
        };
        let event = ProtocolEvent::from_new("id".to_string(), Utc::now(), new);
        assert_eq!(event.duration_ms, 0.0);
    }

    #[test]
    fn test_stdio_status_from_success_flag() {
        let ok: NewProtocolEvent = StdioCommunication {
            command: "tools/list".to_string(),
            success: true,
            ..Default::default()
        }
        .into();
        let failed: NewProtocolEvent = StdioCommunication {
            command: "tools/call".to_string(),
            success: false,
            ..Default::default()
        }
        .into();
        assert_eq!(ok.status_code, Some(200));
        assert_eq!(failed.status_code, Some(500));
        assert_eq!(ok.protocol, Protocol::Stdio);
    }

    #[test]
    fn test_grpc_transport_from_streaming_flag() {
        let unary: NewProtocolEvent = GrpcCall {
            service: "users.UserService".to_string(),
            method: "GetUser".to_string(),
            ..Default::default()
        }
        .into();
        let streaming: NewProtocolEvent = GrpcCall {
            service: "users.UserService".to_string(),
            method: "WatchUsers".to_string(),
            is_streaming: true,
            ..Default::default()
        }
        .into();
        assert_eq!(unary.transport, Transport::RequestResponse);
        assert_eq!(streaming.transport, Transport::Streaming);
        assert_eq!(unary.endpoint, "users.UserService/GetUser");
    }

    #[test]
    fn test_http_method_uppercased() {
        let new: NewProtocolEvent = HttpRequest {
            endpoint: "/v1/x".to_string(),
            method: "post".to_string(),
            status_code: 201,
            ..Default::default()
        }
        .into();
        assert_eq!(new.method.as_deref(), Some("POST"));
        assert_eq!(new.transport, Transport::RequestResponse);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Protocol::WebSocket).unwrap(), "\"websocket\"");
        assert_eq!(
            serde_json::to_string(&Transport::RequestResponse).unwrap(),
            "\"request-response\""
        );
        assert_eq!(
            serde_json::to_string(&RoutingStrategy::LeastLoaded).unwrap(),
            "\"least-loaded\""
        );
    }

    #[test]
    fn test_metadata_extra_round_trip() {
        let json = r#"{"user_agent":"curl/8","trace":"abc"}"#;
        let meta: EventMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(meta.extra.get("trace"), Some(&Value::from("abc")));
    }
}
