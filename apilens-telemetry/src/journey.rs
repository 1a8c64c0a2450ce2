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

//! Journey events and milestones sent to the analytics collector.
//!
//! Field names on the wire are camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of a journey event. Unknown names round-trip through `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JourneyEventType {
    Query,
    SchemaDiscovery,
    Optimization,
    Migration,
    Connection,
    Error,
    Conversion,
    Custom(String),
}

impl JourneyEventType {
    pub fn as_str(&self) -> &str {
        match self {
            JourneyEventType::Query => "query",
            JourneyEventType::SchemaDiscovery => "schema_discovery",
            JourneyEventType::Optimization => "optimization",
            JourneyEventType::Migration => "migration",
            JourneyEventType::Connection => "connection",
            JourneyEventType::Error => "error",
            JourneyEventType::Conversion => "conversion",
            JourneyEventType::Custom(name) => name,
        }
    }
}

impl From<String> for JourneyEventType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "query" => JourneyEventType::Query,
            "schema_discovery" => JourneyEventType::SchemaDiscovery,
            "optimization" => JourneyEventType::Optimization,
            "migration" => JourneyEventType::Migration,
            "connection" => JourneyEventType::Connection,
            "error" => JourneyEventType::Error,
            "conversion" => JourneyEventType::Conversion,
            _ => JourneyEventType::Custom(name),
        }
    }
}

impl From<JourneyEventType> for String {
    fn from(kind: JourneyEventType) -> Self {
        match kind {
            JourneyEventType::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for JourneyEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

/// What happened: tool, action, and how it went.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub tool: String,
    pub action: String,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Outcome>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl EventData {
    pub fn new(tool: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration = Some(duration_ms);
        self
    }

    pub fn with_result(mut self, result: Outcome) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Where it happened. `timestamp` is set by the batcher when tracked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyContext {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl JourneyContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    pub fn with_server(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyEvent {
    pub event_type: JourneyEventType,
    pub event_data: EventData,
    pub context: JourneyContext,
}

impl JourneyEvent {
    pub fn new(event_type: JourneyEventType, event_data: EventData, context: JourneyContext) -> Self {
        Self {
            event_type,
            event_data,
            context,
        }
    }
}

/// Adoption stage reached by a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MilestoneType {
    Explore,
    Adopt,
    Dev,
    Prod,
    LeadCaptured,
    HighValueLeadCaptured,
    Custom(String),
}

impl MilestoneType {
    pub fn as_str(&self) -> &str {
        match self {
            MilestoneType::Explore => "explore",
            MilestoneType::Adopt => "adopt",
            MilestoneType::Dev => "dev",
            MilestoneType::Prod => "prod",
            MilestoneType::LeadCaptured => "lead_captured",
            MilestoneType::HighValueLeadCaptured => "high_value_lead_captured",
            MilestoneType::Custom(name) => name,
        }
    }

    /// Milestones that are flushed as soon as they are tracked.
    pub fn is_high_value(&self) -> bool {
        matches!(self, MilestoneType::Prod | MilestoneType::HighValueLeadCaptured)
    }
}

impl From<String> for MilestoneType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "explore" => MilestoneType::Explore,
            "adopt" => MilestoneType::Adopt,
            "dev" => MilestoneType::Dev,
            "prod" => MilestoneType::Prod,
            "lead_captured" => MilestoneType::LeadCaptured,
            "high_value_lead_captured" => MilestoneType::HighValueLeadCaptured,
            _ => MilestoneType::Custom(name),
        }
    }
}

impl From<MilestoneType> for String {
    fn from(kind: MilestoneType) -> Self {
        match kind {
            MilestoneType::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for MilestoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyMilestone {
    pub milestone_type: MilestoneType,
    /// Free-form; `timestamp` is stamped by the batcher.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Request body posted to the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyBatch {
    pub events: Vec<JourneyEvent>,
    pub milestones: Vec<JourneyMilestone>,
    pub timestamp: DateTime<Utc>,
}

impl JourneyBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.milestones.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len() + self.milestones.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let event = JourneyEvent::new(
            JourneyEventType::SchemaDiscovery,
            EventData::new("inspector", "list_tables")
                .with_duration(12.5)
                .with_result(Outcome::Success),
            JourneyContext::new("s1").with_server("db-1"),
        );
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["eventType"], "schema_discovery");
        assert_eq!(value["eventData"]["tool"], "inspector");
        assert_eq!(value["eventData"]["result"], "success");
        assert_eq!(value["context"]["sessionId"], "s1");
        assert_eq!(value["context"]["serverId"], "db-1");
        assert!(value["context"].get("timestamp").is_none());
    }

    #[test]
    fn test_custom_types_round_trip() {
        let kind: JourneyEventType = serde_json::from_value(json!("hallucination_check")).unwrap();
        assert_eq!(kind, JourneyEventType::Custom("hallucination_check".to_string()));
        assert_eq!(serde_json::to_value(&kind).unwrap(), json!("hallucination_check"));

        let known: MilestoneType = serde_json::from_value(json!("high_value_lead_captured")).unwrap();
        assert_eq!(known, MilestoneType::HighValueLeadCaptured);
    }

    #[test]
    fn test_high_value_milestones() {
        assert!(MilestoneType::Prod.is_high_value());
        assert!(MilestoneType::HighValueLeadCaptured.is_high_value());
        assert!(!MilestoneType::Dev.is_high_value());
        assert!(!MilestoneType::LeadCaptured.is_high_value());
        assert!(!MilestoneType::Custom("prod_like".to_string()).is_high_value());
    }
}
