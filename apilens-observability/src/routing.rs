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

//! Routing decision records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// How a request was assigned to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStrategy {
    Semantic,
    RoundRobin,
    LeastLoaded,
    Sticky,
}

impl RoutingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingStrategy::Semantic => "semantic",
            RoutingStrategy::RoundRobin => "round-robin",
            RoutingStrategy::LeastLoaded => "least-loaded",
            RoutingStrategy::Sticky => "sticky",
        }
    }
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A routing decision as reported by the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub request_id: String,
    pub strategy: RoutingStrategy,
    pub available_servers: Vec<String>,
    pub selected_server: String,
    pub selection_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_factors: Option<HashMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_score: Option<f64>,
}

impl RoutingDecision {
    pub fn new(
        request_id: impl Into<String>,
        strategy: RoutingStrategy,
        available_servers: Vec<String>,
        selected_server: impl Into<String>,
        selection_reason: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            strategy,
            available_servers,
            selected_server: selected_server.into(),
            selection_reason: selection_reason.into(),
            load_factors: None,
            semantic_score: None,
        }
    }

    pub fn with_load_factors(mut self, load_factors: HashMap<String, f64>) -> Self {
        self.load_factors = Some(load_factors);
        self
    }

    pub fn with_semantic_score(mut self, score: f64) -> Self {
        self.semantic_score = Some(score);
        self
    }
}

/// A stored routing decision with the time the tracker recorded it.
///
/// Retention and analytics windows use `recorded_at`; the request id is
/// treated as opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRecord {
    #[serde(flatten)]
    pub decision: RoutingDecision,
    pub recorded_at: DateTime<Utc>,
}
