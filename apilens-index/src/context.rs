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

//! Best-effort request context extraction from free text.
//!
//! Nothing here is authoritative. Parse failures degrade to a missing field.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const DEFAULT_METHOD: &str = "GET";

/// Request details recovered from a query string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchContext {
    pub endpoint: Option<String>,
    pub method: String,
    pub parameters: Option<Map<String, Value>>,
}

impl Default for MatchContext {
    fn default() -> Self {
        Self {
            endpoint: None,
            method: DEFAULT_METHOD.to_string(),
            parameters: None,
        }
    }
}

pub struct ContextExtractor {
    endpoint_re: Regex,
    method_re: Regex,
    json_re: Regex,
    query_re: Regex,
}

impl Default for ContextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextExtractor {
    pub fn new() -> Self {
        Self {
            endpoint_re: Regex::new(r"/api(?:/[\w\-.{}:<>]*)*").expect("endpoint regex is valid"),
            method_re: Regex::new(r"(?i)\b(GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS)\b")
                .expect("method regex is valid"),
            json_re: Regex::new(r"(?s)\{.*\}").expect("json regex is valid"),
            query_re: Regex::new(r"\?([^\s#]+)").expect("query regex is valid"),
        }
    }

    pub fn extract(&self, text: &str) -> MatchContext {
        MatchContext {
            endpoint: self.endpoint(text),
            method: self.method(text),
            parameters: self.parameters(text),
        }
    }

    fn endpoint(&self, text: &str) -> Option<String> {
        self.endpoint_re
            .find(text)
            .map(|m| m.as_str().trim_end_matches(['.', ',', ':']).to_string())
    }

    fn method(&self, text: &str) -> String {
        self.method_re
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_ascii_uppercase())
            .unwrap_or_else(|| DEFAULT_METHOD.to_string())
    }

    fn parameters(&self, text: &str) -> Option<Map<String, Value>> {
        self.json_parameters(text)
            .or_else(|| self.query_parameters(text))
    }

    fn json_parameters(&self, text: &str) -> Option<Map<String, Value>> {
        let candidate = self.json_re.find(text)?.as_str();
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) if !map.is_empty() => Some(map),
            _ => None,
        }
    }

    fn query_parameters(&self, text: &str) -> Option<Map<String, Value>> {
        let query = self.query_re.captures(text)?.get(1)?.as_str();
        let params: Map<String, Value> = query
            .split('&')
            .filter_map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                if key.is_empty() {
                    None
                } else {
                    Some((key.to_string(), Value::String(value.to_string())))
                }
            })
            .collect();

        if params.is_empty() {
            None
        } else {
            Some(params)
        }
    }
}
