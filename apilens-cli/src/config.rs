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

//! Layered configuration: defaults, then TOML file, then `APILENS_*`
//! environment variables. Command-line flags are applied last by `main`.

use anyhow::{Context, Result};
use apilens_index::MatcherConfig;
use apilens_observability::TrackerConfig;
use apilens_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// JSON logs with OpenTelemetry tracing and metrics.
    pub json: bool,
    /// OTLP collector for traces and metrics; implies `json`.
    pub otlp_endpoint: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            otlp_endpoint: None,
        }
    }
}

/// Apilens configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub matcher: MatcherConfig,
    pub tracker: TrackerConfig,
    /// Absent unless an analytics endpoint is configured.
    pub telemetry: Option<TelemetryConfig>,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// File (or defaults when `path` is `None`) with environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Override fields from `APILENS_*` variables that are set. Engine
    /// sections defer to their own `apply_env`.
    pub fn apply_env(&mut self) {
        self.matcher.apply_env();
        self.tracker.apply_env();

        if let Ok(endpoint) = env::var("APILENS_ANALYTICS_ENDPOINT") {
            self.set_analytics_endpoint(endpoint);
        }
        if let Some(telemetry) = self.telemetry.as_mut() {
            telemetry.apply_env();
        }

        if let Ok(level) = env::var("APILENS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(endpoint) = env::var("APILENS_OTLP_ENDPOINT") {
            self.logging.otlp_endpoint = Some(endpoint);
        }
    }

    /// Point telemetry at `endpoint`, keeping any other telemetry settings.
    pub fn set_analytics_endpoint(&mut self, endpoint: String) {
        match self.telemetry.as_mut() {
            Some(telemetry) => telemetry.analytics_endpoint = endpoint,
            None => self.telemetry = Some(TelemetryConfig::new(endpoint)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.matcher.validate().context("invalid [matcher] config")?;
        self.tracker.validate().context("invalid [tracker] config")?;
        if let Some(telemetry) = &self.telemetry {
            telemetry.validate().context("invalid [telemetry] config")?;
        }
        Ok(())
    }
}
