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

//! Delivery of journey batches to the analytics collector.

use crate::error::{Result, TelemetryError};
use crate::journey::JourneyBatch;
use async_trait::async_trait;
use std::time::Duration;

/// Sends one batch. Any non-`Ok` result counts as a failed flush.
#[async_trait]
pub trait CollectorTransport: Send + Sync {
    async fn send(&self, batch: &JourneyBatch) -> Result<()>;

    fn name(&self) -> &str {
        "custom"
    }
}

/// Posts batches as JSON over HTTP with optional bearer auth.
#[derive(Debug, Clone)]
pub struct HttpCollector {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpCollector {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(TelemetryError::InvalidConfig(
                "analytics_endpoint must not be empty".to_string(),
            ));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            endpoint,
            api_key,
            client: builder.build()?,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn build_request(&self, batch: &JourneyBatch) -> reqwest::RequestBuilder {
        let request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(batch);
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {key}")),
            None => request,
        }
    }
}

#[async_trait]
impl CollectorTransport for HttpCollector {
    async fn send(&self, batch: &JourneyBatch) -> Result<()> {
        let response = self.build_request(batch).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}
