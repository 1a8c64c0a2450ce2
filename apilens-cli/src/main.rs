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

//! Apilens CLI

use anyhow::{Context, Result};
use apilens_cli::{commands, AppConfig, MetricsObserver};
use apilens_index::{PatternCategory, SearchOptions};
use apilens_observability::DEFAULT_TIME_WINDOW_HOURS;
use apilens_telemetry::{init_logging, init_telemetry, Metrics, MilestoneType};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "apilens")]
#[command(author, version, about = "API traffic pattern matching and protocol analytics", long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (overrides config file)
    #[arg(long)]
    log_level: Option<String>,

    /// JSON logs with OpenTelemetry layers
    #[arg(long)]
    json_logs: bool,

    /// OTLP endpoint for traces and metrics
    #[arg(long)]
    otlp_endpoint: Option<String>,

    /// Minimum similarity for a pattern match (overrides config file)
    #[arg(long)]
    similarity_threshold: Option<f32>,

    /// Tracker store size that triggers an immediate sweep
    #[arg(long)]
    max_events: Option<usize>,

    /// Analytics collector URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Bearer token for the analytics collector
    #[arg(long)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Match free text against the pattern catalog
    Match {
        query: String,

        /// Maximum matches
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum similarity for this search
        #[arg(long)]
        min_similarity: Option<f32>,

        /// Restrict to categories (repeatable)
        #[arg(long = "category")]
        categories: Vec<PatternCategory>,
    },

    /// Show catalog analytics
    Patterns,

    /// Replay protocol events and routing decisions from a JSON lines file
    Replay {
        file: PathBuf,

        /// Put every replayed event into this group
        #[arg(short, long)]
        group: Option<String>,

        /// Analytics window in hours
        #[arg(long, default_value_t = DEFAULT_TIME_WINDOW_HOURS)]
        window_hours: u32,
    },

    /// Send a journey progression and a milestone to the collector
    Emit {
        #[arg(long, default_value = "explore")]
        from: String,

        #[arg(long, default_value = "adopt")]
        to: String,

        #[arg(long, default_value = "adopt")]
        milestone: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    if let Some(endpoint) = cli.otlp_endpoint {
        config.logging.otlp_endpoint = Some(endpoint);
    }
    if let Some(threshold) = cli.similarity_threshold {
        config.matcher.similarity_threshold = threshold;
    }
    if let Some(max_events) = cli.max_events {
        config.tracker.max_events = max_events;
    }
    if let Some(endpoint) = cli.endpoint {
        config.set_analytics_endpoint(endpoint);
    }
    if let (Some(key), Some(telemetry)) = (cli.api_key, config.telemetry.as_mut()) {
        telemetry.api_key = Some(key);
    }
    config.validate()?;

    let metrics = if config.logging.json || config.logging.otlp_endpoint.is_some() {
        init_telemetry(
            "apilens",
            config.logging.otlp_endpoint.as_deref(),
            &config.logging.level,
        )
            .context("failed to initialize telemetry")?
    } else {
        init_logging(&config.logging.level).context("failed to initialize logging")?;
        Metrics::noop()
    };
    let observer = MetricsObserver::new(Arc::new(metrics));

    match cli.command {
        Commands::Match {
            query,
            limit,
            min_similarity,
            categories,
        } => {
            let mut options = SearchOptions::new();
            options.limit = limit;
            options.min_similarity = min_similarity;
            if !categories.is_empty() {
                options.categories = Some(categories);
            }
            let matches = commands::run_match(&config, &observer, &query, &options)?;
            print_json(&matches)?;
        }
        Commands::Patterns => {
            let analytics = commands::run_patterns(&config, &observer)?;
            print_json(&analytics)?;
        }
        Commands::Replay {
            file,
            group,
            window_hours,
        } => {
            let report =
                commands::run_replay(&config, &observer, &file, group.as_deref(), window_hours)
                    .await?;
            print_json(&report)?;
        }
        Commands::Emit { from, to, milestone } => {
            let milestone = MilestoneType::from(milestone);
            let stats = commands::run_emit(&config, &observer, &from, &to, milestone).await?;
            print_json(&stats)?;
        }
    }

    Ok(())
}
