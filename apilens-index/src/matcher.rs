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

//! Pattern catalog and similarity search.

use crate::context::{ContextExtractor, MatchContext};
use crate::embedding::{EmbeddingProvider, HashEmbeddingProvider};
use crate::error::{IndexError, Result};
use crate::pattern::{default_patterns, ApiPattern, PatternCategory};
use crate::vector::{cosine_similarity, Embedding};
use apilens_core::{time_based_session_id, ObserverSet, SharedClock, SystemClock};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;
use tracing::debug;

/// Default result count for [`PatternMatcher::search`].
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Pattern pairs above this similarity are reported as near-duplicates.
const SIMILAR_PAIR_THRESHOLD: f32 = 0.5;

/// Maximum near-duplicate pairs reported by analytics.
const MAX_SIMILAR_PAIRS: usize = 10;

/// Matcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Embedding vector length.
    pub vector_dimensions: usize,
    /// Default minimum cosine similarity for a match.
    pub similarity_threshold: f32,
    /// Load [`default_patterns`] at construction.
    pub seed_defaults: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            vector_dimensions: 384,
            similarity_threshold: 0.7,
            seed_defaults: true,
        }
    }
}

impl MatcherConfig {
    /// Defaults overridden by the environment, see [`Self::apply_env`].
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `APILENS_VECTOR_DIMENSIONS`,
    /// `APILENS_SIMILARITY_THRESHOLD` and `APILENS_SEED_PATTERNS`.
    /// Unset or unparsable variables leave the field alone.
    pub fn apply_env(&mut self) {
        if let Some(v) = env::var("APILENS_VECTOR_DIMENSIONS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.vector_dimensions = v;
        }
        if let Some(v) = env::var("APILENS_SIMILARITY_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.similarity_threshold = v;
        }
        if let Ok(v) = env::var("APILENS_SEED_PATTERNS") {
            self.seed_defaults = v != "false";
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.vector_dimensions == 0 {
            return Err(IndexError::InvalidConfig(
                "vector_dimensions must be greater than zero".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(IndexError::InvalidConfig(format!(
                "similarity_threshold must be within [-1, 1], got {}",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

/// Per-call search options.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Maximum matches returned (default 5).
    pub limit: Option<usize>,
    /// Overrides the configured similarity threshold.
    pub min_similarity: Option<f32>,
    /// Only consider patterns in these categories.
    pub categories: Option<Vec<PatternCategory>>,
    /// Session id attached to the search notification.
    pub session_id: Option<String>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = Some(min_similarity);
        self
    }

    pub fn categories(mut self, categories: Vec<PatternCategory>) -> Self {
        self.categories = Some(categories);
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// One ranked search hit.
#[derive(Debug, Clone, Serialize)]
pub struct PatternMatch {
    pub pattern: ApiPattern,
    pub similarity: f32,
    /// `similarity * pattern.weight`.
    pub confidence: f32,
    pub context: MatchContext,
}

/// Payload of the search notification.
#[derive(Debug, Clone, Serialize)]
pub struct SearchEvent {
    pub query: String,
    pub matches: Vec<PatternMatch>,
    pub query_vector: Embedding,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
}

/// Two catalog patterns that look alike.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarPatternPair {
    pub first: String,
    pub second: String,
    pub similarity: f32,
}

/// Catalog summary.
#[derive(Debug, Clone, Serialize)]
pub struct PatternAnalytics {
    pub total_patterns: usize,
    /// Every category is present, zero when empty.
    pub categories: BTreeMap<PatternCategory, usize>,
    /// Up to ten most similar pattern pairs with similarity above 0.5.
    pub similar_pairs: Vec<SimilarPatternPair>,
}

/// Receives matcher notifications. All methods default to no-ops.
pub trait MatcherObserver: Send + Sync {
    fn on_pattern_added(&self, _pattern: &ApiPattern) {}
    fn on_pattern_removed(&self, _id: &str) {}
    fn on_search(&self, _event: &SearchEvent) {}
}

/// Pattern registry with vector similarity search.
pub struct PatternMatcher {
    config: MatcherConfig,
    provider: Arc<dyn EmbeddingProvider>,
    extractor: ContextExtractor,
    patterns: RwLock<BTreeMap<String, ApiPattern>>,
    observers: ObserverSet<dyn MatcherObserver>,
    clock: SharedClock,
}

impl PatternMatcher {
    /// Create a matcher backed by [`HashEmbeddingProvider`].
    pub fn new(config: MatcherConfig) -> Result<Self> {
        config.validate()?;
        let provider = Arc::new(HashEmbeddingProvider::new(config.vector_dimensions)?);
        Self::with_provider(config, provider)
    }

    /// Create a matcher with a custom embedding provider.
    pub fn with_provider(
        config: MatcherConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        config.validate()?;
        if provider.dimension() != config.vector_dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: config.vector_dimensions,
                actual: provider.dimension(),
            });
        }

        let matcher = Self {
            config,
            provider,
            extractor: ContextExtractor::new(),
            patterns: RwLock::new(BTreeMap::new()),
            observers: ObserverSet::new(),
            clock: SystemClock::shared(),
        };

        if matcher.config.seed_defaults {
            for pattern in default_patterns() {
                matcher.add_pattern(pattern)?;
            }
        }

        debug!(
            provider = matcher.provider.name(),
            patterns = matcher.len(),
            "pattern matcher ready"
        );
        Ok(matcher)
    }

    /// Replace the clock used for search timestamps.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn subscribe(&self, observer: Arc<dyn MatcherObserver>) {
        self.observers.subscribe(observer);
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Embed `text` with the configured provider, checking its length.
    pub fn embed(&self, text: &str) -> Result<Embedding> {
        let vector = self.provider.embed(text)?;
        self.check_dimension(&vector)?;
        Ok(vector)
    }

    /// Insert or replace a pattern by id. Missing vectors are derived from
    /// `pattern + " " + description`.
    pub fn add_pattern(&self, mut pattern: ApiPattern) -> Result<()> {
        if !(pattern.weight.is_finite() && pattern.weight > 0.0) {
            return Err(IndexError::InvalidPattern {
                id: pattern.id,
                reason: format!("weight must be positive, got {}", pattern.weight),
            });
        }

        match &pattern.vector {
            Some(vector) => self.check_dimension(vector)?,
            None => pattern.vector = Some(self.embed(&pattern.embedding_text())?),
        }

        let replaced = self
            .patterns
            .write()
            .insert(pattern.id.clone(), pattern.clone())
            .is_some();
        debug!(id = %pattern.id, category = %pattern.category, replaced, "pattern added");

        self.observers.notify(|o| o.on_pattern_added(&pattern));
        Ok(())
    }

    /// Remove a pattern. Returns whether it existed.
    pub fn remove_pattern(&self, id: &str) -> bool {
        let removed = self.patterns.write().remove(id).is_some();
        if removed {
            debug!(id, "pattern removed");
            self.observers.notify(|o| o.on_pattern_removed(id));
        }
        removed
    }

    pub fn get_pattern(&self, id: &str) -> Option<ApiPattern> {
        self.patterns.read().get(id).cloned()
    }

    /// All patterns, ordered by id.
    pub fn patterns(&self) -> Vec<ApiPattern> {
        self.patterns.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.read().is_empty()
    }

    /// Rank catalog patterns against a free-text query.
    ///
    /// An empty result is not an error.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<PatternMatch>> {
        let query_vector = self.embed(query)?;
        let min_similarity = options
            .min_similarity
            .unwrap_or(self.config.similarity_threshold);
        let limit = options.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        let context = self.extractor.extract(query);

        let mut matches = Vec::new();
        {
            let patterns = self.patterns.read();
            for pattern in patterns.values() {
                if let Some(categories) = &options.categories {
                    if !categories.contains(&pattern.category) {
                        continue;
                    }
                }
                let Some(vector) = &pattern.vector else {
                    continue;
                };

                let similarity = cosine_similarity(&query_vector, vector)?;
                if similarity >= min_similarity {
                    matches.push(PatternMatch {
                        pattern: pattern.clone(),
                        similarity,
                        confidence: similarity * pattern.weight,
                        context: context.clone(),
                    });
                }
            }
        }

        matches.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.pattern.id.cmp(&b.pattern.id))
        });
        matches.truncate(limit);

        let timestamp = self.clock.now();
        let event = SearchEvent {
            query: query.to_string(),
            matches: matches.clone(),
            query_vector,
            timestamp,
            session_id: options
                .session_id
                .clone()
                .unwrap_or_else(|| time_based_session_id(timestamp)),
        };
        debug!(
            session_id = %event.session_id,
            matches = matches.len(),
            min_similarity,
            "pattern search"
        );
        self.observers.notify(|o| o.on_search(&event));

        Ok(matches)
    }

    /// Catalog size, per-category counts, and the most similar pattern pairs.
    pub fn pattern_analytics(&self) -> Result<PatternAnalytics> {
        let patterns = self.patterns.read();

        let mut categories: BTreeMap<PatternCategory, usize> =
            PatternCategory::ALL.iter().map(|c| (*c, 0)).collect();
        for pattern in patterns.values() {
            *categories.entry(pattern.category).or_insert(0) += 1;
        }

        let entries: Vec<&ApiPattern> = patterns.values().collect();
        let mut similar_pairs = Vec::new();
        for (i, first) in entries.iter().enumerate() {
            for second in &entries[i + 1..] {
                let (Some(a), Some(b)) = (&first.vector, &second.vector) else {
                    continue;
                };
                let similarity = cosine_similarity(a, b)?;
                if similarity > SIMILAR_PAIR_THRESHOLD {
                    similar_pairs.push(SimilarPatternPair {
                        first: first.id.clone(),
                        second: second.id.clone(),
                        similarity,
                    });
                }
            }
        }
        similar_pairs.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        similar_pairs.truncate(MAX_SIMILAR_PAIRS);

        Ok(PatternAnalytics {
            total_patterns: patterns.len(),
            categories,
            similar_pairs,
        })
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.config.vector_dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.config.vector_dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}
