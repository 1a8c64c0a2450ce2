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

//! Apilens Index Layer
//!
//! A catalog of named API-usage patterns and a similarity matcher that
//! classifies free-text traffic descriptions against it.
//!
//! ## Embeddings
//!
//! Vectors come from an [`EmbeddingProvider`]. The bundled
//! [`HashEmbeddingProvider`] is a bag-of-words hashing stand-in, not a
//! trained model: it only rewards literal token overlap. A real embedding
//! service can be plugged in through [`PatternMatcher::with_provider`]
//! without touching ranking.
//!
//! ## Ranking
//!
//! Candidates are scored by cosine similarity, filtered by a minimum
//! similarity, and ranked by `confidence = similarity * weight`.

pub mod context;
pub mod embedding;
pub mod error;
pub mod matcher;
pub mod pattern;
pub mod vector;

pub use context::{ContextExtractor, MatchContext};
pub use embedding::{EmbeddingProvider, HashEmbeddingProvider};
pub use error::{IndexError, Result};
pub use matcher::{
    MatcherConfig, MatcherObserver, PatternAnalytics, PatternMatch, PatternMatcher, SearchEvent,
    SearchOptions, SimilarPatternPair,
};
pub use pattern::{default_patterns, ApiPattern, PatternCategory};
pub use vector::{cosine_similarity, l2_normalize, magnitude, Embedding};
