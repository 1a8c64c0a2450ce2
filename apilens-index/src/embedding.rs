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

//! Text to vector conversion.
//!
//! [`HashEmbeddingProvider`] is a placeholder for a real text-embedding
//! model. It hashes lowercase word tokens into a fixed number of buckets
//! (feature hashing) and L2-normalizes the counts. Two texts only score as
//! similar when they share literal tokens; synonyms, word order and meaning
//! are invisible to it. Swap in a model-backed [`EmbeddingProvider`] when
//! semantic recall matters.

use crate::error::{IndexError, Result};
use crate::vector::{l2_normalize, Embedding};
use regex::Regex;

/// Something that turns text into a fixed-length vector.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `text`. The result must have exactly [`dimension`](Self::dimension) entries.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Output vector length.
    fn dimension(&self) -> usize;

    /// Short provider name for logs.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Bag-of-words feature hashing embedder.
pub struct HashEmbeddingProvider {
    dimensions: usize,
    token_re: Regex,
}

impl HashEmbeddingProvider {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(IndexError::InvalidConfig(
                "vector dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            dimensions,
            token_re: Regex::new(r"\w+").expect("token regex is valid"),
        })
    }

    /// Lowercase word tokens of `text`, in order of appearance.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.token_re
            .find_iter(&lowered)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Bucket index for a token.
    pub fn bucket(&self, token: &str) -> usize {
        string_hash(token).unsigned_abs() as usize % self.dimensions
    }
}

impl EmbeddingProvider for HashEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens = self.tokenize(text);
        if tokens.is_empty() {
            return Ok(vector);
        }

        let weight = 1.0 / (tokens.len() as f32).sqrt();
        for token in &tokens {
            vector[self.bucket(token)] += weight;
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hash-bow"
    }
}

/// Multiply-by-31 string hash over UTF-16 code units with 32-bit wraparound.
pub fn string_hash(s: &str) -> i32 {
    s.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(unit as i32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{cosine_similarity, magnitude};

    #[test]
    fn test_string_hash_known_values() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        assert_eq!(string_hash("ab"), 97 * 31 + 98);
        // Overflow wraps instead of panicking.
        let _ = string_hash("a fairly long token that overflows thirty-two bits");
    }

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        let provider = HashEmbeddingProvider::new(16).unwrap();
        let tokens = provider.tokenize("Authorization: Bearer ABC-123");
        assert_eq!(tokens, vec!["authorization", "bearer", "abc", "123"]);
    }

    #[test]
    fn test_embed_is_unit_length() {
        let provider = HashEmbeddingProvider::new(384).unwrap();
        let v = provider.embed("GET /api/users?page=2").unwrap();
        assert_eq!(v.len(), 384);
        assert!((magnitude(&v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_embed_empty_text_is_zero_vector() {
        let provider = HashEmbeddingProvider::new(8).unwrap();
        let v = provider.embed("  ,;  ").unwrap();
        assert_eq!(v, vec![0.0; 8]);
    }

    #[test]
    fn test_embed_deterministic() {
        let provider = HashEmbeddingProvider::new(384).unwrap();
        let a = provider.embed("stream events over websocket").unwrap();
        let b = provider.embed("stream events over websocket").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_case_insensitive() {
        let provider = HashEmbeddingProvider::new(384).unwrap();
        let a = provider.embed("Bearer Token").unwrap();
        let b = provider.embed("bearer token").unwrap();
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(matches!(
            HashEmbeddingProvider::new(0),
            Err(IndexError::InvalidConfig(_))
        ));
    }
}
