//! 🌙 Hashing Embedder - детерминированный эмбеддер без моделей
//!
//! Feature hashing по словам: работает офлайн, стабилен между запусками
//! и платформами (FNV-1a), поэтому индексы, собранные им, можно сохранять.
//! Используется когда модели эмбеддингов недоступны и в тестах.

use crate::error::Result;
use crate::priests::embeddings::{l2_normalize, Embedder};

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

pub struct HashingEmbedder {
    embedding_dim: usize,
}

impl HashingEmbedder {
    pub fn new(embedding_dim: usize) -> Self {
        Self {
            embedding_dim: embedding_dim.max(1),
        }
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let hash = fnv1a(token.as_bytes());
        let index = (hash % self.embedding_dim as u64) as usize;
        // старший бит выбирает знак, чтобы коллизии частично гасились
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

/// Слова в нижнем регистре без пунктуации
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embedding = vec![0.0f32; self.embedding_dim];
        for token in tokens(text) {
            let (index, sign) = self.bucket(&token);
            embedding[index] += sign;
        }
        Ok(l2_normalize(&embedding))
    }

    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn model_name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::totems::retrieval::cosine_similarity;

    #[test]
    fn test_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("The Trial").unwrap();
        let b = embedder.embed("the trial!").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_shared_words_are_closer() {
        let embedder = HashingEmbedder::new(256);
        let question = embedder.embed("What did Einstein discover?").unwrap();
        let near = embedder.embed("Einstein discovered relativity").unwrap();
        let far = embedder.embed("Kafka wrote The Trial").unwrap();
        assert!(cosine_similarity(&question, &near) > cosine_similarity(&question, &far));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert_eq!(embedder.embed("  ...  ").unwrap(), vec![0.0; 8]);
    }
}
