//! 🜂 Уровень 1: Жрецы Железа
//!
//! Устройства и модельные сервисы: выбор устройства, эмбеддеры, клиент Ollama.

pub mod device;
pub mod embeddings;
pub mod hashing;
pub mod ollama;

pub use embeddings::{Embedder, EmbeddingConfig, EmbeddingEngine};
pub use hashing::HashingEmbedder;
pub use ollama::{OllamaClient, OllamaEmbedder};
