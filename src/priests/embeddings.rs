//! 🜂 Уровень 1: Жрецы Железа - Эмбеддинг движок
//!
//! Локальный движок векторизации на базе BERT-подобных моделей
//! (all-MiniLM-L6-v2, multilingual-e5-small) с батчингом и LRU кэшем

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::Path;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Trait для эмбеддингов, поддерживает разные реализации
///
/// Размерность стабильна для экземпляра: все векторы одного индекса
/// должны совпадать с `embedding_dim()`.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn embedding_dim(&self) -> usize;

    /// Имя модели, сохраняется в метаданных индекса
    fn model_name(&self) -> &str;
}

/// Конфигурация эмбеддинг движка
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Максимальная длина последовательности
    pub max_length: usize,
    /// Размер батча
    pub batch_size: usize,
    /// Размер кэша для хранения результатов
    pub cache_size: usize,
    /// Нормализовать ли векторы (cosine similarity)
    pub normalize: bool,
    /// Префикс перед текстом ("query: " для e5)
    pub prefix: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            max_length: 512,
            batch_size: 32,
            cache_size: 1000,
            normalize: true,
            prefix: None,
        }
    }
}

/// Эмбеддинг движок на candle
pub struct EmbeddingEngine {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    config: EmbeddingConfig,
    embedding_dim: usize,
    model_name: String,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingEngine {
    /// Загружает модель из каталога с config.json, model.safetensors и tokenizer.json
    pub fn load(model_path: &Path, device: Device, config: EmbeddingConfig) -> Result<Self> {
        info!(path = %model_path.display(), "loading embedding model");

        let config_content = std::fs::read_to_string(model_path.join("config.json"))?;
        let raw: serde_json::Value = serde_json::from_str(&config_content)?;
        let embedding_dim = raw
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::EmbeddingUnavailable("config.json has no hidden_size".into()))?
            as usize;
        let model_config: Config = serde_json::from_value(raw)?;

        let weights_path = model_path.join("model.safetensors");
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&weights_path], DType::F32, &device)
                .map_err(unavailable)?
        };
        let model = BertModel::load(vb, &model_config).map_err(unavailable)?;

        let mut tokenizer = Tokenizer::from_file(model_path.join("tokenizer.json"))
            .map_err(|e| Error::EmbeddingUnavailable(format!("failed to load tokenizer: {e}")))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_length,
                ..Default::default()
            }))
            .map_err(|e| Error::EmbeddingUnavailable(format!("bad truncation: {e}")))?;

        let cache_size = NonZeroUsize::new(config.cache_size).unwrap_or(NonZeroUsize::MIN);
        let model_name = model_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| model_path.display().to_string());

        info!(dim = embedding_dim, model = %model_name, "embedding engine ready");

        Ok(Self {
            model,
            tokenizer,
            device,
            config,
            embedding_dim,
            model_name,
            cache: Mutex::new(LruCache::new(cache_size)),
        })
    }

    fn prepare(&self, text: &str) -> String {
        match &self.config.prefix {
            Some(prefix) => format!("{prefix}{text}"),
            None => text.to_string(),
        }
    }

    /// Вычисляет эмбеддинги для батча текстов (mean pooling по маске внимания)
    fn compute_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.config.batch_size.max(1)) {
            let prepared: Vec<String> = chunk.iter().map(|t| self.prepare(t)).collect();
            let encodings = self
                .tokenizer
                .encode_batch(prepared, true)
                .map_err(|e| Error::EmbeddingUnavailable(format!("tokenization failed: {e}")))?;

            let batch_size = encodings.len();
            let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);
            let ids: Vec<u32> = encodings.iter().flat_map(|e| e.get_ids().to_vec()).collect();
            let mask: Vec<u32> = encodings
                .iter()
                .flat_map(|e| e.get_attention_mask().to_vec())
                .collect();

            let token_ids =
                Tensor::from_vec(ids, (batch_size, seq_len), &self.device).map_err(unavailable)?;
            let attention_mask =
                Tensor::from_vec(mask, (batch_size, seq_len), &self.device).map_err(unavailable)?;
            let token_type_ids = token_ids.zeros_like().map_err(unavailable)?;

            let output = self
                .model
                .forward(&token_ids, &token_type_ids, Some(&attention_mask))
                .map_err(unavailable)?;

            let pooled = mean_pool(&output, &attention_mask).map_err(unavailable)?;
            for row in pooled.to_vec2::<f32>().map_err(unavailable)? {
                embeddings.push(if self.config.normalize {
                    l2_normalize(&row)
                } else {
                    row
                });
            }
        }

        Ok(embeddings)
    }
}

fn mean_pool(output: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
    let summed = output.broadcast_mul(&mask)?.sum(1)?;
    // маска всегда содержит хотя бы [CLS]
    let counts = mask.sum(1)?;
    summed.broadcast_div(&counts)
}

fn unavailable(e: candle_core::Error) -> Error {
    Error::EmbeddingUnavailable(e.to_string())
}

/// L2 нормализация вектора
pub fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vec.to_vec();
    }
    vec.iter().map(|x| x / norm).collect()
}

impl Embedder for EmbeddingEngine {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.lock().get(text) {
            return Ok(hit.clone());
        }

        let embedding = self
            .compute_batch(&[text])?
            .pop()
            .ok_or_else(|| Error::EmbeddingUnavailable("model returned no vector".into()))?;
        self.cache.lock().put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let embeddings = self.compute_batch(&refs)?;
        debug!(count = embeddings.len(), "embedded batch");
        Ok(embeddings)
    }

    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
