//! 🜃 Уровень 2: Тотемы Памяти - Векторный индекс персоны
//!
//! In-memory индекс пар (вектор, текст) с поиском по косинусному сходству.
//! Собирается один раз из фрагментов и дальше только читается:
//! изменение исходных текстов требует полной пересборки.

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::priests::embeddings::Embedder;
use crate::totems::chunker::Chunk;

/// Сколько фрагментов подмешивать в промпт по умолчанию
pub const DEFAULT_TOP_K: usize = 2;

/// Размер батча при векторизации корпуса
const EMBED_BATCH: usize = 64;

/// Запись индекса
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Найденный фрагмент
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPassage {
    pub text: String,
    pub score: f32,
}

/// Векторный индекс одной персоны
#[derive(Debug, Clone)]
pub struct VectorIndex {
    /// Имя персоны (идентичность индекса)
    name: String,
    /// Размерность векторов
    dimension: usize,
    /// Модель, которой построены векторы
    embedding_model: String,
    /// Записи в порядке вставки
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Векторизует все фрагменты и строит индекс
    pub fn build<I>(name: &str, chunks: I, embedder: &dyn Embedder) -> Result<Self>
    where
        I: IntoIterator<Item = Chunk>,
    {
        let texts: Vec<String> = chunks.into_iter().map(|c| c.text).collect();
        if texts.is_empty() {
            return Err(Error::EmptyCorpus);
        }

        let dimension = embedder.embedding_dim();
        let mut entries = Vec::with_capacity(texts.len());

        for batch in texts.chunks(EMBED_BATCH) {
            let embeddings = embedder.embed_batch(batch)?;
            if embeddings.len() != batch.len() {
                return Err(Error::EmbeddingUnavailable(format!(
                    "embedder returned {} vectors for {} texts",
                    embeddings.len(),
                    batch.len()
                )));
            }
            for (text, embedding) in batch.iter().zip(embeddings) {
                check_dimension(dimension, embedding.len())?;
                entries.push(IndexEntry {
                    text: text.clone(),
                    embedding,
                });
            }
            debug!(persona = name, embedded = entries.len(), total = texts.len(), "embedding corpus");
        }

        info!(persona = name, entries = entries.len(), dimension, "vector index built");

        Ok(Self {
            name: name.to_string(),
            dimension,
            embedding_model: embedder.model_name().to_string(),
            entries,
        })
    }

    /// Собирает индекс из уже готовых записей (загрузка с диска)
    pub(crate) fn from_entries(
        name: &str,
        dimension: usize,
        embedding_model: &str,
        entries: Vec<IndexEntry>,
    ) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::EmptyCorpus);
        }
        for entry in &entries {
            check_dimension(dimension, entry.embedding.len())?;
        }
        Ok(Self {
            name: name.to_string(),
            dimension,
            embedding_model: embedding_model.to_string(),
            entries,
        })
    }

    /// k ближайших фрагментов к вопросу, ближайший первым;
    /// при равенстве раньше идет запись, вставленная раньше
    pub fn query(
        &self,
        question: &str,
        embedder: &dyn Embedder,
        k: usize,
    ) -> Result<Vec<ScoredPassage>> {
        let query_embedding = embedder.embed(question)?;
        check_dimension(self.dimension, query_embedding.len())?;
        Ok(self.search(&query_embedding, k))
    }

    /// Поиск по готовому вектору
    pub fn search(&self, query_embedding: &[f32], k: usize) -> Vec<ScoredPassage> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(query_embedding, &entry.embedding)))
            .collect();

        // sort_by стабилен, поэтому равные оценки сохраняют порядок вставки
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| ScoredPassage {
                text: self.entries[i].text.clone(),
                score,
            })
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Вычисляет косинусное сходство между двумя векторами
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
