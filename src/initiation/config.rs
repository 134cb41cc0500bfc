//! 🜂 Конфигурация Persona Mind
//!
//! `config/system.toml`: пути к корпусам и индексам, бэкенды моделей,
//! справочный источник, параметры поиска, нарезки и формы ответа.
//! Если файла нет, он создается с настройками по умолчанию.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::demiurge::persona::DEFAULT_SENTENCE_CAP;
use crate::demiurge::shaper::DEFAULT_WORD_THRESHOLD;
use crate::priests::ollama::DEFAULT_BASE_URL;
use crate::totems::chunker::{ChunkSettings, Chunker};
use crate::totems::reference::{DEFAULT_ENDPOINT, DEFAULT_USER_AGENT};
use crate::totems::retrieval::DEFAULT_TOP_K;

pub const DEFAULT_CONFIG_PATH: &str = "config/system.toml";

/// Главная конфигурация системы
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub paths: PathsConfig,
    pub embedding: EmbeddingSection,
    pub generation: GenerationSection,
    pub ollama: OllamaSection,
    pub reference: ReferenceSection,
    pub retrieval: RetrievalSection,
    pub chunking: ChunkingSection,
    pub response: ResponseSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Каталог с подкаталогом `.txt` файлов на каждую персону
    pub documents_root: PathBuf,
    /// Куда складываются индексы
    pub indexes_root: PathBuf,
    /// JSON определения персон поверх встроенных
    pub personas_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            documents_root: PathBuf::from("data"),
            indexes_root: PathBuf::from("indexes"),
            personas_dir: Some(PathBuf::from("config/personas")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Ollama `/api/embed`
    Ollama,
    /// Локальная BERT-подобная модель на candle
    Candle,
    /// Детерминированный feature hashing без модели
    Hashing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub backend: EmbeddingBackend,
    /// Имя модели в Ollama
    pub model: String,
    /// Каталог модели для candle
    pub model_path: PathBuf,
    pub dimension: usize,
    pub cache_size: usize,
    /// Префикс запроса для e5-подобных моделей ("query: ")
    pub query_prefix: Option<String>,
    pub force_cpu: bool,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            model: "all-minilm".to_string(),
            model_path: PathBuf::from("models/embeddings"),
            dimension: 384, // all-minilm / e5-small
            cache_size: 1000,
            query_prefix: None,
            force_cpu: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationBackend {
    Ollama,
    /// Mistral 7B Instruct на candle
    Mistral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    pub backend: GenerationBackend,
    /// Имя модели в Ollama или HuggingFace id для Mistral
    pub model: String,
    /// Локальный каталог весов Mistral
    pub model_path: Option<PathBuf>,
    pub revision: String,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<usize>,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
    pub sample_len: usize,
    pub seed: u64,
    pub force_cpu: bool,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            backend: GenerationBackend::Ollama,
            model: "llama3.2".to_string(),
            model_path: None,
            revision: "main".to_string(),
            temperature: None,
            top_p: None,
            top_k: None,
            repeat_penalty: 1.1,
            repeat_last_n: 64,
            sample_len: 512,
            seed: 299792458,
            force_cpu: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSection {
    pub base_url: String,
}

impl Default for OllamaSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceSection {
    /// Адрес API с подстановкой `{locale}`
    pub endpoint: String,
    pub default_locale: String,
    pub non_ascii_locale: String,
    pub search_results: usize,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for ReferenceSection {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            default_locale: "en".to_string(),
            non_ascii_locale: "ar".to_string(),
            search_results: 3,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub top_k: usize,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSection {
    /// Пакетная индексация корпусов
    pub batch: ChunkSettings,
    /// Статьи справочника для динамических персон
    pub dynamic: ChunkSettings,
}

impl Default for ChunkingSection {
    fn default() -> Self {
        Self {
            batch: ChunkSettings::BATCH,
            dynamic: ChunkSettings::DYNAMIC,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseSection {
    /// Ответы длиннее (в словах) обрезаются
    pub word_threshold: usize,
    /// Сколько предложений оставлять у динамических персон
    pub sentence_cap: usize,
}

impl Default for ResponseSection {
    fn default() -> Self {
        Self {
            word_threshold: DEFAULT_WORD_THRESHOLD,
            sentence_cap: DEFAULT_SENTENCE_CAP,
        }
    }
}

impl SystemConfig {
    /// Загружает конфигурацию из файла или создает дефолтную
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<SystemConfig>(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            let default_config = SystemConfig::default();
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, toml::to_string_pretty(&default_config)?)
                .with_context(|| format!("failed to write {}", path.display()))?;

            println!("📝 Created {} with default settings", path.display());
            default_config
        };

        config.validate()?;
        Ok(config)
    }

    /// Валидирует конфигурацию
    pub fn validate(&self) -> Result<()> {
        if self.paths.documents_root.as_os_str().is_empty() {
            anyhow::bail!("paths.documents_root is empty");
        }
        if self.paths.indexes_root.as_os_str().is_empty() {
            anyhow::bail!("paths.indexes_root is empty");
        }
        if self.embedding.dimension == 0 {
            anyhow::bail!("embedding.dimension must be > 0");
        }
        if self.embedding.backend == EmbeddingBackend::Ollama && self.embedding.model.is_empty() {
            anyhow::bail!("embedding.model is empty");
        }
        if self.generation.model.is_empty() {
            anyhow::bail!("generation.model is empty");
        }
        if self.retrieval.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be > 0");
        }
        if self.response.sentence_cap == 0 {
            anyhow::bail!("response.sentence_cap must be > 0");
        }
        if !self.reference.endpoint.contains("{locale}") {
            anyhow::bail!("reference.endpoint must contain {{locale}}");
        }
        Chunker::from_settings(self.chunking.batch).context("chunking.batch")?;
        Chunker::from_settings(self.chunking.dynamic).context("chunking.dynamic")?;
        Ok(())
    }
}
