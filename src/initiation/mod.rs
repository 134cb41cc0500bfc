//! 🜂 Уровень 0: Инициация
//!
//! Сборка системы из конфигурации:
//! - Логирование (fmt + EnvFilter, опционально Chrome trace)
//! - Эмбеддер и генератор по выбранным бэкендам
//! - Реестр персон с хранилищем индексов и динамическим построителем

pub mod config;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_chrome::{ChromeLayerBuilder, FlushGuard};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::demiurge::{AnswerSettings, DynamicKnowledgeBuilder, PersonaCatalog, PersonaRegistry};
use crate::logos::{Generator, MistralGenerator, MistralSettings, OllamaGenerator};
use crate::priests::device::select_device;
use crate::priests::embeddings::{Embedder, EmbeddingConfig, EmbeddingEngine};
use crate::priests::{HashingEmbedder, OllamaClient, OllamaEmbedder};
use crate::totems::persistence::IndexStore;
use crate::totems::reference::{LocalePolicy, ReferenceSource, WikipediaClient};

pub use config::{EmbeddingBackend, GenerationBackend, SystemConfig, DEFAULT_CONFIG_PATH};

/// Логи идут в stderr, чтобы не мешать ответам в stdout.
/// `RUST_LOG` задает фильтр, `--verbose` принудительно включает debug.
/// Возвращенный guard нужно держать до выхода, иначе trace не допишется.
pub fn init_logging(verbose: bool, chrome_trace: bool) -> Option<FlushGuard> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let (chrome_layer, guard) = if chrome_trace {
        let (layer, guard) = ChromeLayerBuilder::new().build();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // повторная инициализация (тесты, второй вызов) просто игнорируется
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(chrome_layer)
        .try_init();

    guard
}

pub fn build_embedder(config: &SystemConfig) -> Result<Arc<dyn Embedder>> {
    let section = &config.embedding;
    let embedder: Arc<dyn Embedder> = match section.backend {
        EmbeddingBackend::Ollama => {
            let client = OllamaClient::new(&config.ollama.base_url)?;
            Arc::new(OllamaEmbedder::new(client, &section.model, section.dimension))
        }
        EmbeddingBackend::Candle => {
            let device = select_device(section.force_cpu)?;
            let engine_config = EmbeddingConfig {
                cache_size: section.cache_size,
                prefix: section.query_prefix.clone(),
                ..EmbeddingConfig::default()
            };
            let engine = EmbeddingEngine::load(&section.model_path, device, engine_config)
                .with_context(|| format!("embedding model at {}", section.model_path.display()))?;
            if engine.embedding_dim() != section.dimension {
                anyhow::bail!(
                    "embedding model has dimension {}, config says {}",
                    engine.embedding_dim(),
                    section.dimension
                );
            }
            Arc::new(engine)
        }
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(section.dimension)),
    };

    info!(model = embedder.model_name(), dim = embedder.embedding_dim(), "🧠 embedder ready");
    Ok(embedder)
}

pub fn build_generator(config: &SystemConfig) -> Result<Arc<dyn Generator>> {
    let section = &config.generation;
    let generator: Arc<dyn Generator> = match section.backend {
        GenerationBackend::Ollama => {
            let client = OllamaClient::new(&config.ollama.base_url)?;
            Arc::new(OllamaGenerator::new(client, &section.model, section.temperature))
        }
        GenerationBackend::Mistral => Arc::new(MistralGenerator::new(MistralSettings {
            model_id: section.model.clone(),
            revision: section.revision.clone(),
            local_path: section.model_path.clone(),
            force_cpu: section.force_cpu,
            temperature: section.temperature,
            top_p: section.top_p,
            top_k: section.top_k,
            repeat_penalty: section.repeat_penalty,
            repeat_last_n: section.repeat_last_n,
            sample_len: section.sample_len,
            seed: section.seed,
        })),
    };

    info!(model = generator.model_name(), "🤖 generator ready");
    Ok(generator)
}

pub fn build_reference_source(config: &SystemConfig) -> Result<Arc<dyn ReferenceSource>> {
    let section = &config.reference;
    let client = WikipediaClient::new(
        &section.endpoint,
        &section.user_agent,
        Duration::from_secs(section.timeout_secs),
    )?;
    Ok(Arc::new(client))
}

pub fn answer_settings(config: &SystemConfig) -> AnswerSettings {
    AnswerSettings {
        top_k: config.retrieval.top_k,
        word_threshold: config.response.word_threshold,
    }
}

/// Реестр персон со всеми зависимостями из конфигурации
pub fn build_registry(
    config: &SystemConfig,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    reference: Arc<dyn ReferenceSource>,
) -> Result<PersonaRegistry> {
    let catalog = match &config.paths.personas_dir {
        Some(dir) => PersonaCatalog::load_dir(dir)
            .with_context(|| format!("failed to read personas from {}", dir.display()))?,
        None => PersonaCatalog::builtin(),
    };

    let settings = answer_settings(config);
    let builder = DynamicKnowledgeBuilder::new(reference, embedder.clone(), generator.clone())
        .with_locales(LocalePolicy {
            default_locale: config.reference.default_locale.clone(),
            non_ascii_locale: config.reference.non_ascii_locale.clone(),
        })
        .with_search_results(config.reference.search_results)
        .with_chunking(config.chunking.dynamic)
        .with_answer_settings(settings)
        .with_sentence_cap(config.response.sentence_cap);

    info!(personas = catalog.names().len(), "📋 persona catalog loaded");

    Ok(PersonaRegistry::new(
        catalog,
        IndexStore::new(&config.paths.indexes_root),
        embedder,
        generator,
        settings,
    )
    .with_dynamic_builder(builder))
}
