//! 🏗️ Пакетная индексация корпусов персон
//!
//! `documents/<персона>/*.txt` → фрагменты → векторы → `indexes/<персона>/`.
//! Каждая персона собирается независимо: пустой каталог пропускается,
//! ошибка одной сборки не останавливает остальные.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, info_span, warn};

use crate::error::Result;
use crate::priests::embeddings::Embedder;
use crate::totems::chunker::Chunker;
use crate::totems::corpus::load_documents;
use crate::totems::persistence::IndexStore;
use crate::totems::retrieval::VectorIndex;

/// Итог сборки одной персоны
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltIndex {
    pub persona: String,
    pub documents: usize,
    pub chunks: usize,
    pub path: PathBuf,
}

/// Сводка по всему прогону
#[derive(Debug, Default)]
pub struct BuildReport {
    pub built: Vec<BuiltIndex>,
    /// Персоны без загружаемых документов
    pub skipped: Vec<String>,
    /// Персона и текст ошибки
    pub failed: Vec<(String, String)>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct IndexBuildJob<'a> {
    documents_root: PathBuf,
    store: IndexStore,
    chunker: Chunker,
    embedder: &'a dyn Embedder,
}

impl<'a> IndexBuildJob<'a> {
    pub fn new(
        documents_root: &Path,
        store: IndexStore,
        chunker: Chunker,
        embedder: &'a dyn Embedder,
    ) -> Self {
        Self {
            documents_root: documents_root.to_path_buf(),
            store,
            chunker,
            embedder,
        }
    }

    /// Подкаталоги корня документов, отсортированные по имени
    pub fn discover_persona_folders(&self) -> Result<Vec<String>> {
        if !self.documents_root.is_dir() {
            warn!(root = %self.documents_root.display(), "documents root not found");
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = fs::read_dir(&self.documents_root)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();

        info!(count = names.len(), "🔍 discovered persona folders");
        Ok(names)
    }

    /// Собирает и сохраняет индекс одной персоны;
    /// `Ok(None)` если в каталоге нет документов или все они пустые
    pub fn build_one(&self, persona: &str) -> Result<Option<BuiltIndex>> {
        let _span = info_span!("build_index", persona).entered();

        let folder = self.documents_root.join(persona);
        let documents = if folder.is_dir() {
            load_documents(&folder)?
        } else {
            warn!(folder = %folder.display(), "persona folder not found");
            Vec::new()
        };

        if documents.is_empty() {
            warn!("no documents found, skipping");
            return Ok(None);
        }

        let chunks: Vec<_> = documents
            .iter()
            .flat_map(|doc| self.chunker.split(&doc.text, &doc.source_id))
            .collect();
        if chunks.is_empty() {
            warn!(documents = documents.len(), "documents are empty, skipping");
            return Ok(None);
        }
        let chunk_count = chunks.len();

        let index = VectorIndex::build(persona, chunks, self.embedder)?;
        let path = self.store.save(&index)?;

        info!(documents = documents.len(), chunks = chunk_count, path = %path.display(), "📦 index saved");

        Ok(Some(BuiltIndex {
            persona: persona.to_string(),
            documents: documents.len(),
            chunks: chunk_count,
            path,
        }))
    }

    /// Все найденные персоны по очереди
    pub fn run(&self) -> Result<BuildReport> {
        let personas = self.discover_persona_folders()?;
        Ok(self.run_for(&personas))
    }

    pub fn run_for(&self, personas: &[String]) -> BuildReport {
        let mut report = BuildReport::default();

        for persona in personas {
            match self.build_one(persona) {
                Ok(Some(built)) => report.built.push(built),
                Ok(None) => report.skipped.push(persona.clone()),
                Err(e) => {
                    error!(persona = %persona, error = %e, "index build failed");
                    report.failed.push((persona.clone(), e.to_string()));
                }
            }
        }

        report
    }
}
