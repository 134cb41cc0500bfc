//! 💾 Персистентность индексов персон
//!
//! Один каталог на персону внутри корня индексов:
//!
//! ```text
//! indexes/
//!   Albert Einstein/
//!     metadata.json    версия формата, размерность, число записей, модель
//!     chunks.json      тексты фрагментов в порядке вставки
//!     embeddings.bin   заголовок 32 байта + строки f32 little-endian
//! ```
//!
//! Граница доверия: загрузка доверяет содержимому каталога. Проверяются
//! только согласованность заголовка, размеров и размерности; подмененные,
//! но согласованные файлы будут приняты как есть. Каталог индексов должен
//! быть доступен на запись только процессу индексации.
//!
//! Каждый файл пишется во временный и переименовывается, но параллельная
//! сборка одной и той же персоны не сериализуется: побеждает последний
//! писатель, и при гонке файлы могут оказаться от разных сборок
//! (загрузка тогда отвергнет индекс как поврежденный).

use chrono::{DateTime, Utc};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::priests::embeddings::Embedder;
use crate::totems::retrieval::{IndexEntry, VectorIndex};

const METADATA_FILE: &str = "metadata.json";
const CHUNKS_FILE: &str = "chunks.json";
const EMBEDDINGS_FILE: &str = "embeddings.bin";

const FORMAT_VERSION: u32 = 1;
const MAGIC: [u8; 4] = *b"PMVI";
const HEADER_SIZE: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub version: u32,
    pub persona: String,
    pub dimension: usize,
    pub entry_count: usize,
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
struct EmbeddingsHeader {
    version: u32,
    embedding_dim: u32,
    num_embeddings: u64,
    data_offset: u64,
}

impl EmbeddingsHeader {
    fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&MAGIC);
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.embedding_dim.to_le_bytes());
        // 12..16 зарезервировано
        bytes[16..24].copy_from_slice(&self.num_embeddings.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.data_offset.to_le_bytes());
        bytes
    }

    fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_SIZE || data[0..4] != MAGIC {
            return None;
        }
        let u32_at = |i: usize| u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        let u64_at = |i: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&data[i..i + 8]);
            u64::from_le_bytes(buf)
        };
        Some(Self {
            version: u32_at(4),
            embedding_dim: u32_at(8),
            num_embeddings: u64_at(16),
            data_offset: u64_at(24),
        })
    }
}

impl VectorIndex {
    /// Сохраняет индекс в каталог `dir`
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;

        let metadata = IndexMetadata {
            version: FORMAT_VERSION,
            persona: self.name().to_string(),
            dimension: self.dimension(),
            entry_count: self.len(),
            embedding_model: self.embedding_model().to_string(),
            created_at: Utc::now(),
        };

        let texts: Vec<&str> = self.entries().iter().map(|e| e.text.as_str()).collect();

        let header = EmbeddingsHeader {
            version: FORMAT_VERSION,
            embedding_dim: self.dimension() as u32,
            num_embeddings: self.len() as u64,
            data_offset: HEADER_SIZE as u64,
        };
        let mut binary = Vec::with_capacity(HEADER_SIZE + self.len() * self.dimension() * 4);
        binary.extend_from_slice(&header.to_bytes());
        for entry in self.entries() {
            for value in &entry.embedding {
                binary.extend_from_slice(&value.to_le_bytes());
            }
        }

        // metadata.json пишется последним: его наличие означает готовый индекс
        write_atomic(&dir.join(EMBEDDINGS_FILE), &binary)?;
        write_atomic(&dir.join(CHUNKS_FILE), serde_json::to_string(&texts)?.as_bytes())?;
        write_atomic(
            &dir.join(METADATA_FILE),
            serde_json::to_string_pretty(&metadata)?.as_bytes(),
        )?;

        info!(
            persona = self.name(),
            entries = self.len(),
            kb = binary.len() / 1024,
            path = %dir.display(),
            "vector index saved"
        );
        Ok(())
    }

    /// Загружает индекс из каталога `dir`; размерность должна совпасть с эмбеддером
    pub fn load(dir: &Path, embedder: &dyn Embedder) -> Result<Self> {
        let metadata_path = dir.join(METADATA_FILE);
        if !metadata_path.is_file() {
            return Err(Error::IndexNotFound(dir.to_path_buf()));
        }

        let corrupt = |reason: String| Error::CorruptIndex {
            path: dir.to_path_buf(),
            reason,
        };

        let metadata: IndexMetadata = serde_json::from_str(&fs::read_to_string(&metadata_path)?)
            .map_err(|e| corrupt(format!("metadata: {e}")))?;
        if metadata.version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported format version {}", metadata.version)));
        }

        // metadata уже есть, значит остальные файлы обязаны быть рядом
        let missing_part = |file: &str, e: std::io::Error| match e.kind() {
            std::io::ErrorKind::NotFound => corrupt(format!("{file} is missing")),
            _ => Error::Io(e),
        };

        let chunks_json =
            fs::read_to_string(dir.join(CHUNKS_FILE)).map_err(|e| missing_part(CHUNKS_FILE, e))?;
        let texts: Vec<String> =
            serde_json::from_str(&chunks_json).map_err(|e| corrupt(format!("chunks: {e}")))?;

        let file =
            fs::File::open(dir.join(EMBEDDINGS_FILE)).map_err(|e| missing_part(EMBEDDINGS_FILE, e))?;
        // SAFETY: файл открыт только на чтение; изменение его другим процессом
        // во время загрузки - та же гонка писателей, что описана выше
        let mmap = unsafe { Mmap::map(&file)? };

        let header = EmbeddingsHeader::from_bytes(&mmap)
            .ok_or_else(|| corrupt("bad embeddings header".to_string()))?;
        let dimension = header.embedding_dim as usize;
        let count = header.num_embeddings as usize;

        if header.version != FORMAT_VERSION
            || dimension == 0
            || dimension != metadata.dimension
            || count != metadata.entry_count
            || count != texts.len()
        {
            return Err(corrupt(format!(
                "header says {count}x{dimension}, metadata says {}x{}, {} texts",
                metadata.entry_count,
                metadata.dimension,
                texts.len()
            )));
        }

        let data_start = header.data_offset as usize;
        let expected_len = count
            .checked_mul(dimension * 4)
            .and_then(|n| n.checked_add(data_start))
            .filter(|_| data_start >= HEADER_SIZE)
            .ok_or_else(|| corrupt("bad embeddings layout".to_string()))?;
        if mmap.len() != expected_len {
            return Err(corrupt(format!(
                "embeddings file is {} bytes, expected {expected_len}",
                mmap.len()
            )));
        }

        if dimension != embedder.embedding_dim() {
            return Err(Error::DimensionMismatch {
                expected: embedder.embedding_dim(),
                actual: dimension,
            });
        }

        let entries: Vec<IndexEntry> = texts
            .into_iter()
            .zip(mmap[data_start..].chunks_exact(dimension * 4))
            .map(|(text, row)| IndexEntry {
                text,
                embedding: row
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            })
            .collect();

        debug!(persona = %metadata.persona, entries = entries.len(), dimension, "vector index loaded");

        VectorIndex::from_entries(&metadata.persona, dimension, &metadata.embedding_model, entries)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Хранилище индексов: корень с каталогом на каждую персону
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Каталог индекса персоны; имя должно быть одним компонентом пути
    pub fn index_dir(&self, persona: &str) -> Result<PathBuf> {
        validate_persona_name(persona)?;
        Ok(self.root.join(persona))
    }

    pub fn exists(&self, persona: &str) -> bool {
        self.index_dir(persona)
            .map(|dir| dir.join(METADATA_FILE).is_file())
            .unwrap_or(false)
    }

    pub fn save(&self, index: &VectorIndex) -> Result<PathBuf> {
        let dir = self.index_dir(index.name())?;
        index.save(&dir)?;
        Ok(dir)
    }

    pub fn load(&self, persona: &str, embedder: &dyn Embedder) -> Result<VectorIndex> {
        let dir = self.index_dir(persona)?;
        VectorIndex::load(&dir, embedder)
    }

    /// Персоны, для которых есть сохраненный индекс
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().join(METADATA_FILE).is_file())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }
}

pub fn validate_persona_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    let mut components = Path::new(name).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if trimmed.is_empty() || trimmed != name || !single_normal || name.contains(['/', '\\']) {
        return Err(Error::InvalidPersonaName(name.to_string()));
    }
    Ok(())
}
