//! 📜 Загрузка исходных текстов персоны
//!
//! Корпус персоны это каталог с `.txt` файлами. Нечитаемые файлы
//! пропускаются с предупреждением, а не обрывают загрузку.

use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::Result;

/// Исходный документ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Имя файла внутри каталога персоны
    pub source_id: String,
    pub text: String,
}

/// Читает все `.txt` файлы каталога в порядке имен
pub fn load_documents(folder: &Path) -> Result<Vec<Document>> {
    let mut paths: Vec<_> = fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let source_id = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        match fs::read_to_string(&path) {
            Ok(text) => {
                info!(file = %source_id, chars = text.chars().count(), "📜 loaded document");
                documents.push(Document { source_id, text });
            }
            Err(e) => warn!(file = %path.display(), error = %e, "failed to load document"),
        }
    }

    Ok(documents)
}
