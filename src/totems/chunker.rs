//! ✂️ Нарезка текста на перекрывающиеся фрагменты
//!
//! Окно фиксированной длины в символах (не байтах) со сдвигом
//! `chunk_size - overlap`. Соседние фрагменты перекрываются ровно на
//! `overlap` символов, хвост короче окна не теряется.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Параметры пакетной индексации длинных документов
pub const BATCH_CHUNK_SIZE: usize = 1000;
pub const BATCH_CHUNK_OVERLAP: usize = 200;

/// Параметры для статей из справочного источника
pub const DYNAMIC_CHUNK_SIZE: usize = 500;
pub const DYNAMIC_CHUNK_OVERLAP: usize = 50;

/// Фрагмент исходного текста
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    /// Откуда фрагмент (имя файла, заголовок статьи)
    pub source_id: String,
}

/// Параметры окна
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSettings {
    pub size: usize,
    pub overlap: usize,
}

impl ChunkSettings {
    pub const BATCH: ChunkSettings = ChunkSettings {
        size: BATCH_CHUNK_SIZE,
        overlap: BATCH_CHUNK_OVERLAP,
    };

    pub const DYNAMIC: ChunkSettings = ChunkSettings {
        size: DYNAMIC_CHUNK_SIZE,
        overlap: DYNAMIC_CHUNK_OVERLAP,
    };
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    /// Окно должно сдвигаться вперед: `size > overlap`
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 || overlap >= size {
            return Err(Error::InvalidChunking { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    pub fn from_settings(settings: ChunkSettings) -> Result<Self> {
        Self::new(settings.size, settings.overlap)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Ленивая последовательность фрагментов; повторный вызов начинает заново
    pub fn split<'a>(&self, text: &'a str, source_id: &'a str) -> Chunks<'a> {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        Chunks {
            text,
            source_id,
            boundaries,
            size: self.size,
            step: self.size - self.overlap,
            start: 0,
            done: text.is_empty(),
        }
    }
}

/// Итератор фрагментов одного текста
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    source_id: &'a str,
    /// Байтовые смещения начала каждого символа плюс конец строки
    boundaries: Vec<usize>,
    size: usize,
    step: usize,
    /// Номер символа, с которого начинается следующий фрагмент
    start: usize,
    done: bool,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }

        let char_count = self.boundaries.len() - 1;
        let end = (self.start + self.size).min(char_count);
        let chunk = Chunk {
            text: self.text[self.boundaries[self.start]..self.boundaries[end]].to_string(),
            source_id: self.source_id.to_string(),
        };

        if end == char_count {
            self.done = true;
        } else {
            self.start += self.step;
        }

        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Склеивает фрагменты, отбрасывая перекрытие у каждого следующего
    fn reconstruct(chunks: &[Chunk], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(&chunk.text);
            } else {
                out.extend(chunk.text.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        let chunker = Chunker::new(10, 2).unwrap();
        assert_eq!(chunker.split("", "doc").count(), 0);
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunker = Chunker::new(1000, 200).unwrap();
        let chunks: Vec<_> = chunker.split("short note", "doc").collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short note");
        assert_eq!(chunks[0].source_id, "doc");
    }

    #[test]
    fn test_overlap_and_reconstruction() {
        let text = "abcdefghijklmnopqrstuvwxyz0123456789";
        for (size, overlap) in [(10, 3), (7, 0), (5, 4), (36, 10), (50, 5)] {
            let chunker = Chunker::new(size, overlap).unwrap();
            let chunks: Vec<_> = chunker.split(text, "doc").collect();

            assert!(chunks.iter().all(|c| c.text.chars().count() <= size));
            for pair in chunks.windows(2) {
                let prev: Vec<char> = pair[0].text.chars().collect();
                let next: Vec<char> = pair[1].text.chars().collect();
                assert_eq!(&prev[prev.len() - overlap..], &next[..overlap]);
            }
            assert_eq!(reconstruct(&chunks, overlap), text, "size={size} overlap={overlap}");
        }
    }

    #[test]
    fn test_trailing_content_is_kept() {
        let chunker = Chunker::new(4, 1).unwrap();
        let chunks: Vec<String> = chunker.split("abcdefghij", "doc").map(|c| c.text).collect();
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);

        let chunks: Vec<String> = chunker.split("abcdefgh", "doc").map(|c| c.text).collect();
        assert_eq!(chunks, vec!["abcd", "defg", "gh"]);
    }

    #[test]
    fn test_multibyte_text_counts_chars() {
        let chunker = Chunker::new(3, 1).unwrap();
        let chunks: Vec<String> = chunker
            .split("صلاح الدين", "ar")
            .map(|c| c.text)
            .collect();
        assert!(chunks.iter().all(|c| c.chars().count() <= 3));
        assert_eq!(reconstruct_strings(&chunks, 1), "صلاح الدين");
    }

    fn reconstruct_strings(chunks: &[String], overlap: usize) -> String {
        let chunks: Vec<Chunk> = chunks
            .iter()
            .map(|t| Chunk {
                text: t.clone(),
                source_id: String::new(),
            })
            .collect();
        reconstruct(&chunks, overlap)
    }

    #[test]
    fn test_split_is_restartable() {
        let chunker = Chunker::from_settings(ChunkSettings { size: 5, overlap: 2 }).unwrap();
        let text = "the quick brown fox";
        let first: Vec<_> = chunker.split(text, "doc").collect();
        let second: Vec<_> = chunker.split(text, "doc").collect();
        assert_eq!(first, second);

        let iter = chunker.split(text, "doc");
        let cloned = iter.clone();
        assert_eq!(iter.count(), cloned.count());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            Chunker::new(0, 0),
            Err(Error::InvalidChunking { size: 0, overlap: 0 })
        ));
        assert!(Chunker::new(10, 10).is_err());
        assert!(Chunker::from_settings(ChunkSettings::BATCH).is_ok());
        assert!(Chunker::from_settings(ChunkSettings::DYNAMIC).is_ok());
    }
}
