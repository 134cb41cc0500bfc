//! 🜃 Поиск по знаниям персоны

pub mod vector_index;

pub use vector_index::{cosine_similarity, IndexEntry, ScoredPassage, VectorIndex, DEFAULT_TOP_K};
