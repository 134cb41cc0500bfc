//! 🜃 Уровень 2: Тотемы Памяти
//!
//! Знания персон: нарезка корпуса, векторный индекс и его хранилище,
//! справочный источник, пакетная индексация, журнал диалога.

pub mod chunker;
pub mod corpus;
pub mod episodic;
pub mod indexing;
pub mod persistence;
pub mod reference;
pub mod retrieval;

pub use chunker::{Chunk, ChunkSettings, Chunker};
pub use episodic::{ConversationLog, Role};
pub use indexing::{BuildReport, IndexBuildJob};
pub use persistence::IndexStore;
pub use reference::{Article, LocalePolicy, ReferenceSource, WikipediaClient};
pub use retrieval::{ScoredPassage, VectorIndex};
