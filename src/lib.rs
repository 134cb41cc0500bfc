//! PERSONA MIND - persona knowledge engine
//!
//! Answers questions in the voice of a persona, grounded in that persona's
//! own texts: corpus → chunks → embeddings → vector index → top-k passages
//! → persona prompt → generation → shaped answer.
//!
//! Levels:
//! - `priests`: devices and embedding models
//! - `totems`: chunking, indexes, reference source, conversation log
//! - `logos`: text generation
//! - `demiurge`: personas, answerer, registry
//! - `initiation`: configuration and bootstrap

pub mod demiurge;
pub mod error;
pub mod initiation;
pub mod logos;
pub mod priests;
pub mod totems;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
