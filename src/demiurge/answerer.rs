//! Retrieval-Augmented Answerer - one persona, one index
//!
//! question → top-k passages → persona prompt → generator → shaper.
//! Internally every step returns a typed error; `ask` turns the outcome
//! into the string the user sees and never fails.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info_span, warn};

use crate::demiurge::persona::PersonaProfile;
use crate::demiurge::shaper::{ResponseShaper, SentenceCapShaper, DEFAULT_WORD_THRESHOLD};
use crate::error::{Error, Result};
use crate::logos::Generator;
use crate::priests::embeddings::Embedder;
use crate::totems::retrieval::{VectorIndex, DEFAULT_TOP_K};

pub const NOT_READY_MESSAGE: &str = "Index is not ready yet. Please create the index first.";
pub const SERVICE_UNAVAILABLE_MESSAGE: &str = "Error: Service unavailable";

/// Retrieval and shaping knobs shared by all answerers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerSettings {
    pub top_k: usize,
    pub word_threshold: usize,
}

impl Default for AnswerSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            word_threshold: DEFAULT_WORD_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswererState {
    /// No index bound yet
    Uninitialized,
    Ready,
    /// Binding failed; terminal
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum AskError {
    #[error("index is not ready")]
    NotReady,
    #[error(transparent)]
    Failed(#[from] Error),
}

pub struct RetrievalAugmentedAnswerer {
    profile: Arc<PersonaProfile>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    shaper: Box<dyn ResponseShaper>,
    top_k: usize,
    index: Option<Arc<VectorIndex>>,
    unavailable: Option<String>,
}

impl RetrievalAugmentedAnswerer {
    pub fn new(
        profile: Arc<PersonaProfile>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        settings: AnswerSettings,
    ) -> Self {
        let shaper = SentenceCapShaper::new(settings.word_threshold, profile.response_sentence_cap());
        Self {
            profile,
            embedder,
            generator,
            shaper: Box::new(shaper),
            top_k: settings.top_k,
            index: None,
            unavailable: None,
        }
    }

    pub fn with_shaper(mut self, shaper: Box<dyn ResponseShaper>) -> Self {
        self.shaper = shaper;
        self
    }

    /// Uninitialized → Ready. A dimension mismatch with the embedder is
    /// terminal: the answerer becomes Unavailable.
    pub fn bind(&mut self, index: Arc<VectorIndex>) -> Result<()> {
        if self.unavailable.is_some() {
            return Ok(());
        }
        let expected = self.embedder.embedding_dim();
        if index.dimension() != expected {
            let err = Error::DimensionMismatch {
                expected,
                actual: index.dimension(),
            };
            self.mark_unavailable(&err.to_string());
            return Err(err);
        }
        self.index = Some(index);
        Ok(())
    }

    pub fn mark_unavailable(&mut self, reason: &str) {
        warn!(persona = self.profile.name(), reason, "answerer unavailable");
        self.index = None;
        self.unavailable = Some(reason.to_string());
    }

    pub fn state(&self) -> AnswererState {
        match (&self.unavailable, &self.index) {
            (Some(reason), _) => AnswererState::Unavailable(reason.clone()),
            (None, Some(_)) => AnswererState::Ready,
            (None, None) => AnswererState::Uninitialized,
        }
    }

    pub fn profile(&self) -> &PersonaProfile {
        &self.profile
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_deref()
    }

    /// Typed outcome of one question
    pub fn try_ask(&self, question: &str) -> std::result::Result<String, AskError> {
        let _span = info_span!("ask", persona = self.profile.name()).entered();

        let index = self.index.as_ref().ok_or(AskError::NotReady)?;

        let passages = index.query(question, self.embedder.as_ref(), self.top_k)?;
        for passage in &passages {
            debug!(score = passage.score, chars = passage.text.len(), "retrieved passage");
        }

        let context: Vec<String> = passages.into_iter().map(|p| p.text).collect();
        let prompt = self.profile.render(&context, question);
        debug!(prompt_chars = prompt.len(), "prompt rendered");

        let raw = self.generator.generate(&prompt)?;
        Ok(self.shaper.shape(&raw))
    }

    /// Always returns something to show: the answer, the not-ready notice
    /// or an error description
    pub fn ask(&self, question: &str) -> String {
        match self.try_ask(question) {
            Ok(answer) => answer,
            Err(AskError::NotReady) => NOT_READY_MESSAGE.to_string(),
            Err(AskError::Failed(e)) if e.is_service_unavailable() => {
                warn!(persona = self.profile.name(), error = %e, "service unavailable");
                SERVICE_UNAVAILABLE_MESSAGE.to_string()
            }
            Err(AskError::Failed(e)) => format!("Error: {e}"),
        }
    }
}
