//! Test doubles for the model and reference seams

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::demiurge::persona::PersonaProfile;
use crate::error::{Error, Result};
use crate::logos::Generator;
use crate::priests::embeddings::Embedder;
use crate::totems::chunker::Chunk;
use crate::totems::reference::{Article, ReferenceSource};

pub fn chunks(texts: &[&str]) -> Vec<Chunk> {
    texts
        .iter()
        .map(|text| Chunk {
            text: text.to_string(),
            source_id: "test".to_string(),
        })
        .collect()
}

pub fn profile(name: &str) -> PersonaProfile {
    PersonaProfile::from_directives(name, "test persona", None, vec!["Brevity".into()], name)
        .unwrap()
}

/// Embedder whose backing service is down
pub struct FailingEmbedder {
    embedding_dim: usize,
}

impl FailingEmbedder {
    pub fn new(embedding_dim: usize) -> Self {
        Self { embedding_dim }
    }
}

impl Embedder for FailingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::EmbeddingUnavailable("connection refused".into()))
    }

    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

enum Script {
    Reply(String),
    Unavailable,
    Failing(String),
}

/// Generator with a fixed outcome that records every prompt
pub struct ScriptedGenerator {
    script: Script,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn with(script: Script) -> Self {
        Self {
            script,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(text: &str) -> Self {
        Self::with(Script::Reply(text.to_string()))
    }

    pub fn unavailable() -> Self {
        Self::with(Script::Unavailable)
    }

    pub fn failing(message: &str) -> Self {
        Self::with(Script::Failing(message.to_string()))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        match &self.script {
            Script::Reply(text) => Ok(text.clone()),
            Script::Unavailable => Err(Error::GenerationUnavailable("connection refused".into())),
            Script::Failing(message) => Err(Error::Generation(message.clone())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// In-memory reference source
#[derive(Default)]
pub struct FakeReferenceSource {
    search_results: HashMap<String, Vec<String>>,
    articles: HashMap<String, String>,
    ambiguous: HashMap<String, Vec<String>>,
    offline: bool,
    /// (locale, title) of every fetch
    fetches: Mutex<Vec<(String, String)>>,
    search_locales: Mutex<Vec<String>>,
}

impl FakeReferenceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn with_search(mut self, query: &str, titles: &[&str]) -> Self {
        self.search_results
            .insert(query.to_string(), titles.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn with_article(mut self, title: &str, content: &str) -> Self {
        self.articles.insert(title.to_string(), content.to_string());
        self
    }

    pub fn with_ambiguous(mut self, title: &str, options: &[&str]) -> Self {
        self.ambiguous
            .insert(title.to_string(), options.iter().map(|o| o.to_string()).collect());
        self
    }

    pub fn fetched_titles(&self) -> Vec<String> {
        self.fetches.lock().iter().map(|(_, title)| title.clone()).collect()
    }

    pub fn search_locales(&self) -> Vec<String> {
        self.search_locales.lock().clone()
    }
}

impl ReferenceSource for FakeReferenceSource {
    fn search(&self, query: &str, locale: &str, limit: usize) -> Result<Vec<String>> {
        if self.offline {
            return Err(Error::ReferenceSource("network unreachable".into()));
        }
        self.search_locales.lock().push(locale.to_string());
        let mut titles = self.search_results.get(query).cloned().unwrap_or_default();
        titles.truncate(limit);
        Ok(titles)
    }

    fn fetch(&self, title: &str, locale: &str) -> Result<Article> {
        self.fetches.lock().push((locale.to_string(), title.to_string()));
        if let Some(options) = self.ambiguous.get(title) {
            return Err(Error::ReferenceAmbiguous {
                title: title.to_string(),
                options: options.clone(),
            });
        }
        self.articles
            .get(title)
            .map(|content| Article {
                title: title.to_string(),
                content: content.clone(),
            })
            .ok_or_else(|| Error::ReferenceNotFound(title.to_string()))
    }
}
