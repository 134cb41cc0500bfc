//! Dynamic Knowledge Builder - personas created at runtime
//!
//! The knowledge base of a new persona comes from one encyclopedia article
//! found by the persona's name. The index lives only in memory for the
//! session and is never written to the index store.

use std::sync::Arc;
use tracing::{info, info_span};

use crate::demiurge::answerer::{AnswerSettings, RetrievalAugmentedAnswerer};
use crate::demiurge::persona::{PersonaProfile, DEFAULT_SENTENCE_CAP};
use crate::error::{Error, Result};
use crate::logos::Generator;
use crate::priests::embeddings::Embedder;
use crate::totems::chunker::{ChunkSettings, Chunker};
use crate::totems::reference::{Article, LocalePolicy, ReferenceSource};
use crate::totems::retrieval::VectorIndex;

/// How many search hits to ask the reference source for
pub const DEFAULT_SEARCH_RESULTS: usize = 3;

/// A freshly built persona, ready to answer
pub struct PersonaBinding {
    pub answerer: RetrievalAugmentedAnswerer,
    pub article_title: String,
    pub chunk_count: usize,
    pub locale: String,
}

pub struct DynamicKnowledgeBuilder {
    source: Arc<dyn ReferenceSource>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    locales: LocalePolicy,
    search_results: usize,
    chunking: ChunkSettings,
    answer_settings: AnswerSettings,
    sentence_cap: usize,
}

impl DynamicKnowledgeBuilder {
    pub fn new(
        source: Arc<dyn ReferenceSource>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            source,
            embedder,
            generator,
            locales: LocalePolicy::default(),
            search_results: DEFAULT_SEARCH_RESULTS,
            chunking: ChunkSettings::DYNAMIC,
            answer_settings: AnswerSettings::default(),
            sentence_cap: DEFAULT_SENTENCE_CAP,
        }
    }

    pub fn with_locales(mut self, locales: LocalePolicy) -> Self {
        self.locales = locales;
        self
    }

    pub fn with_search_results(mut self, count: usize) -> Self {
        self.search_results = count.max(1);
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkSettings) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_answer_settings(mut self, settings: AnswerSettings) -> Self {
        self.answer_settings = settings;
        self
    }

    pub fn with_sentence_cap(mut self, cap: usize) -> Self {
        self.sentence_cap = cap.max(1);
        self
    }

    /// Search, fetch, chunk, embed and bind. Blocking; takes seconds.
    pub fn build_from_reference_source(
        &self,
        persona_name: &str,
        description: &str,
        style_template: &str,
    ) -> Result<PersonaBinding> {
        let _span = info_span!("dynamic_build", persona = persona_name).entered();

        // template errors surface before any network traffic
        let profile = PersonaProfile::new(persona_name, description, Vec::new(), style_template)?
            .with_sentence_cap(self.sentence_cap);
        let chunker = Chunker::from_settings(self.chunking)?;

        let locale = self.locales.select(persona_name).to_string();
        let titles = self.source.search(persona_name, &locale, self.search_results)?;
        let top = titles
            .first()
            .ok_or_else(|| Error::ReferenceNotFound(persona_name.to_string()))?;
        info!(%locale, candidates = titles.len(), top = %top, "reference search");

        let article = self.fetch_resolving_ambiguity(top, &locale)?;

        let chunks: Vec<_> = chunker.split(&article.content, &article.title).collect();
        let chunk_count = chunks.len();
        let index = VectorIndex::build(persona_name, chunks, self.embedder.as_ref())?;

        let mut answerer = RetrievalAugmentedAnswerer::new(
            Arc::new(profile),
            self.embedder.clone(),
            self.generator.clone(),
            self.answer_settings,
        );
        answerer.bind(Arc::new(index))?;

        info!(article = %article.title, chunks = chunk_count, "dynamic persona ready");

        Ok(PersonaBinding {
            answerer,
            article_title: article.title,
            chunk_count,
            locale,
        })
    }

    fn fetch_resolving_ambiguity(&self, title: &str, locale: &str) -> Result<Article> {
        match self.source.fetch(title, locale) {
            Err(Error::ReferenceAmbiguous { title, options }) => {
                let choice = pick_alternative(&title, &options)
                    .ok_or_else(|| Error::ReferenceAmbiguous {
                        title: title.clone(),
                        options: options.clone(),
                    })?
                    .to_string();
                info!(ambiguous = %title, chosen = %choice, "resolved disambiguation");
                self.source.fetch(&choice, locale)
            }
            other => other,
        }
    }
}

/// First listed option that is a real article: not the ambiguous title
/// itself and not another disambiguation page. Falls back to the first.
pub fn pick_alternative<'a>(title: &str, options: &'a [String]) -> Option<&'a str> {
    options
        .iter()
        .find(|option| option.as_str() != title && !option.ends_with("(disambiguation)"))
        .or_else(|| options.first())
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demiurge::answerer::AnswererState;
    use crate::demiurge::persona::create_prompt_template;
    use crate::priests::HashingEmbedder;
    use crate::testing::{FailingEmbedder, FakeReferenceSource, ScriptedGenerator};

    fn template(name: &str) -> String {
        create_prompt_template(name, &["Curiosity".to_string()], name)
    }

    fn builder(source: FakeReferenceSource) -> (DynamicKnowledgeBuilder, Arc<FakeReferenceSource>) {
        let source = Arc::new(source);
        let builder = DynamicKnowledgeBuilder::new(
            source.clone(),
            Arc::new(HashingEmbedder::new(64)),
            Arc::new(ScriptedGenerator::reply("Radium glows.")),
        );
        (builder, source)
    }

    #[test]
    fn test_builds_ready_answerer() {
        let article = "Marie Curie was a physicist and chemist. ".repeat(30);
        let (builder, source) = builder(
            FakeReferenceSource::new()
                .with_search("Marie Curie", &["Marie Curie", "Pierre Curie"])
                .with_article("Marie Curie", &article),
        );

        let binding = builder
            .build_from_reference_source("Marie Curie", "Chemist", &template("Marie Curie"))
            .unwrap();

        assert_eq!(binding.locale, "en");
        assert_eq!(binding.article_title, "Marie Curie");
        // 1260 chars, window 500 step 450
        assert_eq!(binding.chunk_count, 3);
        assert_eq!(binding.answerer.state(), AnswererState::Ready);
        assert_eq!(binding.answerer.ask("What glows?"), "Radium glows.");
        assert_eq!(source.fetched_titles(), vec!["Marie Curie"]);
    }

    #[test]
    fn test_non_ascii_name_uses_secondary_locale() {
        let (builder, source) = builder(
            FakeReferenceSource::new()
                .with_search("صلاح الدين", &["صلاح الدين الأيوبي"])
                .with_article("صلاح الدين الأيوبي", "سلطان مصر والشام"),
        );
        let binding = builder
            .build_from_reference_source("صلاح الدين", "", &template("صلاح الدين"))
            .unwrap();
        assert_eq!(binding.locale, "ar");
        assert_eq!(source.search_locales(), vec!["ar"]);
    }

    #[test]
    fn test_disambiguation_picks_first_real_alternative() {
        let (builder, source) = builder(
            FakeReferenceSource::new()
                .with_search("Mercury", &["Mercury"])
                .with_ambiguous("Mercury", &["Title A (disambiguation)", "Title B", "Title C"])
                .with_article("Title B", "Title B is the right article.")
                .with_article("Title C", "Title C is not."),
        );
        let binding = builder
            .build_from_reference_source("Mercury", "", &template("Mercury"))
            .unwrap();
        assert_eq!(binding.article_title, "Title B");
        assert_eq!(source.fetched_titles(), vec!["Mercury", "Title B"]);
    }

    #[test]
    fn test_nothing_found() {
        let (builder, _) = builder(FakeReferenceSource::new());
        let err = builder
            .build_from_reference_source("Nobody Atall", "", &template("Nobody Atall"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::ReferenceNotFound(ref name) if name == "Nobody Atall"));
        assert_eq!(err.to_string(), "no information found about Nobody Atall");
    }

    #[test]
    fn test_malformed_template_fails_before_search() {
        let (builder, source) = builder(FakeReferenceSource::new());
        let err = builder
            .build_from_reference_source("Marie Curie", "", "no placeholders here")
            .err()
            .unwrap();
        assert!(matches!(err, Error::MalformedTemplate(_)));
        assert!(source.search_locales().is_empty());
    }

    #[test]
    fn test_network_and_embedding_failures_propagate() {
        let (builder, _) = builder(FakeReferenceSource::offline());
        let err = builder
            .build_from_reference_source("Ada Lovelace", "", &template("Ada Lovelace"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::ReferenceSource(_)));

        let builder = DynamicKnowledgeBuilder::new(
            Arc::new(
                FakeReferenceSource::new()
                    .with_search("Ada Lovelace", &["Ada Lovelace"])
                    .with_article("Ada Lovelace", "Wrote the first program."),
            ),
            Arc::new(FailingEmbedder::new(64)),
            Arc::new(ScriptedGenerator::reply("unused")),
        );
        let err = builder
            .build_from_reference_source("Ada Lovelace", "", &template("Ada Lovelace"))
            .err()
            .unwrap();
        assert!(err.is_service_unavailable());
    }

    #[test]
    fn test_pick_alternative() {
        let options: Vec<String> = ["Mercury", "Mercury (disambiguation)", "Mercury (planet)"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(pick_alternative("Mercury", &options), Some("Mercury (planet)"));

        let only_self = vec!["Mercury".to_string()];
        assert_eq!(pick_alternative("Mercury", &only_self), Some("Mercury"));
        assert_eq!(pick_alternative("Mercury", &[]), None);
    }
}
