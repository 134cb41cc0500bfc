//! Persona Registry - the consumer-facing surface
//!
//! Static personas come from the catalog and are bound to their stored
//! index on first use. Dynamic personas are registered at runtime from
//! the reference source and live until the registry is dropped.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::demiurge::answerer::{AnswerSettings, AnswererState, RetrievalAugmentedAnswerer};
use crate::demiurge::catalog::{PersonaCatalog, PersonaDefinition};
use crate::demiurge::dynamic::DynamicKnowledgeBuilder;
use crate::demiurge::persona::create_prompt_template;
use crate::error::Error;
use crate::logos::Generator;
use crate::priests::embeddings::Embedder;
use crate::totems::persistence::{validate_persona_name, IndexStore};

const DYNAMIC_EMOJI: &str = "🎭";

/// Result of a runtime registration, shown to the user as is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOutcome {
    pub success: bool,
    pub message: String,
}

impl RegistrationOutcome {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
        }
    }
}

/// Cheap, cloneable handle to one persona
#[derive(Clone)]
pub struct PersonaHandle {
    name: String,
    emoji: String,
    description: String,
    dynamic: bool,
    answerer: Arc<RetrievalAugmentedAnswerer>,
}

impl PersonaHandle {
    /// Never fails; errors come back as displayable strings
    pub fn ask(&self, question: &str) -> String {
        self.answerer.ask(question)
    }

    pub fn state(&self) -> AnswererState {
        self.answerer.state()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn emoji(&self) -> &str {
        &self.emoji
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }
}

pub struct PersonaRegistry {
    catalog: PersonaCatalog,
    store: IndexStore,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    settings: AnswerSettings,
    builder: Option<DynamicKnowledgeBuilder>,
    bound: Mutex<HashMap<String, PersonaHandle>>,
    dynamic: RwLock<Vec<PersonaHandle>>,
}

impl PersonaRegistry {
    pub fn new(
        catalog: PersonaCatalog,
        store: IndexStore,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        settings: AnswerSettings,
    ) -> Self {
        Self {
            catalog,
            store,
            embedder,
            generator,
            settings,
            builder: None,
            bound: Mutex::new(HashMap::new()),
            dynamic: RwLock::new(Vec::new()),
        }
    }

    pub fn with_dynamic_builder(mut self, builder: DynamicKnowledgeBuilder) -> Self {
        self.builder = Some(builder);
        self
    }

    /// Static personas first, then dynamic ones in registration order
    pub fn persona_names(&self) -> Vec<String> {
        let mut names = self.catalog.names();
        names.extend(self.dynamic.read().iter().map(|h| h.name.clone()));
        names
    }

    pub fn catalog(&self) -> &PersonaCatalog {
        &self.catalog
    }

    pub fn handle(&self, name: &str) -> Option<PersonaHandle> {
        if let Some(definition) = self.catalog.get(name) {
            if let Some(handle) = self.bound.lock().get(name) {
                return Some(handle.clone());
            }
            // index is read without the lock; the first finished binding wins
            let handle = self.bind_static(definition)?;
            let mut bound = self.bound.lock();
            return Some(bound.entry(name.to_string()).or_insert(handle).clone());
        }

        self.dynamic.read().iter().find(|h| h.name == name).cloned()
    }

    fn bind_static(&self, definition: &PersonaDefinition) -> Option<PersonaHandle> {
        let profile = match definition.to_profile() {
            Ok(profile) => profile,
            Err(e) => {
                error!(persona = %definition.name, error = %e, "persona definition unusable");
                return None;
            }
        };

        let mut answerer = RetrievalAugmentedAnswerer::new(
            Arc::new(profile),
            self.embedder.clone(),
            self.generator.clone(),
            self.settings,
        );

        match self.store.load(&definition.name, self.embedder.as_ref()) {
            Ok(index) => {
                let entries = index.len();
                if answerer.bind(Arc::new(index)).is_ok() {
                    info!(persona = %definition.name, entries, "persona index bound");
                }
            }
            Err(Error::IndexNotFound(path)) => {
                answerer.mark_unavailable(&format!("no index at {}", path.display()));
            }
            Err(e) => answerer.mark_unavailable(&e.to_string()),
        }

        Some(PersonaHandle {
            name: definition.name.clone(),
            emoji: definition.emoji.clone(),
            description: definition.description.clone(),
            dynamic: false,
            answerer: Arc::new(answerer),
        })
    }

    /// Build a persona from the reference source and make it available.
    /// Re-registering a dynamic name replaces the earlier persona.
    pub fn register_dynamic_persona(
        &self,
        name: &str,
        description: &str,
        style_directives: &[String],
    ) -> RegistrationOutcome {
        let name = name.trim();
        if let Err(e) = validate_persona_name(name) {
            return RegistrationOutcome::failed(format!("Cannot create persona: {e}"));
        }
        if self.catalog.contains(name) {
            return RegistrationOutcome::failed(format!(
                "{name} is a built-in persona and cannot be replaced."
            ));
        }
        let Some(builder) = &self.builder else {
            return RegistrationOutcome::failed("Dynamic personas are not enabled.".to_string());
        };

        let template = create_prompt_template(name, style_directives, name);
        let binding = match builder.build_from_reference_source(name, description, &template) {
            Ok(binding) => binding,
            Err(Error::ReferenceNotFound(_)) => {
                return RegistrationOutcome::failed(format!("No information found about {name}."))
            }
            Err(e) => {
                warn!(persona = name, error = %e, "dynamic persona build failed");
                return RegistrationOutcome::failed(format!(
                    "An error occurred while creating the index: {e}"
                ));
            }
        };

        let chunk_count = binding.chunk_count;
        let handle = PersonaHandle {
            name: name.to_string(),
            emoji: DYNAMIC_EMOJI.to_string(),
            description: description.to_string(),
            dynamic: true,
            answerer: Arc::new(binding.answerer),
        };

        let mut dynamic = self.dynamic.write();
        match dynamic.iter_mut().find(|h| h.name == name) {
            Some(existing) => *existing = handle,
            None => dynamic.push(handle),
        }

        RegistrationOutcome {
            success: true,
            message: format!("Index successfully created for {name} using {chunk_count} chunks."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demiurge::answerer::NOT_READY_MESSAGE;
    use crate::priests::HashingEmbedder;
    use crate::testing::{chunks, FakeReferenceSource, ScriptedGenerator};
    use crate::totems::retrieval::VectorIndex;
    use tempfile::TempDir;

    fn registry(indexes: &TempDir, source: FakeReferenceSource) -> PersonaRegistry {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(64));
        let generator: Arc<dyn Generator> = Arc::new(ScriptedGenerator::reply("Elementary."));
        let builder = DynamicKnowledgeBuilder::new(Arc::new(source), embedder.clone(), generator.clone());
        PersonaRegistry::new(
            PersonaCatalog::builtin(),
            IndexStore::new(indexes.path()),
            embedder,
            generator,
            AnswerSettings::default(),
        )
        .with_dynamic_builder(builder)
    }

    fn curie_source() -> FakeReferenceSource {
        FakeReferenceSource::new()
            .with_search("Marie Curie", &["Marie Curie"])
            .with_article("Marie Curie", "Marie Curie discovered polonium and radium.")
    }

    #[test]
    fn test_missing_index_only_affects_that_persona() {
        let indexes = TempDir::new().unwrap();
        let store = IndexStore::new(indexes.path());
        let index = VectorIndex::build(
            "Sherlock Holmes",
            chunks(&["Holmes lives at 221B Baker Street"]),
            &HashingEmbedder::new(64),
        )
        .unwrap();
        store.save(&index).unwrap();

        let registry = registry(&indexes, FakeReferenceSource::new());

        let holmes = registry.handle("Sherlock Holmes").unwrap();
        assert_eq!(holmes.state(), AnswererState::Ready);
        assert_eq!(holmes.ask("Where do you live?"), "Elementary.");
        assert_eq!(holmes.emoji(), "🔍");

        let kafka = registry.handle("Franz Kafka").unwrap();
        assert!(matches!(kafka.state(), AnswererState::Unavailable(_)));
        assert_eq!(kafka.ask("Who are you?"), NOT_READY_MESSAGE);

        assert!(registry.handle("Nobody").is_none());
    }

    #[test]
    fn test_register_dynamic_persona() {
        let indexes = TempDir::new().unwrap();
        let registry = registry(&indexes, curie_source());

        let outcome = registry.register_dynamic_persona(
            "Marie Curie",
            "Physicist and chemist",
            &["Scientific rigor".to_string()],
        );
        assert_eq!(
            outcome,
            RegistrationOutcome {
                success: true,
                message: "Index successfully created for Marie Curie using 1 chunks.".to_string(),
            }
        );

        let names = registry.persona_names();
        assert_eq!(names.len(), 5);
        assert_eq!(names.last().map(String::as_str), Some("Marie Curie"));

        let curie = registry.handle("Marie Curie").unwrap();
        assert!(curie.is_dynamic());
        assert_eq!(curie.ask("What did you discover?"), "Elementary.");

        // dynamic indexes are never persisted
        assert!(!IndexStore::new(indexes.path()).exists("Marie Curie"));
    }

    #[test]
    fn test_reregistering_replaces() {
        let indexes = TempDir::new().unwrap();
        let registry = registry(&indexes, curie_source());

        assert!(registry.register_dynamic_persona("Marie Curie", "first", &[]).success);
        assert!(registry.register_dynamic_persona("Marie Curie", "second", &[]).success);

        assert_eq!(registry.persona_names().len(), 5);
        assert_eq!(registry.handle("Marie Curie").unwrap().description(), "second");
    }

    #[test]
    fn test_registration_failures() {
        let indexes = TempDir::new().unwrap();
        let registry = registry(&indexes, FakeReferenceSource::new());

        let outcome = registry.register_dynamic_persona("Albert Einstein", "", &[]);
        assert!(!outcome.success);
        assert!(outcome.message.contains("built-in"));

        let outcome = registry.register_dynamic_persona("Ghost", "", &[]);
        assert!(!outcome.success);
        assert_eq!(outcome.message, "No information found about Ghost.");

        let outcome = registry.register_dynamic_persona("../../etc", "", &[]);
        assert!(!outcome.success);

        assert_eq!(registry.persona_names().len(), 4);
    }

    #[test]
    fn test_without_builder() {
        let indexes = TempDir::new().unwrap();
        let registry = PersonaRegistry::new(
            PersonaCatalog::builtin(),
            IndexStore::new(indexes.path()),
            Arc::new(HashingEmbedder::new(8)),
            Arc::new(ScriptedGenerator::reply("x")),
            AnswerSettings::default(),
        );
        let outcome = registry.register_dynamic_persona("Marie Curie", "", &[]);
        assert_eq!(outcome.message, "Dynamic personas are not enabled.");
    }

    #[test]
    fn test_concurrent_first_lookups_share_one_binding() {
        let indexes = TempDir::new().unwrap();
        let store = IndexStore::new(indexes.path());
        for (persona, text) in [
            ("Sherlock Holmes", "Holmes lives at 221B Baker Street"),
            ("Albert Einstein", "Einstein developed the theory of relativity"),
        ] {
            let index =
                VectorIndex::build(persona, chunks(&[text]), &HashingEmbedder::new(64)).unwrap();
            store.save(&index).unwrap();
        }
        let registry = registry(&indexes, FakeReferenceSource::new());

        let handles: Vec<PersonaHandle> = std::thread::scope(|scope| {
            let workers: Vec<_> = ["Sherlock Holmes", "Albert Einstein", "Sherlock Holmes", "Albert Einstein"]
                .into_iter()
                .map(|name| {
                    let registry = &registry;
                    scope.spawn(move || registry.handle(name).unwrap())
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        for handle in &handles {
            assert_eq!(handle.state(), AnswererState::Ready);
            let cached = registry.handle(handle.name()).unwrap();
            assert!(Arc::ptr_eq(&handle.answerer, &cached.answerer));
        }
    }

    #[test]
    fn test_static_handles_are_cached() {
        let indexes = TempDir::new().unwrap();
        let registry = registry(&indexes, FakeReferenceSource::new());
        let first = registry.handle("Franz Kafka").unwrap();
        let second = registry.handle("Franz Kafka").unwrap();
        assert!(Arc::ptr_eq(&first.answerer, &second.answerer));
    }
}
