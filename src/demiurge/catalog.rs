//! Persona Catalog - the static personas
//!
//! Four personas are built in. A personas directory of JSON files can
//! override them by name or add new ones; files that fail to parse or
//! validate are skipped with a warning.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::demiurge::persona::{PersonaProfile, DEFAULT_SENTENCE_CAP};
use crate::error::Result;
use crate::totems::persistence::validate_persona_name;

fn default_emoji() -> String {
    "🎭".to_string()
}

fn default_sentence_cap() -> usize {
    DEFAULT_SENTENCE_CAP
}

/// Persona definition as stored in `config/personas/*.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaDefinition {
    /// Display name; also the key of the persona's index
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_emoji")]
    pub emoji: String,
    /// Who the model is told it is, when it differs from the name
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub directives: Vec<String>,
    /// Name used in "Answer briefly as ...", defaults to the name
    #[serde(default)]
    pub sign_off: Option<String>,
    /// Full template overriding the generated one
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default = "default_sentence_cap")]
    pub sentence_cap: usize,
}

impl PersonaDefinition {
    fn builtin(name: &str, emoji: &str, description: &str, directives: &[&str], sign_off: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            emoji: emoji.to_string(),
            identity: None,
            directives: directives.iter().map(|d| d.to_string()).collect(),
            sign_off: Some(sign_off.to_string()),
            template: None,
            sentence_cap: DEFAULT_SENTENCE_CAP,
        }
    }

    pub fn sign_off(&self) -> &str {
        self.sign_off.as_deref().unwrap_or(&self.name)
    }

    pub fn validate(&self) -> Result<()> {
        validate_persona_name(&self.name)
    }

    pub fn to_profile(&self) -> Result<PersonaProfile> {
        let profile = match &self.template {
            Some(template) => PersonaProfile::new(
                &self.name,
                &self.description,
                self.directives.clone(),
                template,
            )?,
            None => PersonaProfile::from_directives(
                &self.name,
                &self.description,
                self.identity.as_deref(),
                self.directives.clone(),
                self.sign_off(),
            )?,
        };
        Ok(profile.with_sentence_cap(self.sentence_cap.max(1)))
    }
}

pub fn builtin_personas() -> Vec<PersonaDefinition> {
    let mut white = PersonaDefinition::builtin(
        "Walter White",
        "🧪",
        "Chemistry teacher turned drug kingpin in Breaking Bad.",
        &[
            "Chemistry knowledge",
            "Strategic thinking",
            "Moments of pride or ego",
            "Justified rationalization",
            "References to your family or your \"business\"",
            "Occasional use of your alter ego \"Heisenberg\"",
        ],
        "Walter White",
    );
    white.identity = Some("Walter White from Breaking Bad".to_string());

    vec![
        PersonaDefinition::builtin(
            "Albert Einstein",
            "🧠",
            "Theoretical physicist and creator of the theory of relativity.",
            &[
                "Scientific insights",
                "Philosophical reflections",
                "Occasional wit",
                "Simple language",
            ],
            "Einstein",
        ),
        PersonaDefinition::builtin(
            "Franz Kafka",
            "📚",
            "Existentialist writer known for 'The Metamorphosis' and 'The Trial'.",
            &[
                "Existential themes",
                "Absurdist perspectives",
                "Subtle dark humor",
                "Melancholic undertones",
                "References to alienation and bureaucracy",
            ],
            "Kafka",
        ),
        PersonaDefinition::builtin(
            "Sherlock Holmes",
            "🔍",
            "Fictional detective famed for logical reasoning and keen observation.",
            &[
                "Deductive reasoning",
                "Keen observations",
                "Logical analysis",
                "Victorian-era English",
                "Occasional references to Dr. Watson or your cases",
            ],
            "Sherlock Holmes",
        ),
        white,
    ]
}

/// Ordered set of static persona definitions
#[derive(Debug, Clone)]
pub struct PersonaCatalog {
    definitions: Vec<PersonaDefinition>,
}

impl PersonaCatalog {
    pub fn builtin() -> Self {
        Self {
            definitions: builtin_personas(),
        }
    }

    /// Built-ins merged with every valid `*.json` in `dir` (if it exists)
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut catalog = Self::builtin();
        if !dir.is_dir() {
            return Ok(catalog);
        }

        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            match Self::load_definition(&path) {
                Ok(definition) => {
                    info!(persona = %definition.name, file = %path.display(), "persona definition loaded");
                    catalog.upsert(definition);
                }
                Err(e) => warn!(file = %path.display(), error = %e, "skipping persona definition"),
            }
        }

        Ok(catalog)
    }

    fn load_definition(path: &Path) -> Result<PersonaDefinition> {
        let definition: PersonaDefinition = serde_json::from_str(&fs::read_to_string(path)?)?;
        definition.validate()?;
        // surface template errors at load time rather than on first use
        definition.to_profile()?;
        Ok(definition)
    }

    /// Replace a definition with the same name or append
    pub fn upsert(&mut self, definition: PersonaDefinition) {
        match self.definitions.iter_mut().find(|d| d.name == definition.name) {
            Some(existing) => *existing = definition,
            None => self.definitions.push(definition),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PersonaDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.definitions.iter().map(|d| d.name.clone()).collect()
    }

    pub fn definitions(&self) -> &[PersonaDefinition] {
        &self.definitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtins_render_trait_prompts() {
        let catalog = PersonaCatalog::builtin();
        assert_eq!(
            catalog.names(),
            vec!["Albert Einstein", "Franz Kafka", "Sherlock Holmes", "Walter White"]
        );

        for definition in catalog.definitions() {
            definition.validate().unwrap();
            definition.to_profile().unwrap();
        }

        let holmes = catalog.get("Sherlock Holmes").unwrap().to_profile().unwrap();
        let prompt = holmes.render(&["221B".to_string()], "Who?");
        assert!(prompt.contains("- Deductive reasoning\n"));
        assert!(prompt.ends_with("Answer briefly as Sherlock Holmes:"));

        let white = catalog.get("Walter White").unwrap().to_profile().unwrap();
        let prompt = white.render(&[], "Who?");
        assert!(prompt.starts_with("You are Walter White from Breaking Bad."));
        assert!(prompt.contains("\"Heisenberg\""));
    }

    #[test]
    fn test_load_dir_overrides_and_adds() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("kafka.json"),
            r#"{"name": "Franz Kafka", "directives": ["Brevity"], "sign_off": "K."}"#,
        )
        .unwrap();
        fs::write(
            temp_dir.path().join("curie.json"),
            r#"{"name": "Marie Curie", "emoji": "☢️", "description": "Chemist"}"#,
        )
        .unwrap();
        fs::write(temp_dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(
            temp_dir.path().join("bad_template.json"),
            r#"{"name": "Bad", "template": "no placeholders"}"#,
        )
        .unwrap();
        fs::write(temp_dir.path().join("escape.json"), r#"{"name": "../etc"}"#).unwrap();

        let catalog = PersonaCatalog::load_dir(temp_dir.path()).unwrap();
        assert_eq!(catalog.definitions().len(), 5);

        let kafka = catalog.get("Franz Kafka").unwrap();
        assert_eq!(kafka.directives, vec!["Brevity"]);
        assert_eq!(kafka.sign_off(), "K.");
        assert_eq!(kafka.emoji, "🎭");

        let curie = catalog.get("Marie Curie").unwrap();
        assert_eq!(curie.sign_off(), "Marie Curie");
        assert_eq!(curie.sentence_cap, DEFAULT_SENTENCE_CAP);
        assert!(!catalog.contains("Bad"));
    }

    #[test]
    fn test_missing_dir_is_builtin() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = PersonaCatalog::load_dir(&temp_dir.path().join("absent")).unwrap();
        assert_eq!(catalog.names().len(), 4);
    }
}
