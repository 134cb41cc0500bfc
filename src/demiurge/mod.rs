//! Demiurge Level - Personas
//!
//! Who answers and how: the persona catalog, profiles and prompt
//! templates, response shaping, the retrieval-augmented answerer, runtime
//! persona creation, and the registry that ties them together.

pub mod answerer;
pub mod catalog;
pub mod dynamic;
pub mod persona;
pub mod registry;
pub mod shaper;
pub mod template;

pub use answerer::{
    AnswerSettings, AnswererState, AskError, RetrievalAugmentedAnswerer, NOT_READY_MESSAGE,
    SERVICE_UNAVAILABLE_MESSAGE,
};
pub use catalog::{PersonaCatalog, PersonaDefinition};
pub use dynamic::{DynamicKnowledgeBuilder, PersonaBinding};
pub use persona::{create_prompt_template, normalize_traits, PersonaProfile};
pub use registry::{PersonaHandle, PersonaRegistry, RegistrationOutcome};
pub use shaper::{ResponseShaper, SentenceCapShaper, Verbatim};
pub use template::PromptTemplate;
