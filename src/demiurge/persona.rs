//! Persona Profile - who answers and how the prompt is assembled

use crate::demiurge::template::{escape_braces, PromptTemplate};
use crate::error::Result;

/// Sentences kept when a long answer is trimmed
pub const DEFAULT_SENTENCE_CAP: usize = 2;

#[derive(Debug, Clone)]
pub struct PersonaProfile {
    name: String,
    description: String,
    style_directives: Vec<String>,
    template: PromptTemplate,
    response_sentence_cap: usize,
}

impl PersonaProfile {
    /// Build from an explicit template; fails on a malformed template
    pub fn new(
        name: &str,
        description: &str,
        style_directives: Vec<String>,
        template: &str,
    ) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            description: description.to_string(),
            style_directives,
            template: PromptTemplate::parse(template)?,
            response_sentence_cap: DEFAULT_SENTENCE_CAP,
        })
    }

    /// Build with the standard concise-answer template
    pub fn from_directives(
        name: &str,
        description: &str,
        identity: Option<&str>,
        style_directives: Vec<String>,
        sign_off: &str,
    ) -> Result<Self> {
        let template = create_prompt_template(identity.unwrap_or(name), &style_directives, sign_off);
        Self::new(name, description, style_directives, &template)
    }

    pub fn with_sentence_cap(mut self, cap: usize) -> Self {
        self.response_sentence_cap = cap;
        self
    }

    /// Retrieved texts are joined in retrieval order; nothing is prepended
    pub fn render(&self, context: &[String], question: &str) -> String {
        self.template.render(&context.join("\n\n"), question)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn style_directives(&self) -> &[String] {
        &self.style_directives
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn response_sentence_cap(&self) -> usize {
        self.response_sentence_cap
    }
}

/// Template source for a persona described by trait lines
pub fn create_prompt_template(identity: &str, traits: &[String], sign_off: &str) -> String {
    let mut prompt = format!(
        "You are {}. Respond concisely (1-2 short paragraphs max) with:\n",
        escape_braces(identity)
    );
    for line in traits {
        prompt.push_str("- ");
        prompt.push_str(&escape_braces(line));
        prompt.push('\n');
    }
    prompt.push_str("\nContext:\n{context}\n\nQuestion:\n{question}\n\nAnswer briefly as ");
    prompt.push_str(&escape_braces(sign_off));
    prompt.push(':');
    prompt
}

/// One trait per line, bullets and blank lines dropped
pub fn normalize_traits(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| line.trim().trim_start_matches(['-', '*', '•']).trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
