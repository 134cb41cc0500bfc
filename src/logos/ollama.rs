//! Генерация через Ollama `/api/generate`

use tracing::debug;

use crate::error::{Error, Result};
use crate::logos::Generator;
use crate::priests::ollama::{OllamaClient, OllamaError};

pub struct OllamaGenerator {
    client: OllamaClient,
    model: String,
    temperature: Option<f64>,
}

impl OllamaGenerator {
    pub fn new(client: OllamaClient, model: &str, temperature: Option<f64>) -> Self {
        Self {
            client,
            model: model.to_string(),
            temperature,
        }
    }
}

impl Generator for OllamaGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.model, prompt_chars = prompt.len(), "ollama generate");
        self.client
            .generate(&self.model, prompt, self.temperature)
            .map_err(|e| match e {
                OllamaError::Unreachable(msg) => Error::GenerationUnavailable(msg),
                OllamaError::Failed(msg) => Error::Generation(msg),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
