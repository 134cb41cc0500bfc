//! 🜁 Уровень 3: Логос - генерация текста
//!
//! Генератор получает готовый промпт и возвращает сырой ответ модели.
//! Недоступность модели (`GenerationUnavailable`) отличается от прочих
//! ошибок генерации (`Generation`).

pub mod mistral;
pub mod ollama;

use crate::error::Result;

pub trait Generator: Send + Sync {
    /// Блокирующий вызов без внутреннего таймаута
    fn generate(&self, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

pub use mistral::{MistralGenerator, MistralSettings};
pub use ollama::OllamaGenerator;
