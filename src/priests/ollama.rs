//! 🜂 Уровень 1: Жрецы Железа - Ollama
//!
//! Блокирующий HTTP клиент к локальному Ollama серверу:
//! `/api/embed` для эмбеддингов и `/api/generate` для генерации.
//! Ошибки соединения отделены от прочих ошибок, чтобы отвечающий
//! слой мог показать "сервис недоступен".

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::error::{Error, Result};
use crate::priests::embeddings::Embedder;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ошибка транспорта до классификации вызывающей стороной
#[derive(Debug, Error)]
pub enum OllamaError {
    /// Сервер не отвечает (connect/timeout)
    #[error("ollama unreachable: {0}")]
    Unreachable(String),
    /// Сервер ответил, но запрос не выполнен
    #[error("ollama request failed: {0}")]
    Failed(String),
}

impl OllamaError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            OllamaError::Unreachable(e.to_string())
        } else {
            OllamaError::Failed(e.to_string())
        }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Клиент Ollama API
#[derive(Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
}

impl OllamaClient {
    /// Создает клиент без таймаута: генерация может идти столько,
    /// сколько длится инференс
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| Error::GenerationUnavailable(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn embed(&self, model: &str, input: &[String]) -> std::result::Result<Vec<Vec<f32>>, OllamaError> {
        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&EmbedRequest { model, input })
            .send()
            .map_err(OllamaError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(OllamaError::Failed(format!("{status}: {body}")));
        }

        let parsed: EmbedResponse = response.json().map_err(OllamaError::from_reqwest)?;
        debug!(model, count = parsed.embeddings.len(), "ollama embed");
        Ok(parsed.embeddings)
    }

    pub fn generate(
        &self,
        model: &str,
        prompt: &str,
        temperature: Option<f64>,
    ) -> std::result::Result<String, OllamaError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: temperature.map(|temperature| GenerateOptions { temperature }),
        };
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .map_err(OllamaError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(OllamaError::Failed(format!("{status}: {body}")));
        }

        let parsed: GenerateResponse = response.json().map_err(OllamaError::from_reqwest)?;
        Ok(parsed.response)
    }
}

/// Эмбеддер поверх Ollama (`all-minilm` и т.п.)
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
    embedding_dim: usize,
}

impl OllamaEmbedder {
    /// `embedding_dim` задается конфигурацией; каждый ответ сервера сверяется с ней
    pub fn new(client: OllamaClient, model: &str, embedding_dim: usize) -> Self {
        Self {
            client,
            model: model.to_string(),
            embedding_dim,
        }
    }

    fn check(&self, embeddings: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Vec<f32>>> {
        if embeddings.len() != expected {
            return Err(Error::EmbeddingUnavailable(format!(
                "asked for {expected} embeddings, got {}",
                embeddings.len()
            )));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.embedding_dim) {
            return Err(Error::DimensionMismatch {
                expected: self.embedding_dim,
                actual: bad.len(),
            });
        }
        Ok(embeddings)
    }
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text.to_string()])?;
        batch
            .pop()
            .ok_or_else(|| Error::EmbeddingUnavailable("empty embedding response".into()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self.client.embed(&self.model, texts).map_err(|e| match e {
            OllamaError::Unreachable(msg) | OllamaError::Failed(msg) => {
                Error::EmbeddingUnavailable(msg)
            }
        })?;
        self.check(embeddings, texts.len())
    }

    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_unreachable_server_is_embedding_unavailable() {
        // порт 9 (discard) на localhost как правило закрыт
        let client = OllamaClient::new("http://127.0.0.1:9").unwrap();
        let embedder = OllamaEmbedder::new(client, "all-minilm", 384);
        let err = embedder.embed("hello").unwrap_err();
        assert!(err.is_service_unavailable());
    }

    #[test]
    fn test_transport_errors_display() {
        let err = OllamaClient::new("http://127.0.0.1:9")
            .unwrap()
            .generate("llama3.2", "hi", None)
            .unwrap_err();
        assert!(matches!(err, OllamaError::Unreachable(_)));
        assert!(err.to_string().starts_with("ollama unreachable: "));

        let failed = OllamaError::Failed("404 Not Found: model 'x' not found".into());
        assert_eq!(
            failed.to_string(),
            "ollama request failed: 404 Not Found: model 'x' not found"
        );
        let boxed: Box<dyn std::error::Error> = Box::new(failed);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn test_dimension_check() {
        let client = OllamaClient::new(DEFAULT_BASE_URL).unwrap();
        let embedder = OllamaEmbedder::new(client, "all-minilm", 3);
        let err = embedder.check(vec![vec![0.0; 4]], 1).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                actual: 4
            }
        ));
        assert!(embedder.check(vec![vec![0.0; 3]], 1).is_ok());
    }

    #[test]
    fn test_generate_request_shape() {
        let request = GenerateRequest {
            model: "llama3.2",
            prompt: "hi",
            stream: false,
            options: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["stream"], false);
        assert!(json.get("options").is_none());
    }
}
