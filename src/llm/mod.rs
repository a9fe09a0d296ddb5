pub mod endpoint;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use self::endpoint::EndpointClient;
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Generation endpoint returned status {0}")]
    Status(u16),
    #[error("Generation response is malformed: {0}")]
    Malformed(String),
    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Generator configuration error: {0}")]
    Config(String),
}

/// Body sent to the generation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub response: String,
}

#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest
    ) -> Result<GenerationResponse, GenerationError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorType {
    Endpoint,
    Ollama,
    OpenAI,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseGeneratorTypeError {
    message: String,
}

impl fmt::Display for ParseGeneratorTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseGeneratorTypeError {}

impl FromStr for GeneratorType {
    type Err = ParseGeneratorTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "endpoint" => Ok(GeneratorType::Endpoint),
            "ollama" => Ok(GeneratorType::Ollama),
            "openai" => Ok(GeneratorType::OpenAI),
            _ =>
                Err(ParseGeneratorTypeError {
                    message: format!("Invalid generator type: '{}'", s),
                }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub generator_type: GeneratorType,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            generator_type: GeneratorType::Endpoint,
            api_key: None,
            model: None,
            base_url: None,
            timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, GenerationError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Rejects a reply with no usable text.
pub(crate) fn usable(text: Option<String>) -> Result<GenerationResponse, GenerationError> {
    match text {
        Some(response) if !response.trim().is_empty() => Ok(GenerationResponse { response }),
        Some(_) => Err(GenerationError::Malformed("empty response field".into())),
        None => Err(GenerationError::Malformed("missing response field".into())),
    }
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn GenerationClient>, GenerationError> {
    let client: Arc<dyn GenerationClient> = match config.generator_type {
        GeneratorType::Endpoint => Arc::new(EndpointClient::from_config(config)?),
        GeneratorType::Ollama => Arc::new(OllamaClient::from_config(config)?),
        GeneratorType::OpenAI => Arc::new(OpenAIChatClient::from_config(config)?),
    };
    Ok(client)
}
