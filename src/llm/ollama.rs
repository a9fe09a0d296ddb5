use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };

use super::{ http_client, usable, GenerationClient, GenerationError, GenerationRequest, GenerationResponse, LlmConfig };

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
}

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    system: String,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateReply {
    response: Option<String>,
}

impl OllamaClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, GenerationError> {
        Ok(Self {
            http: http_client(config.timeout)?,
            base_url: config.base_url.clone().unwrap_or_else(|| "http://localhost:11434".into()),
            completion_model: config.model.clone().unwrap_or_else(|| "cogito:3b".to_string()),
        })
    }
}

#[async_trait]
impl GenerationClient for OllamaClient {
    async fn generate(
        &self,
        request: &GenerationRequest
    ) -> Result<GenerationResponse, GenerationError> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let req = GenerateRequest {
            model: self.completion_model.clone(),
            prompt: request.prompt.clone(),
            system: request.context.clone(),
            stream: false,
        };
        let resp = self.http.post(&url).json(&req).send().await?;
        if !resp.status().is_success() {
            return Err(GenerationError::Status(resp.status().as_u16()));
        }
        let data = resp
            .json::<GenerateReply>().await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        usable(data.response)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
