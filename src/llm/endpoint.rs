use async_trait::async_trait;
use log::debug;
use reqwest::header::AUTHORIZATION;
use reqwest::Client as HttpClient;
use serde_json::Value as JsonValue;

use super::{ http_client, usable, GenerationClient, GenerationError, GenerationRequest, GenerationResponse, LlmConfig };

/// Posts `{prompt, context}` to a hosted generation function and expects
/// `{response}` back.
#[derive(Debug)]
pub struct EndpointClient {
    http: HttpClient,
    url: String,
    api_key: Option<String>,
}

impl EndpointClient {
    pub fn new(
        url: String,
        api_key: Option<String>,
        timeout: std::time::Duration
    ) -> Result<Self, GenerationError> {
        Ok(Self {
            http: http_client(timeout)?,
            url,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, GenerationError> {
        let url = config.base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| GenerationError::Config("GENERATION_URL is required for the endpoint generator".into()))?;
        Self::new(url, config.api_key.clone(), config.timeout)
    }
}

#[async_trait]
impl GenerationClient for EndpointClient {
    async fn generate(
        &self,
        request: &GenerationRequest
    ) -> Result<GenerationResponse, GenerationError> {
        let mut req = self.http.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            req = req.header(AUTHORIZATION, format!("Bearer {}", key));
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GenerationError::Status(status.as_u16()));
        }

        let body = resp.text().await?;
        debug!("Generation endpoint raw body: {}", body);
        let value: JsonValue = serde_json
            ::from_str(&body)
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        let text = value
            .get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string());
        usable(text)
    }

    fn name(&self) -> &str {
        "endpoint"
    }
}
