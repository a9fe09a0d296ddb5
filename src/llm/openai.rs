use async_trait::async_trait;
use reqwest::{ Client as HttpClient, header::AUTHORIZATION };
use serde::{ Deserialize, Serialize };

use super::{ http_client, usable, GenerationClient, GenerationError, GenerationRequest, GenerationResponse, LlmConfig };

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const COMPLETIONS_PATH: &str = "/chat/completions";

/// Any OpenAI-compatible chat completions API. The context becomes the
/// system message.
pub struct OpenAIChatClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: Option<String>,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

impl OpenAIChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, GenerationError> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::Config("OpenAI API key is required".into()))?;

        Ok(Self {
            http: http_client(config.timeout)?,
            api_key,
            model: config.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string()),
            base_url: config.base_url.clone().unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }
}

#[async_trait]
impl GenerationClient for OpenAIChatClient {
    async fn generate(
        &self,
        request: &GenerationRequest
    ) -> Result<GenerationResponse, GenerationError> {
        let req = OpenAIChatRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: Some(request.context.clone()),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: Some(request.prompt.clone()),
                }
            ],
            temperature: 0.7,
            max_tokens: Some(1024),
        };

        let resp = self.http
            .post(completions_url(&self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&req)
            .send().await?;
        if !resp.status().is_success() {
            return Err(GenerationError::Status(resp.status().as_u16()));
        }

        let data = resp
            .json::<OpenAIResponse>().await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        let text = data.choices.into_iter().next().and_then(|choice| choice.message.content);
        usable(text)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Accepts either a base URL (`.../v1`) or the full completions URL.
fn completions_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with(COMPLETIONS_PATH) {
        base.to_string()
    } else {
        format!("{}{}", base, COMPLETIONS_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::GeneratorType;
    use axum::{ http::{ HeaderMap, StatusCode }, routing::post, Json, Router };
    use serde_json::{ json, Value };
    use std::time::Duration;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn client(base_url: String) -> OpenAIChatClient {
        OpenAIChatClient::from_config(
            &(LlmConfig {
                generator_type: GeneratorType::OpenAI,
                api_key: Some("sk-test".into()),
                model: Some("gpt-test".into()),
                base_url: Some(base_url),
                timeout: Duration::from_secs(5),
            })
        ).unwrap()
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "¿Tienen vacantes?".into(),
            context: r#"{"prompt":"sé amable"}"#.into(),
        }
    }

    async fn generate_with(reply: Value) -> Result<GenerationResponse, GenerationError> {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || async move { Json(reply) })
        );
        client(serve(app).await).generate(&request()).await
    }

    #[test]
    fn test_completions_url_accepts_base_or_full_url() {
        assert_eq!(completions_url("https://api.openai.com/v1"), "https://api.openai.com/v1/chat/completions");
        assert_eq!(completions_url("http://proxy/v1/"), "http://proxy/v1/chat/completions");
        assert_eq!(completions_url("http://proxy/v1/chat/completions"), "http://proxy/v1/chat/completions");
    }

    #[test]
    fn test_api_key_is_required() {
        let config = LlmConfig { generator_type: GeneratorType::OpenAI, ..LlmConfig::default() };
        assert!(matches!(OpenAIChatClient::from_config(&config), Err(GenerationError::Config(_))));
    }

    #[tokio::test]
    async fn test_sends_context_as_system_message() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).unwrap_or("");
                let reply = format!(
                    "{} | {} | {} | {}",
                    auth,
                    body["model"].as_str().unwrap_or(""),
                    body["messages"][0]["content"].as_str().unwrap_or(""),
                    body["messages"][1]["content"].as_str().unwrap_or("")
                );
                Json(json!({ "choices": [{ "message": { "role": "assistant", "content": reply } }] }))
            })
        );
        let resp = client(serve(app).await).generate(&request()).await.unwrap();
        assert_eq!(resp.response, r#"Bearer sk-test | gpt-test | {"prompt":"sé amable"} | ¿Tienen vacantes?"#);
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") })
        );
        let result = client(serve(app).await).generate(&request()).await;
        assert!(matches!(result, Err(GenerationError::Status(429))));
    }

    #[tokio::test]
    async fn test_unusable_bodies_are_errors() {
        let empty_choices = generate_with(json!({ "choices": [] })).await;
        assert!(matches!(empty_choices, Err(GenerationError::Malformed(_))));

        let null_content = generate_with(
            json!({ "choices": [{ "message": { "role": "assistant", "content": null } }] })
        ).await;
        assert!(matches!(null_content, Err(GenerationError::Malformed(_))));

        let blank_content = generate_with(
            json!({ "choices": [{ "message": { "role": "assistant", "content": "  " } }] })
        ).await;
        assert!(matches!(blank_content, Err(GenerationError::Malformed(_))));

        let no_choices = generate_with(json!({ "id": "x" })).await;
        assert!(matches!(no_choices, Err(GenerationError::Malformed(_))));
    }
}
