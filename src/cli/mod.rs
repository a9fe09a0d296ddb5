use clap::Parser;
use std::time::Duration;

use crate::llm::{ GeneratorType, LlmConfig };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Data Sources ---
    /// Path to the knowledge base file (JSON array of {topic, question, answer}).
    #[arg(long, env = "KNOWLEDGE_PATH", default_value = "json/knowledge.json")]
    pub knowledge_path: String,

    /// Path to the chatbot configuration file ({public_responses, admin_responses}).
    /// Built-in defaults are used when the file does not exist.
    #[arg(long, env = "CHATBOT_CONFIG_PATH", default_value = "json/chatbot.json")]
    pub chatbot_config_path: String,

    // --- Generation Args ---
    /// Generation backend used when the knowledge base has no answer (endpoint, ollama, openai)
    #[arg(long, env = "GENERATOR_TYPE", default_value = "endpoint")]
    pub generator_type: String,

    /// URL of the generation endpoint, or base URL of the Ollama/OpenAI API
    #[arg(long, env = "GENERATION_URL")] // No default, adapters handle defaults if None
    pub generation_url: Option<String>,

    /// API Key sent as bearer token to the generation backend
    #[arg(long, env = "GENERATION_API_KEY", default_value = "")]
    pub generation_api_key: String,

    /// Model name for ollama/openai generators (e.g., llama3, gpt-4o-mini)
    #[arg(long, env = "GENERATION_MODEL")]
    pub generation_model: Option<String>,

    /// Seconds to wait for the generation backend before answering with the fallback message.
    #[arg(long, env = "GENERATION_TIMEOUT_SECS", default_value = "30")]
    pub generation_timeout_secs: u64,

    // --- Server Args ---
    /// Host address and port for the WebSocket chat server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional port for the HTTP API (chat, knowledge administration, reload).
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Optional API Key for admin access. WebSocket admins sign `ts` with it,
    /// HTTP admins send it in the `x-api-key` header.
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Optional path to the TLS certificate file (PEM format) for enabling WSS. Requires --tls-key.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling WSS. Requires --tls-cert.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs.max(1))
    }

    pub fn admin_key(&self) -> Option<&str> {
        self.server_api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    pub fn llm_config(&self) -> Result<LlmConfig, String> {
        let generator_type: GeneratorType = self.generator_type
            .parse()
            .map_err(|e| format!("{}", e))?;
        let api_key = if !self.generation_api_key.is_empty() {
            Some(self.generation_api_key.clone())
        } else {
            None
        };
        Ok(LlmConfig {
            generator_type,
            api_key,
            model: self.generation_model.clone(),
            base_url: self.generation_url.clone(),
            timeout: self.generation_timeout(),
        })
    }
}
