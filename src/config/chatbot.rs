use crate::models::chat::Role;
use log::{ info, warn };
use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value as JsonValue };
use std::fs;
use std::path::{ Path, PathBuf };
use std::time::SystemTime;
use thiserror::Error;

pub const DEFAULT_PUBLIC_PROMPT: &str =
    "Eres el asistente virtual de CONVERT-IA, una consultora de reclutamiento y selección de personal. \
Responde en español, de forma breve y amable, a candidatos y visitantes del sitio. \
Si te preguntan por ofertas de empleo, invita a revisar la sección de empleos y a postular subiendo su CV.";

pub const DEFAULT_ADMIN_PROMPT: &str =
    "Eres el asistente interno de CONVERT-IA para el equipo de administración. \
Ayuda con la gestión de ofertas, campañas y candidatos, responde en español y de forma concisa.";

pub const DEFAULT_WELCOME_MESSAGE: &str =
    "¡Hola! Soy el asistente de CONVERT-IA. ¿En qué puedo ayudarte?";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Chatbot config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Chatbot config JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Generation context for one audience. `prompt` is required; anything else
/// (company name, services, tone...) is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseProfile {
    #[serde(default)]
    pub prompt: String,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl ResponseProfile {
    fn with_prompt(prompt: &str) -> Self {
        let mut extra = Map::new();
        extra.insert("company_name".into(), JsonValue::String("CONVERT-IA".into()));
        Self {
            prompt: prompt.to_string(),
            extra,
        }
    }

    fn fill_defaults(&mut self, default_prompt: &str) {
        if self.prompt.trim().is_empty() {
            self.prompt = default_prompt.to_string();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatbotConfiguration {
    #[serde(default = "default_public_profile")]
    pub public_responses: ResponseProfile,
    #[serde(default = "default_admin_profile")]
    pub admin_responses: ResponseProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<String>,
    #[serde(skip)]
    pub last_loaded: Option<SystemTime>,
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

fn default_public_profile() -> ResponseProfile {
    ResponseProfile::with_prompt(DEFAULT_PUBLIC_PROMPT)
}

fn default_admin_profile() -> ResponseProfile {
    ResponseProfile::with_prompt(DEFAULT_ADMIN_PROMPT)
}

impl Default for ChatbotConfiguration {
    fn default() -> Self {
        Self {
            public_responses: default_public_profile(),
            admin_responses: default_admin_profile(),
            welcome_message: None,
            last_loaded: None,
            source: None,
        }
    }
}

impl ChatbotConfiguration {
    pub fn profile(&self, role: Role) -> &ResponseProfile {
        match role {
            Role::Public => &self.public_responses,
            Role::Admin => &self.admin_responses,
        }
    }

    /// The selected profile serialized as JSON, sent as generation context.
    pub fn context_for(&self, role: Role) -> String {
        serde_json::to_string(self.profile(role)).unwrap_or_else(|_| self.profile(role).prompt.clone())
    }

    pub fn welcome_message(&self) -> &str {
        self.welcome_message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_WELCOME_MESSAGE)
    }

    fn fill_defaults(&mut self) {
        self.public_responses.fill_defaults(DEFAULT_PUBLIC_PROMPT);
        self.admin_responses.fill_defaults(DEFAULT_ADMIN_PROMPT);
    }
}

pub fn load_chatbot_config_from_str(json: &str) -> Result<ChatbotConfiguration, ConfigError> {
    let mut config: ChatbotConfiguration = serde_json::from_str(json)?;
    config.fill_defaults();
    Ok(config)
}

/// Reads the configuration file, substituting the built-in defaults when it
/// does not exist.
pub fn load_chatbot_config<P: AsRef<Path>>(path: P) -> Result<ChatbotConfiguration, ConfigError> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        let json = fs::read_to_string(path)?;
        info!("Loaded chatbot configuration from {}", path.display());
        load_chatbot_config_from_str(&json)?
    } else {
        warn!("Chatbot config {} not found. Using default configuration.", path.display());
        ChatbotConfiguration::default()
    };
    config.source = Some(path.to_path_buf());
    config.last_loaded = Some(SystemTime::now());
    Ok(config)
}

pub fn reload_if_changed(
    current: &ChatbotConfiguration
) -> Result<Option<ChatbotConfiguration>, ConfigError> {
    let path = match &current.source {
        Some(path) => path,
        None => {
            return Ok(None);
        }
    };
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(_) => {
            return Ok(None);
        }
    };

    match current.last_loaded {
        Some(last_loaded) if modified <= last_loaded => Ok(None),
        _ => {
            info!("Chatbot config changed, reloading...");
            load_chatbot_config(path).map(Some)
        }
    }
}
