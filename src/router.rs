use crate::config::ChatbotConfiguration;
use crate::knowledge::find_answer;
use crate::knowledge::normalize::{ normalize, tokenize };
use crate::llm::{ GenerationClient, GenerationError, GenerationRequest };
use crate::models::chat::Role;
use crate::models::knowledge::KnowledgeEntry;
use log::{ info, warn };
use std::time::Duration;

pub const UPLOAD_TRIGGERS: [&str; 6] = [
    "subir cv",
    "subir curriculum",
    "enviar cv",
    "enviar curriculum",
    "upload resume",
    "upload cv",
];

pub const UPLOAD_INSTRUCTIONS: &str =
    "Para enviar tu CV, usa el botón de adjuntar (📎) que está junto al cuadro de mensaje y selecciona tu archivo en formato PDF o Word. Lo recibiremos y lo revisaremos a la brevedad.";

pub const FALLBACK_MESSAGE: &str =
    "Lo siento, no tengo información sobre esa consulta en este momento. Por favor, contacta a nuestro equipo o intenta reformular tu pregunta.";

/// Which path produced a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    UploadInstructions,
    Knowledge(String),
    Generated(String),
    Fallback,
}

impl Route {
    pub fn into_text(self) -> String {
        match self {
            Route::UploadInstructions => UPLOAD_INSTRUCTIONS.to_string(),
            Route::Knowledge(answer) | Route::Generated(answer) => answer,
            Route::Fallback => FALLBACK_MESSAGE.to_string(),
        }
    }
}

/// True when the input asks how to send a CV. A trigger phrase matches as a
/// case-insensitive substring, or with its words in order and at most one
/// other word between each pair ("enviar mi curriculum").
pub fn is_upload_request(input: &str) -> bool {
    let lowered = input.trim().to_lowercase();
    let normalized = normalize(&lowered);
    let words = tokenize(&normalized);
    UPLOAD_TRIGGERS.iter().any(|trigger| {
        lowered.contains(trigger) || contains_in_order(&words, trigger)
    })
}

const MAX_FILLER_WORDS: usize = 1;

fn contains_in_order(words: &[&str], phrase: &str) -> bool {
    let needles: Vec<&str> = phrase.split_whitespace().collect();
    let Some((first, rest)) = needles.split_first() else {
        return false;
    };

    words
        .iter()
        .enumerate()
        .filter(|(_, word)| *word == first)
        .any(|(start, _)| {
            let mut position = start;
            rest.iter().all(|needle| {
                let window_end = (position + 2 + MAX_FILLER_WORDS).min(words.len());
                match words[position + 1..window_end].iter().position(|w| w == needle) {
                    Some(offset) => {
                        position += 1 + offset;
                        true
                    }
                    None => false,
                }
            })
        })
}

pub async fn route_message(
    input: &str,
    knowledge: &[KnowledgeEntry],
    config: &ChatbotConfiguration,
    role: Role,
    generator: &dyn GenerationClient,
    timeout: Duration
) -> Route {
    if is_upload_request(input) {
        info!("Upload request detected, sending upload instructions");
        return Route::UploadInstructions;
    }

    if let Some(answer) = find_answer(input, knowledge) {
        info!("Answered from knowledge base");
        return Route::Knowledge(answer.to_string());
    }

    let request = GenerationRequest {
        prompt: input.to_string(),
        context: config.context_for(role),
    };
    info!("Knowledge miss. Calling {} generator for {} role", generator.name(), role);

    let outcome = match tokio::time::timeout(timeout, generator.generate(&request)).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(timeout)),
    };

    match outcome {
        Ok(reply) => Route::Generated(reply.response),
        Err(e) => {
            warn!("Generation failed, using fallback message: {}", e);
            Route::Fallback
        }
    }
}

/// Produces the reply text for `input`. Every failure resolves to
/// [`FALLBACK_MESSAGE`].
pub async fn respond(
    input: &str,
    knowledge: &[KnowledgeEntry],
    config: &ChatbotConfiguration,
    role: Role,
    generator: &dyn GenerationClient,
    timeout: Duration
) -> String {
    route_message(input, knowledge, config, role, generator, timeout).await.into_text()
}
