use crate::cli::Args;
use crate::config::chatbot::{ self, ChatbotConfiguration };
use crate::knowledge::{ KnowledgeBase, KnowledgeError };
use crate::llm::{ self, GenerationClient, LlmConfig };
use crate::models::chat::Role;
use crate::models::knowledge::KnowledgeEntry;
use crate::router::{ self, Route };

use log::{ info, error };
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Which sources changed during a reload.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReloadOutcome {
    pub knowledge: bool,
    pub config: bool,
}

/// Owns the knowledge base, the chatbot configuration and the generation
/// client shared by every session.
pub struct ChatAgent {
    knowledge: RwLock<KnowledgeBase>,
    config: RwLock<Arc<ChatbotConfiguration>>,
    generator: Arc<dyn GenerationClient>,
    timeout: Duration,
}

impl ChatAgent {
    pub fn new(
        knowledge: KnowledgeBase,
        config: ChatbotConfiguration,
        generator: Arc<dyn GenerationClient>,
        timeout: Duration
    ) -> Self {
        Self {
            knowledge: RwLock::new(knowledge),
            config: RwLock::new(Arc::new(config)),
            generator,
            timeout,
        }
    }

    pub async fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let llm_config: LlmConfig = args.llm_config()?;
        let generator = llm::new_client(&llm_config)?;
        info!(
            "Generator configured: Type={}, Model={:?}, URL={:?}, Timeout={:?}",
            generator.name(),
            llm_config.model.as_deref().unwrap_or("adapter default"),
            llm_config.base_url.as_deref().unwrap_or("adapter default"),
            llm_config.timeout
        );

        let knowledge = KnowledgeBase::load(&args.knowledge_path)?;
        let config = chatbot::load_chatbot_config(&args.chatbot_config_path)?;

        Ok(Self::new(knowledge, config, generator, llm_config.timeout))
    }

    pub async fn config(&self) -> Arc<ChatbotConfiguration> {
        Arc::clone(&*self.config.read().await)
    }

    pub async fn welcome_message(&self) -> String {
        self.config().await.welcome_message().to_string()
    }

    pub async fn route(&self, input: &str, role: Role) -> Route {
        // Snapshot so admin edits never block on an in-flight generation call.
        let entries = self.knowledge.read().await.entries().to_vec();
        let config = self.config().await;
        router::route_message(input, &entries, &config, role, self.generator.as_ref(), self.timeout).await
    }

    pub async fn reply(&self, input: &str, role: Role) -> String {
        self.route(input, role).await.into_text()
    }

    pub async fn knowledge_entries(&self) -> Vec<KnowledgeEntry> {
        self.knowledge.read().await.entries().to_vec()
    }

    pub async fn knowledge_topics(&self) -> Vec<String> {
        self.knowledge.read().await.topics()
    }

    pub async fn add_knowledge(&self, entry: KnowledgeEntry) -> Result<usize, KnowledgeError> {
        self.knowledge.write().await.add(entry)
    }

    pub async fn update_knowledge(
        &self,
        index: usize,
        entry: KnowledgeEntry
    ) -> Result<(), KnowledgeError> {
        self.knowledge.write().await.update(index, entry)
    }

    pub async fn remove_knowledge(&self, index: usize) -> Result<KnowledgeEntry, KnowledgeError> {
        self.knowledge.write().await.remove(index)
    }

    pub async fn reload_sources(&self) -> Result<ReloadOutcome, Box<dyn Error + Send + Sync>> {
        let mut outcome = ReloadOutcome::default();

        outcome.knowledge = self.knowledge.write().await.reload_if_changed().map_err(|e| {
            error!("Failed to reload knowledge base: {}", e);
            e
        })?;

        let current = self.config().await;
        if let Some(new_config) = chatbot::reload_if_changed(&current)? {
            *self.config.write().await = Arc::new(new_config);
            outcome.config = true;
        }

        if outcome.knowledge || outcome.config {
            info!("Sources reloaded: {:?}", outcome);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::tests::{ Behaviour, StubGenerator };
    use crate::router::FALLBACK_MESSAGE;

    fn agent(generator: Arc<StubGenerator>) -> ChatAgent {
        let kb = KnowledgeBase::in_memory(
            vec![KnowledgeEntry::new("empleo", "¿Cómo postulo a una oferta?", "Desde la ficha de la oferta.")]
        );
        ChatAgent::new(kb, ChatbotConfiguration::default(), generator, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_admin_edits_are_visible_to_next_reply() {
        let generator = Arc::new(StubGenerator::new(Behaviour::Fail));
        let agent = agent(generator.clone());

        assert_eq!(agent.reply("horario de atención", Role::Public).await, FALLBACK_MESSAGE);
        agent.add_knowledge(KnowledgeEntry::new("empresa", "Horario de atención", "9 a 18 h.")).await.unwrap();
        assert_eq!(agent.reply("¿Cuál es el horario de atención?", Role::Public).await, "9 a 18 h.");
        assert_eq!(agent.knowledge_topics().await, vec!["empleo".to_string(), "empresa".to_string()]);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_reload_without_files_changes_nothing() {
        let agent = agent(Arc::new(StubGenerator::new(Behaviour::Reply("x"))));
        assert_eq!(agent.reload_sources().await.unwrap(), ReloadOutcome::default());
    }
}
