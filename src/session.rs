use crate::agent::ChatAgent;
use crate::models::chat::{ ChatMessage, Role, Sender };
use log::info;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Message is empty")]
    EmptyMessage,
    #[error("File name is empty")]
    EmptyFileName,
}

/// One chat conversation, owned by a single connection. Taking `&mut self`
/// for submissions keeps them strictly one at a time.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: String,
    role: Role,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(role: Role, welcome_message: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            messages: vec![ChatMessage::new(Sender::Assistant, welcome_message)],
        }
    }

    pub async fn start(agent: &ChatAgent, role: Role) -> Self {
        Self::new(role, &agent.welcome_message().await)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub async fn submit(
        &mut self,
        agent: &ChatAgent,
        input: &str
    ) -> Result<ChatMessage, SessionError> {
        let content = input.trim();
        if content.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        self.messages.push(ChatMessage::new(Sender::User, content));
        let reply = agent.reply(content, self.role).await;
        let message = ChatMessage::new(Sender::Assistant, reply);
        self.messages.push(message.clone());
        Ok(message)
    }

    /// Records an uploaded file and acknowledges it.
    pub fn attach_file(&mut self, file_name: &str) -> Result<ChatMessage, SessionError> {
        let file_name = file_name.trim();
        if file_name.is_empty() {
            return Err(SessionError::EmptyFileName);
        }
        info!("Session {} attached file '{}'", self.id, file_name);

        self.messages.push(ChatMessage::file(file_name));
        let ack = ChatMessage::new(
            Sender::Assistant,
            format!(
                "Hemos recibido tu archivo \"{}\". Nuestro equipo lo revisará y te contactaremos si tu perfil coincide con alguna vacante.",
                file_name
            )
        );
        self.messages.push(ack.clone());
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatbotConfiguration;
    use crate::knowledge::KnowledgeBase;
    use crate::models::knowledge::KnowledgeEntry;
    use crate::router::tests::{ Behaviour, StubGenerator };
    use crate::router::UPLOAD_INSTRUCTIONS;
    use std::sync::Arc;
    use std::time::Duration;

    fn agent(generator: Arc<StubGenerator>) -> ChatAgent {
        let kb = KnowledgeBase::in_memory(
            vec![KnowledgeEntry::new("empresa", "¿Dónde están ubicados?", "En Santiago, Chile.")]
        );
        ChatAgent::new(kb, ChatbotConfiguration::default(), generator, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_session_starts_with_welcome() {
        let agent = agent(Arc::new(StubGenerator::new(Behaviour::Fail)));
        let session = ChatSession::start(&agent, Role::Public).await;
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].sender, Sender::Assistant);
        assert_eq!(session.messages()[0].content, agent.welcome_message().await);
    }

    #[tokio::test]
    async fn test_blank_input_never_reaches_the_agent() {
        let generator = Arc::new(StubGenerator::new(Behaviour::Reply("x")));
        let agent = agent(generator.clone());
        let mut session = ChatSession::start(&agent, Role::Public).await;

        assert_eq!(session.submit(&agent, "   \n").await.unwrap_err(), SessionError::EmptyMessage);
        assert_eq!(session.messages().len(), 1);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_submit_records_both_sides() {
        let generator = Arc::new(StubGenerator::new(Behaviour::Reply("generado")));
        let agent = agent(generator.clone());
        let mut session = ChatSession::start(&agent, Role::Admin).await;

        let reply = session.submit(&agent, "  ¿dónde están ubicados? ").await.unwrap();
        assert_eq!(reply.content, "En Santiago, Chile.");
        let reply = session.submit(&agent, "Necesito subir CV").await.unwrap();
        assert_eq!(reply.content, UPLOAD_INSTRUCTIONS);
        let reply = session.submit(&agent, "¿Cuántas vacantes hay?").await.unwrap();
        assert_eq!(reply.content, "generado");

        let senders: Vec<Sender> = session.messages().iter().map(|m| m.sender).collect();
        assert_eq!(senders, vec![
            Sender::Assistant,
            Sender::User,
            Sender::Assistant,
            Sender::User,
            Sender::Assistant,
            Sender::User,
            Sender::Assistant
        ]);
        assert_eq!(session.messages()[1].content, "¿dónde están ubicados?");
        assert_eq!(generator.calls(), 1);
    }

    #[test]
    fn test_attach_file_records_file_message() {
        let mut session = ChatSession::new(Role::Public, "hola");
        let ack = session.attach_file("cv_maria.pdf").unwrap();
        assert!(ack.content.contains("cv_maria.pdf"));

        let file_message = &session.messages()[1];
        assert!(file_message.is_file);
        assert_eq!(file_message.file_name.as_deref(), Some("cv_maria.pdf"));
        assert_eq!(session.attach_file(" ").unwrap_err(), SessionError::EmptyFileName);
    }
}
