pub mod agent;
pub mod cli;
pub mod config;
pub mod knowledge;
pub mod llm;
pub mod models;
pub mod router;
pub mod server;
pub mod session;

use agent::ChatAgent;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("WebSocket Address: {}", args.server_addr);
    info!("HTTP Port: {:?}", args.http_port);
    info!("Knowledge Path: {}", args.knowledge_path);
    info!("Chatbot Config Path: {}", args.chatbot_config_path);
    info!("Generator Type: {}", args.generator_type);
    info!("Generation URL: {}", args.generation_url.as_deref().unwrap_or("adapter default"));
    info!("Generation Timeout: {}s", args.generation_timeout().as_secs());
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let agent = Arc::new(ChatAgent::from_args(&args).await?);
    let server = Server::new(agent, args);
    server.run().await?;

    Ok(())
}
