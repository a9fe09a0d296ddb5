pub mod api;
pub mod auth;
pub mod tls;
pub mod websocket;

use crate::agent::ChatAgent;
use crate::cli::Args;
use log::{ info, warn };
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    agent: Arc<ChatAgent>,
    args: Args,
}

impl Server {
    pub fn new(agent: Arc<ChatAgent>, args: Args) -> Self {
        if args.admin_key().is_some() {
            info!("Server configured with API Key authentication for admin access.");
        } else {
            warn!("Server configured WITHOUT API Key authentication. Admin access is open.");
        }
        Self { agent, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let tls = tls::tls_paths(self.args.enable_tls, &self.args.tls_cert_path, &self.args.tls_key_path)?;

        if let Some(http_port) = self.args.http_port {
            let state = api::AppState {
                agent: Arc::clone(&self.agent),
                api_key: self.args.admin_key().map(str::to_string),
            };
            api::start_http_server(http_port, state, tls.clone()).await?;
        }

        websocket::start_ws_server(
            &self.args.server_addr,
            Arc::clone(&self.agent),
            self.args.admin_key().map(str::to_string),
            tls
        ).await
    }
}
