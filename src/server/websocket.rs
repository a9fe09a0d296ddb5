use crate::agent::ChatAgent;
use crate::models::chat::Role;
use crate::models::websocket::{ ClientMessage, ServerMessage };
use crate::session::ChatSession;
use super::auth::resolve_role;
use super::tls::load_tls_config;

use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use tokio::io::{ AsyncRead, AsyncWrite };
use tokio::net::TcpListener;

use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::handshake::server::{ ErrorResponse, Request, Response };
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{ accept_hdr_async, WebSocketStream };

use chrono::Utc;
use futures::{ Sink, SinkExt, StreamExt };
use governor::{ clock::DefaultClock, state::{ InMemoryState, NotKeyed }, Quota, RateLimiter };
use lazy_static::lazy_static;
use log::{ error, info, warn };

const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(NonZeroU32::MIN.saturating_add(9)));
}

pub async fn start_ws_server(
    addr: &str,
    agent: Arc<ChatAgent>,
    api_key: Option<String>,
    tls: Option<(String, String)>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    let tls_acceptor = match &tls {
        Some((cert_path, key_path)) => {
            info!("TLS enabled. Loading certificate from '{}' and key from '{}'", cert_path, key_path);
            Some(TlsAcceptor::from(load_tls_config(cert_path, key_path)?))
        }
        None => {
            info!("TLS not enabled. Running plain WebSocket (WS) server.");
            None
        }
    };
    let protocol = if tls_acceptor.is_some() { "wss" } else { "ws" };
    info!("{} server listening on: {}", protocol.to_uppercase(), addr);

    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let agent_clone = Arc::clone(&agent);
        let required_api_key = api_key.clone();
        let tls_acceptor_clone = tls_acceptor.clone();

        tokio::spawn(async move {
            let process_result = if let Some(acceptor) = tls_acceptor_clone {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        info!("TLS handshake successful for {}", peer);
                        process_connection(peer, tls_stream, agent_clone, required_api_key).await
                    }
                    Err(e) => {
                        error!("TLS handshake error for {}: {}", peer, e);
                        Err(Box::new(e) as Box<dyn Error + Send + Sync>)
                    }
                }
            } else {
                process_connection(peer, stream, agent_clone, required_api_key).await
            };

            if let Err(e) = process_result {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    agent: Arc<ChatAgent>,
    required_api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let mut role = Role::Public;
    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let secret = required_api_key.as_deref();
        match resolve_role(req.uri().query(), secret, Utc::now().timestamp()) {
            Ok(resolved) => {
                role = resolved;
                Ok(response)
            }
            Err(e) => {
                warn!("{}: handshake rejected: {}", peer, e);
                let mut res = ErrorResponse::new(Some(e.to_string()));
                *res.status_mut() = tokio_tungstenite::tungstenite::http::StatusCode::UNAUTHORIZED;
                Err(res)
            }
        }
    };

    let handshake = accept_hdr_async(stream, auth_callback).await;
    match handshake {
        Ok(ws) => {
            handle_connection(peer, ws, agent, role).await;
            Ok(())
        }
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            Err(Box::new(e) as _)
        }
    }
}

async fn send_message<T>(tx: &mut T, message: &ServerMessage) -> Result<(), Box<dyn Error + Send + Sync>>
    where T: Sink<Message> + Unpin, T::Error: Error + Send + Sync + 'static
{
    let json = serde_json::to_string(message)?;
    tx.send(Message::Text(json)).await?;
    Ok(())
}

pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    agent: Arc<ChatAgent>,
    role: Role
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    if let Err(e) = agent.reload_sources().await {
        error!("Failed to reload sources: {}", e);
    }

    let (mut tx, mut rx) = websocket.split();
    let mut session = ChatSession::start(&agent, role).await;
    info!("Assigned {} session {} to {}", role, session.id(), peer);

    let welcome = ServerMessage::Welcome {
        session_id: session.id().to_string(),
        message: session.messages()[0].clone(),
    };
    if let Err(e) = send_message(&mut tx, &welcome).await {
        error!("Error sending welcome to {}: {}", peer, e);
        return;
    }

    // Frames are handled one at a time, so a session never has two submissions in flight.
    while let Some(msg) = rx.next().await {
        let message = match msg {
            Ok(message) => message,
            Err(e) => {
                match e {
                    | tokio_tungstenite::tungstenite::Error::ConnectionClosed
                    | tokio_tungstenite::tungstenite::Error::Protocol(_)
                    | tokio_tungstenite::tungstenite::Error::Utf8 => {
                        info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                    }
                    tokio_tungstenite::tungstenite::Error::Io(ref io_err) if
                        io_err.kind() == std::io::ErrorKind::ConnectionReset
                    => {
                        info!("WebSocket connection reset by peer {}", peer);
                    }
                    _ => {
                        error!("Error receiving message from {}: {}", peer, e);
                    }
                }
                break;
            }
        };

        if message.len() > MAX_MESSAGE_SIZE {
            warn!("Message from {} exceeds size limit ({} > {})", peer, message.len(), MAX_MESSAGE_SIZE);
            let error_msg = ServerMessage::Error { message: "Message too large".to_string() };
            if send_message(&mut tx, &error_msg).await.is_err() {
                error!("Failed to send size limit error to {}", peer);
            }
            break;
        }

        let reply = match message {
            Message::Text(text) => {
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Chat { content }) => {
                        if let Err(e) = send_message(&mut tx, &ServerMessage::Processing).await {
                            error!("Error sending processing status to {}: {}", peer, e);
                            break;
                        }
                        session.submit(&agent, &content).await
                    }
                    Ok(ClientMessage::File { file_name }) => session.attach_file(&file_name),
                    Err(e) => {
                        error!("Failed to parse message from {}: {}", peer, e);
                        let error_msg = ServerMessage::Error {
                            message: format!("Failed to parse message: {}", e),
                        };
                        if send_message(&mut tx, &error_msg).await.is_err() {
                            break;
                        }
                        continue;
                    }
                }
            }
            Message::Close(_) => {
                info!("Received close frame from {}", peer);
                break;
            }
            Message::Ping(ping_data) => {
                if tx.send(Message::Pong(ping_data)).await.is_err() {
                    error!("Failed to send pong to {}", peer);
                    break;
                }
                continue;
            }
            Message::Binary(_) => {
                warn!("Ignoring binary message from {}", peer);
                continue;
            }
            Message::Pong(_) | Message::Frame(_) => {
                continue;
            }
        };

        let server_msg = match reply {
            Ok(message) => ServerMessage::Response { message },
            Err(e) => {
                warn!("Rejected input from {}: {}", peer, e);
                ServerMessage::Error { message: e.to_string() }
            }
        };
        if let Err(e) = send_message(&mut tx, &server_msg).await {
            error!("Error sending message to {}: {}", peer, e);
            break;
        }
    }

    info!(
        "WebSocket connection closed for {} (session {}, {} messages)",
        peer,
        session.id(),
        session.messages().len()
    );
}
