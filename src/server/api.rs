use crate::agent::ChatAgent;
use crate::knowledge::KnowledgeError;
use crate::models::chat::Role;
use crate::models::knowledge::KnowledgeEntry;
use crate::router::Route;
use super::auth::api_key_matches;

use axum::{
    extract::{ Path, State },
    http::{ HeaderMap, StatusCode },
    response::{ IntoResponse, Response },
    routing::{ get, post, put },
    Json,
    Router,
};
use log::{ error, info };
use serde::{ Deserialize, Serialize };
use serde_json::json;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{ Any, CorsLayer };

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<ChatAgent>,
    pub api_key: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    source: &'static str,
}

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    message: String,
    details: Option<Vec<String>>,
}

fn error_body(code: StatusCode, message: impl Into<String>) -> Response {
    (code, Json(json!({ "error": message.into() }))).into_response()
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let required = match state.api_key.as_deref() {
        Some(k) if !k.is_empty() => k,
        _ => {
            return Ok(());
        }
    };
    let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    if provided.is_some_and(|key| api_key_matches(required, key)) {
        Ok(())
    } else {
        Err(error_body(StatusCode::UNAUTHORIZED, "Unauthorized"))
    }
}

fn knowledge_error(e: KnowledgeError) -> Response {
    match e {
        KnowledgeError::NotFound(_) => error_body(StatusCode::NOT_FOUND, e.to_string()),
        KnowledgeError::Invalid(_) => error_body(StatusCode::BAD_REQUEST, e.to_string()),
        other => {
            error!("Knowledge store failure: {}", other);
            error_body(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/knowledge", get(list_knowledge_handler).post(add_knowledge_handler))
        .route("/api/knowledge/topics", get(topics_handler))
        .route("/api/knowledge/{index}", put(update_knowledge_handler).delete(remove_knowledge_handler))
        .route("/api/reload", post(reload_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    http_port: u16,
    state: AppState,
    tls: Option<(String, String)>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    let app = app_router(state);

    let listener = std::net::TcpListener::bind(addr).map_err(|e| {
        format!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e)
    })?;
    listener.set_nonblocking(true)?;
    serve_api(listener, app, tls).await
}

/// Serves `app` on an already bound listener in a background task.
async fn serve_api(
    listener: std::net::TcpListener,
    app: Router,
    tls: Option<(String, String)>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = listener.local_addr()?;

    if let Some((cert_path, key_path)) = tls {
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
        info!("Starting HTTPS API server on: https://{}", addr);

        tokio::spawn(async move {
            let result = axum_server
                ::from_tcp_rustls(listener, tls_config)
                .serve(app.into_make_service()).await;
            if let Err(e) = result {
                error!("HTTPS server error: {}", e);
            }
        });
    } else {
        info!("Starting HTTP API server on: http://{}", addr);
        let listener = tokio::net::TcpListener::from_std(listener)?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                error!("HTTP server error: {}", e);
            }
        });
    }

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(
        json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    })
    )
}

async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>
) -> Response {
    let message = req.message.trim();
    if message.is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "Message is empty");
    }
    if req.role == Role::Admin {
        if let Err(resp) = authorize(&state, &headers) {
            return resp;
        }
    }

    let route = state.agent.route(message, req.role).await;
    let source = match route {
        Route::UploadInstructions => "upload_instructions",
        Route::Knowledge(_) => "knowledge",
        Route::Generated(_) => "generated",
        Route::Fallback => "fallback",
    };
    Json(ChatResponse { response: route.into_text(), source }).into_response()
}

async fn list_knowledge_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    Json(state.agent.knowledge_entries().await).into_response()
}

async fn topics_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    Json(state.agent.knowledge_topics().await).into_response()
}

async fn add_knowledge_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(entry): Json<KnowledgeEntry>
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    match state.agent.add_knowledge(entry).await {
        Ok(index) => (StatusCode::CREATED, Json(json!({ "index": index }))).into_response(),
        Err(e) => knowledge_error(e),
    }
}

async fn update_knowledge_handler(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    headers: HeaderMap,
    Json(entry): Json<KnowledgeEntry>
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    match state.agent.update_knowledge(index, entry).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => knowledge_error(e),
    }
}

async fn remove_knowledge_handler(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    headers: HeaderMap
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    match state.agent.remove_knowledge(index).await {
        Ok(removed) => Json(removed).into_response(),
        Err(e) => knowledge_error(e),
    }
}

async fn reload_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }

    match state.agent.reload_sources().await {
        Ok(outcome) => {
            let details = vec![
                format!("Knowledge {}", if outcome.knowledge { "reloaded" } else { "unchanged" }),
                format!("Config {}", if outcome.config { "reloaded" } else { "unchanged" })
            ];
            Json(ReloadResponse {
                success: true,
                message: "Reload complete".into(),
                details: Some(details),
            }).into_response()
        }
        Err(e) =>
            (
                StatusCode::BAD_REQUEST,
                Json(ReloadResponse {
                    success: false,
                    message: "Reload errors".into(),
                    details: Some(vec![e.to_string()]),
                }),
            ).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatbotConfiguration;
    use crate::knowledge::KnowledgeBase;
    use crate::router::tests::{ Behaviour, StubGenerator };
    use crate::router::FALLBACK_MESSAGE;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state(api_key: Option<&str>) -> AppState {
        let kb = KnowledgeBase::in_memory(
            vec![KnowledgeEntry::new("empresa", "¿Qué servicios ofrece CONVERT-IA?", "Reclutamiento.")]
        );
        let agent = ChatAgent::new(
            kb,
            ChatbotConfiguration::default(),
            Arc::new(StubGenerator::new(Behaviour::Fail)),
            Duration::from_secs(5)
        );
        AppState {
            agent: Arc::new(agent),
            api_key: api_key.map(str::to_string),
        }
    }

    fn json_request(method: &str, uri: &str, body: Value, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json");
        if let Some(key) = key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_port_in_use_is_reported_to_caller() {
        let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = start_http_server(port, state(None), None).await.unwrap_err();
        assert!(err.to_string().contains("Failed to bind HTTP server"));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = app_router(state(None));
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_chat_answers_from_knowledge_and_falls_back() {
        let app = app_router(state(Some("secret")));

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/chat", json!({ "message": "qué servicios ofrece convert ia" }), None)).await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["response"], "Reclutamiento.");
        assert_eq!(json["source"], "knowledge");

        let response = app
            .oneshot(json_request("POST", "/api/chat", json!({ "message": "¿pagan bonos?" }), None)).await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["response"], FALLBACK_MESSAGE);
        assert_eq!(json["source"], "fallback");
    }

    #[tokio::test]
    async fn test_blank_chat_message_is_rejected() {
        let app = app_router(state(None));
        let response = app
            .oneshot(json_request("POST", "/api/chat", json!({ "message": "   " }), None)).await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_routes_require_key() {
        let app = app_router(state(Some("secret")));

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/chat", json!({ "message": "hola", "role": "admin" }), None)).await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::builder().uri("/api/knowledge").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .uri("/api/knowledge")
            .header(API_KEY_HEADER, "secret")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_knowledge_crud() {
        let app = app_router(state(Some("secret")));
        let key = Some("secret");

        let entry = json!({ "topic": "empleo", "question": "¿Cómo postulo?", "answer": "Con tu CV." });
        let response = app.clone().oneshot(json_request("POST", "/api/knowledge", entry, key)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["index"], 1);

        let invalid = json!({ "topic": "empleo", "question": "", "answer": "x" });
        let response = app.clone().oneshot(json_request("POST", "/api/knowledge", invalid, key)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let updated = json!({ "topic": "empleo", "question": "¿Cómo postulo?", "answer": "Desde la web." });
        let response = app.clone().oneshot(json_request("PUT", "/api/knowledge/1", updated.clone(), key)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = app.clone().oneshot(json_request("PUT", "/api/knowledge/9", updated, key)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let request = Request::builder()
            .uri("/api/knowledge/topics")
            .header(API_KEY_HEADER, "secret")
            .body(Body::empty())
            .unwrap();
        let topics = body_json(app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(topics, json!(["empresa", "empleo"]));

        let request = Request::builder()
            .method("DELETE")
            .uri("/api/knowledge/0")
            .header(API_KEY_HEADER, "secret")
            .body(Body::empty())
            .unwrap();
        let removed = body_json(app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(removed["topic"], "empresa");

        let response = app
            .oneshot(json_request("POST", "/api/chat", json!({ "message": "Cómo postulo" }), None)).await
            .unwrap();
        assert_eq!(body_json(response).await["response"], "Desde la web.");
    }
}
