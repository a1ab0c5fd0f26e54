//! Stateless transport: one short-lived session per HTTP request.

use super::engine::{McpEngine, SessionStats};
use super::protocol::{IncomingMessage, JsonRpcError, JsonRpcResponse};
use crate::auth::challenge::BearerChallenge;
use crate::auth::{AuthContext, AuthError, AuthResult};
use crate::headers::presets;
use axum::body::{Body, Bytes};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::{ACCEPT, CONTENT_TYPE, WWW_AUTHENTICATE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;

/// Everything a session needs from one HTTP request
pub struct McpHttpRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub auth: AuthContext,
    /// Absolute URL of the protected-resource metadata, used in challenges
    pub resource_metadata_url: String,
}

/// Opens a fresh transport session for every authenticated request
pub struct SessionManager {
    engine: Arc<McpEngine>,
}

impl SessionManager {
    pub fn new(engine: Arc<McpEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &McpEngine {
        &self.engine
    }

    pub fn stats(&self) -> &SessionStats {
        self.engine.stats()
    }

    pub async fn handle(&self, request: McpHttpRequest) -> Response {
        let auth = match &request.auth {
            AuthContext::Authenticated(auth) => Arc::clone(auth),
            AuthContext::Unauthenticated(reason) => {
                return unauthorized(reason.as_ref(), &request.resource_metadata_url);
            }
        };

        TransportSession::open(Arc::clone(&self.engine), auth)
            .serve(request)
            .await
    }
}

/// Session bound to a single request. Closing is idempotent and also runs
/// on drop, so a panicking or cancelled request still releases it once.
struct TransportSession {
    engine: Arc<McpEngine>,
    auth: Arc<AuthResult>,
    closed: bool,
}

impl TransportSession {
    fn open(engine: Arc<McpEngine>, auth: Arc<AuthResult>) -> Self {
        engine.stats().record_open();
        debug!("Opened transport session for subject '{}'", auth.subject);
        Self {
            engine,
            auth,
            closed: false,
        }
    }

    async fn serve(mut self, request: McpHttpRequest) -> Response {
        let response = match request.method {
            Method::POST => {
                self.handle_post(&request.headers, &request.body, &request.resource_metadata_url)
                    .await
            }
            Method::GET => handle_get(&request.headers),
            Method::DELETE => StatusCode::OK.into_response(),
            _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        };
        self.close();
        response
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.engine.stats().record_close();
        debug!("Closed transport session for subject '{}'", self.auth.subject);
    }

    async fn handle_post(
        &self,
        headers: &HeaderMap,
        body: &Bytes,
        resource_metadata_url: &str,
    ) -> Response {
        if !accepts_json_body(headers) {
            return rpc_error(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                JsonRpcError::invalid_request("Content-Type must be application/json"),
            );
        }

        let payload: Value = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => return rpc_error(StatusCode::BAD_REQUEST, JsonRpcError::parse_error(e)),
        };

        let (messages, is_batch) = match payload {
            Value::Array(items) if items.is_empty() => {
                return rpc_error(
                    StatusCode::BAD_REQUEST,
                    JsonRpcError::invalid_request("empty batch"),
                );
            }
            Value::Array(items) => (items, true),
            single => (vec![single], false),
        };

        let mut responses = Vec::new();
        let mut missing_scopes: Vec<String> = Vec::new();
        for message in messages {
            match IncomingMessage::classify(message) {
                IncomingMessage::Request(request) => {
                    let id = request.id.clone().unwrap_or(Value::Null);
                    match self.engine.handle_request(&request, &self.auth).await {
                        Ok(result) => responses.push(JsonRpcResponse::result(id, result)),
                        Err(err) => {
                            if let Some(required) = err.required_scopes() {
                                missing_scopes.extend(required.iter().cloned());
                            }
                            responses.push(JsonRpcResponse::error(Some(id), err.to_rpc_error()));
                        }
                    }
                }
                IncomingMessage::Notification(notification) => {
                    self.engine.handle_notification(&notification)
                }
                IncomingMessage::Response => debug!("Ignoring client response message"),
                IncomingMessage::Invalid { id, error } => {
                    responses.push(JsonRpcResponse::error(id, error))
                }
            }
        }

        if responses.is_empty() {
            return StatusCode::ACCEPTED.into_response();
        }

        let mut response = if is_batch {
            Json(responses).into_response()
        } else if !missing_scopes.is_empty() {
            insufficient_scope(&responses[0], missing_scopes, resource_metadata_url)
        } else {
            Json(&responses[0]).into_response()
        };
        presets::no_store().apply(&mut response);
        response
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                "Transport session for subject '{}' ended without completing",
                self.auth.subject
            );
            self.close();
        }
    }
}

/// Stateless push channel: an event stream that ends immediately
fn handle_get(headers: &HeaderMap) -> Response {
    let accepts_events = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"));
    if !accepts_events {
        return rpc_error(
            StatusCode::NOT_ACCEPTABLE,
            JsonRpcError::invalid_request("Accept must include text/event-stream"),
        );
    }

    let mut response = Response::new(Body::empty());
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    presets::no_cache().apply(&mut response);
    response
}

fn accepts_json_body(headers: &HeaderMap) -> bool {
    match headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        Some(content_type) => content_type
            .split(';')
            .next()
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json")),
        None => true,
    }
}

fn rpc_error(status: StatusCode, error: JsonRpcError) -> Response {
    (status, Json(JsonRpcResponse::error(None, error))).into_response()
}

fn unauthorized(reason: Option<&AuthError>, resource_metadata_url: &str) -> Response {
    let (challenge, error) = match reason {
        Some(reason) => (
            BearerChallenge::for_error(reason),
            JsonRpcError::unauthorized(reason),
        ),
        None => (
            BearerChallenge::new(),
            JsonRpcError::unauthorized("missing bearer token"),
        ),
    };
    let challenge = challenge.resource_metadata(resource_metadata_url);

    let mut response = (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, challenge.to_header_value())],
        Json(JsonRpcResponse::error(None, error)),
    )
        .into_response();
    presets::no_store().apply(&mut response);
    response
}

fn insufficient_scope(
    body: &JsonRpcResponse,
    mut missing: Vec<String>,
    resource_metadata_url: &str,
) -> Response {
    missing.sort();
    missing.dedup();
    let challenge = BearerChallenge::new()
        .resource_metadata(resource_metadata_url)
        .scope(missing.join(" "))
        .error("insufficient_scope")
        .error_description("The access token lacks a scope this operation requires");

    (
        StatusCode::FORBIDDEN,
        [(WWW_AUTHENTICATE, challenge.to_header_value())],
        Json(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::engine::tests::stub_engine;
    use crate::tools::{ToolDescriptor, ToolError, ToolProvider};
    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use serde_json::json;
    use std::time::Duration;

    const METADATA_URL: &str = "https://gw.example/.well-known/oauth-protected-resource";

    fn caller(scopes: &[&str]) -> AuthContext {
        AuthContext::Authenticated(Arc::new(AuthResult {
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            ..AuthResult::static_token()
        }))
    }

    fn post(auth: AuthContext, body: Value) -> McpHttpRequest {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        McpHttpRequest {
            method: Method::POST,
            headers,
            body: Bytes::from(body.to_string()),
            auth,
            resource_metadata_url: METADATA_URL.to_string(),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    }

    #[tokio::test]
    async fn test_unauthenticated_gets_challenge_and_no_session() {
        let manager = SessionManager::new(Arc::new(stub_engine()));
        let response = manager
            .handle(post(
                AuthContext::Unauthenticated(None),
                json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }),
            ))
            .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[WWW_AUTHENTICATE],
            format!("Bearer resource_metadata=\"{METADATA_URL}\"").as_str()
        );
        assert_eq!(body_json(response).await["error"]["code"], -32001);
        assert_eq!(manager.stats().opened(), 0);
    }

    #[tokio::test]
    async fn test_rejected_token_reason_is_in_challenge() {
        let manager = SessionManager::new(Arc::new(stub_engine()));
        let reason = AuthError::SignatureOrClaimInvalid("token expired".to_string());
        let response = manager
            .handle(post(
                AuthContext::Unauthenticated(Some(reason)),
                json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }),
            ))
            .await;

        let challenge = response.headers()[WWW_AUTHENTICATE].to_str().unwrap().to_string();
        assert!(challenge.contains(r#"error="invalid_token""#));
        assert!(challenge.contains("token expired"));
    }

    #[tokio::test]
    async fn test_request_opens_and_closes_one_session() {
        let manager = SessionManager::new(Arc::new(stub_engine()));
        let response = manager
            .handle(post(caller(&[]), json!({ "jsonrpc": "2.0", "id": 7, "method": "ping" })))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("mcp-session-id").is_none());
        assert_eq!(body_json(response).await, json!({ "jsonrpc": "2.0", "id": 7, "result": {} }));
        assert_eq!(manager.stats().opened(), 1);
        assert_eq!(manager.stats().closed(), 1);
    }

    #[tokio::test]
    async fn test_notifications_only_is_accepted() {
        let manager = SessionManager::new(Arc::new(stub_engine()));
        let response = manager
            .handle(post(
                caller(&[]),
                json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(manager.stats().active(), 0);
    }

    #[tokio::test]
    async fn test_parse_error_and_invalid_request() {
        let manager = SessionManager::new(Arc::new(stub_engine()));
        let mut request = post(caller(&[]), json!(null));
        request.body = Bytes::from_static(b"{not json");
        let response = manager.handle(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], -32700);

        let response = manager
            .handle(post(caller(&[]), json!({ "jsonrpc": "1.0", "id": 1, "method": "ping" })))
            .await;
        assert_eq!(body_json(response).await["error"]["code"], -32600);
        assert_eq!(manager.stats().active(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_scope_is_forbidden_with_challenge() {
        let manager = SessionManager::new(Arc::new(stub_engine()));
        let response = manager
            .handle(post(
                caller(&["files:write"]),
                json!({
                    "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                    "params": { "name": "read_file", "arguments": { "message": "x" } }
                }),
            ))
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let challenge = response.headers()[WWW_AUTHENTICATE].to_str().unwrap().to_string();
        assert!(challenge.contains(r#"scope="files:read""#));
        assert!(challenge.contains(r#"error="insufficient_scope""#));
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], -32003);
        assert_eq!(body["error"]["data"]["required_scopes"], json!(["files:read"]));
        assert_eq!(manager.stats().closed(), 1);
    }

    #[tokio::test]
    async fn test_batch_keeps_denials_inline() {
        let manager = SessionManager::new(Arc::new(stub_engine()));
        let response = manager
            .handle(post(
                caller(&[]),
                json!([
                    { "jsonrpc": "2.0", "id": 1, "method": "ping" },
                    { "jsonrpc": "2.0", "method": "notifications/initialized" },
                    {
                        "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                        "params": { "name": "read_file", "arguments": { "message": "x" } }
                    }
                ]),
            ))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["error"]["code"], -32003);
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let manager = SessionManager::new(Arc::new(stub_engine()));

        let mut request = post(caller(&[]), json!(null));
        request.method = Method::GET;
        request
            .headers
            .insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        let response = manager.handle(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream");

        let mut request = post(caller(&[]), json!(null));
        request.method = Method::GET;
        assert_eq!(manager.handle(request).await.status(), StatusCode::NOT_ACCEPTABLE);

        let mut request = post(caller(&[]), json!(null));
        request.method = Method::DELETE;
        assert_eq!(manager.handle(request).await.status(), StatusCode::OK);

        assert_eq!(manager.stats().opened(), 3);
        assert_eq!(manager.stats().closed(), 3);
    }

    #[derive(schemars::JsonSchema)]
    struct NoArgs {}

    struct MisbehavingTools;

    #[async_trait]
    impl ToolProvider for MisbehavingTools {
        fn name(&self) -> &'static str {
            "misbehaving"
        }

        fn tools(&self) -> Vec<ToolDescriptor> {
            vec![
                ToolDescriptor::new::<NoArgs>("panic", "Panics"),
                ToolDescriptor::new::<NoArgs>("hang", "Never returns"),
            ]
        }

        async fn call(&self, tool: &str, _arguments: Value) -> Result<Value, ToolError> {
            if tool == "panic" {
                panic!("tool panicked");
            }
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        }
    }

    fn misbehaving_manager() -> Arc<SessionManager> {
        let engine = McpEngine::builder("test-gateway", "0.0.1")
            .provider(Arc::new(MisbehavingTools))
            .build();
        Arc::new(SessionManager::new(Arc::new(engine)))
    }

    fn call(tool: &str) -> Value {
        json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": { "name": tool } })
    }

    #[tokio::test]
    async fn test_session_closes_when_handler_panics() {
        let manager = misbehaving_manager();
        let task = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.handle(post(caller(&["*"]), call("panic"))).await })
        };

        assert!(task.await.unwrap_err().is_panic());
        assert_eq!(manager.stats().opened(), 1);
        assert_eq!(manager.stats().closed(), 1);
    }

    #[tokio::test]
    async fn test_session_closes_when_request_is_cancelled() {
        let manager = misbehaving_manager();
        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            manager.handle(post(caller(&["*"]), call("hang"))),
        )
        .await;

        assert!(outcome.is_err());
        assert_eq!(manager.stats().opened(), 1);
        assert_eq!(manager.stats().closed(), 1);
    }
}
