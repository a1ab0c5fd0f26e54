use crate::config::GatewayConfig;
use crate::create_app;
use crate::mcp::engine::SessionStats;
use crate::state::AppState;
use axum::body::Body;
use axum::Router;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use log::LevelFilter;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Pre-shared token configured on every fixture
pub const STATIC_TOKEN: &str = "secret123";

pub const TEST_KID: &str = "test-key-1";
pub const SECONDARY_KID: &str = "test-key-2";

/// Private key whose public half the mock identity provider publishes
pub const TEST_RSA_PEM: &str = include_str!("../test_fixtures/signing_key.pem");
/// Private key no identity provider publishes
pub const WRONG_RSA_PEM: &str = include_str!("../test_fixtures/foreign_key.pem");

const TEST_RSA_N: &str = "pa08IggXtCLi6b7tH6W8Dg0gr7K13_wQTQ_m12pzbxwbj1Zz5Liz-jqrZ2gD3VT7Nx3ARC9Oy6PdU_33hEF7QVbiZytoXKqPm5ewXbuNctDDqYtD6mI7NSoEhl_NH8_vg_0I7iyj8s0mjREPwCU1c2fmmxcVHJ8WwdKPjAaQPg-8CTQVu6UwTtDUTtUl9N0NoI4ZnoCeigBMvwbWUB5meARfHU0NAwxXhxDuxwwxt35mvQAgtR8MueAujE5tEHay3FLFgJwKV5_HVZm8zq6FRX5NZDHm_5zZqsThBpazqHhmsN71eP79Yb9CmS-J1lBpbKYrZzfUJLBcHvA665Acmw";
const WRONG_RSA_N: &str = "6WmOcMgSidhP0fqwXMDqtGjV6QDz-eb0tK_qdbd04HVKie8DlX9fpGb7ee9banrdNvNPNNAc-cD3JmIglbkO9mcauNt0RRWKRZbuTVp8gtBCD3j29CgZG_uZ9sWbCjIivi1oTpO6a8NabBIritB_L3QQT5fAPD89D8Uo_66gjVHmWifTu2RwXj4sYqU5DN-35v28HPwLWlsSA7AUBCh35tXenogj23c4i1cNaie2vQhGasXgmacDdNij9HTwcD7iXsbWpiM2VmbYVhdrcdPy2hqbFAM3VcyJMhsj6_jMnulm3CO14E3r5SybyxmFaOfPPO-7ThoUFcHUSEqFnAC-Vw";

/// Public JWK for a test key id. `SECONDARY_KID` maps to the foreign key.
pub fn jwk_json(kid: &str) -> Value {
    let n = if kid == SECONDARY_KID {
        WRONG_RSA_N
    } else {
        TEST_RSA_N
    };
    json!({
        "kty": "RSA",
        "kid": kid,
        "use": "sig",
        "alg": "RS256",
        "n": n,
        "e": "AQAB",
    })
}

/// Mints an RS256 token signed with the published test key.
///
/// `extra` claims override the defaults (`iss`, `iat`, `exp` five minutes out).
pub fn mint_token(issuer: &str, extra: Value) -> String {
    mint_token_with(TEST_RSA_PEM, Some(TEST_KID), issuer, extra)
}

pub fn mint_token_with(pem: &str, kid: Option<&str>, issuer: &str, extra: Value) -> String {
    let now = chrono::Utc::now().timestamp();
    let mut claims = json!({
        "iss": issuer,
        "iat": now,
        "exp": now + 300,
    });
    if let (Some(base), Value::Object(extra)) = (claims.as_object_mut(), extra) {
        base.extend(extra);
    }

    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("Failed to load test key");
    encode(&header, &claims, &key).expect("Failed to sign test token")
}

/// Mock identity provider serving OpenID discovery and a key set
pub struct TestIdp {
    pub server: MockServer,
}

impl TestIdp {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": server.uri(),
                "jwks_uri": format!("{}/jwks", server.uri()),
            })))
            .mount(&server)
            .await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/jwks"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "keys": [jwk_json(TEST_KID)] })),
            )
            .mount(&server)
            .await;
        Self { server }
    }

    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    /// Number of discovery documents fetched so far
    pub async fn discovery_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path().starts_with("/.well-known/"))
            .count()
    }
}

/// Test fixture running the full router against a mock identity provider,
/// a mock GitHub API and a temporary filesystem root.
pub struct TestFixture {
    /// The application router
    pub app: Router,
    pub state: AppState,
    pub config: GatewayConfig,
    pub idp: TestIdp,
    pub github_mock: MockServer,
    pub workdir: TempDir,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Creates a fixture after letting the caller adjust the configuration
    pub async fn with_config(adjust: impl FnOnce(&mut GatewayConfig)) -> Self {
        Self::setup_logger(LevelFilter::Debug);

        let idp = TestIdp::start().await;
        let github_mock = MockServer::start().await;
        let workdir = TempDir::new().expect("Failed to create temp dir");

        let mut config = GatewayConfig::for_test(&[idp.issuer()], &github_mock, workdir.path());
        adjust(&mut config);

        let state = AppState::new(config.clone()).expect("Failed to create app state");
        let app = create_app(state.clone());

        Self {
            app,
            state,
            config,
            idp,
            github_mock,
            workdir,
        }
    }

    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    pub fn state_stats(&self) -> &SessionStats {
        self.state.sessions.stats()
    }

    /// Token issued by the fixture's identity provider
    pub fn token(&self, extra: Value) -> String {
        mint_token(&self.idp.issuer(), extra)
    }

    pub fn request_builder(
        &self,
        method: Method,
        uri: impl AsRef<str>,
        token: Option<&str>,
    ) -> http::request::Builder {
        let mut builder = Request::builder().method(method).uri(uri.as_ref());
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder
    }

    pub async fn get(&self, uri: impl AsRef<str>, token: Option<&str>) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri, token)
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn post_json(
        &self,
        uri: impl AsRef<str>,
        token: Option<&str>,
        body: &Value,
    ) -> TestResponse {
        let request = self
            .request_builder(Method::POST, uri, token)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Posts a JSON-RPC payload to the MCP endpoint
    pub async fn mcp(&self, token: Option<&str>, body: &Value) -> TestResponse {
        let request = self
            .request_builder(Method::POST, "/mcp", token)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .body(Body::from(body.to_string()))
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| json!({}))
        } else {
            json!({})
        };

        TestResponse {
            status,
            headers,
            body: body.to_vec(),
            json,
        }
    }

    /// Adds a mock GitHub route returning the given body
    pub async fn add_github_mock(
        &self,
        method: Method,
        path: impl Into<String>,
        response_body: Value,
        status_code: StatusCode,
        expected_calls: u64,
    ) {
        Mock::given(matchers::method(method.as_str()))
            .and(matchers::path(path.into()))
            .respond_with(ResponseTemplate::new(status_code.as_u16()).set_body_json(response_body))
            .expect(expected_calls)
            .mount(&self.github_mock)
            .await;
    }
}

/// Response from a test request
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Response body as JSON (empty object when absent or not JSON)
    pub json: Value,
}

impl TestResponse {
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).expect("Failed to deserialize response JSON")
    }
}
