//! Venue REST dispatcher.
//!
//! Attaches the bearer token (and, for signed calls, the `X-Signature`
//! header) and forwards the venue's JSON response unmodified. There is no
//! retry: order mutations are not idempotent on the venue side.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::Serialize;

use super::api_types::join_url;
use super::query::QueryParams;
use super::signer::RequestSigner;
use crate::application::ports::TokenProvider;
use crate::error::GatewayError;
use crate::infrastructure::config::SessionConfig;
use crate::infrastructure::metrics;

/// Header carrying the hex request signature.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Build the HTTP client shared by a session's manager and dispatcher.
///
/// # Errors
///
/// Returns [`GatewayError::VenueUnreachable`] if the TLS backend cannot be
/// initialised.
pub fn build_http_client(config: &SessionConfig) -> Result<Client, GatewayError> {
    Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| GatewayError::VenueUnreachable(e.to_string()))
}

// =============================================================================
// Signed Envelope
// =============================================================================

/// Serialized request body and the signature computed over those bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    payload: Vec<u8>,
    signature: String,
}

impl SignedEnvelope {
    /// Sign already-serialized payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Signing`] if the signer fails.
    pub fn seal(payload: Vec<u8>, signer: &RequestSigner) -> Result<Self, GatewayError> {
        let signature = signer.sign(&payload)?;
        Ok(Self { payload, signature })
    }

    /// Get the bytes that will be sent.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the `X-Signature` header value.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    fn into_parts(self) -> (Vec<u8>, String) {
        (self.payload, self.signature)
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Sends authenticated requests to one venue REST endpoint.
#[derive(Clone)]
pub struct Dispatcher {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    signer: Option<RequestSigner>,
}

impl Dispatcher {
    /// Create a dispatcher for the given session.
    #[must_use]
    pub fn new(client: Client, config: &SessionConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client,
            base_url: config.base_url().to_string(),
            tokens,
            signer: config.signer().cloned(),
        }
    }

    /// Send a GET with query parameters.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Unauthenticated`] without touching the network if
    ///   no token is held
    /// - [`GatewayError::VenueUnreachable`] on transport failure
    /// - [`GatewayError::VenueRejected`] on a non-2xx status
    pub async fn get(
        &self,
        path: &str,
        query: &QueryParams,
    ) -> Result<serde_json::Value, GatewayError> {
        let token = self.tokens.current_token()?;
        let url = join_url(&self.base_url, path);

        let started = Instant::now();
        let result = self
            .client
            .get(&url)
            .header(AUTHORIZATION, token.header_value())
            .query(query.pairs())
            .send()
            .await;

        self.finish("GET", path, started, result).await
    }

    /// Send a POST with a JSON body, optionally signed.
    ///
    /// The body is serialized exactly once; the signature covers those bytes
    /// and the same bytes are sent.
    ///
    /// # Errors
    ///
    /// As [`Dispatcher::get`], plus [`GatewayError::SigningUnavailable`] if
    /// `signed` is set and no private key is configured.
    pub async fn post<B>(
        &self,
        path: &str,
        body: &B,
        signed: bool,
    ) -> Result<serde_json::Value, GatewayError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let token = self.tokens.current_token()?;
        let payload =
            serde_json::to_vec(body).map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

        let mut request = self
            .client
            .post(join_url(&self.base_url, path))
            .header(AUTHORIZATION, token.header_value())
            .header(CONTENT_TYPE, "application/json");

        let payload = if signed {
            let signer = self.signer.as_ref().ok_or(GatewayError::SigningUnavailable)?;
            let (payload, signature) = SignedEnvelope::seal(payload, signer)?.into_parts();
            request = request.header(SIGNATURE_HEADER, signature);
            payload
        } else {
            payload
        };

        let started = Instant::now();
        let result = request.body(payload).send().await;

        self.finish("POST", path, started, result).await
    }

    async fn finish(
        &self,
        method: &'static str,
        path: &str,
        started: Instant,
        result: Result<Response, reqwest::Error>,
    ) -> Result<serde_json::Value, GatewayError> {
        let outcome = read_response(result).await;
        let elapsed = started.elapsed();
        let session = self.tokens.kind();
        metrics::record_rest_request(session, method, outcome.is_ok(), elapsed);

        match &outcome {
            Ok(_) => tracing::debug!(
                session = %session,
                method,
                path,
                elapsed_ms = duration_ms(elapsed),
                "Venue request completed"
            ),
            Err(err) => tracing::warn!(
                session = %session,
                method,
                path,
                status = err.status(),
                elapsed_ms = duration_ms(elapsed),
                error = %err,
                "Venue request failed"
            ),
        }
        outcome
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("base_url", &self.base_url)
            .field("session", &self.tokens.kind())
            .field("signed", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

async fn read_response(
    result: Result<Response, reqwest::Error>,
) -> Result<serde_json::Value, GatewayError> {
    let response = result.map_err(|e| GatewayError::VenueUnreachable(e.to_string()))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| GatewayError::VenueUnreachable(e.to_string()))?;

    if !status.is_success() {
        return Err(GatewayError::VenueRejected {
            status: status.as_u16(),
            body: text,
        });
    }

    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| GatewayError::Decode(e.to_string()))
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::application::ports::MockTokenProvider;
    use crate::domain::session::{BearerToken, Session, SessionKind};

    const TEST_KEY_PEM: &str = include_str!("../../../tests/fixtures/test_signing_key.pem");

    fn tokens(token: Option<&str>) -> Arc<dyn TokenProvider> {
        let mut mock = MockTokenProvider::new();
        mock.expect_kind().return_const(SessionKind::Trading);
        let token = token.and_then(BearerToken::new);
        mock.expect_current_token()
            .returning(move || token.clone().ok_or(GatewayError::Unauthenticated));
        mock.expect_current_session().returning(|| {
            Ok(Arc::new(Session::new(BearerToken::new("t").unwrap(), Utc::now())))
        });
        Arc::new(mock)
    }

    fn dispatcher(server: &MockServer, token: Option<&str>, with_key: bool) -> Dispatcher {
        let mut config = SessionConfig::trading("id", "secret")
            .unwrap()
            .with_base_url(server.uri());
        if with_key {
            config = config.with_private_key(TEST_KEY_PEM).unwrap();
        }
        Dispatcher::new(Client::new(), &config, tokens(token))
    }

    #[tokio::test]
    async fn get_sends_bearer_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/Trading/orderBook"))
            .and(header("Authorization", "Bearer abc"))
            .and(query_param("account", "0001"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "status": 200, "data": [] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let query = QueryParams::new().param("account", "0001");
        let body = dispatcher(&server, Some("abc"), false)
            .get("api/v2/Trading/orderBook", &query)
            .await
            .unwrap();
        assert_eq!(body, json!({ "status": 200, "data": [] }));
    }

    #[tokio::test]
    async fn missing_token_fails_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = dispatcher(&server, None, false)
            .get("api/v2/Trading/orderBook", &QueryParams::new())
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Unauthenticated);
    }

    #[tokio::test]
    async fn signed_post_without_key_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = dispatcher(&server, Some("abc"), false)
            .post("api/v2/Trading/NewOrder", &json!({ "account": "0001" }), true)
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::SigningUnavailable);
    }

    #[tokio::test]
    async fn signed_post_attaches_signature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists(SIGNATURE_HEADER))
            .and(header("Content-Type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": 200 })))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = dispatcher(&server, Some("abc"), true);
        dispatcher
            .post("api/v2/Trading/NewOrder", &json!({ "account": "0001" }), true)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let signature = requests[0].headers.get(SIGNATURE_HEADER).unwrap().to_str().unwrap();
        let signer = RequestSigner::from_key_material(TEST_KEY_PEM).unwrap();
        assert!(signer.verify(&requests[0].body, signature));
    }

    #[tokio::test]
    async fn non_success_status_is_rejected_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad account"))
            .mount(&server)
            .await;

        let err = dispatcher(&server, Some("abc"), false)
            .get("api/v2/Trading/orderBook", &QueryParams::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::VenueRejected {
                status: 400,
                body: "bad account".to_string()
            }
        );
    }

    #[tokio::test]
    async fn venue_level_failure_is_passed_through() {
        let server = MockServer::start().await;
        let body = json!({ "status": 400, "message": "Invalid price" });
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
            .mount(&server)
            .await;

        let response = dispatcher(&server, Some("abc"), false)
            .post("api/v2/Trading/ModifyOrder", &json!({}), false)
            .await
            .unwrap();
        assert_eq!(response, body);
    }

    #[tokio::test]
    async fn unreachable_venue() {
        let config = SessionConfig::data("id", "secret")
            .unwrap()
            .with_base_url("http://127.0.0.1:1");
        let dispatcher = Dispatcher::new(Client::new(), &config, tokens(Some("abc")));
        let err = dispatcher
            .get("api/v2/Market/Securities", &QueryParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::VenueUnreachable(_)));
    }

    #[test]
    fn envelope_signature_covers_payload() {
        let signer = RequestSigner::from_key_material(TEST_KEY_PEM).unwrap();
        let envelope = SignedEnvelope::seal(b"{\"a\":1}".to_vec(), &signer).unwrap();
        assert!(signer.verify(envelope.payload(), envelope.signature()));
    }
}
