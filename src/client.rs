use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::collection::Collection;
use crate::config::{ClientConfig, DEFAULT_BASE_URL};
use crate::error::{Result, SdkError};
use crate::token::extract_api_key;

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterParams {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PasswordResetRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordReset {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionParams {
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A Stripe-hosted page (checkout or billing portal) to send the browser to.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostedSession {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of the e-mail verification endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationOutcome {
    pub message: Option<String>,
    pub username: Option<String>,
}

/// HTTP wrapper around the InstantBackend REST API.
///
/// A bearer token, when held, takes precedence over the API key.  Every
/// response is checked for 401/403 before anything else so callers get a
/// uniform [`SdkError::AuthenticationRequired`].  Nothing is retried.
///
/// ```rust,no_run
/// use instantbackend::InstantBackend;
///
/// # async fn example() -> instantbackend::Result<()> {
/// let mut client = InstantBackend::new("project-key");
/// client.login("ada", "Str0ng!Passw0rd").await?;
/// let open = client
///     .collection("tickets")
///     .filter("status", "==", "open")
///     .limit(10)
///     .sort("desc")
///     .get()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct InstantBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    token: Option<String>,
}

impl InstantBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: Some(api_key.into()).filter(|k| !k.is_empty()),
            token: None,
        }
    }

    /// Client bound to `token`.  An API key embedded in the token replaces
    /// the configured one.
    pub fn from_config(config: &ClientConfig, token: Option<String>) -> Self {
        let api_key = token
            .as_deref()
            .and_then(extract_api_key)
            .or_else(|| config.api_key.clone());
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            api_key,
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into()).filter(|t| !t.is_empty());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Content type plus exactly one credential: bearer token, else API key.
    pub fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.token {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(v) => {
                    headers.insert(header::AUTHORIZATION, v);
                }
                Err(e) => tracing::warn!("bearer token is not a valid header value: {e}"),
            }
        } else if let Some(key) = self.api_key_header() {
            headers.insert(API_KEY_HEADER, key);
        }
        headers
    }

    /// Headers for the anonymous account endpoints: the API key only.
    fn public_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = self.api_key_header() {
            headers.insert(API_KEY_HEADER, key);
        }
        headers
    }

    fn api_key_header(&self) -> Option<HeaderValue> {
        self.api_key
            .as_deref()
            .and_then(|k| HeaderValue::from_str(k).ok())
    }

    /// `{base_url}/{segments...}`, each segment percent-encoded.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SdkError::Config(format!("invalid base URL {:?}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| SdkError::Config(format!("base URL {:?} cannot hold a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Authenticated request builder.
    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http.request(method, url).headers(self.auth_headers())
    }

    /// Send, classify the status, decode the JSON body.
    pub(crate) async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        failure: &str,
    ) -> Result<T> {
        let result = send_checked(request, failure).await;
        if let Err(e) = &result {
            tracing::debug!("{failure}: {e}");
        }
        result
    }

    pub async fn register(&self, params: &RegisterParams) -> Result<Value> {
        let body = json!({
            "username": params.username,
            "password": params.password,
            "extraInfo": {
                "email": params.email,
                "fullName": params.full_name,
            },
        });
        let request = self
            .http
            .post(self.endpoint(&["register"])?)
            .headers(self.public_headers())
            .json(&body);
        self.execute(request, "Registration failed").await
    }

    /// Authenticate; a returned token is stored on this instance.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<LoginResponse> {
        let body = json!({
            "username": username,
            "password": password,
            "apiKey": self.api_key,
        });
        let request = self
            .http
            .post(self.endpoint(&["login"])?)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body);
        let response: LoginResponse = self.execute(request, "Authentication failed").await?;
        if let Some(token) = response.token.as_ref().filter(|t| !t.is_empty()) {
            self.token = Some(token.clone());
        }
        Ok(response)
    }

    pub async fn request_password_reset(&self, params: &PasswordResetRequest) -> Result<Value> {
        let request = self
            .http
            .post(self.endpoint(&["forgot-password"])?)
            .headers(self.public_headers())
            .json(params);
        self.execute(request, "Could not request a password reset").await
    }

    pub async fn reset_password(&self, params: &PasswordReset) -> Result<Value> {
        let request = self
            .http
            .post(self.endpoint(&["reset-password"])?)
            .headers(self.public_headers())
            .json(params);
        self.execute(request, "Could not reset password").await
    }

    pub async fn resend_verification(&self, email: &str) -> Result<VerificationOutcome> {
        let request = self
            .http
            .post(self.endpoint(&["resend-verification"])?)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&json!({ "email": email }));
        verification(
            request,
            "Failed to resend verification email. Please try again.",
        )
        .await
    }

    pub async fn verify_email(&self, token: &str) -> Result<VerificationOutcome> {
        let request = self
            .http
            .get(self.endpoint(&["verify-email"])?)
            .query(&[("token", token)]);
        verification(
            request,
            "Failed to verify email. The link may be expired or invalid.",
        )
        .await
    }

    /// One-off payment; `amount` is in cents, currency defaults to `eur`.
    pub async fn create_payment_intent(
        &self,
        amount: u64,
        currency: Option<&str>,
        description: Option<&str>,
    ) -> Result<Value> {
        let body = json!({
            "amount": amount,
            "currency": currency.unwrap_or("eur"),
            "description": description.unwrap_or_default(),
        });
        let request = self
            .request(Method::POST, self.endpoint(&["payment", "create-intent"])?)
            .json(&body);
        self.execute(request, "Failed to create payment intent").await
    }

    pub async fn create_subscription(&self, price_id: &str, customer_id: &str) -> Result<Value> {
        let request = self
            .request(Method::POST, self.endpoint(&["subscription", "create"])?)
            .json(&json!({ "priceId": price_id, "customerId": customer_id }));
        self.execute(request, "Failed to create subscription").await
    }

    /// Raw Stripe subscription status; see
    /// [`SubscriptionStatus::from_payload`](crate::SubscriptionStatus::from_payload).
    pub async fn get_subscription_status(&self) -> Result<Value> {
        let request = self.request(
            Method::GET,
            self.endpoint(&["stripe", "subscription", "status"])?,
        );
        self.execute(request, "Failed to get subscription status").await
    }

    pub async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams,
    ) -> Result<HostedSession> {
        let request = self
            .request(Method::POST, self.endpoint(&["stripe", "checkout"])?)
            .json(params);
        self.execute(request, "Failed to start checkout").await
    }

    pub async fn create_billing_portal_session(&self, return_url: &str) -> Result<HostedSession> {
        let request = self
            .request(Method::POST, self.endpoint(&["stripe", "portal"])?)
            .json(&json!({ "returnUrl": return_url }));
        self.execute(request, "Failed to create billing portal session")
            .await
    }

    pub async fn get_payment_methods(&self, customer_id: &str) -> Result<Value> {
        let request = self.request(
            Method::GET,
            self.endpoint(&["payment", "methods", customer_id])?,
        );
        self.execute(request, "Failed to get payment methods").await
    }

    pub async fn get_subscription(&self) -> Result<Value> {
        let request = self.request(Method::GET, self.endpoint(&["subscription", "current"])?);
        self.execute(request, "Failed to get subscription").await
    }

    pub async fn cancel_subscription(&self) -> Result<Value> {
        let request = self.request(Method::POST, self.endpoint(&["subscription", "cancel"])?);
        self.execute(request, "Failed to cancel subscription").await
    }

    /// Raw usage summary for `[start, end]`; see
    /// [`UsageSummary::from_payload`](crate::UsageSummary::from_payload).
    pub async fn usage_summary(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Value> {
        let request = self
            .request(Method::GET, self.endpoint(&["usage", "summary"])?)
            .header(header::ACCEPT, "application/json")
            .query(&[
                ("startDate", start.to_rfc3339_opts(SecondsFormat::Millis, true)),
                ("endDate", end.to_rfc3339_opts(SecondsFormat::Millis, true)),
            ]);
        self.execute(request, "Failed to fetch usage summary").await
    }

    /// Query builder for a named collection.  Nothing is sent until a
    /// terminal call.
    pub fn collection(&self, name: impl Into<String>) -> Collection<'_> {
        Collection::new(self, name)
    }
}

async fn send_checked<T: DeserializeOwned>(request: RequestBuilder, failure: &str) -> Result<T> {
    let response = request.send().await?;
    let response = check_response(response, failure).await?;
    let status = response.status();
    let body = response.bytes().await?;

    // An empty 2xx body (e.g. 204) reads as JSON `null`.
    let decoded = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_value(Value::Null)
    } else {
        serde_json::from_slice(&body)
    };
    decoded.map_err(|e| {
        tracing::warn!("{failure}: undecodable {status} response body: {e}");
        SdkError::operation(failure, status.as_u16())
    })
}

/// 401/403 first, then any other non-success status.
pub(crate) async fn check_response(response: Response, failure: &str) -> Result<Response> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let message = auth_failure_message(response).await;
        return Err(SdkError::AuthenticationRequired {
            status: status.as_u16(),
            message,
        });
    }
    if !status.is_success() {
        return Err(SdkError::operation(failure, status.as_u16()));
    }
    Ok(response)
}

async fn auth_failure_message(response: Response) -> String {
    const DEFAULT: &str = "Authentication required";

    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));

    let text = match response.text().await {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!("failed to read auth error response: {e}");
            return DEFAULT.into();
        }
    };

    let message = if is_json {
        match serde_json::from_str::<Value>(&text) {
            Ok(payload) => first_string(&payload, &["error", "message", "detail", "title"]),
            Err(e) => {
                tracing::warn!("failed to parse auth error response: {e}");
                None
            }
        }
    } else {
        Some(text.trim().to_string())
    };

    message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT.into())
}

/// First non-blank string among `keys`.
pub(crate) fn first_string(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| payload.get(*k).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
        .map(str::to_owned)
}

async fn verification(request: RequestBuilder, fallback: &str) -> Result<VerificationOutcome> {
    let response = request.send().await?;
    let status = response.status();
    let payload: Value = response.json().await.unwrap_or(Value::Null);

    let success = payload.get("success").and_then(Value::as_bool) == Some(true);
    if status.is_success() && success {
        return Ok(VerificationOutcome {
            message: first_string(&payload, &["message"]),
            username: first_string(&payload, &["username"]),
        });
    }

    let message = first_string(&payload, &["error", "message"]).unwrap_or_else(|| fallback.into());
    tracing::debug!("verification failed ({status}): {message}");
    Err(SdkError::OperationFailed {
        message,
        status: Some(status.as_u16()),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::token::tests::mint;
    use axum::extract::{Path, Query, State};
    use axum::http::HeaderMap as AxumHeaders;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    /// What the fake API saw.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct Seen {
        pub requests: Arc<Mutex<Vec<SeenRequest>>>,
    }

    #[derive(Debug, Clone)]
    pub(crate) struct SeenRequest {
        pub path: String,
        pub query: Vec<(String, String)>,
        pub authorization: Option<String>,
        pub api_key: Option<String>,
        pub body: Option<Value>,
    }

    impl Seen {
        pub(crate) async fn record(
            &self,
            path: &str,
            query: Vec<(String, String)>,
            headers: &AxumHeaders,
            body: Option<Value>,
        ) {
            let header = |name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned)
            };
            self.requests.lock().await.push(SeenRequest {
                path: path.to_string(),
                query,
                authorization: header("authorization"),
                api_key: header("x-api-key"),
                body,
            });
        }

        pub(crate) async fn all(&self) -> Vec<SeenRequest> {
            self.requests.lock().await.clone()
        }
    }

    /// Serve `app` on an ephemeral port; returns its base URL.
    pub(crate) async fn spawn(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test api");
        });
        format!("http://{addr}")
    }

    async fn login_handler(State(seen): State<Seen>, Json(body): Json<Value>) -> impl IntoResponse {
        seen.record("/login", vec![], &AxumHeaders::new(), Some(body.clone()))
            .await;
        if body["password"] == "Str0ng!Passw0rd" {
            let token = mint(json!({"user": {"apiKey": "user-key", "username": "ada"}}));
            (StatusCode::OK, Json(json!({"token": token, "expiresIn": 3600}))).into_response()
        } else {
            (StatusCode::BAD_REQUEST, Json(json!({"error": "bad credentials"}))).into_response()
        }
    }

    async fn echo(
        State(seen): State<Seen>,
        Path(path): Path<String>,
        Query(query): Query<Vec<(String, String)>>,
        headers: AxumHeaders,
        body: axum::body::Bytes,
    ) -> Json<Value> {
        let body = serde_json::from_slice(&body).ok();
        seen.record(&format!("/{path}"), query, &headers, body).await;
        Json(json!({"ok": true, "url": "https://checkout.stripe.test/session"}))
    }

    fn api(seen: Seen) -> Router {
        Router::new()
            .route("/login", post(login_handler))
            .route(
                "/unauthorized-json",
                get(|| async {
                    (StatusCode::UNAUTHORIZED, Json(json!({"message": "Token expired"})))
                }),
            )
            .route(
                "/forbidden-text",
                get(|| async { (StatusCode::FORBIDDEN, "  plan does not allow this \n") }),
            )
            .route(
                "/forbidden-empty",
                get(|| async { (StatusCode::FORBIDDEN, Json(json!({"error": "  "}))) }),
            )
            .route(
                "/broken",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            )
            .route("/no-content", get(|| async { StatusCode::NO_CONTENT }))
            .route("/not-json", get(|| async { "ok" }))
            .route(
                "/verify-email",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    if q.get("token").map(String::as_str) == Some("good") {
                        (StatusCode::OK, Json(json!({"success": true, "username": "ada"})))
                    } else {
                        (StatusCode::BAD_REQUEST, Json(json!({"success": false, "error": "Link expired"})))
                    }
                }),
            )
            .route("/{*path}", get(echo).post(echo))
            .with_state(seen)
    }

    async fn setup() -> (InstantBackend, Seen) {
        let seen = Seen::default();
        let base = spawn(api(seen.clone())).await;
        (InstantBackend::new("project-key").with_base_url(base), seen)
    }

    #[test]
    fn bearer_takes_precedence_over_api_key() {
        let client = InstantBackend::new("key").with_token("tok");
        let headers = client.auth_headers();
        assert_eq!(headers[header::AUTHORIZATION], "Bearer tok");
        assert!(headers.get(API_KEY_HEADER).is_none());

        let anonymous = InstantBackend::new("key");
        let headers = anonymous.auth_headers();
        assert_eq!(headers[API_KEY_HEADER], "key");
        assert!(headers.get(header::AUTHORIZATION).is_none());

        let bare = InstantBackend::new("");
        assert_eq!(bare.auth_headers().len(), 1);
    }

    #[test]
    fn from_config_prefers_token_api_key() {
        let token = mint(json!({"apiKey": "from-token"}));
        let cfg = ClientConfig::new("configured").base_url("http://api.test");
        let client = InstantBackend::from_config(&cfg, Some(token.clone()));
        assert_eq!(client.api_key(), Some("from-token"));
        assert_eq!(client.token(), Some(token.as_str()));

        let client = InstantBackend::from_config(&cfg, None);
        assert_eq!(client.api_key(), Some("configured"));
        assert_eq!(client.base_url(), "http://api.test");
    }

    #[test]
    fn endpoint_encodes_segments() {
        let client = InstantBackend::new("k").with_base_url("https://api.test/dev/");
        let url = client.endpoint(&["my items", "a/b"]).unwrap();
        assert_eq!(url.as_str(), "https://api.test/dev/my%20items/a%2Fb");
    }

    #[tokio::test]
    async fn login_stores_token() {
        let (mut client, seen) = setup().await;
        let response = client.login("ada", "Str0ng!Passw0rd").await.unwrap();
        assert!(response.token.is_some());
        assert_eq!(response.extra["expiresIn"], 3600);
        assert_eq!(client.token(), response.token.as_deref());

        let sent = seen.all().await;
        assert_eq!(sent[0].body.as_ref().unwrap()["apiKey"], "project-key");
    }

    #[tokio::test]
    async fn failed_login_is_operation_error() {
        let (mut client, _) = setup().await;
        let err = client.login("ada", "wrong").await.unwrap_err();
        assert!(matches!(
            err,
            SdkError::OperationFailed { ref message, status: Some(400) } if message == "Authentication failed"
        ));
        assert!(client.token().is_none());
    }

    #[tokio::test]
    async fn auth_errors_carry_server_message() {
        let (client, _) = setup().await;
        let get = |path: &'static str| {
            let client = client.clone();
            async move {
                let url = client.endpoint(&[path]).unwrap();
                client
                    .execute::<Value>(client.request(Method::GET, url), "Query failed")
                    .await
                    .unwrap_err()
            }
        };

        match get("unauthorized-json").await {
            SdkError::AuthenticationRequired { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Token expired");
            }
            other => panic!("unexpected {other:?}"),
        }
        match get("forbidden-text").await {
            SdkError::AuthenticationRequired { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "plan does not allow this");
            }
            other => panic!("unexpected {other:?}"),
        }
        match get("forbidden-empty").await {
            SdkError::AuthenticationRequired { message, .. } => {
                assert_eq!(message, "Authentication required");
            }
            other => panic!("unexpected {other:?}"),
        }
        let err = get("broken").await;
        assert!(!err.is_auth_error());
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.to_string(), "Query failed");
    }

    #[tokio::test]
    async fn success_bodies_that_are_not_json() {
        let (client, _) = setup().await;
        let fetch = |path: &'static str| {
            let client = client.clone();
            async move {
                let url = client.endpoint(&[path]).unwrap();
                client
                    .execute::<Value>(client.request(Method::GET, url), "Failed to cancel subscription")
                    .await
            }
        };

        assert_eq!(fetch("no-content").await.unwrap(), Value::Null);

        let err = fetch("not-json").await.unwrap_err();
        assert!(matches!(err, SdkError::OperationFailed { .. }), "{err:?}");
        assert_eq!(err.status(), Some(200));
        assert_eq!(err.to_string(), "Failed to cancel subscription");
    }

    #[tokio::test]
    async fn register_sends_extra_info_with_api_key() {
        let (client, seen) = setup().await;
        let params = RegisterParams {
            username: "ada".into(),
            password: "Str0ng!Passw0rd".into(),
            email: Some("ada@example.com".into()),
            full_name: Some("Ada Lovelace".into()),
        };
        client.register(&params).await.unwrap();

        let sent = seen.all().await;
        assert_eq!(sent[0].path, "/register");
        assert_eq!(sent[0].api_key.as_deref(), Some("project-key"));
        assert!(sent[0].authorization.is_none());
        let body = sent[0].body.as_ref().unwrap();
        assert_eq!(body["extraInfo"]["email"], "ada@example.com");
        assert_eq!(body["extraInfo"]["fullName"], "Ada Lovelace");
    }

    #[tokio::test]
    async fn billing_calls_use_bearer_and_paths() {
        let (client, seen) = setup().await;
        let client = client.with_token("tok");

        let checkout = client
            .create_checkout_session(&CheckoutSessionParams {
                price_id: "price_basic".into(),
                success_url: "https://site.test/ok".into(),
                cancel_url: "https://site.test/cancel".into(),
            })
            .await
            .unwrap();
        assert_eq!(checkout.url.as_deref(), Some("https://checkout.stripe.test/session"));

        client.create_billing_portal_session("https://site.test/app").await.unwrap();
        client.get_subscription_status().await.unwrap();
        client.create_payment_intent(1999, None, None).await.unwrap();
        client.create_subscription("price_basic", "cus_1").await.unwrap();
        client.get_payment_methods("cus_1").await.unwrap();
        client.get_subscription().await.unwrap();
        client.cancel_subscription().await.unwrap();

        let sent = seen.all().await;
        let paths: Vec<_> = sent.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            [
                "/stripe/checkout",
                "/stripe/portal",
                "/stripe/subscription/status",
                "/payment/create-intent",
                "/subscription/create",
                "/payment/methods/cus_1",
                "/subscription/current",
                "/subscription/cancel",
            ]
        );
        assert!(sent.iter().all(|r| r.authorization.as_deref() == Some("Bearer tok")));
        assert!(sent.iter().all(|r| r.api_key.is_none()));
        assert_eq!(sent[0].body.as_ref().unwrap()["priceId"], "price_basic");
        assert_eq!(sent[1].body.as_ref().unwrap()["returnUrl"], "https://site.test/app");
        assert_eq!(sent[3].body.as_ref().unwrap()["currency"], "eur");
    }

    #[tokio::test]
    async fn password_reset_endpoints() {
        let (client, seen) = setup().await;
        client
            .request_password_reset(&PasswordResetRequest {
                email: Some("ada@example.com".into()),
                username: None,
            })
            .await
            .unwrap();
        client
            .reset_password(&PasswordReset {
                token: "reset-tok".into(),
                password: "Str0ng!Passw0rd".into(),
            })
            .await
            .unwrap();

        let sent = seen.all().await;
        assert_eq!(sent[0].path, "/forgot-password");
        assert_eq!(sent[0].body.as_ref().unwrap(), &json!({"email": "ada@example.com"}));
        assert_eq!(sent[1].path, "/reset-password");
        assert_eq!(sent[1].body.as_ref().unwrap()["token"], "reset-tok");
    }

    #[tokio::test]
    async fn verify_email_outcomes() {
        let (client, _) = setup().await;
        let ok = client.verify_email("good").await.unwrap();
        assert_eq!(ok.username.as_deref(), Some("ada"));

        let err = client.verify_email("stale").await.unwrap_err();
        assert_eq!(err.to_string(), "Link expired");
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn unsuccessful_resend_uses_fallback_message() {
        let (client, seen) = setup().await;
        // The echo route answers without `success: true`.
        let err = client.resend_verification("ada@example.com").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to resend verification email. Please try again."
        );
        assert_eq!(seen.all().await[0].path, "/resend-verification");
    }

    #[tokio::test]
    async fn network_failure_propagates() {
        let client = InstantBackend::new("k").with_base_url("http://127.0.0.1:9");
        let err = client.get_subscription().await.unwrap_err();
        assert!(matches!(err, SdkError::Network(_)));
    }
}
