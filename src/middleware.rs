use axum::extract::{FromRequestParts, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use http::header;
use http::request::Parts;

use crate::claims::TokenClaims;
use crate::config::AuthCookie;
use crate::token::decode_jwt;

/// Outcome of the protected-route check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// Send the visitor to this path.
    Redirect(String),
}

/// Whether `path` falls under the protected prefix (segment-wise, so
/// `/application` is not under `/app`).
fn is_protected(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// The route-guard rule used both by [`require_session`] and by
/// [`Session::require_auth`](crate::Session::require_auth): protected paths
/// need the auth cookie, everything else passes.
pub fn guard_decision(path: &str, has_cookie: bool, cookie: &AuthCookie) -> GuardDecision {
    if has_cookie || !is_protected(path, &cookie.protected_prefix) {
        GuardDecision::Allow
    } else {
        GuardDecision::Redirect(cookie.login_path.clone())
    }
}

/// Response extension set by [`SdkError`](crate::SdkError) when the
/// backend rejected the credentials.  [`require_session`] swaps such a
/// response for [`login_redirect`] with the app's own [`AuthCookie`].
#[derive(Debug, Clone, Copy)]
pub struct LoginRequired;

/// `303 See Other` to the login page, expiring the auth cookie.
pub fn login_redirect(cookie: &AuthCookie) -> Response {
    let mut response = Redirect::to(&cookie.login_path).into_response();
    if let Some(clear) = cookie.clear_header() {
        response.headers_mut().insert(header::SET_COOKIE, clear);
    }
    response.extensions_mut().insert(LoginRequired);
    response
}

/// Axum middleware redirecting cookie-less requests for protected paths.
///
/// Only the cookie's presence is checked; the token is verified by the
/// backend on first use.  A handler that returns
/// [`SdkError::AuthenticationRequired`](crate::SdkError::AuthenticationRequired)
/// is answered with a redirect to this cookie's login path that also
/// expires this cookie.
///
/// ```rust,no_run
/// use axum::{middleware, routing::get, Router};
/// use instantbackend::{middleware::require_session, AuthCookie};
///
/// let app: Router = Router::new()
///     .route("/app/dashboard", get(|| async { "dashboard" }))
///     .route("/login", get(|| async { "login" }))
///     .layer(middleware::from_fn_with_state(AuthCookie::default(), require_session));
/// ```
pub async fn require_session(State(cookie): State<AuthCookie>, req: Request, next: Next) -> Response {
    let has_cookie = cookie.read(req.headers()).is_some();
    match guard_decision(req.uri().path(), has_cookie, &cookie) {
        GuardDecision::Allow => {
            let response = next.run(req).await;
            if response.extensions().get::<LoginRequired>().is_some() {
                return login_redirect(&cookie);
            }
            response
        }
        GuardDecision::Redirect(to) => {
            tracing::debug!(path = req.uri().path(), "no session cookie, redirecting to {to}");
            Redirect::to(&to).into_response()
        }
    }
}

/// Axum extractor: the signed-in visitor, read from the auth cookie.
///
/// Claims are decoded without verification and serve display purposes
/// only.  Uses the [`AuthCookie`] from request extensions when one was
/// layered in, else the default.
///
/// ```rust,no_run
/// use axum::{routing::get, Extension, Router};
/// use instantbackend::{AuthCookie, AuthSession};
///
/// async fn whoami(session: AuthSession) -> String {
///     session.username.unwrap_or_default()
/// }
///
/// let app: Router = Router::new()
///     .route("/app/me", get(whoami))
///     .layer(Extension(AuthCookie::default()));
/// ```
#[derive(Debug, Clone)]
pub struct AuthSession {
    /// Raw bearer token, for building an [`InstantBackend`](crate::InstantBackend).
    pub token: String,
    pub claims: Option<TokenClaims>,
    pub api_key: Option<String>,
    pub username: Option<String>,
}

impl AuthSession {
    fn from_token(token: String) -> Self {
        let claims = decode_jwt(&token);
        Self {
            api_key: claims.as_ref().and_then(|c| c.api_key()).map(str::to_owned),
            username: claims.as_ref().and_then(|c| c.username()).map(str::to_owned),
            claims,
            token,
        }
    }
}

fn cookie_config(parts: &Parts) -> AuthCookie {
    parts.extensions.get::<AuthCookie>().cloned().unwrap_or_default()
}

impl<S> FromRequestParts<S> for AuthSession
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let cookie = cookie_config(parts);
        cookie
            .read(&parts.headers)
            .map(AuthSession::from_token)
            .ok_or_else(|| login_redirect(&cookie))
    }
}

/// Like [`AuthSession`] but yields `None` when the cookie is missing.
#[derive(Debug, Clone)]
pub struct OptionalAuthSession(Option<AuthSession>);

impl OptionalAuthSession {
    pub fn into_inner(self) -> Option<AuthSession> {
        self.0
    }
    pub fn as_ref(&self) -> Option<&AuthSession> {
        self.0.as_ref()
    }
}

impl<S> FromRequestParts<S> for OptionalAuthSession
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let cookie = cookie_config(parts);
        Ok(Self(cookie.read(&parts.headers).map(AuthSession::from_token)))
    }
}
