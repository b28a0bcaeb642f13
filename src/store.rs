use axum::http::{header, HeaderMap, HeaderValue};
use parking_lot::Mutex;

use crate::config::AuthCookie;
use crate::error::Result;

/// Where the raw bearer token is persisted between page loads.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str) -> Result<()>;
    fn clear(&self);
}

/// Process-local store, for CLIs and tests.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.lock().clone()
    }

    fn save(&self, token: &str) -> Result<()> {
        *self.token.lock() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) {
        *self.token.lock() = None;
    }
}

/// The browser's auth cookie, seen from one request/response cycle.
///
/// Reads the token from the incoming `Cookie` header and queues
/// `Set-Cookie` values for the response.
///
/// ```rust
/// use axum::http::{header, HeaderMap};
/// use instantbackend::{AuthCookie, CookieTokenStore, TokenStore};
///
/// let mut request = HeaderMap::new();
/// request.insert(header::COOKIE, "ib_token=abc".parse().unwrap());
/// let store = CookieTokenStore::from_headers(&request, AuthCookie::default());
/// assert_eq!(store.load().as_deref(), Some("abc"));
///
/// store.clear();
/// let mut response = HeaderMap::new();
/// store.apply(&mut response);
/// assert!(response.contains_key(header::SET_COOKIE));
/// ```
#[derive(Debug)]
pub struct CookieTokenStore {
    cookie: AuthCookie,
    current: Mutex<Option<String>>,
    pending: Mutex<Vec<HeaderValue>>,
}

impl CookieTokenStore {
    /// Also marks the cookie `Secure` when the request came in over TLS
    /// behind a proxy; see [`AuthCookie::for_request`].
    pub fn from_headers(headers: &HeaderMap, cookie: AuthCookie) -> Self {
        let cookie = cookie.for_request(headers);
        Self {
            current: Mutex::new(cookie.read(headers)),
            cookie,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Queued `Set-Cookie` values, oldest first.  Drains the queue.
    pub fn take_set_cookies(&self) -> Vec<HeaderValue> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Append queued `Set-Cookie` values to a response.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for value in self.take_set_cookies() {
            headers.append(header::SET_COOKIE, value);
        }
    }
}

impl TokenStore for CookieTokenStore {
    fn load(&self) -> Option<String> {
        self.current.lock().clone()
    }

    fn save(&self, token: &str) -> Result<()> {
        let value = self.cookie.set_header(token)?;
        self.pending.lock().push(value);
        *self.current.lock() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) {
        if let Some(value) = self.cookie.clear_header() {
            self.pending.lock().push(value);
        }
        *self.current.lock() = None;
    }
}
