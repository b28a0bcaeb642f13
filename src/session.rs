use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::billing::{fetch_subscription_status, Plan, SubscriptionStatus};
use crate::client::{InstantBackend, LoginResponse};
use crate::config::ClientConfig;
use crate::error::{Result, SdkError};
use crate::middleware::{guard_decision, GuardDecision};
use crate::store::TokenStore;
use crate::token::decode_jwt;

#[derive(Default)]
struct SessionState {
    token: Option<String>,
    api_key: Option<String>,
    username: Option<String>,
    client: Option<Arc<InstantBackend>>,
    subscription_status: Option<SubscriptionStatus>,
    /// Bumped on every token change; results of calls issued under an older
    /// epoch are discarded.
    epoch: u64,
    redirect: Option<String>,
}

struct Inner {
    config: ClientConfig,
    store: Arc<dyn TokenStore>,
    state: RwLock<SessionState>,
    refresh_seq: AtomicU64,
}

/// Authentication state for one browser session.
///
/// Holds the bearer token, the values derived from it, the single current
/// [`InstantBackend`] client and the cached subscription status.  Cloning
/// is cheap and every clone sees the same state.
///
/// Derived `api_key` and `username` come from unverified claims and are for
/// display only.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Create the session and restore a persisted token, if any.
    pub fn new(config: ClientConfig, store: Arc<dyn TokenStore>) -> Self {
        let session = Self {
            inner: Arc::new(Inner {
                config,
                store,
                state: RwLock::new(SessionState::default()),
                refresh_seq: AtomicU64::new(0),
            }),
        };
        session.restore();
        session
    }

    /// Adopt the persisted token when no client exists yet and start a
    /// subscription-status refresh for it.  Returns true when a token was
    /// restored.
    pub fn restore(&self) -> bool {
        if self.inner.state.read().client.is_some() {
            return false;
        }
        let Some(token) = self.inner.store.load() else {
            return false;
        };
        tracing::debug!("restoring persisted session");
        let (client, epoch) = self.install(token, None);
        self.spawn_refresh(client, epoch);
        true
    }

    fn install(&self, token: String, client: Option<InstantBackend>) -> (Arc<InstantBackend>, u64) {
        let claims = decode_jwt(&token);
        let client =
            client.unwrap_or_else(|| InstantBackend::from_config(&self.inner.config, Some(token.clone())));

        let mut state = self.inner.state.write();
        state.epoch += 1;
        state.api_key = claims.as_ref().and_then(|c| c.api_key()).map(str::to_owned);
        state.username = claims.as_ref().and_then(|c| c.username()).map(str::to_owned);
        state.token = Some(token);
        let client = Arc::new(client);
        state.client = Some(client.clone());
        state.subscription_status = None;
        state.redirect = None;
        (client, state.epoch)
    }

    /// Persist `token`, derive its claims, bind a client (the given one or
    /// a fresh one) and start a subscription-status refresh in the
    /// background.  The refresh handle is `None` outside a Tokio runtime.
    pub fn set_auth(
        &self,
        token: &str,
        client: Option<InstantBackend>,
    ) -> Result<Option<JoinHandle<Option<SubscriptionStatus>>>> {
        self.inner.store.save(token)?;
        let (client, epoch) = self.install(token.to_string(), client);
        tracing::info!(username = ?self.username(), "session authenticated");
        Ok(self.spawn_refresh(client, epoch))
    }

    fn spawn_refresh(
        &self,
        client: Arc<InstantBackend>,
        epoch: u64,
    ) -> Option<JoinHandle<Option<SubscriptionStatus>>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime, subscription status not refreshed");
            return None;
        };
        let session = self.clone();
        Some(runtime.spawn(async move {
            session.refresh_with(client, epoch).await
        }))
    }

    /// Sign in with an anonymous client, then [`set_auth`](Self::set_auth)
    /// with the returned token.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let mut anonymous = InstantBackend::from_config(&self.inner.config, None);
        let response = anonymous.login(username, password).await?;
        let token = anonymous
            .token()
            .map(str::to_owned)
            .or_else(|| response.token.clone())
            .ok_or_else(|| SdkError::Validation("JWT token was not received".into()))?;

        let bound = InstantBackend::from_config(&self.inner.config, Some(token.clone()));
        self.set_auth(&token, Some(bound))?;
        Ok(response)
    }

    /// Clear the persisted token and every derived value.  No network call.
    pub fn logout(&self) {
        self.inner.store.clear();
        let mut state = self.inner.state.write();
        let epoch = state.epoch + 1;
        let redirect = state.redirect.take();
        *state = SessionState {
            epoch,
            redirect,
            ..SessionState::default()
        };
        tracing::info!("session cleared");
    }

    /// Tear the session down after a 401/403 and queue a login redirect.
    /// Returns false for any other error.
    pub fn handle_auth_error(&self, err: &SdkError) -> bool {
        if !err.is_auth_error() {
            return false;
        }
        tracing::info!("authentication rejected ({err}), signing out");
        self.logout();
        self.inner.state.write().redirect = Some(self.inner.config.cookie.login_path.clone());
        true
    }

    /// Pending login redirect left by an authentication failure.
    pub fn take_redirect(&self) -> Option<String> {
        self.inner.state.write().redirect.take()
    }

    /// Run an SDK call with the current client.  A 401/403 from the call
    /// (or having no client at all) signs the session out; the error is
    /// still returned.  Nothing is retried.
    pub async fn run<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: FnOnce(Arc<InstantBackend>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(client) = self.client() else {
            let err = SdkError::AuthenticationRequired {
                status: 401,
                message: "Not signed in".into(),
            };
            self.handle_auth_error(&err);
            return Err(err);
        };
        let result = call(client).await;
        if let Err(e) = &result {
            self.handle_auth_error(e);
        }
        result
    }

    /// Fetch the subscription status with `client_override` or the current
    /// client and cache it.
    ///
    /// Only the most recently issued refresh may write the cache, and only
    /// if the token did not change meanwhile.  A 401/403 signs the session
    /// out; any other failure clears the cache and is logged, not returned.
    pub async fn refresh_subscription_status(
        &self,
        client_override: Option<Arc<InstantBackend>>,
    ) -> Option<SubscriptionStatus> {
        let (client, epoch) = {
            let state = self.inner.state.read();
            (client_override.or_else(|| state.client.clone())?, state.epoch)
        };
        self.refresh_with(client, epoch).await
    }

    async fn refresh_with(&self, client: Arc<InstantBackend>, epoch: u64) -> Option<SubscriptionStatus> {
        let seq = self.inner.refresh_seq.fetch_add(1, Ordering::SeqCst) + 1;

        let result = fetch_subscription_status(&client).await;

        let is_current = |state: &SessionState| {
            state.epoch == epoch && self.inner.refresh_seq.load(Ordering::SeqCst) == seq
        };

        match result {
            Ok(status) => {
                let mut state = self.inner.state.write();
                if is_current(&state) {
                    state.subscription_status = Some(status.clone());
                } else {
                    tracing::debug!("discarding superseded subscription status");
                }
                Some(status)
            }
            Err(e) if e.is_auth_error() => {
                if self.inner.state.read().epoch == epoch {
                    self.handle_auth_error(&e);
                }
                None
            }
            Err(e) => {
                tracing::warn!("could not fetch subscription status: {e}");
                let mut state = self.inner.state.write();
                if is_current(&state) {
                    state.subscription_status = None;
                }
                None
            }
        }
    }

    /// Login path when neither the session nor the store holds a token.
    pub fn require_auth(&self) -> Option<String> {
        let has_token = self.is_authenticated() || self.inner.store.load().is_some();
        match guard_decision(
            &self.inner.config.cookie.protected_prefix,
            has_token,
            &self.inner.config.cookie,
        ) {
            GuardDecision::Allow => None,
            GuardDecision::Redirect(to) => Some(to),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn client(&self) -> Option<Arc<InstantBackend>> {
        self.inner.state.read().client.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.state.read().token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.read().token.is_some()
    }

    pub fn api_key(&self) -> Option<String> {
        self.inner.state.read().api_key.clone()
    }

    pub fn username(&self) -> Option<String> {
        self.inner.state.read().username.clone()
    }

    pub fn subscription_status(&self) -> Option<SubscriptionStatus> {
        self.inner.state.read().subscription_status.clone()
    }

    /// Plan resolved from the cached status; `None` when unknown.
    pub fn current_plan(&self) -> Option<Plan> {
        self.inner
            .state
            .read()
            .subscription_status
            .as_ref()
            .and_then(|s| s.resolve_plan(&self.inner.config.plans))
    }
}
