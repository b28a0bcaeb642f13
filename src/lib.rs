//! # instantbackend
//!
//! Client SDK for the InstantBackend hosted API, plus the session state,
//! JWT claim decoding, password policy, plan/usage derivation and axum
//! route guard that a dashboard built on it needs.
//!
//! Tokens are decoded without signature verification: derived values such
//! as the API key and username are for display and header selection only.
//! The backend verifies every token it receives.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use instantbackend::{ClientConfig, MemoryTokenStore, Session};
//!
//! #[tokio::main]
//! async fn main() -> instantbackend::Result<()> {
//!     let config = ClientConfig::from_env()?;
//!     let session = Session::new(config, Arc::new(MemoryTokenStore::new()));
//!
//!     session.login("ada", "Str0ng!Passw0rd").await?;
//!     let open = session
//!         .run(|client| async move {
//!             client
//!                 .collection("tickets")
//!                 .where_eq("status", "open")
//!                 .limit(10)
//!                 .sort("desc")
//!                 .get()
//!                 .await
//!         })
//!         .await?;
//!     println!("{open}");
//!     Ok(())
//! }
//! ```
//!
//! ## Protecting routes
//!
//! ```rust,no_run
//! use axum::{middleware, routing::get, Router};
//! use instantbackend::{middleware::require_session, AuthCookie, AuthSession};
//!
//! async fn me(session: AuthSession) -> String {
//!     session.username.unwrap_or_default()
//! }
//!
//! let cookie = AuthCookie::default();
//! let app: Router = Router::new()
//!     .route("/app/me", get(me))
//!     .layer(middleware::from_fn_with_state(cookie, require_session));
//! ```
//!
//! ## Environment variables (`ClientConfig::from_env`)
//!
//! This crate does **not** load `.env` files.
//!
//! | Variable                       | Default                          | Notes                         |
//! |--------------------------------|----------------------------------|-------------------------------|
//! | `INSTANTBACKEND_BASE_URL`      | `https://api.instantbackend.dev` | Must parse as a URL           |
//! | `INSTANTBACKEND_API_KEY`       | *(unset)*                        | Project key, `X-API-Key`      |
//! | `INSTANTBACKEND_REQUESTS_LIMIT`| `1000` | Used when usage has no limit and `PLAN_LIMIT_PERSONAL` is unset |
//! | `STRIPE_PRICE_PERSONAL`        | *(empty)*                        | Free tier, usually blank      |
//! | `STRIPE_PRICE_BASIC`           | built-in price id                |                               |
//! | `STRIPE_PRICE_PRO`             | built-in price id                |                               |
//! | `PLAN_LIMIT_PERSONAL` / `_BASIC` / `_PRO`   | `10000` / `50000` / `250000` | Requests per month |
//! | `PLAN_STORAGE_PERSONAL` / `_BASIC` / `_PRO` | `1024` / `10240` / `102400`  | MiB                |
//! | `STRIPE_SUCCESS_URL`           | `http://localhost:3000/checkout/success` |                               |
//! | `STRIPE_CANCEL_URL`            | `http://localhost:3000/checkout/cancel`  |                               |
//! | `AUTH_COOKIE_SECURE`           | `false`                          | `true` or `1` behind TLS      |

pub mod billing;
pub mod claims;
pub mod client;
pub mod collection;
pub mod config;
pub mod error;
pub mod middleware;
pub mod password;
pub mod session;
pub mod store;
pub mod token;
pub mod usage;

pub use billing::{
    fetch_subscription_status, open_billing_portal, start_checkout, upgrade_targets, Plan,
    SubscriptionStatus,
};
pub use claims::{TokenClaims, UserClaims};
pub use client::{
    CheckoutSessionParams, HostedSession, InstantBackend, LoginResponse, PasswordReset,
    PasswordResetRequest, RegisterParams, VerificationOutcome,
};
pub use collection::{list_collections, Collection, CollectionSummary, Filter, SortOrder};
pub use config::{AuthCookie, CheckoutUrls, ClientConfig, PerPlan, PlanCatalog};
pub use error::{is_email_not_verified, Result, SdkError};
pub use middleware::{
    guard_decision, login_redirect, AuthSession, GuardDecision, LoginRequired, OptionalAuthSession,
};
pub use password::{
    password_checks, validate_password, PasswordCheck, PasswordRule, PasswordValidation,
    PASSWORD_REQUIREMENTS,
};
pub use session::Session;
pub use store::{CookieTokenStore, MemoryTokenStore, TokenStore};
pub use token::{decode_jwt, extract_api_key, extract_username};
pub use usage::{fetch_usage, usage_percent, UsageSummary, UsageView};
