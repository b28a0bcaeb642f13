use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::config::AuthCookie;
use crate::middleware::login_redirect;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

/// Errors from the SDK, the session container and the route guard.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    /// The remote API answered 401 or 403.  The session must be torn down.
    #[error("{message}")]
    AuthenticationRequired { status: u16, message: String },

    /// Any other non-success status from the remote API.
    #[error("{message}")]
    OperationFailed { message: String, status: Option<u16> },

    /// No response at all (DNS, connect, TLS, body read).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Rejected locally, never sent over the wire.
    #[error("{0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SdkError>;

impl SdkError {
    pub(crate) fn operation(message: impl Into<String>, status: u16) -> Self {
        Self::OperationFailed {
            message: message.into(),
            status: Some(status),
        }
    }

    /// HTTP status attached to the error, if the remote API produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthenticationRequired { status, .. } => Some(*status),
            Self::OperationFailed { status, .. } => *status,
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            Self::Validation(_) | Self::Config(_) => None,
        }
    }

    /// True for 401/403, the only category handled session-wide.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::AuthenticationRequired { .. })
    }
}

/// The login endpoint words its "unverified account" rejection in a couple
/// of ways; both mean the user should be offered a new verification mail.
pub fn is_email_not_verified(err: &SdkError) -> bool {
    let message = err.to_string().to_lowercase();
    message.contains("email not verified") || message.contains("verify your email")
}

impl IntoResponse for SdkError {
    fn into_response(self) -> Response {
        let status = match &self {
            SdkError::AuthenticationRequired { .. } => {
                // Default cookie; `require_session` re-targets the redirect
                // to the app's configured one.
                let cookie = AuthCookie::default();
                tracing::info!("authentication required, redirecting to {}", cookie.login_path);
                return login_redirect(&cookie);
            }
            SdkError::OperationFailed { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            SdkError::Network(_) => StatusCode::BAD_GATEWAY,
            SdkError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SdkError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorBody {
            error: self.to_string(),
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}
