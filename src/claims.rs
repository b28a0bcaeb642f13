use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Deserialize `T` if the value has the right shape, otherwise `None`.
///
/// Token payloads come from whatever issued them; a claim of an unexpected
/// type must not make the whole payload unreadable.
fn lenient<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(d)?;
    Ok(serde_json::from_value(value).ok())
}

/// The nested `user` object some issuers embed in the payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserClaims {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Decoded, **unverified** JWT payload.
///
/// The signature is never checked here, so nothing read from these claims
/// may drive an authorization decision.  They are display values only; the
/// remote API authenticates the raw token on every call.
///
/// ```rust
/// use instantbackend::TokenClaims;
///
/// let claims: TokenClaims =
///     serde_json::from_str(r#"{"user":{"apiKey":"k1","username":"ada"},"exp":1}"#).unwrap();
/// assert_eq!(claims.api_key(), Some("k1"));
/// assert_eq!(claims.username(), Some("ada"));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub user: Option<UserClaims>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Everything else the issuer put in the payload.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

impl TokenClaims {
    /// `user.apiKey`, then top-level `apiKey`.
    pub fn api_key(&self) -> Option<&str> {
        self.user
            .as_ref()
            .and_then(|u| non_empty(&u.api_key))
            .or_else(|| non_empty(&self.api_key))
    }

    /// `user.username`, then `username`, then `email`.
    pub fn username(&self) -> Option<&str> {
        self.user
            .as_ref()
            .and_then(|u| non_empty(&u.username))
            .or_else(|| non_empty(&self.username))
            .or_else(|| non_empty(&self.email))
    }

    /// True when `exp` is present and in the past.
    pub fn is_expired(&self, now: i64) -> bool {
        self.exp.is_some_and(|exp| exp <= now)
    }
}
