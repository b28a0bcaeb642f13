use axum::http::{header, HeaderMap, HeaderValue};

use crate::billing::Plan;
use crate::error::SdkError;

pub const DEFAULT_BASE_URL: &str = "https://api.instantbackend.dev";
pub const DEFAULT_COOKIE_NAME: &str = "ib_token";
pub const DEFAULT_REQUESTS_LIMIT: u64 = 1000;

/// One value per subscription tier.
#[derive(Debug, Clone, PartialEq)]
pub struct PerPlan<T> {
    pub personal: T,
    pub basic: T,
    pub professional: T,
}

impl<T> PerPlan<T> {
    pub fn get(&self, plan: Plan) -> &T {
        match plan {
            Plan::Personal => &self.personal,
            Plan::Basic => &self.basic,
            Plan::Professional => &self.professional,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Plan, &T)> {
        [
            (Plan::Personal, &self.personal),
            (Plan::Basic, &self.basic),
            (Plan::Professional, &self.professional),
        ]
        .into_iter()
    }
}

/// Stripe price ids and quota per plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanCatalog {
    /// Empty string means "no price configured" (the free tier has none).
    pub prices: PerPlan<String>,
    pub request_limits: PerPlan<u64>,
    pub storage_limits_mb: PerPlan<f64>,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self {
            prices: PerPlan {
                personal: String::new(),
                basic: "price_1ScOvDQwusGQNJkIArSeN5js".into(),
                professional: "price_1ScOxOQwusGQNJkIkVzMnm8m".into(),
            },
            request_limits: PerPlan {
                personal: 10_000,
                basic: 50_000,
                professional: 250_000,
            },
            storage_limits_mb: PerPlan {
                personal: 1024.0,
                basic: 10_240.0,
                professional: 102_400.0,
            },
        }
    }
}

impl PlanCatalog {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            prices: PerPlan {
                personal: env_or("STRIPE_PRICE_PERSONAL", d.prices.personal),
                basic: env_or("STRIPE_PRICE_BASIC", d.prices.basic),
                professional: env_or("STRIPE_PRICE_PRO", d.prices.professional),
            },
            request_limits: PerPlan {
                personal: env_parse("PLAN_LIMIT_PERSONAL").unwrap_or(d.request_limits.personal),
                basic: env_parse("PLAN_LIMIT_BASIC").unwrap_or(d.request_limits.basic),
                professional: env_parse("PLAN_LIMIT_PRO").unwrap_or(d.request_limits.professional),
            },
            storage_limits_mb: PerPlan {
                personal: env_parse("PLAN_STORAGE_PERSONAL").unwrap_or(d.storage_limits_mb.personal),
                basic: env_parse("PLAN_STORAGE_BASIC").unwrap_or(d.storage_limits_mb.basic),
                professional: env_parse("PLAN_STORAGE_PRO")
                    .unwrap_or(d.storage_limits_mb.professional),
            },
        }
    }

    /// Configured price id, `None` when blank.
    pub fn price_for(&self, plan: Plan) -> Option<&str> {
        Some(self.prices.get(plan).as_str()).filter(|p| !p.is_empty())
    }

    pub fn price(mut self, plan: Plan, price_id: impl Into<String>) -> Self {
        match plan {
            Plan::Personal => self.prices.personal = price_id.into(),
            Plan::Basic => self.prices.basic = price_id.into(),
            Plan::Professional => self.prices.professional = price_id.into(),
        }
        self
    }

    pub fn request_limit(mut self, plan: Plan, limit: u64) -> Self {
        match plan {
            Plan::Personal => self.request_limits.personal = limit,
            Plan::Basic => self.request_limits.basic = limit,
            Plan::Professional => self.request_limits.professional = limit,
        }
        self
    }
}

/// Where Stripe sends the browser back to.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

impl Default for CheckoutUrls {
    fn default() -> Self {
        Self {
            success_url: "http://localhost:3000/checkout/success".into(),
            cancel_url: "http://localhost:3000/checkout/cancel".into(),
        }
    }
}

impl CheckoutUrls {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            success_url: env_or("STRIPE_SUCCESS_URL", d.success_url),
            cancel_url: env_or("STRIPE_CANCEL_URL", d.cancel_url),
        }
    }
}

/// The cookie holding the raw bearer token, and the paths it guards.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthCookie {
    pub name: String,
    pub path: String,
    pub max_age_days: u32,
    /// Set when the site is served over TLS.
    pub secure: bool,
    pub login_path: String,
    pub protected_prefix: String,
}

impl Default for AuthCookie {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.into(),
            path: "/".into(),
            max_age_days: 7,
            secure: false,
            login_path: "/login".into(),
            protected_prefix: "/app".into(),
        }
    }
}

impl AuthCookie {
    pub fn secure(mut self, v: bool) -> Self {
        self.secure = v;
        self
    }
    pub fn name(mut self, v: impl Into<String>) -> Self {
        self.name = v.into();
        self
    }
    pub fn login_path(mut self, v: impl Into<String>) -> Self {
        self.login_path = v.into();
        self
    }
    pub fn protected_prefix(mut self, v: impl Into<String>) -> Self {
        self.protected_prefix = v.into();
        self
    }

    /// This cookie as seen by one request: `Secure` is also set when a
    /// proxy reports the request arrived over TLS (`X-Forwarded-Proto` or
    /// `Forwarded: proto=https`).
    pub fn for_request(&self, headers: &HeaderMap) -> Self {
        let forwarded_https = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
            || headers
                .get_all(header::FORWARDED)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(|v| v.split([';', ',']))
                .filter_map(|pair| pair.trim().split_once('='))
                .any(|(k, v)| {
                    k.eq_ignore_ascii_case("proto") && v.trim_matches('"').eq_ignore_ascii_case("https")
                });
        self.clone().secure(self.secure || forwarded_https)
    }

    /// `Set-Cookie` value persisting `token`.
    pub fn set_header(&self, token: &str) -> Result<HeaderValue, SdkError> {
        let mut value = format!(
            "{}={}; Path={}; Max-Age={}; SameSite=Lax",
            self.name,
            token,
            self.path,
            u64::from(self.max_age_days) * 86_400
        );
        if self.secure {
            value.push_str("; Secure");
        }
        HeaderValue::from_str(&value)
            .map_err(|_| SdkError::Validation("token is not a valid cookie value".into()))
    }

    /// `Set-Cookie` value expiring the cookie immediately.  `None` when the
    /// configured name or path cannot appear in a header.
    pub fn clear_header(&self) -> Option<HeaderValue> {
        let mut value = format!(
            "{}=; Path={}; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; SameSite=Lax",
            self.name, self.path
        );
        if self.secure {
            value.push_str("; Secure");
        }
        match HeaderValue::from_str(&value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(cookie = %self.name, "cannot build cookie-clearing header: {e}");
                None
            }
        }
    }

    /// Token from the request's `Cookie` header; blank values count as absent.
    pub fn read(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == self.name)
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Configuration for [`InstantBackend`](crate::InstantBackend) and
/// [`Session`](crate::Session).
///
/// Build with [`new`](Self::new) or [`from_env`](Self::from_env).  The
/// environment is read once; nothing re-reads it later.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Project API key, sent as `X-API-Key` when no bearer token is held.
    pub api_key: Option<String>,
    /// Request quota used when the usage payload carries none.
    pub requests_limit: Option<u64>,
    pub plans: PlanCatalog,
    pub checkout: CheckoutUrls,
    pub cookie: AuthCookie,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: None,
            requests_limit: None,
            plans: PlanCatalog::default(),
            checkout: CheckoutUrls::default(),
            cookie: AuthCookie::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::default().api_key(api_key)
    }

    /// Build from environment variables already set in the process.
    ///
    /// | Variable                        | Default                          |
    /// |---------------------------------|----------------------------------|
    /// | `INSTANTBACKEND_BASE_URL`       | `https://api.instantbackend.dev` |
    /// | `INSTANTBACKEND_API_KEY`        | *(unset)*                        |
    /// | `INSTANTBACKEND_REQUESTS_LIMIT` | *(unset)*                        |
    /// | `AUTH_COOKIE_SECURE`            | `false`                          |
    ///
    /// Plan prices, limits and checkout URLs are read by
    /// [`PlanCatalog::from_env`] and [`CheckoutUrls::from_env`].
    pub fn from_env() -> Result<Self, SdkError> {
        let base_url = env_or("INSTANTBACKEND_BASE_URL", DEFAULT_BASE_URL.into());
        let api_key = std::env::var("INSTANTBACKEND_API_KEY")
            .ok()
            .filter(|v| !v.is_empty());
        let secure = std::env::var("AUTH_COOKIE_SECURE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let config = Self {
            base_url,
            api_key,
            requests_limit: fallback_limit_from(|key| std::env::var(key).ok()),
            plans: PlanCatalog::from_env(),
            checkout: CheckoutUrls::from_env(),
            cookie: AuthCookie::default().secure(secure),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SdkError> {
        reqwest::Url::parse(&self.base_url)
            .map(|_| ())
            .map_err(|e| SdkError::Config(format!("invalid base URL {:?}: {e}", self.base_url)))
    }

    /// Request quota when neither the plan nor the payload provides one.
    pub fn fallback_requests_limit(&self) -> u64 {
        self.requests_limit.unwrap_or(DEFAULT_REQUESTS_LIMIT)
    }

    pub fn base_url(mut self, v: impl Into<String>) -> Self {
        self.base_url = v.into().trim_end_matches('/').to_string();
        self
    }
    pub fn api_key(mut self, v: impl Into<String>) -> Self {
        self.api_key = Some(v.into()).filter(|k| !k.is_empty());
        self
    }
    pub fn requests_limit(mut self, v: u64) -> Self {
        self.requests_limit = Some(v);
        self
    }
    pub fn plans(mut self, v: PlanCatalog) -> Self {
        self.plans = v;
        self
    }
    pub fn checkout(mut self, v: CheckoutUrls) -> Self {
        self.checkout = v;
        self
    }
    pub fn cookie(mut self, v: AuthCookie) -> Self {
        self.cookie = v;
        self
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Request quota for usage payloads without a limit: the free tier's
/// limit, then the SDK-wide one.
fn fallback_limit_from(var: impl Fn(&str) -> Option<String>) -> Option<u64> {
    ["PLAN_LIMIT_PERSONAL", "INSTANTBACKEND_REQUESTS_LIMIT"]
        .into_iter()
        .find_map(|key| var(key).and_then(|v| v.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_header_has_site_wide_lax_week() {
        let cookie = AuthCookie::default();
        let value = cookie.set_header("abc.def.ghi").unwrap();
        assert_eq!(
            value.to_str().unwrap(),
            "ib_token=abc.def.ghi; Path=/; Max-Age=604800; SameSite=Lax"
        );

        let secure = cookie.secure(true).set_header("t").unwrap();
        assert!(secure.to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn cookie_read_finds_named_pair() {
        let cookie = AuthCookie::default();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; ib_token=tok123 ; other=1"),
        );
        assert_eq!(cookie.read(&headers).as_deref(), Some("tok123"));

        let mut blank = HeaderMap::new();
        blank.insert(header::COOKIE, HeaderValue::from_static("ib_token="));
        assert_eq!(cookie.read(&blank), None);
        assert_eq!(cookie.read(&HeaderMap::new()), None);
    }

    #[test]
    fn secure_follows_forwarded_scheme() {
        let cookie = AuthCookie::default();

        let mut proxied = HeaderMap::new();
        proxied.insert("x-forwarded-proto", HeaderValue::from_static("https, http"));
        assert!(cookie.for_request(&proxied).secure);

        let mut forwarded = HeaderMap::new();
        forwarded.insert(header::FORWARDED, HeaderValue::from_static("for=1.2.3.4;proto=\"https\""));
        assert!(cookie.for_request(&forwarded).secure);

        let mut plain = HeaderMap::new();
        plain.insert("x-forwarded-proto", HeaderValue::from_static("http"));
        assert!(!cookie.for_request(&plain).secure);
        assert!(!cookie.for_request(&HeaderMap::new()).secure);

        assert!(cookie.secure(true).for_request(&plain).secure);
    }

    #[test]
    fn token_with_separator_is_rejected() {
        assert!(AuthCookie::default().set_header("bad\nvalue").is_err());
    }

    #[test]
    fn base_url_is_normalised_and_validated() {
        let cfg = ClientConfig::new("key").base_url("http://localhost:4000/");
        assert_eq!(cfg.base_url, "http://localhost:4000");
        assert!(cfg.validate().is_ok());

        let bad = ClientConfig::new("key").base_url("not a url");
        assert!(matches!(bad.validate(), Err(SdkError::Config(_))));
    }

    #[test]
    fn blank_api_key_is_absent() {
        assert_eq!(ClientConfig::new("").api_key, None);
    }

    #[test]
    fn catalog_blank_price_is_unconfigured() {
        let catalog = PlanCatalog::default();
        assert_eq!(catalog.price_for(Plan::Personal), None);
        assert_eq!(
            catalog.price_for(Plan::Professional),
            Some("price_1ScOxOQwusGQNJkIkVzMnm8m")
        );
        let catalog = catalog.price(Plan::Personal, "price_free");
        assert_eq!(catalog.price_for(Plan::Personal), Some("price_free"));
    }

    #[test]
    fn free_tier_limit_wins_over_sdk_limit() {
        let both = |key: &str| match key {
            "PLAN_LIMIT_PERSONAL" => Some("10000".to_string()),
            "INSTANTBACKEND_REQUESTS_LIMIT" => Some("500".to_string()),
            _ => None,
        };
        assert_eq!(fallback_limit_from(both), Some(10_000));

        let sdk_only = |key: &str| (key == "INSTANTBACKEND_REQUESTS_LIMIT").then(|| "500".to_string());
        assert_eq!(fallback_limit_from(sdk_only), Some(500));

        let garbage = |key: &str| (key == "PLAN_LIMIT_PERSONAL").then(|| "lots".to_string());
        assert_eq!(fallback_limit_from(garbage), None);
    }

    #[test]
    fn fallback_limit_defaults_to_a_thousand() {
        assert_eq!(ClientConfig::default().fallback_requests_limit(), 1000);
        assert_eq!(
            ClientConfig::default().requests_limit(42).fallback_requests_limit(),
            42
        );
    }
}
