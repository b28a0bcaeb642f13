use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::client::{first_string, CheckoutSessionParams, InstantBackend};
use crate::config::{CheckoutUrls, PlanCatalog};
use crate::error::{Result, SdkError};

/// Subscription tier.  Ordering is tier order: `Personal < Basic < Professional`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Plan {
    /// The free tier.
    Personal,
    Basic,
    Professional,
}

impl Plan {
    pub const ALL: [Plan; 3] = [Plan::Personal, Plan::Basic, Plan::Professional];

    pub const FREE: Plan = Plan::Personal;

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "Personal",
            Self::Basic => "Basic",
            Self::Professional => "Professional",
        }
    }

    /// Plan named in a `?plan=` query parameter.
    pub fn from_query(value: &str) -> Option<Plan> {
        value.parse().ok()
    }

    /// Strictly higher tiers, cheapest first.
    pub fn upgrades(self) -> Vec<Plan> {
        Self::ALL.into_iter().filter(|p| *p > self).collect()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = ();

    /// Exact, case-sensitive names: `"basic"` is not a plan.
    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        Self::ALL.into_iter().find(|p| p.as_str() == s).ok_or(())
    }
}

/// Tiers a user may move up to.  An unresolved plan offers nothing: it is
/// not the free tier, and billing changes go through the portal instead.
pub fn upgrade_targets(current: Option<Plan>) -> Vec<Plan> {
    current.map(Plan::upgrades).unwrap_or_default()
}

/// Typed view of the `/stripe/subscription/status` payload.
///
/// All field-name guessing for this endpoint lives in
/// [`from_payload`](Self::from_payload).  The untouched payload is kept in
/// `raw`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionStatus {
    /// `Some(false)` only when the payload explicitly says so.
    pub has_subscription: Option<bool>,
    pub price_id: Option<String>,
    pub plan_name: Option<String>,
    pub status: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub raw: Value,
}

impl SubscriptionStatus {
    pub fn from_payload(payload: Value) -> Self {
        let sub = payload
            .get("subscription")
            .filter(|s| s.is_object())
            .unwrap_or(&payload);

        let status = first_string(sub, &["status", "state"])
            .or_else(|| first_string(&payload, &["status"]));

        let current_period_end = ["current_period_end", "currentPeriodEnd"]
            .iter()
            .find_map(|k| sub.get(*k).filter(|v| !v.is_null()))
            .or_else(|| payload.get("current_period_end"))
            .and_then(parse_timestamp);

        Self {
            has_subscription: payload.get("hasSubscription").and_then(Value::as_bool),
            price_id: first_string(sub, &["priceId", "price_id", "stripePriceId", "planId"]),
            plan_name: first_string(sub, &["plan", "name", "planName"]),
            status,
            current_period_end,
            raw: payload,
        }
    }

    /// Resolve the effective plan against the configured catalog:
    /// known price id, then plan name, then an explicit "no subscription"
    /// (the free tier).  `None` means unknown, which is not the free tier.
    pub fn resolve_plan(&self, catalog: &PlanCatalog) -> Option<Plan> {
        if let Some(price_id) = &self.price_id {
            let by_price = catalog
                .prices
                .iter()
                .find(|(_, configured)| !configured.is_empty() && *configured == price_id)
                .map(|(plan, _)| plan);
            if by_price.is_some() {
                return by_price;
            }
        }

        if let Some(plan) = self.plan_name.as_deref().and_then(|n| n.parse().ok()) {
            return Some(plan);
        }

        if self.has_subscription == Some(false) {
            return Some(Plan::FREE);
        }

        None
    }
}

/// RFC 3339 string, numeric string, or epoch seconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|d| d.with_timezone(&Utc))
            .ok()
            .or_else(|| s.trim().parse::<i64>().ok().and_then(epoch)),
        Value::Number(n) => n.as_i64().and_then(epoch),
        _ => None,
    }
}

fn epoch(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Fetch and normalise the subscription status.
pub async fn fetch_subscription_status(client: &InstantBackend) -> Result<SubscriptionStatus> {
    client
        .get_subscription_status()
        .await
        .map(SubscriptionStatus::from_payload)
}

/// Open a Stripe checkout for `plan` and return the URL to redirect to.
pub async fn start_checkout(
    client: &InstantBackend,
    plan: Plan,
    catalog: &PlanCatalog,
    urls: &CheckoutUrls,
) -> Result<String> {
    let price_id = catalog
        .price_for(plan)
        .ok_or_else(|| SdkError::Validation("Price not configured for this plan.".into()))?;

    let session = client
        .create_checkout_session(&CheckoutSessionParams {
            price_id: price_id.to_string(),
            success_url: urls.success_url.clone(),
            cancel_url: urls.cancel_url.clone(),
        })
        .await?;

    session
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| SdkError::OperationFailed {
            message: "Checkout URL not returned.".into(),
            status: None,
        })
}

/// Open the Stripe billing portal and return its URL, if one was given.
pub async fn open_billing_portal(client: &InstantBackend, return_url: &str) -> Result<Option<String>> {
    let session = client.create_billing_portal_session(return_url).await?;
    Ok(session.url.filter(|u| !u.is_empty()))
}
