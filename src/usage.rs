use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::billing::Plan;
use crate::client::{first_string, InstantBackend};
use crate::config::{ClientConfig, PlanCatalog};
use crate::error::Result;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsagePeriod {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Typed view of `/usage/summary`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub requests_used: f64,
    pub requests_limit: f64,
    pub storage_bytes_used: Option<f64>,
    pub total_cost: Option<f64>,
    pub cost_by_action: Option<BTreeMap<String, f64>>,
    pub cost_by_service: Option<BTreeMap<String, f64>>,
    pub period: Option<UsagePeriod>,
}

/// Numbers arrive as JSON numbers or numeric strings.
fn number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn first_number(obj: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| number(obj.get(*k)))
}

fn cost_map(value: Option<&Value>) -> Option<BTreeMap<String, f64>> {
    let map: BTreeMap<_, _> = value?
        .as_object()?
        .iter()
        .filter_map(|(k, v)| number(Some(v)).map(|n| (k.clone(), n)))
        .collect();
    Some(map)
}

impl UsageSummary {
    /// Normalise a usage payload.  The summary object is `data`, else the
    /// first entry of `items`, else `summary`, else the payload itself.
    /// `fallback_limit` applies when no limit field is present.
    pub fn from_payload(payload: &Value, fallback_limit: u64) -> Self {
        let summary = payload
            .get("data")
            .filter(|v| v.is_object())
            .or_else(|| {
                payload
                    .get("items")
                    .and_then(Value::as_array)
                    .and_then(|items| items.first())
            })
            .or_else(|| payload.get("summary").filter(|v| v.is_object()))
            .unwrap_or(payload);

        let used = first_number(
            summary,
            &["used", "requestsUsed", "requests", "totalRequests", "requestCount", "count"],
        );
        let limit = first_number(
            summary,
            &["limit", "requestsLimit", "planLimit", "allowedRequests", "quota"],
        )
        .or_else(|| first_number(payload, &["limit", "requestsLimit"]));

        let period = summary.get("period").filter(|p| p.is_object()).map(|p| UsagePeriod {
            start: first_string(p, &["startDate", "start"]),
            end: first_string(p, &["endDate", "end"]),
        });

        Self {
            requests_used: used.unwrap_or(0.0),
            requests_limit: limit.unwrap_or(fallback_limit as f64),
            storage_bytes_used: first_number(summary, &["storageBytes", "storage"]),
            total_cost: first_number(summary, &["totalCost"])
                .or_else(|| first_number(payload, &["totalCost"])),
            cost_by_action: cost_map(summary.get("costByAction")),
            cost_by_service: cost_map(summary.get("costByService")),
            period,
        }
    }
}

/// First instant of the current UTC month.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Usage for the current UTC month, from its first instant up to now.
pub async fn fetch_usage(client: &InstantBackend, config: &ClientConfig) -> Result<UsageSummary> {
    let now = Utc::now();
    let payload = client.usage_summary(month_start(now), now).await?;
    Ok(UsageSummary::from_payload(
        &payload,
        config.fallback_requests_limit(),
    ))
}

/// `used / limit` as a whole percentage in `[0, 100]`.  A zero, negative
/// or non-finite limit gives 0.
pub fn usage_percent(used: f64, limit: f64) -> u8 {
    if !(limit.is_finite() && limit > 0.0 && used.is_finite()) {
        return 0;
    }
    (used / limit * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Dashboard gauges for a usage summary under a resolved plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageView {
    pub plan: Option<Plan>,
    pub requests_limit: Option<u64>,
    pub requests_percent: u8,
    pub storage_limit_bytes: Option<u64>,
    pub storage_percent: u8,
}

impl UsageView {
    /// Limits come from the catalog for a known plan.  An unknown plan has
    /// no limits and both gauges read 0 %.
    pub fn compute(usage: &UsageSummary, plan: Option<Plan>, catalog: &PlanCatalog) -> Self {
        let Some(plan) = plan else {
            return Self {
                plan: None,
                requests_limit: None,
                requests_percent: 0,
                storage_limit_bytes: None,
                storage_percent: 0,
            };
        };

        let requests_limit = *catalog.request_limits.get(plan);
        let storage_limit_bytes = (catalog.storage_limits_mb.get(plan) * BYTES_PER_MB).round() as u64;

        Self {
            plan: Some(plan),
            requests_limit: Some(requests_limit),
            requests_percent: usage_percent(usage.requests_used, requests_limit as f64),
            storage_limit_bytes: Some(storage_limit_bytes),
            storage_percent: usage
                .storage_bytes_used
                .map(|used| usage_percent(used, storage_limit_bytes as f64))
                .unwrap_or(0),
        }
    }
}
