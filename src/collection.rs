use std::fmt;
use std::str::FromStr;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use crate::client::InstantBackend;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(()),
        }
    }
}

/// Equality filter on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub value: String,
}

/// Query against `/{name}`.
///
/// Every builder call returns a new `Collection`; the receiver is left
/// untouched, so one partially built query can be branched into several
/// fetches.  Only equality filters exist on the wire: any other operator is
/// logged and treated as `==`.
#[derive(Debug, Clone)]
pub struct Collection<'a> {
    client: &'a InstantBackend,
    name: String,
    filters: Vec<Filter>,
    limit: Option<u32>,
    sort: Option<SortOrder>,
    next_token: Option<String>,
}

impl<'a> Collection<'a> {
    pub(crate) fn new(client: &'a InstantBackend, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            filters: Vec::new(),
            limit: None,
            sort: None,
            next_token: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Add a filter.  Operators other than `==` degrade to equality.
    pub fn filter(&self, field: impl Into<String>, op: &str, value: impl ToString) -> Self {
        let field = field.into();
        if op != "==" {
            tracing::warn!("operator {op} not supported on {field}, using equality");
        }
        let mut next = self.clone();
        next.filters.push(Filter {
            field,
            value: value.to_string(),
        });
        next
    }

    /// Equality filter.
    pub fn where_eq(&self, field: impl Into<String>, value: impl ToString) -> Self {
        self.filter(field, "==", value)
    }

    /// Maximum results; `0` means "server default".
    pub fn limit(&self, n: u32) -> Self {
        let mut next = self.clone();
        next.limit = Some(n).filter(|n| *n > 0);
        next
    }

    /// `"asc"` or `"desc"`; anything else is ignored with a warning.
    pub fn sort(&self, order: &str) -> Self {
        match order.parse::<SortOrder>() {
            Ok(order) => self.sort_by(order),
            Err(()) => {
                tracing::warn!("invalid sort order {order:?}, keeping the current one");
                self.clone()
            }
        }
    }

    pub fn sort_by(&self, order: SortOrder) -> Self {
        let mut next = self.clone();
        next.sort = Some(order);
        next
    }

    /// Opaque pagination token from a previous page.
    pub fn next_token(&self, token: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.next_token = Some(token.into()).filter(|t| !t.is_empty());
        next
    }

    /// Query string in emission order: filters, `limit`, `sort`, `nextToken`.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|f| (f.field.clone(), f.value.clone()))
            .collect();
        if let Some(limit) = self.limit {
            pairs.push(("limit".into(), limit.to_string()));
        }
        if let Some(sort) = self.sort {
            pairs.push(("sort".into(), sort.to_string()));
        }
        if let Some(token) = &self.next_token {
            pairs.push(("nextToken".into(), token.clone()));
        }
        pairs
    }

    /// Run the query.  This is the only call that touches the network.
    pub async fn get(&self) -> Result<Value> {
        let url = self.client.endpoint(&[self.name.as_str()])?;
        let request = self
            .client
            .request(Method::GET, url)
            .query(&self.query_pairs());
        self.client.execute(request, "Query failed").await
    }

    /// Fetch one document by id.
    pub async fn doc(&self, id: &str) -> Result<Value> {
        let url = self.client.endpoint(&[self.name.as_str(), id])?;
        let request = self.client.request(Method::GET, url);
        self.client.execute(request, "Failed to get document").await
    }

    /// Create a document; the response carries its id.
    pub async fn add<T: Serialize + ?Sized>(&self, data: &T) -> Result<Value> {
        let url = self.client.endpoint(&[self.name.as_str()])?;
        let request = self.client.request(Method::POST, url).json(data);
        self.client.execute(request, "Failed to add document").await
    }
}

/// A user-visible collection on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl CollectionSummary {
    /// Names from `collections` or `items`, given either as strings or as
    /// `{name}` / `{collection}` objects.  Internal collections (`usage`,
    /// `stripe_*`) are dropped.
    pub fn list_from_payload(payload: &Value) -> Vec<CollectionSummary> {
        let entries = ["collections", "items"]
            .iter()
            .find_map(|k| payload.get(*k).and_then(Value::as_array));
        let Some(entries) = entries else {
            return Vec::new();
        };

        entries
            .iter()
            .filter_map(|entry| {
                let name = match entry {
                    Value::String(s) => Some(s.as_str()),
                    other => ["name", "collection"]
                        .iter()
                        .find_map(|k| other.get(*k).and_then(Value::as_str)),
                }?;
                let count = entry.get("count").and_then(Value::as_u64);
                Some((name, count))
            })
            .filter(|(name, _)| !name.is_empty())
            .filter(|(name, _)| *name != "usage" && !name.to_lowercase().starts_with("stripe_"))
            .map(|(name, count)| CollectionSummary {
                name: name.to_string(),
                count,
            })
            .collect()
    }
}

/// The user's collections, as listed by `GET /collections`.
pub async fn list_collections(client: &InstantBackend) -> Result<Vec<CollectionSummary>> {
    let payload = client.collection("collections").get().await?;
    Ok(CollectionSummary::list_from_payload(&payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{spawn, Seen};
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn builds_query_in_order_without_next_token() {
        let client = InstantBackend::new("k");
        let query = client
            .collection("tickets")
            .filter("status", "==", "open")
            .limit(10)
            .sort("desc");
        assert_eq!(
            query.query_pairs(),
            pairs(&[("status", "open"), ("limit", "10"), ("sort", "desc")])
        );
    }

    #[test]
    fn non_equality_operator_degrades() {
        let client = InstantBackend::new("k");
        let gt = client.collection("c").filter("status", ">", 5);
        let eq = client.collection("c").filter("status", "==", "5");
        assert_eq!(gt.query_pairs(), eq.query_pairs());
    }

    #[test]
    fn invalid_sort_is_ignored() {
        let client = InstantBackend::new("k");
        let q = client.collection("c").sort("asc").sort("sideways");
        assert_eq!(q.query_pairs(), pairs(&[("sort", "asc")]));
    }

    #[test]
    fn zero_limit_and_blank_token_are_omitted() {
        let client = InstantBackend::new("k");
        let q = client.collection("c").limit(0).next_token("");
        assert!(q.query_pairs().is_empty());
    }

    #[test]
    fn branching_does_not_cross_contaminate() {
        let client = InstantBackend::new("k");
        let base = client.collection("users").where_eq("role", "admin");
        let first_page = base.limit(5);
        let second_page = base.limit(5).next_token("tok-2");
        let sorted = base.sort_by(SortOrder::Asc);

        assert_eq!(base.query_pairs(), pairs(&[("role", "admin")]));
        assert_eq!(first_page.query_pairs(), pairs(&[("role", "admin"), ("limit", "5")]));
        assert_eq!(
            second_page.query_pairs(),
            pairs(&[("role", "admin"), ("limit", "5"), ("nextToken", "tok-2")])
        );
        assert_eq!(sorted.query_pairs(), pairs(&[("role", "admin"), ("sort", "asc")]));
    }

    #[test]
    fn collection_list_normalisation() {
        let payload = json!({
            "collections": ["tickets", {"name": "users", "count": 3}, {"collection": "notes"},
                            "usage", "Stripe_customers", {"other": 1}, ""]
        });
        let list = CollectionSummary::list_from_payload(&payload);
        let names: Vec<_> = list.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["tickets", "users", "notes"]);
        assert_eq!(list[1].count, Some(3));

        let items = json!({"items": ["a"]});
        assert_eq!(CollectionSummary::list_from_payload(&items).len(), 1);
        assert!(CollectionSummary::list_from_payload(&json!({"nope": []})).is_empty());
    }

    async fn list(
        State(seen): State<Seen>,
        Path(name): Path<String>,
        Query(query): Query<Vec<(String, String)>>,
        headers: HeaderMap,
    ) -> Json<Value> {
        seen.record(&format!("/{name}"), query, &headers, None).await;
        Json(json!({"items": [{"id": "1"}], "collections": ["tickets"]}))
    }

    async fn doc(Path((name, id)): Path<(String, String)>) -> (StatusCode, Json<Value>) {
        if id == "missing" {
            return (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})));
        }
        (StatusCode::OK, Json(json!({"collection": name, "id": id})))
    }

    async fn setup() -> (InstantBackend, Seen) {
        let seen = Seen::default();
        let app = Router::new()
            .route("/{name}", get(list).post(|Json(body): Json<Value>| async move {
                Json(json!({"id": "new-1", "echo": body}))
            }))
            .route("/{name}/{id}", get(doc))
            .with_state(seen.clone());
        let base = spawn(app).await;
        (InstantBackend::new("k").with_token("tok").with_base_url(base), seen)
    }

    #[tokio::test]
    async fn get_issues_single_request_with_query() {
        let (client, seen) = setup().await;
        let query = client
            .collection("tickets")
            .filter("status", "==", "open")
            .limit(10)
            .sort("desc");
        assert!(seen.all().await.is_empty(), "nothing sent before get()");

        query.get().await.unwrap();
        let sent = seen.all().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].path, "/tickets");
        assert_eq!(
            sent[0].query,
            pairs(&[("status", "open"), ("limit", "10"), ("sort", "desc")])
        );
        assert!(!sent[0].query.iter().any(|(k, _)| k == "nextToken"));
        assert_eq!(sent[0].authorization.as_deref(), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn doc_and_add() {
        let (client, _) = setup().await;
        let tickets = client.collection("tickets");

        let found = tickets.doc("42").await.unwrap();
        assert_eq!(found, json!({"collection": "tickets", "id": "42"}));

        let err = tickets.doc("missing").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "Failed to get document");

        let created = tickets.add(&json!({"title": "hello"})).await.unwrap();
        assert_eq!(created["id"], "new-1");
        assert_eq!(created["echo"]["title"], "hello");
    }

    #[tokio::test]
    async fn list_collections_reads_collections_endpoint() {
        let (client, seen) = setup().await;
        let list = list_collections(&client).await.unwrap();
        assert_eq!(list, vec![CollectionSummary { name: "tickets".into(), count: None }]);
        assert_eq!(seen.all().await[0].path, "/collections");
    }
}
