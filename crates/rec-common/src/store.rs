use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Row bounds mirror the upstream service contract: a focused primary query
/// and a wider fallback when the filtered query cannot be served.
const PRIMARY_LIMIT: usize = 200;
const FALLBACK_LIMIT: usize = 500;

#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Root URL of the PostgREST-style store (no trailing slash).
    pub base_url: String,
    pub api_key: String,
    pub table: String,
    pub default_timeout: Duration,
}

impl StoreConfig {
    /// Load from environment variables.
    ///
    /// Required: `STORE_URL`, `STORE_API_KEY`.
    /// Optional: `STORE_TABLE` (default "filtered_books"),
    /// `STORE_TIMEOUT_SECS` (default 30).
    pub fn from_env() -> Result<Self, StoreError> {
        let base_url = std::env::var("STORE_URL")
            .map_err(|_| StoreError::Config("STORE_URL environment variable is required".to_string()))?;
        let api_key = std::env::var("STORE_API_KEY").map_err(|_| {
            StoreError::Config("STORE_API_KEY environment variable is required".to_string())
        })?;
        let table =
            std::env::var("STORE_TABLE").unwrap_or_else(|_| "filtered_books".to_string());
        let default_timeout = std::env::var("STORE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(30));

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            table,
            default_timeout,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Both the primary and the fallback query failed.
    #[error("record store unavailable: {0}")]
    LookupUnavailable(String),

    #[error("store config error: {0}")]
    Config(String),
}

/// Which text column a lookup targets. The store keeps highlights and
/// synopses in separate nullable columns of the same table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Highlights,
    Synopsis,
}

impl TextField {
    pub fn column(self) -> &'static str {
        match self {
            TextField::Highlights => "highlights",
            TextField::Synopsis => "synopsis",
        }
    }
}

/// One raw row as returned by the store. Every field is optional on the
/// wire; the pipeline's validation pass decides what is usable.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordRow {
    pub id: Option<serde_json::Value>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub highlights: Option<String>,
    pub synopsis: Option<String>,
    #[serde(rename = "sub-genre")]
    pub category: Option<String>,
}

impl RecordRow {
    /// Stable identifier rendered as a string regardless of the store's
    /// column type (integer ids are common).
    pub fn id_string(&self) -> Option<String> {
        match &self.id {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Row returned by the random-sample RPC used for shelf browsing.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ShelfRow {
    pub id: Option<serde_json::Value>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub image: Option<String>,
}

/// Client for the remote tabular record store.
///
/// The store's own filter logic is consumed as an opaque service; this
/// client only composes query strings and reports transport outcomes.
pub struct RecordStore {
    config: StoreConfig,
    http: reqwest::Client,
}

impl RecordStore {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .user_agent("book-recommender/store")
            .build()
            .map_err(|e| StoreError::LookupUnavailable(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Fetch candidate rows whose category fuzzy-matches any of `categories`
    /// and whose `field` column is non-null, bounded to 200 rows.
    ///
    /// A transport-level failure of the primary query (not "zero rows")
    /// triggers one fallback: drop the category filter, raise the bound to
    /// 500. If the fallback also fails the lookup is unavailable.
    pub async fn search(
        &self,
        categories: &[String],
        field: TextField,
    ) -> Result<Vec<RecordRow>, StoreError> {
        let primary = primary_query(categories, field);
        match self.fetch_rows(&primary).await {
            Ok(rows) => Ok(rows),
            Err(primary_err) => {
                warn!(error = %primary_err, "primary store query failed, trying fallback");
                let fallback = fallback_query(field);
                self.fetch_rows(&fallback).await.map_err(|fallback_err| {
                    StoreError::LookupUnavailable(format!(
                        "primary: {primary_err}; fallback: {fallback_err}"
                    ))
                })
            }
        }
    }

    /// Random sample of shelf rows via the store's RPC, optionally filtered
    /// to one category. Used by browse surfaces, not by the pipeline.
    pub async fn random_sample(
        &self,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ShelfRow>, StoreError> {
        let url = format!("{}/rest/v1/rpc/get_random_books_by_genre", self.config.base_url);
        let body = serde_json::json!({
            "genre_name": category,
            "book_limit": limit,
        });
        let resp = self
            .http
            .post(&url)
            .timeout(self.config.default_timeout)
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::LookupUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(StoreError::LookupUnavailable(format!(
                "random sample returned status {}",
                resp.status()
            )));
        }
        resp.json::<Vec<ShelfRow>>()
            .await
            .map_err(|e| StoreError::LookupUnavailable(e.to_string()))
    }

    async fn fetch_rows(&self, query: &str) -> Result<Vec<RecordRow>, StoreError> {
        let url = format!("{}/rest/v1/{}?{}", self.config.base_url, self.config.table, query);
        let resp = self
            .http
            .get(&url)
            .timeout(self.config.default_timeout)
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| StoreError::LookupUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(StoreError::LookupUnavailable(format!(
                "store returned status {}",
                resp.status()
            )));
        }
        resp.json::<Vec<RecordRow>>()
            .await
            .map_err(|e| StoreError::LookupUnavailable(e.to_string()))
    }
}

fn primary_query(categories: &[String], field: TextField) -> String {
    let col = field.column();
    let filter = categories
        .iter()
        .map(|c| format!("sub-genre.ilike.*{}*", encode_component(c)))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "select=id,author,title,{col},sub-genre&{col}=not.is.null&or=({filter})&limit={PRIMARY_LIMIT}"
    )
}

fn fallback_query(field: TextField) -> String {
    let col = field.column();
    format!("select=id,author,title,{col},sub-genre&{col}=not.is.null&limit={FALLBACK_LIMIT}")
}

/// Percent-encode a filter component: everything except ASCII alphanumerics
/// and `-_.~` is escaped, so category labels with spaces survive the
/// PostgREST ilike pattern.
fn encode_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
