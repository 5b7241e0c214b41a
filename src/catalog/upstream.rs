use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::catalog::error::UpstreamError;
use crate::catalog::product::{Product, ProductPage};

/// Seam between the fetch/query layers and the real upstream HTTP client, so
/// both can be exercised against scripted sources in tests.
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// One page of the product list. `cursor` is the `last_id` returned by
    /// the previous page; `group_id` asks the upstream to filter server-side.
    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        group_id: Option<i64>,
    ) -> Result<ProductPage, UpstreamError>;

    /// Single-item lookup by id.
    async fn fetch_by_id(&self, id: &str) -> Result<Product, UpstreamError>;

    /// Lightweight connectivity check: requests a single product and returns
    /// it as a sample, if the upstream has any.
    async fn probe(&self) -> Result<Option<Product>, UpstreamError>;
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_token: String,
    pub language: String,
    pub timeout: Duration,
    pub page_size: u32,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://my.prom.ua/api/v1".to_string(),
            api_token: String::new(),
            language: "uk".to_string(),
            timeout: Duration::from_secs(30),
            page_size: 100,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Stateless client for the upstream catalog API. Attaches the bearer
/// credential and language header to every call and retries transient
/// failures with exponential backoff (1s, 2s, 4s, ...).
pub struct UpstreamClient {
    http: Client,
    base_url: String,
    api_token: String,
    language: String,
    page_size: u32,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl UpstreamClient {
    pub fn new(cfg: &UpstreamConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("ecovolt-api/", env!("CARGO_PKG_VERSION")))
            .timeout(cfg.timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_token: cfg.api_token.clone(),
            language: cfg.language.clone(),
            page_size: cfg.page_size,
            max_retries: cfg.max_retries.max(1),
            retry_base_delay: cfg.retry_base_delay,
        })
    }

    async fn request_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.api_token)
            .header("X-LANGUAGE", &self.language)
            .query(query)
            .send()
            .await
            .map_err(|e| UpstreamError::Transient(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => resp
                .json::<Value>()
                .await
                .map_err(|e| UpstreamError::Transient(format!("invalid upstream payload: {e}"))),
            StatusCode::NOT_FOUND => Err(UpstreamError::NotFound),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(UpstreamError::Auth),
            s => Err(UpstreamError::Transient(format!("upstream returned {s}"))),
        }
    }

    /// Retry wrapper used by every endpoint: up to `max_retries` attempts,
    /// backing off `base * 2^(attempt-1)` between them. Non-retryable errors
    /// (404, auth) escalate immediately.
    async fn retry_request<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let backoff = self.retry_base_delay * 2u32.pow(attempt - 1);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "{what} failed; backing off"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn page_query(&self, cursor: Option<&str>, group_id: Option<i64>) -> Vec<(&'static str, String)> {
        let mut query = vec![("limit", self.page_size.to_string())];
        if let Some(c) = cursor {
            query.push(("last_id", c.to_string()));
        }
        if let Some(g) = group_id {
            query.push(("group_id", g.to_string()));
        }
        query
    }
}

#[async_trait]
impl ProductSource for UpstreamClient {
    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        group_id: Option<i64>,
    ) -> Result<ProductPage, UpstreamError> {
        let query = self.page_query(cursor, group_id);
        let value = self
            .retry_request("product list request", || {
                self.request_json("/products/list", &query)
            })
            .await?;
        serde_json::from_value(value)
            .map_err(|e| UpstreamError::Transient(format!("invalid product page: {e}")))
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Product, UpstreamError> {
        let path = format!("/products/{id}");
        let value = self
            .retry_request("product lookup", || self.request_json(&path, &[]))
            .await?;
        // The single-item endpoint wraps the record in a `product` envelope;
        // tolerate a bare record too.
        let record = match value.get("product") {
            Some(inner) => inner.clone(),
            None => value,
        };
        serde_json::from_value(record)
            .map_err(|e| UpstreamError::Transient(format!("invalid product payload: {e}")))
    }

    async fn probe(&self) -> Result<Option<Product>, UpstreamError> {
        let query = vec![("limit", "1".to_string())];
        let value = self.request_json("/products/list", &query).await?;
        let page: ProductPage = serde_json::from_value(value)
            .map_err(|e| UpstreamError::Transient(format!("invalid product page: {e}")))?;
        info!("upstream connectivity probe ok");
        Ok(page.products.into_iter().next())
    }
}
