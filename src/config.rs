use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use crate::catalog::categorize::{default_category_map, CategoryMap};
use crate::catalog::fetcher::FetchConfig;
use crate::catalog::query::QueryConfig;
use crate::catalog::scheduler::SchedulerConfig;
use crate::catalog::upstream::UpstreamConfig;
use crate::util::env::{env_opt, env_parse, env_req};

/// Everything the process reads from the environment, resolved once at
/// startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub upstream: UpstreamConfig,
    pub fetch: FetchConfig,
    pub scheduler: SchedulerConfig,
    pub query: QueryConfig,
    pub cache_ttl: Duration,
    pub categories: CategoryMap,
    pub http: HttpConfig,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: String,
    pub rate_window: Duration,
    pub rate_max_requests: u32,
    pub admin_rate_window: Duration,
    pub admin_rate_max_requests: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        crate::util::env::init_env();

        let upstream = UpstreamConfig {
            base_url: env_opt("UPSTREAM_BASE_URL")
                .unwrap_or_else(|| "https://my.prom.ua/api/v1".to_string()),
            api_token: env_req("UPSTREAM_API_TOKEN")
                .context("UPSTREAM_API_TOKEN is required to reach the catalog API")?,
            language: env_opt("UPSTREAM_LANGUAGE").unwrap_or_else(|| "uk".to_string()),
            timeout: Duration::from_secs(env_parse("UPSTREAM_TIMEOUT_SECS", 30u64)),
            page_size: env_parse("UPSTREAM_PAGE_SIZE", 100u32),
            max_retries: env_parse("UPSTREAM_MAX_RETRIES", 3u32),
            retry_base_delay: Duration::from_millis(env_parse("UPSTREAM_RETRY_BASE_MS", 1000u64)),
        };

        let fetch = FetchConfig {
            max_requests: env_parse("FETCH_MAX_REQUESTS", 1000u32),
            page_delay: Duration::from_millis(env_parse("FETCH_PAGE_DELAY_MS", 200u64)),
        };

        let scheduler = SchedulerConfig {
            period: Duration::from_secs(env_parse("REFRESH_PERIOD_SECS", 5 * 60u64)),
            retry_delay: Duration::from_secs(env_parse("REFRESH_RETRY_DELAY_SECS", 5 * 60u64)),
        };

        let query = QueryConfig {
            max_page_size: env_parse("QUERY_MAX_PAGE_SIZE", 100usize),
            cold_wait: Duration::from_secs(env_parse("QUERY_COLD_WAIT_SECS", 10u64)),
        };

        let cache_ttl = Duration::from_secs(env_parse("CACHE_TTL_SECS", 30 * 60u64));

        let categories = match env_opt("CATEGORY_GROUPS") {
            Some(raw) => match serde_json::from_str::<CategoryMap>(&raw) {
                Ok(map) if !map.is_empty() => map,
                Ok(_) => {
                    warn!("CATEGORY_GROUPS is empty; falling back to the built-in table");
                    default_category_map()
                }
                Err(err) => {
                    warn!(error = %err, "CATEGORY_GROUPS is not valid JSON; falling back to the built-in table");
                    default_category_map()
                }
            },
            None => default_category_map(),
        };

        let http = HttpConfig {
            host: env_opt("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env_parse("API_PORT", 8080u16),
            allowed_origins: env_opt("ALLOWED_ORIGINS").unwrap_or_else(|| {
                "http://localhost:5173,http://localhost:3000,http://127.0.0.1:5173".to_string()
            }),
            rate_window: Duration::from_secs(env_parse("RATE_LIMIT_WINDOW_SECS", 15 * 60u64)),
            rate_max_requests: env_parse("RATE_LIMIT_MAX_REQUESTS", 100u32),
            admin_rate_window: Duration::from_secs(env_parse("ADMIN_RATE_LIMIT_WINDOW_SECS", 60u64)),
            admin_rate_max_requests: env_parse("ADMIN_RATE_LIMIT_MAX_REQUESTS", 5u32),
        };

        Ok(Self {
            upstream,
            fetch,
            scheduler,
            query,
            cache_ttl,
            categories,
            http,
        })
    }
}
