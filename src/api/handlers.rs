// HTTP request handlers for API endpoints

use std::sync::Arc;
use std::time::Instant;

use actix_web::{web, HttpResponse, Result};
use chrono::Utc;

use crate::api::models::*;
use crate::catalog::cache::CacheStore;
use crate::catalog::error::QueryError;
use crate::catalog::query::QueryService;
use crate::catalog::scheduler::{RefreshOutcome, RefreshScheduler};
use crate::catalog::upstream::ProductSource;

const DEFAULT_PAGE_SIZE: usize = 8;

/// Shared state handed to every handler via `web::Data`.
pub struct AppState {
    pub cache: Arc<CacheStore>,
    pub scheduler: Arc<RefreshScheduler>,
    pub query: QueryService,
    pub source: Arc<dyn ProductSource>,
    pub cache_ttl_minutes: u64,
    pub refresh_period_minutes: u64,
    pub started_at: Instant,
}

fn query_error_response(err: QueryError) -> HttpResponse {
    match &err {
        QueryError::UnknownCategory(_) => {
            HttpResponse::BadRequest().json(ApiResponse::<()>::error(err.to_string()))
        }
        QueryError::CacheUnavailable => HttpResponse::ServiceUnavailable()
            .json(ApiResponse::<()>::error(err.to_string())),
        QueryError::NotFound(_) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error(err.to_string()))
        }
        QueryError::Upstream(_) => {
            HttpResponse::BadGateway().json(ApiResponse::<()>::error(err.to_string()))
        }
    }
}

/// Health check endpoint
pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    let response = HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        cache: state.cache.status(),
    };
    Ok(HttpResponse::Ok().json(response))
}

/// Paginated product listing, optionally filtered to one category
pub async fn list_products(
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    match state.query.list(page, limit, query.category.as_deref()).await {
        Ok(listing) => Ok(HttpResponse::Ok().json(listing)),
        Err(err) => Ok(query_error_response(err)),
    }
}

/// Single product by id; falls back to a live upstream lookup on cache miss
pub async fn get_product(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    match state.query.get_by_id(&id).await {
        Ok(product) => Ok(HttpResponse::Ok().json(product)),
        Err(err) => Ok(query_error_response(err)),
    }
}

/// Category keys available for filtering
pub async fn list_categories(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.query.categories()))
}

/// Cache status plus the effective cache configuration
pub async fn cache_status(state: web::Data<AppState>) -> Result<HttpResponse> {
    let response = CacheStatusResponse {
        cache: state.cache.status(),
        config: CacheConfigInfo {
            ttl_minutes: state.cache_ttl_minutes,
            refresh_period_minutes: state.refresh_period_minutes,
        },
        categories: state.cache.category_map().clone(),
    };
    Ok(HttpResponse::Ok().json(response))
}

/// Force a full cache refresh. Answers 409 when one is already running.
pub async fn refresh_cache(state: web::Data<AppState>) -> Result<HttpResponse> {
    tracing::info!("cache refresh requested over HTTP");
    match state.scheduler.force_refresh().await {
        Ok(RefreshOutcome::Completed { total }) => {
            let status = state.cache.status();
            Ok(HttpResponse::Ok().json(RefreshResponse {
                success: true,
                total_products: total,
                categories: status.categories,
            }))
        }
        Ok(RefreshOutcome::AlreadyRunning) => Ok(HttpResponse::Conflict()
            .json(ApiResponse::<()>::error("cache refresh already in progress"))),
        Err(err) => {
            Ok(HttpResponse::BadGateway().json(ApiResponse::<()>::error(format!("{err:#}"))))
        }
    }
}

/// Drop the cached snapshot back to empty
pub async fn clear_cache(state: web::Data<AppState>) -> Result<HttpResponse> {
    state.cache.clear();
    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "message": "cache cleared"
    }))))
}

/// Upstream connectivity probe
pub async fn test_connection(state: web::Data<AppState>) -> Result<HttpResponse> {
    match state.source.probe().await {
        Ok(sample) => Ok(HttpResponse::Ok().json(TestConnectionResponse {
            success: true,
            message: "upstream API reachable".to_string(),
            sample_product: sample,
            timestamp: Utc::now(),
        })),
        Err(err) => Ok(HttpResponse::BadGateway().json(TestConnectionResponse {
            success: false,
            message: format!("upstream API unreachable: {err}"),
            sample_product: None,
            timestamp: Utc::now(),
        })),
    }
}
