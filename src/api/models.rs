// API request/response models (DTOs)

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::catalog::cache::CacheStatus;
use crate::catalog::product::Product;

/// Standard API response wrapper for control-plane endpoints and errors.
/// Listing and lookup endpoints return their payloads bare.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(Meta::now()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            meta: Some(Meta::now()),
        }
    }
}

/// Metadata included in wrapped API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub version: String,
}

impl Meta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: uuid::Uuid::new_v4().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Query parameters of the product listing endpoint
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub category: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub cache: CacheStatus,
}

/// Result of a forced cache refresh
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub total_products: usize,
    pub categories: IndexMap<String, usize>,
}

/// Detailed cache status plus the effective cache configuration
#[derive(Debug, Serialize)]
pub struct CacheStatusResponse {
    pub cache: CacheStatus,
    pub config: CacheConfigInfo,
    pub categories: IndexMap<String, Option<i64>>,
}

#[derive(Debug, Serialize)]
pub struct CacheConfigInfo {
    pub ttl_minutes: u64,
    pub refresh_period_minutes: u64,
}

/// Upstream connectivity probe result
#[derive(Debug, Serialize)]
pub struct TestConnectionResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_product: Option<Product>,
    pub timestamp: DateTime<Utc>,
}
