// Middleware for logging, CORS and rate limiting.

use actix_web::middleware::{Compress, Logger};

pub fn setup_middleware() -> (Logger, Compress) {
    let logger = Logger::default();
    let compress = Compress::default();
    (logger, compress)
}

// CORS configuration
use actix_cors::Cors;
use actix_web::http::header;

pub fn setup_cors(allowed_origins: &str) -> Cors {
    let origins: Vec<&str> = allowed_origins.split(',').collect();

    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::CACHE_CONTROL,
        ])
        .max_age(3600);

    for origin in origins {
        cors = cors.allowed_origin(origin.trim());
    }

    cors
}

// Rate limiting middleware: per-client sliding window over an in-memory map.

use actix_web::{
    body::{BoxBody, EitherBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::collections::HashMap;
use std::future::{ready, Ready};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How many checks between sweeps of idle clients from the shared map.
const SWEEP_EVERY: u32 = 256;

#[derive(Default)]
struct Clients {
    by_key: HashMap<String, Vec<Instant>>,
    checks_since_sweep: u32,
}

/// Sliding-window rate limiter keyed by client address. Requests older than
/// the window are discarded on every check; idle clients are swept out
/// periodically so the map does not grow without bound.
#[derive(Clone)]
pub struct RateLimit {
    clients: Arc<Mutex<Clients>>,
    window: Duration,
    max_requests: u32,
}

impl RateLimit {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            clients: Arc::new(Mutex::new(Clients::default())),
            window,
            max_requests: max_requests.max(1),
        }
    }

    fn is_allowed(&self, client: &str) -> bool {
        let now = Instant::now();
        let window = self.window;
        let mut clients = self.clients.lock().unwrap();

        clients.checks_since_sweep += 1;
        if clients.checks_since_sweep >= SWEEP_EVERY {
            clients.checks_since_sweep = 0;
            clients
                .by_key
                .retain(|_, hits| hits.iter().any(|t| now.duration_since(*t) < window));
        }

        let hits = clients.by_key.entry(client.to_string()).or_default();
        hits.retain(|t| now.duration_since(*t) < window);
        if hits.len() as u32 >= self.max_requests {
            return false;
        }
        hits.push(now);
        true
    }

    fn retry_after_seconds(&self) -> u64 {
        self.window.as_secs().max(1)
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service,
            limiter: self.clone(),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: S,
    limiter: RateLimit,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Liveness probes are never throttled.
        if req.path() == "/health" || req.path() == "/" {
            let fut = self.service.call(req);
            return Box::pin(async move {
                let res = fut.await?;
                Ok(res.map_into_left_body())
            });
        }

        let client = {
            let info = req.connection_info();
            info.realip_remote_addr().unwrap_or("unknown").to_string()
        };

        if self.limiter.is_allowed(&client) {
            let fut = self.service.call(req);
            return Box::pin(async move {
                let res = fut.await?;
                Ok(res.map_into_left_body())
            });
        }

        tracing::warn!(client = %client, "rate limit exceeded");
        let retry_after = self.limiter.retry_after_seconds();
        Box::pin(async move {
            let response = HttpResponse::TooManyRequests()
                .json(serde_json::json!({
                    "success": false,
                    "error": "Too many requests. Try again later",
                    "retry_after_seconds": retry_after
                }))
                .map_into_right_body();
            Ok(req.into_response(response))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_blocks() {
        let limiter = RateLimit::new(Duration::from_secs(60), 3);
        assert!(limiter.is_allowed("10.0.0.1"));
        assert!(limiter.is_allowed("10.0.0.1"));
        assert!(limiter.is_allowed("10.0.0.1"));
        assert!(!limiter.is_allowed("10.0.0.1"));
    }

    #[test]
    fn clients_are_tracked_independently() {
        let limiter = RateLimit::new(Duration::from_secs(60), 1);
        assert!(limiter.is_allowed("10.0.0.1"));
        assert!(limiter.is_allowed("10.0.0.2"));
        assert!(!limiter.is_allowed("10.0.0.1"));
    }

    #[test]
    fn window_expiry_frees_the_budget() {
        let limiter = RateLimit::new(Duration::from_millis(50), 1);
        assert!(limiter.is_allowed("10.0.0.1"));
        assert!(!limiter.is_allowed("10.0.0.1"));
        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.is_allowed("10.0.0.1"));
    }

    #[test]
    fn sweep_drops_idle_clients() {
        let limiter = RateLimit::new(Duration::from_millis(10), 5);
        assert!(limiter.is_allowed("10.0.0.1"));
        std::thread::sleep(Duration::from_millis(20));
        for _ in 0..SWEEP_EVERY {
            limiter.is_allowed("10.0.0.2");
        }
        let clients = limiter.clients.lock().unwrap();
        assert!(!clients.by_key.contains_key("10.0.0.1"));
    }
}
