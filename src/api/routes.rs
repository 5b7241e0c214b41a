// API route configuration

use crate::api::handlers;
use crate::api::middleware::RateLimit;
use actix_web::web;

/// Register all routes. Specific product routes go before the `{id}`
/// capture so `categories`/`cache-status` are not swallowed by it. The
/// admin operations carry their own stricter rate limit on top of the
/// scope-wide one.
pub fn configure_routes(cfg: &mut web::ServiceConfig, api_limit: RateLimit, admin_limit: RateLimit) {
    cfg
        // Health check (never rate limited)
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        .service(
            web::scope("/api/products")
                .wrap(api_limit)
                .route("/categories", web::get().to(handlers::list_categories))
                .route("/cache-status", web::get().to(handlers::cache_status))
                .route("/test", web::get().to(handlers::test_connection))
                .service(
                    web::resource("/refresh-cache")
                        .wrap(admin_limit.clone())
                        .route(web::post().to(handlers::refresh_cache)),
                )
                .service(
                    web::resource("/clear-cache")
                        .wrap(admin_limit)
                        .route(web::post().to(handlers::clear_cache)),
                )
                .route("", web::get().to(handlers::list_products))
                .route("/{id}", web::get().to(handlers::get_product)),
        );
}
