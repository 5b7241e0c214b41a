// API server implementation using actix-web

use crate::api::{handlers::AppState, middleware, routes};
use crate::config::HttpConfig;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};

pub struct ApiServer {
    pub host: String,
    pub port: u16,
    pub allowed_origins: String,
    api_limit: middleware::RateLimit,
    admin_limit: middleware::RateLimit,
}

impl ApiServer {
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            allowed_origins: config.allowed_origins.clone(),
            api_limit: middleware::RateLimit::new(config.rate_window, config.rate_max_requests),
            admin_limit: middleware::RateLimit::new(
                config.admin_rate_window,
                config.admin_rate_max_requests,
            ),
        }
    }

    /// Start the HTTP server and serve until it is asked to stop.
    pub async fn run(self, state: web::Data<AppState>) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);

        tracing::info!(
            host = %self.host,
            port = %self.port,
            "Starting ecovolt API server"
        );

        let allowed_origins = self.allowed_origins.clone();
        let api_limit = self.api_limit.clone();
        let admin_limit = self.admin_limit.clone();

        HttpServer::new(move || {
            let (logger, compress) = middleware::setup_middleware();
            let cors = middleware::setup_cors(&allowed_origins);
            let api_limit = api_limit.clone();
            let admin_limit = admin_limit.clone();

            App::new()
                .app_data(state.clone())
                .wrap(logger)
                .wrap(compress)
                .wrap(cors)
                .configure(move |cfg| routes::configure_routes(cfg, api_limit, admin_limit))
        })
        .bind(&bind_addr)
        .with_context(|| format!("Failed to bind to {}", bind_addr))?
        .run()
        .await
        .context("HTTP server error")?;

        Ok(())
    }
}
