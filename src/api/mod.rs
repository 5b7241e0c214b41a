// HTTP layer for the catalog proxy: actix-web server, routes, handlers,
// response models and middleware (CORS + rate limiting).

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::ApiServer;
