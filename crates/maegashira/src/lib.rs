//! Maegashira: a dynamic HTTP reverse proxy.
//!
//! Requests arriving on the public listener are resolved against a
//! hot-reloadable routing table, gated by per-route authentication, run
//! through user-registered pre/post middlewares and dispatched to a
//! forward or static target. A management side-channel exposes health,
//! metrics and live routing-table updates, and every request emits one
//! transaction record to the post-transaction sink.
//!
//! The crate is built to be embedded: register middlewares on a
//! [`middleware::pipeline::MiddlewareRegistry`], build
//! [`config::settings::Settings`] and hand both to [`server::run`].
//!
//! ```no_run
//! use maegashira::config::settings::Settings;
//! use maegashira::middleware::pipeline::MiddlewareRegistry;
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     let mut registry = MiddlewareRegistry::new();
//!     registry.register("trace", |mut state| async move {
//!         log::info!("transaction {}", state.transaction.id);
//!         state.action = maegashira::middleware::pipeline::Action::Next;
//!         state
//!     });
//!     maegashira::server::run(Settings::from_env(), None, registry).await
//! }
//! ```

pub mod config;
pub mod logs;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod services;
pub mod utils;

/// Product name used in the upstream `User-Agent` and log banners.
pub const PRODUCT: &str = "maegashira";

/// Crate version baked into the `User-Agent` and the OpenAPI document.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
