//! Routers for the two listeners.
//!
//! ## Public listener
//! Every path is an object key, so there are no routes at all: a single
//! fallback handler takes every method on every path.
//!   - `PUT    /{*key}` — store object (shared secret required)
//!   - `GET    /{*key}` — fetch object
//!   - `DELETE /{*key}` — delete object (shared secret required)
//!   - anything else  — 405
//!
//! ## Health listener
//!   - `GET /healthz` — liveness
//!   - `GET /readyz`  — readiness (pings the store)

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::proxy_object,
    },
    state::AppState,
};
use axum::{Router, routing::get};

/// Router for the public object listener.
pub fn routes() -> Router<AppState> {
    Router::new().fallback(proxy_object)
}

/// Router for the health listener. Kept off the public listener so no path
/// is taken away from the object key space.
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}
