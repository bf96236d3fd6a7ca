// HTTP surface: submission endpoints behind the admission filter

mod health;
mod submissions;

pub use submissions::{create_router, ApiError, AppState};

use crate::rate_limit::{admission_middleware, AdmissionFilter};
use axum::{middleware, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Full application: routes, admission filter, CORS.
///
/// The filter wraps every route and checks the path itself, so endpoints
/// outside its allow-list pass straight through.
pub fn build_app(state: AppState, filter: Arc<AdmissionFilter>) -> Router {
    create_router(state)
        .layer(middleware::from_fn_with_state(filter, admission_middleware))
        .layer(CorsLayer::permissive())
}
