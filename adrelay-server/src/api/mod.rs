pub mod callback;
pub mod health;
pub mod openapi;
pub mod schemas;
pub mod track;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use adrelay_gateway::Gateway;

use self::openapi::ApiDoc;

/// Shared application state passed to every handler. `Gateway` wraps an
/// immutable `AppConfig` snapshot (spec.md §9), so unlike
/// `acteon-server::api::AppState` this needs no interior mutability.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

/// Build the Axum router: the two business routes, plus the ambient
/// health and OpenAPI/swagger-ui endpoints every teacher server carries.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/track", get(track::track))
        .route("/cb", get(callback::callback))
        .route("/healthz", get(health::healthz))
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
}
