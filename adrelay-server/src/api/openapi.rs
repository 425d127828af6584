use super::schemas::{GatewayResponseSchema, HealthResponse};

#[derive(utoipa::OpenApi)]
#[openapi(
    info(
        title = "adrelay",
        version = "0.1.0",
        description = "HTTP API for the advertising event relay: track inbound clicks/impressions, receive upstream conversion callbacks.",
        license(name = "Apache-2.0")
    ),
    tags(
        (name = "Track", description = "Inbound click/impression tracking"),
        (name = "Callback", description = "Upstream conversion callback handling"),
        (name = "Health", description = "Service health")
    ),
    paths(
        super::track::track,
        super::callback::callback,
        super::health::healthz,
    ),
    components(schemas(GatewayResponseSchema, HealthResponse))
)]
pub struct ApiDoc;
