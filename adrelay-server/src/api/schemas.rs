use serde::Serialize;
use utoipa::ToSchema;

/// Mirrors [`adrelay_gateway::GatewayResponse`] for OpenAPI documentation;
/// kept separate so `adrelay-gateway` itself stays free of HTTP/doc
/// dependencies.
#[derive(Debug, Serialize, ToSchema)]
pub struct GatewayResponseSchema {
    #[schema(example = true)]
    pub success: bool,
    #[schema(example = 200)]
    pub code: u16,
    #[schema(example = "ok")]
    pub message: String,
}

/// `GET /healthz` response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
}
