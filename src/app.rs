use crate::config::Config;
use crate::errors::AppError;
use crate::handlers::{self, AppState};
use crate::models::{
    AnalysisResult, AnalyzeRequest, AnalyzeResponse, LeadInput, LeadState, Level,
    MessageTemplate, Objection,
};
use axum::{
    http::{header, HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::any::Any;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Maximum accepted request body (1 MiB).
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::health, handlers::analyze_lead),
    components(schemas(
        AnalyzeRequest,
        AnalyzeResponse,
        AnalysisResult,
        LeadInput,
        LeadState,
        Level,
        Objection,
        MessageTemplate
    )),
    tags((name = "metcorp-crm-ia", description = "Lead analysis for the Metcorp CRM"))
)]
pub struct ApiDoc;

/// Builds the full router: routes, OpenAPI docs and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/check", get(handlers::health))
        .route("/api/analizar", post(handlers::analyze_lead))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .layer(cors)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.allowed_origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS is '*', allowing any origin");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

/// Converts a handler panic into the same JSON shape as any other internal error.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else {
        "unknown panic".to_string()
    };

    AppError::Internal(detail).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn json_body(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_panic_with_str_payload() {
        let (status, body) = json_body(panic_response(Box::new("índice fuera de rango"))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Error interno del backend IA");
        assert_eq!(body["detalle"], "índice fuera de rango");
    }

    #[tokio::test]
    async fn test_panic_with_string_payload() {
        let payload = format!("lead {} sin nombre", 7);
        let (status, body) = json_body(panic_response(Box::new(payload))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Error interno del backend IA");
        assert_eq!(body["detalle"], "lead 7 sin nombre");
    }

    #[tokio::test]
    async fn test_panic_with_opaque_payload() {
        let (status, body) = json_body(panic_response(Box::new(42u8))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detalle"], "unknown panic");
    }

    #[tokio::test]
    async fn test_panicking_handler_is_caught() {
        async fn boom() -> &'static str {
            panic!("fallo inesperado")
        }

        let app = Router::new()
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::custom(panic_response));
        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let (status, body) = json_body(response).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Error interno del backend IA");
        assert_eq!(body["detalle"], "fallo inesperado");
    }
}
