use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::models::{AnalyzeRequest, AnalyzeResponse};
use crate::normalizer;
use crate::openai_client::OpenAiClient;
use crate::prompt;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Client for the chat-completion API.
    pub openai: OpenAiClient,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let openai = OpenAiClient::new(&config)?;
        Ok(Self { config, openai })
    }
}

/// Health check endpoint.
///
/// Returns a static payload; it does not touch the completion API.
#[utoipa::path(
    get,
    path = "/check",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "mensaje": "Backend IA CRM Metcorp activo"
        })),
    )
}

/// POST /api/analizar
///
/// Builds the prompt from the CRM payload, calls the completion API once and
/// returns the normalized analysis.
///
/// # Returns
///
/// * `200` with `{analisis}` on success, even when the model answered with
///   unusable text.
/// * `400` when the body is not valid JSON or `lead` is missing; nothing is sent upstream.
/// * `500` when the API key is missing or the completion API fails.
#[utoipa::path(
    post,
    path = "/api/analizar",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Normalized lead analysis", body = AnalyzeResponse),
        (status = 400, description = "Missing lead data"),
        (status = 500, description = "Missing configuration or completion API failure")
    )
)]
pub async fn analyze_lead(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| {
        AppError::BadRequest(format!(
            "Cuerpo de la solicitud inválido: {}",
            rejection.body_text()
        ))
    })?;

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("analizar", %request_id);

    run_analysis(&state, request)
        .instrument(span)
        .await
        .map(|analisis| Json(AnalyzeResponse { analisis }))
}

async fn run_analysis(
    state: &AppState,
    request: AnalyzeRequest,
) -> Result<crate::models::AnalysisResult, AppError> {
    let today = chrono::Utc::now().date_naive();
    let lead_prompt = prompt::build_lead_prompt(&request, today)?;

    tracing::info!(
        "Analyzing lead (notas: {}, interacciones: {}, actividades: {})",
        request.notas.as_ref().map_or(0, |n| n.as_slice().len()),
        request.interacciones.as_ref().map_or(0, |i| i.as_slice().len()),
        request.actividades.as_ref().map_or(0, |a| a.as_slice().len()),
    );

    let raw = state
        .openai
        .complete(lead_prompt.into_messages())
        .await
        .context("Lead analysis")?;

    let (analisis, tier) = normalizer::normalize_with_tier(&raw);
    if tier == normalizer::RecoveryTier::TextFallback {
        tracing::warn!("Model answer was not JSON, returning text fallback");
    }
    tracing::info!(
        "Lead analyzed: estado={:?}, probabilidad={}, tier={}",
        analisis.estado_lead,
        analisis.probabilidad_cierre,
        tier.as_str()
    );

    Ok(analisis)
}
