use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::app_state::AppState;
use crate::error::{TryOnError, TryOnFailure, EMPTY_IMAGE};
use crate::models::analysis::{AnalyzeRequest, AnalyzeResponse};
use crate::models::tryon::{TryOnRequest, TryOnResponse, TryOnResult, UploadedImage};
use crate::services::imaging;
use crate::services::intake::{self, JsonTryOnPayload};
use crate::services::provider::{StagedImage, TryOnJob};

#[derive(Debug, Deserialize)]
pub struct TryOnQuery {
    pub action: Option<String>,
}

/// POST /api/tryon: generate a try-on image, or with `?action=analyze`
/// score a previously generated one.
pub async fn handle(
    State(state): State<AppState>,
    Query(query): Query<TryOnQuery>,
    request: Request,
) -> Response {
    match query.action.as_deref() {
        Some("analyze") => analyze(state, request).await,
        _ => try_on(state, request).await,
    }
}

/// Any method other than POST on /api/tryon.
pub async fn method_not_allowed() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
}

async fn try_on(state: AppState, request: Request) -> Response {
    let start = Instant::now();
    let provider = state.provider.kind().to_string();
    metrics::counter!("tryon_requests_total", "provider" => provider.clone()).increment(1);

    // Dropping the handler future (client went away) cancels vendor polling.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let response = match run(&state, request, &cancel).await {
        Ok(result) => {
            tracing::info!(
                provider = %provider,
                seed = result.seed,
                task_id = ?result.task_id,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Try-on completed"
            );
            (StatusCode::OK, Json(TryOnResponse::success(result))).into_response()
        }
        Err(failure) => {
            tracing::warn!(
                provider = %provider,
                seed = failure.seed,
                reason = failure.error.reason(),
                error = %failure.error,
                "Try-on failed"
            );
            metrics::counter!(
                "tryon_requests_failed_total",
                "reason" => failure.error.reason()
            )
            .increment(1);
            failure.into_response()
        }
    };

    metrics::histogram!("tryon_duration_seconds", "provider" => provider)
        .record(start.elapsed().as_secs_f64());
    response
}

async fn run(
    state: &AppState,
    request: Request,
    cancel: &CancellationToken,
) -> Result<TryOnResult, TryOnFailure> {
    let decoded = decode(state, request).await?;
    let seed = decoded.resolve_seed();
    let fail = move |e: TryOnError| e.with_seed(seed);

    // Configuration is checked before any outbound call.
    state.provider.check_configuration().map_err(fail)?;
    state.store.check_configuration().map_err(fail)?;

    let TryOnRequest {
        person_image,
        garment_image,
        ..
    } = decoded;
    let (person_image, garment_image) = normalize_pair(state, person_image, garment_image)
        .await
        .map_err(fail)?;

    let (person_ref, garment_ref) = state
        .store
        .stage_pair(&person_image, &garment_image)
        .await
        .map_err(|e| fail(e.into()))?;

    let person = StagedImage {
        upload: person_image,
        reference: person_ref,
    };
    let garment = StagedImage {
        upload: garment_image,
        reference: garment_ref,
    };

    state
        .provider
        .generate(
            TryOnJob {
                person: &person,
                garment: &garment,
                seed,
            },
            cancel,
        )
        .await
        .map_err(fail)
}

async fn decode(state: &AppState, request: Request) -> Result<TryOnRequest, TryOnError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| TryOnError::Validation(e.body_text()))?;
        intake::from_multipart(multipart, &state.upload_dir).await
    } else if content_type.starts_with("application/json") {
        let Json(payload) = Json::<JsonTryOnPayload>::from_request(request, state)
            .await
            .map_err(|e| TryOnError::Validation(e.body_text()))?;
        intake::from_json(payload)
    } else {
        // The body limit layer already bounds this read.
        let body = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .map_err(|e| TryOnError::Validation(format!("Unreadable request body: {e}")))?;
        if body.is_empty() {
            Err(TryOnError::Validation(EMPTY_IMAGE.to_string()))
        } else {
            Err(TryOnError::Validation(
                "Expected a multipart/form-data or application/json body".to_string(),
            ))
        }
    }
}

async fn normalize_pair(
    state: &AppState,
    person: UploadedImage,
    garment: UploadedImage,
) -> Result<(UploadedImage, UploadedImage), TryOnError> {
    let Some(options) = state.normalize else {
        return Ok((person, garment));
    };

    tokio::task::spawn_blocking(move || {
        Ok::<_, imaging::ImagingError>((
            imaging::normalize(&person, &options)?,
            imaging::normalize(&garment, &options)?,
        ))
    })
    .await
    .map_err(|e| TryOnError::Unexpected(format!("normalization task failed: {e}")))?
    .map_err(|e| TryOnError::UnsupportedImage(e.to_string()))
}

async fn analyze(state: AppState, request: Request) -> Response {
    let Json(body) = match Json::<AnalyzeRequest>::from_request(request, &state).await {
        Ok(body) => body,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": rejection.body_text() })),
            )
                .into_response();
        }
    };

    match state.analyzer.analyze(&body.image_url).await {
        Ok(analysis) => {
            tracing::info!(percentage = ?analysis.percentage, "Matching analysis completed");
            Json(AnalyzeResponse::from(analysis)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, image_url = %body.image_url, "Matching analysis failed");
            (
                e.status_code(),
                Json(json!({
                    "error": "Failed to perform matching analysis",
                    "details": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}
