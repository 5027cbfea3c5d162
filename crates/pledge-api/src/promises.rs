use axum::{
    Extension, Json,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::error;
use uuid::Uuid;

use pledge_types::api::QrCodeResponse;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult, run_blocking};
use crate::lifecycle;
use crate::middleware::Identity;
use crate::qr;
use crate::uploads;

fn parse_promise_id(raw: &str) -> ApiResult<Uuid> {
    raw.parse()
        .map_err(|_| ApiError::Validation("Invalid promise ID".to_string()))
}

/// POST /api/promises/create. Multipart form with a `data` JSON part and
/// optional `proofImage` / `voiceRecording` files.
pub async fn create_promise(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<impl IntoResponse> {
    let mut multipart = multipart?;
    let form = uploads::read_create_form(&mut multipart).await?;
    let new_promise = lifecycle::validate_draft(form.draft.clone())?;

    let upload_dir = state.config.upload_dir.clone();
    let attachments = uploads::store_all(&upload_dir, &form).await?;
    let stored = attachments.names();

    let db = state.clone();
    let result = run_blocking(move || {
        lifecycle::create_promise(&db.db, &identity, new_promise, attachments, Utc::now())
    })
    .await;

    match result {
        Ok(promise) => Ok((StatusCode::CREATED, Json(promise))),
        Err(e) => {
            uploads::discard(&upload_dir, &stored).await;
            Err(e)
        }
    }
}

/// GET /api/promises/list
pub async fn list_promises(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let promises = run_blocking(move || lifecycle::list_promises(&db.db, &identity)).await?;
    Ok(Json(promises))
}

/// GET /api/promises/{id}. Public, no session needed.
pub async fn get_promise(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_promise_id(&id)?;

    let db = state.clone();
    let promise =
        run_blocking(move || lifecycle::get_public_promise(&db.db, id, Utc::now())).await?;
    Ok(Json(promise))
}

/// POST /api/promises/forfeit/{id}
pub async fn forfeit_promise(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_promise_id(&id)?;

    let db = state.clone();
    let promise =
        run_blocking(move || lifecycle::forfeit_promise(&db.db, &identity, id, Utc::now()))
            .await?;
    Ok(Json(promise))
}

/// GET /api/promises/qr/{id}. Regenerated on every call, never stored.
pub async fn promise_qr_code(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_promise_id(&id)?;

    let db = state.clone();
    let qr_code = run_blocking(move || {
        let payload = lifecycle::qr_payload(&db.db, &identity, id, &db.config.public_url)?;
        qr::render_data_url(&payload).map_err(|e| {
            error!("Failed to render QR code for promise {}: {}", id, e);
            ApiError::Internal(e)
        })
    })
    .await?;

    Ok(Json(QrCodeResponse { qr_code }))
}
