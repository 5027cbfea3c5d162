use std::path::Path;

use axum::body::Bytes;
use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use tokio::io::AsyncWriteExt;
use tracing::{error, warn};
use uuid::Uuid;

use pledge_types::api::PromiseDraft;

use crate::error::{ApiError, ApiResult};
use crate::lifecycle::Attachments;

/// 5 MB limit per uploaded file
pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024;
/// Whole create request: both files plus the JSON part.
pub const MAX_BODY_SIZE: usize = 2 * MAX_FILE_SIZE + 64 * 1024;

const PROOF_IMAGE: &str = "proofImage";
const VOICE_RECORDING: &str = "voiceRecording";

pub struct UploadedFile {
    pub field: &'static str,
    pub extension: String,
    pub bytes: Bytes,
}

pub struct CreateForm {
    pub draft: PromiseDraft,
    pub proof_image: Option<UploadedFile>,
    pub voice_recording: Option<UploadedFile>,
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Upload exceeds the 5 MB limit".to_string())
    } else {
        ApiError::Validation(format!("Multipart error: {}", e))
    }
}

/// Keep a short alphanumeric extension from the client's file name.
pub fn sanitize_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}

/// Read the create-promise form: a `data` JSON part plus optional proof
/// files. Files are held in memory until the draft has been validated.
pub async fn read_create_form(multipart: &mut Multipart) -> ApiResult<CreateForm> {
    let mut draft = None;
    let mut proof_image = None;
    let mut voice_recording = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        let slot = match name.as_str() {
            "data" => {
                let text = field.text().await.map_err(multipart_error)?;
                let parsed: PromiseDraft = serde_json::from_str(&text)
                    .map_err(|e| ApiError::Validation(format!("Invalid promise data: {}", e)))?;
                draft = Some(parsed);
                continue;
            }
            PROOF_IMAGE => (&mut proof_image, PROOF_IMAGE),
            VOICE_RECORDING => (&mut voice_recording, VOICE_RECORDING),
            other => {
                warn!("Ignoring unexpected multipart field '{}'", other);
                continue;
            }
        };

        let extension = sanitize_extension(field.file_name());
        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.len() > MAX_FILE_SIZE {
            return Err(ApiError::PayloadTooLarge(format!(
                "{} exceeds the 5 MB limit",
                slot.1
            )));
        }
        if bytes.is_empty() {
            continue;
        }

        let (target, field) = slot;
        if target.is_some() {
            return Err(ApiError::Validation(format!("Only one {} may be uploaded", field)));
        }
        *target = Some(UploadedFile {
            field,
            extension,
            bytes,
        });
    }

    let draft = draft.ok_or_else(|| ApiError::Validation("Missing required fields".to_string()))?;

    Ok(CreateForm {
        draft,
        proof_image,
        voice_recording,
    })
}

/// Write an uploaded file to `dir` and return its stored name.
pub async fn store(dir: &Path, file: &UploadedFile) -> ApiResult<String> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        error!("Failed to create upload directory {}: {}", dir.display(), e);
        anyhow::anyhow!("upload directory unavailable")
    })?;

    let name = format!("{}-{}.{}", file.field, Uuid::new_v4(), file.extension);
    let path = dir.join(&name);

    let mut out = tokio::fs::File::create(&path).await.map_err(|e| {
        error!("Failed to create file {}: {}", path.display(), e);
        anyhow::anyhow!("could not store upload")
    })?;
    out.write_all(&file.bytes).await.map_err(|e| {
        error!("Failed to write file {}: {}", path.display(), e);
        anyhow::anyhow!("could not store upload")
    })?;
    out.flush().await.map_err(|e| anyhow::anyhow!("could not store upload: {}", e))?;

    Ok(name)
}

/// Store whichever proof files were sent. Nothing is left behind on failure.
pub async fn store_all(dir: &Path, form: &CreateForm) -> ApiResult<Attachments> {
    let mut attachments = Attachments::default();

    if let Some(file) = &form.proof_image {
        attachments.proof_image = Some(store(dir, file).await?);
    }

    if let Some(file) = &form.voice_recording {
        match store(dir, file).await {
            Ok(name) => attachments.voice_recording = Some(name),
            Err(e) => {
                discard(dir, &attachments.names()).await;
                return Err(e);
            }
        }
    }

    Ok(attachments)
}

/// Best-effort removal of stored uploads.
pub async fn discard(dir: &Path, names: &[String]) {
    for name in names {
        if let Err(e) = tokio::fs::remove_file(dir.join(name)).await {
            warn!("Failed to remove upload {}: {}", name, e);
        }
    }
}
