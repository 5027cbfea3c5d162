use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::User;

// -- JWT Claims --

/// Session token claims issued by the identity adapter and checked on every
/// protected request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsSignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: User,
    pub expires: DateTime<Utc>,
}

// -- Promises --

/// Raw create-form payload, sent as the `data` part of the multipart body.
///
/// Every optional field defaults to absent. The form submits empty strings
/// and nulls for untouched inputs, so enum and date fields stay textual here
/// and are parsed during validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromiseDraft {
    pub title: String,
    pub description: String,
    pub promise_to: String,
    pub expiry_date: Option<String>,
    pub is_recurring: bool,
    pub recurring_period: Option<String>,
    pub vow_template: Option<String>,
    pub vow: Option<String>,
    pub proof_comment: Option<String>,
    pub recipient_email: Option<String>,
    pub theme: Option<String>,
    pub is_secret: bool,
    pub reveal_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeResponse {
    pub qr_code: String,
}

/// Body of the QR code: enough to identify the promise offline plus a link
/// to its public page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub id: Uuid,
    pub title: String,
    pub promise_to: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}
