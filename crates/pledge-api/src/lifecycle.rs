//! Promise lifecycle rules: creation, listing, public retrieval, forfeit and
//! the data behind QR codes.
//!
//! Everything here is synchronous and takes the database, the caller and the
//! current time explicitly. Handlers run these on the blocking pool.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use pledge_db::{Database, StatusUpdate};
use pledge_types::api::{PromiseDraft, QrPayload};
use pledge_types::models::{
    Challenge, Promise, PromiseStatus, PromiseWithActivity, PublicPromise, Reaction,
    RecurringPeriod, Reminder, User, VowTemplate,
};

use crate::error::{ApiError, ApiResult};
use crate::middleware::Identity;

const MIN_REQUIRED_LEN: usize = 2;

/// A create-form payload that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPromise {
    pub title: String,
    pub description: String,
    pub promise_to: String,
    pub recipient_email: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_recurring: bool,
    pub recurring_period: Option<RecurringPeriod>,
    pub vow_template: Option<VowTemplate>,
    pub vow: Option<String>,
    pub proof_comment: Option<String>,
    pub theme: Option<String>,
    pub is_secret: bool,
    pub reveal_date: Option<DateTime<Utc>>,
}

/// Stored file names of uploaded proof.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attachments {
    pub proof_image: Option<String>,
    pub voice_recording: Option<String>,
}

impl Attachments {
    pub fn names(&self) -> Vec<String> {
        self.proof_image
            .iter()
            .chain(self.voice_recording.iter())
            .cloned()
            .collect()
    }
}

fn required(value: &str, label: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.chars().count() < MIN_REQUIRED_LEN {
        return Err(ApiError::Validation(format!(
            "{} must be at least {} characters",
            label, MIN_REQUIRED_LEN
        )));
    }
    Ok(value.to_string())
}

/// Empty strings from untouched form inputs count as absent.
fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_date(raw: Option<String>, label: &str) -> ApiResult<Option<DateTime<Utc>>> {
    let Some(raw) = present(raw) else {
        return Ok(None);
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(Some(ndt.and_utc()));
    }
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| Some(ndt.and_utc()))
        .ok_or_else(|| ApiError::Validation(format!("{} is not a valid date", label)))
}

fn parse_choice<T>(raw: Option<String>, label: &str) -> ApiResult<Option<T>>
where
    T: std::str::FromStr,
{
    present(raw)
        .map(|v| {
            v.parse()
                .map_err(|_| ApiError::Validation(format!("{} '{}' is not recognised", label, v)))
        })
        .transpose()
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Check a raw create-form payload before anything is stored.
pub fn validate_draft(draft: PromiseDraft) -> ApiResult<NewPromise> {
    let title = required(&draft.title, "Title")?;
    let description = required(&draft.description, "Description")?;
    let promise_to = required(&draft.promise_to, "Name")?;

    let expiry_date = parse_date(draft.expiry_date, "Expiry date")?;
    let reveal_date = parse_date(draft.reveal_date, "Reveal date")?;

    let recurring_period: Option<RecurringPeriod> =
        parse_choice(draft.recurring_period, "Recurring period")?;
    if draft.is_recurring && recurring_period.is_none() {
        return Err(ApiError::Validation(
            "Recurring promises need a recurring period".to_string(),
        ));
    }

    if draft.is_secret && reveal_date.is_none() {
        return Err(ApiError::Validation(
            "Secret promises need a reveal date".to_string(),
        ));
    }

    let vow_template: Option<VowTemplate> = parse_choice(draft.vow_template, "Vow template")?;
    let vow = match (vow_template, present(draft.vow)) {
        (Some(VowTemplate::Custom), None) => {
            return Err(ApiError::Validation("Custom vows need vow text".to_string()));
        }
        (Some(template), None) => template.phrase().map(str::to_string),
        (_, vow) => vow,
    };

    let recipient_email = present(draft.recipient_email);
    if let Some(email) = &recipient_email {
        if !looks_like_email(email) {
            return Err(ApiError::Validation("Recipient email is not valid".to_string()));
        }
    }

    let theme = present(draft.theme);
    if let Some(theme) = &theme {
        if !is_hex_color(theme) {
            return Err(ApiError::Validation(
                "Theme must be a hex color like #ff8800".to_string(),
            ));
        }
    }

    Ok(NewPromise {
        title,
        description,
        promise_to,
        recipient_email,
        expiry_date,
        is_recurring: draft.is_recurring,
        recurring_period: if draft.is_recurring { recurring_period } else { None },
        vow_template,
        vow,
        proof_comment: present(draft.proof_comment),
        theme,
        is_secret: draft.is_secret,
        reveal_date,
    })
}

/// Look up the caller's user record. A valid token for a user that no
/// longer exists is treated as no session.
pub fn resolve_caller(db: &Database, identity: &Identity) -> ApiResult<User> {
    let row = db
        .get_user_by_id(&identity.user_id.to_string())?
        .ok_or(ApiError::Unauthenticated)?;
    Ok(User::try_from(row)?)
}

/// Persist a validated promise as `ACTIVE`. Recurring promises with an
/// expiry also get one reminder, a day before the expiry.
pub fn create_promise(
    db: &Database,
    identity: &Identity,
    new: NewPromise,
    attachments: Attachments,
    now: DateTime<Utc>,
) -> ApiResult<Promise> {
    let creator = resolve_caller(db, identity)?;

    let promise = Promise {
        id: Uuid::new_v4(),
        title: new.title,
        description: new.description,
        promise_to: new.promise_to,
        recipient_email: new.recipient_email,
        expiry_date: new.expiry_date,
        is_recurring: new.is_recurring,
        recurring_period: new.recurring_period,
        vow_template: new.vow_template,
        vow: new.vow,
        proof_comment: new.proof_comment,
        theme: new.theme,
        proof_image: attachments.proof_image,
        voice_recording: attachments.voice_recording,
        is_secret: new.is_secret,
        reveal_date: new.reveal_date,
        status: PromiseStatus::Active,
        created_at: now,
        updated_at: now,
        creator_id: creator.id,
    };

    let reminder = match (promise.is_recurring, promise.expiry_date) {
        (true, Some(expiry)) => Some(Reminder {
            id: Uuid::new_v4(),
            promise_id: promise.id,
            date: expiry - Duration::days(1),
            sent: false,
        }),
        _ => None,
    };

    db.insert_promise(&promise, reminder.as_ref())?;
    info!("Promise {} created by {}", promise.id, creator.email);
    Ok(promise)
}

/// The caller's promises, newest first, with reactions and challenges.
pub fn list_promises(db: &Database, identity: &Identity) -> ApiResult<Vec<PromiseWithActivity>> {
    let rows = db.list_promises_by_creator(&identity.user_id.to_string())?;

    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let mut reactions = db.get_reactions_for_promises(&ids)?;
    let mut challenges = db.get_challenges_for_promises(&ids)?;

    rows.into_iter()
        .map(|row| -> ApiResult<PromiseWithActivity> {
            let reactions = reactions
                .remove(&row.id)
                .unwrap_or_default()
                .into_iter()
                .map(Reaction::try_from)
                .collect::<anyhow::Result<Vec<_>>>()?;
            let challenges = challenges
                .remove(&row.id)
                .unwrap_or_default()
                .into_iter()
                .map(Challenge::try_from)
                .collect::<anyhow::Result<Vec<_>>>()?;

            Ok(PromiseWithActivity {
                promise: Promise::try_from(row)?,
                reaction_count: reactions.len(),
                challenge_count: challenges.len(),
                reactions,
                challenges,
            })
        })
        .collect()
}

fn load_promise(db: &Database, id: Uuid) -> ApiResult<Promise> {
    let row = db
        .get_promise(&id.to_string())?
        .ok_or_else(|| ApiError::NotFound("Promise not found".to_string()))?;
    Ok(Promise::try_from(row)?)
}

/// Public view of a promise. Secret promises stay hidden until their
/// reveal date.
pub fn get_public_promise(db: &Database, id: Uuid, now: DateTime<Utc>) -> ApiResult<PublicPromise> {
    let promise = load_promise(db, id)?;

    if promise.is_sealed(now) {
        let reveal = promise.reveal_date.unwrap_or(now);
        return Err(ApiError::Forbidden(format!(
            "This promise is secret and will be revealed on {}",
            reveal.format("%Y-%m-%d")
        )));
    }

    Ok(promise.to_public())
}

/// Cancel an active promise owned by the caller. Terminal promises are left
/// untouched.
pub fn forfeit_promise(
    db: &Database,
    identity: &Identity,
    id: Uuid,
    now: DateTime<Utc>,
) -> ApiResult<Promise> {
    let update = db.transition_status(
        &id.to_string(),
        &identity.user_id.to_string(),
        PromiseStatus::Cancelled,
        &now,
    )?;

    match update {
        StatusUpdate::Updated(row) => {
            info!("Promise {} forfeited by {}", id, identity.email);
            Ok(Promise::try_from(row)?)
        }
        StatusUpdate::NotFound => Err(ApiError::NotFound("Promise not found".to_string())),
        StatusUpdate::NotOwner => {
            warn!("User {} tried to forfeit promise {} they do not own", identity.user_id, id);
            Err(ApiError::Forbidden(
                "Not authorized to forfeit this promise".to_string(),
            ))
        }
        StatusUpdate::NotActive(status) => {
            warn!("Forfeit of promise {} rejected, status is {}", id, status);
            Err(ApiError::InvalidState(
                "Cannot forfeit a completed promise".to_string(),
            ))
        }
    }
}

/// What a promise's QR code encodes. Only the creator may generate it.
pub fn qr_payload(
    db: &Database,
    identity: &Identity,
    id: Uuid,
    public_url: &str,
) -> ApiResult<QrPayload> {
    let promise = load_promise(db, id)?;

    if promise.creator_id != identity.user_id {
        return Err(ApiError::Forbidden(
            "Not authorized to access this promise".to_string(),
        ));
    }

    Ok(QrPayload {
        id: promise.id,
        title: promise.title,
        promise_to: promise.promise_to,
        url: format!("{}/promise/{}", public_url.trim_end_matches('/'), promise.id),
    })
}
