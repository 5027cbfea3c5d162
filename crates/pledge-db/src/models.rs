//! Database row types. These map directly to SQLite rows.
//! Distinct from pledge-types API models to keep the DB layer independent.
use anyhow::{Context, Result};
use uuid::Uuid;

use pledge_types::models::{Challenge, Promise, Reaction, Reminder, User};

use crate::parse_timestamp;

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct PromiseRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub promise_to: String,
    pub recipient_email: Option<String>,
    pub expiry_date: Option<String>,
    pub is_recurring: bool,
    pub recurring_period: Option<String>,
    pub vow_template: Option<String>,
    pub vow: Option<String>,
    pub proof_comment: Option<String>,
    pub theme: Option<String>,
    pub proof_image: Option<String>,
    pub voice_recording: Option<String>,
    pub is_secret: bool,
    pub reveal_date: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    pub creator_id: String,
}

pub struct ReminderRow {
    pub id: String,
    pub promise_id: String,
    pub date: String,
    pub sent: bool,
}

pub struct ReactionRow {
    pub id: String,
    pub promise_id: String,
    pub user_id: String,
    pub kind: String,
    pub created_at: String,
}

pub struct ChallengeRow {
    pub id: String,
    pub promise_id: String,
    pub challenger_id: String,
    pub message: String,
    pub created_at: String,
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt {} '{}'", what, raw))
}

fn parse_optional_timestamp(raw: Option<&str>) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    raw.map(parse_timestamp).transpose()
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: parse_id(&row.id, "user id")?,
            email: row.email,
            name: row.name,
            image: row.image,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl TryFrom<PromiseRow> for Promise {
    type Error = anyhow::Error;

    fn try_from(row: PromiseRow) -> Result<Self> {
        let context = || format!("promise '{}'", row.id);
        Ok(Promise {
            id: parse_id(&row.id, "promise id")?,
            expiry_date: parse_optional_timestamp(row.expiry_date.as_deref()).with_context(context)?,
            recurring_period: row
                .recurring_period
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(anyhow::Error::msg)
                .with_context(context)?,
            vow_template: row
                .vow_template
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(anyhow::Error::msg)
                .with_context(context)?,
            reveal_date: parse_optional_timestamp(row.reveal_date.as_deref()).with_context(context)?,
            status: row.status.parse().map_err(anyhow::Error::msg).with_context(context)?,
            created_at: parse_timestamp(&row.created_at).with_context(context)?,
            updated_at: parse_timestamp(&row.updated_at).with_context(context)?,
            creator_id: parse_id(&row.creator_id, "creator id")?,
            title: row.title,
            description: row.description,
            promise_to: row.promise_to,
            recipient_email: row.recipient_email,
            is_recurring: row.is_recurring,
            vow: row.vow,
            proof_comment: row.proof_comment,
            theme: row.theme,
            proof_image: row.proof_image,
            voice_recording: row.voice_recording,
            is_secret: row.is_secret,
        })
    }
}

impl TryFrom<ReminderRow> for Reminder {
    type Error = anyhow::Error;

    fn try_from(row: ReminderRow) -> Result<Self> {
        Ok(Reminder {
            id: parse_id(&row.id, "reminder id")?,
            promise_id: parse_id(&row.promise_id, "promise id")?,
            date: parse_timestamp(&row.date)?,
            sent: row.sent,
        })
    }
}

impl TryFrom<ReactionRow> for Reaction {
    type Error = anyhow::Error;

    fn try_from(row: ReactionRow) -> Result<Self> {
        Ok(Reaction {
            id: parse_id(&row.id, "reaction id")?,
            promise_id: parse_id(&row.promise_id, "promise id")?,
            user_id: parse_id(&row.user_id, "user id")?,
            kind: row.kind,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl TryFrom<ChallengeRow> for Challenge {
    type Error = anyhow::Error;

    fn try_from(row: ChallengeRow) -> Result<Self> {
        Ok(Challenge {
            id: parse_id(&row.id, "challenge id")?,
            promise_id: parse_id(&row.promise_id, "promise id")?,
            challenger_id: parse_id(&row.challenger_id, "challenger id")?,
            message: row.message,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}
