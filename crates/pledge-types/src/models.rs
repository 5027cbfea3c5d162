use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a promise.
///
/// `Active` is the only non-terminal state. Once a promise is fulfilled or
/// cancelled it never moves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromiseStatus {
    Active,
    Fulfilled,
    Cancelled,
}

impl PromiseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Fulfilled => "FULFILLED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }

    pub fn can_transition_to(&self, next: PromiseStatus) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Fulfilled) | (Self::Active, Self::Cancelled)
        )
    }
}

impl fmt::Display for PromiseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromiseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "FULFILLED" => Ok(Self::Fulfilled),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("unknown promise status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurringPeriod {
    Weekly,
    Monthly,
}

impl RecurringPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
        }
    }
}

impl FromStr for RecurringPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WEEKLY" => Ok(Self::Weekly),
            "MONTHLY" => Ok(Self::Monthly),
            other => Err(format!("unknown recurring period '{}'", other)),
        }
    }
}

/// Pre-written vow phrasings offered on the create form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VowTemplate {
    Solemn,
    Heart,
    NoBackingOut,
    Custom,
}

impl VowTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Solemn => "solemn",
            Self::Heart => "heart",
            Self::NoBackingOut => "noBackingOut",
            Self::Custom => "custom",
        }
    }

    /// The phrase stored as the vow when the user picks this template
    /// without writing their own text. `Custom` has none.
    pub fn phrase(&self) -> Option<&'static str> {
        match self {
            Self::Solemn => Some("I solemnly swear to..."),
            Self::Heart => Some("I promise, with all my heart, that..."),
            Self::NoBackingOut => Some("No backing out, I will definitely..."),
            Self::Custom => None,
        }
    }
}

impl FromStr for VowTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solemn" => Ok(Self::Solemn),
            "heart" => Ok(Self::Heart),
            "noBackingOut" => Ok(Self::NoBackingOut),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown vow template '{}'", other)),
        }
    }
}

/// A promise as its creator sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Promise {
    pub id: Uuid,
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
    pub proof_image: Option<String>,
    pub voice_recording: Option<String>,
    pub is_secret: bool,
    pub reveal_date: Option<DateTime<Utc>>,
    pub status: PromiseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub creator_id: Uuid,
}

impl Promise {
    /// True while a secret promise is still sealed at `now`.
    pub fn is_sealed(&self, now: DateTime<Utc>) -> bool {
        self.is_secret && self.reveal_date.is_some_and(|reveal| reveal > now)
    }

    pub fn to_public(&self) -> PublicPromise {
        PublicPromise {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            promise_to: self.promise_to.clone(),
            expiry_date: self.expiry_date,
            is_recurring: self.is_recurring,
            recurring_period: self.recurring_period,
            vow: self.vow.clone(),
            theme: self.theme.clone(),
            is_secret: self.is_secret,
            reveal_date: self.reveal_date,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// The shareable view of a promise. Ownership, recipient contact details
/// and proof attachments are left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPromise {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub promise_to: String,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_recurring: bool,
    pub recurring_period: Option<RecurringPeriod>,
    pub vow: Option<String>,
    pub theme: Option<String>,
    pub is_secret: bool,
    pub reveal_date: Option<DateTime<Utc>>,
    pub status: PromiseStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: Uuid,
    pub promise_id: Uuid,
    pub date: DateTime<Utc>,
    pub sent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub id: Uuid,
    pub promise_id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: Uuid,
    pub promise_id: Uuid,
    pub challenger_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// List entry: a promise with its child collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromiseWithActivity {
    #[serde(flatten)]
    pub promise: Promise,
    pub reactions: Vec<Reaction>,
    pub challenges: Vec<Challenge>,
    pub reaction_count: usize,
    pub challenge_count: usize,
}
