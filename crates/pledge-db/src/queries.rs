use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use pledge_types::models::{Promise, PromiseStatus, Reminder};

use crate::models::{ChallengeRow, PromiseRow, ReactionRow, ReminderRow, UserRow};
use crate::{Database, format_timestamp};

const PROMISE_COLUMNS: &str = "id, title, description, promise_to, recipient_email, expiry_date, \
     is_recurring, recurring_period, vow_template, vow, proof_comment, theme, proof_image, \
     voice_recording, is_secret, reveal_date, status, created_at, updated_at, creator_id";

/// Outcome of a guarded status change.
pub enum StatusUpdate {
    Updated(PromiseRow),
    NotFound,
    NotOwner,
    /// The promise already left `ACTIVE`; carries the status it holds now.
    NotActive(String),
}

impl Database {
    // -- Users --

    /// Create the user on first sign-in, refresh name and image afterwards.
    /// `id` is only used when the email is new.
    pub fn upsert_user(
        &self,
        id: &str,
        email: &str,
        name: Option<&str>,
        image: Option<&str>,
        now: &DateTime<Utc>,
    ) -> Result<UserRow> {
        self.with_conn(|conn| {
            let now = format_timestamp(now);
            conn.execute(
                "INSERT INTO users (id, email, name, image, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(email) DO UPDATE SET
                     name = excluded.name,
                     image = excluded.image,
                     updated_at = excluded.updated_at",
                params![id, email, name, image, now],
            )?;
            query_user(conn, "email", email)?
                .ok_or_else(|| anyhow::anyhow!("User vanished after upsert: {}", email))
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Promises --

    /// Insert a promise and, if given, its reminder in one transaction.
    pub fn insert_promise(&self, promise: &Promise, reminder: Option<&Reminder>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                &format!(
                    "INSERT INTO promises ({PROMISE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                             ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
                ),
                params![
                    promise.id.to_string(),
                    promise.title,
                    promise.description,
                    promise.promise_to,
                    promise.recipient_email,
                    promise.expiry_date.as_ref().map(format_timestamp),
                    promise.is_recurring,
                    promise.recurring_period.map(|p| p.as_str()),
                    promise.vow_template.map(|t| t.as_str()),
                    promise.vow,
                    promise.proof_comment,
                    promise.theme,
                    promise.proof_image,
                    promise.voice_recording,
                    promise.is_secret,
                    promise.reveal_date.as_ref().map(format_timestamp),
                    promise.status.as_str(),
                    format_timestamp(&promise.created_at),
                    format_timestamp(&promise.updated_at),
                    promise.creator_id.to_string(),
                ],
            )?;

            if let Some(reminder) = reminder {
                tx.execute(
                    "INSERT INTO reminders (id, promise_id, date, sent, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        reminder.id.to_string(),
                        reminder.promise_id.to_string(),
                        format_timestamp(&reminder.date),
                        reminder.sent,
                        format_timestamp(&promise.created_at),
                    ],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_promise(&self, id: &str) -> Result<Option<PromiseRow>> {
        self.with_conn(|conn| query_promise(conn, id))
    }

    /// Newest first. Rows created in the same instant fall back to
    /// insertion order, newest first.
    pub fn list_promises_by_creator(&self, creator_id: &str) -> Result<Vec<PromiseRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROMISE_COLUMNS} FROM promises
                 WHERE creator_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ))?;

            let rows = stmt
                .query_map([creator_id], promise_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Move an `ACTIVE` promise owned by `creator_id` to `to`, which must be
    /// a terminal status.
    ///
    /// The ownership and state guard live in the UPDATE itself, so two
    /// racing callers cannot both succeed. When nothing changed, the row is
    /// re-read to report why.
    pub fn transition_status(
        &self,
        id: &str,
        creator_id: &str,
        to: PromiseStatus,
        now: &DateTime<Utc>,
    ) -> Result<StatusUpdate> {
        if !PromiseStatus::Active.can_transition_to(to) {
            anyhow::bail!("Invalid status transition: ACTIVE -> {}", to);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE promises SET status = ?1, updated_at = ?2
                 WHERE id = ?3 AND creator_id = ?4 AND status = 'ACTIVE'",
                params![to.as_str(), format_timestamp(now), id, creator_id],
            )?;

            let current = query_promise(&tx, id)?;
            tx.commit()?;

            Ok(match current {
                None => StatusUpdate::NotFound,
                Some(row) if changed == 1 => StatusUpdate::Updated(row),
                Some(row) if row.creator_id != creator_id => StatusUpdate::NotOwner,
                Some(row) => StatusUpdate::NotActive(row.status),
            })
        })
    }

    // -- Reminders --

    pub fn get_reminders_for_promise(&self, promise_id: &str) -> Result<Vec<ReminderRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, promise_id, date, sent FROM reminders
                 WHERE promise_id = ?1
                 ORDER BY date ASC",
            )?;

            let rows = stmt
                .query_map([promise_id], |row| {
                    Ok(ReminderRow {
                        id: row.get(0)?,
                        promise_id: row.get(1)?,
                        date: row.get(2)?,
                        sent: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Reactions & challenges --

    /// No HTTP route records reactions yet; listings and tests read them.
    pub fn insert_reaction(
        &self,
        promise_id: &str,
        user_id: &str,
        kind: &str,
        now: &DateTime<Utc>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reactions (id, promise_id, user_id, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, promise_id, user_id, kind, format_timestamp(now)],
            )?;
            Ok(id)
        })
    }

    /// Like `insert_reaction`, only seeded directly for now.
    pub fn insert_challenge(
        &self,
        promise_id: &str,
        challenger_id: &str,
        message: &str,
        now: &DateTime<Utc>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO challenges (id, promise_id, challenger_id, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, promise_id, challenger_id, message, format_timestamp(now)],
            )?;
            Ok(id)
        })
    }

    /// Batch-fetch reactions for a set of promise IDs, grouped by promise.
    pub fn get_reactions_for_promises(
        &self,
        promise_ids: &[String],
    ) -> Result<HashMap<String, Vec<ReactionRow>>> {
        self.with_conn(|conn| {
            let rows = query_in(
                conn,
                "SELECT id, promise_id, user_id, kind, created_at FROM reactions",
                promise_ids,
                |row| {
                    Ok(ReactionRow {
                        id: row.get(0)?,
                        promise_id: row.get(1)?,
                        user_id: row.get(2)?,
                        kind: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )?;

            let mut grouped: HashMap<String, Vec<ReactionRow>> = HashMap::new();
            for row in rows {
                grouped.entry(row.promise_id.clone()).or_default().push(row);
            }
            Ok(grouped)
        })
    }

    /// Batch-fetch challenges for a set of promise IDs, grouped by promise.
    pub fn get_challenges_for_promises(
        &self,
        promise_ids: &[String],
    ) -> Result<HashMap<String, Vec<ChallengeRow>>> {
        self.with_conn(|conn| {
            let rows = query_in(
                conn,
                "SELECT id, promise_id, challenger_id, message, created_at FROM challenges",
                promise_ids,
                |row| {
                    Ok(ChallengeRow {
                        id: row.get(0)?,
                        promise_id: row.get(1)?,
                        challenger_id: row.get(2)?,
                        message: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )?;

            let mut grouped: HashMap<String, Vec<ChallengeRow>> = HashMap::new();
            for row in rows {
                grouped.entry(row.promise_id.clone()).or_default().push(row);
            }
            Ok(grouped)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, email, name, image, created_at, updated_at FROM users WHERE {column} = ?1"
    ))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                name: row.get(2)?,
                image: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_promise(conn: &Connection, id: &str) -> Result<Option<PromiseRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {PROMISE_COLUMNS} FROM promises WHERE id = ?1"))?;
    let row = stmt.query_row([id], promise_from_row).optional()?;
    Ok(row)
}

fn promise_from_row(row: &Row<'_>) -> rusqlite::Result<PromiseRow> {
    Ok(PromiseRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        promise_to: row.get(3)?,
        recipient_email: row.get(4)?,
        expiry_date: row.get(5)?,
        is_recurring: row.get(6)?,
        recurring_period: row.get(7)?,
        vow_template: row.get(8)?,
        vow: row.get(9)?,
        proof_comment: row.get(10)?,
        theme: row.get(11)?,
        proof_image: row.get(12)?,
        voice_recording: row.get(13)?,
        is_secret: row.get(14)?,
        reveal_date: row.get(15)?,
        status: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
        creator_id: row.get(19)?,
    })
}

/// Run `select` with a `WHERE promise_id IN (...)` clause built for `ids`.
fn query_in<T, F>(conn: &Connection, select: &str, ids: &[String], map: F) -> Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "{} WHERE promise_id IN ({}) ORDER BY created_at ASC",
        select,
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::types::ToSql> =
        ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();

    let rows = stmt
        .query_map(params.as_slice(), map)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
