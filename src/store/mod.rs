//! Lead persistence using SQLite.
//!
//! Two collections, `waitlist` and `demo_requests`, each unique on email.
//! Records are written once and never updated or deleted here.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::submission::Urgency;

/// Validated waitlist signup, ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWaitlistEntry {
    pub email: String,
}

/// Validated demo request, ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDemoRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub urgency: Urgency,
}

/// Stored waitlist signup.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitlistEntry {
    /// UUIDv7
    pub id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored demo request.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoRequest {
    /// UUIDv7
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub urgency: Option<Urgency>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of an insert against a unique-email collection.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome<T> {
    Created(T),
    /// A record with this email already exists; nothing was written
    Duplicate,
}

/// Persists lead records in SQLite.
pub struct SubmissionStore {
    conn: Mutex<Connection>,
}

impl SubmissionStore {
    /// Opens (or creates) the SQLite database and ensures the tables exist.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open submission DB at {}", db_path.display()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Submission DB connection lock poisoned"))
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS waitlist (
                id         TEXT PRIMARY KEY,
                email      TEXT UNIQUE NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS demo_requests (
                id         TEXT PRIMARY KEY,
                name       TEXT NOT NULL,
                email      TEXT UNIQUE NOT NULL,
                phone      TEXT NOT NULL,
                urgency    TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .context("Failed to create submission tables")?;
        Ok(())
    }

    /// Inserts a waitlist signup unless the email is already on the list.
    pub fn insert_waitlist(&self, new: &NewWaitlistEntry) -> Result<InsertOutcome<WaitlistEntry>> {
        let now = Utc::now();
        let entry = WaitlistEntry {
            id: Uuid::now_v7().to_string(),
            email: new.email.clone(),
            created_at: now,
            updated_at: now,
        };

        let conn = self.lock()?;
        let inserted = conn
            .execute(
                "INSERT INTO waitlist (id, email, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(email) DO NOTHING",
                params![
                    entry.id,
                    entry.email,
                    entry.created_at.to_rfc3339(),
                    entry.updated_at.to_rfc3339()
                ],
            )
            .context("Failed to insert waitlist entry")?;

        if inserted == 0 {
            return Ok(InsertOutcome::Duplicate);
        }
        Ok(InsertOutcome::Created(entry))
    }

    /// Inserts a demo request unless one already exists for the email.
    pub fn insert_demo_request(&self, new: &NewDemoRequest) -> Result<InsertOutcome<DemoRequest>> {
        let now = Utc::now();
        let request = DemoRequest {
            id: Uuid::now_v7().to_string(),
            name: new.name.clone(),
            email: new.email.clone(),
            phone: new.phone.clone(),
            urgency: Some(new.urgency),
            created_at: now,
            updated_at: now,
        };

        let conn = self.lock()?;
        let inserted = conn
            .execute(
                "INSERT INTO demo_requests (id, name, email, phone, urgency, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(email) DO NOTHING",
                params![
                    request.id,
                    request.name,
                    request.email,
                    request.phone,
                    request.urgency.map(|u| u.as_str()),
                    request.created_at.to_rfc3339(),
                    request.updated_at.to_rfc3339()
                ],
            )
            .context("Failed to insert demo request")?;

        if inserted == 0 {
            return Ok(InsertOutcome::Duplicate);
        }
        Ok(InsertOutcome::Created(request))
    }

    pub fn find_waitlist_by_email(&self, email: &str) -> Result<Option<WaitlistEntry>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, email, created_at, updated_at FROM waitlist WHERE email = ?1",
                params![email],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query waitlist")?;

        let Some((id, email, created_at, updated_at)) = row else {
            return Ok(None);
        };
        Ok(Some(WaitlistEntry {
            created_at: parse_timestamp(&created_at, &id)?,
            updated_at: parse_timestamp(&updated_at, &id)?,
            id,
            email,
        }))
    }

    pub fn find_demo_request_by_email(&self, email: &str) -> Result<Option<DemoRequest>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, name, email, phone, urgency, created_at, updated_at
                 FROM demo_requests WHERE email = ?1",
                params![email],
                demo_row,
            )
            .optional()
            .context("Failed to query demo requests")?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(DemoRequest {
            created_at: parse_timestamp(&row.created_at, &row.id)?,
            updated_at: parse_timestamp(&row.updated_at, &row.id)?,
            urgency: row.urgency.as_deref().and_then(|u| u.parse().ok()),
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
        }))
    }

    pub fn count_waitlist(&self) -> Result<u64> {
        self.count("waitlist")
    }

    pub fn count_demo_requests(&self) -> Result<u64> {
        self.count("demo_requests")
    }

    fn count(&self, table: &'static str) -> Result<u64> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })
            .with_context(|| format!("Failed to count {}", table))?;
        Ok(n.max(0) as u64)
    }
}

/// Raw demo_requests row before timestamp parsing.
struct DemoRow {
    id: String,
    name: String,
    email: String,
    phone: String,
    urgency: Option<String>,
    created_at: String,
    updated_at: String,
}

fn demo_row(row: &Row<'_>) -> rusqlite::Result<DemoRow> {
    Ok(DemoRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        urgency: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn parse_timestamp(value: &str, id: &str) -> Result<DateTime<Utc>> {
    value
        .parse()
        .with_context(|| format!("Failed to parse timestamp for record {}", id))
}
