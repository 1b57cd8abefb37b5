//! libSQL backend: async `OutcomeStore` implementation.
//!
//! Supports local file and in-memory databases. Nested stage results
//! (response, delivery, ticket) are stored as JSON text columns.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::pipeline::types::{Category, OutcomeRecord, OutcomeStatus};
use crate::store::migrations;
use crate::store::traits::OutcomeStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations. Appends
/// additionally go through `write_lock` so concurrent pipelines never
/// interleave inside one insert.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Outcome log opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests and dry runs).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_outcomes(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
        op: &str,
    ) -> Result<Vec<OutcomeRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut outcomes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            outcomes.push(row_to_outcome(&row)?);
        }
        Ok(outcomes)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Serialize an optional stage result to a JSON column value.
fn opt_json<T: Serialize>(value: Option<&T>) -> Result<libsql::Value, DatabaseError> {
    match value {
        Some(v) => serde_json::to_string(v)
            .map(libsql::Value::Text)
            .map_err(|e| DatabaseError::Serialization(e.to_string())),
        None => Ok(libsql::Value::Null),
    }
}

fn parse_json<T: DeserializeOwned>(
    column: &str,
    raw: Option<String>,
) -> Result<Option<T>, DatabaseError> {
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| DatabaseError::Serialization(format!("{column}: {e}")))
    })
    .transpose()
}

const OUTCOME_COLUMNS: &str = "id, email_id, sender, subject, category, category_defaulted, status, \
     response, delivery, ticket, generation_error, delivery_error, escalation_error, \
     started_at, completed_at";

/// Column order matches OUTCOME_COLUMNS.
fn row_to_outcome(row: &libsql::Row) -> Result<OutcomeRecord, DatabaseError> {
    let col = |e: libsql::Error| DatabaseError::Query(format!("row decode: {e}"));

    let id_str: String = row.get(0).map_err(col)?;
    let email_id: String = row.get(1).map_err(col)?;
    let sender: String = row.get(2).map_err(col)?;
    let subject: String = row.get(3).map_err(col)?;
    let category_str: String = row.get(4).map_err(col)?;
    let defaulted: i64 = row.get(5).map_err(col)?;
    let status_str: String = row.get(6).map_err(col)?;
    let response: Option<String> = row.get(7).ok();
    let delivery: Option<String> = row.get(8).ok();
    let ticket: Option<String> = row.get(9).ok();
    let generation_error: Option<String> = row.get(10).ok();
    let delivery_error: Option<String> = row.get(11).ok();
    let escalation_error: Option<String> = row.get(12).ok();
    let started_str: String = row.get(13).map_err(col)?;
    let completed_str: String = row.get(14).map_err(col)?;

    let category = Category::from_label(&category_str).ok_or_else(|| {
        DatabaseError::Serialization(format!("unknown category '{category_str}'"))
    })?;
    let status = OutcomeStatus::parse(&status_str)
        .ok_or_else(|| DatabaseError::Serialization(format!("unknown status '{status_str}'")))?;

    Ok(OutcomeRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        email_id,
        sender,
        subject,
        category,
        category_defaulted: defaulted != 0,
        response: parse_json("response", response)?,
        delivery: parse_json("delivery", delivery)?,
        ticket: parse_json("ticket", ticket)?,
        status,
        generation_error,
        delivery_error,
        escalation_error,
        started_at: parse_datetime(&started_str),
        completed_at: parse_datetime(&completed_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl OutcomeStore for LibSqlBackend {
    async fn record(&self, outcome: &OutcomeRecord) -> Result<(), DatabaseError> {
        let response = opt_json(outcome.response.as_ref())?;
        let delivery = opt_json(outcome.delivery.as_ref())?;
        let ticket = opt_json(outcome.ticket.as_ref())?;
        let ticket_id = opt_text(outcome.ticket.as_ref().map(|t| t.external_id.as_str()));

        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO outcomes (id, email_id, sender, subject, category, category_defaulted, \
                 status, response, delivery, ticket, ticket_id, generation_error, delivery_error, \
                 escalation_error, started_at, completed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    outcome.id.to_string(),
                    outcome.email_id.as_str(),
                    outcome.sender.as_str(),
                    outcome.subject.as_str(),
                    outcome.category.label(),
                    outcome.category_defaulted as i64,
                    outcome.status.as_str(),
                    response,
                    delivery,
                    ticket,
                    ticket_id,
                    opt_text(outcome.generation_error.as_deref()),
                    opt_text(outcome.delivery_error.as_deref()),
                    opt_text(outcome.escalation_error.as_deref()),
                    outcome.started_at.to_rfc3339(),
                    outcome.completed_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record outcome: {e}")))?;

        debug!(
            outcome_id = %outcome.id,
            email_id = %outcome.email_id,
            status = %outcome.status,
            "Outcome recorded"
        );
        Ok(())
    }

    async fn list_outcomes(&self, limit: usize) -> Result<Vec<OutcomeRecord>, DatabaseError> {
        self.query_outcomes(
            &format!("SELECT {OUTCOME_COLUMNS} FROM outcomes ORDER BY seq DESC LIMIT ?1"),
            params![limit as i64],
            "list_outcomes",
        )
        .await
    }

    async fn outcomes_for_email(
        &self,
        email_id: &str,
    ) -> Result<Vec<OutcomeRecord>, DatabaseError> {
        self.query_outcomes(
            &format!("SELECT {OUTCOME_COLUMNS} FROM outcomes WHERE email_id = ?1 ORDER BY seq ASC"),
            params![email_id],
            "outcomes_for_email",
        )
        .await
    }

    async fn count_outcomes(&self) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM outcomes", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count_outcomes: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("count_outcomes: {e}")))?
        {
            Some(row) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("count_outcomes: {e}")))?;
                Ok(count as usize)
            }
            None => Ok(0),
        }
    }
}
