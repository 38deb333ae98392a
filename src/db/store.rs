//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::models::*;

/// Timestamp format used for check rows. Millisecond precision keeps
/// lexicographic order equal to chronological order.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found")]
    NotFound,
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();

        // Cascade deletes depend on this pragma; SQLite defaults it off.
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| DbError::Migration(format!("foreign_keys pragma failed: {}", e)))?;

        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;

        Ok(())
    }

    // --- Server CRUD ---

    /// Add a new server and return it with its assigned ID.
    pub fn add_server(&self, name: &str, host: &str) -> Result<Server, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO servers (name, host) VALUES (?1, ?2)",
            params![name, host],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.get_server(id)
    }

    /// Get a server by ID.
    pub fn get_server(&self, id: i64) -> Result<Server, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, host, created_at FROM servers WHERE id = ?1",
            params![id],
            |row| {
                Ok(Server {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    host: row.get(2)?,
                    created_at: read_time(row, 3)?,
                })
            },
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Get all servers with their application counts.
    pub fn get_servers(&self) -> Result<Vec<ServerSummary>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT s.id, s.name, s.host, s.created_at, COUNT(a.id) AS app_count
             FROM servers s
             LEFT JOIN applications a ON s.id = a.server_id
             GROUP BY s.id
             ORDER BY s.name",
        )?;

        let servers = stmt
            .query_map([], |row| {
                Ok(ServerSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    host: row.get(2)?,
                    created_at: read_time(row, 3)?,
                    app_count: row.get(4)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(servers)
    }

    /// Update an existing server.
    pub fn update_server(&self, id: i64, name: &str, host: &str) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE servers SET name = ?1, host = ?2 WHERE id = ?3",
            params![name, host, id],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Delete a server. Its applications and their checks cascade.
    pub fn delete_server(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM servers WHERE id = ?1", params![id])?;
        Ok(())
    }

    // --- Application CRUD ---

    /// Add a new application and return it with its assigned ID.
    pub fn add_application(&self, app: &NewApplication) -> Result<Application, DbError> {
        let check_interval = clamp_interval(app.check_interval);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO applications (server_id, name, port, health_url, check_interval, response_threshold)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                app.server_id,
                app.name,
                app.port,
                app.health_url,
                check_interval,
                app.response_threshold,
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.get_application(id)
    }

    /// Get an application by ID.
    pub fn get_application(&self, id: i64) -> Result<Application, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, server_id, name, port, health_url, check_interval, response_threshold, created_at
             FROM applications WHERE id = ?1",
            params![id],
            map_application,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Get a server's applications, each with its latest check status.
    pub fn get_applications_for_server(
        &self,
        server_id: i64,
    ) -> Result<Vec<ApplicationStatus>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT a.id, a.server_id, a.name, a.port, a.health_url, a.check_interval,
                    a.response_threshold, a.created_at,
                    (SELECT status FROM checks WHERE application_id = a.id
                     ORDER BY checked_at DESC, id DESC LIMIT 1) AS last_status,
                    (SELECT checked_at FROM checks WHERE application_id = a.id
                     ORDER BY checked_at DESC, id DESC LIMIT 1) AS last_check
             FROM applications a
             WHERE a.server_id = ?1
             ORDER BY a.name",
        )?;

        let apps = stmt
            .query_map(params![server_id], |row| {
                Ok(ApplicationStatus {
                    application: map_application(row)?,
                    last_status: row.get(8)?,
                    last_check: read_time_opt(row, 9)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(apps)
    }

    /// Update an existing application.
    pub fn update_application(&self, id: i64, app: &NewApplication) -> Result<(), DbError> {
        let check_interval = clamp_interval(app.check_interval);
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE applications
             SET name = ?1, port = ?2, health_url = ?3, check_interval = ?4, response_threshold = ?5
             WHERE id = ?6",
            params![
                app.name,
                app.port,
                app.health_url,
                check_interval,
                app.response_threshold,
                id,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Delete an application. Its checks cascade.
    pub fn delete_application(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM applications WHERE id = ?1", params![id])?;
        Ok(())
    }

    // --- Registry reads for the scheduler/checker ---

    /// Get all applications joined with their owning server's host.
    pub fn list_applications(&self) -> Result<Vec<ApplicationTarget>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT a.id, a.server_id, a.name, s.host, a.port, a.health_url, a.check_interval
             FROM applications a
             JOIN servers s ON a.server_id = s.id",
        )?;

        let targets = stmt
            .query_map([], map_application_target)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(targets)
    }

    /// Get one application joined with its owning server's host.
    pub fn get_application_target(&self, id: i64) -> Result<ApplicationTarget, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT a.id, a.server_id, a.name, s.host, a.port, a.health_url, a.check_interval
             FROM applications a
             JOIN servers s ON a.server_id = s.id
             WHERE a.id = ?1",
            params![id],
            map_application_target,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    // --- Checks ---

    /// Insert a single check row. Append-only; rows are never updated.
    pub fn insert_check(
        &self,
        application_id: i64,
        check_type: CheckType,
        status: CheckStatus,
        response_time_ms: i64,
        error_message: Option<&str>,
    ) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO checks (application_id, check_type, status, response_time, error_message, checked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                application_id,
                check_type,
                status,
                response_time_ms,
                error_message,
                Utc::now().format(TIME_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    /// Get the most recent checks for an application, newest first.
    pub fn get_checks(&self, application_id: i64, limit: u32) -> Result<Vec<Check>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, application_id, check_type, status, response_time, error_message, checked_at
             FROM checks
             WHERE application_id = ?1
             ORDER BY checked_at DESC, id DESC
             LIMIT ?2",
        )?;

        let checks = stmt
            .query_map(params![application_id, limit], map_check)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(checks)
    }

    /// Count check rows for an application.
    pub fn count_checks(&self, application_id: i64) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM checks WHERE application_id = ?1",
            params![application_id],
            |r| r.get(0),
        )?)
    }

    /// Trim check history to the `keep` most recent rows per application.
    ///
    /// Ties on `checked_at` break on insertion id. Runs as one statement, so
    /// it is atomic with respect to concurrent inserts. Returns the number of
    /// deleted rows.
    pub fn trim_checks(&self, keep: u32) -> Result<usize, DbError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM checks
             WHERE id NOT IN (
                 SELECT id FROM (
                     SELECT id, ROW_NUMBER() OVER (
                         PARTITION BY application_id
                         ORDER BY checked_at DESC, id DESC
                     ) AS rn
                     FROM checks
                 ) WHERE rn <= ?1
             )",
            params![keep],
        )?;
        Ok(deleted)
    }

    // --- Dashboard ---

    /// Get fleet-wide dashboard counters.
    pub fn get_dashboard_summary(&self) -> Result<DashboardSummary, DbError> {
        let conn = self.conn.lock().unwrap();
        let summary = conn.query_row(
            "SELECT
                 COUNT(DISTINCT s.id) AS total_servers,
                 COUNT(DISTINCT a.id) AS total_applications,
                 COUNT(DISTINCT CASE WHEN latest.status = 'up' THEN a.id END) AS healthy_apps,
                 COUNT(DISTINCT CASE WHEN latest.status = 'down' THEN a.id END) AS down_apps
             FROM servers s
             LEFT JOIN applications a ON s.id = a.server_id
             LEFT JOIN (
                 SELECT application_id, status,
                        ROW_NUMBER() OVER (
                            PARTITION BY application_id
                            ORDER BY checked_at DESC, id DESC
                        ) AS rn
                 FROM checks
             ) latest ON a.id = latest.application_id AND latest.rn = 1",
            [],
            |row| {
                Ok(DashboardSummary {
                    total_servers: row.get(0)?,
                    total_applications: row.get(1)?,
                    healthy_apps: row.get(2)?,
                    down_apps: row.get(3)?,
                })
            },
        )?;
        Ok(summary)
    }

    /// Get the most recent checks across the fleet, annotated with names.
    pub fn get_recent_checks(&self, limit: u32) -> Result<Vec<RecentCheck>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.application_id, c.check_type, c.status, c.response_time,
                    c.error_message, c.checked_at, a.name, s.name, s.host
             FROM checks c
             JOIN applications a ON c.application_id = a.id
             JOIN servers s ON a.server_id = s.id
             ORDER BY c.checked_at DESC, c.id DESC
             LIMIT ?1",
        )?;

        let checks = stmt
            .query_map(params![limit], |row| {
                Ok(RecentCheck {
                    check: map_check(row)?,
                    app_name: row.get(7)?,
                    server_name: row.get(8)?,
                    host: row.get(9)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(checks)
    }
}

/// Fields accepted when creating or updating an application.
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub server_id: i64,
    pub name: String,
    pub port: Option<u16>,
    pub health_url: Option<String>,
    pub check_interval: u32,
    pub response_threshold: u32,
}

fn clamp_interval(secs: u32) -> u32 {
    if secs == 0 {
        60
    } else {
        secs.max(MIN_CHECK_INTERVAL_SECS)
    }
}

fn map_application(row: &rusqlite::Row<'_>) -> SqlResult<Application> {
    Ok(Application {
        id: row.get(0)?,
        server_id: row.get(1)?,
        name: row.get(2)?,
        port: row.get(3)?,
        health_url: row.get(4)?,
        check_interval: row.get(5)?,
        response_threshold: row.get(6)?,
        created_at: read_time(row, 7)?,
    })
}

fn map_application_target(row: &rusqlite::Row<'_>) -> SqlResult<ApplicationTarget> {
    Ok(ApplicationTarget {
        id: row.get(0)?,
        server_id: row.get(1)?,
        name: row.get(2)?,
        host: row.get(3)?,
        port: row.get(4)?,
        health_url: row.get(5)?,
        check_interval: row.get(6)?,
    })
}

fn map_check(row: &rusqlite::Row<'_>) -> SqlResult<Check> {
    Ok(Check {
        id: row.get(0)?,
        application_id: row.get(1)?,
        check_type: row.get(2)?,
        status: row.get(3)?,
        response_time: row.get(4)?,
        error_message: row.get(5)?,
        checked_at: read_time(row, 6)?,
    })
}

fn read_time(row: &rusqlite::Row<'_>, idx: usize) -> SqlResult<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    Ok(parse_db_time(&s).unwrap_or_else(Utc::now))
}

fn read_time_opt(row: &rusqlite::Row<'_>, idx: usize) -> SqlResult<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    Ok(s.as_deref().and_then(parse_db_time))
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.fZ",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}
