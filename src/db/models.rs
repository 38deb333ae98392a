//! Database model types.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

/// Minimum allowed check interval in seconds.
///
/// Anything smaller than the scheduler tick would be checked once per tick
/// anyway; clamping at the write boundary keeps probe storms out of the
/// registry entirely.
pub const MIN_CHECK_INTERVAL_SECS: u32 = 5;

/// Kind of probe a check row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    Port,
    Health,
}

impl CheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::Port => "port",
            CheckType::Health => "health",
        }
    }
}

impl ToSql for CheckType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for CheckType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "port" => Ok(CheckType::Port),
            "health" => Ok(CheckType::Health),
            other => Err(FromSqlError::Other(
                format!("unknown check type: {}", other).into(),
            )),
        }
    }
}

/// Result classification of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Up,
    Down,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Up => "up",
            CheckStatus::Down => "down",
        }
    }
}

impl ToSql for CheckStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for CheckStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "up" => Ok(CheckStatus::Up),
            "down" => Ok(CheckStatus::Down),
            other => Err(FromSqlError::Other(
                format!("unknown check status: {}", other).into(),
            )),
        }
    }
}

/// A monitored host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: i64,
    pub name: String,
    /// DNS name or IP address.
    pub host: String,
    pub created_at: DateTime<Utc>,
}

/// A server row annotated with its application count, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSummary {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub created_at: DateTime<Utc>,
    pub app_count: i64,
}

/// An application bound to a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub server_id: i64,
    pub name: String,
    /// TCP port to probe, if any.
    pub port: Option<u16>,
    /// Health endpoint URL to probe, if any.
    pub health_url: Option<String>,
    /// Seconds between scheduled checks.
    pub check_interval: u32,
    /// Response-time classification threshold in milliseconds.
    /// Presentation-layer concern; the checker never reads it.
    pub response_threshold: u32,
    pub created_at: DateTime<Utc>,
}

/// An application row annotated with its latest check, for server detail views.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatus {
    #[serde(flatten)]
    pub application: Application,
    pub last_status: Option<CheckStatus>,
    pub last_check: Option<DateTime<Utc>>,
}

/// An application joined with its owning server's host.
///
/// This is the unit of work the scheduler and checker operate on.
#[derive(Debug, Clone)]
pub struct ApplicationTarget {
    pub id: i64,
    pub server_id: i64,
    pub name: String,
    pub host: String,
    pub port: Option<u16>,
    pub health_url: Option<String>,
    pub check_interval: u32,
}

/// A persisted, immutable record of one probe outcome.
#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub id: i64,
    pub application_id: i64,
    pub check_type: CheckType,
    pub status: CheckStatus,
    pub response_time: i64,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// A recent check annotated with application and server names, for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct RecentCheck {
    #[serde(flatten)]
    pub check: Check,
    pub app_name: String,
    pub server_name: String,
    pub host: String,
}

/// Fleet-wide counters for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub total_servers: i64,
    pub total_applications: i64,
    pub healthy_apps: i64,
    pub down_apps: i64,
}
