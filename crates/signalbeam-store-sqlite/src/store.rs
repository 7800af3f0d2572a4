// signalbeam-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Rollout Store
// Description: Durable store interfaces backed by SQLite WAL.
// Purpose: Persist rollout state relationally with optimistic concurrency
// and a transactional outbox.
// Dependencies: signalbeam-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Rollouts, phases, and assignments are stored as rows; unique indexes
//! enforce one assignment per `(rollout, device)` and one phase per
//! `(rollout, phase_number)`. Every commit updates the rollout row
//! conditional on its `occ_version` counter and writes the changed phase
//! and assignment rows, the desired-state writes, and one outbox row per
//! event in the same transaction. Loads fail closed on unparseable data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::params;
use serde::Deserialize;
use signalbeam_core::Alert;
use signalbeam_core::AlertId;
use signalbeam_core::AlertKey;
use signalbeam_core::AlertSeverity;
use signalbeam_core::AlertStatus;
use signalbeam_core::AlertStore;
use signalbeam_core::AlertType;
use signalbeam_core::AssignmentId;
use signalbeam_core::BundleId;
use signalbeam_core::DeploymentStatus;
use signalbeam_core::DesiredStateStore;
use signalbeam_core::DesiredStateWrite;
use signalbeam_core::DeviceDesiredState;
use signalbeam_core::DeviceId;
use signalbeam_core::DomainEvent;
use signalbeam_core::DurationMillis;
use signalbeam_core::OutboxEntry;
use signalbeam_core::OutboxStore;
use signalbeam_core::PhaseId;
use signalbeam_core::RolloutAggregate;
use signalbeam_core::RolloutCommit;
use signalbeam_core::RolloutId;
use signalbeam_core::RolloutStore;
use signalbeam_core::SemverVersion;
use signalbeam_core::StoreError;
use signalbeam_core::StoreVersion;
use signalbeam_core::TenantId;
use signalbeam_core::Timestamp;
use signalbeam_core::VersionedRollout;
use signalbeam_core::core::rollout::AssignmentRecord;
use signalbeam_core::core::rollout::AssignmentStatus;
use signalbeam_core::core::rollout::PhaseState;
use signalbeam_core::core::rollout::PhaseStatus;
use signalbeam_core::core::rollout::RolloutPhaseRecord;
use signalbeam_core::core::rollout::RolloutRecord;
use signalbeam_core::core::rollout::RolloutStatus;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Assignment statuses considered terminal in SQL filters.
const TERMINAL_ASSIGNMENT_STATUSES: &str = "('succeeded', 'failed', 'skipped')";
/// Rollout statuses considered terminal in SQL filters.
const TERMINAL_ROLLOUT_STATUSES: &str = "('completed', 'rolled_back', 'failed')";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` rollout store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => Self::Io(message),
            SqliteStoreError::Corrupt(message)
            | SqliteStoreError::VersionMismatch(message) => Self::Corrupt(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps a rusqlite error into a store error.
fn db_err(error: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(error.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed rollout store with WAL support.
#[derive(Clone)]
pub struct SqliteRolloutStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRolloutStore {
    /// Opens an `SQLite`-backed rollout store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// its schema is incompatible.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let connection = Connection::open(&config.path)
            .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        connection
            .pragma_update(None, "journal_mode", config.journal_mode.pragma_value())
            .map_err(|err| db_err(&err))?;
        connection
            .pragma_update(None, "synchronous", config.sync_mode.pragma_value())
            .map_err(|err| db_err(&err))?;
        connection
            .pragma_update(None, "busy_timeout", i64::try_from(config.busy_timeout_ms).unwrap_or(i64::MAX))
            .map_err(|err| db_err(&err))?;
        connection
            .pragma_update(None, "foreign_keys", "on")
            .map_err(|err| db_err(&err))?;

        initialize_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the connection, failing closed on poisoning.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite store mutex poisoned".to_string()))
    }
}

/// Creates tables and verifies the schema version.
fn initialize_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS rollouts (
                rollout_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                bundle_id TEXT NOT NULL,
                target_version TEXT NOT NULL,
                previous_version TEXT,
                status TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                created_by TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER,
                failure_threshold REAL NOT NULL,
                current_phase_number INTEGER NOT NULL,
                occ_version INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_rollouts_tenant_status
                ON rollouts (tenant_id, status);
            CREATE TABLE IF NOT EXISTS rollout_phases (
                phase_id TEXT PRIMARY KEY,
                rollout_id TEXT NOT NULL REFERENCES rollouts (rollout_id),
                phase_number INTEGER NOT NULL,
                name TEXT NOT NULL,
                target_device_count INTEGER NOT NULL,
                target_percentage REAL,
                status TEXT NOT NULL,
                started_at INTEGER,
                completed_at INTEGER,
                success_count INTEGER NOT NULL,
                failure_count INTEGER NOT NULL,
                min_healthy_duration_ms INTEGER,
                UNIQUE (rollout_id, phase_number)
            );
            CREATE TABLE IF NOT EXISTS rollout_device_assignments (
                assignment_id TEXT PRIMARY KEY,
                rollout_id TEXT NOT NULL REFERENCES rollouts (rollout_id),
                phase_id TEXT NOT NULL REFERENCES rollout_phases (phase_id),
                tenant_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                status TEXT NOT NULL,
                assigned_at INTEGER,
                reconciled_at INTEGER,
                last_report_at INTEGER,
                error_message TEXT,
                retry_count INTEGER NOT NULL,
                UNIQUE (rollout_id, device_id)
            );
            CREATE INDEX IF NOT EXISTS idx_assignments_tenant_status
                ON rollout_device_assignments (tenant_id, status);
            CREATE TABLE IF NOT EXISTS desired_states (
                tenant_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                bundle_id TEXT NOT NULL,
                bundle_version TEXT NOT NULL,
                assigned_at INTEGER NOT NULL,
                assigned_by TEXT NOT NULL,
                deployment_status TEXT NOT NULL,
                PRIMARY KEY (tenant_id, device_id)
            );
            CREATE TABLE IF NOT EXISTS alerts (
                alert_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                severity TEXT NOT NULL,
                alert_type TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                device_id TEXT,
                rollout_id TEXT,
                created_at INTEGER NOT NULL,
                last_seen_at INTEGER NOT NULL,
                status TEXT NOT NULL,
                acknowledged_by TEXT,
                acknowledged_at INTEGER,
                resolved_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_alerts_dedupe
                ON alerts (tenant_id, alert_type, status);
            CREATE TABLE IF NOT EXISTS outbox (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                subject TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                published INTEGER NOT NULL DEFAULT 0
            );",
        )
        .map_err(|err| db_err(&err))?;

    let stored: Option<String> = connection
        .query_row(
            "SELECT value FROM store_meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| db_err(&err))?;
    match stored {
        Some(value) if value == SCHEMA_VERSION.to_string() => Ok(()),
        Some(value) => Err(SqliteStoreError::VersionMismatch(format!(
            "expected schema {SCHEMA_VERSION}, found {value}"
        ))),
        None => {
            connection
                .execute(
                    "INSERT INTO store_meta (key, value) VALUES ('schema_version', ?1)",
                    params![SCHEMA_VERSION.to_string()],
                )
                .map_err(|err| db_err(&err))?;
            Ok(())
        }
    }
}

// ============================================================================
// SECTION: Enum Labels
// ============================================================================

/// Returns the stored label for a rollout status.
const fn rollout_status_label(status: RolloutStatus) -> &'static str {
    match status {
        RolloutStatus::Pending => "pending",
        RolloutStatus::InProgress => "in_progress",
        RolloutStatus::Paused => "paused",
        RolloutStatus::Completed => "completed",
        RolloutStatus::RolledBack => "rolled_back",
        RolloutStatus::Failed => "failed",
    }
}

/// Parses a stored rollout status label.
fn parse_rollout_status(label: &str) -> Result<RolloutStatus, SqliteStoreError> {
    match label {
        "pending" => Ok(RolloutStatus::Pending),
        "in_progress" => Ok(RolloutStatus::InProgress),
        "paused" => Ok(RolloutStatus::Paused),
        "completed" => Ok(RolloutStatus::Completed),
        "rolled_back" => Ok(RolloutStatus::RolledBack),
        "failed" => Ok(RolloutStatus::Failed),
        other => Err(SqliteStoreError::Corrupt(format!("unknown rollout status {other:?}"))),
    }
}

/// Returns the stored label for a phase status.
const fn phase_status_label(status: PhaseStatus) -> &'static str {
    match status {
        PhaseStatus::Pending => "pending",
        PhaseStatus::InProgress => "in_progress",
        PhaseStatus::Completed => "completed",
        PhaseStatus::Failed => "failed",
        PhaseStatus::Skipped => "skipped",
    }
}

/// Parses a stored phase status label.
fn parse_phase_status(label: &str) -> Result<PhaseStatus, SqliteStoreError> {
    match label {
        "pending" => Ok(PhaseStatus::Pending),
        "in_progress" => Ok(PhaseStatus::InProgress),
        "completed" => Ok(PhaseStatus::Completed),
        "failed" => Ok(PhaseStatus::Failed),
        "skipped" => Ok(PhaseStatus::Skipped),
        other => Err(SqliteStoreError::Corrupt(format!("unknown phase status {other:?}"))),
    }
}

/// Returns the stored label for an assignment status.
const fn assignment_status_label(status: AssignmentStatus) -> &'static str {
    match status {
        AssignmentStatus::Pending => "pending",
        AssignmentStatus::Assigned => "assigned",
        AssignmentStatus::Reconciling => "reconciling",
        AssignmentStatus::Succeeded => "succeeded",
        AssignmentStatus::Failed => "failed",
        AssignmentStatus::Skipped => "skipped",
    }
}

/// Parses a stored assignment status label.
fn parse_assignment_status(label: &str) -> Result<AssignmentStatus, SqliteStoreError> {
    match label {
        "pending" => Ok(AssignmentStatus::Pending),
        "assigned" => Ok(AssignmentStatus::Assigned),
        "reconciling" => Ok(AssignmentStatus::Reconciling),
        "succeeded" => Ok(AssignmentStatus::Succeeded),
        "failed" => Ok(AssignmentStatus::Failed),
        "skipped" => Ok(AssignmentStatus::Skipped),
        other => Err(SqliteStoreError::Corrupt(format!("unknown assignment status {other:?}"))),
    }
}

/// Returns the stored label for a deployment status.
const fn deployment_status_label(status: DeploymentStatus) -> &'static str {
    match status {
        DeploymentStatus::Pending => "pending",
        DeploymentStatus::Reconciling => "reconciling",
        DeploymentStatus::Succeeded => "succeeded",
        DeploymentStatus::Failed => "failed",
    }
}

/// Parses a stored deployment status label.
fn parse_deployment_status(label: &str) -> Result<DeploymentStatus, SqliteStoreError> {
    match label {
        "pending" => Ok(DeploymentStatus::Pending),
        "reconciling" => Ok(DeploymentStatus::Reconciling),
        "succeeded" => Ok(DeploymentStatus::Succeeded),
        "failed" => Ok(DeploymentStatus::Failed),
        other => Err(SqliteStoreError::Corrupt(format!("unknown deployment status {other:?}"))),
    }
}

/// Returns the stored label for an alert severity.
const fn severity_label(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Info => "info",
        AlertSeverity::Warning => "warning",
        AlertSeverity::Critical => "critical",
    }
}

/// Parses a stored alert severity label.
fn parse_severity(label: &str) -> Result<AlertSeverity, SqliteStoreError> {
    match label {
        "info" => Ok(AlertSeverity::Info),
        "warning" => Ok(AlertSeverity::Warning),
        "critical" => Ok(AlertSeverity::Critical),
        other => Err(SqliteStoreError::Corrupt(format!("unknown severity {other:?}"))),
    }
}

/// Returns the stored label for an alert type.
const fn alert_type_label(alert_type: AlertType) -> &'static str {
    match alert_type {
        AlertType::RolloutFailed => "rollout_failed",
        AlertType::RolloutStalled => "rollout_stalled",
        AlertType::HighFailureRate => "high_failure_rate",
    }
}

/// Parses a stored alert type label.
fn parse_alert_type(label: &str) -> Result<AlertType, SqliteStoreError> {
    match label {
        "rollout_failed" => Ok(AlertType::RolloutFailed),
        "rollout_stalled" => Ok(AlertType::RolloutStalled),
        "high_failure_rate" => Ok(AlertType::HighFailureRate),
        other => Err(SqliteStoreError::Corrupt(format!("unknown alert type {other:?}"))),
    }
}

/// Returns the stored label for an alert status.
const fn alert_status_label(status: AlertStatus) -> &'static str {
    match status {
        AlertStatus::Active => "active",
        AlertStatus::Acknowledged => "acknowledged",
        AlertStatus::Resolved => "resolved",
    }
}

/// Parses a stored alert status label.
fn parse_alert_status(label: &str) -> Result<AlertStatus, SqliteStoreError> {
    match label {
        "active" => Ok(AlertStatus::Active),
        "acknowledged" => Ok(AlertStatus::Acknowledged),
        "resolved" => Ok(AlertStatus::Resolved),
        other => Err(SqliteStoreError::Corrupt(format!("unknown alert status {other:?}"))),
    }
}

// ============================================================================
// SECTION: Value Conversions
// ============================================================================

/// Parses a stored UUID column.
fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, SqliteStoreError> {
    raw.parse::<T>()
        .map_err(|_| SqliteStoreError::Corrupt(format!("unparseable {what}: {raw:?}")))
}

/// Parses a stored semantic version column.
fn parse_version(raw: String) -> Result<SemverVersion, SqliteStoreError> {
    SemverVersion::parse(raw).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))
}

/// Converts stored millis into a timestamp.
fn millis_to_timestamp(millis: i64) -> Result<Timestamp, SqliteStoreError> {
    Timestamp::from_unix_millis(millis)
        .map_err(|err| SqliteStoreError::Corrupt(format!("timestamp out of range: {err}")))
}

/// Converts optional stored millis into an optional timestamp.
fn opt_millis_to_timestamp(millis: Option<i64>) -> Result<Option<Timestamp>, SqliteStoreError> {
    millis.map(millis_to_timestamp).transpose()
}

/// Converts an optional timestamp into optional stored millis.
fn opt_timestamp_to_millis(timestamp: Option<Timestamp>) -> Option<i64> {
    timestamp.map(|value| value.unix_millis())
}

// ============================================================================
// SECTION: Row Writers
// ============================================================================

/// Inserts one phase row.
fn insert_phase(tx: &Transaction<'_>, phase: &RolloutPhaseRecord) -> Result<(), SqliteStoreError> {
    tx.execute(
        "INSERT INTO rollout_phases (
            phase_id, rollout_id, phase_number, name, target_device_count,
            target_percentage, status, started_at, completed_at,
            success_count, failure_count, min_healthy_duration_ms
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            phase.phase_id.to_string(),
            phase.rollout_id.to_string(),
            phase.phase_number,
            phase.name,
            phase.target_device_count,
            phase.target_percentage,
            phase_status_label(phase.status),
            opt_timestamp_to_millis(phase.started_at),
            opt_timestamp_to_millis(phase.completed_at),
            phase.success_count,
            phase.failure_count,
            phase.min_healthy_duration.map(|value| i64::try_from(value.get()).unwrap_or(i64::MAX)),
        ],
    )
    .map_err(|err| db_err(&err))?;
    Ok(())
}

/// Updates one phase row.
fn update_phase(tx: &Transaction<'_>, phase: &RolloutPhaseRecord) -> Result<(), SqliteStoreError> {
    let rows = tx
        .execute(
            "UPDATE rollout_phases SET
                status = ?2, started_at = ?3, completed_at = ?4,
                success_count = ?5, failure_count = ?6
             WHERE phase_id = ?1",
            params![
                phase.phase_id.to_string(),
                phase_status_label(phase.status),
                opt_timestamp_to_millis(phase.started_at),
                opt_timestamp_to_millis(phase.completed_at),
                phase.success_count,
                phase.failure_count,
            ],
        )
        .map_err(|err| db_err(&err))?;
    if rows != 1 {
        return Err(SqliteStoreError::Invalid(format!("unknown phase {}", phase.phase_id)));
    }
    Ok(())
}

/// Inserts one assignment row.
fn insert_assignment(
    tx: &Transaction<'_>,
    tenant_id: TenantId,
    assignment: &AssignmentRecord,
) -> Result<(), SqliteStoreError> {
    tx.execute(
        "INSERT INTO rollout_device_assignments (
            assignment_id, rollout_id, phase_id, tenant_id, device_id,
            status, assigned_at, reconciled_at, last_report_at,
            error_message, retry_count
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            assignment.assignment_id.to_string(),
            assignment.rollout_id.to_string(),
            assignment.phase_id.to_string(),
            tenant_id.to_string(),
            assignment.device_id.to_string(),
            assignment_status_label(assignment.status),
            opt_timestamp_to_millis(assignment.assigned_at),
            opt_timestamp_to_millis(assignment.reconciled_at),
            opt_timestamp_to_millis(assignment.last_report_at),
            assignment.error_message.as_deref(),
            assignment.retry_count,
        ],
    )
    .map_err(|err| db_err(&err))?;
    Ok(())
}

/// Updates one assignment row.
fn update_assignment(
    tx: &Transaction<'_>,
    assignment: &AssignmentRecord,
) -> Result<(), SqliteStoreError> {
    let rows = tx
        .execute(
            "UPDATE rollout_device_assignments SET
                status = ?2, assigned_at = ?3, reconciled_at = ?4,
                last_report_at = ?5, error_message = ?6, retry_count = ?7
             WHERE assignment_id = ?1",
            params![
                assignment.assignment_id.to_string(),
                assignment_status_label(assignment.status),
                opt_timestamp_to_millis(assignment.assigned_at),
                opt_timestamp_to_millis(assignment.reconciled_at),
                opt_timestamp_to_millis(assignment.last_report_at),
                assignment.error_message.as_deref(),
                assignment.retry_count,
            ],
        )
        .map_err(|err| db_err(&err))?;
    if rows != 1 {
        return Err(SqliteStoreError::Invalid(format!(
            "unknown assignment {}",
            assignment.assignment_id
        )));
    }
    Ok(())
}

/// Appends events to the outbox.
fn append_events(tx: &Transaction<'_>, events: &[DomainEvent]) -> Result<(), SqliteStoreError> {
    for event in events {
        let payload = serde_json::to_string(event)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let at = match event {
            DomainEvent::RolloutCreated {
                at, ..
            }
            | DomainEvent::RolloutStarted {
                at, ..
            }
            | DomainEvent::RolloutPhaseAdvanced {
                at, ..
            }
            | DomainEvent::RolloutCompleted {
                at, ..
            }
            | DomainEvent::RolloutRolledBack {
                at, ..
            }
            | DomainEvent::RolloutFailed {
                at, ..
            }
            | DomainEvent::DeviceDesiredStateChanged {
                at, ..
            }
            | DomainEvent::DeviceReportedState {
                at, ..
            }
            | DomainEvent::AlertRaised {
                at, ..
            }
            | DomainEvent::AlertAcknowledged {
                at, ..
            }
            | DomainEvent::AlertResolved {
                at, ..
            } => *at,
        };
        tx.execute(
            "INSERT INTO outbox (subject, payload, created_at) VALUES (?1, ?2, ?3)",
            params![event.subject(), payload, at.unix_millis()],
        )
        .map_err(|err| db_err(&err))?;
    }
    Ok(())
}

/// Applies desired-state writes, returning true when anything changed.
fn apply_desired_writes(
    tx: &Transaction<'_>,
    writes: &[DesiredStateWrite],
) -> Result<bool, SqliteStoreError> {
    let mut changed = false;
    for write in writes {
        match write {
            DesiredStateWrite::Assign {
                device_id,
                tenant_id,
                bundle_id,
                version,
                assigned_by,
                assigned_at,
            } => {
                let existing: Option<(String, String)> = tx
                    .query_row(
                        "SELECT bundle_id, bundle_version FROM desired_states
                         WHERE tenant_id = ?1 AND device_id = ?2",
                        params![tenant_id.to_string(), device_id.to_string()],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()
                    .map_err(|err| db_err(&err))?;
                let unchanged = existing.as_ref().is_some_and(|(bundle, stored)| {
                    *bundle == bundle_id.to_string() && stored == version.as_str()
                });
                if unchanged {
                    continue;
                }
                tx.execute(
                    "INSERT OR REPLACE INTO desired_states (
                        tenant_id, device_id, bundle_id, bundle_version,
                        assigned_at, assigned_by, deployment_status
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        tenant_id.to_string(),
                        device_id.to_string(),
                        bundle_id.to_string(),
                        version.as_str(),
                        assigned_at.unix_millis(),
                        assigned_by,
                        deployment_status_label(DeploymentStatus::Pending),
                    ],
                )
                .map_err(|err| db_err(&err))?;
                changed = true;
            }
            DesiredStateWrite::Clear {
                device_id,
                tenant_id,
            } => {
                let rows = tx
                    .execute(
                        "DELETE FROM desired_states WHERE tenant_id = ?1 AND device_id = ?2",
                        params![tenant_id.to_string(), device_id.to_string()],
                    )
                    .map_err(|err| db_err(&err))?;
                changed |= rows > 0;
            }
            DesiredStateWrite::ProjectStatus {
                device_id,
                tenant_id,
                status,
            } => {
                let rows = tx
                    .execute(
                        "UPDATE desired_states SET deployment_status = ?3
                         WHERE tenant_id = ?1 AND device_id = ?2
                           AND deployment_status <> ?3",
                        params![
                            tenant_id.to_string(),
                            device_id.to_string(),
                            deployment_status_label(*status),
                        ],
                    )
                    .map_err(|err| db_err(&err))?;
                changed |= rows > 0;
            }
        }
    }
    Ok(changed)
}

// ============================================================================
// SECTION: Row Readers
// ============================================================================

/// Reads the rollout row with its concurrency version.
fn read_rollout_row(
    connection: &Connection,
    rollout_id: RolloutId,
) -> Result<Option<(RolloutRecord, StoreVersion)>, SqliteStoreError> {
    let row = connection
        .query_row(
            "SELECT tenant_id, bundle_id, target_version, previous_version, status,
                    name, description, created_by, created_at, started_at,
                    completed_at, failure_threshold, current_phase_number, occ_version
             FROM rollouts WHERE rollout_id = ?1",
            params![rollout_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, i64>(8)?,
                    row.get::<_, Option<i64>>(9)?,
                    row.get::<_, Option<i64>>(10)?,
                    row.get::<_, f64>(11)?,
                    row.get::<_, u32>(12)?,
                    row.get::<_, i64>(13)?,
                ))
            },
        )
        .optional()
        .map_err(|err| db_err(&err))?;

    let Some((
        tenant,
        bundle,
        target,
        previous,
        status,
        name,
        description,
        created_by,
        created_at,
        started_at,
        completed_at,
        failure_threshold,
        current_phase_number,
        occ_version,
    )) = row
    else {
        return Ok(None);
    };

    let record = RolloutRecord {
        rollout_id,
        tenant_id: parse_id::<TenantId>(&tenant, "tenant id")?,
        bundle_id: parse_id::<BundleId>(&bundle, "bundle id")?,
        target_version: parse_version(target)?,
        previous_version: previous.map(parse_version).transpose()?,
        status: parse_rollout_status(&status)?,
        name,
        description,
        created_by,
        created_at: millis_to_timestamp(created_at)?,
        started_at: opt_millis_to_timestamp(started_at)?,
        completed_at: opt_millis_to_timestamp(completed_at)?,
        failure_threshold,
        current_phase_number,
    };
    let version = StoreVersion::new(u64::try_from(occ_version).unwrap_or(0));
    Ok(Some((record, version)))
}

/// Reads every phase of a rollout in phase-number order.
fn read_phases(
    connection: &Connection,
    rollout_id: RolloutId,
) -> Result<Vec<RolloutPhaseRecord>, SqliteStoreError> {
    let mut statement = connection
        .prepare(
            "SELECT phase_id, phase_number, name, target_device_count, target_percentage,
                    status, started_at, completed_at, success_count, failure_count,
                    min_healthy_duration_ms
             FROM rollout_phases WHERE rollout_id = ?1 ORDER BY phase_number",
        )
        .map_err(|err| db_err(&err))?;
    let rows = statement
        .query_map(params![rollout_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<i64>>(6)?,
                row.get::<_, Option<i64>>(7)?,
                row.get::<_, u32>(8)?,
                row.get::<_, u32>(9)?,
                row.get::<_, Option<i64>>(10)?,
            ))
        })
        .map_err(|err| db_err(&err))?;

    let mut phases = Vec::new();
    for row in rows {
        let (
            phase_id,
            phase_number,
            name,
            target_device_count,
            target_percentage,
            status,
            started_at,
            completed_at,
            success_count,
            failure_count,
            min_healthy_ms,
        ) = row.map_err(|err| db_err(&err))?;
        phases.push(RolloutPhaseRecord {
            phase_id: parse_id::<PhaseId>(&phase_id, "phase id")?,
            rollout_id,
            phase_number,
            name,
            target_device_count,
            target_percentage,
            status: parse_phase_status(&status)?,
            started_at: opt_millis_to_timestamp(started_at)?,
            completed_at: opt_millis_to_timestamp(completed_at)?,
            success_count,
            failure_count,
            min_healthy_duration: min_healthy_ms
                .map(|value| DurationMillis::new(u64::try_from(value).unwrap_or(0))),
        });
    }
    Ok(phases)
}

/// Reads every assignment of a rollout grouped by phase, devices ordered
/// lexicographically.
fn read_assignments(
    connection: &Connection,
    rollout_id: RolloutId,
) -> Result<BTreeMap<String, Vec<AssignmentRecord>>, SqliteStoreError> {
    let mut statement = connection
        .prepare(
            "SELECT assignment_id, phase_id, device_id, status, assigned_at,
                    reconciled_at, last_report_at, error_message, retry_count
             FROM rollout_device_assignments
             WHERE rollout_id = ?1 ORDER BY device_id",
        )
        .map_err(|err| db_err(&err))?;
    let rows = statement
        .query_map(params![rollout_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, Option<i64>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, u32>(8)?,
            ))
        })
        .map_err(|err| db_err(&err))?;

    let mut grouped: BTreeMap<String, Vec<AssignmentRecord>> = BTreeMap::new();
    for row in rows {
        let (
            assignment_id,
            phase_id,
            device_id,
            status,
            assigned_at,
            reconciled_at,
            last_report_at,
            error_message,
            retry_count,
        ) = row.map_err(|err| db_err(&err))?;
        let record = AssignmentRecord {
            assignment_id: parse_id::<AssignmentId>(&assignment_id, "assignment id")?,
            rollout_id,
            phase_id: parse_id::<PhaseId>(&phase_id, "phase id")?,
            device_id: parse_id::<DeviceId>(&device_id, "device id")?,
            status: parse_assignment_status(&status)?,
            assigned_at: opt_millis_to_timestamp(assigned_at)?,
            reconciled_at: opt_millis_to_timestamp(reconciled_at)?,
            last_report_at: opt_millis_to_timestamp(last_report_at)?,
            error_message,
            retry_count,
        };
        grouped.entry(phase_id).or_default().push(record);
    }
    Ok(grouped)
}

// ============================================================================
// SECTION: Rollout Store Impl
// ============================================================================

impl RolloutStore for SqliteRolloutStore {
    fn insert_rollout(
        &self,
        aggregate: &RolloutAggregate,
        events: &[DomainEvent],
    ) -> Result<StoreVersion, StoreError> {
        let rollout = &aggregate.rollout;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| SqliteStoreError::from_db(&err))?;

        let inserted = tx.execute(
            "INSERT INTO rollouts (
                rollout_id, tenant_id, bundle_id, target_version, previous_version,
                status, name, description, created_by, created_at, started_at,
                completed_at, failure_threshold, current_phase_number, occ_version
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 1)",
            params![
                rollout.rollout_id.to_string(),
                rollout.tenant_id.to_string(),
                rollout.bundle_id.to_string(),
                rollout.target_version.as_str(),
                rollout.previous_version.as_ref().map(SemverVersion::as_str),
                rollout_status_label(rollout.status),
                rollout.name,
                rollout.description.as_deref(),
                rollout.created_by,
                rollout.created_at.unix_millis(),
                opt_timestamp_to_millis(rollout.started_at),
                opt_timestamp_to_millis(rollout.completed_at),
                rollout.failure_threshold,
                rollout.current_phase_number,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::AlreadyExists(rollout.rollout_id));
            }
            Err(err) => return Err(SqliteStoreError::from_db(&err).into()),
        }

        for state in &aggregate.phases {
            insert_phase(&tx, &state.phase)?;
            for assignment in &state.assignments {
                insert_assignment(&tx, rollout.tenant_id, assignment)?;
            }
        }
        append_events(&tx, events)?;
        tx.commit().map_err(|err| SqliteStoreError::from_db(&err))?;
        drop(guard);
        Ok(StoreVersion::new(1))
    }

    fn load_rollout(&self, rollout_id: RolloutId) -> Result<Option<VersionedRollout>, StoreError> {
        let guard = self.lock()?;
        let Some((rollout, version)) = read_rollout_row(&guard, rollout_id)? else {
            return Ok(None);
        };
        let phases = read_phases(&guard, rollout_id)?;
        let mut grouped = read_assignments(&guard, rollout_id)?;
        drop(guard);

        let phases = phases
            .into_iter()
            .map(|phase| {
                let assignments = grouped.remove(&phase.phase_id.to_string()).unwrap_or_default();
                PhaseState {
                    phase,
                    assignments,
                }
            })
            .collect();
        Ok(Some(VersionedRollout {
            aggregate: RolloutAggregate {
                rollout,
                phases,
            },
            version,
        }))
    }

    fn commit(&self, commit: &RolloutCommit) -> Result<StoreVersion, StoreError> {
        let rollout = &commit.rollout;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| SqliteStoreError::from_db(&err))?;

        let expected = i64::try_from(commit.expected_version.get()).unwrap_or(i64::MAX);
        let rows = tx
            .execute(
                "UPDATE rollouts SET
                    status = ?2, started_at = ?3, completed_at = ?4,
                    failure_threshold = ?5, current_phase_number = ?6,
                    occ_version = occ_version + 1
                 WHERE rollout_id = ?1 AND occ_version = ?7",
                params![
                    rollout.rollout_id.to_string(),
                    rollout_status_label(rollout.status),
                    opt_timestamp_to_millis(rollout.started_at),
                    opt_timestamp_to_millis(rollout.completed_at),
                    rollout.failure_threshold,
                    rollout.current_phase_number,
                    expected,
                ],
            )
            .map_err(|err| SqliteStoreError::from_db(&err))?;
        if rows != 1 {
            return Err(StoreError::VersionConflict {
                rollout_id: commit.rollout_id,
                expected: commit.expected_version,
            });
        }

        for phase in &commit.phases {
            update_phase(&tx, phase)?;
        }
        for assignment in &commit.assignments {
            update_assignment(&tx, assignment)?;
        }
        apply_desired_writes(&tx, &commit.desired_writes)?;
        append_events(&tx, &commit.events)?;
        tx.commit().map_err(|err| SqliteStoreError::from_db(&err))?;
        drop(guard);
        Ok(commit.expected_version.next())
    }

    fn list_open_rollouts(&self, tenant_id: TenantId) -> Result<Vec<RolloutId>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(&format!(
                "SELECT rollout_id FROM rollouts
                 WHERE tenant_id = ?1 AND status NOT IN {TERMINAL_ROLLOUT_STATUSES}
                 ORDER BY rollout_id"
            ))
            .map_err(|err| SqliteStoreError::from_db(&err))?;
        let rows = statement
            .query_map(params![tenant_id.to_string()], |row| row.get::<_, String>(0))
            .map_err(|err| SqliteStoreError::from_db(&err))?;
        let mut rollouts = Vec::new();
        for row in rows {
            let raw = row.map_err(|err| SqliteStoreError::from_db(&err))?;
            rollouts.push(parse_id::<RolloutId>(&raw, "rollout id")?);
        }
        Ok(rollouts)
    }

    fn active_device_ids(&self, tenant_id: TenantId) -> Result<BTreeSet<DeviceId>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(&format!(
                "SELECT DISTINCT device_id FROM rollout_device_assignments
                 WHERE tenant_id = ?1 AND status NOT IN {TERMINAL_ASSIGNMENT_STATUSES}"
            ))
            .map_err(|err| SqliteStoreError::from_db(&err))?;
        let rows = statement
            .query_map(params![tenant_id.to_string()], |row| row.get::<_, String>(0))
            .map_err(|err| SqliteStoreError::from_db(&err))?;
        let mut devices = BTreeSet::new();
        for row in rows {
            let raw = row.map_err(|err| SqliteStoreError::from_db(&err))?;
            devices.insert(parse_id::<DeviceId>(&raw, "device id")?);
        }
        Ok(devices)
    }

    fn find_active_rollout_for_device(
        &self,
        tenant_id: TenantId,
        device_id: DeviceId,
    ) -> Result<Option<RolloutId>, StoreError> {
        let guard = self.lock()?;
        let raw: Option<String> = guard
            .query_row(
                &format!(
                    "SELECT rollout_id FROM rollout_device_assignments
                     WHERE tenant_id = ?1 AND device_id = ?2
                       AND status NOT IN {TERMINAL_ASSIGNMENT_STATUSES}
                     LIMIT 1"
                ),
                params![tenant_id.to_string(), device_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::from_db(&err))?;
        drop(guard);
        raw.map(|value| parse_id::<RolloutId>(&value, "rollout id").map_err(StoreError::from))
            .transpose()
    }
}

impl SqliteStoreError {
    /// Maps a rusqlite error into a store error.
    fn from_db(error: &rusqlite::Error) -> Self {
        db_err(error)
    }
}

// ============================================================================
// SECTION: Desired-State Store Impl
// ============================================================================

impl DesiredStateStore for SqliteRolloutStore {
    fn read(
        &self,
        tenant_id: TenantId,
        device_id: DeviceId,
    ) -> Result<Option<DeviceDesiredState>, StoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT bundle_id, bundle_version, assigned_at, assigned_by, deployment_status
                 FROM desired_states WHERE tenant_id = ?1 AND device_id = ?2",
                params![tenant_id.to_string(), device_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| SqliteStoreError::from_db(&err))?;
        drop(guard);

        let Some((bundle, version, assigned_at, assigned_by, deployment_status)) = row else {
            return Ok(None);
        };
        Ok(Some(DeviceDesiredState {
            device_id,
            tenant_id,
            bundle_id: parse_id::<BundleId>(&bundle, "bundle id")?,
            bundle_version: parse_version(version)?,
            assigned_at: millis_to_timestamp(assigned_at)?,
            assigned_by,
            deployment_status: parse_deployment_status(&deployment_status)?,
        }))
    }

    fn apply_standalone(
        &self,
        writes: &[DesiredStateWrite],
        events: &[DomainEvent],
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| SqliteStoreError::from_db(&err))?;
        let changed = apply_desired_writes(&tx, writes)?;
        if changed {
            append_events(&tx, events)?;
        }
        tx.commit().map_err(|err| SqliteStoreError::from_db(&err))?;
        drop(guard);
        Ok(())
    }
}

// ============================================================================
// SECTION: Alert Store Impl
// ============================================================================

impl AlertStore for SqliteRolloutStore {
    fn find_active(&self, key: &AlertKey) -> Result<Option<Alert>, StoreError> {
        let guard = self.lock()?;
        let raw: Option<String> = guard
            .query_row(
                "SELECT alert_id FROM alerts
                 WHERE tenant_id = ?1 AND alert_type = ?2 AND status = 'active'
                   AND device_id IS ?3 AND rollout_id IS ?4
                 LIMIT 1",
                params![
                    key.tenant_id.to_string(),
                    alert_type_label(key.alert_type),
                    key.device_id.map(|value| value.to_string()),
                    key.rollout_id.map(|value| value.to_string()),
                ],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::from_db(&err))?;
        drop(guard);
        let Some(raw) = raw else {
            return Ok(None);
        };
        self.load(parse_id::<AlertId>(&raw, "alert id")?)
    }

    fn load(&self, alert_id: AlertId) -> Result<Option<Alert>, StoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT tenant_id, severity, alert_type, title, description, device_id,
                        rollout_id, created_at, last_seen_at, status, acknowledged_by,
                        acknowledged_at, resolved_at
                 FROM alerts WHERE alert_id = ?1",
                params![alert_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, i64>(8)?,
                        row.get::<_, String>(9)?,
                        row.get::<_, Option<String>>(10)?,
                        row.get::<_, Option<i64>>(11)?,
                        row.get::<_, Option<i64>>(12)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| SqliteStoreError::from_db(&err))?;
        drop(guard);

        let Some((
            tenant,
            severity,
            alert_type,
            title,
            description,
            device,
            rollout,
            created_at,
            last_seen_at,
            status,
            acknowledged_by,
            acknowledged_at,
            resolved_at,
        )) = row
        else {
            return Ok(None);
        };
        Ok(Some(Alert {
            alert_id,
            tenant_id: parse_id::<TenantId>(&tenant, "tenant id")?,
            severity: parse_severity(&severity)?,
            alert_type: parse_alert_type(&alert_type)?,
            title,
            description,
            device_id: device.as_deref().map(|raw| parse_id::<DeviceId>(raw, "device id")).transpose()?,
            rollout_id: rollout
                .as_deref()
                .map(|raw| parse_id::<RolloutId>(raw, "rollout id"))
                .transpose()?,
            created_at: millis_to_timestamp(created_at)?,
            last_seen_at: millis_to_timestamp(last_seen_at)?,
            status: parse_alert_status(&status)?,
            acknowledged_by,
            acknowledged_at: opt_millis_to_timestamp(acknowledged_at)?,
            resolved_at: opt_millis_to_timestamp(resolved_at)?,
        }))
    }

    fn upsert(&self, alert: &Alert, events: &[DomainEvent]) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| SqliteStoreError::from_db(&err))?;
        tx.execute(
            "INSERT OR REPLACE INTO alerts (
                alert_id, tenant_id, severity, alert_type, title, description,
                device_id, rollout_id, created_at, last_seen_at, status,
                acknowledged_by, acknowledged_at, resolved_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                alert.alert_id.to_string(),
                alert.tenant_id.to_string(),
                severity_label(alert.severity),
                alert_type_label(alert.alert_type),
                alert.title,
                alert.description,
                alert.device_id.map(|value| value.to_string()),
                alert.rollout_id.map(|value| value.to_string()),
                alert.created_at.unix_millis(),
                alert.last_seen_at.unix_millis(),
                alert_status_label(alert.status),
                alert.acknowledged_by.as_deref(),
                opt_timestamp_to_millis(alert.acknowledged_at),
                opt_timestamp_to_millis(alert.resolved_at),
            ],
        )
        .map_err(|err| SqliteStoreError::from_db(&err))?;
        append_events(&tx, events)?;
        tx.commit().map_err(|err| SqliteStoreError::from_db(&err))?;
        drop(guard);
        Ok(())
    }

    fn list_open(&self, tenant_id: TenantId) -> Result<Vec<Alert>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT alert_id FROM alerts
                 WHERE tenant_id = ?1 AND status <> 'resolved' ORDER BY created_at",
            )
            .map_err(|err| SqliteStoreError::from_db(&err))?;
        let rows = statement
            .query_map(params![tenant_id.to_string()], |row| row.get::<_, String>(0))
            .map_err(|err| SqliteStoreError::from_db(&err))?;
        let mut ids = Vec::new();
        for row in rows {
            let raw = row.map_err(|err| SqliteStoreError::from_db(&err))?;
            ids.push(parse_id::<AlertId>(&raw, "alert id")?);
        }
        drop(statement);
        drop(guard);

        let mut alerts = Vec::new();
        for alert_id in ids {
            if let Some(alert) = self.load(alert_id)? {
                alerts.push(alert);
            }
        }
        Ok(alerts)
    }
}

// ============================================================================
// SECTION: Outbox Store Impl
// ============================================================================

impl OutboxStore for SqliteRolloutStore {
    fn fetch_unpublished(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT seq, subject, payload, created_at FROM outbox
                 WHERE published = 0 ORDER BY seq LIMIT ?1",
            )
            .map_err(|err| SqliteStoreError::from_db(&err))?;
        let rows = statement
            .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(|err| SqliteStoreError::from_db(&err))?;

        let mut entries = Vec::new();
        for row in rows {
            let (seq, subject, payload, created_at) =
                row.map_err(|err| SqliteStoreError::from_db(&err))?;
            let payload = serde_json::from_str(&payload)
                .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
            entries.push(OutboxEntry {
                seq: u64::try_from(seq).unwrap_or(0),
                subject,
                payload,
                created_at: Some(millis_to_timestamp(created_at)?),
            });
        }
        Ok(entries)
    }

    fn mark_published(&self, seqs: &[u64]) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| SqliteStoreError::from_db(&err))?;
        for seq in seqs {
            tx.execute(
                "UPDATE outbox SET published = 1 WHERE seq = ?1",
                params![i64::try_from(*seq).unwrap_or(i64::MAX)],
            )
            .map_err(|err| SqliteStoreError::from_db(&err))?;
        }
        tx.commit().map_err(|err| SqliteStoreError::from_db(&err))?;
        drop(guard);
        Ok(())
    }
}
