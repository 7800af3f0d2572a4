// signalbeam-config/src/config.rs
// ============================================================================
// Module: SignalBeam Configuration
// Description: Configuration loading and validation for SignalBeam.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: signalbeam-core, signalbeam-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and range
//! limits. Missing or invalid values fail closed. Durations are plain
//! `*_ms` integers; the documented defaults are: 30s reconcile tick
//! interval and deadline, 3 assignment retries, 15min heartbeat deadline,
//! 0.05 default failure threshold, and a 24h stall alert.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use signalbeam_core::DurationMillis;
use signalbeam_core::ExecutorConfig;
use signalbeam_core::PlannerConfig;
use signalbeam_core::TenantId;
use signalbeam_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "signalbeam.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "SIGNALBEAM_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Default reconcile tick interval in milliseconds.
const DEFAULT_TICK_INTERVAL_MS: u64 = 30_000;
/// Default reconcile tick deadline in milliseconds.
const DEFAULT_TICK_DEADLINE_MS: u64 = 30_000;
/// Default assignment retry limit.
const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default assignment heartbeat deadline in milliseconds.
const DEFAULT_HEARTBEAT_DEADLINE_MS: u64 = 15 * 60_000;
/// Default rollout failure threshold.
const DEFAULT_FAILURE_THRESHOLD: f64 = 0.05;
/// Default stall alert deadline in milliseconds.
const DEFAULT_STALL_ALERT_AFTER_MS: u64 = 24 * 60 * 60_000;
/// Default optimistic-concurrency retry limit per tick.
const DEFAULT_OCC_RETRY_LIMIT: u32 = 5;
/// Default tenant worker shard count.
const DEFAULT_WORKER_SHARDS: usize = 4;
/// Default initial transient backoff in milliseconds.
const DEFAULT_BACKOFF_INITIAL_MS: u64 = 500;
/// Default transient backoff ceiling in milliseconds.
const DEFAULT_BACKOFF_CEILING_MS: u64 = 30_000;
/// Default outbox relay batch size.
const DEFAULT_OUTBOX_BATCH: usize = 64;
/// Default outbox relay poll interval in milliseconds.
const DEFAULT_OUTBOX_POLL_INTERVAL_MS: u64 = 1_000;

/// Minimum accepted tick interval in milliseconds.
const MIN_TICK_INTERVAL_MS: u64 = 1_000;
/// Maximum accepted tick interval in milliseconds.
const MAX_TICK_INTERVAL_MS: u64 = 3_600_000;
/// Minimum accepted tick deadline in milliseconds.
const MIN_TICK_DEADLINE_MS: u64 = 1_000;
/// Maximum accepted tick deadline in milliseconds.
const MAX_TICK_DEADLINE_MS: u64 = 600_000;
/// Maximum accepted assignment retry limit.
const MAX_MAX_RETRIES: u32 = 10;
/// Minimum accepted heartbeat deadline in milliseconds.
const MIN_HEARTBEAT_DEADLINE_MS: u64 = 60_000;
/// Maximum accepted worker shard count.
const MAX_WORKER_SHARDS: usize = 64;
/// Maximum accepted outbox batch size.
const MAX_OUTBOX_BATCH: usize = 4_096;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Reconcile loop configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ReconcileConfig {
    /// Periodic tick interval per tenant shard, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Deadline for one reconcile tick, in milliseconds.
    #[serde(default = "default_tick_deadline_ms")]
    pub tick_deadline_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            tick_deadline_ms: DEFAULT_TICK_DEADLINE_MS,
        }
    }
}

/// Assignment handling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AssignmentConfig {
    /// Maximum failed attempts before an assignment is terminal.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Heartbeat deadline for reconciling devices, in milliseconds.
    #[serde(default = "default_heartbeat_deadline_ms")]
    pub heartbeat_deadline_ms: u64,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            heartbeat_deadline_ms: DEFAULT_HEARTBEAT_DEADLINE_MS,
        }
    }
}

/// Rollout defaults.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RolloutSection {
    /// Failure threshold applied when a request omits one.
    #[serde(default = "default_failure_threshold")]
    pub default_failure_threshold: f64,
    /// Stall alert deadline for in-progress phases, in milliseconds.
    #[serde(default = "default_stall_alert_after_ms")]
    pub stall_alert_after_ms: u64,
}

impl Default for RolloutSection {
    fn default() -> Self {
        Self {
            default_failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            stall_alert_after_ms: DEFAULT_STALL_ALERT_AFTER_MS,
        }
    }
}

/// Executor host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutorSection {
    /// Tenants this executor drives, as UUID strings.
    #[serde(default)]
    pub tenants: Vec<String>,
    /// Optimistic-concurrency retries per operation.
    #[serde(default = "default_occ_retry_limit")]
    pub occ_retry_limit: u32,
    /// Tenant worker shard count.
    #[serde(default = "default_worker_shards")]
    pub worker_shards: usize,
    /// Initial transient backoff, in milliseconds.
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    /// Transient backoff ceiling, in milliseconds.
    #[serde(default = "default_backoff_ceiling_ms")]
    pub backoff_ceiling_ms: u64,
    /// Outbox relay batch size.
    #[serde(default = "default_outbox_batch")]
    pub outbox_batch: usize,
    /// Outbox relay poll interval, in milliseconds.
    #[serde(default = "default_outbox_poll_interval_ms")]
    pub outbox_poll_interval_ms: u64,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            tenants: Vec::new(),
            occ_retry_limit: DEFAULT_OCC_RETRY_LIMIT,
            worker_shards: DEFAULT_WORKER_SHARDS,
            backoff_initial_ms: DEFAULT_BACKOFF_INITIAL_MS,
            backoff_ceiling_ms: DEFAULT_BACKOFF_CEILING_MS,
            outbox_batch: DEFAULT_OUTBOX_BATCH,
            outbox_poll_interval_ms: DEFAULT_OUTBOX_POLL_INTERVAL_MS,
        }
    }
}

/// Returns the default tick interval.
const fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

/// Returns the default tick deadline.
const fn default_tick_deadline_ms() -> u64 {
    DEFAULT_TICK_DEADLINE_MS
}

/// Returns the default retry limit.
const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Returns the default heartbeat deadline.
const fn default_heartbeat_deadline_ms() -> u64 {
    DEFAULT_HEARTBEAT_DEADLINE_MS
}

/// Returns the default failure threshold.
const fn default_failure_threshold() -> f64 {
    DEFAULT_FAILURE_THRESHOLD
}

/// Returns the default stall alert deadline.
const fn default_stall_alert_after_ms() -> u64 {
    DEFAULT_STALL_ALERT_AFTER_MS
}

/// Returns the default optimistic-concurrency retry limit.
const fn default_occ_retry_limit() -> u32 {
    DEFAULT_OCC_RETRY_LIMIT
}

/// Returns the default worker shard count.
const fn default_worker_shards() -> usize {
    DEFAULT_WORKER_SHARDS
}

/// Returns the default initial backoff.
const fn default_backoff_initial_ms() -> u64 {
    DEFAULT_BACKOFF_INITIAL_MS
}

/// Returns the default backoff ceiling.
const fn default_backoff_ceiling_ms() -> u64 {
    DEFAULT_BACKOFF_CEILING_MS
}

/// Returns the default outbox batch size.
const fn default_outbox_batch() -> usize {
    DEFAULT_OUTBOX_BATCH
}

/// Returns the default outbox poll interval.
const fn default_outbox_poll_interval_ms() -> u64 {
    DEFAULT_OUTBOX_POLL_INTERVAL_MS
}

/// Returns the default store path.
fn default_store_path() -> PathBuf {
    PathBuf::from("signalbeam.db")
}

/// SignalBeam configuration root.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalBeamConfig {
    /// Reconcile loop configuration.
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    /// Assignment handling configuration.
    #[serde(default)]
    pub assignment: AssignmentConfig,
    /// Rollout defaults.
    #[serde(default)]
    pub rollout: RolloutSection,
    /// Executor host configuration.
    #[serde(default)]
    pub executor: ExecutorSection,
    /// SQLite store configuration.
    #[serde(default = "default_store_config")]
    pub store: SqliteStoreConfig,
}

/// Returns the default store configuration.
fn default_store_config() -> SqliteStoreConfig {
    SqliteStoreConfig {
        path: default_store_path(),
        busy_timeout_ms: 5_000,
        journal_mode: signalbeam_store_sqlite::SqliteStoreMode::Wal,
        sync_mode: signalbeam_store_sqlite::SqliteSyncMode::Full,
    }
}

impl Default for SignalBeamConfig {
    fn default() -> Self {
        Self {
            reconcile: ReconcileConfig::default(),
            assignment: AssignmentConfig::default(),
            rollout: RolloutSection::default(),
            executor: ExecutorSection::default(),
            store: default_store_config(),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Config file exceeded the size limit.
    #[error("config file too large: {actual_bytes} bytes (max {MAX_CONFIG_FILE_SIZE})")]
    TooLarge {
        /// Actual file size in bytes.
        actual_bytes: u64,
    },
    /// Config file failed to parse.
    #[error("config parse error: {0}")]
    Parse(String),
    /// A config value was out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted field path.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl SignalBeamConfig {
    /// Loads configuration from the given path, the `SIGNALBEAM_CONFIG`
    /// environment variable, or `signalbeam.toml`, in that order.
    ///
    /// A missing file yields the documented defaults; an unreadable or
    /// invalid file fails closed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is oversized, unparseable, or
    /// holds out-of-range values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = path.map_or_else(
            || env::var(CONFIG_ENV_VAR).map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_NAME), PathBuf::from),
            Path::to_path_buf,
        );

        if !resolved.exists() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let metadata = fs::metadata(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge {
                actual_bytes: metadata.len(),
            });
        }

        let text = fs::read_to_string(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        let config: Self = toml::from_str(&text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from TOML text, applying validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every range limit.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        range_check(
            "reconcile.tick_interval_ms",
            self.reconcile.tick_interval_ms,
            MIN_TICK_INTERVAL_MS,
            MAX_TICK_INTERVAL_MS,
        )?;
        range_check(
            "reconcile.tick_deadline_ms",
            self.reconcile.tick_deadline_ms,
            MIN_TICK_DEADLINE_MS,
            MAX_TICK_DEADLINE_MS,
        )?;
        if self.assignment.max_retries == 0 || self.assignment.max_retries > MAX_MAX_RETRIES {
            return Err(ConfigError::Invalid {
                field: "assignment.max_retries",
                reason: format!(
                    "{} is outside [1, {MAX_MAX_RETRIES}]",
                    self.assignment.max_retries
                ),
            });
        }
        if self.assignment.heartbeat_deadline_ms < MIN_HEARTBEAT_DEADLINE_MS {
            return Err(ConfigError::Invalid {
                field: "assignment.heartbeat_deadline_ms",
                reason: format!(
                    "{} is below the minimum {MIN_HEARTBEAT_DEADLINE_MS}",
                    self.assignment.heartbeat_deadline_ms
                ),
            });
        }
        let threshold = self.rollout.default_failure_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid {
                field: "rollout.default_failure_threshold",
                reason: format!("{threshold} is outside [0, 1]"),
            });
        }
        if self.executor.occ_retry_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "executor.occ_retry_limit",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.executor.worker_shards == 0 || self.executor.worker_shards > MAX_WORKER_SHARDS {
            return Err(ConfigError::Invalid {
                field: "executor.worker_shards",
                reason: format!(
                    "{} is outside [1, {MAX_WORKER_SHARDS}]",
                    self.executor.worker_shards
                ),
            });
        }
        if self.executor.backoff_initial_ms == 0
            || self.executor.backoff_ceiling_ms < self.executor.backoff_initial_ms
        {
            return Err(ConfigError::Invalid {
                field: "executor.backoff_ceiling_ms",
                reason: "backoff ceiling must be at least the initial backoff".to_string(),
            });
        }
        if self.executor.outbox_batch == 0 || self.executor.outbox_batch > MAX_OUTBOX_BATCH {
            return Err(ConfigError::Invalid {
                field: "executor.outbox_batch",
                reason: format!("{} is outside [1, {MAX_OUTBOX_BATCH}]", self.executor.outbox_batch),
            });
        }
        for tenant in &self.executor.tenants {
            if tenant.parse::<TenantId>().is_err() {
                return Err(ConfigError::Invalid {
                    field: "executor.tenants",
                    reason: format!("{tenant:?} is not a UUID"),
                });
            }
        }
        Ok(())
    }

    /// Returns the configured tenants as parsed identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when an entry is not a UUID.
    pub fn executor_tenants(&self) -> Result<Vec<TenantId>, ConfigError> {
        self.executor
            .tenants
            .iter()
            .map(|tenant| {
                tenant.parse::<TenantId>().map_err(|_| ConfigError::Invalid {
                    field: "executor.tenants",
                    reason: format!("{tenant:?} is not a UUID"),
                })
            })
            .collect()
    }

    /// Builds the core executor configuration from this config.
    #[must_use]
    pub const fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_assignment_retries: self.assignment.max_retries,
            heartbeat_deadline: DurationMillis::new(self.assignment.heartbeat_deadline_ms),
            stall_alert_after: DurationMillis::new(self.rollout.stall_alert_after_ms),
        }
    }

    /// Builds the planner configuration from this config.
    #[must_use]
    pub const fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            default_failure_threshold: self.rollout.default_failure_threshold,
        }
    }
}

/// Checks a numeric field against an inclusive range.
fn range_check(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{value} is outside [{min}, {max}]"),
        });
    }
    Ok(())
}
