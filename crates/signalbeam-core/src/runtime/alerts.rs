// signalbeam-core/src/runtime/alerts.rs
// ============================================================================
// Module: SignalBeam Alert Engine
// Description: Deduplicating alert producer for rollout signals.
// Purpose: Turn rollout signals into at-most-one active alert per key and
// drive the alert lifecycle.
// Dependencies: crate::{core, interfaces}, thiserror
// ============================================================================

//! ## Overview
//! The alert engine consumes rollout signals. A signal whose key already
//! has an `Active` alert refreshes `last_seen_at`; anything else raises a
//! fresh alert. `Resolved` is terminal, so a later signal with the same key
//! opens a new alert. Consumers of bus events must tolerate duplicate
//! signals; deduplication happens here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::Alert;
use crate::core::AlertId;
use crate::core::AlertSignal;
use crate::core::AlertStatus;
use crate::core::Classify;
use crate::core::DomainEvent;
use crate::core::ErrorClass;
use crate::core::Timestamp;
use crate::interfaces::AlertStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Outcomes and Errors
// ============================================================================

/// Outcome of observing one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    /// A new alert was raised.
    Raised(AlertId),
    /// An existing active alert was refreshed.
    Refreshed(AlertId),
}

impl AlertOutcome {
    /// Returns the alert identifier of this outcome.
    #[must_use]
    pub const fn alert_id(&self) -> AlertId {
        match self {
            Self::Raised(id) | Self::Refreshed(id) => *id,
        }
    }
}

/// Errors produced by the alert engine.
#[derive(Debug, Error)]
pub enum AlertEngineError {
    /// The alert does not exist.
    #[error("alert not found: {0}")]
    AlertNotFound(AlertId),
    /// The lifecycle transition is not valid from the current status.
    #[error("cannot {action} alert {alert_id} in status {status:?}")]
    InvalidTransition {
        /// Target alert.
        alert_id: AlertId,
        /// Status at load time.
        status: AlertStatus,
        /// Attempted action.
        action: &'static str,
    },
    /// Alert store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Classify for AlertEngineError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::AlertNotFound(_) => ErrorClass::NotFound,
            Self::InvalidTransition {
                ..
            } => ErrorClass::Conflict,
            Self::Store(err) => err.class(),
        }
    }
}

// ============================================================================
// SECTION: Alert Engine
// ============================================================================

/// Deduplicating alert engine over an alert store.
pub struct AlertEngine<A> {
    /// Alert store.
    store: A,
}

impl<A: AlertStore> AlertEngine<A> {
    /// Creates an alert engine.
    pub const fn new(store: A) -> Self {
        Self {
            store,
        }
    }

    /// Observes a signal: refreshes the active alert for its key or raises
    /// a new one.
    ///
    /// # Errors
    ///
    /// Returns [`AlertEngineError`] when the store fails.
    pub fn observe(&self, signal: &AlertSignal) -> Result<AlertOutcome, AlertEngineError> {
        if let Some(mut existing) = self.store.find_active(&signal.key())? {
            existing.last_seen_at = signal.observed_at;
            self.store.upsert(&existing, &[])?;
            return Ok(AlertOutcome::Refreshed(existing.alert_id));
        }

        let alert = Alert {
            alert_id: AlertId::random(),
            tenant_id: signal.tenant_id,
            severity: signal.severity,
            alert_type: signal.alert_type,
            title: signal.title.clone(),
            description: signal.description.clone(),
            device_id: signal.device_id,
            rollout_id: signal.rollout_id,
            created_at: signal.observed_at,
            last_seen_at: signal.observed_at,
            status: AlertStatus::Active,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_at: None,
        };
        let raised = DomainEvent::AlertRaised {
            alert_id: alert.alert_id,
            tenant_id: alert.tenant_id,
            alert_type: alert.alert_type,
            severity: alert.severity,
            at: signal.observed_at,
        };
        self.store.upsert(&alert, &[raised])?;
        Ok(AlertOutcome::Raised(alert.alert_id))
    }

    /// Acknowledges an active alert.
    ///
    /// # Errors
    ///
    /// Returns [`AlertEngineError::InvalidTransition`] unless the alert is
    /// `Active`.
    pub fn acknowledge(
        &self,
        alert_id: AlertId,
        acknowledged_by: &str,
        now: Timestamp,
    ) -> Result<Alert, AlertEngineError> {
        let mut alert = self.load(alert_id)?;
        if alert.status != AlertStatus::Active {
            return Err(AlertEngineError::InvalidTransition {
                alert_id,
                status: alert.status,
                action: "acknowledge",
            });
        }

        alert.status = AlertStatus::Acknowledged;
        alert.acknowledged_by = Some(acknowledged_by.to_string());
        alert.acknowledged_at = Some(now);
        let event = DomainEvent::AlertAcknowledged {
            alert_id,
            tenant_id: alert.tenant_id,
            at: now,
        };
        self.store.upsert(&alert, &[event])?;
        Ok(alert)
    }

    /// Resolves an active or acknowledged alert. Resolution is terminal.
    ///
    /// # Errors
    ///
    /// Returns [`AlertEngineError::InvalidTransition`] when already
    /// resolved.
    pub fn resolve(&self, alert_id: AlertId, now: Timestamp) -> Result<Alert, AlertEngineError> {
        let mut alert = self.load(alert_id)?;
        if alert.status == AlertStatus::Resolved {
            return Err(AlertEngineError::InvalidTransition {
                alert_id,
                status: alert.status,
                action: "resolve",
            });
        }

        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(now);
        let event = DomainEvent::AlertResolved {
            alert_id,
            tenant_id: alert.tenant_id,
            at: now,
        };
        self.store.upsert(&alert, &[event])?;
        Ok(alert)
    }

    /// Loads an alert or reports it missing.
    fn load(&self, alert_id: AlertId) -> Result<Alert, AlertEngineError> {
        self.store.load(alert_id)?.ok_or(AlertEngineError::AlertNotFound(alert_id))
    }
}
