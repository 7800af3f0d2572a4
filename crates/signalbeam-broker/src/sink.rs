// signalbeam-broker/src/sink.rs
// ============================================================================
// Module: Event Sinks
// Description: Delivery targets for published domain events.
// Purpose: Define the sink contract plus the in-memory and tracing sinks.
// Dependencies: async-trait, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! A sink delivers one event payload to one subject. Sinks must preserve
//! per-subject ordering for a single publisher and may be invoked more than
//! once for the same row; downstream consumers deduplicate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Sink Errors
// ============================================================================

/// Errors returned by event sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The bus is unreachable; safe to retry.
    #[error("sink unavailable: {0}")]
    Unavailable(String),
    /// The bus rejected the payload; retrying will not help.
    #[error("sink rejected payload: {0}")]
    Rejected(String),
}

// ============================================================================
// SECTION: Sink Contract
// ============================================================================

/// Delivery target for published events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publishes one payload on a subject.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when delivery fails.
    async fn publish(&self, subject: &str, payload: &Value) -> Result<(), SinkError>;
}

// ============================================================================
// SECTION: Memory Sink
// ============================================================================

/// In-memory sink collecting published events, for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    /// Published `(subject, payload)` pairs in delivery order.
    published: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything published so far, in delivery order.
    #[must_use]
    pub fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().map_or_else(|_| Vec::new(), |guard| guard.clone())
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn publish(&self, subject: &str, payload: &Value) -> Result<(), SinkError> {
        let mut guard = self
            .published
            .lock()
            .map_err(|_| SinkError::Unavailable("memory sink lock poisoned".to_string()))?;
        guard.push((subject.to_string(), payload.clone()));
        Ok(())
    }
}

// ============================================================================
// SECTION: Tracing Sink
// ============================================================================

/// Sink that logs each event through `tracing`, for local operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn publish(&self, subject: &str, payload: &Value) -> Result<(), SinkError> {
        tracing::info!(subject, %payload, "event published");
        Ok(())
    }
}
