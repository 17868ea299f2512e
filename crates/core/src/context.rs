//! Request-scoped context: deadline, cancellation, and a trace id.
//!
//! A [`RequestContext`] is handed to every Unit of Work when it is opened. The
//! scope checks it before each store operation and at commit time, so a
//! cancelled or expired request rolls back instead of committing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone)]
pub struct RequestContext {
    trace_id: Uuid,
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl RequestContext {
    /// A context with no deadline that is only cancelled explicitly.
    pub fn background() -> Self {
        Self {
            trace_id: Uuid::now_v7(),
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().with_deadline(Instant::now() + timeout)
    }

    /// Tighten the deadline. A later deadline than the current one is ignored.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    pub fn with_trace_id(mut self, trace_id: Uuid) -> Self {
        self.trace_id = trace_id;
        self
    }

    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Cancel this context and every clone of it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with `Cancelled` if the context can no longer do work.
    pub fn ensure_active(&self) -> AuthResult<()> {
        if self.is_cancelled() {
            return Err(AuthError::cancelled("request cancelled"));
        }
        if self.is_expired() {
            return Err(AuthError::cancelled("request deadline exceeded"));
        }
        Ok(())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}
