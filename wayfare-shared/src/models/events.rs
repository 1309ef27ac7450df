use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "SUCCESS",
            AuditOutcome::Failed => "FAILED",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit trail entry. Written by session and reservation
/// operations, read only by reporting tools outside this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub actor: String,
    pub action: String,
    pub detail: String,
    pub outcome: AuditOutcome,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub origin: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(actor: impl Into<String>, action: &str, detail: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self {
            actor: actor.into(),
            action: action.to_string(),
            detail: detail.into(),
            outcome,
            resource_type: None,
            resource_id: None,
            origin: None,
            timestamp: Utc::now(),
        }
    }

    pub fn success(actor: impl Into<String>, action: &str, detail: impl Into<String>) -> Self {
        Self::new(actor, action, detail, AuditOutcome::Success)
    }

    pub fn failed(actor: impl Into<String>, action: &str, detail: impl Into<String>) -> Self {
        Self::new(actor, action, detail, AuditOutcome::Failed)
    }

    pub fn resource(mut self, resource_type: &str, resource_id: impl ToString) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }
}
