//! JSON contract of the folio-offline control endpoints.
//!
//! `POST /__worker/message` accepts a [`WorkerMessage`];
//! `GET /__worker/status` returns a [`WorkerStatus`].

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Message posted to the worker by a controlled page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// Activate the waiting worker without waiting for clients to close.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
    /// Any other directive; accepted and ignored.
    #[serde(other)]
    Unknown,
}

/// Lifecycle state of a single worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Installing,
    Waiting,
    Active,
    Redundant,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Installing => "installing",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Active => "active",
            LifecycleState::Redundant => "redundant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub id: Uuid,
    pub version: String,
    pub state: LifecycleState,
    #[serde(with = "time::serde::rfc3339::option")]
    pub activated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSummary {
    pub name: String,
    pub entries: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub active: Option<WorkerSummary>,
    pub waiting: Option<WorkerSummary>,
    pub namespaces: Vec<NamespaceSummary>,
}

/// Response body of `POST /__worker/message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAck {
    pub accepted: bool,
    pub activated: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_waiting_uses_type_tag() {
        let message: WorkerMessage =
            serde_json::from_str(r#"{"type":"SKIP_WAITING"}"#).expect("valid message");
        assert_eq!(message, WorkerMessage::SkipWaiting);

        let encoded = serde_json::to_string(&WorkerMessage::SkipWaiting).expect("encode");
        assert_eq!(encoded, r#"{"type":"SKIP_WAITING"}"#);
    }

    #[test]
    fn unknown_directive_is_tolerated() {
        let message: WorkerMessage =
            serde_json::from_str(r#"{"type":"REFRESH_ALL"}"#).expect("tolerated message");
        assert_eq!(message, WorkerMessage::Unknown);
    }

    #[test]
    fn lifecycle_state_is_snake_case() {
        let encoded = serde_json::to_string(&LifecycleState::Redundant).expect("encode");
        assert_eq!(encoded, r#""redundant""#);
        assert_eq!(LifecycleState::Waiting.as_str(), "waiting");
    }
}
