use thiserror::Error;

use crate::NodeRole;

/// Phrase the platform uses when a create collides with an existing object.
const ALREADY_EXISTS_PHRASE: &str = "already exists";

/// Errors surfaced by the platform boundary (list/create).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },
    #[error("platform call cancelled")]
    Cancelled,
    #[error("platform api error ({code} {reason}): {message}")]
    Api { code: u16, reason: String, message: String },
    #[error("platform transport error: {0}")]
    Transport(String),
}

impl PlatformError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, PlatformError::AlreadyExists { .. })
    }

    /// Classifies an untyped error message. Messages containing "already exists" are name
    /// collisions; everything else is a transport failure.
    pub fn from_message(kind: &str, name: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains(ALREADY_EXISTS_PHRASE) {
            PlatformError::AlreadyExists { kind: kind.to_string(), name: name.to_string() }
        } else {
            PlatformError::Transport(message)
        }
    }

    /// Classifies a structured API response. A typed `AlreadyExists` reason, or any message
    /// carrying the collision phrase whatever the status code, is a name collision.
    pub fn from_api(kind: &str, name: &str, code: u16, reason: &str, message: &str) -> Self {
        if reason == "AlreadyExists" || message.contains(ALREADY_EXISTS_PHRASE) {
            PlatformError::AlreadyExists { kind: kind.to_string(), name: name.to_string() }
        } else {
            PlatformError::Api { code, reason: reason.to_string(), message: message.to_string() }
        }
    }
}

/// Invalid desired topology.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("leader count must be at least 1")]
    ZeroLeaders,
    #[error("application label must not be empty")]
    EmptyApp,
    #[error("namespace must not be empty")]
    EmptyNamespace,
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: i64 },
}

/// Failure to derive a resource spec.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("leader index {index} out of range for {leaders} leaders")]
    IndexOutOfRange { index: u32, leaders: u32 },
    #[error("invalid resource name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("port {port} out of range 1..={max} (cluster bus listens at port + 10000)")]
    InvalidPort { port: i32, max: i32 },
}

/// Errors returned by one reconcile cycle. None of these are retried in-process; the
/// controller runtime requeues the object.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("listing {role} workloads failed: {source}")]
    PlatformQuery { role: NodeRole, source: PlatformError },
    #[error("applying {resource} failed: {source}")]
    ResourceApply { resource: String, source: PlatformError },
    #[error("deriving resource spec failed: {0}")]
    SpecDerivation(#[from] SpecError),
    #[error("invalid topology: {0}")]
    InvalidTopology(#[from] TopologyError),
    #[error("reconcile cancelled")]
    Cancelled,
}

impl ReconcileError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            ReconcileError::Cancelled => true,
            ReconcileError::PlatformQuery { source, .. } | ReconcileError::ResourceApply { source, .. } => {
                *source == PlatformError::Cancelled
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textual_collision_is_recognised() {
        let e = PlatformError::from_message("ConfigMap", "c", "configmaps \"c\" already exists");
        assert!(e.is_already_exists());
        let e = PlatformError::from_message("ConfigMap", "c", "connection refused");
        assert_eq!(e, PlatformError::Transport("connection refused".into()));
    }

    #[test]
    fn api_conflicts_other_than_collision_stay_api_errors() {
        assert!(PlatformError::from_api("Pod", "p", 409, "AlreadyExists", "pods \"p\" already exists").is_already_exists());
        let e = PlatformError::from_api("Pod", "p", 409, "Conflict", "the object has been modified");
        assert!(!e.is_already_exists());
        let e = PlatformError::from_api("Pod", "p", 403, "Forbidden", "forbidden");
        assert!(matches!(e, PlatformError::Api { code: 403, .. }));
    }

    #[test]
    fn collision_phrase_wins_over_status_code() {
        let e = PlatformError::from_api("Pod", "p", 500, "InternalError", "pods \"p\" already exists");
        assert_eq!(e, PlatformError::AlreadyExists { kind: "Pod".into(), name: "p".into() });
    }
}
