//! Error types for the switchyard runtime
//!
//! Every failure the runtime reports is recoverable and carries enough
//! text for a front-end to surface it verbatim. `Error::kind` folds the
//! variants onto the five-way taxonomy callers branch on.

use crate::tree::TreeError;
use thiserror::Error;

/// Coarse classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown id, name, label or kind
    NotFound,
    /// Name collision
    AlreadyExists,
    /// Operation not allowed in the current state
    InvalidState,
    /// A string could not be read as the expected value
    ParseFailure,
    /// Construction failed because an external dependency is missing
    ResourceUnavailable,
}

/// Top-level runtime error
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// No factory registered for this kind
    #[error("unknown kind: {0}")]
    UnknownKind(String),

    /// No live component with this id or name
    #[error("component {0} not found")]
    ComponentNotFound(String),

    /// No property with this id or name
    #[error("property {0} not found")]
    PropertyNotFound(String),

    /// No method with this id or name
    #[error("method {0} not found")]
    MethodNotFound(String),

    /// No signal with this name
    #[error("signal {0} not found")]
    SignalNotFound(String),

    /// No port with this id or label
    #[error("port {0} not found")]
    PortNotFound(String),

    /// A live component already uses this name
    #[error("name already in use: {0}")]
    NameInUse(String),

    /// A property, method or signal name is already registered in the bag
    #[error("{0} is already registered")]
    AlreadyRegistered(String),

    /// The property or method is disabled
    #[error("{0} is disabled")]
    Disabled(String),

    /// The property has no setter
    #[error("property {0} is read-only")]
    ReadOnly(String),

    /// Value outside the declared bounds
    #[error("value {value} out of range for {name} [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: String,
        min: String,
        max: String,
    },

    /// The component-supplied setter or hook refused the request
    #[error("rejected: {0}")]
    Rejected(String),

    /// Follower port already bound
    #[error("follower {0} is already connected")]
    AlreadyConnected(String),

    /// Follower port has no connection
    #[error("follower {0} is not connected")]
    NotConnected(String),

    /// Writer and follower capabilities do not intersect
    #[error("capability mismatch: writer offers [{writer}], follower accepts [{follower}]")]
    CapabilityMismatch { writer: String, follower: String },

    /// The same writer is already bound to an instance of this meta follower
    #[error("writer {writer} already feeds meta follower {follower}")]
    DuplicateMetaConnection { writer: String, follower: String },

    /// Type mismatch between a value and its destination
    #[error("type mismatch for {name}: expected {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    /// A string could not be parsed
    #[error("cannot parse {what}: {reason}")]
    Parse { what: String, reason: String },

    /// Malformed connection specification
    #[error("invalid connection spec: {0}")]
    InvalidSpec(String),

    /// Tree access failure
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Component construction failed for an external reason
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// The component was removed while the call was in flight
    #[error("component {0} is shutting down")]
    ShuttingDown(String),
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownKind(_)
            | Error::ComponentNotFound(_)
            | Error::PropertyNotFound(_)
            | Error::MethodNotFound(_)
            | Error::SignalNotFound(_)
            | Error::PortNotFound(_) => ErrorKind::NotFound,
            Error::NameInUse(_) | Error::AlreadyRegistered(_) => ErrorKind::AlreadyExists,
            Error::Disabled(_)
            | Error::ReadOnly(_)
            | Error::OutOfRange { .. }
            | Error::Rejected(_)
            | Error::AlreadyConnected(_)
            | Error::NotConnected(_)
            | Error::CapabilityMismatch { .. }
            | Error::DuplicateMetaConnection { .. }
            | Error::ShuttingDown(_) => ErrorKind::InvalidState,
            Error::TypeMismatch { .. } | Error::Parse { .. } | Error::InvalidSpec(_) => {
                ErrorKind::ParseFailure
            }
            Error::Tree(TreeError::NotFound(_)) => ErrorKind::NotFound,
            Error::Tree(_) => ErrorKind::ParseFailure,
            Error::ResourceUnavailable(_) => ErrorKind::ResourceUnavailable,
        }
    }

    pub(crate) fn parse(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Parse {
            what: what.into(),
            reason: reason.into(),
        }
    }
}

/// Result type using the runtime error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(Error::UnknownKind("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(Error::NameInUse("a".into()).kind(), ErrorKind::AlreadyExists);
        assert_eq!(Error::Disabled("gain".into()).kind(), ErrorKind::InvalidState);
        assert_eq!(Error::parse("int", "junk").kind(), ErrorKind::ParseFailure);
        assert_eq!(
            Error::ResourceUnavailable("no device".into()).kind(),
            ErrorKind::ResourceUnavailable
        );
    }

    #[test]
    fn test_messages_are_verbatim() {
        let err = Error::Disabled("property gain".into());
        assert_eq!(err.to_string(), "property gain is disabled");
        let err = Error::from(TreeError::NotFound(".a.b".into()));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
