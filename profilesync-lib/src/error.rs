//! Fault taxonomy for the synchronization engine.
//!
//! Every gateway call and sync strategy reports failures as a [`SyncError`].
//! The reconciler uses [`SyncError::kind`] to decide whether a fault is
//! absorbed (missing collection), confined to one collection (validation),
//! or surfaced to the caller (everything else).

use crate::model::Collection;
use std::fmt;

/// Where a sync fault originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Scalar profile fields (bio, theme, visibility, ...)
    Profile,
    /// One of the child collections
    Collection(Collection),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Profile => write!(f, "profile"),
            Target::Collection(collection) => write!(f, "{}", collection),
        }
    }
}

impl From<Collection> for Target {
    fn from(collection: Collection) -> Self {
        Target::Collection(collection)
    }
}

/// A malformed value on a write path
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid {field} in {target}{}: {message}", position_suffix(.position))]
pub struct ValidationFault {
    /// Which part of the profile the value belongs to
    pub target: Target,
    /// Position of the offending row in the incoming array, if any
    pub position: Option<usize>,
    /// Field name, e.g. `target_amount`
    pub field: String,
    /// Human readable reason
    pub message: String,
}

fn position_suffix(position: &Option<usize>) -> String {
    match position {
        Some(index) => format!(" row {}", index),
        None => String::new(),
    }
}

impl ValidationFault {
    pub fn new(target: impl Into<Target>, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            position: None,
            field: field.into(),
            message: message.into(),
        }
    }

    /// Attach the row position the fault was found at
    pub fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }
}

/// Coarse classification used by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    MissingCollection,
    Validation,
    TransientIo,
    Unexpected,
}

/// Main error type for gateway calls and sync passes
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The storage backing this collection does not exist
    #[error("storage for {0} does not exist")]
    MissingCollection(Target),

    /// A value was rejected before or during the write
    #[error(transparent)]
    Validation(#[from] ValidationFault),

    /// Storage or network unavailable; the draft is kept for a retry
    #[error("storage unavailable while syncing {target}: {message}")]
    TransientIo { target: Target, message: String },

    /// Anything else
    #[error("unexpected failure while syncing {target}: {message}")]
    Unexpected { target: Target, message: String },
}

impl SyncError {
    pub fn transient(target: impl Into<Target>, message: impl fmt::Display) -> Self {
        SyncError::TransientIo {
            target: target.into(),
            message: message.to_string(),
        }
    }

    pub fn unexpected(target: impl Into<Target>, message: impl fmt::Display) -> Self {
        SyncError::Unexpected {
            target: target.into(),
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> FaultKind {
        match self {
            SyncError::MissingCollection(_) => FaultKind::MissingCollection,
            SyncError::Validation(_) => FaultKind::Validation,
            SyncError::TransientIo { .. } => FaultKind::TransientIo,
            SyncError::Unexpected { .. } => FaultKind::Unexpected,
        }
    }

    /// The part of the profile this fault belongs to
    pub fn target(&self) -> Target {
        match self {
            SyncError::MissingCollection(target) => *target,
            SyncError::Validation(fault) => fault.target,
            SyncError::TransientIo { target, .. } | SyncError::Unexpected { target, .. } => *target,
        }
    }

    pub fn is_missing_collection(&self) -> bool {
        self.kind() == FaultKind::MissingCollection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_fault_message() {
        let fault = ValidationFault::new(Collection::Goals, "target_amount", "must be a number").at(2);
        assert_eq!(
            fault.to_string(),
            "invalid target_amount in goals row 2: must be a number"
        );

        let fault = ValidationFault::new(Target::Profile, "theme_id", "unknown theme");
        assert_eq!(fault.to_string(), "invalid theme_id in profile: unknown theme");
    }

    #[test]
    fn test_fault_classification() {
        let missing = SyncError::MissingCollection(Collection::Goals.into());
        assert_eq!(missing.kind(), FaultKind::MissingCollection);
        assert!(missing.is_missing_collection());

        let io = SyncError::transient(Collection::SocialLinks, "connection reset");
        assert_eq!(io.kind(), FaultKind::TransientIo);
        assert_eq!(io.target(), Target::Collection(Collection::SocialLinks));

        let invalid: SyncError = ValidationFault::new(Collection::Goals, "current_amount", "NaN").into();
        assert_eq!(invalid.kind(), FaultKind::Validation);
        assert_eq!(invalid.target(), Target::Collection(Collection::Goals));
    }
}
