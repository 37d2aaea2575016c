//! Forest store error types

/// Errors returned when adding nodes to a [`Forest`](crate::tree::Forest).
///
/// All of these are precondition violations by the caller. A failed add
/// leaves the forest unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// The parent UID is neither the root nor an existing node.
    #[error("parent node does not exist: {parent:?}")]
    ParentNotFound { parent: String },

    /// A node with this UID has already been added.
    #[error("node already exists: {uid:?}")]
    DuplicateUid { uid: String },

    /// The root sentinel can not be used as a node UID.
    #[error("node UID must not be empty")]
    EmptyUid,

    /// The referenced node does not exist.
    #[error("node does not exist: {uid:?}")]
    NodeNotFound { uid: String },

    /// A writer panicked while holding the forest lock.
    #[error("forest lock poisoned")]
    Poisoned,
}
