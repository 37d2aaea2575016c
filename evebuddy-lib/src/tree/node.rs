//! Node addressing

/// String key addressing a node within a [`Forest`](super::Forest).
pub type Uid = String;

/// Root sentinel. Used as parent for top-level nodes, never stored itself.
pub const ROOT_UID: &str = "";

/// A value that knows its own UID.
///
/// Screens usually derive the UID from composite keys, e.g.
/// `"{character_id}-{container_id}-{variant}"`.
pub trait TreeNode {
    /// Returns the UID of this node. Must not be empty.
    fn uid(&self) -> Uid;
}
