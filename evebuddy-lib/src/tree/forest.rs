//! Thread-safe forest store

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use super::node::ROOT_UID;
use super::node::TreeNode;
use super::node::Uid;
use crate::error::TreeError;

// =============================================================================
// ForestConfig
// =============================================================================

/// Construction-time settings for a [`Forest`].
///
/// # Example
///
/// ```
/// use evebuddy_lib::tree::{Forest, ForestConfig};
///
/// let forest: Forest<String> = Forest::with_config(ForestConfig::default().with_separator('/'));
/// let uid = forest.add("", "alpha".to_string()).unwrap();
/// assert_eq!(uid, "/1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForestConfig {
    /// Separator between parent UID and counter in generated UIDs.
    ///
    /// Default: `-`
    pub separator: char,

    /// First value of the auto-UID counter.
    ///
    /// Default: 1
    pub first_id: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            separator: '-',
            first_id: 1,
        }
    }
}

impl ForestConfig {
    /// Sets the separator for generated UIDs.
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Sets the first value of the auto-UID counter.
    pub fn with_first_id(mut self, first_id: u64) -> Self {
        self.first_id = first_id;
        self
    }
}

// =============================================================================
// Forest
// =============================================================================

#[derive(Debug, Clone)]
struct ForestInner<T> {
    /// Child UIDs per parent, in insertion order. Keyed by [`ROOT_UID`] for the top level.
    children: HashMap<Uid, Vec<Uid>>,
    values: HashMap<Uid, T>,
    parents: HashMap<Uid, Uid>,
    next_id: u64,
}

impl<T> ForestInner<T> {
    fn new(first_id: u64) -> Self {
        Self {
            children: HashMap::new(),
            values: HashMap::new(),
            parents: HashMap::new(),
            next_id: first_id,
        }
    }

    fn check_parent(&self, parent: &str) -> Result<(), TreeError> {
        if parent != ROOT_UID && !self.values.contains_key(parent) {
            return Err(TreeError::ParentNotFound {
                parent: parent.to_string(),
            });
        }
        Ok(())
    }

    fn link(&mut self, parent: &str, uid: Uid, value: T) {
        self.children
            .entry(parent.to_string())
            .or_default()
            .push(uid.clone());
        self.parents.insert(uid.clone(), parent.to_string());
        self.values.insert(uid, value);
    }

    fn has_children(&self, uid: &str) -> bool {
        self.children.get(uid).is_some_and(|c| !c.is_empty())
    }
}

/// A collection of trees sharing one index.
///
/// `Forest` maps UIDs to values and parents to their ordered children.
/// Children are returned in the order they were added, which is also the
/// order they are rendered in.
///
/// Nodes are added below [`ROOT_UID`] or below an existing node, and every
/// UID can only be added once, so the structure can never contain a cycle.
///
/// All operations go through one reader/writer lock: a forest can be
/// populated on a worker thread while other threads query it.
///
/// # Example
///
/// ```
/// use evebuddy_lib::tree::{Forest, ROOT_UID};
///
/// let forest = Forest::new();
/// let alpha = forest.add(ROOT_UID, "alpha").unwrap();
/// let beta = forest.add(&alpha, "beta").unwrap();
///
/// assert_eq!(alpha, "-1");
/// assert_eq!(beta, "-1-2");
/// assert_eq!(forest.child_uids(ROOT_UID), vec!["-1"]);
/// assert_eq!(forest.value("-1-2"), "beta");
/// ```
#[derive(Debug)]
pub struct Forest<T> {
    inner: RwLock<ForestInner<T>>,
    config: ForestConfig,
}

impl<T> Forest<T> {
    /// Creates an empty forest with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ForestConfig::default())
    }

    /// Creates an empty forest with the given configuration.
    pub fn with_config(config: ForestConfig) -> Self {
        Self {
            inner: RwLock::new(ForestInner::new(config.first_id)),
            config,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Insertion
    // -------------------------------------------------------------------------

    /// Adds a node with a generated UID and returns that UID.
    ///
    /// The UID is the parent UID, the separator and the next value of a
    /// store-wide counter, so `add("", a)` followed by `add("-1", b)`
    /// yields `"-1"` and `"-1-2"`.
    ///
    /// Fails with [`TreeError::ParentNotFound`] when `parent` is unknown.
    pub fn add(&self, parent: &str, value: T) -> Result<Uid, TreeError> {
        let mut guard = self.inner.write().map_err(|_| TreeError::Poisoned)?;
        guard.check_parent(parent)?;
        // Skip counter values already taken by explicit UIDs.
        let uid = loop {
            let candidate = format!("{}{}{}", parent, self.config.separator, guard.next_id);
            guard.next_id += 1;
            if !guard.values.contains_key(&candidate) {
                break candidate;
            }
        };
        guard.link(parent, uid.clone(), value);
        Ok(uid)
    }

    /// Adds a node under an explicit UID and returns it.
    ///
    /// Fails with [`TreeError::ParentNotFound`] when `parent` is unknown,
    /// [`TreeError::DuplicateUid`] when `uid` already exists and
    /// [`TreeError::EmptyUid`] when `uid` is the root sentinel.
    pub fn add_with_uid(
        &self,
        parent: &str,
        uid: impl Into<Uid>,
        value: T,
    ) -> Result<Uid, TreeError> {
        let uid = uid.into();
        if uid == ROOT_UID {
            return Err(TreeError::EmptyUid);
        }
        let mut guard = self.inner.write().map_err(|_| TreeError::Poisoned)?;
        guard.check_parent(parent)?;
        if guard.values.contains_key(&uid) {
            return Err(TreeError::DuplicateUid { uid });
        }
        guard.link(parent, uid.clone(), value);
        Ok(uid)
    }

    /// Adds a node with a generated UID.
    ///
    /// # Panics
    ///
    /// Panics when the parent does not exist.
    pub fn must_add(&self, parent: &str, value: T) -> Uid {
        match self.add(parent, value) {
            Ok(uid) => uid,
            Err(e) => panic!("forest: {e}"),
        }
    }

    /// Adds a node under an explicit UID.
    ///
    /// # Panics
    ///
    /// Panics when [`add_with_uid`](Self::add_with_uid) would return an error.
    pub fn must_add_with_uid(&self, parent: &str, uid: impl Into<Uid>, value: T) -> Uid {
        match self.add_with_uid(parent, uid, value) {
            Ok(uid) => uid,
            Err(e) => panic!("forest: {e}"),
        }
    }

    /// Marks a node as branch without adding children.
    ///
    /// Childless nodes are leaves by default. A node marked this way is
    /// reported by [`is_branch`](Self::is_branch) and renders expandable.
    pub fn set_branch(&self, uid: &str) -> Result<(), TreeError> {
        let mut guard = self.inner.write().map_err(|_| TreeError::Poisoned)?;
        if uid != ROOT_UID && !guard.values.contains_key(uid) {
            return Err(TreeError::NodeNotFound {
                uid: uid.to_string(),
            });
        }
        guard.children.entry(uid.to_string()).or_default();
        Ok(())
    }

    /// Removes all nodes and resets the UID counter.
    pub fn clear(&self) {
        {
            let mut guard = match self.inner.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = ForestInner::new(self.config.first_id);
        }
        self.inner.clear_poison();
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Returns the children of a node in insertion order.
    ///
    /// Use [`ROOT_UID`] for the top level. Unknown and childless nodes
    /// return an empty list.
    pub fn child_uids(&self, uid: &str) -> Vec<Uid> {
        self.inner
            .read()
            .map(|g| g.children.get(uid).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Reports whether a node is a branch, i.e. has a child list.
    pub fn is_branch(&self, uid: &str) -> bool {
        self.inner
            .read()
            .map(|g| g.children.contains_key(uid))
            .unwrap_or(false)
    }

    /// Reports whether a node exists. The root is not a node.
    pub fn contains(&self, uid: &str) -> bool {
        self.inner
            .read()
            .map(|g| g.values.contains_key(uid))
            .unwrap_or(false)
    }

    /// Returns the parent UID of a node, [`ROOT_UID`] for top-level nodes.
    pub fn parent(&self, uid: &str) -> Option<Uid> {
        self.inner.read().ok().and_then(|g| g.parents.get(uid).cloned())
    }

    /// Returns the ancestors of a node, from the top level down to its parent.
    pub fn path(&self, uid: &str) -> Vec<Uid> {
        let Ok(guard) = self.inner.read() else {
            return Vec::new();
        };
        let mut path = Vec::new();
        let mut current = uid;
        while let Some(parent) = guard.parents.get(current) {
            if parent == ROOT_UID {
                break;
            }
            path.push(parent.clone());
            current = parent.as_str();
        }
        path.reverse();
        path
    }

    /// Returns the UIDs below a node in depth-first pre-order.
    ///
    /// The node itself is not included. Use [`ROOT_UID`] for the whole forest.
    pub fn walk(&self, uid: &str) -> Vec<Uid> {
        let Ok(guard) = self.inner.read() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut stack: Vec<&Uid> = match guard.children.get(uid) {
            Some(children) => children.iter().rev().collect(),
            None => return out,
        };
        while let Some(current) = stack.pop() {
            out.push(current.clone());
            if let Some(children) = guard.children.get(current) {
                stack.extend(children.iter().rev());
            }
        }
        out
    }

    /// Returns the paths to all leaves below a node.
    ///
    /// Each path lists the UIDs from just below `uid` down to the leaf
    /// itself, in depth-first order. Nodes marked with
    /// [`set_branch`](Self::set_branch) but without children count as leaves.
    pub fn leaf_paths(&self, uid: &str) -> Vec<Vec<Uid>> {
        let Ok(guard) = self.inner.read() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut stack: Vec<(Vec<Uid>, &Uid)> = match guard.children.get(uid) {
            Some(children) => children.iter().rev().map(|c| (Vec::new(), c)).collect(),
            None => return out,
        };
        while let Some((mut path, current)) = stack.pop() {
            path.push(current.clone());
            match guard.children.get(current).filter(|c| !c.is_empty()) {
                Some(children) => {
                    stack.extend(children.iter().rev().map(|c| (path.clone(), c)));
                }
                None => out.push(path),
            }
        }
        out
    }

    /// Returns the number of nodes.
    pub fn len(&self) -> usize {
        self.inner.read().map(|g| g.values.len()).unwrap_or(0)
    }

    /// Reports whether the forest has no nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Forest<T> {
    /// Returns a node's value, or `None` if it does not exist.
    ///
    /// Views should prefer this over [`value`](Self::value): a UID handed
    /// back by a widget may belong to a snapshot that has been replaced.
    pub fn get(&self, uid: &str) -> Option<T> {
        self.inner.read().ok().and_then(|g| g.values.get(uid).cloned())
    }

    /// Returns all values in no particular order.
    pub fn values(&self) -> Vec<T> {
        self.inner
            .read()
            .map(|g| g.values.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl<T: Clone + Default> Forest<T> {
    /// Returns a node's value, or `T::default()` if it does not exist.
    pub fn value(&self, uid: &str) -> T {
        self.get(uid).unwrap_or_default()
    }
}

impl<T: TreeNode> Forest<T> {
    /// Adds a node under the UID it reports itself.
    ///
    /// Same errors as [`add_with_uid`](Self::add_with_uid).
    pub fn insert(&self, parent: &str, node: T) -> Result<Uid, TreeError> {
        let uid = node.uid();
        self.add_with_uid(parent, uid, node)
    }

    /// Adds a node under the UID it reports itself.
    ///
    /// # Panics
    ///
    /// Panics when [`insert`](Self::insert) would return an error.
    pub fn must_insert(&self, parent: &str, node: T) -> Uid {
        match self.insert(parent, node) {
            Ok(uid) => uid,
            Err(e) => panic!("forest: {e}"),
        }
    }
}

/// Draws the forest as an indented outline, one node per line.
///
/// ```
/// use evebuddy_lib::tree::{Forest, ROOT_UID};
///
/// let forest = Forest::new();
/// let jita = forest.add(ROOT_UID, "Jita").unwrap();
/// forest.add(&jita, "Rifter").unwrap();
/// forest.add(ROOT_UID, "Amarr").unwrap();
///
/// assert_eq!(forest.to_string(), "+- Jita\n|  +- Rifter\n+- Amarr\n");
/// ```
impl<T: fmt::Display> fmt::Display for Forest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut stack: Vec<(String, &Uid, bool)> = Vec::new();
        if let Some(top) = guard.children.get(ROOT_UID) {
            for (i, uid) in top.iter().enumerate().rev() {
                stack.push((String::new(), uid, i + 1 == top.len()));
            }
        }
        while let Some((indent, uid, last)) = stack.pop() {
            match guard.values.get(uid) {
                Some(value) => writeln!(f, "{indent}+- {value}")?,
                None => writeln!(f, "{indent}+- {uid}")?,
            }
            if !guard.has_children(uid) {
                continue;
            }
            let child_indent = format!("{indent}{}", if last { "   " } else { "|  " });
            if let Some(children) = guard.children.get(uid) {
                for (i, child) in children.iter().enumerate().rev() {
                    stack.push((child_indent.clone(), child, i + 1 == children.len()));
                }
            }
        }
        Ok(())
    }
}

impl<T> Default for Forest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for Forest<T> {
    fn clone(&self) -> Self {
        let inner = match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        Self {
            inner: RwLock::new(inner),
            config: self.config.clone(),
        }
    }
}
