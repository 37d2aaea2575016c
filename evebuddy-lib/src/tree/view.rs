//! Tree adapter between a forest and a hierarchical view

use std::collections::HashSet;
use std::sync::Arc;

use super::forest::Forest;
use super::node::ROOT_UID;
use super::node::TreeNode;
use super::node::Uid;

// =============================================================================
// Rendering
// =============================================================================

/// Builds and updates the visual cells of a tree.
///
/// Cells are opaque to the view. They are created once per row slot and
/// then reused for whatever node ends up in that slot.
pub trait NodeRenderer<T> {
    /// The visual template for one row.
    type Cell;

    /// Creates a new cell template.
    fn create_cell(&self, is_branch: bool) -> Self::Cell;

    /// Updates a cell to show `node`.
    fn update_cell(&self, node: &T, is_branch: bool, cell: &mut Self::Cell);
}

/// A [`NodeRenderer`] made from a pair of closures.
pub struct FnRenderer<C, U> {
    create: C,
    update: U,
}

impl<C, U> FnRenderer<C, U> {
    /// Creates a renderer from a create and an update closure.
    pub fn new(create: C, update: U) -> Self {
        Self { create, update }
    }
}

impl<T, Cell, C, U> NodeRenderer<T> for FnRenderer<C, U>
where
    C: Fn(bool) -> Cell,
    U: Fn(&T, bool, &mut Cell),
{
    type Cell = Cell;

    fn create_cell(&self, is_branch: bool) -> Cell {
        (self.create)(is_branch)
    }

    fn update_cell(&self, node: &T, is_branch: bool, cell: &mut Cell) {
        (self.update)(node, is_branch, cell)
    }
}

/// A rendered row of the flattened tree.
#[derive(Debug, Clone)]
pub struct Row<C> {
    pub uid: Uid,
    /// Depth in the tree (0 = top level).
    pub depth: usize,
    pub is_branch: bool,
    pub is_open: bool,
    pub is_selected: bool,
    pub cell: C,
}

// =============================================================================
// TreeView
// =============================================================================

type SelectedHandler<T> = Box<dyn FnMut(&T)>;

/// A tree view backed by a [`Forest`] snapshot.
///
/// `TreeView` answers the questions a hierarchical widget asks
/// ([`child_uids`](Self::child_uids), [`is_branch`](Self::is_branch),
/// [`update_node`](Self::update_node)) and keeps the view state: open
/// branches, selection and scroll position. Node-level methods derive the
/// UID through [`TreeNode::uid`].
///
/// The data is replaced as a whole with [`set`](Self::set). Because the
/// visible tree and the latest snapshot can briefly disagree, UIDs that no
/// longer resolve are ignored everywhere.
///
/// The view is driven from a single UI thread. Only the forest is shared.
///
/// # Example
///
/// ```
/// use evebuddy_lib::tree::{Forest, TreeNode, TreeView, ROOT_UID};
///
/// #[derive(Clone)]
/// struct Location(String);
///
/// impl TreeNode for Location {
///     fn uid(&self) -> String {
///         self.0.clone()
///     }
/// }
///
/// let mut view = TreeView::new(
///     |_is_branch| String::new(),
///     |node: &Location, _is_branch, cell: &mut String| *cell = node.0.clone(),
/// );
///
/// let forest = Forest::new();
/// let jita = forest.must_insert(ROOT_UID, Location("Jita".into()));
/// forest.must_insert(&jita, Location("Hangar".into()));
/// view.set(forest);
/// view.open_branch(&Location("Jita".into()));
///
/// let labels: Vec<_> = view.render().iter().map(|r| r.cell.clone()).collect();
/// assert_eq!(labels, vec!["Jita", "Hangar"]);
/// ```
pub struct TreeView<T, R: NodeRenderer<T>> {
    data: Arc<Forest<T>>,
    renderer: R,
    open: HashSet<Uid>,
    selected: Option<Uid>,
    scroll_offset: usize,
    rows: Vec<Row<R::Cell>>,
    dirty: bool,
    on_selected: Option<SelectedHandler<T>>,
}

impl<T, Cell, C, U> TreeView<T, FnRenderer<C, U>>
where
    T: TreeNode + Clone,
    C: Fn(bool) -> Cell,
    U: Fn(&T, bool, &mut Cell),
{
    /// Creates an empty view from a create and an update closure.
    pub fn new(create: C, update: U) -> Self {
        Self::with_renderer(FnRenderer::new(create, update))
    }
}

impl<T, R> TreeView<T, R>
where
    T: TreeNode + Clone,
    R: NodeRenderer<T>,
{
    /// Creates an empty view with the given renderer.
    pub fn with_renderer(renderer: R) -> Self {
        Self {
            data: Arc::new(Forest::new()),
            renderer,
            open: HashSet::new(),
            selected: None,
            scroll_offset: 0,
            rows: Vec::new(),
            dirty: true,
            on_selected: None,
        }
    }

    /// Sets the handler called when a node gets selected.
    pub fn set_on_selected(&mut self, handler: impl FnMut(&T) + 'static) {
        self.on_selected = Some(Box::new(handler));
    }

    // -------------------------------------------------------------------------
    // Data
    // -------------------------------------------------------------------------

    /// Replaces the tree data and schedules a full re-render.
    ///
    /// Open branches are kept by UID. Open branches and a selection that
    /// do not exist in the new snapshot are dropped.
    pub fn set(&mut self, data: impl Into<Arc<Forest<T>>>) {
        self.data = data.into();
        let data = &self.data;
        self.open.retain(|uid| data.contains(uid));
        if self
            .selected
            .as_deref()
            .is_some_and(|uid| !self.data.contains(uid))
        {
            self.selected = None;
        }
        self.dirty = true;
    }

    /// Replaces the tree data with an empty forest.
    pub fn clear(&mut self) {
        self.set(Forest::<T>::new());
    }

    /// Returns the current snapshot.
    pub fn data(&self) -> Arc<Forest<T>> {
        Arc::clone(&self.data)
    }

    // -------------------------------------------------------------------------
    // Widget contract
    // -------------------------------------------------------------------------

    /// Returns the children of a UID in rendering order.
    pub fn child_uids(&self, uid: &str) -> Vec<Uid> {
        self.data.child_uids(uid)
    }

    /// Reports whether a UID renders as a branch.
    pub fn is_branch(&self, uid: &str) -> bool {
        self.data.is_branch(uid)
    }

    /// Creates a new cell template.
    pub fn create_node(&self, is_branch: bool) -> R::Cell {
        self.renderer.create_cell(is_branch)
    }

    /// Updates a cell for a UID. Does nothing when the UID is stale.
    pub fn update_node(&self, uid: &str, is_branch: bool, cell: &mut R::Cell) {
        if let Some(node) = self.data.get(uid) {
            self.renderer.update_cell(&node, is_branch, cell);
        }
    }

    /// Handles a selection reported by the widget.
    ///
    /// Resolves the UID and calls the selection handler. Stale UIDs are
    /// dropped silently.
    pub fn handle_selected(&mut self, uid: &str) {
        let Some(node) = self.data.get(uid) else {
            log::debug!("tree: ignoring selection of unknown node {uid:?}");
            return;
        };
        self.selected = Some(uid.to_string());
        self.dirty = true;
        if let Some(handler) = self.on_selected.as_mut() {
            handler(&node);
        }
    }

    // -------------------------------------------------------------------------
    // Branches
    // -------------------------------------------------------------------------

    /// Opens a branch.
    pub fn open_branch(&mut self, node: &T) {
        let uid = node.uid();
        if self.data.is_branch(&uid) && self.open.insert(uid) {
            self.dirty = true;
        }
    }

    /// Closes a branch.
    pub fn close_branch(&mut self, node: &T) {
        if self.open.remove(&node.uid()) {
            self.dirty = true;
        }
    }

    /// Opens a closed branch or closes an open one.
    pub fn toggle_branch(&mut self, node: &T) {
        let uid = node.uid();
        if self.open.contains(&uid) {
            self.open.remove(&uid);
            self.dirty = true;
        } else if self.data.is_branch(&uid) {
            self.open.insert(uid);
            self.dirty = true;
        }
    }

    /// Reports whether a branch is open.
    pub fn is_branch_open(&self, node: &T) -> bool {
        self.open.contains(&node.uid())
    }

    /// Opens every branch in the current snapshot.
    pub fn open_all_branches(&mut self) {
        for uid in self.data.walk(ROOT_UID) {
            if self.data.is_branch(&uid) {
                self.open.insert(uid);
            }
        }
        self.dirty = true;
    }

    /// Closes all branches.
    pub fn close_all_branches(&mut self) {
        self.open.clear();
        self.dirty = true;
    }

    // -------------------------------------------------------------------------
    // Selection and scrolling
    // -------------------------------------------------------------------------

    /// Selects a node and calls the selection handler.
    pub fn select(&mut self, node: &T) {
        self.handle_selected(&node.uid());
    }

    /// Clears the selection.
    pub fn unselect_all(&mut self) {
        if self.selected.take().is_some() {
            self.dirty = true;
        }
    }

    /// Returns the selected node, if it still exists.
    pub fn selected(&self) -> Option<T> {
        self.selected.as_deref().and_then(|uid| self.data.get(uid))
    }

    /// Scrolls so that a visible node becomes the first row.
    ///
    /// Nodes inside closed branches are not visible and are ignored.
    pub fn scroll_to(&mut self, node: &T) {
        let uid = node.uid();
        if let Some(index) = self.visible().iter().position(|(u, _)| *u == uid) {
            self.scroll_offset = index;
            self.dirty = true;
        }
    }

    /// Scrolls to the first row.
    pub fn scroll_to_top(&mut self) {
        self.scroll_offset = 0;
        self.dirty = true;
    }

    /// Returns the index of the first row in the viewport.
    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    // -------------------------------------------------------------------------
    // Render
    // -------------------------------------------------------------------------

    /// Reports whether the view changed since the last [`render`](Self::render).
    pub fn needs_render(&self) -> bool {
        self.dirty
    }

    /// Returns the rows produced by the last render.
    pub fn rows(&self) -> &[Row<R::Cell>] {
        &self.rows
    }

    /// Flattens the visible nodes into rows and updates their cells.
    ///
    /// Cells of the previous render are reused for rows of the same kind.
    pub fn render(&mut self) -> &[Row<R::Cell>] {
        let visible = self.visible();
        let mut branch_cells = Vec::new();
        let mut leaf_cells = Vec::new();
        for row in self.rows.drain(..) {
            if row.is_branch {
                branch_cells.push(row.cell);
            } else {
                leaf_cells.push(row.cell);
            }
        }

        let mut rows = Vec::with_capacity(visible.len());
        for (uid, depth) in visible {
            let Some(node) = self.data.get(&uid) else {
                continue;
            };
            let is_branch = self.data.is_branch(&uid);
            let pooled = if is_branch {
                branch_cells.pop()
            } else {
                leaf_cells.pop()
            };
            let mut cell = pooled.unwrap_or_else(|| self.renderer.create_cell(is_branch));
            self.renderer.update_cell(&node, is_branch, &mut cell);
            rows.push(Row {
                is_open: self.open.contains(&uid),
                is_selected: self.selected.as_deref() == Some(uid.as_str()),
                uid,
                depth,
                is_branch,
                cell,
            });
        }

        let max_offset = rows.len().saturating_sub(1);
        if self.scroll_offset > max_offset {
            self.scroll_offset = max_offset;
        }
        self.rows = rows;
        self.dirty = false;
        &self.rows
    }

    /// Collects visible UIDs with their depth in display order.
    fn visible(&self) -> Vec<(Uid, usize)> {
        let mut out = Vec::new();
        let mut stack: Vec<(Uid, usize)> = self
            .data
            .child_uids(ROOT_UID)
            .into_iter()
            .rev()
            .map(|uid| (uid, 0))
            .collect();
        while let Some((uid, depth)) = stack.pop() {
            if self.open.contains(&uid) {
                stack.extend(
                    self.data
                        .child_uids(&uid)
                        .into_iter()
                        .rev()
                        .map(|child| (child, depth + 1)),
                );
            }
            out.push((uid, depth));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Node(&'static str);

    impl TreeNode for Node {
        fn uid(&self) -> Uid {
            self.0.to_string()
        }
    }

    fn label_view() -> TreeView<Node, impl NodeRenderer<Node, Cell = String>> {
        TreeView::new(
            |_| String::new(),
            |node: &Node, _, cell: &mut String| *cell = node.0.to_string(),
        )
    }

    #[test]
    fn test_closed_branches_hide_children() {
        let forest = Forest::new();
        forest.must_insert(ROOT_UID, Node("a"));
        forest.must_insert("a", Node("b"));
        let mut view = label_view();
        view.set(forest);
        let uids: Vec<_> = view.render().iter().map(|r| r.uid.clone()).collect();
        assert_eq!(uids, vec!["a"]);
    }

    #[test]
    fn test_open_non_branch_is_ignored() {
        let forest = Forest::new();
        forest.must_insert(ROOT_UID, Node("leaf"));
        let mut view = label_view();
        view.set(forest);
        view.open_branch(&Node("leaf"));
        assert!(!view.is_branch_open(&Node("leaf")));
    }

    #[test]
    fn test_scroll_offset_is_clamped_after_swap() {
        let forest = Forest::new();
        for name in ["a", "b", "c"] {
            forest.must_insert(ROOT_UID, Node(name));
        }
        let mut view = label_view();
        view.set(forest);
        view.scroll_to(&Node("c"));
        assert_eq!(view.scroll_offset(), 2);

        let smaller = Forest::new();
        smaller.must_insert(ROOT_UID, Node("a"));
        view.set(smaller);
        view.render();
        assert_eq!(view.scroll_offset(), 0);
    }
}
