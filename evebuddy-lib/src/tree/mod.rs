//! Generic tree data for hierarchical views
//!
//! A [`Forest`] is built fresh from domain data on every refresh and then
//! swapped into a [`TreeView`] as an immutable snapshot.

mod forest;
mod node;
mod view;

pub use forest::Forest;
pub use forest::ForestConfig;
pub use node::ROOT_UID;
pub use node::TreeNode;
pub use node::Uid;
pub use view::FnRenderer;
pub use view::NodeRenderer;
pub use view::Row;
pub use view::TreeView;
