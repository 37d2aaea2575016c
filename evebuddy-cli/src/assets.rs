//! Character asset trees built from ESI asset listings.

use std::collections::HashSet;

use evebuddy_lib::error::TreeError;
use evebuddy_lib::tree::Forest;
use evebuddy_lib::tree::ROOT_UID;
use evebuddy_lib::tree::TreeNode;
use evebuddy_lib::tree::TreeView;
use evebuddy_lib::tree::Uid;
use serde::Deserialize;

/// One entry of `GET /characters/{character_id}/assets`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Asset {
    pub item_id: i64,
    pub location_id: i64,
    #[serde(default)]
    pub location_flag: String,
    pub type_id: i32,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    /// Resolved name, when the listing was enriched with one.
    #[serde(default)]
    pub name: Option<String>,
}

fn default_quantity() -> i32 {
    1
}

/// A node in the asset tree.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetNode {
    /// A station, structure or solar system holding top-level assets.
    Location { location_id: i64 },
    Item(Asset),
}

impl TreeNode for AssetNode {
    fn uid(&self) -> Uid {
        match self {
            AssetNode::Location { location_id } => format!("L{location_id}"),
            AssetNode::Item(asset) => format!("I{}", asset.item_id),
        }
    }
}

impl AssetNode {
    pub fn label(&self) -> String {
        match self {
            AssetNode::Location { location_id } => format!("Location {location_id}"),
            AssetNode::Item(asset) => {
                let name = asset
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("Type {}", asset.type_id));
                if asset.quantity > 1 {
                    format!("{name} x{}", asset.quantity)
                } else {
                    name
                }
            }
        }
    }
}

/// Builds the asset tree.
///
/// Assets whose `location_id` is another asset's `item_id` are nested in
/// that container. All others go under a top-level location node. Order
/// follows the listing.
pub fn build_forest(assets: &[Asset]) -> Result<Forest<AssetNode>, TreeError> {
    let forest = Forest::new();
    let items: HashSet<i64> = assets.iter().map(|a| a.item_id).collect();

    let mut locations = HashSet::new();
    for asset in assets {
        if !items.contains(&asset.location_id) && locations.insert(asset.location_id) {
            forest.insert(
                ROOT_UID,
                AssetNode::Location {
                    location_id: asset.location_id,
                },
            )?;
        }
    }

    // Containers may be listed after their contents
    let mut pending: Vec<&Asset> = assets.iter().collect();
    while !pending.is_empty() {
        let before = pending.len();
        let mut rest = Vec::new();
        for asset in pending {
            let parent = if items.contains(&asset.location_id) {
                format!("I{}", asset.location_id)
            } else {
                format!("L{}", asset.location_id)
            };
            if forest.contains(&parent) {
                forest.insert(&parent, AssetNode::Item(asset.clone()))?;
            } else {
                rest.push(asset);
            }
        }
        if rest.len() == before {
            // Containment cycle
            let asset = rest[0];
            return Err(TreeError::ParentNotFound {
                parent: format!("I{}", asset.location_id),
            });
        }
        pending = rest;
    }

    // Containers stay expandable when empty
    for asset in assets.iter().filter(|a| is_container_type(a.type_id)) {
        forest.set_branch(&format!("I{}", asset.item_id))?;
    }

    Ok(forest)
}

/// Type IDs of the common station containers.
fn is_container_type(type_id: i32) -> bool {
    matches!(type_id, 3293 | 3296 | 3297 | 11488 | 11489 | 17363 | 17364 | 17365 | 17366)
}

/// Renders the tree as indented text lines.
pub fn render_text(forest: Forest<AssetNode>, expanded: bool) -> Vec<String> {
    let mut view = TreeView::new(
        |_is_branch: bool| String::new(),
        |node: &AssetNode, is_branch, cell: &mut String| {
            *cell = if is_branch {
                format!("{}/", node.label())
            } else {
                node.label()
            };
        },
    );
    view.set(forest);
    if expanded {
        view.open_all_branches();
    }

    view.render()
        .iter()
        .map(|row| {
            let marker = match (row.is_branch, row.is_open) {
                (true, true) => "- ",
                (true, false) => "+ ",
                (false, _) => "  ",
            };
            format!("{}{}{}", "  ".repeat(row.depth), marker, row.cell)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(item_id: i64, location_id: i64, name: &str) -> Asset {
        Asset {
            item_id,
            location_id,
            location_flag: "Hangar".to_string(),
            type_id: 34,
            quantity: 1,
            name: Some(name.to_string()),
        }
    }

    #[test]
    fn test_items_nest_in_containers() {
        let assets = vec![
            asset(1, 60003760, "Rifter"),
            asset(2, 1, "Tritanium"),
            asset(3, 60008494, "Hangar Container"),
        ];
        let forest = build_forest(&assets).unwrap();

        assert_eq!(forest.child_uids(ROOT_UID), vec!["L60003760", "L60008494"]);
        assert_eq!(forest.child_uids("L60003760"), vec!["I1"]);
        assert_eq!(forest.child_uids("I1"), vec!["I2"]);
        assert!(forest.is_branch("I1"));
        assert!(!forest.is_branch("I2"));
    }

    #[test]
    fn test_contents_listed_before_container() {
        let assets = vec![asset(2, 1, "Tritanium"), asset(1, 60003760, "Rifter")];
        let forest = build_forest(&assets).unwrap();
        assert_eq!(forest.path("I2"), vec!["L60003760", "I1"]);
    }

    #[test]
    fn test_containment_cycle_fails() {
        let assets = vec![asset(1, 2, "A"), asset(2, 1, "B")];
        assert!(matches!(
            build_forest(&assets),
            Err(TreeError::ParentNotFound { .. })
        ));
    }

    #[test]
    fn test_empty_container_is_branch() {
        let mut container = asset(5, 60003760, "Cargo");
        container.type_id = 3293;
        let forest = build_forest(&[container]).unwrap();
        assert!(forest.is_branch("I5"));
        assert!(forest.child_uids("I5").is_empty());
    }

    #[test]
    fn test_render_text() {
        let mut ore = asset(2, 1, "Tritanium");
        ore.quantity = 500;
        let assets = vec![asset(1, 60003760, "Rifter"), ore];

        let expanded = render_text(build_forest(&assets).unwrap(), true);
        assert_eq!(
            expanded,
            vec![
                "- Location 60003760/",
                "  - Rifter/",
                "      Tritanium x500",
            ]
        );

        let collapsed = render_text(build_forest(&assets).unwrap(), false);
        assert_eq!(collapsed, vec!["+ Location 60003760/"]);
    }
}
