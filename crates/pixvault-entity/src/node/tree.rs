//! Materialized folder tree.

use serde::{Deserialize, Serialize};

use super::model::{Node, ROOT_ID};

/// One folder in the materialized tree, with its children nested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTree {
    /// Node ID (0 for the synthetic root).
    pub id: i64,
    /// Parent node ID.
    pub parent_id: i64,
    /// Folder name.
    pub name: String,
    /// Creation timestamp (unix seconds).
    pub create_time: i64,
    /// Last update timestamp (unix seconds).
    pub update_time: i64,
    /// Child folders.
    pub children: Vec<NodeTree>,
}

impl NodeTree {
    /// The synthetic root of a materialized tree.
    pub fn root() -> Self {
        Self {
            id: ROOT_ID,
            parent_id: ROOT_ID,
            name: "/".to_string(),
            create_time: 0,
            update_time: 0,
            children: Vec::new(),
        }
    }

    /// Total number of folders in this subtree, the node itself included.
    pub fn folder_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(NodeTree::folder_count)
            .sum::<usize>()
    }
}

impl From<&Node> for NodeTree {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            parent_id: node.parent_id,
            name: node.name.clone(),
            create_time: node.create_time,
            update_time: node.update_time,
            children: Vec::new(),
        }
    }
}
