//! Node-table snapshot format used by the external backup component.

use serde::{Deserialize, Serialize};

use crate::node::Node;

/// Current snapshot format version. Snapshots with a newer version are
/// rejected on restore.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A full export of the node table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Format version, [`SNAPSHOT_VERSION`] at write time.
    pub version: u32,
    /// Every node row, folders and files alike.
    pub nodes: Vec<Node>,
}

impl NodeSnapshot {
    /// Wrap node rows in the current format version.
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            nodes,
        }
    }
}
