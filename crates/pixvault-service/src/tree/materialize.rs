//! Full-forest materialization and tree statistics.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use pixvault_core::result::AppResult;
use pixvault_entity::node::{Node, NodeTree, ROOT_ID};

use super::service::PathTreeService;

/// Rollup counters for the whole tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Statistics {
    /// Number of file nodes.
    pub file_count: i64,
    /// Number of folder nodes.
    pub folder_count: i64,
    /// Sum of file sizes in bytes.
    pub total_file_size: i64,
}

impl PathTreeService {
    /// Materialize the full folder forest from one bulk read.
    ///
    /// Folder rows whose parent no longer exists are attached directly
    /// under the root instead of being dropped, so a damaged tree still
    /// renders completely.
    pub async fn tree(&self) -> AppResult<NodeTree> {
        let folders = self
            .node_repo()
            .all_folders(self.node_repo().pool())
            .await?;
        Ok(build_forest(&folders))
    }

    /// File/folder counts and total content bytes.
    pub async fn statistics(&self) -> AppResult<Statistics> {
        let (file_count, folder_count, total_file_size) =
            self.node_repo().stats(self.node_repo().pool()).await?;
        Ok(Statistics {
            file_count,
            folder_count,
            total_file_size,
        })
    }
}

/// Assemble the nested folder tree from flat rows.
fn build_forest(folders: &[Node]) -> NodeTree {
    let known: HashSet<i64> = folders.iter().map(|f| f.id).collect();
    let mut children_of: HashMap<i64, Vec<&Node>> = HashMap::new();

    for folder in folders {
        let parent = if folder.parent_id == ROOT_ID || known.contains(&folder.parent_id) {
            folder.parent_id
        } else {
            warn!(
                id = folder.id,
                parent_id = folder.parent_id,
                "Folder references a missing parent, attaching under root"
            );
            ROOT_ID
        };
        children_of.entry(parent).or_default().push(folder);
    }

    let mut root = NodeTree::root();
    attach_children(&mut root, &children_of);
    root
}

fn attach_children(tree: &mut NodeTree, children_of: &HashMap<i64, Vec<&Node>>) {
    let Some(children) = children_of.get(&tree.id) else {
        return;
    };
    for child in children {
        let mut node = NodeTree::from(*child);
        attach_children(&mut node, children_of);
        tree.children.push(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(id: i64, parent_id: i64, name: &str) -> Node {
        Node {
            id,
            parent_id,
            name: name.to_string(),
            ext_name: String::new(),
            is_folder: true,
            hash: String::new(),
            content_type: String::new(),
            file_size: 0,
            create_time: 0,
            update_time: 0,
        }
    }

    #[test]
    fn nested_folders_build_a_forest() {
        let rows = vec![
            folder(1, 0, "a"),
            folder(2, 1, "b"),
            folder(3, 2, "c"),
            folder(4, 0, "z"),
        ];
        let tree = build_forest(&rows);
        assert_eq!(tree.children.len(), 2);
        let a = tree.children.iter().find(|c| c.name == "a").unwrap();
        assert_eq!(a.children[0].name, "b");
        assert_eq!(a.children[0].children[0].name, "c");
        assert_eq!(tree.folder_count(), 5);
    }

    #[test]
    fn orphans_attach_under_root_with_their_subtree() {
        // Folder 7's parent 99 does not exist; 8 is 7's child.
        let rows = vec![folder(7, 99, "lost"), folder(8, 7, "inside")];
        let tree = build_forest(&rows);
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].name, "lost");
        assert_eq!(tree.children[0].children[0].name, "inside");
    }
}
