//! Node entity model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// ID of the implicit root folder. Never persisted; every top-level node
/// simply has `parent_id = 0`.
pub const ROOT_ID: i64 = 0;

/// One entry of the virtual filesystem, stored as an adjacency-list row.
///
/// Folders carry only the structural columns; file nodes additionally
/// carry the content hash and byte metadata. The triple
/// `(parent_id, name, ext_name)` is unique among siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Node {
    /// Surrogate key. 0 is reserved for the implicit root.
    pub id: i64,
    /// Parent node ID, 0 for top-level nodes.
    pub parent_id: i64,
    /// Name without extension.
    pub name: String,
    /// Extension including the leading dot, empty for folders.
    pub ext_name: String,
    /// Whether this node is a folder.
    pub is_folder: bool,
    /// Content hash (hex SHA-256), empty for folders.
    pub hash: String,
    /// MIME type as supplied at upload, empty for folders.
    pub content_type: String,
    /// Content size in bytes, 0 for folders.
    pub file_size: i64,
    /// Creation timestamp (unix seconds, server-assigned).
    pub create_time: i64,
    /// Last update timestamp (unix seconds, server-assigned).
    pub update_time: i64,
}

impl Node {
    /// The synthetic root folder. Exists only in memory; resolution of
    /// `"/"` returns it without touching the database.
    pub fn root() -> Self {
        Self {
            id: ROOT_ID,
            parent_id: ROOT_ID,
            name: "/".to_string(),
            ext_name: String::new(),
            is_folder: true,
            hash: String::new(),
            content_type: String::new(),
            file_size: 0,
            create_time: 0,
            update_time: 0,
        }
    }

    /// Whether this is the synthetic root.
    pub fn is_root(&self) -> bool {
        self.id == ROOT_ID
    }

    /// Full file name (`name` + `ext_name`).
    pub fn file_name(&self) -> String {
        format!("{}{}", self.name, self.ext_name)
    }

    /// Remote object key for a file node: `hash` + `ext_name`.
    pub fn remote_path(&self) -> String {
        format!("{}{}", self.hash, self.ext_name)
    }

    /// Cache path relative to the data root, sharded into two
    /// 2-character directory levels to bound directory fan-out:
    /// `cache/ab/cd/abcd….png`.
    pub fn cache_rel_path(&self) -> String {
        cache_rel_path(&self.hash, &self.ext_name)
    }

    /// Public-facing reference for a file node.
    pub fn url(&self) -> String {
        format!("/f/{}{}", self.id, self.ext_name)
    }
}

/// Data required to insert a new node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNode {
    /// Parent node ID, 0 for top-level.
    pub parent_id: i64,
    /// Name without extension.
    pub name: String,
    /// Extension including the leading dot, empty for folders.
    pub ext_name: String,
    /// Whether the node is a folder.
    pub is_folder: bool,
    /// Content hash, empty for folders.
    pub hash: String,
    /// MIME type, empty for folders.
    pub content_type: String,
    /// Content size in bytes.
    pub file_size: i64,
}

impl CreateNode {
    /// A folder row under the given parent.
    pub fn folder(parent_id: i64, name: impl Into<String>) -> Self {
        Self {
            parent_id,
            name: name.into(),
            ext_name: String::new(),
            is_folder: true,
            hash: String::new(),
            content_type: String::new(),
            file_size: 0,
        }
    }
}

/// Cache path relative to the data root for a content hash.
pub fn cache_rel_path(hash: &str, ext_name: &str) -> String {
    format!("cache/{}/{}/{hash}{ext_name}", &hash[0..2], &hash[2..4])
}

/// Split a file name into `(name, ext_name)`.
///
/// The extension starts at the last dot, provided the dot is not the
/// first character: `"photo.png"` → `("photo", ".png")`,
/// `"archive.tar.gz"` → `("archive.tar", ".gz")`, `".hidden"` →
/// `(".hidden", "")`, `"README"` → `("README", "")`.
pub fn split_file_name(file_name: &str) -> (String, String) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => (file_name[..idx].to_string(), file_name[idx..].to_string()),
        _ => (file_name.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_file_name_variants() {
        assert_eq!(
            split_file_name("photo.png"),
            ("photo".to_string(), ".png".to_string())
        );
        assert_eq!(
            split_file_name("archive.tar.gz"),
            ("archive.tar".to_string(), ".gz".to_string())
        );
        assert_eq!(
            split_file_name(".hidden"),
            (".hidden".to_string(), String::new())
        );
        assert_eq!(
            split_file_name("README"),
            ("README".to_string(), String::new())
        );
    }

    #[test]
    fn cache_path_is_sharded() {
        assert_eq!(
            cache_rel_path("abcdef0123", ".png"),
            "cache/ab/cd/abcdef0123.png"
        );
    }

    #[test]
    fn root_is_a_folder() {
        let root = Node::root();
        assert!(root.is_root());
        assert!(root.is_folder);
        assert_eq!(root.name, "/");
    }
}
