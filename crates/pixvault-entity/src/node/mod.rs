//! Node entity: adjacency-list rows of the virtual filesystem.

pub mod model;
pub mod tree;

pub use model::{split_file_name, CreateNode, Node, ROOT_ID};
pub use tree::NodeTree;
