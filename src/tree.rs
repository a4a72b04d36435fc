//! Nested view over a flat map of slash-delimited secret paths.
//!
//! A listing such as
//!
//! ```text
//! REGION              = "eu-west-1"
//! API/v2/ACCESS_KEY   = "..."
//! API/v2/SECRET_KEY   = "..."
//! database/prod/HOST  = "..."
//! ```
//!
//! becomes a tree where `API.v2.ACCESS_KEY` can be reached by successive
//! field access. Keys that share a prefix share the same branch node.
//!
//! # Naming conflicts
//!
//! A name can be claimed both as a leaf (`a`) and as a branch (`a/b`). Paths
//! are inserted in sorted order and the last writer wins, so the result does
//! not depend on the iteration order of whatever produced the input. Because
//! `a` sorts before `a/b`, the deeper path replaces the flat key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Flat mapping from a slash-delimited path to a plaintext value.
pub type FlatSecretMap = BTreeMap<String, String>;

/// A node in the secret tree: either a single value or named children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Leaf(String),
    Branch(BTreeMap<String, TreeNode>),
}

impl Default for TreeNode {
    fn default() -> Self {
        TreeNode::Branch(BTreeMap::new())
    }
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self, TreeNode::Leaf(_))
    }

    /// The leaf value, if this node is a leaf.
    pub fn value(&self) -> Option<&str> {
        match self {
            TreeNode::Leaf(value) => Some(value),
            TreeNode::Branch(_) => None,
        }
    }

    /// Child nodes, if this node is a branch.
    pub fn children(&self) -> Option<&BTreeMap<String, TreeNode>> {
        match self {
            TreeNode::Leaf(_) => None,
            TreeNode::Branch(children) => Some(children),
        }
    }

    /// Direct child by segment name.
    pub fn child(&self, name: &str) -> Option<&TreeNode> {
        self.children().and_then(|children| children.get(name))
    }

    /// Follow a slash-delimited path from this node.
    pub fn get(&self, path: &str) -> Option<&TreeNode> {
        path.split('/')
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Number of leaves below (and including) this node.
    pub fn leaf_count(&self) -> usize {
        match self {
            TreeNode::Leaf(_) => 1,
            TreeNode::Branch(children) => children.values().map(TreeNode::leaf_count).sum(),
        }
    }

    /// Collapse the tree back into a flat map of leaf paths.
    pub fn flatten(&self) -> FlatSecretMap {
        let mut out = FlatSecretMap::new();
        if let TreeNode::Branch(children) = self {
            for (name, child) in children {
                child.flatten_into(name.clone(), &mut out);
            }
        }
        out
    }

    fn flatten_into(&self, prefix: String, out: &mut FlatSecretMap) {
        match self {
            TreeNode::Leaf(value) => {
                out.insert(prefix, value.clone());
            }
            TreeNode::Branch(children) => {
                for (name, child) in children {
                    child.flatten_into(format!("{prefix}/{name}"), out);
                }
            }
        }
    }

    /// Descend into the branch child `name`, creating it (or replacing a leaf)
    /// when needed.
    fn branch_mut(&mut self, name: &str) -> &mut TreeNode {
        let children = self.ensure_branch();
        let child = children.entry(name.to_string()).or_default();
        if child.is_leaf() {
            *child = TreeNode::default();
        }
        child
    }

    fn ensure_branch(&mut self) -> &mut BTreeMap<String, TreeNode> {
        match self {
            TreeNode::Branch(children) => children,
            leaf => {
                *leaf = TreeNode::default();
                leaf.ensure_branch()
            }
        }
    }
}

/// Build a nested tree from a flat path map.
///
/// Total: every input, including the empty map, produces a tree. The root is
/// always a branch.
pub fn build_tree(flat: &FlatSecretMap) -> TreeNode {
    let mut root = TreeNode::default();

    for (path, value) in flat {
        let mut segments: Vec<&str> = path.split('/').collect();
        // split always yields at least one segment
        let last = segments.pop().unwrap_or_default();

        let mut node = &mut root;
        for segment in segments {
            node = node.branch_mut(segment);
        }
        node.ensure_branch()
            .insert(last.to_string(), TreeNode::Leaf(value.clone()));
    }

    root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(entries: &[(&str, &str)]) -> FlatSecretMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn names(node: &TreeNode) -> Vec<&str> {
        node.children()
            .expect("branch")
            .keys()
            .map(String::as_str)
            .collect()
    }

    #[test]
    fn test_empty_map_builds_empty_branch() {
        let tree = build_tree(&FlatSecretMap::new());
        assert_eq!(tree, TreeNode::Branch(BTreeMap::new()));
        assert_eq!(tree.leaf_count(), 0);
    }

    #[test]
    fn test_flat_keys_become_direct_leaves() {
        let tree = build_tree(&flat(&[("KEY1", "v1"), ("KEY2", "v2"), ("KEY3", "v3")]));
        assert_eq!(names(&tree), vec!["KEY1", "KEY2", "KEY3"]);
        assert_eq!(tree.get("KEY2").and_then(TreeNode::value), Some("v2"));
    }

    #[test]
    fn test_shared_prefixes_share_branches() {
        let tree = build_tree(&flat(&[("a/b/c", "1"), ("a/b/d", "2"), ("a/e/f", "3")]));

        assert_eq!(names(&tree), vec!["a"]);
        let a = tree.child("a").expect("a");
        assert_eq!(names(a), vec!["b", "e"]);
        assert_eq!(names(a.child("b").expect("b")), vec!["c", "d"]);
        assert_eq!(names(a.child("e").expect("e")), vec!["f"]);
    }

    #[test]
    fn test_flat_and_nested_keys_coexist() {
        let tree = build_tree(&flat(&[("FLAT", "x"), ("a/b", "y")]));

        assert_eq!(tree.child("FLAT"), Some(&TreeNode::Leaf("x".to_string())));
        let a = tree.child("a").expect("a");
        assert!(!a.is_leaf());
        assert_eq!(a.child("b"), Some(&TreeNode::Leaf("y".to_string())));
    }

    #[test]
    fn test_every_value_reachable_by_its_path() {
        let input = flat(&[
            ("REGION", "region-value"),
            ("API/v2/ACCESS_KEY", "access-key-123"),
            ("API/v2/SECRET_KEY", "secret-key-456"),
            ("database/prod/HOST", "db-host-value"),
            ("database/prod/PASSWORD", "db-pass-789"),
            ("level1/level2/level3/leaf", "deep_value"),
        ]);
        let tree = build_tree(&input);

        for (path, value) in &input {
            assert_eq!(
                tree.get(path).and_then(TreeNode::value),
                Some(value.as_str()),
                "path {path}"
            );
        }
        assert_eq!(tree.flatten(), input);
    }

    #[test]
    fn test_empty_segments_are_legal_names() {
        let tree = build_tree(&flat(&[("/lead", "1"), ("trail/", "2"), ("a//b", "3")]));

        assert_eq!(tree.child("").and_then(|n| n.child("lead")).and_then(TreeNode::value), Some("1"));
        assert_eq!(tree.get("trail/").and_then(TreeNode::value), Some("2"));
        assert_eq!(tree.get("a//b").and_then(TreeNode::value), Some("3"));
    }

    #[test]
    fn test_nested_path_wins_over_same_named_leaf() {
        let tree = build_tree(&flat(&[("a", "flat"), ("a/b", "nested")]));

        let a = tree.child("a").expect("a");
        assert!(!a.is_leaf());
        assert_eq!(a.child("b").and_then(TreeNode::value), Some("nested"));
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn test_leaf_turns_into_empty_branch() {
        let mut node = TreeNode::Leaf("old".to_string());
        node.ensure_branch()
            .insert("k".to_string(), TreeNode::Leaf("v".to_string()));

        assert!(!node.is_leaf());
        assert_eq!(node.get("k").and_then(TreeNode::value), Some("v"));
        assert_eq!(node.leaf_count(), 1);
    }

    #[test]
    fn test_serializes_as_plain_json_objects() {
        let tree = build_tree(&flat(&[("FLAT", "x"), ("a/b", "y")]));
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json, serde_json::json!({"FLAT": "x", "a": {"b": "y"}}));
    }
}
