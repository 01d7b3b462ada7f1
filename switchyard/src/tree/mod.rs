//! Hierarchical key/value tree
//!
//! The tree is the single data model shared by every subsystem: component
//! introspection, configuration input and whole-session persistence are
//! all expressed as trees.
//!
//! A node may hold a scalar `Value`, an ordered list of uniquely named
//! children, or both. Nodes are addressed with dotted paths (`.a.b.c`);
//! empty segments are ignored, so `""`, `"."` and `"..."` all name the
//! node the path is resolved against.
//!
//! ```rust
//! use switchyard::tree::Tree;
//!
//! let mut tree = Tree::new();
//! tree.vgraft(".audio.rate", 48000);
//! tree.vgraft(".audio.name", "main");
//! assert_eq!(tree.read::<i64>(".audio.rate").unwrap(), 48000);
//! assert_eq!(tree.children(".audio"), vec!["rate", "name"]);
//! ```

mod json;
mod keyval;
mod value;
mod walk;

pub use value::{FromValue, Value};

use thiserror::Error;

/// Path separator
pub const SEPARATOR: char = '.';

/// Replacement used by [`escape_segment`] for a literal separator
const ESCAPED_SEPARATOR: &str = "__DOT__";

/// Tree access failure
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TreeError {
    /// Nothing (or no value) at this path
    #[error("no value at {0}")]
    NotFound(String),

    /// The node holds a value of another type
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Serialized text could not be turned back into a tree
    #[error("cannot deserialize tree: {0}")]
    Parse(String),
}

/// One node of a tree, owning its whole subtree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    value: Option<Value>,
    children: Vec<(String, Tree)>,
    array: bool,
}

/// Split a dotted path into its non-empty segments
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// Make an arbitrary name usable as a single path segment
pub fn escape_segment(name: &str) -> String {
    name.replace(SEPARATOR, ESCAPED_SEPARATOR)
}

/// Inverse of [`escape_segment`]
pub fn unescape_segment(segment: &str) -> String {
    segment.replace(ESCAPED_SEPARATOR, ".")
}

impl Tree {
    /// Empty node: no value, no children
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaf holding `value`
    pub fn leaf(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn set_value(&mut self, value: impl Into<Value>) {
        self.value = Some(value.into());
    }

    pub fn take_value(&mut self) -> Option<Value> {
        self.value.take()
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// True when the node has neither a value nor children
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_array(&self) -> bool {
        self.array
    }

    /// Number of immediate children
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Immediate children in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tree)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn child(&self, name: &str) -> Option<&Tree> {
        self.children
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut Tree> {
        self.children
            .iter_mut()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    fn child_or_insert(&mut self, name: &str) -> &mut Tree {
        let pos = match self.children.iter().position(|(k, _)| k == name) {
            Some(pos) => pos,
            None => {
                self.children.push((name.to_string(), Tree::new()));
                self.children.len() - 1
            }
        };
        &mut self.children[pos].1
    }

    /// Replace the child in place, keeping its position, or append it
    fn put_child(&mut self, name: &str, tree: Tree) {
        match self.child_mut(name) {
            Some(slot) => *slot = tree,
            None => self.children.push((name.to_string(), tree)),
        }
    }

    /// Node at `path`, creating missing intermediate and final nodes
    pub(crate) fn node_or_insert(&mut self, path: &str) -> &mut Tree {
        let mut node = self;
        for seg in segments(path) {
            node = node.child_or_insert(seg);
        }
        node
    }

    /// Create or replace the node at `path`
    ///
    /// Intermediate nodes are created as needed. An existing node at the
    /// path is replaced wholesale, value and children; use [`Tree::merge`]
    /// to combine instead. Grafting at the root replaces `self`.
    pub fn graft(&mut self, path: &str, tree: Tree) {
        let segs: Vec<&str> = segments(path).collect();
        match segs.split_last() {
            None => *self = tree,
            Some((last, parents)) => {
                let mut node = self;
                for seg in parents {
                    node = node.child_or_insert(seg);
                }
                node.put_child(last, tree);
            }
        }
    }

    /// Graft a leaf holding `value`
    pub fn vgraft(&mut self, path: &str, value: impl Into<Value>) {
        self.graft(path, Tree::leaf(value));
    }

    /// Remove and return the subtree at `path`
    ///
    /// Pruning the root empties `self` and returns its former content.
    pub fn prune(&mut self, path: &str) -> Option<Tree> {
        let segs: Vec<&str> = segments(path).collect();
        match segs.split_last() {
            None => Some(std::mem::take(self)),
            Some((last, parents)) => {
                let mut node = self;
                for seg in parents {
                    node = node.child_mut(seg)?;
                }
                let pos = node.children.iter().position(|(k, _)| k == last)?;
                Some(node.children.remove(pos).1)
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&Tree> {
        let mut node = self;
        for seg in segments(path) {
            node = node.child(seg)?;
        }
        Some(node)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Tree> {
        let mut node = self;
        for seg in segments(path) {
            node = node.child_mut(seg)?;
        }
        Some(node)
    }

    /// Presence check that never fails
    pub fn exists(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn value_at(&self, path: &str) -> Option<&Value> {
        self.get(path).and_then(Tree::value)
    }

    /// Read the scalar at `path` as `T`
    pub fn read<T: FromValue>(&self, path: &str) -> Result<T, TreeError> {
        let value = self
            .value_at(path)
            .ok_or_else(|| TreeError::NotFound(path.to_string()))?;
        T::from_value(value).ok_or_else(|| TreeError::TypeMismatch {
            path: path.to_string(),
            expected: T::TYPE_NAME,
            found: value.type_name(),
        })
    }

    /// Names of the immediate children at `path`, in insertion order
    ///
    /// Empty when the path does not exist.
    pub fn children(&self, path: &str) -> Vec<String> {
        self.get(path)
            .map(|node| node.children.iter().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default()
    }

    /// Deep-merge `other` into the node at `path`
    ///
    /// Values present in `other` overwrite, children are merged
    /// recursively, new children are appended after existing ones.
    pub fn merge(&mut self, path: &str, other: &Tree) {
        self.node_or_insert(path).merge_from(other);
    }

    fn merge_from(&mut self, other: &Tree) {
        if let Some(value) = &other.value {
            self.value = Some(value.clone());
        }
        self.array |= other.array;
        for (name, child) in &other.children {
            match self.child_mut(name) {
                Some(existing) => existing.merge_from(child),
                None => self.children.push((name.clone(), child.clone())),
            }
        }
    }

    /// Mark the children at `path` as an ordered list
    ///
    /// Array-tagged nodes serialize to JSON arrays. Returns false when the
    /// path does not exist.
    pub fn tag_as_array(&mut self, path: &str, is_array: bool) -> bool {
        match self.get_mut(path) {
            Some(node) => {
                node.array = is_array;
                true
            }
            None => false,
        }
    }

    /// Values of every node (below `self`) the predicate accepts
    pub fn collect<F>(&self, mut predicate: F) -> Vec<Value>
    where
        F: FnMut(&[&str], &Tree) -> bool,
    {
        let mut found = Vec::new();
        self.walk(
            |path, node| {
                if let Some(value) = &node.value {
                    if predicate(path, node) {
                        found.push(value.clone());
                    }
                }
                true
            },
            |_, _| true,
        );
        found
    }

    /// Compact JSON text
    pub fn to_json(&self) -> String {
        serde_json::Value::from(self).to_string()
    }

    /// Indented JSON text
    pub fn to_json_pretty(&self) -> String {
        let json = serde_json::Value::from(self);
        serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
    }

    pub fn from_json(text: &str) -> Result<Tree, TreeError> {
        let json: serde_json::Value =
            serde_json::from_str(text).map_err(|e| TreeError::Parse(e.to_string()))?;
        Tree::try_from(json)
    }

    /// Key-path text, one line per node
    pub fn to_keyval(&self) -> String {
        keyval::serialize(self)
    }

    pub fn from_keyval(text: &str) -> Result<Tree, TreeError> {
        keyval::deserialize(text)
    }
}

impl From<Value> for Tree {
    fn from(value: Value) -> Self {
        Tree::leaf(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graft_creates_intermediates() {
        let mut tree = Tree::new();
        tree.vgraft(".a.b.c", 1);
        assert!(tree.exists(".a"));
        assert!(tree.exists(".a.b"));
        assert_eq!(tree.read::<i64>(".a.b.c").unwrap(), 1);
        assert!(!tree.get(".a").unwrap().has_value());
    }

    #[test]
    fn test_graft_replaces_wholesale() {
        let mut tree = Tree::new();
        tree.vgraft(".a.x", 1);
        tree.vgraft(".a.y", 2);
        tree.vgraft(".a", "flat");

        assert_eq!(tree.read::<String>(".a").unwrap(), "flat");
        assert!(!tree.exists(".a.x"));
        assert!(tree.children(".a").is_empty());
    }

    #[test]
    fn test_graft_keeps_position_of_replaced_child() {
        let mut tree = Tree::new();
        tree.vgraft("first", 1);
        tree.vgraft("second", 2);
        tree.vgraft("first", 3);
        assert_eq!(tree.children(""), vec!["first", "second"]);
    }

    #[test]
    fn test_empty_segments_are_ignored() {
        let mut tree = Tree::new();
        tree.vgraft("..a..b.", true);
        assert!(tree.read::<bool>(".a.b").unwrap());
        assert!(tree.exists(""));
        assert!(tree.exists("."));
    }

    #[test]
    fn test_root_graft_replaces_self() {
        let mut tree = Tree::new();
        tree.vgraft(".gone", 1);
        tree.graft(".", Tree::leaf("root"));
        assert_eq!(tree.read::<String>("").unwrap(), "root");
        assert_eq!(tree.len(), 0);
    }

    #[test]
    fn test_prune() {
        let mut tree = Tree::new();
        tree.vgraft(".a.b", 1);
        tree.vgraft(".a.c", 2);

        let pruned = tree.prune(".a.b").unwrap();
        assert_eq!(pruned.value(), Some(&Value::Int(1)));
        assert!(!tree.exists(".a.b"));
        assert!(tree.exists(".a.c"));

        assert!(tree.prune(".a.b").is_none());
        assert!(tree.prune(".nope.deeper").is_none());
    }

    #[test]
    fn test_read_errors() {
        let mut tree = Tree::new();
        tree.vgraft(".n", 3);
        tree.graft(".branch", Tree::new());

        assert_eq!(
            tree.read::<i64>(".missing"),
            Err(TreeError::NotFound(".missing".into()))
        );
        assert_eq!(
            tree.read::<i64>(".branch"),
            Err(TreeError::NotFound(".branch".into()))
        );
        assert_eq!(
            tree.read::<String>(".n"),
            Err(TreeError::TypeMismatch {
                path: ".n".into(),
                expected: "string",
                found: "int",
            })
        );
    }

    #[test]
    fn test_node_with_value_and_children() {
        let mut tree = Tree::new();
        tree.vgraft(".p", "parent");
        tree.get_mut(".p").unwrap().graft("kid", Tree::leaf(1));
        assert_eq!(tree.read::<String>(".p").unwrap(), "parent");
        assert_eq!(tree.read::<i64>(".p.kid").unwrap(), 1);
    }

    #[test]
    fn test_children_of_missing_path_is_empty() {
        let tree = Tree::new();
        assert!(tree.children(".x.y").is_empty());
    }

    #[test]
    fn test_merge() {
        let mut base = Tree::new();
        base.vgraft(".cfg.a", 1);
        base.vgraft(".cfg.b", 2);

        let mut other = Tree::new();
        other.vgraft(".b", 20);
        other.vgraft(".c", 30);

        base.merge(".cfg", &other);
        assert_eq!(base.read::<i64>(".cfg.a").unwrap(), 1);
        assert_eq!(base.read::<i64>(".cfg.b").unwrap(), 20);
        assert_eq!(base.read::<i64>(".cfg.c").unwrap(), 30);
        assert_eq!(base.children(".cfg"), vec!["a", "b", "c"]);

        base.merge(".fresh", &other);
        assert_eq!(base.read::<i64>(".fresh.c").unwrap(), 30);
    }

    #[test]
    fn test_tag_as_array() {
        let mut tree = Tree::new();
        tree.vgraft(".list.0", "x");
        assert!(tree.tag_as_array(".list", true));
        assert!(tree.get(".list").unwrap().is_array());
        assert!(!tree.tag_as_array(".absent", true));
    }

    #[test]
    fn test_escape_segment() {
        let escaped = escape_segment("a.b.c");
        assert!(!escaped.contains(SEPARATOR));
        assert_eq!(unescape_segment(&escaped), "a.b.c");

        let mut tree = Tree::new();
        tree.vgraft(&format!(".hosts.{}", escape_segment("10.0.0.1")), 5060);
        assert_eq!(tree.children(".hosts").len(), 1);
    }

    #[test]
    fn test_collect() {
        let mut tree = Tree::new();
        tree.vgraft(".a.label", "x");
        tree.vgraft(".b.label", "y");
        tree.vgraft(".b.other", "z");

        let labels = tree.collect(|path, _| path.last() == Some(&"label"));
        assert_eq!(labels, vec![Value::from("x"), Value::from("y")]);
    }
}
