//! Observable handle on a component's information tree

use crate::signal::{SignalBag, ON_TREE_GRAFTED, ON_TREE_PRUNED};
use crate::tree::{FromValue, Tree, TreeError};
use parking_lot::RwLock;
use std::sync::Arc;

/// Information tree shared by a component and its bags
///
/// Writes go through [`InfoTree::graft`] and [`InfoTree::prune`], which
/// announce the touched path on `on-tree-grafted` / `on-tree-pruned`. The
/// lock is released before the signal fires, so subscribers may read the
/// tree.
#[derive(Clone)]
pub struct InfoTree {
    tree: Arc<RwLock<Tree>>,
    signals: SignalBag,
}

impl InfoTree {
    /// Fresh tree with its own signal bag
    pub fn new() -> Self {
        let tree = Arc::new(RwLock::new(Tree::new()));
        let signals = SignalBag::new(tree.clone());
        Self { tree, signals }
    }

    pub fn signals(&self) -> &SignalBag {
        &self.signals
    }

    pub fn graft(&self, path: &str, subtree: Tree) {
        self.tree.write().graft(path, subtree);
        let _ = self.signals.emit(ON_TREE_GRAFTED, &Tree::leaf(path));
    }

    pub fn prune(&self, path: &str) -> Option<Tree> {
        let pruned = self.tree.write().prune(path);
        if pruned.is_some() {
            let _ = self.signals.emit(ON_TREE_PRUNED, &Tree::leaf(path));
        }
        pruned
    }

    /// Copy of the subtree at `path`
    pub fn get(&self, path: &str) -> Option<Tree> {
        self.tree.read().get(path).cloned()
    }

    pub fn read<T: FromValue>(&self, path: &str) -> Result<T, TreeError> {
        self.tree.read().read(path)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.tree.read().exists(path)
    }

    pub fn children(&self, path: &str) -> Vec<String> {
        self.tree.read().children(path)
    }

    /// Copy of the whole tree
    pub fn snapshot(&self) -> Tree {
        self.tree.read().clone()
    }
}

impl Default for InfoTree {
    fn default() -> Self {
        Self::new()
    }
}
