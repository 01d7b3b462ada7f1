//! Depth-first traversal

use super::Tree;

impl Tree {
    /// Pre-order walk over every node below `self`
    ///
    /// Both callbacks receive the segments leading to the visited node,
    /// the node's own name last. Returning false from `on_enter` skips the
    /// node's subtree (and its `on_leave`) but the walk continues with its
    /// siblings. Returning false from `on_leave` stops the walk.
    ///
    /// Returns true when the walk ran to completion.
    pub fn walk<E, L>(&self, mut on_enter: E, mut on_leave: L) -> bool
    where
        E: FnMut(&[&str], &Tree) -> bool,
        L: FnMut(&[&str], &Tree) -> bool,
    {
        let mut path = Vec::new();
        walk_children(self, &mut path, &mut on_enter, &mut on_leave)
    }
}

fn walk_children<'a, E, L>(
    node: &'a Tree,
    path: &mut Vec<&'a str>,
    on_enter: &mut E,
    on_leave: &mut L,
) -> bool
where
    E: FnMut(&[&str], &Tree) -> bool,
    L: FnMut(&[&str], &Tree) -> bool,
{
    for (name, child) in node.children.iter() {
        path.push(name.as_str());
        let completed = if on_enter(path, child) {
            walk_children(child, path, on_enter, on_leave) && on_leave(path, child)
        } else {
            true
        };
        path.pop();
        if !completed {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tree {
        let mut tree = Tree::new();
        tree.vgraft(".a.x", 1);
        tree.vgraft(".a.y", 2);
        tree.vgraft(".b", 3);
        tree
    }

    #[test]
    fn test_preorder_with_paths() {
        let tree = sample();
        let mut entered = Vec::new();
        let mut left = Vec::new();
        let done = tree.walk(
            |path, _| {
                entered.push(path.join("."));
                true
            },
            |path, _| {
                left.push(path.join("."));
                true
            },
        );
        assert!(done);
        assert_eq!(entered, vec!["a", "a.x", "a.y", "b"]);
        assert_eq!(left, vec!["a.x", "a.y", "a", "b"]);
    }

    #[test]
    fn test_enter_false_skips_subtree_only() {
        let tree = sample();
        let mut entered = Vec::new();
        let done = tree.walk(
            |path, _| {
                entered.push(path.join("."));
                path != ["a"]
            },
            |_, _| true,
        );
        assert!(done);
        assert_eq!(entered, vec!["a", "b"]);
    }

    #[test]
    fn test_leave_false_aborts() {
        let tree = sample();
        let mut entered = Vec::new();
        let done = tree.walk(
            |path, _| {
                entered.push(path.join("."));
                true
            },
            |path, _| path != ["a", "x"],
        );
        assert!(!done);
        assert_eq!(entered, vec!["a", "a.x"]);
    }
}
