use std::collections::HashMap;

/// A set of removed descriptor paths.
///
/// A path is covered when it, or any of its ancestors, was inserted.
#[derive(Debug, Default)]
pub(crate) struct PathTrie {
    removed: bool,
    children: HashMap<i32, PathTrie>,
}

impl PathTrie {
    pub(crate) fn insert(&mut self, path: &[i32]) {
        let mut node = self;
        for step in path {
            node = node.children.entry(*step).or_default();
        }
        node.removed = true;
    }

    pub(crate) fn covers(&self, path: &[i32]) -> bool {
        let mut node = self;
        for step in path {
            if node.removed {
                return true;
            }
            match node.children.get(step) {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.removed
    }

    pub(crate) fn is_empty(&self) -> bool {
        !self.removed && self.children.is_empty()
    }
}
