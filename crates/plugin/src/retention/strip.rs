//! Removal of source-retention options.

use super::tree::{
    ChildList, DescriptorNode, FileDescriptorTree, OptionSet, Retention, RetentionResolver,
    TreeError,
};
use super::trie::PathTrie;
use protoplug_protocol::prost_types::{FileDescriptorProto, SourceCodeInfo};
use std::sync::Arc;

enum Outcome<T> {
    Unchanged,
    Changed(T),
}

/// Current descriptor path plus the paths removed so far.
struct Walk {
    path: Vec<i32>,
    removed: Option<PathTrie>,
}

impl Walk {
    fn new(track_removals: bool) -> Self {
        Self {
            path: Vec::new(),
            removed: track_removals.then(PathTrie::default),
        }
    }

    fn enter<T>(&mut self, step: i32, f: impl FnOnce(&mut Self) -> T) -> T {
        self.path.push(step);
        let result = f(self);
        self.path.pop();
        result
    }

    fn mark_removed(&mut self) {
        if let Some(removed) = &mut self.removed {
            removed.insert(&self.path);
        }
    }
}

/// Return a copy of `tree` without source-retention options.
///
/// Nodes with nothing to remove are shared with the input; when nothing is
/// removed anywhere, the result shares the input's root. Source locations
/// for removed options are dropped as well.
pub fn strip_source_retention_options(tree: &FileDescriptorTree) -> FileDescriptorTree {
    let locations = tree
        .source_code_info()
        .filter(|info| !info.location.is_empty());
    let mut walk = Walk::new(locations.is_some());

    let root = match strip_node(tree.root(), &mut walk) {
        Outcome::Unchanged => return tree.clone(),
        Outcome::Changed(root) => root,
    };
    let source_code_info = match (tree.source_code_info(), walk.removed) {
        (Some(info), Some(removed)) if !removed.is_empty() => Some(prune_locations(info, &removed)),
        (info, _) => info.cloned(),
    };
    FileDescriptorTree::from_parts(root, source_code_info)
}

/// Strip an encoded `FileDescriptorProto` in one step, keeping every
/// runtime option, extensions included.
pub fn strip_encoded_file_descriptor(
    bytes: &[u8],
    resolver: &impl RetentionResolver,
) -> Result<Vec<u8>, TreeError> {
    let tree = FileDescriptorTree::from_bytes(bytes, resolver)?;
    Ok(strip_source_retention_options(&tree).to_bytes())
}

/// Strip a descriptor proto in one step.
///
/// A decoded proto no longer carries extension options, so only built-in
/// options can be stripped here; see [`strip_encoded_file_descriptor`].
pub fn strip_file_descriptor_proto(
    file: FileDescriptorProto,
    resolver: &impl RetentionResolver,
) -> Result<FileDescriptorProto, TreeError> {
    let tree = FileDescriptorTree::from_proto(file, resolver)?;
    strip_source_retention_options(&tree).to_proto()
}

fn prune_locations(info: &Arc<SourceCodeInfo>, removed: &PathTrie) -> Arc<SourceCodeInfo> {
    let kept: Vec<_> = info
        .location
        .iter()
        .filter(|location| !removed.covers(&location.path))
        .cloned()
        .collect();
    if kept.len() == info.location.len() {
        return Arc::clone(info);
    }
    Arc::new(SourceCodeInfo { location: kept })
}

fn strip_node(node: &Arc<DescriptorNode>, walk: &mut Walk) -> Outcome<Arc<DescriptorNode>> {
    let kind = node.kind();
    let options = walk.enter(kind.options_tag(), |walk| strip_options(node.options(), walk));

    let mut children: Option<Box<[ChildList]>> = None;
    for (index, (slot, list)) in kind
        .child_slots()
        .iter()
        .zip(node.child_lists())
        .enumerate()
    {
        if let Outcome::Changed(list) = walk.enter(slot.tag, |walk| strip_list(list, walk)) {
            children.get_or_insert_with(|| node.child_lists().into())[index] = list;
        }
    }

    let options = match (options, &children) {
        (Outcome::Unchanged, None) => return Outcome::Unchanged,
        (Outcome::Unchanged, Some(_)) => node.options().cloned(),
        (Outcome::Changed(options), _) => options,
    };
    let children = children.unwrap_or_else(|| node.child_lists().into());
    Outcome::Changed(Arc::new(node.with_parts(options, children)))
}

fn strip_options(
    options: Option<&Arc<OptionSet>>,
    walk: &mut Walk,
) -> Outcome<Option<Arc<OptionSet>>> {
    let Some(options) = options else {
        return Outcome::Unchanged;
    };
    let source = options
        .fields()
        .iter()
        .filter(|field| field.retention() == Retention::Source);
    match source.clone().count() {
        0 => Outcome::Unchanged,
        n if n == options.fields().len() => {
            walk.mark_removed();
            Outcome::Changed(None)
        }
        _ => {
            for field in source {
                walk.enter(field.number(), Walk::mark_removed);
            }
            Outcome::Changed(Some(Arc::new(options.retaining(Retention::Runtime))))
        }
    }
}

fn strip_list(list: &ChildList, walk: &mut Walk) -> Outcome<ChildList> {
    let mut updated: Option<Vec<Arc<DescriptorNode>>> = None;
    for (index, child) in list.iter().enumerate() {
        let step = i32::try_from(index).unwrap_or(i32::MAX);
        let outcome = walk.enter(step, |walk| strip_node(child, walk));
        if let Some(updated) = updated.as_mut() {
            updated.push(match outcome {
                Outcome::Changed(stripped) => stripped,
                Outcome::Unchanged => Arc::clone(child),
            });
        } else if let Outcome::Changed(stripped) = outcome {
            let mut copy = Vec::with_capacity(list.len());
            copy.extend(list[..index].iter().cloned());
            copy.push(stripped);
            updated = Some(copy);
        }
    }
    match updated {
        Some(updated) => Outcome::Changed(updated.into()),
        None => Outcome::Unchanged,
    }
}
