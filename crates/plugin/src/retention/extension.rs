//! Retention of custom options, read from their declarations.

use super::tree::{
    DescriptorNode, FileDescriptorTree, NodeKind, Record, Retention, RetentionResolver, TreeError,
};
use std::collections::HashSet;

/// `FieldOptions.retention`.
const RETENTION_FIELD: i32 = 17;

/// `FieldOptions.OptionRetention.RETENTION_SOURCE`.
const RETENTION_SOURCE: u64 = 2;

/// Resolves option retention from the extension definitions of a set of files.
///
/// Each extension of an options message (`google.protobuf.FieldOptions` and
/// friends) declared with `retention = RETENTION_SOURCE` resolves to
/// [`Retention::Source`]; everything else, built-in options included, is
/// [`Retention::Runtime`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionRetention {
    source: HashSet<(NodeKind, i32)>,
}

impl ExtensionRetention {
    /// Collect declarations from encoded `FileDescriptorProto`s, usually every
    /// file of a request.
    pub fn from_encoded_files<'a>(
        files: impl IntoIterator<Item = &'a [u8]>,
    ) -> Result<Self, TreeError> {
        let mut retention = Self::default();
        for bytes in files {
            let tree = FileDescriptorTree::from_bytes(bytes, &|_: NodeKind, _: i32| {
                Retention::Runtime
            })?;
            retention.collect(tree.root());
        }
        tracing::debug!(source_options = retention.source.len(), "Resolved option retention");
        Ok(retention)
    }

    fn collect(&mut self, node: &DescriptorNode) {
        if let Record::Field(field) = node.record() {
            let declared_source = node
                .options()
                .and_then(|options| options.get(RETENTION_FIELD))
                .and_then(|retention| retention.varint())
                == Some(RETENTION_SOURCE);
            if declared_source {
                if let Some(kind) = NodeKind::from_options_message(field.extendee()) {
                    self.source.insert((kind, field.number()));
                }
            }
        }
        for list in node.child_lists() {
            for child in list.iter() {
                self.collect(child);
            }
        }
    }

    /// Whether `number` is a source-retention extension of `kind` options.
    pub fn is_source(&self, kind: NodeKind, number: i32) -> bool {
        self.source.contains(&(kind, number))
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}

impl RetentionResolver for ExtensionRetention {
    fn retention(&self, kind: NodeKind, number: i32) -> Retention {
        if self.is_source(kind, number) {
            Retention::Source
        } else {
            Retention::Runtime
        }
    }
}
