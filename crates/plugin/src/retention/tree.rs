//! Structurally shared descriptor trees.
//!
//! A [`FileDescriptorTree`] holds every descriptor record behind an [`Arc`],
//! with its options split into per-field entries tagged with a [`Retention`].
//! Trees are read from and written to the wire encoding directly, so custom
//! (extension) options survive even though prost's descriptor types drop them.
//! Transformations copy only the nodes they change and share the rest.

use prost::Message;
use prost::encoding::{
    DecodeContext, WireType, decode_key, decode_varint, encode_key, encode_varint, skip_field,
};
use protoplug_protocol::prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, MethodDescriptorProto, OneofDescriptorProto, ServiceDescriptorProto,
    SourceCodeInfo, descriptor_proto::ExtensionRange,
};
use std::sync::Arc;
use thiserror::Error;

/// `FileDescriptorProto.source_code_info`.
const SOURCE_CODE_INFO_TAG: i32 = 9;

/// Errors converting between encoded descriptors and trees.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("malformed descriptor: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("malformed descriptor: length-delimited field overruns its message")]
    Truncated,

    #[error("field number {0} out of range")]
    FieldNumber(u32),
}

/// The descriptor record types that can carry options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    File,
    Message,
    Field,
    Oneof,
    ExtensionRange,
    Enum,
    EnumValue,
    Service,
    Method,
}

/// A repeated child field: its field number and the kind of its elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildSlot {
    pub tag: i32,
    pub kind: NodeKind,
}

const fn slot(tag: i32, kind: NodeKind) -> ChildSlot {
    ChildSlot { tag, kind }
}

const FILE_SLOTS: &[ChildSlot] = &[
    slot(4, NodeKind::Message),
    slot(5, NodeKind::Enum),
    slot(6, NodeKind::Service),
    slot(7, NodeKind::Field),
];

const MESSAGE_SLOTS: &[ChildSlot] = &[
    slot(2, NodeKind::Field),
    slot(3, NodeKind::Message),
    slot(4, NodeKind::Enum),
    slot(5, NodeKind::ExtensionRange),
    slot(6, NodeKind::Field),
    slot(8, NodeKind::Oneof),
];

const ENUM_SLOTS: &[ChildSlot] = &[slot(2, NodeKind::EnumValue)];

const SERVICE_SLOTS: &[ChildSlot] = &[slot(2, NodeKind::Method)];

impl NodeKind {
    /// Field number of the `options` field in this record type.
    pub const fn options_tag(self) -> i32 {
        match self {
            Self::File | Self::Field => 8,
            Self::Message => 7,
            Self::Oneof => 2,
            Self::ExtensionRange | Self::Enum | Self::EnumValue | Self::Service => 3,
            Self::Method => 4,
        }
    }

    /// Repeated fields holding child records, in field order.
    pub const fn child_slots(self) -> &'static [ChildSlot] {
        match self {
            Self::File => FILE_SLOTS,
            Self::Message => MESSAGE_SLOTS,
            Self::Enum => ENUM_SLOTS,
            Self::Service => SERVICE_SLOTS,
            Self::Field | Self::Oneof | Self::ExtensionRange | Self::EnumValue | Self::Method => &[],
        }
    }

    /// The kind whose options message is `name`, e.g. `.google.protobuf.FieldOptions`.
    pub fn from_options_message(name: &str) -> Option<Self> {
        let kind = match name.strip_prefix('.').unwrap_or(name) {
            "google.protobuf.FileOptions" => Self::File,
            "google.protobuf.MessageOptions" => Self::Message,
            "google.protobuf.FieldOptions" => Self::Field,
            "google.protobuf.OneofOptions" => Self::Oneof,
            "google.protobuf.ExtensionRangeOptions" => Self::ExtensionRange,
            "google.protobuf.EnumOptions" => Self::Enum,
            "google.protobuf.EnumValueOptions" => Self::EnumValue,
            "google.protobuf.ServiceOptions" => Self::Service,
            "google.protobuf.MethodOptions" => Self::Method,
            _ => return None,
        };
        Some(kind)
    }
}

/// When an option field is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retention {
    /// Kept in runtime descriptors.
    #[default]
    Runtime,
    /// Only present in source; stripped before runtime use.
    Source,
}

/// Decides the retention of option fields, including extensions.
///
/// Implemented for any `Fn(NodeKind, i32) -> Retention`, and by
/// [`super::ExtensionRetention`], which reads the retention declared on
/// extension definitions.
pub trait RetentionResolver {
    fn retention(&self, kind: NodeKind, number: i32) -> Retention;
}

impl<F> RetentionResolver for F
where
    F: Fn(NodeKind, i32) -> Retention,
{
    fn retention(&self, kind: NodeKind, number: i32) -> Retention {
        self(kind, number)
    }
}

/// All occurrences of one field number inside an options message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionField {
    number: i32,
    retention: Retention,
    encoded: Vec<u8>,
}

impl OptionField {
    pub fn number(&self) -> i32 {
        self.number
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// Wire encoding of every occurrence, keys included.
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    /// The last varint value of this field, as protobuf reads a scalar.
    pub fn varint(&self) -> Option<u64> {
        let mut buf = self.encoded.as_slice();
        let mut value = None;
        while !buf.is_empty() {
            let (_, wire_type) = decode_key(&mut buf).ok()?;
            if wire_type != WireType::Varint {
                return None;
            }
            value = Some(decode_varint(&mut buf).ok()?);
        }
        value
    }
}

/// The option fields of one descriptor record, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OptionSet {
    fields: Vec<OptionField>,
}

impl OptionSet {
    /// Split an encoded options message into its fields.
    pub fn decode(
        kind: NodeKind,
        bytes: &[u8],
        resolver: &dyn RetentionResolver,
    ) -> Result<Self, TreeError> {
        let mut fields: Vec<OptionField> = Vec::new();
        let mut buf = bytes;
        while !buf.is_empty() {
            let start = bytes.len() - buf.len();
            let (tag, wire_type) = decode_key(&mut buf)?;
            skip_field(wire_type, tag, &mut buf, DecodeContext::default())?;
            let encoded = &bytes[start..bytes.len() - buf.len()];

            let number = field_number(tag)?;
            match fields.iter_mut().find(|field| field.number == number) {
                Some(field) => field.encoded.extend_from_slice(encoded),
                None => fields.push(OptionField {
                    number,
                    retention: resolver.retention(kind, number),
                    encoded: encoded.to_vec(),
                }),
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[OptionField] {
        &self.fields
    }

    pub fn get(&self, number: i32) -> Option<&OptionField> {
        self.fields.iter().find(|field| field.number == number)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.fields
            .iter()
            .flat_map(|field| field.encoded.iter().copied())
            .collect()
    }

    pub(crate) fn retaining(&self, retention: Retention) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .filter(|field| field.retention == retention)
                .cloned()
                .collect(),
        }
    }
}

/// A descriptor record with its options and child lists cleared.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    File(FileDescriptorProto),
    Message(DescriptorProto),
    Field(FieldDescriptorProto),
    Oneof(OneofDescriptorProto),
    ExtensionRange(ExtensionRange),
    Enum(EnumDescriptorProto),
    EnumValue(EnumValueDescriptorProto),
    Service(ServiceDescriptorProto),
    Method(MethodDescriptorProto),
}

impl Record {
    fn decode(kind: NodeKind, bytes: &[u8]) -> Result<Self, prost::DecodeError> {
        let record = match kind {
            NodeKind::File => Self::File(FileDescriptorProto::decode(bytes)?),
            NodeKind::Message => Self::Message(DescriptorProto::decode(bytes)?),
            NodeKind::Field => Self::Field(FieldDescriptorProto::decode(bytes)?),
            NodeKind::Oneof => Self::Oneof(OneofDescriptorProto::decode(bytes)?),
            NodeKind::ExtensionRange => Self::ExtensionRange(ExtensionRange::decode(bytes)?),
            NodeKind::Enum => Self::Enum(EnumDescriptorProto::decode(bytes)?),
            NodeKind::EnumValue => Self::EnumValue(EnumValueDescriptorProto::decode(bytes)?),
            NodeKind::Service => Self::Service(ServiceDescriptorProto::decode(bytes)?),
            NodeKind::Method => Self::Method(MethodDescriptorProto::decode(bytes)?),
        };
        Ok(record)
    }

    fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::File(file) => file.encode_to_vec(),
            Self::Message(message) => message.encode_to_vec(),
            Self::Field(field) => field.encode_to_vec(),
            Self::Oneof(oneof) => oneof.encode_to_vec(),
            Self::ExtensionRange(range) => range.encode_to_vec(),
            Self::Enum(enumeration) => enumeration.encode_to_vec(),
            Self::EnumValue(value) => value.encode_to_vec(),
            Self::Service(service) => service.encode_to_vec(),
            Self::Method(method) => method.encode_to_vec(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::File(_) => NodeKind::File,
            Self::Message(_) => NodeKind::Message,
            Self::Field(_) => NodeKind::Field,
            Self::Oneof(_) => NodeKind::Oneof,
            Self::ExtensionRange(_) => NodeKind::ExtensionRange,
            Self::Enum(_) => NodeKind::Enum,
            Self::EnumValue(_) => NodeKind::EnumValue,
            Self::Service(_) => NodeKind::Service,
            Self::Method(_) => NodeKind::Method,
        }
    }

    /// The record's name; empty for extension ranges.
    pub fn name(&self) -> &str {
        match self {
            Self::File(file) => file.name(),
            Self::Message(message) => message.name(),
            Self::Field(field) => field.name(),
            Self::Oneof(oneof) => oneof.name(),
            Self::ExtensionRange(_) => "",
            Self::Enum(enumeration) => enumeration.name(),
            Self::EnumValue(value) => value.name(),
            Self::Service(service) => service.name(),
            Self::Method(method) => method.name(),
        }
    }
}

/// One list of children, indexed like [`NodeKind::child_slots`].
pub type ChildList = Arc<[Arc<DescriptorNode>]>;

/// An immutable descriptor node.
#[derive(Debug, Clone)]
pub struct DescriptorNode {
    record: Arc<Record>,
    options: Option<Arc<OptionSet>>,
    children: Box<[ChildList]>,
}

impl DescriptorNode {
    fn new(record: Record, options: Option<Arc<OptionSet>>, children: Vec<ChildList>) -> Self {
        Self {
            record: Arc::new(record),
            options,
            children: children.into_boxed_slice(),
        }
    }

    /// Split an encoded record into its own fields, options and children.
    fn decode(
        kind: NodeKind,
        bytes: &[u8],
        resolver: &dyn RetentionResolver,
    ) -> Result<Self, TreeError> {
        let slots = kind.child_slots();
        let mut children: Vec<Vec<Arc<DescriptorNode>>> = vec![Vec::new(); slots.len()];
        let mut options: Option<Vec<u8>> = None;
        let mut rest = Vec::with_capacity(bytes.len());

        let mut buf = bytes;
        while !buf.is_empty() {
            let start = bytes.len() - buf.len();
            let (tag, wire_type) = decode_key(&mut buf)?;
            let number = field_number(tag)?;
            if wire_type == WireType::LengthDelimited {
                if number == kind.options_tag() {
                    // Repeated occurrences of a message field merge.
                    let value = length_delimited(&mut buf)?;
                    options.get_or_insert_with(Vec::new).extend_from_slice(value);
                    continue;
                }
                if let Some(index) = slots.iter().position(|slot| slot.tag == number) {
                    let value = length_delimited(&mut buf)?;
                    let child = Self::decode(slots[index].kind, value, resolver)?;
                    children[index].push(Arc::new(child));
                    continue;
                }
            }
            skip_field(wire_type, tag, &mut buf, DecodeContext::default())?;
            rest.extend_from_slice(&bytes[start..bytes.len() - buf.len()]);
        }

        let options = options
            .map(|bytes| OptionSet::decode(kind, &bytes, resolver).map(Arc::new))
            .transpose()?;
        let children = children.into_iter().map(ChildList::from).collect();
        Ok(Self::new(Record::decode(kind, &rest)?, options, children))
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        let kind = self.kind();
        buf.extend_from_slice(&self.record.to_bytes());
        if let Some(options) = &self.options {
            encode_length_delimited(kind.options_tag(), &options.to_bytes(), buf);
        }
        for (slot, list) in kind.child_slots().iter().zip(self.children.iter()) {
            for child in list.iter() {
                let mut encoded = Vec::new();
                child.encode(&mut encoded);
                encode_length_delimited(slot.tag, &encoded, buf);
            }
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.record.kind()
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn options(&self) -> Option<&Arc<OptionSet>> {
        self.options.as_ref()
    }

    /// Children stored under field number `tag`; empty for unknown tags.
    pub fn children(&self, tag: i32) -> &[Arc<DescriptorNode>] {
        self.kind()
            .child_slots()
            .iter()
            .position(|slot| slot.tag == tag)
            .and_then(|index| self.children.get(index))
            .map(|list| &list[..])
            .unwrap_or(&[])
    }

    pub(crate) fn child_lists(&self) -> &[ChildList] {
        &self.children
    }

    /// A copy sharing this node's record.
    pub(crate) fn with_parts(
        &self,
        options: Option<Arc<OptionSet>>,
        children: Box<[ChildList]>,
    ) -> Self {
        Self {
            record: Arc::clone(&self.record),
            options,
            children,
        }
    }
}

/// A file descriptor as a shared tree, plus its source locations.
#[derive(Debug, Clone)]
pub struct FileDescriptorTree {
    root: Arc<DescriptorNode>,
    source_code_info: Option<Arc<SourceCodeInfo>>,
}

impl FileDescriptorTree {
    /// Build a tree from an encoded `FileDescriptorProto`.
    ///
    /// Unlike [`FileDescriptorTree::from_proto`], every option field is kept,
    /// including extensions.
    pub fn from_bytes(bytes: &[u8], resolver: &impl RetentionResolver) -> Result<Self, TreeError> {
        let mut root = DescriptorNode::decode(NodeKind::File, bytes, resolver)?;
        let source_code_info = match Arc::make_mut(&mut root.record) {
            Record::File(file) => file.source_code_info.take().map(Arc::new),
            _ => None,
        };
        Ok(Self {
            root: Arc::new(root),
            source_code_info,
        })
    }

    /// Build a tree from a decoded descriptor. Extension options were
    /// already lost when `file` was decoded.
    pub fn from_proto(
        file: FileDescriptorProto,
        resolver: &impl RetentionResolver,
    ) -> Result<Self, TreeError> {
        Self::from_bytes(&file.encode_to_vec(), resolver)
    }

    /// Encode the tree as a `FileDescriptorProto`, extension options included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.root.encode(&mut buf);
        if let Some(info) = &self.source_code_info {
            encode_length_delimited(SOURCE_CODE_INFO_TAG, &info.encode_to_vec(), &mut buf);
        }
        buf
    }

    pub fn to_proto(&self) -> Result<FileDescriptorProto, TreeError> {
        Ok(FileDescriptorProto::decode(self.to_bytes().as_slice())?)
    }

    pub fn root(&self) -> &Arc<DescriptorNode> {
        &self.root
    }

    pub fn source_code_info(&self) -> Option<&Arc<SourceCodeInfo>> {
        self.source_code_info.as_ref()
    }

    pub(crate) fn from_parts(
        root: Arc<DescriptorNode>,
        source_code_info: Option<Arc<SourceCodeInfo>>,
    ) -> Self {
        Self {
            root,
            source_code_info,
        }
    }
}

fn field_number(tag: u32) -> Result<i32, TreeError> {
    i32::try_from(tag).map_err(|_| TreeError::FieldNumber(tag))
}

fn length_delimited<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], TreeError> {
    let len = decode_varint(buf)?;
    let whole: &'a [u8] = *buf;
    let len = usize::try_from(len)
        .ok()
        .filter(|&len| len <= whole.len())
        .ok_or(TreeError::Truncated)?;
    let (value, remaining) = whole.split_at(len);
    *buf = remaining;
    Ok(value)
}

fn encode_length_delimited(tag: i32, value: &[u8], buf: &mut Vec<u8>) {
    // Descriptor field numbers are small positive constants.
    encode_key(tag.unsigned_abs(), WireType::LengthDelimited, buf);
    encode_varint(value.len() as u64, buf);
    buf.extend_from_slice(value);
}
