//! Plugin capability flags and protobuf editions.

use bitflags::bitflags;

bitflags! {
    /// Features a plugin advertises through `supported_features`.
    ///
    /// These match `CodeGeneratorResponse.Feature` exactly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Features: u64 {
        /// The plugin understands `optional` fields in proto3 files.
        const PROTO3_OPTIONAL = 0x1;
        /// The plugin understands editions, bounded by
        /// `minimum_edition` and `maximum_edition`.
        const SUPPORTS_EDITIONS = 0x2;
    }
}

impl Features {
    /// Parse a raw bitmask, failing if any bit is outside the known set.
    pub fn from_known_bits(bits: u64) -> Result<Self, UnknownFeatures> {
        Self::from_bits(bits).ok_or(UnknownFeatures(bits))
    }
}

/// A `supported_features` mask with bits outside of [`Features::all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown CodeGeneratorResponse.Features: {0:b}")]
pub struct UnknownFeatures(pub u64);

/// Protobuf editions, mirroring `google.protobuf.Edition`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Edition {
    Unknown = 0,
    Legacy = 900,
    Proto2 = 998,
    Proto3 = 999,
    Edition2023 = 1000,
    Edition2024 = 1001,
    Max = 0x7FFF_FFFF,
}
