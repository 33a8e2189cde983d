//! Error types for the scenepack library.
//!
//! Errors fall into three families:
//! - [`FormatError`] - the buffer is malformed; fatal to the document being decoded
//! - [`ResourceError`] - fetching an external resource failed; surfaced without retry
//! - [`InvariantViolation`] - the caller broke a graph or cache invariant
//!
//! Variants carry the originating byte offset or node key where one exists.

use std::path::PathBuf;
use thiserror::Error;

use crate::graph::NodeKey;
use crate::object::Version;

/// Main error type for scenepack operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The buffer does not follow the container format.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// A cross-file resource could not be obtained.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// A graph or cache invariant was violated by the caller.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MmapFailed(String),

    /// Configuration file could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Structural problems in a container buffer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    /// A section marker did not match.
    #[error("Magic mismatch at offset {offset}: expected {}, found {}", magic_name(*expected), magic_name(*found))]
    MagicMismatch { expected: u32, found: u32, offset: usize },

    /// Read past the end of the buffer.
    #[error("Unexpected end of buffer at offset {offset} (needed {needed} bytes)")]
    UnexpectedEof { offset: usize, needed: usize },

    /// Packed integer exceeds 30 bits or runs longer than 5 bytes.
    #[error("Packed integer overflow at offset {offset}")]
    VarintOverflow { offset: usize },

    /// Value type tag not known to this reader.
    #[error("Unknown type tag 0x{tag:02x} at offset {offset}")]
    UnknownTypeTag { tag: u8, offset: usize },

    /// Reference points into the header or outside the buffer.
    #[error("Invalid reference to offset {target} (read at offset {at})")]
    InvalidReference { target: i32, at: usize },

    /// Interned string id has no entry in the string table.
    #[error("Unknown string id {id} at offset {offset}")]
    UnknownString { id: u32, offset: usize },

    /// A string is not valid UTF-8.
    #[error("Invalid UTF-8 at offset {offset}")]
    InvalidUtf8 { offset: usize },

    /// File version is outside the supported range.
    #[error("Unsupported file version {0}")]
    UnsupportedVersion(Version),

    /// A required shortcut entry is absent.
    #[error("Missing shortcut entry '{0}'")]
    MissingShortcut(String),

    /// Section offset in the header is not usable.
    #[error("Invalid section offset {offset} for {section}")]
    InvalidSection { section: &'static str, offset: i32 },

    /// Array length exceeds the configured limit.
    #[error("Array of {len} entries at offset {offset} exceeds limit {limit}")]
    ArrayTooLong { len: usize, limit: usize, offset: usize },

    /// Inline objects nest deeper than the configured limit.
    #[error("Inline objects nested deeper than {limit} at offset {offset}")]
    NestingTooDeep { limit: usize, offset: usize },

    /// Cross-reference record style byte is unknown.
    #[error("Unknown cross-reference style {style} at offset {offset}")]
    UnknownXRefStyle { style: u8, offset: usize },

    /// No loader is registered for a resolved target's extension.
    #[error("No loader registered for extension '{extension}' (target '{target}')")]
    MissingLoader { extension: String, target: String },

    /// Embedded payload encoding is unknown.
    #[error("Unsupported payload encoding '{0}'")]
    UnsupportedEncoding(String),

    /// Embedded payload failed to decompress.
    #[error("Failed to decompress '{target}': {reason}")]
    Decompress { target: String, reason: String },

    /// A payload loader rejected its input.
    #[error("Malformed payload '{target}': {reason}")]
    MalformedPayload { target: String, reason: String },
}

/// Failures of the external byte source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// The byte source reported a failure for this url.
    #[error("Failed to fetch '{url}': {reason}")]
    FetchFailed { url: String, reason: String },

    /// The manager has no byte source for external urls.
    #[error("No byte source configured to fetch '{0}'")]
    NoSource(String),
}

/// Programming errors: the caller asked for something the graph must never allow.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvariantViolation {
    /// A node was added as its own child.
    #[error("Node {0} cannot be its own parent")]
    SelfParent(NodeKey),

    /// The edge would close a cycle in the parent relation.
    #[error("Adding {child} under {parent} would create a cycle")]
    Cycle { parent: NodeKey, child: NodeKey },

    /// The key does not name a live node.
    #[error("Node {0} does not exist")]
    StaleNode(NodeKey),

    /// An offset was cached as a different kind of entry.
    #[error("Offset {offset} is cached as {cached}, requested as {requested}")]
    CachedKindMismatch { offset: i32, cached: &'static str, requested: &'static str },

    /// Two components would provide the same feature.
    #[error("Node {node}: feature {feature} is already provided by {owner}")]
    FeatureConflict { node: NodeKey, feature: &'static str, owner: &'static str },

    /// The component is not attached to the node.
    #[error("Node {node} has no {kind} component")]
    MissingComponent { node: NodeKey, kind: &'static str },

    /// The node has no child with this id.
    #[error("Node {node} has no child '{id}'")]
    MissingChild { node: NodeKey, id: String },

    /// The handle does not belong to this document.
    #[error("Object handle {0} is not part of this document")]
    StaleHandle(u32),
}

fn magic_name(magic: u32) -> String {
    let bytes = magic.to_le_bytes();
    if bytes.iter().all(|b| b.is_ascii_graphic()) {
        format!("'{}'", String::from_utf8_lossy(&bytes))
    } else {
        format!("0x{magic:08x}")
    }
}

impl Error {
    /// Byte offset the error originated at, when known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::Format(e) => e.offset(),
            _ => None,
        }
    }

    /// True for errors that abort decoding of the whole document.
    pub fn is_fatal_format(&self) -> bool {
        matches!(self, Self::Format(_))
    }
}

impl FormatError {
    /// Byte offset the error originated at, when known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::MagicMismatch { offset, .. }
            | Self::UnexpectedEof { offset, .. }
            | Self::VarintOverflow { offset }
            | Self::UnknownTypeTag { offset, .. }
            | Self::UnknownString { offset, .. }
            | Self::InvalidUtf8 { offset }
            | Self::ArrayTooLong { offset, .. }
            | Self::NestingTooDeep { offset, .. }
            | Self::UnknownXRefStyle { offset, .. } => Some(*offset),
            Self::InvalidReference { at, .. } => Some(*at),
            _ => None,
        }
    }
}

/// Result type alias for scenepack operations.
pub type Result<T> = std::result::Result<T, Error>;
