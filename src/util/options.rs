//! Decoder and resolver configuration.
//!
//! Both option sets deserialize from JSON with every field optional, so a
//! config file only has to name what it changes:
//!
//! ```json
//! { "decode": { "validate_on_open": true }, "resolver": { "decompress_limit": 1048576 } }
//! ```

use std::path::Path;

use serde::Deserialize;

use super::{Error, Result};

/// Options controlling how a document buffer is decoded.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Decode every reachable object at open, failing the open on any error.
    ///
    /// Off by default: objects then decode on first access, and a fatal
    /// error deeper in the file surfaces from that access instead of `open`.
    pub validate_on_open: bool,
    /// Upper bound on the entry count of a single array value.
    pub max_array_len: usize,
    /// Upper bound on nesting of inline objects and arrays.
    pub max_inline_depth: usize,
    /// Memory-map files instead of reading them into memory.
    pub use_mmap: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            validate_on_open: false,
            max_array_len: 1 << 24,
            max_inline_depth: 64,
            use_mmap: true,
        }
    }
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate_on_open(mut self, yes: bool) -> Self {
        self.validate_on_open = yes;
        self
    }

    pub fn max_array_len(mut self, len: usize) -> Self {
        self.max_array_len = len;
        self
    }

    pub fn max_inline_depth(mut self, depth: usize) -> Self {
        self.max_inline_depth = depth;
        self
    }

    pub fn use_mmap(mut self, yes: bool) -> Self {
        self.use_mmap = yes;
        self
    }
}

/// Options for the cross-file resource manager.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResolverOptions {
    /// Largest decompressed size accepted for an embedded payload.
    pub decompress_limit: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self { decompress_limit: 256 * 1024 * 1024 }
    }
}

impl ResolverOptions {
    pub fn decompress_limit(mut self, limit: usize) -> Self {
        self.decompress_limit = limit;
        self
    }
}

/// Top-level configuration file layout.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub decode: DecodeOptions,
    pub resolver: ResolverOptions,
}

impl Config {
    /// Parse a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a configuration from a JSON file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        Self::from_json(&text)
    }
}
