//! Exactly-once resolution of cross-file references.
//!
//! Every reference maps to a [`ResourceKey`]. Each key owns a
//! `tokio::sync::OnceCell`: the first caller runs the resolution, concurrent
//! callers await the same cell, and later callers get the memoized payload.
//! A resolution that fails or is dropped mid-flight leaves the cell empty, so
//! nothing partial is ever memoized and the next caller starts over.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::debug;

use super::loader::{LoaderRegistry, Payload};
use super::naming::anonymous_name;
use super::record::XRefRecord;
use super::reference::{XRef, XRefStyle};
use super::source::ByteSource;
use crate::container::{decode_payload, xref_shortcut};
use crate::object::{Document, DocumentId, ObjectHandle};
use crate::util::{FormatError, ResolverOptions, ResourceError, Result};

/// Identity of a resolved resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    /// Fetched through the byte source; shared by every document.
    External(Arc<str>),
    /// Named sub-resource of one document.
    Internal(DocumentId, Arc<str>),
    /// Content-addressed embedded range; shared by every document.
    Anonymous(Arc<str>),
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External(url) => write!(f, "{url}"),
            Self::Internal(doc, url) => write!(f, "doc{}:{url}", doc.get()),
            Self::Anonymous(name) => write!(f, "{name}"),
        }
    }
}

/// A resolved reference: the payload, plus the object named by the
/// reference path when the payload is a document.
#[derive(Clone, Debug)]
pub struct Resolved {
    pub key: ResourceKey,
    pub payload: Arc<Payload>,
    pub object: Option<ObjectHandle>,
}

type Cell = Arc<OnceCell<Arc<Payload>>>;

/// Resolves cross-file references to payloads, once per key.
pub struct ResourceManager {
    source: Option<Arc<dyn ByteSource>>,
    loaders: LoaderRegistry,
    options: ResolverOptions,
    cells: Mutex<HashMap<ResourceKey, Cell>>,
    anonymous: Mutex<Vec<Arc<str>>>,
    loads: AtomicUsize,
}

impl ResourceManager {
    /// Manager without a byte source; external references fail with
    /// [`ResourceError::NoSource`].
    pub fn new(loaders: LoaderRegistry, options: ResolverOptions) -> Self {
        Self {
            source: None,
            loaders,
            options,
            cells: Mutex::new(HashMap::new()),
            anonymous: Mutex::new(Vec::new()),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn ByteSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn loaders(&self) -> &LoaderRegistry {
        &self.loaders
    }

    pub fn loaders_mut(&mut self) -> &mut LoaderRegistry {
        &mut self.loaders
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Cache key for `xref` as read from `doc`.
    ///
    /// Without a document, embedded references fall back to their original
    /// url and are fetched like external ones.
    pub fn key_for(&self, doc: Option<&Document>, xref: &XRef) -> Result<ResourceKey> {
        let (doc, index) = match (doc, xref.record()) {
            (Some(doc), Some(index)) if xref.style() != XRefStyle::External => (doc, index),
            _ => return Ok(ResourceKey::External(xref.url().into())),
        };
        match xref.style() {
            XRefStyle::Anonymous => {
                let record = record(doc, index)?;
                let name = anonymous_name(record, record.payload(doc.buffer()));
                Ok(ResourceKey::Anonymous(name.into()))
            }
            _ => Ok(ResourceKey::Internal(doc.id(), xref.url().into())),
        }
    }

    /// Resolve `xref`, read from `doc`, to its payload.
    ///
    /// Idempotent: the same key always yields the same `Arc<Payload>`.
    pub async fn resolve(&self, doc: &Document, xref: &XRef) -> Result<Arc<Payload>> {
        self.resolve_in(Some(doc), xref).await
    }

    /// Resolve a reference that does not come from a document.
    pub async fn resolve_external(&self, xref: &XRef) -> Result<Arc<Payload>> {
        self.resolve_in(None, xref).await
    }

    /// Resolve `xref` and, for document payloads, the object its path names.
    ///
    /// The path is looked up in the nested document's shortcut table; with
    /// no path the nested root is returned.
    pub async fn resolve_target(&self, doc: Option<&Document>, xref: &XRef) -> Result<Resolved> {
        let key = self.key_for(doc, xref)?;
        let payload = self.resolve_in(doc, xref).await?;
        let object = match (payload.as_document(), xref.path()) {
            (Some(nested), Some(path)) => {
                let offset = nested
                    .shortcuts()
                    .get(path)
                    .ok_or_else(|| FormatError::MissingShortcut(path.to_string()))?;
                Some(nested.object_at(offset as i32, 0)?)
            }
            (Some(nested), None) => Some(nested.root()),
            _ => None,
        };
        Ok(Resolved { key, payload, object })
    }

    async fn resolve_in(&self, doc: Option<&Document>, xref: &XRef) -> Result<Arc<Payload>> {
        let key = self.key_for(doc, xref)?;
        let cell = self.cell(&key);
        let payload = cell.get_or_try_init(|| self.load(doc, xref, &key)).await?;
        Ok(payload.clone())
    }

    /// Memoized payload for `key`, if resolution has completed.
    pub fn cached(&self, key: &ResourceKey) -> Option<Arc<Payload>> {
        self.cells.lock().get(key).and_then(|c| c.get().cloned())
    }

    pub fn is_cached(&self, key: &ResourceKey) -> bool {
        self.cached(key).is_some()
    }

    /// Synthesized names of resolved anonymous resources, in resolution order.
    pub fn anonymous_names(&self) -> Vec<Arc<str>> {
        self.anonymous.lock().clone()
    }

    /// Number of resolutions that ran to completion.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Drop every memoized payload.
    pub fn clear(&self) {
        self.cells.lock().clear();
        self.anonymous.lock().clear();
    }

    fn cell(&self, key: &ResourceKey) -> Cell {
        self.cells.lock().entry(key.clone()).or_default().clone()
    }

    async fn load(&self, doc: Option<&Document>, xref: &XRef, key: &ResourceKey) -> Result<Arc<Payload>> {
        let payload = match (key, doc, xref.record()) {
            (ResourceKey::Internal(_, url), Some(doc), Some(index)) => self.load_embedded(doc, index, url)?,
            (ResourceKey::Anonymous(name), Some(doc), Some(index)) => {
                let payload = self.load_embedded(doc, index, name)?;
                self.anonymous.lock().push(name.clone());
                payload
            }
            _ => {
                let url = xref.url();
                let source = self.source.as_ref().ok_or_else(|| ResourceError::NoSource(url.to_string()))?;
                let bytes = source.fetch(url).await?;
                debug!(url, bytes = bytes.len(), "fetched external resource");
                self.loaders.load(url, bytes)?
            }
        };

        self.loads.fetch_add(1, Ordering::SeqCst);
        debug!(key = %key, kind = payload.kind(), "resolved cross-file reference");
        Ok(Arc::new(payload))
    }

    fn load_embedded(&self, doc: &Document, index: usize, target: &str) -> Result<Payload> {
        let record = record(doc, index)?;
        let raw = record.payload(doc.buffer());
        let bytes = decode_payload(raw, &record.encoding, self.options.decompress_limit, target)?;
        self.loaders.load(target, bytes.into_owned())
    }
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceManager")
            .field("has_source", &self.source.is_some())
            .field("loaders", &self.loaders)
            .field("cells", &self.cells.lock().len())
            .finish()
    }
}

fn record(doc: &Document, index: usize) -> Result<&XRefRecord> {
    doc.record(index)
        .ok_or_else(|| FormatError::MissingShortcut(xref_shortcut(index)).into())
}
