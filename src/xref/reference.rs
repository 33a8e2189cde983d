//! Cross-file references.

use std::fmt;
use std::sync::Arc;

/// How a cross-file reference is satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum XRefStyle {
    /// Bytes must be fetched from outside the buffer.
    External,
    /// Named sub-resource stored inside the buffer.
    Internal,
    /// Embedded byte range identified by content, named on resolution.
    Anonymous,
}

impl XRefStyle {
    /// Decode the style byte of an internalized record.
    pub fn from_record_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Internal),
            2 => Some(Self::Anonymous),
            _ => None,
        }
    }

    pub fn record_tag(self) -> u8 {
        match self {
            Self::External => 0,
            Self::Internal => 1,
            Self::Anonymous => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::External => "external",
            Self::Internal => "internal",
            Self::Anonymous => "anonymous",
        }
    }
}

/// A reference to content outside the current object graph.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct XRef {
    url: Arc<str>,
    path: Option<Arc<str>>,
    style: XRefStyle,
    /// Index of the internalized record backing this reference.
    record: Option<usize>,
}

impl XRef {
    /// Reference to be fetched through the byte source.
    pub fn external(url: impl Into<Arc<str>>, path: Option<Arc<str>>) -> Self {
        Self { url: url.into(), path, style: XRefStyle::External, record: None }
    }

    /// Reference satisfied by the buffer's own record `record`.
    pub fn internalized(url: Arc<str>, path: Option<Arc<str>>, style: XRefStyle, record: usize) -> Self {
        Self { url, path, style, record: Some(record) }
    }

    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Path inside the target, if the reference names one.
    #[inline]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    #[inline]
    pub fn style(&self) -> XRefStyle {
        self.style
    }

    #[inline]
    pub fn record(&self) -> Option<usize> {
        self.record
    }

    /// The resource the reference resolves to.
    pub fn target(&self) -> &str {
        &self.url
    }

    /// Final path segment of the url.
    pub fn file_name(&self) -> &str {
        file_name(&self.url)
    }
}

impl fmt::Display for XRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.style.name(), self.url)?;
        if let Some(p) = &self.path {
            write!(f, "#{p}")?;
        }
        Ok(())
    }
}

/// Final path segment of a url or file path, without query or fragment.
pub fn file_name(url: &str) -> &str {
    let url = url.split(['?', '#']).next().unwrap_or(url);
    url.rsplit(['/', '\\']).next().unwrap_or(url)
}

/// Lower-case extension of a url's final segment.
pub fn extension(url: &str) -> Option<String> {
    let name = file_name(url);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("https://cdn.example.com/a/b/wood.PNG?v=3"), "wood.PNG");
        assert_eq!(file_name("textures\\rough.jpg"), "rough.jpg");
        assert_eq!(file_name("plain"), "plain");
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("https://cdn.example.com/a/wood.PNG?v=3").as_deref(), Some("png"));
        assert_eq!(extension("scene.v2.scp").as_deref(), Some("scp"));
        assert_eq!(extension("README"), None);
        assert_eq!(extension(".hidden"), None);
    }

    #[test]
    fn test_style_tags() {
        for style in [XRefStyle::Internal, XRefStyle::Anonymous] {
            assert_eq!(XRefStyle::from_record_tag(style.record_tag()), Some(style));
        }
        assert_eq!(XRefStyle::from_record_tag(0), None);
        assert_eq!(XRefStyle::from_record_tag(9), None);
    }

    #[test]
    fn test_display() {
        let x = XRef::external("meshes/chair.bin", Some("lod0".into()));
        assert_eq!(x.to_string(), "external meshes/chair.bin#lod0");
    }
}
