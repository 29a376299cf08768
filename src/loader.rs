//! Loader contract and format dispatch.
//!
//! One capability — `load_bytes(source) -> Ok(Some(Activity)) | Ok(None) | Err`
//! — with one implementation per source format. The format is always supplied
//! by the caller; nothing probes file content. `Ok(None)` means the document
//! is well-formed but carries no activity subtree, which is a legitimate
//! empty result, not a failure.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::LoadError;
use crate::fit::FitLoader;
use crate::gpx::GpxLoader;
use crate::model::Activity;
use crate::tcx::TcxLoader;

/// Source format, selected explicitly by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Tcx,
    Gpx,
    Fit,
}

/// Format-specific adapter producing a canonical [`Activity`].
///
/// Loaders are stateless; independent loads may run concurrently without
/// coordination, and each returned activity aliases nothing.
pub trait ActivityLoader {
    /// Parse one source document end-to-end. Absence of the minimal activity
    /// subtree yields `Ok(None)`; a failed load never yields a partial
    /// activity.
    fn load_bytes(&self, data: &[u8]) -> Result<Option<Activity>, LoadError>;

    /// Read a file and load it.
    fn load_path(&self, path: &Path) -> Result<Option<Activity>, LoadError> {
        let data = fs::read(path)?;
        self.load_bytes(&data)
    }
}

/// Load an activity from in-memory bytes in the given format.
pub fn load_bytes(data: &[u8], format: Format) -> Result<Option<Activity>, LoadError> {
    match format {
        Format::Tcx => TcxLoader.load_bytes(data),
        Format::Gpx => GpxLoader.load_bytes(data),
        Format::Fit => FitLoader.load_bytes(data),
    }
}

/// Load an activity from a file in the given format.
pub fn load_file(path: impl AsRef<Path>, format: Format) -> Result<Option<Activity>, LoadError> {
    match format {
        Format::Tcx => TcxLoader.load_path(path.as_ref()),
        Format::Gpx => GpxLoader.load_path(path.as_ref()),
        Format::Fit => FitLoader.load_path(path.as_ref()),
    }
}

// ============================================================================
// Shared parsing helpers (XML loaders)
// ============================================================================

/// Parse an ISO 8601 timestamp (with `Z` or numeric offset) to UTC.
pub(crate) fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, LoadError> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| LoadError::Timestamp {
            text: text.to_string(),
        })
}

/// Decode and parse an XML document.
pub(crate) fn parse_xml<'a>(
    data: &'a [u8],
    format: &'static str,
) -> Result<roxmltree::Document<'a>, LoadError> {
    let text = std::str::from_utf8(data).map_err(|e| LoadError::Malformed {
        format,
        message: e.to_string(),
    })?;
    roxmltree::Document::parse(text).map_err(|e| LoadError::Malformed {
        format,
        message: e.to_string(),
    })
}

/// First child element with the given local name, namespace-agnostic.
pub(crate) fn child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

/// All child elements with the given local name, in document order.
pub(crate) fn children<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

/// Trimmed text content of the first matching child, if present and non-empty.
pub(crate) fn child_text<'a>(node: roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
    let text = child(node, name)?.text()?.trim();
    (!text.is_empty()).then_some(text)
}

/// Parse element text as f64; present-but-unparsable text is a load error.
pub(crate) fn parse_f64(text: &str, field: &'static str) -> Result<f64, LoadError> {
    text.trim().parse().map_err(|_| LoadError::Field {
        field,
        text: text.to_string(),
    })
}

/// Parse element text as i64; present-but-unparsable text is a load error.
pub(crate) fn parse_i64(text: &str, field: &'static str) -> Result<i64, LoadError> {
    text.trim().parse().map_err(|_| LoadError::Field {
        field,
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_utc_suffix() {
        let ts = parse_timestamp("2024-03-10T08:15:30Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-10T08:15:30+00:00");
    }

    #[test]
    fn test_parse_timestamp_offset_normalized() {
        let ts = parse_timestamp("2024-03-10T09:15:30+01:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-10T08:15:30+00:00");
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("not-a-date"),
            Err(LoadError::Timestamp { .. })
        ));
    }

    #[test]
    fn test_child_lookup_ignores_namespace() {
        let doc = roxmltree::Document::parse(
            r#"<a xmlns:x="urn:test"><x:b>7.5</x:b></a>"#,
        )
        .unwrap();
        let root = doc.root_element();
        assert_eq!(child_text(root, "b"), Some("7.5"));
        assert_eq!(parse_f64(child_text(root, "b").unwrap(), "b").unwrap(), 7.5);
    }

    #[test]
    fn test_parse_f64_rejects_text() {
        assert!(matches!(
            parse_f64("abc", "distance"),
            Err(LoadError::Field { field: "distance", .. })
        ));
    }
}
