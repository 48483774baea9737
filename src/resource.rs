//! Trusted schema resources
//!
//! Every trusted schema is read into memory once, when it is registered. The resolver then
//! hands out a fresh view of the same bytes for every reference, so a schema that is imported
//! twice during one validation run is served twice without re-reading any stream.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::error::Result;

/// A schema document the caller vouches for, recognized by its canonical system id
#[derive(Clone)]
pub struct TrustedResource {
    canonical_id: String,
    content: Arc<[u8]>,
}

impl TrustedResource {
    pub fn from_bytes(canonical_id: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            canonical_id: canonical_id.into(),
            content: Arc::from(content.into()),
        }
    }

    /// Drain a single-read stream into an owned buffer
    pub fn from_reader(canonical_id: impl Into<String>, mut reader: impl Read) -> Result<Self> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        Ok(Self::from_bytes(canonical_id, content))
    }

    pub fn from_path(canonical_id: impl Into<String>, path: &Path) -> Result<Self> {
        let content = std::fs::read(path)?;
        Ok(Self::from_bytes(canonical_id, content))
    }

    pub fn canonical_id(&self) -> &str {
        &self.canonical_id
    }

    /// Final path segment of the canonical id
    pub fn filename(&self) -> &str {
        filename_of(&self.canonical_id)
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// A fresh readable view over the buffered content
    pub fn open(&self) -> std::io::Cursor<&[u8]> {
        std::io::Cursor::new(&self.content[..])
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl fmt::Debug for TrustedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustedResource")
            .field("canonical_id", &self.canonical_id)
            .field("len", &self.content.len())
            .finish()
    }
}

/// Final path segment of a system id, ignoring any query or fragment.
///
/// Works on URIs, plain paths and bare names alike; Windows separators count as `/`.
pub fn filename_of(system_id: &str) -> &str {
    let end = system_id.find(['?', '#']).unwrap_or(system_id.len());
    let path = &system_id[..end];
    match path.rfind(['/', '\\']) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Ordered allow-list of trusted resources for one validation call.
///
/// Cloning is cheap: contents are shared, never copied.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    resources: Vec<TrustedResource>,
}

impl SchemaRegistry {
    pub fn new(resources: Vec<TrustedResource>) -> Self {
        let registry = Self { resources };
        for (filename, count) in registry.filename_counts() {
            if count > 1 {
                warn!(
                    filename,
                    count, "trusted resources share a filename; filename matching is disabled for it"
                );
            }
        }
        registry
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn resources(&self) -> &[TrustedResource] {
        &self.resources
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrustedResource> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Filenames registered more than once, in registration order
    pub fn ambiguous_filenames(&self) -> Vec<&str> {
        let counts = self.filename_counts();
        let mut seen = Vec::new();
        for resource in &self.resources {
            let name = resource.filename();
            if counts.get(name).copied().unwrap_or(0) > 1 && !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }

    fn filename_counts(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for resource in &self.resources {
            *counts.entry(resource.filename()).or_insert(0) += 1;
        }
        counts
    }
}

impl From<Vec<TrustedResource>> for SchemaRegistry {
    fn from(resources: Vec<TrustedResource>) -> Self {
        Self::new(resources)
    }
}

impl FromIterator<TrustedResource> for SchemaRegistry {
    fn from_iter<I: IntoIterator<Item = TrustedResource>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SchemaRegistry {
    type Item = &'a TrustedResource;
    type IntoIter = std::slice::Iter<'a, TrustedResource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.iter()
    }
}
