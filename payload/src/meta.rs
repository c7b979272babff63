use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobType {
    #[default]
    File,
    Directory,
}

/// The metadata of a single blob.
///
/// This is a client-side snapshot. The cluster holds the authoritative copy
/// and nothing here is refreshed automatically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMeta {
    pub name: String,
    pub blob_type: BlobType,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub size: u64,
}

impl BlobMeta {
    pub fn new(name: impl Into<String>, blob_type: BlobType) -> Self {
        Self {
            name: name.into(),
            blob_type,
            ..Default::default()
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, BlobType::File)
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, BlobType::Directory)
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Sets a metadata field, replacing any previous value for the key.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}
