//! Descriptor registry: validated, indexed, immutable snapshots.
//!
//! A [`Registry`] is built in full from a content source and never mutated
//! afterwards. [`SharedRegistry`] publishes snapshots and swaps them on
//! reload so resolutions always see one consistent table.

pub mod graph;
pub mod shared;
pub mod source;

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::PathBuf;
use std::sync::Arc;

use capsmith_types::descriptor::{Descriptor, DescriptorKind};
use capsmith_types::error::{LoadError, NotFound};

use crate::manifest::load_descriptor;

pub use shared::SharedRegistry;
pub use source::{ContentSource, InMemorySource};

/// One unparsed descriptor file as produced by a content source.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub kind: DescriptorKind,
    /// Id to use when the frontmatter does not declare one.
    pub fallback_id: String,
    pub path: PathBuf,
    pub content: String,
}

/// An immutable, indexed table of descriptors.
///
/// Descriptors are held in id order so every iteration over a snapshot is
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    descriptors: BTreeMap<String, Arc<Descriptor>>,
    by_tag: BTreeMap<String, Vec<String>>,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse, validate and index raw documents.
    ///
    /// # Errors
    ///
    /// - [`LoadError::Malformed`] for a document whose frontmatter fails to
    ///   parse or validate
    /// - [`LoadError::DuplicateId`] when two documents share an id
    /// - [`LoadError::DependencyCycle`] when `depends_on` edges form a cycle
    pub fn from_documents(documents: Vec<RawDocument>) -> Result<Self, LoadError> {
        let mut descriptors = Vec::with_capacity(documents.len());
        for doc in documents {
            let descriptor =
                load_descriptor(&doc.content, doc.kind, &doc.fallback_id, Some(&doc.path))
                    .map_err(|e| LoadError::Malformed {
                        path: doc.path.display().to_string(),
                        reason: format!("{e:#}"),
                    })?;
            descriptors.push(descriptor);
        }
        Self::from_descriptors(descriptors)
    }

    /// Index already-normalized descriptors.
    ///
    /// Runs the duplicate-id and dependency-cycle checks but not manifest
    /// validation.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = Descriptor>,
    ) -> Result<Self, LoadError> {
        let mut table: BTreeMap<String, Arc<Descriptor>> = BTreeMap::new();

        for descriptor in descriptors {
            match table.entry(descriptor.id.clone()) {
                Entry::Occupied(existing) => {
                    return Err(LoadError::DuplicateId {
                        id: descriptor.id.clone(),
                        first: origin(existing.get()),
                        second: origin(&descriptor),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(descriptor));
                }
            }
        }

        if let Some(cycle) = graph::find_cycle(&table) {
            return Err(LoadError::DependencyCycle { cycle });
        }

        let mut by_tag: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (id, descriptor) in &table {
            for tag in &descriptor.tags {
                by_tag.entry(tag.clone()).or_default().push(id.clone());
            }
        }

        let unresolved = table
            .values()
            .flat_map(|d| d.depends_on.iter())
            .filter(|dep| !table.contains_key(*dep))
            .count();
        if unresolved > 0 {
            tracing::debug!(
                unresolved,
                "registry has dependency references to descriptors it does not contain"
            );
        }

        Ok(Self {
            descriptors: table,
            by_tag,
        })
    }

    /// Index descriptors with no load-time checks, so tests can build
    /// snapshots the loader would reject.
    #[cfg(test)]
    pub(crate) fn from_unchecked(descriptors: Vec<Descriptor>) -> Self {
        Self {
            descriptors: descriptors
                .into_iter()
                .map(|d| (d.id.clone(), Arc::new(d)))
                .collect(),
            by_tag: BTreeMap::new(),
        }
    }

    /// Look up a descriptor by id.
    pub fn lookup(&self, id: &str) -> Result<&Arc<Descriptor>, NotFound> {
        self.descriptors
            .get(id)
            .ok_or_else(|| NotFound(id.to_owned()))
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Descriptor>> {
        self.descriptors.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.descriptors.contains_key(id)
    }

    /// Descriptors carrying `tag`, in id order.
    ///
    /// The returned iterator is lazy and finite; clone it (or call `by_tag`
    /// again) to restart.
    pub fn by_tag<'a>(&'a self, tag: &str) -> TagIter<'a> {
        let ids = self
            .by_tag
            .get(tag.trim().to_lowercase().as_str())
            .map_or(&[][..], Vec::as_slice);
        TagIter {
            ids: ids.iter(),
            descriptors: &self.descriptors,
        }
    }

    /// Descriptors of one kind, in id order.
    pub fn by_kind(
        &self,
        kind: DescriptorKind,
    ) -> impl Iterator<Item = &Arc<Descriptor>> + Clone + '_ {
        self.descriptors.values().filter(move |d| d.kind == kind)
    }

    /// All descriptors in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Descriptor>> + Clone + '_ {
        self.descriptors.values()
    }

    /// Every tag with the number of descriptors carrying it.
    pub fn tags(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.by_tag.iter().map(|(t, ids)| (t.as_str(), ids.len()))
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Lazy iterator over the descriptors carrying one tag.
#[derive(Debug, Clone)]
pub struct TagIter<'a> {
    ids: std::slice::Iter<'a, String>,
    descriptors: &'a BTreeMap<String, Arc<Descriptor>>,
}

impl<'a> Iterator for TagIter<'a> {
    type Item = &'a Arc<Descriptor>;

    fn next(&mut self) -> Option<Self::Item> {
        // The tag index is built from the same table, so every id resolves.
        self.ids.by_ref().find_map(|id| self.descriptors.get(id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.ids.len()))
    }
}

fn origin(descriptor: &Descriptor) -> String {
    descriptor
        .source
        .as_ref()
        .map_or_else(|| "<memory>".to_owned(), |p| p.display().to_string())
}
