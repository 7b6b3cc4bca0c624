//! Memoized per-page rendered content
//!
//! Pages are rendered on demand and kept for the lifetime of the
//! reading session; there is no eviction. The cache is bounded by the
//! page count of a single book and is cleared as a whole when the
//! engine is closed or re-initialized, so retention never outlives a
//! session.

use std::collections::HashMap;

use crate::{error::ReaderError, types::PageContent};

/// A page-index-keyed store of rendered pages.
#[derive(Debug, Default)]
pub struct ContentCache {
    pages: HashMap<usize, PageContent>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached page, if it has been rendered.
    pub fn get(&self, page_index: usize) -> Option<&PageContent> {
        self.pages.get(&page_index)
    }

    /// Returns the cached page, rendering and storing it on a miss
    ///
    /// The builder is only invoked when the page is absent; a builder
    /// failure leaves the cache unchanged, so the page can be retried.
    pub fn get_or_insert_with<F>(
        &mut self,
        page_index: usize,
        build: F,
    ) -> Result<&PageContent, ReaderError>
    where
        F: FnOnce() -> Result<PageContent, ReaderError>,
    {
        use std::collections::hash_map::Entry;

        match self.pages.entry(page_index) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(build()?)),
        }
    }

    /// Drops every cached page.
    pub fn clear(&mut self) {
        self.pages.clear();
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
