//! Repository catalog - deduplicated, ordered view of a paginated listing
//!
//! The catalog is built by folding pages in cursor order. A repository seen on
//! more than one page (pagination boundaries can shift while the remote is
//! being modified) keeps its first position and takes its latest content. Two
//! different repositories claiming the same path would collide on one local
//! directory and abort the listing.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::credentials::Credential;
use crate::discovery::{Cursor, RepositoryDirectory, RepositoryId, RepositoryRecord};
use crate::error::ListError;

/// Ordered set of remote repositories, read-only once built
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryCatalog {
    records: Vec<RepositoryRecord>,
}

impl RepositoryCatalog {
    /// Fold already-fetched pages into a catalog
    pub fn from_pages<I>(pages: I) -> Result<Self, ListError>
    where
        I: IntoIterator<Item = Vec<RepositoryRecord>>,
    {
        pages
            .into_iter()
            .try_fold(CatalogBuilder::default(), |mut builder, page| {
                builder.absorb(page)?;
                Ok(builder)
            })
            .map(CatalogBuilder::finish)
    }

    pub fn records(&self) -> &[RepositoryRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &RepositoryRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a RepositoryCatalog {
    type Item = &'a RepositoryRecord;
    type IntoIter = std::slice::Iter<'a, RepositoryRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Accumulates pages into a [`RepositoryCatalog`]
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    records: Vec<RepositoryRecord>,
    by_id: HashMap<RepositoryId, usize>,
    by_path: HashMap<String, RepositoryId>,
}

impl CatalogBuilder {
    /// Add one page of records in arrival order
    pub fn absorb<I>(&mut self, page: I) -> Result<(), ListError>
    where
        I: IntoIterator<Item = RepositoryRecord>,
    {
        for record in page {
            self.insert(record)?;
        }
        Ok(())
    }

    fn insert(&mut self, record: RepositoryRecord) -> Result<(), ListError> {
        if let Some(&owner) = self.by_path.get(&record.path_with_namespace) {
            if owner != record.id {
                return Err(ListError::PathCollision(
                    record.path_with_namespace,
                    owner,
                    record.id,
                ));
            }
        }

        match self.by_id.get(&record.id) {
            Some(&index) => {
                let previous = &self.records[index];
                if previous.path_with_namespace != record.path_with_namespace {
                    debug!(
                        "Repository {} moved from {} to {} during listing",
                        record.id, previous.path_with_namespace, record.path_with_namespace
                    );
                    self.by_path.remove(&previous.path_with_namespace);
                    self.by_path
                        .insert(record.path_with_namespace.clone(), record.id);
                }
                self.records[index] = record;
            }
            None => {
                self.by_id.insert(record.id, self.records.len());
                self.by_path
                    .insert(record.path_with_namespace.clone(), record.id);
                self.records.push(record);
            }
        }

        Ok(())
    }

    pub fn finish(self) -> RepositoryCatalog {
        RepositoryCatalog {
            records: self.records,
        }
    }
}

/// List every repository reachable with `credential`, following cursors to the end
pub async fn list(
    directory: &dyn RepositoryDirectory,
    credential: &Credential,
) -> Result<RepositoryCatalog, ListError> {
    debug!("Listing projects from {}", directory.provider_name());

    let mut builder = CatalogBuilder::default();
    let mut seen_cursors: HashSet<Cursor> = HashSet::new();
    let mut cursor: Option<Cursor> = None;
    let mut pages = 0usize;

    loop {
        let page = directory
            .list_projects_page(credential, cursor.clone())
            .await?;
        pages += 1;
        debug!(
            "Received page {} with {} projects (cursor: {:?})",
            pages,
            page.records.len(),
            cursor
        );

        builder.absorb(page.records)?;

        match page.next {
            None => break,
            Some(next) => {
                if !seen_cursors.insert(next.clone()) {
                    return Err(ListError::CursorLoop(next.0));
                }
                cursor = Some(next);
            }
        }
    }

    let catalog = builder.finish();
    info!(
        "Found {} repositories across {} pages",
        catalog.len(),
        pages
    );
    Ok(catalog)
}
