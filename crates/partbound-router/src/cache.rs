use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use partbound_core::{PartitionDesc, Predicate, RelationId};

use crate::catalog::Catalog;
use crate::error::{Result, RouterError};

#[derive(Debug)]
struct CachedDesc {
    desc: Arc<PartitionDesc>,
    valid: bool,
}

#[derive(Debug, Default)]
struct DescState {
    descs: HashMap<RelationId, CachedDesc>,
    /// Bumped by every invalidation of the relation.
    generations: HashMap<RelationId, u64>,
}

impl DescState {
    fn generation(&self, relation: RelationId) -> u64 {
        self.generations.get(&relation).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct QualState {
    quals: HashMap<RelationId, Arc<Vec<Predicate>>>,
    /// Bumped by every invalidation of any relation.
    epoch: u64,
}

/// Published partition descriptors and partition constraints.
///
/// A descriptor is never modified once published. Rebuilding constructs a
/// new one outside the lock and swaps the `Arc` under a short write lock,
/// so readers see either the old or the new descriptor in full. Readers
/// still holding the old `Arc` keep using it until they drop it.
///
/// Each invalidation bumps a counter. A rebuild or a computed constraint
/// is only published when no invalidation arrived while it was being read
/// from the catalog; otherwise it is handed to the caller and the entry
/// stays stale.
#[derive(Debug, Default)]
pub struct PartitionDescCache {
    descs: RwLock<DescState>,
    quals: RwLock<QualState>,
}

impl PartitionDescCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, catalog: &dyn Catalog, relation: RelationId) -> Result<Arc<PartitionDesc>> {
        if let Some(cached) = self.descs.read().descs.get(&relation) {
            if cached.valid {
                return Ok(Arc::clone(&cached.desc));
            }
        }
        self.rebuild(catalog, relation)
    }

    /// Reads the partitions of `relation` from the catalog and publishes a
    /// fresh descriptor. An equivalent descriptor already in the cache is
    /// kept instead so that holders of it stay current.
    pub fn rebuild(&self, catalog: &dyn Catalog, relation: RelationId) -> Result<Arc<PartitionDesc>> {
        let generation = self.descs.read().generation(relation);
        let info = catalog.relation(relation)?;
        let key = catalog
            .partition_key(relation)?
            .ok_or_else(|| RouterError::NotPartitioned(info.name.clone()))?;
        let children = catalog.partitions(relation)?;
        let catalog_default = catalog.default_partition(relation)?;
        let built = PartitionDesc::build(&key, &children, catalog_default)?;

        let mut state = self.descs.write();
        if state.generation(relation) != generation {
            log::debug!(
                "partition descriptor of \"{}\" was invalidated while it was built",
                info.name
            );
            return Ok(Arc::new(built));
        }
        if let Some(cached) = state.descs.get_mut(&relation) {
            if cached.desc.equivalent(&key, &built) {
                log::debug!("keeping partition descriptor of \"{}\"", info.name);
                cached.valid = true;
                return Ok(Arc::clone(&cached.desc));
            }
        }
        log::debug!(
            "built partition descriptor of \"{}\" with {} partitions",
            info.name,
            built.nparts()
        );
        let desc = Arc::new(built);
        state.descs.insert(
            relation,
            CachedDesc {
                desc: Arc::clone(&desc),
                valid: true,
            },
        );
        Ok(desc)
    }

    /// Marks the descriptor of `relation` stale. Partition constraints
    /// depend on every ancestor, so all of them are dropped.
    pub fn invalidate(&self, relation: RelationId) {
        {
            let mut state = self.descs.write();
            *state.generations.entry(relation).or_default() += 1;
            if let Some(cached) = state.descs.get_mut(&relation) {
                cached.valid = false;
            }
        }
        let mut quals = self.quals.write();
        quals.quals.clear();
        quals.epoch += 1;
    }

    /// Current constraint epoch, to be passed back to [`Self::store_qual`].
    pub fn qual_epoch(&self) -> u64 {
        self.quals.read().epoch
    }

    pub fn cached_qual(&self, relation: RelationId) -> Option<Arc<Vec<Predicate>>> {
        self.quals.read().quals.get(&relation).cloned()
    }

    /// Caches `qual` unless an invalidation happened after `epoch` was
    /// read. Returns it either way.
    pub fn store_qual(
        &self,
        relation: RelationId,
        epoch: u64,
        qual: Vec<Predicate>,
    ) -> Arc<Vec<Predicate>> {
        let qual = Arc::new(qual);
        let mut quals = self.quals.write();
        if quals.epoch == epoch {
            quals.quals.insert(relation, Arc::clone(&qual));
        }
        qual
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::catalog::{MemoryCatalog, RelationInfo};
    use crate::error::CatalogError;
    use crate::layout::TupleLayout;
    use partbound_core::{ColumnType, KeyColumn, PartitionBoundSpec, PartitionKey, Value};

    /// Attaches `codes_2` and invalidates the parent the first time the
    /// default partition is looked up, as a concurrent session would in the
    /// middle of a rebuild.
    struct AttachDuringRebuild<'a> {
        inner: &'a MemoryCatalog,
        cache: &'a PartitionDescCache,
        fired: AtomicBool,
    }

    impl<'a> AttachDuringRebuild<'a> {
        fn new(inner: &'a MemoryCatalog, cache: &'a PartitionDescCache) -> Self {
            Self {
                inner,
                cache,
                fired: AtomicBool::new(false),
            }
        }
    }

    impl Catalog for AttachDuringRebuild<'_> {
        fn relation(&self, id: RelationId) -> std::result::Result<RelationInfo, CatalogError> {
            self.inner.relation(id)
        }

        fn partition_key(
            &self,
            id: RelationId,
        ) -> std::result::Result<Option<PartitionKey>, CatalogError> {
            self.inner.partition_key(id)
        }

        fn partitions(
            &self,
            parent: RelationId,
        ) -> std::result::Result<Vec<(RelationId, PartitionBoundSpec)>, CatalogError> {
            self.inner.partitions(parent)
        }

        fn partition_bound(
            &self,
            child: RelationId,
        ) -> std::result::Result<Option<(RelationId, PartitionBoundSpec)>, CatalogError> {
            self.inner.partition_bound(child)
        }

        fn default_partition(
            &self,
            parent: RelationId,
        ) -> std::result::Result<Option<RelationId>, CatalogError> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                let layout: TupleLayout = [("code", ColumnType::Integer)].into_iter().collect();
                let child = self.inner.create_table("codes_2", layout).unwrap();
                self.inner
                    .attach(parent, child, &PartitionBoundSpec::list(vec![Value::Integer(2)]))
                    .unwrap();
                self.cache.invalidate(parent);
            }
            self.inner.default_partition(parent)
        }

        fn attach(
            &self,
            parent: RelationId,
            child: RelationId,
            spec: &PartitionBoundSpec,
        ) -> std::result::Result<(), CatalogError> {
            self.inner.attach(parent, child, spec)
        }

        fn detach(
            &self,
            parent: RelationId,
            child: RelationId,
        ) -> std::result::Result<PartitionBoundSpec, CatalogError> {
            self.inner.detach(parent, child)
        }

        fn scan_rows(&self, relation: RelationId) -> std::result::Result<Vec<Vec<Value>>, CatalogError> {
            self.inner.scan_rows(relation)
        }

        fn insert_row(
            &self,
            relation: RelationId,
            row: Vec<Value>,
        ) -> std::result::Result<(), CatalogError> {
            self.inner.insert_row(relation, row)
        }
    }

    fn setup() -> (MemoryCatalog, RelationId) {
        let catalog = MemoryCatalog::new();
        let layout: TupleLayout = [("code", ColumnType::Integer)].into_iter().collect();
        let parent = catalog
            .create_partitioned_table(
                "codes",
                layout.clone(),
                PartitionKey::list(KeyColumn::column("code", 0, ColumnType::Integer)),
            )
            .unwrap();
        let child = catalog.create_table("codes_1", layout).unwrap();
        catalog
            .attach(parent, child, &PartitionBoundSpec::list(vec![Value::Integer(1)]))
            .unwrap();
        (catalog, parent)
    }

    #[test]
    fn equivalent_rebuild_keeps_published_descriptor() {
        let (catalog, parent) = setup();
        let cache = PartitionDescCache::new();
        let first = cache.get(&catalog, parent).unwrap();
        cache.invalidate(parent);
        let second = cache.get(&catalog, parent).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn changed_partitions_swap_in_a_new_descriptor() {
        let (catalog, parent) = setup();
        let cache = PartitionDescCache::new();
        let before = cache.get(&catalog, parent).unwrap();

        let layout: TupleLayout = [("code", ColumnType::Integer)].into_iter().collect();
        let child = catalog.create_table("codes_2", layout).unwrap();
        catalog
            .attach(parent, child, &PartitionBoundSpec::list(vec![Value::Integer(2)]))
            .unwrap();

        // Still served from the cache until invalidated.
        assert!(Arc::ptr_eq(&before, &cache.get(&catalog, parent).unwrap()));
        cache.invalidate(parent);
        let after = cache.get(&catalog, parent).unwrap();
        assert_eq!(before.nparts(), 1);
        assert_eq!(after.nparts(), 2);
    }

    #[test]
    fn plain_tables_have_no_descriptor() {
        let catalog = MemoryCatalog::new();
        let layout: TupleLayout = [("code", ColumnType::Integer)].into_iter().collect();
        let table = catalog.create_table("plain", layout).unwrap();
        let err = PartitionDescCache::new().get(&catalog, table).unwrap_err();
        assert!(matches!(err, RouterError::NotPartitioned(name) if name == "plain"));
    }

    #[test]
    fn invalidation_during_first_build_is_kept() {
        let (catalog, parent) = setup();
        let cache = PartitionDescCache::new();
        let racing = AttachDuringRebuild::new(&catalog, &cache);

        // Read before the attach landed; handed out but not published.
        assert_eq!(cache.get(&racing, parent).unwrap().nparts(), 1);
        assert_eq!(catalog.partitions(parent).unwrap().len(), 2);
        assert_eq!(cache.get(&catalog, parent).unwrap().nparts(), 2);
    }

    #[test]
    fn invalidation_during_rebuild_does_not_revalidate_old_descriptor() {
        let (catalog, parent) = setup();
        let cache = PartitionDescCache::new();
        let before = cache.get(&catalog, parent).unwrap();
        cache.invalidate(parent);

        let racing = AttachDuringRebuild::new(&catalog, &cache);
        assert_eq!(cache.get(&racing, parent).unwrap().nparts(), 1);
        let after = cache.get(&catalog, parent).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.nparts(), 2);
    }

    #[test]
    fn stale_qual_is_not_cached() {
        let (_, parent) = setup();
        let cache = PartitionDescCache::new();
        let epoch = cache.qual_epoch();
        cache.invalidate(parent);
        let qual = cache.store_qual(parent, epoch, Vec::new());
        assert!(qual.is_empty());
        assert!(cache.cached_qual(parent).is_none());

        cache.store_qual(parent, cache.qual_epoch(), Vec::new());
        assert!(cache.cached_qual(parent).is_some());
    }
}
