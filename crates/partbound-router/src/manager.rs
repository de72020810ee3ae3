use partbound_core::{
    check_new_bound_overlap, Conflict, ExpressionEvaluator, PartitionBoundSpec, PartitionError,
    RelationId, Value,
};

use crate::cache::PartitionDescCache;
use crate::catalog::Catalog;
use crate::config::PartitionConfig;
use crate::dispatch::{DispatchTree, RoutedTuple};
use crate::error::{Result, RouterError};
use crate::layout::TupleConversionMap;
use crate::qual::check_default_allows_bound;

/// Partition DDL against one catalog.
pub struct PartitionManager<'a> {
    catalog: &'a dyn Catalog,
    cache: &'a PartitionDescCache,
    config: &'a PartitionConfig,
    evaluator: &'a dyn ExpressionEvaluator,
}

impl<'a> PartitionManager<'a> {
    pub fn new(
        catalog: &'a dyn Catalog,
        cache: &'a PartitionDescCache,
        config: &'a PartitionConfig,
        evaluator: &'a dyn ExpressionEvaluator,
    ) -> Self {
        Self {
            catalog,
            cache,
            config,
            evaluator,
        }
    }

    /// Makes `child` a partition of `parent` with bound `spec`.
    ///
    /// Returns the bound as stored, with literals coerced to the key types.
    pub fn attach_partition(
        &self,
        parent: RelationId,
        child: RelationId,
        spec: &PartitionBoundSpec,
    ) -> Result<PartitionBoundSpec> {
        let parent_info = self.catalog.relation(parent)?;
        let key = self
            .catalog
            .partition_key(parent)?
            .ok_or_else(|| RouterError::NotPartitioned(parent_info.name.clone()))?;
        let child_info = self.catalog.relation(child)?;
        TupleConversionMap::by_name(&parent_info.layout, &child_info.layout)?;

        let spec = spec.transform(&key)?;
        if spec.is_default() && !self.config.allow_default_partition {
            return Err(PartitionError::InvalidBoundSpec(
                "default partitions are not allowed".into(),
            )
            .into());
        }

        let desc = self.cache.get(self.catalog, parent)?;
        if let Some(conflict) =
            check_new_bound_overlap(&child_info.name, &key, desc.bounds(), &spec)?
        {
            let existing = desc.oids().get(conflict.index()).copied().ok_or_else(|| {
                PartitionError::Internal(format!(
                    "conflicting partition index {} out of range",
                    conflict.index()
                ))
            })?;
            let existing = self.catalog.relation(existing)?.name;
            return Err(match conflict {
                Conflict::Overlaps(_) => RouterError::Overlap {
                    partition: child_info.name,
                    existing,
                },
                Conflict::DefaultExists(_) => RouterError::DefaultConflict {
                    partition: child_info.name,
                    existing,
                },
            });
        }

        if !spec.is_default() && self.config.validate_default_rows {
            check_default_allows_bound(
                self.catalog,
                self.cache,
                self.evaluator,
                parent,
                &child_info.name,
                &spec,
            )?;
        }

        self.catalog.attach(parent, child, &spec)?;
        self.cache.invalidate(parent);
        log::info!(
            "attached \"{}\" to \"{}\" {spec}",
            child_info.name,
            parent_info.name
        );
        Ok(spec)
    }

    pub fn detach_partition(
        &self,
        parent: RelationId,
        child: RelationId,
    ) -> Result<PartitionBoundSpec> {
        let spec = self.catalog.detach(parent, child)?;
        self.cache.invalidate(parent);
        log::info!("detached relation {child} from relation {parent}");
        Ok(spec)
    }
}

/// Statement-scoped row insertion into a partitioned table.
///
/// The dispatch tree is built once, when the router is created, and
/// reused for every row.
pub struct InsertRouter<'a> {
    catalog: &'a dyn Catalog,
    evaluator: &'a dyn ExpressionEvaluator,
    tree: DispatchTree,
}

impl<'a> InsertRouter<'a> {
    pub fn new(
        catalog: &'a dyn Catalog,
        cache: &PartitionDescCache,
        config: &PartitionConfig,
        evaluator: &'a dyn ExpressionEvaluator,
        root: RelationId,
    ) -> Result<Self> {
        let tree = DispatchTree::build(catalog, cache, root, config)?;
        Ok(Self {
            catalog,
            evaluator,
            tree,
        })
    }

    pub fn tree(&self) -> &DispatchTree {
        &self.tree
    }

    /// Finds the leaf for `row` without storing it.
    pub fn route(&mut self, row: &[Value]) -> Result<RoutedTuple> {
        self.tree.route(row, self.evaluator)
    }

    /// Routes `row` and stores it in its leaf partition.
    pub fn insert(&mut self, row: &[Value]) -> Result<RelationId> {
        let routed = self.route(row)?;
        self.catalog.insert_row(routed.relation, routed.row)?;
        Ok(routed.relation)
    }
}
