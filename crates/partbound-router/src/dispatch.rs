use std::sync::Arc;

use partbound_core::{
    ExpressionEvaluator, PartitionDesc, PartitionKey, PreparedExpression, RelationId, Value,
};

use crate::cache::PartitionDescCache;
use crate::catalog::{Catalog, RelationInfo};
use crate::config::PartitionConfig;
use crate::error::{CatalogError, Result, RouterError};
use crate::keys::{describe_key, form_partition_key_values, prepare_key_expressions};
use crate::layout::TupleConversionMap;

/// Where a partition of a dispatch node sends its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTarget {
    /// Slot in [`DispatchTree::leaves`].
    Leaf(usize),
    /// Another node of the same tree.
    Partitioned(usize),
}

/// Routing state of one partitioned table.
#[derive(Debug)]
pub struct PartitionDispatch {
    relation: RelationInfo,
    key: PartitionKey,
    desc: Arc<PartitionDesc>,
    /// Converts rows from the parent's layout into this table's.
    conversion: Option<TupleConversionMap>,
    /// Indexed by canonical partition index.
    targets: Vec<DispatchTarget>,
    depth: usize,
    prepared: Option<Vec<Box<dyn PreparedExpression>>>,
}

impl PartitionDispatch {
    pub fn relation(&self) -> &RelationInfo {
        &self.relation
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    pub fn desc(&self) -> &PartitionDesc {
        &self.desc
    }

    pub fn targets(&self) -> &[DispatchTarget] {
        &self.targets
    }

    /// Level below the root; the root is 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn key_values(&mut self, row: &[Value], evaluator: &dyn ExpressionEvaluator) -> Result<Vec<Value>> {
        if self.prepared.is_none() && self.key.has_expressions() {
            log::debug!(
                "preparing partition key expressions of \"{}\"",
                self.relation.name
            );
            self.prepared = Some(prepare_key_expressions(&self.key, evaluator)?);
        }
        let prepared = self.prepared.as_deref().unwrap_or(&[]);
        let values = form_partition_key_values(&self.key, row, prepared)?;
        // Expression results are not covered by the row coercion.
        values
            .iter()
            .zip(self.key.columns())
            .map(|(value, column)| {
                value
                    .coerce_to(column.ty)
                    .map_err(|source| RouterError::InvalidValue {
                        table: self.relation.name.clone(),
                        column: column.name.clone(),
                        source,
                    })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutedTuple {
    /// Slot in [`DispatchTree::leaves`].
    pub leaf: usize,
    pub relation: RelationId,
    /// The row in the leaf's layout.
    pub row: Vec<Value>,
    /// Dispatch nodes visited, root first.
    pub path: Vec<usize>,
}

/// Flattened partition hierarchy below one partitioned table.
///
/// Node 0 is the root; the others follow in breadth-first order. Leaf
/// partitions are numbered in the order they are reached.
#[derive(Debug)]
pub struct DispatchTree {
    nodes: Vec<PartitionDispatch>,
    leaves: Vec<RelationId>,
    leaf_conversions: Vec<Option<TupleConversionMap>>,
}

impl DispatchTree {
    pub fn build(
        catalog: &dyn Catalog,
        cache: &PartitionDescCache,
        root: RelationId,
        config: &PartitionConfig,
    ) -> Result<Self> {
        let mut tree = Self {
            nodes: Vec::new(),
            leaves: Vec::new(),
            leaf_conversions: Vec::new(),
        };
        let root_info = catalog.relation(root)?;
        tree.push_node(catalog, cache, root_info, None, 0)?;

        let mut next = 0;
        while next < tree.nodes.len() {
            let parent = &tree.nodes[next];
            let parent_layout = parent.relation.layout.clone();
            let child_depth = parent.depth + 1;
            let oids = parent.desc.oids().to_vec();
            let mut targets = Vec::with_capacity(oids.len());
            for oid in oids {
                let child = catalog.relation(oid)?;
                let conversion = TupleConversionMap::by_name(&parent_layout, &child.layout)?;
                if child.is_partitioned() {
                    if child_depth > config.max_tree_depth {
                        return Err(RouterError::TreeTooDeep {
                            relation: root_info_name(&tree),
                            limit: config.max_tree_depth,
                        });
                    }
                    let index = tree.push_node(catalog, cache, child, conversion, child_depth)?;
                    targets.push(DispatchTarget::Partitioned(index));
                } else {
                    targets.push(DispatchTarget::Leaf(tree.leaves.len()));
                    tree.leaves.push(oid);
                    tree.leaf_conversions.push(conversion);
                }
            }
            tree.nodes[next].targets = targets;
            next += 1;
        }
        log::debug!(
            "dispatch tree for \"{}\": {} partitioned tables, {} leaf partitions",
            root_info_name(&tree),
            tree.nodes.len(),
            tree.leaves.len()
        );
        Ok(tree)
    }

    fn push_node(
        &mut self,
        catalog: &dyn Catalog,
        cache: &PartitionDescCache,
        relation: RelationInfo,
        conversion: Option<TupleConversionMap>,
        depth: usize,
    ) -> Result<usize> {
        let key = catalog
            .partition_key(relation.id)?
            .ok_or_else(|| RouterError::NotPartitioned(relation.name.clone()))?;
        let desc = cache.get(catalog, relation.id)?;
        self.nodes.push(PartitionDispatch {
            relation,
            key,
            desc,
            conversion,
            targets: Vec::new(),
            depth,
            prepared: None,
        });
        Ok(self.nodes.len() - 1)
    }

    pub fn nodes(&self) -> &[PartitionDispatch] {
        &self.nodes
    }

    pub fn root(&self) -> &PartitionDispatch {
        &self.nodes[0]
    }

    /// Leaf partitions in slot order.
    pub fn leaves(&self) -> &[RelationId] {
        &self.leaves
    }

    pub fn leaf_slot(&self, relation: RelationId) -> Option<usize> {
        self.leaves.iter().position(|leaf| *leaf == relation)
    }

    /// Coerces a row given in the root's layout to the root's column types.
    fn coerce_row(&self, row: &[Value]) -> Result<Vec<Value>> {
        let root = &self.root().relation;
        if row.len() != root.layout.width() {
            return Err(CatalogError::RowWidth {
                relation: root.name.clone(),
                expected: root.layout.width(),
                found: row.len(),
            }
            .into());
        }
        row.iter()
            .zip(root.layout.columns())
            .map(|(value, column)| {
                value
                    .coerce_to(column.ty)
                    .map_err(|source| RouterError::InvalidValue {
                        table: root.name.clone(),
                        column: column.name.clone(),
                        source,
                    })
            })
            .collect()
    }

    /// Finds the leaf partition for a row given in the root's layout.
    ///
    /// Values are first coerced to the root's column types, so the routed
    /// row is typed even when the caller passed e.g. numbers as text.
    pub fn route(
        &mut self,
        row: &[Value],
        evaluator: &dyn ExpressionEvaluator,
    ) -> Result<RoutedTuple> {
        let mut current = 0;
        let mut row = self.coerce_row(row)?;
        let mut path = Vec::new();
        loop {
            path.push(current);
            let node = &mut self.nodes[current];
            if let Some(map) = &node.conversion {
                row = map.convert(&row);
            }
            if node.desc.nparts() == 0 {
                log::debug!("no partitions in \"{}\"", node.relation.name);
                return Err(RouterError::NoPartitionFound {
                    table: node.relation.name.clone(),
                    relation: node.relation.id,
                    key: String::from("()"),
                });
            }
            let values = node.key_values(&row, evaluator)?;
            let target = node
                .desc
                .bounds()
                .and_then(|bounds| bounds.partition_for_values(&node.key, &values))
                .map(|index| node.targets[index]);
            match target {
                Some(DispatchTarget::Partitioned(next)) => current = next,
                Some(DispatchTarget::Leaf(slot)) => {
                    if let Some(map) = &self.leaf_conversions[slot] {
                        row = map.convert(&row);
                    }
                    return Ok(RoutedTuple {
                        leaf: slot,
                        relation: self.leaves[slot],
                        row,
                        path,
                    });
                }
                None => {
                    let key = describe_key(&node.key, &values);
                    log::debug!(
                        "no partition of \"{}\" accepts {key}",
                        node.relation.name
                    );
                    return Err(RouterError::NoPartitionFound {
                        table: node.relation.name.clone(),
                        relation: node.relation.id,
                        key,
                    });
                }
            }
        }
    }
}

fn root_info_name(tree: &DispatchTree) -> String {
    tree.nodes
        .first()
        .map(|node| node.relation.name.clone())
        .unwrap_or_default()
}
