use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use partbound_core::{
    KeySource, PartitionBoundSpec, PartitionError, PartitionKey, RelationId, Value,
};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::layout::TupleLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Stores rows; a leaf when it is a partition.
    Table,
    PartitionedTable,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::Table => f.write_str("table"),
            RelationKind::PartitionedTable => f.write_str("partitioned table"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationInfo {
    pub id: RelationId,
    pub name: String,
    pub kind: RelationKind,
    pub layout: TupleLayout,
}

impl RelationInfo {
    pub fn is_partitioned(&self) -> bool {
        self.kind == RelationKind::PartitionedTable
    }
}

/// Relation metadata and storage consulted by partition DDL and routing.
///
/// Callers hold whatever locks the statement needs; implementations only
/// have to keep each call internally consistent.
pub trait Catalog: Send + Sync {
    fn relation(&self, id: RelationId) -> Result<RelationInfo, CatalogError>;

    /// `None` for relations that are not partitioned.
    fn partition_key(&self, id: RelationId) -> Result<Option<PartitionKey>, CatalogError>;

    /// Direct partitions of `parent` with their bounds, in scan order.
    fn partitions(
        &self,
        parent: RelationId,
    ) -> Result<Vec<(RelationId, PartitionBoundSpec)>, CatalogError>;

    /// Parent and bound of `child`, or `None` when it is not a partition.
    fn partition_bound(
        &self,
        child: RelationId,
    ) -> Result<Option<(RelationId, PartitionBoundSpec)>, CatalogError>;

    fn default_partition(&self, parent: RelationId) -> Result<Option<RelationId>, CatalogError>;

    fn attach(
        &self,
        parent: RelationId,
        child: RelationId,
        spec: &PartitionBoundSpec,
    ) -> Result<(), CatalogError>;

    /// Removes the partition edge and returns the bound it had.
    fn detach(
        &self,
        parent: RelationId,
        child: RelationId,
    ) -> Result<PartitionBoundSpec, CatalogError>;

    fn scan_rows(&self, relation: RelationId) -> Result<Vec<Vec<Value>>, CatalogError>;

    fn insert_row(&self, relation: RelationId, row: Vec<Value>) -> Result<(), CatalogError>;
}

#[derive(Debug)]
struct StoredRelation {
    info: RelationInfo,
    key: Option<PartitionKey>,
    parent: Option<RelationId>,
    /// Bound as JSON text, the way it is persisted.
    bound: Option<String>,
    default_partition: Option<RelationId>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default)]
struct CatalogState {
    relations: HashMap<RelationId, StoredRelation>,
    names: HashMap<String, RelationId>,
    /// (parent, child) edges in attach order, which is the scan order.
    inherits: Vec<(RelationId, RelationId)>,
    next_id: u32,
}

impl CatalogState {
    fn get(&self, id: RelationId) -> Result<&StoredRelation, CatalogError> {
        self.relations
            .get(&id)
            .ok_or(CatalogError::UnknownRelation(id))
    }

    fn get_mut(&mut self, id: RelationId) -> Result<&mut StoredRelation, CatalogError> {
        self.relations
            .get_mut(&id)
            .ok_or(CatalogError::UnknownRelation(id))
    }

    fn bound_of(&self, id: RelationId) -> Result<Option<PartitionBoundSpec>, CatalogError> {
        self.get(id)?
            .bound
            .as_deref()
            .map(|text| {
                PartitionBoundSpec::from_catalog_text(text).map_err(|source| {
                    CatalogError::MalformedBound {
                        relation: id,
                        source,
                    }
                })
            })
            .transpose()
    }

    fn required_bound(&self, id: RelationId) -> Result<PartitionBoundSpec, CatalogError> {
        self.bound_of(id)?
            .ok_or_else(|| CatalogError::MalformedBound {
                relation: id,
                source: PartitionError::Internal("partition has no stored bound".into()),
            })
    }
}

/// Catalog kept entirely in memory, rows included.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: RwLock<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(
        &self,
        name: &str,
        layout: TupleLayout,
    ) -> Result<RelationId, CatalogError> {
        self.create(name, layout, None)
    }

    pub fn create_partitioned_table(
        &self,
        name: &str,
        layout: TupleLayout,
        key: PartitionKey,
    ) -> Result<RelationId, CatalogError> {
        validate_key(name, &layout, &key)?;
        self.create(name, layout, Some(key))
    }

    pub fn lookup(&self, name: &str) -> Option<RelationId> {
        self.state.read().names.get(name).copied()
    }

    fn create(
        &self,
        name: &str,
        layout: TupleLayout,
        key: Option<PartitionKey>,
    ) -> Result<RelationId, CatalogError> {
        let mut state = self.state.write();
        if state.names.contains_key(name) {
            return Err(CatalogError::DuplicateRelation(name.to_string()));
        }
        state.next_id += 1;
        let id = RelationId(state.next_id);
        let kind = if key.is_some() {
            RelationKind::PartitionedTable
        } else {
            RelationKind::Table
        };
        state.names.insert(name.to_string(), id);
        state.relations.insert(
            id,
            StoredRelation {
                info: RelationInfo {
                    id,
                    name: name.to_string(),
                    kind,
                    layout,
                },
                key,
                parent: None,
                bound: None,
                default_partition: None,
                rows: Vec::new(),
            },
        );
        log::debug!("created {kind} \"{name}\" as relation {id}");
        Ok(id)
    }
}

/// Key columns must exist in the layout with the declared type; expression
/// arguments must at least exist.
fn validate_key(name: &str, layout: &TupleLayout, key: &PartitionKey) -> Result<(), CatalogError> {
    let invalid = |reason: String| CatalogError::InvalidKey {
        relation: name.to_string(),
        reason,
    };
    for column in key.columns() {
        match &column.source {
            KeySource::Column(attno) => {
                let def = layout
                    .column(*attno)
                    .ok_or_else(|| invalid(format!("column {attno} does not exist")))?;
                if def.ty != column.ty {
                    return Err(invalid(format!(
                        "column \"{}\" has type {} but the key declares {}",
                        def.name, def.ty, column.ty
                    )));
                }
            }
            KeySource::Expression(expr) => {
                if let Some(attno) = expr.args.iter().find(|attno| **attno >= layout.width()) {
                    return Err(invalid(format!(
                        "argument column {attno} of {}() does not exist",
                        expr.function
                    )));
                }
            }
        }
    }
    Ok(())
}

impl Catalog for MemoryCatalog {
    fn relation(&self, id: RelationId) -> Result<RelationInfo, CatalogError> {
        Ok(self.state.read().get(id)?.info.clone())
    }

    fn partition_key(&self, id: RelationId) -> Result<Option<PartitionKey>, CatalogError> {
        Ok(self.state.read().get(id)?.key.clone())
    }

    fn partitions(
        &self,
        parent: RelationId,
    ) -> Result<Vec<(RelationId, PartitionBoundSpec)>, CatalogError> {
        let state = self.state.read();
        state.get(parent)?;
        let mut children = Vec::new();
        for (_, child) in state.inherits.iter().filter(|(p, _)| *p == parent) {
            children.push((*child, state.required_bound(*child)?));
        }
        Ok(children)
    }

    fn partition_bound(
        &self,
        child: RelationId,
    ) -> Result<Option<(RelationId, PartitionBoundSpec)>, CatalogError> {
        let state = self.state.read();
        let Some(parent) = state.get(child)?.parent else {
            return Ok(None);
        };
        Ok(state.bound_of(child)?.map(|spec| (parent, spec)))
    }

    fn default_partition(&self, parent: RelationId) -> Result<Option<RelationId>, CatalogError> {
        Ok(self.state.read().get(parent)?.default_partition)
    }

    fn attach(
        &self,
        parent: RelationId,
        child: RelationId,
        spec: &PartitionBoundSpec,
    ) -> Result<(), CatalogError> {
        let text = spec
            .to_catalog_text()
            .map_err(|source| CatalogError::MalformedBound {
                relation: child,
                source,
            })?;
        let mut state = self.state.write();
        let parent_rel = state.get(parent)?;
        if !parent_rel.info.is_partitioned() {
            return Err(CatalogError::WrongKind {
                relation: parent_rel.info.name.clone(),
                expected: RelationKind::PartitionedTable,
            });
        }
        let child_rel = state.get_mut(child)?;
        if child_rel.parent.is_some() {
            return Err(CatalogError::AlreadyAttached {
                child: child_rel.info.name.clone(),
            });
        }
        child_rel.parent = Some(parent);
        child_rel.bound = Some(text);
        if spec.is_default() {
            state.get_mut(parent)?.default_partition = Some(child);
        }
        state.inherits.push((parent, child));
        Ok(())
    }

    fn detach(
        &self,
        parent: RelationId,
        child: RelationId,
    ) -> Result<PartitionBoundSpec, CatalogError> {
        let mut state = self.state.write();
        let parent_name = state.get(parent)?.info.name.clone();
        let child_rel = state.get(child)?;
        if child_rel.parent != Some(parent) {
            return Err(CatalogError::NotAPartition {
                child: child_rel.info.name.clone(),
                parent: parent_name,
            });
        }
        let spec = state.required_bound(child)?;
        let child_rel = state.get_mut(child)?;
        child_rel.parent = None;
        child_rel.bound = None;
        let parent_rel = state.get_mut(parent)?;
        if parent_rel.default_partition == Some(child) {
            parent_rel.default_partition = None;
        }
        state.inherits.retain(|edge| *edge != (parent, child));
        Ok(spec)
    }

    fn scan_rows(&self, relation: RelationId) -> Result<Vec<Vec<Value>>, CatalogError> {
        Ok(self.state.read().get(relation)?.rows.clone())
    }

    fn insert_row(&self, relation: RelationId, row: Vec<Value>) -> Result<(), CatalogError> {
        let mut state = self.state.write();
        let stored = state.get_mut(relation)?;
        if stored.info.is_partitioned() {
            return Err(CatalogError::WrongKind {
                relation: stored.info.name.clone(),
                expected: RelationKind::Table,
            });
        }
        if row.len() != stored.info.layout.width() {
            return Err(CatalogError::RowWidth {
                relation: stored.info.name.clone(),
                expected: stored.info.layout.width(),
                found: row.len(),
            });
        }
        stored.rows.push(row);
        Ok(())
    }
}
