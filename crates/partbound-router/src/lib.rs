//! Catalog-facing side of table partitioning: cached partition
//! descriptors, DDL checks for attaching partitions, partition constraints
//! across a hierarchy and routing of inserted rows to leaf partitions.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod keys;
pub mod layout;
pub mod manager;
pub mod qual;

pub use cache::PartitionDescCache;
pub use catalog::{Catalog, MemoryCatalog, RelationInfo, RelationKind};
pub use config::PartitionConfig;
pub use dispatch::{DispatchTarget, DispatchTree, PartitionDispatch, RoutedTuple};
pub use error::{CatalogError, Result, RouterError};
pub use keys::{form_partition_key_values, prepare_key_expressions};
pub use layout::{attribute_map, ColumnDef, TupleConversionMap, TupleLayout};
pub use manager::{InsertRouter, PartitionManager};
pub use qual::{check_default_allows_bound, partition_qual, partition_qual_expr};
