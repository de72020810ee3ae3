//! Partition bounds for LIST and RANGE partitioned tables: canonical bound
//! structures, binary search over them, overlap checks for new partitions
//! and the constraints each partition implies.

pub mod bound;
pub mod constraint;
pub mod error;
pub mod expr;
pub mod key;
pub mod overlap;
pub mod spec;
pub mod value;

pub use bound::canonical::build_bound_info;
pub use bound::compare::{
    compare_entry_at, compare_range_bound_to_values, compare_range_bounds, Probe, RangeBound,
    RangeBoundView,
};
pub use bound::search::{bound_bsearch, SearchResult};
pub use bound::{partition_bounds_equal, BoundInfo, PartitionDesc, RelationId};
pub use constraint::{
    derive_constraint, derive_default_constraint, display_constraint,
    proposed_default_constraint, CompareOp, KeyTerm, Predicate, PreparedPredicate,
};
pub use error::{PartitionError, Result};
pub use expr::{BuiltinFunctions, ExpressionEvaluator, NoExpressions, PreparedExpression};
pub use key::{
    KeyColumn, KeyExpression, KeySource, PartitionKey, PartitionStrategy, PARTITION_MAX_KEYS,
};
pub use overlap::{check_new_bound_overlap, Conflict};
pub use spec::{PartitionBoundSpec, RangeDatum, RangeDatumKind};
pub use value::{compare_datums, parse_timestamp_string, Collation, ColumnType, Value};
