use partbound_core::{PartitionError, RelationId};
use thiserror::Error;

use crate::catalog::RelationKind;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("relation {0} does not exist")]
    UnknownRelation(RelationId),
    #[error("relation \"{0}\" already exists")]
    DuplicateRelation(String),
    #[error("\"{relation}\" is not a {expected}")]
    WrongKind {
        relation: String,
        expected: RelationKind,
    },
    #[error("\"{child}\" is already a partition")]
    AlreadyAttached { child: String },
    #[error("relation \"{child}\" is not a partition of relation \"{parent}\"")]
    NotAPartition { child: String, parent: String },
    #[error("partition key of \"{relation}\" is invalid: {reason}")]
    InvalidKey { relation: String, reason: String },
    #[error("row for \"{relation}\" has {found} columns, expected {expected}")]
    RowWidth {
        relation: String,
        expected: usize,
        found: usize,
    },
    #[error("malformed partition bound stored for relation {relation}: {source}")]
    MalformedBound {
        relation: RelationId,
        #[source]
        source: PartitionError,
    },
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("partition \"{partition}\" would overlap partition \"{existing}\"")]
    Overlap { partition: String, existing: String },
    #[error("partition \"{partition}\" conflicts with existing default partition \"{existing}\"")]
    DefaultConflict { partition: String, existing: String },
    #[error("no partition of relation \"{table}\" found for row with partition key {key}")]
    NoPartitionFound {
        table: String,
        relation: RelationId,
        key: String,
    },
    #[error(
        "updated partition constraint for default partition \"{default}\" \
         would be violated by some row in \"{scanned}\" (adding \"{partition}\")"
    )]
    DefaultPartitionViolation {
        default: String,
        scanned: String,
        partition: String,
    },
    #[error("invalid value for column \"{column}\" of relation \"{table}\": {source}")]
    InvalidValue {
        table: String,
        column: String,
        #[source]
        source: PartitionError,
    },
    #[error("could not convert row type: {0}")]
    RowConversion(String),
    #[error("partition tree under \"{relation}\" is deeper than {limit} levels")]
    TreeTooDeep { relation: String, limit: usize },
    #[error("table \"{0}\" is not partitioned")]
    NotPartitioned(String),
    #[error("invalid partition configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RouterError>;
