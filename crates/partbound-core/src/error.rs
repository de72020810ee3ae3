use thiserror::Error;

use crate::key::PartitionStrategy;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PartitionError {
    #[error("invalid strategy in partition bound spec: expected {expected}, found {found}")]
    StrategyMismatch {
        expected: PartitionStrategy,
        found: PartitionStrategy,
    },
    #[error("found null more than once")]
    DuplicateNullPartition,
    #[error(
        "empty range bound specified for partition \"{partition}\": \
         lower bound {lower} is greater than or equal to upper bound {upper}"
    )]
    EmptyRangeBound {
        partition: String,
        lower: String,
        upper: String,
    },
    #[error("invalid partition bound specification: {0}")]
    InvalidBoundSpec(String),
    #[error("invalid partition key: {0}")]
    InvalidKey(String),
    #[error("cannot coerce value: {0}")]
    Coercion(String),
    #[error("partition key expression error: {0}")]
    Expression(String),
    #[error("partition catalog invariant violated: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PartitionError>;
