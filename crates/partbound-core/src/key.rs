use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PartitionError, Result};
use crate::value::{compare_datums, Collation, ColumnType, Value};

/// Widest partition key accepted by [`PartitionKey::new`].
pub const PARTITION_MAX_KEYS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    List,
    Range,
}

impl fmt::Display for PartitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionStrategy::List => f.write_str("list"),
            PartitionStrategy::Range => f.write_str("range"),
        }
    }
}

/// A partition key expression over physical columns of the table, e.g.
/// `year(created_at)`. Evaluation is delegated to an
/// [`ExpressionEvaluator`](crate::expr::ExpressionEvaluator).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyExpression {
    pub function: String,
    pub args: Vec<usize>,
}

impl KeyExpression {
    pub fn new(function: impl Into<String>, args: Vec<usize>) -> Self {
        Self {
            function: function.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// Zero-based physical column number in the partitioned table's layout.
    Column(usize),
    Expression(KeyExpression),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyColumn {
    pub name: String,
    pub source: KeySource,
    pub ty: ColumnType,
    #[serde(default)]
    pub collation: Collation,
}

impl KeyColumn {
    pub fn column(name: impl Into<String>, attno: usize, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            source: KeySource::Column(attno),
            ty,
            collation: Collation::Binary,
        }
    }

    pub fn expression(name: impl Into<String>, expr: KeyExpression, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            source: KeySource::Expression(expr),
            ty,
            collation: Collation::Binary,
        }
    }

    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = collation;
        self
    }
}

/// Partition key descriptor of a partitioned table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionKey {
    strategy: PartitionStrategy,
    columns: Vec<KeyColumn>,
}

impl PartitionKey {
    pub fn new(strategy: PartitionStrategy, columns: Vec<KeyColumn>) -> Result<Self> {
        if columns.is_empty() {
            return Err(PartitionError::InvalidKey(
                "partition key must have at least one column".into(),
            ));
        }
        if columns.len() > PARTITION_MAX_KEYS {
            return Err(PartitionError::InvalidKey(format!(
                "cannot partition using more than {PARTITION_MAX_KEYS} columns"
            )));
        }
        if strategy == PartitionStrategy::List && columns.len() != 1 {
            return Err(PartitionError::InvalidKey(
                "cannot use \"list\" partition strategy with more than one column".into(),
            ));
        }
        Ok(Self { strategy, columns })
    }

    /// Single-column LIST key. One column always satisfies the checks in
    /// [`PartitionKey::new`], so this constructor cannot fail.
    pub fn list(column: KeyColumn) -> Self {
        Self {
            strategy: PartitionStrategy::List,
            columns: vec![column],
        }
    }

    pub fn range(columns: Vec<KeyColumn>) -> Result<Self> {
        Self::new(PartitionStrategy::Range, columns)
    }

    pub fn strategy(&self) -> PartitionStrategy {
        self.strategy
    }

    pub fn columns(&self) -> &[KeyColumn] {
        &self.columns
    }

    pub fn column(&self, keynum: usize) -> &KeyColumn {
        &self.columns[keynum]
    }

    /// Number of key columns.
    pub fn natts(&self) -> usize {
        self.columns.len()
    }

    pub fn has_expressions(&self) -> bool {
        self.columns
            .iter()
            .any(|column| matches!(column.source, KeySource::Expression(_)))
    }

    pub fn expressions(&self) -> impl Iterator<Item = &KeyExpression> {
        self.columns.iter().filter_map(|column| match &column.source {
            KeySource::Expression(expr) => Some(expr),
            KeySource::Column(_) => None,
        })
    }

    /// The key's support function for column `keynum`.
    pub fn compare(&self, keynum: usize, left: &Value, right: &Value) -> Ordering {
        compare_datums(left, right, self.columns[keynum].collation)
    }
}
