use partbound_core::{ColumnType, Value};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Physical column order of a relation's rows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TupleLayout {
    columns: Vec<ColumnDef>,
}

impl TupleLayout {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn column(&self, attno: usize) -> Option<&ColumnDef> {
        self.columns.get(attno)
    }
}

impl<S: Into<String>> FromIterator<(S, ColumnType)> for TupleLayout {
    fn from_iter<I: IntoIterator<Item = (S, ColumnType)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(name, ty)| ColumnDef::new(name, ty))
                .collect(),
        )
    }
}

/// For every column of `from`, its position in `to`, matched by name.
///
/// Both layouts must hold the same columns with the same types.
pub fn attribute_map(from: &TupleLayout, to: &TupleLayout) -> Result<Vec<usize>> {
    if from.width() != to.width() {
        return Err(RouterError::RowConversion(format!(
            "number of columns differs ({} vs {})",
            from.width(),
            to.width()
        )));
    }
    from.columns()
        .iter()
        .map(|column| {
            let attno = to.position(&column.name).ok_or_else(|| {
                RouterError::RowConversion(format!(
                    "attribute \"{}\" does not exist in target row type",
                    column.name
                ))
            })?;
            let target = &to.columns()[attno];
            if target.ty != column.ty {
                return Err(RouterError::RowConversion(format!(
                    "attribute \"{}\" has type {} but target has type {}",
                    column.name, column.ty, target.ty
                )));
            }
            Ok(attno)
        })
        .collect()
}

/// Rearranges rows of one layout into another with the same columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleConversionMap {
    /// `source[j]` is the input column that fills output column `j`.
    source: Vec<usize>,
}

impl TupleConversionMap {
    /// Matches columns by name. `None` when both layouts already agree
    /// column for column and rows can be passed through unchanged.
    pub fn by_name(from: &TupleLayout, to: &TupleLayout) -> Result<Option<Self>> {
        let forward = attribute_map(from, to)?;
        if forward.iter().enumerate().all(|(i, attno)| i == *attno) {
            return Ok(None);
        }
        let mut source = vec![0; forward.len()];
        for (from_attno, to_attno) in forward.into_iter().enumerate() {
            source[to_attno] = from_attno;
        }
        Ok(Some(Self { source }))
    }

    pub fn convert(&self, row: &[Value]) -> Vec<Value> {
        self.source
            .iter()
            .map(|attno| row.get(*attno).cloned().unwrap_or(Value::Null))
            .collect()
    }
}
