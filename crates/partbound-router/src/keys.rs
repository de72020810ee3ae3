use partbound_core::{
    ExpressionEvaluator, KeySource, PartitionError, PartitionKey, PreparedExpression, Value,
};

/// Prepares every expression column of `key`, in key order.
pub fn prepare_key_expressions(
    key: &PartitionKey,
    evaluator: &dyn ExpressionEvaluator,
) -> Result<Vec<Box<dyn PreparedExpression>>, PartitionError> {
    key.expressions().map(|expr| evaluator.prepare(expr)).collect()
}

/// Extracts the partition key values of `row`.
///
/// `prepared` holds one prepared expression per expression column of the
/// key, in key order.
pub fn form_partition_key_values(
    key: &PartitionKey,
    row: &[Value],
    prepared: &[Box<dyn PreparedExpression>],
) -> Result<Vec<Value>, PartitionError> {
    let mut exprs = prepared.iter();
    let mut values = Vec::with_capacity(key.natts());
    for column in key.columns() {
        let value = match &column.source {
            KeySource::Column(attno) => row.get(*attno).cloned().ok_or_else(|| {
                PartitionError::Internal(format!(
                    "key column \"{}\" refers to column {} of a {}-column row",
                    column.name,
                    attno,
                    row.len()
                ))
            })?,
            KeySource::Expression(_) => exprs
                .next()
                .ok_or_else(|| {
                    PartitionError::Internal("wrong number of partition key expressions".into())
                })?
                .evaluate(row)?,
        };
        values.push(value);
    }
    if exprs.next().is_some() {
        return Err(PartitionError::Internal(
            "wrong number of partition key expressions".into(),
        ));
    }
    Ok(values)
}

/// `(a, b) = (1, 2)` for error messages.
pub(crate) fn describe_key(key: &PartitionKey, values: &[Value]) -> String {
    let names: Vec<&str> = key.columns().iter().map(|c| c.name.as_str()).collect();
    let values: Vec<String> = values.iter().map(ToString::to_string).collect();
    format!("({}) = ({})", names.join(", "), values.join(", "))
}
