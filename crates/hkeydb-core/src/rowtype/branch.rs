use crate::{
    error::InternalError,
    rowtype::{RowType, TableRef},
};

/// Deepest table present in both inputs' table sets.
///
/// Depth identifies a table along one ancestor chain, so the maximum is
/// unique for inputs from one hierarchy; table id breaks any remaining tie so
/// the result never depends on argument order.
pub fn resolve_branch(left: &RowType, right: &RowType) -> Result<TableRef, InternalError> {
    left.table_set()
        .iter()
        .filter(|table| right.contains_table(table.id))
        .max_by(|a, b| a.depth.cmp(&b.depth).then_with(|| b.id.cmp(&a.id)))
        .copied()
        .ok_or_else(|| {
            InternalError::row_type_invariant(format!(
                "no common ancestor between row types {} and {}: rows are from unrelated branches",
                left.id(),
                right.id()
            ))
        })
}
