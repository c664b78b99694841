use crate::{
    adapter::GroupCursor,
    cursor::{
        ColumnSelector, Cursor, CursorState, FilterCursor, FlattenCursor, ProductCursor,
        RowsCursor,
    },
    error::{ErrorClass, InternalError},
    row::Row,
    rowtype::RowType,
    schema::TableId,
    test_support::{ADDRESSES, CUSTOMERS, Fixture, ORDERS, drain, ids},
    value::Value,
};
use std::sync::Arc;

fn table_filter(
    fx: &Fixture,
    table: TableId,
) -> FilterCursor<GroupCursor, impl FnMut(&Row) -> Result<bool, InternalError>> {
    let group = fx.schema.table(CUSTOMERS).group();

    FilterCursor::new(fx.adapter.new_group_cursor(group), move |row: &Row| {
        Ok(row.table() == Some(table))
    })
}

/// Customers joined with rows of `child`.
fn customers_with(fx: &Fixture, child: TableId) -> Arc<RowType> {
    fx.schema.flattened_type(
        fx.schema.table_row_type(CUSTOMERS),
        fx.schema.table_row_type(child),
    )
}

fn flatten(fx: &Fixture, row_type: &Arc<RowType>) -> FlattenCursor<GroupCursor> {
    let group = fx.schema.table(CUSTOMERS).group();

    FlattenCursor::new(fx.adapter.new_group_cursor(group), row_type.clone())
        .expect("flattened row type")
}

fn check_lifecycle(cursor: &mut dyn Cursor) {
    assert_eq!(cursor.state(), CursorState::Closed);
    let err = cursor.next().expect_err("next before open");
    assert_eq!(err.class, ErrorClass::InvariantViolation);

    cursor.open().expect("cursor should open");
    assert!(cursor.is_idle());
    if cursor.next().expect("next should succeed").is_some() {
        assert!(cursor.is_active());
        let err = cursor.open().expect_err("open while active");
        assert_eq!(err.class, ErrorClass::InvariantViolation);
    }

    cursor.close();
    cursor.close();
    assert_eq!(cursor.state(), CursorState::Closed);

    cursor.destroy();
    cursor.close();
    assert!(cursor.is_destroyed());
    let err = cursor.next().expect_err("next after destroy");
    assert_eq!(err.class, ErrorClass::InvariantViolation);
}

// ─────────────────────────────────────────────
// LIFECYCLE
// ─────────────────────────────────────────────

#[test]
fn every_operator_follows_the_state_machine() {
    let fx = Fixture::new();
    fx.load_sample();

    let mut rows = RowsCursor::new(vec![fx.customer(1, "A")]);
    check_lifecycle(&mut rows);

    let mut filter = table_filter(&fx, ORDERS);
    check_lifecycle(&mut filter);

    let orders_type = customers_with(&fx, ORDERS);
    let mut flat = flatten(&fx, &orders_type);
    check_lifecycle(&mut flat);

    let row_type = fx
        .schema
        .product_type(
            fx.schema.table_row_type(CUSTOMERS),
            &orders_type,
            Some(CUSTOMERS),
        )
        .expect("product row type");
    let mut product = ProductCursor::new(
        table_filter(&fx, CUSTOMERS),
        flatten(&fx, &orders_type),
        row_type,
    )
    .expect("product cursor");
    check_lifecycle(&mut product);

    let mut boxed: Box<dyn Cursor> = Box::new(RowsCursor::new(vec![fx.customer(2, "B")]));
    check_lifecycle(&mut boxed);
}

#[test]
fn rows_cursor_restarts_when_reopened() {
    let fx = Fixture::new();
    let mut cursor = RowsCursor::new(vec![fx.customer(1, "A"), fx.customer(2, "B")]);

    cursor.open().expect("cursor should open");
    assert_eq!(ids(&drain(&mut cursor)), vec![1, 2]);
    cursor.open().expect("idle cursor should reopen");
    assert_eq!(ids(&drain(&mut cursor)), vec![1, 2]);
}

#[test]
fn default_jump_is_unsupported() {
    let fx = Fixture::new();
    let row = fx.customer(1, "A");
    let mut cursor = RowsCursor::new(vec![row.clone()]);
    cursor.open().expect("cursor should open");

    let err = cursor
        .jump(&row, &ColumnSelector::all())
        .expect_err("rows cursor cannot jump");
    assert_eq!(err.class, ErrorClass::Unsupported);
}

#[test]
fn column_selector_counts_leading_columns() {
    assert_eq!(ColumnSelector::prefix(2).leading_len(), 2);
    assert_eq!(ColumnSelector::columns(&[0, 1, 3]).leading_len(), 2);
    assert_eq!(ColumnSelector::columns(&[1]).leading_len(), 0);
    assert_eq!(ColumnSelector::all().leading_len(), 64);
    assert!(ColumnSelector::columns(&[3]).includes(3));
    assert!(!ColumnSelector::columns(&[3, 99]).includes(99));
}

// ─────────────────────────────────────────────
// FILTER AND FLATTEN
// ─────────────────────────────────────────────

#[test]
fn filter_propagates_predicate_errors() {
    let fx = Fixture::new();
    let mut cursor = FilterCursor::new(RowsCursor::new(vec![fx.customer(1, "A")]), |row: &Row| {
        row.field(9).map(|value| value.is_null())
    });
    cursor.open().expect("cursor should open");

    let err = cursor.next().expect_err("field 9 is out of range");
    assert_eq!(err.class, ErrorClass::InvariantViolation);
}

#[test]
fn flatten_joins_each_order_with_its_customer() {
    let fx = Fixture::new();
    fx.load_sample();

    let mut cursor = flatten(&fx, &customers_with(&fx, ORDERS));
    cursor.open().expect("flatten should open");
    let rows = drain(&mut cursor);

    let pairs: Vec<(i64, i64)> = rows
        .iter()
        .map(|row| {
            let customer = row.field(0).expect("customer id").as_int().expect("int");
            let order = row.field(2).expect("order id").as_int().expect("int");
            (customer, order)
        })
        .collect();
    assert_eq!(pairs, vec![(1, 10), (1, 11), (2, 20)]);
    assert_eq!(rows[0].field_count(), 5);
    assert_eq!(rows[0].hkey().map(|hkey| hkey.segment_count()), Some(2));
}

#[test]
fn flatten_skips_orphans() {
    let fx = Fixture::new();
    fx.load(&[fx.customer(1, "A"), fx.order(10, 1, 5), fx.order(70, 7, 1)]);

    let mut cursor = flatten(&fx, &customers_with(&fx, ORDERS));
    cursor.open().expect("flatten should open");

    assert_eq!(drain(&mut cursor).len(), 1);
}

#[test]
fn flatten_rejects_other_row_types() {
    let fx = Fixture::new();
    let err = FlattenCursor::new(
        RowsCursor::new(Vec::new()),
        fx.schema.table_row_type(ORDERS).clone(),
    )
    .err()
    .expect("table row type is not flattened");

    assert_eq!(err.class, ErrorClass::InvariantViolation);
}

// ─────────────────────────────────────────────
// PRODUCT
// ─────────────────────────────────────────────

#[test]
fn product_of_customer_and_customer_orders() {
    let fx = Fixture::new();
    fx.load(&[fx.customer(1, "A"), fx.order(10, 1, 5)]);

    let right_type = customers_with(&fx, ORDERS);
    let row_type = fx
        .schema
        .product_type(fx.schema.table_row_type(CUSTOMERS), &right_type, None)
        .expect("product row type");
    assert_eq!(row_type.field_count(), 5);

    let mut cursor = ProductCursor::new(
        table_filter(&fx, CUSTOMERS),
        flatten(&fx, &right_type),
        row_type,
    )
    .expect("product cursor");
    cursor.open().expect("product should open");
    let rows = drain(&mut cursor);

    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].to_values().expect("product values"),
        vec![
            Value::Int(1),
            Value::from("A"),
            Value::Int(10),
            Value::Int(1),
            Value::Int(5)
        ]
    );
    assert_eq!(rows[0].field(2).expect("order id"), Value::Int(10));
}

#[test]
fn product_pairs_sibling_branches_under_each_customer() {
    let fx = Fixture::new();
    fx.load_sample();
    fx.load(&[fx.address(31, 2, "Bergen"), fx.address(32, 1, "Turku")]);

    let orders_type = customers_with(&fx, ORDERS);
    let addresses_type = customers_with(&fx, ADDRESSES);
    let row_type = fx
        .schema
        .product_type(&orders_type, &addresses_type, Some(CUSTOMERS))
        .expect("product row type");
    assert_eq!(row_type.field_count(), 5 + 5 - 2);

    let mut cursor = ProductCursor::new(
        flatten(&fx, &orders_type),
        flatten(&fx, &addresses_type),
        row_type,
    )
    .expect("product cursor");
    cursor.open().expect("product should open");

    let pairs: Vec<(i64, i64)> = drain(&mut cursor)
        .iter()
        .map(|row| {
            let order = row.field(2).expect("order id").as_int().expect("int");
            let address = row.field(5).expect("address id").as_int().expect("int");
            (order, address)
        })
        .collect();
    assert_eq!(pairs, vec![(10, 32), (11, 32), (20, 30), (20, 31)]);
}

#[test]
fn product_reopens_after_the_left_input_runs_out() {
    let fx = Fixture::new();
    fx.load_sample();

    let right_type = customers_with(&fx, ORDERS);
    let row_type = fx
        .schema
        .product_type(fx.schema.table_row_type(CUSTOMERS), &right_type, Some(CUSTOMERS))
        .expect("product row type");
    let group = fx.schema.table(CUSTOMERS).group();
    let first_customer = FilterCursor::new(fx.adapter.new_group_cursor(group), |row: &Row| {
        Ok(row.table() == Some(CUSTOMERS) && row.field(0)? == Value::Int(1))
    });
    let mut cursor = ProductCursor::new(first_customer, flatten(&fx, &right_type), row_type)
        .expect("product cursor");

    let order_ids = |rows: Vec<Row>| -> Vec<i64> {
        rows.iter()
            .map(|row| row.field(2).expect("order id").as_int().expect("int"))
            .collect()
    };

    cursor.open().expect("product should open");
    assert_eq!(order_ids(drain(&mut cursor)), vec![10, 11]);
    assert!(cursor.is_idle());

    cursor.open().expect("exhausted product should reopen");
    assert_eq!(order_ids(drain(&mut cursor)), vec![10, 11]);
}

#[test]
fn product_needs_a_product_row_type() {
    let fx = Fixture::new();
    let err = ProductCursor::new(
        RowsCursor::new(Vec::new()),
        RowsCursor::new(Vec::new()),
        fx.schema.table_row_type(CUSTOMERS).clone(),
    )
    .err()
    .expect("table row type has no branch");

    assert_eq!(err.class, ErrorClass::InvariantViolation);
}
