use crate::{
    error::{ErrorClass, ErrorOrigin},
    rowtype::{FieldSource, RowType, resolve_branch},
    schema::{Schema, TableId},
    test_support::{ADDRESSES, CUSTOMERS, ITEMS, ORDERS, schema},
    value::ColumnType,
};
use proptest::prelude::*;
use std::sync::Arc;

const TABLES: [TableId; 4] = [CUSTOMERS, ORDERS, ITEMS, ADDRESSES];

/// A composite row type covering the tables picked by `mask`.
fn covering(schema: &Schema, mask: u8) -> Arc<RowType> {
    let mut picked = TABLES
        .iter()
        .enumerate()
        .filter(|(bit, _)| mask & (1 << bit) != 0)
        .map(|(_, &table)| schema.table_row_type(table).clone());
    let first = picked.next().expect("mask selects at least one table");

    picked.fold(first, |acc, next| schema.flattened_type(&acc, &next))
}

fn customer_orders(schema: &Schema) -> Arc<RowType> {
    schema.flattened_type(
        schema.table_row_type(CUSTOMERS),
        schema.table_row_type(ORDERS),
    )
}

#[test]
fn flattened_routes_past_the_parent() {
    let schema = schema();
    let row_type = customer_orders(&schema);

    assert_eq!(row_type.field_count(), 5);
    assert_eq!(row_type.route(1), Some(FieldSource::Left(1)));
    assert_eq!(row_type.route(2), Some(FieldSource::Right(0)));
    assert_eq!(row_type.route(5), None);
    assert_eq!(row_type.field_type(1), Some(ColumnType::Text));
    assert!(row_type.table_ref().is_none());
    assert_eq!(
        row_type
            .table_set()
            .iter()
            .map(|table| table.id)
            .collect::<Vec<_>>(),
        vec![CUSTOMERS, ORDERS]
    );
}

#[test]
fn product_skips_the_branch_columns_of_the_right_input() {
    let schema = schema();
    let left = schema.table_row_type(CUSTOMERS);
    let right = customer_orders(&schema);

    let product = schema
        .product_type(left, &right, None)
        .expect("customers share a branch");

    assert_eq!(product.branch().map(|branch| branch.id), Some(CUSTOMERS));
    assert_eq!(product.field_count(), 5);
    assert_eq!(product.route(0), Some(FieldSource::Left(0)));
    assert_eq!(product.route(2), Some(FieldSource::Right(2)));
    assert_eq!(product.route(4), Some(FieldSource::Right(4)));
    assert_eq!(product.field_type(2), Some(ColumnType::Int));
    assert!(product.left().is_some_and(|side| side.id() == left.id()));
    assert!(product.right().is_some_and(|side| side.id() == right.id()));
}

#[test]
fn every_product_field_routes_to_a_typed_input_field() {
    let schema = schema();
    let left = customer_orders(&schema);
    let right = schema.flattened_type(
        schema.table_row_type(CUSTOMERS),
        schema.table_row_type(ADDRESSES),
    );
    let product = schema
        .product_type(&left, &right, Some(CUSTOMERS))
        .expect("siblings meet at customers");

    for i in 0..product.field_count() {
        let expected = match product.route(i).expect("field in range") {
            FieldSource::Left(at) => left.field_type(at),
            FieldSource::Right(at) => right.field_type(at),
        };
        assert!(expected.is_some(), "field {i} routes out of range");
        assert_eq!(product.field_type(i), expected);
    }
}

#[test]
fn unrelated_inputs_have_no_branch() {
    let schema = schema();

    let err = schema
        .product_type(
            schema.table_row_type(ORDERS),
            schema.table_row_type(ADDRESSES),
            None,
        )
        .expect_err("orders and addresses share no table");

    assert_eq!(err.class, ErrorClass::InvariantViolation);
    assert_eq!(err.origin, ErrorOrigin::RowType);
    assert!(err.message.contains("unrelated branches"), "{}", err.message);
}

#[test]
fn explicit_branch_must_be_shared() {
    let schema = schema();

    let err = schema
        .product_type(
            schema.table_row_type(CUSTOMERS),
            &customer_orders(&schema),
            Some(ITEMS),
        )
        .expect_err("items is in neither input");

    assert_eq!(err.origin, ErrorOrigin::RowType);
}

#[test]
fn right_input_must_cover_the_branch_columns() {
    let schema = schema();

    let err = schema
        .product_type(
            &customer_orders(&schema),
            schema.hkey_row_type(ORDERS),
            Some(ORDERS),
        )
        .expect_err("orders hkey is narrower than an orders row");

    assert_eq!(err.class, ErrorClass::InvariantViolation);
}

#[test]
fn siblings_resolve_to_the_lower_table_id() {
    let schema = schema();
    let both = covering(&schema, 0b1011);
    let also_both = covering(&schema, 0b1010);

    let branch = resolve_branch(&both, &also_both).expect("orders and addresses are shared");

    assert_eq!(branch.id, ORDERS);
}

proptest! {
    #[test]
    fn branch_resolution_ignores_argument_order(a in 1u8..16, b in 1u8..16) {
        let schema = schema();
        let left = covering(&schema, a);
        let right = covering(&schema, b);

        let forward = resolve_branch(&left, &right).map(|table| table.id).ok();
        let backward = resolve_branch(&right, &left).map(|table| table.id).ok();
        prop_assert_eq!(forward, backward);

        match forward {
            Some(branch) => {
                prop_assert!(left.contains_table(branch) && right.contains_table(branch));
                let depth = schema.table(branch).depth();
                prop_assert!(left
                    .table_set()
                    .iter()
                    .filter(|table| right.contains_table(table.id))
                    .all(|table| table.depth <= depth));
            }
            None => prop_assert_eq!(a & b, 0),
        }
    }
}
