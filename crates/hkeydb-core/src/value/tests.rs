use crate::{
    error::ErrorClass,
    value::{ColumnType, Value, canonical_cmp, decode_ordered_value, encode_ordered_value},
};
use proptest::prelude::*;
use std::cmp::Ordering;

fn encoded(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_ordered_value(&mut out, value);
    out
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<u64>().prop_map(Value::Uint),
        any::<f64>()
            .prop_filter("nan has no single canonical bit pattern", |v| !v.is_nan())
            .prop_map(Value::Float64),
        "[a-c\\x00]{0,6}".prop_map(Value::Text),
        prop::collection::vec(prop_oneof![Just(0u8), Just(1u8), Just(0xFFu8)], 0..6)
            .prop_map(Value::Blob),
    ]
}

#[test]
fn variant_rank_orders_before_payload() {
    assert_eq!(
        canonical_cmp(&Value::Null, &Value::Bool(false)),
        Ordering::Less
    );
    assert_eq!(
        canonical_cmp(&Value::Int(i64::MAX), &Value::Uint(0)),
        Ordering::Less
    );
    assert_eq!(
        canonical_cmp(&Value::Text("z".into()), &Value::Blob(Vec::new())),
        Ordering::Less
    );
}

#[test]
fn negative_ints_sort_before_positive_in_bytes() {
    assert!(encoded(&Value::Int(-1)) < encoded(&Value::Int(0)));
    assert!(encoded(&Value::Int(i64::MIN)) < encoded(&Value::Int(-1)));
    assert!(encoded(&Value::Float64(-0.5)) < encoded(&Value::Float64(0.25)));
}

#[test]
fn text_with_embedded_zero_decodes_back() {
    let value = Value::Text("a\u{0}b".to_string());
    let bytes = encoded(&value);

    let (decoded, next) = decode_ordered_value(&bytes, 0).expect("text should decode");
    assert_eq!(decoded, value);
    assert_eq!(next, bytes.len());
}

#[test]
fn shorter_text_sorts_before_its_extension() {
    assert!(encoded(&Value::Text("ab".into())) < encoded(&Value::Text("ab\u{0}".into())));
    assert!(encoded(&Value::Text("ab".into())) < encoded(&Value::Text("abc".into())));
}

#[test]
fn truncated_component_is_reported_as_corruption() {
    let bytes = encoded(&Value::Int(7));
    let err = decode_ordered_value(&bytes[..4], 0).expect_err("truncated int must fail");

    let err: crate::error::InternalError = err.into();
    assert_eq!(err.class, ErrorClass::Corruption);
}

#[test]
fn coerce_accepts_lossless_integer_conversions() {
    assert_eq!(
        ColumnType::Int.coerce(Value::Uint(5)).expect("uint fits int"),
        Value::Int(5)
    );
    assert_eq!(
        ColumnType::Float64.coerce(Value::Int(2)).expect("int widens"),
        Value::Float64(2.0)
    );
    assert_eq!(
        ColumnType::Text.coerce(Value::Null).expect("null passes"),
        Value::Null
    );
}

#[test]
fn coerce_rejects_out_of_range_and_foreign_kinds() {
    let err = ColumnType::Uint
        .coerce(Value::Int(-1))
        .expect_err("negative int does not fit uint");
    assert_eq!(err.class, ErrorClass::InvariantViolation);

    ColumnType::Int
        .coerce(Value::Text("1".into()))
        .expect_err("text is never converted to int");
}

proptest! {
    #[test]
    fn byte_order_matches_canonical_order(left in arb_value(), right in arb_value()) {
        prop_assert_eq!(
            encoded(&left).cmp(&encoded(&right)),
            canonical_cmp(&left, &right)
        );
    }

    #[test]
    fn concatenated_values_decode_in_sequence(values in prop::collection::vec(arb_value(), 0..5)) {
        let mut bytes = Vec::new();
        for value in &values {
            encode_ordered_value(&mut bytes, value);
        }

        let mut offset = 0;
        let mut decoded = Vec::new();
        while offset < bytes.len() {
            let (value, next) = decode_ordered_value(&bytes, offset).expect("decode");
            decoded.push(value);
            offset = next;
        }

        prop_assert_eq!(decoded, values);
    }
}
