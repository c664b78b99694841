use crate::{
    codec::{RowEncoding, decode_record, encode_record},
    error::ErrorClass,
    schema::TableId,
    value::Value,
};

const LIMIT: usize = 1024;

fn sample() -> Vec<Value> {
    vec![
        Value::Int(1),
        Value::Text("A".to_string()),
        Value::Null,
        Value::Blob(vec![0, 1, 2]),
    ]
}

#[test]
fn both_encodings_decode_to_the_same_values() {
    let table = TableId::new(2);
    let legacy = encode_record(table, &sample(), RowEncoding::Legacy, LIMIT).expect("legacy");
    let current = encode_record(table, &sample(), RowEncoding::Current, LIMIT).expect("current");

    assert_ne!(legacy, current);
    assert_eq!(legacy[0], RowEncoding::Legacy.tag());

    let from_legacy = decode_record(&legacy, LIMIT).expect("decode legacy");
    let from_current = decode_record(&current, LIMIT).expect("decode current");
    assert_eq!(from_legacy.values, from_current.values);
    assert_eq!(from_legacy.table, table);
    assert_eq!(from_legacy.encoding, RowEncoding::Legacy);
    assert_eq!(from_current.encoding, RowEncoding::Current);
}

#[test]
fn select_follows_the_use_current_flag() {
    assert_eq!(RowEncoding::select(true), RowEncoding::Current);
    assert_eq!(RowEncoding::select(false), RowEncoding::Legacy);
}

#[test]
fn oversized_records_are_rejected_at_encode_time() {
    let values = vec![Value::Blob(vec![7; 64])];
    let err = encode_record(TableId::new(0), &values, RowEncoding::Current, 16)
        .expect_err("record above the limit must be rejected");

    assert_eq!(err.class, ErrorClass::Internal);
}

#[test]
fn garbage_is_reported_as_corruption() {
    let err = decode_record(&[9, 1, 2], LIMIT).expect_err("unknown tag");
    assert_eq!(err.class, ErrorClass::Corruption);

    let err = decode_record(&[RowEncoding::Current.tag(), 0xFF, 0xFF], LIMIT)
        .expect_err("bad cbor payload");
    assert_eq!(err.class, ErrorClass::Corruption);
}
