use crate::{
    error::ErrorClass,
    hkey::{HKey, HKeyCache, HKeySegment},
    schema::TableId,
    value::Value,
};
use proptest::prelude::*;

fn key(segments: &[(u32, &[i64])]) -> HKey {
    HKey::from_segments(
        segments
            .iter()
            .map(|(ordinal, values)| {
                HKeySegment::new(
                    TableId::new(*ordinal),
                    values.iter().copied().map(Value::Int).collect(),
                )
            })
            .collect(),
    )
}

fn arb_hkey() -> impl Strategy<Value = HKey> {
    prop::collection::vec(
        (
            0u32..3,
            prop::collection::vec(
                prop_oneof![
                    Just(Value::Null),
                    (-3i64..3).prop_map(Value::Int),
                    "[ab]{0,2}".prop_map(Value::Text),
                ],
                1..3,
            ),
        ),
        0..4,
    )
    .prop_map(|segments| {
        HKey::from_segments(
            segments
                .into_iter()
                .map(|(ordinal, values)| HKeySegment::new(TableId::new(ordinal), values))
                .collect(),
        )
    })
}

#[test]
fn parent_sorts_before_children_and_children_before_next_parent() {
    let customer_1 = key(&[(0, &[1])]);
    let order_1_10 = key(&[(0, &[1]), (1, &[10])]);
    let item_1_10_7 = key(&[(0, &[1]), (1, &[10]), (2, &[7])]);
    let order_1_11 = key(&[(0, &[1]), (1, &[11])]);
    let customer_2 = key(&[(0, &[2])]);

    let mut keys = vec![
        customer_2.clone(),
        order_1_11.clone(),
        item_1_10_7.clone(),
        customer_1.clone(),
        order_1_10.clone(),
    ];
    keys.sort();

    assert_eq!(
        keys,
        vec![customer_1, order_1_10, item_1_10_7, order_1_11, customer_2]
    );
}

#[test]
fn truncation_yields_the_ancestor_key() {
    let item = key(&[(0, &[1]), (1, &[10]), (2, &[7])]);
    let order = key(&[(0, &[1]), (1, &[10])]);

    assert_eq!(item.truncated(2), order);
    assert!(order.is_prefix_of(&item));
    assert!(!item.is_prefix_of(&order));

    let mut scratch = item.clone();
    scratch.use_segments(1);
    assert_eq!(scratch, key(&[(0, &[1])]));
}

#[test]
fn copy_to_overwrites_a_longer_target() {
    let source = key(&[(0, &[4])]);
    let mut target = key(&[(0, &[1]), (1, &[10]), (2, &[7])]);

    source.copy_to(&mut target);
    assert_eq!(target, source);
}

#[test]
fn eval_walks_values_across_segments() {
    let hkey = key(&[(0, &[1]), (1, &[10, 11])]);

    assert_eq!(hkey.value_count(), 3);
    assert_eq!(hkey.eval(0), Some(&Value::Int(1)));
    assert_eq!(hkey.eval(2), Some(&Value::Int(11)));
    assert_eq!(hkey.eval(3), None);
}

#[test]
fn display_lists_ordinals_and_values() {
    let hkey = key(&[(0, &[1]), (1, &[10])]);

    assert_eq!(hkey.to_string(), "{0,(1),1,(10)}");
}

#[test]
fn truncated_bytes_are_reported_as_corruption() {
    let bytes = key(&[(0, &[1])]).to_bytes().expect("encode");
    let err = HKey::decode(&bytes[..3]).expect_err("header is cut short");

    assert_eq!(err.class, ErrorClass::Corruption);
}

#[test]
fn cache_hands_out_one_slot_per_table() {
    let mut cache = HKeyCache::new();
    key(&[(0, &[1])]).copy_to(cache.slot(TableId::new(0)));
    cache.slot(TableId::new(0)).push_segment(TableId::new(1), vec![Value::Int(3)]);

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.slot(TableId::new(0)).segment_count(), 2);
}

proptest! {
    #[test]
    fn byte_order_matches_hkey_order(a in arb_hkey(), b in arb_hkey()) {
        let left = a.to_bytes().expect("encode");
        let right = b.to_bytes().expect("encode");

        prop_assert_eq!(left.cmp(&right), a.cmp(&b));
    }

    #[test]
    fn ancestor_bytes_prefix_descendant_bytes(hkey in arb_hkey(), cut in 0usize..4) {
        let ancestor = hkey.truncated(cut);
        let full = hkey.to_bytes().expect("encode");
        let prefix = ancestor.to_bytes().expect("encode");

        prop_assert!(full.starts_with(&prefix));
        prop_assert_eq!(HKey::decode(&full).expect("decode"), hkey);
    }
}
