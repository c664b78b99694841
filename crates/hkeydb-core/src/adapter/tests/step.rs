use super::{AMT, amounts};
use crate::{
    adapter::{IndexKeyRange, IndexScanSelector},
    config::AdapterConfig,
    cursor::Cursor,
    direction::Direction,
    kv::KvTransaction,
    obs::sink::MetricsEvent,
    test_support::{CUSTOMERS, Fixture, capture},
    value::Value,
};

#[test]
fn mutation_returns_to_the_step_it_started_at() {
    let fx = Fixture::new();
    fx.txn.set_step(3);

    fx.adapter
        .write_row(&fx.customer(1, "A"), true)
        .expect("write should succeed");
    assert_eq!(fx.step(), 3);

    fx.adapter
        .update_row(&fx.customer(1, "A"), &fx.customer(1, "B"), true)
        .expect("update should succeed");
    assert_eq!(fx.step(), 3);
}

#[test]
fn writes_stay_hidden_until_the_step_advances_past_them() {
    let fx = Fixture::new();
    fx.txn.set_step(1);

    fx.adapter
        .write_row(&fx.customer(1, "A"), true)
        .expect("write should succeed");
    assert!(fx.scan_group().is_empty());
    assert_eq!(fx.txn.max_write_step(), 2);

    fx.adapter.advance_past_writes();
    assert_eq!(fx.step(), 2);
    assert_eq!(fx.scan_group().len(), 1);
}

#[test]
fn advance_never_moves_the_step_backwards() {
    let fx = Fixture::new();
    fx.txn.set_step(5);

    fx.adapter.advance_past_writes();

    assert_eq!(fx.step(), 5);
}

#[test]
fn writes_at_step_zero_are_visible_immediately() {
    let fx = Fixture::new();

    fx.adapter
        .write_row(&fx.customer(1, "A"), true)
        .expect("write should succeed");

    assert_eq!(fx.step(), 0);
    assert_eq!(fx.scan_group().len(), 1);
}

#[test]
fn forced_bracket_advances_from_zero_and_restores() {
    let fx = Fixture::new();

    {
        let guard = fx.adapter.enter_update_step(true);
        assert_eq!(guard.saved_step(), 0);
        assert_eq!(fx.step(), 1);
    }

    assert_eq!(fx.step(), 0);
}

#[test]
fn disabled_step_changing_writes_at_the_current_step() {
    let fx = Fixture::new();
    fx.adapter.set_with_step_changing(false);
    fx.txn.set_step(1);

    fx.adapter
        .write_row(&fx.customer(1, "A"), true)
        .expect("write should succeed");

    assert_eq!(fx.step(), 1);
    assert_eq!(fx.scan_group().len(), 1);
}

#[test]
fn step_changing_follows_config() {
    let config = AdapterConfig {
        with_step_changing: false,
        ..AdapterConfig::default()
    };
    let fx = Fixture::with_config(config);
    fx.txn.set_step(2);

    let guard = fx.adapter.enter_update_step(true);
    assert_eq!(fx.step(), 2);
    drop(guard);

    assert!(!fx.adapter.with_step_changing());
}

#[test]
fn failed_mutation_leaves_the_step_unrestored() {
    let fx = Fixture::new();
    fx.load_sample();
    fx.txn.set_step(1);

    let (result, events) = capture(|| fx.adapter.write_row(&fx.customer(1, "A"), true));

    assert!(result.is_err());
    assert!(fx.txn.is_rolled_back());
    assert_eq!(fx.step(), 2);
    assert!(events.contains(&MetricsEvent::StepRestoreSkipped));
}

#[test]
fn pending_rollback_skips_restoration() {
    let fx = Fixture::new();
    fx.txn.set_step(1);

    {
        let _guard = fx.adapter.enter_update_step(false);
        fx.txn.mark_rollback_pending();
    }

    assert_eq!(fx.step(), 2);
}

#[test]
fn updates_during_an_index_scan_are_not_seen_by_it() {
    let fx = Fixture::new();
    fx.load_sample();
    fx.txn.set_step(1);

    let mut cursor = fx
        .adapter
        .new_index_cursor(
            AMT,
            IndexKeyRange::all(),
            Direction::Asc,
            IndexScanSelector::LeafOnly,
        )
        .expect("index cursor should build");
    cursor.open().expect("index cursor should open");

    let mut seen = Vec::new();
    while let Some(row) = cursor.next().expect("scan should advance") {
        let amt = row.field(0).expect("amount").as_int().expect("integer amount");
        let hkey = row.hkey().expect("index row hkey");
        let id = hkey.segments()[1].values[0].as_int().expect("order id");
        let cust = hkey.segments()[0].values[0].as_int().expect("customer id");
        drop(row);

        fx.adapter
            .update_row(&fx.order(id, cust, amt), &fx.order(id, cust, amt + 100), true)
            .expect("update should succeed");
        seen.push(amt);
        assert!(seen.len() <= 3, "scan revisited updated rows: {seen:?}");
    }
    cursor.close();

    assert_eq!(seen, vec![3, 5, 7]);
    assert_eq!(fx.step(), 1);

    fx.adapter.advance_past_writes();
    assert_eq!(amounts(&fx), vec![103, 105, 107]);
}

#[test]
fn deletes_during_a_group_scan_do_not_hide_rows_from_it() {
    let fx = Fixture::new();
    fx.load_sample();
    fx.txn.set_step(1);

    let group = fx.schema.table(CUSTOMERS).group();
    let mut cursor = fx.adapter.new_group_cursor(group);
    cursor.open().expect("group cursor should open");

    let first = cursor
        .next()
        .expect("scan should advance")
        .expect("customer 1");
    fx.adapter
        .delete_row(&first, true, true)
        .expect("cascading delete should succeed");

    let mut remaining = 0;
    while cursor.next().expect("scan should advance").is_some() {
        remaining += 1;
    }
    assert_eq!(remaining, 6);

    fx.adapter.advance_past_writes();
    assert_eq!(fx.scan_group().len(), 3);
    assert_eq!(
        fx.scan_group()[0].1,
        vec![Value::Int(2), Value::from("B")]
    );
}
