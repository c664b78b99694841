//! Shared fixtures: the customers -> orders -> items / customers -> addresses
//! group over an in-memory store.

use crate::{
    adapter::StoreAdapter,
    config::AdapterConfig,
    cursor::Cursor,
    kv::{KvTransaction, MemoryStore, MemoryTransaction},
    obs::sink::{MetricsEvent, MetricsSink, with_metrics_sink},
    row::Row,
    schema::{IndexDef, Schema, TableDef, TableId},
    value::{ColumnType, Value},
};
use std::{cell::RefCell, rc::Rc, sync::Arc};

pub(crate) const CUSTOMERS: TableId = TableId::new(0);
pub(crate) const ORDERS: TableId = TableId::new(1);
pub(crate) const ITEMS: TableId = TableId::new(2);
pub(crate) const ADDRESSES: TableId = TableId::new(3);

pub(crate) fn schema() -> Arc<Schema> {
    let schema = Schema::builder()
        .table(
            TableDef::new("customers")
                .column("id", ColumnType::Int)
                .nullable_column("name", ColumnType::Text)
                .key(&["id"]),
        )
        .table(
            TableDef::new("orders")
                .column("id", ColumnType::Int)
                .column("cust", ColumnType::Int)
                .column("amt", ColumnType::Int)
                .key(&["id"])
                .parent("customers", &["cust"]),
        )
        .table(
            TableDef::new("items")
                .column("id", ColumnType::Int)
                .column("order_id", ColumnType::Int)
                .column("sku", ColumnType::Text)
                .key(&["id"])
                .parent("orders", &["order_id"]),
        )
        .table(
            TableDef::new("addresses")
                .column("id", ColumnType::Int)
                .column("cust", ColumnType::Int)
                .column("city", ColumnType::Text)
                .key(&["id"])
                .parent("customers", &["cust"]),
        )
        .index(IndexDef::new("amt", "orders").column("orders", "amt"))
        .index(
            IndexDef::new("name_sku", "items")
                .column("customers", "name")
                .column("items", "sku"),
        )
        .index(
            IndexDef::new("city", "addresses")
                .column("addresses", "city")
                .unique(),
        )
        .sequence("order_ids", 100, 1)
        .build()
        .expect("fixture schema should build");

    Arc::new(schema)
}

///
/// Fixture
///
/// One schema, one store, one open transaction and its adapter.
///

pub(crate) struct Fixture {
    pub(crate) schema: Arc<Schema>,
    pub(crate) store: MemoryStore,
    pub(crate) txn: Rc<MemoryTransaction>,
    pub(crate) adapter: StoreAdapter,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self::with_config(AdapterConfig::default())
    }

    pub(crate) fn with_config(config: AdapterConfig) -> Self {
        let schema = schema();
        let store = MemoryStore::new();
        let txn = store.begin();
        let adapter = adapter_for(&schema, &txn, config);

        Self {
            schema,
            store,
            txn,
            adapter,
        }
    }

    /// A plain row of `table` built from `values`.
    pub(crate) fn row(&self, table: TableId, values: Vec<Value>) -> Row {
        values_row(&self.schema, table, values)
    }

    pub(crate) fn customer(&self, id: i64, name: &str) -> Row {
        self.row(CUSTOMERS, vec![Value::Int(id), Value::from(name)])
    }

    pub(crate) fn order(&self, id: i64, cust: i64, amt: i64) -> Row {
        self.row(ORDERS, vec![Value::Int(id), Value::Int(cust), Value::Int(amt)])
    }

    pub(crate) fn item(&self, id: i64, order_id: i64, sku: &str) -> Row {
        self.row(
            ITEMS,
            vec![Value::Int(id), Value::Int(order_id), Value::from(sku)],
        )
    }

    pub(crate) fn address(&self, id: i64, cust: i64, city: &str) -> Row {
        self.row(
            ADDRESSES,
            vec![Value::Int(id), Value::Int(cust), Value::from(city)],
        )
    }

    /// Write every row at the current step.
    pub(crate) fn load(&self, rows: &[Row]) {
        for row in rows {
            self.adapter
                .write_row(row, self.adapter.use_current_encoding())
                .expect("fixture row should be written");
        }
    }

    /// Customer 1 with orders 10 and 11 (item 100 under order 10), customer 2
    /// with order 20 and address 30.
    pub(crate) fn load_sample(&self) {
        self.load(&[
            self.customer(1, "A"),
            self.order(10, 1, 5),
            self.order(11, 1, 7),
            self.item(100, 10, "sku-a"),
            self.customer(2, "B"),
            self.order(20, 2, 3),
            self.address(30, 2, "Oslo"),
        ]);
    }

    /// Current transaction step.
    pub(crate) fn step(&self) -> u32 {
        self.txn.step()
    }

    /// Every row of the fixture group, as (table, values).
    pub(crate) fn scan_group(&self) -> Vec<(TableId, Vec<Value>)> {
        let group = self.schema.table(CUSTOMERS).group();
        let mut cursor = self.adapter.new_group_cursor(group);
        cursor.open().expect("group cursor should open");

        drain(&mut cursor)
            .into_iter()
            .map(|row| {
                let table = row.table().expect("stored rows name their table");
                (table, row.to_values().expect("stored row values"))
            })
            .collect()
    }
}

pub(crate) fn adapter_for(
    schema: &Arc<Schema>,
    txn: &Rc<MemoryTransaction>,
    config: AdapterConfig,
) -> StoreAdapter {
    let txn: Rc<dyn KvTransaction> = txn.clone();

    StoreAdapter::new(schema.clone(), txn, config).expect("fixture adapter should build")
}

pub(crate) fn values_row(schema: &Schema, table: TableId, values: Vec<Value>) -> Row {
    Row::values(schema.table_row_type(table).clone(), values).expect("fixture row width")
}

/// Read an opened cursor to exhaustion.
pub(crate) fn drain(cursor: &mut impl Cursor) -> Vec<Row> {
    let mut rows = Vec::new();
    while let Some(row) = cursor.next().expect("cursor should advance") {
        rows.push(row);
    }

    rows
}

/// First field of every row, as an integer.
pub(crate) fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter()
        .map(|row| {
            row.field(0)
                .expect("first field")
                .as_int()
                .expect("integer id")
        })
        .collect()
}

///
/// CapturingSink
///

#[derive(Default)]
pub(crate) struct CapturingSink {
    events: RefCell<Vec<MetricsEvent>>,
}

impl MetricsSink for CapturingSink {
    fn record(&self, event: MetricsEvent) {
        self.events.borrow_mut().push(event);
    }
}

/// Run `f` and return its result with every metrics event it recorded.
pub(crate) fn capture<T>(f: impl FnOnce() -> T) -> (T, Vec<MetricsEvent>) {
    let sink = Rc::new(CapturingSink::default());
    let out = with_metrics_sink(sink.clone(), f);
    let events = sink.events.borrow().clone();

    (out, events)
}
