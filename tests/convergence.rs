//! Property-based tests: a grid patched by streamed deltas always equals a
//! freshly built view of the same table.

use livepivot::{Aggregate, ColumnType, ColumnValue, LiveTable, Row, Schema, SortKey, ViewConfig};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Upsert {
        id: i64,
        g: Option<u8>,
        s: Option<u8>,
        v: Option<i64>,
    },
    Patch {
        id: i64,
        v: Option<i64>,
    },
    Remove(Vec<i64>),
    Clear,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (
            0i64..12,
            prop::option::weighted(0.85, 0u8..3),
            prop::option::weighted(0.85, 0u8..3),
            prop::option::of(-50i64..50),
        )
            .prop_map(|(id, g, s, v)| Op::Upsert { id, g, s, v }),
        3 => (0i64..12, prop::option::of(-50i64..50)).prop_map(|(id, v)| Op::Patch { id, v }),
        2 => prop::collection::vec(0i64..12, 1..4).prop_map(Op::Remove),
        1 => Just(Op::Clear),
    ]
}

fn config(kind: usize) -> ViewConfig {
    match kind {
        0 => ViewConfig::default(),
        1 => ViewConfig::new().with_group_by(["g"]),
        2 => ViewConfig::new().with_group_by(["g", "s"]).with_columns(["v", "f"]),
        3 => ViewConfig::new()
            .with_group_by(["g"])
            .with_split_by(["s"])
            .with_aggregate("v", Aggregate::Max)
            .with_sort(SortKey::descending("f")),
        4 => ViewConfig::new()
            .with_split_by(["s"])
            .with_filter("v > -20")
            .with_sort(SortKey::ascending("v")),
        5 => ViewConfig::new()
            .with_expression("scaled", "v * 2 + 1")
            .with_expression("hot", "f > 3")
            .with_group_by(["hot"])
            .with_split_by(["s"])
            .with_sort(SortKey::descending("scaled")),
        6 => ViewConfig::new()
            .with_expression("scaled", "v * 2 + 1")
            .with_columns(["id", "scaled"])
            .with_filter("scaled > 0")
            .with_sort(SortKey::ascending("scaled")),
        _ => ViewConfig::new()
            .with_group_by(["s"])
            .with_aggregate("g", Aggregate::DistinctCount)
            .with_aggregate("f", Aggregate::Avg)
            .with_filter("g IN ('l0', 'l2')"),
    }
}

fn label(n: Option<u8>) -> ColumnValue {
    n.map(|n| ColumnValue::String(format!("l{}", n)))
        .unwrap_or(ColumnValue::Null)
}

fn apply(table: &LiveTable, op: &Op) {
    match op {
        Op::Upsert { id, g, s, v } => {
            let row: Row = Row::from([
                ("id".to_string(), ColumnValue::Integer(*id)),
                ("g".to_string(), label(*g)),
                ("s".to_string(), label(*s)),
                ("v".to_string(), ColumnValue::from(*v)),
                ("f".to_string(), ColumnValue::from(v.map(|v| v as f64 / 4.0))),
            ]);
            table.update(vec![row]).unwrap();
        }
        Op::Patch { id, v } => {
            let row: Row = Row::from([
                ("id".to_string(), ColumnValue::Integer(*id)),
                ("v".to_string(), ColumnValue::from(*v)),
            ]);
            table.update(vec![row]).unwrap();
        }
        Op::Remove(ids) => {
            let keys: Vec<ColumnValue> = ids.iter().map(|id| ColumnValue::Integer(*id)).collect();
            table.remove(&keys).unwrap();
        }
        Op::Clear => {
            table.clear().unwrap();
        }
    }
}

fn table() -> LiveTable {
    let schema = Schema::new(vec![
        ("id".to_string(), ColumnType::Integer, false),
        ("g".to_string(), ColumnType::String, true),
        ("s".to_string(), ColumnType::String, true),
        ("v".to_string(), ColumnType::Integer, true),
        ("f".to_string(), ColumnType::Float, true),
    ]);
    LiveTable::new("prop", schema, Some("id")).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Applying every published delta to the subscription snapshot gives the
    /// grid a fresh view builds.
    #[test]
    fn deltas_converge_to_fresh_view(kind in 0usize..8, ops in prop::collection::vec(op(), 1..40)) {
        let table = table();
        let view = table.view(config(kind)).unwrap();
        let (mut grid, mut rx) = view.subscribe().unwrap();

        for op in &ops {
            apply(&table, op);
            while let Ok(delta) = rx.try_recv() {
                grid.apply(&delta.entries);
            }
            prop_assert_eq!(&grid, &view.snapshot().unwrap());
        }

        let fresh = table.view(config(kind)).unwrap();
        prop_assert_eq!(grid, fresh.snapshot().unwrap());
    }

    /// The identity view always mirrors the table.
    #[test]
    fn identity_view_mirrors_table(ops in prop::collection::vec(op(), 1..40)) {
        let table = table();
        let view = table.view(ViewConfig::default()).unwrap();
        for op in &ops {
            apply(&table, op);
        }
        prop_assert_eq!(view.to_records().unwrap(), table.to_records().unwrap());
    }

    /// The grand total of a summed column equals the sum over all base rows.
    #[test]
    fn grand_total_sums_base_rows(ops in prop::collection::vec(op(), 1..40)) {
        let table = table();
        let view = table.view(ViewConfig::new().with_group_by(["g"])).unwrap();
        for op in &ops {
            apply(&table, op);
        }

        let records = table.to_records().unwrap();
        let values: Vec<i64> = records.iter().filter_map(|r| r["v"].as_i64()).collect();
        let view_records = view.to_records().unwrap();
        if records.is_empty() {
            prop_assert!(view_records.is_empty());
        } else {
            let expected = if values.is_empty() {
                ColumnValue::Null
            } else {
                ColumnValue::Integer(values.iter().sum())
            };
            prop_assert_eq!(&view_records[0]["v"], &expected);
        }
    }
}
