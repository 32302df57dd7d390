/// LivePivot - streaming pivot tables over live columnar data
///
/// An indexed, mutable columnar table plus incrementally maintained pivot
/// views (group-by rows, split-by columns, aggregates, filter and sort) whose
/// changes stream to subscribers as grid deltas.

pub mod aggregate;
pub mod changeset;
pub mod column;
pub mod config;
pub mod delta;
pub mod error;
pub mod expr;
pub mod interner;
pub mod live;
pub mod manager;
pub mod messages;
pub mod pivot;
pub mod table;
pub mod temporal;
pub mod view;

pub use aggregate::Aggregate;
pub use changeset::{IndexAdjuster, RowDelta, TableChange};
pub use column::{Column, ColumnType, ColumnValue};
pub use config::{SortKey, SortOrder, ViewConfig, ViewPlan};
pub use delta::{DeltaEntry, ViewDelta};
pub use error::{EngineError, Result};
pub use interner::{DictionaryStats, StringDictionary, StringId};
pub use live::{DegradedSink, LiveTable};
pub use manager::{ClientId, Manager, SubscriptionId, ViewEvent};
pub use pivot::{ColumnSpec, DegradedCell, Grid, GroupPath, RowKey, Viewport};
pub use table::{Row, Schema, Table};
pub use view::{Dimensions, LiveView};

// WebSocket server modules - only when server feature is enabled
#[cfg(feature = "server")]
pub mod websocket;
#[cfg(feature = "server")]
pub mod server;

#[cfg(test)]
mod integration_tests {
    use super::*;

    fn record(pairs: &[(&str, ColumnValue)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn int(v: i64) -> ColumnValue {
        ColumnValue::Integer(v)
    }

    fn null() -> ColumnValue {
        ColumnValue::Null
    }

    fn base() -> LiveTable {
        LiveTable::from_json("base", r#"[{"a": 1, "b": 2}, {"a": 3, "b": 4}]"#, None).unwrap()
    }

    /// Load `config`'s output into a new table and return that table's
    /// identity view.
    fn round_trip(config: ViewConfig) -> (LiveTable, LiveView) {
        let table = base();
        let view = table.view(config).unwrap();
        let copy = LiveTable::from_view("copy", &view, None).unwrap();
        let view2 = copy.view(ViewConfig::default()).unwrap();
        assert_eq!(view2.to_records().unwrap(), view.to_records().unwrap());
        (copy, view2)
    }

    fn schema_of(view: &LiveView) -> Vec<(String, ColumnType)> {
        view.schema()
            .unwrap()
            .into_iter()
            .map(|c| (c.name, c.column_type))
            .collect()
    }

    fn names(columns: &[&str]) -> Vec<(String, ColumnType)> {
        columns.iter().map(|c| (c.to_string(), ColumnType::Integer)).collect()
    }

    #[test]
    fn test_round_trip_identity_view() {
        let (_copy, view) = round_trip(ViewConfig::default());
        let dims = view.dimensions().unwrap();
        assert_eq!((dims.num_view_rows, dims.num_view_columns), (2, 2));
        assert_eq!(schema_of(&view), names(&["a", "b"]));
        assert_eq!(
            view.to_records().unwrap(),
            vec![
                record(&[("a", int(1)), ("b", int(2))]),
                record(&[("a", int(3)), ("b", int(4))]),
            ]
        );
    }

    #[test]
    fn test_round_trip_group_by() {
        let (_copy, view) = round_trip(ViewConfig::new().with_group_by(["a"]));
        let dims = view.dimensions().unwrap();
        assert_eq!((dims.num_view_rows, dims.num_view_columns), (3, 3));
        assert_eq!(schema_of(&view), names(&["a (Group by 1)", "a", "b"]));
        assert_eq!(
            view.to_records().unwrap(),
            vec![
                record(&[("a (Group by 1)", null()), ("a", int(4)), ("b", int(6))]),
                record(&[("a (Group by 1)", int(1)), ("a", int(1)), ("b", int(2))]),
                record(&[("a (Group by 1)", int(3)), ("a", int(3)), ("b", int(4))]),
            ]
        );
    }

    #[test]
    fn test_round_trip_group_and_split() {
        let (_copy, view) = round_trip(ViewConfig::new().with_group_by(["a"]).with_split_by(["b"]));
        let dims = view.dimensions().unwrap();
        assert_eq!((dims.num_view_rows, dims.num_view_columns), (3, 5));
        assert_eq!(schema_of(&view), names(&["a (Group by 1)", "2|a", "2|b", "4|a", "4|b"]));
        assert_eq!(
            view.to_records().unwrap(),
            vec![
                record(&[
                    ("a (Group by 1)", null()),
                    ("2|a", int(1)),
                    ("2|b", int(2)),
                    ("4|a", int(3)),
                    ("4|b", int(4)),
                ]),
                record(&[
                    ("a (Group by 1)", int(1)),
                    ("2|a", int(1)),
                    ("2|b", int(2)),
                    ("4|a", null()),
                    ("4|b", null()),
                ]),
                record(&[
                    ("a (Group by 1)", int(3)),
                    ("2|a", null()),
                    ("2|b", null()),
                    ("4|a", int(3)),
                    ("4|b", int(4)),
                ]),
            ]
        );
    }

    #[test]
    fn test_round_trip_split_only() {
        let (copy, view) = round_trip(ViewConfig::new().with_split_by(["b"]));
        assert_eq!(copy.size().unwrap(), 2);
        let dims = view.dimensions().unwrap();
        assert_eq!((dims.num_view_rows, dims.num_view_columns), (2, 4));
        assert_eq!(schema_of(&view), names(&["2|a", "2|b", "4|a", "4|b"]));
        assert_eq!(
            view.to_records().unwrap(),
            vec![
                record(&[("2|a", int(1)), ("2|b", int(2)), ("4|a", null()), ("4|b", null())]),
                record(&[("2|a", null()), ("2|b", null()), ("4|a", int(3)), ("4|b", int(4))]),
            ]
        );
    }

    #[test]
    fn test_round_trip_types_follow_aggregates() {
        let table = base();
        let view = table
            .view(
                ViewConfig::new()
                    .with_group_by(["a"])
                    .with_aggregate("b", Aggregate::Avg)
                    .with_aggregate("a", Aggregate::Count),
            )
            .unwrap();
        let copy = LiveTable::from_view("copy", &view, None).unwrap();
        let schema = copy.schema().unwrap();
        assert_eq!(schema.get_column_type("a (Group by 1)"), Some(ColumnType::Integer));
        assert_eq!(schema.get_column_type("a"), Some(ColumnType::Integer));
        assert_eq!(schema.get_column_type("b"), Some(ColumnType::Float));
        assert!(schema.is_column_nullable("b").unwrap());
    }

    #[test]
    fn test_group_row_count_and_total() {
        let table = LiveTable::from_json(
            "t",
            r#"[{"g": "x", "v": 1.5}, {"g": "y", "v": 2.0}, {"g": "x", "v": 4.0}, {"g": "z", "v": null}]"#,
            None,
        )
        .unwrap();
        let view = table.view(ViewConfig::new().with_group_by(["g"])).unwrap();
        let records = view.to_records().unwrap();
        assert_eq!(records.len(), 3 + 1);
        assert_eq!(records[0]["v"], ColumnValue::Float(7.5));
        assert_eq!(records[0]["g"], int(4));
        assert_eq!(records[3]["v"], null());
    }

    #[test]
    fn test_upsert_only_overwrites_supplied_fields() {
        let table = LiveTable::from_json(
            "t",
            r#"[{"id": 1, "x": "a", "y": 10}, {"id": 2, "x": "b", "y": 20}]"#,
            Some("id"),
        )
        .unwrap();
        let view = table.view(ViewConfig::default()).unwrap();
        table
            .update(vec![
                record(&[("id", int(2)), ("y", int(25))]),
                record(&[("id", int(3)), ("x", "c".into())]),
            ])
            .unwrap();
        assert_eq!(
            view.to_records().unwrap(),
            vec![
                record(&[("id", int(1)), ("x", "a".into()), ("y", int(10))]),
                record(&[("id", int(2)), ("x", "b".into()), ("y", int(25))]),
                record(&[("id", int(3)), ("x", "c".into()), ("y", null())]),
            ]
        );
        assert_eq!(view.to_records().unwrap(), table.to_records().unwrap());
    }

    #[test]
    fn test_streaming_matches_fresh_view() {
        let table = LiveTable::from_json(
            "t",
            r#"[{"id": 1, "g": "x", "s": "p", "v": 1}, {"id": 2, "g": "y", "s": "q", "v": 2}]"#,
            Some("id"),
        )
        .unwrap();
        let config = ViewConfig::new()
            .with_group_by(["g"])
            .with_split_by(["s"])
            .with_columns(["v"])
            .with_sort(SortKey::descending("v"));
        let view = table.view(config.clone()).unwrap();
        let (mut grid, mut rx) = view.subscribe().unwrap();

        table.update(vec![record(&[("id", int(3)), ("g", "z".into()), ("s", "r".into()), ("v", int(9))])]).unwrap();
        table.update(vec![record(&[("id", int(1)), ("g", "y".into())])]).unwrap();
        table.remove(&[int(2)]).unwrap();
        table.update(vec![record(&[("id", int(4)), ("g", null()), ("s", "p".into()), ("v", int(-3))])]).unwrap();

        while let Ok(delta) = rx.try_recv() {
            grid.apply(&delta.entries);
        }
        let fresh = table.view(config).unwrap();
        assert_eq!(grid, fresh.snapshot().unwrap());
        assert_eq!(grid.to_records(), fresh.to_records().unwrap());
    }
}
