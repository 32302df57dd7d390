use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use livepivot::*;

const LINES: [&str; 6] = ["A", "C", "E", "G", "L", "N"];

fn trip(id: i64, delay: f64) -> Row {
    Row::from([
        ("id".to_string(), ColumnValue::Integer(id)),
        ("line".to_string(), ColumnValue::from(LINES[(id as usize) % LINES.len()])),
        ("direction".to_string(), ColumnValue::from(if id % 2 == 0 { "N" } else { "S" })),
        ("delay".to_string(), ColumnValue::Float(delay)),
        ("stops".to_string(), ColumnValue::Integer(id % 17)),
    ])
}

fn trips(size: i64) -> LiveTable {
    let schema = Schema::new(vec![
        ("id".to_string(), ColumnType::Integer, false),
        ("line".to_string(), ColumnType::String, true),
        ("direction".to_string(), ColumnType::String, true),
        ("delay".to_string(), ColumnType::Float, true),
        ("stops".to_string(), ColumnType::Integer, true),
    ]);
    let table = LiveTable::new("trips", schema, Some("id")).unwrap();
    table
        .update((0..size).map(|id| trip(id, (id % 13) as f64)).collect())
        .unwrap();
    table
}

fn pivot_config() -> ViewConfig {
    ViewConfig::new()
        .with_group_by(["line"])
        .with_split_by(["direction"])
        .with_aggregate("delay", Aggregate::Avg)
}

fn bench_table_upsert(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_upsert");

    for size in [1000, 10000].iter() {
        let table = trips(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut id = 0;
            b.iter(|| {
                id = (id + 7) % size;
                table.update(vec![black_box(trip(id, 1.5))]).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_view_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("view_build");

    for size in [1000, 10000].iter() {
        let table = trips(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| table.view(black_box(pivot_config())).unwrap().dimensions().unwrap());
        });
    }
    group.finish();
}

fn bench_incremental_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("incremental_update_with_pivot");

    for size in [1000, 10000].iter() {
        let table = trips(*size);
        let _view = table.view(pivot_config()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut id = 0;
            b.iter(|| {
                id = (id + 11) % size;
                table.update(vec![black_box(trip(id, (id % 5) as f64))]).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_flat_sorted_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_sorted_insert");

    for size in [1000, 10000].iter() {
        let table = trips(*size);
        let _view = table
            .view(ViewConfig::new().with_sort(SortKey::descending("delay")))
            .unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut next = size;
            b.iter(|| {
                next += 1;
                table.update(vec![black_box(trip(next, (next % 29) as f64))]).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_filtered_view_build(c: &mut Criterion) {
    let table = trips(10000);
    c.bench_function("filtered_view_build_10000", |b| {
        b.iter(|| {
            table
                .view(black_box(
                    ViewConfig::new().with_filter("delay > 6 AND line IN ('A', 'E')"),
                ))
                .unwrap()
                .dimensions()
                .unwrap()
        });
    });
}

fn bench_windowed_read(c: &mut Criterion) {
    let table = trips(10000);
    let view = table
        .view(
            ViewConfig::new()
                .with_expression("late", "delay > 6")
                .with_sort(SortKey::descending("delay")),
        )
        .unwrap();
    c.bench_function("windowed_read_10000", |b| {
        b.iter(|| view.to_records_window(black_box(&Viewport::rows(5000, 5100))).unwrap());
    });
}

criterion_group!(
    benches,
    bench_table_upsert,
    bench_view_build,
    bench_incremental_update,
    bench_flat_sorted_insert,
    bench_filtered_view_build,
    bench_windowed_read
);
criterion_main!(benches);
