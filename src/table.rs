//! LivePivot Table Implementation
//!
//! A Table is a named collection of typed columns sharing one row count, with
//! an optional index (primary key) column. Rows keep their physical append
//! order; on an indexed table an update whose key already exists overwrites
//! only the supplied fields of that row in place.
//!
//! Every mutation validates the whole batch before touching any column, so a
//! failing `update` leaves the table exactly as it was.
//!
//! # Examples
//!
//! ```
//! use livepivot::{Table, Schema, ColumnType, ColumnValue};
//! use std::collections::HashMap;
//!
//! let schema = Schema::new(vec![
//!     ("trip_id".to_string(), ColumnType::String, false),
//!     ("line".to_string(), ColumnType::String, true),
//!     ("delay".to_string(), ColumnType::Float, true),
//! ]);
//! let mut table = Table::new("trips".to_string(), schema, Some("trip_id")).unwrap();
//!
//! let mut row = HashMap::new();
//! row.insert("trip_id".to_string(), ColumnValue::from("t1"));
//! row.insert("line".to_string(), ColumnValue::from("A"));
//! row.insert("delay".to_string(), ColumnValue::Float(30.0));
//! table.update(vec![row]).unwrap();
//!
//! // Same key: only `delay` is overwritten
//! let mut patch = HashMap::new();
//! patch.insert("trip_id".to_string(), ColumnValue::from("t1"));
//! patch.insert("delay".to_string(), ColumnValue::Integer(45));
//! table.update(vec![patch]).unwrap();
//!
//! assert_eq!(table.len(), 1);
//! assert_eq!(table.get_value(0, "line").unwrap(), ColumnValue::from("A"));
//! assert_eq!(table.get_value(0, "delay").unwrap(), ColumnValue::Float(45.0));
//! ```

use crate::changeset::{IndexAdjuster, RowDelta, TableChange};
use crate::column::{Column, ColumnType, ColumnValue};
use crate::error::{EngineError, Result};
use std::collections::{BTreeSet, HashMap};

/// One input or output row: column name -> value.
pub type Row = HashMap<String, ColumnValue>;

/// Schema definition with column names and types.
///
/// ```
/// use livepivot::{Schema, ColumnType};
///
/// let schema = Schema::new(vec![
///     ("id".to_string(), ColumnType::Integer, false),
///     ("line".to_string(), ColumnType::String, true),
/// ]);
///
/// assert_eq!(schema.len(), 2);
/// assert_eq!(schema.get_column_index("line"), Some(1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<(String, ColumnType, bool)>, // (name, type, nullable)
}

impl Schema {
    /// Creates a new schema from (column_name, column_type, is_nullable) tuples.
    pub fn new(columns: Vec<(String, ColumnType, bool)>) -> Self {
        Schema { columns }
    }

    /// Schema where every column is nullable.
    pub fn nullable(columns: Vec<(String, ColumnType)>) -> Self {
        Schema {
            columns: columns.into_iter().map(|(name, ty)| (name, ty, true)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get_column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _, _)| name.as_str()).collect()
    }

    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|(n, _, _)| n == name)
    }

    /// Returns (name, type, nullable) for the column at `index`.
    pub fn get_column_info(&self, index: usize) -> Option<(&str, ColumnType, bool)> {
        self.columns.get(index).map(|(name, ty, nullable)| (name.as_str(), *ty, *nullable))
    }

    pub fn get_column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns.iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, ty, _)| *ty)
    }

    pub fn is_column_nullable(&self, name: &str) -> Option<bool> {
        self.columns.iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, _, nullable)| *nullable)
    }

    /// Ordered (name, type) pairs.
    pub fn fields(&self) -> Vec<(String, ColumnType)> {
        self.columns.iter().map(|(name, ty, _)| (name.clone(), *ty)).collect()
    }
}

/// One validated step of an update batch.
enum Planned {
    Insert(Vec<ColumnValue>),
    Set { offset: usize, fields: Vec<(usize, ColumnValue)> },
}

/// Root table owning its data.
pub struct Table {
    name: String,
    schema: Schema,
    columns: Vec<Column>,
    row_count: usize,
    /// Position of the index column in the schema
    index: Option<usize>,
    /// Index value -> physical row offset
    index_map: HashMap<ColumnValue, usize>,
    /// Stable id of each row, assigned at insert, by physical offset
    row_ids: Vec<u64>,
    next_row_id: u64,
    /// Bumped on every mutation
    generation: u64,
}

impl Table {
    /// Create an empty table. `index` names the primary-key column.
    pub fn new(name: String, schema: Schema, index: Option<&str>) -> Result<Self> {
        let index = match index {
            Some(col) => Some(schema.get_column_index(col).ok_or_else(|| {
                EngineError::Schema(format!("Index column '{}' is not in the schema", col))
            })?),
            None => None,
        };

        let mut seen = BTreeSet::new();
        for name in schema.get_column_names() {
            if !seen.insert(name) {
                return Err(EngineError::Schema(format!("Duplicate column '{}'", name)));
            }
        }

        let columns = schema
            .columns
            .iter()
            .map(|(col_name, col_type, nullable)| Column::new(col_name.clone(), *col_type, *nullable))
            .collect();

        Ok(Table {
            name,
            schema,
            columns,
            row_count: 0,
            index,
            index_map: HashMap::new(),
            row_ids: Vec::new(),
            next_row_id: 0,
            generation: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema.get_column_names()
    }

    /// Name of the index column, if any.
    pub fn get_index(&self) -> Option<&str> {
        self.index.and_then(|i| self.schema.get_column_info(i)).map(|(name, _, _)| name)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.schema.get_column_index(name).map(|i| &self.columns[i])
    }

    pub fn column_at(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Physical offset of the row holding `key` in the index column.
    pub fn lookup(&self, key: &ColumnValue) -> Option<usize> {
        self.index_map.get(key).copied()
    }

    /// Stable id of the row at `offset`. Ids survive offset shifts and are
    /// never reused by the table.
    pub fn row_id(&self, offset: usize) -> Option<u64> {
        self.row_ids.get(offset).copied()
    }

    pub fn get_value(&self, row: usize, column: &str) -> Result<ColumnValue> {
        let col_idx = self.schema.get_column_index(column)
            .ok_or_else(|| EngineError::Schema(format!("Column '{}' not found", column)))?;
        self.columns[col_idx].get(row).map_err(EngineError::State)
    }

    /// Cell read by column position; out-of-range reads yield null.
    #[inline]
    pub fn value_at(&self, row: usize, col_idx: usize) -> ColumnValue {
        self.columns
            .get(col_idx)
            .and_then(|col| col.get(row).ok())
            .unwrap_or(ColumnValue::Null)
    }

    pub fn get_row(&self, row: usize) -> Result<Row> {
        if row >= self.row_count {
            return Err(EngineError::State(format!(
                "Row {} out of range [0, {})",
                row, self.row_count
            )));
        }

        let mut result = HashMap::with_capacity(self.columns.len());
        for col in &self.columns {
            result.insert(col.name().to_string(), col.get(row).map_err(EngineError::State)?);
        }
        Ok(result)
    }

    /// Insert or upsert a batch of rows.
    ///
    /// On an indexed table a row whose key already exists (or appeared
    /// earlier in the same batch) overwrites only the fields it supplies;
    /// every other row is appended with missing fields set to null. The batch
    /// is validated in full first: unknown columns are a `Schema` error, type
    /// and nullability failures a `Validation` error, and nothing is applied.
    pub fn update(&mut self, rows: Vec<Row>) -> Result<RowDelta> {
        let plan = self.plan_update(rows)?;

        self.generation += 1;
        let mut delta = RowDelta::new(self.generation);

        for step in plan {
            match step {
                Planned::Insert(values) => {
                    let offset = self.row_count;
                    let key = self.index.map(|i| values[i].clone());
                    for (col, value) in self.columns.iter_mut().zip(values) {
                        col.append(value).map_err(EngineError::Validation)?;
                    }
                    self.row_count += 1;
                    self.row_ids.push(self.next_row_id);
                    self.next_row_id += 1;
                    if let Some(key) = key {
                        self.index_map.insert(key, offset);
                    }
                    delta.push(TableChange::RowInserted { index: offset });
                }
                Planned::Set { offset, fields } => {
                    let mut touched = Vec::with_capacity(fields.len());
                    for (col_idx, value) in fields {
                        self.columns[col_idx].set(offset, value).map_err(EngineError::Validation)?;
                        touched.push(self.columns[col_idx].name().to_string());
                    }
                    delta.push(TableChange::RowUpdated { index: offset, columns: touched });
                }
            }
        }

        Ok(delta)
    }

    fn plan_update(&self, rows: Vec<Row>) -> Result<Vec<Planned>> {
        let mut plan = Vec::with_capacity(rows.len());
        // Keys inserted earlier in this batch
        let mut pending: HashMap<ColumnValue, usize> = HashMap::new();
        let mut next_offset = self.row_count;

        for row in rows {
            let mut fields = Vec::with_capacity(row.len());
            for (col_name, value) in row {
                let col_idx = self.schema.get_column_index(&col_name).ok_or_else(|| {
                    EngineError::Schema(format!("Unknown column '{}' in table '{}'", col_name, self.name))
                })?;
                let value = self.columns[col_idx].validate(value).map_err(EngineError::Validation)?;
                fields.push((col_idx, value));
            }

            let existing = match self.index {
                Some(index_col) => {
                    let key = fields
                        .iter()
                        .find(|(i, _)| *i == index_col)
                        .map(|(_, v)| v.clone())
                        .unwrap_or(ColumnValue::Null);
                    if key.is_null() {
                        return Err(EngineError::Validation(format!(
                            "Row is missing a value for index column '{}'",
                            self.columns[index_col].name()
                        )));
                    }
                    let found = self.index_map.get(&key).or_else(|| pending.get(&key)).copied();
                    match found {
                        Some(offset) => Some(offset),
                        None => {
                            pending.insert(key, next_offset);
                            None
                        }
                    }
                }
                None => None,
            };

            match existing {
                Some(offset) => plan.push(Planned::Set { offset, fields }),
                None => {
                    let mut values = vec![ColumnValue::Null; self.columns.len()];
                    for (col_idx, value) in fields {
                        values[col_idx] = value;
                    }
                    for (col, value) in self.columns.iter().zip(&values) {
                        if value.is_null() && !col.is_nullable() {
                            return Err(EngineError::Validation(format!(
                                "Column '{}' is not nullable",
                                col.name()
                            )));
                        }
                    }
                    plan.push(Planned::Insert(values));
                    next_offset += 1;
                }
            }
        }

        Ok(plan)
    }

    /// Remove rows by index value. Unknown keys are ignored.
    pub fn remove(&mut self, keys: &[ColumnValue]) -> Result<RowDelta> {
        let index_col = self.index.ok_or_else(|| {
            EngineError::Schema(format!("Table '{}' has no index; rows cannot be removed by key", self.name))
        })?;
        let key_type = self.columns[index_col].column_type();

        let doomed: BTreeSet<usize> = keys
            .iter()
            .filter_map(|key| key.clone().coerce(key_type).ok())
            .filter_map(|key| self.lookup(&key))
            .collect();

        self.generation += 1;
        let mut delta = RowDelta::new(self.generation);
        if doomed.is_empty() {
            return Ok(delta);
        }

        let doomed: Vec<usize> = doomed.into_iter().collect();
        for &offset in doomed.iter().rev() {
            for col in self.columns.iter_mut() {
                col.delete(offset).map_err(EngineError::State)?;
            }
            self.row_ids.remove(offset);
        }
        self.row_count -= doomed.len();

        self.index_map.retain(|_, offset| match IndexAdjuster::adjust_for_deletes(*offset, &doomed) {
            Some(new_offset) => {
                *offset = new_offset;
                true
            }
            None => false,
        });

        delta.push(TableChange::RowsRemoved { indices: doomed });
        Ok(delta)
    }

    /// Drop every row, keeping the schema.
    pub fn clear(&mut self) -> RowDelta {
        for col in self.columns.iter_mut() {
            col.clear();
        }
        self.row_count = 0;
        self.index_map.clear();
        self.row_ids.clear();
        self.generation += 1;

        let mut delta = RowDelta::new(self.generation);
        delta.push(TableChange::Cleared);
        delta
    }

    /// Replace the contents with `rows`. Validated in full before the old
    /// rows are dropped.
    pub fn replace(&mut self, rows: Vec<Row>) -> Result<RowDelta> {
        let index_name = self.get_index().map(str::to_string);
        let mut fresh = Table::new(self.name.clone(), self.schema.clone(), index_name.as_deref())?;
        let inserted = fresh.update(rows)?;

        self.columns = fresh.columns;
        self.row_count = fresh.row_count;
        self.index_map = fresh.index_map;
        self.row_ids = (self.next_row_id..).take(fresh.row_count).collect();
        self.next_row_id += fresh.row_count as u64;
        self.generation += 1;

        let mut delta = RowDelta::new(self.generation);
        delta.push(TableChange::Cleared);
        for change in inserted.changes() {
            delta.push(change.clone());
        }
        Ok(delta)
    }

    pub fn iter_rows(&self) -> TableRowIterator<'_> {
        TableRowIterator {
            table: self,
            index: 0,
        }
    }

    /// All rows in physical order.
    pub fn to_records(&self) -> Vec<Row> {
        self.iter_rows().collect()
    }

    /// Column-major copy of the data, in schema order.
    pub fn to_columns(&self) -> Vec<(String, Vec<ColumnValue>)> {
        self.columns
            .iter()
            .map(|col| (col.name().to_string(), col.iter().collect()))
            .collect()
    }

    /// Rows as a JSON array of objects.
    pub fn to_json(&self) -> serde_json::Value {
        let rows = (0..self.row_count)
            .map(|row| {
                let obj: serde_json::Map<String, serde_json::Value> = self.columns
                    .iter()
                    .map(|col| {
                        let value = col.get(row).unwrap_or(ColumnValue::Null);
                        (col.name().to_string(), value.to_json())
                    })
                    .collect();
                serde_json::Value::Object(obj)
            })
            .collect();
        serde_json::Value::Array(rows)
    }

    /// Convert JSON input (one object or an array of objects) into rows typed
    /// against this table's schema.
    pub fn rows_from_json(&self, value: &serde_json::Value) -> Result<Vec<Row>> {
        let items: Vec<&serde_json::Value> = match value {
            serde_json::Value::Array(items) => items.iter().collect(),
            serde_json::Value::Object(_) => vec![value],
            _ => {
                return Err(EngineError::Validation(
                    "Expected a JSON object or an array of objects".to_string(),
                ))
            }
        };

        items
            .into_iter()
            .map(|item| {
                let obj = item.as_object().ok_or_else(|| {
                    EngineError::Validation("Expected object in array".to_string())
                })?;
                let mut row = HashMap::with_capacity(obj.len());
                for (key, json) in obj {
                    let col_type = self.schema.get_column_type(key).ok_or_else(|| {
                        EngineError::Schema(format!("Unknown column '{}' in table '{}'", key, self.name))
                    })?;
                    let value = ColumnValue::from_json_typed(json, col_type)
                        .map_err(|e| EngineError::Validation(format!("Column '{}': {}", key, e)))?;
                    row.insert(key.clone(), value);
                }
                Ok(row)
            })
            .collect()
    }

    /// Build a table from rows, inferring the schema from the batch.
    ///
    /// Columns are ordered by name. A column mixing integers and floats is
    /// float, any other mix is string, and an all-null column is string.
    /// Every inferred column is nullable.
    ///
    /// ```
    /// use livepivot::{Table, ColumnType, ColumnValue};
    /// use std::collections::HashMap;
    ///
    /// let rows = vec![
    ///     HashMap::from([("a".to_string(), ColumnValue::Integer(1))]),
    ///     HashMap::from([("a".to_string(), ColumnValue::Float(2.5))]),
    /// ];
    /// let table = Table::from_rows("t".to_string(), rows, None).unwrap();
    /// assert_eq!(table.schema().get_column_type("a"), Some(ColumnType::Float));
    /// ```
    pub fn from_rows(name: String, rows: Vec<Row>, index: Option<&str>) -> Result<Table> {
        let schema = infer_schema(&rows)?;
        let mut table = Table::new(name, schema, index)?;
        table.update(rows)?;
        Ok(table)
    }

    /// Create a table from JSON text.
    ///
    /// Accepts an array of row objects (schema inferred), a column-major
    /// object `{column: [values]}` (schema inferred), or a schema object
    /// `{column: "type-name"}` (empty table).
    ///
    /// ```
    /// use livepivot::Table;
    ///
    /// let json = r#"[{"id": 1, "line": "A"}, {"id": 2, "line": "C"}]"#;
    /// let table = Table::from_json("trips", json, Some("id")).unwrap();
    /// assert_eq!(table.len(), 2);
    ///
    /// let empty = Table::from_json("t", r#"{"id": "integer", "at": "datetime"}"#, None).unwrap();
    /// assert_eq!(empty.schema().len(), 2);
    /// ```
    pub fn from_json(name: &str, json: &str, index: Option<&str>) -> Result<Table> {
        let parsed: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| EngineError::Validation(format!("JSON parse error: {}", e)))?;

        match &parsed {
            serde_json::Value::Array(items) => {
                let rows = items
                    .iter()
                    .map(|item| {
                        let obj = item.as_object().ok_or_else(|| {
                            EngineError::Validation("Expected array of objects".to_string())
                        })?;
                        json_object_to_row(obj)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Table::from_rows(name.to_string(), rows, index)
            }
            serde_json::Value::Object(obj) if obj.values().all(|v| v.is_string()) => {
                let mut columns = Vec::with_capacity(obj.len());
                for (col, ty) in obj {
                    let ty = ColumnType::parse(ty.as_str().unwrap_or_default())
                        .map_err(EngineError::Schema)?;
                    columns.push((col.clone(), ty));
                }
                Table::new(name.to_string(), Schema::nullable(columns), index)
            }
            serde_json::Value::Object(obj) if obj.values().all(|v| v.is_array()) => {
                let mut rows: Vec<Row> = Vec::new();
                for (col, values) in obj {
                    for (i, json) in values.as_array().into_iter().flatten().enumerate() {
                        if rows.len() <= i {
                            rows.resize_with(i + 1, HashMap::new);
                        }
                        let value = ColumnValue::from_json(json)
                            .map_err(|e| EngineError::Validation(format!("Column '{}': {}", col, e)))?;
                        rows[i].insert(col.clone(), value);
                    }
                }
                Table::from_rows(name.to_string(), rows, index)
            }
            _ => Err(EngineError::Validation(
                "Expected an array of objects, a column-major object or a schema object".to_string(),
            )),
        }
    }
}

/// Widen two observed types into one column type.
fn merge_types(a: ColumnType, b: ColumnType) -> ColumnType {
    match (a, b) {
        (a, b) if a == b => a,
        (ColumnType::Integer, ColumnType::Float) | (ColumnType::Float, ColumnType::Integer) => ColumnType::Float,
        (ColumnType::Date, ColumnType::DateTime) | (ColumnType::DateTime, ColumnType::Date) => ColumnType::DateTime,
        _ => ColumnType::String,
    }
}

fn infer_schema(rows: &[Row]) -> Result<Schema> {
    if rows.is_empty() {
        return Err(EngineError::Schema("Cannot infer a schema from an empty batch".to_string()));
    }

    let names: BTreeSet<&String> = rows.iter().flat_map(|row| row.keys()).collect();
    let columns = names
        .into_iter()
        .map(|name| {
            let ty = rows
                .iter()
                .filter_map(|row| row.get(name).and_then(ColumnValue::column_type))
                .reduce(merge_types)
                .unwrap_or(ColumnType::String);
            (name.clone(), ty)
        })
        .collect();

    Ok(Schema::nullable(columns))
}

fn json_object_to_row(obj: &serde_json::Map<String, serde_json::Value>) -> Result<Row> {
    obj.iter()
        .map(|(key, json)| {
            ColumnValue::from_json(json)
                .map(|v| (key.clone(), v))
                .map_err(|e| EngineError::Validation(format!("Column '{}': {}", key, e)))
        })
        .collect()
}

pub struct TableRowIterator<'a> {
    table: &'a Table,
    index: usize,
}

impl<'a> Iterator for TableRowIterator<'a> {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.table.row_count {
            None
        } else {
            let result = self.table.get_row(self.index).ok();
            self.index += 1;
            result
        }
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Table {{ name: '{}', columns: {}, rows: {}, index: {:?} }}",
            self.name,
            self.schema.len(),
            self.row_count,
            self.get_index()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, ColumnValue)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn trips() -> Table {
        let schema = Schema::new(vec![
            ("trip_id".to_string(), ColumnType::String, false),
            ("line".to_string(), ColumnType::String, true),
            ("delay".to_string(), ColumnType::Float, true),
        ]);
        Table::new("trips".to_string(), schema, Some("trip_id")).unwrap()
    }

    #[test]
    fn test_table_basic() {
        let mut table = trips();
        let delta = table
            .update(vec![
                row(&[("trip_id", "t1".into()), ("line", "A".into()), ("delay", 1.5.into())]),
                row(&[("trip_id", "t2".into()), ("line", "C".into())]),
            ])
            .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(delta.inserted_count(), 2);
        assert_eq!(table.get_value(1, "delay").unwrap(), ColumnValue::Null);
        assert_eq!(table.lookup(&"t2".into()), Some(1));
    }

    #[test]
    fn test_upsert_overwrites_supplied_fields_only() {
        let mut table = trips();
        table
            .update(vec![row(&[("trip_id", "t1".into()), ("line", "A".into()), ("delay", 1.0.into())])])
            .unwrap();

        let delta = table
            .update(vec![
                row(&[("trip_id", "t1".into()), ("delay", ColumnValue::Integer(9))]),
                row(&[("trip_id", "t9".into()), ("line", "E".into())]),
            ])
            .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(delta.updated_count(), 1);
        assert_eq!(delta.inserted_count(), 1);
        assert_eq!(table.get_value(0, "line").unwrap().as_str(), Some("A"));
        assert_eq!(table.get_value(0, "delay").unwrap(), ColumnValue::Float(9.0));
        assert_eq!(table.get_value(1, "line").unwrap().as_str(), Some("E"));
    }

    #[test]
    fn test_duplicate_key_within_batch() {
        let mut table = trips();
        table
            .update(vec![
                row(&[("trip_id", "t1".into()), ("line", "A".into())]),
                row(&[("trip_id", "t1".into()), ("delay", 2.0.into())]),
            ])
            .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.get_value(0, "line").unwrap().as_str(), Some("A"));
        assert_eq!(table.get_value(0, "delay").unwrap(), ColumnValue::Float(2.0));
    }

    #[test]
    fn test_update_is_atomic() {
        let mut table = trips();
        table.update(vec![row(&[("trip_id", "t1".into())])]).unwrap();

        let err = table
            .update(vec![
                row(&[("trip_id", "t2".into())]),
                row(&[("trip_id", "t3".into()), ("delay", ColumnValue::Boolean(true))]),
            ])
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(table.len(), 1);

        let err = table.update(vec![row(&[("trip_id", "t4".into()), ("nope", 1.into())])]).unwrap_err();
        assert!(matches!(err, EngineError::Schema(_)));

        let err = table.update(vec![row(&[("line", "A".into())])]).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.generation(), 1);
    }

    #[test]
    fn test_unindexed_appends() {
        let schema = Schema::nullable(vec![("x".to_string(), ColumnType::Integer)]);
        let mut table = Table::new("t".to_string(), schema, None).unwrap();
        table.update(vec![row(&[("x", 1.into())]), row(&[("x", 1.into())])]).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.remove(&[ColumnValue::Integer(1)]).is_err());
    }

    #[test]
    fn test_bad_index_column() {
        let schema = Schema::nullable(vec![("x".to_string(), ColumnType::Integer)]);
        let err = Table::new("t".to_string(), schema, Some("y")).unwrap_err();
        assert!(matches!(err, EngineError::Schema(_)));
    }

    #[test]
    fn test_remove_fixes_offsets() {
        let mut table = trips();
        let rows = (0..5)
            .map(|i| row(&[("trip_id", format!("t{}", i).into()), ("delay", (i as f64).into())]))
            .collect();
        table.update(rows).unwrap();

        let keys = vec![ColumnValue::from("t1"), ColumnValue::from("t3"), ColumnValue::from("missing")];
        let delta = table.remove(&keys).unwrap();
        assert_eq!(delta.removed_count(), 2);
        assert_eq!(table.len(), 3);
        assert_eq!(table.lookup(&"t4".into()), Some(2));
        assert_eq!(table.lookup(&"t1".into()), None);
        assert_eq!(table.get_value(1, "trip_id").unwrap().as_str(), Some("t2"));
        assert_eq!(
            (0..3).map(|i| table.row_id(i).unwrap()).collect::<Vec<_>>(),
            vec![0, 2, 4]
        );

        table.update(vec![row(&[("trip_id", "t4".into()), ("delay", 40.0.into())])]).unwrap();
        assert_eq!(table.get_value(2, "delay").unwrap(), ColumnValue::Float(40.0));
    }

    #[test]
    fn test_clear_and_replace() {
        let mut table = trips();
        table.update(vec![row(&[("trip_id", "t1".into())])]).unwrap();

        let bad = table.replace(vec![row(&[("line", "A".into())])]);
        assert!(bad.is_err());
        assert_eq!(table.len(), 1);

        let delta = table
            .replace(vec![row(&[("trip_id", "x".into())]), row(&[("trip_id", "y".into())])])
            .unwrap();
        assert!(delta.is_reset());
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup(&"y".into()), Some(1));
        // Ids keep counting up across a replace
        assert_eq!(table.row_id(0), Some(1));
        assert_eq!(table.row_id(1), Some(2));

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.lookup(&"x".into()), None);
    }

    #[test]
    fn test_from_rows_inference() {
        let rows = vec![
            row(&[("a", 1.into()), ("b", "x".into()), ("c", ColumnValue::Null)]),
            row(&[("a", 2.5.into()), ("b", 3.into()), ("d", true.into())]),
        ];
        let table = Table::from_rows("t".to_string(), rows, None).unwrap();
        let schema = table.schema();
        assert_eq!(schema.get_column_names(), vec!["a", "b", "c", "d"]);
        assert_eq!(schema.get_column_type("a"), Some(ColumnType::Float));
        assert_eq!(schema.get_column_type("b"), Some(ColumnType::String));
        assert_eq!(schema.get_column_type("c"), Some(ColumnType::String));
        assert_eq!(schema.get_column_type("d"), Some(ColumnType::Boolean));
        assert_eq!(table.get_value(1, "b").unwrap().as_str(), Some("3"));
        assert!(Table::from_rows("t".to_string(), vec![], None).is_err());
    }

    #[test]
    fn test_from_json_forms() {
        let table = Table::from_json("t", r#"[{"a": 1, "b": "2024-01-05"}]"#, None).unwrap();
        assert_eq!(table.schema().get_column_type("b"), Some(ColumnType::Date));

        let table = Table::from_json("t", r#"{"a": [1, 3], "b": [2, 4]}"#, None).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get_value(1, "b").unwrap(), ColumnValue::Integer(4));

        let table = Table::from_json("t", r#"{"a": "integer"}"#, Some("a")).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.get_index(), Some("a"));

        assert!(Table::from_json("t", r#"{"a": "complex"}"#, None).is_err());
        assert!(Table::from_json("t", "not json", None).is_err());
    }

    #[test]
    fn test_rows_from_json_typed() {
        let table = trips();
        let rows = table
            .rows_from_json(&serde_json::json!([{"trip_id": "t1", "delay": 3}]))
            .unwrap();
        assert_eq!(rows[0]["delay"], ColumnValue::Float(3.0));
        assert!(table.rows_from_json(&serde_json::json!({"bogus": 1})).is_err());
    }

    #[test]
    fn test_to_records_and_columns() {
        let mut table = trips();
        table
            .update(vec![row(&[("trip_id", "t1".into()), ("line", "A".into()), ("delay", 1.0.into())])])
            .unwrap();

        let records = table.to_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["line"], ColumnValue::from("A"));

        let columns = table.to_columns();
        assert_eq!(columns[0].0, "trip_id");
        assert_eq!(columns[2].1, vec![ColumnValue::Float(1.0)]);

        let json = table.to_json();
        assert_eq!(json[0]["delay"], serde_json::json!(1.0));
    }
}
