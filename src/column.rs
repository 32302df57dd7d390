/// LivePivot Column Store
///
/// A Column is typed, contiguous storage for one column's values plus a
/// validity bitmap. Values are kept in a native vector per type (`Vec<i64>`,
/// `Vec<f64>`, ...); strings are dictionary encoded through a per-column
/// `StringDictionary`. Null slots hold a placeholder in the value vector and
/// a cleared bit in the validity bitmap.

use crate::interner::{DictionaryStats, StringDictionary, StringId};
use crate::temporal;
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    String,
    Boolean,
    Date,
    DateTime,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::String => "string",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
        }
    }

    /// Parse a type name. Accepts the canonical names plus common aliases.
    pub fn parse(name: &str) -> Result<Self, String> {
        match name.to_lowercase().as_str() {
            "integer" | "int" | "i64" => Ok(ColumnType::Integer),
            "float" | "f64" | "double" => Ok(ColumnType::Float),
            "string" | "str" => Ok(ColumnType::String),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            "date" => Ok(ColumnType::Date),
            "datetime" | "timestamp" => Ok(ColumnType::DateTime),
            _ => Err(format!("Unknown column type: '{}'", name)),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cell value.
///
/// Equality and hashing are total: floats compare by value with all NaNs
/// equal and `-0.0 == 0.0`, so values can key group and split buckets.
#[derive(Debug, Clone)]
pub enum ColumnValue {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    /// Days since 1970-01-01
    Date(i32),
    /// Milliseconds since the Unix epoch
    DateTime(i64),
    Null,
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    /// The type of a non-null value.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            ColumnValue::Integer(_) => Some(ColumnType::Integer),
            ColumnValue::Float(_) => Some(ColumnType::Float),
            ColumnValue::String(_) => Some(ColumnType::String),
            ColumnValue::Boolean(_) => Some(ColumnType::Boolean),
            ColumnValue::Date(_) => Some(ColumnType::Date),
            ColumnValue::DateTime(_) => Some(ColumnType::DateTime),
            ColumnValue::Null => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ColumnValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of integer and float values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ColumnValue::Integer(v) => Some(*v as f64),
            ColumnValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ColumnValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ColumnValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Coerce this value into `target`, following the ingestion rules:
    /// integers widen to float, integral floats narrow to integer, ISO
    /// strings parse into date/datetime, anything stringifies into a string
    /// column. Null passes through.
    pub fn coerce(self, target: ColumnType) -> Result<ColumnValue, String> {
        let value = match (self, target) {
            (ColumnValue::Null, _) => ColumnValue::Null,
            (v @ ColumnValue::Integer(_), ColumnType::Integer) => v,
            (ColumnValue::Float(f), ColumnType::Integer)
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 =>
            {
                ColumnValue::Integer(f as i64)
            }
            (ColumnValue::Integer(i), ColumnType::Float) => ColumnValue::Float(i as f64),
            (v @ ColumnValue::Float(_), ColumnType::Float) => v,
            (v @ ColumnValue::String(_), ColumnType::String) => v,
            (v, ColumnType::String) => ColumnValue::String(v.to_string()),
            (v @ ColumnValue::Boolean(_), ColumnType::Boolean) => v,
            (ColumnValue::Date(d), ColumnType::Date) if temporal::days_in_range(d as i64) => {
                ColumnValue::Date(d)
            }
            (ColumnValue::String(s), ColumnType::Date) => temporal::parse_date(&s)
                .map(ColumnValue::Date)
                .ok_or_else(|| format!("Cannot parse '{}' as date (expected YYYY-MM-DD)", s))?,
            (ColumnValue::DateTime(ms), ColumnType::DateTime) | (ColumnValue::Integer(ms), ColumnType::DateTime)
                if temporal::millis_in_range(ms) =>
            {
                ColumnValue::DateTime(ms)
            }
            (ColumnValue::Date(d), ColumnType::DateTime) if temporal::days_in_range(d as i64) => {
                ColumnValue::DateTime(d as i64 * temporal::MS_PER_DAY)
            }
            (v @ ColumnValue::Date(_), ColumnType::Date | ColumnType::DateTime)
            | (v @ ColumnValue::DateTime(_), ColumnType::DateTime)
            | (v @ ColumnValue::Integer(_), ColumnType::DateTime) => {
                return Err(format!(
                    "{:?} is outside the supported years {}..={}",
                    v,
                    temporal::MIN_YEAR,
                    temporal::MAX_YEAR
                ));
            }
            (ColumnValue::String(s), ColumnType::DateTime) => temporal::parse_datetime(&s)
                .map(ColumnValue::DateTime)
                .ok_or_else(|| format!("Cannot parse '{}' as datetime", s))?,
            (v, target) => {
                return Err(format!("Type mismatch: expected {}, got {:?}", target, v));
            }
        };
        Ok(value)
    }

    /// Total order used for sorting keys and rows. Nulls compare greater
    /// than every value; values of different types order by type.
    pub fn total_cmp(&self, other: &ColumnValue) -> Ordering {
        use ColumnValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Greater,
            (_, Null) => Ordering::Less,
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Integer(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Integer(b)) => a.total_cmp(&(*b as f64)),
            (String(a), String(b)) => a.cmp(b),
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            ColumnValue::Boolean(_) => 0,
            ColumnValue::Integer(_) | ColumnValue::Float(_) => 1,
            ColumnValue::Date(_) => 2,
            ColumnValue::DateTime(_) => 3,
            ColumnValue::String(_) => 4,
            ColumnValue::Null => 5,
        }
    }

    /// JSON form: dates and datetimes as ISO strings, non-finite floats as null.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            ColumnValue::Integer(v) => Json::Number((*v).into()),
            ColumnValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            ColumnValue::String(v) => Json::String(v.clone()),
            ColumnValue::Boolean(v) => Json::Bool(*v),
            ColumnValue::Date(d) => Json::String(temporal::format_date(*d)),
            ColumnValue::DateTime(ms) => Json::String(temporal::format_datetime(*ms)),
            ColumnValue::Null => Json::Null,
        }
    }

    /// Convert JSON without a target type: integers, floats, booleans,
    /// strings (ISO date/datetime strings are recognized) and null.
    pub fn from_json(value: &serde_json::Value) -> Result<ColumnValue, String> {
        use serde_json::Value as Json;
        match value {
            Json::Null => Ok(ColumnValue::Null),
            Json::Bool(b) => Ok(ColumnValue::Boolean(*b)),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Ok(ColumnValue::Integer(i)),
                None => n
                    .as_f64()
                    .map(ColumnValue::Float)
                    .ok_or_else(|| format!("Unsupported number: {}", n)),
            },
            Json::String(s) => {
                if temporal::looks_like_datetime(s) {
                    Ok(temporal::parse_datetime(s)
                        .map(ColumnValue::DateTime)
                        .unwrap_or_else(|| ColumnValue::String(s.clone())))
                } else if temporal::looks_like_date(s) {
                    Ok(temporal::parse_date(s)
                        .map(ColumnValue::Date)
                        .unwrap_or_else(|| ColumnValue::String(s.clone())))
                } else {
                    Ok(ColumnValue::String(s.clone()))
                }
            }
            Json::Array(_) | Json::Object(_) => {
                Err(format!("Unsupported JSON value: {}", value))
            }
        }
    }

    /// Convert JSON destined for a column of type `target`.
    pub fn from_json_typed(value: &serde_json::Value, target: ColumnType) -> Result<ColumnValue, String> {
        match (value, target) {
            // Keep strings verbatim for string columns, no date sniffing.
            (serde_json::Value::String(s), ColumnType::String) => Ok(ColumnValue::String(s.clone())),
            _ => ColumnValue::from_json(value)?.coerce(target),
        }
    }
}

impl PartialEq for ColumnValue {
    fn eq(&self, other: &Self) -> bool {
        use ColumnValue::*;
        match (self, other) {
            (Integer(a), Integer(b)) => a == b,
            (Float(a), Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (String(a), String(b)) => a == b,
            (Boolean(a), Boolean(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (Null, Null) => true,
            _ => false,
        }
    }
}

impl Eq for ColumnValue {}

impl Hash for ColumnValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ColumnValue::Integer(v) => v.hash(state),
            ColumnValue::Float(v) => {
                let bits = if *v == 0.0 {
                    0.0f64.to_bits()
                } else if v.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    v.to_bits()
                };
                bits.hash(state)
            }
            ColumnValue::String(v) => v.hash(state),
            ColumnValue::Boolean(v) => v.hash(state),
            ColumnValue::Date(v) => v.hash(state),
            ColumnValue::DateTime(v) => v.hash(state),
            ColumnValue::Null => {}
        }
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Integer(v) => write!(f, "{}", v),
            ColumnValue::Float(v) => write!(f, "{}", v),
            ColumnValue::String(v) => f.write_str(v),
            ColumnValue::Boolean(v) => write!(f, "{}", v),
            ColumnValue::Date(d) => f.write_str(&temporal::format_date(*d)),
            ColumnValue::DateTime(ms) => f.write_str(&temporal::format_datetime(*ms)),
            ColumnValue::Null => f.write_str("null"),
        }
    }
}

impl Serialize for ColumnValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<i64> for ColumnValue {
    fn from(v: i64) -> Self {
        ColumnValue::Integer(v)
    }
}

impl From<i32> for ColumnValue {
    fn from(v: i32) -> Self {
        ColumnValue::Integer(v as i64)
    }
}

impl From<f64> for ColumnValue {
    fn from(v: f64) -> Self {
        ColumnValue::Float(v)
    }
}

impl From<bool> for ColumnValue {
    fn from(v: bool) -> Self {
        ColumnValue::Boolean(v)
    }
}

impl From<&str> for ColumnValue {
    fn from(v: &str) -> Self {
        ColumnValue::String(v.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(v: String) -> Self {
        ColumnValue::String(v)
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ColumnValue::Null)
    }
}

/// Packed validity bitmap; a set bit marks a non-null slot.
#[derive(Debug, Clone, Default)]
struct Validity {
    words: Vec<u64>,
    len: usize,
}

impl Validity {
    fn push(&mut self, valid: bool) {
        if self.len % 64 == 0 {
            self.words.push(0);
        }
        let idx = self.len;
        self.len += 1;
        self.set(idx, valid);
    }

    #[inline]
    fn get(&self, idx: usize) -> bool {
        idx < self.len && self.words[idx / 64] & (1u64 << (idx % 64)) != 0
    }

    fn set(&mut self, idx: usize, valid: bool) {
        let mask = 1u64 << (idx % 64);
        if valid {
            self.words[idx / 64] |= mask;
        } else {
            self.words[idx / 64] &= !mask;
        }
    }

    fn remove(&mut self, idx: usize) {
        for i in idx..self.len - 1 {
            let next = self.get(i + 1);
            self.set(i, next);
        }
        self.len -= 1;
        if self.len % 64 == 0 {
            self.words.pop();
        }
    }

    fn clear(&mut self) {
        self.words.clear();
        self.len = 0;
    }
}

/// Native storage per column type.
#[derive(Debug, Clone)]
enum ColumnData {
    Integer(Vec<i64>),
    Float(Vec<f64>),
    String(Vec<StringId>, StringDictionary),
    Boolean(Vec<bool>),
    Date(Vec<i32>),
    DateTime(Vec<i64>),
}

impl ColumnData {
    fn new(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Integer => ColumnData::Integer(Vec::new()),
            ColumnType::Float => ColumnData::Float(Vec::new()),
            ColumnType::String => ColumnData::String(Vec::new(), StringDictionary::new()),
            ColumnType::Boolean => ColumnData::Boolean(Vec::new()),
            ColumnType::Date => ColumnData::Date(Vec::new()),
            ColumnType::DateTime => ColumnData::DateTime(Vec::new()),
        }
    }
}

/// Placeholder ID stored in null string slots; never reference counted.
const NULL_STRING_ID: StringId = StringId::MAX;

/// Typed column storage with a validity bitmap.
#[derive(Clone)]
pub struct Column {
    name: String,
    column_type: ColumnType,
    nullable: bool,
    data: ColumnData,
    validity: Validity,
}

impl Column {
    pub fn new(name: String, column_type: ColumnType, nullable: bool) -> Self {
        Column {
            name,
            column_type,
            nullable,
            data: ColumnData::new(column_type),
            validity: Validity::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn len(&self) -> usize {
        self.validity.len
    }

    pub fn is_empty(&self) -> bool {
        self.validity.len == 0
    }

    /// Coerce and check a value for this column without storing it.
    pub fn validate(&self, value: ColumnValue) -> Result<ColumnValue, String> {
        let value = value
            .coerce(self.column_type)
            .map_err(|e| format!("Column '{}': {}", self.name, e))?;
        if value.is_null() && !self.nullable {
            return Err(format!("Column '{}' is not nullable", self.name));
        }
        Ok(value)
    }

    pub fn get(&self, index: usize) -> Result<ColumnValue, String> {
        if index >= self.len() {
            return Err(format!("Index {} out of range [0, {})", index, self.len()));
        }
        if !self.validity.get(index) {
            return Ok(ColumnValue::Null);
        }

        let value = match &self.data {
            ColumnData::Integer(v) => ColumnValue::Integer(v[index]),
            ColumnData::Float(v) => ColumnValue::Float(v[index]),
            ColumnData::String(ids, dict) => {
                let id = ids[index];
                let s = dict
                    .resolve(id)
                    .ok_or_else(|| format!("Invalid string ID {} at index {}", id, index))?;
                ColumnValue::String(s.to_string())
            }
            ColumnData::Boolean(v) => ColumnValue::Boolean(v[index]),
            ColumnData::Date(v) => ColumnValue::Date(v[index]),
            ColumnData::DateTime(v) => ColumnValue::DateTime(v[index]),
        };
        Ok(value)
    }

    /// Fast numeric access without materializing a `ColumnValue`.
    #[inline]
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        if !self.validity.get(index) {
            return None;
        }
        match &self.data {
            ColumnData::Integer(v) => Some(v[index] as f64),
            ColumnData::Float(v) => Some(v[index]),
            _ => None,
        }
    }

    #[inline]
    pub fn is_null_at(&self, index: usize) -> bool {
        !self.validity.get(index)
    }

    /// Append a value, coercing it to the column type.
    pub fn append(&mut self, value: ColumnValue) -> Result<(), String> {
        let value = self.validate(value)?;
        let valid = !value.is_null();

        match (&mut self.data, value) {
            (ColumnData::Integer(v), ColumnValue::Integer(x)) => v.push(x),
            (ColumnData::Float(v), ColumnValue::Float(x)) => v.push(x),
            (ColumnData::String(ids, dict), ColumnValue::String(s)) => ids.push(dict.intern(&s)),
            (ColumnData::Boolean(v), ColumnValue::Boolean(x)) => v.push(x),
            (ColumnData::Date(v), ColumnValue::Date(x)) => v.push(x),
            (ColumnData::DateTime(v), ColumnValue::DateTime(x)) => v.push(x),
            (data, _) => push_placeholder(data),
        }

        self.validity.push(valid);
        Ok(())
    }

    /// Overwrite the value at `index`.
    pub fn set(&mut self, index: usize, value: ColumnValue) -> Result<(), String> {
        if index >= self.len() {
            return Err(format!("Index {} out of range [0, {})", index, self.len()));
        }
        let value = self.validate(value)?;
        let was_valid = self.validity.get(index);
        let valid = !value.is_null();

        match (&mut self.data, value) {
            (ColumnData::Integer(v), ColumnValue::Integer(x)) => v[index] = x,
            (ColumnData::Float(v), ColumnValue::Float(x)) => v[index] = x,
            (ColumnData::String(ids, dict), ColumnValue::String(s)) => {
                let new_id = dict.intern(&s);
                if was_valid {
                    dict.release(ids[index]);
                }
                ids[index] = new_id;
            }
            (ColumnData::Boolean(v), ColumnValue::Boolean(x)) => v[index] = x,
            (ColumnData::Date(v), ColumnValue::Date(x)) => v[index] = x,
            (ColumnData::DateTime(v), ColumnValue::DateTime(x)) => v[index] = x,
            (ColumnData::String(ids, dict), _) => {
                if was_valid {
                    dict.release(ids[index]);
                }
                ids[index] = NULL_STRING_ID;
            }
            // Null into a fixed-width column: the stale value stays as placeholder.
            _ => {}
        }

        self.validity.set(index, valid);
        Ok(())
    }

    /// Remove and return the value at `index`, shifting later rows down.
    pub fn delete(&mut self, index: usize) -> Result<ColumnValue, String> {
        let value = self.get(index)?;
        let was_valid = self.validity.get(index);

        match &mut self.data {
            ColumnData::Integer(v) => {
                v.remove(index);
            }
            ColumnData::Float(v) => {
                v.remove(index);
            }
            ColumnData::String(ids, dict) => {
                let id = ids.remove(index);
                if was_valid {
                    dict.release(id);
                }
            }
            ColumnData::Boolean(v) => {
                v.remove(index);
            }
            ColumnData::Date(v) => {
                v.remove(index);
            }
            ColumnData::DateTime(v) => {
                v.remove(index);
            }
        }

        self.validity.remove(index);
        Ok(value)
    }

    pub fn clear(&mut self) {
        self.data = ColumnData::new(self.column_type);
        self.validity.clear();
    }

    /// Dictionary counters for string columns.
    pub fn dictionary_stats(&self) -> Option<DictionaryStats> {
        match &self.data {
            ColumnData::String(_, dict) => Some(dict.stats()),
            _ => None,
        }
    }

    pub fn iter(&self) -> ColumnIterator<'_> {
        ColumnIterator {
            column: self,
            index: 0,
        }
    }
}

fn push_placeholder(data: &mut ColumnData) {
    match data {
        ColumnData::Integer(v) => v.push(0),
        ColumnData::Float(v) => v.push(0.0),
        ColumnData::String(ids, _) => ids.push(NULL_STRING_ID),
        ColumnData::Boolean(v) => v.push(false),
        ColumnData::Date(v) => v.push(0),
        ColumnData::DateTime(v) => v.push(0),
    }
}

pub struct ColumnIterator<'a> {
    column: &'a Column,
    index: usize,
}

impl<'a> Iterator for ColumnIterator<'a> {
    type Item = ColumnValue;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.column.len() {
            None
        } else {
            let result = self.column.get(self.index).ok();
            self.index += 1;
            result
        }
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Column {{ name: '{}', type: {}, nullable: {}, len: {} }}",
            self.name,
            self.column_type,
            self.nullable,
            self.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_basic() {
        let mut col = Column::new("test".to_string(), ColumnType::Integer, false);
        col.append(ColumnValue::Integer(10)).unwrap();
        col.append(ColumnValue::Integer(20)).unwrap();
        col.append(ColumnValue::Integer(30)).unwrap();

        assert_eq!(col.len(), 3);
        assert_eq!(col.get(0).unwrap().as_i64(), Some(10));
        assert_eq!(col.get(2).unwrap().as_i64(), Some(30));
        assert!(col.get(3).is_err());
    }

    #[test]
    fn test_column_nullable() {
        let mut col = Column::new("test".to_string(), ColumnType::Float, true);
        col.append(ColumnValue::Float(1.5)).unwrap();
        col.append(ColumnValue::Null).unwrap();
        col.append(ColumnValue::Integer(3)).unwrap();

        assert!(col.get(1).unwrap().is_null());
        assert!(col.is_null_at(1));
        assert_eq!(col.get(2).unwrap(), ColumnValue::Float(3.0));
        assert_eq!(col.get_f64(0), Some(1.5));
        assert_eq!(col.get_f64(1), None);
    }

    #[test]
    fn test_column_not_nullable() {
        let mut col = Column::new("id".to_string(), ColumnType::String, false);
        let err = col.append(ColumnValue::Null).unwrap_err();
        assert!(err.contains("not nullable"));
        assert_eq!(col.len(), 0);
    }

    #[test]
    fn test_column_type_mismatch() {
        let mut col = Column::new("flag".to_string(), ColumnType::Boolean, true);
        assert!(col.append(ColumnValue::Integer(1)).is_err());
        assert!(col.append(ColumnValue::Float(1.5)).is_err());

        let mut ints = Column::new("n".to_string(), ColumnType::Integer, true);
        assert!(ints.append(ColumnValue::Float(1.5)).is_err());
        ints.append(ColumnValue::Float(2.0)).unwrap();
        assert_eq!(ints.get(0).unwrap(), ColumnValue::Integer(2));
    }

    #[test]
    fn test_column_set_and_null() {
        let mut col = Column::new("test".to_string(), ColumnType::Integer, true);
        col.append(ColumnValue::Integer(10)).unwrap();
        col.append(ColumnValue::Integer(20)).unwrap();

        col.set(1, ColumnValue::Integer(99)).unwrap();
        assert_eq!(col.get(1).unwrap().as_i64(), Some(99));

        col.set(0, ColumnValue::Null).unwrap();
        assert!(col.get(0).unwrap().is_null());

        col.set(0, ColumnValue::Integer(5)).unwrap();
        assert_eq!(col.get(0).unwrap().as_i64(), Some(5));
    }

    #[test]
    fn test_column_string_dictionary() {
        let mut col = Column::new("line".to_string(), ColumnType::String, true);
        for line in ["A", "C", "A", "E", "A"] {
            col.append(ColumnValue::from(line)).unwrap();
        }
        assert_eq!(col.get(2).unwrap().as_str(), Some("A"));
        assert_eq!(col.dictionary_stats().unwrap().distinct_values, 3);

        col.set(3, ColumnValue::from("A")).unwrap();
        assert_eq!(col.dictionary_stats().unwrap().distinct_values, 2);

        col.set(1, ColumnValue::Null).unwrap();
        assert_eq!(col.dictionary_stats().unwrap().distinct_values, 1);
        assert!(col.get(1).unwrap().is_null());
    }

    #[test]
    fn test_column_delete() {
        let mut col = Column::new("name".to_string(), ColumnType::String, true);
        col.append(ColumnValue::from("Alice")).unwrap();
        col.append(ColumnValue::Null).unwrap();
        col.append(ColumnValue::from("Bob")).unwrap();

        let deleted = col.delete(0).unwrap();
        assert_eq!(deleted.as_str(), Some("Alice"));
        assert_eq!(col.len(), 2);
        assert!(col.get(0).unwrap().is_null());
        assert_eq!(col.get(1).unwrap().as_str(), Some("Bob"));
        assert_eq!(col.dictionary_stats().unwrap().distinct_values, 1);
    }

    #[test]
    fn test_validity_across_word_boundary() {
        let mut col = Column::new("n".to_string(), ColumnType::Integer, true);
        for i in 0..130 {
            let v = if i % 3 == 0 { ColumnValue::Null } else { ColumnValue::Integer(i) };
            col.append(v).unwrap();
        }
        col.delete(64).unwrap();
        assert_eq!(col.len(), 129);
        // old index 65 (valid) is now at 64, old 66 (null) at 65
        assert_eq!(col.get(64).unwrap(), ColumnValue::Integer(65));
        assert!(col.get(65).unwrap().is_null());
        assert_eq!(col.iter().filter(|v| v.is_null()).count(), 43);
    }

    #[test]
    fn test_value_coercion() {
        assert_eq!(
            ColumnValue::from("2024-01-02").coerce(ColumnType::Date).unwrap(),
            ColumnValue::Date(crate::temporal::parse_date("2024-01-02").unwrap())
        );
        assert_eq!(
            ColumnValue::Integer(7).coerce(ColumnType::String).unwrap(),
            ColumnValue::from("7")
        );
        assert!(ColumnValue::from("x").coerce(ColumnType::Integer).is_err());
    }

    #[test]
    fn test_temporal_coercion_rejects_out_of_range() {
        let far = (i32::MAX as i64) * 86_400_000;
        assert!(ColumnValue::Integer(far).coerce(ColumnType::DateTime).is_err());
        assert!(ColumnValue::DateTime(far).coerce(ColumnType::DateTime).is_err());
        assert!(ColumnValue::Date(i32::MAX).coerce(ColumnType::Date).is_err());
        assert!(ColumnValue::Date(i32::MIN).coerce(ColumnType::DateTime).is_err());
        assert!(ColumnValue::from("2147483647-01-01").coerce(ColumnType::Date).is_err());
        assert_eq!(
            ColumnValue::Date(1).coerce(ColumnType::DateTime).unwrap(),
            ColumnValue::DateTime(86_400_000)
        );
        assert_eq!(
            ColumnValue::Integer(1_500).coerce(ColumnType::DateTime).unwrap(),
            ColumnValue::DateTime(1_500)
        );
    }

    #[test]
    fn test_value_equality_and_order() {
        assert_eq!(ColumnValue::Float(f64::NAN), ColumnValue::Float(f64::NAN));
        assert_eq!(ColumnValue::Float(-0.0), ColumnValue::Float(0.0));
        assert_eq!(
            ColumnValue::Integer(1).total_cmp(&ColumnValue::Null),
            Ordering::Less
        );
        assert_eq!(
            ColumnValue::from("b").total_cmp(&ColumnValue::from("a")),
            Ordering::Greater
        );
    }

    #[test]
    fn test_json_conversion() {
        let v = ColumnValue::from_json(&serde_json::json!(3)).unwrap();
        assert_eq!(v, ColumnValue::Integer(3));
        let v = ColumnValue::from_json(&serde_json::json!("2024-03-01")).unwrap();
        assert_eq!(v.column_type(), Some(ColumnType::Date));
        assert_eq!(v.to_json(), serde_json::json!("2024-03-01"));
        let v = ColumnValue::from_json_typed(&serde_json::json!("2024-03-01"), ColumnType::String).unwrap();
        assert_eq!(v.as_str(), Some("2024-03-01"));
        assert_eq!(ColumnValue::Float(f64::NAN).to_json(), serde_json::Value::Null);
        assert!(ColumnValue::from_json(&serde_json::json!([1])).is_err());
    }
}
