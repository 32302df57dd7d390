//! Aggregation functions for pivot cells.
//!
//! An `Aggregate` reduces the values of one column over a set of physical row
//! offsets to a single output value. Rows are visited in ascending offset
//! order, so float sums accumulate in physical row order and `first`/`last`
//! are positional.

use crate::column::{Column, ColumnType, ColumnValue};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Sum,
    Count,
    Avg,
    Min,
    Max,
    First,
    Last,
    DistinctCount,
    /// The single distinct non-null value, or null when values differ
    Unique,
}

impl Aggregate {
    /// Default aggregate for a column type: numeric columns sum, everything
    /// else counts.
    pub fn default_for(column_type: ColumnType) -> Self {
        if column_type.is_numeric() {
            Aggregate::Sum
        } else {
            Aggregate::Count
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregate::Sum => "sum",
            Aggregate::Count => "count",
            Aggregate::Avg => "avg",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
            Aggregate::First => "first",
            Aggregate::Last => "last",
            Aggregate::DistinctCount => "distinct_count",
            Aggregate::Unique => "unique",
        }
    }

    pub fn parse(name: &str) -> Result<Self, String> {
        match name.to_lowercase().as_str() {
            "sum" => Ok(Aggregate::Sum),
            "count" => Ok(Aggregate::Count),
            "avg" | "mean" => Ok(Aggregate::Avg),
            "min" => Ok(Aggregate::Min),
            "max" => Ok(Aggregate::Max),
            "first" => Ok(Aggregate::First),
            "last" => Ok(Aggregate::Last),
            "distinct_count" | "distinct count" => Ok(Aggregate::DistinctCount),
            "unique" => Ok(Aggregate::Unique),
            _ => Err(format!("Unknown aggregate '{}'", name)),
        }
    }

    /// Output type of this aggregate over a column of `input` type, or an
    /// error if the combination is not defined.
    pub fn output_type(&self, input: ColumnType) -> Result<ColumnType, String> {
        match self {
            Aggregate::Sum if input.is_numeric() => Ok(input),
            Aggregate::Avg if input.is_numeric() => Ok(ColumnType::Float),
            Aggregate::Sum | Aggregate::Avg => Err(format!(
                "Aggregate '{}' requires a numeric column, got {}",
                self.as_str(),
                input
            )),
            Aggregate::Count | Aggregate::DistinctCount => Ok(ColumnType::Integer),
            Aggregate::Min | Aggregate::Max | Aggregate::First | Aggregate::Last | Aggregate::Unique => {
                Ok(input)
            }
        }
    }

    /// Reduce `column` over `rows` (ascending offsets).
    ///
    /// An `Err` marks a degraded cell, e.g. integer sum overflow.
    pub fn compute<I>(&self, column: &Column, rows: I) -> Result<ColumnValue, String>
    where
        I: IntoIterator<Item = usize>,
    {
        let rows = rows.into_iter();
        match self {
            Aggregate::Sum => sum(column, rows),
            Aggregate::Count => {
                Ok(ColumnValue::Integer(rows.filter(|&r| !column.is_null_at(r)).count() as i64))
            }
            Aggregate::Avg => {
                let mut total = 0.0;
                let mut count = 0usize;
                for value in rows.filter_map(|r| column.get_f64(r)) {
                    total += value;
                    count += 1;
                }
                if count == 0 {
                    Ok(ColumnValue::Null)
                } else {
                    Ok(ColumnValue::Float(total / count as f64))
                }
            }
            Aggregate::Min => Ok(non_null(column, rows)
                .into_iter()
                .min_by(|a, b| a.total_cmp(b))
                .unwrap_or(ColumnValue::Null)),
            Aggregate::Max => Ok(non_null(column, rows)
                .into_iter()
                .max_by(|a, b| a.total_cmp(b))
                .unwrap_or(ColumnValue::Null)),
            Aggregate::First => Ok(rows
                .map(|r| column.get(r).unwrap_or(ColumnValue::Null))
                .next()
                .unwrap_or(ColumnValue::Null)),
            Aggregate::Last => Ok(rows
                .map(|r| column.get(r).unwrap_or(ColumnValue::Null))
                .last()
                .unwrap_or(ColumnValue::Null)),
            Aggregate::DistinctCount => {
                let distinct: HashSet<ColumnValue> = non_null(column, rows).into_iter().collect();
                Ok(ColumnValue::Integer(distinct.len() as i64))
            }
            Aggregate::Unique => {
                let mut values = non_null(column, rows).into_iter();
                let first = match values.next() {
                    Some(v) => v,
                    None => return Ok(ColumnValue::Null),
                };
                if values.all(|v| v == first) {
                    Ok(first)
                } else {
                    Ok(ColumnValue::Null)
                }
            }
        }
    }
}

impl std::fmt::Display for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn non_null<I: Iterator<Item = usize>>(column: &Column, rows: I) -> Vec<ColumnValue> {
    rows.filter_map(|r| column.get(r).ok()).filter(|v| !v.is_null()).collect()
}

fn sum<I: Iterator<Item = usize>>(column: &Column, rows: I) -> Result<ColumnValue, String> {
    match column.column_type() {
        ColumnType::Integer => {
            let mut total: i64 = 0;
            let mut seen = false;
            for r in rows {
                if let Ok(ColumnValue::Integer(v)) = column.get(r) {
                    total = total
                        .checked_add(v)
                        .ok_or_else(|| format!("Integer overflow in sum of '{}'", column.name()))?;
                    seen = true;
                }
            }
            Ok(if seen { ColumnValue::Integer(total) } else { ColumnValue::Null })
        }
        ColumnType::Float => {
            let mut total = 0.0;
            let mut seen = false;
            for value in rows.filter_map(|r| column.get_f64(r)) {
                total += value;
                seen = true;
            }
            Ok(if seen { ColumnValue::Float(total) } else { ColumnValue::Null })
        }
        other => Err(format!("Cannot sum a {} column", other)),
    }
}
