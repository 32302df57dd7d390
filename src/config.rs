//! View definitions
//!
//! A `ViewConfig` is the immutable definition of a pivot view: which columns
//! to show, how to group rows and split columns, how each column aggregates,
//! an optional filter expression, a sort order and named computed columns.
//! Every field defaults, so `ViewConfig::default()` is the identity view.
//!
//! Computed columns (`expressions`) behave like table columns everywhere in
//! the definition: they can be shown, grouped, split, filtered and sorted on.
//! Their schema position follows the table's columns.
//!
//! Before a view is built its config is resolved against the table schema
//! into a `ViewPlan`, which is where every definition error is raised.
//!
//! ```
//! use livepivot::{Aggregate, SortKey, ViewConfig};
//!
//! let config = ViewConfig::new()
//!     .with_group_by(["line"])
//!     .with_split_by(["direction"])
//!     .with_aggregate("delay", Aggregate::Avg)
//!     .with_filter("delay IS NOT NULL")
//!     .with_sort(SortKey::descending("delay"));
//!
//! assert_eq!(config.group_by, vec!["line".to_string()]);
//! ```

use crate::aggregate::Aggregate;
use crate::column::{ColumnType, ColumnValue};
use crate::error::{EngineError, Result};
use crate::expr::{self, Computed, Expr};
use crate::table::Schema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

/// Sort order for a sort key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    #[serde(alias = "asc")]
    Ascending,
    #[serde(alias = "desc")]
    Descending,
}

/// A sort key specifying column and order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    /// Column name to sort by
    pub column: String,
    /// Sort order (ascending or descending)
    #[serde(default)]
    pub order: SortOrder,
    /// Whether NULL values should be placed first or last
    #[serde(default)]
    pub nulls_first: bool,
}

impl SortKey {
    /// Create a new sort key with ascending order (nulls last)
    pub fn ascending(column: impl Into<String>) -> Self {
        SortKey {
            column: column.into(),
            order: SortOrder::Ascending,
            nulls_first: false,
        }
    }

    /// Create a new sort key with descending order (nulls last)
    pub fn descending(column: impl Into<String>) -> Self {
        SortKey {
            column: column.into(),
            order: SortOrder::Descending,
            nulls_first: false,
        }
    }

    pub fn new(column: impl Into<String>, order: SortOrder, nulls_first: bool) -> Self {
        SortKey {
            column: column.into(),
            order,
            nulls_first,
        }
    }

    /// Compare two values under this key. Nulls go last unless `nulls_first`,
    /// regardless of direction.
    pub fn compare(&self, a: &ColumnValue, b: &ColumnValue) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => {
                return if self.nulls_first { Ordering::Less } else { Ordering::Greater };
            }
            (false, true) => {
                return if self.nulls_first { Ordering::Greater } else { Ordering::Less };
            }
            (false, false) => {}
        }

        let base_cmp = a.total_cmp(b);
        match self.order {
            SortOrder::Ascending => base_cmp,
            SortOrder::Descending => base_cmp.reverse(),
        }
    }
}

/// The definition of a pivot view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Leaf columns; all table columns when absent
    pub columns: Option<Vec<String>>,
    pub group_by: Vec<String>,
    pub split_by: Vec<String>,
    /// Per-column aggregate overrides
    pub aggregates: BTreeMap<String, Aggregate>,
    pub filter: Option<String>,
    pub sort: Vec<SortKey>,
    /// Computed columns: name -> expression
    pub expressions: BTreeMap<String, String>,
}

impl ViewConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_split_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.split_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_aggregate(mut self, column: impl Into<String>, aggregate: Aggregate) -> Self {
        self.aggregates.insert(column.into(), aggregate);
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn with_expression(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.expressions.insert(name.into(), expression.into());
        self
    }

    /// Stable string form; equal configs give equal keys.
    pub fn canonical_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }

    /// Check this definition against `schema` and compile it.
    pub fn resolve(&self, schema: &Schema) -> Result<ViewPlan> {
        let expressions = self.resolve_expressions(schema)?;
        let find = |name: &str, role: &str| -> Result<(usize, ColumnType)> {
            let table_column = schema.get_column_index(name).zip(schema.get_column_type(name));
            let computed = || {
                expressions
                    .iter()
                    .position(|e| e.name == name)
                    .map(|i| (schema.len() + i, expressions[i].column_type))
            };
            table_column.or_else(computed).ok_or_else(|| {
                EngineError::Definition(format!("{} column '{}' not found", role, name))
            })
        };

        let group_by = resolve_list(&self.group_by, "Group-by", &find)?;
        let split_by = resolve_list(&self.split_by, "Split-by", &find)?;

        let leaf_names: Vec<String> = match &self.columns {
            Some(columns) => columns.clone(),
            None => schema
                .get_column_names()
                .into_iter()
                .map(str::to_string)
                .chain(expressions.iter().map(|e| e.name.clone()))
                .collect(),
        };
        let mut leaves = Vec::with_capacity(leaf_names.len());
        let mut seen = HashSet::new();
        for name in leaf_names {
            if !seen.insert(name.clone()) {
                return Err(EngineError::Definition(format!("Column '{}' listed twice", name)));
            }
            let (col, input_type) = find(&name, "View")?;
            let aggregate = self.aggregate_for(&name, input_type)?;
            leaves.push(Leaf { name, col, input_type, aggregate });
        }

        for column in self.aggregates.keys() {
            find(column, "Aggregate")?;
        }

        let mut sort = Vec::with_capacity(self.sort.len());
        for key in &self.sort {
            let (col, input_type) = find(&key.column, "Sort")?;
            let aggregate = self.aggregate_for(&key.column, input_type)?;
            sort.push(ResolvedSort { key: key.clone(), col, aggregate });
        }

        let filter = match &self.filter {
            Some(text) if !text.trim().is_empty() => {
                let parsed = expr::parse_expr(text)
                    .map_err(|e| EngineError::Definition(format!("Invalid filter '{}': {}", text, e)))?;
                for column in expr::extract_columns(&parsed) {
                    find(&column, "Filter")?;
                }
                Some(parsed)
            }
            _ => None,
        };

        Ok(ViewPlan {
            group_by,
            split_by,
            leaves,
            filter,
            sort,
            expressions,
        })
    }

    fn resolve_expressions(&self, schema: &Schema) -> Result<Vec<Expression>> {
        self.expressions
            .iter()
            .map(|(name, text)| {
                if schema.get_column_index(name).is_some() {
                    return Err(EngineError::Definition(format!(
                        "Expression '{}' shadows a table column",
                        name
                    )));
                }
                let computed = expr::parse_computed(text).map_err(|e| {
                    EngineError::Definition(format!("Invalid expression '{}': {}", name, e))
                })?;
                for column in computed.columns() {
                    if schema.get_column_index(&column).is_none() {
                        return Err(EngineError::Definition(format!(
                            "Expression '{}' reads unknown column '{}'",
                            name, column
                        )));
                    }
                }
                let column_type = computed
                    .output_type(&|c: &str| schema.get_column_type(c))
                    .map_err(|e| EngineError::Definition(format!("Expression '{}': {}", name, e)))?;
                Ok(Expression {
                    name: name.clone(),
                    column_type,
                    computed,
                })
            })
            .collect()
    }

    fn aggregate_for(&self, column: &str, input_type: ColumnType) -> Result<Aggregate> {
        let aggregate = self
            .aggregates
            .get(column)
            .copied()
            .unwrap_or_else(|| Aggregate::default_for(input_type));
        aggregate
            .output_type(input_type)
            .map_err(|e| EngineError::Definition(format!("Column '{}': {}", column, e)))?;
        Ok(aggregate)
    }
}

fn resolve_list<F>(names: &[String], role: &str, find: &F) -> Result<Vec<Dimension>>
where
    F: Fn(&str, &str) -> Result<(usize, ColumnType)>,
{
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| {
            if !seen.insert(name.as_str()) {
                return Err(EngineError::Definition(format!(
                    "{} column '{}' listed twice",
                    role, name
                )));
            }
            let (col, column_type) = find(name, role)?;
            Ok(Dimension { name: name.clone(), col, column_type })
        })
        .collect()
}

/// A group-by or split-by level.
#[derive(Debug, Clone)]
pub struct Dimension {
    pub name: String,
    /// Schema position of the source column
    pub col: usize,
    pub column_type: ColumnType,
}

/// One output (leaf) column of a view.
#[derive(Debug, Clone)]
pub struct Leaf {
    pub name: String,
    /// Schema position of the source column
    pub col: usize,
    pub input_type: ColumnType,
    pub aggregate: Aggregate,
}

/// A computed column of a view.
#[derive(Debug, Clone)]
pub struct Expression {
    pub name: String,
    pub column_type: ColumnType,
    pub computed: Computed,
}

#[derive(Debug, Clone)]
pub struct ResolvedSort {
    pub key: SortKey,
    pub col: usize,
    pub aggregate: Aggregate,
}

/// A `ViewConfig` checked against a schema.
#[derive(Debug, Clone)]
pub struct ViewPlan {
    pub group_by: Vec<Dimension>,
    pub split_by: Vec<Dimension>,
    pub leaves: Vec<Leaf>,
    pub filter: Option<Expr>,
    pub sort: Vec<ResolvedSort>,
    /// Computed columns; `Dimension::col`/`Leaf::col` values at or past the
    /// table width index into this list
    pub expressions: Vec<Expression>,
}

impl ViewPlan {
    /// Views without group-by carry raw rows instead of aggregates.
    pub fn is_flat(&self) -> bool {
        self.group_by.is_empty()
    }

    /// Output type of a leaf column.
    pub fn leaf_type(&self, leaf: &Leaf) -> ColumnType {
        if self.is_flat() {
            leaf.input_type
        } else {
            leaf.aggregate.output_type(leaf.input_type).unwrap_or(leaf.input_type)
        }
    }
}
