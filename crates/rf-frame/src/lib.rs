#![forbid(unsafe_code)]

//! Row-oriented tables and one-dimensional series.
//!
//! A [`Table`] is immutable once built: selection, filtering, transforms and
//! concatenation all return a new table and leave their inputs untouched.

mod concat;
pub mod validate;

use std::collections::HashSet;
use std::sync::OnceLock;

use rf_index::{Index, IndexLabel};
use rf_types::{KeyEquality, Reduction, Scalar, TypeError, ValueKind, infer_kind, reduce};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use concat::{Axis, ConcatOptions, concat, concat_with_axis, concat_with_options};
pub use validate::{
    default_column_names, validate_column_exists, validate_column_names, validate_row_index,
    validate_row_widths,
};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("row {row} has {len} values but expected {expected}")]
    RaggedRow {
        row: usize,
        len: usize,
        expected: usize,
    },
    #[error("column name at position {position} is empty")]
    EmptyColumnName { position: usize },
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
    #[error("{names} column names given for rows with {width} values")]
    ColumnCountMismatch { names: usize, width: usize },
    #[error("column '{name}' not found; available columns: {available:?}")]
    ColumnNotFound {
        name: String,
        available: Vec<String>,
    },
    #[error("row index {index} out of range; valid range is {}", describe_row_range(.len))]
    IndexOutOfRange { index: usize, len: usize },
    #[error("invalid {parameter}: {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },
    #[error("table {position} has {rows} rows but the first non-empty table has {expected}")]
    RowCountMismatch {
        position: usize,
        rows: usize,
        expected: usize,
    },
    #[error("{operation} callback failed at row {row}{}: {source}", describe_column(.column))]
    Callback {
        operation: &'static str,
        row: usize,
        column: Option<String>,
        #[source]
        source: Box<FrameError>,
    },
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Error families shared by every rowframe crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Structural,
    Validation,
    ColumnNotFound,
    IndexOutOfRange,
    Callback,
}

impl FrameError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RaggedRow { .. } => ErrorKind::Structural,
            Self::EmptyColumnName { .. }
            | Self::DuplicateColumn(_)
            | Self::ColumnCountMismatch { .. }
            | Self::InvalidParameter { .. }
            | Self::RowCountMismatch { .. }
            | Self::Type(_) => ErrorKind::Validation,
            Self::ColumnNotFound { .. } => ErrorKind::ColumnNotFound,
            Self::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            Self::Callback { .. } | Self::Rejected(_) => ErrorKind::Callback,
        }
    }

    /// Attribute a user callback failure to the operation and row it hit.
    #[must_use]
    pub fn callback(
        operation: &'static str,
        row: usize,
        column: Option<String>,
        source: FrameError,
    ) -> Self {
        let column = column.or_else(|| match &source {
            Self::ColumnNotFound { name, .. } => Some(name.clone()),
            _ => None,
        });
        Self::Callback {
            operation,
            row,
            column,
            source: Box::new(source),
        }
    }
}

fn describe_row_range(len: &usize) -> String {
    match *len {
        0 => "empty (table has no rows)".to_owned(),
        n => format!("0..={}", n - 1),
    }
}

fn describe_column(column: &Option<String>) -> String {
    column
        .as_deref()
        .map_or_else(String::new, |name| format!(", column '{name}'"))
}

// ── Row input and row views ────────────────────────────────────────────

/// One row of constructor input, either in column order or keyed by name.
#[derive(Debug, Clone, PartialEq)]
pub enum RowInput {
    Positional(Vec<Scalar>),
    Named(Vec<(String, Scalar)>),
}

impl From<Vec<Scalar>> for RowInput {
    fn from(values: Vec<Scalar>) -> Self {
        Self::Positional(values)
    }
}

impl From<Vec<(String, Scalar)>> for RowInput {
    fn from(values: Vec<(String, Scalar)>) -> Self {
        Self::Named(values)
    }
}

/// Read-only view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    position: usize,
    label: &'a IndexLabel,
    columns: &'a [String],
    values: &'a [Scalar],
}

impl<'a> RowView<'a> {
    /// Value of `name` in this row.
    pub fn get(&self, name: &str) -> Result<&'a Scalar, FrameError> {
        let pos = validate_column_exists(name, self.columns)?;
        Ok(&self.values[pos])
    }

    #[must_use]
    pub fn value_at(&self, position: usize) -> Option<&'a Scalar> {
        self.values.get(position)
    }

    /// Row position in the source table.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn label(&self) -> &'a IndexLabel {
        self.label
    }

    #[must_use]
    pub fn columns(&self) -> &'a [String] {
        self.columns
    }

    #[must_use]
    pub fn values(&self) -> &'a [Scalar] {
        self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Scalar)> + 'a {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Owned `(column, value)` pairs in column order.
    #[must_use]
    pub fn to_record(&self) -> Vec<(String, Scalar)> {
        self.iter()
            .map(|(name, value)| (name.to_owned(), value.clone()))
            .collect()
    }
}

// ── Series ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    name: Option<String>,
    index: Index,
    values: Vec<Scalar>,
}

impl Series {
    /// Unnamed series with a `0..n` index.
    #[must_use]
    pub fn new(values: Vec<Scalar>) -> Self {
        Self {
            name: None,
            index: Index::range(values.len()),
            values,
        }
    }

    #[must_use]
    pub fn named(name: impl Into<String>, values: Vec<Scalar>) -> Self {
        Self::new(values).with_name(name)
    }

    pub fn from_values(
        name: impl Into<String>,
        labels: Vec<IndexLabel>,
        values: Vec<Scalar>,
    ) -> Result<Self, FrameError> {
        if labels.len() != values.len() {
            return Err(FrameError::InvalidParameter {
                parameter: "index",
                reason: format!(
                    "index has {} labels but series has {} values",
                    labels.len(),
                    values.len()
                ),
            });
        }
        Ok(Self {
            name: Some(name.into()),
            index: Index::new(labels),
            values,
        })
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Inferred kind of the non-null values.
    #[must_use]
    pub fn value_kind(&self) -> ValueKind {
        infer_kind(&self.values)
    }

    pub fn get(&self, position: usize) -> Result<&Scalar, FrameError> {
        validate_row_index(position, self.values.len())?;
        Ok(&self.values[position])
    }

    pub fn set(&mut self, position: usize, value: Scalar) -> Result<(), FrameError> {
        validate_row_index(position, self.values.len())?;
        self.values[position] = value;
        Ok(())
    }

    /// Number of non-missing values.
    #[must_use]
    pub fn count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_missing()).count()
    }

    /// Reduce the numeric view of the values. Null when nothing is numeric.
    #[must_use]
    pub fn agg(&self, op: Reduction) -> Scalar {
        reduce(&self.values, op)
    }

    #[must_use]
    pub fn sum(&self) -> Scalar {
        self.agg(Reduction::Sum)
    }

    #[must_use]
    pub fn mean(&self) -> Scalar {
        self.agg(Reduction::Mean)
    }

    #[must_use]
    pub fn min(&self) -> Scalar {
        self.agg(Reduction::Min)
    }

    #[must_use]
    pub fn max(&self) -> Scalar {
        self.agg(Reduction::Max)
    }

    /// Sample standard deviation (ddof=1). Null below two numeric values.
    #[must_use]
    pub fn std(&self) -> Scalar {
        self.agg(Reduction::Std)
    }

    /// Sample variance (ddof=1). Null below two numeric values.
    #[must_use]
    pub fn var(&self) -> Scalar {
        self.agg(Reduction::Var)
    }

    #[must_use]
    pub fn median(&self) -> Scalar {
        self.agg(Reduction::Median)
    }

    /// Distinct values in first-seen order, compared by dtype and value.
    #[must_use]
    pub fn unique(&self) -> Vec<Scalar> {
        let mut seen = HashSet::new();
        self.values
            .iter()
            .filter(|value| seen.insert(KeyEquality::Typed.key_part(value)))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn nunique(&self) -> usize {
        self.unique().iter().filter(|v| !v.is_missing()).count()
    }

    /// Apply `func` to every value, keeping the index and name.
    pub fn map<F>(&self, mut func: F) -> Result<Self, FrameError>
    where
        F: FnMut(&Scalar) -> Result<Scalar, FrameError>,
    {
        let values = self
            .values
            .iter()
            .enumerate()
            .map(|(row, value)| {
                func(value)
                    .map_err(|err| FrameError::callback("map", row, self.name.clone(), err))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: self.name.clone(),
            index: self.index.clone(),
            values,
        })
    }

    #[must_use]
    pub fn fillna(&self, fill: &Scalar) -> Self {
        Self {
            name: self.name.clone(),
            index: self.index.clone(),
            values: self.values.iter().map(|v| v.coalesce(fill)).collect(),
        }
    }

    /// Drop missing values, keeping the labels of the survivors.
    #[must_use]
    pub fn dropna(&self) -> Self {
        let keep: Vec<usize> = (0..self.values.len())
            .filter(|&pos| !self.values[pos].is_missing())
            .collect();
        Self {
            name: self.name.clone(),
            index: self.index.take(&keep),
            values: keep.iter().map(|&pos| self.values[pos].clone()).collect(),
        }
    }

    #[must_use]
    pub fn to_list(&self) -> Vec<Scalar> {
        self.values.clone()
    }
}

// ── Table ──────────────────────────────────────────────────────────────

/// Two-dimensional labeled table with positional row storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TableData", into = "TableData")]
pub struct Table {
    columns: Vec<String>,
    index: Index,
    rows: Vec<Vec<Scalar>>,
    // One lazily projected series per column position.
    column_cache: Vec<OnceLock<Series>>,
}

#[derive(Serialize, Deserialize)]
struct TableData {
    columns: Vec<String>,
    index: Index,
    rows: Vec<Vec<Scalar>>,
}

impl TryFrom<TableData> for Table {
    type Error = FrameError;

    fn try_from(data: TableData) -> Result<Self, Self::Error> {
        Self::from_parts(data.columns, data.index, data.rows)
    }
}

impl From<Table> for TableData {
    fn from(table: Table) -> Self {
        Self {
            columns: table.columns,
            index: table.index,
            rows: table.rows,
        }
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns && self.index == other.index && self.rows == other.rows
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::empty()
    }
}

impl Table {
    /// Zero columns, zero rows.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            index: Index::default(),
            rows: Vec::new(),
            column_cache: Vec::new(),
        }
    }

    /// Build from positional rows. Column names default to `"0", "1", …`.
    pub fn new(rows: Vec<Vec<Scalar>>, columns: Option<Vec<String>>) -> Result<Self, FrameError> {
        let width = validate_row_widths(&rows)?;
        let columns = match columns {
            Some(columns) => columns,
            None => default_column_names(width.unwrap_or(0)),
        };
        let index = Index::range(rows.len());
        Self::from_parts(columns, index, rows)
    }

    /// Build from a mix of positional rows and name-keyed records.
    ///
    /// Without explicit columns, the first row decides: positional rows get
    /// generated names, named rows contribute the union of their keys in
    /// first-seen order. Names missing from a record are filled with null;
    /// record keys outside the column list are ignored.
    pub fn from_rows(rows: Vec<RowInput>, columns: Option<Vec<String>>) -> Result<Self, FrameError> {
        let columns = match columns {
            Some(columns) => columns,
            None => infer_columns(&rows),
        };
        validate_column_names(&columns, None)?;

        let mut normalized = Vec::with_capacity(rows.len());
        for (row, input) in rows.into_iter().enumerate() {
            let values = match input {
                RowInput::Positional(values) => {
                    if values.len() != columns.len() {
                        return Err(FrameError::RaggedRow {
                            row,
                            len: values.len(),
                            expected: columns.len(),
                        });
                    }
                    values
                }
                RowInput::Named(mut pairs) => columns
                    .iter()
                    .map(|name| {
                        pairs
                            .iter()
                            .position(|(key, _)| key == name)
                            .map_or(Scalar::Null, |pos| pairs.swap_remove(pos).1)
                    })
                    .collect(),
            };
            normalized.push(values);
        }

        let index = Index::range(normalized.len());
        Self::from_parts(columns, index, normalized)
    }

    /// Build from name-keyed records.
    pub fn from_records<I, R, K>(records: I) -> Result<Self, FrameError>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, Scalar)>,
        K: Into<String>,
    {
        let rows = records
            .into_iter()
            .map(|record| {
                RowInput::Named(
                    record
                        .into_iter()
                        .map(|(key, value)| (key.into(), value))
                        .collect(),
                )
            })
            .collect();
        Self::from_rows(rows, None)
    }

    /// Build from named columns of equal length.
    pub fn from_columns<K: Into<String>>(
        columns: Vec<(K, Vec<Scalar>)>,
    ) -> Result<Self, FrameError> {
        let row_count = columns.first().map_or(0, |(_, values)| values.len());
        let mut names = Vec::with_capacity(columns.len());
        let mut rows = vec![Vec::with_capacity(columns.len()); row_count];
        for (position, (name, values)) in columns.into_iter().enumerate() {
            if values.len() != row_count {
                return Err(FrameError::InvalidParameter {
                    parameter: "columns",
                    reason: format!(
                        "column {position} has {} values but column 0 has {row_count}",
                        values.len()
                    ),
                });
            }
            names.push(name.into());
            for (row, value) in rows.iter_mut().zip(values) {
                row.push(value);
            }
        }
        Self::from_parts(names, Index::range(row_count), rows)
    }

    /// Validated assembly used by every constructor and operation.
    pub fn from_parts(
        columns: Vec<String>,
        index: Index,
        rows: Vec<Vec<Scalar>>,
    ) -> Result<Self, FrameError> {
        let width = validate_row_widths(&rows)?;
        validate_column_names(&columns, width)?;
        if index.len() != rows.len() {
            return Err(FrameError::InvalidParameter {
                parameter: "index",
                reason: format!(
                    "index has {} labels but table has {} rows",
                    index.len(),
                    rows.len()
                ),
            });
        }
        let column_cache = columns.iter().map(|_| OnceLock::new()).collect();
        Ok(Self {
            columns,
            index,
            rows,
            column_cache,
        })
    }

    /// Same rows under a different index of equal length.
    pub fn with_index(&self, index: Index) -> Result<Self, FrameError> {
        Self::from_parts(self.columns.clone(), index, self.rows.clone())
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Number of rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    #[must_use]
    pub fn cols(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Full row data in column order.
    #[must_use]
    pub fn values(&self) -> &[Vec<Scalar>] {
        &self.rows
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_position(&self, name: &str) -> Result<usize, FrameError> {
        validate_column_exists(name, &self.columns)
    }

    pub fn row(&self, position: usize) -> Result<RowView<'_>, FrameError> {
        validate_row_index(position, self.rows.len())?;
        Ok(self.row_view(position))
    }

    pub fn cell(&self, position: usize, column: &str) -> Result<&Scalar, FrameError> {
        validate_row_index(position, self.rows.len())?;
        let col = self.column_position(column)?;
        Ok(&self.rows[position][col])
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = RowView<'_>> + '_ {
        (0..self.rows.len()).map(|position| self.row_view(position))
    }

    fn row_view(&self, position: usize) -> RowView<'_> {
        RowView {
            position,
            label: &self.index.labels()[position],
            columns: &self.columns,
            values: &self.rows[position],
        }
    }

    /// Column projection as a series, computed once per table.
    pub fn column(&self, name: &str) -> Result<&Series, FrameError> {
        let pos = self.column_position(name)?;
        Ok(self.column_cache[pos].get_or_init(|| Series {
            name: Some(self.columns[pos].clone()),
            index: self.index.clone(),
            values: self.rows.iter().map(|row| row[pos].clone()).collect(),
        }))
    }

    // ── Selection and filtering ────────────────────────────────────────

    /// Keep only `names`, in that order. Rows and index are unchanged.
    pub fn select(&self, names: &[&str]) -> Result<Self, FrameError> {
        let positions = names
            .iter()
            .map(|name| self.column_position(name))
            .collect::<Result<Vec<_>, _>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| positions.iter().map(|&pos| row[pos].clone()).collect())
            .collect();
        let columns = names.iter().map(|name| (*name).to_owned()).collect();
        Self::from_parts(columns, self.index.clone(), rows)
    }

    /// Keep rows for which `predicate` returns `true`, in source order.
    ///
    /// The first predicate error aborts the filter and is reported with the
    /// row it failed on.
    pub fn filter<F>(&self, mut predicate: F) -> Result<Self, FrameError>
    where
        F: FnMut(&RowView<'_>) -> Result<bool, FrameError>,
    {
        let mut keep = Vec::new();
        for view in self.iter_rows() {
            let row = view.position();
            if predicate(&view).map_err(|err| FrameError::callback("filter", row, None, err))? {
                keep.push(row);
            }
        }
        tracing::debug!(
            input_rows = self.rows.len(),
            kept_rows = keep.len(),
            "filter"
        );
        self.take_rows(&keep)
    }

    /// Rows at `positions`, in that order, with their index labels.
    pub fn take_rows(&self, positions: &[usize]) -> Result<Self, FrameError> {
        for &pos in positions {
            validate_row_index(pos, self.rows.len())?;
        }
        let rows = positions.iter().map(|&pos| self.rows[pos].clone()).collect();
        Self::from_parts(self.columns.clone(), self.index.take(positions), rows)
    }

    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        let end = n.min(self.rows.len());
        self.slice_rows(0, end)
    }

    #[must_use]
    pub fn tail(&self, n: usize) -> Self {
        let start = self.rows.len().saturating_sub(n);
        self.slice_rows(start, self.rows.len())
    }

    fn slice_rows(&self, start: usize, end: usize) -> Self {
        let positions: Vec<usize> = (start..end).collect();
        Self {
            columns: self.columns.clone(),
            index: self.index.take(&positions),
            rows: self.rows[start..end].to_vec(),
            column_cache: self.columns.iter().map(|_| OnceLock::new()).collect(),
        }
    }

    pub fn drop_columns(&self, names: &[&str]) -> Result<Self, FrameError> {
        for name in names {
            self.column_position(name)?;
        }
        let kept: Vec<&str> = self
            .columns
            .iter()
            .map(String::as_str)
            .filter(|name| !names.contains(name))
            .collect();
        self.select(&kept)
    }

    /// Rename columns in place; every `from` must exist.
    pub fn rename_columns(&self, mapping: &[(&str, &str)]) -> Result<Self, FrameError> {
        let mut columns = self.columns.clone();
        for (from, to) in mapping {
            let pos = self.column_position(from)?;
            columns[pos] = (*to).to_owned();
        }
        Self::from_parts(columns, self.index.clone(), self.rows.clone())
    }

    // ── Element-wise transforms ────────────────────────────────────────

    /// Transform every value of one column.
    pub fn apply<F>(&self, column: &str, mut func: F) -> Result<Self, FrameError>
    where
        F: FnMut(&Scalar) -> Result<Scalar, FrameError>,
    {
        let col = self.column_position(column)?;
        let mut rows = Vec::with_capacity(self.rows.len());
        for (row, values) in self.rows.iter().enumerate() {
            let mut next = values.clone();
            next[col] = func(&values[col]).map_err(|err| {
                FrameError::callback("apply", row, Some(column.to_owned()), err)
            })?;
            rows.push(next);
        }
        Self::from_parts(self.columns.clone(), self.index.clone(), rows)
    }

    /// Transform every cell.
    pub fn map<F>(&self, mut func: F) -> Result<Self, FrameError>
    where
        F: FnMut(&Scalar) -> Result<Scalar, FrameError>,
    {
        let mut rows = Vec::with_capacity(self.rows.len());
        for (row, values) in self.rows.iter().enumerate() {
            let mut next = Vec::with_capacity(values.len());
            for (col, value) in values.iter().enumerate() {
                next.push(func(value).map_err(|err| {
                    FrameError::callback("map", row, Some(self.columns[col].clone()), err)
                })?);
            }
            rows.push(next);
        }
        Self::from_parts(self.columns.clone(), self.index.clone(), rows)
    }

    /// Compute `name` from each row. An existing column is replaced in
    /// place; a new one is appended.
    pub fn derive<F>(&self, name: &str, mut func: F) -> Result<Self, FrameError>
    where
        F: FnMut(&RowView<'_>) -> Result<Scalar, FrameError>,
    {
        let existing = self.columns.iter().position(|c| c == name);
        let mut rows = Vec::with_capacity(self.rows.len());
        for view in self.iter_rows() {
            let row = view.position();
            let value = func(&view)
                .map_err(|err| FrameError::callback("derive", row, Some(name.to_owned()), err))?;
            let mut next = view.values().to_vec();
            match existing {
                Some(pos) => next[pos] = value,
                None => next.push(value),
            }
            rows.push(next);
        }
        let mut columns = self.columns.clone();
        if existing.is_none() {
            columns.push(name.to_owned());
        }
        Self::from_parts(columns, self.index.clone(), rows)
    }

    /// Replace values equal to `from` with `to`, in `columns` or everywhere.
    pub fn replace(
        &self,
        from: &Scalar,
        to: &Scalar,
        columns: Option<&[&str]>,
    ) -> Result<Self, FrameError> {
        let targets: Vec<usize> = match columns {
            Some(names) => names
                .iter()
                .map(|name| self.column_position(name))
                .collect::<Result<_, _>>()?,
            None => (0..self.columns.len()).collect(),
        };
        let rows = self
            .rows
            .iter()
            .map(|values| {
                let mut next = values.clone();
                for &pos in &targets {
                    if next[pos].semantic_eq(from) {
                        next[pos] = to.clone();
                    }
                }
                next
            })
            .collect();
        Self::from_parts(self.columns.clone(), self.index.clone(), rows)
    }

    // ── Descriptive statistics ─────────────────────────────────────────

    /// Summary statistics for every numeric column.
    ///
    /// Rows are labeled `count`, `mean`, `std`, `min`, `median`, `max`;
    /// columns keep source order and skip non-numeric columns.
    pub fn describe(&self) -> Result<Self, FrameError> {
        const STATS: [&str; 6] = ["count", "mean", "std", "min", "median", "max"];

        let mut columns = Vec::new();
        for name in &self.columns {
            let series = self.column(name)?;
            if series.value_kind() != ValueKind::Numeric {
                continue;
            }
            let values = vec![
                Scalar::Int64(series.count() as i64),
                series.mean(),
                series.std(),
                series.min(),
                series.median(),
                series.max(),
            ];
            columns.push((name.clone(), values));
        }

        let index = Index::new(STATS.iter().map(|s| IndexLabel::from(*s)).collect());
        let names: Vec<String> = columns.iter().map(|(name, _)| name.clone()).collect();
        let rows = (0..STATS.len())
            .map(|stat| columns.iter().map(|(_, values)| values[stat].clone()).collect())
            .collect();
        Self::from_parts(names, index, rows)
    }
}

fn infer_columns(rows: &[RowInput]) -> Vec<String> {
    match rows.first() {
        None => Vec::new(),
        Some(RowInput::Positional(values)) => default_column_names(values.len()),
        Some(RowInput::Named(_)) => {
            let mut seen = HashSet::new();
            let mut columns = Vec::new();
            for row in rows {
                if let RowInput::Named(pairs) = row {
                    for (key, _) in pairs {
                        if seen.insert(key.as_str()) {
                            columns.push(key.clone());
                        }
                    }
                }
            }
            columns
        }
    }
}

#[cfg(test)]
mod tests {
    use rf_index::IndexLabel;
    use rf_types::{Scalar, ValueKind};

    use super::{ErrorKind, FrameError, RowInput, Series, Table};

    fn people() -> Table {
        Table::from_records(vec![
            vec![
                ("name", Scalar::from("ada")),
                ("age", Scalar::from(36)),
                ("city", Scalar::from("london")),
            ],
            vec![
                ("name", Scalar::from("grace")),
                ("age", Scalar::from(45)),
                ("city", Scalar::from("nyc")),
            ],
            vec![
                ("name", Scalar::from("linus")),
                ("age", Scalar::Null),
                ("city", Scalar::from("helsinki")),
            ],
        ])
        .expect("people")
    }

    #[test]
    fn positional_rows_get_generated_names() {
        let table = Table::new(
            vec![
                vec![Scalar::Int64(1), Scalar::from("a")],
                vec![Scalar::Int64(2), Scalar::from("b")],
            ],
            None,
        )
        .expect("table");
        assert_eq!(table.columns(), &["0", "1"]);
        assert_eq!(table.shape(), (2, 2));
        assert_eq!(table.index().len(), table.rows());
    }

    #[test]
    fn ragged_rows_fail_construction() {
        let err = Table::new(
            vec![vec![Scalar::Int64(1), Scalar::Int64(2)], vec![Scalar::Int64(3)]],
            None,
        )
        .expect_err("ragged");
        assert_eq!(err.kind(), ErrorKind::Structural);
        assert_eq!(err.to_string(), "row 1 has 1 values but expected 2");
    }

    #[test]
    fn column_count_must_match_row_width() {
        let err = Table::new(vec![vec![Scalar::Int64(1)]], Some(vec!["a".into(), "b".into()]))
            .expect_err("mismatch");
        assert!(matches!(err, FrameError::ColumnCountMismatch { .. }));
    }

    #[test]
    fn empty_rows_keep_explicit_columns() {
        let table = Table::new(Vec::new(), Some(vec!["a".into(), "b".into()])).expect("empty");
        assert_eq!(table.shape(), (0, 2));
        assert_eq!(Table::empty().shape(), (0, 0));
    }

    #[test]
    fn named_records_union_keys_and_fill_null() {
        let table = Table::from_records(vec![
            vec![("a", Scalar::from(1))],
            vec![("b", Scalar::from(2)), ("a", Scalar::from(3))],
        ])
        .expect("records");
        assert_eq!(table.columns(), &["a", "b"]);
        assert_eq!(table.cell(0, "b").expect("cell"), &Scalar::Null);
        assert_eq!(table.cell(1, "a").expect("cell"), &Scalar::Int64(3));
    }

    #[test]
    fn mixed_row_inputs_normalize_to_column_order() {
        let table = Table::from_rows(
            vec![
                RowInput::Positional(vec![Scalar::from(1), Scalar::from("x")]),
                RowInput::Named(vec![
                    ("label".to_owned(), Scalar::from("y")),
                    ("id".to_owned(), Scalar::from(2)),
                ]),
            ],
            Some(vec!["id".into(), "label".into()]),
        )
        .expect("mixed");
        assert_eq!(
            table.values()[1],
            vec![Scalar::Int64(2), Scalar::from("y")]
        );
    }

    #[test]
    fn row_and_cell_access_validate_bounds() {
        let table = people();
        let row = table.row(1).expect("row");
        assert_eq!(row.get("name").expect("name"), &Scalar::from("grace"));
        assert_eq!(row.label(), &IndexLabel::Int64(1));

        let err = table.row(3).expect_err("out of range");
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
        let err = table.cell(0, "email").expect_err("missing column");
        assert_eq!(err.kind(), ErrorKind::ColumnNotFound);
    }

    #[test]
    fn column_access_is_a_detached_projection() {
        let table = people();
        let mut ages = table.column("age").expect("age").clone();
        assert_eq!(ages.name(), Some("age"));
        ages.set(0, Scalar::Int64(99)).expect("set");
        assert_eq!(table.cell(0, "age").expect("cell"), &Scalar::Int64(36));
        assert_eq!(
            table.column("age").expect("cached").values()[0],
            Scalar::Int64(36)
        );
    }

    #[test]
    fn reserved_looking_column_names_are_plain_columns() {
        let table = Table::from_records(vec![vec![
            ("rows", Scalar::from(1)),
            ("columns", Scalar::from(2)),
        ]])
        .expect("table");
        assert_eq!(table.rows(), 1);
        assert_eq!(
            table.column("rows").expect("rows column").values(),
            &[Scalar::Int64(1)]
        );
    }

    #[test]
    fn select_reorders_and_keeps_rows() {
        let table = people();
        let out = table.select(&["city", "name"]).expect("select");
        assert_eq!(out.columns(), &["city", "name"]);
        assert_eq!(out.rows(), table.rows());
        assert_eq!(out.cell(2, "city").expect("cell"), &Scalar::from("helsinki"));
        assert_eq!(out.index(), table.index());
    }

    #[test]
    fn select_empty_list_keeps_row_count() {
        let out = people().select(&[]).expect("select none");
        assert_eq!(out.shape(), (3, 0));
    }

    #[test]
    fn select_reports_first_missing_column() {
        let err = people().select(&["name", "zip", "email"]).expect_err("missing");
        assert!(matches!(err, FrameError::ColumnNotFound { ref name, .. } if name == "zip"));
    }

    #[test]
    fn filter_keeps_order_and_labels() {
        let table = people();
        let out = table
            .filter(|row| Ok(row.get("name")?.to_string().len() > 3))
            .expect("filter");
        assert_eq!(out.rows(), 2);
        assert_eq!(
            out.index().labels(),
            &[IndexLabel::Int64(1), IndexLabel::Int64(2)]
        );
    }

    #[test]
    fn filter_to_nothing_keeps_columns() {
        let table = people();
        let out = table.filter(|_| Ok(false)).expect("filter");
        assert_eq!(out.rows(), 0);
        assert_eq!(out.columns(), table.columns());
    }

    #[test]
    fn filter_attributes_predicate_failures() {
        let err = people()
            .filter(|row| Ok(row.get("salary")?.is_null()))
            .expect_err("predicate failure");
        assert_eq!(err.kind(), ErrorKind::Callback);
        let FrameError::Callback {
            operation,
            row,
            column,
            ..
        } = &err
        else {
            panic!("expected callback error");
        };
        assert_eq!(*operation, "filter");
        assert_eq!(*row, 0);
        assert_eq!(column.as_deref(), Some("salary"));
        assert!(err.to_string().starts_with("filter callback failed at row 0, column 'salary'"));
    }

    #[test]
    fn apply_transforms_one_column_without_touching_source() {
        let table = people();
        let out = table
            .apply("age", |v| {
                Ok(v.coerce_numeric()
                    .map_or(Scalar::Null, |age| Scalar::Float64(age + 1.0)))
            })
            .expect("apply");
        assert_eq!(out.cell(0, "age").expect("cell"), &Scalar::Float64(37.0));
        assert_eq!(out.cell(2, "age").expect("cell"), &Scalar::Null);
        assert_eq!(table.cell(0, "age").expect("cell"), &Scalar::Int64(36));
    }

    #[test]
    fn map_reports_row_and_column_of_failure() {
        let err = people()
            .map(|v| match v {
                Scalar::Null => Err(FrameError::Rejected("null cell".into())),
                other => Ok(other.clone()),
            })
            .expect_err("null cell");
        let FrameError::Callback { row, column, .. } = err else {
            panic!("expected callback error");
        };
        assert_eq!(row, 2);
        assert_eq!(column.as_deref(), Some("age"));
    }

    #[test]
    fn derive_appends_or_replaces() {
        let table = people();
        let out = table
            .derive("greeting", |row| {
                Ok(Scalar::from(format!("hi {}", row.get("name")?)))
            })
            .expect("derive");
        assert_eq!(out.columns().last().map(String::as_str), Some("greeting"));
        assert_eq!(out.cell(0, "greeting").expect("cell"), &Scalar::from("hi ada"));

        let replaced = table
            .derive("age", |_| Ok(Scalar::Int64(0)))
            .expect("replace");
        assert_eq!(replaced.columns(), table.columns());
        assert_eq!(replaced.cell(1, "age").expect("cell"), &Scalar::Int64(0));
    }

    #[test]
    fn replace_matches_semantic_equality() {
        let table = people();
        let out = table
            .replace(&Scalar::Null, &Scalar::Int64(0), Some(&["age"]))
            .expect("replace");
        assert_eq!(out.cell(2, "age").expect("cell"), &Scalar::Int64(0));
        let everywhere = table
            .replace(&Scalar::from("nyc"), &Scalar::from("new york"), None)
            .expect("replace");
        assert_eq!(
            everywhere.cell(1, "city").expect("cell"),
            &Scalar::from("new york")
        );
    }

    #[test]
    fn head_tail_drop_and_rename() {
        let table = people();
        assert_eq!(table.head(2).rows(), 2);
        assert_eq!(table.tail(1).index().labels(), &[IndexLabel::Int64(2)]);
        assert_eq!(table.head(10).rows(), 3);

        let dropped = table.drop_columns(&["city"]).expect("drop");
        assert_eq!(dropped.columns(), &["name", "age"]);

        let renamed = table.rename_columns(&[("age", "years")]).expect("rename");
        assert_eq!(renamed.columns(), &["name", "years", "city"]);

        let err = table.rename_columns(&[("age", "name")]).expect_err("collision");
        assert!(matches!(err, FrameError::DuplicateColumn(_)));
    }

    #[test]
    fn describe_summarizes_numeric_columns() {
        let table = Table::from_records(vec![
            vec![("g", Scalar::from("a")), ("v", Scalar::from(1))],
            vec![("g", Scalar::from("b")), ("v", Scalar::from(3))],
            vec![("g", Scalar::from("c")), ("v", Scalar::Null)],
        ])
        .expect("table");
        let summary = table.describe().expect("describe");
        assert_eq!(summary.columns(), &["v"]);
        assert_eq!(summary.rows(), 6);
        assert_eq!(summary.cell(0, "v").expect("count"), &Scalar::Int64(2));
        assert_eq!(summary.cell(1, "v").expect("mean"), &Scalar::Float64(2.0));
        assert_eq!(summary.cell(5, "v").expect("max"), &Scalar::Float64(3.0));
        assert_eq!(summary.index().labels()[4], IndexLabel::from("median"));
    }

    #[test]
    fn series_statistics_skip_nulls() {
        let series = Series::named(
            "v",
            vec![
                Scalar::Int64(2),
                Scalar::Null,
                Scalar::from("4"),
                Scalar::from("n/a"),
            ],
        );
        assert_eq!(series.count(), 3);
        assert_eq!(series.sum(), Scalar::Float64(6.0));
        assert_eq!(series.mean(), Scalar::Float64(3.0));
        assert_eq!(series.min(), Scalar::Float64(2.0));
        assert_eq!(series.max(), Scalar::Float64(4.0));
        assert_eq!(series.value_kind(), ValueKind::Mixed);
        assert_eq!(Series::new(vec![Scalar::Int64(1)]).std(), Scalar::Null);
    }

    #[test]
    fn series_unique_and_dropna() {
        let series = Series::new(vec![
            Scalar::Int64(1),
            Scalar::Null,
            Scalar::Int64(1),
            Scalar::from("1"),
        ]);
        assert_eq!(series.unique().len(), 3);
        assert_eq!(series.nunique(), 2);
        let dropped = series.dropna();
        assert_eq!(dropped.len(), 3);
        assert_eq!(dropped.index().labels()[1], IndexLabel::Int64(2));
        assert_eq!(series.fillna(&Scalar::Int64(0)).values()[1], Scalar::Int64(0));
    }

    #[test]
    fn series_from_values_checks_lengths() {
        let err = Series::from_values("s", vec![IndexLabel::Int64(0)], Vec::new())
            .expect_err("length mismatch");
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = Series::new(Vec::new()).get(0).expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    }

    #[test]
    fn table_serde_revalidates() {
        let table = people();
        let json = serde_json::to_string(&table).expect("serialize");
        let back: Table = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, table);
        assert_eq!(back.column("name").expect("cache rebuilt").len(), 3);

        let bad = r#"{"columns":["a","a"],"index":[],"rows":[]}"#;
        assert!(serde_json::from_str::<Table>(bad).is_err());
    }

    #[test]
    fn tables_are_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Table>();
        assert_send_sync::<Series>();
    }
}
