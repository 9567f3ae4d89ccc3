//! Vertical and horizontal table concatenation.

use std::collections::HashSet;

use rf_index::Index;
use rf_types::Scalar;
use serde::{Deserialize, Serialize};

use crate::{FrameError, Table};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Stack rows (axis 0).
    #[default]
    Rows,
    /// Place tables side by side (axis 1).
    Columns,
}

impl TryFrom<i64> for Axis {
    type Error = FrameError;

    fn try_from(axis: i64) -> Result<Self, Self::Error> {
        match axis {
            0 => Ok(Self::Rows),
            1 => Ok(Self::Columns),
            other => Err(FrameError::InvalidParameter {
                parameter: "axis",
                reason: format!("unsupported concat axis {other}; expected 0 or 1"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcatOptions {
    pub axis: Axis,
    /// Vertical only: number output rows `0..n` instead of keeping source
    /// labels.
    pub ignore_index: bool,
}

impl Default for ConcatOptions {
    fn default() -> Self {
        Self {
            axis: Axis::Rows,
            ignore_index: true,
        }
    }
}

/// Concatenate tables row-wise with default options.
pub fn concat(tables: &[&Table]) -> Result<Table, FrameError> {
    concat_with_options(tables, ConcatOptions::default())
}

/// Concatenate along a numeric axis: `0` for rows, `1` for columns.
pub fn concat_with_axis(tables: &[&Table], axis: i64) -> Result<Table, FrameError> {
    let options = ConcatOptions {
        axis: Axis::try_from(axis)?,
        ..ConcatOptions::default()
    };
    concat_with_options(tables, options)
}

pub fn concat_with_options(tables: &[&Table], options: ConcatOptions) -> Result<Table, FrameError> {
    let out = match options.axis {
        Axis::Rows => concat_rows(tables, options.ignore_index)?,
        Axis::Columns => concat_columns(tables)?,
    };
    tracing::debug!(
        inputs = tables.len(),
        axis = ?options.axis,
        rows = out.rows(),
        cols = out.cols(),
        "concat"
    );
    Ok(out)
}

fn concat_rows(tables: &[&Table], ignore_index: bool) -> Result<Table, FrameError> {
    // Union of column names in first-seen order.
    let mut seen = HashSet::new();
    let mut columns: Vec<String> = Vec::new();
    for table in tables {
        for name in table.columns() {
            if seen.insert(name.as_str()) {
                columns.push(name.clone());
            }
        }
    }
    if columns.is_empty() {
        return Ok(Table::empty());
    }

    let total: usize = tables.iter().map(|table| table.rows()).sum();
    let mut rows = Vec::with_capacity(total);
    for table in tables {
        let positions: Vec<Option<usize>> = columns
            .iter()
            .map(|name| table.columns().iter().position(|c| c == name))
            .collect();
        for source in table.values() {
            rows.push(
                positions
                    .iter()
                    .map(|pos| pos.map_or(Scalar::Null, |p| source[p].clone()))
                    .collect(),
            );
        }
    }

    let index = if ignore_index {
        Index::range(total)
    } else {
        let indexes: Vec<&Index> = tables.iter().map(|table| table.index()).collect();
        Index::concat(&indexes)
    };
    Table::from_parts(columns, index, rows)
}

fn concat_columns(tables: &[&Table]) -> Result<Table, FrameError> {
    let included: Vec<(usize, &Table)> = tables
        .iter()
        .enumerate()
        .filter(|(_, table)| !table.is_empty())
        .map(|(position, table)| (position, *table))
        .collect();
    let Some(&(_, first)) = included.first() else {
        return Ok(Table::empty());
    };

    let expected = first.rows();
    for &(position, table) in &included {
        if table.rows() != expected {
            return Err(FrameError::RowCountMismatch {
                position,
                rows: table.rows(),
                expected,
            });
        }
    }

    let columns: Vec<String> = included
        .iter()
        .flat_map(|(_, table)| table.columns().iter().cloned())
        .collect();
    let rows = (0..expected)
        .map(|row| {
            included
                .iter()
                .flat_map(|(_, table)| table.values()[row].iter().cloned())
                .collect()
        })
        .collect();
    // Duplicate names across inputs surface here as `DuplicateColumn`.
    Table::from_parts(columns, first.index().clone(), rows)
}
