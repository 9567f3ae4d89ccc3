//! Structural checks shared by every table operation.
//!
//! Each check is read-only and returns the first violation it finds.

use std::collections::HashSet;

use rf_types::Scalar;

use crate::FrameError;

/// Verify every row has the same number of values.
///
/// Returns the common width, or `None` when there are no rows to measure.
pub fn validate_row_widths(rows: &[Vec<Scalar>]) -> Result<Option<usize>, FrameError> {
    let Some(first) = rows.first() else {
        return Ok(None);
    };
    let expected = first.len();
    if let Some((row, values)) = rows
        .iter()
        .enumerate()
        .find(|(_, values)| values.len() != expected)
    {
        return Err(FrameError::RaggedRow {
            row,
            len: values.len(),
            expected,
        });
    }
    Ok(Some(expected))
}

/// Verify names are non-empty and unique, and match `width` when it is known.
pub fn validate_column_names<S: AsRef<str>>(
    names: &[S],
    width: Option<usize>,
) -> Result<(), FrameError> {
    let mut seen = HashSet::with_capacity(names.len());
    for (position, name) in names.iter().enumerate() {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(FrameError::EmptyColumnName { position });
        }
        if !seen.insert(name) {
            return Err(FrameError::DuplicateColumn(name.to_owned()));
        }
    }
    if let Some(width) = width
        && width != names.len()
    {
        return Err(FrameError::ColumnCountMismatch {
            names: names.len(),
            width,
        });
    }
    Ok(())
}

pub fn validate_row_index(index: usize, count: usize) -> Result<(), FrameError> {
    if index < count {
        Ok(())
    } else {
        Err(FrameError::IndexOutOfRange { index, len: count })
    }
}

/// Verify `name` is one of `available` and return its position.
pub fn validate_column_exists<S: AsRef<str>>(
    name: &str,
    available: &[S],
) -> Result<usize, FrameError> {
    available
        .iter()
        .position(|candidate| candidate.as_ref() == name)
        .ok_or_else(|| FrameError::ColumnNotFound {
            name: name.to_owned(),
            available: available.iter().map(|c| c.as_ref().to_owned()).collect(),
        })
}

/// `"0"`, `"1"`, … for tables built without explicit column names.
#[must_use]
pub fn default_column_names(width: usize) -> Vec<String> {
    (0..width).map(|i| i.to_string()).collect()
}
