#![forbid(unsafe_code)]

//! Key-based merge of two [`Table`]s with inner, left, right and outer
//! semantics.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    mem::size_of,
    str::FromStr,
};

use bumpalo::{Bump, collections::Vec as BumpVec};
use rf_frame::{ErrorKind, FrameError, Table};
use rf_index::Index;
use rf_types::{KeyEquality, KeyPart, Scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Outer,
}

impl JoinType {
    pub const NAMES: &'static [&'static str] = &["inner", "left", "right", "outer"];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Inner => "inner",
            Self::Left => "left",
            Self::Right => "right",
            Self::Outer => "outer",
        }
    }
}

impl FromStr for JoinType {
    type Err = JoinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inner" => Ok(Self::Inner),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "outer" => Ok(Self::Outer),
            other => Err(JoinError::InvalidJoinType {
                value: other.to_owned(),
                valid: Self::NAMES,
            }),
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinSide {
    Left,
    Right,
}

impl fmt::Display for JoinSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

/// Strings appended to colliding non-key column names, left then right.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Suffixes {
    left: String,
    right: String,
}

impl Suffixes {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Result<Self, JoinError> {
        let (left, right) = (left.into(), right.into());
        if left == right {
            return Err(JoinError::InvalidSuffixes(format!(
                "left and right suffixes must differ, both are {left:?}"
            )));
        }
        Ok(Self { left, right })
    }

    #[must_use]
    pub fn left(&self) -> &str {
        &self.left
    }

    #[must_use]
    pub fn right(&self) -> &str {
        &self.right
    }
}

impl Default for Suffixes {
    fn default() -> Self {
        Self {
            left: "_x".to_owned(),
            right: "_y".to_owned(),
        }
    }
}

impl TryFrom<&[&str]> for Suffixes {
    type Error = JoinError;

    fn try_from(values: &[&str]) -> Result<Self, Self::Error> {
        match values {
            [left, right] => Self::new(*left, *right),
            other => Err(JoinError::InvalidSuffixes(format!(
                "expected exactly 2 suffixes, got {}",
                other.len()
            ))),
        }
    }
}

impl TryFrom<Vec<String>> for Suffixes {
    type Error = JoinError;

    fn try_from(values: Vec<String>) -> Result<Self, Self::Error> {
        let borrowed: Vec<&str> = values.iter().map(String::as_str).collect();
        Self::try_from(borrowed.as_slice())
    }
}

impl From<Suffixes> for Vec<String> {
    fn from(suffixes: Suffixes) -> Self {
        vec![suffixes.left, suffixes.right]
    }
}

#[derive(Debug, Error)]
pub enum JoinError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("merge requires at least one join key")]
    EmptyKeys,
    #[error("join key '{key}' not found in {side} table; available columns: {available:?}")]
    MissingKey {
        key: String,
        side: JoinSide,
        available: Vec<String>,
    },
    #[error("invalid join type '{value}'; expected one of {valid:?}")]
    InvalidJoinType {
        value: String,
        valid: &'static [&'static str],
    },
    #[error("invalid suffixes: {0}")]
    InvalidSuffixes(String),
    #[error(
        "merge output would contain column '{column}' twice; rename it or pick other suffixes"
    )]
    OutputColumnCollision { column: String },
}

impl JoinError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Frame(err) => err.kind(),
            Self::MissingKey { .. } => ErrorKind::ColumnNotFound,
            Self::EmptyKeys
            | Self::InvalidJoinType { .. }
            | Self::InvalidSuffixes(_)
            | Self::OutputColumnCollision { .. } => ErrorKind::Validation,
        }
    }
}

pub const DEFAULT_ARENA_BUDGET_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinExecutionOptions {
    pub use_arena: bool,
    pub arena_budget_bytes: usize,
}

impl Default for JoinExecutionOptions {
    fn default() -> Self {
        Self {
            use_arena: true,
            arena_budget_bytes: DEFAULT_ARENA_BUDGET_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    pub how: JoinType,
    pub suffixes: Suffixes,
    pub key_equality: KeyEquality,
    pub execution: JoinExecutionOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MergeExecutionTrace {
    used_arena: bool,
    output_rows: usize,
    estimated_bytes: usize,
}

/// Row pairing: left position, right position; `None` marks the null side.
type RowPair = (Option<usize>, Option<usize>);

/// Merge `left` and `right` on the shared key columns `on`.
pub fn merge<S: AsRef<str>>(
    left: &Table,
    right: &Table,
    on: &[S],
    how: JoinType,
    suffixes: &Suffixes,
) -> Result<Table, JoinError> {
    let options = MergeOptions {
        how,
        suffixes: suffixes.clone(),
        ..MergeOptions::default()
    };
    merge_with_options(left, right, on, &options)
}

pub fn merge_with_options<S: AsRef<str>>(
    left: &Table,
    right: &Table,
    on: &[S],
    options: &MergeOptions,
) -> Result<Table, JoinError> {
    let (merged, _) = merge_with_trace(left, right, on, options)?;
    Ok(merged)
}

fn merge_with_trace<S: AsRef<str>>(
    left: &Table,
    right: &Table,
    on: &[S],
    options: &MergeOptions,
) -> Result<(Table, MergeExecutionTrace), JoinError> {
    let layout = MergeLayout::new(left, right, on, &options.suffixes)?;
    let how = options.how;

    if let Some(short) = empty_short_circuit(left, right, how, &layout)? {
        tracing::debug!(%how, rows = short.rows(), "merge short-circuited on empty input");
        let trace = MergeExecutionTrace {
            used_arena: false,
            output_rows: short.rows(),
            estimated_bytes: 0,
        };
        return Ok((short, trace));
    }

    let mode = options.key_equality;
    let left_keys = key_rows(left, &layout.left_key_positions, mode);
    let right_keys = key_rows(right, &layout.right_key_positions, mode);
    let left_map = key_index(&left_keys);
    let right_map = key_index(&right_keys);

    let output_rows = estimate_output_rows(&left_keys, &right_keys, &left_map, &right_map, how);
    let estimated_bytes = estimate_intermediate_bytes(output_rows);
    let exec = options.execution;
    let use_arena = exec.use_arena && estimated_bytes <= exec.arena_budget_bytes;

    let rows = if use_arena {
        let arena = Bump::new();
        let mut plan = BumpVec::<RowPair>::with_capacity_in(output_rows, &arena);
        plan_pairs(&left_keys, &right_keys, &left_map, &right_map, how, &mut |pair| {
            plan.push(pair);
        });
        layout.materialize(left, right, plan.as_slice())
    } else {
        let mut plan = Vec::<RowPair>::with_capacity(output_rows);
        plan_pairs(&left_keys, &right_keys, &left_map, &right_map, how, &mut |pair| {
            plan.push(pair);
        });
        layout.materialize(left, right, &plan)
    };

    tracing::debug!(
        %how,
        left_rows = left.rows(),
        right_rows = right.rows(),
        output_rows = rows.len(),
        used_arena = use_arena,
        "merge"
    );

    let index = Index::range(rows.len());
    let merged = Table::from_parts(layout.columns, index, rows)?;
    Ok((
        merged,
        MergeExecutionTrace {
            used_arena: use_arena,
            output_rows,
            estimated_bytes,
        },
    ))
}

/// Resolved key positions and the output column list.
struct MergeLayout {
    columns: Vec<String>,
    left_key_positions: Vec<usize>,
    right_key_positions: Vec<usize>,
    /// For each left column, the right position of the same key, if it is one.
    left_key_source: Vec<Option<usize>>,
    right_value_positions: Vec<usize>,
}

impl MergeLayout {
    fn new<S: AsRef<str>>(
        left: &Table,
        right: &Table,
        on: &[S],
        suffixes: &Suffixes,
    ) -> Result<Self, JoinError> {
        if on.is_empty() {
            return Err(JoinError::EmptyKeys);
        }
        let keys: Vec<&str> = on.iter().map(AsRef::as_ref).collect();
        let left_key_positions = resolve_keys(left, &keys, JoinSide::Left)?;
        let right_key_positions = resolve_keys(right, &keys, JoinSide::Right)?;

        let right_value_positions: Vec<usize> = (0..right.cols())
            .filter(|pos| !right_key_positions.contains(pos))
            .collect();
        let right_value_names: Vec<&str> = right_value_positions
            .iter()
            .map(|&pos| right.columns()[pos].as_str())
            .collect();

        let mut columns = Vec::with_capacity(left.cols() + right_value_positions.len());
        let mut left_key_source = Vec::with_capacity(left.cols());
        for (pos, name) in left.columns().iter().enumerate() {
            let key_slot = left_key_positions.iter().position(|&k| k == pos);
            left_key_source.push(key_slot.map(|slot| right_key_positions[slot]));
            if key_slot.is_none() && right_value_names.contains(&name.as_str()) {
                columns.push(format!("{name}{}", suffixes.left()));
            } else {
                columns.push(name.clone());
            }
        }
        for name in &right_value_names {
            if left.has_column(name) {
                columns.push(format!("{name}{}", suffixes.right()));
            } else {
                columns.push((*name).to_owned());
            }
        }
        let mut seen = HashSet::with_capacity(columns.len());
        if let Some(column) = columns.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(JoinError::OutputColumnCollision {
                column: column.clone(),
            });
        }

        Ok(Self {
            columns,
            left_key_positions,
            right_key_positions,
            left_key_source,
            right_value_positions,
        })
    }

    /// Left values (or right-row keys and nulls) followed by right non-key
    /// values (or nulls).
    fn build_merged_row(
        &self,
        left: &Table,
        right: &Table,
        (left_pos, right_pos): RowPair,
    ) -> Vec<Scalar> {
        let mut row = Vec::with_capacity(self.columns.len());
        match (left_pos, right_pos) {
            (Some(l), _) => row.extend(left.values()[l].iter().cloned()),
            (None, Some(r)) => {
                let source = &right.values()[r];
                row.extend(
                    self.left_key_source
                        .iter()
                        .map(|slot| slot.map_or(Scalar::Null, |pos| source[pos].clone())),
                );
            }
            (None, None) => row.extend(self.left_key_source.iter().map(|_| Scalar::Null)),
        }
        match right_pos {
            Some(r) => {
                let source = &right.values()[r];
                row.extend(self.right_value_positions.iter().map(|&pos| source[pos].clone()));
            }
            None => row.extend(self.right_value_positions.iter().map(|_| Scalar::Null)),
        }
        row
    }

    fn materialize(&self, left: &Table, right: &Table, plan: &[RowPair]) -> Vec<Vec<Scalar>> {
        plan.iter()
            .map(|&pair| self.build_merged_row(left, right, pair))
            .collect()
    }

    fn empty_table(&self) -> Result<Table, JoinError> {
        Ok(Table::new(Vec::new(), Some(self.columns.clone()))?)
    }
}

fn resolve_keys(table: &Table, keys: &[&str], side: JoinSide) -> Result<Vec<usize>, JoinError> {
    keys.iter()
        .map(|key| {
            table
                .columns()
                .iter()
                .position(|c| c == key)
                .ok_or_else(|| JoinError::MissingKey {
                    key: (*key).to_owned(),
                    side,
                    available: table.columns().to_vec(),
                })
        })
        .collect()
}

/// Empty-side policy: both empty or the dropped side empty yield an empty
/// table with the merged columns; the kept side is returned as-is.
fn empty_short_circuit(
    left: &Table,
    right: &Table,
    how: JoinType,
    layout: &MergeLayout,
) -> Result<Option<Table>, JoinError> {
    let out = match (left.is_empty(), right.is_empty()) {
        (false, false) => return Ok(None),
        (true, true) => layout.empty_table()?,
        (true, false) => match how {
            JoinType::Right | JoinType::Outer => right.clone(),
            JoinType::Inner | JoinType::Left => layout.empty_table()?,
        },
        (false, true) => match how {
            JoinType::Left | JoinType::Outer => left.clone(),
            JoinType::Inner | JoinType::Right => layout.empty_table()?,
        },
    };
    Ok(Some(out))
}

fn key_rows(table: &Table, positions: &[usize], mode: KeyEquality) -> Vec<Vec<KeyPart>> {
    table
        .values()
        .iter()
        .map(|row| mode.composite_key(positions.iter().map(|&pos| &row[pos])))
        .collect()
}

fn key_index(keys: &[Vec<KeyPart>]) -> HashMap<&[KeyPart], Vec<usize>> {
    let mut map = HashMap::<&[KeyPart], Vec<usize>>::with_capacity(keys.len());
    for (pos, key) in keys.iter().enumerate() {
        map.entry(key.as_slice()).or_default().push(pos);
    }
    map
}

fn plan_pairs(
    left_keys: &[Vec<KeyPart>],
    right_keys: &[Vec<KeyPart>],
    left_map: &HashMap<&[KeyPart], Vec<usize>>,
    right_map: &HashMap<&[KeyPart], Vec<usize>>,
    how: JoinType,
    push: &mut dyn FnMut(RowPair),
) {
    if how == JoinType::Right {
        for (right_pos, key) in right_keys.iter().enumerate() {
            match left_map.get(key.as_slice()) {
                Some(matches) => {
                    for &left_pos in matches {
                        push((Some(left_pos), Some(right_pos)));
                    }
                }
                None => push((None, Some(right_pos))),
            }
        }
        return;
    }

    let keep_unmatched_left = matches!(how, JoinType::Left | JoinType::Outer);
    for (left_pos, key) in left_keys.iter().enumerate() {
        match right_map.get(key.as_slice()) {
            Some(matches) => {
                for &right_pos in matches {
                    push((Some(left_pos), Some(right_pos)));
                }
            }
            None if keep_unmatched_left => push((Some(left_pos), None)),
            None => {}
        }
    }

    if how == JoinType::Outer {
        for (right_pos, key) in right_keys.iter().enumerate() {
            if !left_map.contains_key(key.as_slice()) {
                push((None, Some(right_pos)));
            }
        }
    }
}

fn estimate_output_rows(
    left_keys: &[Vec<KeyPart>],
    right_keys: &[Vec<KeyPart>],
    left_map: &HashMap<&[KeyPart], Vec<usize>>,
    right_map: &HashMap<&[KeyPart], Vec<usize>>,
    how: JoinType,
) -> usize {
    match how {
        JoinType::Inner => fan_out(left_keys, right_map, false),
        JoinType::Left => fan_out(left_keys, right_map, true),
        JoinType::Right => fan_out(right_keys, left_map, true),
        JoinType::Outer => {
            let unmatched_right = right_keys
                .iter()
                .filter(|key| !left_map.contains_key(key.as_slice()))
                .count();
            fan_out(left_keys, right_map, true) + unmatched_right
        }
    }
}

fn fan_out(
    keys: &[Vec<KeyPart>],
    other: &HashMap<&[KeyPart], Vec<usize>>,
    keep_unmatched: bool,
) -> usize {
    keys.iter()
        .map(|key| match other.get(key.as_slice()) {
            Some(matches) => matches.len(),
            None if keep_unmatched => 1,
            None => 0,
        })
        .sum()
}

fn estimate_intermediate_bytes(output_rows: usize) -> usize {
    output_rows.saturating_mul(size_of::<RowPair>())
}
