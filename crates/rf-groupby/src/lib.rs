#![forbid(unsafe_code)]

//! Hierarchical grouping and null-skipping aggregation over [`Table`]s.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use rf_frame::{ErrorKind, FrameError, Table, validate_column_exists, validate_column_names};
use rf_index::Index;
use rf_types::{KeyEquality, KeyPart, Reduction, Scalar, reduce};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupByOptions {
    pub key_equality: KeyEquality,
    /// Skip value columns with no numeric value anywhere in the source table.
    pub numeric_only: bool,
}

#[derive(Debug, Error)]
pub enum GroupByError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("group_by requires at least one key column")]
    EmptyKeys,
    #[error("no group with key {key:?}")]
    UnknownGroup { key: Vec<String> },
}

impl GroupByError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Frame(err) => err.kind(),
            Self::EmptyKeys | Self::UnknownGroup { .. } => ErrorKind::Validation,
        }
    }
}

/// One group: the key values of its first row and its row positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub key: Vec<Scalar>,
    pub rows: Vec<usize>,
}

// ── Partition tree ─────────────────────────────────────────────────────

enum Node {
    Branch(Level),
    Leaf(Vec<usize>),
}

/// One key level; `order` records first-seen order of its children.
#[derive(Default)]
struct Level {
    order: Vec<KeyPart>,
    children: HashMap<KeyPart, Node>,
}

impl Level {
    fn insert(&mut self, parts: &[KeyPart], row: usize) {
        let Some((head, rest)) = parts.split_first() else {
            return;
        };
        let node = match self.children.entry(head.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                self.order.push(head.clone());
                entry.insert(if rest.is_empty() {
                    Node::Leaf(Vec::new())
                } else {
                    Node::Branch(Level::default())
                })
            }
        };
        match node {
            Node::Leaf(rows) => rows.push(row),
            Node::Branch(level) => level.insert(rest, row),
        }
    }

    /// Depth-first, each level in first-seen order.
    fn flatten_into(self, out: &mut Vec<Vec<usize>>) {
        let Self {
            order,
            mut children,
        } = self;
        for part in &order {
            match children.remove(part) {
                Some(Node::Leaf(rows)) => out.push(rows),
                Some(Node::Branch(level)) => level.flatten_into(out),
                None => {}
            }
        }
    }
}

// ── GroupBy ────────────────────────────────────────────────────────────

/// A table partitioned by one or more key columns.
///
/// Groups are computed once at construction; every aggregation reads the
/// same partition.
#[derive(Debug, Clone)]
pub struct GroupBy<'a> {
    table: &'a Table,
    keys: Vec<String>,
    key_positions: Vec<usize>,
    value_positions: Vec<usize>,
    groups: Vec<Group>,
    options: GroupByOptions,
}

/// Group `table` by `keys` with default options.
pub fn group_by<'a, S: AsRef<str>>(
    table: &'a Table,
    keys: &[S],
) -> Result<GroupBy<'a>, GroupByError> {
    GroupBy::new_with_options(table, keys, GroupByOptions::default())
}

impl<'a> GroupBy<'a> {
    pub fn new_with_options<S: AsRef<str>>(
        table: &'a Table,
        keys: &[S],
        options: GroupByOptions,
    ) -> Result<Self, GroupByError> {
        if keys.is_empty() {
            return Err(GroupByError::EmptyKeys);
        }
        validate_column_names(keys, None)?;
        let key_positions = keys
            .iter()
            .map(|key| validate_column_exists(key.as_ref(), table.columns()))
            .collect::<Result<Vec<_>, _>>()?;
        let keys: Vec<String> = keys.iter().map(|key| key.as_ref().to_owned()).collect();

        let value_positions = (0..table.cols())
            .filter(|pos| !key_positions.contains(pos))
            .filter(|&pos| !options.numeric_only || has_numeric(table, pos))
            .collect();

        let mut root = Level::default();
        for (row, values) in table.values().iter().enumerate() {
            let parts = options
                .key_equality
                .composite_key(key_positions.iter().map(|&pos| &values[pos]));
            root.insert(&parts, row);
        }
        let mut partitions = Vec::new();
        root.flatten_into(&mut partitions);

        let groups: Vec<Group> = partitions
            .into_iter()
            .map(|rows| {
                let first = &table.values()[rows[0]];
                Group {
                    key: key_positions.iter().map(|&pos| first[pos].clone()).collect(),
                    rows,
                }
            })
            .collect();

        tracing::debug!(
            keys = ?keys,
            input_rows = table.rows(),
            groups = groups.len(),
            "group_by"
        );

        Ok(Self {
            table,
            keys,
            key_positions,
            value_positions,
            groups,
            options,
        })
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    #[must_use]
    pub fn options(&self) -> GroupByOptions {
        self.options
    }

    #[must_use]
    pub fn ngroups(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Rows of the group whose key matches `key` under the configured
    /// equality, with their source index labels.
    pub fn get_group(&self, key: &[Scalar]) -> Result<Table, GroupByError> {
        let mode = self.options.key_equality;
        let wanted = mode.composite_key(key);
        let group = self
            .groups
            .iter()
            .find(|group| mode.composite_key(&group.key) == wanted)
            .ok_or_else(|| GroupByError::UnknownGroup {
                key: key.iter().map(ToString::to_string).collect(),
            })?;
        Ok(self.table.take_rows(&group.rows)?)
    }

    /// Key columns plus `count`, the number of rows in each group.
    ///
    /// When a key is itself named `count`, the size column takes the first
    /// free name of `count_1`, `count_2`, ...
    pub fn count(&self) -> Result<Table, GroupByError> {
        let mut columns = self.keys.clone();
        columns.push(size_column_name(&self.keys));
        let rows = self
            .groups
            .iter()
            .map(|group| {
                let mut row = group.key.clone();
                row.push(Scalar::Int64(group.rows.len() as i64));
                row
            })
            .collect();
        self.finish(columns, rows)
    }

    pub fn sum(&self) -> Result<Table, GroupByError> {
        self.agg(Reduction::Sum)
    }

    pub fn mean(&self) -> Result<Table, GroupByError> {
        self.agg(Reduction::Mean)
    }

    pub fn min(&self) -> Result<Table, GroupByError> {
        self.agg(Reduction::Min)
    }

    pub fn max(&self) -> Result<Table, GroupByError> {
        self.agg(Reduction::Max)
    }

    /// Sample standard deviation; null where a group has fewer than two
    /// numeric values.
    pub fn std(&self) -> Result<Table, GroupByError> {
        self.agg(Reduction::Std)
    }

    pub fn var(&self) -> Result<Table, GroupByError> {
        self.agg(Reduction::Var)
    }

    pub fn median(&self) -> Result<Table, GroupByError> {
        self.agg(Reduction::Median)
    }

    /// Reduce every non-key column of every group with `op`.
    ///
    /// `Count` yields the group-size table of [`GroupBy::count`].
    pub fn agg(&self, op: Reduction) -> Result<Table, GroupByError> {
        if op == Reduction::Count {
            return self.count();
        }

        let rows_data = self.table.values();
        let mut columns = self.keys.clone();
        columns.extend(
            self.value_positions
                .iter()
                .map(|&pos| self.table.columns()[pos].clone()),
        );

        let mut rows = Vec::with_capacity(self.groups.len());
        let mut gathered = Vec::new();
        for group in &self.groups {
            let mut row = group.key.clone();
            for &pos in &self.value_positions {
                gathered.clear();
                gathered.extend(group.rows.iter().map(|&r| rows_data[r][pos].clone()));
                row.push(reduce(&gathered, op));
            }
            tracing::trace!(
                op = op.name(),
                key = ?group.key,
                rows = group.rows.len(),
                "reduced group"
            );
            rows.push(row);
        }
        self.finish(columns, rows)
    }

    fn finish(&self, columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> Result<Table, GroupByError> {
        let index = Index::range(rows.len());
        Ok(Table::from_parts(columns, index, rows)?)
    }

    #[must_use]
    pub fn key_positions(&self) -> &[usize] {
        &self.key_positions
    }
}

fn size_column_name(keys: &[String]) -> String {
    let taken = |name: &str| keys.iter().any(|key| key == name);
    if !taken("count") {
        return "count".to_owned();
    }
    (1..)
        .map(|n| format!("count_{n}"))
        .find(|name| !taken(name))
        .unwrap_or_default()
}

fn has_numeric(table: &Table, pos: usize) -> bool {
    table
        .values()
        .iter()
        .any(|row| row[pos].coerce_numeric().is_some())
}

#[cfg(test)]
mod tests {
    use rf_frame::{ErrorKind, FrameError, Table};
    use rf_types::{KeyEquality, Reduction, Scalar};

    use super::{GroupBy, GroupByError, GroupByOptions, group_by};

    fn kv(rows: &[(&str, Scalar)]) -> Table {
        Table::new(
            rows.iter()
                .map(|(k, v)| vec![Scalar::from(*k), v.clone()])
                .collect(),
            Some(vec!["k".into(), "v".into()]),
        )
        .expect("table")
    }

    fn sales() -> Table {
        Table::new(
            vec![
                vec!["east".into(), "a".into(), 10.into()],
                vec!["west".into(), "a".into(), 5.into()],
                vec!["east".into(), "b".into(), 7.into()],
                vec!["east".into(), "a".into(), 2.into()],
                vec!["west".into(), "b".into(), "n/a".into()],
            ],
            Some(vec!["region".into(), "product".into(), "units".into()]),
        )
        .expect("sales")
    }

    #[test]
    fn mean_matches_manual_computation() {
        let table = kv(&[
            ("A", Scalar::Int64(1)),
            ("A", Scalar::Int64(3)),
            ("B", Scalar::Int64(10)),
        ]);
        let out = group_by(&table, &["k"]).expect("group").mean().expect("mean");
        assert_eq!(out.columns(), &["k", "v"]);
        assert_eq!(
            out.values(),
            &[
                vec![Scalar::from("A"), Scalar::Float64(2.0)],
                vec![Scalar::from("B"), Scalar::Float64(10.0)],
            ]
        );
    }

    #[test]
    fn groups_follow_first_seen_order() {
        let table = kv(&[
            ("b", Scalar::Int64(1)),
            ("a", Scalar::Int64(2)),
            ("b", Scalar::Int64(3)),
        ]);
        let grouped = group_by(&table, &["k"]).expect("group");
        assert_eq!(grouped.ngroups(), 2);
        assert_eq!(grouped.groups()[0].key, vec![Scalar::from("b")]);
        assert_eq!(grouped.groups()[0].rows, vec![0, 2]);
    }

    #[test]
    fn count_sums_to_row_total() {
        let table = sales();
        let out = group_by(&table, &["region"]).expect("group").count().expect("count");
        assert_eq!(out.columns(), &["region", "count"]);
        let total: i64 = out
            .values()
            .iter()
            .map(|row| match row[1] {
                Scalar::Int64(n) => n,
                _ => 0,
            })
            .sum();
        assert_eq!(total, table.rows() as i64);
    }

    #[test]
    fn multi_key_groups_enumerate_depth_first() {
        let table = sales();
        let grouped = group_by(&table, &["region", "product"]).expect("group");
        let keys: Vec<Vec<Scalar>> = grouped.groups().iter().map(|g| g.key.clone()).collect();
        assert_eq!(
            keys,
            vec![
                vec![Scalar::from("east"), Scalar::from("a")],
                vec![Scalar::from("east"), Scalar::from("b")],
                vec![Scalar::from("west"), Scalar::from("a")],
                vec![Scalar::from("west"), Scalar::from("b")],
            ]
        );
        let sums = grouped.sum().expect("sum");
        assert_eq!(sums.columns(), &["region", "product", "units"]);
        assert_eq!(sums.cell(0, "units").expect("cell"), &Scalar::Float64(12.0));
        assert_eq!(sums.cell(3, "units").expect("cell"), &Scalar::Null);
    }

    #[test]
    fn std_is_null_for_singleton_groups() {
        let table = kv(&[
            ("A", Scalar::Int64(1)),
            ("A", Scalar::Int64(3)),
            ("B", Scalar::Int64(10)),
        ]);
        let out = group_by(&table, &["k"]).expect("group").std().expect("std");
        let Scalar::Float64(a) = out.values()[0][1] else {
            panic!("expected Float64 for group A");
        };
        assert!((a - 2.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(out.values()[1][1], Scalar::Null);
    }

    #[test]
    fn non_numeric_columns_become_null_cells() {
        let table = Table::new(
            vec![
                vec!["x".into(), "apple".into(), 1.into()],
                vec!["x".into(), "pear".into(), "2".into()],
            ],
            Some(vec!["k".into(), "fruit".into(), "n".into()]),
        )
        .expect("table");
        let grouped = group_by(&table, &["k"]).expect("group");
        let out = grouped.max().expect("max");
        assert_eq!(out.columns(), &["k", "fruit", "n"]);
        assert_eq!(out.values()[0][1], Scalar::Null);
        assert_eq!(out.values()[0][2], Scalar::Float64(2.0));

        let numeric = GroupBy::new_with_options(
            &table,
            &["k"],
            GroupByOptions {
                numeric_only: true,
                ..GroupByOptions::default()
            },
        )
        .expect("group")
        .max()
        .expect("max");
        assert_eq!(numeric.columns(), &["k", "n"]);
    }

    #[test]
    fn stringified_keys_merge_number_and_text() {
        let table = Table::new(
            vec![
                vec![Scalar::Int64(1), Scalar::Int64(5)],
                vec![Scalar::from("1"), Scalar::Int64(7)],
            ],
            Some(vec!["k".into(), "v".into()]),
        )
        .expect("table");
        assert_eq!(group_by(&table, &["k"]).expect("group").ngroups(), 1);

        let typed = GroupBy::new_with_options(
            &table,
            &["k"],
            GroupByOptions {
                key_equality: KeyEquality::Typed,
                ..GroupByOptions::default()
            },
        )
        .expect("typed");
        assert_eq!(typed.ngroups(), 2);
    }

    #[test]
    fn signed_zero_keys_share_a_group() {
        let table = Table::new(
            vec![
                vec![Scalar::Float64(0.0), Scalar::Int64(1)],
                vec![Scalar::Float64(-0.0), Scalar::Int64(2)],
            ],
            Some(vec!["k".into(), "v".into()]),
        )
        .expect("table");
        let grouped = group_by(&table, &["k"]).expect("group");
        assert_eq!(grouped.ngroups(), 1);
        let sums = grouped.sum().expect("sum");
        assert_eq!(sums.cell(0, "v").expect("cell"), &Scalar::Float64(3.0));
    }

    #[test]
    fn empty_table_keeps_column_list() {
        let table = Table::new(Vec::new(), Some(vec!["k".into(), "v".into()])).expect("empty");
        let grouped = group_by(&table, &["k"]).expect("group");
        let counted = grouped.count().expect("count");
        assert_eq!(counted.shape(), (0, 2));
        assert_eq!(counted.columns(), &["k", "count"]);
        let summed = grouped.sum().expect("sum");
        assert_eq!(summed.columns(), &["k", "v"]);
        assert_eq!(summed.rows(), 0);
    }

    #[test]
    fn missing_key_fails_at_construction() {
        let table = sales();
        let err = group_by(&table, &["region", "store"]).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::ColumnNotFound);
        assert!(matches!(
            err,
            GroupByError::Frame(FrameError::ColumnNotFound { ref name, .. }) if name == "store"
        ));
        let err = group_by::<&str>(&table, &[]).expect_err("no keys");
        assert!(matches!(err, GroupByError::EmptyKeys));
    }

    #[test]
    fn get_group_returns_source_rows() {
        let table = sales();
        let grouped = group_by(&table, &["region"]).expect("group");
        let west = grouped.get_group(&[Scalar::from("west")]).expect("west");
        assert_eq!(west.rows(), 2);
        assert_eq!(west.index().labels()[0], 1_i64.into());
        let err = grouped.get_group(&[Scalar::from("north")]).expect_err("unknown");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn agg_dispatches_by_reduction() {
        let table = sales();
        let grouped = group_by(&table, &["region"]).expect("group");
        let median = grouped.agg(Reduction::Median).expect("median");
        assert_eq!(median.cell(0, "units").expect("cell"), &Scalar::Float64(7.0));
        assert_eq!(
            grouped.agg(Reduction::Count).expect("count"),
            grouped.count().expect("count")
        );
        let var = grouped.var().expect("var");
        assert_eq!(var.cell(1, "units").expect("cell"), &Scalar::Null);
    }

    #[test]
    fn count_renames_size_column_when_a_key_is_named_count() {
        let table = Table::new(
            vec![
                vec![Scalar::from(1), Scalar::from("a")],
                vec![Scalar::from(1), Scalar::from("b")],
                vec![Scalar::from(2), Scalar::from("c")],
            ],
            Some(vec!["count".into(), "count_1".into()]),
        )
        .expect("table");
        let counts = group_by(&table, &["count"])
            .expect("group")
            .count()
            .expect("count");
        assert_eq!(counts.columns(), &["count", "count_1"]);
        assert_eq!(counts.cell(0, "count_1").expect("size"), &Scalar::Int64(2));

        let counts = group_by(&table, &["count", "count_1"])
            .expect("group")
            .count()
            .expect("count");
        assert_eq!(counts.columns(), &["count", "count_1", "count_2"]);
        assert_eq!(counts.cell(2, "count_2").expect("size"), &Scalar::Int64(1));
    }

    #[test]
    fn duplicate_keys_fail_at_construction() {
        let table = sales();
        let err = group_by(&table, &["region", "region"]).expect_err("duplicate key");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(matches!(
            err,
            GroupByError::Frame(FrameError::DuplicateColumn(ref name)) if name == "region"
        ));
    }
}
