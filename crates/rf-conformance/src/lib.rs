#![forbid(unsafe_code)]

//! Fixture-driven conformance harness.
//!
//! Each JSON file under `fixtures/cases/` describes one operation on plain
//! JSON tables and either the expected output table or the expected error
//! kind. The harness runs every case and reports pass/fail per case.

use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Once,
    time::Instant,
};

use rf_frame::{ErrorKind, FrameError, RowView, Table, concat_with_axis};
use rf_groupby::{GroupBy, GroupByError, GroupByOptions};
use rf_join::{JoinError, JoinType, MergeOptions, Suffixes, merge_with_options};
use rf_types::{KeyEquality, Reduction, Scalar};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Absolute tolerance for float cells when comparing against fixtures.
pub const FLOAT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub fixture_root: PathBuf,
    /// Run only cases whose id contains this substring.
    pub case_filter: Option<String>,
    pub require_green: bool,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        Self {
            fixture_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures"),
            case_filter: None,
            require_green: false,
        }
    }

    #[must_use]
    pub fn case_fixture_root(&self) -> PathBuf {
        self.fixture_root.join("cases")
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("fixture format error: {0}")]
    FixtureFormat(String),
    #[error("conformance gate failed: {failed} of {total} cases failed")]
    GateFailed { failed: usize, total: usize },
}

static INIT: Once = Once::new();

/// Initialize tracing for test binaries. Safe to call multiple times.
pub fn init_tracing_for_tests() {
    INIT.call_once(|| {
        use tracing_subscriber::filter::EnvFilter;
        use tracing_subscriber::fmt;
        let filter = match std::env::var("RUST_LOG") {
            Ok(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            Err(_) => EnvFilter::new("info"),
        };
        fmt().with_env_filter(filter).with_target(false).init();
    });
}

// ── Fixture model ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureOperation {
    Construct,
    Select,
    Filter,
    GroupBy,
    Merge,
    Concat,
}

/// A table as plain JSON: optional column names and rows of JSON values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureTable {
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

impl FixtureTable {
    pub fn to_table(&self) -> Result<Table, HarnessError> {
        let rows = self
            .rows
            .iter()
            .map(|row| row.iter().map(json_to_scalar).collect::<Result<Vec<_>, _>>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Table::new(rows, self.columns.clone())?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    IsNull,
    NotNull,
}

/// One comparison against a column; a filter keeps rows matching all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixturePredicate {
    pub column: String,
    pub op: PredicateOp,
    #[serde(default)]
    pub value: Value,
}

impl FixturePredicate {
    pub fn evaluate(&self, row: &RowView<'_>) -> Result<bool, FrameError> {
        let cell = row.get(&self.column)?;
        let operand =
            json_to_scalar(&self.value).map_err(|err| FrameError::Rejected(err.to_string()))?;
        let keys = KeyEquality::Stringified;
        Ok(match self.op {
            PredicateOp::IsNull => cell.is_missing(),
            PredicateOp::NotNull => !cell.is_missing(),
            PredicateOp::Eq => keys.key_part(cell) == keys.key_part(&operand),
            PredicateOp::Ne => keys.key_part(cell) != keys.key_part(&operand),
            ordered => match (cell.coerce_numeric(), operand.coerce_numeric()) {
                (Some(lhs), Some(rhs)) => match ordered {
                    PredicateOp::Gt => lhs > rhs,
                    PredicateOp::Ge => lhs >= rhs,
                    PredicateOp::Lt => lhs < rhs,
                    _ => lhs <= rhs,
                },
                _ => false,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureCase {
    pub case_id: String,
    pub operation: FixtureOperation,
    #[serde(default)]
    pub frame: Option<FixtureTable>,
    #[serde(default)]
    pub frame_right: Option<FixtureTable>,
    #[serde(default)]
    pub tables: Vec<FixtureTable>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub predicates: Vec<FixturePredicate>,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub reduction: Option<String>,
    #[serde(default)]
    pub how: Option<String>,
    #[serde(default)]
    pub suffixes: Option<Vec<String>>,
    #[serde(default)]
    pub axis: Option<i64>,
    #[serde(default)]
    pub key_equality: KeyEquality,
    #[serde(default)]
    pub expected: Option<FixtureTable>,
    /// Snake-case error kind, e.g. `"column_not_found"`.
    #[serde(default)]
    pub expected_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: String,
    pub operation: FixtureOperation,
    pub status: CaseStatus,
    pub mismatch: Option<String>,
    pub elapsed_us: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub suite: String,
    pub fixture_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<CaseResult>,
}

impl SuiteReport {
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.failed == 0 && self.fixture_count > 0
    }
}

// ── Running ────────────────────────────────────────────────────────────

pub fn run_fixture_suite(config: &HarnessConfig) -> Result<SuiteReport, HarnessError> {
    let fixtures = load_fixtures(config)?;
    let results: Vec<CaseResult> = fixtures.iter().map(run_fixture_case).collect();
    let passed = results
        .iter()
        .filter(|result| result.status == CaseStatus::Pass)
        .count();
    let report = SuiteReport {
        suite: "rowframe_cases".to_owned(),
        fixture_count: results.len(),
        passed,
        failed: results.len() - passed,
        results,
    };
    tracing::info!(
        fixtures = report.fixture_count,
        passed = report.passed,
        failed = report.failed,
        "fixture suite finished"
    );
    Ok(report)
}

/// Fail when any case failed or no case ran.
pub fn enforce_green(report: &SuiteReport) -> Result<(), HarnessError> {
    if report.is_green() {
        Ok(())
    } else {
        Err(HarnessError::GateFailed {
            failed: report.failed,
            total: report.fixture_count,
        })
    }
}

pub fn run_fixture_case(fixture: &FixtureCase) -> CaseResult {
    let started = Instant::now();
    let mismatch = check_fixture(fixture).err();
    let elapsed_us = (started.elapsed().as_micros() as u64).max(1);
    if let Some(reason) = &mismatch {
        tracing::warn!(case_id = %fixture.case_id, %reason, "fixture mismatch");
    } else {
        tracing::debug!(case_id = %fixture.case_id, elapsed_us, "fixture passed");
    }
    CaseResult {
        case_id: fixture.case_id.clone(),
        operation: fixture.operation,
        status: if mismatch.is_none() {
            CaseStatus::Pass
        } else {
            CaseStatus::Fail
        },
        mismatch,
        elapsed_us,
    }
}

/// Outcome of executing a fixture: a table, or an operation error kind.
enum Outcome {
    Table(Table),
    Error { kind: ErrorKind, message: String },
}

fn check_fixture(fixture: &FixtureCase) -> Result<(), String> {
    let outcome = execute_fixture(fixture).map_err(|err| format!("fixture setup failed: {err}"))?;
    match (outcome, &fixture.expected, &fixture.expected_error) {
        (Outcome::Table(actual), Some(expected), None) => {
            let expected = expected
                .to_table()
                .map_err(|err| format!("expected table is invalid: {err}"))?;
            compare_tables(&actual, &expected)
        }
        (Outcome::Error { kind, message }, None, Some(expected_kind)) => {
            let actual_kind = error_kind_name(kind);
            if actual_kind == expected_kind.as_str() {
                Ok(())
            } else {
                Err(format!(
                    "expected {expected_kind} error, got {actual_kind}: {message}"
                ))
            }
        }
        (Outcome::Table(actual), None, Some(expected_kind)) => Err(format!(
            "expected {expected_kind} error, got table with shape {:?}",
            actual.shape()
        )),
        (Outcome::Error { kind, message }, Some(_), None) => Err(format!(
            "expected table, got {} error: {message}",
            error_kind_name(kind)
        )),
        _ => Err("fixture must set exactly one of expected / expected_error".to_owned()),
    }
}

fn execute_fixture(fixture: &FixtureCase) -> Result<Outcome, HarnessError> {
    let outcome = match fixture.operation {
        FixtureOperation::Construct => {
            let frame = require(&fixture.frame, "frame")?;
            let rows = frame
                .rows
                .iter()
                .map(|row| row.iter().map(json_to_scalar).collect::<Result<Vec<_>, _>>())
                .collect::<Result<Vec<_>, _>>()?;
            frame_outcome(Table::new(rows, frame.columns.clone()))
        }
        FixtureOperation::Select => {
            let table = require(&fixture.frame, "frame")?.to_table()?;
            let names: Vec<&str> = fixture.columns.iter().map(String::as_str).collect();
            frame_outcome(table.select(&names))
        }
        FixtureOperation::Filter => {
            let table = require(&fixture.frame, "frame")?.to_table()?;
            frame_outcome(table.filter(|row| {
                for predicate in &fixture.predicates {
                    if !predicate.evaluate(row)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }))
        }
        FixtureOperation::GroupBy => {
            let table = require(&fixture.frame, "frame")?.to_table()?;
            let name = require(&fixture.reduction, "reduction")?;
            let op = Reduction::from_str(name).map_err(FrameError::from)?;
            let options = GroupByOptions {
                key_equality: fixture.key_equality,
                ..GroupByOptions::default()
            };
            groupby_outcome(
                GroupBy::new_with_options(&table, &fixture.keys, options)
                    .and_then(|grouped| grouped.agg(op)),
            )
        }
        FixtureOperation::Merge => {
            let left = require(&fixture.frame, "frame")?.to_table()?;
            let right = require(&fixture.frame_right, "frame_right")?.to_table()?;
            join_outcome(merge_fixture(fixture, &left, &right))
        }
        FixtureOperation::Concat => {
            let tables = fixture
                .tables
                .iter()
                .map(FixtureTable::to_table)
                .collect::<Result<Vec<_>, _>>()?;
            let refs: Vec<&Table> = tables.iter().collect();
            frame_outcome(concat_with_axis(&refs, fixture.axis.unwrap_or(0)))
        }
    };
    Ok(outcome)
}

fn merge_fixture(fixture: &FixtureCase, left: &Table, right: &Table) -> Result<Table, JoinError> {
    let how = match &fixture.how {
        Some(how) => how.parse::<JoinType>()?,
        None => JoinType::default(),
    };
    let suffixes = match &fixture.suffixes {
        Some(values) => Suffixes::try_from(values.clone())?,
        None => Suffixes::default(),
    };
    let options = MergeOptions {
        how,
        suffixes,
        key_equality: fixture.key_equality,
        ..MergeOptions::default()
    };
    merge_with_options(left, right, &fixture.keys, &options)
}

fn require<'a, T>(value: &'a Option<T>, field: &str) -> Result<&'a T, HarnessError> {
    value
        .as_ref()
        .ok_or_else(|| HarnessError::FixtureFormat(format!("missing field '{field}'")))
}

fn frame_outcome(result: Result<Table, FrameError>) -> Outcome {
    match result {
        Ok(table) => Outcome::Table(table),
        Err(err) => Outcome::Error {
            kind: err.kind(),
            message: err.to_string(),
        },
    }
}

fn groupby_outcome(result: Result<Table, GroupByError>) -> Outcome {
    match result {
        Ok(table) => Outcome::Table(table),
        Err(err) => Outcome::Error {
            kind: err.kind(),
            message: err.to_string(),
        },
    }
}

fn join_outcome(result: Result<Table, JoinError>) -> Outcome {
    match result {
        Ok(table) => Outcome::Table(table),
        Err(err) => Outcome::Error {
            kind: err.kind(),
            message: err.to_string(),
        },
    }
}

#[must_use]
pub fn error_kind_name(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Structural => "structural",
        ErrorKind::Validation => "validation",
        ErrorKind::ColumnNotFound => "column_not_found",
        ErrorKind::IndexOutOfRange => "index_out_of_range",
        ErrorKind::Callback => "callback",
    }
}

// ── Comparison ─────────────────────────────────────────────────────────

/// Compare column names, row count and every cell; floats within
/// [`FLOAT_TOLERANCE`], integers and floats compared numerically.
pub fn compare_tables(actual: &Table, expected: &Table) -> Result<(), String> {
    if actual.columns() != expected.columns() {
        return Err(format!(
            "columns mismatch: actual={:?}, expected={:?}",
            actual.columns(),
            expected.columns()
        ));
    }
    if actual.rows() != expected.rows() {
        return Err(format!(
            "row count mismatch: actual={}, expected={}",
            actual.rows(),
            expected.rows()
        ));
    }
    for (row, (lhs, rhs)) in actual.values().iter().zip(expected.values()).enumerate() {
        for (col, (a, e)) in lhs.iter().zip(rhs).enumerate() {
            if !cells_match(a, e) {
                return Err(format!(
                    "cell mismatch at row {row}, column '{}': actual={a:?}, expected={e:?}",
                    actual.columns()[col]
                ));
            }
        }
    }
    Ok(())
}

fn cells_match(actual: &Scalar, expected: &Scalar) -> bool {
    match (actual, expected) {
        (Scalar::Int64(_) | Scalar::Float64(_), Scalar::Int64(_) | Scalar::Float64(_)) => {
            match (actual.coerce_numeric(), expected.coerce_numeric()) {
                (Some(a), Some(e)) => (a - e).abs() <= FLOAT_TOLERANCE,
                (None, None) => true,
                _ => false,
            }
        }
        _ => actual.semantic_eq(expected),
    }
}

/// Plain JSON to a scalar: integers become `Int64`, other numbers `Float64`.
pub fn json_to_scalar(value: &Value) -> Result<Scalar, HarnessError> {
    match value {
        Value::Null => Ok(Scalar::Null),
        Value::Bool(v) => Ok(Scalar::Bool(*v)),
        Value::Number(n) => match n.as_i64() {
            Some(v) => Ok(Scalar::Int64(v)),
            None => n.as_f64().map(Scalar::Float64).ok_or_else(|| {
                HarnessError::FixtureFormat(format!("number {n} does not fit i64 or f64"))
            }),
        },
        Value::String(v) => Ok(Scalar::Utf8(v.clone())),
        Value::Array(_) | Value::Object(_) => Err(HarnessError::FixtureFormat(format!(
            "nested value {value} is not a table cell"
        ))),
    }
}

// ── Loading ────────────────────────────────────────────────────────────

pub fn load_fixtures(config: &HarnessConfig) -> Result<Vec<FixtureCase>, HarnessError> {
    let fixture_files = list_fixture_files(&config.case_fixture_root())?;
    let mut fixtures = Vec::with_capacity(fixture_files.len());
    for fixture_path in fixture_files {
        let fixture = load_fixture(&fixture_path)?;
        if config
            .case_filter
            .as_deref()
            .is_none_or(|filter| fixture.case_id.contains(filter))
        {
            fixtures.push(fixture);
        }
    }
    fixtures.sort_by(|a, b| a.case_id.cmp(&b.case_id));
    Ok(fixtures)
}

fn load_fixture(path: &Path) -> Result<FixtureCase, HarnessError> {
    let body = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&body)?)
}

fn list_fixture_files(root: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
