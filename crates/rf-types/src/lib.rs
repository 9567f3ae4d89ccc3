#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Null,
    Bool,
    Int64,
    Float64,
    Utf8,
    Date,
}

/// Coarse classification of a value sequence, ignoring nulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Null,
    Numeric,
    String,
    Boolean,
    Date,
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Date(NaiveDateTime),
}

impl Scalar {
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Null => DType::Null,
            Self::Bool(_) => DType::Bool,
            Self::Int64(_) => DType::Int64,
            Self::Float64(_) => DType::Float64,
            Self::Utf8(_) => DType::Utf8,
            Self::Date(_) => DType::Date,
        }
    }

    /// Null or a NaN float.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float64(a), Self::Float64(b)) => (a.is_nan() && b.is_nan()) || (a == b),
            (Self::Null, Self::Float64(v)) | (Self::Float64(v), Self::Null) => v.is_nan(),
            _ => self == other,
        }
    }

    #[must_use]
    pub fn coalesce(&self, other: &Self) -> Self {
        if self.is_missing() {
            other.clone()
        } else {
            self.clone()
        }
    }

    /// Strict numeric view: numbers and booleans only.
    pub fn to_f64(&self) -> Result<f64, TypeError> {
        match self {
            Self::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            Self::Null => Err(TypeError::ValueIsMissing),
            Self::Utf8(v) => Err(TypeError::NonNumericValue {
                value: v.clone(),
                dtype: DType::Utf8,
            }),
            Self::Date(v) => Err(TypeError::NonNumericValue {
                value: v.to_string(),
                dtype: DType::Date,
            }),
        }
    }

    /// Lenient numeric view used by every reduction.
    ///
    /// Numbers, booleans (1/0) and numeric strings coerce; nulls, NaN, dates
    /// and other strings yield `None`.
    #[must_use]
    pub fn coerce_numeric(&self) -> Option<f64> {
        let value = match self {
            Self::Bool(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Int64(v) => *v as f64,
            Self::Float64(v) => *v,
            Self::Utf8(v) => parse_numeric_str(v)?,
            Self::Null | Self::Date(_) => return None,
        };
        (!value.is_nan()).then_some(value)
    }
}

fn parse_numeric_str(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => f.write_str(v),
            Self::Date(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Int64(i64::from(value))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl From<NaiveDateTime> for Scalar {
    fn from(value: NaiveDateTime) -> Self {
        Self::Date(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("value {value:?} has non-numeric dtype {dtype:?}")]
    NonNumericValue { value: String, dtype: DType },
    #[error("value is missing")]
    ValueIsMissing,
    #[error("unknown reduction '{name}'; expected one of {valid:?}")]
    UnknownReduction {
        name: String,
        valid: &'static [&'static str],
    },
}

pub fn infer_kind(values: &[Scalar]) -> ValueKind {
    let mut current = ValueKind::Null;
    for value in values {
        let kind = match value {
            Scalar::Null => continue,
            Scalar::Float64(v) if v.is_nan() => continue,
            Scalar::Int64(_) | Scalar::Float64(_) => ValueKind::Numeric,
            Scalar::Bool(_) => ValueKind::Boolean,
            Scalar::Utf8(_) => ValueKind::String,
            Scalar::Date(_) => ValueKind::Date,
        };
        current = match current {
            ValueKind::Null => kind,
            same if same == kind => same,
            _ => return ValueKind::Mixed,
        };
    }
    current
}

// ── Key canonicalization ───────────────────────────────────────────────

/// How grouping and join keys decide equality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEquality {
    /// Values compare by their display string, so `1` and `"1"` match.
    #[default]
    Stringified,
    /// Values compare by dtype and value.
    Typed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Repr(String),
    Null,
    Bool(bool),
    Int64(i64),
    FloatBits(u64),
    Utf8(String),
    Date(NaiveDateTime),
}

impl KeyEquality {
    #[must_use]
    pub fn key_part(self, value: &Scalar) -> KeyPart {
        match self {
            Self::Stringified => match value {
                // -0.0 prints as "-0"; fold it into the "0" key.
                Scalar::Float64(v) if *v == 0.0 => KeyPart::Repr(0.0_f64.to_string()),
                other => KeyPart::Repr(other.to_string()),
            },
            Self::Typed => match value {
                Scalar::Null => KeyPart::Null,
                Scalar::Bool(v) => KeyPart::Bool(*v),
                Scalar::Int64(v) => KeyPart::Int64(*v),
                Scalar::Float64(v) => KeyPart::FloatBits(canonical_float_bits(*v)),
                Scalar::Utf8(v) => KeyPart::Utf8(v.clone()),
                Scalar::Date(v) => KeyPart::Date(*v),
            },
        }
    }

    #[must_use]
    pub fn composite_key<'a, I>(self, values: I) -> Vec<KeyPart>
    where
        I: IntoIterator<Item = &'a Scalar>,
    {
        values.into_iter().map(|value| self.key_part(value)).collect()
    }
}

fn canonical_float_bits(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else if value == 0.0 {
        0.0_f64.to_bits()
    } else {
        value.to_bits()
    }
}

// ── Nanops: null-skipping numeric reductions ───────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    Count,
    Sum,
    Mean,
    Min,
    Max,
    Std,
    Var,
    Median,
}

impl Reduction {
    pub const NAMES: &'static [&'static str] =
        &["count", "sum", "mean", "min", "max", "std", "var", "median"];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::Std => "std",
            Self::Var => "var",
            Self::Median => "median",
        }
    }
}

impl FromStr for Reduction {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count" => Ok(Self::Count),
            "sum" => Ok(Self::Sum),
            "mean" => Ok(Self::Mean),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "std" => Ok(Self::Std),
            "var" => Ok(Self::Var),
            "median" => Ok(Self::Median),
            other => Err(TypeError::UnknownReduction {
                name: other.to_owned(),
                valid: Self::NAMES,
            }),
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn numeric_values<'a, I>(values: I) -> Vec<f64>
where
    I: IntoIterator<Item = &'a Scalar>,
{
    values.into_iter().filter_map(Scalar::coerce_numeric).collect()
}

fn float_or_null(value: Option<f64>) -> Scalar {
    value.map_or(Scalar::Null, Scalar::Float64)
}

pub fn nancount(values: &[Scalar]) -> Scalar {
    let n = values.iter().filter(|v| !v.is_missing()).count();
    Scalar::Int64(n as i64)
}

pub fn nansum(values: &[Scalar]) -> Scalar {
    float_or_null(sum_of(&numeric_values(values)))
}

pub fn nanmean(values: &[Scalar]) -> Scalar {
    float_or_null(mean_of(&numeric_values(values)))
}

pub fn nanmin(values: &[Scalar]) -> Scalar {
    float_or_null(numeric_values(values).into_iter().reduce(f64::min))
}

pub fn nanmax(values: &[Scalar]) -> Scalar {
    float_or_null(numeric_values(values).into_iter().reduce(f64::max))
}

pub fn nanvar(values: &[Scalar], ddof: usize) -> Scalar {
    float_or_null(var_of(&numeric_values(values), ddof))
}

pub fn nanstd(values: &[Scalar], ddof: usize) -> Scalar {
    float_or_null(var_of(&numeric_values(values), ddof).map(f64::sqrt))
}

pub fn nanmedian(values: &[Scalar]) -> Scalar {
    let mut nums = numeric_values(values);
    if nums.is_empty() {
        return Scalar::Null;
    }
    nums.sort_by(f64::total_cmp);
    let mid = nums.len() / 2;
    if nums.len().is_multiple_of(2) {
        Scalar::Float64((nums[mid - 1] + nums[mid]) / 2.0)
    } else {
        Scalar::Float64(nums[mid])
    }
}

/// Apply `op` with sample (ddof=1) semantics for `Std` and `Var`.
pub fn reduce(values: &[Scalar], op: Reduction) -> Scalar {
    match op {
        Reduction::Count => nancount(values),
        Reduction::Sum => nansum(values),
        Reduction::Mean => nanmean(values),
        Reduction::Min => nanmin(values),
        Reduction::Max => nanmax(values),
        Reduction::Std => nanstd(values, 1),
        Reduction::Var => nanvar(values, 1),
        Reduction::Median => nanmedian(values),
    }
}

fn sum_of(nums: &[f64]) -> Option<f64> {
    (!nums.is_empty()).then(|| nums.iter().sum())
}

fn mean_of(nums: &[f64]) -> Option<f64> {
    sum_of(nums).map(|total| total / nums.len() as f64)
}

fn var_of(nums: &[f64], ddof: usize) -> Option<f64> {
    if nums.len() <= ddof {
        return None;
    }
    let mean = mean_of(nums)?;
    let sum_sq: f64 = nums.iter().map(|x| (x - mean).powi(2)).sum();
    Some(sum_sq / (nums.len() - ddof) as f64)
}
