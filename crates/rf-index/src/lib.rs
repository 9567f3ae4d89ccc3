#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IndexLabel {
    Int64(i64),
    Utf8(String),
}

impl From<i64> for IndexLabel {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<&str> for IndexLabel {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for IndexLabel {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl fmt::Display for IndexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
        }
    }
}

/// Ordered row identifiers. Labels are opaque to table operations; only the
/// length has to agree with the row count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Index {
    labels: Vec<IndexLabel>,
}

impl Index {
    #[must_use]
    pub fn new(labels: Vec<IndexLabel>) -> Self {
        Self { labels }
    }

    /// `0..len` integer labels.
    #[must_use]
    pub fn range(len: usize) -> Self {
        Self::new((0..len as i64).map(IndexLabel::Int64).collect())
    }

    #[must_use]
    pub fn from_i64(values: Vec<i64>) -> Self {
        Self::new(values.into_iter().map(IndexLabel::from).collect())
    }

    #[must_use]
    pub fn from_utf8(values: Vec<String>) -> Self {
        Self::new(values.into_iter().map(IndexLabel::from).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn labels(&self) -> &[IndexLabel] {
        &self.labels
    }

    #[must_use]
    pub fn get(&self, position: usize) -> Option<&IndexLabel> {
        self.labels.get(position)
    }

    /// First position holding `needle`.
    #[must_use]
    pub fn position(&self, needle: &IndexLabel) -> Option<usize> {
        self.labels.iter().position(|label| label == needle)
    }

    /// Labels at `positions`, in that order. Out-of-range positions are skipped.
    #[must_use]
    pub fn take(&self, positions: &[usize]) -> Self {
        Self::new(
            positions
                .iter()
                .filter_map(|&pos| self.labels.get(pos).cloned())
                .collect(),
        )
    }

    /// The first `n` labels, or all of them when `n` exceeds the length.
    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        Self::new(self.labels.iter().take(n).cloned().collect())
    }

    /// The last `n` labels, or all of them when `n` exceeds the length.
    #[must_use]
    pub fn tail(&self, n: usize) -> Self {
        let start = self.labels.len().saturating_sub(n);
        Self::new(self.labels[start..].to_vec())
    }

    #[must_use]
    pub fn concat(indexes: &[&Self]) -> Self {
        let total: usize = indexes.iter().map(|index| index.len()).sum();
        let mut labels = Vec::with_capacity(total);
        for index in indexes {
            labels.extend_from_slice(&index.labels);
        }
        Self::new(labels)
    }

    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        let mut seen = std::collections::HashSet::with_capacity(self.labels.len());
        self.labels.iter().any(|label| !seen.insert(label))
    }
}

impl FromIterator<IndexLabel> for Index {
    fn from_iter<T: IntoIterator<Item = IndexLabel>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
