/*!
Per-record entry counts produced by every backup and restore.
*/

use crate::error::RecordFailure;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::fmt;

/// Aggregate result of an operation that did not fail fatally.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Every attempted record was handled
    Complete,
    /// At least one record failed and was counted as zero
    Partial,
}

impl Outcome {
    pub fn from_failures(failures: &[RecordFailure]) -> Self {
        if failures.is_empty() {
            Self::Complete
        } else {
            Self::Partial
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => f.write_str("complete"),
            Self::Partial => f.write_str("partial"),
        }
    }
}

/// Number of entries a JSON record value contributes.
///
/// Arrays count their elements, `null` counts zero and any other value counts
/// as a single entry.
pub fn entry_count(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::Array(items) => items.len(),
        _ => 1,
    }
}

/// Mapping from record name to entry count, kept in catalog order.
///
/// The core always returns one entry per record the operation attempted,
/// zeros included. Use [`Statistics::non_zero`] when presenting the numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    counts: Vec<(String, usize)>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the count for a record, replacing any earlier value.
    pub fn record<S: Into<String>>(&mut self, name: S, count: usize) {
        let name = name.into();
        match self.counts.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = count,
            None => self.counts.push((name, count)),
        }
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.counts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| *c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(n, c)| (n.as_str(), *c))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all entry counts.
    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, c)| c).sum()
    }

    /// Number of records that contributed at least one entry.
    pub fn populated(&self) -> usize {
        self.counts.iter().filter(|(_, c)| *c > 0).count()
    }

    /// Entries with a non-zero count, for display.
    pub fn non_zero(&self) -> impl Iterator<Item = (&str, usize)> {
        self.iter().filter(|(_, c)| *c > 0)
    }
}

impl Serialize for Statistics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len()))?;
        for (name, count) in &self.counts {
            map.serialize_entry(name, count)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Statistics {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StatisticsVisitor;

        impl<'de> Visitor<'de> for StatisticsVisitor {
            type Value = Statistics;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of record names to entry counts")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Statistics, A::Error> {
                let mut stats = Statistics::new();
                while let Some((name, count)) = access.next_entry::<String, usize>()? {
                    stats.record(name, count);
                }
                Ok(stats)
            }
        }

        deserializer.deserialize_map(StatisticsVisitor)
    }
}
