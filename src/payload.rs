//! Submission payload: an ordered list of free-form records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Record key holding the display name of the person addressed.
pub const DISPLAY_NAME_KEY: &str = "firstName";
/// Record key holding the organization name.
pub const ORGANIZATION_KEY: &str = "companyName";

/// Used when a record has no display name.
pub const DEFAULT_DISPLAY_NAME: &str = "there";
/// Used when a record has no organization name.
pub const DEFAULT_ORGANIZATION: &str = "your company";

/// A record value: the payload only carries strings and numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{s}"),
            FieldValue::Number(n) => write!(f, "{n}"),
        }
    }
}

pub type Record = BTreeMap<String, FieldValue>;

/// The input of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub records: Vec<Record>,
}

impl Payload {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record the run's context is derived from.
    pub fn primary(&self) -> Option<&Record> {
        self.records.first()
    }
}

/// Read `key` from `record` as text; blank values count as missing.
pub fn field(record: &Record, key: &str) -> Option<String> {
    record
        .get(key)
        .map(|v| v.to_string())
        .filter(|s| !s.trim().is_empty())
}
