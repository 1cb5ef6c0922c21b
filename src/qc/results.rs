//! Persisted quality control records.

use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::bail;
use anyhow::Context;
use serde_json::Map;
use serde_json::Value;

/// Token written for a metric that has no value.
pub const MISSING: &str = "NA";

/// A sample's quality control metrics as stored on disk: a flat JSON object
/// whose key order is the column order of the compiled QC table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QcRecord(Map<String, Value>);

impl QcRecord {
    /// Wraps an ordered map of metrics.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// The metric names, in order.
    pub fn header(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    /// A metric rendered for a table cell. Absent and `null` metrics render
    /// as [`MISSING`].
    pub fn cell(&self, key: &str) -> String {
        match self.0.get(key) {
            None | Some(Value::Null) => String::from(MISSING),
            Some(Value::String(s)) => s.clone(),
            Some(value) => value.to_string(),
        }
    }

    /// Attempts to write the record to `path`, creating the parent directory
    /// if needed.
    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory: {}", parent.display()))?;
        }

        let mut file = File::create(path)
            .with_context(|| format!("creating QC record: {}", path.display()))?;
        let output = serde_json::to_string_pretty(&self.0)?;
        file.write_all(output.as_bytes())?;

        Ok(())
    }

    /// Attempts to read a record from `path`.
    pub fn read(path: impl AsRef<Path>) -> anyhow::Result<QcRecord> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading QC record: {}", path.display()))?;

        match serde_json::from_str(&contents)? {
            Value::Object(fields) => Ok(QcRecord(fields)),
            _ => bail!("QC record is not a JSON object: {}", path.display()),
        }
    }
}
