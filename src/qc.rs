//! Quality control metrics for a sample's alignments.
//!
//! Metrics are computed once per sample and persisted as a JSON
//! [`QcRecord`](results::QcRecord). A later run loads the persisted record
//! verbatim instead of recomputing it.

pub mod results;

use std::path::Path;

use anyhow::bail;
use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::info;

use crate::utils::display::RecordCounter;
use crate::utils::formats::bam;
use crate::utils::formats::bam::ParsedBAMFile;

use self::results::QcRecord;

/// Quality control metrics of one sample. Field order is the column order of
/// the compiled QC table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QcMetrics {
    /// Mapped reads in the primary alignment.
    pub num_mapped: u64,

    /// Uniquely mapped reads.
    pub num_unique_mapped: u64,

    /// Mapped reads left after reference subtraction.
    pub num_ref_subtracted: u64,

    /// `num_unique_mapped / num_mapped`, if anything mapped.
    pub perc_unique: Option<f64>,

    /// `num_ref_subtracted / num_mapped`, if anything mapped.
    pub perc_ref_subtracted: Option<f64>,

    /// Uniquely mapped reads left after de-duplication (crosslinking only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_dedup_unique: Option<u64>,
}

/// The alignments metrics are computed from.
#[derive(Clone, Copy, Debug)]
pub struct QcInputs<'a> {
    /// The primary alignment.
    pub alignment: &'a Path,

    /// The unique subset.
    pub unique: &'a Path,

    /// The reference-subtracted subset.
    pub reference_subtracted: &'a Path,

    /// The de-duplicated unique subset, when there is one.
    pub dedup_unique: Option<&'a Path>,
}

fn fraction(part: u64, whole: u64) -> Option<f64> {
    if whole == 0 {
        return None;
    }

    Some(part as f64 / whole as f64)
}

impl QcMetrics {
    /// Derives the metrics from counts of mapped reads.
    pub fn from_counts(
        mapped: u64,
        unique: u64,
        reference_subtracted: u64,
        dedup_unique: Option<u64>,
    ) -> Self {
        Self {
            num_mapped: mapped,
            num_unique_mapped: unique,
            num_ref_subtracted: reference_subtracted,
            perc_unique: fraction(unique, mapped),
            perc_ref_subtracted: fraction(reference_subtracted, mapped),
            num_dedup_unique: dedup_unique,
        }
    }

    /// Computes the metrics by reading each alignment once.
    pub fn compute(inputs: QcInputs<'_>) -> anyhow::Result<Self> {
        let mapped = count_mapped_reads(inputs.alignment)?;
        let unique = count_mapped_reads(inputs.unique)?;
        let reference_subtracted = count_mapped_reads(inputs.reference_subtracted)?;
        let dedup_unique = inputs.dedup_unique.map(count_mapped_reads).transpose()?;

        Ok(Self::from_counts(
            mapped,
            unique,
            reference_subtracted,
            dedup_unique,
        ))
    }

    /// Converts the metrics into a record for persisting.
    pub fn to_record(&self) -> anyhow::Result<QcRecord> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(QcRecord::new(fields)),
            other => bail!("metrics did not serialize to an object: {}", other),
        }
    }
}

/// Counts mapped reads: records that are neither unmapped, secondary, nor
/// supplementary, so each read counts once however often it aligned.
pub fn count_mapped_reads(src: &Path) -> anyhow::Result<u64> {
    debug!("counting mapped reads in {}", src.display());

    let ParsedBAMFile { mut reader, .. } = bam::open_and_parse(src)?;
    let mut counter = RecordCounter::new("records");
    let mut mapped = 0;

    for result in reader.records() {
        let record = result.with_context(|| format!("reading record from {}", src.display()))?;
        counter.inc();

        let flags = record.flags();
        if !flags.is_unmapped() && !flags.is_secondary() && !flags.is_supplementary() {
            mapped += 1;
        }
    }

    info!(
        "{}: {} mapped reads in {} records",
        src.display(),
        mapped,
        counter.formatted()
    );

    Ok(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_order_and_fractions() {
        let metrics = QcMetrics::from_counts(200, 50, 150, None);
        assert_eq!(metrics.perc_unique, Some(0.25));
        assert_eq!(metrics.perc_ref_subtracted, Some(0.75));

        let record = metrics.to_record().unwrap();
        assert_eq!(
            record.header(),
            [
                "num_mapped",
                "num_unique_mapped",
                "num_ref_subtracted",
                "perc_unique",
                "perc_ref_subtracted"
            ]
        );
    }

    #[test]
    fn test_dedup_metric_for_crosslinking() {
        let record = QcMetrics::from_counts(0, 0, 0, Some(0)).to_record().unwrap();
        assert_eq!(record.header().last(), Some(&"num_dedup_unique"));
        assert_eq!(record.cell("perc_unique"), "NA");
    }
}
