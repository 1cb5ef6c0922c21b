//! Cross-sample aggregation, run once every sample job has finished.

use std::fs;
use std::path::PathBuf;

use anyhow::bail;
use anyhow::Context;
use tracing::info;
use tracing::warn;

use crate::errors::PipelineError;
use crate::layout::OutputLayout;
use crate::qc::results::QcRecord;
use crate::quantification::annotation::AnnotationSet;
use crate::quantification::table::QuantificationTable;
use crate::sample::Sample;

/// Compiles every sample's QC record into `qc/qc_stats.txt`.
///
/// The columns are `sample` followed by the metric names of the first
/// sample's record; every other sample is assumed to report the same
/// metrics. A sample without a record gets a row of `NA`.
pub fn compile_qc(samples: &[Sample], layout: &OutputLayout) -> anyhow::Result<PathBuf> {
    info!("Compiling QC output for all samples...");

    if samples.is_empty() {
        bail!("no samples to compile QC for");
    }

    let mut records = Vec::with_capacity(samples.len());
    for sample in samples {
        let path = layout.qc_record(&sample.label);

        if path.exists() {
            records.push(Some(QcRecord::read(&path)?));
        } else {
            warn!("No QC record for {} at {}", sample.label, path.display());
            records.push(None);
        }
    }

    let header = match records.iter().flatten().next() {
        Some(record) => record
            .header()
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>(),
        None => bail!(PipelineError::MissingInput(layout.qc_record(&samples[0].label))),
    };

    let dst = layout.qc_summary();
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&dst)
        .with_context(|| format!("creating QC summary: {}", dst.display()))?;

    let mut columns = vec![String::from("sample")];
    columns.extend(header.iter().cloned());
    writer.write_record(&columns)?;

    for (sample, record) in samples.iter().zip(&records) {
        let mut row = vec![sample.label.clone()];
        let record = record.clone().unwrap_or_default();
        row.extend(header.iter().map(|key| record.cell(key)));
        writer.write_record(&row)?;
    }

    writer.flush()?;
    info!("Wrote QC summary to {}", dst.display());

    Ok(dst)
}

/// Merges the samples' quantification tables into
/// `analysis/rpkm/<table>.rpkm.txt`, one file per reference table.
///
/// A table the first sample does not have is skipped for every sample. With
/// one sample its table is copied unchanged; otherwise the samples' tables
/// are inner-joined in sample order, so a gene missing from any sample is
/// missing from the result.
pub fn compile_quantification(
    samples: &[Sample],
    annotation: &AnnotationSet,
    layout: &OutputLayout,
) -> anyhow::Result<Vec<PathBuf>> {
    info!("Compiling quantification output for all samples...");

    let (first, rest) = match samples.split_first() {
        Some(split) => split,
        None => bail!("no samples to compile quantification for"),
    };

    let mut written = Vec::new();

    for name in annotation.table_names() {
        let src = layout.sample_rpkm_table(&first.label, name);
        if !src.exists() {
            info!(
                "Table {} is not available for {}, skipping it.",
                name, first.label
            );
            continue;
        }

        let dst = layout.merged_rpkm_table(name);

        if rest.is_empty() {
            fs::copy(&src, &dst).with_context(|| {
                format!("copying {} to {}", src.display(), dst.display())
            })?;
        } else {
            let mut merged = QuantificationTable::read(&src)?;

            for sample in rest {
                let path = layout.sample_rpkm_table(&sample.label, name);
                if !path.exists() {
                    bail!(PipelineError::MissingInput(path));
                }

                merged = merged.inner_join(&QuantificationTable::read(&path)?);
            }

            info!("Merged table {} has {} genes.", name, merged.len());
            merged.write(&dst)?;
        }

        written.push(dst);
    }

    Ok(written)
}
