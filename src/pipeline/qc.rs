//! Quality control of a mapped sample: computes its QC record, or reloads
//! the one an earlier run left behind.

use tracing::info;

use super::required;
use super::Pipeline;
use crate::cache;
use crate::cache::Outcome;
use crate::layout::ensure_dir;
use crate::qc::results::QcRecord;
use crate::qc::QcInputs;
use crate::qc::QcMetrics;
use crate::sample::Sample;

impl Pipeline {
    /// Computes and persists the sample's QC record, or loads the one a
    /// previous run left behind.
    pub(super) fn qc(&mut self, mut sample: Sample) -> anyhow::Result<Sample> {
        let path = self.layout.qc_record(&sample.label);
        if let Some(dir) = path.parent() {
            ensure_dir(dir)?;
        }

        let outputs = &sample.outputs;
        let inputs = QcInputs {
            alignment: required(&outputs.alignment, "alignment")?,
            unique: required(&outputs.unique, "unique alignment")?,
            reference_subtracted: required(
                &outputs.reference_subtracted,
                "reference-subtracted alignment",
            )?,
            dedup_unique: outputs.dedup_unique.as_deref(),
        };

        let outcome = cache::cached_staged(&path, |staging| {
            let metrics = QcMetrics::compute(inputs)?;
            metrics.to_record()?.write(staging)
        })?;

        if outcome == Outcome::Reused {
            let record = QcRecord::read(&path)?;
            info!(
                "Loaded QC record for {}: {}",
                sample.label,
                record.header().join(", ")
            );
        } else {
            info!("Wrote QC record for {} to {}", sample.label, path.display());
        }

        sample.outputs.qc_record = Some(path);
        Ok(sample)
    }
}
