//! The output directory tree.
//!
//! ```text
//! <output dir>/
//!   rawdata/                      trimmed and collapsed reads
//!   mapping/<label>/processed_bams/
//!   qc/<label>/<label>.qc.json
//!   analysis/rpkm/<label>/
//!   analysis/insert_lens/
//!   analysis/events/<label>/{bam,bed}/
//!   analysis/clusters/<label>/by_events/
//!   logs/
//! ```
//!
//! Each sample only ever writes below directories named after its own label,
//! which is what lets sample jobs run side by side without coordination.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use tracing::debug;
use tracing::info;

const TOPLEVEL_DIRS: [&str; 5] = ["rawdata", "mapping", "qc", "analysis", "logs"];
const ANALYSIS_DIRS: [&str; 4] = ["rpkm", "insert_lens", "events", "clusters"];

/// Paths into the output directory tree.
#[derive(Clone, Debug)]
pub struct OutputLayout {
    root: PathBuf,
}

/// Creates `dir` and any missing parents.
pub fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating directory: {}", dir.display()))
}

impl OutputLayout {
    /// A layout rooted at `root`. Nothing is created until
    /// [`create`](Self::create) is called.
    pub fn new<P>(root: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self { root: root.into() }
    }

    /// Creates the top-level directories and the analysis subdirectories.
    pub fn create(&self) -> anyhow::Result<()> {
        info!("Initializing the pipeline output directories.");
        ensure_dir(&self.root)?;

        for name in TOPLEVEL_DIRS {
            let dir = self.root.join(name);
            debug!(" - creating: {}", dir.display());
            ensure_dir(&dir)?;
        }

        for name in ANALYSIS_DIRS {
            ensure_dir(&self.analysis_dir().join(name))?;
        }

        Ok(())
    }

    /// The root of the tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `rawdata/`
    pub fn rawdata_dir(&self) -> PathBuf {
        self.root.join("rawdata")
    }

    /// `mapping/`
    pub fn mapping_dir(&self) -> PathBuf {
        self.root.join("mapping")
    }

    /// `qc/`
    pub fn qc_dir(&self) -> PathBuf {
        self.root.join("qc")
    }

    /// `analysis/`
    pub fn analysis_dir(&self) -> PathBuf {
        self.root.join("analysis")
    }

    /// `logs/`, which also holds job scripts.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// `analysis/rpkm/`
    pub fn rpkm_dir(&self) -> PathBuf {
        self.analysis_dir().join("rpkm")
    }

    /// `mapping/<label>`, the aligner's working directory for a sample.
    pub fn sample_mapping_dir(&self, label: &str) -> PathBuf {
        self.mapping_dir().join(label)
    }

    /// `mapping/<label>/processed_bams`.
    pub fn processed_bams_dir(&self, label: &str) -> PathBuf {
        self.sample_mapping_dir(label).join("processed_bams")
    }

    /// `qc/<label>/<label>.qc.json`.
    pub fn qc_record(&self, label: &str) -> PathBuf {
        self.qc_dir().join(label).join(format!("{}.qc.json", label))
    }

    /// `qc/qc_stats.txt`, the compiled QC table.
    pub fn qc_summary(&self) -> PathBuf {
        self.qc_dir().join("qc_stats.txt")
    }

    /// `analysis/rpkm/<label>`.
    pub fn sample_rpkm_dir(&self, label: &str) -> PathBuf {
        self.rpkm_dir().join(label)
    }

    /// `analysis/rpkm/<label>/<table>.rpkm`.
    pub fn sample_rpkm_table(&self, label: &str, table: &str) -> PathBuf {
        self.sample_rpkm_dir(label).join(format!("{}.rpkm", table))
    }

    /// `analysis/rpkm/<table>.rpkm.txt`, the merged table.
    pub fn merged_rpkm_table(&self, table: &str) -> PathBuf {
        self.rpkm_dir().join(format!("{}.rpkm.txt", table))
    }

    /// `analysis/events/<label>`.
    pub fn events_dir(&self, label: &str) -> PathBuf {
        self.analysis_dir().join("events").join(label)
    }

    /// `analysis/clusters/<label>`.
    pub fn clusters_dir(&self, label: &str) -> PathBuf {
        self.analysis_dir().join("clusters").join(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_builds_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path().join("out"));
        layout.create().unwrap();
        // Creating twice is fine.
        layout.create().unwrap();

        for name in TOPLEVEL_DIRS {
            assert!(layout.root().join(name).is_dir());
        }
        for name in ANALYSIS_DIRS {
            assert!(layout.analysis_dir().join(name).is_dir());
        }
    }

    #[test]
    fn test_sample_paths() {
        let layout = OutputLayout::new("/out");
        assert_eq!(layout.qc_record("A"), PathBuf::from("/out/qc/A/A.qc.json"));
        assert_eq!(
            layout.processed_bams_dir("A"),
            PathBuf::from("/out/mapping/A/processed_bams")
        );
        assert_eq!(
            layout.sample_rpkm_table("A", "ensGene"),
            PathBuf::from("/out/analysis/rpkm/A/ensGene.rpkm")
        );
        assert_eq!(
            layout.merged_rpkm_table("ensGene"),
            PathBuf::from("/out/analysis/rpkm/ensGene.rpkm.txt")
        );
    }
}
