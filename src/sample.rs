//! Samples, their raw inputs, and how they are grouped.
//!
//! A [`Sample`] is the unit the pipeline runs on. In single-end mode each
//! entry of the sequence-file manifest becomes its own sample; in paired
//! mode the members of a [`Group`] are fused into one sample that carries
//! every member's [`SampleRawdata`] in manifest order.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::bail;
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;

use crate::errors::PipelineError;

/// The kind of sequencing experiment a sample comes from. This decides how
/// reads are preprocessed and which analyses run on the alignment.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum SampleType {
    /// Plain RNA-seq.
    #[serde(rename = "rnaseq", alias = "standard")]
    Standard,

    /// Ribosome profiling. Reads carry a poly-A tail that is trimmed before
    /// alignment.
    #[serde(rename = "riboseq", alias = "ribosome-profiling")]
    RiboProfiling,

    /// Crosslinking and immunoprecipitation (CLIP-seq). Reads are adaptor
    /// trimmed and collapsed, and alignments are de-duplicated.
    #[serde(rename = "clipseq", alias = "crosslinking")]
    Crosslinking,
}

impl SampleType {
    /// The name of this sample type as written in the settings file.
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleType::Standard => "rnaseq",
            SampleType::RiboProfiling => "riboseq",
            SampleType::Crosslinking => "clipseq",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SampleType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rnaseq" | "standard" => Ok(SampleType::Standard),
            "riboseq" | "ribosome-profiling" => Ok(SampleType::RiboProfiling),
            "clipseq" | "crosslinking" => Ok(SampleType::Crosslinking),
            _ => Err(PipelineError::Configuration(format!(
                "unknown data type `{}` (expected rnaseq, riboseq, or clipseq)",
                s
            ))),
        }
    }
}

/// One entry of the sequence-file manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleRawdata {
    /// The label given to this file in the manifest.
    pub label: String,

    /// The sequence file as listed in the manifest.
    pub seq_path: PathBuf,

    /// The reads that get aligned. Starts out equal to `seq_path` and is
    /// replaced when preprocessing trims or collapses the reads.
    pub reads_path: PathBuf,

    /// Inherited from the pipeline's data type.
    pub sample_type: SampleType,
}

impl SampleRawdata {
    /// Creates raw data whose reads are the sequence file itself.
    pub fn new<L, P>(label: L, seq_path: P, sample_type: SampleType) -> Self
    where
        L: Into<String>,
        P: Into<PathBuf>,
    {
        let seq_path = seq_path.into();

        Self {
            label: label.into(),
            reads_path: seq_path.clone(),
            seq_path,
            sample_type,
        }
    }
}

impl fmt::Display for SampleRawdata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SampleRawdata({}, {}, {})",
            self.label,
            self.sample_type,
            self.seq_path.display()
        )
    }
}

/// The raw inputs of a sample: one manifest entry, or an ordered group of
/// them in paired mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rawdata {
    /// A sample built from one manifest entry.
    Single(SampleRawdata),

    /// A sample built from a group of manifest entries, in manifest order.
    Group(Vec<SampleRawdata>),
}

impl Rawdata {
    /// All raw inputs, in order.
    pub fn members(&self) -> &[SampleRawdata] {
        match self {
            Rawdata::Single(rawdata) => std::slice::from_ref(rawdata),
            Rawdata::Group(members) => members,
        }
    }

    /// All raw inputs, mutably, in order.
    pub fn members_mut(&mut self) -> &mut [SampleRawdata] {
        match self {
            Rawdata::Single(rawdata) => std::slice::from_mut(rawdata),
            Rawdata::Group(members) => members,
        }
    }
}

/// A named group of manifest labels that are processed together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    /// The group identifier, which becomes the sample label.
    pub id: String,

    /// Member labels as listed in the settings.
    pub members: Vec<String>,
}

/// Paths produced for a sample by the stages that have run so far. Every
/// field starts out empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SampleOutputs {
    /// The aligner's output.
    pub alignment: Option<PathBuf>,

    /// Directory holding the filtered alignment variants.
    pub processed_dir: Option<PathBuf>,

    /// Sorted alignment restricted to uniquely mapped reads.
    pub unique: Option<PathBuf>,

    /// Sorted alignment with every read touching the excluded reference
    /// removed.
    pub reference_subtracted: Option<PathBuf>,

    /// Sorted, de-duplicated primary alignment (crosslinking only).
    pub dedup: Option<PathBuf>,

    /// Sorted, de-duplicated unique alignment (crosslinking only).
    pub dedup_unique: Option<PathBuf>,

    /// Persisted quality-control record.
    pub qc_record: Option<PathBuf>,

    /// Quantification tables keyed by table name.
    pub quantification: IndexMap<String, PathBuf>,
}

/// A sample the pipeline runs on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    /// The sample's unique label.
    pub label: String,

    /// The raw inputs.
    pub rawdata: Rawdata,

    /// Taken from the (first) raw input.
    pub sample_type: SampleType,

    /// Outputs recorded by the stages.
    pub outputs: SampleOutputs,
}

impl Sample {
    /// Creates a sample. A group must have at least one member, and all
    /// members must share a sample type.
    pub fn new<L>(label: L, rawdata: Rawdata) -> anyhow::Result<Self>
    where
        L: Into<String>,
    {
        let label = label.into();

        let sample_type = match rawdata.members() {
            [] => bail!("sample group `{}` has no members", label),
            [first, rest @ ..] => {
                if let Some(other) = rest.iter().find(|r| r.sample_type != first.sample_type) {
                    bail!(
                        "sample group `{}` mixes data types: {} and {}",
                        label,
                        first,
                        other
                    );
                }
                first.sample_type
            }
        };

        Ok(Self {
            label,
            rawdata,
            sample_type,
            outputs: SampleOutputs::default(),
        })
    }

    /// Whether this sample fuses a group of raw inputs.
    pub fn paired(&self) -> bool {
        matches!(self.rawdata, Rawdata::Group(_))
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members = self
            .rawdata
            .members()
            .iter()
            .map(|r| r.label.as_str())
            .join(",");

        write!(f, "Sample({}, samples={})", self.label, members)
    }
}

/// Builds the samples for a run.
///
/// Without groups every raw input becomes its own sample. With groups one
/// sample is built per group, groups ordered by their first appearance in
/// `groups` and members ordered as they appear in `rawdata` (the manifest).
/// Every group member must be present in the manifest.
pub fn build_samples(
    rawdata: Vec<SampleRawdata>,
    groups: Option<&[Group]>,
) -> anyhow::Result<Vec<Sample>> {
    let groups = match groups {
        Some(groups) => groups,
        None => {
            return rawdata
                .into_iter()
                .map(|r| Sample::new(r.label.clone(), Rawdata::Single(r)))
                .collect();
        }
    };

    let mut group_of: HashMap<&str, &str> = HashMap::new();
    for group in groups {
        for member in &group.members {
            if let Some(previous) = group_of.insert(member.as_str(), group.id.as_str()) {
                if previous != group.id {
                    bail!(PipelineError::Configuration(format!(
                        "sample `{}` belongs to both group `{}` and group `{}`",
                        member, previous, group.id
                    )));
                }
            }
        }
    }

    let mut members_by_group: IndexMap<&str, Vec<SampleRawdata>> = groups
        .iter()
        .map(|group| (group.id.as_str(), Vec::new()))
        .collect();

    for r in rawdata.iter() {
        let members = group_of
            .get(r.label.as_str())
            .and_then(|id| members_by_group.get_mut(id));

        match members {
            Some(members) => members.push(r.clone()),
            None => bail!(PipelineError::Configuration(format!(
                "sample `{}` is not assigned to any group",
                r.label
            ))),
        }
    }

    for group in groups {
        for member in &group.members {
            if !rawdata.iter().any(|r| &r.label == member) {
                bail!(PipelineError::Configuration(format!(
                    "group `{}` lists `{}`, which is not in the sequence files",
                    group.id, member
                )));
            }
        }
    }

    members_by_group
        .into_iter()
        .map(|(id, members)| Sample::new(id, Rawdata::Group(members)))
        .collect()
}
