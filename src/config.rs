//! Pipeline settings.
//!
//! Settings are read from a TOML file into loosely typed `Raw*` structures
//! that mirror the file, then validated into an immutable [`Config`]. Every
//! later stage works from [`Config`] only, so a settings problem surfaces
//! once, at load time, as a [`PipelineError::Configuration`].

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use anyhow::bail;
use anyhow::Context;
use serde::Deserialize;

use crate::errors::PipelineError;
use crate::sample::build_samples;
use crate::sample::Group;
use crate::sample::Sample;
use crate::sample::SampleRawdata;
use crate::sample::SampleType;

/// Reference excluded by reference subtraction unless configured otherwise.
pub const DEFAULT_SUBTRACT_REFERENCE: &str = "chrRibo";

/// Shortest trailing run of `A`s that poly-A trimming removes.
pub const DEFAULT_POLYA_MIN_LENGTH: usize = 3;

#[derive(Debug, Deserialize)]
struct RawSettings {
    pipeline: RawPipeline,
    mapping: RawMapping,
    data: RawData,
    #[serde(rename = "pipeline-files")]
    pipeline_files: RawPipelineFiles,
}

#[derive(Debug, Deserialize)]
struct RawPipeline {
    data_type: SampleType,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawMapper {
    Bowtie,
    Tophat,
}

#[derive(Debug, Deserialize)]
struct RawMapping {
    genome: String,
    mapper: RawMapper,
    bowtie_path: Option<PathBuf>,
    bowtie_index: Option<String>,
    bowtie_options: Option<String>,
    tophat_path: Option<PathBuf>,
    tophat_index: Option<String>,
    tophat_options: Option<String>,
    #[serde(default)]
    paired: bool,
    adaptors_file: Option<PathBuf>,
    gff_events: Option<PathBuf>,
    cluster_type: ClusterType,
    subtract_reference: Option<String>,
    cluster_distance: Option<u64>,
    polya_min_length: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawData {
    indir: PathBuf,
    outdir: PathBuf,
    sequence_files: Vec<(String, String)>,
    sample_groups: Option<Vec<(String, Vec<String>)>>,
}

#[derive(Debug, Deserialize)]
struct RawPipelineFiles {
    init_dir: PathBuf,
}

/// Where sample-level jobs run.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ClusterType {
    /// A Sun Grid Engine cluster reached through `qsub`/`qstat`.
    Sge,

    /// The current machine, one job at a time.
    Local,
}

/// How to run one aligner.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AlignerSettings {
    /// The aligner executable.
    pub executable: PathBuf,

    /// The prebuilt genome index passed to the aligner.
    pub index: String,

    /// Extra options, split on whitespace.
    pub options: Vec<String>,
}

/// The configured aligner backend.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Aligner {
    /// Bowtie, aligning against a fast local index.
    Bowtie(AlignerSettings),

    /// TopHat, a splice-aware aligner.
    Tophat(AlignerSettings),
}

impl Aligner {
    /// The settings shared by all backends.
    pub fn settings(&self) -> &AlignerSettings {
        match self {
            Aligner::Bowtie(settings) | Aligner::Tophat(settings) => settings,
        }
    }

    /// The aligner's name as written in the settings file.
    pub fn name(&self) -> &'static str {
        match self {
            Aligner::Bowtie(_) => "bowtie",
            Aligner::Tophat(_) => "tophat",
        }
    }
}

/// One manifest entry: a sequence file and its sample label.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SequenceFile {
    /// Full path to the sequence file (the input directory joined with the
    /// listed file name).
    pub path: PathBuf,

    /// The sample label.
    pub label: String,
}

/// Validated pipeline settings.
#[derive(Clone, Debug)]
pub struct Config {
    /// The settings file this was loaded from.
    pub settings_path: PathBuf,

    /// The data type of every sample.
    pub sample_type: SampleType,

    /// Genome build name.
    pub genome: String,

    /// The aligner backend.
    pub aligner: Aligner,

    /// Whether manifest entries are grouped into paired samples.
    pub paired: bool,

    /// Adaptor arguments for crosslinking samples.
    pub adaptors_file: Option<PathBuf>,

    /// Directory of annotated-region files (`*.gff`, `*.gff3`).
    pub region_dir: Option<PathBuf>,

    /// Where sample-level jobs run.
    pub cluster_type: ClusterType,

    /// Reference whose reads are removed by reference subtraction.
    pub subtract_reference: String,

    /// Maximum gap between reads merged into one cluster.
    pub cluster_distance: u64,

    /// Shortest trailing run of `A`s removed by poly-A trimming.
    pub polya_min_length: usize,

    /// Directory the manifest's file names are relative to.
    pub input_dir: PathBuf,

    /// Root of the output tree.
    pub output_dir: PathBuf,

    /// The manifest, in settings order.
    pub sequence_files: Vec<SequenceFile>,

    /// Sample groups; present iff `paired`.
    pub sample_groups: Option<Vec<Group>>,

    /// Directory holding the reference tables.
    pub init_dir: PathBuf,
}

fn invalid<S: Into<String>>(message: S) -> PipelineError {
    PipelineError::Configuration(message.into())
}

fn aligner_settings(
    name: &str,
    executable: Option<PathBuf>,
    index: Option<String>,
    options: Option<String>,
) -> Result<AlignerSettings, PipelineError> {
    let executable =
        executable.ok_or_else(|| invalid(format!("[mapping] needs `{}_path`", name)))?;
    let index = index.ok_or_else(|| invalid(format!("[mapping] needs `{}_index`", name)))?;
    let options = options
        .unwrap_or_default()
        .split_whitespace()
        .map(String::from)
        .collect();

    Ok(AlignerSettings {
        executable,
        index,
        options,
    })
}

impl Config {
    /// Reads and validates the settings file at `path`.
    pub fn load<P>(path: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();

        if !path.is_file() {
            bail!(invalid(format!(
                "{} is not a settings file",
                path.display()
            )));
        }

        let text = fs::read_to_string(path)
            .with_context(|| format!("reading settings file: {}", path.display()))?;

        Self::parse(&text, path)
            .with_context(|| format!("loading settings from {}", path.display()))
    }

    /// Parses and validates settings text. `settings_path` is only recorded,
    /// not read.
    pub fn parse<P>(text: &str, settings_path: P) -> anyhow::Result<Self>
    where
        P: Into<PathBuf>,
    {
        let raw: RawSettings = toml::from_str(text).map_err(|e| invalid(e.to_string()))?;
        let mapping = raw.mapping;

        let aligner = match mapping.mapper {
            RawMapper::Bowtie => Aligner::Bowtie(aligner_settings(
                "bowtie",
                mapping.bowtie_path,
                mapping.bowtie_index,
                mapping.bowtie_options,
            )?),
            RawMapper::Tophat => Aligner::Tophat(aligner_settings(
                "tophat",
                mapping.tophat_path,
                mapping.tophat_index,
                mapping.tophat_options,
            )?),
        };

        let sample_type = raw.pipeline.data_type;
        if sample_type == SampleType::Crosslinking && mapping.adaptors_file.is_none() {
            bail!(invalid("[mapping] needs `adaptors_file` for clipseq data"));
        }

        let input_dir = raw.data.indir;
        let mut sequence_files: Vec<SequenceFile> = Vec::new();
        for (file, label) in raw.data.sequence_files {
            if sequence_files.iter().any(|s| s.label == label) {
                bail!(invalid(format!("duplicate sample label `{}`", label)));
            }

            let path = input_dir.join(file);
            if !path.is_file() {
                bail!(invalid(format!(
                    "cannot find sequence file {}",
                    path.display()
                )));
            }

            sequence_files.push(SequenceFile { path, label });
        }

        if sequence_files.is_empty() {
            bail!(invalid("[data] lists no sequence files"));
        }

        let sample_groups = match (mapping.paired, raw.data.sample_groups) {
            (false, _) => None,
            (true, None) => bail!(invalid(
                "in paired-end mode, but [data] has no `sample_groups`"
            )),
            (true, Some(groups)) => Some(
                groups
                    .into_iter()
                    .map(|(id, members)| Group { id, members })
                    .collect::<Vec<_>>(),
            ),
        };

        let config = Self {
            settings_path: settings_path.into(),
            sample_type,
            genome: mapping.genome,
            aligner,
            paired: mapping.paired,
            adaptors_file: mapping.adaptors_file,
            region_dir: mapping.gff_events,
            cluster_type: mapping.cluster_type,
            subtract_reference: mapping
                .subtract_reference
                .unwrap_or_else(|| String::from(DEFAULT_SUBTRACT_REFERENCE)),
            cluster_distance: mapping.cluster_distance.unwrap_or(0),
            polya_min_length: mapping
                .polya_min_length
                .unwrap_or(DEFAULT_POLYA_MIN_LENGTH),
            input_dir,
            output_dir: raw.data.outdir,
            sequence_files,
            sample_groups,
            init_dir: raw.pipeline_files.init_dir,
        };

        // Group membership is checked here so it fails at load time.
        config.samples()?;

        Ok(config)
    }

    /// Replaces the output directory, as `--output-dir` does.
    pub fn with_output_dir<P>(mut self, output_dir: P) -> Self
    where
        P: Into<PathBuf>,
    {
        self.output_dir = output_dir.into();
        self
    }

    /// One [`SampleRawdata`] per manifest entry.
    pub fn rawdata(&self) -> Vec<SampleRawdata> {
        self.sequence_files
            .iter()
            .map(|s| SampleRawdata::new(s.label.clone(), s.path.clone(), self.sample_type))
            .collect()
    }

    /// The samples of this run.
    pub fn samples(&self) -> anyhow::Result<Vec<Sample>> {
        build_samples(self.rawdata(), self.sample_groups.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::ExitCode;

    use super::*;

    fn settings(dir: &Path, mapping_extra: &str, data_extra: &str) -> String {
        format!(
            r#"
[pipeline]
data_type = "rnaseq"

[mapping]
genome = "mm9"
mapper = "bowtie"
bowtie_path = "bowtie"
bowtie_index = "/idx/mm9"
bowtie_options = "-m 1   --best"
cluster_type = "local"
{mapping_extra}

[data]
indir = "{indir}"
outdir = "/out"
sequence_files = [["a.fastq", "A"], ["b.fastq", "B"]]
{data_extra}

[pipeline-files]
init_dir = "/init"
"#,
            indir = dir.display()
        )
    }

    fn input_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.fastq"), "").unwrap();
        fs::write(dir.path().join("b.fastq"), "").unwrap();
        dir
    }

    fn configuration_error(text: &str) -> bool {
        let err = Config::parse(text, "settings.toml").unwrap_err();
        ExitCode::for_error(&err) == ExitCode::InvalidConfiguration
    }

    #[test]
    fn test_parse_applies_defaults() {
        let dir = input_dir();
        let config = Config::parse(&settings(dir.path(), "", ""), "settings.toml").unwrap();

        assert_eq!(config.sample_type, SampleType::Standard);
        assert_eq!(config.cluster_type, ClusterType::Local);
        assert_eq!(config.subtract_reference, "chrRibo");
        assert_eq!(config.cluster_distance, 0);
        assert_eq!(config.polya_min_length, 3);
        assert!(!config.paired);
        assert_eq!(
            config.aligner,
            Aligner::Bowtie(AlignerSettings {
                executable: PathBuf::from("bowtie"),
                index: String::from("/idx/mm9"),
                options: vec![String::from("-m"), String::from("1"), String::from("--best")],
            })
        );
        assert_eq!(config.sequence_files[1].path, dir.path().join("b.fastq"));
        assert_eq!(config.samples().unwrap().len(), 2);
    }

    #[test]
    fn test_paired_settings_build_groups() {
        let dir = input_dir();
        let text = settings(
            dir.path(),
            "paired = true",
            r#"sample_groups = [["G1", ["A", "B"]]]"#,
        );
        let config = Config::parse(&text, "settings.toml").unwrap();

        let samples = config.samples().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].label, "G1");
        assert!(samples[0].paired());
    }

    #[test]
    fn test_invalid_settings_are_configuration_errors() {
        let dir = input_dir();

        // Unknown enum tag.
        let text = settings(dir.path(), "", "").replace("\"bowtie\"\nbowtie_path", "\"bwa\"\nbowtie_path");
        assert!(configuration_error(&text));

        // Paired without groups.
        assert!(configuration_error(&settings(dir.path(), "paired = true", "")));

        // Group member missing from the manifest.
        let text = settings(
            dir.path(),
            "paired = true",
            r#"sample_groups = [["G1", ["A", "B", "C"]]]"#,
        );
        assert!(configuration_error(&text));

        // Clipseq without adaptors.
        let text = settings(dir.path(), "", "").replace("\"rnaseq\"", "\"clipseq\"");
        assert!(configuration_error(&text));

        // Missing sequence file.
        fs::remove_file(dir.path().join("b.fastq")).unwrap();
        assert!(configuration_error(&settings(dir.path(), "", "")));
    }

    #[test]
    fn test_duplicate_labels_are_rejected() {
        let dir = input_dir();
        let text = settings(dir.path(), "", "").replace("\"B\"]", "\"A\"]");
        assert!(configuration_error(&text));
    }

    #[test]
    fn test_output_dir_override() {
        let dir = input_dir();
        let config = Config::parse(&settings(dir.path(), "", ""), "settings.toml")
            .unwrap()
            .with_output_dir("/elsewhere");
        assert_eq!(config.output_dir, PathBuf::from("/elsewhere"));
    }
}
