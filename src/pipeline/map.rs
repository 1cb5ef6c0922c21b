//! Alignment of a sample's reads and the post-processing of the result.

use std::path::Path;
use std::path::PathBuf;

use anyhow::bail;
use anyhow::Context;
use tracing::info;

use super::Pipeline;
use crate::alignment;
use crate::alignment::samtools;
use crate::config::Aligner;
use crate::config::AlignerSettings;
use crate::errors::PipelineError;
use crate::layout::ensure_dir;
use crate::sample::Sample;
use crate::sample::SampleType;
use crate::utils::command::CommandLine;
use crate::utils::command::Invocation;

/// `<bowtie> <options> <index> <reads | -1 r1 -2 r2> -S | samtools view -Sbh - > <dst>`
fn bowtie(settings: &AlignerSettings, reads: &[PathBuf], dst: &Path) -> anyhow::Result<CommandLine> {
    let mut invocation = Invocation::new(settings.executable.display().to_string())
        .args(settings.options.iter().cloned())
        .arg(settings.index.as_str());

    invocation = match reads {
        [single] => invocation.path_arg(single),
        [first, second] => invocation
            .arg("-1")
            .path_arg(first)
            .arg("-2")
            .path_arg(second),
        _ => bail!(PipelineError::Configuration(format!(
            "bowtie takes one or two read files, got {}",
            reads.len()
        ))),
    };

    Ok(CommandLine::new(invocation.arg("-S"))
        .pipe(samtools::sam_to_bam())
        .stdout_to(dst))
}

/// `<tophat> <options> -o <out_dir> <index> <reads...>`
fn tophat(settings: &AlignerSettings, reads: &[PathBuf], out_dir: &Path) -> CommandLine {
    CommandLine::new(
        Invocation::new(settings.executable.display().to_string())
            .args(settings.options.iter().cloned())
            .arg("-o")
            .path_arg(out_dir)
            .arg(settings.index.as_str())
            .args(reads.iter().map(|path| path.display().to_string())),
    )
}

impl Pipeline {
    pub(super) fn map(&mut self, mut sample: Sample) -> anyhow::Result<Sample> {
        let label = sample.label.clone();
        let reads: Vec<PathBuf> = sample
            .rawdata
            .members()
            .iter()
            .map(|rawdata| rawdata.reads_path.clone())
            .collect();

        let (command, bam) = match &self.config.aligner {
            Aligner::Bowtie(settings) => {
                let dst = self.layout.mapping_dir().join(format!("{}.bam", label));
                (bowtie(settings, &reads, &dst)?, dst)
            }
            Aligner::Tophat(settings) => {
                let out_dir = self.layout.sample_mapping_dir(&label);
                ensure_dir(&out_dir)?;
                let dst = out_dir.join("accepted_hits.bam");
                (tophat(settings, &reads, &out_dir), dst)
            }
        };

        let name = format!("{}_{}", label, self.config.aligner.name());
        info!("Mapping {} with {}", sample, self.config.aligner.name());
        self.dispatcher
            .submit_and_wait(&command, &name, Some(&bam))?;

        if !bam.exists() {
            return Err(PipelineError::MissingInput(bam))
                .context("the aligner did not produce an alignment");
        }

        alignment::index(&bam)?;

        let processed_dir = self.layout.processed_bams_dir(&label);
        ensure_dir(&processed_dir)?;

        let unique = alignment::unique_subset(&bam, &processed_dir)?;
        let ribosub = alignment::reference_subtract(
            &bam,
            &self.config.subtract_reference,
            &processed_dir,
        )?;

        let sorted = alignment::sort_and_index(&bam)?;
        let unique_sorted = alignment::sort_and_index(&unique)?;
        let ribosub_sorted = alignment::sort_and_index(&ribosub)?;

        if sample.sample_type == SampleType::Crosslinking {
            info!("Removing duplicates from {}", sample);
            let dedup = alignment::dedup(&sorted, &processed_dir)?;
            let dedup_unique = alignment::dedup(&unique_sorted, &processed_dir)?;

            sample.outputs.dedup = Some(alignment::sort_and_index(&dedup)?);
            sample.outputs.dedup_unique = Some(alignment::sort_and_index(&dedup_unique)?);
        }

        sample.outputs.alignment = Some(sorted);
        sample.outputs.processed_dir = Some(processed_dir);
        sample.outputs.unique = Some(unique_sorted);
        sample.outputs.reference_subtracted = Some(ribosub_sorted);

        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(executable: &str) -> AlignerSettings {
        AlignerSettings {
            executable: PathBuf::from(executable),
            index: String::from("/genomes/mm9/mm9"),
            options: vec![String::from("--best"), String::from("-m"), String::from("1")],
        }
    }

    #[test]
    fn test_bowtie_single_end() {
        let command = bowtie(
            &settings("bowtie"),
            &[PathBuf::from("/in/A.fastq")],
            Path::new("mapping/A.bam"),
        )
        .unwrap();

        assert_eq!(
            command.to_string(),
            "bowtie --best -m 1 /genomes/mm9/mm9 /in/A.fastq -S | samtools view -Sbh - > mapping/A.bam"
        );
    }

    #[test]
    fn test_bowtie_paired_end() {
        let command = bowtie(
            &settings("/opt/bowtie"),
            &[PathBuf::from("A_1.fastq"), PathBuf::from("A_2.fastq")],
            Path::new("mapping/A.bam"),
        )
        .unwrap();

        assert_eq!(
            command.stages()[0].arguments(),
            &[
                "--best",
                "-m",
                "1",
                "/genomes/mm9/mm9",
                "-1",
                "A_1.fastq",
                "-2",
                "A_2.fastq",
                "-S"
            ]
        );
    }

    #[test]
    fn test_bowtie_rejects_three_read_files() {
        let reads = vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")];
        let err = bowtie(&settings("bowtie"), &reads, Path::new("x.bam")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_tophat() {
        let command = tophat(
            &settings("tophat"),
            &[PathBuf::from("A_1.fastq"), PathBuf::from("A_2.fastq")],
            Path::new("mapping/A"),
        );

        assert_eq!(
            command.to_string(),
            "tophat --best -m 1 -o mapping/A /genomes/mm9/mm9 A_1.fastq A_2.fastq"
        );
        assert_eq!(command.stdout(), None);
    }
}
