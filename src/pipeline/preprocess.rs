//! Read preprocessing.
//!
//! Ribosome-profiling reads lose their trailing poly-A run. Crosslinking
//! reads are adaptor-trimmed with `cutadapt` and then collapsed with
//! `fastx_collapser`. Standard reads are aligned as they are.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use noodles::fastq;
use tracing::info;

use super::Pipeline;
use crate::cache;
use crate::errors::PipelineError;
use crate::sample::Sample;
use crate::sample::SampleType;
use crate::utils::command::CommandLine;
use crate::utils::command::Invocation;
use crate::utils::display::RecordCounter;
use crate::utils::formats::fastq as fastq_io;
use crate::utils::pathbuf::strip_suffixes;
use crate::utils::pathbuf::AppendExtension;

/// Reads shorter than this after adaptor trimming are discarded.
const MIN_TRIMMED_READ_LENGTH: usize = 5;

const READ_SUFFIXES: [&str; 6] = [".fastq.gz", ".fq.gz", ".fastq", ".fq", ".fasta", ".fa"];

/// Outcome of poly-A trimming a file.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TrimSummary {
    /// Reads read.
    pub reads: usize,

    /// Reads that lost a tail but kept some sequence.
    pub trimmed: usize,

    /// Reads that were all poly-A and were dropped.
    pub dropped: usize,
}

/// Removes the trailing run of `A`s from `record` if it is at least
/// `min_length` long, shortening the quality scores to match. Returns the
/// number of bases removed.
pub fn trim_polya(record: &mut fastq::Record, min_length: usize) -> usize {
    let run = record
        .sequence()
        .iter()
        .rev()
        .take_while(|base| base.eq_ignore_ascii_case(&b'A'))
        .count();

    if run == 0 || run < min_length {
        return 0;
    }

    let keep = record.sequence().len() - run;
    record.sequence_mut().truncate(keep);
    record.quality_scores_mut().truncate(keep);

    run
}

/// Poly-A trims every read of `src` into `dst`. Reads left without any
/// sequence are dropped.
pub fn trim_polya_file(src: &Path, dst: &Path, min_length: usize) -> anyhow::Result<TrimSummary> {
    let mut reader = fastq_io::reader(src)?;
    let mut writer = fastq_io::writer(dst)?;

    let mut counter = RecordCounter::new("reads");
    let mut summary = TrimSummary::default();

    for result in reader.records() {
        let mut record = result.with_context(|| format!("reading read from {}", src.display()))?;
        counter.inc();

        if trim_polya(&mut record, min_length) > 0 {
            if record.sequence().is_empty() {
                summary.dropped += 1;
                continue;
            }
            summary.trimmed += 1;
        }

        writer
            .write_record(&record)
            .with_context(|| format!("writing read to {}", dst.display()))?;
    }

    writer
        .get_mut()
        .flush()
        .with_context(|| format!("writing {}", dst.display()))?;

    summary.reads = counter.get();
    Ok(summary)
}

/// `cutadapt <adaptor args> <reads> -o <dst> -m 5 > <log>`
fn cutadapt(adaptor_args: &[String], reads: &Path, dst: &Path, log: &Path) -> CommandLine {
    CommandLine::new(
        Invocation::new("cutadapt")
            .args(adaptor_args.iter().cloned())
            .path_arg(reads)
            .arg("-o")
            .path_arg(dst)
            .arg("-m")
            .arg(MIN_TRIMMED_READ_LENGTH.to_string()),
    )
    .stdout_to(log)
}

/// `gzip -dc <reads> | fastx_collapser -o <dst>`
fn collapse(reads: &Path, dst: &Path) -> CommandLine {
    CommandLine::new(Invocation::new("gzip").arg("-dc").path_arg(reads))
        .pipe(Invocation::new("fastx_collapser").arg("-o").path_arg(dst))
}

impl Pipeline {
    pub(super) fn preprocess(&mut self, mut sample: Sample) -> anyhow::Result<Sample> {
        info!("Preprocessing: {}", sample);

        match sample.sample_type {
            SampleType::RiboProfiling => {
                info!("Trimming polyAs..");
                for rawdata in sample.rawdata.members_mut() {
                    rawdata.reads_path = self.trim_polya_reads(&rawdata.seq_path)?;
                }
            }
            SampleType::Crosslinking => {
                let adaptor_args = self.adaptor_args()?;
                for rawdata in sample.rawdata.members_mut() {
                    let trimmed = self.trim_adaptors(&rawdata.seq_path, &adaptor_args)?;
                    let collapsed = self.collapse_reads(&trimmed)?;
                    info!("Collapsed reads filename: {}", collapsed.display());
                    rawdata.reads_path = collapsed;
                }
            }
            SampleType::Standard => {
                info!("Nothing to preprocess for {} samples", sample.sample_type);
            }
        }

        Ok(sample)
    }

    fn trim_polya_reads(&self, src: &Path) -> anyhow::Result<PathBuf> {
        let base = strip_suffixes(src, &READ_SUFFIXES)?;
        let dst = self
            .layout
            .rawdata_dir()
            .join(format!("{}.polyA_trimmed.fastq", base));
        let min_length = self.config.polya_min_length;

        cache::cached_staged(&dst, |staging| {
            let summary = trim_polya_file(src, staging, min_length)?;
            info!(
                "Trimmed {} of {} reads, dropped {}.",
                summary.trimmed, summary.reads, summary.dropped
            );
            Ok(())
        })?;

        Ok(dst)
    }

    /// The adaptor file's whitespace-separated tokens, passed to `cutadapt`
    /// as arguments.
    fn adaptor_args(&self) -> anyhow::Result<Vec<String>> {
        let path = match &self.config.adaptors_file {
            Some(path) => path,
            None => {
                return Err(PipelineError::Configuration(String::from(
                    "[mapping] needs `adaptors_file` for clipseq data",
                ))
                .into())
            }
        };

        if !path.is_file() {
            return Err(PipelineError::MissingInput(path.clone()))
                .context("cannot find the adaptors file");
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading adaptors file: {}", path.display()))?;
        Ok(contents.split_whitespace().map(String::from).collect())
    }

    fn trim_adaptors(&self, src: &Path, adaptor_args: &[String]) -> anyhow::Result<PathBuf> {
        info!("Trimming adaptors from: {}", src.display());

        let base = strip_suffixes(src, &READ_SUFFIXES)?;
        let dst = self
            .layout
            .rawdata_dir()
            .join(format!("{}_trimmed.fastq.gz", base));

        let log = dst.clone().append_extension("log")?;

        cache::cached_command(&dst, |staging| cutadapt(adaptor_args, src, staging, &log))?;
        Ok(dst)
    }

    fn collapse_reads(&self, trimmed: &Path) -> anyhow::Result<PathBuf> {
        let base = strip_suffixes(trimmed, &[".fastq.gz"])?;
        let dst = self
            .layout
            .rawdata_dir()
            .join(format!("{}.collapsed.fasta", base));

        cache::cached_command(&dst, |dst| collapse(trimmed, dst))?;
        Ok(dst)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::MultiGzDecoder;

    use super::*;

    fn read(name: &str, sequence: &str) -> fastq::Record {
        fastq::Record::new(
            fastq::record::Definition::new(name, ""),
            sequence.as_bytes().to_vec(),
            vec![b'I'; sequence.len()],
        )
    }

    #[test]
    fn test_trim_polya_respects_minimum_run() {
        let mut record = read("r1", "ACGTAAAA");
        assert_eq!(trim_polya(&mut record, 3), 4);
        assert_eq!(record.sequence(), b"ACGT");
        assert_eq!(record.quality_scores(), b"IIII");

        let mut record = read("r2", "ACGTCAA");
        assert_eq!(trim_polya(&mut record, 3), 0);
        assert_eq!(record.sequence(), b"ACGTCAA");

        let mut record = read("r3", "ACGT");
        assert_eq!(trim_polya(&mut record, 0), 0);
    }

    #[test]
    fn test_trim_polya_file_drops_empty_reads() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("A.fastq.gz");
        let dst = dir.path().join("A.polyA_trimmed.fastq");

        let mut encoder = flate2::write::GzEncoder::new(
            fs::File::create(&src).unwrap(),
            flate2::Compression::default(),
        );
        encoder
            .write_all(b"@r1\nCCGTAAAAA\n+\nIIIIIIIII\n@r2\nAAAAA\n+\nIIIII\n@r3\nCCGT\n+\nIIII\n")
            .unwrap();
        encoder.finish().unwrap();

        let summary = trim_polya_file(&src, &dst, 3).unwrap();
        assert_eq!(
            summary,
            TrimSummary {
                reads: 3,
                trimmed: 1,
                dropped: 1
            }
        );
        assert_eq!(
            fs::read_to_string(&dst).unwrap(),
            "@r1\nCCGT\n+\nIIII\n@r3\nCCGT\n+\nIIII\n"
        );

        // Compressed output round-trips through the same helpers.
        let gz = dir.path().join("A.out.fastq.gz");
        trim_polya_file(&src, &gz, 3).unwrap();
        let mut text = String::new();
        MultiGzDecoder::new(fs::File::open(&gz).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert!(text.starts_with("@r1\nCCGT\n"));
    }

    #[test]
    fn test_crosslinking_commands() {
        let args = vec![String::from("-a"), String::from("TGGAATTCTCGG")];
        let command = cutadapt(
            &args,
            Path::new("/in/A.fastq"),
            Path::new("rawdata/A_trimmed.fastq.gz"),
            Path::new("rawdata/A_trimmed.fastq.gz.log"),
        );
        assert_eq!(
            command.to_string(),
            "cutadapt -a TGGAATTCTCGG /in/A.fastq -o rawdata/A_trimmed.fastq.gz -m 5 \
             > rawdata/A_trimmed.fastq.gz.log"
        );

        let command = collapse(
            Path::new("rawdata/A_trimmed.fastq.gz"),
            Path::new("rawdata/A_trimmed.collapsed.fasta"),
        );
        assert_eq!(
            command.to_string(),
            "gzip -dc rawdata/A_trimmed.fastq.gz | fastx_collapser -o rawdata/A_trimmed.collapsed.fasta"
        );
    }
}
