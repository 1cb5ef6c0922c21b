//! Post-processing of alignment files.
//!
//! Every operation derives its output name from its input, skips its work
//! when that output already exists, and returns the output path so the next
//! step can consume it:
//!
//! | Operation              | Output                         |
//! |------------------------|--------------------------------|
//! | [`index`]              | `<src>.bai`                    |
//! | [`unique_subset`]      | `<dir>/<stem>.unique.bam`      |
//! | [`reference_subtract`] | `<dir>/<stem>.ribosub.bam`     |
//! | [`sort_and_index`]     | `<src dir>/<stem>.sorted.bam`  |
//! | [`dedup`]              | `<dir>/<stem>.rmdups.bam`      |
//!
//! Unique and reference-subtracted subsets are written in process. Sorting,
//! indexing, and de-duplication are delegated to `samtools`.

pub mod filter;
pub mod samtools;

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use tracing::info;
use tracing::warn;

use crate::cache;
use crate::utils::formats::bam;
use crate::utils::formats::bam::ParsedBAMFile;
use crate::utils::pathbuf::bam_stem;
use crate::utils::pathbuf::AppendExtension;

/// `<dir>/<stem>.unique.bam`
pub fn unique_name(src: &Path, dir: &Path) -> anyhow::Result<PathBuf> {
    Ok(dir.join(format!("{}.unique.bam", bam_stem(src)?)))
}

/// `<dir>/<stem>.ribosub.bam`
pub fn reference_subtracted_name(src: &Path, dir: &Path) -> anyhow::Result<PathBuf> {
    Ok(dir.join(format!("{}.ribosub.bam", bam_stem(src)?)))
}

/// `<stem>.sorted.bam`, next to `src`.
pub fn sorted_name(src: &Path) -> anyhow::Result<PathBuf> {
    Ok(src.with_file_name(format!("{}.sorted.bam", bam_stem(src)?)))
}

/// `<dir>/<stem>.rmdups.bam`, where a trailing `.sorted` is first removed
/// from the stem.
pub fn dedup_name(src: &Path, dir: &Path) -> anyhow::Result<PathBuf> {
    let stem = bam_stem(src)?;
    let stem = stem.strip_suffix(".sorted").unwrap_or(stem);
    Ok(dir.join(format!("{}.rmdups.bam", stem)))
}

/// Builds the `.bai` index of `src` unless it already exists. Returns the
/// index path.
pub fn index(src: &Path) -> anyhow::Result<PathBuf> {
    let bai = src.to_path_buf().append_extension("bai")?;
    info!("Indexing {}", src.display());
    cache::cached_command(&bai, |bai| samtools::index(src, bai))?;
    Ok(bai)
}

/// Writes the records of `src` with multiplicity 1 to
/// `<dir>/<stem>.unique.bam`.
pub fn unique_subset(src: &Path, dir: &Path) -> anyhow::Result<PathBuf> {
    let dst = unique_name(src, dir)?;
    info!("Getting unique reads from {}", src.display());

    cache::cached_staged(&dst, |staging| {
        let ParsedBAMFile { mut reader, header } = bam::open_and_parse(src)?;
        let mut writer = bam::create(staging, &header)?;

        let summary = filter::retain_unique(reader.records(), |record| {
            writer
                .write_record(&header, record)
                .with_context(|| format!("writing record to {}", dst.display()))
        })?;
        writer.try_finish()?;

        if summary.kept == 0 {
            warn!("No unique reads found in {}", src.display());
        } else {
            info!(
                "Kept {} of {} records as unique.",
                summary.kept, summary.seen
            );
        }

        Ok(())
    })?;

    Ok(dst)
}

/// Writes `src` without any record of a query that has at least one
/// alignment to the reference sequence `excluded` to
/// `<dir>/<stem>.ribosub.bam`.
///
/// This reads `src` twice: once to collect the offending query names, and
/// once to copy everything else.
pub fn reference_subtract(src: &Path, excluded: &str, dir: &Path) -> anyhow::Result<PathBuf> {
    let dst = reference_subtracted_name(src, dir)?;
    info!("Getting {}-subtracted reads from {}", excluded, src.display());

    cache::cached_staged(&dst, |staging| {
        let ParsedBAMFile { mut reader, header } = bam::open_and_parse(src)?;

        let reference_id = bam::reference_names(&header)
            .iter()
            .position(|name| name == excluded);

        let queries = match reference_id {
            Some(id) => filter::queries_touching(reader.records(), id)?,
            None => {
                warn!(
                    "Reference {} is not in the header of {}",
                    excluded,
                    src.display()
                );
                Default::default()
            }
        };

        if queries.is_empty() {
            warn!(
                "Could not find any reads mapping to {} in {}",
                excluded,
                src.display()
            );
        } else {
            info!("Subtracting {} {} reads", queries.len(), excluded);
        }

        let ParsedBAMFile { mut reader, header } = bam::open_and_parse(src)?;
        let mut writer = bam::create(staging, &header)?;
        filter::drop_queries(reader.records(), &queries, |record| {
            writer
                .write_record(&header, record)
                .with_context(|| format!("writing record to {}", dst.display()))
        })?;
        writer.try_finish()?;

        Ok(())
    })?;

    Ok(dst)
}

/// Sorts `src` by position into `<stem>.sorted.bam` unless that exists, then
/// indexes the sorted file. Returns the sorted path.
pub fn sort_and_index(src: &Path) -> anyhow::Result<PathBuf> {
    let dst = sorted_name(src)?;
    info!("Sorting {} as {}", src.display(), dst.display());

    cache::cached_command(&dst, |dst| samtools::sort(src, dst))?;
    index(&dst)?;

    Ok(dst)
}

/// Removes duplicate reads from `src` (treating reads as single-end) into
/// `<dir>/<stem>.rmdups.bam`.
pub fn dedup(src: &Path, dir: &Path) -> anyhow::Result<PathBuf> {
    let dst = dedup_name(src, dir)?;
    info!("Removing duplicates from {}", src.display());

    cache::cached_command(&dst, |dst| samtools::rmdup_single_end(src, dst))?;

    Ok(dst)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use noodles::bam as nbam;
    use noodles::core::Position;
    use noodles::sam;
    use noodles::sam::alignment::io::Write;
    use noodles::sam::alignment::record::data::field::Tag;
    use noodles::sam::alignment::record::Flags;
    use noodles::sam::alignment::record_buf::data::field::Value;
    use noodles::sam::alignment::RecordBuf;
    use noodles::sam::header::record::value::map::ReferenceSequence;
    use noodles::sam::header::record::value::Map;

    use super::*;

    fn header() -> sam::Header {
        let length = NonZeroUsize::new(1_000).unwrap();

        sam::Header::builder()
            .add_reference_sequence("chr1", Map::<ReferenceSequence>::new(length))
            .add_reference_sequence("chrRibo", Map::<ReferenceSequence>::new(length))
            .build()
    }

    fn record(name: &str, reference_id: usize, nh: i32) -> RecordBuf {
        RecordBuf::builder()
            .set_name(name)
            .set_flags(Flags::empty())
            .set_reference_sequence_id(reference_id)
            .set_alignment_start(Position::MIN)
            .set_data([(Tag::ALIGNMENT_HIT_COUNT, Value::from(nh))].into_iter().collect())
            .build()
    }

    fn write_bam(path: &Path, records: &[RecordBuf]) {
        let header = header();
        let mut writer = nbam::io::Writer::new(std::fs::File::create(path).unwrap());
        writer.write_header(&header).unwrap();
        for record in records {
            writer.write_alignment_record(&header, record).unwrap();
        }
        writer.try_finish().unwrap();
    }

    fn names(path: &Path) -> Vec<String> {
        let ParsedBAMFile { mut reader, .. } = bam::open_and_parse(path).unwrap();
        reader
            .records()
            .map(|result| {
                let record = result.unwrap();
                String::from_utf8(record.name().unwrap().to_vec()).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_names() {
        let dir = Path::new("/out/mapping/A/processed_bams");
        let src = Path::new("/out/mapping/A.bam");

        assert_eq!(unique_name(src, dir).unwrap(), dir.join("A.unique.bam"));
        assert_eq!(reference_subtracted_name(src, dir).unwrap(), dir.join("A.ribosub.bam"));
        assert_eq!(sorted_name(src).unwrap(), PathBuf::from("/out/mapping/A.sorted.bam"));
        assert_eq!(
            dedup_name(Path::new("/x/A.unique.sorted.bam"), dir).unwrap(),
            dir.join("A.unique.rmdups.bam")
        );
        assert_eq!(dedup_name(src, dir).unwrap(), dir.join("A.rmdups.bam"));
        assert!(unique_name(Path::new("A.sam"), dir).is_err());
    }

    #[test]
    fn test_unique_subset_of_a_bam_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("A.bam");
        write_bam(
            &src,
            &[
                record("r1", 0, 1),
                record("r2", 0, 1),
                record("r3", 0, 2),
                record("r4", 0, 3),
                record("r5", 0, 1),
            ],
        );

        let dst = unique_subset(&src, dir.path()).unwrap();
        assert_eq!(dst, dir.path().join("A.unique.bam"));
        assert_eq!(names(&dst), ["r1", "r2", "r5"]);

        // A second call reuses the output even if the input is gone.
        std::fs::remove_file(&src).unwrap();
        assert_eq!(unique_subset(&src, dir.path()).unwrap(), dst);
    }

    #[test]
    fn test_reference_subtract_of_a_bam_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("A.bam");
        write_bam(
            &src,
            &[
                record("Q1", 0, 2),
                record("Q2", 0, 1),
                record("Q1", 1, 2),
            ],
        );

        let dst = reference_subtract(&src, "chrRibo", dir.path()).unwrap();
        assert_eq!(names(&dst), ["Q2"]);
    }

    #[test]
    fn test_reference_subtract_without_the_reference_copies_everything() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("A.bam");
        write_bam(&src, &[record("Q1", 0, 1), record("Q2", 1, 1)]);

        let dst = reference_subtract(&src, "chrM", dir.path()).unwrap();
        assert_eq!(names(&dst), ["Q1", "Q2"]);
    }

    #[test]
    fn test_missing_alignment_is_a_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = unique_subset(&dir.path().join("A.bam"), dir.path()).unwrap_err();
        assert!(err
            .chain()
            .any(|cause| cause.downcast_ref::<crate::errors::PipelineError>().is_some()));
        assert!(!dir.path().join("A.unique.bam").exists());
    }
}
