//! Utilities related to opening and writing Binary Alignment Map (BAM) files.

use std::fs::File;
use std::path::Path;

use anyhow::bail;
use anyhow::Context;
use noodles::bam;
use noodles::bgzf;
use noodles::sam;
use tracing::debug;

use super::BioinformaticsFileFormat;
use crate::errors::PipelineError;

/// A BAM reader over a file on disk.
pub type BamReader = bam::io::Reader<bgzf::Reader<File>>;

/// A BAM writer over a file on disk.
pub type BamWriter = bam::io::Writer<bgzf::Writer<File>>;

/// Contains the BAM file reader positioned at the first record, and the
/// parsed header from the BAM file.
pub struct ParsedBAMFile {
    /// A reader for the BAM file.
    pub reader: BamReader,

    /// The parsed header.
    pub header: sam::Header,
}

/// Opens a BAM file and reads its header.
///
/// A file that does not exist is reported as
/// [`PipelineError::MissingInput`], which is how a failed upstream tool
/// surfaces.
pub fn open_and_parse<P>(src: P) -> anyhow::Result<ParsedBAMFile>
where
    P: AsRef<Path>,
{
    let path = src.as_ref();

    match BioinformaticsFileFormat::try_detect(path) {
        Some(BioinformaticsFileFormat::BAM) => {}
        Some(format) => bail!("incompatible formats: required BAM, found {}", format),
        None => bail!("not able to determine file type for: {}", path.display()),
    }

    if !path.exists() {
        return Err(PipelineError::MissingInput(path.to_path_buf()).into());
    }

    debug!("reading BAM file from disk: {}", path.display());
    let mut reader = File::open(path)
        .map(bam::io::Reader::new)
        .with_context(|| format!("opening BAM file: {}", path.display()))?;

    let header = reader
        .read_header()
        .with_context(|| format!("reading header: {}", path.display()))?;

    Ok(ParsedBAMFile { reader, header })
}

/// Creates a BAM file at `dst` and writes `header` to it.
pub fn create<P>(dst: P, header: &sam::Header) -> anyhow::Result<BamWriter>
where
    P: AsRef<Path>,
{
    let path = dst.as_ref();
    let mut writer = File::create(path)
        .map(bam::io::Writer::new)
        .with_context(|| format!("creating BAM file: {}", path.display()))?;

    writer
        .write_header(header)
        .with_context(|| format!("writing header: {}", path.display()))?;

    Ok(writer)
}

/// Returns the names of the reference sequences in header order, so that a
/// record's reference sequence ID can be turned back into a name.
pub fn reference_names(header: &sam::Header) -> Vec<String> {
    header
        .reference_sequences()
        .keys()
        .map(|name| name.to_string())
        .collect()
}
