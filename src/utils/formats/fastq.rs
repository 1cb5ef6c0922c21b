//! Utilities related to opening and writing FASTQ files.

use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;

use anyhow::bail;
use anyhow::Context;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use noodles::fastq;

use super::BioinformaticsFileFormat;
use crate::errors::PipelineError;

/// Opens a FASTQ file for reading, transparently decompressing gzipped input.
pub fn reader<P>(src: P) -> anyhow::Result<fastq::io::Reader<Box<dyn BufRead>>>
where
    P: AsRef<Path>,
{
    let path = src.as_ref();

    if !path.exists() {
        return Err(PipelineError::MissingInput(path.to_path_buf()).into());
    }

    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;

    let inner: Box<dyn BufRead> = match BioinformaticsFileFormat::try_detect(path) {
        Some(BioinformaticsFileFormat::FASTQ_GZ) => {
            Box::new(BufReader::new(MultiGzDecoder::new(file)))
        }
        Some(BioinformaticsFileFormat::FASTQ) => Box::new(BufReader::new(file)),
        Some(format) => bail!("incompatible formats: required FASTQ, found {}", format),
        None => bail!("not able to determine file type for: {}", path.display()),
    };

    Ok(fastq::io::Reader::new(inner))
}

/// Opens a FASTQ file for writing, compressing the output if the file name
/// ends in `.gz`.
pub fn writer<P>(dst: P) -> anyhow::Result<fastq::io::Writer<Box<dyn Write>>>
where
    P: AsRef<Path>,
{
    let path = dst.as_ref();

    let compress = match BioinformaticsFileFormat::try_detect(path) {
        Some(BioinformaticsFileFormat::FASTQ_GZ) => true,
        Some(BioinformaticsFileFormat::FASTQ) => false,
        Some(format) => bail!("incompatible formats: required FASTQ, found {}", format),
        None => bail!("not able to determine file type for: {}", path.display()),
    };

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;

    let inner: Box<dyn Write> = if compress {
        Box::new(BufWriter::new(GzEncoder::new(file, Compression::default())))
    } else {
        Box::new(BufWriter::new(file))
    };

    Ok(fastq::io::Writer::new(inner))
}
