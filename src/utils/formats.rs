//! Utilities related to the bioinformatics file formats the pipeline reads
//! and writes itself.

pub mod bam;
pub mod fastq;

use std::fmt;
use std::path::Path;

/// File formats recognized by their file name.
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BioinformaticsFileFormat {
    /// Binary Alignment Map.
    BAM,

    /// FASTA sequences.
    FASTA,

    /// Uncompressed FASTQ reads.
    FASTQ,

    /// Gzip-compressed FASTQ reads.
    FASTQ_GZ,
}

impl BioinformaticsFileFormat {
    /// Attempts to detect the format of a file from its name.
    pub fn try_detect<P>(path: P) -> Option<Self>
    where
        P: AsRef<Path>,
    {
        let name = path.as_ref().file_name()?.to_str()?.to_ascii_lowercase();

        if name.ends_with(".bam") {
            Some(Self::BAM)
        } else if name.ends_with(".fastq.gz") || name.ends_with(".fq.gz") {
            Some(Self::FASTQ_GZ)
        } else if name.ends_with(".fastq") || name.ends_with(".fq") {
            Some(Self::FASTQ)
        } else if name.ends_with(".fasta") || name.ends_with(".fa") {
            Some(Self::FASTA)
        } else {
            None
        }
    }
}

impl fmt::Display for BioinformaticsFileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BAM => write!(f, "BAM"),
            Self::FASTA => write!(f, "FASTA"),
            Self::FASTQ => write!(f, "FASTQ"),
            Self::FASTQ_GZ => write!(f, "gzipped FASTQ"),
        }
    }
}
