//! `samtools` invocations.

use std::path::Path;

use crate::utils::command::CommandLine;
use crate::utils::command::Invocation;

const SAMTOOLS: &str = "samtools";

/// `samtools index <src> <bai>`
pub fn index(src: &Path, bai: &Path) -> CommandLine {
    CommandLine::new(
        Invocation::new(SAMTOOLS)
            .arg("index")
            .path_arg(src)
            .path_arg(bai),
    )
}

/// `samtools sort -o <dst> <src>`, sorting by reference position.
pub fn sort(src: &Path, dst: &Path) -> CommandLine {
    CommandLine::new(
        Invocation::new(SAMTOOLS)
            .arg("sort")
            .arg("-o")
            .path_arg(dst)
            .path_arg(src),
    )
}

/// `samtools rmdup -s <src> <dst>`, removing duplicates as single-end reads.
pub fn rmdup_single_end(src: &Path, dst: &Path) -> CommandLine {
    CommandLine::new(
        Invocation::new(SAMTOOLS)
            .arg("rmdup")
            .arg("-s")
            .path_arg(src)
            .path_arg(dst),
    )
}

/// `samtools view -Sbh -`, converting SAM on standard input to BAM on
/// standard output. Meant as a pipe stage after an aligner.
pub fn sam_to_bam() -> Invocation {
    Invocation::new(SAMTOOLS).args(["view", "-Sbh", "-"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands() {
        assert_eq!(
            sort(Path::new("p/A.bam"), Path::new("p/A.sorted.bam")).to_string(),
            "samtools sort -o p/A.sorted.bam p/A.bam"
        );
        assert_eq!(
            rmdup_single_end(Path::new("A.sorted.bam"), Path::new("d/A.rmdups.bam")).to_string(),
            "samtools rmdup -s A.sorted.bam d/A.rmdups.bam"
        );
        assert_eq!(
            index(Path::new("A.bam"), Path::new("A.bam.bai")).to_string(),
            "samtools index A.bam A.bam.bai"
        );
        assert_eq!(sam_to_bam().to_string(), "samtools view -Sbh -");
    }
}
