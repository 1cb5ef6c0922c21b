//! Extensions to and utilities concerning [`PathBuf`]s.
//!
//! # Overview
//!
//! Nearly every pipeline stage derives its output name from its input name:
//! an index lives next to its alignment as `<file>.bai`, a unique subset of
//! `A.bam` becomes `A.unique.bam`, and so on. This module collects those
//! conventions in one place so each stage does not roll its own string
//! surgery.
//!
//! ```
//! use std::path::PathBuf;
//! // Trait must be in scope to use it.
//! use seqflow::utils::pathbuf::AppendExtension;
//!
//! assert_eq!(
//!     PathBuf::from("sample.bam")
//!         .append_extension("bai")
//!         .unwrap(),
//!     PathBuf::from("sample.bam.bai"))
//! ```

use std::ffi::OsStr;
use std::path::Path;
use std::path::PathBuf;

use anyhow::bail;
use anyhow::Context;

/// A trait that adds an [`append_extension`][AppendExtension::append_extension]
/// method to [`PathBuf`]. Index files are named after the file they index
/// with one extra extension, which this makes trivial to express.
pub trait AppendExtension {
    /// Appends the specified further extension.
    ///
    /// ```
    /// use std::path::PathBuf;
    /// use seqflow::utils::pathbuf::AppendExtension;
    ///
    /// let bam = PathBuf::from("mapping/A.sorted.bam");
    /// let bai = bam.append_extension("bai").unwrap();
    /// assert_eq!(bai.file_name().unwrap(), "A.sorted.bam.bai");
    /// ```
    fn append_extension<P>(self, ext: P) -> anyhow::Result<Self>
    where
        Self: Sized,
        P: AsRef<OsStr>;
}

impl AppendExtension for PathBuf {
    fn append_extension<P>(mut self, ext: P) -> anyhow::Result<Self>
    where
        P: AsRef<OsStr>,
    {
        let mut new_ext = match self.extension() {
            Some(ext) => ext.to_os_string(),
            None => bail!("path did not have an extension: {}", self.display()),
        };

        new_ext.push(".");
        new_ext.push(ext);

        self.set_extension(new_ext);
        Ok(self)
    }
}

/// Returns the file name of `path` as a `&str`.
pub fn file_name_str(path: &Path) -> anyhow::Result<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("path has no UTF-8 file name: {}", path.display()))
}

/// Returns the file name of `path` with the first matching suffix in
/// `suffixes` removed. If none match, the whole file name is returned.
///
/// ```
/// use std::path::Path;
/// use seqflow::utils::pathbuf::strip_suffixes;
///
/// let reads = Path::new("/data/A_R1.fastq.gz");
/// assert_eq!(strip_suffixes(reads, &[".fastq.gz", ".fastq"]).unwrap(), "A_R1");
/// ```
pub fn strip_suffixes<'a>(path: &'a Path, suffixes: &[&str]) -> anyhow::Result<&'a str> {
    let name = file_name_str(path)?;

    Ok(suffixes
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name))
}

/// Returns the stem of a BAM file name, i.e. the file name without `.bam`.
/// Errors if the file does not end in `.bam`.
pub fn bam_stem(path: &Path) -> anyhow::Result<&str> {
    let name = file_name_str(path)?;

    match name.strip_suffix(".bam") {
        Some(stem) if !stem.is_empty() => Ok(stem),
        _ => bail!("alignment file does not end in .bam: {}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_extension_requires_an_extension() {
        assert!(PathBuf::from("mapping/A").append_extension("bai").is_err());
    }

    #[test]
    fn test_bam_stem() {
        assert_eq!(
            bam_stem(Path::new("out/A.unique.sorted.bam")).unwrap(),
            "A.unique.sorted"
        );
        assert!(bam_stem(Path::new("out/A.sam")).is_err());
        assert!(bam_stem(Path::new("out/.bam")).is_err());
    }

    #[test]
    fn test_strip_suffixes_takes_first_match() {
        let path = Path::new("A.fastq.gz");
        assert_eq!(strip_suffixes(path, &[".gz", ".fastq.gz"]).unwrap(), "A.fastq");
        assert_eq!(strip_suffixes(path, &[".fq"]).unwrap(), "A.fastq.gz");
    }
}
