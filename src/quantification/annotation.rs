//! Reference gene tables.
//!
//! The reference annotation set lives in `<init dir>/rpkm/` as one
//! tab-separated file per table (`ensGene.txt`, `knownGene.txt`, ...), each
//! with the columns `gene_id`, `exons`, `gene_symbol`, and `gene_desc`. The
//! `exons` column is a comma-separated list of `chrom:start-end:strand`
//! entries with 1-based, inclusive coordinates.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::bail;
use anyhow::Context;
use serde::Deserialize;
use tracing::debug;
use tracing::warn;

use super::table::GeneKey;

/// One exon of a gene.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Exon {
    /// Chromosome name.
    pub chrom: String,

    /// First base, 1-based.
    pub start: usize,

    /// Last base, 1-based inclusive.
    pub end: usize,

    /// `+`, `-`, or `.`.
    pub strand: char,
}

impl FromStr for Exon {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().rsplitn(3, ':');

        let (strand, range, chrom) = match (parts.next(), parts.next(), parts.next()) {
            (Some(strand), Some(range), Some(chrom)) if !chrom.is_empty() => (strand, range, chrom),
            _ => bail!("exon is not of the form chrom:start-end:strand: {}", s),
        };

        let strand = match strand {
            "+" | "-" | "." => strand.chars().next().unwrap_or('.'),
            _ => bail!("invalid strand in exon: {}", s),
        };

        let (start, end) = range
            .split_once('-')
            .with_context(|| format!("exon has no start-end range: {}", s))?;
        let start: usize = start
            .parse()
            .with_context(|| format!("invalid exon start: {}", s))?;
        let end: usize = end
            .parse()
            .with_context(|| format!("invalid exon end: {}", s))?;

        if start == 0 || end < start {
            bail!("invalid exon coordinates: {}", s);
        }

        Ok(Self {
            chrom: chrom.to_string(),
            start,
            end,
            strand,
        })
    }
}

/// Parses an exon signature (`chrom:start-end:strand` entries joined by
/// commas).
pub fn parse_exons(signature: &str) -> anyhow::Result<Vec<Exon>> {
    signature
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(str::parse)
        .collect()
}

/// The number of bases covered by `exons`, counting overlapping exons once.
pub fn exonic_length(exons: &[Exon]) -> u64 {
    let mut ranges = exons
        .iter()
        .map(|exon| (exon.chrom.as_str(), exon.start, exon.end))
        .collect::<Vec<_>>();
    ranges.sort_unstable();

    let mut total = 0;
    let mut current: Option<(&str, usize, usize)> = None;

    for (chrom, start, end) in ranges {
        current = match current {
            Some((c, s, e)) if c == chrom && start <= e + 1 => Some((c, s, e.max(end))),
            Some((_, s, e)) => {
                total += (e - s + 1) as u64;
                Some((chrom, start, end))
            }
            None => Some((chrom, start, end)),
        };
    }

    if let Some((_, s, e)) = current {
        total += (e - s + 1) as u64;
    }

    total
}

#[derive(Debug, Deserialize)]
struct GeneRow {
    gene_id: String,
    exons: String,
    gene_symbol: String,
    gene_desc: String,
}

/// A gene of a reference table.
#[derive(Clone, Debug)]
pub struct Gene {
    /// The columns a merged table is keyed by.
    pub key: GeneKey,

    /// Parsed exons.
    pub exons: Vec<Exon>,

    /// Bases covered by the exons.
    pub length: u64,
}

/// One reference gene table.
#[derive(Clone, Debug)]
pub struct AnnotationTable {
    /// Table name (the file stem).
    pub name: String,

    /// Genes in file order.
    pub genes: Vec<Gene>,
}

impl AnnotationTable {
    /// Reads a table from a tab-separated file.
    pub fn read<P>(name: &str, src: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let src = src.as_ref();
        debug!("reading gene table {} from {}", name, src.display());

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .from_path(src)
            .with_context(|| format!("opening gene table: {}", src.display()))?;

        let mut genes = Vec::new();
        for result in reader.deserialize() {
            let row: GeneRow =
                result.with_context(|| format!("reading gene table: {}", src.display()))?;
            let exons = parse_exons(&row.exons)
                .with_context(|| format!("gene {} in {}", row.gene_id, src.display()))?;

            genes.push(Gene {
                length: exonic_length(&exons),
                exons,
                key: GeneKey {
                    gene_id: row.gene_id,
                    exons: row.exons,
                    gene_symbol: row.gene_symbol,
                    gene_desc: row.gene_desc,
                },
            });
        }

        Ok(Self {
            name: name.to_string(),
            genes,
        })
    }
}

/// All reference tables of a run, ordered by name.
#[derive(Clone, Debug, Default)]
pub struct AnnotationSet {
    tables: Vec<AnnotationTable>,
}

impl AnnotationSet {
    /// Creates a set from already loaded tables.
    pub fn new(mut tables: Vec<AnnotationTable>) -> Self {
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Self { tables }
    }

    /// Loads every `*.txt` table in `<init_dir>/rpkm`. A missing directory
    /// yields an empty set with a warning.
    pub fn discover(init_dir: &Path) -> anyhow::Result<Self> {
        let dir = init_dir.join("rpkm");

        if !dir.is_dir() {
            warn!("No gene tables found: {} is not a directory", dir.display());
            return Ok(Self::default());
        }

        let mut tables = Vec::new();
        let entries =
            fs::read_dir(&dir).with_context(|| format!("listing gene tables in {}", dir.display()))?;

        for entry in entries {
            let path = entry?.path();

            if path.extension().and_then(|ext| ext.to_str()) != Some("txt") {
                continue;
            }

            let name = match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            tables.push(AnnotationTable::read(&name, &path)?);
        }

        Ok(Self::new(tables))
    }

    /// The tables, ordered by name.
    pub fn tables(&self) -> &[AnnotationTable] {
        &self.tables
    }

    /// The table names, in order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|table| table.name.as_str()).collect()
    }
}
