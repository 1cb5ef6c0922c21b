//! Per-sample gene quantification.
//!
//! Every mapped read of a sample's unique alignment is assigned to each gene
//! whose exons it overlaps (a gene is counted at most once per read), and the
//! counts are turned into RPKM values:
//!
//! ```text
//! rpkm = counts * 10^9 / (exonic length * total mapped reads)
//! ```

pub mod annotation;
pub mod table;

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use noodles::sam;
use rust_lapper::Interval;
use rust_lapper::Lapper;
use tracing::info;

use crate::utils::display::RecordCounter;
use crate::utils::formats::bam;
use crate::utils::formats::bam::ParsedBAMFile;

use self::annotation::AnnotationSet;
use self::annotation::AnnotationTable;
use self::table::Measurement;
use self::table::QuantificationTable;

/// RPKM of a gene. `None` when the gene has no exonic length or nothing was
/// mapped.
pub fn rpkm(counts: u64, length: u64, total_reads: u64) -> Option<f64> {
    if length == 0 || total_reads == 0 {
        return None;
    }

    Some(counts as f64 * 1e9 / (length as f64 * total_reads as f64))
}

/// Exons of one table, indexed by chromosome for overlap queries. Interval
/// values are gene positions in the table.
pub struct ExonIndex {
    by_chrom: HashMap<String, Lapper<usize, usize>>,
}

impl ExonIndex {
    /// Indexes every exon of every gene in `table`.
    pub fn new(table: &AnnotationTable) -> Self {
        let mut intervals: HashMap<String, Vec<Interval<usize, usize>>> = HashMap::new();

        for (i, gene) in table.genes.iter().enumerate() {
            for exon in &gene.exons {
                intervals
                    .entry(exon.chrom.clone())
                    .or_default()
                    .push(Interval {
                        start: exon.start - 1,
                        stop: exon.end,
                        val: i,
                    });
            }
        }

        let by_chrom = intervals
            .into_iter()
            .map(|(chrom, intervals)| (chrom, Lapper::new(intervals)))
            .collect();

        Self { by_chrom }
    }

    /// Positions of the genes with an exon overlapping `start..=end`
    /// (1-based) on `chrom`, ascending and without repeats.
    pub fn genes_overlapping(&self, chrom: &str, start: usize, end: usize) -> Vec<usize> {
        let mut genes = match self.by_chrom.get(chrom) {
            Some(lapper) => lapper
                .find(start.saturating_sub(1), end)
                .map(|interval| interval.val)
                .collect::<Vec<_>>(),
            None => Vec::new(),
        };

        genes.sort_unstable();
        genes.dedup();
        genes
    }
}

/// Counts reads per gene of one table.
pub struct ReadCounter<'a> {
    table: &'a AnnotationTable,
    index: ExonIndex,
    counts: Vec<u64>,
}

impl<'a> ReadCounter<'a> {
    /// A counter with every gene at zero.
    pub fn new(table: &'a AnnotationTable) -> Self {
        Self {
            index: ExonIndex::new(table),
            counts: vec![0; table.genes.len()],
            table,
        }
    }

    /// Counts one read aligned to `start..=end` (1-based) on `chrom`.
    pub fn observe(&mut self, chrom: &str, start: usize, end: usize) {
        for gene in self.index.genes_overlapping(chrom, start, end) {
            self.counts[gene] += 1;
        }
    }

    /// The table this counter counts for.
    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    /// Builds the sample's quantification table.
    pub fn into_table(self, sample: &str, total_reads: u64) -> anyhow::Result<QuantificationTable> {
        let mut table = QuantificationTable::for_sample(sample);

        for (gene, counts) in self.table.genes.iter().zip(self.counts) {
            let measurement = Measurement {
                rpkm: rpkm(counts, gene.length, total_reads),
                counts: Some(counts),
            };
            table.insert(gene.key.clone(), vec![measurement])?;
        }

        Ok(table)
    }
}

/// Quantifies `alignment` against every table of `annotation` in one pass.
/// Returns one table per annotation table, in annotation order.
pub fn quantify(
    sample: &str,
    alignment: &Path,
    annotation: &AnnotationSet,
) -> anyhow::Result<Vec<(String, QuantificationTable)>> {
    info!("Quantifying {} from {}", sample, alignment.display());

    let ParsedBAMFile { mut reader, header } = bam::open_and_parse(alignment)?;
    let names = bam::reference_names(&header);

    let mut counters = annotation
        .tables()
        .iter()
        .map(ReadCounter::new)
        .collect::<Vec<_>>();

    let mut records = RecordCounter::new("records");
    let mut total_reads = 0;

    for result in reader.records() {
        let record =
            result.with_context(|| format!("reading record from {}", alignment.display()))?;
        records.inc();

        let flags = record.flags();
        if flags.is_unmapped() || flags.is_secondary() || flags.is_supplementary() {
            continue;
        }

        total_reads += 1;

        let chrom = match record.reference_sequence_id().transpose()? {
            Some(id) => match names.get(id) {
                Some(name) => name,
                None => continue,
            },
            None => continue,
        };

        let (start, end) = match (
            record.alignment_start().transpose()?,
            sam::alignment::Record::alignment_end(&record).transpose()?,
        ) {
            (Some(start), Some(end)) => (usize::from(start), usize::from(end)),
            _ => continue,
        };

        for counter in counters.iter_mut() {
            counter.observe(chrom, start, end);
        }
    }

    info!(
        "Counted {} mapped reads out of {} records.",
        total_reads,
        records.formatted()
    );

    counters
        .into_iter()
        .map(|counter| {
            let name = counter.table_name().to_string();
            Ok((name, counter.into_table(sample, total_reads)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::annotation::exonic_length;
    use super::annotation::parse_exons;
    use super::annotation::Gene;
    use super::table::GeneKey;
    use super::*;

    fn gene(id: &str, exons: &str) -> Gene {
        let parsed = parse_exons(exons).unwrap();
        Gene {
            length: exonic_length(&parsed),
            exons: parsed,
            key: GeneKey {
                gene_id: id.to_string(),
                exons: exons.to_string(),
                gene_symbol: id.to_lowercase(),
                gene_desc: String::new(),
            },
        }
    }

    fn annotation() -> AnnotationTable {
        AnnotationTable {
            name: String::from("ensGene"),
            genes: vec![
                gene("G1", "chr1:101-200:+,chr1:301-400:+"),
                gene("G2", "chr1:151-350:-"),
                gene("G3", "chr2:1-1000:+"),
            ],
        }
    }

    #[test]
    fn test_overlap_queries() {
        let table = annotation();
        let index = ExonIndex::new(&table);

        // Boundaries are inclusive.
        assert_eq!(index.genes_overlapping("chr1", 1, 101), [0]);
        assert_eq!(index.genes_overlapping("chr1", 1, 100), Vec::<usize>::new());
        // Spanning both exons of G1 counts it once.
        assert_eq!(index.genes_overlapping("chr1", 190, 310), [0, 1]);
        assert_eq!(index.genes_overlapping("chr3", 1, 10), Vec::<usize>::new());
    }

    #[test]
    fn test_counts_and_rpkm() {
        let table = annotation();
        let mut counter = ReadCounter::new(&table);

        counter.observe("chr1", 110, 120);
        counter.observe("chr1", 160, 170);
        counter.observe("chr2", 5, 20);
        counter.observe("chrX", 5, 20);

        let quantified = counter.into_table("A", 4).unwrap();
        let values = table
            .genes
            .iter()
            .map(|g| quantified.get(&g.key).unwrap()[0])
            .collect::<Vec<_>>();

        assert_eq!(values[0].counts, Some(2));
        assert_eq!(values[1].counts, Some(1));
        assert_eq!(values[2].counts, Some(1));
        // 2 reads * 1e9 / (200 bases * 4 reads)
        assert_eq!(values[0].rpkm, Some(2.5e6));
    }

    #[test]
    fn test_rpkm_without_reads_is_missing() {
        assert_eq!(rpkm(0, 100, 0), None);
        assert_eq!(rpkm(1, 0, 10), None);
        assert_eq!(rpkm(0, 100, 10), Some(0.0));
    }
}
