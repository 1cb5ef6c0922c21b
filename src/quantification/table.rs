//! Quantification tables and their strict inner join.
//!
//! A table holds one row per gene and, per sample, an RPKM column and a raw
//! count column. On disk the columns are
//!
//! ```text
//! gene_id  gene_symbol  rpkm_<s1> ... rpkm_<sN>  counts_<s1> ... counts_<sN>  gene_desc  exons
//! ```
//!
//! with missing values written as `NA`.

use std::path::Path;

use anyhow::bail;
use anyhow::Context;
use indexmap::IndexMap;

/// Token written for a missing value.
pub const MISSING: &str = "NA";

const RPKM_PREFIX: &str = "rpkm_";
const COUNTS_PREFIX: &str = "counts_";

/// The columns rows are joined on.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct GeneKey {
    /// Gene identifier.
    pub gene_id: String,

    /// Exon signature, as listed in the reference table.
    pub exons: String,

    /// Gene symbol.
    pub gene_symbol: String,

    /// Free-text description.
    pub gene_desc: String,
}

/// One sample's values for one gene.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Measurement {
    /// Reads per kilobase of exon per million mapped reads.
    pub rpkm: Option<f64>,

    /// Reads counted on the gene's exons.
    pub counts: Option<u64>,
}

/// Per-gene quantities for one or more samples.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuantificationTable {
    samples: Vec<String>,
    rows: IndexMap<GeneKey, Vec<Measurement>>,
}

impl QuantificationTable {
    /// An empty table for a single sample.
    pub fn for_sample<S>(sample: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            samples: vec![sample.into()],
            rows: IndexMap::new(),
        }
    }

    /// Adds or replaces the row for `key`. Errors unless there is exactly one
    /// measurement per sample.
    pub fn insert(&mut self, key: GeneKey, measurements: Vec<Measurement>) -> anyhow::Result<()> {
        if measurements.len() != self.samples.len() {
            bail!(
                "row for {} has {} measurements, expected {}",
                key.gene_id,
                measurements.len(),
                self.samples.len()
            );
        }

        self.rows.insert(key, measurements);
        Ok(())
    }

    /// Sample names, in column order.
    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The measurements for a gene, one per sample.
    pub fn get(&self, key: &GeneKey) -> Option<&[Measurement]> {
        self.rows.get(key).map(Vec::as_slice)
    }

    /// Iterates over rows in table order.
    pub fn rows(&self) -> impl Iterator<Item = (&GeneKey, &[Measurement])> + '_ {
        self.rows.iter().map(|(key, values)| (key, values.as_slice()))
    }

    /// Joins `other` onto this table. Only genes present in both tables are
    /// kept, in this table's order; `other`'s samples are appended after this
    /// table's.
    pub fn inner_join(&self, other: &QuantificationTable) -> Self {
        let mut samples = self.samples.clone();
        samples.extend(other.samples.iter().cloned());

        let rows = self
            .rows
            .iter()
            .filter_map(|(key, left)| {
                let right = other.rows.get(key)?;
                let mut values = left.clone();
                values.extend_from_slice(right);
                Some((key.clone(), values))
            })
            .collect();

        Self { samples, rows }
    }

    /// Writes the table as tab-separated text.
    pub fn write(&self, dst: &Path) -> anyhow::Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(csv::QuoteStyle::Never)
            .from_path(dst)
            .with_context(|| format!("creating table: {}", dst.display()))?;

        let mut header = vec![String::from("gene_id"), String::from("gene_symbol")];
        header.extend(self.samples.iter().map(|s| format!("{}{}", RPKM_PREFIX, s)));
        header.extend(self.samples.iter().map(|s| format!("{}{}", COUNTS_PREFIX, s)));
        header.push(String::from("gene_desc"));
        header.push(String::from("exons"));
        writer.write_record(&header)?;

        for (key, values) in &self.rows {
            let mut record = vec![key.gene_id.clone(), key.gene_symbol.clone()];
            record.extend(values.iter().map(|m| render(m.rpkm)));
            record.extend(values.iter().map(|m| render(m.counts)));
            record.push(key.gene_desc.clone());
            record.push(key.exons.clone());
            writer.write_record(&record)?;
        }

        writer
            .flush()
            .with_context(|| format!("writing table: {}", dst.display()))?;
        Ok(())
    }

    /// Reads a table written by [`write`](Self::write).
    pub fn read(src: &Path) -> anyhow::Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .from_path(src)
            .with_context(|| format!("opening table: {}", src.display()))?;

        let header = reader.headers()?.clone();
        let n = header.len();
        if n < 4 || (n - 4) % 2 != 0 {
            bail!("unexpected table header in {}", src.display());
        }
        let num_samples = (n - 4) / 2;

        let mut samples = Vec::with_capacity(num_samples);
        for i in 0..num_samples {
            let rpkm = &header[2 + i];
            let counts = &header[2 + num_samples + i];

            match (rpkm.strip_prefix(RPKM_PREFIX), counts.strip_prefix(COUNTS_PREFIX)) {
                (Some(a), Some(b)) if a == b => samples.push(a.to_string()),
                _ => bail!(
                    "mismatched sample columns `{}` and `{}` in {}",
                    rpkm,
                    counts,
                    src.display()
                ),
            }
        }

        let mut table = Self {
            samples,
            rows: IndexMap::new(),
        };

        for result in reader.records() {
            let record = result.with_context(|| format!("reading table: {}", src.display()))?;

            let key = GeneKey {
                gene_id: record[0].to_string(),
                gene_symbol: record[1].to_string(),
                gene_desc: record[n - 2].to_string(),
                exons: record[n - 1].to_string(),
            };

            let mut values = Vec::with_capacity(num_samples);
            for i in 0..num_samples {
                values.push(Measurement {
                    rpkm: parse(&record[2 + i])?,
                    counts: parse(&record[2 + num_samples + i])?,
                });
            }

            table.rows.insert(key, values);
        }

        Ok(table)
    }
}

fn render<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| String::from(MISSING))
}

fn parse<T>(cell: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if cell == MISSING {
        return Ok(None);
    }

    cell.parse()
        .map(Some)
        .with_context(|| format!("invalid value in table: {}", cell))
}
