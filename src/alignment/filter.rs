//! Streaming record filters.
//!
//! The filters take any iterator of records and hand every retained record to
//! a sink, so they run the same way over a BAM file on disk and over records
//! built in memory.

use std::collections::HashSet;
use std::io;

use noodles::bam;
use noodles::sam::alignment::record::data::field::Tag;

use crate::utils::display::RecordCounter;

/// The parts of an alignment record the filters look at.
pub trait AlignmentRecord {
    /// The query (read) name, if the record has one.
    fn query_name(&self) -> Option<&[u8]>;

    /// The index of the reference sequence in the header, if the record is
    /// placed on one.
    fn reference_id(&self) -> io::Result<Option<usize>>;

    /// The number of reported alignments for the query (the `NH` tag).
    fn multiplicity(&self) -> io::Result<Option<i64>>;
}

impl AlignmentRecord for bam::Record {
    fn query_name(&self) -> Option<&[u8]> {
        let name: &[u8] = self.name()?;
        Some(name)
    }

    fn reference_id(&self) -> io::Result<Option<usize>> {
        self.reference_sequence_id().transpose()
    }

    fn multiplicity(&self) -> io::Result<Option<i64>> {
        match self.data().get(&Tag::ALIGNMENT_HIT_COUNT) {
            Some(value) => Ok(value?.as_int()),
            None => Ok(None),
        }
    }
}

/// How many records a filter saw and how many it passed on.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FilterSummary {
    /// Records read.
    pub seen: usize,

    /// Records handed to the sink.
    pub kept: usize,
}

/// Passes on exactly the records whose multiplicity is 1, in input order.
/// Records without an `NH` tag are dropped.
pub fn retain_unique<R, I, F>(records: I, mut sink: F) -> anyhow::Result<FilterSummary>
where
    R: AlignmentRecord,
    I: IntoIterator<Item = io::Result<R>>,
    F: FnMut(&R) -> anyhow::Result<()>,
{
    let mut counter = RecordCounter::new("records");
    let mut summary = FilterSummary::default();

    for result in records {
        let record = result?;
        counter.inc();

        if record.multiplicity()? == Some(1) {
            sink(&record)?;
            summary.kept += 1;
        }
    }

    summary.seen = counter.get();
    Ok(summary)
}

/// Collects the names of all queries with at least one record on the
/// reference sequence `reference_id`.
pub fn queries_touching<R, I>(records: I, reference_id: usize) -> anyhow::Result<HashSet<Vec<u8>>>
where
    R: AlignmentRecord,
    I: IntoIterator<Item = io::Result<R>>,
{
    let mut names = HashSet::new();

    for result in records {
        let record = result?;

        if record.reference_id()? == Some(reference_id) {
            if let Some(name) = record.query_name() {
                names.insert(name.to_vec());
            }
        }
    }

    Ok(names)
}

/// Passes on every record whose query is not in `excluded`, in input order.
/// One listed query name removes all of that query's records.
pub fn drop_queries<R, I, F>(
    records: I,
    excluded: &HashSet<Vec<u8>>,
    mut sink: F,
) -> anyhow::Result<FilterSummary>
where
    R: AlignmentRecord,
    I: IntoIterator<Item = io::Result<R>>,
    F: FnMut(&R) -> anyhow::Result<()>,
{
    let mut counter = RecordCounter::new("records");
    let mut summary = FilterSummary::default();

    for result in records {
        let record = result?;
        counter.inc();

        let drop = record
            .query_name()
            .map(|name| excluded.contains(name))
            .unwrap_or(false);

        if !drop {
            sink(&record)?;
            summary.kept += 1;
        }
    }

    summary.seen = counter.get();
    Ok(summary)
}
