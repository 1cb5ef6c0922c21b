//! Utilities related to displaying things.

use num_format::Locale;
use num_format::ToFormattedString;
use tracing::info;

/// Utility struct used to uniformly count and report the number of records
/// processed by a streaming pass.
pub struct RecordCounter {
    /// What is being counted, used as the log prefix.
    label: &'static str,

    /// The number of records processed.
    count: usize,

    /// The number of records to log every.
    log_every: usize,
}

impl RecordCounter {
    /// Creates a new `RecordCounter` that logs every million records.
    pub fn new(label: &'static str) -> Self {
        RecordCounter {
            label,
            count: 0,
            log_every: 1_000_000,
        }
    }

    /// Gets the current number of records counted.
    pub fn get(&self) -> usize {
        self.count
    }

    /// Increments the counter and reports the number of records processed (if
    /// appropriate).
    pub fn inc(&mut self) {
        self.count += 1;

        if self.count % self.log_every == 0 {
            info!(
                "  [*] {}: processed {} records.",
                self.label,
                self.count.to_formatted_string(&Locale::en),
            );
        }
    }

    /// Formats the current count with thousands separators.
    pub fn formatted(&self) -> String {
        self.count.to_formatted_string(&Locale::en)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_counts_and_formats() {
        let mut counter = RecordCounter::new("test");
        for _ in 0..1_234 {
            counter.inc();
        }
        assert_eq!(counter.get(), 1_234);
        assert_eq!(counter.formatted(), "1,234");
    }
}
