//! Age buckets and the sinks they write to
//!
//! A record goes to every bucket whose range contains its birth date, and
//! exactly once to the combined output no matter how many buckets match.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::domain::{AgeRange, ProfileRecord};
use crate::infrastructure::sinks::{LineSink, SinkError};

#[derive(Debug, Clone)]
pub struct AgeBucket {
    pub name: String,
    pub range: AgeRange,
    pub sink: Arc<LineSink>,
}

impl AgeBucket {
    pub fn new(name: impl Into<String>, range: AgeRange, sink: Arc<LineSink>) -> Self {
        Self {
            name: name.into(),
            range,
            sink,
        }
    }

    pub fn contains(&self, birth: NaiveDate, today: NaiveDate) -> bool {
        self.range.contains(birth, today)
    }
}

/// Buckets plus the all-ages output, shared by every pass
#[derive(Debug, Clone)]
pub struct BucketSet {
    buckets: Vec<AgeBucket>,
    ranges: Vec<AgeRange>,
    combined: Option<Arc<LineSink>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouteSummary {
    /// Lines written across bucket sinks
    pub bucket_lines: usize,
    /// Lines written to the combined sink
    pub combined_lines: usize,
}

impl BucketSet {
    pub fn new(buckets: Vec<AgeBucket>, combined: Option<Arc<LineSink>>) -> Self {
        let ranges = buckets.iter().map(|b| b.range).collect();
        Self {
            buckets,
            ranges,
            combined,
        }
    }

    pub fn buckets(&self) -> &[AgeBucket] {
        &self.buckets
    }

    /// Predicates only, as consumed by the response filter
    pub fn ranges(&self) -> &[AgeRange] {
        &self.ranges
    }

    /// Writes each bucket's share under that bucket's own lock, then the
    /// combined output
    ///
    /// Delivery is at-least-once: the first failing sink stops routing, but
    /// shares already written stay written. The batch then fails as a whole,
    /// so its retry repeats those lines in the sinks that had succeeded.
    pub fn route(&self, records: &[ProfileRecord], today: NaiveDate) -> Result<RouteSummary, SinkError> {
        let mut summary = RouteSummary::default();
        if records.is_empty() {
            return Ok(summary);
        }

        let lines: Vec<String> = records.iter().map(ProfileRecord::to_csv_line).collect();
        for bucket in &self.buckets {
            let matching: Vec<&str> = records
                .iter()
                .zip(&lines)
                .filter(|(record, _)| bucket.contains(record.birth_date, today))
                .map(|(_, line)| line.as_str())
                .collect();
            bucket.sink.write_lines(&matching)?;
            summary.bucket_lines += matching.len();
        }

        if let Some(combined) = &self.combined {
            combined.write_lines(&lines)?;
            summary.combined_lines = lines.len();
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FailingWriter, MemoryWriter};

    fn record(id: u64, y: i32) -> ProfileRecord {
        ProfileRecord {
            id,
            first_name: "F".into(),
            last_name: "L".into(),
            birth_date: NaiveDate::from_ymd_opt(y, 1, 1).unwrap(),
            city_id: 2,
        }
    }

    #[test]
    fn overlapping_buckets_write_once_to_combined() {
        let teens = MemoryWriter::default();
        let young = MemoryWriter::default();
        let all = MemoryWriter::default();
        let set = BucketSet::new(
            vec![
                AgeBucket::new("teens", AgeRange::new(13, 19), Arc::new(LineSink::from_writer("teens", teens.clone()))),
                AgeBucket::new("young", AgeRange::new(16, 25), Arc::new(LineSink::from_writer("young", young.clone()))),
            ],
            Some(Arc::new(LineSink::from_writer("all", all.clone()))),
        );
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        // ages 17, 23, 14
        let summary = set
            .route(&[record(1, 2008), record(2, 2002), record(3, 2011)], today)
            .unwrap();

        assert_eq!(teens.contents().lines().collect::<Vec<_>>(), vec!["1;F;L;2008;1;1;2", "3;F;L;2011;1;1;2"]);
        assert_eq!(young.contents().lines().count(), 2);
        assert_eq!(all.contents().lines().count(), 3);
        assert_eq!(summary, RouteSummary { bucket_lines: 4, combined_lines: 3 });
    }

    #[test]
    fn failing_sink_stops_routing_after_earlier_shares() {
        let children = MemoryWriter::default();
        let all = MemoryWriter::default();
        let set = BucketSet::new(
            vec![
                AgeBucket::new("children", AgeRange::new(7, 17), Arc::new(LineSink::from_writer("children", children.clone()))),
                AgeBucket::new("adults", AgeRange::new(18, 60), Arc::new(LineSink::from_writer("adults", FailingWriter))),
            ],
            Some(Arc::new(LineSink::from_writer("all", all.clone()))),
        );
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let err = set.route(&[record(1, 2015), record(2, 1990)], today).unwrap_err();
        assert!(matches!(err, SinkError::Write { ref name, .. } if name == "adults"));
        assert_eq!(children.contents(), "1;F;L;2015;1;1;2\n");
        assert!(all.contents().is_empty());
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let out = MemoryWriter::default();
        let set = BucketSet::new(
            vec![AgeBucket::new("a", AgeRange::new(0, 99), Arc::new(LineSink::from_writer("a", out.clone())))],
            None,
        );
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(set.route(&[], today).unwrap(), RouteSummary::default());
        assert!(out.contents().is_empty());
    }
}
