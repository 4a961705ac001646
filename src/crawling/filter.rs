//! Response filter
//!
//! Applies the geography, activity, birth-date and age-bucket predicates to
//! decoded entries. Rejections are not errors: a skipped entry is simply
//! absent from every output and is never retried.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::response::UserEntry;
use crate::domain::{AgeRange, ProfileRecord};

/// Geography and activity thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub target_city_id: i64,
    pub region_city_min: i64,
    pub region_city_max: i64,
    /// Profiles not seen within this many days are skipped
    pub inactivity_days: i64,
}

impl FilterCriteria {
    pub fn accepts_city(&self, city_id: i64) -> bool {
        city_id == self.target_city_id
            || (self.region_city_min..=self.region_city_max).contains(&city_id)
    }

    /// `None` when the offset is too large to represent
    pub fn inactivity_offset(&self) -> Option<Duration> {
        Duration::try_days(self.inactivity_days)
    }

    /// Oldest accepted activity time; `None` means there is no cutoff
    pub fn activity_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.inactivity_offset()
            .and_then(|offset| now.checked_sub_signed(offset))
    }
}

/// Why an entry produced no record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoCity,
    CityOutOfArea(i64),
    NoActivity,
    Inactive,
    NoBirthDate,
    MalformedBirthDate(String),
    InvalidCalendarDate(String),
    NoMatchingBucket,
}

#[derive(Debug, Clone)]
pub struct ResponseFilter {
    criteria: FilterCriteria,
}

impl ResponseFilter {
    pub fn new(criteria: FilterCriteria) -> Self {
        Self { criteria }
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Records surviving every predicate, in source order
    ///
    /// Pure in its inputs: the same entries, ranges and `now` always yield
    /// the same records.
    pub fn apply(&self, entries: &[UserEntry], ranges: &[AgeRange], now: DateTime<Utc>) -> Vec<ProfileRecord> {
        entries
            .iter()
            .filter_map(|entry| match self.evaluate(entry, ranges, now) {
                Ok(record) => Some(record),
                Err(reason) => {
                    tracing::trace!("Skipping user {}: {:?}", entry.id, reason);
                    None
                }
            })
            .collect()
    }

    pub fn evaluate(
        &self,
        entry: &UserEntry,
        ranges: &[AgeRange],
        now: DateTime<Utc>,
    ) -> Result<ProfileRecord, SkipReason> {
        let city_id = entry.city.as_ref().map(|c| c.id).ok_or(SkipReason::NoCity)?;
        if !self.criteria.accepts_city(city_id) {
            return Err(SkipReason::CityOutOfArea(city_id));
        }

        let last_seen = entry.last_seen.as_ref().ok_or(SkipReason::NoActivity)?;
        if let Some(cutoff) = self.criteria.activity_cutoff(now) {
            if last_seen.time < cutoff.timestamp() {
                return Err(SkipReason::Inactive);
            }
        }

        let birth_date = parse_birth_date(entry.bdate.as_deref().ok_or(SkipReason::NoBirthDate)?)?;
        let today = now.date_naive();
        if !ranges.iter().any(|range| range.contains(birth_date, today)) {
            return Err(SkipReason::NoMatchingBucket);
        }

        Ok(ProfileRecord {
            id: entry.id,
            first_name: entry.first_name.clone().unwrap_or_default(),
            last_name: entry.last_name.clone().unwrap_or_default(),
            birth_date,
            city_id,
        })
    }
}

/// Parses `D.M.Y`; anything else, including a date hidden to `D.M`, is a skip
pub fn parse_birth_date(raw: &str) -> Result<NaiveDate, SkipReason> {
    let malformed = || SkipReason::MalformedBirthDate(raw.to_string());
    let parts: Vec<&str> = raw.trim().split('.').collect();
    let [day, month, year] = parts.as_slice() else {
        return Err(malformed());
    };
    let day: u32 = day.parse().map_err(|_| malformed())?;
    let month: u32 = month.parse().map_err(|_| malformed())?;
    let year: i32 = year.parse().map_err(|_| malformed())?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| SkipReason::InvalidCalendarDate(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawling::response::decode_response;
    use crate::test_utils::{response_body, user_json};
    use chrono::TimeZone;
    use rstest::rstest;

    fn criteria() -> FilterCriteria {
        FilterCriteria {
            target_city_id: 2,
            region_city_min: 100,
            region_city_max: 199,
            inactivity_days: 30,
        }
    }

    fn ranges() -> Vec<AgeRange> {
        vec![AgeRange::new(7, 17), AgeRange::new(18, 60)]
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 18, 12, 0, 0).unwrap()
    }

    fn run(body: &str) -> Vec<ProfileRecord> {
        let entries = decode_response(body).unwrap();
        ResponseFilter::new(criteria()).apply(&entries, &ranges(), now())
    }

    #[test]
    fn active_adult_in_region_is_kept() {
        let body = response_body(&[user_json(5, Some(104), Some(now().timestamp()), Some("15.6.2005"))]);
        let records = run(&body);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 5);
        assert_eq!(records[0].city_id, 104);
        assert_eq!(records[0].birth_date, NaiveDate::from_ymd_opt(2005, 6, 15).unwrap());
    }

    #[test]
    fn city_outside_area_is_skipped() {
        let body = response_body(&[user_json(5, Some(999_999), Some(now().timestamp()), Some("15.6.2005"))]);
        assert!(run(&body).is_empty());
    }

    #[test]
    fn missing_last_seen_is_skipped() {
        let body = response_body(&[user_json(5, Some(2), None, Some("15.6.2005"))]);
        assert!(run(&body).is_empty());
    }

    #[test]
    fn invalid_calendar_date_is_skipped_without_panicking() {
        let body = response_body(&[user_json(5, Some(2), Some(now().timestamp()), Some("31.2.2000"))]);
        assert!(run(&body).is_empty());
    }

    #[rstest]
    #[case(None, Some(0), Some("1.1.2000"), SkipReason::NoCity)]
    #[case(Some(50), Some(0), Some("1.1.2000"), SkipReason::CityOutOfArea(50))]
    #[case(Some(2), None, Some("1.1.2000"), SkipReason::NoActivity)]
    #[case(Some(2), Some(-31), Some("1.1.2000"), SkipReason::Inactive)]
    #[case(Some(2), Some(0), None, SkipReason::NoBirthDate)]
    #[case(Some(2), Some(0), Some("1.1"), SkipReason::MalformedBirthDate("1.1".into()))]
    #[case(Some(2), Some(0), Some("a.b.c"), SkipReason::MalformedBirthDate("a.b.c".into()))]
    #[case(Some(2), Some(0), Some("30.2.2001"), SkipReason::InvalidCalendarDate("30.2.2001".into()))]
    #[case(Some(2), Some(0), Some("1.1.1900"), SkipReason::NoMatchingBucket)]
    #[case(Some(2), Some(0), Some("1.1.2024"), SkipReason::NoMatchingBucket)]
    fn reports_skip_reason(
        #[case] city: Option<i64>,
        #[case] seen_days_ago: Option<i64>,
        #[case] bdate: Option<&str>,
        #[case] expected: SkipReason,
    ) {
        let seen = seen_days_ago.map(|d| (now() + Duration::days(d)).timestamp());
        let body = response_body(&[user_json(9, city, seen, bdate)]);
        let entries = decode_response(&body).unwrap();
        let result = ResponseFilter::new(criteria()).evaluate(&entries[0], &ranges(), now());
        assert_eq!(result, Err(expected));
    }

    #[test]
    fn activity_exactly_at_threshold_is_kept() {
        let seen = (now() - Duration::days(30)).timestamp();
        let body = response_body(&[user_json(1, Some(2), Some(seen), Some("1.1.2000"))]);
        assert_eq!(run(&body).len(), 1);
    }

    #[rstest]
    #[case(200_000_000)]
    #[case(i64::MAX)]
    fn unrepresentable_inactivity_offset_disables_the_cutoff(#[case] inactivity_days: i64) {
        let filter = ResponseFilter::new(FilterCriteria {
            inactivity_days,
            ..criteria()
        });
        assert_eq!(filter.criteria().activity_cutoff(now()), None);

        let long_ago = Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap().timestamp();
        let body = response_body(&[user_json(1, Some(2), Some(long_ago), Some("1.1.2000"))]);
        let entries = decode_response(&body).unwrap();
        assert_eq!(filter.apply(&entries, &ranges(), now()).len(), 1);
    }

    #[test]
    fn filtering_is_idempotent_and_preserves_order() {
        let seen = Some(now().timestamp());
        let body = response_body(&[
            user_json(3, Some(150), seen, Some("2.3.2010")),
            user_json(1, Some(999), seen, Some("2.3.2010")),
            user_json(2, Some(2), seen, Some("2.3.1990")),
        ]);
        let first = run(&body);
        let second = run(&body);
        assert_eq!(first, second);
        assert_eq!(first.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 2]);
    }

    #[test]
    fn duplicate_entries_are_not_deduplicated() {
        let seen = Some(now().timestamp());
        let body = response_body(&[
            user_json(4, Some(2), seen, Some("2.3.1990")),
            user_json(4, Some(2), seen, Some("2.3.1990")),
        ]);
        assert_eq!(run(&body).len(), 2);
    }
}
