//! Calendar age arithmetic
//!
//! Ages are whole years computed on calendar dates, never from elapsed
//! seconds: someone born on 15.06.2005 turns 20 on 15.06.2025 regardless of
//! leap days in between. A 29 February birthday counts as passed only once
//! the calendar reaches 1 March in non-leap years.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Whole years between `birth` and `today`; negative when `birth` is in the future
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

/// Inclusive age range `[min_age, max_age]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min_age: u32,
    pub max_age: u32,
}

impl AgeRange {
    pub const fn new(min_age: u32, max_age: u32) -> Self {
        Self { min_age, max_age }
    }

    /// True iff the age reached by `today` lies in the range
    pub fn contains(&self, birth: NaiveDate, today: NaiveDate) -> bool {
        let age = age_on(birth, today);
        u32::try_from(age).is_ok_and(|age| (self.min_age..=self.max_age).contains(&age))
    }

    pub fn is_valid(&self) -> bool {
        self.min_age <= self.max_age
    }
}

impl std::fmt::Display for AgeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.min_age, self.max_age)
    }
}
