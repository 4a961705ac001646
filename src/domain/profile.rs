use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::id_source::UserId;

/// Header line shared by every bucket output and the combined output
pub const CSV_HEADER: &str = "Id;FirstName;LastName;BYear;BMonth;BDay;City";

/// Profile that passed every filter predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub city_id: i64,
}

impl ProfileRecord {
    /// Semicolon separated line matching [`CSV_HEADER`], without trailing newline
    pub fn to_csv_line(&self) -> String {
        format!(
            "{};{};{};{};{};{};{}",
            self.id,
            sanitize_field(&self.first_name),
            sanitize_field(&self.last_name),
            self.birth_date.year(),
            self.birth_date.month(),
            self.birth_date.day(),
            self.city_id
        )
    }
}

/// Strips separators and quotes from free text; nothing is escaped
pub fn sanitize_field(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ',' | ';' | '"'))
        .collect()
}
