//! Domain module - identifiers, ages and profile records
//!
//! Pure types with no I/O; the crawling engine and infrastructure build on
//! these.

pub mod age;
pub mod id_source;
pub mod profile;

pub use age::{AgeRange, age_on};
pub use id_source::{IdSource, IdSourceError, UserId};
pub use profile::{CSV_HEADER, ProfileRecord, sanitize_field};
