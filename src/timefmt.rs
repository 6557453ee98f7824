//! Strict parsing of `yyyy-MM-dd-HH-mm-ss` query boundaries.

use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use crate::error::{Error, Result};
use crate::event::TimeBasis;

/// Human-readable form of the accepted boundary format.
pub const BOUNDARY_PATTERN: &str = "yyyy-MM-dd-HH-mm-ss";

// chrono accepts unpadded fields, so the shape is checked first.
static BOUNDARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2}$").unwrap());

const BOUNDARY_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Parse a query boundary in the given time basis into a UTC instant.
pub fn parse_boundary(input: &str, basis: TimeBasis) -> Result<DateTime<Utc>> {
    if !BOUNDARY_RE.is_match(input) {
        return Err(invalid(input));
    }

    let naive = NaiveDateTime::parse_from_str(input, BOUNDARY_FORMAT).map_err(|_| invalid(input))?;

    match basis {
        TimeBasis::Utc => Ok(naive.and_utc()),
        // Ambiguous local times (DST fold) resolve to the earlier instant;
        // times skipped by a DST gap do not exist and are rejected.
        TimeBasis::Local => Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| {
                Error::Validation(format!("'{}' does not exist in the local time zone", input))
            }),
    }
}

fn invalid(input: &str) -> Error {
    Error::Validation(format!(
        "Invalid time '{}', expected {}",
        input, BOUNDARY_PATTERN
    ))
}
