//! Backend time encodings.
//!
//! Directory backends store timestamps as generalized time
//! (`yyyyMMddHHmmss.SSSZ`); document backends store them as
//! `yyyy-MM-ddTHH:mm:ss.SSS` in UTC.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{ModelError, ModelResult};

const GENERALIZED_TIME: &str = "%Y%m%d%H%M%S%.3fZ";
const DOCUMENT_TIME: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Format a timestamp as generalized time with millisecond precision.
pub fn format_generalized_time(time: &DateTime<Utc>) -> String {
    time.format(GENERALIZED_TIME).to_string()
}

/// Parse generalized time. The fractional part is optional, the `Z`
/// suffix is required.
pub fn parse_generalized_time(input: &str) -> ModelResult<DateTime<Utc>> {
    let body = input
        .strip_suffix('Z')
        .or_else(|| input.strip_suffix('z'))
        .ok_or_else(|| invalid(input))?;
    NaiveDateTime::parse_from_str(body, "%Y%m%d%H%M%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| invalid(input))
}

/// Format a timestamp in the document store layout.
pub fn format_document_time(time: &DateTime<Utc>) -> String {
    time.format(DOCUMENT_TIME).to_string()
}

/// Parse the document store layout.
pub fn parse_document_time(input: &str) -> ModelResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| invalid(input))
}

fn invalid(input: &str) -> ModelError {
    ModelError::InvalidTimestamp {
        input: input.to_string(),
    }
}
