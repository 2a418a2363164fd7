//! Naive instants shared by every time axis.
//!
//! The kernel never sees offsets: callers normalize to one canonical naive
//! calendar before handing instants over.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime};

use crate::KernelError;

/// A naive point on either time axis.
pub type Instant = PrimitiveDateTime;

const INSTANT_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const INSTANT_T_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const CAPTION_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[day]-[month repr:short]-[year]");

/// Parse `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, or a bare `YYYY-MM-DD` (midnight).
///
/// # Errors
/// Returns [`KernelError::Parse`] when the text matches none of the accepted forms.
pub fn parse_instant(value: &str) -> Result<Instant, KernelError> {
    let value = value.trim();
    if let Ok(instant) = PrimitiveDateTime::parse(value, INSTANT_FORMAT) {
        return Ok(instant);
    }
    if let Ok(instant) = PrimitiveDateTime::parse(value, INSTANT_T_FORMAT) {
        return Ok(instant);
    }
    Date::parse(value, DATE_FORMAT).map(Date::midnight).map_err(|err| {
        KernelError::Parse(format!(
            "invalid instant `{value}` (expected YYYY-MM-DD[ HH:MM:SS]): {err}"
        ))
    })
}

/// Canonical `YYYY-MM-DD HH:MM:SS` text form, sub-second precision dropped.
#[must_use]
pub fn format_instant(instant: Instant) -> String {
    instant.format(INSTANT_FORMAT).unwrap_or_else(|_| instant.to_string())
}

/// Day-month-year form used for cursor captions, e.g. `01-Jun-2024`.
#[must_use]
pub fn format_caption_date(instant: Instant) -> String {
    instant.format(CAPTION_FORMAT).unwrap_or_else(|_| instant.date().to_string())
}

/// Serde adapter writing instants in their canonical text form.
pub mod serde_instant {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{format_instant, parse_instant, Instant};

    /// # Errors
    /// Propagates serializer failures.
    pub fn serialize<S>(instant: &Instant, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_instant(*instant))
    }

    /// # Errors
    /// Fails when the input is not a string in an accepted instant form.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Instant, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_instant(&raw).map_err(serde::de::Error::custom)
    }
}

/// Same as [`serde_instant`] for optional instants; `None` maps to `null`.
pub mod serde_instant_option {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{format_instant, parse_instant, Instant};

    /// # Errors
    /// Propagates serializer failures.
    pub fn serialize<S>(instant: &Option<Instant>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match instant {
            Some(instant) => serializer.serialize_some(&format_instant(*instant)),
            None => serializer.serialize_none(),
        }
    }

    /// # Errors
    /// Fails when a present value is not an accepted instant form.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Instant>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| parse_instant(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn parses_all_accepted_forms() {
        let expected = datetime!(2024-06-01 13:45:10);
        for input in ["2024-06-01 13:45:10", "2024-06-01T13:45:10", " 2024-06-01 13:45:10 "] {
            match parse_instant(input) {
                Ok(parsed) => assert_eq!(parsed, expected, "input {input}"),
                Err(err) => panic!("{input} should parse: {err}"),
            }
        }

        match parse_instant("2024-06-01") {
            Ok(parsed) => assert_eq!(parsed, datetime!(2024-06-01 0:00)),
            Err(err) => panic!("bare date should parse: {err}"),
        }
    }

    #[test]
    fn rejects_garbage_with_parse_error() {
        let err = match parse_instant("June 1st") {
            Ok(parsed) => panic!("expected parse failure, got {parsed}"),
            Err(err) => err,
        };
        assert!(matches!(err, KernelError::Parse(_)));
    }

    #[test]
    fn formats_canonical_and_caption_forms() {
        let instant = datetime!(2021-01-05 08:00:00);
        assert_eq!(format_instant(instant), "2021-01-05 08:00:00");
        assert_eq!(format_caption_date(instant), "05-Jan-2021");
    }
}
