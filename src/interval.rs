//! The human-interval grammar: a pure function from a string like
//! `"30 seconds"` or `"2.5 minutes"` to a positive millisecond count.
//!
//! Deliberately hand-rolled rather than built on an ecosystem
//! interval-parsing crate — `regex` supplies only tokenization, not
//! semantics.

use crate::error::{MomoError, Result};
use regex::Regex;
use std::sync::OnceLock;

const MS_PER_SECOND: f64 = 1_000.0;
const MS_PER_MINUTE: f64 = 60.0 * MS_PER_SECOND;
const MS_PER_HOUR: f64 = 60.0 * MS_PER_MINUTE;
const MS_PER_DAY: f64 = 24.0 * MS_PER_HOUR;
const MS_PER_WEEK: f64 = 7.0 * MS_PER_DAY;
const MS_PER_MONTH: f64 = 30.0 * MS_PER_DAY;
const MS_PER_YEAR: f64 = 365.0 * MS_PER_DAY;

fn grammar() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?ix)
            ^\s*
            (?P<num>a|an|one|[0-9]+(?:\.[0-9]+)?)
            \s+
            (?P<unit>millisecond|second|minute|hour|day|week|month|year)s?
            \s*$",
        )
        .expect("static interval grammar must compile")
    })
}

fn unit_ms(unit: &str) -> f64 {
    match unit.to_ascii_lowercase().as_str() {
        "millisecond" => 1.0,
        "second" => MS_PER_SECOND,
        "minute" => MS_PER_MINUTE,
        "hour" => MS_PER_HOUR,
        "day" => MS_PER_DAY,
        "week" => MS_PER_WEEK,
        "month" => MS_PER_MONTH,
        "year" => MS_PER_YEAR,
        other => unreachable!("grammar only captures known units, got {other}"),
    }
}

/// Parse a human-readable interval string into a positive millisecond count.
///
/// Accepts an integer or decimal quantity, or the words `a`/`an`/`one`
/// meaning `1`, followed by a unit word in
/// `{millisecond, second, minute, hour, day, week, month, year}` with
/// optional trailing `s` for pluralization. Anything else, or a quantity
/// that resolves to zero or a negative count, is rejected.
pub fn parse_interval(input: &str) -> Result<u64> {
    let captures = grammar()
        .captures(input)
        .ok_or_else(|| MomoError::NonParsableInterval(input.to_string()))?;

    let num_str = &captures["num"];
    let quantity: f64 = match num_str.to_ascii_lowercase().as_str() {
        "a" | "an" | "one" => 1.0,
        other => other
            .parse()
            .map_err(|_| MomoError::NonParsableInterval(input.to_string()))?,
    };

    let millis = quantity * unit_ms(&captures["unit"]);
    if !millis.is_finite() || millis <= 0.0 {
        return Err(MomoError::NonParsableInterval(input.to_string()));
    }

    Ok(millis.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_plain_forms() {
        assert_eq!(parse_interval("30 seconds").unwrap(), 30_000);
        assert_eq!(parse_interval("1 second").unwrap(), 1_000);
        assert_eq!(parse_interval("one minute").unwrap(), 60_000);
        assert_eq!(parse_interval("a minute").unwrap(), 60_000);
        assert_eq!(parse_interval("an hour").unwrap(), 3_600_000);
        assert_eq!(parse_interval("2.5 minutes").unwrap(), 150_000);
        assert_eq!(parse_interval("500 milliseconds").unwrap(), 500);
    }

    #[test]
    fn parses_all_units() {
        assert_eq!(parse_interval("1 day").unwrap(), MS_PER_DAY as u64);
        assert_eq!(parse_interval("1 week").unwrap(), MS_PER_WEEK as u64);
        assert_eq!(parse_interval("1 month").unwrap(), MS_PER_MONTH as u64);
        assert_eq!(parse_interval("1 year").unwrap(), MS_PER_YEAR as u64);
    }

    #[test]
    fn is_case_insensitive_and_tolerant_of_whitespace() {
        assert_eq!(parse_interval("  30   SECONDS  ").unwrap(), 30_000);
        assert_eq!(parse_interval("ONE Hour").unwrap(), 3_600_000);
    }

    #[test]
    fn rejects_unparseable_and_nonpositive() {
        assert!(parse_interval("every blue moon").is_err());
        assert!(parse_interval("").is_err());
        assert!(parse_interval("0 seconds").is_err());
        assert!(parse_interval("-5 seconds").is_err());
        assert!(parse_interval("5 fortnights").is_err());
        assert!(parse_interval("5").is_err());
        assert!(parse_interval("seconds").is_err());
    }
}
