// ===========================================================================
// Duration Strings
// ===========================================================================
//
// Parses durations written as a sequence of decimal numbers with unit
// suffixes, e.g. "300ms", "1m", "1h30m", "1.5h". Valid units are "ns",
// "us" (or "µs"), "ms", "s", "m", "h".

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("empty duration")]
    Empty,

    #[error("negative durations are not allowed")]
    Negative,

    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },

    #[error("invalid duration {0:?}")]
    Invalid(String),

    #[error("duration {0:?} is too large")]
    Overflow(String),
}

const NANOS_PER_UNIT: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 60 * 60 * 1_000_000_000),
];

/// Largest accepted duration, in nanoseconds (about 2562047h)
const MAX_NANOS: u128 = i64::MAX as u128;

/// Parse a duration string such as "1m" or "2h45m30.5s".
///
/// Negative durations other than zero (`-0s`) are rejected; values above
/// [`MAX_NANOS`] are an overflow.
pub fn parse_duration(input: &str) -> Result<Duration, Error> {
    let mut rest = input.trim();
    if rest.is_empty() {
        return Err(Error::Empty);
    }

    let mut negative = false;
    if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('-') {
        negative = true;
        rest = stripped;
    }

    // A bare zero needs no unit
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(Error::Invalid(input.to_string()));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_len];
        rest = &rest[number_len..];

        let (whole, frac) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
            return Err(Error::Invalid(input.to_string()));
        }

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        if unit.is_empty() {
            return Err(Error::MissingUnit(input.to_string()));
        }
        let scale = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, nanos)| *nanos)
            .ok_or_else(|| Error::UnknownUnit {
                unit: unit.to_string(),
                input: input.to_string(),
            })?;

        let overflow = || Error::Overflow(input.to_string());

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(overflow)?;

        // Fractional digits beyond nanosecond precision are truncated
        let mut divisor: u128 = 1;
        let mut frac_value: u128 = 0;
        for digit in frac.bytes() {
            if divisor >= 1_000_000_000_000_000_000 {
                break;
            }
            frac_value = frac_value * 10 + u128::from(digit - b'0');
            divisor *= 10;
        }
        nanos = nanos
            .checked_add(frac_value * scale / divisor)
            .ok_or_else(overflow)?;

        total = total.checked_add(nanos).ok_or_else(overflow)?;
    }

    if total > MAX_NANOS {
        return Err(Error::Overflow(input.to_string()));
    }
    if negative && total != 0 {
        return Err(Error::Negative);
    }

    let secs = u64::try_from(total / 1_000_000_000).map_err(|_| Error::Overflow(input.to_string()))?;
    let subsec = (total % 1_000_000_000) as u32;
    Ok(Duration::new(secs, subsec))
}
