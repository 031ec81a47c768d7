//! Duration text parsing.
//!
//! Telemetry durations arrive as `[d.]hh:mm:ss.fffffff` — an optional day
//! count, hours, minutes, seconds, and a variable-width fractional-second
//! field. The core only needs whole milliseconds, truncated toward zero.
//! Invalid input yields zero rather than failing ingestion.

/// Parse a duration string into truncated whole milliseconds.
///
/// Returns `0` for any string that does not match the expected shape,
/// rather than an error — malformed telemetry must never fail `add()`.
pub fn parse_duration_ms(text: &str) -> u64 {
    parse_duration_ms_inner(text).unwrap_or(0)
}

fn parse_duration_ms_inner(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let (days_part, rest) = match text.split_once('.') {
        // "1.22:33:44.123456" — first '.' separates days only if what follows
        // still contains the hh:mm:ss:.fff shape (i.e. at least one more '.').
        Some((d, r)) if r.contains(':') && r.matches('.').count() == 1 => (Some(d), r),
        _ => (None, text),
    };

    let days: u64 = match days_part {
        Some(d) => d.parse().ok()?,
        None => 0,
    };

    let (hms, frac) = rest.split_once('.')?;
    let mut hms_parts = hms.split(':');
    let hours: u64 = hms_parts.next()?.parse().ok()?;
    let minutes: u64 = hms_parts.next()?.parse().ok()?;
    let seconds: u64 = hms_parts.next()?.parse().ok()?;
    if hms_parts.next().is_some() {
        return None;
    }

    if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let frac_value: u64 = frac.parse().ok()?;
    // `frac` holds however many fractional digits the caller supplied —
    // scale by the fraction's actual denominator rather than assuming a
    // fixed width, then truncate toward zero to whole milliseconds.
    let frac_denominator = 10u64.checked_pow(frac.len() as u32)?;
    let frac_ms = frac_value.checked_mul(1_000)? / frac_denominator;

    let total_seconds = days
        .checked_mul(86_400)?
        .checked_add(hours.checked_mul(3_600)?)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)?;

    total_seconds.checked_mul(1_000)?.checked_add(frac_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_duration_strings() {
        let cases: &[(&str, u64)] = &[
            ("00:00:00.123456", 123),
            ("00:00:00.123999", 123),
            ("00:00:01.123456", 1123),
            ("00:01:23.123456", 83123),
            ("01:23:45.123456", 5025123),
            ("1.22:33:44.123456", 167624123),
            ("1111.22:33:44.123456", 96071624123),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_duration_ms(input), *expected, "input: {input}");
        }
    }

    #[test]
    fn invalid_strings_yield_zero() {
        assert_eq!(parse_duration_ms("not a duration"), 0);
        assert_eq!(parse_duration_ms(""), 0);
        assert_eq!(parse_duration_ms("00:00"), 0);
        assert_eq!(parse_duration_ms("aa:bb:cc.1234567"), 0);
    }

    #[test]
    fn negative_like_strings_yield_zero() {
        // There is no negative-duration grammar here; anything that doesn't
        // parse cleanly truncates to zero.
        assert_eq!(parse_duration_ms("-00:00:01.0000000"), 0);
    }
}
