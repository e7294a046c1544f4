//! Duration text codec for stored `timeSplit` values.
//!
//! Records already in the store were written by Go services, so the text
//! form follows Go's `time.Duration` rendering: `"0s"`, `"40µs"`,
//! `"120ms"`, `"1.5s"`, `"2m3.45s"`, `"1h0m0s"`.

use time::Duration;

use crate::error::{Error, Result};

/// Storage resolution of elapsed times.
pub const RESOLUTION_MILLIS: i32 = 10;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;
const NANOS_PER_MINUTE: u128 = 60 * NANOS_PER_SECOND;

/// Truncate toward zero to the storage resolution.
pub fn truncate(d: Duration) -> Duration {
    let step = RESOLUTION_MILLIS * 1_000_000;
    let nanos = d.subsec_nanoseconds();
    Duration::new(d.whole_seconds(), nanos - nanos % step)
}

/// Render `d` the way Go's `Duration.String` does.
pub fn format_duration(d: Duration) -> String {
    if d.is_negative() {
        return format!("-{}", format_duration(d.abs()));
    }
    let total = d.whole_nanoseconds().unsigned_abs();
    if total == 0 {
        return "0s".into();
    }
    if total < NANOS_PER_MICRO {
        return format!("{total}ns");
    }
    if total < NANOS_PER_MILLI {
        return format!("{}µs", fixed(total, NANOS_PER_MICRO, 3));
    }
    if total < NANOS_PER_SECOND {
        return format!("{}ms", fixed(total, NANOS_PER_MILLI, 6));
    }

    let minutes = total / NANOS_PER_MINUTE;
    let seconds = total % NANOS_PER_MINUTE;
    let mut out = String::new();
    if minutes > 0 {
        let hours = minutes / 60;
        if hours > 0 {
            out.push_str(&format!("{hours}h"));
        }
        out.push_str(&format!("{}m", minutes % 60));
    }
    out.push_str(&format!("{}s", fixed(seconds, NANOS_PER_SECOND, 9)));
    out
}

/// `value / unit` with the remainder as a decimal fraction, trailing zeros
/// dropped.
fn fixed(value: u128, unit: u128, digits: usize) -> String {
    let whole = value / unit;
    let rem = value % unit;
    if rem == 0 {
        return whole.to_string();
    }
    let frac = format!("{rem:0digits$}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Parse Go duration text such as `"120ms"`, `"1.5s"` or `"1h2m3.04s"`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || Error::invalid_duration(input);

    let (negative, mut rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let int_part = &rest[..int_len];
        rest = &rest[int_len..];

        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
            frac_part = &after_dot[..frac_len];
            rest = &after_dot[frac_len..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let unit_len = rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map_or(rest.len(), |(i, _)| i);
        let unit = match &rest[..unit_len] {
            "ns" => 1,
            "us" | "µs" | "μs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SECOND,
            "m" => NANOS_PER_MINUTE,
            "h" => 60 * NANOS_PER_MINUTE,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };
        let mut nanos = whole.checked_mul(unit).ok_or_else(invalid)?;
        if !frac_part.is_empty() {
            // Digits beyond nanosecond precision are dropped.
            let kept = &frac_part[..frac_part.len().min(18)];
            let scale = 10u128.pow(kept.len() as u32);
            let frac: u128 = kept.parse().map_err(|_| invalid())?;
            nanos = nanos
                .checked_add(frac * unit / scale)
                .ok_or_else(invalid)?;
        }
        total = total.checked_add(nanos).ok_or_else(invalid)?;
    }

    let secs = i64::try_from(total / NANOS_PER_SECOND).map_err(|_| invalid())?;
    let nanos = (total % NANOS_PER_SECOND) as i32;
    let d = Duration::new(secs, nanos);
    Ok(if negative {
        -d
    } else {
        d
    })
}
