//! Date and datetime encoding.
//!
//! Dates are stored as days since 1970-01-01, datetimes as milliseconds since
//! the Unix epoch (UTC). Text form is ISO 8601.

pub const MS_PER_DAY: i64 = 86_400_000;

/// Earliest and latest years accepted on ingestion.
pub const MIN_YEAR: i32 = -9999;
pub const MAX_YEAR: i32 = 9999;

/// Day numbers of `MIN_YEAR-01-01` and `MAX_YEAR-12-31`.
pub const MIN_DAYS: i64 = civil_days(MIN_YEAR as i64, 1, 1);
pub const MAX_DAYS: i64 = civil_days(MAX_YEAR as i64, 12, 31);

/// Days since epoch -> (year, month, day).
///
/// Civil-from-days, see https://howardhinnant.github.io/date_algorithms.html
/// Computed in i64 so every stored day or millisecond count maps to a date.
pub fn ymd_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m, d)
}

const fn civil_days(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y / 400 } else { (y - 399) / 400 };
    let yoe = (y - era * 400) as u32;
    let doy = (153 * (if month > 2 { month - 3 } else { month + 9 }) + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe as i64 - 719_468
}

/// (year, month, day) -> days since epoch; `None` outside
/// `MIN_YEAR..=MAX_YEAR` or for an invalid month or day.
pub fn days_from_ymd(year: i32, month: u32, day: u32) -> Option<i32> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    i32::try_from(civil_days(year as i64, month, day)).ok()
}

/// True if `days` lies within the supported year range.
pub fn days_in_range(days: i64) -> bool {
    (MIN_DAYS..=MAX_DAYS).contains(&days)
}

/// True if `ms` lies within the supported year range.
pub fn millis_in_range(ms: i64) -> bool {
    days_in_range(ms.div_euclid(MS_PER_DAY))
}

/// Format days since epoch as `YYYY-MM-DD`.
pub fn format_date(days: i32) -> String {
    let (year, month, day) = ymd_from_days(days as i64);
    format!("{:04}-{:02}-{:02}", year, month, day)
}

/// Format milliseconds since epoch as `YYYY-MM-DDTHH:MM:SS[.mmm]`.
pub fn format_datetime(ms: i64) -> String {
    let days = ms.div_euclid(MS_PER_DAY);
    let time_ms = ms.rem_euclid(MS_PER_DAY);

    let (year, month, day) = ymd_from_days(days);
    let hour = time_ms / 3_600_000;
    let minute = (time_ms % 3_600_000) / 60_000;
    let second = (time_ms % 60_000) / 1000;
    let millis = time_ms % 1000;

    if millis > 0 {
        format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}",
            year, month, day, hour, minute, second, millis
        )
    } else {
        format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            year, month, day, hour, minute, second
        )
    }
}

/// Parse `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Option<i32> {
    let mut parts = s.trim().splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;

    days_from_ymd(year, month, day)
}

/// Parse `YYYY-MM-DD[T| ]HH:MM[:SS[.fff]][Z]`; a bare date means midnight.
pub fn parse_datetime(s: &str) -> Option<i64> {
    let s = s.trim();
    let (date_part, time_part) = match s.find(|c: char| c == 'T' || c == ' ') {
        Some(pos) => (&s[..pos], &s[pos + 1..]),
        None => return parse_date(s).map(|d| d as i64 * MS_PER_DAY),
    };

    let days = parse_date(date_part)?;
    let time_part = time_part.trim_end_matches('Z');

    let (clock, millis) = match time_part.split_once('.') {
        Some((clock, frac)) => {
            let digits: String = frac.chars().take(3).collect();
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            // "1" -> 100, "12" -> 120
            let padded = format!("{:0<3}", digits);
            (clock, padded.parse::<i64>().ok()?)
        }
        None => (time_part, 0),
    };

    let mut fields = clock.split(':');
    let hour: i64 = fields.next()?.parse().ok()?;
    let minute: i64 = fields.next()?.parse().ok()?;
    let second: i64 = match fields.next() {
        Some(sec) => sec.parse().ok()?,
        None => 0,
    };

    if hour > 23 || minute > 59 || second > 59 {
        return None;
    }

    Some(days as i64 * MS_PER_DAY + hour * 3_600_000 + minute * 60_000 + second * 1000 + millis)
}

/// True if the string looks like a datetime rather than a bare date.
pub fn looks_like_datetime(s: &str) -> bool {
    (s.contains('T') || (s.contains(' ') && s.contains(':'))) && parse_datetime(s).is_some()
}

/// True if the string is a bare `YYYY-MM-DD` date.
pub fn looks_like_date(s: &str) -> bool {
    s.len() == 10 && s.as_bytes().get(4) == Some(&b'-') && parse_date(s).is_some()
}
