/// Current Unix time in milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Convert unix ms to a `YYYY-MM-DD` date string.
/// Uses Howard Hinnant's civil_from_days algorithm.
pub fn date_from_ms(ms: i64) -> String {
    let (y, m, d) = civil_from_ms(ms);
    format!("{y:04}-{m:02}-{d:02}")
}

/// Convert unix ms to a `YYYY/MM/DD` path segment (archive key layout).
pub fn date_path_from_ms(ms: i64) -> String {
    let (y, m, d) = civil_from_ms(ms);
    format!("{y:04}/{m:02}/{d:02}")
}

fn civil_from_ms(ms: i64) -> (i64, i64, i64) {
    let secs = ms / 1000;
    let days = secs.div_euclid(86400) + 719468;
    let era = days.div_euclid(146097);
    let doe = days.rem_euclid(146097);
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_is_1970() {
        assert_eq!(date_from_ms(0), "1970-01-01");
        assert_eq!(date_path_from_ms(0), "1970/01/01");
    }

    #[test]
    fn leap_day() {
        // 2024-02-29T12:00:00Z
        assert_eq!(date_from_ms(1_709_208_000_000), "2024-02-29");
    }
}
