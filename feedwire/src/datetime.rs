use chrono::{DateTime, NaiveDateTime, Utc};

// Feeds in the wild disagree about date formats. RFC 2822 is what RSS 2.0
// mandates, RFC 3339 is what Atom-flavored feeds emit, and the naive forms
// show up in hand-rolled generators.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Parses a feed timestamp, coercing the result to UTC. Naive inputs are
/// assumed to already be UTC.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn parses_rfc2822_with_offset() {
        let parsed = parse_published("Sun, 01 Mar 2026 12:00:00 +0500").unwrap();
        assert_eq!(
            parsed.naive_utc(),
            NaiveDate::from_ymd_opt(2026, 3, 1)
                .unwrap()
                .and_hms_opt(7, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn parses_rfc3339() {
        let parsed = parse_published("2026-03-01T12:00:00+02:00").unwrap();
        assert_eq!(
            parsed.naive_utc(),
            NaiveDate::from_ymd_opt(2026, 3, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn parses_naive_forms_as_utc() {
        for raw in [
            "2026-03-01T12:00:00",
            "2026-03-01T12:00:00.250",
            "2026-03-01 12:00:00",
        ] {
            let parsed = parse_published(raw).unwrap();
            assert_eq!(parsed.naive_utc().date().to_string(), "2026-03-01");
            assert_eq!(parsed.naive_utc().format("%H:%M:%S").to_string(), "12:00:00");
        }
    }

    #[test]
    fn rejects_garbage_and_empty() {
        assert_eq!(parse_published(""), None);
        assert_eq!(parse_published("   "), None);
        assert_eq!(parse_published("yesterday"), None);
        assert_eq!(parse_published("2026-13-40"), None);
    }
}
