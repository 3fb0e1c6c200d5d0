use {
    crate::constants::ISO8601_COMPACT_FORMAT,
    chrono::{
        naive::{NaiveDate, NaiveDateTime, NaiveTime},
        DateTime, Utc,
    },
    lazy_static::lazy_static,
    regex::Regex,
    std::str::FromStr,
};

lazy_static! {
    /// ISO 8601 "basic format" timestamp as used by `X-Amz-Date`: `YYYYMMDD'T'HHMMSS'Z'`.
    static ref AMZ_DATE_REGEX: Regex = Regex::new(
        r"(?x)^
        (?P<year>\d{4})
        (?P<month>0[1-9]|1[0-2])
        (?P<day>0[1-9]|[12][0-9]|3[01])
        T
        (?P<hour>[01][0-9]|2[0-3])
        (?P<minute>[0-5][0-9])
        (?P<second>[0-5][0-9])
        Z$").unwrap();
}

/// Parse an `X-Amz-Date` value. Only the UTC basic format is accepted; anything else (extended
/// format, offsets, fractional seconds, impossible dates such as February 30) returns `None`.
pub(crate) fn parse_amz_date(s: &str) -> Option<DateTime<Utc>> {
    let cap = AMZ_DATE_REGEX.captures(s)?;
    let field = |name: &str| u32::from_str(cap.name(name)?.as_str()).ok();

    let year = i32::from_str(cap.name("year")?.as_str()).ok()?;
    let date = NaiveDate::from_ymd_opt(year, field("month")?, field("day")?)?;
    let time = NaiveTime::from_hms_opt(field("hour")?, field("minute")?, field("second")?)?;
    Some(DateTime::from_naive_utc_and_offset(NaiveDateTime::new(date, time), Utc))
}

/// Format a timestamp as an `X-Amz-Date` value.
#[inline]
pub(crate) fn format_amz_date(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(ISO8601_COMPACT_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use {
        super::{format_amz_date, parse_amz_date},
        chrono::{Datelike, Timelike},
    };

    #[test_log::test]
    fn check_amz_date_error_handling() {
        assert!(parse_amz_date("blatantly-wrong").is_none());
        assert!(parse_amz_date("2015-08-30T12:36:00Z").is_none());
        assert!(parse_amz_date("20150830T123600").is_none());
        assert!(parse_amz_date("20150830T123600+0000").is_none());
        assert!(parse_amz_date("20150230T123600Z").is_none());
        assert!(parse_amz_date(" 20150830T123600Z").is_none());
    }

    #[test_log::test]
    fn check_amz_date_valid() {
        let dt = parse_amz_date("20150830T123600Z").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2015, 8, 30));
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (12, 36, 0));
        assert_eq!(format_amz_date(&dt), "20150830T123600Z");
    }
}
