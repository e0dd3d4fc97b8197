use time::{
    format_description::well_known::Rfc3339, Duration, OffsetDateTime, PrimitiveDateTime,
    UtcOffset,
};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn to_primitive_utc(value: OffsetDateTime) -> PrimitiveDateTime {
    let utc = value.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

/// Parses an RFC 3339 timestamp from an external service into naive UTC.
pub(crate) fn parse_rfc3339_utc(value: &str) -> Option<PrimitiveDateTime> {
    OffsetDateTime::parse(value.trim(), &Rfc3339).ok().map(to_primitive_utc)
}

pub(crate) fn hours_ago(now: PrimitiveDateTime, hours: u64) -> PrimitiveDateTime {
    now - Duration::hours(hours as i64)
}
