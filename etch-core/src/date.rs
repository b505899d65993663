//! HTTP date handling for `Last-Modified` and `If-Modified-Since`.
//!
//! Dates are always emitted as IMF-fixdate in UTC. Parsing also accepts the two
//! obsolete forms HTTP/1.1 recipients must understand: RFC 850 and asctime.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::Freshness;

const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";
const RFC_850: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME: &str = "%a %b %e %H:%M:%S %Y";

/// Formats `date` as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn format_http_date(date: Freshness) -> String {
    date.format(IMF_FIXDATE).to_string()
}

/// Parses an HTTP date in any of the accepted formats.
pub fn parse_http_date(value: &str) -> Option<Freshness> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    [IMF_FIXDATE, RFC_850, ASCTIME]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}
