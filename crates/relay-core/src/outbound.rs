//! Ambient outbound-text decoration: the `inbound.timestampPrefix` and
//! `inbound.responsePrefix` keys, applied uniformly to every outbound text
//! payload regardless of which path produced it (plain text-mode render,
//! command-mode agent output, a timeout/non-zero-exit fallback, a directive
//! acknowledgement). Neither affects chunking — decoration happens before
//! the chunker sees the text.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::config::TimestampPrefix;

/// Renders the configured timestamp prefix, or an empty string when unset
/// or explicitly disabled. An unrecognised IANA zone name falls back to
/// UTC rather than dropping the timestamp entirely.
pub fn render_timestamp(now: DateTime<Utc>, cfg: Option<&TimestampPrefix>) -> String {
    match cfg {
        None | Some(TimestampPrefix::Enabled(false)) => String::new(),
        Some(TimestampPrefix::Enabled(true)) => format_utc(now),
        Some(TimestampPrefix::Zone(name)) => match name.parse::<Tz>() {
            Ok(tz) => format!("[{}] ", now.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z")),
            Err(_) => {
                warn!(zone = %name, "unrecognised timestampPrefix zone, falling back to UTC");
                format_utc(now)
            }
        },
    }
}

fn format_utc(now: DateTime<Utc>) -> String {
    format!("[{}] ", now.format("%Y-%m-%d %H:%M:%S UTC"))
}

/// Prepends the configured timestamp and response prefixes to `text`, in
/// that order: a fixed machine-readable timestamp first, then the
/// operator-authored response label.
pub fn decorate(
    text: &str,
    now: DateTime<Utc>,
    timestamp_cfg: Option<&TimestampPrefix>,
    response_prefix: Option<&str>,
) -> String {
    let mut out = render_timestamp(now, timestamp_cfg);
    if let Some(prefix) = response_prefix {
        out.push_str(prefix);
    }
    out.push_str(text);
    out
}
