//! On-Disk Layout
//!
//! Path construction for the write path and path parsing for the scanner.
//! Downstream tooling relies on this layout, so names are built in one place.
//!
//! ```text
//! <base>/<exchange>/<source>/<channel>/<symbol>/
//!     dt=YYYY-MM-DD/hour=HH/
//!         seg=<start>--<planned_end>--size~<N>MB/
//!             part-<channel>-<symbol>-<created>-seq.arrow   (committed)
//!             part-<channel>-<symbol>-<created>-seq.arrow.tmp (in progress)
//!             manifest.json
//! ```
//!
//! Timestamps in directory and file names use `YYYYMMDDTHHMMSS.mmmZ`, UTC.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};

/// Manifest file name inside every closed segment directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Suffix of files still being written.
pub const TMP_SUFFIX: &str = ".tmp";

/// Extension of committed data files.
pub const DATA_EXTENSION: &str = "arrow";

const NAME_TS_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Replace characters that would split or escape a path component.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

pub fn format_name_ts(ts: DateTime<Utc>) -> String {
    ts.format(NAME_TS_FORMAT).to_string()
}

/// `<base>/<exchange>/<source>/<channel>/<symbol>`
pub fn series_dir(base: &Path, exchange: &str, source: &str, channel: &str, symbol: &str) -> PathBuf {
    base.join(sanitize_component(exchange))
        .join(sanitize_component(source))
        .join(sanitize_component(channel))
        .join(sanitize_component(symbol))
}

/// `seg=<start>--<planned_end>--size~<N>MB`
pub fn segment_dir_name(start: DateTime<Utc>, planned_end: DateTime<Utc>, size_mb: u64) -> String {
    format!(
        "seg={}--{}--size~{}MB",
        format_name_ts(start),
        format_name_ts(planned_end),
        size_mb
    )
}

/// Full directory for a segment starting at `start`, partitioned by its
/// start date and hour.
pub fn segment_dir(
    series_dir: &Path,
    start: DateTime<Utc>,
    planned_end: DateTime<Utc>,
    size_mb: u64,
) -> PathBuf {
    series_dir
        .join(format!("dt={}", start.format("%Y-%m-%d")))
        .join(format!("hour={}", start.format("%H")))
        .join(segment_dir_name(start, planned_end, size_mb))
}

/// `part-<channel>-<symbol>-<created>-seq.arrow`
pub fn part_file_name(channel: &str, symbol: &str, created: DateTime<Utc>) -> String {
    format!(
        "part-{}-{}-{}-seq.{}",
        sanitize_component(channel),
        sanitize_component(symbol),
        format_name_ts(created),
        DATA_EXTENSION
    )
}

pub fn tmp_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

/// Whether a file name looks like a committed data file.
pub fn is_data_file_name(name: &str) -> bool {
    if name.ends_with(TMP_SUFFIX) || name == MANIFEST_FILE {
        return false;
    }
    matches!(
        Path::new(name).extension().and_then(|e| e.to_str()),
        Some("arrow" | "arrows" | "ipc" | "feather")
    )
}

/// Partition facts recovered from a data file path relative to the scan root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathInfo {
    pub exchange: Option<String>,
    pub source: Option<String>,
    pub channel: Option<String>,
    pub symbol: Option<String>,
    pub date: Option<NaiveDate>,
    pub hour: Option<u32>,
    pub segment: Option<String>,
}

impl PathInfo {
    /// Parse `relative` (file included). Components are located around the
    /// `dt=` partition when present, and positionally from the root otherwise.
    /// A `part-<channel>-...` file name fills a channel the directories did not.
    pub fn parse(relative: &Path) -> Self {
        let parts: Vec<&str> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();
        let (file_name, dirs) = match parts.split_last() {
            Some((file, dirs)) => (Some(*file), dirs),
            None => (None, &parts[..]),
        };

        let mut info = PathInfo::default();
        let owned = |i: usize| dirs.get(i).map(|s| s.to_string());

        match dirs.iter().position(|d| d.starts_with("dt=")) {
            Some(dt) => {
                info.date = NaiveDate::parse_from_str(&dirs[dt][3..], "%Y-%m-%d").ok();
                info.symbol = dt.checked_sub(1).and_then(owned);
                info.channel = dt.checked_sub(2).and_then(owned);
                info.source = dt.checked_sub(3).and_then(owned);
                info.exchange = dt.checked_sub(4).and_then(owned);
            }
            None => {
                // Without partitions, only directories that are clearly not
                // segment directories count as series components.
                let series: Vec<&str> = dirs
                    .iter()
                    .copied()
                    .take_while(|d| !d.starts_with("hour=") && !d.starts_with("seg="))
                    .collect();
                let at = |i: usize| series.get(i).map(|s| s.to_string());
                info.exchange = at(0);
                info.source = at(1);
                info.channel = at(2);
                info.symbol = at(3);
            }
        }

        info.hour = dirs
            .iter()
            .find_map(|d| d.strip_prefix("hour="))
            .and_then(|h| h.parse::<u32>().ok())
            .filter(|h| *h < 24);
        info.segment = dirs
            .iter()
            .find(|d| d.starts_with("seg="))
            .map(|s| s.to_string());

        if info.channel.is_none() {
            info.channel = file_name
                .and_then(|f| f.strip_prefix("part-"))
                .and_then(|rest| rest.split('-').next())
                .filter(|c| !c.is_empty())
                .map(str::to_string);
        }

        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_segment_dir_shape() {
        let start = Utc.with_ymd_and_hms(2024, 3, 5, 7, 30, 15).unwrap() + chrono::Duration::milliseconds(42);
        let end = start + chrono::Duration::minutes(15);
        let dir = segment_dir(Path::new("/base/ex/ws/trades/tBTCUSD"), start, end, 256);
        assert_eq!(
            dir,
            PathBuf::from(
                "/base/ex/ws/trades/tBTCUSD/dt=2024-03-05/hour=07/\
                 seg=20240305T073015.042Z--20240305T074515.042Z--size~256MB"
            )
        );
    }

    #[test]
    fn test_part_file_name() {
        let name = part_file_name("book", "tBTC:USD", ts(0));
        assert_eq!(name, "part-book-tBTC_USD-19700101T000000.000Z-seq.arrow");
        assert!(is_data_file_name(&name));
        assert!(!is_data_file_name(&format!("{name}{TMP_SUFFIX}")));
        assert!(!is_data_file_name(MANIFEST_FILE));
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("fBTC/USD:p30"), "fBTC_USD_p30");
        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component(""), "_");
        assert_eq!(sanitize_component("tETHUSD"), "tETHUSD");
    }

    #[test]
    fn test_tmp_path_appends_suffix() {
        let p = tmp_path(Path::new("/a/b/part.arrow"));
        assert_eq!(p, PathBuf::from("/a/b/part.arrow.tmp"));
    }

    #[test]
    fn test_parse_full_layout() {
        let rel = Path::new(
            "bitfinex/ws/trades/tBTCUSD/dt=2024-03-05/hour=07/seg=x/part-trades-tBTCUSD-t-seq.arrow",
        );
        let info = PathInfo::parse(rel);
        assert_eq!(info.exchange.as_deref(), Some("bitfinex"));
        assert_eq!(info.source.as_deref(), Some("ws"));
        assert_eq!(info.channel.as_deref(), Some("trades"));
        assert_eq!(info.symbol.as_deref(), Some("tBTCUSD"));
        assert_eq!(info.date, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(info.hour, Some(7));
        assert_eq!(info.segment.as_deref(), Some("seg=x"));
    }

    #[test]
    fn test_parse_scan_rooted_below_exchange() {
        // Scanning from <base>/<exchange> drops the exchange component.
        let rel = Path::new("ws/book/tETHUSD/dt=2024-01-01/hour=23/seg=y/f.arrow");
        let info = PathInfo::parse(rel);
        assert_eq!(info.exchange, None);
        assert_eq!(info.source.as_deref(), Some("ws"));
        assert_eq!(info.channel.as_deref(), Some("book"));
        assert_eq!(info.symbol.as_deref(), Some("tETHUSD"));
    }

    #[test]
    fn test_parse_without_partitions_uses_positions_and_file_name() {
        let info = PathInfo::parse(Path::new("part-candles-tBTCUSD-t-seq.arrow"));
        assert_eq!(info.channel.as_deref(), Some("candles"));
        assert_eq!(info.date, None);

        let info = PathInfo::parse(Path::new("ex/ws/ticker/tBTCUSD/f.arrow"));
        assert_eq!(info.exchange.as_deref(), Some("ex"));
        assert_eq!(info.symbol.as_deref(), Some("tBTCUSD"));
    }

    #[test]
    fn test_parse_rejects_bad_partition_values() {
        let info = PathInfo::parse(Path::new("a/b/c/d/dt=not-a-date/hour=99/f.arrow"));
        assert_eq!(info.date, None);
        assert_eq!(info.hour, None);
        assert_eq!(info.symbol.as_deref(), Some("d"));
    }
}
