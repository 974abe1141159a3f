//! Price bar representation and normalization.
//!
//! Every ingestion format (embedded CSV, fetched CSV text, JSON bar lists)
//! ends up as a `Vec<Bar>` sorted ascending by timestamp with one bar per
//! timestamp.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::domain::error::SimError;

pub const MS_PER_DAY: i64 = 86_400_000;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Bar {
    /// Integer calendar-day bucket of the bar's millisecond timestamp.
    pub fn day(&self) -> i64 {
        day_bucket(self.ts)
    }
}

pub fn day_bucket(ts: i64) -> i64 {
    ts.div_euclid(MS_PER_DAY)
}

/// A timestamp as it appears in ingested payloads: epoch milliseconds or a
/// date/datetime string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(i64),
    Float(f64),
    Text(String),
}

impl RawTimestamp {
    pub fn to_millis(&self) -> Result<i64, SimError> {
        match self {
            RawTimestamp::Millis(ms) => Ok(*ms),
            RawTimestamp::Float(ms) if ms.is_finite() => Ok(*ms as i64),
            RawTimestamp::Float(ms) => Err(SimError::DataFormat {
                reason: format!("non-finite timestamp {}", ms),
            }),
            RawTimestamp::Text(s) => parse_timestamp(s),
        }
    }
}

/// Bar as supplied in a typed JSON bar list.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBar {
    pub ts: RawTimestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl RawBar {
    pub fn normalize(&self) -> Result<Bar, SimError> {
        Ok(Bar {
            ts: self.ts.to_millis()?,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        })
    }
}

/// Parse a timestamp string: integer milliseconds, or one of the accepted
/// date/datetime layouts interpreted as UTC.
pub fn parse_timestamp(value: &str) -> Result<i64, SimError> {
    let trimmed = value.trim();
    if let Ok(ms) = trimmed.parse::<i64>() {
        return Ok(ms);
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(dt.and_utc().timestamp_millis());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Ok(dt.and_utc().timestamp_millis());
            }
        }
    }
    Err(SimError::DataFormat {
        reason: format!("unrecognized timestamp '{}'", value),
    })
}

/// Sort ascending by timestamp and keep the last bar seen for each timestamp.
pub fn normalize_bars(mut bars: Vec<Bar>) -> Vec<Bar> {
    bars.sort_by_key(|b| b.ts);
    let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(last) if last.ts == bar.ts => *last = bar,
            _ => out.push(bar),
        }
    }
    out
}

/// Parse CSV text with a header row into normalized bars.
///
/// Accepts `timestamp` or `ts` for the time column; `volume` is optional and
/// defaults to zero.
pub fn parse_csv(text: &str) -> Result<Vec<Bar>, SimError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|e| SimError::DataFormat {
            reason: format!("CSV header error: {}", e),
        })?
        .clone();
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

    let ts_col = column("timestamp")
        .or_else(|| column("ts"))
        .ok_or_else(|| SimError::DataFormat {
            reason: "missing timestamp column".into(),
        })?;
    let open_col = required_column(column("open"), "open")?;
    let high_col = required_column(column("high"), "high")?;
    let low_col = required_column(column("low"), "low")?;
    let close_col = required_column(column("close"), "close")?;
    let volume_col = column("volume");

    let mut bars = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| SimError::DataFormat {
            reason: format!("CSV parse error: {}", e),
        })?;

        let field = |idx: usize, name: &str| -> Result<f64, SimError> {
            record
                .get(idx)
                .ok_or_else(|| SimError::DataFormat {
                    reason: format!("row {}: missing {} value", row + 1, name),
                })?
                .parse::<f64>()
                .map_err(|e| SimError::DataFormat {
                    reason: format!("row {}: invalid {} value: {}", row + 1, name, e),
                })
        };

        let ts = parse_timestamp(record.get(ts_col).unwrap_or_default())?;
        let volume = match volume_col {
            Some(idx) if record.get(idx).is_some_and(|v| !v.is_empty()) => field(idx, "volume")?,
            _ => 0.0,
        };

        bars.push(Bar {
            ts,
            open: field(open_col, "open")?,
            high: field(high_col, "high")?,
            low: field(low_col, "low")?,
            close: field(close_col, "close")?,
            volume,
        });
    }

    Ok(normalize_bars(bars))
}

fn required_column(idx: Option<usize>, name: &str) -> Result<usize, SimError> {
    idx.ok_or_else(|| SimError::DataFormat {
        reason: format!("missing {} column", name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, close: f64) -> Bar {
        Bar {
            ts,
            open: close,
            high: close,
            low: close,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn day_bucket_uses_milliseconds() {
        assert_eq!(day_bucket(0), 0);
        assert_eq!(day_bucket(MS_PER_DAY - 1), 0);
        assert_eq!(day_bucket(MS_PER_DAY), 1);
        assert_eq!(bar(3 * MS_PER_DAY + 5, 1.0).day(), 3);
    }

    #[test]
    fn parse_timestamp_integer() {
        assert_eq!(parse_timestamp("1700000000000").unwrap(), 1_700_000_000_000);
    }

    #[test]
    fn parse_timestamp_date_layouts() {
        let expected = 1_704_067_200_000; // 2024-01-01T00:00:00Z
        assert_eq!(parse_timestamp("2024-01-01").unwrap(), expected);
        assert_eq!(parse_timestamp("2024/01/01").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2024-01-01 00:00:30").unwrap(),
            expected + 30_000
        );
        assert_eq!(
            parse_timestamp("2024/01/01 01:00:00").unwrap(),
            expected + 3_600_000
        );
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(SimError::DataFormat { .. })
        ));
    }

    #[test]
    fn normalize_sorts_and_dedups_last_wins() {
        let bars = normalize_bars(vec![bar(3, 3.0), bar(1, 1.0), bar(3, 30.0), bar(2, 2.0)]);
        let ts: Vec<i64> = bars.iter().map(|b| b.ts).collect();
        assert_eq!(ts, vec![1, 2, 3]);
        assert_eq!(bars[2].close, 30.0);
    }

    #[test]
    fn parse_csv_with_timestamp_header() {
        let text = "timestamp,open,high,low,close,volume\n\
            2000,10,11,9,10.5,500\n\
            1000,9,10,8,9.5,400\n";
        let bars = parse_csv(text).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].ts, 1000);
        assert_eq!(bars[0].close, 9.5);
        assert_eq!(bars[1].volume, 500.0);
    }

    #[test]
    fn parse_csv_ts_header_and_missing_volume() {
        let text = "ts,open,high,low,close\n2024-01-02,1,2,0.5,1.5\n";
        let bars = parse_csv(text).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].ts, 1_704_153_600_000);
        assert_eq!(bars[0].volume, 0.0);
    }

    #[test]
    fn parse_csv_missing_close_column() {
        let text = "ts,open,high,low\n1,1,1,1\n";
        let err = parse_csv(text).unwrap_err();
        assert!(err.to_string().contains("close"));
    }

    #[test]
    fn parse_csv_invalid_number() {
        let text = "ts,open,high,low,close\n1,1,1,1,abc\n";
        assert!(matches!(parse_csv(text), Err(SimError::DataFormat { .. })));
    }

    #[test]
    fn raw_bar_accepts_string_and_number_timestamps() {
        let raw: Vec<RawBar> = serde_json::from_str(
            r#"[{"ts":"2024-01-01","open":1,"high":1,"low":1,"close":1},
                {"ts":5,"open":2,"high":2,"low":2,"close":2,"volume":7}]"#,
        )
        .unwrap();
        let a = raw[0].normalize().unwrap();
        let b = raw[1].normalize().unwrap();
        assert_eq!(a.ts, 1_704_067_200_000);
        assert_eq!(a.volume, 0.0);
        assert_eq!(b.ts, 5);
        assert_eq!(b.volume, 7.0);
    }
}
