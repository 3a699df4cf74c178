// SPDX-License-Identifier: MIT

//! The persisted state record and the rules that make it valid

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Corruption;

/// Color used for a freshly created record
pub const DEFAULT_COLOR: &str = "#ff0000";
/// LED count used for a freshly created record
pub const DEFAULT_COUNT: i64 = 8;
/// Revision of a freshly created record
pub const INITIAL_REV: u64 = 1;

/// Lowest accepted LED count
pub const LED_MIN: i64 = 0;
/// Highest accepted LED count
pub const LED_MAX: i64 = 8;

static HEX_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("hex color pattern is valid"));

/// Whether `s` is a `#RRGGBB` color (hex digits in either case)
pub fn is_hex_color(s: &str) -> bool {
    HEX_COLOR_RE.is_match(s)
}

/// Whether `count` lies within `[LED_MIN, LED_MAX]`
pub fn count_in_range(count: i64) -> bool {
    (LED_MIN..=LED_MAX).contains(&count)
}

/// Source of "now" for record timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock in UTC
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The single shared record: LED color, LED count, revision and write time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub color: String,
    pub count: i64,
    pub rev: u64,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl StateRecord {
    /// The default record stamped with `now`
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            color: DEFAULT_COLOR.to_string(),
            count: DEFAULT_COUNT,
            rev: INITIAL_REV,
            updated_at: now,
        }
    }

    /// The record that follows this one after an accepted update, or `None`
    /// once `rev` cannot be incremented
    pub fn next(&self, color: String, count: i64, now: DateTime<Utc>) -> Option<Self> {
        Some(Self {
            color,
            count,
            rev: self.rev.checked_add(1)?,
            updated_at: now,
        })
    }

    /// Decode a persisted JSON value.
    ///
    /// Missing (or `null`) fields are filled from the defaults and their
    /// names returned alongside the record. Present fields of the wrong type
    /// or outside their domain make the whole value corrupt.
    pub fn decode(
        value: &Value,
        now: DateTime<Utc>,
    ) -> Result<(Self, Vec<&'static str>), Corruption> {
        let obj = value.as_object().ok_or(Corruption::NotAnObject)?;
        let mut filled = Vec::new();

        let color = match field(obj, "color") {
            None => {
                filled.push("color");
                DEFAULT_COLOR.to_string()
            }
            Some(Value::String(s)) if is_hex_color(s) => s.clone(),
            Some(other) => return Err(invalid("color", format!("not a #RRGGBB color: {}", other))),
        };

        let count = match field(obj, "count") {
            None => {
                filled.push("count");
                DEFAULT_COUNT
            }
            Some(v) => match v.as_i64() {
                Some(n) if count_in_range(n) => n,
                Some(n) => {
                    return Err(invalid(
                        "count",
                        format!("{} is outside {}..={}", n, LED_MIN, LED_MAX),
                    ))
                }
                None => return Err(invalid("count", format!("expected an integer, got {}", v))),
            },
        };

        let rev = match field(obj, "rev") {
            None => {
                filled.push("rev");
                INITIAL_REV
            }
            Some(v) => match v.as_u64() {
                Some(n) if n >= INITIAL_REV => n,
                _ => return Err(invalid("rev", format!("expected a positive integer, got {}", v))),
            },
        };

        let updated_at = match field(obj, "updated_at") {
            None => {
                filled.push("updated_at");
                now
            }
            Some(Value::String(s)) => timestamp::parse(s)
                .map_err(|e| invalid("updated_at", format!("'{}': {}", s, e)))?,
            Some(other) => {
                return Err(invalid("updated_at", format!("expected a timestamp, got {}", other)))
            }
        };

        Ok((
            Self {
                color,
                count,
                rev,
                updated_at,
            },
            filled,
        ))
    }
}

fn field<'a>(obj: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    obj.get(name).filter(|v| !v.is_null())
}

fn invalid(field: &'static str, reason: String) -> Corruption {
    Corruption::InvalidField { field, reason }
}

/// RFC 3339 timestamps with microsecond precision and a `+00:00` offset
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Micros, false)
    }

    /// Parse any RFC 3339 timestamp and normalize it to UTC
    pub fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 15, 30).unwrap()
    }

    #[test]
    fn test_hex_color_pattern() {
        assert!(is_hex_color("#ff0000"));
        assert!(is_hex_color("#00FF00"));
        assert!(is_hex_color("#AbCdEf"));

        assert!(!is_hex_color("ff0000"));
        assert!(!is_hex_color("#ff000"));
        assert!(!is_hex_color("#ff00000"));
        assert!(!is_hex_color("#gg0000"));
        assert!(!is_hex_color("#ff0000\n"));
        assert!(!is_hex_color(""));
    }

    #[test]
    fn test_count_bounds() {
        assert!(count_in_range(0));
        assert!(count_in_range(8));
        assert!(!count_in_range(-1));
        assert!(!count_in_range(9));
    }

    #[test]
    fn test_initial_record() {
        let rec = StateRecord::initial(t0());
        assert_eq!(rec.color, "#ff0000");
        assert_eq!(rec.count, 8);
        assert_eq!(rec.rev, 1);
        assert_eq!(rec.updated_at, t0());
    }

    #[test]
    fn test_next_bumps_rev() {
        let rec = StateRecord::initial(t0());
        let later = t0() + chrono::Duration::seconds(5);
        let next = rec.next("#00ff00".into(), 3, later).unwrap();
        assert_eq!(next.rev, 2);
        assert_eq!(next.color, "#00ff00");
        assert_eq!(next.count, 3);
        assert_eq!(next.updated_at, later);
    }

    #[test]
    fn test_next_stops_at_max_rev() {
        let rec = StateRecord {
            rev: u64::MAX,
            ..StateRecord::initial(t0())
        };
        assert_eq!(rec.next("#00ff00".into(), 3, t0()), None);
    }

    #[test]
    fn test_serialized_shape() {
        let rec = StateRecord::initial(t0());
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(
            value,
            json!({
                "color": "#ff0000",
                "count": 8,
                "rev": 1,
                "updated_at": "2026-10-19T08:15:30.000000+00:00"
            })
        );
    }

    #[test]
    fn test_decode_complete() {
        let value = json!({
            "color": "#123abc",
            "count": 2,
            "rev": 41,
            "updated_at": "2025-01-02T03:04:05.678901+00:00"
        });
        let (rec, filled) = StateRecord::decode(&value, t0()).unwrap();
        assert!(filled.is_empty());
        assert_eq!(rec.color, "#123abc");
        assert_eq!(rec.count, 2);
        assert_eq!(rec.rev, 41);
        assert_eq!(timestamp::format(&rec.updated_at), "2025-01-02T03:04:05.678901+00:00");
    }

    #[test]
    fn test_decode_fills_missing_fields() {
        let value = json!({ "color": "#0000ff", "rev": 7 });
        let (rec, filled) = StateRecord::decode(&value, t0()).unwrap();
        assert_eq!(filled, vec!["count", "updated_at"]);
        assert_eq!(rec.color, "#0000ff");
        assert_eq!(rec.count, DEFAULT_COUNT);
        assert_eq!(rec.rev, 7);
        assert_eq!(rec.updated_at, t0());
    }

    #[test]
    fn test_decode_null_counts_as_missing() {
        let value = json!({ "color": null, "count": 1, "rev": 3, "updated_at": null });
        let (rec, filled) = StateRecord::decode(&value, t0()).unwrap();
        assert_eq!(filled, vec!["color", "updated_at"]);
        assert_eq!(rec.color, DEFAULT_COLOR);
    }

    #[test]
    fn test_decode_rejects_wrong_shapes() {
        assert_eq!(
            StateRecord::decode(&json!([1, 2, 3]), t0()).unwrap_err(),
            Corruption::NotAnObject
        );
        assert!(matches!(
            StateRecord::decode(&json!({"color": 5}), t0()),
            Err(Corruption::InvalidField { field: "color", .. })
        ));
        assert!(matches!(
            StateRecord::decode(&json!({"count": "three"}), t0()),
            Err(Corruption::InvalidField { field: "count", .. })
        ));
        assert!(matches!(
            StateRecord::decode(&json!({"count": 12}), t0()),
            Err(Corruption::InvalidField { field: "count", .. })
        ));
        assert!(matches!(
            StateRecord::decode(&json!({"rev": 0}), t0()),
            Err(Corruption::InvalidField { field: "rev", .. })
        ));
        assert!(matches!(
            StateRecord::decode(&json!({"updated_at": "yesterday"}), t0()),
            Err(Corruption::InvalidField { field: "updated_at", .. })
        ));
    }

    #[test]
    fn test_timestamp_accepts_offsets_and_whole_seconds() {
        let ts = timestamp::parse("2026-10-19T10:15:30+02:00").unwrap();
        assert_eq!(ts, t0());
        assert_eq!(timestamp::format(&ts), "2026-10-19T08:15:30.000000+00:00");
    }
}
