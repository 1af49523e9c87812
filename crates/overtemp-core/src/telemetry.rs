//! Raw telemetry decoding.
//!
//! A device reports one reading per string:
//!
//! ```text
//! device_id:timestamp_ms:'Temperature':temperature
//! 42:1700000000000:'Temperature':21.5
//! ```
//!
//! The event tag is compared literally, quotes included. Fields are not
//! trimmed and there is no escaping, so a stray `:` anywhere makes the field
//! count wrong.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The only event tag accepted on the wire.
pub const TEMPERATURE_TAG: &str = "'Temperature'";

const FIELD_DELIMITER: char = ':';
const FIELD_COUNT: usize = 4;

/// One decoded temperature reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: i64,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub temperature: f64,
}

impl FromStr for Reading {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Why a raw string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("expected {} ':'-separated fields, found {found}", FIELD_COUNT)]
    MalformedField { found: usize },

    #[error("unsupported event type {found:?}, expected {}", TEMPERATURE_TAG)]
    InvalidEventType { found: String },

    #[error("invalid {field} {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

impl ParseError {
    /// Stable snake_case name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedField { .. } => "malformed_field",
            Self::InvalidEventType { .. } => "invalid_event_type",
            Self::InvalidNumber { .. } => "invalid_number",
        }
    }
}

/// Decode one raw telemetry string.
pub fn parse(raw: &str) -> Result<Reading, ParseError> {
    let fields: Vec<&str> = raw.split(FIELD_DELIMITER).collect();
    let [device_id, timestamp_ms, event_type, temperature] = fields[..] else {
        return Err(ParseError::MalformedField {
            found: fields.len(),
        });
    };

    if event_type != TEMPERATURE_TAG {
        return Err(ParseError::InvalidEventType {
            found: event_type.to_string(),
        });
    }

    Ok(Reading {
        device_id: parse_number(device_id, "device_id")?,
        timestamp_ms: parse_number(timestamp_ms, "timestamp_ms")?,
        temperature: parse_number(temperature, "temperature")?,
    })
}

fn parse_number<T: FromStr>(value: &str, field: &'static str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_reading() {
        let reading = parse("42:1000:'Temperature':21.5").unwrap();
        assert_eq!(
            reading,
            Reading {
                device_id: 42,
                timestamp_ms: 1000,
                temperature: 21.5,
            }
        );
    }

    #[test]
    fn from_str_delegates_to_parse() {
        let reading: Reading = "1:2:'Temperature':3".parse().unwrap();
        assert_eq!(reading.device_id, 1);
        assert_eq!(reading.timestamp_ms, 2);
        assert_eq!(reading.temperature, 3.0);
    }

    #[test]
    fn unquoted_tag_is_rejected() {
        let err = parse("42:1000:Temperature:21.5").unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidEventType {
                found: "Temperature".into()
            }
        );
    }

    #[test]
    fn other_tags_are_rejected() {
        for tag in ["'Humidity'", "\"Temperature\"", "'temperature'", " 'Temperature'", ""] {
            let raw = format!("1:1:{tag}:1.0");
            assert!(
                matches!(parse(&raw), Err(ParseError::InvalidEventType { .. })),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn wrong_field_count_is_malformed() {
        assert_eq!(
            parse("1:2:3").unwrap_err(),
            ParseError::MalformedField { found: 3 }
        );
        assert_eq!(
            parse("1:2:3:4:5").unwrap_err(),
            ParseError::MalformedField { found: 5 }
        );
        assert_eq!(parse("").unwrap_err(), ParseError::MalformedField { found: 1 });
    }

    #[test]
    fn extra_delimiter_inside_a_field_is_malformed() {
        let err = parse("1:2:'Temperature':12:30").unwrap_err();
        assert_eq!(err.kind(), "malformed_field");
    }

    #[test]
    fn tag_is_checked_before_numbers() {
        let err = parse("abc:xyz:Temperature:hot").unwrap_err();
        assert_eq!(err.kind(), "invalid_event_type");
    }

    #[test]
    fn bad_numbers_name_the_field() {
        let cases = [
            ("x:1:'Temperature':1.0", "device_id"),
            ("1.5:1:'Temperature':1.0", "device_id"),
            ("1:soon:'Temperature':1.0", "timestamp_ms"),
            ("1:-5:'Temperature':1.0", "timestamp_ms"),
            ("1:1:'Temperature':warm", "temperature"),
            ("1:1:'Temperature':", "temperature"),
            ("99999999999999999999:1:'Temperature':1.0", "device_id"),
        ];
        for (raw, expected) in cases {
            match parse(raw) {
                Err(ParseError::InvalidNumber { field, .. }) => {
                    assert_eq!(field, expected, "wrong field for {raw}")
                }
                other => panic!("{raw}: expected InvalidNumber, got {other:?}"),
            }
        }
    }

    #[test]
    fn whitespace_is_not_trimmed() {
        assert_eq!(parse(" 1:1:'Temperature':1.0").unwrap_err().kind(), "invalid_number");
        assert_eq!(parse("1:1:'Temperature':1.0\n").unwrap_err().kind(), "invalid_number");
    }

    #[test]
    fn no_range_checks_after_parsing() {
        let reading = parse("-7:0:'Temperature':-273.15").unwrap();
        assert_eq!(reading.device_id, -7);
        assert_eq!(reading.timestamp_ms, 0);
        assert_eq!(reading.temperature, -273.15);
    }

    #[test]
    fn error_messages_are_descriptive() {
        let msg = parse("1:2").unwrap_err().to_string();
        assert!(msg.contains("found 2"), "{msg}");
        let msg = parse("1:2:'Temperature':hot").unwrap_err().to_string();
        assert!(msg.contains("temperature") && msg.contains("hot"), "{msg}");
    }
}
