use crate::error::ParseError;
use crate::parsers::line_preview;
use chrono::{Local, NaiveDateTime, Offset, TimeDelta, TimeZone};
use serde::Deserialize;

/// Timestamp value recorded for lines that carry no bracketed timestamp.
pub const NO_TIMESTAMP_MARKER: &str = "empty line";

/// `chrono` format of the bracketed timestamp, e.g. `01/15/2024 13:45:02`.
pub const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

// Fixed-width layout of a timestamped line: `[MM/DD/YYYY HH:MM:SS]`, then one gap
// character, then the body from character 22 onward.
const TIMESTAMP_START: usize = 1;
const TIMESTAMP_END: usize = 20;
const TIMESTAMP_LAYOUT: &[u8; 19] = b"NN/NN/NNNN NN:NN:NN";

// How far back to look for the offset in effect before a DST gap.
const GAP_SEARCH_STEP_MINUTES: i64 = 15;
const GAP_SEARCH_STEPS: usize = 4 * 24;

/// Zone the server writes its timestamps in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampZone {
    #[default]
    Local,
    Utc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub timestamp: String,
    pub epoch_seconds: i64,
    pub actor: String,
    pub message: String,
}

impl ParsedLine {
    pub fn has_timestamp(&self) -> bool {
        self.timestamp != NO_TIMESTAMP_MARKER
    }
}

/// Turns raw log lines into [`ParsedLine`]s.
///
/// Lines starting with `[` must follow the fixed-width timestamp layout; anything else is
/// accepted as an untimestamped line.
///
/// ```
/// use tracker_agent::parsers::{LineParser, TimestampZone};
///
/// let parser = LineParser::new(TimestampZone::Utc);
/// let parsed = parser.parse("[01/15/2024 13:45:02]  Orc hits Goblin for 5\n").unwrap();
/// assert_eq!(parsed.actor, "Orc");
/// assert_eq!(parsed.message, "hits Goblin for 5");
/// assert_eq!(parsed.epoch_seconds, 1_705_326_302);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LineParser {
    zone: TimestampZone,
}

impl LineParser {
    pub fn new(zone: TimestampZone) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> TimestampZone {
        self.zone
    }

    /// Parses one line, including its terminator.
    pub fn parse(&self, line: &str) -> Result<ParsedLine, ParseError> {
        if line.starts_with('[') {
            self.parse_timestamped(line)
        } else {
            Ok(parse_untimestamped(line))
        }
    }

    fn parse_timestamped(&self, line: &str) -> Result<ParsedLine, ParseError> {
        let timestamp = validate_layout(line)?;
        let epoch_seconds = self.to_epoch(timestamp, line)?;

        // Bytes 0..=20 are ASCII once the layout is validated, so 21 is a char boundary.
        let mut rest = line[TIMESTAMP_END + 1..].chars();
        rest.next();
        let body = rest.as_str().trim_end();

        let (actor, message) = split_actor(body);
        Ok(ParsedLine {
            timestamp: timestamp.to_string(),
            epoch_seconds,
            actor: actor.to_string(),
            message: message.to_string(),
        })
    }

    fn to_epoch(&self, timestamp: &str, line: &str) -> Result<i64, ParseError> {
        let naive = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
            .map_err(|err| timestamp_error(timestamp, err.to_string(), line))?;

        match self.zone {
            TimestampZone::Utc => Ok(naive.and_utc().timestamp()),
            TimestampZone::Local => Ok(epoch_in_zone(&Local, &naive)),
        }
    }
}

/// Converts a wall-clock time in `zone` to Unix seconds.
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times inside a DST gap use the
/// offset in effect just before the gap, so `02:30` on a spring-forward night in a -05:00 zone
/// maps to `07:30Z`.
pub(crate) fn epoch_in_zone<Tz: TimeZone>(zone: &Tz, naive: &NaiveDateTime) -> i64 {
    if let Some(dt) = zone.from_local_datetime(naive).earliest() {
        return dt.timestamp();
    }

    let step = TimeDelta::minutes(GAP_SEARCH_STEP_MINUTES);
    let mut earlier = *naive;
    for _ in 0..GAP_SEARCH_STEPS {
        earlier = earlier - step;
        if let Some(offset) = zone.offset_from_local_datetime(&earlier).earliest() {
            return naive.and_utc().timestamp() - i64::from(offset.fix().local_minus_utc());
        }
    }
    naive.and_utc().timestamp()
}

fn validate_layout(line: &str) -> Result<&str, ParseError> {
    let bytes = line.as_bytes();
    if bytes.len() <= TIMESTAMP_END {
        let partial: String = line.chars().skip(TIMESTAMP_START).collect();
        return Err(timestamp_error(partial.trim_end(), "line too short", line));
    }

    let candidate = &bytes[TIMESTAMP_START..TIMESTAMP_END];
    let layout_ok = candidate
        .iter()
        .zip(TIMESTAMP_LAYOUT.iter())
        .all(|(byte, expected)| match expected {
            b'N' => byte.is_ascii_digit(),
            other => byte == other,
        });
    if !layout_ok {
        let shown: String = line
            .chars()
            .skip(TIMESTAMP_START)
            .take(TIMESTAMP_END - TIMESTAMP_START)
            .collect();
        return Err(timestamp_error(&shown, "expected MM/DD/YYYY HH:MM:SS", line));
    }
    if bytes[TIMESTAMP_END] != b']' {
        return Err(timestamp_error(
            &line[TIMESTAMP_START..TIMESTAMP_END],
            "missing closing bracket",
            line,
        ));
    }

    Ok(&line[TIMESTAMP_START..TIMESTAMP_END])
}

fn parse_untimestamped(line: &str) -> ParsedLine {
    let body = strip_line_terminator(line);
    let (actor, message) = split_actor(body);
    ParsedLine {
        timestamp: NO_TIMESTAMP_MARKER.to_string(),
        epoch_seconds: 0,
        actor: actor.to_string(),
        message: message.to_string(),
    }
}

fn split_actor(body: &str) -> (&str, &str) {
    body.split_once(' ').unwrap_or((body, ""))
}

pub(crate) fn strip_line_terminator(line: &str) -> &str {
    match line.strip_suffix('\n') {
        Some(stripped) => stripped.strip_suffix('\r').unwrap_or(stripped),
        None => line,
    }
}

fn timestamp_error(timestamp: &str, reason: impl Into<String>, line: &str) -> ParseError {
    ParseError::TimestampFormat {
        timestamp: timestamp.to_string(),
        reason: reason.into(),
        line: line_preview(strip_line_terminator(line).as_bytes()),
    }
}
