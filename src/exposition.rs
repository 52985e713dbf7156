//! Single-line parser for the Prometheus text exposition format.
//!
//! Script output is validated line by line before it is re-served, so this
//! module only needs to understand one line in isolation: `# HELP`, `# TYPE`,
//! plain comments and samples of the form `name{label="value"} value [timestamp]`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Metric names as accepted by Prometheus.
static METRIC_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("valid metric name regex"));

/// Label names as accepted by Prometheus.
static LABEL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid label name regex"));

/// Metric types allowed in a `# TYPE` line.
const METRIC_KINDS: [&str; 5] = ["counter", "gauge", "histogram", "summary", "untyped"];

/// A successfully parsed exposition line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Help { name: String, text: String },
    Type { name: String, kind: String },
    Comment,
    Sample {
        name: String,
        labels: Vec<(String, String)>,
        value: f64,
        timestamp: Option<i64>,
    },
}

/// Reasons a line is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,

    #[error("invalid metric name \"{0}\"")]
    InvalidMetricName(String),

    #[error("invalid label name \"{0}\"")]
    InvalidLabelName(String),

    #[error("duplicate label name \"{0}\"")]
    DuplicateLabel(String),

    #[error("malformed label set: {0}")]
    MalformedLabels(&'static str),

    #[error("unknown metric type \"{0}\"")]
    UnknownType(String),

    #[error("missing sample value")]
    MissingValue,

    #[error("invalid sample value \"{0}\"")]
    InvalidValue(String),

    #[error("invalid timestamp \"{0}\"")]
    InvalidTimestamp(String),

    #[error("unexpected trailing content \"{0}\"")]
    TrailingContent(String),
}

/// Returns true if `name` is a valid metric name.
pub fn is_valid_metric_name(name: &str) -> bool {
    METRIC_NAME.is_match(name)
}

/// Parses a single line of the text exposition format.
pub fn parse_line(line: &str) -> Result<Line, ParseError> {
    let line = line.trim_start();
    if line.trim_end().is_empty() {
        return Err(ParseError::Empty);
    }

    if let Some(comment) = line.strip_prefix('#') {
        return parse_comment(comment);
    }

    parse_sample(line)
}

/// Splits off the first whitespace-delimited token.
fn next_token(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(idx) => (&input[..idx], &input[idx..]),
        None => (input, ""),
    }
}

fn parse_comment(comment: &str) -> Result<Line, ParseError> {
    let (keyword, rest) = next_token(comment);

    match keyword {
        "HELP" | "TYPE" => {
            let (name, tail) = next_token(rest);
            if !is_valid_metric_name(name) {
                return Err(ParseError::InvalidMetricName(name.to_string()));
            }
            let tail = tail.trim();

            if keyword == "HELP" {
                return Ok(Line::Help {
                    name: name.to_string(),
                    text: tail.to_string(),
                });
            }

            if !METRIC_KINDS.contains(&tail) {
                return Err(ParseError::UnknownType(tail.to_string()));
            }
            Ok(Line::Type {
                name: name.to_string(),
                kind: tail.to_string(),
            })
        }
        _ => Ok(Line::Comment),
    }
}

fn parse_sample(line: &str) -> Result<Line, ParseError> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if !is_valid_metric_name(name) {
        return Err(ParseError::InvalidMetricName(name.to_string()));
    }

    // Blanks are allowed between the name and the label set
    let mut rest = line[name_end..].trim_start();
    let mut labels = Vec::new();
    if let Some(label_set) = rest.strip_prefix('{') {
        let (parsed, remaining) = parse_labels(label_set)?;
        labels = parsed;
        rest = remaining;
    }

    let mut fields = rest.split_whitespace();
    let raw_value = fields.next().ok_or(ParseError::MissingValue)?;
    let value = parse_value(raw_value)?;

    let timestamp = match fields.next() {
        Some(raw) => Some(
            raw.parse::<i64>()
                .map_err(|_| ParseError::InvalidTimestamp(raw.to_string()))?,
        ),
        None => None,
    };

    if let Some(extra) = fields.next() {
        return Err(ParseError::TrailingContent(extra.to_string()));
    }

    Ok(Line::Sample {
        name: name.to_string(),
        labels,
        value,
        timestamp,
    })
}

/// Parses the label set following an opening brace and returns the labels
/// together with the remainder of the line after the closing brace.
fn parse_labels(input: &str) -> Result<(Vec<(String, String)>, &str), ParseError> {
    let mut labels: Vec<(String, String)> = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }

        let eq = rest
            .find('=')
            .ok_or(ParseError::MalformedLabels("expected '='"))?;
        let label = rest[..eq].trim();
        if !LABEL_NAME.is_match(label) {
            return Err(ParseError::InvalidLabelName(label.to_string()));
        }
        if labels.iter().any(|(existing, _)| existing == label) {
            return Err(ParseError::DuplicateLabel(label.to_string()));
        }

        rest = rest[eq + 1..].trim_start();
        let quoted = rest
            .strip_prefix('"')
            .ok_or(ParseError::MalformedLabels("label value must be quoted"))?;
        let (value, after) = parse_quoted(quoted)?;
        labels.push((label.to_string(), value));

        rest = after.trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after;
        } else if !rest.starts_with('}') {
            return Err(ParseError::MalformedLabels("expected ',' or '}'"));
        }
    }
}

/// Reads a quoted label value up to the closing quote, resolving escapes.
fn parse_quoted(input: &str) -> Result<(String, &str), ParseError> {
    let mut value = String::new();
    let mut chars = input.char_indices();

    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &input[idx + 1..])),
            '\\' => match chars.next() {
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((_, 'n')) => value.push('\n'),
                _ => return Err(ParseError::MalformedLabels("invalid escape sequence")),
            },
            '\n' => return Err(ParseError::MalformedLabels("newline in label value")),
            other => value.push(other),
        }
    }

    Err(ParseError::MalformedLabels("unterminated label value"))
}

fn parse_value(raw: &str) -> Result<f64, ParseError> {
    match raw {
        "NaN" => Ok(f64::NAN),
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        _ => {
            // Rust accepts "inf"/"infinity"/"nan" spellings the format does not.
            if raw.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
                return Err(ParseError::InvalidValue(raw.to_string()));
            }
            raw.parse::<f64>()
                .map_err(|_| ParseError::InvalidValue(raw.to_string()))
        }
    }
}
