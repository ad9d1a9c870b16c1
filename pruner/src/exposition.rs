//! Parser for the Prometheus [text exposition format].
//!
//! [`parse`] yields [`MetricFamily`] records lazily: a family is complete
//! once the next family starts or the input ends, so a consumer may act on
//! early families before the rest of the payload is examined.
//!
//! [text exposition format]: https://prometheus.io/docs/instrumenting/exposition_formats/#text-based-format

use std::str::Lines;

use strum::EnumString;

use crate::{labels::LabelSet, Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    #[default]
    Untyped,
}

impl MetricType {
    /// Sample name suffixes that still belong to a family of this type.
    fn sample_suffixes(self) -> &'static [&'static str] {
        match self {
            MetricType::Counter => &["_total", "_created"],
            MetricType::Histogram => &["_bucket", "_sum", "_count", "_created"],
            MetricType::Summary => &["_sum", "_count", "_created"],
            MetricType::Gauge | MetricType::Untyped => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub value: f64,
    pub labels: LabelSet,
    /// Milliseconds since the Unix epoch, as written in the payload.
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub metric_type: MetricType,
    pub help: Option<String>,
    pub samples: Vec<Sample>,
}

impl MetricFamily {
    fn new(name: String) -> Self {
        Self {
            name,
            metric_type: MetricType::Untyped,
            help: None,
            samples: Vec::new(),
        }
    }

    fn accepts(&self, sample_name: &str) -> bool {
        match sample_name.strip_prefix(self.name.as_str()) {
            Some("") => true,
            Some(suffix) => self.metric_type.sample_suffixes().contains(&suffix),
            None => false,
        }
    }
}

/// Parses `text` into a lazy, single-pass sequence of metric families.
pub fn parse(text: &str) -> Families<'_> {
    Families {
        lines: text.lines(),
        line_no: 0,
        current: None,
        done: false,
    }
}

pub struct Families<'a> {
    lines: Lines<'a>,
    line_no: usize,
    current: Option<MetricFamily>,
    done: bool,
}

enum Line {
    Help { name: String, help: String },
    Type { name: String, metric_type: MetricType },
    Sample(Sample),
    Comment,
}

impl Iterator for Families<'_> {
    type Item = Result<MetricFamily>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        while let Some(raw) = self.lines.next() {
            self.line_no += 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let parsed = match parse_line(line) {
                Ok(parsed) => parsed,
                Err(reason) => {
                    self.done = true;
                    return Some(Err(Error::Parse {
                        line: self.line_no,
                        reason,
                    }));
                }
            };
            let finished = match parsed {
                Line::Comment => None,
                Line::Help { name, help } => {
                    let (finished, family) = self.family_named(name);
                    family.help = Some(help);
                    finished
                }
                Line::Type { name, metric_type } => {
                    let (finished, family) = self.family_named(name);
                    family.metric_type = metric_type;
                    finished
                }
                Line::Sample(sample) => {
                    let (finished, family) = match self.current.take() {
                        Some(family) if family.accepts(&sample.name) => (None, family),
                        previous => (previous, MetricFamily::new(sample.name.clone())),
                    };
                    self.current.insert(family).samples.push(sample);
                    finished
                }
            };
            if finished.is_some() {
                return finished.map(Ok);
            }
        }
        self.done = true;
        self.current.take().map(Ok)
    }
}

impl Families<'_> {
    /// Returns the family that metadata for `name` applies to, starting a new
    /// one (and handing back the previous) unless `name` is the current family.
    fn family_named(&mut self, name: String) -> (Option<MetricFamily>, &mut MetricFamily) {
        let (finished, family) = match self.current.take() {
            Some(family) if family.name == name => (None, family),
            previous => (previous, MetricFamily::new(name)),
        };
        (finished, self.current.insert(family))
    }
}

fn parse_line(line: &str) -> Result<Line, String> {
    let Some(comment) = line.strip_prefix('#') else {
        return parse_sample(line).map(Line::Sample);
    };
    let mut parts = comment.trim_start().splitn(3, |c: char| c == ' ' || c == '\t');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("HELP"), Some(name), rest) => {
            validate_metric_name(name)?;
            Ok(Line::Help {
                name: name.to_owned(),
                help: unescape_help(rest.unwrap_or_default().trim()),
            })
        }
        (Some("TYPE"), Some(name), rest) => {
            validate_metric_name(name)?;
            Ok(Line::Type {
                name: name.to_owned(),
                metric_type: rest.unwrap_or_default().trim().parse().unwrap_or_default(),
            })
        }
        _ => Ok(Line::Comment),
    }
}

fn parse_sample(line: &str) -> Result<Sample, String> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .unwrap_or(line.len());
    let (name, rest) = line.split_at(name_end);
    validate_metric_name(name)?;

    let (labels, rest) = match rest.trim_start().strip_prefix('{') {
        Some(rest) => parse_labels(rest)?,
        None => (LabelSet::new(), rest),
    };

    let mut fields = rest.split_whitespace();
    let value = fields
        .next()
        .ok_or_else(|| format!("missing value for metric {name:?}"))
        .and_then(parse_value)?;
    let timestamp = fields
        .next()
        .map(|ts| {
            ts.parse::<i64>()
                .map_err(|e| format!("invalid timestamp {ts:?}: {e}"))
        })
        .transpose()?;
    if let Some(extra) = fields.next() {
        return Err(format!("unexpected trailing token {extra:?}"));
    }

    Ok(Sample {
        name: name.to_owned(),
        value,
        labels,
        timestamp,
    })
}

/// Parses label pairs following an opening `{`, returning the labels and the
/// text after the closing `}`.
fn parse_labels(input: &str) -> Result<(LabelSet, &str), String> {
    let mut labels = LabelSet::new();
    let mut rest = input;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }

        let (name, after_name) = match rest.strip_prefix('"') {
            Some(quoted) => parse_quoted(quoted)?,
            None => {
                let end = rest
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(rest.len());
                if end == 0 {
                    return Err(format!("expected label name at {rest:?}"));
                }
                (rest[..end].to_owned(), &rest[end..])
            }
        };
        let after_eq = after_name
            .trim_start()
            .strip_prefix('=')
            .ok_or_else(|| format!("expected '=' after label name {name:?}"))?;
        let quoted = after_eq
            .trim_start()
            .strip_prefix('"')
            .ok_or_else(|| format!("expected quoted value for label {name:?}"))?;
        let (value, after_value) = parse_quoted(quoted)?;
        if labels.contains(&name) {
            return Err(format!("duplicate label name {name:?}"));
        }
        labels.insert(name, value);

        rest = after_value.trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after;
        } else if !rest.starts_with('}') {
            return Err(format!("expected ',' or '}}' at {rest:?}"));
        }
    }
}

/// Reads an escaped string up to its closing quote. `input` starts just
/// after the opening quote.
fn parse_quoted(input: &str) -> Result<(String, &str), String> {
    let mut out = String::new();
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((out, &input[i + 1..])),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, '"')) => out.push('"'),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => break,
            },
            c => out.push(c),
        }
    }
    Err("unterminated quoted string".to_owned())
}

fn parse_value(s: &str) -> Result<f64, String> {
    match s {
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        "NaN" => Ok(f64::NAN),
        _ => s.parse().map_err(|e| format!("invalid value {s:?}: {e}")),
    }
}

fn unescape_help(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Checks `name` against `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn validate_metric_name(name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_' || first == ':')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(format!("invalid metric name {name:?}"))
    }
}
