use std::collections::HashMap;

use influxdb_line_protocol::parse_lines;
use influxdb_line_protocol::FieldValue;
use influxdb_line_protocol::ParsedLine;

use crate::sample::sanitize_metric_name;
use crate::sample::Sample;

/// Timestamp precision of a line-protocol batch, as accepted by the InfluxDB
/// v1 write API. Line timestamps are scaled to nanoseconds with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl Precision {
    /// Parse a `precision` parameter value. Returns `None` for values the
    /// write API does not define.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "n" | "ns" => Some(Self::Nanoseconds),
            "u" | "us" | "µ" => Some(Self::Microseconds),
            "ms" => Some(Self::Milliseconds),
            "s" => Some(Self::Seconds),
            "m" => Some(Self::Minutes),
            "h" => Some(Self::Hours),
            _ => None,
        }
    }

    fn factor_ns(self) -> i64 {
        match self {
            Self::Nanoseconds => 1,
            Self::Microseconds => 1_000,
            Self::Milliseconds => 1_000_000,
            Self::Seconds => 1_000_000_000,
            Self::Minutes => 60 * 1_000_000_000,
            Self::Hours => 3_600 * 1_000_000_000,
        }
    }
}

/// Parse one self-contained line-protocol batch and normalize every point in
/// it. Fails wholesale on a grammar error; a batch that parses but yields no
/// numeric fields is an empty success.
///
/// `received_at_ns` is attributed to points that carry no timestamp.
pub fn normalize_batch(
    payload: &str,
    received_at_ns: i64,
    precision: Precision,
) -> Result<Vec<Sample>, influxdb_line_protocol::Error> {
    let lines = parse_lines(payload).collect::<Result<Vec<_>, _>>()?;

    let mut samples = Vec::new();
    for line in &lines {
        normalize_point(line, received_at_ns, precision, &mut samples);
    }
    Ok(samples)
}

/// Flatten one parsed point into zero or more samples, one per numeric or
/// boolean field. String-valued fields are skipped, not errors.
fn normalize_point(
    line: &ParsedLine<'_>,
    received_at_ns: i64,
    precision: Precision,
    out: &mut Vec<Sample>,
) {
    let measurement = line.series.measurement.to_string();
    let timestamp_ns = match line.timestamp {
        Some(ts) => ts.saturating_mul(precision.factor_ns()),
        None => received_at_ns,
    };

    let mut labels = HashMap::new();
    if let Some(tag_set) = &line.series.tag_set {
        for (key, value) in tag_set {
            let key = key.to_string();
            // The reserved Prometheus name label is discarded outright.
            if key == "__name__" {
                continue;
            }
            labels.insert(sanitize_metric_name(&key), value.to_string());
        }
    }

    for (field_key, field_value) in &line.field_set {
        let value = match field_value {
            FieldValue::F64(v) => *v,
            FieldValue::I64(v) => *v as f64,
            FieldValue::U64(v) => *v as f64,
            FieldValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            FieldValue::String(_) => continue,
        };

        let field_key = field_key.to_string();
        let name = if field_key == "value" {
            measurement.clone()
        } else {
            format!("{measurement}_{field_key}")
        };

        out.push(Sample::new(
            sanitize_metric_name(&name),
            labels.clone(),
            value,
            timestamp_ns,
        ));
    }
}
