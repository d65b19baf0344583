use std::collections::HashMap;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// A single numeric observation derived from one field of one line-protocol
/// point. Samples with equal name and labels share an identity and overwrite
/// each other in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub value: f64,
    /// Attributed write time in nanoseconds since the Unix epoch, not the
    /// time the sample was received.
    pub timestamp_ns: i64,
}

impl Sample {
    /// Build a sample, deriving its identity from the name and label set.
    pub fn new(name: String, labels: HashMap<String, String>, value: f64, timestamp_ns: i64) -> Self {
        let id = sample_id(&name, &labels);
        Self {
            id,
            name,
            labels,
            value,
            timestamp_ns,
        }
    }
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`, one replacement
/// per character. A leading digit gets an extra `_` prepended so the result
/// is a valid metric identifier.
pub fn sanitize_metric_name(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Deterministic identity for a (name, label set) pair: the name followed by
/// every label key and value in lexicographic key order, joined with `.`.
/// Independent of label insertion order.
pub fn sample_id(name: &str, labels: &HashMap<String, String>) -> String {
    let mut keys: Vec<&String> = labels.keys().collect();
    keys.sort();

    let mut parts = Vec::with_capacity(1 + keys.len() * 2);
    parts.push(name);
    for key in keys {
        parts.push(key);
        parts.push(&labels[key]);
    }
    parts.join(".")
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub fn unix_now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as i64
}
