/*! Record type and helpers.

A [Record] is one open-schema unit of data flowing through a pipeline,
typically one document as a JSON object. No schema is enforced beyond
"valid JSON": stages read and write the subsets of fields they know about
and must tolerate missing ones.
!*/
use std::cmp::Ordering;

use serde_json::Value;

/// One unit of data flowing through a pipeline.
pub type Record = Value;

/// Python-style truthiness on JSON values.
///
/// Map-connected stages use this to decide whether a mapped record survives:
/// `null`, `false`, `0`, `""`, `[]` and `{}` are all falsy.
/// Note that this conflates "intentional drop" with "legitimately empty
/// output": a map stage whose valid output is an empty list will see its
/// record dropped.
pub fn truthy(value: &Record) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

/// A short, loggable identity for a record.
///
/// Used when a per-record error has to be logged with enough context to
/// diagnose, without serializing whole documents into the log.
pub fn identity(record: &Record) -> String {
    for key in ["id", "url", "warc-record-id", "title"] {
        if let Some(Value::String(s)) = record.get(key) {
            return format!("{}={}", key, s);
        }
    }
    let repr = record.to_string();
    if repr.chars().count() > 120 {
        let truncated: String = repr.chars().take(120).collect();
        format!("{}…", truncated)
    } else {
        repr
    }
}

/// Total order on JSON values, for sorting collectors.
///
/// `null < bool < number < string`; arrays and objects compare by their
/// serialized form and sort last. Numbers compare as f64.
pub fn cmp_values(a: &Record, b: &Record) -> Ordering {
    fn rank(v: &Record) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            a.to_string().cmp(&b.to_string())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}
