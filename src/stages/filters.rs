//! Record-level filters.
use serde_json::Value;

use crate::error::Error;
use crate::pipeline::{DetectRecord, Resource};
use crate::record::{truthy, Record};

/// Keeps records where at least one of the named fields is present and
/// non-empty. Registry tag: `filter_empty`.
pub struct FilterEmpty {
    fields: Vec<String>,
}

impl FilterEmpty {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }
}

impl Resource for FilterEmpty {
    fn name(&self) -> &str {
        "filter_empty"
    }
}

impl DetectRecord for FilterEmpty {
    fn detect(&mut self, record: &Record) -> Result<bool, Error> {
        Ok(self
            .fields
            .iter()
            .any(|f| record.get(f).map(truthy).unwrap_or(false)))
    }
}

/// Minimum-length filter. Registry tag: `length`.
///
/// Measures the named field, or the record itself when no field is given;
/// strings count Unicode codepoints, arrays count items. Records where the
/// measured value is missing or not measurable are dropped.
pub struct Length {
    field: Option<String>,
    min_length: usize,
}

impl Length {
    pub fn new(field: Option<String>, min_length: usize) -> Self {
        Self { field, min_length }
    }

    fn measure(&self, value: &Value) -> Option<usize> {
        match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(a) => Some(a.len()),
            _ => None,
        }
    }
}

impl Resource for Length {
    fn name(&self) -> &str {
        "length"
    }
}

impl DetectRecord for Length {
    fn detect(&mut self, record: &Record) -> Result<bool, Error> {
        let value = match &self.field {
            Some(f) => match record.get(f) {
                Some(v) => v,
                None => return Ok(false),
            },
            None => record,
        };
        Ok(self
            .measure(value)
            .map(|len| len >= self.min_length)
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn filter_empty_needs_one_truthy_field() {
        let mut f = FilterEmpty::new(vec!["title".to_string(), "body".to_string()]);
        assert!(f.detect(&json!({"title": "t"})).unwrap());
        assert!(f.detect(&json!({"title": "", "body": "b"})).unwrap());
        assert!(!f.detect(&json!({"title": "", "body": []})).unwrap());
        assert!(!f.detect(&json!({"other": "x"})).unwrap());
        assert!(!f.detect(&json!("not an object")).unwrap());
    }

    #[test]
    fn length_on_whole_record() {
        let mut f = Length::new(None, 2);
        assert!(!f.detect(&json!("a")).unwrap());
        assert!(f.detect(&json!("ab")).unwrap());
        assert!(f.detect(&json!(["x", "y", "z"])).unwrap());
        assert!(!f.detect(&json!(42)).unwrap());
    }

    #[test]
    fn length_on_field() {
        let mut f = Length::new(Some("content".to_string()), 5);
        assert!(f.detect(&json!({"content": "héllo"})).unwrap());
        assert!(!f.detect(&json!({"content": "hi"})).unwrap());
        assert!(!f.detect(&json!({"other": "long enough"})).unwrap());
    }
}
