//! Field selection maps.
use serde_json::Value;

use crate::error::Error;
use crate::pipeline::{MapRecord, Resource};
use crate::record::Record;

/// Deletes named fields from a document. Registry tag: `delete_fields`.
pub struct DeleteFields {
    fields: Vec<String>,
}

impl DeleteFields {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }
}

impl Resource for DeleteFields {
    fn name(&self) -> &str {
        "delete_fields"
    }
}

impl MapRecord for DeleteFields {
    fn map(&mut self, record: Record) -> Result<Option<Record>, Error> {
        match record {
            Value::Object(map) => Ok(Some(Value::Object(
                map.into_iter()
                    .filter(|(k, _)| !self.fields.contains(k))
                    .collect(),
            ))),
            other => Err(Error::Custom(format!(
                "delete_fields expects an object, got {}",
                crate::record::identity(&other)
            ))),
        }
    }
}

/// Retains only the named fields of a document, dropping all the rest.
/// Registry tag: `retain_fields`.
///
/// A document retaining nothing becomes an empty object, which the
/// map-as-filter policy then drops from the pipe.
pub struct RetainFields {
    fields: Vec<String>,
}

impl RetainFields {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }
}

impl Resource for RetainFields {
    fn name(&self) -> &str {
        "retain_fields"
    }
}

impl MapRecord for RetainFields {
    fn map(&mut self, record: Record) -> Result<Option<Record>, Error> {
        match record {
            Value::Object(map) => Ok(Some(Value::Object(
                map.into_iter()
                    .filter(|(k, _)| self.fields.contains(k))
                    .collect(),
            ))),
            other => Err(Error::Custom(format!(
                "retain_fields expects an object, got {}",
                crate::record::identity(&other)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn delete_removes_only_named_fields() {
        let mut m = DeleteFields::new(vec!["raw".to_string(), "html".to_string()]);
        let out = m
            .map(json!({"raw": "...", "html": "...", "title": "t"}))
            .unwrap()
            .unwrap();
        assert_eq!(out, json!({"title": "t"}));
    }

    #[test]
    fn retain_keeps_only_named_fields() {
        let mut m = RetainFields::new(vec!["title".to_string()]);
        let out = m
            .map(json!({"raw": "...", "title": "t", "n": 1}))
            .unwrap()
            .unwrap();
        assert_eq!(out, json!({"title": "t"}));
    }

    #[test]
    fn retain_nothing_yields_falsy_object() {
        let mut m = RetainFields::new(vec!["absent".to_string()]);
        let out = m.map(json!({"title": "t"})).unwrap().unwrap();
        assert!(!crate::record::truthy(&out));
    }

    #[test]
    fn non_object_is_a_record_error() {
        let mut m = DeleteFields::new(vec!["a".to_string()]);
        assert!(m.map(json!("just a string")).is_err());
    }
}
