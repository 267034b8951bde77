/*! Text-derived fields and statistics.

Maps producing material for the counting collectors: bigram fields feeding
TF/DF and minhash runs, and per-document line/word/character counts.
!*/
use serde_json::{json, Value};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::Error;
use crate::pipeline::{MapRecord, Resource};
use crate::record::Record;

/// Adds a `{field}_bigrams` field for every named field: consecutive token
/// pairs joined by an underscore, so that text-based tools can treat them as
/// single words. Registry tag: `bigrams`.
///
/// String fields are split into Unicode words, array fields are taken as
/// token lists. An existing `{field}_bigrams` field is left alone unless
/// `overwrite` is set; fields of other types are skipped.
pub struct Bigrams {
    fields: Vec<String>,
    overwrite: bool,
}

impl Bigrams {
    pub fn new(fields: Vec<String>, overwrite: bool) -> Self {
        Self { fields, overwrite }
    }

    fn tokens(value: &Value) -> Option<Vec<String>> {
        match value {
            Value::String(s) => Some(s.unicode_words().map(str::to_string).collect()),
            Value::Array(items) => Some(
                items
                    .iter()
                    .map(|i| match i {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl Resource for Bigrams {
    fn name(&self) -> &str {
        "bigrams"
    }
}

impl MapRecord for Bigrams {
    fn map(&mut self, mut record: Record) -> Result<Option<Record>, Error> {
        let doc = match record.as_object_mut() {
            Some(doc) => doc,
            None => return Err(Error::Custom("bigrams expects object records".to_string())),
        };
        for field in &self.fields {
            let new_field = format!("{}_bigrams", field);
            if doc.contains_key(&new_field) && !self.overwrite {
                continue;
            }
            let tokens = match doc.get(field).and_then(Self::tokens) {
                Some(t) => t,
                None => continue,
            };
            let bigrams: Vec<Value> = tokens
                .windows(2)
                .map(|pair| Value::from(pair.join("_")))
                .collect();
            doc.insert(new_field, Value::Array(bigrams));
        }
        Ok(Some(record))
    }
}

/// Replaces each document with the line, word and character counts of one
/// field, for corpus-level statistics (aggregate the output with
/// `dict_aggregator` or `sum`). Registry tag: `wc`.
///
/// A missing or empty field yields all-zero counts. A trailing newline
/// counts as one extra line.
pub struct WordCount {
    field: String,
}

impl WordCount {
    pub fn new(field: String) -> Self {
        Self { field }
    }
}

impl Resource for WordCount {
    fn name(&self) -> &str {
        "wc"
    }
}

impl MapRecord for WordCount {
    fn map(&mut self, record: Record) -> Result<Option<Record>, Error> {
        let counts = match record.get(&self.field).and_then(|v| v.as_str()) {
            Some(text) if !text.is_empty() => {
                let mut lines = text.matches('\n').count();
                if text.ends_with('\n') {
                    lines += 1;
                }
                json!({
                    "lines": lines,
                    "words": text.split_whitespace().count(),
                    "chars": text.chars().count(),
                })
            }
            _ => json!({"lines": 0, "words": 0, "chars": 0}),
        };
        Ok(Some(counts))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn bigrams_from_string_and_array_fields() {
        let mut m = Bigrams::new(vec!["title".to_string(), "tokens".to_string()], false);
        let out = m
            .map(json!({"title": "flash flood warning", "tokens": ["a", "b", "c"]}))
            .unwrap()
            .unwrap();
        assert_eq!(
            out["title_bigrams"],
            json!(["flash_flood", "flood_warning"])
        );
        assert_eq!(out["tokens_bigrams"], json!(["a_b", "b_c"]));
    }

    #[test]
    fn bigrams_keeps_existing_field_unless_overwriting() {
        let doc = json!({"t": "a b c", "t_bigrams": ["kept"]});
        let mut keep = Bigrams::new(vec!["t".to_string()], false);
        assert_eq!(
            keep.map(doc.clone()).unwrap().unwrap()["t_bigrams"],
            json!(["kept"])
        );
        let mut overwrite = Bigrams::new(vec!["t".to_string()], true);
        assert_eq!(
            overwrite.map(doc).unwrap().unwrap()["t_bigrams"],
            json!(["a_b", "b_c"])
        );
    }

    #[test]
    fn bigrams_skips_missing_and_unsupported_fields() {
        let mut m = Bigrams::new(vec!["absent".to_string(), "n".to_string()], false);
        let out = m.map(json!({"n": 42})).unwrap().unwrap();
        assert_eq!(out, json!({"n": 42}));
    }

    #[test]
    fn wc_counts_lines_words_chars() {
        let mut m = WordCount::new("content".to_string());
        let out = m
            .map(json!({"content": "one two\nthree four"}))
            .unwrap()
            .unwrap();
        assert_eq!(out, json!({"lines": 1, "words": 4, "chars": 18}));
    }

    #[test]
    fn wc_trailing_newline_is_an_extra_line() {
        let mut m = WordCount::new("content".to_string());
        let out = m.map(json!({"content": "a\nb\n"})).unwrap().unwrap();
        assert_eq!(out["lines"], json!(3));
    }

    #[test]
    fn wc_missing_or_empty_field_is_all_zeros() {
        let mut m = WordCount::new("content".to_string());
        let zeros = json!({"lines": 0, "words": 0, "chars": 0});
        assert_eq!(m.map(json!({"content": ""})).unwrap().unwrap(), zeros);
        assert_eq!(m.map(json!({"other": "x"})).unwrap().unwrap(), zeros);
    }
}
