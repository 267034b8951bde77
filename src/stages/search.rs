/*! Weighted query scoring.

Scores documents against a weighted query over `{word: tf}` fields and
writes the result into a `score` field. Used to rank a filtered corpus
against a domain lexicon.
!*/
use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::{json, Value};

use crate::error::Error;
use crate::pipeline::{MapRecord, Resource};
use crate::record::Record;

/// Registry tag: `search`.
///
/// `field_weights` maps searched fields to their weight; each searched field
/// must hold a `{word: tf}` object. The query is either given inline (a list
/// of words, all weighted 1, or a `{word: weight}` object) or read from a
/// one- or two-column TSV file at acquire time. Exactly one of the two must
/// be configured.
pub struct Search {
    field_weights: HashMap<String, f64>,
    query: HashMap<String, f64>,
    query_file: Option<PathBuf>,
}

impl Search {
    pub fn new(
        field_weights: HashMap<String, f64>,
        query: Option<&Value>,
        query_file: Option<PathBuf>,
    ) -> Result<Self, Error> {
        if query.is_some() && query_file.is_some() {
            return Err(Error::Config(
                "only one of query and query_file can be specified".to_string(),
            ));
        }
        let inline = match query {
            Some(Value::Array(words)) => {
                let mut q = HashMap::new();
                for w in words {
                    match w.as_str() {
                        Some(w) => q.insert(w.to_string(), 1.0),
                        None => {
                            return Err(Error::Config(format!(
                                "query words must be strings, got {}",
                                w
                            )))
                        }
                    };
                }
                q
            }
            Some(Value::Object(weights)) => {
                let mut q = HashMap::new();
                for (w, weight) in weights {
                    match weight.as_f64() {
                        Some(weight) => q.insert(w.clone(), weight),
                        None => {
                            return Err(Error::Config(format!(
                                "query weight for '{}' must be a number",
                                w
                            )))
                        }
                    };
                }
                q
            }
            Some(other) => {
                return Err(Error::Config(format!(
                    "query must be a list of words or a word-to-weight object, got {}",
                    other
                )))
            }
            None => {
                if query_file.is_none() {
                    return Err(Error::Config(
                        "either query or query_file must be specified".to_string(),
                    ));
                }
                HashMap::new()
            }
        };
        Ok(Self {
            field_weights,
            query: inline,
            query_file,
        })
    }
}

impl Resource for Search {
    fn name(&self) -> &str {
        "search"
    }

    /// Loads the query file, if one was configured.
    fn acquire(&mut self) -> Result<(), Error> {
        let path = match &self.query_file {
            Some(p) => p,
            None => return Ok(()),
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;
        for row in reader.records() {
            let row = row?;
            let word = match row.get(0) {
                Some(w) if !w.is_empty() => w.to_string(),
                _ => continue,
            };
            let weight = match row.get(1) {
                Some(w) => w.trim().parse::<f64>().map_err(|e| {
                    Error::Custom(format!("bad query weight for '{}': {}", word, e))
                })?,
                None => 1.0,
            };
            self.query.insert(word, weight);
        }
        Ok(())
    }
}

impl MapRecord for Search {
    fn map(&mut self, mut record: Record) -> Result<Option<Record>, Error> {
        let mut score = 0.0;
        for (field, field_weight) in &self.field_weights {
            if let Some(Value::Object(tfs)) = record.get(field) {
                for (word, query_weight) in &self.query {
                    let tf = tfs.get(word).and_then(|v| v.as_f64()).unwrap_or(0.0);
                    score += tf * field_weight * query_weight;
                }
            }
        }
        match record.as_object_mut() {
            Some(doc) => {
                doc.insert("score".to_string(), json!(score));
                Ok(Some(record))
            }
            None => Err(Error::Custom("search expects object records".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    fn weights() -> HashMap<String, f64> {
        HashMap::from([("tf".to_string(), 2.0)])
    }

    #[test]
    fn scores_with_inline_weighted_query() {
        let query = json!({"fire": 2.0, "flood": 1.0});
        let mut s = Search::new(weights(), Some(&query), None).unwrap();
        s.acquire().unwrap();
        let out = s
            .map(json!({"tf": {"fire": 3, "water": 7}}))
            .unwrap()
            .unwrap();
        // 3 (tf) * 2 (field) * 2 (query)
        assert_eq!(out["score"], json!(12.0));
    }

    #[test]
    fn list_query_weighs_one() {
        let query = json!(["fire"]);
        let mut s = Search::new(weights(), Some(&query), None).unwrap();
        s.acquire().unwrap();
        let out = s.map(json!({"tf": {"fire": 3}})).unwrap().unwrap();
        assert_eq!(out["score"], json!(6.0));
    }

    #[test]
    fn loads_query_from_tsv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fire\t2.5").unwrap();
        writeln!(file, "flood").unwrap();
        file.flush().unwrap();

        let mut s = Search::new(weights(), None, Some(file.path().to_path_buf())).unwrap();
        s.acquire().unwrap();
        let out = s
            .map(json!({"tf": {"fire": 2, "flood": 1}}))
            .unwrap()
            .unwrap();
        // 2*2*2.5 + 1*2*1
        assert_eq!(out["score"], json!(12.0));
    }

    #[test]
    fn query_and_query_file_are_exclusive() {
        let query = json!(["fire"]);
        assert!(matches!(
            Search::new(weights(), Some(&query), Some("q.tsv".into())),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Search::new(weights(), None, None),
            Err(Error::Config(_))
        ));
    }
}
