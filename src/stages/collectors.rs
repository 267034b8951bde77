/*! General-purpose collectors.

Terminal stages reducing a record sequence to an aggregate. These are the
only stages allowed to hold more than O(1) state across the sequence; all of
them return lists of JSON values so that per-worker aggregates can be
concatenated and reduced again by a final reducer stage.
!*/
use std::collections::BTreeMap;

use itertools::Itertools;
use log::warn;
use serde_json::{json, Map, Value};

use crate::error::Error;
use crate::pipeline::{Collect, Resource};
use crate::record::{cmp_values, identity, Record};

/// Collects records into a list. Registry tag: `list`.
pub struct ListCollector;

impl Resource for ListCollector {
    fn name(&self) -> &str {
        "list"
    }
}

impl Collect for ListCollector {
    fn collect(&mut self, records: &mut dyn Iterator<Item = Record>) -> Result<Vec<Record>, Error> {
        Ok(records.collect())
    }
}

/// Collects distinct records, preserving first-seen order.
/// Registry tag: `set`.
pub struct SetCollector;

impl Resource for SetCollector {
    fn name(&self) -> &str {
        "set"
    }
}

impl Collect for SetCollector {
    fn collect(&mut self, records: &mut dyn Iterator<Item = Record>) -> Result<Vec<Record>, Error> {
        Ok(records.unique_by(|r| r.to_string()).collect())
    }
}

/// Counts records. Registry tag: `doc_count`.
pub struct DocCount;

impl Resource for DocCount {
    fn name(&self) -> &str {
        "doc_count"
    }
}

impl Collect for DocCount {
    fn collect(&mut self, records: &mut dyn Iterator<Item = Record>) -> Result<Vec<Record>, Error> {
        Ok(vec![Value::from(records.count() as u64)])
    }
}

/// Sums numeric records. Registry tag: `sum`.
pub struct Sum;

impl Resource for Sum {
    fn name(&self) -> &str {
        "sum"
    }
}

impl Collect for Sum {
    fn collect(&mut self, records: &mut dyn Iterator<Item = Record>) -> Result<Vec<Record>, Error> {
        let mut total = 0.0;
        for record in records {
            match record.as_f64() {
                Some(n) => total += n,
                None => warn!("sum skipping non-numeric record {}", identity(&record)),
            }
        }
        Ok(vec![json!(total)])
    }
}

/// Sorts documents by the given `(field, reverse)` keys; the first field is
/// the most significant. Keeps all records in memory. Registry tag: `sorter`.
pub struct Sorter {
    fields: Vec<(String, bool)>,
}

impl Sorter {
    pub fn new(fields: Vec<(String, bool)>) -> Self {
        Self { fields }
    }
}

impl Resource for Sorter {
    fn name(&self) -> &str {
        "sorter"
    }
}

impl Collect for Sorter {
    fn collect(&mut self, records: &mut dyn Iterator<Item = Record>) -> Result<Vec<Record>, Error> {
        let mut all: Vec<Record> = records.collect();
        all.sort_by(|a, b| {
            for (field, reverse) in &self.fields {
                let (va, vb) = (
                    a.get(field).unwrap_or(&Value::Null),
                    b.get(field).unwrap_or(&Value::Null),
                );
                let ordering = cmp_values(va, vb);
                let ordering = if *reverse { ordering.reverse() } else { ordering };
                if !ordering.is_eq() {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
        Ok(all)
    }
}

/// Aggregates object records key by key with `+`: numbers add, strings and
/// arrays concatenate. With `fields` set, the named object fields of each
/// record are aggregated separately instead of the records themselves.
/// Registry tag: `dict_aggregator`.
///
/// The first value seen under a key sets its type; later values of an
/// incompatible type are logged and skipped.
pub struct DictAggregator {
    fields: Option<Vec<String>>,
}

impl DictAggregator {
    pub fn new(fields: Option<Vec<String>>) -> Self {
        Self { fields }
    }

    fn merge(collected: &mut Map<String, Value>, obj: &Map<String, Value>) {
        for (key, value) in obj {
            match collected.get_mut(key) {
                Some(existing) => {
                    if !add_values(existing, value) {
                        warn!("dict_aggregator cannot add values under '{}'", key);
                    }
                }
                None => {
                    collected.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

fn add_values(a: &mut Value, b: &Value) -> bool {
    match (a.take(), b) {
        (Value::Number(x), Value::Number(y)) => {
            *a = json!(x.as_f64().unwrap_or(0.0) + y.as_f64().unwrap_or(0.0));
            true
        }
        (Value::String(mut x), Value::String(y)) => {
            x.push_str(y);
            *a = Value::String(x);
            true
        }
        (Value::Array(mut xs), Value::Array(ys)) => {
            xs.extend(ys.iter().cloned());
            *a = Value::Array(xs);
            true
        }
        (old, _) => {
            *a = old;
            false
        }
    }
}

impl Resource for DictAggregator {
    fn name(&self) -> &str {
        "dict_aggregator"
    }
}

impl Collect for DictAggregator {
    fn collect(&mut self, records: &mut dyn Iterator<Item = Record>) -> Result<Vec<Record>, Error> {
        match &self.fields {
            None => {
                let mut collected = Map::new();
                for record in records {
                    match record {
                        Value::Object(obj) => Self::merge(&mut collected, &obj),
                        other => warn!(
                            "dict_aggregator skipping non-object record {}",
                            identity(&other)
                        ),
                    }
                }
                Ok(vec![Value::Object(collected)])
            }
            Some(fields) => {
                let mut collected: Map<String, Value> = fields
                    .iter()
                    .map(|f| (f.clone(), Value::Object(Map::new())))
                    .collect();
                for record in records {
                    for field in fields {
                        if let Some(Value::Object(obj)) = record.get(field) {
                            if let Some(Value::Object(target)) = collected.get_mut(field) {
                                Self::merge(target, obj);
                            }
                        }
                    }
                }
                Ok(vec![Value::Object(collected)])
            }
        }
    }
}

/// Aggregates `{word: tf}` fields into corpus-level term and document
/// frequencies. Registry tag: `tf_df`.
///
/// `field_weights` names the fields to aggregate and how much weight their
/// term frequencies carry (weights affect TF only, never DF). The aggregate
/// is a single `{"tf": .., "df": ..}` object.
pub struct TfDf {
    field_weights: Vec<(String, f64)>,
}

impl TfDf {
    pub fn new(field_weights: Vec<(String, f64)>) -> Self {
        Self { field_weights }
    }
}

impl Resource for TfDf {
    fn name(&self) -> &str {
        "tf_df"
    }
}

impl Collect for TfDf {
    fn collect(&mut self, records: &mut dyn Iterator<Item = Record>) -> Result<Vec<Record>, Error> {
        let mut tf: BTreeMap<String, f64> = BTreeMap::new();
        let mut df: BTreeMap<String, u64> = BTreeMap::new();
        for record in records {
            let mut seen: Vec<&str> = Vec::new();
            for (field, weight) in &self.field_weights {
                let counts = match record.get(field) {
                    Some(Value::Object(counts)) => counts,
                    _ => continue,
                };
                for (word, count) in counts {
                    let count = count.as_f64().unwrap_or(0.0);
                    *tf.entry(word.clone()).or_default() += count * weight;
                    if !seen.contains(&word.as_str()) {
                        seen.push(word);
                    }
                }
            }
            for word in seen {
                *df.entry(word.to_string()).or_default() += 1;
            }
        }
        Ok(vec![json!({ "tf": tf, "df": df })])
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn set_deduplicates_in_order() {
        let mut c = SetCollector;
        let out = c
            .collect(&mut vec![json!("b"), json!("a"), json!("b")].into_iter())
            .unwrap();
        assert_eq!(out, vec![json!("b"), json!("a")]);
    }

    #[test]
    fn doc_count_and_sum() {
        let mut count = DocCount;
        let out = count
            .collect(&mut vec![json!(1), json!(2), json!(3)].into_iter())
            .unwrap();
        assert_eq!(out, vec![json!(3)]);

        let mut sum = Sum;
        let out = sum
            .collect(&mut vec![json!(1), json!(2.5), json!("x")].into_iter())
            .unwrap();
        assert_eq!(out, vec![json!(3.5)]);
    }

    #[test]
    fn sorter_orders_by_fields() {
        let mut s = Sorter::new(vec![("score".to_string(), true), ("id".to_string(), false)]);
        let out = s
            .collect(
                &mut vec![
                    json!({"id": "b", "score": 1}),
                    json!({"id": "a", "score": 2}),
                    json!({"id": "a", "score": 1}),
                ]
                .into_iter(),
            )
            .unwrap();
        assert_eq!(
            out,
            vec![
                json!({"id": "a", "score": 2}),
                json!({"id": "a", "score": 1}),
                json!({"id": "b", "score": 1}),
            ]
        );
    }

    #[test]
    fn sorter_sends_missing_fields_first() {
        let mut s = Sorter::new(vec![("score".to_string(), false)]);
        let out = s
            .collect(&mut vec![json!({"score": 1}), json!({})].into_iter())
            .unwrap();
        assert_eq!(out, vec![json!({}), json!({"score": 1})]);
    }

    #[test]
    fn dict_aggregator_adds_records_key_by_key() {
        let mut c = DictAggregator::new(None);
        let out = c
            .collect(
                &mut vec![
                    json!({"lines": 1, "words": 2, "tags": ["a"]}),
                    json!({"lines": 3, "words": 4, "chars": 5, "tags": ["b"]}),
                ]
                .into_iter(),
            )
            .unwrap();
        assert_eq!(
            out,
            vec![json!({
                "lines": 4.0,
                "words": 6.0,
                "chars": 5,
                "tags": ["a", "b"],
            })]
        );
    }

    #[test]
    fn dict_aggregator_over_named_fields() {
        let mut c = DictAggregator::new(Some(vec!["tf".to_string()]));
        let out = c
            .collect(
                &mut vec![
                    json!({"tf": {"fire": 1}, "other": "ignored"}),
                    json!({"tf": {"fire": 2, "flood": 1}}),
                    json!({"no_tf": true}),
                ]
                .into_iter(),
            )
            .unwrap();
        assert_eq!(out, vec![json!({"tf": {"fire": 3.0, "flood": 1}})]);
    }

    #[test]
    fn dict_aggregator_keeps_first_value_on_type_mismatch() {
        let mut c = DictAggregator::new(None);
        let out = c
            .collect(&mut vec![json!({"x": 1}), json!({"x": "s"})].into_iter())
            .unwrap();
        assert_eq!(out, vec![json!({"x": 1})]);
    }

    #[test]
    fn tf_df_aggregates_with_weights() {
        let mut c = TfDf::new(vec![("title".to_string(), 2.0), ("body".to_string(), 1.0)]);
        let out = c
            .collect(
                &mut vec![
                    json!({"title": {"fire": 1}, "body": {"fire": 3, "water": 2}}),
                    json!({"body": {"water": 1}}),
                ]
                .into_iter(),
            )
            .unwrap();
        // fire: 1*2 + 3*1; water: 2*1 + 1*1
        assert_eq!(
            out,
            vec![json!({
                "tf": {"fire": 5.0, "water": 3.0},
                "df": {"fire": 1, "water": 2},
            })]
        );
    }
}
