/*! Near-duplicate detection.

Two stages: [MinHash] computes per-document signatures (the map half), and
[LshDedup] buckets signatures with locality-sensitive hashing and keeps one
document per near-duplicate cluster (the collector half). Splitting the work
this way keeps the map side streaming; only the collector holds state across
the whole sequence.
!*/
use std::collections::{HashMap, HashSet};
use std::hash::Hasher;

use log::{debug, warn};
use serde_json::Value;
use twox_hash::XxHash64;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::Error;
use crate::pipeline::{Collect, MapRecord, Resource};
use crate::record::{identity, truthy, Record};

const SIGNATURE_FIELD: &str = "minhash";

fn hash_shingle(seed: u64, shingle: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(seed);
    hasher.write(shingle.as_bytes());
    hasher.finish()
}

/// MinHash signature computation. Registry tag: `minhash`.
///
/// Shingles the named fields into n-grams (words of a string field, string
/// items of an array field), minhashes the shingle set under `num_perm`
/// seeded permutations and stores the signature in the `minhash` field.
/// Documents yielding no shingles at all are dropped.
pub struct MinHash {
    fields: Vec<String>,
    shingles: usize,
    num_perm: usize,
}

impl MinHash {
    pub fn new(fields: Vec<String>, shingles: usize, num_perm: usize) -> Result<Self, Error> {
        if shingles == 0 || num_perm == 0 {
            return Err(Error::Config(
                "minhash needs shingles >= 1 and num_perm >= 1".to_string(),
            ));
        }
        Ok(Self {
            fields,
            shingles,
            num_perm,
        })
    }

    fn shinglize(&self, value: &Value, shingles: &mut HashSet<String>) {
        let tokens: Vec<String> = match value {
            Value::String(s) => s.unicode_words().map(str::to_string).collect(),
            Value::Array(items) => items
                .iter()
                .map(|i| match i {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            _ => return,
        };
        for window in tokens.windows(self.shingles) {
            shingles.insert(window.join(" "));
        }
    }

    fn signature(&self, shingles: &HashSet<String>) -> Vec<u64> {
        let mut signature = vec![u64::MAX; self.num_perm];
        for shingle in shingles {
            for (seed, slot) in signature.iter_mut().enumerate() {
                let h = hash_shingle(seed as u64, shingle);
                if h < *slot {
                    *slot = h;
                }
            }
        }
        signature
    }
}

impl Resource for MinHash {
    fn name(&self) -> &str {
        "minhash"
    }
}

impl MapRecord for MinHash {
    fn map(&mut self, mut record: Record) -> Result<Option<Record>, Error> {
        let mut shingles = HashSet::new();
        for field in &self.fields {
            if let Some(value) = record.get(field) {
                if truthy(value) {
                    self.shinglize(value, &mut shingles);
                }
            }
        }
        if shingles.is_empty() {
            return Ok(None);
        }
        let signature = self.signature(&shingles);
        match record.as_object_mut() {
            Some(doc) => {
                doc.insert(
                    SIGNATURE_FIELD.to_string(),
                    Value::Array(signature.into_iter().map(Value::from).collect()),
                );
                Ok(Some(record))
            }
            None => Err(Error::Custom("minhash expects object records".to_string())),
        }
    }
}

/// Pick the band/row split of `num_perm` whose LSH threshold
/// `(1/bands)^(1/rows)` lands closest to the requested one.
fn band_partition(num_perm: usize, threshold: f64) -> (usize, usize) {
    let mut best = (num_perm, 1);
    let mut best_distance = f64::MAX;
    for bands in 1..=num_perm {
        if num_perm % bands != 0 {
            continue;
        }
        let rows = num_perm / bands;
        let estimated = (1.0 / bands as f64).powf(1.0 / rows as f64);
        let distance = (estimated - threshold).abs();
        if distance < best_distance {
            best_distance = distance;
            best = (bands, rows);
        }
    }
    best
}

/// LSH deduplication collector. Registry tag: `lsh_dedup`.
///
/// Keeps the first document of every near-duplicate cluster (Jaccard
/// similarity of signatures above `threshold`) and returns the kept
/// documents' `out_field` values. Holds every kept signature in memory.
pub struct LshDedup {
    id_field: String,
    out_field: String,
    threshold: f64,
    num_perm: usize,
    bands: usize,
    rows: usize,
}

impl LshDedup {
    pub fn new(
        id_field: String,
        out_field: String,
        threshold: f64,
        num_perm: usize,
    ) -> Result<Self, Error> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "lsh threshold must be in [0, 1], got {}",
                threshold
            )));
        }
        if num_perm == 0 {
            return Err(Error::Config("lsh needs num_perm >= 1".to_string()));
        }
        let (bands, rows) = band_partition(num_perm, threshold);
        Ok(Self {
            id_field,
            out_field,
            threshold,
            num_perm,
            bands,
            rows,
        })
    }

    fn parse_signature(&self, record: &Record) -> Option<Vec<u64>> {
        let values = record.get(SIGNATURE_FIELD)?.as_array()?;
        if values.len() != self.num_perm {
            return None;
        }
        values.iter().map(|v| v.as_u64()).collect()
    }

    fn band_keys(&self, signature: &[u64]) -> Vec<(usize, u64)> {
        (0..self.bands)
            .map(|band| {
                let mut hasher = XxHash64::with_seed(band as u64);
                for slot in &signature[band * self.rows..(band + 1) * self.rows] {
                    hasher.write_u64(*slot);
                }
                (band, hasher.finish())
            })
            .collect()
    }

    fn estimate(a: &[u64], b: &[u64]) -> f64 {
        let equal = a.iter().zip(b).filter(|(x, y)| x == y).count();
        equal as f64 / a.len() as f64
    }
}

impl Resource for LshDedup {
    fn name(&self) -> &str {
        "lsh_dedup"
    }
}

impl Collect for LshDedup {
    fn collect(&mut self, records: &mut dyn Iterator<Item = Record>) -> Result<Vec<Record>, Error> {
        let mut buckets: HashMap<(usize, u64), Vec<usize>> = HashMap::new();
        let mut signatures: Vec<Vec<u64>> = Vec::new();
        let mut kept = Vec::new();
        for record in records {
            let signature = match self.parse_signature(&record) {
                Some(s) => s,
                None => {
                    warn!("no usable minhash signature in {}", identity(&record));
                    continue;
                }
            };
            let out = match record.get(&self.out_field) {
                Some(v) => v.clone(),
                None => {
                    warn!(
                        "missing out field '{}' in {}",
                        self.out_field,
                        identity(&record)
                    );
                    continue;
                }
            };
            let keys = self.band_keys(&signature);
            let mut candidates: HashSet<usize> = HashSet::new();
            for key in &keys {
                if let Some(bucket) = buckets.get(key) {
                    candidates.extend(bucket);
                }
            }
            let duplicate = candidates
                .iter()
                .any(|&c| Self::estimate(&signature, &signatures[c]) >= self.threshold);
            if duplicate {
                debug!(
                    "dropping near-duplicate {:?}",
                    record.get(&self.id_field).unwrap_or(&Value::Null)
                );
                continue;
            }
            let index = signatures.len();
            signatures.push(signature);
            for key in keys {
                buckets.entry(key).or_default().push(index);
            }
            kept.push(out);
        }
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(id: &str, content: &str) -> Record {
        json!({"id": id, "content": content})
    }

    const TEXT: &str = "the quick brown fox jumps over the lazy dog again and again \
                        until the dog finally wakes up and chases the fox away";

    #[test]
    fn signature_is_deterministic() {
        let mut m = MinHash::new(vec!["content".to_string()], 3, 64).unwrap();
        let a = m.map(doc("a", TEXT)).unwrap().unwrap();
        let b = m.map(doc("b", TEXT)).unwrap().unwrap();
        assert_eq!(a["minhash"], b["minhash"]);
        assert_eq!(a["minhash"].as_array().unwrap().len(), 64);
    }

    #[test]
    fn too_short_document_is_dropped() {
        let mut m = MinHash::new(vec!["content".to_string()], 5, 64).unwrap();
        assert!(m.map(doc("a", "only three words")).unwrap().is_none());
        assert!(m.map(json!({"other": "field"})).unwrap().is_none());
    }

    #[test]
    fn array_fields_shinglize_too() {
        let mut m = MinHash::new(vec!["tokens".to_string()], 2, 16).unwrap();
        let out = m
            .map(json!({"tokens": ["a", "b", "c"]}))
            .unwrap()
            .unwrap();
        assert_eq!(out["minhash"].as_array().unwrap().len(), 16);
    }

    #[test]
    fn band_partition_covers_permutations() {
        for num_perm in [16, 64, 128] {
            let (b, r) = band_partition(num_perm, 0.9);
            assert_eq!(b * r, num_perm);
        }
        // low thresholds want many bands, high thresholds few
        let (low_bands, _) = band_partition(128, 0.2);
        let (high_bands, _) = band_partition(128, 0.95);
        assert!(low_bands > high_bands);
    }

    #[test]
    fn keeps_first_of_duplicate_cluster() {
        let mut m = MinHash::new(vec!["content".to_string()], 3, 128).unwrap();
        let docs: Vec<Record> = [
            doc("a", TEXT),
            doc("b", TEXT),
            doc("c", "a completely different document about corpus construction \
                      pipelines and their resource lifecycle guarantees and more"),
        ]
        .into_iter()
        .map(|d| m.map(d).unwrap().unwrap())
        .collect();

        let mut lsh = LshDedup::new("id".to_string(), "id".to_string(), 0.9, 128).unwrap();
        let kept = lsh.collect(&mut docs.into_iter()).unwrap();
        assert_eq!(kept, vec![json!("a"), json!("c")]);
    }

    #[test]
    fn unsigned_records_are_skipped() {
        let mut lsh = LshDedup::new("id".to_string(), "id".to_string(), 0.9, 128).unwrap();
        let kept = lsh
            .collect(&mut vec![json!({"id": "a"})].into_iter())
            .unwrap();
        assert!(kept.is_empty());
    }

    #[test]
    fn bad_threshold_is_a_config_error() {
        assert!(matches!(
            LshDedup::new("id".into(), "id".into(), 1.5, 128),
            Err(Error::Config(_))
        ));
    }
}
