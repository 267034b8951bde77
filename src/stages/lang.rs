/*! Language filtering.

fastText-based language identification over document fields. The model
(e.g. `lid.176.bin`) is loaded at acquire time, once per worker, and shared
by every record that worker processes.
!*/
use std::collections::HashSet;
use std::path::PathBuf;

use fasttext::FastText as FastTextLib;

use crate::error::Error;
use crate::pipeline::{DetectRecord, Resource};
use crate::record::Record;

/// Clean a prediction label from `__label__xx` into `xx`.
fn clean_label(label: &str) -> &str {
    label.strip_prefix("__label__").unwrap_or(label)
}

/// Keeps documents identified as one of the allowed languages.
/// Registry tag: `language_filter`.
///
/// Identification runs on the newline-joined concatenation of the named
/// fields; documents with no identifiable text are dropped.
pub struct LanguageFilter {
    fields: Vec<String>,
    languages: HashSet<String>,
    model_path: PathBuf,
    threshold: f32,
    predictor: Option<FastTextLib>,
}

impl LanguageFilter {
    pub fn new(
        fields: Vec<String>,
        languages: Vec<String>,
        model_path: PathBuf,
        threshold: f32,
    ) -> Self {
        Self {
            fields,
            languages: languages.into_iter().collect(),
            model_path,
            threshold,
            predictor: None,
        }
    }

    fn text_of(&self, record: &Record) -> String {
        self.fields
            .iter()
            .filter_map(|f| record.get(f).and_then(|v| v.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
            // unicode null chars break fasttext
            .replace(char::from(0), "")
    }
}

impl Resource for LanguageFilter {
    fn name(&self) -> &str {
        "language_filter"
    }

    fn acquire(&mut self) -> Result<(), Error> {
        let path = self.model_path.to_str().ok_or_else(|| {
            Error::Custom(format!("invalid model path: {:?}", self.model_path))
        })?;
        let mut predictor = FastTextLib::new();
        predictor.load_model(path).map_err(Error::FastText)?;
        self.predictor = Some(predictor);
        Ok(())
    }

    fn release(&mut self, _failure: Option<&Error>) -> Result<bool, Error> {
        self.predictor = None;
        Ok(false)
    }
}

impl DetectRecord for LanguageFilter {
    fn detect(&mut self, record: &Record) -> Result<bool, Error> {
        let predictor = self
            .predictor
            .as_ref()
            .ok_or_else(|| Error::Custom("language_filter used before acquire".to_string()))?;
        let text = self.text_of(record);
        if text.trim().is_empty() {
            return Ok(false);
        }
        let predictions = predictor
            .predict(&text, 1, self.threshold)
            .map_err(Error::FastText)?;
        Ok(predictions
            .first()
            .map(|p| self.languages.contains(clean_label(&p.label)))
            .unwrap_or(false))
    }
}
