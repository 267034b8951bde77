/*! Stage registry.

Maps configuration tags to stage constructors, populated with the built-in
stage library at process start. Configuration references a tag; the lookup
happens at composition time, and unresolvable tags or malformed kwargs are
fatal configuration errors reported before any processing begins.
!*/
use std::collections::HashMap;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::descriptor::StageDescriptor;
use crate::error::Error;
use crate::pipeline::Stage;
use crate::stages::{
    Bigrams, DeleteFields, DictAggregator, DocCount, FilterEmpty, JsonReader, JsonWriter,
    LanguageFilter, Length, ListCollector, LshDedup, MinHash, OneOrMany, RetainFields, Search,
    SetCollector, Sorter, Sum, TfDf, WordCount,
};

pub type Constructor = fn(&StageDescriptor) -> Result<Stage, Error>;

pub struct Registry {
    constructors: HashMap<String, Constructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// The built-in stage library.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("json_reader", build_json_reader);
        registry.register("json_writer", build_json_writer);
        registry.register("delete_fields", build_delete_fields);
        registry.register("retain_fields", build_retain_fields);
        registry.register("filter_empty", build_filter_empty);
        registry.register("length", build_length);
        registry.register("language_filter", build_language_filter);
        registry.register("search", build_search);
        registry.register("minhash", build_minhash);
        registry.register("lsh_dedup", build_lsh_dedup);
        registry.register("list", |_| Ok(Stage::Collector(Box::new(ListCollector))));
        registry.register("set", |_| Ok(Stage::Collector(Box::new(SetCollector))));
        registry.register("doc_count", |_| Ok(Stage::Collector(Box::new(DocCount))));
        registry.register("sum", |_| Ok(Stage::Collector(Box::new(Sum))));
        registry.register("sorter", build_sorter);
        registry.register("tf_df", build_tf_df);
        registry.register("bigrams", build_bigrams);
        registry.register("wc", build_wc);
        registry.register("dict_aggregator", build_dict_aggregator);
        registry
    }

    pub fn register(&mut self, tag: &str, constructor: Constructor) {
        self.constructors.insert(tag.to_string(), constructor);
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    pub fn build(&self, descriptor: &StageDescriptor) -> Result<Stage, Error> {
        let constructor = self.constructors.get(&descriptor.class).ok_or_else(|| {
            Error::Config(format!("unknown stage class '{}'", descriptor.class))
        })?;
        constructor(descriptor)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialize a descriptor's kwargs into a typed parameter struct.
fn params<T: DeserializeOwned>(descriptor: &StageDescriptor) -> Result<T, Error> {
    serde_json::from_value(Value::Object(descriptor.kwargs.clone())).map_err(|e| {
        Error::Config(format!(
            "bad kwargs for stage '{}': {}",
            descriptor.class, e
        ))
    })
}

/// Reader/writer paths come as the single positional argument, or as a
/// `path` kwarg.
fn path_of(descriptor: &StageDescriptor) -> Result<PathBuf, Error> {
    if let Some(arg) = descriptor.args.first() {
        if let Some(path) = arg.as_str() {
            return Ok(PathBuf::from(path));
        }
    }
    if let Some(path) = descriptor.kwargs.get("path").and_then(|v| v.as_str()) {
        return Ok(PathBuf::from(path));
    }
    Err(Error::Config(format!(
        "stage '{}' needs a path (positional arg or 'path' kwarg)",
        descriptor.class
    )))
}

fn build_json_reader(d: &StageDescriptor) -> Result<Stage, Error> {
    Ok(Stage::Source(Box::new(JsonReader::new(path_of(d)?))))
}

fn build_json_writer(d: &StageDescriptor) -> Result<Stage, Error> {
    Ok(Stage::Collector(Box::new(JsonWriter::new(path_of(d)?))))
}

#[derive(Deserialize)]
struct FieldsParams {
    fields: OneOrMany<String>,
}

fn build_delete_fields(d: &StageDescriptor) -> Result<Stage, Error> {
    let p: FieldsParams = params(d)?;
    Ok(Stage::Map(Box::new(DeleteFields::new(p.fields.into()))))
}

fn build_retain_fields(d: &StageDescriptor) -> Result<Stage, Error> {
    let p: FieldsParams = params(d)?;
    Ok(Stage::Map(Box::new(RetainFields::new(p.fields.into()))))
}

fn build_filter_empty(d: &StageDescriptor) -> Result<Stage, Error> {
    let p: FieldsParams = params(d)?;
    Ok(Stage::Filter(Box::new(FilterEmpty::new(p.fields.into()))))
}

#[derive(Deserialize)]
struct LengthParams {
    #[serde(default)]
    field: Option<String>,
    min_length: usize,
}

fn build_length(d: &StageDescriptor) -> Result<Stage, Error> {
    let p: LengthParams = params(d)?;
    Ok(Stage::Filter(Box::new(Length::new(p.field, p.min_length))))
}

#[derive(Deserialize)]
struct LanguageParams {
    fields: OneOrMany<String>,
    languages: OneOrMany<String>,
    #[serde(default = "default_model_path")]
    model_path: PathBuf,
    #[serde(default = "default_lid_threshold")]
    threshold: f32,
}

fn default_model_path() -> PathBuf {
    PathBuf::from("lid.176.bin")
}

fn default_lid_threshold() -> f32 {
    0.8
}

fn build_language_filter(d: &StageDescriptor) -> Result<Stage, Error> {
    let p: LanguageParams = params(d)?;
    Ok(Stage::Filter(Box::new(LanguageFilter::new(
        p.fields.into(),
        p.languages.into(),
        p.model_path,
        p.threshold,
    ))))
}

#[derive(Deserialize)]
struct SearchParams {
    field_weights: HashMap<String, f64>,
    #[serde(default)]
    query: Option<Value>,
    #[serde(default)]
    query_file: Option<PathBuf>,
}

fn build_search(d: &StageDescriptor) -> Result<Stage, Error> {
    let p: SearchParams = params(d)?;
    Ok(Stage::Map(Box::new(Search::new(
        p.field_weights,
        p.query.as_ref(),
        p.query_file,
    )?)))
}

#[derive(Deserialize)]
struct MinHashParams {
    fields: OneOrMany<String>,
    #[serde(default = "default_shingles")]
    shingles: usize,
    #[serde(default = "default_num_perm")]
    num_perm: usize,
}

fn default_shingles() -> usize {
    5
}

fn default_num_perm() -> usize {
    128
}

fn build_minhash(d: &StageDescriptor) -> Result<Stage, Error> {
    let p: MinHashParams = params(d)?;
    Ok(Stage::Map(Box::new(MinHash::new(
        p.fields.into(),
        p.shingles,
        p.num_perm,
    )?)))
}

#[derive(Deserialize)]
struct LshParams {
    id_field: String,
    out_field: String,
    threshold: f64,
    #[serde(default = "default_num_perm")]
    num_perm: usize,
}

fn build_lsh_dedup(d: &StageDescriptor) -> Result<Stage, Error> {
    let p: LshParams = params(d)?;
    Ok(Stage::Collector(Box::new(LshDedup::new(
        p.id_field,
        p.out_field,
        p.threshold,
        p.num_perm,
    )?)))
}

#[derive(Deserialize)]
struct SorterParams {
    fields: Vec<(String, bool)>,
}

fn build_sorter(d: &StageDescriptor) -> Result<Stage, Error> {
    let p: SorterParams = params(d)?;
    Ok(Stage::Collector(Box::new(Sorter::new(p.fields))))
}

#[derive(Deserialize)]
struct BigramsParams {
    fields: OneOrMany<String>,
    #[serde(default)]
    overwrite: bool,
}

fn build_bigrams(d: &StageDescriptor) -> Result<Stage, Error> {
    let p: BigramsParams = params(d)?;
    Ok(Stage::Map(Box::new(Bigrams::new(
        p.fields.into(),
        p.overwrite,
    ))))
}

#[derive(Deserialize)]
struct WcParams {
    field: String,
}

fn build_wc(d: &StageDescriptor) -> Result<Stage, Error> {
    let p: WcParams = params(d)?;
    Ok(Stage::Map(Box::new(WordCount::new(p.field))))
}

#[derive(Deserialize)]
struct DictAggregatorParams {
    #[serde(default)]
    fields: Option<OneOrMany<String>>,
}

fn build_dict_aggregator(d: &StageDescriptor) -> Result<Stage, Error> {
    let p: DictAggregatorParams = params(d)?;
    Ok(Stage::Collector(Box::new(DictAggregator::new(
        p.fields.map(Into::into),
    ))))
}

#[derive(Deserialize)]
struct TfDfParams {
    field_weights: HashMap<String, f64>,
}

fn build_tf_df(d: &StageDescriptor) -> Result<Stage, Error> {
    let p: TfDfParams = params(d)?;
    Ok(Stage::Collector(Box::new(TfDf::new(
        p.field_weights.into_iter().collect(),
    ))))
}
