/*! Stage library.

Concrete sources, transforms and collectors for corpus processing. Every
stage here is registered in [crate::config::Registry] under the tag noted in
its docs, and can also be constructed directly when building pipelines from
code.
!*/
mod collectors;
mod fields;
mod filters;
mod json;
mod lang;
mod minhash;
mod search;
mod text;

pub use collectors::{DictAggregator, DocCount, ListCollector, SetCollector, Sorter, Sum, TfDf};
pub use fields::{DeleteFields, RetainFields};
pub use filters::{FilterEmpty, Length};
pub use json::{JsonReader, JsonWriter};
pub use lang::LanguageFilter;
pub use minhash::{LshDedup, MinHash};
pub use search::Search;
pub use text::{Bigrams, WordCount};

use serde::Deserialize;

/// Accepts either a single value or a list in configuration kwargs
/// (`"fields": "title"` and `"fields": ["title", "body"]` both work).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(v: OneOrMany<T>) -> Self {
        match v {
            OneOrMany::One(x) => vec![x],
            OneOrMany::Many(xs) => xs,
        }
    }
}
