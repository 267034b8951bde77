//! Declarative pipeline configuration.
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::Error;
use crate::pipeline::Connection;

/// One stage of a configured pipeline.
///
/// `class` is a registry tag (see [crate::config::Registry]); `kwargs` are
/// stage parameters, `args` holds the odd positional parameter (only the
/// reader/writer path); `connection` overrides the stage's declared
/// connection mode.
#[derive(Debug, Clone, Deserialize)]
pub struct StageDescriptor {
    pub class: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    #[serde(default)]
    pub connection: Option<Connection>,
}

/// A whole configured run: the per-file pipeline, plus an optional reducer
/// collecting the concatenated per-worker aggregates.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineDescriptor {
    pub pipeline: Vec<StageDescriptor>,
    #[serde(default)]
    pub reducer: Option<StageDescriptor>,
}

impl PipelineDescriptor {
    pub fn parse(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text)
            .map_err(|e| Error::Config(format!("malformed pipeline configuration: {}", e)))
    }

    /// Connection modes of the transforms (everything between the source
    /// and the collector).
    pub fn connections(&self) -> Vec<Option<Connection>> {
        if self.pipeline.len() < 2 {
            return Vec::new();
        }
        self.pipeline[1..self.pipeline.len() - 1]
            .iter()
            .map(|d| d.connection)
            .collect()
    }
}
