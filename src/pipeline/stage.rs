/*! Stage roles.

Every pipeline stage has one of four roles: it produces records, maps them,
filters them, or collects them. Roles are explicit trait implementations
rather than duck typing, and [Stage] is the tagged set of them, which is what
stage registries hand back and what pipeline composition consumes.
!*/
use serde::{Deserialize, Serialize};

use super::resource::Resource;
use crate::error::Error;
use crate::record::Record;

/// How a transform is connected to the pipe upstream of it.
///
/// A map connection replaces each record with the stage's output and drops
/// falsy results; a filter connection passes records through unmodified,
/// keeping only those the stage accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connection {
    Map,
    Filter,
}

/// A source: produces the record sequence a pipeline starts from.
///
/// The sequence is lazy, finite and one-pass; re-iterating an exhausted
/// source is undefined (file-backed sources will just yield nothing).
pub trait Produce: Resource {
    /// Next record, or `None` at end of stream. An `Err` item is a single
    /// unreadable record (e.g. a malformed line), not end of stream.
    fn next_record(&mut self) -> Option<Result<Record, Error>>;
}

/// A mapping transform.
pub trait MapRecord: Resource {
    /// Map one record. `Ok(None)` (or a falsy result) drops the record.
    /// An `Err` is a recoverable per-record failure: the driver logs it and
    /// drops the record instead of aborting the pipeline.
    fn map(&mut self, record: Record) -> Result<Option<Record>, Error>;
}

/// A filtering transform.
pub trait DetectRecord: Resource {
    /// Decide whether the record passes. The record itself is never
    /// modified by a filter connection.
    fn detect(&mut self, record: &Record) -> Result<bool, Error>;
}

/// A collector: the terminal stage, reducing the sequence to an aggregate.
///
/// Implementations must fully drain `records` (the driver drains any
/// remainder as a backstop) so that upstream releases observe a consumed
/// source. Aggregates are lists of JSON values so that per-worker results
/// can be concatenated and reduced again.
pub trait Collect: Resource {
    fn collect(&mut self, records: &mut dyn Iterator<Item = Record>) -> Result<Vec<Record>, Error>;
}

/// A constructed stage, tagged with its role.
pub enum Stage {
    Source(Box<dyn Produce>),
    Map(Box<dyn MapRecord>),
    Filter(Box<dyn DetectRecord>),
    Collector(Box<dyn Collect>),
}

impl Stage {
    /// Role name, for configuration error messages.
    pub fn role(&self) -> &'static str {
        match self {
            Stage::Source(_) => "source",
            Stage::Map(_) => "map",
            Stage::Filter(_) => "filter",
            Stage::Collector(_) => "collector",
        }
    }

    pub fn name(&self) -> &str {
        self.as_resource().name()
    }

    /// Connection mode implied by the stage's role, for transforms whose
    /// descriptor leaves the connection unset.
    pub fn declared_connection(&self) -> Option<Connection> {
        match self {
            Stage::Map(_) => Some(Connection::Map),
            Stage::Filter(_) => Some(Connection::Filter),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> &dyn Resource {
        match self {
            Stage::Source(s) => s.as_ref(),
            Stage::Map(s) => s.as_ref(),
            Stage::Filter(s) => s.as_ref(),
            Stage::Collector(s) => s.as_ref(),
        }
    }

    pub fn as_resource_mut(&mut self) -> &mut dyn Resource {
        match self {
            Stage::Source(s) => s.as_mut(),
            Stage::Map(s) => s.as_mut(),
            Stage::Filter(s) => s.as_mut(),
            Stage::Collector(s) => s.as_mut(),
        }
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.role(), self.name())
    }
}
