/*! Functional pipeline core.

A pipeline is an ordered list of resources: one [Produce] source, zero or
more transforms ([MapRecord] or [DetectRecord]) each wired with a map or
filter [Connection], and one [Collect] collector. Composition is lazy and
pure; execution acquires every resource in order, streams records one at a
time through the chain, and releases everything in reverse order whatever
happens in between.
!*/
mod compose;
#[allow(clippy::module_inception)]
mod pipeline;
mod resource;
mod stage;
#[cfg(test)]
pub(crate) mod testing;

pub use compose::Chain;
pub use pipeline::{build_pipeline, run_scoped, Pipeline};
pub use resource::Resource;
pub use stage::{Collect, Connection, DetectRecord, MapRecord, Produce, Stage};
