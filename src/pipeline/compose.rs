/*! Pipeline composition.

[Chain::build] resolves the connection mode of every transform and wires the
middle of a pipeline; [Flow] is the lazy composed sequence pulling records
from a source through that chain. Composition performs no work itself: a
source yielding an arbitrarily large number of records is never materialized
before the collector starts consuming.
!*/
use log::error;

use super::resource::Resource;
use super::stage::{Collect, Connection, DetectRecord, MapRecord, Produce, Stage};
use crate::error::Error;
use crate::record::{identity, truthy, Record};

/// Resolved wiring of one transform.
///
/// `Probe` is a map stage connected in filter mode: the stage's output only
/// decides survival, the record itself passes through unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wiring {
    Map,
    Probe,
    Filter,
}

pub(crate) enum Link {
    Map(Box<dyn MapRecord>),
    Filter(Box<dyn DetectRecord>),
}

impl Link {
    pub(crate) fn as_resource_mut(&mut self) -> &mut dyn Resource {
        match self {
            Link::Map(m) => m.as_mut(),
            Link::Filter(f) => f.as_mut(),
        }
    }
}

/// The wired middle section of a pipeline, acquired and released as a unit.
///
/// A worker builds its chain once, keeps it acquired for its whole lifetime,
/// and runs every queued file through it; this is what amortizes expensive
/// per-process state (loaded models, spawned servers) over all records the
/// worker processes.
pub struct Chain {
    links: Vec<(Wiring, Link)>,
    acquired: usize,
}

impl Chain {
    /// Wire a list of transform stages with their connection modes.
    ///
    /// `connections` must hold one entry per stage; `None` falls back to the
    /// mode the stage's role declares. A filter stage cannot be connected in
    /// map mode (it has no record to produce), and sources or collectors in
    /// the middle of a pipeline are configuration errors.
    pub fn build(stages: Vec<Stage>, connections: Vec<Option<Connection>>) -> Result<Self, Error> {
        if stages.len() != connections.len() {
            return Err(Error::Config(format!(
                "chain needs one connection per transform (got {} transforms, {} connections)",
                stages.len(),
                connections.len()
            )));
        }
        let mut links = Vec::with_capacity(stages.len());
        for (stage, connection) in stages.into_iter().zip(connections) {
            let connection = connection.or_else(|| stage.declared_connection());
            let wiring = match (stage.role(), connection) {
                ("map", Some(Connection::Map)) => Wiring::Map,
                ("map", Some(Connection::Filter)) => Wiring::Probe,
                ("filter", Some(Connection::Filter)) => Wiring::Filter,
                ("filter", Some(Connection::Map)) => {
                    return Err(Error::Config(format!(
                        "filter stage '{}' cannot be connected in map mode",
                        stage.name()
                    )))
                }
                _ => {
                    return Err(Error::Config(format!(
                        "stage '{}' is a {}, not a transform",
                        stage.name(),
                        stage.role()
                    )))
                }
            };
            let link = match stage {
                Stage::Map(m) => Link::Map(m),
                Stage::Filter(f) => Link::Filter(f),
                // role checked above
                _ => unreachable!(),
            };
            links.push((wiring, link));
        }
        Ok(Self { links, acquired: 0 })
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub(crate) fn links_mut(&mut self) -> &mut [(Wiring, Link)] {
        &mut self.links
    }

    pub(crate) fn resource_at(&mut self, index: usize) -> &mut dyn Resource {
        self.links[index].1.as_resource_mut()
    }

    /// Acquire every link in order. On failure, the links acquired so far
    /// are released in reverse order and the error is propagated.
    pub fn acquire(&mut self) -> Result<(), Error> {
        for i in 0..self.links.len() {
            if let Err(e) = self.links[i].1.as_resource_mut().acquire() {
                self.release(Some(&e));
                return Err(e);
            }
            self.acquired += 1;
        }
        Ok(())
    }

    /// Release every acquired link, in reverse acquisition order.
    /// Returns whether any of them asked for `failure` to be suppressed.
    pub fn release(&mut self, failure: Option<&Error>) -> bool {
        let mut suppress = false;
        for i in (0..self.acquired).rev() {
            match self.links[i].1.as_resource_mut().release(failure) {
                Ok(s) => suppress |= s,
                Err(e) => error!("error while releasing transform chain: {:?}", e),
            }
        }
        self.acquired = 0;
        suppress
    }
}

/// Drain `source -> chain` into `collector` and return its aggregate.
///
/// Any records the collector left unconsumed are drained afterwards so that
/// upstream releases always observe a fully-consumed source.
pub(crate) fn drive(
    source: &mut dyn Produce,
    chain: &mut Chain,
    collector: &mut dyn Collect,
) -> Result<Vec<Record>, Error> {
    let mut flow = Flow::new(source, chain.links_mut());
    let result = collector.collect(&mut flow);
    for _ in flow {}
    result
}

/// The lazy composed record sequence: source -> transforms.
///
/// Per-record transform failures are logged with the record's identity and
/// the record is dropped; unreadable source records are logged and skipped.
/// Neither aborts the pipeline.
pub struct Flow<'a> {
    source: &'a mut dyn Produce,
    links: &'a mut [(Wiring, Link)],
}

impl<'a> Flow<'a> {
    pub(crate) fn new(source: &'a mut dyn Produce, links: &'a mut [(Wiring, Link)]) -> Self {
        Self { source, links }
    }
}

impl Iterator for Flow<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        'pull: loop {
            let mut record = match self.source.next_record()? {
                Ok(r) => r,
                Err(e) => {
                    error!("skipping unreadable record: {:?}", e);
                    continue;
                }
            };
            let ident = identity(&record);
            for (wiring, link) in self.links.iter_mut() {
                match (*wiring, link) {
                    (Wiring::Map, Link::Map(map)) => match map.map(record) {
                        Ok(Some(next)) if truthy(&next) => record = next,
                        Ok(_) => continue 'pull,
                        Err(e) => {
                            error!("error in document {}: {:?}", ident, e);
                            continue 'pull;
                        }
                    },
                    (Wiring::Probe, Link::Map(map)) => match map.map(record.clone()) {
                        Ok(Some(out)) if truthy(&out) => (),
                        Ok(_) => continue 'pull,
                        Err(e) => {
                            error!("error in document {}: {:?}", ident, e);
                            continue 'pull;
                        }
                    },
                    (Wiring::Filter, Link::Filter(filter)) => match filter.detect(&record) {
                        Ok(true) => (),
                        Ok(false) => continue 'pull,
                        Err(e) => {
                            error!("error in document {}: {:?}", ident, e);
                            continue 'pull;
                        }
                    },
                    // wiring and link roles are matched up in Chain::build
                    (Wiring::Map | Wiring::Probe, Link::Filter(_))
                    | (Wiring::Filter, Link::Map(_)) => unreachable!(),
                }
            }
            return Some(record);
        }
    }
}
