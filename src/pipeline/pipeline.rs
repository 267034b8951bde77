/*! Pipeline assembly and execution.

A [Pipeline] owns a source, a transform [Chain] and a collector, and runs the
whole thing under one scoped-acquisition block: stages are acquired in list
order, released in strict reverse order on every exit path, and the composed
sequence is drained into the collector in between.
!*/
use log::error;

use super::compose::{self, Chain};
use super::resource::Resource;
use super::stage::{Collect, Connection, Produce, Stage};
use crate::error::Error;
use crate::record::Record;

/// Wire an ordered stage list into a runnable [Pipeline].
///
/// The first stage must be a source, the last a collector, and `connections`
/// must hold one mode per transform in between (`len(connections) ==
/// len(stages) - 2`). Anything else is a configuration error, reported
/// before any stage is acquired.
pub fn build_pipeline(
    mut stages: Vec<Stage>,
    connections: Vec<Option<Connection>>,
) -> Result<Pipeline, Error> {
    if stages.len() < 2 {
        return Err(Error::Config(
            "a pipeline needs at least a source and a collector".to_string(),
        ));
    }
    if connections.len() != stages.len() - 2 {
        return Err(Error::Config(format!(
            "the number of resources ({}) and connections ({}) is not compatible (r = c + 2)",
            stages.len(),
            connections.len()
        )));
    }
    let collector = match stages.pop() {
        Some(Stage::Collector(c)) => c,
        Some(other) => {
            return Err(Error::Config(format!(
                "last stage must be a collector, got {} '{}'",
                other.role(),
                other.name()
            )))
        }
        None => unreachable!(),
    };
    let source = match stages.remove(0) {
        Stage::Source(s) => s,
        other => {
            return Err(Error::Config(format!(
                "first stage must be a source, got {} '{}'",
                other.role(),
                other.name()
            )))
        }
    };
    let chain = Chain::build(stages, connections)?;
    Ok(Pipeline {
        source,
        chain,
        collector,
    })
}

pub struct Pipeline {
    source: Box<dyn Produce>,
    chain: Chain,
    collector: Box<dyn Collect>,
}

impl Pipeline {
    /// Acquire every stage in list order, drain the composed sequence into
    /// the collector, release every acquired stage in reverse order, and
    /// return the collector's aggregate.
    ///
    /// Acquisition failures abort the run (after rolling back the stages
    /// acquired so far) and are never suppressible; a collection failure can
    /// be suppressed by a stage's `release`, turning it into an empty
    /// aggregate.
    pub fn run(&mut self) -> Result<Vec<Record>, Error> {
        let total = self.chain.len() + 2;
        let mut acquired = 0;
        let mut outcome: Result<Vec<Record>, Error> = Ok(Vec::new());
        for i in 0..total {
            if let Err(e) = self.resource_at(i).acquire() {
                outcome = Err(e);
                break;
            }
            acquired += 1;
        }
        let acquisition_failed = acquired != total;
        if !acquisition_failed {
            outcome = compose::drive(self.source.as_mut(), &mut self.chain, self.collector.as_mut());
        }
        let mut suppress = false;
        for i in (0..acquired).rev() {
            match self.resource_at(i).release(outcome.as_ref().err()) {
                Ok(s) => suppress |= s,
                Err(e) => error!("error while releasing pipeline stage: {:?}", e),
            }
        }
        match outcome {
            Err(_) if suppress && !acquisition_failed => Ok(Vec::new()),
            other => other,
        }
    }

    /// 0 is the source, `1..=chain.len()` the transforms, the last index the
    /// collector.
    fn resource_at(&mut self, index: usize) -> &mut dyn Resource {
        let links = self.chain.len();
        if index == 0 {
            self.source.as_mut()
        } else if index <= links {
            self.chain.resource_at(index - 1)
        } else {
            self.collector.as_mut()
        }
    }
}

/// Run one `source -> chain -> collector` pass over an already-acquired
/// chain, scoping only the two ends.
///
/// This is the per-file half of a worker loop: the chain stays acquired
/// across files, while source and collector are acquired here and released
/// (collector first, then source) on every exit path.
pub fn run_scoped(
    chain: &mut Chain,
    mut source: Box<dyn Produce>,
    mut collector: Box<dyn Collect>,
) -> Result<Vec<Record>, Error> {
    source.acquire()?;
    if let Err(e) = collector.acquire() {
        release_end(source.as_mut(), Some(&e));
        return Err(e);
    }
    let outcome = compose::drive(source.as_mut(), chain, collector.as_mut());
    let mut suppress = release_end(collector.as_mut(), outcome.as_ref().err());
    suppress |= release_end(source.as_mut(), outcome.as_ref().err());
    match outcome {
        Err(_) if suppress => Ok(Vec::new()),
        other => other,
    }
}

fn release_end(resource: &mut dyn Resource, failure: Option<&Error>) -> bool {
    match resource.release(failure) {
        Ok(suppress) => suppress,
        Err(e) => {
            error!("error while releasing '{}': {:?}", resource.name(), e);
            false
        }
    }
}
