//! Resource lifecycle trait.
use crate::error::Error;

/// Lifecycle contract for pipeline stages.
///
/// Construction must be cheap and I/O-free so that stages can be built at
/// configuration-parse time. The expensive part (opening files, loading a
/// language-identification model, reading a query file) happens in
/// [Resource::acquire], exactly once per worker, so that the cost is
/// amortized over every record that worker processes.
///
/// If `acquire` succeeded, [Resource::release] runs exactly once, on every
/// exit path. `release` receives the error that interrupted the run, if any,
/// and returns whether that error should be suppressed (almost never).
pub trait Resource {
    /// Stage name, used in logs and configuration errors.
    fn name(&self) -> &str;

    /// Initialize the underlying resource. Called exactly once before any
    /// record is seen.
    fn acquire(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Clean up. `failure` is the error that aborted the run, if any;
    /// returning `Ok(true)` suppresses it.
    fn release(&mut self, failure: Option<&Error>) -> Result<bool, Error> {
        let _ = failure;
        Ok(false)
    }
}
