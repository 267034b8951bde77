//! Instrumented stages for pipeline tests.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde_json::json;

use super::resource::Resource;
use super::stage::{Collect, DetectRecord, MapRecord, Produce};
use crate::error::Error;
use crate::record::Record;

/// Shared acquire/release journal, for asserting lifecycle ordering.
#[derive(Clone, Default)]
pub(crate) struct EventLog(Rc<RefCell<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: String) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

/// Lifecycle bookkeeping shared by all tracing stages.
pub(crate) struct Trace {
    name: String,
    log: Option<EventLog>,
    fail_acquire: bool,
    suppress_on_release: bool,
}

impl Trace {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            log: None,
            fail_acquire: false,
            suppress_on_release: false,
        }
    }

    fn acquire(&mut self) -> Result<(), Error> {
        if let Some(log) = &self.log {
            log.push(format!("acquire:{}", self.name));
        }
        if self.fail_acquire {
            Err(Error::Custom(format!("{} refused to acquire", self.name)))
        } else {
            Ok(())
        }
    }

    fn release(&mut self) -> Result<bool, Error> {
        if let Some(log) = &self.log {
            log.push(format!("release:{}", self.name));
        }
        Ok(self.suppress_on_release)
    }
}

macro_rules! impl_resource {
    ($ty:ty) => {
        impl Resource for $ty {
            fn name(&self) -> &str {
                &self.trace.name
            }
            fn acquire(&mut self) -> Result<(), Error> {
                self.trace.acquire()
            }
            fn release(&mut self, _failure: Option<&Error>) -> Result<bool, Error> {
                self.trace.release()
            }
        }
    };
}

/// In-memory source.
pub(crate) struct TracingSource {
    trace: Trace,
    items: VecDeque<Record>,
    produced: usize,
}

impl TracingSource {
    pub fn of(items: Vec<Record>) -> Self {
        Self {
            trace: Trace::new("source"),
            items: items.into(),
            produced: 0,
        }
    }

    pub fn with_log(items: Vec<Record>, log: &EventLog) -> Self {
        let mut s = Self::of(items);
        s.trace.log = Some(log.clone());
        s
    }

    pub fn produced(&self) -> usize {
        self.produced
    }
}

impl_resource!(TracingSource);

impl Produce for TracingSource {
    fn next_record(&mut self) -> Option<Result<Record, Error>> {
        let next = self.items.pop_front()?;
        self.produced += 1;
        Some(Ok(next))
    }
}

/// Uppercases a string field. Empty field drops the record (falsy result),
/// missing field is a per-record error.
pub(crate) struct TracingMap {
    trace: Trace,
    field: String,
}

impl TracingMap {
    pub fn uppercase(field: &str) -> Self {
        Self {
            trace: Trace::new("uppercase"),
            field: field.to_string(),
        }
    }

    pub fn with_log(field: &str, log: &EventLog) -> Self {
        let mut m = Self::uppercase(field);
        m.trace.log = Some(log.clone());
        m
    }

    pub fn failing_acquire(mut self) -> Self {
        self.trace.fail_acquire = true;
        self
    }
}

impl_resource!(TracingMap);

impl MapRecord for TracingMap {
    fn map(&mut self, mut record: Record) -> Result<Option<Record>, Error> {
        let upper = match record.get(&self.field) {
            Some(serde_json::Value::String(s)) if s.is_empty() => return Ok(None),
            Some(serde_json::Value::String(s)) => s.to_uppercase(),
            _ => {
                return Err(Error::Custom(format!(
                    "no string field '{}' in record",
                    self.field
                )))
            }
        };
        record[self.field.as_str()] = json!(upper);
        Ok(Some(record))
    }
}

/// Keeps string records of at least `min` codepoints.
pub(crate) struct TracingFilter {
    trace: Trace,
    min: usize,
}

impl TracingFilter {
    pub fn min_length(min: usize) -> Self {
        Self {
            trace: Trace::new("min_length"),
            min,
        }
    }

    pub fn with_log(min: usize, log: &EventLog) -> Self {
        let mut f = Self::min_length(min);
        f.trace.log = Some(log.clone());
        f
    }

    pub fn failing_acquire(mut self) -> Self {
        self.trace.fail_acquire = true;
        self
    }
}

impl_resource!(TracingFilter);

impl DetectRecord for TracingFilter {
    fn detect(&mut self, record: &Record) -> Result<bool, Error> {
        Ok(record
            .as_str()
            .map(|s| s.chars().count() >= self.min)
            .unwrap_or(false))
    }
}

/// Collects records into a list; can fail after draining or ask for the
/// failure to be suppressed on release.
pub(crate) struct TracingCollector {
    trace: Trace,
    fail_collect: bool,
}

impl TracingCollector {
    pub fn list() -> Self {
        Self {
            trace: Trace::new("collector"),
            fail_collect: false,
        }
    }

    pub fn with_log(log: &EventLog) -> Self {
        let mut c = Self::list();
        c.trace.log = Some(log.clone());
        c
    }

    pub fn failing_collect(mut self) -> Self {
        self.fail_collect = true;
        self
    }

    pub fn suppressing(mut self) -> Self {
        self.trace.suppress_on_release = true;
        self
    }
}

impl_resource!(TracingCollector);

impl Collect for TracingCollector {
    fn collect(&mut self, records: &mut dyn Iterator<Item = Record>) -> Result<Vec<Record>, Error> {
        let collected: Vec<Record> = records.collect();
        if self.fail_collect {
            Err(Error::Custom("collector failed".to_string()))
        } else {
            Ok(collected)
        }
    }
}
