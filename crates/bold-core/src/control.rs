//! Built-in control programs operating on the control resource.
//!
//! The control resource is the named graph `<base>/sim`. Agents start a run
//! by writing `sim:iterations` to it; the engine keeps
//! `sim:currentIteration` up to date and ends the run once the requested
//! number of iterations has been executed.

use std::sync::Arc;
use std::time::Duration;

use bold_store::{AskProgram, GraphStore, ProgramError, UpdateProgram, ask_fn, update_fn};
use bold_types::vocab::{SIM_CURRENT_ITERATION, SIM_ITERATIONS, SIM_TIMESLOT_DURATION};
use bold_types::{GraphName, Quad, Term};

/// Path of the control resource below the base IRI.
pub const CONTROL_PATH: &str = "/sim";

/// Registration name of the initialization update.
pub const INIT_PROGRAM: &str = "sim-init";

/// Registration name of the per-tick increment.
pub const TICK_PROGRAM: &str = "sim";

/// Name of the built-in termination predicate.
pub const DONE_PREDICATE: &str = "sim-done";

/// The control resource: a named graph whose subject is its own IRI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResource {
    iri: String,
}

impl ControlResource {
    /// The control resource under `base_uri`.
    pub fn new(base_uri: &str) -> Self {
        Self {
            iri: format!("{}{CONTROL_PATH}", base_uri.trim_end_matches('/')),
        }
    }

    /// Resource IRI.
    pub fn iri(&self) -> &str {
        &self.iri
    }

    /// The control graph.
    pub fn graph(&self) -> GraphName {
        GraphName::named(self.iri.clone())
    }

    fn subject(&self) -> Term {
        Term::iri(self.iri.clone())
    }

    /// Integer value of `predicate` on the control resource, if set.
    pub fn read(&self, store: &dyn GraphStore, predicate: &str) -> Result<Option<i64>, ProgramError> {
        let found = store.find(
            Some(&self.subject()),
            Some(&Term::iri(predicate)),
            Some(&self.graph()),
        )?;
        Ok(found.iter().find_map(|quad| quad.object.as_integer()))
    }

    /// Replace every value of `predicate` with `value`.
    pub fn write(
        &self,
        store: &dyn GraphStore,
        predicate: &str,
        value: i64,
    ) -> Result<(), ProgramError> {
        let subject = self.subject();
        let predicate = Term::iri(predicate);
        for old in store.find(Some(&subject), Some(&predicate), Some(&self.graph()))? {
            store.remove(&old)?;
        }
        store.insert(Quad::new(
            subject,
            predicate,
            Term::integer(value),
            self.graph(),
        ))?;
        Ok(())
    }

    /// `sim-init`: reset the iteration counter and publish the slot period.
    pub fn init_program(&self, timeslot: Duration) -> Arc<dyn UpdateProgram> {
        let control = self.clone();
        let period_ms = i64::try_from(timeslot.as_millis()).unwrap_or(i64::MAX);
        update_fn(move |store: &dyn GraphStore| {
            control.write(store, SIM_CURRENT_ITERATION, 0)?;
            control.write(store, SIM_TIMESLOT_DURATION, period_ms)
        })
    }

    /// `sim`: increment the iteration counter.
    pub fn tick_program(&self) -> Arc<dyn UpdateProgram> {
        let control = self.clone();
        update_fn(move |store: &dyn GraphStore| {
            let current = control.read(store, SIM_CURRENT_ITERATION)?.unwrap_or(0);
            control.write(store, SIM_CURRENT_ITERATION, current.saturating_add(1))
        })
    }

    /// `sim-done`: true when no iteration count was requested or when the
    /// counter has reached it.
    pub fn done_predicate(&self) -> Arc<dyn AskProgram> {
        let control = self.clone();
        ask_fn(move |store: &dyn GraphStore| {
            let Some(iterations) = control.read(store, SIM_ITERATIONS)? else {
                return Ok(true);
            };
            let current = control.read(store, SIM_CURRENT_ITERATION)?.unwrap_or(0);
            Ok(current >= iterations)
        })
    }
}
