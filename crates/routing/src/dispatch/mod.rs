//! Failover dispatch over a [Descriptor] tree.
//!
//! A dispatch flattens the tree into candidates (every group orders its
//! children by its strategy, nested groups expand depth-first), then tries
//! the candidates one after another until one succeeds, all of them failed,
//! or the deadline has passed. Failures never abort the dispatch, they are
//! collected into the returned [CallOutcome].
//!
//! ## Example
//! ```rust
//! use std::collections::HashMap;
//! use routing::prelude::*;
//!
//! let config: HashMap<&str, &str> = [
//!     ("server", "group|loadbalanced|t1|t2"),
//!     ("server.t1", "target|10.0.0.1:80|500"),
//!     ("server.t2", "target|10.0.0.2:80|500"),
//! ].into_iter().collect();
//! let root = DescriptorBuilder::new(BuilderConfig::with_delimiter('|'))
//!     .build(&config, "server")
//!     .unwrap();
//!
//! let outcome = dispatch(&root, |endpoint: &Endpoint| {
//!     if endpoint.id() == "server.t1" {
//!         Err("connection refused")
//!     } else {
//!         Ok("pong")
//!     }
//! }, 0);
//! assert_eq!(outcome.succeeded_endpoint().unwrap().id(), "server.t2");
//! assert!(outcome.exceptions().len() <= 1);
//! ```

pub mod outcome;
#[cfg(feature = "tokio1-rt")]
pub mod dispatch_async;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use rand::Rng;
use vendor::prelude::shorthands::{duration_ms, elapsed_ms, millis_limit};

use self::outcome::{CallException, CallExceptionList, CallOutcome, Succeeded};
use crate::{
    descriptor::{endpoint::Endpoint, Descriptor},
    strategy::load::LoadTable,
};

/// Load table of a load-balanced ancestor and the id of its child
/// that leads to a candidate.
#[derive(Debug, Clone)]
struct Mark {
    table: Arc<LoadTable>,
    child: String,
}

/// A leaf endpoint picked for one dispatch, with the load tables the
/// result of an attempt against it must be recorded into.
#[derive(Debug, Clone)]
pub struct Candidate {
    endpoint: Arc<Endpoint>,
    trail: Vec<Mark>,
}

impl Candidate {
    #[inline]
    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    /// Record an attempt result into every load-balanced ancestor.
    pub fn record(&self, success: bool) {
        for mark in self.trail.iter() {
            mark.table.record(&mark.child, success);
        }
    }

    /// Number of load-balanced groups above this endpoint.
    #[inline]
    pub fn balanced_ancestors(&self) -> usize {
        self.trail.len()
    }
}

/// Candidate sequence of one dispatch, random groups shuffle with
/// the thread local rng.
pub fn flatten(root: &Descriptor) -> Vec<Candidate> {
    flatten_with(root, &mut rand::thread_rng())
}

pub fn flatten_with<R: Rng + ?Sized>(root: &Descriptor, rng: &mut R) -> Vec<Candidate> {
    expand(root, &[], rng)
}

fn expand<R: Rng + ?Sized>(descriptor: &Descriptor, trail: &[Mark], rng: &mut R) -> Vec<Candidate> {
    match descriptor {
        Descriptor::Endpoint(endpoint) => vec![Candidate {
            endpoint: endpoint.clone(),
            trail: trail.to_vec(),
        }],
        Descriptor::Group(group) => {
            let mut candidates = Vec::with_capacity(group.children().len());
            for child in group.ordered_children(rng) {
                let mut child_trail = trail.to_vec();
                if let Some(table) = group.load() {
                    child_trail.push(Mark {
                        table: table.clone(),
                        child: child.id().to_owned(),
                    });
                }
                candidates.extend(expand(child, &child_trail, rng));
            }
            candidates
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallConfig {
    /// Budget of the whole dispatch, checked before each attempt,
    /// `0` means no limit.
    pub deadline_ms: u64,
    /// Whether the next candidate may be tried after a failure that
    /// possibly reached the service. When false, only failures the
    /// caller classifies as unprocessed fail over.
    pub fail_over_allowed: bool,
}

impl CallConfig {
    pub fn with_deadline(deadline_ms: u64) -> Self {
        Self {
            deadline_ms,
            ..Default::default()
        }
    }

    #[inline]
    pub fn deadline(&self) -> Option<Duration> {
        millis_limit(self.deadline_ms)
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 0,
            fail_over_allowed: true,
        }
    }
}

/// Bookkeeping shared by the blocking and async dispatchers.
pub(crate) struct Tracker<E> {
    started: Instant,
    deadline: Option<Duration>,
    exceptions: CallExceptionList<E>,
}

impl<E> Tracker<E> {
    pub(crate) fn start(config: &CallConfig) -> Self {
        Self {
            started: Instant::now(),
            deadline: config.deadline(),
            exceptions: CallExceptionList::default(),
        }
    }

    /// True if the deadline has passed, remaining candidates are skipped.
    pub(crate) fn expired(&self, remaining: usize) -> bool {
        match self.deadline {
            Some(deadline) if self.started.elapsed() >= deadline => {
                vendor::info!(
                    "dispatch deadline reached";
                    "deadline_ms" => duration_ms(deadline),
                    "elapsed_ms" => elapsed_ms(self.started),
                    "attempted" => self.exceptions.len(),
                    "skipped" => remaining
                );
                true
            }
            _ => false,
        }
    }

    pub(crate) fn failed(&mut self, candidate: &Candidate, cause: E, attempt_started: Instant) {
        let took = attempt_started.elapsed();
        candidate.record(false);
        vendor::warn!(
            "call attempt failed";
            "endpoint" => candidate.endpoint().id(),
            "address" => candidate.endpoint().address(),
            "took_ms" => duration_ms(took)
        );
        self.exceptions
            .push(CallException::new(candidate.endpoint().clone(), cause, took));
    }

    pub(crate) fn succeeded<R>(self, candidate: &Candidate, result: R) -> CallOutcome<R, E> {
        candidate.record(true);
        let duration = self.started.elapsed();
        vendor::debug!(
            "call succeeded";
            "endpoint" => candidate.endpoint().id(),
            "failed_before" => self.exceptions.len(),
            "took_ms" => duration_ms(duration)
        );
        CallOutcome::new(
            Some(Succeeded {
                endpoint: candidate.endpoint().clone(),
                result,
            }),
            duration,
            self.exceptions,
        )
    }

    pub(crate) fn exhausted<R>(self) -> CallOutcome<R, E> {
        let duration = self.started.elapsed();
        vendor::warn!(
            "all call attempts failed";
            "failures" => self.exceptions.len(),
            "took_ms" => duration_ms(duration)
        );
        CallOutcome::new(None, duration, self.exceptions)
    }
}

/// Dispatch with no deadline when `deadline_ms` is `0`, failing over
/// after every kind of failure.
pub fn dispatch<R, E, A>(root: &Descriptor, attempt: A, deadline_ms: u64) -> CallOutcome<R, E>
where
    A: FnMut(&Endpoint) -> Result<R, E>,
{
    Dispatcher::new(CallConfig::with_deadline(deadline_ms)).call(root, attempt)
}

/// Runs dispatches with one [CallConfig].
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    config: CallConfig,
}

impl Dispatcher {
    pub fn new(config: CallConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    /// Dispatch treating every failure as safe to fail over.
    pub fn call<R, E, A>(&self, root: &Descriptor, attempt: A) -> CallOutcome<R, E>
    where
        A: FnMut(&Endpoint) -> Result<R, E>,
    {
        self.call_with(root, attempt, |_| true)
    }

    /// Dispatch where `unprocessed` tells if a failure guarantees the
    /// service never processed the request (e.g. connection refused).
    /// It's consulted only when fail-over is not allowed in general.
    pub fn call_with<R, E, A, U>(&self, root: &Descriptor, attempt: A, unprocessed: U) -> CallOutcome<R, E>
    where
        A: FnMut(&Endpoint) -> Result<R, E>,
        U: Fn(&E) -> bool,
    {
        let candidates = flatten(root);
        self.call_candidates(&candidates, attempt, unprocessed)
    }

    /// Walk an already flattened sequence, for callers that need
    /// control over the shuffle.
    pub fn call_candidates<R, E, A, U>(
        &self,
        candidates: &[Candidate],
        mut attempt: A,
        unprocessed: U,
    ) -> CallOutcome<R, E>
    where
        A: FnMut(&Endpoint) -> Result<R, E>,
        U: Fn(&E) -> bool,
    {
        let mut tracker = Tracker::start(&self.config);
        for (idx, candidate) in candidates.iter().enumerate() {
            if tracker.expired(candidates.len() - idx) {
                break;
            }
            vendor::debug!(
                "call attempt";
                "endpoint" => candidate.endpoint().id(),
                "candidate" => idx + 1,
                "of" => candidates.len()
            );
            let attempt_started = Instant::now();
            match attempt(candidate.endpoint()) {
                Ok(result) => return tracker.succeeded(candidate, result),
                Err(cause) => {
                    let fail_over = self.config.fail_over_allowed || unprocessed(&cause);
                    tracker.failed(candidate, cause, attempt_started);
                    if !fail_over {
                        vendor::info!(
                            "fail-over not allowed, stop dispatch";
                            "endpoint" => candidate.endpoint().id()
                        );
                        break;
                    }
                }
            }
        }
        tracker.exhausted()
    }
}
