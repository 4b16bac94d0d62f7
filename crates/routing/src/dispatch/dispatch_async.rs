//! Failover dispatch for async attempts, enabled by feature `tokio1-rt`.
//!
//! Candidates are walked exactly like [dispatch](super::dispatch), one at
//! a time. Each attempt is additionally bounded by its endpoint's total
//! timeout, an attempt running past it is dropped and recorded as
//! [AttemptError::TimedOut].

use std::{
    fmt::Display,
    io::Result as IOResult,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::Future;
use tokio::{
    runtime::{Builder, Handle},
    task::block_in_place,
};
use vendor::prelude::shorthands::duration_ms;

use super::{flatten, outcome::CallOutcome, CallConfig, Candidate, Tracker};
use crate::descriptor::{endpoint::Endpoint, Descriptor};

/// Cause of a failed async attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError<E> {
    /// The attempt finished with an error.
    Failed(E),
    /// The endpoint's total timeout elapsed first.
    TimedOut { after: Duration },
}

impl<E> AttemptError<E> {
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, AttemptError::TimedOut { .. })
    }

    pub fn failure(&self) -> Option<&E> {
        match self {
            AttemptError::Failed(e) => Some(e),
            AttemptError::TimedOut { .. } => None,
        }
    }
}

impl<E: Display> Display for AttemptError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Failed(e) => write!(f, "{e}"),
            AttemptError::TimedOut { after } => write!(f, "timed out after {} ms", duration_ms(*after)),
        }
    }
}

impl<E: std::fmt::Debug + Display> std::error::Error for AttemptError<E> {}

/// Async counterpart of [dispatch](super::dispatch) with a [CallConfig].
/// Timeouts always fail over, other failures follow `fail_over_allowed`.
pub async fn dispatch_async<R, E, A, Fut>(
    root: &Descriptor,
    attempt: A,
    config: &CallConfig,
) -> CallOutcome<R, AttemptError<E>>
where
    A: FnMut(Arc<Endpoint>) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let candidates = flatten(root);
    call_candidates(&candidates, attempt, config).await
}

pub async fn call_candidates<R, E, A, Fut>(
    candidates: &[Candidate],
    mut attempt: A,
    config: &CallConfig,
) -> CallOutcome<R, AttemptError<E>>
where
    A: FnMut(Arc<Endpoint>) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let mut tracker = Tracker::start(config);
    for (idx, candidate) in candidates.iter().enumerate() {
        if tracker.expired(candidates.len() - idx) {
            break;
        }
        let endpoint = candidate.endpoint().clone();
        vendor::debug!(
            "async call attempt";
            "endpoint" => endpoint.id(),
            "candidate" => idx + 1,
            "of" => candidates.len()
        );
        let attempt_started = Instant::now();
        let bound = endpoint.total_timeout();
        let task = attempt(endpoint);
        let result = match bound {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(result) => result.map_err(AttemptError::Failed),
                Err(_) => Err(AttemptError::TimedOut { after: limit }),
            },
            None => task.await.map_err(AttemptError::Failed),
        };
        match result {
            Ok(result) => return tracker.succeeded(candidate, result),
            Err(cause) => {
                let fail_over = config.fail_over_allowed || cause.is_timeout();
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

/// Run an async dispatch from synchronous code. Uses `block_in_place`
/// on the current runtime if there's one (it must be multi-threaded),
/// otherwise a throwaway current-thread runtime.
/// #### panic
/// panic if called inside a current-thread runtime, e.g. plain
/// [**#\[tokio::test\]**](tokio::test).
pub fn blocking<F>(task: F) -> IOResult<F::Output>
where
    F: Future,
{
    if let Ok(h) = Handle::try_current() {
        return Ok(block_in_place(move || h.block_on(task)));
    }
    let runtime = Builder::new_current_thread().enable_time().build()?;
    Ok(runtime.block_on(task))
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc, time::Duration};

    use tokio::runtime::Runtime;

    use super::{blocking, dispatch_async, AttemptError};
    use crate::{
        builder::{BuilderConfig, DescriptorBuilder},
        descriptor::{endpoint::Endpoint, Descriptor},
        dispatch::CallConfig,
    };

    fn topology(entries: &[(&str, &str)]) -> Descriptor {
        let config: HashMap<&str, &str> = entries.iter().copied().collect();
        DescriptorBuilder::new(BuilderConfig::with_delimiter('|'))
            .build(&config, "server")
            .unwrap()
    }

    fn two_targets() -> Descriptor {
        topology(&[
            ("server", "group|ordered|t1|t2"),
            ("server.t1", "target|http://10.0.0.1:80|50"),
            ("server.t2", "target|http://10.0.0.2:80|500"),
        ])
    }

    #[test]
    fn slow_endpoint_times_out_and_fails_over() {
        let root = two_targets();
        Runtime::new().unwrap().block_on(async move {
            let outcome = dispatch_async(
                &root,
                |endpoint: Arc<Endpoint>| async move {
                    if endpoint.id() == "server.t1" {
                        tokio::time::sleep(Duration::from_millis(300)).await;
                    }
                    Ok::<_, String>(endpoint.address().to_owned())
                },
                &CallConfig::default(),
            )
            .await;
            assert_eq!(outcome.result().unwrap(), "http://10.0.0.2:80");
            assert_eq!(outcome.exceptions().len(), 1);
            let exception = &outcome.exceptions()[0];
            assert_eq!(exception.endpoint().id(), "server.t1");
            assert_eq!(
                *exception.cause(),
                AttemptError::TimedOut {
                    after: Duration::from_millis(50)
                }
            );
            assert!(exception.attempt_duration_ms() < 300);
            assert_eq!(exception.cause().to_string(), "timed out after 50 ms");
        });
    }

    #[test]
    fn failures_are_wrapped() {
        let root = two_targets();
        Runtime::new().unwrap().block_on(async move {
            let outcome = dispatch_async(
                &root,
                |endpoint: Arc<Endpoint>| async move { Err::<(), _>(format!("{} refused", endpoint.id())) },
                &CallConfig::default(),
            )
            .await;
            assert!(!outcome.is_success());
            let causes: Vec<Option<&String>> = outcome.exceptions().iter().map(|e| e.cause().failure()).collect();
            assert_eq!(causes.len(), 2);
            assert_eq!(causes[1].unwrap(), "server.t2 refused");
        });
    }

    #[test]
    fn no_fail_over_except_timeouts() {
        let root = two_targets();
        let config = CallConfig {
            fail_over_allowed: false,
            ..Default::default()
        };
        Runtime::new().unwrap().block_on(async move {
            let outcome = dispatch_async(
                &root,
                |_: Arc<Endpoint>| async move { Err::<(), _>("500 internal error") },
                &config,
            )
            .await;
            assert_eq!(outcome.exceptions().len(), 1);

            let outcome = dispatch_async(
                &root,
                |endpoint: Arc<Endpoint>| async move {
                    if endpoint.id() == "server.t1" {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                    Ok::<_, &str>(())
                },
                &config,
            )
            .await;
            assert_eq!(outcome.succeeded_endpoint().unwrap().id(), "server.t2");
        });
    }

    #[test]
    fn concurrent_async_dispatches() {
        let root = topology(&[
            ("server", "group|loadbalanced|t1|t2"),
            ("server.t1", "target|http://10.0.0.1:80|500"),
            ("server.t2", "target|http://10.0.0.2:80|500"),
        ]);
        Runtime::new().unwrap().block_on(async move {
            let config = CallConfig::default();
            let calls = (0..20).map(|_| {
                dispatch_async(&root, |_: Arc<Endpoint>| async { Ok::<_, ()>(()) }, &config)
            });
            let outcomes = futures::future::join_all(calls).await;
            assert!(outcomes.iter().all(|o| o.is_success()));
            let stats = root.as_group().unwrap().load().unwrap().snapshot();
            assert_eq!(stats.iter().map(|s| s.successes).sum::<u64>(), 20);
        });
    }

    #[test]
    fn blocking_without_runtime() {
        let root = two_targets();
        let outcome = blocking(dispatch_async(
            &root,
            |_: Arc<Endpoint>| async { Ok::<_, ()>(7) },
            &CallConfig::with_deadline(1000),
        ))
        .unwrap();
        assert_eq!(outcome.result(), Some(&7));
        assert_eq!(outcome.succeeded_endpoint().unwrap().id(), "server.t1");
    }

    #[test]
    fn blocking_inside_multi_thread_runtime() {
        let root = two_targets();
        Runtime::new().unwrap().block_on(async move {
            let outcome = blocking(dispatch_async(
                &root,
                |_: Arc<Endpoint>| async { Ok::<_, ()>(()) },
                &CallConfig::default(),
            ))
            .unwrap();
            assert!(outcome.is_success());
        });
    }
}
