use std::{
    fmt::{Debug, Display},
    io::{Error, ErrorKind, Result as IOResult},
    ops::Index,
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use vendor::prelude::shorthands::duration_ms;

use crate::descriptor::endpoint::Endpoint;

/// One failed attempt: which endpoint, why, and how long it took.
#[derive(Debug, Clone)]
pub struct CallException<E> {
    endpoint: Arc<Endpoint>,
    cause: E,
    duration: Duration,
}

impl<E> CallException<E> {
    pub(crate) fn new(endpoint: Arc<Endpoint>, cause: E, duration: Duration) -> Self {
        Self {
            endpoint,
            cause,
            duration,
        }
    }

    #[inline]
    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    #[inline]
    pub fn cause(&self) -> &E {
        &self.cause
    }

    #[inline]
    pub fn into_cause(self) -> E {
        self.cause
    }

    #[inline]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[inline]
    pub fn attempt_duration_ms(&self) -> u64 {
        duration_ms(self.duration)
    }
}

impl<E: Display> Display for CallException<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "call to {} failed after {} ms: {}",
            self.endpoint,
            self.attempt_duration_ms(),
            self.cause
        )
    }
}

/// Failed attempts of one dispatch in the order they happened.
/// Only the dispatcher appends, callers get it read-only.
#[derive(Debug, Clone)]
pub struct CallExceptionList<E> {
    exceptions: Vec<CallException<E>>,
}

impl<E> Default for CallExceptionList<E> {
    fn default() -> Self {
        Self { exceptions: vec![] }
    }
}

impl<E> CallExceptionList<E> {
    #[inline]
    pub(crate) fn push(&mut self, exception: CallException<E>) {
        self.exceptions.push(exception);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.exceptions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.exceptions.is_empty()
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Option<&CallException<E>> {
        self.exceptions.get(idx)
    }

    #[inline]
    pub fn first(&self) -> Option<&CallException<E>> {
        self.exceptions.first()
    }

    #[inline]
    pub fn last(&self) -> Option<&CallException<E>> {
        self.exceptions.last()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, CallException<E>> {
        self.exceptions.iter()
    }

    #[inline]
    pub fn into_vec(self) -> Vec<CallException<E>> {
        self.exceptions
    }
}

impl<E> Index<usize> for CallExceptionList<E> {
    type Output = CallException<E>;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.exceptions[idx]
    }
}

impl<'a, E> IntoIterator for &'a CallExceptionList<E> {
    type Item = &'a CallException<E>;
    type IntoIter = std::slice::Iter<'a, CallException<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.exceptions.iter()
    }
}

impl<E> IntoIterator for CallExceptionList<E> {
    type Item = CallException<E>;
    type IntoIter = std::vec::IntoIter<CallException<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.exceptions.into_iter()
    }
}

/// Renders the whole chain, one attempt per line.
impl<E: Display> Display for CallExceptionList<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.exceptions.is_empty() {
            return f.write_str("no failed attempts");
        }
        write!(f, "{} failed attempt(s):", self.exceptions.len())?;
        for (idx, exception) in self.exceptions.iter().enumerate() {
            write!(f, "\n  #{} {}", idx + 1, exception)?;
        }
        Ok(())
    }
}

impl<E: Debug + Display> std::error::Error for CallExceptionList<E> {}

/// The endpoint that answered and what it answered.
#[derive(Debug, Clone)]
pub struct Succeeded<R> {
    pub endpoint: Arc<Endpoint>,
    pub result: R,
}

/// Final result of one dispatch, owned entirely by the caller.
#[derive(Debug)]
pub struct CallOutcome<R, E> {
    succeeded: Option<Succeeded<R>>,
    duration: Duration,
    exceptions: CallExceptionList<E>,
}

impl<R, E> CallOutcome<R, E> {
    pub(crate) fn new(
        succeeded: Option<Succeeded<R>>,
        duration: Duration,
        exceptions: CallExceptionList<E>,
    ) -> Self {
        Self {
            succeeded,
            duration,
            exceptions,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.succeeded.is_some()
    }

    /// `None` when every attempted endpoint failed.
    #[inline]
    pub fn succeeded_endpoint(&self) -> Option<&Arc<Endpoint>> {
        self.succeeded.as_ref().map(|s| &s.endpoint)
    }

    #[inline]
    pub fn result(&self) -> Option<&R> {
        self.succeeded.as_ref().map(|s| &s.result)
    }

    #[inline]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[inline]
    pub fn duration_ms(&self) -> u64 {
        duration_ms(self.duration)
    }

    /// Failures before the success, or all failures if there's none.
    #[inline]
    pub fn exceptions(&self) -> &CallExceptionList<E> {
        &self.exceptions
    }

    /// Success with its payload, or the whole failure chain.
    pub fn into_result(self) -> Result<Succeeded<R>, CallExceptionList<E>> {
        match self.succeeded {
            Some(succeeded) => Ok(succeeded),
            None => Err(self.exceptions),
        }
    }

    pub fn into_parts(self) -> (Option<Succeeded<R>>, Duration, CallExceptionList<E>) {
        (self.succeeded, self.duration, self.exceptions)
    }
}

impl<R, E: Display> CallOutcome<R, E> {
    /// Collaborator facing summary, see [CallReport].
    pub fn report(&self) -> CallReport {
        CallReport {
            succeeded_endpoint: self.succeeded_endpoint().map(|e| e.as_ref().clone()),
            duration_ms: self.duration_ms(),
            exceptions: self
                .exceptions
                .iter()
                .map(|e| ExceptionReport {
                    endpoint: e.endpoint().as_ref().clone(),
                    cause: e.cause().to_string(),
                    attempt_duration_ms: e.attempt_duration_ms(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionReport {
    pub endpoint: Endpoint,
    pub cause: String,
    pub attempt_duration_ms: u64,
}

/// Serializable shape of a [CallOutcome] with causes rendered as text,
/// for handing results to other processes or logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallReport {
    pub succeeded_endpoint: Option<Endpoint>,
    pub duration_ms: u64,
    pub exceptions: Vec<ExceptionReport>,
}

impl CallReport {
    pub fn to_bytes(&self) -> IOResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::new(ErrorKind::InvalidData, e))
    }

    pub fn from_bytes(bytes: &[u8]) -> IOResult<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::new(ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::{CallException, CallExceptionList, CallOutcome, CallReport, Succeeded};
    use crate::descriptor::endpoint::Endpoint;

    fn endpoint(id: &str, addr: &str) -> Arc<Endpoint> {
        Arc::new(Endpoint::with_total(id, addr, 500).unwrap())
    }

    fn failed_twice() -> CallExceptionList<String> {
        let mut list = CallExceptionList::default();
        list.push(CallException::new(
            endpoint("server.t1", "http://10.0.0.1:80"),
            "connection refused".to_owned(),
            Duration::from_millis(12),
        ));
        list.push(CallException::new(
            endpoint("server.t2", "http://10.0.0.2:80"),
            "read timed out".to_owned(),
            Duration::from_millis(500),
        ));
        list
    }

    #[test]
    fn chain_renders_every_attempt() {
        let rendered = failed_twice().to_string();
        assert!(rendered.starts_with("2 failed attempt(s):"));
        assert!(rendered.contains("#1 call to server.t1(http://10.0.0.1:80) failed after 12 ms: connection refused"));
        assert!(rendered.contains("#2 call to server.t2(http://10.0.0.2:80) failed after 500 ms: read timed out"));
        assert_eq!(CallExceptionList::<String>::default().to_string(), "no failed attempts");
    }

    #[test]
    fn failed_outcome_yields_chain() {
        let outcome: CallOutcome<(), String> =
            CallOutcome::new(None, Duration::from_millis(512), failed_twice());
        assert!(!outcome.is_success());
        assert!(outcome.succeeded_endpoint().is_none());
        assert_eq!(outcome.duration_ms(), 512);
        let chain = outcome.into_result().unwrap_err();
        let causes: Vec<String> = chain.clone().into_iter().map(CallException::into_cause).collect();
        assert_eq!(causes, vec!["connection refused", "read timed out"]);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].endpoint().id(), "server.t2");
        assert_eq!(chain.last().unwrap().attempt_duration_ms(), 500);
    }

    #[test]
    fn report_survives_the_wire() {
        let winner = endpoint("server.t3", "http://10.0.0.3:80");
        let outcome = CallOutcome::new(
            Some(Succeeded {
                endpoint: winner,
                result: 42u32,
            }),
            Duration::from_millis(530),
            failed_twice(),
        );
        assert_eq!(outcome.result(), Some(&42));
        let report = outcome.report();
        assert_eq!(report.exceptions[0].cause, "connection refused");
        let decoded = CallReport::from_bytes(&report.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, report);
        assert_eq!(decoded.succeeded_endpoint.unwrap().id(), "server.t3");
        assert!(CallReport::from_bytes(&[1, 2, 3]).is_err());
    }

    #[test]
    fn outcome_splits_into_parts() {
        let outcome = CallOutcome::new(
            Some(Succeeded {
                endpoint: endpoint("server.t3", "http://10.0.0.3:80"),
                result: "pong",
            }),
            Duration::from_millis(40),
            failed_twice(),
        );
        let (succeeded, duration, exceptions) = outcome.into_parts();
        let succeeded = succeeded.unwrap();
        assert_eq!((succeeded.endpoint.id(), succeeded.result), ("server.t3", "pong"));
        assert_eq!(duration, Duration::from_millis(40));
        assert_eq!(exceptions.into_vec().len(), 2);
    }
}
