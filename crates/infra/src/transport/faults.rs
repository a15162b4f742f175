//! Scripted fault injection for the in-process peer
//!
//! A [`FaultPlan`] holds per-method queues of faults. Each call to a method
//! consumes at most one queued fault: the peer first waits out its latency,
//! then returns its status instead of running the handler. A mid-stream fault
//! lets the stream open and fails it once `after` messages have gone by.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use rpcshield_domain::Status;

/// One scripted misbehaviour.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fault {
    /// Delay before the call is answered or failed.
    pub latency: Duration,
    /// Failure to return, if any.
    pub status: Option<Status>,
    /// Fail a stream after this many messages instead of at establishment.
    /// Unary calls fail outright.
    pub after: Option<usize>,
}

impl Fault {
    /// Fail immediately with `status`.
    pub fn status(status: Status) -> Self {
        Self { latency: Duration::ZERO, status: Some(status), after: None }
    }

    /// Open the stream normally, then fail with `status` once `after`
    /// messages have passed: responses for a server stream, requests for a
    /// client or bidi stream.
    pub fn mid_stream(after: usize, status: Status) -> Self {
        Self { latency: Duration::ZERO, status: Some(status), after: Some(after) }
    }

    /// Answer normally after `latency`.
    pub fn latency(latency: Duration) -> Self {
        Self { latency, status: None, after: None }
    }
}

/// Shared, clonable fault script plus per-method call counters.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    queued: Arc<Mutex<HashMap<String, VecDeque<Fault>>>>,
    calls: Arc<DashMap<String, usize>>,
}

impl FaultPlan {
    /// Empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `fault` for the next call to `method` not already covered.
    pub fn push(&self, method: &str, fault: Fault) -> &Self {
        self.queued.lock().entry(method.to_string()).or_default().push_back(fault);
        self
    }

    /// Make the next `times` calls to `method` fail with `status`.
    pub fn fail_next(&self, method: &str, status: Status, times: usize) -> &Self {
        for _ in 0..times {
            self.push(method, Fault::status(status.clone()));
        }
        self
    }

    /// Fail the next stream on `method` with `status` after `after` messages.
    pub fn fail_mid_stream(&self, method: &str, after: usize, status: Status) -> &Self {
        self.push(method, Fault::mid_stream(after, status))
    }

    /// Delay the next `times` calls to `method` by `latency`.
    pub fn delay_next(&self, method: &str, latency: Duration, times: usize) -> &Self {
        for _ in 0..times {
            self.push(method, Fault::latency(latency));
        }
        self
    }

    /// Drop every queued fault. Call counters are kept.
    pub fn clear(&self) {
        self.queued.lock().clear();
    }

    /// Calls `method` has received so far, faulted or not.
    pub fn calls(&self, method: &str) -> usize {
        self.calls.get(method).map_or(0, |count| *count)
    }

    /// Record a call to `method` and take its fault, if any.
    pub(crate) fn on_call(&self, method: &str) -> Option<Fault> {
        *self.calls.entry(method.to_string()).or_insert(0) += 1;
        let mut queued = self.queued.lock();
        let fault = queued.get_mut(method).and_then(VecDeque::pop_front);
        if queued.get(method).is_some_and(VecDeque::is_empty) {
            queued.remove(method);
        }
        fault
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faults_are_consumed_in_order_per_method() {
        let plan = FaultPlan::new();
        plan.fail_next("a", Status::unavailable("down"), 1)
            .delay_next("a", Duration::from_secs(2), 1);

        assert_eq!(plan.on_call("a"), Some(Fault::status(Status::unavailable("down"))));
        assert_eq!(plan.on_call("b"), None);
        assert_eq!(plan.on_call("a"), Some(Fault::latency(Duration::from_secs(2))));
        assert_eq!(plan.on_call("a"), None);

        assert_eq!(plan.calls("a"), 3);
        assert_eq!(plan.calls("b"), 1);
        assert_eq!(plan.calls("c"), 0);
    }

    #[test]
    fn test_mid_stream_fault_keeps_its_position() {
        let plan = FaultPlan::new();
        plan.fail_mid_stream("s", 3, Status::internal("lost"));

        let fault = plan.on_call("s").unwrap();
        assert_eq!(fault.after, Some(3));
        assert_eq!(fault.status, Some(Status::internal("lost")));
        assert_eq!(plan.on_call("s"), None);
    }

    #[test]
    fn test_clones_share_the_script() {
        let plan = FaultPlan::new();
        let handle = plan.clone();
        handle.fail_next("a", Status::internal("boom"), 2);
        plan.clear();
        assert_eq!(plan.on_call("a"), None);
        assert_eq!(handle.calls("a"), 1);
    }
}
