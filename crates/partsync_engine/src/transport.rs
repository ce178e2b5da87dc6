//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use partsync_protocol::{PullRequest, PullResponse, PushRequest};
use std::time::Duration;

/// A sync transport handles network communication with the backend.
///
/// One call is one round trip. Implementations do not retry, batch or back
/// off; that is the engine's job.
pub trait SyncTransport: Send + Sync {
    /// Pulls changes from the backend.
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Pushes locally originated changes to the backend.
    fn push(&self, request: &PushRequest) -> SyncResult<()>;
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Always { retryable: bool },
    Next(usize),
}

#[derive(Debug, Default)]
struct MockState {
    pull_response: Option<PullResponse>,
    pull_failure: Option<Failure>,
    push_failure: Option<bool>,
    pull_delay: Option<Duration>,
    push_delay: Option<Duration>,
    pull_requests: Vec<PullRequest>,
    push_requests: Vec<PushRequest>,
}

/// A mock transport for testing.
///
/// Serves one scripted pull response, can be told to fail, and records
/// every request it sees.
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pull response.
    pub fn set_pull_response(&self, response: PullResponse) {
        self.state.lock().pull_response = Some(response);
    }

    /// Makes every pull fail until [`clear_failures`](Self::clear_failures).
    pub fn fail_pulls(&self, retryable: bool) {
        self.state.lock().pull_failure = Some(Failure::Always { retryable });
    }

    /// Makes the next `count` pulls fail with a retryable error.
    pub fn fail_next_pulls(&self, count: usize) {
        self.state.lock().pull_failure = Some(Failure::Next(count));
    }

    /// Makes every push fail until [`clear_failures`](Self::clear_failures).
    pub fn fail_pushes(&self, retryable: bool) {
        self.state.lock().push_failure = Some(retryable);
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.pull_failure = None;
        state.push_failure = None;
    }

    /// Delays every pull, to widen race windows in tests.
    pub fn set_pull_delay(&self, delay: Duration) {
        self.state.lock().pull_delay = Some(delay);
    }

    /// Delays every push after it is recorded.
    pub fn set_push_delay(&self, delay: Duration) {
        self.state.lock().push_delay = Some(delay);
    }

    /// Returns the pull requests received so far.
    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.state.lock().pull_requests.clone()
    }

    /// Returns the number of pull requests received so far.
    pub fn pull_count(&self) -> usize {
        self.state.lock().pull_requests.len()
    }

    /// Returns the push requests received so far.
    pub fn push_requests(&self) -> Vec<PushRequest> {
        self.state.lock().push_requests.clone()
    }
}

impl SyncTransport for MockTransport {
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        let delay = {
            let mut state = self.state.lock();
            state.pull_requests.push(request.clone());
            state.pull_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        match state.pull_failure {
            Some(Failure::Always { retryable }) => {
                return Err(SyncError::Transport {
                    message: "mock pull failure".into(),
                    retryable,
                });
            }
            Some(Failure::Next(n)) if n > 0 => {
                state.pull_failure = Some(Failure::Next(n - 1));
                return Err(SyncError::transport_retryable("mock pull failure"));
            }
            _ => {}
        }

        state
            .pull_response
            .clone()
            .ok_or_else(|| SyncError::NotConfigured("no mock pull response set".into()))
    }

    fn push(&self, request: &PushRequest) -> SyncResult<()> {
        let delay = {
            let mut state = self.state.lock();
            state.push_requests.push(request.clone());
            state.push_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        match self.state.lock().push_failure {
            Some(retryable) => Err(SyncError::Transport {
                message: "mock push failure".into(),
                retryable,
            }),
            None => Ok(()),
        }
    }
}
