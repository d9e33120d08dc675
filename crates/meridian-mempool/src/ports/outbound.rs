//! Outbound (driven) ports for the mempool subsystem.
//!
//! The mempool depends on two external collaborators: the application that
//! validates transactions, reached through [`AppConn`], and a clock,
//! abstracted as [`TimeSource`] so tests run on deterministic time.

use crate::domain::entities::Timestamp;
use async_trait::async_trait;
use meridian_types::{CheckTxRequest, CheckTxResponse};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

/// Errors from the application connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppConnError {
    /// The connection's request buffer is full; the dispatch was dropped.
    #[error("application connection buffer is full")]
    BufferFull,

    /// The connection (or the application behind it) has shut down.
    #[error("application connection is closed")]
    Closed,

    /// The connection is in a persistent error state.
    #[error("application connection failed: {0}")]
    Failed(String),
}

/// Callback invoked for every response delivered on the connection, in
/// strict dispatch order. The mempool uses it to drive recheck.
pub type ResponseCallback = Box<dyn Fn(&CheckTxRequest, &CheckTxResponse) + Send + Sync>;

/// Per-request completion callback.
pub type RequestCallback = Box<dyn FnOnce(&CheckTxResponse) + Send>;

/// Handle to an in-flight `CheckTx` request.
///
/// The response may arrive before or after [`set_callback`] is invoked;
/// either way the callback runs exactly once, with the response.
///
/// [`set_callback`]: ReqRes::set_callback
pub struct ReqRes {
    state: Mutex<ReqResState>,
}

enum ReqResState {
    Pending(Option<RequestCallback>),
    Done(CheckTxResponse),
}

impl ReqRes {
    /// Creates a handle awaiting its response.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ReqResState::Pending(None)),
        }
    }

    /// Registers the completion callback. Runs immediately if the response
    /// has already been delivered.
    pub fn set_callback(&self, cb: RequestCallback) {
        let done = {
            let mut state = self.state.lock();
            match &mut *state {
                ReqResState::Pending(slot) => {
                    *slot = Some(cb);
                    None
                }
                ReqResState::Done(res) => Some((cb, res.clone())),
            }
        };
        if let Some((cb, res)) = done {
            cb(&res);
        }
    }

    /// Delivers the response, running the callback if one is registered.
    pub fn complete(&self, res: CheckTxResponse) {
        let cb = {
            let mut state = self.state.lock();
            let cb = match &mut *state {
                ReqResState::Pending(slot) => slot.take(),
                // A response was already delivered; keep the first.
                ReqResState::Done(_) => return,
            };
            *state = ReqResState::Done(res.clone());
            cb
        };
        if let Some(cb) = cb {
            cb(&res);
        }
    }

    /// The delivered response, if any.
    pub fn response(&self) -> Option<CheckTxResponse> {
        match &*self.state.lock() {
            ReqResState::Done(res) => Some(res.clone()),
            ReqResState::Pending(_) => None,
        }
    }
}

impl Default for ReqRes {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReqRes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.state.lock() {
            ReqResState::Pending(_) => "pending",
            ReqResState::Done(_) => "done",
        };
        f.debug_struct("ReqRes").field("state", &state).finish()
    }
}

/// Connection to the application validator.
///
/// Implementations must deliver responses, and invoke the global response
/// callback, in the exact order requests were dispatched; the recheck
/// protocol treats a violation as fatal.
#[async_trait]
pub trait AppConn: Send + Sync {
    /// Dispatches a validation request without waiting for the verdict.
    ///
    /// Returns a handle whose callback fires when the application answers.
    /// Fails without dispatching if the connection is unhealthy or its
    /// buffer is full.
    fn check_tx_async(&self, req: CheckTxRequest) -> Result<Arc<ReqRes>, AppConnError>;

    /// Asks the connection to flush buffered requests, without waiting.
    fn flush_async(&self) -> Result<(), AppConnError>;

    /// Flushes and waits until every previously dispatched request has
    /// been answered.
    async fn flush_sync(&self) -> Result<(), AppConnError>;

    /// Registers the global response callback used for recheck responses.
    fn set_response_callback(&self, cb: ResponseCallback);

    /// Non-blocking health probe.
    fn error(&self) -> Result<(), AppConnError>;
}

/// The application-side validation hook an [`AppConn`] adapter drives.
pub trait Application: Send + Sync {
    /// Judges a transaction, assigning a code and a priority.
    fn check_tx(&self, req: &CheckTxRequest) -> CheckTxResponse;
}

/// Time source for consistent timestamp handling.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    /// Returns the current timestamp in milliseconds.
    fn now(&self) -> Timestamp;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}

/// Mock time source for testing.
#[cfg(test)]
pub struct MockTimeSource {
    time: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
impl MockTimeSource {
    pub fn new(initial: Timestamp) -> Self {
        Self {
            time: std::sync::atomic::AtomicU64::new(initial),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.time.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        self.time.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::Tx;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_reqres_callback_after_completion() {
        let reqres = ReqRes::new();
        reqres.complete(CheckTxResponse {
            code: 7,
            ..Default::default()
        });

        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = Arc::clone(&seen);
        reqres.set_callback(Box::new(move |res| {
            seen_clone.store(res.code, Ordering::SeqCst);
        }));

        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_reqres_callback_before_completion() {
        let reqres = ReqRes::new();
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = Arc::clone(&seen);
        reqres.set_callback(Box::new(move |res| {
            seen_clone.store(res.code, Ordering::SeqCst);
        }));
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        reqres.complete(CheckTxResponse {
            code: 3,
            ..Default::default()
        });
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(reqres.response().unwrap().code, 3);
    }

    #[test]
    fn test_reqres_keeps_first_response() {
        let reqres = ReqRes::new();
        reqres.complete(CheckTxResponse {
            code: 1,
            ..Default::default()
        });
        reqres.complete(CheckTxResponse {
            code: 2,
            ..Default::default()
        });
        assert_eq!(reqres.response().unwrap().code, 1);
    }

    #[test]
    fn test_system_time_source_is_recent() {
        let now = SystemTimeSource.now();
        // After Jan 1, 2020.
        assert!(now > 1_577_836_800_000);
    }

    #[test]
    fn test_mock_time_source_advances() {
        let time = MockTimeSource::new(1_000);
        assert_eq!(time.now(), 1_000);
        time.advance(500);
        assert_eq!(time.now(), 1_500);
    }

    #[test]
    fn test_request_roundtrip_types() {
        let req = CheckTxRequest::new(Tx::from("abc"));
        assert_eq!(req.tx.len(), 3);
    }
}
