//! In-process application connection.
//!
//! Drives an [`Application`] on a dedicated task fed by a bounded queue.
//! Requests are processed strictly first-in first-out, which is what gives
//! the mempool its recheck ordering guarantee: responses (and the global
//! response callback) are delivered in dispatch order.

use crate::ports::{AppConn, AppConnError, Application, ReqRes, ResponseCallback};
use async_trait::async_trait;
use meridian_types::CheckTxRequest;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Default capacity of the request queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

enum Command {
    CheckTx {
        req: CheckTxRequest,
        reqres: Arc<ReqRes>,
    },
    Flush {
        ack: Option<oneshot::Sender<()>>,
    },
}

#[derive(Default)]
struct Shared {
    response_cb: Mutex<Option<ResponseCallback>>,
    error: Mutex<Option<AppConnError>>,
}

/// Connection to an application living in the same process.
pub struct LocalAppConn {
    queue: mpsc::Sender<Command>,
    shared: Arc<Shared>,
}

impl LocalAppConn {
    /// Spawns the driver task and returns the connection.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(app: Arc<dyn Application>) -> Arc<Self> {
        Self::with_capacity(app, DEFAULT_QUEUE_CAPACITY)
    }

    /// Spawns the driver task with a custom queue capacity.
    pub fn with_capacity(app: Arc<dyn Application>, capacity: usize) -> Arc<Self> {
        let (queue, rx) = mpsc::channel(capacity);
        let shared = Arc::new(Shared::default());
        tokio::spawn(drive(app, rx, Arc::clone(&shared)));
        Arc::new(Self { queue, shared })
    }

    /// Marks the connection as failed; subsequent health probes and
    /// dispatches report the error.
    pub fn set_error(&self, err: AppConnError) {
        *self.shared.error.lock() = Some(err);
    }
}

/// Serially processes queued requests against the application.
async fn drive(app: Arc<dyn Application>, mut rx: mpsc::Receiver<Command>, shared: Arc<Shared>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::CheckTx { req, reqres } => {
                let res = app.check_tx(&req);
                if let Some(cb) = shared.response_cb.lock().as_ref() {
                    cb(&req, &res);
                }
                reqres.complete(res);
            }
            Command::Flush { ack } => {
                // FIFO processing means every earlier request is answered
                // by the time the ack fires.
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
        }
    }
    debug!("application connection driver stopped");
}

#[async_trait]
impl AppConn for LocalAppConn {
    fn check_tx_async(&self, req: CheckTxRequest) -> Result<Arc<ReqRes>, AppConnError> {
        self.error()?;
        let reqres = Arc::new(ReqRes::new());
        self.queue
            .try_send(Command::CheckTx {
                req,
                reqres: Arc::clone(&reqres),
            })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => AppConnError::BufferFull,
                mpsc::error::TrySendError::Closed(_) => AppConnError::Closed,
            })?;
        Ok(reqres)
    }

    fn flush_async(&self) -> Result<(), AppConnError> {
        self.queue
            .try_send(Command::Flush { ack: None })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => AppConnError::BufferFull,
                mpsc::error::TrySendError::Closed(_) => AppConnError::Closed,
            })
    }

    async fn flush_sync(&self) -> Result<(), AppConnError> {
        let (tx, rx) = oneshot::channel();
        self.queue
            .send(Command::Flush { ack: Some(tx) })
            .await
            .map_err(|_| AppConnError::Closed)?;
        rx.await.map_err(|_| AppConnError::Closed)
    }

    fn set_response_callback(&self, cb: ResponseCallback) {
        *self.shared.response_cb.lock() = Some(cb);
    }

    fn error(&self) -> Result<(), AppConnError> {
        match self.shared.error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::{CheckTxResponse, Tx};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Application that echoes the first payload byte as the priority.
    struct EchoApp;

    impl Application for EchoApp {
        fn check_tx(&self, req: &CheckTxRequest) -> CheckTxResponse {
            CheckTxResponse {
                code: 0,
                priority: i64::from(req.tx.as_bytes().first().copied().unwrap_or(0)),
                ..Default::default()
            }
        }
    }

    #[tokio::test]
    async fn test_dispatch_runs_request_callback() {
        let conn = LocalAppConn::new(Arc::new(EchoApp));
        let seen = Arc::new(AtomicU32::new(0));

        let reqres = conn
            .check_tx_async(CheckTxRequest::new(Tx::new(vec![42u8])))
            .unwrap();
        let seen_clone = Arc::clone(&seen);
        reqres.set_callback(Box::new(move |res| {
            seen_clone.store(res.priority as u32, Ordering::SeqCst);
        }));

        conn.flush_sync().await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 42);
        assert_eq!(reqres.response().unwrap().priority, 42);
    }

    #[tokio::test]
    async fn test_global_callback_fires_in_dispatch_order() {
        let conn = LocalAppConn::new(Arc::new(EchoApp));
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_clone = Arc::clone(&order);
        conn.set_response_callback(Box::new(move |req, _res| {
            order_clone.lock().push(req.tx.as_bytes()[0]);
        }));

        for byte in [3u8, 1, 2] {
            conn.check_tx_async(CheckTxRequest::new(Tx::new(vec![byte])))
                .unwrap();
        }
        conn.flush_sync().await.unwrap();

        assert_eq!(*order.lock(), vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_buffer_full_surfaces_as_error() {
        let conn = LocalAppConn::with_capacity(Arc::new(BlockedApp), 1);

        // The driver may pick up the first command; saturate the queue.
        let mut saw_full = false;
        for byte in 0..16u8 {
            match conn.check_tx_async(CheckTxRequest::new(Tx::new(vec![byte]))) {
                Err(AppConnError::BufferFull) => {
                    saw_full = true;
                    break;
                }
                Ok(_) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(saw_full);
    }

    /// Application slow enough that the queue saturates first.
    struct BlockedApp;

    impl Application for BlockedApp {
        fn check_tx(&self, _req: &CheckTxRequest) -> CheckTxResponse {
            std::thread::sleep(std::time::Duration::from_secs(1));
            CheckTxResponse::default()
        }
    }

    #[tokio::test]
    async fn test_error_state_blocks_dispatch() {
        let conn = LocalAppConn::new(Arc::new(EchoApp));
        conn.set_error(AppConnError::Failed("socket torn down".into()));

        assert!(conn.error().is_err());
        let err = conn
            .check_tx_async(CheckTxRequest::new(Tx::from("a")))
            .unwrap_err();
        assert!(matches!(err, AppConnError::Failed(_)));
    }
}
