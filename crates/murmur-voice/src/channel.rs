//! **Worker channel** — the message-passing boundary to an isolated worker.
//!
//! Model-backed stages (transcription, synthesis) run on a dedicated thread
//! so the controlling flow never blocks on CPU-bound work. Coordination is
//! asynchronous message passing with one outstanding request at a time.
//!
//! Lifecycle: `Uninitialized → Initializing → Ready`, then `Ready → Busy →
//! Ready` per request. A worker error moves the channel to `Failed`; it
//! rejects everything until the caller explicitly reinitializes it. There
//! is no automatic recovery and no request queuing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::error::{VoiceError, VoiceResult};

/// Default time to wait for one worker round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Channel lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No setup has run (or the last setup attempt failed and may be retried).
    Uninitialized,
    /// One-time setup in flight; callers arriving now await its outcome.
    Initializing,
    /// Accepting exactly one request.
    Ready,
    /// A request is in flight.
    Busy,
    /// The worker reported an error. Unusable until reinitialized.
    Failed,
}

impl Lifecycle {
    pub fn name(self) -> &'static str {
        match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Initializing => "initializing",
            Lifecycle::Ready => "ready",
            Lifecycle::Busy => "busy",
            Lifecycle::Failed => "failed",
        }
    }
}

/// One-time setup parameters carried by `ChannelMessage::Init`.
#[derive(Debug, Clone)]
pub struct InitParams {
    /// Opaque model reference (a path or URL in a real deployment).
    pub model_ref: String,
}

/// Tagged union exchanged across the worker boundary.
///
/// Inbound (controller → worker): `Init`, `Request`. Outbound (worker →
/// controller): `Ready`, `Result`, `Error`. Results are correlated to
/// requests by `id`, so delivery order does not matter.
#[derive(Debug)]
pub enum ChannelMessage<Req, Resp> {
    Init(InitParams),
    Ready,
    Request { id: u64, payload: Req },
    Result { id: u64, payload: Resp },
    Error { id: Option<u64>, message: String },
}

/// A stage worker running on its own thread.
///
/// `load` runs once per successful `initialize`; `run` handles one request
/// at a time. Both may block — that is the point of the boundary.
pub trait StageWorker: Send + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    /// One-time setup (model load in a real implementation).
    fn load(&mut self, params: &InitParams) -> Result<(), String>;

    /// Process one request.
    fn run(&mut self, request: Self::Request) -> Result<Self::Response, String>;
}

struct Shared<Resp> {
    state: Mutex<Lifecycle>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Resp, String>>>>,
    init_waiters: Mutex<Vec<oneshot::Sender<Result<(), String>>>>,
}

/// Async front-end to a worker thread.
///
/// Each request registers a oneshot sender keyed by request id; the
/// dispatcher resolves exactly one pending sender per result and cleans it
/// up on settlement, replacing the original's listener-per-request pattern.
pub struct WorkerChannel<Req, Resp> {
    stage: &'static str,
    inbound: mpsc::UnboundedSender<ChannelMessage<Req, Resp>>,
    shared: Arc<Shared<Resp>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl<Req, Resp> WorkerChannel<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Spawn the worker thread and its dispatcher task.
    ///
    /// Must be called from within a tokio runtime (the dispatcher is a
    /// spawned task).
    pub fn spawn<W>(stage: &'static str, worker: W) -> Self
    where
        W: StageWorker<Request = Req, Response = Resp>,
    {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        spawn_worker_thread(stage, worker, in_rx, out_tx);

        let shared = Arc::new(Shared {
            state: Mutex::new(Lifecycle::Uninitialized),
            pending: Mutex::new(HashMap::new()),
            init_waiters: Mutex::new(Vec::new()),
        });
        tokio::spawn(dispatch(stage, Arc::clone(&shared), out_rx));

        Self {
            stage,
            inbound: in_tx,
            shared,
            next_id: AtomicU64::new(1),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> Lifecycle {
        *self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: Lifecycle) {
        *self.shared.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    /// Idempotent one-time setup.
    ///
    /// The first caller transitions `Uninitialized → Initializing` and sends
    /// `Init`; every caller (including ones arriving while `Initializing`)
    /// awaits the same outcome. On failure the channel returns to
    /// `Uninitialized` and may be retried. Also permitted from `Failed` as
    /// the explicit recovery path.
    pub async fn initialize(&self, model_ref: &str) -> VoiceResult<()> {
        let (tx, rx) = oneshot::channel();
        // The waiter is registered under the state lock so the dispatcher
        // cannot settle the in-flight init between the check and the push.
        let send_init = {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            let send_init = match *state {
                Lifecycle::Ready | Lifecycle::Busy => return Ok(()),
                Lifecycle::Uninitialized | Lifecycle::Failed => {
                    *state = Lifecycle::Initializing;
                    true
                }
                Lifecycle::Initializing => false,
            };
            self.shared
                .init_waiters
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(tx);
            send_init
        };

        if send_init {
            debug!(stage = self.stage, model_ref, "initializing worker");
            let init = ChannelMessage::Init(InitParams {
                model_ref: model_ref.to_string(),
            });
            if self.inbound.send(init).is_err() {
                self.set_state(Lifecycle::Failed);
                self.fail_init_waiters("worker thread exited");
                return Err(VoiceError::ChannelFailed {
                    stage: self.stage,
                    reason: "worker thread exited".to_string(),
                });
            }
        }

        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(VoiceError::InitializationFailed {
                stage: self.stage,
                reason,
            }),
            Err(_) => Err(VoiceError::ChannelFailed {
                stage: self.stage,
                reason: "dispatcher stopped".to_string(),
            }),
        }
    }

    /// Send one request and await its correlated result.
    ///
    /// Requires `Ready`. On worker error or timeout the channel transitions
    /// to `Failed` and the turn must be failed by the caller — there is no
    /// fallback output at this boundary.
    pub async fn request(&self, payload: Req) -> VoiceResult<Resp> {
        {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            match *state {
                Lifecycle::Ready => *state = Lifecycle::Busy,
                Lifecycle::Failed => {
                    return Err(VoiceError::ChannelFailed {
                        stage: self.stage,
                        reason: "channel is in the failed state; reinitialize it first"
                            .to_string(),
                    })
                }
                other => {
                    return Err(VoiceError::InvalidState {
                        expected: "ready",
                        actual: other.name(),
                    })
                }
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tx);

        if self
            .inbound
            .send(ChannelMessage::Request { id, payload })
            .is_err()
        {
            self.remove_pending(id);
            self.set_state(Lifecycle::Failed);
            return Err(VoiceError::ChannelFailed {
                stage: self.stage,
                reason: "worker thread exited".to_string(),
            });
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(resp))) => Ok(resp),
            Ok(Ok(Err(reason))) => Err(VoiceError::ChannelFailed {
                stage: self.stage,
                reason,
            }),
            Ok(Err(_)) => {
                self.set_state(Lifecycle::Failed);
                Err(VoiceError::ChannelFailed {
                    stage: self.stage,
                    reason: "dispatcher stopped".to_string(),
                })
            }
            Err(_) => {
                // The in-flight request cannot be cancelled; the channel is
                // no longer safe to reuse until reinitialized.
                self.remove_pending(id);
                self.set_state(Lifecycle::Failed);
                warn!(stage = self.stage, id, "request timed out");
                Err(VoiceError::RequestTimeout {
                    stage: self.stage,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    fn remove_pending(&self, id: u64) {
        self.shared
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    fn fail_init_waiters(&self, reason: &str) {
        let waiters: Vec<_> = self
            .shared
            .init_waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for tx in waiters {
            let _ = tx.send(Err(reason.to_string()));
        }
    }
}

fn spawn_worker_thread<W>(
    stage: &'static str,
    mut worker: W,
    mut in_rx: mpsc::UnboundedReceiver<ChannelMessage<W::Request, W::Response>>,
    out_tx: mpsc::UnboundedSender<ChannelMessage<W::Request, W::Response>>,
) where
    W: StageWorker,
{
    thread::spawn(move || {
        let mut loaded = false;
        while let Some(msg) = in_rx.blocking_recv() {
            match msg {
                ChannelMessage::Init(params) => {
                    if loaded {
                        let _ = out_tx.send(ChannelMessage::Ready);
                        continue;
                    }
                    match worker.load(&params) {
                        Ok(()) => {
                            loaded = true;
                            let _ = out_tx.send(ChannelMessage::Ready);
                        }
                        Err(message) => {
                            let _ = out_tx.send(ChannelMessage::Error { id: None, message });
                        }
                    }
                }
                ChannelMessage::Request { id, payload } => {
                    if !loaded {
                        let _ = out_tx.send(ChannelMessage::Error {
                            id: Some(id),
                            message: format!("{stage} worker not initialized"),
                        });
                        continue;
                    }
                    match worker.run(payload) {
                        Ok(resp) => {
                            let _ = out_tx.send(ChannelMessage::Result { id, payload: resp });
                        }
                        Err(message) => {
                            let _ = out_tx.send(ChannelMessage::Error {
                                id: Some(id),
                                message,
                            });
                        }
                    }
                }
                // Outbound-only variants are never sent to the worker.
                ChannelMessage::Ready
                | ChannelMessage::Result { .. }
                | ChannelMessage::Error { .. } => {}
            }
        }
        debug!(stage, "worker thread exiting");
    });
}

async fn dispatch<Req, Resp>(
    stage: &'static str,
    shared: Arc<Shared<Resp>>,
    mut out_rx: mpsc::UnboundedReceiver<ChannelMessage<Req, Resp>>,
) {
    while let Some(msg) = out_rx.recv().await {
        match msg {
            ChannelMessage::Ready => {
                *shared.state.lock().unwrap_or_else(|e| e.into_inner()) = Lifecycle::Ready;
                let waiters: Vec<_> = shared
                    .init_waiters
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .drain(..)
                    .collect();
                debug!(stage, waiters = waiters.len(), "worker ready");
                for tx in waiters {
                    let _ = tx.send(Ok(()));
                }
            }
            ChannelMessage::Result { id, payload } => {
                let tx = shared
                    .pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&id);
                match tx {
                    Some(tx) => {
                        // Settle before flipping Busy → Ready so a caller
                        // never observes Ready with its result still unsent.
                        let _ = tx.send(Ok(payload));
                        let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
                        if *state == Lifecycle::Busy {
                            *state = Lifecycle::Ready;
                        }
                    }
                    None => {
                        // Late result after a timeout. The channel is already
                        // Failed; do not resurrect it.
                        warn!(stage, id, "discarding result for unknown request");
                    }
                }
            }
            ChannelMessage::Error { id, message } => match id {
                Some(id) => {
                    error!(stage, id, %message, "worker request failed");
                    *shared.state.lock().unwrap_or_else(|e| e.into_inner()) = Lifecycle::Failed;
                    if let Some(tx) = shared
                        .pending
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&id)
                    {
                        let _ = tx.send(Err(message));
                    }
                }
                None => {
                    error!(stage, %message, "worker initialization failed");
                    *shared.state.lock().unwrap_or_else(|e| e.into_inner()) =
                        Lifecycle::Uninitialized;
                    let waiters: Vec<_> = shared
                        .init_waiters
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .drain(..)
                        .collect();
                    for tx in waiters {
                        let _ = tx.send(Err(message.clone()));
                    }
                }
            },
            ChannelMessage::Init(_) | ChannelMessage::Request { .. } => {}
        }
    }
    debug!(stage, "dispatcher stopped");
}
