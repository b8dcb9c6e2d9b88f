use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use planeview_frame::{Envelope, Fault, Origin, Value};
use planeview_transport::Transport;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::control::{is_reserved, FAULT_UNREGISTERED_HANDLER};
use crate::error::{ChannelError, Result};
use crate::session::Session;

/// What a handler produces for a peer-initiated request.
pub type HandlerResult = std::result::Result<Value, Fault>;

/// Invoked once with the reply (or the reason there will be none).
pub type ReplyCallback = Box<dyn FnOnce(Result<Value>) -> BoxFuture<'static, ()> + Send>;

/// Answers peer-initiated requests for one correlation id.
pub type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Notified when a protocol error aborts the channel.
pub type AbortHandler = Arc<dyn Fn(&ChannelError, &AbortContext) + Send + Sync>;

/// Which end of the connection this channel plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The long-running process that owns the data.
    Driver,
    /// The remote display.
    Display,
}

impl Role {
    /// Origin tag stamped on conversations this role starts.
    pub fn origin(self) -> Origin {
        match self {
            Role::Driver => Origin::Driver,
            Role::Display => Origin::Peer,
        }
    }
}

/// State handed to the abort handler alongside the error.
#[derive(Debug, Clone)]
pub struct AbortContext {
    pub role: Role,
    /// Correlation id of the offending frame, when it could be decoded.
    pub frame_id: Option<String>,
    /// Inbound frames seen on this channel, including the offending one.
    pub frames_seen: u64,
}

/// Channel behavior knobs.
#[derive(Clone, Default)]
pub struct ChannelConfig {
    /// Fail a request that has had no reply after this long. `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Session token shared out of band. When set, the first inbound frame
    /// must carry it instead of establishing a new one.
    pub session: Option<String>,
    /// Called once when a protocol error aborts the channel.
    pub on_abort: Option<AbortHandler>,
}

impl ChannelConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_session(mut self, token: impl Into<String>) -> Self {
        self.session = Some(token.into());
        self
    }

    pub fn with_abort_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ChannelError, &AbortContext) + Send + Sync + 'static,
    {
        self.on_abort = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("ChannelConfig");
        dbg.field("request_timeout", &self.request_timeout);
        if let Some(token) = &self.session {
            dbg.field("session", &format_args!("<redacted:{} bytes>", token.len()));
        } else {
            dbg.field("session", &Option::<String>::None);
        }
        dbg.field("on_abort", &self.on_abort.is_some()).finish()
    }
}

/// Handle to the task a frame dispatched, if any.
#[derive(Debug)]
pub struct Dispatch {
    task: Option<JoinHandle<()>>,
}

impl Dispatch {
    fn none() -> Self {
        Self { task: None }
    }

    /// Whether a callback or handler task was spawned for the frame.
    pub fn is_spawned(&self) -> bool {
        self.task.is_some()
    }

    /// Wait for the spawned callback or handler (and its reply) to finish.
    pub async fn join(self) {
        if let Some(task) = self.task {
            if let Err(err) = task.await {
                warn!(error = %err, "dispatched task failed");
            }
        }
    }
}

struct PendingRequest {
    seq: u64,
    /// `None` once the request timed out; the slot stays occupied until the
    /// late reply arrives because the frame is still in flight.
    callback: Option<ReplyCallback>,
    /// Stops the request's timeout task once the reply is in.
    timer: Option<CancellationToken>,
}

struct QueuedSend {
    seq: u64,
    message: Value,
    callback: ReplyCallback,
    timer: Option<CancellationToken>,
}

struct DispatchState {
    transport: Arc<dyn Transport>,
    session: Session,
    pending: HashMap<String, PendingRequest>,
    queues: HashMap<String, VecDeque<QueuedSend>>,
    handlers: HashMap<String, Handler>,
    closed: Option<String>,
    next_seq: u64,
    frames_seen: u64,
}

impl DispatchState {
    fn check_open(&self) -> Result<()> {
        if self.session.is_aborted() {
            return Err(ChannelError::Aborted);
        }
        if let Some(reason) = &self.closed {
            return Err(ChannelError::Closed(reason.clone()));
        }
        Ok(())
    }

    fn is_busy(&self, id: &str) -> bool {
        self.pending.contains_key(id) || self.queues.get(id).is_some_and(|q| !q.is_empty())
    }

    fn transmit(&self, envelope: Envelope) -> Result<()> {
        let session = self.session.token().map(str::to_string);
        let bytes = envelope.with_session(session).to_bytes()?;
        self.transport.send(bytes)?;
        Ok(())
    }
}

struct ChannelInner {
    role: Role,
    request_timeout: Option<Duration>,
    on_abort: Option<AbortHandler>,
    cancel: CancellationToken,
    state: Mutex<DispatchState>,
}

/// Correlated request/reply engine over one duplex connection.
///
/// Cheap to clone; clones share the same dispatch state. All state
/// transitions (transmit-or-queue, pending set/take, queue promotion) run
/// under one lock, and user callbacks and handlers never run while it is
/// held. For each correlation id at most one request is in flight; further
/// sends queue and go out strictly in submission order as replies arrive.
///
/// Callback and handler futures are spawned, so [`CorrelatedChannel::send`]
/// and [`CorrelatedChannel::on_frame`] must be called within a Tokio runtime.
#[derive(Clone)]
pub struct CorrelatedChannel {
    inner: Arc<ChannelInner>,
}

impl CorrelatedChannel {
    /// Create a channel with default configuration.
    pub fn new(role: Role, transport: Arc<dyn Transport>) -> Self {
        Self::from_parts(role, transport, ChannelConfig::default(), Session::Unbootstrapped)
    }

    /// Create a channel with explicit configuration.
    ///
    /// Fails if the configured session token is empty or oversized.
    pub fn with_config(
        role: Role,
        transport: Arc<dyn Transport>,
        config: ChannelConfig,
    ) -> Result<Self> {
        let session = Session::new(config.session.clone())?;
        Ok(Self::from_parts(role, transport, config, session))
    }

    fn from_parts(
        role: Role,
        transport: Arc<dyn Transport>,
        config: ChannelConfig,
        session: Session,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                role,
                request_timeout: config.request_timeout,
                on_abort: config.on_abort,
                cancel: CancellationToken::new(),
                state: Mutex::new(DispatchState {
                    transport,
                    session,
                    pending: HashMap::new(),
                    queues: HashMap::new(),
                    handlers: HashMap::new(),
                    closed: None,
                    next_seq: 0,
                    frames_seen: 0,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    /// Register the responder for peer-initiated requests tagged `id`.
    ///
    /// Replaces any earlier registration for the same id.
    pub fn register<F, Fut>(&self, id: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let id = id.into();
        let handler: Handler = Arc::new(move |message| handler(message).boxed());
        if self.lock().handlers.insert(id.clone(), handler).is_some() {
            debug!(id = %id, "replaced handler");
        }
    }

    /// Remove the responder for `id`. Returns whether one was registered.
    pub fn unregister(&self, id: &str) -> bool {
        self.lock().handlers.remove(id).is_some()
    }

    /// Send a request and have `callback` invoked with its reply.
    ///
    /// Transmits immediately when nothing is in flight or queued for `id`;
    /// otherwise queues behind the earlier requests. The callback runs on the
    /// reader before the next queued request for `id` is transmitted; the
    /// future it returns is spawned.
    pub fn send<F, Fut>(&self, id: impl Into<String>, message: Value, callback: F) -> Result<()>
    where
        F: FnOnce(Result<Value>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: ReplyCallback = Box::new(move |result| callback(result).boxed());
        self.submit(id.into(), message, callback)
    }

    /// Send a request and wait for its reply.
    pub async fn request(&self, id: impl Into<String>, message: Value) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        self.send(id, message, move |result| {
            let _ = tx.send(result);
            async {}
        })?;
        rx.await
            .unwrap_or_else(|_| Err(ChannelError::Closed("reply callback dropped".to_string())))
    }

    fn submit(&self, id: String, message: Value, callback: ReplyCallback) -> Result<()> {
        let timer = self
            .inner
            .request_timeout
            .map(|timeout| (timeout, self.inner.cancel.child_token()));
        let seq = {
            let mut state = self.lock();
            state.check_open()?;
            let seq = state.next_seq;
            state.next_seq += 1;
            let token = timer.as_ref().map(|(_, token)| token.clone());

            if state.is_busy(&id) {
                let queue = state.queues.entry(id.clone()).or_default();
                queue.push_back(QueuedSend {
                    seq,
                    message,
                    callback,
                    timer: token,
                });
                debug!(id = %id, depth = queue.len(), "request queued behind in-flight frame");
            } else {
                state.transmit(Envelope::new(id.clone(), message, self.inner.role.origin()))?;
                state.pending.insert(
                    id.clone(),
                    PendingRequest {
                        seq,
                        callback: Some(callback),
                        timer: token,
                    },
                );
                debug!(id = %id, "request transmitted");
            }
            seq
        };

        if let Some((timeout, token)) = timer {
            self.arm_timeout(id, seq, timeout, token);
        }
        Ok(())
    }

    fn arm_timeout(&self, id: String, seq: u64, timeout: Duration, cancel: CancellationToken) {
        let weak = Arc::downgrade(&self.inner);
        spawn_detached(
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => {
                        if let Some(inner) = weak.upgrade() {
                            CorrelatedChannel { inner }.expire(&id, seq, timeout);
                        }
                    }
                }
            }
            .boxed(),
        );
    }

    fn expire(&self, id: &str, seq: u64, timeout: Duration) {
        let callback = {
            let mut state = self.lock();
            let mut expired = state
                .pending
                .get_mut(id)
                .filter(|pending| pending.seq == seq)
                .and_then(|pending| pending.callback.take());

            if expired.is_none() {
                let mut emptied = false;
                if let Some(queue) = state.queues.get_mut(id) {
                    if let Some(pos) = queue.iter().position(|entry| entry.seq == seq) {
                        expired = queue.remove(pos).map(|entry| entry.callback);
                    }
                    emptied = queue.is_empty();
                }
                if emptied {
                    state.queues.remove(id);
                }
            }
            expired
        };

        if let Some(callback) = callback {
            warn!(id, ?timeout, "request timed out");
            spawn_detached(callback(Err(ChannelError::Timeout(timeout))));
        }
    }

    /// Process one inbound frame payload.
    ///
    /// Frames must be fed one at a time in arrival order. A session or
    /// decoding failure aborts the channel: the abort handler runs once,
    /// outstanding requests are cancelled, and every later call returns
    /// [`ChannelError::Aborted`].
    pub fn on_frame(&self, payload: &[u8]) -> Result<Dispatch> {
        {
            let mut state = self.lock();
            state.check_open()?;
            state.frames_seen += 1;
        }

        let envelope = match Envelope::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(err) => return Err(self.abort(err.into(), None)),
        };

        let admitted = self
            .lock()
            .session
            .admit(&envelope.id, envelope.session.as_deref());
        if let Err(err) = admitted {
            return Err(self.abort(err.into(), Some(envelope.id)));
        }

        if envelope.direction == self.inner.role.origin() {
            Ok(self.deliver_reply(envelope))
        } else {
            self.dispatch_request(envelope)
        }
    }

    fn deliver_reply(&self, envelope: Envelope) -> Dispatch {
        let Envelope {
            id, message, error, ..
        } = envelope;

        let pending = self.lock().pending.remove(&id);
        let Some(pending) = pending else {
            warn!(id = %id, "dropping reply with no pending request");
            return Dispatch::none();
        };

        if let Some(timer) = &pending.timer {
            timer.cancel();
        }
        let result = match error {
            Some(fault) => Err(ChannelError::Remote(fault)),
            None => Ok(message),
        };
        let task = match pending.callback {
            Some(callback) => spawn_detached(callback(result)),
            None => {
                debug!(id = %id, "discarding late reply to timed-out request");
                None
            }
        };

        self.promote(&id);
        Dispatch { task }
    }

    fn promote(&self, id: &str) {
        loop {
            let mut state = self.lock();
            if state.closed.is_some() || state.pending.contains_key(id) {
                return;
            }
            let Some(queue) = state.queues.get_mut(id) else {
                return;
            };
            let next = queue.pop_front();
            if queue.is_empty() {
                state.queues.remove(id);
            }
            let Some(QueuedSend {
                seq,
                message,
                callback,
                timer,
            }) = next
            else {
                return;
            };

            match state.transmit(Envelope::new(id, message, self.inner.role.origin())) {
                Ok(()) => {
                    state.pending.insert(
                        id.to_string(),
                        PendingRequest {
                            seq,
                            callback: Some(callback),
                            timer,
                        },
                    );
                    debug!(id, "promoted queued request");
                    return;
                }
                Err(err) => {
                    drop(state);
                    if let Some(timer) = timer {
                        timer.cancel();
                    }
                    warn!(id, error = %err, "failed to transmit queued request");
                    spawn_detached(callback(Err(err)));
                }
            }
        }
    }

    fn dispatch_request(&self, envelope: Envelope) -> Result<Dispatch> {
        let Envelope {
            id,
            message,
            direction,
            ..
        } = envelope;
        let handler = self.lock().handlers.get(&id).cloned();

        if is_reserved(&id) {
            debug!(id = %id, "bootstrap frame received");
            let task = handler.and_then(|handler| {
                spawn_detached(handler(message).map(|_| ()).boxed())
            });
            return Ok(Dispatch { task });
        }

        let Some(handler) = handler else {
            warn!(id = %id, "no handler registered; sending error reply");
            let fault = Fault::new(
                FAULT_UNREGISTERED_HANDLER,
                format!("no handler registered for '{id}'"),
            );
            self.reply(&id, direction, Err(fault))?;
            return Ok(Dispatch::none());
        };

        let response = handler(message);
        let channel = self.clone();
        let task = spawn_detached(
            async move {
                let result = response.await;
                if let Err(fault) = &result {
                    warn!(id = %id, %fault, "handler failed");
                }
                if let Err(err) = channel.reply(&id, direction, result) {
                    warn!(id = %id, error = %err, "failed to send reply");
                }
            }
            .boxed(),
        );
        Ok(Dispatch { task })
    }

    fn reply(&self, id: &str, direction: Origin, result: HandlerResult) -> Result<()> {
        let state = self.lock();
        if let Some(reason) = &state.closed {
            debug!(id, reason = %reason, "channel closed; dropping reply");
            return Ok(());
        }
        let envelope = match result {
            Ok(message) => Envelope::new(id, message, direction),
            Err(fault) => Envelope::new(id, Value::Null, direction).with_error(fault),
        };
        state.transmit(envelope)
    }

    fn abort(&self, err: ChannelError, frame_id: Option<String>) -> ChannelError {
        let context = {
            let mut state = self.lock();
            state.session.abort();
            AbortContext {
                role: self.inner.role,
                frame_id,
                frames_seen: state.frames_seen,
            }
        };
        error!(error = %err, frame_id = ?context.frame_id, "protocol error; aborting channel");
        if let Some(handler) = &self.inner.on_abort {
            handler(&err, &context);
        }
        self.close("aborted by protocol error");
        err
    }

    /// Close the channel.
    ///
    /// Every pending and queued request is completed with
    /// [`ChannelError::Closed`], the transport is closed, and the
    /// cancellation token fires. Idempotent.
    pub fn close(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let abandoned: Vec<ReplyCallback> = {
            let mut state = self.lock();
            if state.closed.is_some() {
                return;
            }
            state.closed = Some(reason.clone());
            let mut callbacks: Vec<ReplyCallback> = state
                .pending
                .drain()
                .filter_map(|(_, pending)| pending.callback)
                .collect();
            callbacks.extend(
                state
                    .queues
                    .drain()
                    .flat_map(|(_, queue)| queue.into_iter().map(|entry| entry.callback)),
            );
            state.transport.close();
            callbacks
        };

        self.inner.cancel.cancel();
        info!(reason = %reason, abandoned = abandoned.len(), "channel closed");

        for callback in abandoned {
            spawn_detached(callback(Err(ChannelError::Closed(reason.clone()))));
        }
    }

    /// Established session token, if any.
    pub fn session(&self) -> Option<String> {
        self.lock().session.token().map(str::to_string)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }

    /// Number of ids with a request in flight.
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn has_pending(&self, id: &str) -> bool {
        self.lock().pending.contains_key(id)
    }

    /// Requests waiting behind the in-flight one for `id`.
    pub fn queued_len(&self, id: &str) -> usize {
        self.lock().queues.get(id).map_or(0, VecDeque::len)
    }

    /// Fires when the channel closes.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }
}

impl fmt::Debug for CorrelatedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("CorrelatedChannel")
            .field("role", &self.inner.role)
            .field("session", &state.session)
            .field("pending", &state.pending.len())
            .field("handlers", &state.handlers.len())
            .field("closed", &state.closed)
            .finish()
    }
}

fn spawn_detached(future: BoxFuture<'static, ()>) -> Option<JoinHandle<()>> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle.spawn(future)),
        Err(_) => {
            debug!("no runtime available; dropping callback continuation");
            None
        }
    }
}
