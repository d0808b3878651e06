//! Connection manager for one physical endpoint.
//!
//! # State machine
//!
//! `connect()` moves `DISCONNECTED`/`ERROR` to `CONNECTING` and spawns the
//! attempt: credential acquisition, TCP connect, then `HANDSHAKING` and the
//! upgrade exchange. Success enters `CONNECTED`, which arms the keepalive
//! watchdog and schedules task replay after the settle delay. Any failure
//! enters `ERROR` and records the cause; nothing retries automatically.
//!
//! # Serialization
//!
//! Every transition runs under one re-entrant lock per client and notifies
//! observers before the lock is released, so observers see transitions one
//! at a time and in order. An observer may call back into the client.
//!
//! A generation counter is bumped by every `connect()` and `disconnect()`;
//! results of superseded attempts and sessions are ignored.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::{Mutex, ReentrantMutex};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wsbridge_auth::{AuthHeader, AuthProvider};
use wsbridge_core::{ConnectionStatus, EndpointDescriptor, LinkRef, ResolvedEndpoint};
use wsbridge_http::HttpClient;

use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::handshake::{self, WsStream};
use crate::registry::{InboundMessage, LinkRegistry, MessageConsumer, TaskEntry, fan_out};
use crate::session::{self, Outbound};
use crate::subscriptions::{ReplayReport, ReplayTrigger, SubscriptionExecutor, TaskReport};
use crate::tasks::{ConnectedTask, TaskContext};
use crate::watchdog::Watchdog;

struct Session {
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct State {
    status: ConnectionStatus,
    generation: u64,
    /// Cancels the in-flight connect attempt.
    attempt: Option<CancellationToken>,
    session: Option<Session>,
    /// CONNECTED and the full replay has not taken its task snapshot yet.
    replay_pending: bool,
    auth_header: Option<AuthHeader>,
    last_error: Option<ClientError>,
    last_replay: Option<Arc<ReplayReport>>,
}

struct Inner {
    endpoint: EndpointDescriptor,
    config: ClientConfig,
    auth: AuthProvider,
    executor: SubscriptionExecutor,
    transitions: ReentrantMutex<()>,
    // Lock order: state, then registry.
    state: Mutex<State>,
    registry: LinkRegistry,
    released: AtomicBool,
}

/// Handle to one endpoint's connection. Cheap to clone.
#[derive(Clone)]
pub struct WsClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for WsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsClient")
            .field("endpoint", &self.inner.endpoint.uri)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl WsClient {
    /// Client for `endpoint`. Token requests and HTTP subscriptions go
    /// through `http`.
    pub fn new(endpoint: EndpointDescriptor, config: ClientConfig, http: Arc<dyn HttpClient>) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint,
                config,
                auth: AuthProvider::new(Arc::clone(&http)),
                executor: SubscriptionExecutor::new(http),
                transitions: ReentrantMutex::new(()),
                state: Mutex::new(State::default()),
                registry: LinkRegistry::default(),
                released: AtomicBool::new(false),
            }),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Endpoint URI, used as the endpoint identity in logs.
    pub fn uri(&self) -> &str {
        &self.inner.endpoint.uri
    }

    /// The descriptor this client was created with.
    pub fn endpoint(&self) -> &EndpointDescriptor {
        &self.inner.endpoint
    }

    /// Client timings.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Executor sharing this client's HTTP collaborator.
    pub fn executor(&self) -> &SubscriptionExecutor {
        &self.inner.executor
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.lock().status
    }

    /// Cause of the most recent transition to `ERROR`.
    pub fn last_error(&self) -> Option<ClientError> {
        self.inner.state.lock().last_error.clone()
    }

    /// Credential header acquired by the latest connect attempt.
    pub fn auth_header(&self) -> Option<AuthHeader> {
        self.inner.state.lock().auth_header.clone()
    }

    /// Report of the most recently completed replay.
    pub fn last_replay(&self) -> Option<Arc<ReplayReport>> {
        self.inner.state.lock().last_replay.clone()
    }

    /// Whether [`Self::release`] has been called.
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Start a connection attempt and return immediately.
    ///
    /// No-op while `CONNECTING`, `HANDSHAKING` or `CONNECTED`. An invalid
    /// URI moves straight to `ERROR` without touching the network.
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        let _serial = self.inner.transitions.lock();

        if self.is_released() {
            warn!(endpoint = %self.uri(), "connect ignored, endpoint released");
            return;
        }
        let status = self.status();
        if status.is_active() {
            debug!(endpoint = %self.uri(), %status, "connect ignored, already active");
            return;
        }

        let resolved = match self.inner.endpoint.resolve() {
            Ok(resolved) => resolved,
            Err(e) => {
                let err = ClientError::from(e);
                error!(endpoint = %self.uri(), error = %err, error_kind = err.error_kind(), "invalid endpoint configuration");
                let _ = self.transition(|st| {
                    st.generation += 1;
                    st.last_error = Some(err);
                    Some(ConnectionStatus::Error)
                });
                return;
            }
        };

        let cancel = CancellationToken::new();
        let mut generation = 0;
        let _ = self.transition(|st| {
            st.generation += 1;
            generation = st.generation;
            st.last_error = None;
            st.auth_header = None;
            st.attempt = Some(cancel.clone());
            Some(ConnectionStatus::Connecting)
        });

        let client = self.clone();
        drop(tokio::spawn(async move {
            client.establish(generation, resolved, cancel).await;
        }));
    }

    /// Tear down the connection from any state.
    ///
    /// Cancels the in-flight attempt, the keepalive timers and any replay
    /// that has not started yet. No-op when already `DISCONNECTED`.
    pub fn disconnect(&self) {
        let _serial = self.inner.transitions.lock();

        let mut tokens = Vec::new();
        let started = self.transition(|st| {
            if matches!(
                st.status,
                ConnectionStatus::Disconnected | ConnectionStatus::Disconnecting
            ) {
                return None;
            }
            st.generation += 1;
            st.replay_pending = false;
            tokens.extend(st.attempt.take());
            tokens.extend(st.session.take().map(|s| s.cancel));
            Some(ConnectionStatus::Disconnecting)
        });
        if !started {
            return;
        }

        for token in tokens {
            token.cancel();
        }
        let _ = self.transition(|st| {
            (st.status == ConnectionStatus::Disconnecting).then_some(ConnectionStatus::Disconnected)
        });
    }

    /// Disconnect for good and drop every registered task and consumer.
    ///
    /// Results of tasks still in flight are discarded.
    pub fn release(&self) {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.registry.clear_links();
        self.disconnect();
        info!(endpoint = %self.uri(), "endpoint released");
    }

    // ── Traffic ─────────────────────────────────────────────────────

    /// Queue a text frame. Fails unless `CONNECTED`; nothing is buffered
    /// while disconnected.
    pub fn send_message(&self, body: impl Into<String>) -> Result<(), ClientError> {
        self.send(Outbound::Text(body.into()))
    }

    /// Queue a binary frame. Same precondition as [`Self::send_message`].
    pub fn send_binary(&self, data: impl Into<Bytes>) -> Result<(), ClientError> {
        self.send(Outbound::Binary(data.into()))
    }

    fn send(&self, frame: Outbound) -> Result<(), ClientError> {
        let st = self.inner.state.lock();
        match (&st.session, st.status) {
            (Some(session), ConnectionStatus::Connected) => session
                .outbound
                .send(frame)
                .map_err(|_| ClientError::NotConnected),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Deliver every inbound message to `consumer`.
    pub fn on_message(&self, link: LinkRef, consumer: MessageConsumer) {
        self.inner.registry.add_consumer(link, consumer);
    }

    /// Remove every consumer registered under `link`.
    pub fn remove_consumers(&self, link: &LinkRef) -> usize {
        self.inner.registry.remove_consumers(link)
    }

    /// Observe status transitions, synchronously and in order.
    pub fn on_status_change<F>(&self, observer: F)
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        self.inner.registry.add_observer(Arc::new(observer));
    }

    pub(crate) fn dispatch(&self, message: &InboundMessage) {
        let consumers = self.inner.registry.consumers();
        let _ = fan_out(&consumers, message, self.uri());
    }

    // ── Connected tasks ─────────────────────────────────────────────

    /// Register `task` under `link`, replacing any previous task for it.
    ///
    /// The task runs after every successful connect. Registered while
    /// already `CONNECTED` (and after the post-connect replay started), it
    /// also runs once on its own after the late-registration delay.
    pub fn register_connected_task<T>(&self, link: LinkRef, task: T)
    where
        T: ConnectedTask + 'static,
    {
        if self.is_released() {
            warn!(endpoint = %self.uri(), %link, "task registration ignored, endpoint released");
            return;
        }

        let late = {
            let st = self.inner.state.lock();
            let entry = self.inner.registry.insert_task(link, Arc::new(task));
            match (&st.session, st.status) {
                (Some(session), ConnectionStatus::Connected) if !st.replay_pending => {
                    Some((session.cancel.clone(), entry))
                }
                _ => None,
            }
        };

        if let Some((session, entry)) = late {
            debug!(endpoint = %self.uri(), link = %entry.link, "task registered while connected, scheduling run");
            self.schedule_late(session, entry);
        }
    }

    /// Unregister the task for `link`, cancelling a run that has not started.
    pub fn unregister_connected_task(&self, link: &LinkRef) -> bool {
        self.inner.registry.remove_task(link)
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Apply `update` under the transition lock and notify observers if the
    /// status changed. `update` returns the next status, or `None` to leave
    /// it alone.
    fn transition<F>(&self, update: F) -> bool
    where
        F: FnOnce(&mut State) -> Option<ConnectionStatus>,
    {
        let _serial = self.inner.transitions.lock();
        let changed = {
            let mut st = self.inner.state.lock();
            let before = st.status;
            match update(&mut st) {
                Some(next) if next != before => {
                    st.status = next;
                    Some(next)
                }
                _ => None,
            }
        };
        let Some(status) = changed else {
            return false;
        };

        info!(endpoint = %self.uri(), %status, "connection status changed");
        for observer in self.inner.registry.observers().iter() {
            if catch_unwind(AssertUnwindSafe(|| observer(status))).is_err() {
                error!(endpoint = %self.uri(), %status, "status observer panicked");
            }
        }
        true
    }

    async fn establish(self, generation: u64, resolved: ResolvedEndpoint, cancel: CancellationToken) {
        let outcome = tokio::select! {
            () = cancel.cancelled() => return,
            outcome = self.open(generation, &resolved) => outcome,
        };
        match outcome {
            Ok(ws) => self.enter_connected(generation, ws),
            Err(e) => self.fail(generation, e),
        }
    }

    async fn open(&self, generation: u64, resolved: &ResolvedEndpoint) -> Result<WsStream, ClientError> {
        let auth = self
            .inner
            .auth
            .authorization_header(&self.inner.endpoint)
            .await
            .map_err(|e| ClientError::Authentication(e.to_string()))?;

        let mut headers = self.inner.endpoint.headers.clone();
        if let Some(header) = &auth {
            header.apply(&mut headers);
        }
        {
            let mut st = self.inner.state.lock();
            if st.generation == generation {
                st.auth_header = auth;
            }
        }
        let request = handshake::build_request(resolved, &headers)?;

        let authority = resolved.authority();
        let timeout = self.inner.config.connect_timeout;
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(&authority)).await {
            Err(_) => {
                return Err(ClientError::transient(format!(
                    "connect to {authority} timed out after {timeout:?}"
                )));
            }
            Ok(Err(e)) => return Err(ClientError::transient(format!("connect to {authority} failed: {e}"))),
            Ok(Ok(stream)) => stream,
        };
        let _ = stream.set_nodelay(true);

        let handshaking = self.transition(|st| {
            (st.generation == generation && st.status == ConnectionStatus::Connecting)
                .then_some(ConnectionStatus::Handshaking)
        });
        if !handshaking {
            return Err(ClientError::transient("attempt superseded"));
        }

        handshake::upgrade(request, stream, timeout).await
    }

    fn enter_connected(&self, generation: u64, ws: WsStream) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let session_token = cancel.clone();

        let entered = self.transition(move |st| {
            if st.generation != generation || st.status != ConnectionStatus::Handshaking {
                return None;
            }
            st.attempt = None;
            st.session = Some(Session {
                outbound,
                cancel: session_token,
            });
            st.replay_pending = true;
            Some(ConnectionStatus::Connected)
        });
        if !entered {
            debug!(endpoint = %self.uri(), "dropping superseded connection");
            return;
        }

        let config = &self.inner.config;
        let watchdog = self
            .inner
            .endpoint
            .ping_enabled
            .then(|| Watchdog::new(config.idle_timeout, config.pong_timeout, Instant::now()));

        drop(tokio::spawn(session::run(
            self.clone(),
            generation,
            ws,
            outbound_rx,
            cancel.clone(),
            watchdog,
        )));
        self.schedule_replay(generation, cancel);
    }

    /// Move to `ERROR` unless the attempt or session has been superseded.
    pub(crate) fn fail(&self, generation: u64, err: ClientError) {
        let mut tokens = Vec::new();
        let recorded = err.clone();
        let failed = self.transition(|st| {
            if st.generation != generation
                || matches!(
                    st.status,
                    ConnectionStatus::Disconnected | ConnectionStatus::Disconnecting | ConnectionStatus::Error
                )
            {
                return None;
            }
            st.replay_pending = false;
            tokens.extend(st.attempt.take());
            tokens.extend(st.session.take().map(|s| s.cancel));
            st.last_error = Some(recorded);
            Some(ConnectionStatus::Error)
        });

        for token in tokens {
            token.cancel();
        }
        if failed {
            error!(
                endpoint = %self.uri(),
                error = %err,
                error_kind = err.error_kind(),
                retryable = err.is_retryable(),
                "connection failed"
            );
        } else {
            debug!(endpoint = %self.uri(), error = %err, "ignoring failure of superseded attempt");
        }
    }

    fn schedule_replay(&self, generation: u64, session: CancellationToken) {
        let client = self.clone();
        let delay = self.inner.config.settle_delay;
        drop(tokio::spawn(async move {
            tokio::select! {
                () = session.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            let entries = {
                let mut st = client.inner.state.lock();
                if st.generation != generation || st.status != ConnectionStatus::Connected {
                    return;
                }
                st.replay_pending = false;
                client.inner.registry.tasks()
            };
            client.run_tasks(ReplayTrigger::Connected, entries, &session).await;
        }));
    }

    fn schedule_late(&self, session: CancellationToken, entry: TaskEntry) {
        let client = self.clone();
        let delay = self.inner.config.late_registration_delay;
        drop(tokio::spawn(async move {
            tokio::select! {
                () = session.cancelled() => return,
                () = entry.registration.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            client
                .run_tasks(ReplayTrigger::LateRegistration, vec![entry], &session)
                .await;
        }));
    }

    async fn run_tasks(&self, trigger: ReplayTrigger, entries: Vec<TaskEntry>, session: &CancellationToken) {
        let mut tasks = Vec::with_capacity(entries.len());
        for entry in entries {
            let ctx = TaskContext::new(
                self.clone(),
                entry.link.clone(),
                session.clone(),
                entry.registration.clone(),
            );
            if ctx.is_cancelled() {
                continue;
            }
            let results = entry.task.run(ctx.clone()).await;
            if ctx.is_cancelled() || self.is_released() {
                debug!(endpoint = %self.uri(), link = %entry.link, "discarding results of cancelled task");
                continue;
            }
            tasks.push(TaskReport {
                link: entry.link,
                results,
            });
        }

        if self.is_released() {
            return;
        }
        let report = ReplayReport { trigger, tasks };
        info!(
            endpoint = %self.uri(),
            ?trigger,
            tasks = report.tasks.len(),
            failures = report.failures(),
            "replay finished"
        );
        self.inner.state.lock().last_replay = Some(Arc::new(report));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
