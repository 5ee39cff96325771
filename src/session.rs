//! Session task: the single owner of all connection state.
//!
//! DESIGN
//! ======
//! One tokio task owns the socket link, the outbound queue, pending acks, the
//! participant registry, the cursor throttle and every timer. `CollabClient`
//! handles talk to it over an unbounded command channel and get answers on
//! oneshot replies, so no state is ever shared behind a lock.
//!
//! Timers are plain deadlines polled by one `biased` select. Cancelling a
//! timer means clearing its deadline; a stale timer can never fire into a
//! newer connection.
//!
//! LIFECYCLE
//! =========
//! ```text
//! disconnected/error --connect()--> connecting --auth ack--> connected
//! connecting --timeout/refused/rejected--> error          (explicit connect)
//! connecting --timeout/refused/rejected--> reconnecting   (retry attempt)
//! connected --close != 1000, auto-reconnect--> reconnecting --timer--> connecting
//! reconnecting --attempts exhausted--> error
//! any --disconnect()--> disconnected
//! ```
//!
//! ERROR HANDLING
//! ==============
//! Failures of an explicit `connect()` reject its future and emit an `error`
//! event. Failures during automatic recovery only emit events; the caller is
//! told once recovery gives up.

use std::future::pending;
use std::sync::Arc;

use frames::{Body, Frame, Point, encode_frame, now_ms};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ack::{AUTH_ACK_KEY, AckCoordinator, AckError, AckResult};
use crate::backoff::Backoff;
use crate::config::SessionConfig;
use crate::error::{ErrorCode, SessionError};
use crate::events::CollabEvent;
use crate::queue::{DEFAULT_QUEUE_CAPACITY, OutboundQueue};
use crate::registry::{ParticipantRegistry, RemoteParticipant};
use crate::router::Router;
use crate::throttle::{CursorThrottle, ThrottleDecision};
use crate::transport::{CLOSE_ABNORMAL, CLOSE_NORMAL, Connector, Incoming, SocketLink, TransportError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

/// What happened to an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// Written to the open socket.
    Sent,
    /// Held in the outbound queue until the next connection.
    Queued,
    /// Held by the cursor throttle; the latest position goes out when it opens.
    Deferred,
    /// Not sent: no connected canvas, nothing to leave, or the queue is full.
    Skipped,
}

/// State published for the synchronous getters on `CollabClient`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Snapshot {
    pub state: ConnectionState,
    pub canvas_id: Option<String>,
    pub participants: Vec<RemoteParticipant>,
    pub queued: usize,
    pub pending_acks: usize,
    pub reconnect_attempts: u32,
    pub last_activity_ms: Option<i64>,
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

pub(crate) enum Command {
    Connect { reply: Reply<()> },
    Disconnect { reply: Reply<()> },
    JoinCanvas { canvas_id: String, reply: oneshot::Sender<Delivery> },
    LeaveCanvas { reply: oneshot::Sender<Delivery> },
    /// Widget and selection broadcasts; require a connected canvas.
    Broadcast { body: Body, reply: oneshot::Sender<Delivery> },
    Cursor { position: Point, reply: oneshot::Sender<Delivery> },
}

/// Who started the current connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOrigin {
    Explicit,
    Retry,
}

pub(crate) struct Session {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    router: Router,
    commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<CollabEvent>,
    snapshot: watch::Sender<Snapshot>,

    state: ConnectionState,
    origin: AttemptOrigin,
    link: Option<SocketLink>,
    dialing: Option<JoinHandle<Result<SocketLink, TransportError>>>,
    connect_waiter: Option<Reply<()>>,
    auth_ack: Option<oneshot::Receiver<AckResult>>,
    acks: AckCoordinator,
    queue: OutboundQueue,
    registry: ParticipantRegistry,
    throttle: CursorThrottle,
    backoff: Backoff,
    canvas_id: Option<String>,
    reconnect_attempts: u32,
    last_activity_ms: Option<i64>,

    connect_deadline: Option<Instant>,
    reconnect_at: Option<Instant>,
    heartbeat_at: Option<Instant>,
}

impl Session {
    pub(crate) fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        router: Router,
        commands: mpsc::UnboundedReceiver<Command>,
        events: broadcast::Sender<CollabEvent>,
        snapshot: watch::Sender<Snapshot>,
    ) -> Self {
        let registry = ParticipantRegistry::new(config.user.id.clone());
        let throttle = CursorThrottle::new(config.cursor_throttle);
        let backoff = Backoff::new(config.reconnect_delay, config.max_reconnect_delay, config.reconnect_jitter);
        Self {
            config,
            connector,
            router,
            commands,
            events,
            snapshot,
            state: ConnectionState::Disconnected,
            origin: AttemptOrigin::Explicit,
            link: None,
            dialing: None,
            connect_waiter: None,
            auth_ack: None,
            acks: AckCoordinator::new(),
            queue: OutboundQueue::new(DEFAULT_QUEUE_CAPACITY),
            registry,
            throttle,
            backoff,
            canvas_id: None,
            reconnect_attempts: 0,
            last_activity_ms: None,
            connect_deadline: None,
            reconnect_at: None,
            heartbeat_at: None,
        }
    }

    /// Run until every `CollabClient` handle is dropped.
    pub(crate) async fn run(mut self) {
        debug!(user_id = %self.config.user.id, "session: task started");
        loop {
            tokio::select! {
                biased;
                settled = settle_auth(&mut self.auth_ack) => {
                    self.auth_ack = None;
                    self.on_auth_settled(settled);
                }
                dialed = join_dial(&mut self.dialing) => {
                    self.dialing = None;
                    self.on_dialed(dialed);
                }
                () = sleep_until(self.connect_deadline) => self.on_connect_timeout(),
                () = sleep_until(self.reconnect_at) => self.on_reconnect_due(),
                () = sleep_until(self.heartbeat_at) => self.on_heartbeat(),
                () = sleep_until(self.throttle.deadline()) => self.on_cursor_due(),
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                incoming = recv_link(&mut self.link) => self.on_incoming(incoming),
            }
            self.publish();
        }
        self.disconnect();
        self.publish();
        debug!("session: all handles dropped, task exiting");
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => self.connect(reply),
            Command::Disconnect { reply } => {
                self.disconnect();
                self.respond(reply, Ok(()));
            }
            Command::JoinCanvas { canvas_id, reply } => {
                let delivery = self.join_canvas(canvas_id);
                self.respond(reply, delivery);
            }
            Command::LeaveCanvas { reply } => {
                let delivery = self.leave_canvas();
                self.respond(reply, delivery);
            }
            Command::Broadcast { body, reply } => {
                let delivery = self.broadcast(body);
                self.respond(reply, delivery);
            }
            Command::Cursor { position, reply } => {
                let delivery = self.cursor(position);
                self.respond(reply, delivery);
            }
        }
    }

    fn connect(&mut self, reply: Reply<()>) {
        match self.state {
            ConnectionState::Connected => self.respond(reply, Ok(())),
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                debug!(state = ?self.state, "session: connect rejected, attempt in progress");
                self.respond(reply, Err(SessionError::ConnectInProgress));
            }
            ConnectionState::Disconnected | ConnectionState::Error => {
                self.reconnect_attempts = 0;
                self.connect_waiter = Some(reply);
                self.begin_attempt(AttemptOrigin::Explicit);
            }
        }
    }

    /// Tear everything down. Never schedules a reconnect.
    fn disconnect(&mut self) {
        let was = self.state;
        self.connect_deadline = None;
        self.reconnect_at = None;
        self.heartbeat_at = None;
        self.throttle.reset();
        if let Some(dial) = self.dialing.take() {
            dial.abort();
        }
        self.auth_ack = None;

        if let Some(link) = self.link.take() {
            if was == ConnectionState::Connected && self.canvas_id.is_some() {
                if let Err(e) = transmit_on(&link, &self.scoped(Body::Leave)) {
                    debug!(error = %e, "session: leave not delivered on disconnect");
                }
            }
            link.close(CLOSE_NORMAL, "client disconnect");
        }

        let rejected = self.acks.reject_all("session disconnected");
        let dropped = self.queue.len();
        self.queue.clear();
        self.registry.clear();
        self.canvas_id = None;
        self.reconnect_attempts = 0;
        self.set_state(ConnectionState::Disconnected);

        if let Some(waiter) = self.connect_waiter.take() {
            self.respond(waiter, Err(SessionError::Disconnected));
        }
        if was != ConnectionState::Disconnected {
            info!(rejected, dropped, "session: disconnected");
            self.emit(CollabEvent::Disconnected {
                code: Some(CLOSE_NORMAL),
                reason: "client disconnect".to_owned(),
            });
        }
    }

    fn join_canvas(&mut self, canvas_id: String) -> Delivery {
        if self.canvas_id.as_deref() == Some(canvas_id.as_str()) {
            debug!(%canvas_id, "session: already in canvas");
            return Delivery::Skipped;
        }
        if self.canvas_id.is_some() {
            self.exit_canvas();
        }

        info!(%canvas_id, "session: joining canvas");
        self.canvas_id = Some(canvas_id.clone());
        self.throttle.reset();
        let delivery = self.send(self.join_frame(&canvas_id));
        self.emit(CollabEvent::CanvasJoined { canvas_id });
        delivery
    }

    /// Leave the joined canvas. A no-op unless connected, so the canvas is
    /// still rejoined after a reconnect.
    fn leave_canvas(&mut self) -> Delivery {
        if self.canvas_id.is_none() || self.state != ConnectionState::Connected {
            debug!(state = ?self.state, "session: not connected in a canvas, leave skipped");
            return Delivery::Skipped;
        }
        self.exit_canvas()
    }

    /// Send (or queue) `leave` for the current canvas and drop its room state.
    /// The `leave` is ordered before any `join` that follows it.
    fn exit_canvas(&mut self) -> Delivery {
        let Some(canvas_id) = self.canvas_id.clone() else {
            return Delivery::Skipped;
        };
        let delivery = self.send(self.scoped(Body::Leave));
        info!(%canvas_id, ?delivery, "session: left canvas");
        self.canvas_id = None;
        self.registry.clear();
        self.throttle.reset();
        self.emit(CollabEvent::CanvasLeft { canvas_id });
        delivery
    }

    fn broadcast(&mut self, body: Body) -> Delivery {
        if !self.can_broadcast() {
            debug!(kind = %body.kind(), state = ?self.state, "session: no connected canvas, broadcast skipped");
            return Delivery::Skipped;
        }
        let frame = self.scoped(body);
        self.transmit_or_skip(&frame)
    }

    fn cursor(&mut self, position: Point) -> Delivery {
        if !self.can_broadcast() {
            return Delivery::Skipped;
        }
        match self.throttle.offer(position, Instant::now()) {
            ThrottleDecision::SendNow => self.transmit_or_skip(&self.scoped(Body::CursorMove { cursor: position })),
            ThrottleDecision::Deferred => Delivery::Deferred,
        }
    }

    // =========================================================================
    // CONNECTION ATTEMPTS
    // =========================================================================

    fn begin_attempt(&mut self, origin: AttemptOrigin) {
        self.origin = origin;
        self.set_state(ConnectionState::Connecting);
        self.connect_deadline = Some(Instant::now() + self.config.connect_timeout);

        let connector = Arc::clone(&self.connector);
        let url = self.config.server_url.clone();
        info!(%url, ?origin, attempt = self.reconnect_attempts, "session: connecting");
        self.dialing = Some(tokio::spawn(async move { connector.connect(&url).await }));
    }

    fn on_dialed(&mut self, dialed: Result<SocketLink, TransportError>) {
        if self.state != ConnectionState::Connecting {
            if let Ok(link) = dialed {
                link.close(CLOSE_NORMAL, "stale connection");
            }
            return;
        }

        let link = match dialed {
            Ok(link) => link,
            Err(e) => {
                self.fail_attempt(SessionError::Transport(e));
                return;
            }
        };

        match self.acks.register(AUTH_ACK_KEY) {
            Ok(rx) => self.auth_ack = Some(rx),
            Err(e) => {
                link.close(CLOSE_NORMAL, "handshake failed");
                self.fail_attempt(e.into());
                return;
            }
        }

        let auth = Frame::new(Body::Auth {
            token: self.config.auth_token.clone(),
            user: Some(self.config.user.to_user_info()),
        })
        .with_id(AUTH_ACK_KEY)
        .with_user_id(self.config.user.id.clone());

        let sent = transmit_on(&link, &auth);
        self.link = Some(link);
        match sent {
            Ok(()) => debug!("session: socket open, auth sent"),
            Err(e) => self.fail_attempt(SessionError::Transport(e)),
        }
    }

    fn on_auth_settled(&mut self, settled: AckResult) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        match settled {
            Ok(_) => self.on_authenticated(),
            Err(AckError::Rejected { message, .. }) => self.fail_attempt(SessionError::AuthRejected(message)),
            Err(e) => self.fail_attempt(e.into()),
        }
    }

    fn on_authenticated(&mut self) {
        self.connect_deadline = None;
        self.reconnect_attempts = 0;
        self.set_state(ConnectionState::Connected);
        self.touch();
        self.heartbeat_at = Some(Instant::now() + self.config.heartbeat_interval);

        let rejoin = self
            .canvas_id
            .clone()
            .filter(|canvas_id| !self.queue_has_join(canvas_id));

        self.flush_queue();
        if let Some(canvas_id) = rejoin {
            info!(%canvas_id, "session: rejoining canvas");
            self.send(self.join_frame(&canvas_id));
        }

        info!(user_id = %self.config.user.id, "session: connected");
        self.emit(CollabEvent::Connected);
        if let Some(waiter) = self.connect_waiter.take() {
            self.respond(waiter, Ok(()));
        }
    }

    fn on_connect_timeout(&mut self) {
        self.connect_deadline = None;
        if self.state == ConnectionState::Connecting {
            self.fail_attempt(SessionError::ConnectTimeout(self.config.connect_timeout));
        }
    }

    fn fail_attempt(&mut self, err: SessionError) {
        self.connect_deadline = None;
        self.auth_ack = None;
        self.acks.cancel(AUTH_ACK_KEY, "connection attempt failed");
        if let Some(dial) = self.dialing.take() {
            dial.abort();
        }
        if let Some(link) = self.link.take() {
            link.close(CLOSE_NORMAL, "handshake failed");
        }
        warn!(error = %err, code = err.error_code(), origin = ?self.origin, "session: connection attempt failed");

        match self.origin {
            AttemptOrigin::Explicit => {
                self.set_state(ConnectionState::Error);
                self.emit_error(&err);
                if let Some(waiter) = self.connect_waiter.take() {
                    self.respond(waiter, Err(err));
                }
            }
            AttemptOrigin::Retry => self.schedule_reconnect(),
        }
    }

    fn schedule_reconnect(&mut self) {
        self.reconnect_attempts += 1;
        let attempt = self.reconnect_attempts;
        if attempt > self.config.max_reconnect_attempts {
            self.reconnect_at = None;
            self.set_state(ConnectionState::Error);
            let err = SessionError::ReconnectExhausted(self.config.max_reconnect_attempts);
            warn!(error = %err, "session: giving up");
            self.emit_error(&err);
            return;
        }

        let delay = self.backoff.delay(attempt);
        self.reconnect_at = Some(Instant::now() + delay);
        self.set_state(ConnectionState::Reconnecting);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        info!(attempt, delay_ms, "session: reconnect scheduled");
        self.emit(CollabEvent::Reconnecting { attempt, delay_ms });
    }

    fn on_reconnect_due(&mut self) {
        self.reconnect_at = None;
        if self.state == ConnectionState::Reconnecting {
            self.begin_attempt(AttemptOrigin::Retry);
        }
    }

    // =========================================================================
    // SOCKET EVENTS
    // =========================================================================

    fn on_incoming(&mut self, incoming: Incoming) {
        match incoming {
            Incoming::Text(text) => {
                let routed = self
                    .router
                    .dispatch_text(&text, &mut self.registry, self.canvas_id.as_deref());
                if let Some(reply) = routed.ack {
                    self.acks.resolve(reply);
                }
                for event in routed.events {
                    self.emit(event);
                }
            }
            Incoming::Closed { code, reason } => self.on_closed(code, reason),
        }
    }

    fn on_closed(&mut self, code: u16, reason: String) {
        self.link = None;
        info!(code, %reason, state = ?self.state, "session: socket closed");
        match self.state {
            ConnectionState::Connecting => self.fail_attempt(SessionError::ClosedDuringHandshake { code }),
            ConnectionState::Connected => {
                self.heartbeat_at = None;
                self.throttle.cancel();
                self.registry.clear();
                self.acks.reject_all("socket closed");
                self.emit(CollabEvent::Disconnected {
                    code: Some(code),
                    reason,
                });
                if code != CLOSE_NORMAL && self.config.auto_reconnect {
                    self.schedule_reconnect();
                } else {
                    self.set_state(ConnectionState::Disconnected);
                }
            }
            ConnectionState::Disconnected | ConnectionState::Reconnecting | ConnectionState::Error => {}
        }
    }

    fn on_heartbeat(&mut self) {
        if self.state != ConnectionState::Connected {
            self.heartbeat_at = None;
            return;
        }
        self.touch();
        self.heartbeat_at = Some(Instant::now() + self.config.heartbeat_interval);
        let at_ms = self.last_activity_ms.unwrap_or_else(now_ms);
        debug!(at_ms, "session: heartbeat");
        self.emit(CollabEvent::Heartbeat { at_ms });
    }

    fn on_cursor_due(&mut self) {
        let Some(position) = self.throttle.fire(Instant::now()) else {
            return;
        };
        if !self.can_broadcast() {
            debug!("session: deferred cursor dropped, no connected canvas");
            return;
        }
        self.transmit_or_skip(&self.scoped(Body::CursorMove { cursor: position }));
    }

    // =========================================================================
    // SEND PATH
    // =========================================================================

    /// Send now if connected, else queue for the next connection.
    fn send(&mut self, frame: Frame) -> Delivery {
        if self.state == ConnectionState::Connected {
            match self.transmit(&frame) {
                Ok(()) => return Delivery::Sent,
                Err(e) => warn!(error = %e, kind = %frame.kind(), "session: send failed, queueing"),
            }
        }
        let kind = frame.kind();
        if self.queue.push(frame) {
            debug!(%kind, queued = self.queue.len(), "session: frame queued");
            Delivery::Queued
        } else {
            warn!(%kind, capacity = DEFAULT_QUEUE_CAPACITY, "session: outbound queue full, frame dropped");
            Delivery::Skipped
        }
    }

    /// Drain the queue in FIFO order. Stops, keeping the rest, if the socket
    /// goes away mid-flush.
    fn flush_queue(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let mut flushed = 0usize;
        while let Some(frame) = self.queue.pop() {
            if let Err(e) = self.transmit(&frame) {
                warn!(error = %e, remaining = self.queue.len() + 1, "session: flush interrupted");
                self.queue.restore(frame);
                break;
            }
            flushed += 1;
        }
        if flushed > 0 {
            info!(flushed, "session: outbound queue flushed");
        }
    }

    fn transmit_or_skip(&self, frame: &Frame) -> Delivery {
        match self.transmit(frame) {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                warn!(error = %e, kind = %frame.kind(), "session: broadcast not delivered");
                Delivery::Skipped
            }
        }
    }

    fn transmit(&self, frame: &Frame) -> Result<(), TransportError> {
        let Some(link) = &self.link else {
            return Err(TransportError::Closed);
        };
        transmit_on(link, frame)
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn can_broadcast(&self) -> bool {
        self.state == ConnectionState::Connected && self.canvas_id.is_some()
    }

    fn queue_has_join(&self, canvas_id: &str) -> bool {
        self.queue
            .iter()
            .any(|frame| matches!(frame.body, Body::Join { .. }) && frame.canvas_id.as_deref() == Some(canvas_id))
    }

    fn join_frame(&self, canvas_id: &str) -> Frame {
        Frame::new(Body::Join {
            user: Some(self.config.user.to_user_info()),
        })
        .with_canvas_id(canvas_id)
        .with_user_id(self.config.user.id.clone())
    }

    /// Stamp a frame with the joined canvas and the local user.
    fn scoped(&self, body: Body) -> Frame {
        let frame = Frame::new(body).with_user_id(self.config.user.id.clone());
        match &self.canvas_id {
            Some(canvas_id) => frame.with_canvas_id(canvas_id.clone()),
            None => frame,
        }
    }

    fn touch(&mut self) {
        self.last_activity_ms = Some(now_ms());
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "session: state change");
            self.state = next;
        }
    }

    fn emit(&self, event: CollabEvent) {
        // No receivers is fine; events are fire-and-forget.
        let _ = self.events.send(event);
    }

    fn emit_error<E: ErrorCode>(&self, err: &E) {
        self.emit(CollabEvent::Error {
            code: err.error_code().to_owned(),
            message: err.to_string(),
        });
    }

    /// Publish, then answer, so the caller observes the state it caused.
    fn respond<T>(&self, reply: oneshot::Sender<T>, value: T) {
        self.publish();
        if reply.send(value).is_err() {
            debug!("session: caller went away before the reply");
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(Snapshot {
            state: self.state,
            canvas_id: self.canvas_id.clone(),
            participants: self.registry.snapshot(),
            queued: self.queue.len(),
            pending_acks: self.acks.len(),
            reconnect_attempts: self.reconnect_attempts,
            last_activity_ms: self.last_activity_ms,
        });
    }
}

fn transmit_on(link: &SocketLink, frame: &Frame) -> Result<(), TransportError> {
    match encode_frame(frame) {
        Ok(text) => link.send_text(text),
        Err(e) => {
            warn!(error = %e, kind = %frame.kind(), "session: frame not encodable, dropped");
            Ok(())
        }
    }
}

// =============================================================================
// SELECT HELPERS
// =============================================================================

/// Sleep until `deadline`, or forever when there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn settle_auth(rx: &mut Option<oneshot::Receiver<AckResult>>) -> AckResult {
    match rx {
        Some(rx) => rx.await.unwrap_or_else(|_| {
            Err(AckError::Cancelled {
                key: AUTH_ACK_KEY.to_owned(),
                reason: "ack entry dropped".to_owned(),
            })
        }),
        None => pending().await,
    }
}

async fn join_dial(
    dial: &mut Option<JoinHandle<Result<SocketLink, TransportError>>>,
) -> Result<SocketLink, TransportError> {
    match dial {
        Some(handle) => handle
            .await
            .unwrap_or_else(|e| Err(TransportError::Connect(format!("dial task failed: {e}")))),
        None => pending().await,
    }
}

async fn recv_link(link: &mut Option<SocketLink>) -> Incoming {
    match link {
        Some(link) => link.recv().await.unwrap_or_else(|| Incoming::Closed {
            code: CLOSE_ABNORMAL,
            reason: "transport dropped".to_owned(),
        }),
        None => pending().await,
    }
}
