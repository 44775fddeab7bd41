//! Session lifecycle and reconnection with linear backoff.
//!
//! Contains the shared [`WsContext`], the session task (handshake, then
//! read loop), the open/close transitions, the backlog flusher and the
//! reconnect timer.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{Notify, broadcast, mpsc};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::RealtimeConfig;
use crate::dispatch::Dispatcher;
use crate::outbound::OutboundQueue;
use crate::pumps::read::{ReadEnd, read_pump};
use crate::registry::SubscriptionRegistry;
use crate::types::{ConnectionEvent, ConnectionState, ReconnectConfig};
use crate::ws_client::{self, WsClient};

/// Counts consecutive reconnect attempts since the last successful open.
#[derive(Debug, Default)]
pub(crate) struct ReconnectAttempts {
    count: u32,
}

impl ReconnectAttempts {
    /// Claims the next attempt, returning its number and delay, or `None`
    /// once the ceiling is reached.
    pub(crate) fn next_delay(&mut self, config: &ReconnectConfig) -> Option<(u32, Duration)> {
        if self.count >= config.max_attempts {
            return None;
        }
        self.count += 1;
        Some((self.count, config.delay_for_attempt(self.count)))
    }

    pub(crate) fn reset(&mut self) {
        self.count = 0;
    }

    pub(crate) fn count(&self) -> u32 {
        self.count
    }
}

/// Mutable link state, guarded by one mutex. Never held while listeners run.
pub(crate) struct Link {
    pub(crate) state: ConnectionState,
    /// Id of the session allowed to report open/close.
    pub(crate) session: Option<Uuid>,
    pub(crate) session_cancel: Option<CancellationToken>,
    pub(crate) client: Option<WsClient>,
    pub(crate) reconnect_cancel: Option<CancellationToken>,
    pub(crate) attempts: ReconnectAttempts,
    pub(crate) exhausted: bool,
    pub(crate) outbound: OutboundQueue,
}

impl Link {
    pub(crate) fn new(outbound_capacity: usize) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            session: None,
            session_cancel: None,
            client: None,
            reconnect_cancel: None,
            attempts: ReconnectAttempts::default(),
            exhausted: false,
            outbound: OutboundQueue::new(outbound_capacity),
        }
    }

    /// Cancels a pending reconnect timer, if any.
    pub(crate) fn cancel_reconnect(&mut self) {
        if let Some(token) = self.reconnect_cancel.take() {
            token.cancel();
        }
    }
}

/// State shared between the manager and its spawned tasks.
pub(crate) struct WsContext {
    pub(crate) url: String,
    pub(crate) config: RealtimeConfig,
    pub(crate) reconnect: ReconnectConfig,
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) events_tx: broadcast::Sender<ConnectionEvent>,
    pub(crate) link: Mutex<Link>,
    /// Woken when frames wait in the outbound queue of an open link.
    pub(crate) outbound_ready: Notify,
}

impl WsContext {
    pub(crate) fn new(url: String, config: RealtimeConfig) -> Self {
        let registry = SubscriptionRegistry::new();
        let dispatcher = Dispatcher::new(registry.clone(), config.max_message_size);
        let (events_tx, _) = broadcast::channel(64);
        Self {
            url,
            reconnect: config.reconnect(),
            link: Mutex::new(Link::new(config.outbound_queue_capacity)),
            config,
            registry,
            dispatcher,
            events_tx,
            outbound_ready: Notify::new(),
        }
    }

    pub(crate) fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine.
        let _ = self.events_tx.send(event);
    }
}

/// Starts a new session unless one is open or connecting.
pub(crate) fn start_session(ctx: &Arc<WsContext>) {
    let request = match ctx.url.as_str().into_client_request() {
        Ok(r) => r,
        Err(e) => {
            error!(url = %ctx.url, error = %e, "invalid real-time endpoint, not connecting");
            return;
        }
    };
    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(h) => h,
        Err(_) => {
            error!(url = %ctx.url, "connect called outside a tokio runtime");
            return;
        }
    };

    let (session, cancel) = {
        let mut link = ctx.link();
        if matches!(
            link.state,
            ConnectionState::Open | ConnectionState::Connecting
        ) {
            debug!(url = %ctx.url, state = ?link.state, "connect ignored, transport already active");
            return;
        }
        link.cancel_reconnect();
        let session = Uuid::new_v4();
        let cancel = CancellationToken::new();
        link.session = Some(session);
        link.session_cancel = Some(cancel.clone());
        link.state = ConnectionState::Connecting;
        (session, cancel)
    };

    ctx.emit(ConnectionEvent::StateChanged(ConnectionState::Connecting));
    runtime.spawn(run_session(ctx.clone(), session, request, cancel));
}

/// Tears down the active session without scheduling a reconnect.
pub(crate) fn stop_session(ctx: &Arc<WsContext>) {
    let (active, client) = {
        let mut link = ctx.link();
        link.cancel_reconnect();
        if let Some(token) = link.session_cancel.take() {
            token.cancel();
        }
        let active = link.session.take().is_some();
        if active {
            link.state = ConnectionState::Closing;
        }
        (active, link.client.take())
    };

    if !active {
        trace!(url = %ctx.url, "disconnect ignored, no active transport");
        return;
    }

    ctx.emit(ConnectionEvent::StateChanged(ConnectionState::Closing));
    if let Some(client) = client {
        client.close();
    }

    {
        let mut link = ctx.link();
        // A connect() may have raced in after the Closing transition.
        if link.session.is_none() && link.state == ConnectionState::Closing {
            link.state = ConnectionState::Disconnected;
        }
    }
    info!(url = %ctx.url, "disconnected");
    ctx.registry.notify_connection(false);
    ctx.emit(ConnectionEvent::StateChanged(ConnectionState::Disconnected));
}

/// One transport lifetime: handshake, open, read loop, close.
async fn run_session(
    ctx: Arc<WsContext>,
    session: Uuid,
    request: Request,
    cancel: CancellationToken,
) {
    info!(url = %ctx.url, %session, "connecting");

    let handshake = ws_client::open(
        request,
        ctx.config.max_message_size,
        ctx.config.connect_timeout(),
    );
    let result = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(%session, "handshake cancelled");
            return;
        }
        result = handshake => result,
    };

    let stream = match result {
        Ok(stream) => stream,
        Err(e) if !e.is_retryable() => {
            error!(url = %ctx.url, error = %e, "cannot construct transport, not retrying");
            on_transport_failed(&ctx, session);
            return;
        }
        Err(e) => {
            warn!(url = %ctx.url, error = %e, "connection failed");
            on_transport_closed(&ctx, session);
            return;
        }
    };

    let (write, read) = stream.split();
    let client = WsClient::start(write, ctx.config.ping_period(), cancel.child_token());
    let write_tx = client.sender();
    if !on_transport_open(&ctx, session, client) {
        return;
    }
    tokio::spawn(flush_backlog(
        ctx.clone(),
        session,
        write_tx.clone(),
        cancel.clone(),
    ));

    let end = read_pump(read, &ctx.dispatcher, write_tx, cancel, ctx.config.pong_wait()).await;
    debug!(url = %ctx.url, %session, reason = ?end, "read loop ended");
    if end != ReadEnd::Cancelled {
        on_transport_closed(&ctx, session);
    }
}

/// Handles a completed handshake. Returns `false` if the session was
/// superseded, in which case the client is dropped (and closed).
fn on_transport_open(ctx: &Arc<WsContext>, session: Uuid, client: WsClient) -> bool {
    let flushed = {
        let mut link = ctx.link();
        if link.session != Some(session) {
            debug!(%session, "session superseded before open, closing");
            return false;
        }
        link.state = ConnectionState::Open;
        link.attempts.reset();
        link.exhausted = false;

        let mut backlog = link.outbound.drain();
        let room = client.capacity().min(backlog.len());
        let rest = backlog.split_off(room);
        let mut flushed = 0usize;
        let mut unsent = Vec::new();
        for frame in backlog {
            match client.try_send_text(frame) {
                Ok(()) => flushed += 1,
                Err(frame) => unsent.push(frame),
            }
        }
        unsent.extend(rest);
        if !unsent.is_empty() {
            link.outbound.requeue_front(unsent);
            ctx.outbound_ready.notify_one();
        }
        link.client = Some(client);
        flushed
    };

    info!(url = %ctx.url, %session, flushed, "connected");
    ctx.registry.notify_connection(true);
    ctx.emit(ConnectionEvent::StateChanged(ConnectionState::Open));
    true
}

/// Outcome of handing one backlog frame to the write channel.
enum Backlog {
    Sent,
    Empty,
    Superseded,
}

/// Sends the oldest queued frame through `permit`. The pop and the send
/// happen under the link lock so a concurrent `send` cannot overtake.
fn send_next_backlog(
    ctx: &WsContext,
    session: Uuid,
    permit: mpsc::Permit<'_, tungstenite::Message>,
) -> Backlog {
    let mut link = ctx.link();
    if link.session != Some(session) || !link.state.is_open() {
        return Backlog::Superseded;
    }
    match link.outbound.pop_front() {
        Some(frame) => {
            permit.send(tungstenite::Message::Text(frame.into()));
            Backlog::Sent
        }
        None => Backlog::Empty,
    }
}

/// Moves frames queued behind a full write channel into it as room frees
/// up. Runs for the lifetime of one open session.
pub(crate) async fn flush_backlog(
    ctx: Arc<WsContext>,
    session: Uuid,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ctx.outbound_ready.notified() => {}
        }
        let mut flushed = 0usize;
        loop {
            let permit = tokio::select! {
                _ = cancel.cancelled() => return,
                permit = write_tx.reserve() => match permit {
                    Ok(p) => p,
                    Err(_) => return,
                },
            };
            match send_next_backlog(&ctx, session, permit) {
                Backlog::Sent => flushed += 1,
                Backlog::Empty => break,
                Backlog::Superseded => {
                    // Hand the wakeup on to the next session's flusher.
                    ctx.outbound_ready.notify_one();
                    return;
                }
            }
        }
        if flushed > 0 {
            debug!(url = %ctx.url, %session, flushed, "outbound backlog flushed");
        }
    }
}

/// Clears the session after a failure that must not be retried.
fn on_transport_failed(ctx: &Arc<WsContext>, session: Uuid) {
    {
        let mut link = ctx.link();
        if link.session != Some(session) {
            return;
        }
        link.session = None;
        link.session_cancel = None;
        link.client = None;
        link.state = ConnectionState::Disconnected;
    }
    ctx.registry.notify_connection(false);
    ctx.emit(ConnectionEvent::StateChanged(ConnectionState::Disconnected));
}

/// Handles a close of an open or connecting transport: notifies listeners
/// and schedules the next attempt, or gives up at the ceiling.
fn on_transport_closed(ctx: &Arc<WsContext>, session: Uuid) {
    let next = {
        let mut link = ctx.link();
        if link.session != Some(session) {
            trace!(%session, "close from superseded session ignored");
            return;
        }
        link.session = None;
        link.session_cancel = None;
        link.client = None;
        link.state = ConnectionState::Disconnected;

        link.cancel_reconnect();
        match link.attempts.next_delay(&ctx.reconnect) {
            Some((attempt, delay)) => {
                let token = CancellationToken::new();
                link.reconnect_cancel = Some(token.clone());
                Some((attempt, delay, token))
            }
            None => {
                link.exhausted = true;
                None
            }
        }
    };

    ctx.registry.notify_connection(false);
    ctx.emit(ConnectionEvent::StateChanged(ConnectionState::Disconnected));

    match next {
        Some((attempt, delay, token)) => {
            info!(
                url = %ctx.url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "reconnecting"
            );
            ctx.emit(ConnectionEvent::ReconnectScheduled { attempt, delay });
            tokio::spawn(reconnect_after(ctx.clone(), delay, token));
        }
        None => {
            let attempts = ctx.reconnect.max_attempts;
            warn!(url = %ctx.url, attempts, "reconnect attempts exhausted, giving up");
            ctx.emit(ConnectionEvent::ReconnectExhausted { attempts });
        }
    }
}

/// Waits out the backoff, then starts a new session unless cancelled.
async fn reconnect_after(ctx: Arc<WsContext>, delay: Duration, cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!(url = %ctx.url, "reconnect cancelled");
            return;
        }
        _ = tokio::time::sleep(delay) => {}
    }

    {
        let mut link = ctx.link();
        if cancel.is_cancelled() {
            return;
        }
        link.reconnect_cancel = None;
    }
    start_session(&ctx);
}
