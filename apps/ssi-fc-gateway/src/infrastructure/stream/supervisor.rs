//! Stream Supervisor
//!
//! Owns one long-lived streaming connection: connects with the session's
//! bearer token, replays channel subscriptions, decodes frames, hands events
//! to the [`HandlerRegistry`] and reconnects with backoff when the transport
//! drops.
//!
//! # Delivery
//!
//! Events are dispatched inline by the receive loop, so handlers observe
//! them in the order the venue sent them. Anything that interrupts the feed
//! is surfaced as a lifecycle event (`Disconnected`, `Reconnecting`,
//! `Reconnected`, `Terminated`) rather than hidden.
//!
//! # Trading Cursor
//!
//! Trading streams connect with `notify_id=<cursor>`. The cursor follows the
//! highest `notifyId` seen on delivered order or portfolio events (or
//! advances by one when the event carries none) and is sent again on
//! reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use reqwest::Url;
use serde_json::json;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use super::codec::{InboundFrame, SIGNALR_PATH, StreamCodec};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::registry::HandlerRegistry;
use crate::application::ports::TokenProvider;
use crate::domain::session::{BearerToken, SessionKind};
use crate::domain::stream::{EventKind, StreamEvent, StreamState};
use crate::error::GatewayError;
use crate::infrastructure::config::{SessionConfig, StreamSettings};
use crate::infrastructure::metrics;

// =============================================================================
// Supervisor
// =============================================================================

/// Supervises the streaming connection for one session.
#[derive(Debug)]
pub struct StreamSupervisor {
    shared: Arc<Shared>,
    pending_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    task: Mutex<Option<JoinHandle<Result<(), GatewayError>>>>,
    started: AtomicBool,
}

impl StreamSupervisor {
    /// Create a supervisor for the session described by `config`.
    #[must_use]
    pub fn new(config: &SessionConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(StreamState::Disconnected);

        let shared = Shared {
            session: config.kind(),
            stream_url: config.stream_url().to_string(),
            settings: config.stream_settings().clone(),
            codec: StreamCodec::new(config.kind()),
            tokens,
            registry: HandlerRegistry::new(),
            channels: Mutex::new(Vec::new()),
            pending_tx,
            state_tx,
            cursor: AtomicU64::new(0),
            next_invocation: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        };

        Self {
            shared: Arc::new(shared),
            pending_rx: Mutex::new(Some(pending_rx)),
            task: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Prepare the stream against the current session.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthenticated`] if no session is held.
    pub fn init_stream(&self) -> Result<(), GatewayError> {
        self.shared.tokens.current_session()?;
        if self.state() == StreamState::Disconnected {
            self.shared.set_state(StreamState::Connecting);
        }
        Ok(())
    }

    /// Spawn the connection loop on the current Tokio runtime. Calling this
    /// again is a no-op.
    ///
    /// Performs [`StreamSupervisor::init_stream`] first if it was not called.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthenticated`] if no session is held, and
    /// [`GatewayError::InvalidRequest`] if the stream settings are unusable or
    /// no Tokio runtime is running.
    pub fn start(&self) -> Result<(), GatewayError> {
        if self.started.load(Ordering::Acquire) {
            return Ok(());
        }
        self.shared
            .settings
            .validate()
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
        let runtime = Handle::try_current().map_err(|e| {
            GatewayError::InvalidRequest(format!("stream needs a Tokio runtime: {e}"))
        })?;
        self.init_stream()?;
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let Some(pending) = self.pending_rx.lock().take() else {
            return Ok(());
        };
        let shared = Arc::clone(&self.shared);
        let handle = runtime.spawn(run(shared, pending));
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Add a channel to the subscription set.
    ///
    /// Returns `false` if the channel was already subscribed. Channels added
    /// before the connection is up are sent once it is.
    pub fn subscribe_channel(&self, channel: impl Into<String>) -> bool {
        let channel = channel.into();
        {
            let mut channels = self.shared.channels.lock();
            if channels.contains(&channel) {
                return false;
            }
            channels.push(channel.clone());
        }
        // The receiver lives as long as the supervisor.
        let _ = self.shared.pending_tx.send(channel);
        true
    }

    /// Register a handler for one event kind.
    pub fn register_handler<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.shared.registry.register(kind, handler);
    }

    /// Get the session this stream belongs to.
    #[must_use]
    pub fn session(&self) -> SessionKind {
        self.shared.session
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        *self.shared.state_tx.borrow()
    }

    /// Watch connection state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<StreamState> {
        self.shared.state_tx.subscribe()
    }

    /// Get the subscribed channels in subscription order.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.shared.channels.lock().clone()
    }

    /// Get the trading cursor; `None` for market-data streams.
    #[must_use]
    pub fn cursor(&self) -> Option<u64> {
        self.shared.cursor_value()
    }

    /// Wait for the connection loop to finish.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::StreamTerminated`] if the loop gave up after
    /// exhausting its reconnect budget.
    pub async fn wait(&self) -> Result<(), GatewayError> {
        let handle = self.task.lock().take();
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| GatewayError::VenueUnreachable(format!("stream task failed: {e}")))?,
            None => Ok(()),
        }
    }

    /// Stop the connection loop. The stream cannot be restarted.
    pub fn close(&self) {
        self.shared.cancel.cancel();
        self.shared.set_state(StreamState::Closed);
    }
}

impl Drop for StreamSupervisor {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

// =============================================================================
// Shared State
// =============================================================================

struct Shared {
    session: SessionKind,
    stream_url: String,
    settings: StreamSettings,
    codec: StreamCodec,
    tokens: Arc<dyn TokenProvider>,
    registry: HandlerRegistry,
    channels: Mutex<Vec<String>>,
    pending_tx: mpsc::UnboundedSender<String>,
    state_tx: watch::Sender<StreamState>,
    cursor: AtomicU64,
    next_invocation: AtomicU64,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("session", &self.session)
            .field("stream_url", &self.stream_url)
            .field("state", &*self.state_tx.borrow())
            .field("channels", &*self.channels.lock())
            .finish_non_exhaustive()
    }
}

/// Why a connection ended.
#[derive(Debug)]
enum ConnectionEnd {
    /// Closed by the owner.
    Cancelled,
    /// Transport failure; `connected` is false if the handshake never completed.
    Lost { connected: bool, reason: String },
}

fn lost(connected: bool, reason: impl Into<String>) -> ConnectionEnd {
    ConnectionEnd::Lost {
        connected,
        reason: reason.into(),
    }
}

impl Shared {
    fn set_state(&self, next: StreamState) {
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == next || state.is_closed() {
                return false;
            }
            *state = next;
            true
        });
        if changed {
            metrics::set_stream_state(self.session, next);
            tracing::debug!(session = %self.session, state = %next, "Stream state changed");
        }
    }

    fn cursor_value(&self) -> Option<u64> {
        matches!(self.session, SessionKind::Trading).then(|| self.cursor.load(Ordering::Acquire))
    }

    /// Move the cursor to `notify_id`, or one past it when the event has
    /// none. The cursor never moves backwards.
    fn advance_cursor(&self, notify_id: Option<u64>) -> u64 {
        match notify_id {
            Some(id) => self.cursor.fetch_max(id, Ordering::AcqRel).max(id),
            None => self.cursor.fetch_add(1, Ordering::AcqRel) + 1,
        }
    }

    /// Drain queued subscription requests and return the full channel set
    /// if it differs from the set last sent on this connection.
    fn next_subscription(
        &self,
        pending: &mut mpsc::UnboundedReceiver<String>,
        sent: &[String],
    ) -> Option<Vec<String>> {
        while pending.try_recv().is_ok() {}
        let channels = self.channels.lock().clone();
        (channels.as_slice() != sent).then_some(channels)
    }

    fn deliver(&self, event: &StreamEvent) {
        metrics::record_stream_event(self.session, event.kind);
        self.registry.dispatch(self.session, event);
    }

    fn lifecycle(&self, kind: EventKind, detail: serde_json::Value) {
        self.deliver(&StreamEvent::lifecycle(kind, detail, self.cursor_value()));
    }

    fn endpoint(&self) -> Result<Url, GatewayError> {
        stream_endpoint(&self.stream_url, self.codec.hub(), self.cursor_value())
    }

    fn handle_text(&self, text: &str) {
        match self.codec.decode(text) {
            Ok(InboundFrame::KeepAlive | InboundFrame::InvocationResult { error: None, .. }) => {}
            Ok(InboundFrame::InvocationResult { id, error: Some(error) }) => {
                tracing::warn!(
                    session = %self.session,
                    id = %id,
                    error = %error,
                    "Hub invocation failed"
                );
                self.deliver(&StreamEvent::new(
                    EventKind::Error,
                    None,
                    json!({ "invocation": id, "error": error }),
                ));
            }
            Ok(InboundFrame::Events { events, malformed, .. }) => {
                for _ in 0..malformed {
                    metrics::record_malformed_frame(self.session);
                }
                for mut event in events {
                    if self.session == SessionKind::Trading && event.kind.advances_cursor() {
                        event.cursor = Some(self.advance_cursor(event.notify_id()));
                    }
                    self.deliver(&event);
                }
            }
            Err(e) => {
                tracing::warn!(session = %self.session, error = %e, "Dropping malformed frame");
                metrics::record_malformed_frame(self.session);
            }
        }
    }

    async fn send_subscribe<S>(&self, write: &mut S, channels: &[String]) -> Result<(), String>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let id = self.next_invocation.fetch_add(1, Ordering::Relaxed);
        let frame = self
            .codec
            .encode_subscribe(channels, id)
            .map_err(|e| e.to_string())?;
        tracing::debug!(session = %self.session, ?channels, "Subscribing to channels");
        write
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| e.to_string())
    }

    /// Connect and process frames until the connection ends.
    #[allow(clippy::too_many_lines)]
    async fn connect_and_run(
        &self,
        pending: &mut mpsc::UnboundedReceiver<String>,
        policy: &mut ReconnectPolicy,
        recovering: bool,
    ) -> ConnectionEnd {
        let token = match self.tokens.current_token() {
            Ok(token) => token,
            Err(e) => return lost(false, e.to_string()),
        };
        let request = match self.endpoint().and_then(|url| handshake_request(&url, &token)) {
            Ok(request) => request,
            Err(e) => return lost(false, e.to_string()),
        };
        tracing::info!(session = %self.session, url = %request.uri(), "Connecting to stream");

        let ws_stream = tokio::select! {
            () = self.cancel.cancelled() => return ConnectionEnd::Cancelled,
            result = tokio_tungstenite::connect_async(request) => match result {
                Ok((ws_stream, _response)) => ws_stream,
                Err(tungstenite::Error::Http(response))
                    if response.status() == StatusCode::UNAUTHORIZED =>
                {
                    if let Err(e) = self.tokens.force_refresh(&token).await {
                        tracing::warn!(
                            session = %self.session,
                            error = %e,
                            "Forced token refresh failed"
                        );
                    }
                    return lost(false, "handshake rejected with 401");
                }
                Err(e) => return lost(false, e.to_string()),
            }
        };

        self.set_state(StreamState::Connected);
        tracing::info!(session = %self.session, "Stream connected");
        if recovering {
            self.lifecycle(EventKind::Reconnected, json!({ "notify_id": self.cursor_value() }));
        }

        let (mut write, mut read) = ws_stream.split();

        // SwitchChannels replaces the venue-side set, so every frame carries
        // all channels.
        let mut sent: Vec<String> = Vec::new();
        if let Some(channels) = self.next_subscription(pending, &sent) {
            if let Err(e) = self.send_subscribe(&mut write, &channels).await {
                return lost(true, e);
            }
            sent = channels;
        }
        // The backoff budget is restored only once the venue has sent data.
        let mut established = false;

        let idle_timeout = self.settings.idle_timeout;
        let idle = tokio::time::sleep(idle_timeout);
        tokio::pin!(idle);
        let mut ping = tokio::time::interval(self.settings.heartbeat_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ping.tick().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return ConnectionEnd::Cancelled;
                }
                () = &mut idle => {
                    return lost(true, "no frames within idle timeout");
                }
                _ = ping.tick() => {
                    if let Err(e) = write.send(Message::Ping(Vec::<u8>::new().into())).await {
                        return lost(true, e.to_string());
                    }
                }
                Some(_) = pending.recv() => {
                    if let Some(channels) = self.next_subscription(pending, &sent) {
                        if let Err(e) = self.send_subscribe(&mut write, &channels).await {
                            return lost(true, e);
                        }
                        sent = channels;
                    }
                }
                frame = read.next() => {
                    idle.as_mut().reset(Instant::now() + idle_timeout);
                    if !established && matches!(&frame, Some(Ok(message)) if !message.is_close()) {
                        established = true;
                        policy.reset();
                    }
                    match frame {
                        Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                        Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                            Ok(text) => self.handle_text(text),
                            Err(_) => {
                                tracing::warn!(
                                    session = %self.session,
                                    "Dropping non-UTF-8 binary frame"
                                );
                                metrics::record_malformed_frame(self.session);
                            }
                        },
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                return lost(true, e.to_string());
                            }
                        }
                        Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                        Some(Ok(Message::Close(frame))) => {
                            return lost(true, format!("closed by venue: {frame:?}"));
                        }
                        Some(Err(e)) => return lost(true, e.to_string()),
                        None => return lost(true, "stream ended"),
                    }
                }
            }
        }
    }
}

// =============================================================================
// Connection Loop
// =============================================================================

async fn run(
    shared: Arc<Shared>,
    mut pending: mpsc::UnboundedReceiver<String>,
) -> Result<(), GatewayError> {
    let mut policy = ReconnectPolicy::new(ReconnectConfig::from_stream_settings(&shared.settings));
    let mut recovering = false;

    loop {
        if shared.cancel.is_cancelled() {
            shared.set_state(StreamState::Closed);
            return Ok(());
        }

        match shared.connect_and_run(&mut pending, &mut policy, recovering).await {
            ConnectionEnd::Cancelled => {
                tracing::info!(session = %shared.session, "Stream closed");
                shared.set_state(StreamState::Closed);
                return Ok(());
            }
            ConnectionEnd::Lost { connected, reason } => {
                tracing::warn!(
                    session = %shared.session,
                    reason = %reason,
                    "Stream connection lost"
                );
                if connected {
                    shared.lifecycle(EventKind::Disconnected, json!({ "reason": reason }));
                }
            }
        }

        shared.set_state(StreamState::Reconnecting);
        let Some(delay) = policy.next_delay() else {
            let attempts = policy.attempt_count();
            tracing::error!(
                session = %shared.session,
                attempts,
                "Stream reconnect budget exhausted"
            );
            shared.set_state(StreamState::Closed);
            shared.lifecycle(EventKind::Terminated, json!({ "attempts": attempts }));
            return Err(GatewayError::StreamTerminated { attempts });
        };

        let attempt = policy.attempt_count();
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        metrics::record_reconnect(shared.session);
        tracing::info!(session = %shared.session, attempt, delay_ms, "Reconnecting stream");
        shared.lifecycle(
            EventKind::Reconnecting,
            json!({ "attempt": attempt, "delay_ms": delay_ms }),
        );

        tokio::select! {
            () = shared.cancel.cancelled() => {
                shared.set_state(StreamState::Closed);
                return Ok(());
            }
            () = tokio::time::sleep(delay) => {}
        }

        if let Err(e) = shared.tokens.refresh_if_expired().await {
            tracing::warn!(
                session = %shared.session,
                error = %e,
                "Token refresh before reconnect failed"
            );
        }
        recovering = true;
    }
}

/// Build `<base>v2.0/signalr?hub=<hub>[&notify_id=<cursor>]`.
fn stream_endpoint(base: &str, hub: &str, notify_id: Option<u64>) -> Result<Url, GatewayError> {
    let base = format!("{}/", base.trim_end_matches('/'));
    let mut url = Url::parse(&base)
        .and_then(|url| url.join(SIGNALR_PATH))
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid stream url {base:?}: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("hub", hub);
        if let Some(notify_id) = notify_id {
            query.append_pair("notify_id", &notify_id.to_string());
        }
    }
    Ok(url)
}

fn handshake_request(url: &Url, token: &BearerToken) -> Result<Request, GatewayError> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
    let value = HeaderValue::from_str(&token.header_value())
        .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(request)
}
