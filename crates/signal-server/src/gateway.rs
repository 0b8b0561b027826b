//! Transport Gateway: accepts WebSocket connections, assigns each a
//! connection id, and drives a [`SessionController`] per connection.
//!
//! The WebSocket framing layer itself is treated as an external, provided
//! service; this module is the core-owned code sitting on top of it
//! (`tokio-tungstenite` for the socket, one `tokio::spawn`ed task per
//! connection), split into a `Server`/`handle_connection`/`handle_stream`/
//! `execute_actions` pipeline.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use signal_core::{Environment, MatchOutcome, SessionAction, SessionController, SessionError};
use signal_proto::{ClientEvent, IceServer, RoomId, ServerEvent, UserId};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::{
    analytics::AnalyticsSink,
    matcher::{Matcher, PairingOutcome},
    registry::{DeliveryOutcome, Registry, RouterSignal},
    store::SharedStore,
};

/// Keepalive ping interval.
const PING_INTERVAL: Duration = Duration::from_secs(25);
/// Keepalive timeout: no inbound activity for this long is treated as a
/// disconnect.
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);
/// Cooperative delay between a skip's `leave-chat` and its `find-partner`.
const SKIP_DELAY: Duration = Duration::from_millis(500);
/// How long graceful shutdown waits for outbound queues to drain.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);
/// Per-connection outbound queue depth, for back-pressure.
const OUTBOX_CAPACITY: usize = 64;

/// The random-pairing signaling server: binds a listener and drives one
/// [`SessionController`] per accepted connection.
pub struct Gateway<S, A, E> {
    matcher: Matcher<S, A>,
    registry: Registry,
    env: E,
    ice_servers: Arc<Vec<IceServer>>,
}

impl<S, A, E> Gateway<S, A, E>
where
    S: SharedStore,
    A: AnalyticsSink,
    E: Environment,
{
    /// Build a gateway over the given store/analytics/environment, with the
    /// ICE-server list sent to every newly connected client.
    pub fn new(store: S, analytics: A, env: E, ice_servers: Vec<IceServer>) -> Self {
        Self {
            matcher: Matcher::new(store, analytics),
            registry: Registry::new(),
            env,
            ice_servers: Arc::new(ice_servers),
        }
    }

    /// Accept connections on `bind_addr` until `shutdown` resolves, then
    /// drive the graceful-shutdown sequence: stop accepting, notify every
    /// paired client, close rooms, drain outboxes for up to 10s.
    pub async fn run(
        self,
        bind_addr: &str,
        shutdown: impl std::future::Future<Output = ()>,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(bind_addr).await?;
        info!(%bind_addr, "signaling server listening");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            warn!(error = %err, "accept failed");
                            continue;
                        },
                    };
                    let matcher = self.matcher.clone();
                    let registry = self.registry.clone();
                    let env = self.env.clone();
                    let ice_servers = Arc::clone(&self.ice_servers);
                    tokio::spawn(async move {
                        if let Err(err) =
                            handle_connection(stream, matcher, registry, env, ice_servers).await
                        {
                            debug!(%peer_addr, error = %err, "connection ended with error");
                        }
                    });
                },
                () = &mut shutdown => {
                    info!("shutdown signal received, no longer accepting connections");
                    break;
                },
            }
        }

        self.drain_paired_connections().await;
        Ok(())
    }

    /// Tell every connection the gateway still has registered that its
    /// partner disconnected, close its room, and give outboxes up to
    /// [`SHUTDOWN_DRAIN`] to flush before returning.
    async fn drain_paired_connections(&self) {
        let users = self.registry.registered_users().await;
        for user in users {
            if let Ok(Some(room)) = self.matcher.get_room_by_user(user).await {
                let _ = self.matcher.close_room(room.room_id).await;
            }
            let _ = self
                .registry
                .try_send(user, RouterSignal::Forward(ServerEvent::partner_disconnected()))
                .await;
        }
        tokio::time::sleep(SHUTDOWN_DRAIN).await;
    }
}

/// Assign a fresh connection id, register it, and drive its WebSocket loop
/// to completion. Unregisters and runs the disconnect transition exactly
/// once on the way out, regardless of how the loop ended.
async fn handle_connection<S, A, E>(
    stream: tokio::net::TcpStream,
    matcher: Matcher<S, A>,
    registry: Registry,
    env: E,
    ice_servers: Arc<Vec<IceServer>>,
) -> Result<(), crate::error::ServerError>
where
    S: SharedStore,
    A: AnalyticsSink,
    E: Environment,
{
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let user = UserId(env.random_u64());
    let (mut sink, mut stream) = ws.split();

    let (outbox_tx, mut outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
    registry.register(user, outbox_tx).await;
    debug!(%user, "connection accepted");

    let mut conn = Connection {
        user,
        session: SessionController::new(),
        matcher,
        registry: registry.clone(),
        env,
        skip_deadline: None,
    };

    conn.send(&mut sink, &SessionController::hello(ice_servers.as_ref().clone())).await?;

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await; // first tick fires immediately; consume it

    loop {
        let skip_sleep = async {
            match conn.skip_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            inbound = tokio::time::timeout(KEEPALIVE_TIMEOUT, stream.next()) => {
                let Ok(inbound) = inbound else {
                    debug!(%user, "keepalive timeout, disconnecting");
                    break;
                };
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        conn.handle_text(&mut sink, text.as_ref()).await?;
                    },
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {},
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%user, "client closed connection");
                        break;
                    },
                    Some(Ok(_unsupported)) => {
                        conn.send(&mut sink, &[SessionAction::Send(ServerEvent::error(
                            "only text frames are supported",
                        ))]).await?;
                    },
                    Some(Err(err)) => {
                        debug!(%user, error = %err, "websocket read error");
                        break;
                    },
                }
            },
            signal = outbox_rx.recv() => {
                match signal {
                    Some(RouterSignal::Forward(event)) => {
                        conn.send(&mut sink, &[SessionAction::Send(event)]).await?;
                    },
                    Some(RouterSignal::Matched { room_id, partner: _ }) => {
                        let actions = conn.session.on_match_outcome(MatchOutcome::Matched {
                            room_id,
                            is_initiator: false,
                        });
                        conn.send(&mut sink, &actions).await?;
                    },
                    None => break,
                }
            },
            () = skip_sleep => {
                conn.skip_deadline = None;
                let actions = conn.session.on_skip_timer_elapsed();
                conn.execute(&mut sink, actions).await?;
            },
            _ = ping_interval.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            },
        }
    }

    let actions = conn.session.disconnect();
    conn.execute(&mut sink, actions).await.ok();
    registry.unregister(user).await;
    debug!(%user, "connection closed");

    Ok(())
}

type WsSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    Message,
>;

/// Per-connection state the driving loop owns: the pure [`SessionController`]
/// plus the handles needed to turn its actions into I/O.
struct Connection<S, A, E> {
    user: UserId,
    session: SessionController,
    matcher: Matcher<S, A>,
    registry: Registry,
    env: E,
    /// Deadline for the cancellable skip-partner delay, if one is currently
    /// pending.
    skip_deadline: Option<tokio::time::Instant>,
}

impl<S, A, E> Connection<S, A, E>
where
    S: SharedStore,
    A: AnalyticsSink,
    E: Environment,
{
    /// Parse one inbound text frame and run it through the session state
    /// machine. Malformed JSON or a room-mismatch is a client-protocol
    /// error: reply with `error`, leave state untouched.
    async fn handle_text(
        &mut self,
        sink: &mut WsSink,
        text: &str,
    ) -> Result<(), crate::error::ServerError> {
        let event: ClientEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(err) => {
                self.send(sink, &[SessionAction::Send(ServerEvent::error(format!(
                    "malformed message: {err}"
                )))])
                .await?;
                return Ok(());
            },
        };

        let outcome = match event {
            ClientEvent::FindPartner => Ok(self.session.find_partner()),
            ClientEvent::LeaveChat => Ok(self.session.leave_chat()),
            ClientEvent::SkipPartner => Ok(self.session.skip_partner()),
            ClientEvent::Offer { offer, room_id } => self.session.offer(room_id, offer),
            ClientEvent::Answer { answer, room_id } => self.session.answer(room_id, answer),
            ClientEvent::IceCandidate { candidate, room_id } => {
                self.session.ice_candidate(room_id, candidate)
            },
        };

        match outcome {
            Ok(actions) => self.execute(sink, actions).await,
            Err(err) => {
                self.send(sink, &[SessionAction::Send(ServerEvent::error(protocol_message(err)))])
                    .await
            },
        }
    }

    /// Run a batch of [`SessionAction`]s to completion. Matcher calls can
    /// themselves produce further actions (e.g. `RequestFindPartner`
    /// resolving into a `Matched`/`Enqueued` outcome); those are appended to
    /// the same work queue rather than recursing, so one inbound event
    /// always finishes driving before the next is read.
    async fn execute(
        &mut self,
        sink: &mut WsSink,
        actions: Vec<SessionAction>,
    ) -> Result<(), crate::error::ServerError> {
        let mut queue: VecDeque<SessionAction> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                SessionAction::Send(event) => self.send_event(sink, &event).await?,
                SessionAction::ForwardToPeer { room_id, event } => {
                    self.forward_to_peer(room_id, event).await;
                },
                SessionAction::RequestFindPartner => {
                    queue.extend(self.request_find_partner().await);
                },
                SessionAction::RequestRemoveFromQueue => {
                    let _ = self.matcher.remove_from_queue(self.user).await;
                },
                SessionAction::RequestCloseRoom { room_id } => {
                    let _ = self.matcher.close_room(room_id).await;
                },
                SessionAction::ScheduleSkipTimer => {
                    self.skip_deadline = Some(tokio::time::Instant::now() + SKIP_DELAY);
                },
            }
        }
        Ok(())
    }

    async fn request_find_partner(&mut self) -> Vec<SessionAction> {
        match self.matcher.find_partner(self.user, &self.env).await {
            Ok(PairingOutcome::Enqueued { position }) => {
                self.session.on_match_outcome(MatchOutcome::Enqueued { position })
            },
            Ok(PairingOutcome::Matched { room_id, partner }) => {
                // Tell the dequeued partner's own session to fold in the
                // same room, non-initiator side.
                let outcome = self
                    .registry
                    .try_send(partner, RouterSignal::Matched { room_id, partner: self.user })
                    .await;
                if outcome != DeliveryOutcome::Delivered {
                    // The partner disconnected between dequeue and notify: the
                    // room was created but never had a live second side. Tear
                    // it down and report the caller's partner as gone rather
                    // than leave it Paired with a ghost.
                    warn!(%partner, ?outcome, "matched partner vanished before notification, unwinding room");
                    let _ = self.matcher.close_room(room_id).await;
                    return vec![SessionAction::Send(ServerEvent::partner_disconnected())];
                }
                self.session.on_match_outcome(MatchOutcome::Matched { room_id, is_initiator: true })
            },
            Err(_) => self.session.on_match_outcome(MatchOutcome::Failed),
        }
    }

    /// Resolve `room_id`'s peer and deliver `event` to it, applying the
    /// back-pressure policy: ICE candidates are best-effort and may be
    /// dropped; a dropped offer/answer is critical enough that we instead
    /// tear down our side of the room rather than silently losing it.
    async fn forward_to_peer(&mut self, room_id: RoomId, event: ServerEvent) {
        let peer = match self.matcher.get_peer(room_id, self.user).await {
            Ok(Some(peer)) => peer,
            Ok(None) => return, // peer already torn down; drop silently
            Err(_) => return,   // not a participant (shouldn't happen, session already checked)
        };

        let outcome = self.registry.try_send(peer, RouterSignal::Forward(event.clone())).await;
        if outcome == DeliveryOutcome::Full && is_critical(&event) {
            warn!(%peer, %room_id, "peer outbox full, abandoning room for a critical message");
            let _ = self.matcher.close_room(room_id).await;
        }
    }

    /// Serialize `event` and write it as a single text frame.
    async fn send_event(
        &self,
        sink: &mut WsSink,
        event: &ServerEvent,
    ) -> Result<(), crate::error::ServerError> {
        let text = serde_json::to_string(event)
            .map_err(|err| crate::error::ServerError::Protocol(err.to_string()))?;
        sink.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Write every [`SessionAction::Send`] in `actions`; any other action
    /// kind here is a programming error (callers that expect to run
    /// Matcher-touching actions go through [`Self::execute`] instead).
    async fn send(
        &self,
        sink: &mut WsSink,
        actions: &[SessionAction],
    ) -> Result<(), crate::error::ServerError> {
        for action in actions {
            if let SessionAction::Send(event) = action {
                self.send_event(sink, event).await?;
            }
        }
        Ok(())
    }
}

fn is_critical(event: &ServerEvent) -> bool {
    matches!(event, ServerEvent::Offer { .. } | ServerEvent::Answer { .. })
}

fn protocol_message(err: SessionError) -> String {
    match err {
        SessionError::NotPaired => "not currently in a chat".to_string(),
        SessionError::RoomMismatch { .. } => err.to_string(),
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::ServerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
