//! Per-connection session state machine.
//!
//! `SessionController` is a pure state machine: it takes an event, mutates
//! its own `SessionState`, and returns the list of [`SessionAction`]s the
//! driver must carry out. It never touches the network, the shared store,
//! or the clock directly - all of those are driver-owned side effects. This
//! keeps the matching/pairing semantics unit-testable without a runtime.
//!
//! The three states mirror the data model's invariant that a client is at
//! every moment in exactly one of `{idle, queued, paired}`:
//!
//! ```text
//!           find-partner            matched
//!   ┌──────┐──────────────▶┌────────┐────────▶┌────────┐
//!   │ Idle │                │ Queued │          │ Paired │
//!   └──────┘◀───────────────└────────┘◀─────────└────────┘
//!       ▲     leave/disconnect            leave/skip/disconnect
//!       └──────────────────────────────────────────┘
//! ```

use serde_json::Value;
use signal_proto::{IceServer, RoomId, ServerEvent};

use crate::error::SessionError;

/// Where a session currently sits relative to the matching queue and room
/// registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not queued, not in a room.
    Idle,
    /// Waiting in the FIFO queue for a partner.
    Queued,
    /// Bound to a live room with exactly one peer.
    Paired {
        /// The room this session currently belongs to.
        room_id: RoomId,
    },
}

/// Outcome of a `FindPartner` attempt against the Matcher, fed back into the
/// state machine once the driver's (necessarily async) call to the shared
/// store completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// No partner was available; this session now occupies the queue.
    Enqueued {
        /// 1-based queue size after enqueuing, for `queue-update`.
        position: u64,
    },
    /// A partner was found (or this session *is* the partner another caller
    /// just dequeued) and a room now exists for the two of them.
    Matched {
        /// The newly created room.
        room_id: RoomId,
        /// Whether this session sends the first SDP offer.
        is_initiator: bool,
    },
    /// The Matcher call failed (store timeout, transport error, ...).
    Failed,
}

/// Side effects the driver must perform in response to an event.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Send this event to the client that owns this session.
    Send(ServerEvent),
    /// Relay `event` to whichever user is this session's peer in `room_id`.
    /// The driver resolves the peer via the Matcher's `GetPeer` and drops
    /// the message silently if no peer is found (the peer gone case).
    ForwardToPeer {
        /// Room the sender believes it shares with its peer.
        room_id: RoomId,
        /// The event to deliver, verbatim, to that peer.
        event: ServerEvent,
    },
    /// Ask the Matcher to run the pairing algorithm for this user. The
    /// result comes back through [`SessionController::on_match_outcome`].
    RequestFindPartner,
    /// Ask the Matcher to drop this user from the waiting queue.
    RequestRemoveFromQueue,
    /// Ask the Matcher to close this room (first mover wins; idempotent).
    RequestCloseRoom {
        /// Room to close.
        room_id: RoomId,
    },
    /// Start (or restart) the cancellable 500ms cooperative delay before a
    /// skip reissues `find-partner`. Cancelled implicitly if the driver
    /// observes a disconnect first.
    ScheduleSkipTimer,
}

/// The per-connection Session Controller.
///
/// One instance is owned by exactly one connection's driving task for the
/// connection's lifetime.
#[derive(Debug, Clone)]
pub struct SessionController {
    state: SessionState,
    /// Set while a skip's cooperative delay is pending, cleared once it
    /// fires or the session moves on for any other reason. Lets a stray,
    /// already-cancelled timer tick be ignored instead of double-firing
    /// `find-partner`.
    skip_pending: bool,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController {
    /// Create a new session in the [`SessionState::Idle`] state, as happens
    /// the instant a connection's transport handshake completes.
    #[must_use]
    pub fn new() -> Self {
        Self { state: SessionState::Idle, skip_pending: false }
    }

    /// Current state, for diagnostics and tests.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The ICE server list to send once, immediately after connecting.
    #[must_use]
    pub fn hello(ice_servers: Vec<IceServer>) -> Vec<SessionAction> {
        vec![SessionAction::Send(ServerEvent::IceServers(ice_servers))]
    }

    /// Client sent `find-partner`.
    pub fn find_partner(&mut self) -> Vec<SessionAction> {
        match self.state {
            SessionState::Idle => vec![SessionAction::RequestFindPartner],
            SessionState::Queued => vec![SessionAction::Send(ServerEvent::waiting())],
            SessionState::Paired { .. } => {
                vec![SessionAction::Send(ServerEvent::error("already in a chat"))]
            },
        }
    }

    /// The driver's `FindPartner` call against the Matcher completed;
    /// fold the result into state. Used both for the caller that issued
    /// `RequestFindPartner` and for the partner another caller dequeued
    /// (both resolve through the same `Matched` transition).
    pub fn on_match_outcome(&mut self, outcome: MatchOutcome) -> Vec<SessionAction> {
        match outcome {
            MatchOutcome::Enqueued { position } => {
                self.state = SessionState::Queued;
                vec![
                    SessionAction::Send(ServerEvent::waiting()),
                    SessionAction::Send(ServerEvent::QueueUpdate { position }),
                ]
            },
            MatchOutcome::Matched { room_id, is_initiator } => {
                self.state = SessionState::Paired { room_id };
                self.skip_pending = false;
                vec![SessionAction::Send(ServerEvent::Matched { room_id, is_initiator })]
            },
            MatchOutcome::Failed => {
                vec![SessionAction::Send(ServerEvent::error("failed to find a partner"))]
            },
        }
    }

    /// Client sent `leave-chat`.
    pub fn leave_chat(&mut self) -> Vec<SessionAction> {
        match self.state {
            SessionState::Paired { room_id } => {
                self.state = SessionState::Idle;
                self.skip_pending = false;
                vec![
                    SessionAction::ForwardToPeer {
                        room_id,
                        event: ServerEvent::partner_left(),
                    },
                    SessionAction::RequestCloseRoom { room_id },
                    SessionAction::Send(ServerEvent::left_chat()),
                ]
            },
            SessionState::Queued => {
                self.state = SessionState::Idle;
                vec![SessionAction::RequestRemoveFromQueue]
            },
            SessionState::Idle => vec![],
        }
    }

    /// Client sent `skip-partner`: leave the current room, then (after a
    /// cooperative delay the driver owns) automatically re-issue
    /// `find-partner`.
    pub fn skip_partner(&mut self) -> Vec<SessionAction> {
        match self.state {
            SessionState::Paired { .. } => {
                let mut actions = self.leave_chat();
                self.skip_pending = true;
                actions.push(SessionAction::ScheduleSkipTimer);
                actions
            },
            SessionState::Queued | SessionState::Idle => {
                vec![SessionAction::Send(ServerEvent::error("not currently in a chat"))]
            },
        }
    }

    /// The driver's cancellable skip delay elapsed without an intervening
    /// disconnect or new action. Issues the deferred `find-partner` unless
    /// the skip was since superseded (e.g. the delay raced a reconnect).
    pub fn on_skip_timer_elapsed(&mut self) -> Vec<SessionAction> {
        if !self.skip_pending {
            return vec![];
        }
        self.skip_pending = false;
        self.find_partner()
    }

    /// Client sent `offer`/`answer`/`ice-candidate` for `room_id`. Validates
    /// that the session is actually paired in that room before forwarding;
    /// the driver is responsible for resolving and delivering to the peer
    /// (and dropping silently if the peer has gone).
    pub fn relay(
        &self,
        room_id: RoomId,
        event: ServerEvent,
    ) -> Result<Vec<SessionAction>, SessionError> {
        match self.state {
            SessionState::Paired { room_id: active } if active == room_id => {
                Ok(vec![SessionAction::ForwardToPeer { room_id, event }])
            },
            SessionState::Paired { room_id: active } => {
                Err(SessionError::RoomMismatch { given: room_id, actual: active })
            },
            SessionState::Idle | SessionState::Queued => Err(SessionError::NotPaired),
        }
    }

    /// Client's offer: `{offer, roomId}`.
    pub fn offer(&self, room_id: RoomId, offer: Value) -> Result<Vec<SessionAction>, SessionError> {
        self.relay(room_id, ServerEvent::Offer { offer })
    }

    /// Client's answer: `{answer, roomId}`.
    pub fn answer(
        &self,
        room_id: RoomId,
        answer: Value,
    ) -> Result<Vec<SessionAction>, SessionError> {
        self.relay(room_id, ServerEvent::Answer { answer })
    }

    /// Client's ICE candidate: `{candidate, roomId}`.
    pub fn ice_candidate(
        &self,
        room_id: RoomId,
        candidate: Value,
    ) -> Result<Vec<SessionAction>, SessionError> {
        self.relay(room_id, ServerEvent::IceCandidate { candidate })
    }

    /// The connection dropped. Idempotent: calling this after an already
    /// completed `leave-chat` (state already `Idle`) is a no-op, satisfying
    /// the "disconnect exactly once, idempotent w.r.t. completed leave"
    /// requirement.
    pub fn disconnect(&mut self) -> Vec<SessionAction> {
        self.skip_pending = false;
        match self.state {
            SessionState::Paired { room_id } => {
                self.state = SessionState::Idle;
                vec![
                    SessionAction::ForwardToPeer {
                        room_id,
                        event: ServerEvent::partner_disconnected(),
                    },
                    SessionAction::RequestCloseRoom { room_id },
                ]
            },
            SessionState::Queued => {
                self.state = SessionState::Idle;
                vec![SessionAction::RequestRemoveFromQueue]
            },
            SessionState::Idle => vec![],
        }
    }
}
