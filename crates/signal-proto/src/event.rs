//! Client/server event vocabulary.
//!
//! Both directions use the same adjacently tagged envelope, `{"event":
//! "...", "data": {...}}`, matching the transport's JSON text-frame
//! encoding. SDP bodies (`offer`/`answer`) and ICE candidates are forwarded
//! verbatim as opaque JSON; the server never inspects their contents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::RoomId;

/// Events sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "find-partner")]
    FindPartner,

    #[serde(rename = "offer")]
    Offer {
        offer: Value,
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },

    #[serde(rename = "answer")]
    Answer {
        answer: Value,
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },

    #[serde(rename = "ice-candidate")]
    IceCandidate {
        candidate: Value,
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },

    #[serde(rename = "leave-chat")]
    LeaveChat,

    #[serde(rename = "skip-partner")]
    SkipPartner,
}

/// A single ICE/TURN server entry, as handed to `RTCPeerConnection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// STUN/TURN URLs for this entry (e.g. `stun:stun.example.com:19302`).
    pub urls: Vec<String>,
    /// TURN username, if this entry requires authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// TURN credential, if this entry requires authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Events sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "ice-servers")]
    IceServers(Vec<IceServer>),

    #[serde(rename = "waiting")]
    Waiting { message: String },

    #[serde(rename = "queue-update")]
    QueueUpdate { position: u64 },

    #[serde(rename = "matched")]
    Matched {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        #[serde(rename = "isInitiator")]
        is_initiator: bool,
    },

    #[serde(rename = "offer")]
    Offer { offer: Value },

    #[serde(rename = "answer")]
    Answer { answer: Value },

    #[serde(rename = "ice-candidate")]
    IceCandidate { candidate: Value },

    #[serde(rename = "partner-left")]
    PartnerLeft { message: String },

    #[serde(rename = "partner-disconnected")]
    PartnerDisconnected { message: String },

    #[serde(rename = "left-chat")]
    LeftChat { message: String },

    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    /// Build the `waiting` event sent the instant a caller is enqueued.
    #[must_use]
    pub fn waiting() -> Self {
        Self::Waiting { message: "waiting for a partner".to_string() }
    }

    /// Build the `partner-left` event sent to the remaining peer of a room
    /// whose other participant called `leave-chat`.
    #[must_use]
    pub fn partner_left() -> Self {
        Self::PartnerLeft { message: "your partner left the chat".to_string() }
    }

    /// Build the `partner-disconnected` event sent to the remaining peer of
    /// a room whose other participant's connection dropped.
    #[must_use]
    pub fn partner_disconnected() -> Self {
        Self::PartnerDisconnected { message: "your partner disconnected".to_string() }
    }

    /// Build the `left-chat` event sent back to a caller of `leave-chat`.
    #[must_use]
    pub fn left_chat() -> Self {
        Self::LeftChat { message: "you left the chat".to_string() }
    }

    /// Build an `error` event carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }
}
