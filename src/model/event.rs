use bytes::Bytes;

use crate::ErrorKind;
use crate::LeadershipToken;

/// Outcome reported to the subscriber. Authoritative: a call that returned
/// without error but with a non-OK status is not a live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    #[default]
    Ok,
    NotFound,
    PermissionDenied,
    InternalError,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        *self == Status::Ok
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::NotFound => "not_found",
            Status::PermissionDenied => "permission_denied",
            Status::InternalError => "internal_error",
        }
    }
}

impl From<ErrorKind> for Status {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NotFound | ErrorKind::Validation => Status::NotFound,
            ErrorKind::PermissionDenied => Status::PermissionDenied,
            ErrorKind::Internal | ErrorKind::Timeout => Status::InternalError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeEvent {
    /// Org-less channel `{scope}/{namespace}/{path}`
    pub channel: String,
    /// Part of the channel after the namespace
    pub path: String,
    /// Optional client-supplied subscribe payload
    pub data: Option<Bytes>,
    /// Set when the call was forwarded to this node as the channel's leader
    pub leader_token: Option<LeadershipToken>,
}

impl SubscribeEvent {
    pub fn new(
        channel: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            path: path.into(),
            data: None,
            leader_token: None,
        }
    }

    pub fn is_on_leader(&self) -> bool {
        self.leader_token.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishEvent {
    pub channel: String,
    pub path: String,
    /// Opaque payload, JSON by convention
    pub data: Bytes,
}

impl PublishEvent {
    pub fn new(
        channel: impl Into<String>,
        path: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            channel: channel.into(),
            path: path.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubscribeReply {
    /// Initial payload delivered with the subscription
    pub data: Option<Bytes>,
    /// Track subscriber presence on the channel
    pub presence: bool,
    /// Emit join/leave events to other subscribers
    pub join_leave: bool,
    /// Attach the last stored message before live updates
    pub recover: bool,
}

impl SubscribeReply {
    pub fn with_presence() -> Self {
        Self {
            presence: true,
            ..Default::default()
        }
    }

    pub fn with_presence_and_join_leave() -> Self {
        Self {
            presence: true,
            join_leave: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishReply {
    /// Payload to broadcast to the channel's subscribers, if any
    pub data: Option<Bytes>,
}

impl PublishReply {
    pub fn broadcast(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }
}
