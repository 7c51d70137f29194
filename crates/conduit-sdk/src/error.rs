use thiserror::Error;

use crate::commerce::CommerceEventType;

#[derive(Debug, Error)]
pub enum Error {
    #[error("order must contain at least one item")]
    EmptyOrder,

    #[error("invalid order item: {0}")]
    InvalidItem(String),

    #[error("signer error: {0}")]
    Signer(String),

    #[error("event build error: {0}")]
    Builder(String),

    #[error("relay error: {0}")]
    Relay(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("order store lock poisoned")]
    LockPoisoned,

    #[error("persistence error: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why an inbound gift wrap was dropped.
///
/// Rejections never reach the UI. The subscription loop logs them and moves
/// on to the next event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("not a gift wrap (kind {0})")]
    NotGiftWrap(u16),

    #[error("gift wrap decryption failed: {0}")]
    WrapDecryption(String),

    #[error("malformed seal: {0}")]
    MalformedSeal(String),

    #[error("seal signature does not verify")]
    SealSignature,

    #[error("seal decryption failed: {0}")]
    SealDecryption(String),

    #[error("malformed rumor: {0}")]
    MalformedRumor(String),

    #[error("rumor author does not match seal signer")]
    SenderMismatch,

    #[error("unrecognized commerce message (kind {kind}, type {type_tag:?})")]
    Unrecognized {
        kind: u16,
        type_tag: Option<String>,
    },

    #[error("missing order tag")]
    MissingOrderTag,

    #[error("invalid {event_type} event: {reason}")]
    Invalid {
        event_type: CommerceEventType,
        reason: String,
    },
}
