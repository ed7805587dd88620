// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Echo broadcast over point-to-point channels.
//!
//! The transport only provides authenticated point-to-point delivery, so a
//! malicious party could send different "broadcast" values to different
//! peers. Rounds that require a consistent view run their broadcast through
//! this subprotocol: the leader disperses its value to everyone, every
//! receiver re-disperses what it saw, and a value is only accepted once all
//! views agree. A disagreement aborts the session with
//! [`Fault::EchoInconsistent`](crate::errors::Fault) and an empty culprit
//! set — either side of a conflicting pair may be the liar.

mod participant;

pub(crate) use participant::BroadcastParticipant;

use crate::{
    errors::{CallerError, Result},
    messages::{Message, MessageType},
    protocol::ParticipantIdentifier,
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Distinguishes concurrent broadcasts within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(crate) enum BroadcastTag {
    /// Keygen round 1 commitment hash.
    KeygenR1CommitHash,
    /// Sign round 1 nonce ciphertexts.
    SignR1Nonces,
}

/// The payload relayed by the echo-broadcast subprotocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct BroadcastData {
    /// The party whose broadcast this is.
    pub(crate) leader: ParticipantIdentifier,
    pub(crate) tag: BroadcastTag,
    /// The host-protocol type of the broadcast message.
    pub(crate) message_type: MessageType,
    pub(crate) data: Vec<u8>,
}

/// An agreed-upon broadcast, ready for the host protocol.
#[derive(Debug)]
pub(crate) struct BroadcastOutput {
    tag: BroadcastTag,
    message: Message,
}

impl BroadcastOutput {
    pub(crate) fn new(tag: BroadcastTag, message: Message) -> Self {
        Self { tag, message }
    }

    /// Unwrap the host-protocol message, checking the broadcast tag.
    pub(crate) fn into_message(self, expected_tag: BroadcastTag) -> Result<Message> {
        if self.tag != expected_tag {
            error!(
                "expected broadcast tagged {:?}, got {:?}",
                expected_tag, self.tag
            );
            Err(CallerError::WrongMessageType)?;
        }
        Ok(self.message)
    }
}

impl BroadcastData {
    pub(crate) fn from_message(message: &Message) -> Result<Self> {
        match message.message_type() {
            MessageType::Broadcast(_) => {}
            _ => {
                error!("non-broadcast message routed to the broadcast subprotocol");
                return Err(CallerError::WrongMessageType.into());
            }
        }
        let data: BroadcastData = deserialize!(&message.unverified_bytes)?;
        Ok(data)
    }
}
