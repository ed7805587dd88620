// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Message envelope passed between participants.
//!
//! A [`Message`] is the unit handed to the transport: a typed, session-bound
//! blob from one participant to another. Contents are opaque bytes; each
//! protocol round deserializes and validates its own content type, which is
//! why the payload field is called `unverified_bytes`.

use crate::{
    errors::{CallerError, Result},
    protocol::{Identifier, ParticipantIdentifier},
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// The type of a keygen / refresh protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeygenMessageType {
    /// Signal that the participant may start the protocol.
    Ready,
    /// Round 1: hash commitment to all sampled public material.
    R1CommitHash,
    /// Round 2: opening of the round-1 commitment.
    R2Decommit,
    /// Round 3: Paillier–Blum and ring-Pedersen proofs.
    R3Proofs,
    /// Round 3: encrypted polynomial evaluation for one recipient.
    R3PrivateShare,
    /// Round 4: Schnorr response for the new key share.
    R4SchnorrResponse,
}

/// The type of a signing protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignMessageType {
    /// Signal that the participant may start the protocol.
    Ready,
    /// Round 1: echo-broadcast nonce ciphertexts `K`, `G`.
    R1Broadcast,
    /// Round 1: per-verifier range proof on `K`.
    R1RangeProof,
    /// Round 2: MtA ciphertexts and affine proofs for one recipient.
    R2MtA,
    /// Round 3: delta share, `Delta` point, and its discrete-log proof.
    R3DeltaShare,
    /// Round 4: partial signature.
    R4SigShare,
    /// Abort path: opened nonces and MtA masks for blame assignment.
    R5Blame,
}

/// The type of an echo-broadcast subprotocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastMessageType {
    /// The original message from the broadcasting party.
    Disperse,
    /// A re-broadcast of a received message, used as a consistency vote.
    Redisperse,
}

/// The type of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    /// Keygen / refresh protocol message.
    Keygen(KeygenMessageType),
    /// Signing protocol message.
    Sign(SignMessageType),
    /// Echo-broadcast subprotocol message.
    Broadcast(BroadcastMessageType),
}

/// A message carried between participants of a protocol session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    message_type: MessageType,
    /// The session this message belongs to.
    identifier: Identifier,
    from: ParticipantIdentifier,
    to: ParticipantIdentifier,
    /// Payload bytes. Unvalidated until the receiving round deserializes
    /// and checks them.
    pub(crate) unverified_bytes: Vec<u8>,
}

impl Message {
    /// Create a new message with the given serializable content.
    pub(crate) fn new<T: Serialize>(
        message_type: MessageType,
        identifier: Identifier,
        from: ParticipantIdentifier,
        to: ParticipantIdentifier,
        content: &T,
    ) -> Result<Self> {
        Ok(Self {
            message_type,
            identifier,
            from,
            to,
            unverified_bytes: serialize!(content)?,
        })
    }

    /// Create a message from already-serialized content bytes.
    ///
    /// Used by the echo-broadcast layer to reconstruct the host-protocol
    /// message from an agreed broadcast payload.
    pub(crate) fn new_raw(
        message_type: MessageType,
        identifier: Identifier,
        from: ParticipantIdentifier,
        to: ParticipantIdentifier,
        unverified_bytes: Vec<u8>,
    ) -> Self {
        Self {
            message_type,
            identifier,
            from,
            to,
            unverified_bytes,
        }
    }

    /// The message type.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// The session identifier of the message.
    pub fn id(&self) -> Identifier {
        self.identifier
    }

    /// The sending party.
    pub fn from(&self) -> ParticipantIdentifier {
        self.from
    }

    /// The receiving party.
    pub fn to(&self) -> ParticipantIdentifier {
        self.to
    }

    /// Check that the message has the expected type.
    pub(crate) fn check_type(&self, expected: MessageType) -> Result<()> {
        if self.message_type != expected {
            error!(
                "expected message of type {:?}, got {:?}",
                expected, self.message_type
            );
            return Err(CallerError::WrongMessageType.into());
        }
        Ok(())
    }

    /// Encode the message for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serialize!(self)
    }

    /// Decode a message from the wire.
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self> {
        deserialize!(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn message_wire_round_trip() {
        let mut rng = init_testing();
        let sid = Identifier::random(&mut rng);
        let from = ParticipantIdentifier::random(&mut rng);
        let to = ParticipantIdentifier::random(&mut rng);
        let message = Message::new(
            MessageType::Keygen(KeygenMessageType::Ready),
            sid,
            from,
            to,
            &[1u8, 2, 3],
        )
        .unwrap();

        let bytes = message.to_bytes().unwrap();
        let recovered = Message::try_from_bytes(&bytes).unwrap();
        assert_eq!(recovered.message_type(), message.message_type());
        assert_eq!(recovered.id(), sid);
        assert_eq!(recovered.from(), from);
        assert_eq!(recovered.to(), to);
        assert_eq!(recovered.unverified_bytes, message.unverified_bytes);
    }

    #[test]
    fn check_type_rejects_mismatch() {
        let mut rng = init_testing();
        let sid = Identifier::random(&mut rng);
        let pid = ParticipantIdentifier::random(&mut rng);
        let message = Message::new(
            MessageType::Sign(SignMessageType::Ready),
            sid,
            pid,
            pid,
            &(),
        )
        .unwrap();
        assert!(message
            .check_type(MessageType::Sign(SignMessageType::R4SigShare))
            .is_err());
        assert!(message
            .check_type(MessageType::Sign(SignMessageType::Ready))
            .is_ok());
    }
}
