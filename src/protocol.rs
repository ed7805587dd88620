// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Session and participant identity types, plus the [`Participant`] driver
//! that applications use to run a protocol session.

use crate::{
    curve::CurvePoint,
    errors::{CallerError, Fault, InternalError, Result, Violation},
    messages::Message,
    participant::{ProcessOutcome, ProtocolParticipant, Status},
    zkp::ProofContext,
};
use k256::elliptic_curve::{bigint::Encoding, Curve};
use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt::{Display, Formatter},
};
use tracing::{error, info, instrument};

/// A unique identifier for a protocol session.
///
/// Two messages with different identifiers never interact; a participant
/// fed a message from another session rejects it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Identifier(u128);

impl Identifier {
    /// Produce a random session identifier.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(rng.gen())
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id({:08x})", (self.0 >> 96) as u32)
    }
}

/// A unique identifier for a protocol participant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ParticipantIdentifier(u128);

impl ParticipantIdentifier {
    /// Produce a random participant identifier.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(rng.gen())
    }

    /// Build an identifier from a fixed value.
    pub fn from_u128(value: u128) -> Self {
        Self(value)
    }

    /// The raw identifier value.
    pub(crate) fn as_u128(&self) -> u128 {
        self.0
    }
}

impl Display for ParticipantIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Party({:08x})", (self.0 >> 96) as u32)
    }
}

/// The protocols this crate implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolType {
    /// Distributed key generation / refresh.
    Keygen,
    /// Interactive signing.
    Sign,
    /// The echo-broadcast subprotocol.
    Broadcast,
}

impl ProtocolType {
    /// The version tag bound into every transcript of the protocol.
    ///
    /// Changing a protocol's wire behavior must change its tag; sessions
    /// running different tags cannot produce mutually valid proofs.
    pub(crate) fn version_tag(&self) -> &'static [u8] {
        match self {
            ProtocolType::Keygen => b"cmp/keygen-threshold",
            ProtocolType::Sign => b"cmp/sign-3-round-echo",
            ProtocolType::Broadcast => b"cmp/echo-broadcast",
        }
    }
}

/// The identity of a participant and its peers for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantConfig {
    id: ParticipantIdentifier,
    other_ids: Vec<ParticipantIdentifier>,
}

impl ParticipantConfig {
    /// Build a config for the party `id` with the given peers.
    ///
    /// Fails if any participant identifier appears twice.
    pub fn new(id: ParticipantIdentifier, other_ids: &[ParticipantIdentifier]) -> Result<Self> {
        let mut all = other_ids.to_vec();
        all.push(id);
        all.sort();
        all.dedup();
        if all.len() != other_ids.len() + 1 {
            error!("participant identifiers must be distinct");
            Err(CallerError::BadInput)?;
        }
        Ok(Self {
            id,
            other_ids: other_ids.to_vec(),
        })
    }

    /// This party's identifier.
    pub fn id(&self) -> ParticipantIdentifier {
        self.id
    }

    /// The other parties' identifiers.
    pub fn other_ids(&self) -> &[ParticipantIdentifier] {
        &self.other_ids
    }

    /// The total number of participants.
    pub fn count(&self) -> usize {
        self.other_ids.len() + 1
    }

    /// All participant identifiers, sorted.
    pub fn all_participants(&self) -> Vec<ParticipantIdentifier> {
        let mut all = self.other_ids.clone();
        all.push(self.id);
        all.sort();
        all
    }

    /// Produce a set of configs for a random quorum of the given size, one
    /// per party.
    pub fn random_quorum<R: RngCore + CryptoRng>(
        quorum_size: usize,
        rng: &mut R,
    ) -> Result<Vec<Self>> {
        if quorum_size < 2 {
            error!("a quorum requires at least two participants");
            Err(CallerError::BadInput)?;
        }
        let ids = std::iter::repeat_with(|| ParticipantIdentifier::random(rng))
            .take(quorum_size)
            .collect::<Vec<_>>();
        ids.iter()
            .map(|&id| {
                let others = ids.iter().copied().filter(|&other| other != id).collect::<Vec<_>>();
                Self::new(id, &others)
            })
            .collect()
    }
}

/// Session-wide public context bound into every Fiat–Shamir transcript.
///
/// Binding the protocol version tag, session identifier, participant set,
/// and curve parameters means a proof generated in one session cannot be
/// replayed in any other.
#[derive(Debug, Clone)]
pub struct SharedContext {
    protocol: ProtocolType,
    sid: Identifier,
    participants: Vec<ParticipantIdentifier>,
    generator: CurvePoint,
    order: Vec<u8>,
}

impl SharedContext {
    /// Gather the shared context of a running participant.
    pub(crate) fn collect<P: ProtocolParticipant>(p: &P) -> Self {
        let mut participants = p.all_participants();
        participants.sort();
        Self {
            protocol: P::protocol_type(),
            sid: p.sid(),
            participants,
            generator: CurvePoint::GENERATOR,
            order: k256::Secp256k1::ORDER.to_be_bytes().to_vec(),
        }
    }

    /// A random context for proof unit tests.
    #[cfg(test)]
    pub(crate) fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let participants = (0..3).map(|_| ParticipantIdentifier::random(rng)).collect();
        Self {
            protocol: ProtocolType::Keygen,
            sid: Identifier::random(rng),
            participants,
            generator: CurvePoint::GENERATOR,
            order: k256::Secp256k1::ORDER.to_be_bytes().to_vec(),
        }
    }
}

impl ProofContext for SharedContext {
    fn as_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = self.protocol.version_tag().to_vec();
        bytes.extend(serialize!(&self.sid)?);
        bytes.extend(serialize!(&self.participants)?);
        bytes.extend(self.generator.to_bytes());
        bytes.extend(&self.order);
        Ok(bytes)
    }
}

/// A driver for one participant of one protocol session.
///
/// This is a convenience wrapper over [`ProtocolParticipant`] that checks
/// session identifiers, tracks which peers have been heard from (for
/// timeout attribution), and supports cancellation.
#[derive(Debug)]
pub struct Participant<P: ProtocolParticipant> {
    participant: P,
    sid: Identifier,
    heard_from: HashSet<ParticipantIdentifier>,
    cancelled: bool,
}

impl<P: ProtocolParticipant> Participant<P> {
    /// Create a participant for a new session.
    pub fn new(
        sid: Identifier,
        id: ParticipantIdentifier,
        other_ids: Vec<ParticipantIdentifier>,
        input: P::Input,
    ) -> Result<Self> {
        Ok(Self {
            participant: P::new(sid, id, other_ids, input)?,
            sid,
            heard_from: HashSet::new(),
            cancelled: false,
        })
    }

    /// Create a participant from a [`ParticipantConfig`].
    pub fn from_config(config: ParticipantConfig, sid: Identifier, input: P::Input) -> Result<Self> {
        Self::new(sid, config.id(), config.other_ids().to_vec(), input)
    }

    /// This participant's identifier.
    pub fn id(&self) -> ParticipantIdentifier {
        self.participant.id()
    }

    /// The session identifier.
    pub fn sid(&self) -> Identifier {
        self.sid
    }

    /// The message that starts this participant's protocol execution.
    ///
    /// The caller delivers it like any inbound message.
    pub fn initialize_message(&self) -> Result<Message> {
        let empty: [u8; 0] = [];
        Message::new(
            P::ready_type(),
            self.sid,
            self.participant.id(),
            self.participant.id(),
            &empty,
        )
    }

    /// Process one inbound message, returning the protocol output (when the
    /// session completed) and any outbound messages to deliver.
    #[instrument(skip_all, err(Debug))]
    pub fn process_single_message<R: RngCore + CryptoRng>(
        &mut self,
        message: &Message,
        rng: &mut R,
    ) -> Result<(Option<P::Output>, Vec<Message>)> {
        if self.cancelled {
            return Err(InternalError::unattributed(Fault::Cancelled));
        }
        if message.id() != self.sid {
            error!(
                "message for session {} delivered to session {}",
                message.id(),
                self.sid
            );
            Err(CallerError::WrongSessionIdentifier)?;
        }
        if message.to() != self.participant.id() {
            error!("message for {} delivered to {}", message.to(), self.id());
            Err(CallerError::BadInput)?;
        }
        let outcome = self.participant.process_message(rng, message)?;
        let _ = self.heard_from.insert(message.from());
        Ok(outcome.into_parts())
    }

    /// Cancel the session. Every subsequent call fails with
    /// [`Fault::Cancelled`].
    pub fn cancel(&mut self) {
        info!("session {} cancelled", self.sid);
        self.cancelled = true;
    }

    /// Declare the round time budget expired.
    ///
    /// Returns the error the caller should report: a timeout naming the
    /// parties not heard from in this session so far.
    pub fn elapse_timeout(&self) -> InternalError {
        let laggards = self
            .participant
            .other_ids()
            .iter()
            .copied()
            .filter(|pid| !self.heard_from.contains(pid))
            .collect::<Vec<_>>();
        InternalError::ProtocolError(Violation::blame_all(laggards, Fault::Timeout))
    }

    /// The participant's protocol status.
    pub fn status(&self) -> &Status {
        self.participant.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_config_rejects_duplicates() {
        let a = ParticipantIdentifier::from_u128(1);
        let b = ParticipantIdentifier::from_u128(2);
        assert!(ParticipantConfig::new(a, &[b, b]).is_err());
        assert!(ParticipantConfig::new(a, &[a]).is_err());
        assert!(ParticipantConfig::new(a, &[b]).is_ok());
    }

    #[test]
    fn random_quorum_configs_are_consistent() {
        let mut rng = crate::utils::testing::init_testing();
        let configs = ParticipantConfig::random_quorum(4, &mut rng).unwrap();
        assert_eq!(configs.len(), 4);
        let all = configs[0].all_participants();
        for config in &configs {
            assert_eq!(config.count(), 4);
            assert_eq!(config.all_participants(), all);
        }
    }

    #[test]
    fn driver_times_out_on_laggards_and_cancels() {
        use crate::{keygen, pool::Pool, KeygenParticipant};

        let mut rng = crate::utils::testing::init_testing();
        let sid = Identifier::random(&mut rng);
        let configs = ParticipantConfig::random_quorum(3, &mut rng).unwrap();
        let config = configs[0].clone();
        let laggards = config.other_ids().to_vec();

        let input = keygen::Input::new(1, Pool::serial()).unwrap();
        let mut driver: Participant<KeygenParticipant> =
            Participant::from_config(config, sid, input).unwrap();

        // Messages for other sessions or parties are refused.
        let ready = driver.initialize_message().unwrap();
        let other_sid = Identifier::random(&mut rng);
        let misdirected = Message::new_raw(
            ready.message_type(),
            other_sid,
            driver.id(),
            driver.id(),
            Vec::new(),
        );
        assert!(driver
            .process_single_message(&misdirected, &mut rng)
            .is_err());

        // Start the session; nobody else speaks up.
        let (output, messages) = driver.process_single_message(&ready, &mut rng).unwrap();
        assert!(output.is_none());
        assert!(!messages.is_empty());

        // Timing out blames exactly the parties not heard from.
        let timeout = driver.elapse_timeout();
        let violation = timeout.violation().unwrap();
        assert_eq!(violation.fault(), Fault::Timeout);
        let mut expected = laggards;
        expected.sort();
        assert_eq!(violation.culprits(), expected.as_slice());

        // After cancellation the session refuses further messages.
        driver.cancel();
        let err = driver
            .process_single_message(&ready, &mut rng)
            .unwrap_err();
        assert_eq!(err.violation().unwrap().fault(), Fault::Cancelled);
    }
}
