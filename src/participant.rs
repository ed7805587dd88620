// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The generic round engine.
//!
//! Every protocol in this crate is implemented as a [`ProtocolParticipant`]:
//! a state machine advanced exclusively by [`process_message`]
//! (ProtocolParticipant::process_message). The engine contract is:
//!
//! - Inbound messages are dispatched by type to a round handler, which
//!   deserializes and cryptographically verifies the content (attributing
//!   failures to the sender), then stores it in typed [`LocalStorage`].
//! - Message arrival order within a round is immaterial; messages for
//!   future rounds are stashed and replayed at the round boundary.
//! - When the last expected message of a round arrives, the participant
//!   produces the next round's outbound messages exactly once
//!   (`run_only_once!`).
//! - The session ends with [`ProcessOutcome::Terminated`] or an error
//!   carrying a culprit set.

use crate::{
    broadcast::{BroadcastOutput, BroadcastParticipant, BroadcastTag},
    errors::{CallerError, Fault, InternalError, Result},
    local_storage::{LocalStorage, TypeTag},
    message_queue::MessageQueue,
    messages::{Message, MessageType},
    protocol::{Identifier, ParticipantIdentifier, ProtocolType},
    zkp::ProofContext,
};
use rand::{CryptoRng, RngCore};
use serde::Serialize;
use tracing::error;

/// The externally visible state of a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// The participant has not received its ready signal yet.
    NotReady,
    /// The participant is processing protocol rounds.
    Running,
    /// The participant produced its output; no further messages are
    /// accepted.
    TerminatedSuccessfully,
    /// The participant completed its role in echo broadcast for the listed
    /// parties. Only used by the broadcast subprotocol.
    ParticipantCompletedBroadcast(Vec<ParticipantIdentifier>),
}

impl Status {
    /// Whether the participant is past its ready signal.
    pub fn is_ready(&self) -> bool {
        !matches!(self, Status::NotReady)
    }
}

/// The result of processing one message.
#[derive(Debug)]
pub enum ProcessOutcome<O> {
    /// The session needs more messages to make progress.
    Incomplete,
    /// Progress was made; deliver these messages.
    Processed(Vec<Message>),
    /// The session completed with an output.
    Terminated(O),
    /// The session completed for this participant, which still owes
    /// messages to its peers.
    TerminatedForThisParticipant(O, Vec<Message>),
}

impl<O> ProcessOutcome<O> {
    /// Split the outcome into an optional output and outbound messages.
    pub fn into_parts(self) -> (Option<O>, Vec<Message>) {
        match self {
            ProcessOutcome::Incomplete => (None, Vec::new()),
            ProcessOutcome::Processed(messages) => (None, messages),
            ProcessOutcome::Terminated(output) => (Some(output), Vec::new()),
            ProcessOutcome::TerminatedForThisParticipant(output, messages) => {
                (Some(output), messages)
            }
        }
    }

    /// Build an outcome from its parts.
    fn from_parts(output: Option<O>, messages: Vec<Message>) -> Self {
        match (output, messages.is_empty()) {
            (None, true) => ProcessOutcome::Incomplete,
            (None, false) => ProcessOutcome::Processed(messages),
            (Some(output), true) => ProcessOutcome::Terminated(output),
            (Some(output), false) => {
                ProcessOutcome::TerminatedForThisParticipant(output, messages)
            }
        }
    }

    /// Attach additional outbound messages to this outcome.
    pub(crate) fn with_messages(self, mut messages: Vec<Message>) -> Self {
        let (output, mut existing) = self.into_parts();
        existing.append(&mut messages);
        Self::from_parts(output, existing)
    }

    /// Merge this outcome with a batch of others.
    ///
    /// At most one of the outcomes may carry an output; two outputs for a
    /// single participant indicate an engine bug.
    pub(crate) fn consolidate(self, others: Vec<Self>) -> Result<Self> {
        let mut output = None;
        let mut messages = Vec::new();
        for outcome in std::iter::once(self).chain(others) {
            let (out, mut msgs) = outcome.into_parts();
            if out.is_some() {
                if output.is_some() {
                    error!("a participant produced two outputs for one session");
                    return Err(InternalError::InternalInvariantFailed);
                }
                output = out;
            }
            messages.append(&mut msgs);
        }
        Ok(Self::from_parts(output, messages))
    }

    /// Merge a batch of outcomes and attach additional messages.
    pub(crate) fn collect_with_messages(
        outcomes: Vec<Self>,
        messages: Vec<Message>,
    ) -> Result<Self> {
        ProcessOutcome::Incomplete
            .consolidate(outcomes)
            .map(|outcome| outcome.with_messages(messages))
    }
}

impl ProcessOutcome<BroadcastOutput> {
    /// Convert a broadcast-subprotocol outcome into a host-protocol outcome
    /// by running `handler` on the agreed broadcast, if one was reached.
    ///
    /// Echo messages produced by the subprotocol are carried through.
    pub(crate) fn convert<P, R, F>(
        self,
        participant: &mut P,
        handler: F,
        rng: &mut R,
    ) -> Result<ProcessOutcome<P::Output>>
    where
        P: ProtocolParticipant,
        R: RngCore + CryptoRng,
        F: FnOnce(&mut P, &mut R, BroadcastOutput) -> Result<ProcessOutcome<P::Output>>,
    {
        let (agreed, echo_messages) = self.into_parts();
        let outcome = match agreed {
            Some(broadcast_output) => handler(participant, rng, broadcast_output)?,
            None => ProcessOutcome::Incomplete,
        };
        Ok(outcome.with_messages(echo_messages))
    }
}

/// A party in an interactive protocol session.
pub trait ProtocolParticipant: Sized {
    /// Input needed to begin the protocol.
    type Input;
    /// Output produced by a successful session.
    type Output;

    /// Create a participant for a new session.
    fn new(
        sid: Identifier,
        id: ParticipantIdentifier,
        other_participant_ids: Vec<ParticipantIdentifier>,
        input: Self::Input,
    ) -> Result<Self>;

    /// The message type that signals this participant to start.
    fn ready_type() -> MessageType;

    /// The protocol this participant runs.
    fn protocol_type() -> ProtocolType;

    /// This participant's identifier.
    fn id(&self) -> ParticipantIdentifier;

    /// The other participants' identifiers.
    fn other_ids(&self) -> &[ParticipantIdentifier];

    /// All participant identifiers, sorted.
    fn all_participants(&self) -> Vec<ParticipantIdentifier> {
        let mut all = self.other_ids().to_vec();
        all.push(self.id());
        all.sort();
        all
    }

    /// The session identifier.
    fn sid(&self) -> Identifier;

    /// Process one inbound message.
    fn process_message<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<Self::Output>>;

    /// The participant's current status.
    fn status(&self) -> &Status;
}

mod storage {
    use super::*;

    pub(super) struct Stash;
    impl TypeTag for Stash {
        type Value = MessageQueue;
    }
}

/// Internal machinery shared by every participant implementation.
pub(crate) trait InnerProtocolParticipant: ProtocolParticipant {
    /// The context bound into this protocol's proof transcripts.
    type Context: ProofContext;

    /// Gather the proof context of this session.
    fn retrieve_context(&self) -> Self::Context;

    /// The participant's typed round storage.
    fn local_storage(&self) -> &LocalStorage;

    /// The participant's typed round storage, mutably.
    fn local_storage_mut(&mut self) -> &mut LocalStorage;

    /// The participant's status, mutably.
    fn status_mut(&mut self) -> &mut Status;

    /// Handle the ready signal: mark the participant running.
    ///
    /// The ready message must be the self-addressed message produced by
    /// [`Participant::initialize_message`](crate::protocol::Participant::initialize_message).
    fn process_ready_message(&mut self, message: &Message) -> Result<ProcessOutcome<Self::Output>> {
        message.check_type(Self::ready_type())?;
        if message.from() != self.id() {
            error!("ready signals are self-addressed; got one from {}", message.from());
            Err(CallerError::BadInput)?;
        }
        *self.status_mut() = Status::Running;
        Ok(ProcessOutcome::Incomplete)
    }

    /// Stash a message that arrived before its round.
    fn stash_message(&mut self, message: &Message) -> Result<()> {
        let id = self.id();
        if !self.local_storage().contains::<storage::Stash>(id) {
            self.local_storage_mut()
                .store::<storage::Stash>(id, MessageQueue::default());
        }
        self.local_storage_mut()
            .retrieve_mut::<storage::Stash>(id)?
            .store(message.clone());
        Ok(())
    }

    /// Drain all stashed messages of the given type.
    fn fetch_messages(&mut self, message_type: MessageType) -> Result<Vec<Message>> {
        let id = self.id();
        if !self.local_storage().contains::<storage::Stash>(id) {
            return Ok(Vec::new());
        }
        Ok(self
            .local_storage_mut()
            .retrieve_mut::<storage::Stash>(id)?
            .retrieve_all(message_type))
    }

    /// Fail if a message of this round was already received from `from`.
    ///
    /// Duplicates are protocol violations: an honest party sends each round
    /// message once.
    fn check_for_duplicate_msg<T: TypeTag>(&self, from: ParticipantIdentifier) -> Result<()> {
        if self.local_storage().contains::<T>(from) {
            error!("{from} sent a duplicate round message");
            return Err(InternalError::blame(from, Fault::ProtocolViolation));
        }
        Ok(())
    }

    /// Build one copy of a message for every other participant.
    fn message_for_other_participants<T: Serialize>(
        &self,
        message_type: MessageType,
        data: T,
    ) -> Result<Vec<Message>> {
        self.other_ids()
            .iter()
            .map(|&other| Message::new(message_type, self.sid(), self.id(), other, &data))
            .collect()
    }
}

/// Access to the nested echo-broadcast subprotocol.
pub(crate) trait Broadcast: InnerProtocolParticipant {
    /// The nested broadcast participant.
    fn broadcast_participant(&mut self) -> &mut BroadcastParticipant;

    /// Echo-broadcast serialized `data` to every participant.
    fn broadcast<T: Serialize>(
        &mut self,
        message_type: MessageType,
        data: &T,
        sid: Identifier,
        tag: BroadcastTag,
    ) -> Result<Vec<Message>> {
        let bytes = serialize!(data)?;
        self.broadcast_participant()
            .gen_broadcast(message_type, bytes, sid, tag)
    }

    /// Feed a broadcast-subprotocol message to the nested participant.
    fn handle_broadcast(&mut self, message: &Message) -> Result<ProcessOutcome<BroadcastOutput>> {
        self.broadcast_participant().process_message(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_parts_round_trip() {
        let outcome: ProcessOutcome<u8> = ProcessOutcome::Incomplete;
        let (output, messages) = outcome.into_parts();
        assert!(output.is_none());
        assert!(messages.is_empty());

        let outcome = ProcessOutcome::Terminated(7u8);
        let (output, messages) = outcome.into_parts();
        assert_eq!(output, Some(7));
        assert!(messages.is_empty());
    }

    #[test]
    fn consolidate_rejects_two_outputs() {
        let a = ProcessOutcome::Terminated(1u8);
        let b = ProcessOutcome::Terminated(2u8);
        assert!(a.consolidate(vec![b]).is_err());

        let a = ProcessOutcome::Terminated(1u8);
        let b = ProcessOutcome::Incomplete;
        let (output, messages) = a.consolidate(vec![b]).unwrap().into_parts();
        assert_eq!(output, Some(1));
        assert!(messages.is_empty());
    }
}
