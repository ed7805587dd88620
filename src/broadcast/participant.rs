// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The participant state of the echo-broadcast subprotocol.

use crate::{
    broadcast::{BroadcastData, BroadcastOutput, BroadcastTag},
    errors::{Fault, InternalError, Result},
    messages::{BroadcastMessageType, Message, MessageType},
    participant::{ProcessOutcome, Status},
    protocol::{Identifier, ParticipantIdentifier},
};
use std::collections::HashMap;
use tracing::{error, info, instrument};

/// Echo-broadcast state nested inside a host protocol participant.
///
/// Each host-protocol broadcast is identified by its
/// [`BroadcastTag`] and leader. A broadcast from leader `L` is accepted by
/// party `i` once `i` holds `n - 1` matching votes: the original dispersal
/// from `L` plus a re-dispersal from every party other than `L` and `i`
/// itself.
#[derive(Debug)]
pub(crate) struct BroadcastParticipant {
    sid: Identifier,
    id: ParticipantIdentifier,
    other_participant_ids: Vec<ParticipantIdentifier>,
    /// votes[(tag, leader)][voter] = the data the voter claims to have seen.
    votes: HashMap<(BroadcastTag, ParticipantIdentifier), HashMap<ParticipantIdentifier, BroadcastData>>,
    status: Status,
}

impl BroadcastParticipant {
    pub(crate) fn new(
        sid: Identifier,
        id: ParticipantIdentifier,
        other_participant_ids: Vec<ParticipantIdentifier>,
    ) -> Self {
        Self {
            sid,
            id,
            other_participant_ids,
            votes: HashMap::new(),
            status: Status::Running,
        }
    }

    pub(crate) fn status(&self) -> &Status {
        &self.status
    }

    /// Produce the dispersal messages for a broadcast led by this party.
    pub(crate) fn gen_broadcast(
        &mut self,
        message_type: MessageType,
        data: Vec<u8>,
        sid: Identifier,
        tag: BroadcastTag,
    ) -> Result<Vec<Message>> {
        let broadcast_data = BroadcastData {
            leader: self.id,
            tag,
            message_type,
            data,
        };
        self.other_participant_ids
            .iter()
            .map(|&other| {
                Message::new(
                    MessageType::Broadcast(BroadcastMessageType::Disperse),
                    sid,
                    self.id,
                    other,
                    &broadcast_data,
                )
            })
            .collect()
    }

    /// Process one broadcast-subprotocol message.
    #[instrument(skip_all, err(Debug))]
    pub(crate) fn process_message(
        &mut self,
        message: &Message,
    ) -> Result<ProcessOutcome<BroadcastOutput>> {
        info!(
            "BROADCAST: Player {}: received {:?} from {}",
            self.id,
            message.message_type(),
            message.from()
        );
        let data = BroadcastData::from_message(message)?;

        match message.message_type() {
            MessageType::Broadcast(BroadcastMessageType::Disperse) => {
                self.handle_disperse(message, data)
            }
            MessageType::Broadcast(BroadcastMessageType::Redisperse) => {
                self.handle_redisperse(message, data)
            }
            message_type => {
                error!("incorrect message type routed to broadcast: {message_type:?}");
                Err(InternalError::InternalInvariantFailed)
            }
        }
    }

    fn handle_disperse(
        &mut self,
        message: &Message,
        data: BroadcastData,
    ) -> Result<ProcessOutcome<BroadcastOutput>> {
        // The original dispersal must come from its claimed leader.
        if data.leader != message.from() {
            error!(
                "{} dispersed a broadcast claiming leader {}",
                message.from(),
                data.leader
            );
            return Err(InternalError::blame(message.from(), Fault::ProtocolViolation));
        }
        let leader = data.leader;
        let tag = data.tag;
        self.record_vote(tag, leader, message.from(), data.clone())?;

        // Echo what we saw to every party that did not already hear it
        // from the leader or from us.
        let echoes = self
            .other_participant_ids
            .iter()
            .filter(|&&other| other != leader)
            .map(|&other| {
                Message::new(
                    MessageType::Broadcast(BroadcastMessageType::Redisperse),
                    self.sid,
                    self.id,
                    other,
                    &data,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let outcome = self.maybe_deliver(tag, leader)?;
        Ok(outcome.with_messages(echoes))
    }

    fn handle_redisperse(
        &mut self,
        message: &Message,
        data: BroadcastData,
    ) -> Result<ProcessOutcome<BroadcastOutput>> {
        let voter = message.from();
        let leader = data.leader;
        if leader == voter || leader == self.id {
            error!("{voter} echoed a broadcast it should not echo");
            return Err(InternalError::blame(voter, Fault::ProtocolViolation));
        }
        let tag = data.tag;
        self.record_vote(tag, leader, voter, data)?;
        self.maybe_deliver(tag, leader)
    }

    fn record_vote(
        &mut self,
        tag: BroadcastTag,
        leader: ParticipantIdentifier,
        voter: ParticipantIdentifier,
        data: BroadcastData,
    ) -> Result<()> {
        let entry = self.votes.entry((tag, leader)).or_default();
        if entry.insert(voter, data).is_some() {
            error!("{voter} voted twice on the broadcast led by {leader}");
            return Err(InternalError::blame(voter, Fault::ProtocolViolation));
        }
        Ok(())
    }

    /// Deliver the broadcast led by `leader` if every expected vote is in.
    fn maybe_deliver(
        &mut self,
        tag: BroadcastTag,
        leader: ParticipantIdentifier,
    ) -> Result<ProcessOutcome<BroadcastOutput>> {
        let expected_votes = self.other_participant_ids.len();
        let votes = self
            .votes
            .get(&(tag, leader))
            .ok_or(InternalError::InternalInvariantFailed)?;
        if votes.len() < expected_votes {
            return Ok(ProcessOutcome::Incomplete);
        }

        // All views must agree, including the leader's own dispersal.
        let leader_view = votes
            .get(&leader)
            .ok_or(InternalError::InternalInvariantFailed)?;
        if votes.values().any(|view| view != leader_view) {
            error!("parties reported conflicting views of the broadcast led by {leader}");
            return Err(InternalError::unattributed(Fault::EchoInconsistent));
        }

        let output = BroadcastOutput::new(
            tag,
            Message::new_raw(
                leader_view.message_type,
                self.sid,
                leader,
                self.id,
                leader_view.data.clone(),
            ),
        );

        // Track which leaders' broadcasts completed at this participant.
        let completed = match &mut self.status {
            Status::ParticipantCompletedBroadcast(completed) => completed,
            _ => {
                self.status = Status::ParticipantCompletedBroadcast(Vec::new());
                match &mut self.status {
                    Status::ParticipantCompletedBroadcast(completed) => completed,
                    _ => unreachable!(),
                }
            }
        };
        completed.push(leader);

        Ok(ProcessOutcome::Terminated(output))
    }
}
