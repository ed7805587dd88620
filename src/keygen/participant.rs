// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The keygen / refresh protocol participant.

use crate::{
    broadcast::{BroadcastOutput, BroadcastParticipant, BroadcastTag},
    curve::CurvePoint,
    errors::{CallerError, Fault, InternalError, ProofKind, Result},
    keygen::{
        input::Input,
        keygen_commit::{KeygenCommit, KeygenDecommit},
        keyshare::{
            eval_private_share, eval_public_share, sample_polynomial, to_public_coeffs,
            EvalEncrypted, EvalPrivate, KeySharePrivate,
        },
        output::{Config, PublicMaterial},
    },
    local_storage::{LocalStorage, TypeTag},
    messages::{BroadcastMessageType, KeygenMessageType, Message, MessageType},
    paillier::DecryptionKey,
    parameters::RID_BYTES,
    participant::{
        Broadcast, InnerProtocolParticipant, ProcessOutcome, ProtocolParticipant, Status,
    },
    protocol::{Identifier, ParticipantConfig, ParticipantIdentifier, ProtocolType, SharedContext},
    ring_pedersen::RingPedersen,
    zkp::{
        pilog::{self, PiLogProof},
        pimod::{self, PiModProof},
        piprm::{self, PiPrmProof},
        pisch::{self, PiSchProof},
        Proof,
    },
};
use k256::Scalar;
use merlin::Transcript;
use rand::{rngs::StdRng, CryptoRng, Rng, RngCore, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use zeroize::Zeroizing;

/// The round 3 proof bundle: Paillier–Blum and ring-Pedersen validity.
#[derive(Serialize, Deserialize)]
struct KeygenR3Proofs {
    pimod: PiModProof,
    piprm: PiPrmProof,
}

/// The round 3 per-recipient payload: an encrypted polynomial evaluation
/// bound to the public polynomial by a discrete-log proof.
#[derive(Serialize, Deserialize)]
struct KeygenR3Share {
    encrypted: EvalEncrypted,
    proof: PiLogProof,
}

/// The candidate output assembled in round 4, pending Schnorr responses.
#[derive(Debug)]
struct Candidate {
    config: Config,
    digest: [u8; 32],
}

mod storage {
    use super::*;

    pub(super) struct Commit;
    impl TypeTag for Commit {
        type Value = KeygenCommit;
    }
    pub(super) struct Decommit;
    impl TypeTag for Decommit {
        type Value = KeygenDecommit;
    }
    pub(super) struct VssSecret;
    impl TypeTag for VssSecret {
        type Value = Vec<crate::keygen::keyshare::CoeffPrivate>;
    }
    pub(super) struct SchnorrPrecom;
    impl TypeTag for SchnorrPrecom {
        type Value = pisch::PiSchPrecommit;
    }
    pub(super) struct PaillierKey;
    impl TypeTag for PaillierKey {
        type Value = DecryptionKey;
    }
    pub(super) struct PedersenTrapdoor;
    impl TypeTag for PedersenTrapdoor {
        type Value = crate::ring_pedersen::PedersenSecret;
    }
    pub(super) struct GlobalRid;
    impl TypeTag for GlobalRid {
        type Value = [u8; RID_BYTES];
    }
    pub(super) struct GlobalChainKey;
    impl TypeTag for GlobalChainKey {
        type Value = [u8; RID_BYTES];
    }
    pub(super) struct SetupProofsVerified;
    impl TypeTag for SetupProofsVerified {
        type Value = ();
    }
    pub(super) struct ValidShare;
    impl TypeTag for ValidShare {
        type Value = EvalPrivate;
    }
    pub(super) struct CandidateOutput;
    impl TypeTag for CandidateOutput {
        type Value = Candidate;
    }
    pub(super) struct SchnorrVerified;
    impl TypeTag for SchnorrVerified {
        type Value = ();
    }
}

/**
A [`ProtocolParticipant`] that runs the five-round threshold keygen /
refresh protocol.

# Protocol input
A signing threshold (initial keygen) or an existing [`Config`] (refresh),
plus a worker pool for the heavy number theory.

# Protocol output
Upon successful completion, the participant produces a [`Config`]: every
party's public material (ECDSA share, Paillier modulus, ring-Pedersen
parameters), this party's secret share and Paillier factors, and the
agreed session values `rid` and chain key.

# 🔒 Storage requirements
The secret portion of the output [`Config`] requires secure persistent
storage.

# High-level protocol description
**Round 1.** Sample a degree-`t` VSS polynomial (constant term zero when
refreshing), per-session randomness `rid_i` and chain key contribution, a
session ElGamal key, a Paillier key from two safe Blum primes, and
ring-Pedersen parameters over the same modulus; echo-broadcast a hash
commitment `V_i` to all of it.

**Round 2.** Once every commitment arrived, open `V_i` to all parties.

**Round 3.** Check the openings, derive `rid = ⊕ rid_j` and the chain
key; send every party the Paillier–Blum (`mod`) and ring-Pedersen
(`prm`) proofs, and send each party `j` its polynomial evaluation
`f_i(j)` encrypted under `j`'s Paillier key with a `log*` proof binding
it to the exponent polynomial.

**Round 4.** Verify every proof, decrypt and VSS-check the received
shares, aggregate the new secret share and all public shares into a
candidate [`Config`], and answer the Schnorr challenge bound to that
config with the response `z_i`.

**Round 5.** Verify every `z_j` against the round 1 precommitment `A_j`
and the new public share `X_j`; output the [`Config`].
*/
#[derive(Debug)]
pub struct KeygenParticipant {
    /// The current session identifier.
    sid: Identifier,
    /// The current protocol input.
    input: Input,
    /// A unique identifier for this participant.
    id: ParticipantIdentifier,
    /// The other participants in the session.
    other_participant_ids: Vec<ParticipantIdentifier>,
    /// Local storage for this participant's round state.
    local_storage: LocalStorage,
    /// Broadcast subprotocol handler.
    broadcast_participant: BroadcastParticipant,
    /// Status of the protocol execution.
    status: Status,
}

impl ProtocolParticipant for KeygenParticipant {
    type Input = Input;
    type Output = Config;

    fn new(
        sid: Identifier,
        id: ParticipantIdentifier,
        other_participant_ids: Vec<ParticipantIdentifier>,
        input: Self::Input,
    ) -> Result<Self> {
        input.check_participant_config(&ParticipantConfig::new(id, &other_participant_ids)?)?;
        Ok(Self {
            sid,
            input,
            id,
            other_participant_ids: other_participant_ids.clone(),
            local_storage: Default::default(),
            broadcast_participant: BroadcastParticipant::new(sid, id, other_participant_ids),
            status: Status::NotReady,
        })
    }

    fn ready_type() -> MessageType {
        MessageType::Keygen(KeygenMessageType::Ready)
    }

    fn protocol_type() -> ProtocolType {
        ProtocolType::Keygen
    }

    fn id(&self) -> ParticipantIdentifier {
        self.id
    }

    fn other_ids(&self) -> &[ParticipantIdentifier] {
        &self.other_participant_ids
    }

    fn sid(&self) -> Identifier {
        self.sid
    }

    #[instrument(skip_all)]
    fn process_message<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<Self::Output>> {
        info!(
            "KEYGEN: Player {}: received {:?} from {}",
            self.id(),
            message.message_type(),
            message.from()
        );

        if *self.status() == Status::TerminatedSuccessfully {
            Err(CallerError::ProtocolAlreadyTerminated)?;
        }

        if !self.status().is_ready() && message.message_type() != Self::ready_type() {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }

        match message.message_type() {
            MessageType::Keygen(KeygenMessageType::Ready) => self.handle_ready_msg(rng, message),
            MessageType::Broadcast(_) => {
                let broadcast_outcome = self.handle_broadcast(message)?;

                // Handle the broadcasted message if all parties have
                // agreed on it.
                broadcast_outcome.convert(self, Self::handle_round_one_msg, rng)
            }
            MessageType::Keygen(KeygenMessageType::R2Decommit) => {
                self.handle_round_two_msg(rng, message)
            }
            MessageType::Keygen(KeygenMessageType::R3Proofs) => self.handle_round_three_msg(message),
            MessageType::Keygen(KeygenMessageType::R3PrivateShare) => {
                self.handle_round_three_msg_private(message)
            }
            MessageType::Keygen(KeygenMessageType::R4SchnorrResponse) => {
                self.handle_round_four_msg(message)
            }
            message_type => {
                error!("Incorrect MessageType given to KeygenParticipant. Got: {message_type:?}");
                Err(InternalError::InternalInvariantFailed)
            }
        }
    }

    fn status(&self) -> &Status {
        &self.status
    }
}

impl InnerProtocolParticipant for KeygenParticipant {
    type Context = SharedContext;

    fn retrieve_context(&self) -> <Self as InnerProtocolParticipant>::Context {
        SharedContext::collect(self)
    }

    fn local_storage(&self) -> &LocalStorage {
        &self.local_storage
    }

    fn local_storage_mut(&mut self) -> &mut LocalStorage {
        &mut self.local_storage
    }

    fn status_mut(&mut self) -> &mut Status {
        &mut self.status
    }
}

impl Broadcast for KeygenParticipant {
    fn broadcast_participant(&mut self) -> &mut BroadcastParticipant {
        &mut self.broadcast_participant
    }
}

impl KeygenParticipant {
    /// Handle "Ready" messages from the protocol participants.
    ///
    /// Once the ready signal arrives, generate the round one commitment
    /// and replay any broadcast messages that arrived early.
    #[instrument(skip_all, err(Debug))]
    fn handle_ready_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        info!("Handling ready keygen message.");

        let ready_outcome = self.process_ready_message(message)?;
        let round_one_messages = run_only_once!(self.gen_round_one_msgs(rng, message.id()))?;

        let stashed = self
            .fetch_messages(MessageType::Broadcast(BroadcastMessageType::Disperse))?
            .into_iter()
            .chain(self.fetch_messages(MessageType::Broadcast(BroadcastMessageType::Redisperse))?)
            .collect::<Vec<_>>();
        let broadcast_outcomes = stashed
            .iter()
            .map(|stashed_message| {
                let broadcast_outcome = self.handle_broadcast(stashed_message)?;
                broadcast_outcome.convert(self, Self::handle_round_one_msg, rng)
            })
            .collect::<Result<Vec<_>>>()?;

        ready_outcome
            .with_messages(round_one_messages)
            .consolidate(broadcast_outcomes)
    }

    /// Generate the protocol's round one message: an echo broadcast of
    /// the commitment `V_i` over everything this party samples.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_one_msgs<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        sid: Identifier,
    ) -> Result<Vec<Message>> {
        info!("Generating round one keygen messages.");

        // Deal the VSS polynomial. A refresh deals zero so the aggregate
        // key is preserved.
        let constant = self.input.is_refresh().then_some(Scalar::ZERO);
        let coeffs = sample_polynomial(self.input.threshold(), constant, rng);
        let coeff_publics = to_public_coeffs(&coeffs);

        // Our own polynomial evaluation never crosses the network.
        let own_share = eval_private_share(&coeffs, self.id());
        self.local_storage
            .store::<storage::ValidShare>(self.id(), own_share);
        self.local_storage
            .store::<storage::VssSecret>(self.id(), coeffs);

        // This corresponds to `A_i` in the paper.
        let sch_precom = PiSchProof::precommit(rng)?;
        let precom_point = *sch_precom.precommitment();
        self.local_storage
            .store::<storage::SchnorrPrecom>(self.id(), sch_precom);

        // The session ElGamal key. Only the public part is agreed upon;
        // the secret has no consumer in this protocol suite.
        let el_gamal_secret = Zeroizing::new(crate::curve::random_scalar(rng));
        let el_gamal = CurvePoint::GENERATOR.multiply_by_scalar(&el_gamal_secret);

        let (paillier, _, _) = DecryptionKey::new(rng, self.input.pool())?;
        let (setup, trapdoor) = RingPedersen::extract(&paillier, rng)?;
        let encryption_key = paillier.encryption_key();
        self.local_storage
            .store::<storage::PaillierKey>(self.id(), paillier);
        self.local_storage
            .store::<storage::PedersenTrapdoor>(self.id(), trapdoor);

        let decom = KeygenDecommit::new(
            rng,
            &sid,
            &self.id(),
            coeff_publics,
            precom_point,
            el_gamal,
            encryption_key,
            setup,
        );

        // Mark our own commitment as received. This corresponds to `V_i`
        // in the paper.
        let com = decom.commit()?;
        self.local_storage
            .store::<storage::Commit>(self.id(), com.clone());
        self.local_storage
            .store::<storage::Decommit>(self.id(), decom);

        self.broadcast(
            MessageType::Keygen(KeygenMessageType::R1CommitHash),
            &com,
            sid,
            BroadcastTag::KeygenR1CommitHash,
        )
    }

    /// Handle an agreed-upon round one broadcast.
    ///
    /// Once all commitments have been received, this participant sends
    /// the opening of its own commitment to all other parties.
    #[instrument(skip_all, err(Debug))]
    fn handle_round_one_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        broadcast_message: BroadcastOutput,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let message = broadcast_message.into_message(BroadcastTag::KeygenR1CommitHash)?;

        self.check_for_duplicate_msg::<storage::Commit>(message.from())?;
        info!("Handling round one keygen message.");

        let keygen_commit = KeygenCommit::from_message(&message)?;
        self.local_storage
            .store_once::<storage::Commit>(message.from(), keygen_commit)?;

        // Check if we've received all the commits, which signals an end
        // to round one.
        let r1_done = self
            .local_storage
            .contains_for_all_ids::<storage::Commit>(self.other_ids());

        if r1_done {
            // Finish round 1 by generating messages for round 2.
            let round_one_messages = run_only_once!(self.gen_round_two_msgs(rng, message.id()))?;

            // Process any round 2 messages we may have received early.
            let round_two_outcomes = self
                .fetch_messages(MessageType::Keygen(KeygenMessageType::R2Decommit))?
                .iter()
                .map(|msg| self.handle_round_two_msg(rng, msg))
                .collect::<Result<Vec<_>>>()?;

            ProcessOutcome::collect_with_messages(round_two_outcomes, round_one_messages)
        } else {
            // Otherwise, wait for more round 1 messages.
            Ok(ProcessOutcome::Incomplete)
        }
    }

    /// Generate the protocol's round two messages: the opening of the
    /// round one commitment.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_two_msgs<R: RngCore + CryptoRng>(
        &mut self,
        _rng: &mut R,
        _sid: Identifier,
    ) -> Result<Vec<Message>> {
        info!("Generating round two keygen messages.");

        let decom = self
            .local_storage
            .retrieve::<storage::Decommit>(self.id())?;
        self.message_for_other_participants(
            MessageType::Keygen(KeygenMessageType::R2Decommit),
            decom,
        )
    }

    /// Handle the protocol's round two messages: check each opening
    /// against its commitment and the protocol rules.
    #[instrument(skip_all, err(Debug))]
    fn handle_round_two_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::Decommit>(message.from())?;
        info!("Handling round two keygen message.");

        // We must receive all commitments in round 1 before we start
        // processing decommits in round 2.
        let r1_done = self
            .local_storage
            .contains_for_all_ids::<storage::Commit>(&self.all_participants());
        if !r1_done {
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }

        let com = self
            .local_storage
            .retrieve::<storage::Commit>(message.from())?;
        let decom = KeygenDecommit::from_message(
            message,
            com,
            self.input.threshold() + 1,
            self.input.is_refresh(),
        )?;
        self.local_storage
            .store_once::<storage::Decommit>(message.from(), decom)?;

        let r2_done = self
            .local_storage
            .contains_for_all_ids::<storage::Decommit>(&self.all_participants());

        if r2_done {
            // Generate messages for round 3...
            let round_three_messages = run_only_once!(self.gen_round_three_msgs(rng))?;

            // ...and handle any round 3 messages that arrived early.
            let mut round_three_outcomes = self
                .fetch_messages(MessageType::Keygen(KeygenMessageType::R3Proofs))?
                .iter()
                .map(|msg| self.handle_round_three_msg(msg))
                .collect::<Result<Vec<_>>>()?;

            let outcomes_private = self
                .fetch_messages(MessageType::Keygen(KeygenMessageType::R3PrivateShare))?
                .iter()
                .map(|msg| self.handle_round_three_msg_private(msg))
                .collect::<Result<Vec<_>>>()?;
            round_three_outcomes.extend(outcomes_private);

            ProcessOutcome::collect_with_messages(round_three_outcomes, round_three_messages)
        } else {
            // Otherwise, wait for more round 2 messages.
            Ok(ProcessOutcome::Incomplete)
        }
    }

    /// Generate the protocol's round three messages: the setup proofs to
    /// everyone and an encrypted share per recipient.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_three_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        info!("Generating round three keygen messages.");

        // Construct the session values out of everyone's contributions.
        let mut global_rid = [0u8; RID_BYTES];
        let mut chain_key_transcript = Transcript::new(b"keygen chain key");
        for pid in self.all_participants() {
            let decom = self.local_storage.retrieve::<storage::Decommit>(pid)?;
            for (dst, src) in global_rid.iter_mut().zip(decom.rid.iter()) {
                *dst ^= src;
            }
            chain_key_transcript.append_message(b"pid", &pid.as_u128().to_le_bytes());
            chain_key_transcript.append_message(b"chain key", &decom.chain_key);
        }
        let mut global_chain_key = [0u8; RID_BYTES];
        chain_key_transcript.challenge_bytes(b"chain key", &mut global_chain_key);

        self.local_storage
            .store::<storage::GlobalRid>(self.id(), global_rid);
        self.local_storage
            .store::<storage::GlobalChainKey>(self.id(), global_chain_key);

        let context = self.retrieve_context();
        let paillier = self
            .local_storage
            .retrieve::<storage::PaillierKey>(self.id())?;
        let trapdoor = self
            .local_storage
            .retrieve::<storage::PedersenTrapdoor>(self.id())?;
        let own_decom = self.local_storage.retrieve::<storage::Decommit>(self.id())?;

        // One setup-proof bundle serves every verifier: the transcript is
        // forked by the prover's identity, so the challenges are fixed.
        let mut transcript = setup_proof_transcript(self.sid(), &global_rid, self.id())?;
        let (p, q) = paillier.primes();
        let proofs = KeygenR3Proofs {
            pimod: PiModProof::prove(
                pimod::CommonInput::new(paillier.modulus()),
                pimod::ProverSecret::new(p, q),
                &context,
                &mut transcript,
                rng,
            )?,
            piprm: PiPrmProof::prove(
                piprm::CommonInput::new(&own_decom.setup),
                piprm::ProverSecret::new(trapdoor, paillier),
                &context,
                &mut transcript,
                rng,
            )?,
        };
        let mut messages = self.message_for_other_participants(
            MessageType::Keygen(KeygenMessageType::R3Proofs),
            proofs,
        )?;

        // Encrypt each recipient's evaluation under its own Paillier key
        // and bind it to the exponent polynomial. The per-recipient work
        // is independent; fan it out on the pool.
        let coeffs = self.local_storage.retrieve::<storage::VssSecret>(self.id())?;
        let share_jobs = self
            .other_ids()
            .iter()
            .map(|&recipient| {
                let decom = self.local_storage.retrieve::<storage::Decommit>(recipient)?;
                let seed: [u8; 32] = rng.gen();
                Ok((
                    recipient,
                    decom.encryption_key.clone(),
                    decom.setup.clone(),
                    eval_private_share(coeffs, recipient),
                    seed,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let sid = self.sid();
        let sender = self.id();
        let share_messages = self.input.pool().install(|| {
            share_jobs
                .into_par_iter()
                .map(|(recipient, encryption_key, setup, eval, seed)| {
                    let mut job_rng = StdRng::from_seed(seed);
                    let (encrypted, nonce) =
                        EvalEncrypted::encrypt(&eval, &encryption_key, &mut job_rng)?;
                    let eval_point = eval.public_point();
                    let mut transcript =
                        share_proof_transcript(sid, &global_rid, sender, recipient)?;
                    let proof = PiLogProof::prove(
                        pilog::CommonInput::new(
                            &setup,
                            &encryption_key,
                            &encrypted.ciphertext,
                            &eval_point,
                            &CurvePoint::GENERATOR,
                        ),
                        pilog::ProverSecret::new(&eval.to_bignumber(), &nonce),
                        &context,
                        &mut transcript,
                        &mut job_rng,
                    )?;
                    Message::new(
                        MessageType::Keygen(KeygenMessageType::R3PrivateShare),
                        sid,
                        sender,
                        recipient,
                        &KeygenR3Share { encrypted, proof },
                    )
                })
                .collect::<Result<Vec<_>>>()
        })?;
        messages.extend(share_messages);

        // Our own proofs need no verification pass.
        self.local_storage
            .store::<storage::SetupProofsVerified>(self.id(), ());

        Ok(messages)
    }

    /// Handle round three messages only after our own round three.
    fn can_handle_round_three_msg(&self) -> bool {
        self.local_storage.contains::<storage::GlobalRid>(self.id())
    }

    /// Handle a round three proof bundle: verify the sender's modulus and
    /// ring-Pedersen parameters.
    #[instrument(skip_all, err(Debug))]
    fn handle_round_three_msg(
        &mut self,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::SetupProofsVerified>(message.from())?;

        if !self.can_handle_round_three_msg() {
            info!("Not yet ready to handle round three keygen proofs message.");
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round three keygen proofs message.");

        message.check_type(MessageType::Keygen(KeygenMessageType::R3Proofs))?;
        let proofs: KeygenR3Proofs = deserialize!(&message.unverified_bytes)?;

        let global_rid = *self
            .local_storage
            .retrieve::<storage::GlobalRid>(self.id())?;
        let decom = self
            .local_storage
            .retrieve::<storage::Decommit>(message.from())?;
        let context = self.retrieve_context();

        let mut transcript = setup_proof_transcript(self.sid(), &global_rid, message.from())?;
        proofs
            .pimod
            .verify(
                pimod::CommonInput::new(decom.encryption_key.modulus()),
                &context,
                &mut transcript,
            )
            .map_err(|_| {
                InternalError::blame(message.from(), Fault::ZkProofFailed(ProofKind::Mod))
            })?;
        proofs
            .piprm
            .verify(
                piprm::CommonInput::new(&decom.setup),
                &context,
                &mut transcript,
            )
            .map_err(|_| {
                InternalError::blame(message.from(), Fault::ZkProofFailed(ProofKind::Prm))
            })?;

        self.local_storage
            .store::<storage::SetupProofsVerified>(message.from(), ());

        self.maybe_gen_round_four_msgs()
    }

    /// Handle a round three private share: decrypt, range-check, verify
    /// against the sender's committed polynomial.
    #[instrument(skip_all, err(Debug))]
    fn handle_round_three_msg_private(
        &mut self,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::ValidShare>(message.from())?;

        if !self.can_handle_round_three_msg() {
            info!("Not yet ready to handle round three keygen share message.");
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round three keygen share message.");

        message.check_type(MessageType::Keygen(KeygenMessageType::R3PrivateShare))?;
        let share: KeygenR3Share = deserialize!(&message.unverified_bytes)?;

        let paillier = self
            .local_storage
            .retrieve::<storage::PaillierKey>(self.id())?;
        let decom = self
            .local_storage
            .retrieve::<storage::Decommit>(message.from())?;

        // Decrypt the share and check it did not overflow the field.
        let eval = share
            .encrypted
            .decrypt(paillier)
            .map_err(|err| err.attributed_to(message.from()))?;

        // Verify the share against the sender's committed polynomial.
        let expected = eval_public_share(&decom.coeff_publics, self.id());
        if eval.public_point() != expected {
            error!("{} sent a share off its committed polynomial", message.from());
            return Err(InternalError::blame(message.from(), Fault::VssFailed));
        }

        // Verify the discrete-log binding of ciphertext and evaluation.
        let global_rid = *self
            .local_storage
            .retrieve::<storage::GlobalRid>(self.id())?;
        let own_decom = self.local_storage.retrieve::<storage::Decommit>(self.id())?;
        let mut transcript =
            share_proof_transcript(self.sid(), &global_rid, message.from(), self.id())?;
        share
            .proof
            .verify(
                pilog::CommonInput::new(
                    &own_decom.setup,
                    &own_decom.encryption_key,
                    &share.encrypted.ciphertext,
                    &expected,
                    &CurvePoint::GENERATOR,
                ),
                &self.retrieve_context(),
                &mut transcript,
            )
            .map_err(|_| {
                InternalError::blame(message.from(), Fault::ZkProofFailed(ProofKind::LogStar))
            })?;

        self.local_storage
            .store::<storage::ValidShare>(message.from(), eval);

        self.maybe_gen_round_four_msgs()
    }

    /// Cross into round four once every proof bundle and share arrived.
    fn maybe_gen_round_four_msgs(
        &mut self,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let all = self.all_participants();
        let r3_done = self
            .local_storage
            .contains_for_all_ids::<storage::SetupProofsVerified>(&all)
            && self
                .local_storage
                .contains_for_all_ids::<storage::ValidShare>(&all);
        if !r3_done {
            return Ok(ProcessOutcome::Incomplete);
        }

        let round_four_messages = run_only_once!(self.gen_round_four_msgs())?;

        let round_four_outcomes = self
            .fetch_messages(MessageType::Keygen(KeygenMessageType::R4SchnorrResponse))?
            .iter()
            .map(|msg| self.handle_round_four_msg(msg))
            .collect::<Result<Vec<_>>>()?;

        ProcessOutcome::collect_with_messages(round_four_outcomes, round_four_messages)
    }

    /// Generate the protocol's round four message: aggregate the shares
    /// into a candidate [`Config`] and answer the Schnorr challenge bound
    /// to it.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_four_msgs(&mut self) -> Result<Vec<Message>> {
        info!("Generating round four keygen messages.");

        let all = self.all_participants();

        // New secret share: previous share (refresh) plus the sum of all
        // dealt evaluations at our coordinate.
        let mut new_secret = match self.input.previous() {
            Some(previous) => *previous.secret_share().as_scalar(),
            None => Scalar::ZERO,
        };
        for pid in &all {
            let eval = self.local_storage.retrieve::<storage::ValidShare>(*pid)?;
            new_secret += eval.x;
        }

        // New public shares: the summed exponent polynomials evaluated at
        // each coordinate, plus the previous share when refreshing.
        let public = all
            .iter()
            .map(|&pid| {
                let mut X = match self.input.previous() {
                    Some(previous) => *previous.public_material(pid)?.ecdsa(),
                    None => CurvePoint::IDENTITY,
                };
                for dealer in &all {
                    let decom = self.local_storage.retrieve::<storage::Decommit>(*dealer)?;
                    X = X + eval_public_share(&decom.coeff_publics, pid);
                }
                let decom = self.local_storage.retrieve::<storage::Decommit>(pid)?;
                Ok(PublicMaterial::new(
                    pid,
                    X,
                    decom.encryption_key.clone(),
                    decom.setup.clone(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        // Cross-check the aggregation against our own secret before
        // committing to it.
        let own_public = public
            .iter()
            .find(|material| material.participant() == self.id())
            .ok_or(InternalError::InternalInvariantFailed)?;
        if own_public.ecdsa() != &CurvePoint::GENERATOR.multiply_by_scalar(&new_secret) {
            error!("aggregated public share does not match the aggregated secret");
            return Err(InternalError::InternalInvariantFailed);
        }

        let global_rid = *self
            .local_storage
            .retrieve::<storage::GlobalRid>(self.id())?;
        let global_chain_key = *self
            .local_storage
            .retrieve::<storage::GlobalChainKey>(self.id())?;
        let paillier = self
            .local_storage
            .retrieve::<storage::PaillierKey>(self.id())?
            .clone();

        let config = Config::from_parts(
            self.input.threshold(),
            public,
            global_rid,
            global_chain_key,
            self.id(),
            KeySharePrivate::new(new_secret),
            paillier,
        )?;
        let digest = config.transcript_digest();

        // Bind the assembled config into the proof transcript, then
        // answer the Schnorr challenge for the new share.
        let transcript = schnorr_proof_transcript(self.sid(), &global_rid, &digest, self.id())?;
        let precom = self
            .local_storage
            .retrieve::<storage::SchnorrPrecom>(self.id())?;
        let own_share_point = *config.public_material(self.id())?.ecdsa();
        let proof = PiSchProof::prove_from_precommit(
            &self.retrieve_context(),
            precom,
            &pisch::CommonInput::new(&own_share_point),
            &pisch::ProverSecret::new(&new_secret),
            &transcript,
        )?;

        self.local_storage.store::<storage::CandidateOutput>(
            self.id(),
            Candidate { config, digest },
        );
        self.local_storage
            .store::<storage::SchnorrVerified>(self.id(), ());

        self.message_for_other_participants(
            MessageType::Keygen(KeygenMessageType::R4SchnorrResponse),
            proof,
        )
    }

    /// Handle a round four message: verify the sender's Schnorr response
    /// against its precommitment and new public share.
    #[instrument(skip_all, err(Debug))]
    fn handle_round_four_msg(
        &mut self,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        self.check_for_duplicate_msg::<storage::SchnorrVerified>(message.from())?;

        if !self
            .local_storage
            .contains::<storage::CandidateOutput>(self.id())
        {
            info!("Not yet ready to handle round four keygen message.");
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("Handling round four keygen message.");

        message.check_type(MessageType::Keygen(KeygenMessageType::R4SchnorrResponse))?;
        let proof: PiSchProof = deserialize!(&message.unverified_bytes)?;

        let candidate = self
            .local_storage
            .retrieve::<storage::CandidateOutput>(self.id())?;
        let decom = self
            .local_storage
            .retrieve::<storage::Decommit>(message.from())?;
        let global_rid = *self
            .local_storage
            .retrieve::<storage::GlobalRid>(self.id())?;

        let share_point = *candidate.config.public_material(message.from())?.ecdsa();
        let transcript =
            schnorr_proof_transcript(self.sid(), &global_rid, &candidate.digest, message.from())?;
        proof
            .verify_with_precommit(
                pisch::CommonInput::new(&share_point),
                &self.retrieve_context(),
                &transcript,
                &decom.precom,
            )
            .map_err(|_| {
                InternalError::blame(message.from(), Fault::ZkProofFailed(ProofKind::Sch))
            })?;

        self.local_storage
            .store::<storage::SchnorrVerified>(message.from(), ());

        self.maybe_finish()
    }

    fn maybe_finish(&mut self) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let all_verified = self
            .local_storage
            .contains_for_all_ids::<storage::SchnorrVerified>(&self.all_participants());
        if !all_verified {
            return Ok(ProcessOutcome::Incomplete);
        }

        let candidate = self
            .local_storage
            .remove::<storage::CandidateOutput>(self.id())?;
        self.status = Status::TerminatedSuccessfully;
        Ok(ProcessOutcome::Terminated(candidate.config))
    }
}

/// Transcript for the round 3 `mod` and `prm` proofs, forked by the
/// prover's identity.
fn setup_proof_transcript(
    sid: Identifier,
    global_rid: &[u8; RID_BYTES],
    sender: ParticipantIdentifier,
) -> Result<Transcript> {
    let mut transcript = Transcript::new(b"keygen setup proofs");
    transcript.append_message(b"sid", &serialize!(&sid)?);
    transcript.append_message(b"rid", global_rid);
    transcript.append_message(b"sender", &serialize!(&sender)?);
    Ok(transcript)
}

/// Transcript for a round 3 share proof, forked by dealer and recipient.
fn share_proof_transcript(
    sid: Identifier,
    global_rid: &[u8; RID_BYTES],
    sender: ParticipantIdentifier,
    recipient: ParticipantIdentifier,
) -> Result<Transcript> {
    let mut transcript = Transcript::new(b"keygen share proof");
    transcript.append_message(b"sid", &serialize!(&sid)?);
    transcript.append_message(b"rid", global_rid);
    transcript.append_message(b"sender", &serialize!(&sender)?);
    transcript.append_message(b"recipient", &serialize!(&recipient)?);
    Ok(transcript)
}

/// Transcript for the round 4 Schnorr proof, bound to the assembled
/// config and forked by the prover's identity.
fn schnorr_proof_transcript(
    sid: Identifier,
    global_rid: &[u8; RID_BYTES],
    config_digest: &[u8; 32],
    sender: ParticipantIdentifier,
) -> Result<Transcript> {
    let mut transcript = Transcript::new(b"keygen schnorr");
    transcript.append_message(b"sid", &serialize!(&sid)?);
    transcript.append_message(b"rid", global_rid);
    transcript.append_message(b"config", config_digest);
    transcript.append_message(b"sender", &serialize!(&sender)?);
    Ok(transcript)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        keygen::keyshare::lagrange_coefficient_at_zero, paillier::prime_gen, pool::Pool,
        utils::testing::init_testing,
    };
    use std::collections::HashMap;
    use tracing::debug;

    impl KeygenParticipant {
        pub fn new_quorum<R: RngCore + CryptoRng>(
            sid: Identifier,
            quorum_size: usize,
            threshold: usize,
            rng: &mut R,
        ) -> Result<Vec<Self>> {
            let configs = ParticipantConfig::random_quorum(quorum_size, rng)?;
            configs
                .into_iter()
                .map(|config| {
                    let input = Input::new(threshold, Pool::serial())?;
                    Self::new(sid, config.id(), config.other_ids().to_vec(), input)
                })
                .collect()
        }

        pub fn initialize_keygen_message(&self, keygen_identifier: Identifier) -> Result<Message> {
            let empty: [u8; 0] = [];
            Message::new(
                MessageType::Keygen(KeygenMessageType::Ready),
                keygen_identifier,
                self.id(),
                self.id(),
                &empty,
            )
        }
    }

    /// Delivers all messages into their respective participant's inboxes.
    fn deliver_all(
        messages: &[Message],
        inboxes: &mut HashMap<ParticipantIdentifier, Vec<Message>>,
    ) {
        for message in messages {
            inboxes
                .get_mut(&message.to())
                .unwrap()
                .push(message.clone());
        }
    }

    fn is_keygen_done(quorum: &[KeygenParticipant]) -> bool {
        quorum
            .iter()
            .all(|participant| *participant.status() == Status::TerminatedSuccessfully)
    }

    #[allow(clippy::type_complexity)]
    fn process_messages<R: RngCore + CryptoRng>(
        quorum: &mut [KeygenParticipant],
        inboxes: &mut HashMap<ParticipantIdentifier, Vec<Message>>,
        rng: &mut R,
    ) -> Option<(usize, Result<ProcessOutcome<Config>>)> {
        // Pick a random participant to process.
        let index = rng.gen_range(0..quorum.len());
        let participant = quorum.get_mut(index).unwrap();

        let inbox = inboxes.get_mut(&participant.id()).unwrap();
        if inbox.is_empty() {
            // No messages to process for this participant, so pick
            // another participant.
            return None;
        }
        let message = inbox.remove(rng.gen_range(0..inbox.len()));
        debug!(
            "processing participant: {}, with message type: {:?} from {}",
            &participant.id(),
            &message.message_type(),
            &message.from(),
        );
        Some((index, participant.process_message(rng, &message)))
    }

    fn run_keygen(
        quorum_size: usize,
        threshold: usize,
        rng: &mut rand::rngs::StdRng,
    ) -> Result<Vec<Config>> {
        let sid = Identifier::random(rng);
        let mut quorum = KeygenParticipant::new_quorum(sid, quorum_size, threshold, rng)?;
        let mut inboxes = HashMap::new();
        for participant in &quorum {
            let _ = inboxes.insert(participant.id(), vec![]);
        }
        let mut outputs: HashMap<ParticipantIdentifier, Config> = HashMap::new();

        for participant in &quorum {
            let inbox = inboxes.get_mut(&participant.id()).unwrap();
            inbox.push(participant.initialize_keygen_message(sid)?);
        }

        while !is_keygen_done(&quorum) {
            let (index, outcome) = match process_messages(&mut quorum, &mut inboxes, rng) {
                None => continue,
                Some(x) => x,
            };
            let id = quorum[index].id();
            match outcome?.into_parts() {
                (Some(output), messages) => {
                    deliver_all(&messages, &mut inboxes);
                    assert!(outputs.insert(id, output).is_none());
                }
                (None, messages) => deliver_all(&messages, &mut inboxes),
            }
        }

        // Reorder into quorum order.
        Ok(quorum
            .iter()
            .map(|participant| outputs.remove(&participant.id()).unwrap())
            .collect())
    }

    fn check_outputs(configs: &[Config], threshold: usize) {
        // Every party must agree on the public material, rid, and chain
        // key.
        let reference = &configs[0];
        for config in configs {
            assert_eq!(config.rid(), reference.rid());
            assert_eq!(config.chain_key(), reference.chain_key());
            assert_eq!(
                config.all_public_material(),
                reference.all_public_material()
            );
            assert_eq!(config.public_key_point(), reference.public_key_point());
            assert_eq!(config.threshold(), threshold);
        }

        // Each party's public share must match its secret share.
        for config in configs {
            let own = config.public_material(config.id()).unwrap();
            assert_eq!(own.ecdsa(), &config.secret_share().public_share());
        }

        // Every (threshold + 1)-subset of shares must reconstruct the
        // aggregate key. (`skip == configs.len()` skips nobody, covering
        // the full-committee subset.)
        let pids: Vec<_> = configs.iter().map(|config| config.id()).collect();
        let expected = reference.public_key_point();
        for skip in 0..=configs.len() {
            let subset: Vec<_> = (0..configs.len())
                .filter(|i| *i != skip)
                .take(threshold + 1)
                .collect();
            if subset.len() < threshold + 1 {
                continue;
            }
            let subset_pids: Vec<_> = subset.iter().map(|&i| pids[i]).collect();
            let mut secret = Scalar::ZERO;
            for &i in &subset {
                let lagrange = lagrange_coefficient_at_zero(&pids[i], &subset_pids);
                secret += lagrange * configs[i].secret_share().as_scalar();
            }
            assert_eq!(CurvePoint::GENERATOR.multiply_by_scalar(&secret), expected);
        }
    }

    #[test]
    fn keygen_produces_valid_outputs() -> Result<()> {
        let mut rng = init_testing();
        let quorum_size = 3;
        let threshold = 1;
        let configs = run_keygen(quorum_size, threshold, &mut rng)?;
        check_outputs(&configs, threshold);
        Ok(())
    }

    #[test]
    fn full_threshold_keygen_works() -> Result<()> {
        let mut rng = init_testing();
        // 3-of-3: every party is needed to sign.
        let configs = run_keygen(3, 2, &mut rng)?;
        check_outputs(&configs, 2);
        Ok(())
    }

    #[test]
    fn refresh_preserves_the_key_and_replaces_shares() -> Result<()> {
        let mut rng = init_testing();
        let configs = run_keygen(3, 1, &mut rng)?;
        let public_key = configs[0].public_key_point();

        // Run the same protocol again, seeded with the old configs.
        let sid = Identifier::random(&mut rng);
        let mut quorum = configs
            .iter()
            .map(|config| {
                let input = Input::refresh(config.clone(), Pool::serial())?;
                let others = config
                    .participants()
                    .into_iter()
                    .filter(|pid| *pid != config.id())
                    .collect::<Vec<_>>();
                KeygenParticipant::new(sid, config.id(), others, input)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut inboxes = HashMap::new();
        for participant in &quorum {
            let _ = inboxes.insert(participant.id(), vec![]);
        }
        let mut outputs: HashMap<ParticipantIdentifier, Config> = HashMap::new();
        for participant in &quorum {
            let inbox = inboxes.get_mut(&participant.id()).unwrap();
            inbox.push(participant.initialize_keygen_message(sid)?);
        }
        while !is_keygen_done(&quorum) {
            let (index, outcome) = match process_messages(&mut quorum, &mut inboxes, &mut rng) {
                None => continue,
                Some(x) => x,
            };
            let id = quorum[index].id();
            match outcome?.into_parts() {
                (Some(output), messages) => {
                    deliver_all(&messages, &mut inboxes);
                    assert!(outputs.insert(id, output).is_none());
                }
                (None, messages) => deliver_all(&messages, &mut inboxes),
            }
        }
        let refreshed: Vec<_> = quorum
            .iter()
            .map(|participant| outputs.remove(&participant.id()).unwrap())
            .collect();

        check_outputs(&refreshed, 1);

        // The aggregate key is unchanged; every share is new.
        assert_eq!(refreshed[0].public_key_point(), public_key);
        for (old, new) in configs.iter().zip(&refreshed) {
            assert_eq!(old.id(), new.id());
            assert_ne!(old.secret_share(), new.secret_share());
            assert_ne!(
                old.public_material(old.id()).unwrap().ecdsa(),
                new.public_material(new.id()).unwrap().ecdsa()
            );
        }
        Ok(())
    }

    #[test]
    fn bad_mod_proof_aborts_with_the_cheater_as_culprit() -> Result<()> {
        let mut rng = init_testing();
        let sid = Identifier::random(&mut rng);
        let mut quorum = KeygenParticipant::new_quorum(sid, 3, 1, &mut rng)?;
        let cheater = quorum[2].id();

        let mut inboxes = HashMap::new();
        for participant in &quorum {
            let _ = inboxes.insert(participant.id(), vec![]);
        }
        for participant in &quorum {
            let inbox = inboxes.get_mut(&participant.id()).unwrap();
            inbox.push(participant.initialize_keygen_message(sid)?);
        }

        // A substitute `mod` proof over an unrelated modulus, standing in
        // for a proof recomputed with the wrong randomness.
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng)?;
        let wrong_modulus = &p * &q;

        let mut violations = Vec::new();
        loop {
            let (index, outcome) = match process_messages(&mut quorum, &mut inboxes, &mut rng) {
                None => {
                    if inboxes.values().all(|inbox| inbox.is_empty()) {
                        break;
                    }
                    continue;
                }
                Some(x) => x,
            };
            let processor = quorum[index].id();
            match outcome {
                Ok(outcome) => {
                    let (_, messages) = outcome.into_parts();
                    // Corrupt the cheater's proof bundles in flight.
                    let messages: Vec<_> = messages
                        .into_iter()
                        .map(|message| {
                            if message.from() == cheater
                                && message.message_type()
                                    == MessageType::Keygen(KeygenMessageType::R3Proofs)
                            {
                                let mut bundle: KeygenR3Proofs =
                                    deserialize!(&message.unverified_bytes).unwrap();
                                let mut transcript =
                                    Transcript::new(b"unrelated transcript");
                                bundle.pimod = PiModProof::prove(
                                    pimod::CommonInput::new(&wrong_modulus),
                                    pimod::ProverSecret::new(&p, &q),
                                    &crate::protocol::SharedContext::random(&mut rng),
                                    &mut transcript,
                                    &mut rng,
                                )
                                .unwrap();
                                Message::new(
                                    message.message_type(),
                                    message.id(),
                                    message.from(),
                                    message.to(),
                                    &bundle,
                                )
                                .unwrap()
                            } else {
                                message
                            }
                        })
                        .collect();
                    deliver_all(&messages, &mut inboxes);
                }
                Err(InternalError::ProtocolError(violation)) => {
                    assert_ne!(processor, cheater);
                    violations.push(violation);
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        // Both honest parties must have pinned the cheater.
        assert_eq!(violations.len(), 2);
        for violation in violations {
            assert_eq!(violation.culprits(), &[cheater]);
            assert_eq!(
                violation.fault(),
                Fault::ZkProofFailed(ProofKind::Mod)
            );
        }
        Ok(())
    }
}
