// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The interactive signing protocol participant.

use crate::{
    broadcast::{BroadcastOutput, BroadcastParticipant, BroadcastTag},
    curve::{bn_to_scalar, k256_order, scalar_to_bn, verify_signature, CurvePoint, Signature},
    errors::{CallerError, Fault, InternalError, ProofKind, Result, Violation},
    keygen::keyshare::{lagrange_coefficient_at_zero, KeySharePublic},
    local_storage::{LocalStorage, TypeTag},
    messages::{BroadcastMessageType, Message, MessageType, SignMessageType},
    participant::{
        Broadcast, InnerProtocolParticipant, ProcessOutcome, ProtocolParticipant, Status,
    },
    protocol::{Identifier, ParticipantIdentifier, ProtocolType, SharedContext},
    sign::{
        blame::{BlameData, MaskOpening},
        input::Input,
        round_one, round_three, round_two,
        share::SignatureShare,
    },
    utils::sample_mta_mask,
    zkp::{
        piaffg::{self, PiAffgProof},
        piaffp::{self, PiAffpProof},
        pienc::{self, PiEncProof},
        pilog::{self, PiLogProof},
        Proof, ProofContext,
    },
};
use k256::{elliptic_curve::ops::Reduce, Scalar, U256};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{rngs::StdRng, CryptoRng, Rng, RngCore, SeedableRng};
use rayon::prelude::*;
use tracing::{error, info, instrument};
use zeroize::Zeroizing;

mod storage {
    use super::*;

    pub(super) struct R1Private;
    impl TypeTag for R1Private {
        type Value = round_one::Private;
    }
    pub(super) struct R1Public;
    impl TypeTag for R1Public {
        type Value = round_one::PublicBroadcast;
    }
    pub(super) struct RangeProofVerified;
    impl TypeTag for RangeProofVerified {
        type Value = ();
    }
    pub(super) struct MtaSecretsFor;
    impl TypeTag for MtaSecretsFor {
        type Value = round_two::MtaSecrets;
    }
    pub(super) struct R2Gamma;
    impl TypeTag for R2Gamma {
        type Value = CurvePoint;
    }
    pub(super) struct R2Received;
    impl TypeTag for R2Received {
        type Value = round_two::Public;
    }
    pub(super) struct R3Private;
    impl TypeTag for R3Private {
        type Value = round_three::Private;
    }
    pub(super) struct R3Public;
    impl TypeTag for R3Public {
        type Value = (Scalar, CurvePoint);
    }
    pub(super) struct RProjection;
    impl TypeTag for RProjection {
        type Value = Scalar;
    }
    pub(super) struct SigShare;
    impl TypeTag for SigShare {
        type Value = SignatureShare;
    }
    pub(super) struct AbortFlag;
    impl TypeTag for AbortFlag {
        type Value = ();
    }
    pub(super) struct BlameShared;
    impl TypeTag for BlameShared {
        type Value = BlameData;
    }
}

/// Context for the Fiat–Shamir proofs of a signing session: the shared
/// session context bound to the config and the message being signed.
pub(crate) struct SignContext {
    shared_context: SharedContext,
    config_digest: [u8; 32],
    message_digest: [u8; 32],
}

impl ProofContext for SignContext {
    fn as_bytes(&self) -> Result<Vec<u8>> {
        Ok([
            self.shared_context.as_bytes()?,
            self.config_digest.to_vec(),
            self.message_digest.to_vec(),
        ]
        .concat())
    }
}

impl SignContext {
    /// Build a [`SignContext`] from a [`SignParticipant`].
    pub(crate) fn collect(p: &SignParticipant) -> Self {
        Self {
            shared_context: SharedContext::collect(p),
            config_digest: p.input.config().transcript_digest(),
            message_digest: p.input.digest_hash().into(),
        }
    }
}

/**
A [`ProtocolParticipant`] that runs the five-round interactive signing
protocol.

# Protocol input
The protocol takes a [`Config`](crate::keygen::Config), an ordered
signing subset of exactly `threshold + 1` committee members, and the
message to sign (hashed internally with SHA-256).

# Protocol output
Upon successful completion, the participant outputs a low-s normalized
ECDSA [`Signature`] that verifies under the config's aggregate public
key.

# High-level protocol description
Before round one, every signer's public share and this party's secret
share are scaled by their Lagrange coefficients over the signing subset,
turning the Shamir shares into additive shares of the full key. The
rounds then follow the module documentation ([`sign`](crate::sign)).

If the round 4 consistency check or the final signature verification
fails, the participants enter the identifiable-abort phase: everyone
opens its nonces and MtA masks, the openings are checked against the
binding ciphertexts from rounds 1 and 2, every published share is
recomputed from the openings, and the session terminates with an error
naming the parties whose shares do not reconcile.
*/
pub struct SignParticipant {
    sid: Identifier,
    input: Input,
    id: ParticipantIdentifier,
    other_participant_ids: Vec<ParticipantIdentifier>,
    local_storage: LocalStorage,
    broadcast_participant: BroadcastParticipant,
    status: Status,
    /// This party's secret share scaled by its Lagrange coefficient.
    scaled_share: Zeroizing<Scalar>,
    /// Every signer's public share scaled by its Lagrange coefficient.
    scaled_publics: Vec<KeySharePublic>,
    /// The aggregate public key `Σ λ_j·X_j`.
    aggregate_pk: CurvePoint,
}

impl std::fmt::Debug for SignParticipant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignParticipant")
            .field("sid", &self.sid)
            .field("id", &self.id)
            .field("status", &self.status)
            .field("...", &"[redacted]")
            .finish()
    }
}

impl ProtocolParticipant for SignParticipant {
    type Input = Input;
    type Output = Signature;

    fn new(
        sid: Identifier,
        id: ParticipantIdentifier,
        other_participant_ids: Vec<ParticipantIdentifier>,
        input: Self::Input,
    ) -> Result<Self> {
        let mut signers = other_participant_ids.clone();
        signers.push(id);
        signers.sort();
        let mut expected = input.signers().to_vec();
        expected.sort();
        if signers != expected || id != input.config().id() {
            error!("session participants do not match the input signing subset");
            Err(CallerError::BadInput)?;
        }

        // Scale the Shamir shares into additive shares over the subset.
        let config = input.config();
        let scaled_publics = signers
            .iter()
            .map(|&pid| {
                let lagrange = lagrange_coefficient_at_zero(&pid, &signers);
                let scaled = config
                    .public_material(pid)?
                    .ecdsa()
                    .multiply_by_scalar(&lagrange);
                Ok(KeySharePublic::new(pid, scaled))
            })
            .collect::<Result<Vec<_>>>()?;
        let aggregate_pk = scaled_publics
            .iter()
            .fold(CurvePoint::IDENTITY, |sum, share| sum + *share.as_ref());
        if aggregate_pk != config.public_key_point() {
            error!("scaled shares do not reconstruct the aggregate public key");
            Err(CallerError::BadInput)?;
        }
        let scaled_share = Zeroizing::new(
            lagrange_coefficient_at_zero(&id, &signers) * config.secret_share().as_scalar(),
        );

        Ok(Self {
            sid,
            id,
            other_participant_ids: other_participant_ids.clone(),
            local_storage: Default::default(),
            broadcast_participant: BroadcastParticipant::new(sid, id, other_participant_ids),
            status: Status::NotReady,
            scaled_share,
            scaled_publics,
            aggregate_pk,
            input,
        })
    }

    fn ready_type() -> MessageType {
        MessageType::Sign(SignMessageType::Ready)
    }

    fn protocol_type() -> ProtocolType {
        ProtocolType::Sign
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
            "SIGN: Player {}: received {:?} from {}",
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
            MessageType::Sign(SignMessageType::Ready) => self.handle_ready_msg(rng, message),
            MessageType::Broadcast(_) => {
                let broadcast_outcome = self.handle_broadcast(message)?;
                broadcast_outcome.convert(self, Self::handle_round_one_broadcast, rng)
            }
            MessageType::Sign(SignMessageType::R1RangeProof) => {
                self.handle_round_one_proof(rng, message)
            }
            MessageType::Sign(SignMessageType::R2MtA) => self.handle_round_two_msg(rng, message),
            MessageType::Sign(SignMessageType::R3DeltaShare) => {
                self.handle_round_three_msg(rng, message)
            }
            MessageType::Sign(SignMessageType::R4SigShare) => self.handle_round_four_msg(message),
            MessageType::Sign(SignMessageType::R5Blame) => self.handle_round_five_msg(message),
            message_type => {
                error!("Incorrect MessageType given to SignParticipant. Got: {message_type:?}");
                Err(InternalError::InternalInvariantFailed)
            }
        }
    }

    fn status(&self) -> &Status {
        &self.status
    }
}

impl InnerProtocolParticipant for SignParticipant {
    type Context = SignContext;

    fn retrieve_context(&self) -> Self::Context {
        SignContext::collect(self)
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

impl Broadcast for SignParticipant {
    fn broadcast_participant(&mut self) -> &mut BroadcastParticipant {
        &mut self.broadcast_participant
    }
}

impl SignParticipant {
    /// The message digest reduced into the scalar field.
    fn message_scalar(&self) -> Scalar {
        <Scalar as Reduce<U256>>::reduce_bytes(&self.input.digest_hash())
    }

    /// Handle the ready signal: run round one and replay early broadcasts.
    #[instrument(skip_all, err(Debug))]
    fn handle_ready_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        info!("Handling ready sign message.");

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
                broadcast_outcome.convert(self, Self::handle_round_one_broadcast, rng)
            })
            .collect::<Result<Vec<_>>>()?;

        ready_outcome
            .with_messages(round_one_messages)
            .consolidate(broadcast_outcomes)
    }

    /// Generate round one: nonce ciphertexts (echo broadcast) plus a
    /// range proof on `K_i` for each verifier.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_one_msgs<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        sid: Identifier,
    ) -> Result<Vec<Message>> {
        info!("Generating round one sign messages.");

        let order = k256_order();
        let k = BigNumber::from_rng(&order, rng);
        let gamma = BigNumber::from_rng(&order, rng);

        let dk = self.input.config().decryption_key();
        let own_pk = dk.encryption_key();
        let (K, rho) = dk.encrypt(rng, &k)?;
        let (G, nu) = dk.encrypt(rng, &gamma)?;

        // Per-verifier range proofs over the verifier's parameters.
        let context = self.retrieve_context();
        let mut proof_messages = Vec::with_capacity(self.other_ids().len());
        for &verifier in self.other_ids() {
            let setup = self.input.config().public_material(verifier)?.pedersen();
            let mut transcript =
                sign_transcript(b"sign range proof", self.sid(), self.id(), verifier)?;
            let proof = PiEncProof::prove(
                pienc::CommonInput::new(setup, &own_pk, &K),
                pienc::ProverSecret::new(&k, &rho),
                &context,
                &mut transcript,
                rng,
            )?;
            proof_messages.push(Message::new(
                MessageType::Sign(SignMessageType::R1RangeProof),
                sid,
                self.id(),
                verifier,
                &round_one::PublicProof { proof },
            )?);
        }

        let public = round_one::PublicBroadcast {
            K: K.clone(),
            G: G.clone(),
        };
        let mut messages = self.broadcast(
            MessageType::Sign(SignMessageType::R1Broadcast),
            &public,
            sid,
            BroadcastTag::SignR1Nonces,
        )?;
        messages.extend(proof_messages);

        self.local_storage.store::<storage::R1Private>(
            self.id(),
            round_one::Private { k, rho, gamma, nu },
        );
        self.local_storage
            .store::<storage::R1Public>(self.id(), public);
        self.local_storage
            .store::<storage::RangeProofVerified>(self.id(), ());

        Ok(messages)
    }

    /// Handle an agreed-upon round one broadcast: store the sender's
    /// nonce ciphertexts and replay any proofs waiting on them.
    #[instrument(skip_all, err(Debug))]
    fn handle_round_one_broadcast<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        broadcast_message: BroadcastOutput,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let message = broadcast_message.into_message(BroadcastTag::SignR1Nonces)?;
        self.check_for_duplicate_msg::<storage::R1Public>(message.from())?;
        info!("Handling round one sign broadcast.");

        let public = round_one::PublicBroadcast::from_message(&message)?;
        self.local_storage
            .store_once::<storage::R1Public>(message.from(), public)?;

        // Proofs can arrive before the ciphertexts they speak about.
        let stashed = self.fetch_messages(MessageType::Sign(SignMessageType::R1RangeProof))?;
        let outcomes = stashed
            .iter()
            .map(|msg| self.handle_round_one_proof(rng, msg))
            .collect::<Result<Vec<_>>>()?;

        ProcessOutcome::Incomplete.consolidate(outcomes)
    }

    /// Handle a round one range proof for the sender's `K`.
    #[instrument(skip_all, err(Debug))]
    fn handle_round_one_proof<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        if !self
            .local_storage
            .contains::<storage::R1Public>(message.from())
            || !self.local_storage.contains::<storage::R1Private>(self.id())
        {
            info!("Not yet ready to handle round one sign proof.");
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        self.check_for_duplicate_msg::<storage::RangeProofVerified>(message.from())?;
        info!("Handling round one sign proof.");

        let proof = round_one::PublicProof::from_message(message)?;
        let sender_public = self
            .local_storage
            .retrieve::<storage::R1Public>(message.from())?;
        let config = self.input.config();
        let own_setup = config.public_material(self.id())?.pedersen();
        let sender_pk = config.public_material(message.from())?.paillier();

        let mut transcript =
            sign_transcript(b"sign range proof", self.sid(), message.from(), self.id())?;
        proof
            .proof
            .verify(
                pienc::CommonInput::new(own_setup, sender_pk, &sender_public.K),
                &self.retrieve_context(),
                &mut transcript,
            )
            .map_err(|_| {
                InternalError::blame(message.from(), Fault::ZkProofFailed(ProofKind::Enc))
            })?;

        self.local_storage
            .store::<storage::RangeProofVerified>(message.from(), ());

        self.maybe_gen_round_two_msgs(rng)
    }

    /// Cross into round two once every ciphertext and proof arrived.
    fn maybe_gen_round_two_msgs<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let all = self.all_participants();
        let r1_done = self
            .local_storage
            .contains_for_all_ids::<storage::R1Public>(&all)
            && self
                .local_storage
                .contains_for_all_ids::<storage::RangeProofVerified>(&all);
        if !r1_done {
            return Ok(ProcessOutcome::Incomplete);
        }

        let round_two_messages = run_only_once!(self.gen_round_two_msgs(rng))?;

        let round_two_outcomes = self
            .fetch_messages(MessageType::Sign(SignMessageType::R2MtA))?
            .iter()
            .map(|msg| self.handle_round_two_msg(rng, msg))
            .collect::<Result<Vec<_>>>()?;

        ProcessOutcome::collect_with_messages(round_two_outcomes, round_two_messages)
    }

    /// Generate round two: the two MtA transforms and the `Γ` binding
    /// proof for each peer. The per-peer work is independent; fan it out
    /// on the pool.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_two_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        info!("Generating round two sign messages.");

        let config = self.input.config();
        let dk = config.decryption_key();
        let own_pk = dk.encryption_key();
        let r1_private = self.local_storage.retrieve::<storage::R1Private>(self.id())?;
        let own_public = self.local_storage.retrieve::<storage::R1Public>(self.id())?;

        let x_bn = scalar_to_bn(&self.scaled_share);
        let (x_encryption, x_nonce) = dk.encrypt(rng, &x_bn)?;

        let gamma_point = CurvePoint::GENERATOR.multiply_by_bignum(&r1_private.gamma)?;

        let context = self.retrieve_context();
        let sid = self.sid();
        let sender = self.id();

        // Everything a per-peer job needs, cloned out of `self` so the
        // pool can run them in parallel.
        let jobs = self
            .other_ids()
            .iter()
            .map(|&recipient| {
                let material = config.public_material(recipient)?;
                let peer_K = self
                    .local_storage
                    .retrieve::<storage::R1Public>(recipient)?
                    .K
                    .clone();
                let seed: [u8; 32] = rng.gen();
                Ok((
                    recipient,
                    material.paillier().clone(),
                    material.pedersen().clone(),
                    peer_K,
                    seed,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let gamma = r1_private.gamma.clone();
        let nu = r1_private.nu.clone();
        let own_G = own_public.G.clone();
        let own_pk_ref = &own_pk;
        let x_bn_ref = &x_bn;
        let gamma_ref = &gamma;
        let nu_ref = &nu;
        let own_G_ref = &own_G;
        let context_ref = &context;
        let gamma_point_ref = &gamma_point;
        let x_encryption_ref = &x_encryption;
        let x_nonce_ref = &x_nonce;

        let results = self.input.pool().install(move || {
            jobs.into_par_iter()
                .map(|(recipient, peer_pk, peer_setup, peer_K, seed)| {
                    let mut job_rng = StdRng::from_seed(seed);

                    // The γ·k transform.
                    let beta = sample_mta_mask(&mut job_rng);
                    let neg_beta = -beta.clone();
                    let beta_transform_nonce = peer_pk.random_nonce(&mut job_rng)?;
                    let enc_neg_beta =
                        peer_pk.encrypt_with_nonce(&neg_beta, &beta_transform_nonce)?;
                    let D = peer_pk.multiply_and_add(gamma_ref, &peer_K, &enc_neg_beta)?;
                    let beta_nonce = own_pk_ref.random_nonce(&mut job_rng)?;
                    let F = own_pk_ref.encrypt_with_nonce(&neg_beta, &beta_nonce)?;

                    // The x·k transform.
                    let beta_hat = sample_mta_mask(&mut job_rng);
                    let neg_beta_hat = -beta_hat.clone();
                    let beta_hat_transform_nonce = peer_pk.random_nonce(&mut job_rng)?;
                    let enc_neg_beta_hat =
                        peer_pk.encrypt_with_nonce(&neg_beta_hat, &beta_hat_transform_nonce)?;
                    let D_hat = peer_pk.multiply_and_add(x_bn_ref, &peer_K, &enc_neg_beta_hat)?;
                    let beta_hat_nonce = own_pk_ref.random_nonce(&mut job_rng)?;
                    let F_hat = own_pk_ref.encrypt_with_nonce(&neg_beta_hat, &beta_hat_nonce)?;

                    let mut transcript =
                        sign_transcript(b"sign mta affg", sid, sender, recipient)?;
                    let affg = PiAffgProof::prove(
                        piaffg::CommonInput::new(
                            &peer_setup,
                            &peer_pk,
                            own_pk_ref,
                            &peer_K,
                            &D,
                            &F,
                            gamma_point_ref,
                        ),
                        piaffg::ProverSecret::new(
                            gamma_ref,
                            &neg_beta,
                            &beta_transform_nonce,
                            &beta_nonce,
                        ),
                        context_ref,
                        &mut transcript,
                        &mut job_rng,
                    )?;

                    let mut transcript =
                        sign_transcript(b"sign mta affp", sid, sender, recipient)?;
                    let affp = PiAffpProof::prove(
                        piaffp::CommonInput::new(
                            &peer_setup,
                            &peer_pk,
                            own_pk_ref,
                            &peer_K,
                            &D_hat,
                            &F_hat,
                            x_encryption_ref,
                        ),
                        piaffp::ProverSecret::new(
                            x_bn_ref,
                            &neg_beta_hat,
                            &beta_hat_transform_nonce,
                            x_nonce_ref,
                            &beta_hat_nonce,
                        ),
                        context_ref,
                        &mut transcript,
                        &mut job_rng,
                    )?;

                    let mut transcript =
                        sign_transcript(b"sign gamma log", sid, sender, recipient)?;
                    let pilog = PiLogProof::prove(
                        pilog::CommonInput::new(
                            &peer_setup,
                            own_pk_ref,
                            own_G_ref,
                            gamma_point_ref,
                            &CurvePoint::GENERATOR,
                        ),
                        pilog::ProverSecret::new(gamma_ref, nu_ref),
                        context_ref,
                        &mut transcript,
                        &mut job_rng,
                    )?;

                    let message = Message::new(
                        MessageType::Sign(SignMessageType::R2MtA),
                        sid,
                        sender,
                        recipient,
                        &round_two::Public {
                            gamma_point: *gamma_point_ref,
                            D,
                            F,
                            D_hat,
                            F_hat,
                            x_encryption: x_encryption_ref.clone(),
                            affg,
                            affp,
                            pilog,
                        },
                    )?;

                    let secrets = round_two::MtaSecrets {
                        beta,
                        beta_nonce,
                        beta_hat,
                        beta_hat_nonce,
                    };
                    Ok((recipient, message, secrets))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut messages = Vec::with_capacity(results.len());
        for (recipient, message, secrets) in results {
            self.local_storage
                .store::<storage::MtaSecretsFor>(recipient, secrets);
            messages.push(message);
        }

        self.local_storage
            .store::<storage::R2Gamma>(self.id(), gamma_point);

        Ok(messages)
    }

    /// Handle a round two message: verify the sender's MtA transforms of
    /// our `K` and its `Γ` binding.
    #[instrument(skip_all, err(Debug))]
    fn handle_round_two_msg<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        if !self.local_storage.contains::<storage::R2Gamma>(self.id()) {
            info!("Not yet ready to handle round two sign message.");
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        self.check_for_duplicate_msg::<storage::R2Received>(message.from())?;
        info!("Handling round two sign message.");

        let public = round_two::Public::from_message(message)?;

        let config = self.input.config();
        let own_material = config.public_material(self.id())?;
        let sender_pk = config.public_material(message.from())?.paillier();
        let own_K = &self
            .local_storage
            .retrieve::<storage::R1Public>(self.id())?
            .K;
        let sender_G = &self
            .local_storage
            .retrieve::<storage::R1Public>(message.from())?
            .G;
        let context = self.retrieve_context();

        let mut transcript = sign_transcript(b"sign mta affg", self.sid(), message.from(), self.id())?;
        public
            .affg
            .clone()
            .verify(
                piaffg::CommonInput::new(
                    own_material.pedersen(),
                    own_material.paillier(),
                    sender_pk,
                    own_K,
                    &public.D,
                    &public.F,
                    &public.gamma_point,
                ),
                &context,
                &mut transcript,
            )
            .map_err(|_| {
                InternalError::blame(message.from(), Fault::ZkProofFailed(ProofKind::AffG))
            })?;

        let mut transcript = sign_transcript(b"sign mta affp", self.sid(), message.from(), self.id())?;
        public
            .affp
            .clone()
            .verify(
                piaffp::CommonInput::new(
                    own_material.pedersen(),
                    own_material.paillier(),
                    sender_pk,
                    own_K,
                    &public.D_hat,
                    &public.F_hat,
                    &public.x_encryption,
                ),
                &context,
                &mut transcript,
            )
            .map_err(|_| {
                InternalError::blame(message.from(), Fault::ZkProofFailed(ProofKind::AffP))
            })?;

        let mut transcript = sign_transcript(b"sign gamma log", self.sid(), message.from(), self.id())?;
        public
            .pilog
            .clone()
            .verify(
                pilog::CommonInput::new(
                    own_material.pedersen(),
                    sender_pk,
                    sender_G,
                    &public.gamma_point,
                    &CurvePoint::GENERATOR,
                ),
                &context,
                &mut transcript,
            )
            .map_err(|_| {
                InternalError::blame(message.from(), Fault::ZkProofFailed(ProofKind::LogStar))
            })?;

        self.local_storage
            .store::<storage::R2Gamma>(message.from(), public.gamma_point);
        self.local_storage
            .store::<storage::R2Received>(message.from(), public);

        self.maybe_gen_round_three_msgs(rng)
    }

    /// Cross into round three once every MtA arrived.
    fn maybe_gen_round_three_msgs<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let r2_done = self
            .local_storage
            .contains_for_all_ids::<storage::R2Received>(self.other_ids())
            && self
                .local_storage
                .contains_for_all_ids::<storage::R2Gamma>(&self.all_participants());
        if !r2_done {
            return Ok(ProcessOutcome::Incomplete);
        }

        let round_three_messages = run_only_once!(self.gen_round_three_msgs(rng))?;

        let mut outcomes = self
            .fetch_messages(MessageType::Sign(SignMessageType::R3DeltaShare))?
            .iter()
            .map(|msg| self.handle_round_three_msg(rng, msg))
            .collect::<Result<Vec<_>>>()?;
        let blame_outcomes = self
            .fetch_messages(MessageType::Sign(SignMessageType::R5Blame))?
            .iter()
            .map(|msg| self.handle_round_five_msg(msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.extend(blame_outcomes);

        ProcessOutcome::collect_with_messages(outcomes, round_three_messages)
    }

    /// Generate round three: decrypt the MtA outputs, build the additive
    /// shares `δ_i` and `χ_i`, and publish `δ_i`, `Δ_i = k_i·Γ`.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_three_msgs<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Vec<Message>> {
        info!("Generating round three sign messages.");

        let config = self.input.config();
        let dk = config.decryption_key();
        let r1_private = self.local_storage.retrieve::<storage::R1Private>(self.id())?;

        // Γ = Σ Γ_j over the whole subset.
        let mut Gamma = CurvePoint::IDENTITY;
        for pid in self.all_participants() {
            Gamma = Gamma + *self.local_storage.retrieve::<storage::R2Gamma>(pid)?;
        }

        // δ_i = γ_i·k_i + Σ_j (α_ij + β_ij), and the hatted variant.
        let mut delta_bn = &r1_private.gamma * &r1_private.k;
        let mut chi_bn = scalar_to_bn(&self.scaled_share) * &r1_private.k;
        for &peer in self.other_ids() {
            let received = self.local_storage.retrieve::<storage::R2Received>(peer)?;
            let secrets = self.local_storage.retrieve::<storage::MtaSecretsFor>(peer)?;

            let alpha = dk
                .decrypt(&received.D)
                .map_err(|err| err.attributed_to(peer))?;
            let alpha_hat = dk
                .decrypt(&received.D_hat)
                .map_err(|err| err.attributed_to(peer))?;

            delta_bn = delta_bn + alpha + &secrets.beta;
            chi_bn = chi_bn + alpha_hat + &secrets.beta_hat;
        }
        let delta = bn_to_scalar(&delta_bn)?;
        let chi = bn_to_scalar(&chi_bn)?;

        let Delta = Gamma.multiply_by_bignum(&r1_private.k)?;

        // Per-verifier binding of Δ_i to K_i over the base Γ.
        let own_pk = dk.encryption_key();
        let own_K = &self
            .local_storage
            .retrieve::<storage::R1Public>(self.id())?
            .K;
        let context = self.retrieve_context();
        let mut messages = Vec::with_capacity(self.other_ids().len());
        for &verifier in self.other_ids() {
            let setup = config.public_material(verifier)?.pedersen();
            let mut transcript =
                sign_transcript(b"sign delta log", self.sid(), self.id(), verifier)?;
            let psi_double_prime = PiLogProof::prove(
                pilog::CommonInput::new(setup, &own_pk, own_K, &Delta, &Gamma),
                pilog::ProverSecret::new(&r1_private.k, &r1_private.rho),
                &context,
                &mut transcript,
                rng,
            )?;
            messages.push(Message::new(
                MessageType::Sign(SignMessageType::R3DeltaShare),
                self.sid(),
                self.id(),
                verifier,
                &round_three::Public {
                    delta,
                    Delta,
                    psi_double_prime,
                },
            )?);
        }

        self.local_storage
            .store::<storage::R3Public>(self.id(), (delta, Delta));
        self.local_storage.store::<storage::R3Private>(
            self.id(),
            round_three::Private {
                delta,
                chi,
                Gamma,
                Delta,
            },
        );

        Ok(messages)
    }

    /// Handle a round three message: verify the `Δ` binding and store the
    /// sender's shares.
    #[instrument(skip_all, err(Debug))]
    fn handle_round_three_msg<R: RngCore + CryptoRng>(
        &mut self,
        _rng: &mut R,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        if !self.local_storage.contains::<storage::R3Private>(self.id()) {
            info!("Not yet ready to handle round three sign message.");
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        self.check_for_duplicate_msg::<storage::R3Public>(message.from())?;
        info!("Handling round three sign message.");

        let public = round_three::Public::from_message(message)?;

        let config = self.input.config();
        let own_setup = config.public_material(self.id())?.pedersen();
        let sender_pk = config.public_material(message.from())?.paillier();
        let sender_K = &self
            .local_storage
            .retrieve::<storage::R1Public>(message.from())?
            .K;
        let Gamma = self
            .local_storage
            .retrieve::<storage::R3Private>(self.id())?
            .Gamma;

        let mut transcript =
            sign_transcript(b"sign delta log", self.sid(), message.from(), self.id())?;
        public
            .psi_double_prime
            .verify(
                pilog::CommonInput::new(own_setup, sender_pk, sender_K, &public.Delta, &Gamma),
                &self.retrieve_context(),
                &mut transcript,
            )
            .map_err(|_| {
                InternalError::blame(message.from(), Fault::ZkProofFailed(ProofKind::LogStar))
            })?;

        self.local_storage
            .store::<storage::R3Public>(message.from(), (public.delta, public.Delta));

        self.maybe_gen_round_four_msgs()
    }

    /// Cross into round four once every δ share arrived: check the MtA
    /// consistency and either publish a partial signature or abort.
    fn maybe_gen_round_four_msgs(
        &mut self,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let r3_done = self
            .local_storage
            .contains_for_all_ids::<storage::R3Public>(&self.all_participants());
        if !r3_done {
            return Ok(ProcessOutcome::Incomplete);
        }

        let round_four_messages = run_only_once!(self.gen_round_four_msgs())?;

        let mut outcomes = self
            .fetch_messages(MessageType::Sign(SignMessageType::R4SigShare))?
            .iter()
            .map(|msg| self.handle_round_four_msg(msg))
            .collect::<Result<Vec<_>>>()?;
        let blame_outcomes = self
            .fetch_messages(MessageType::Sign(SignMessageType::R5Blame))?
            .iter()
            .map(|msg| self.handle_round_five_msg(msg))
            .collect::<Result<Vec<_>>>()?;
        outcomes.extend(blame_outcomes);

        // If every σ share already arrived (they can outrun our own round
        // four), the output is ready now.
        let output_outcome = self.maybe_compute_output()?;
        ProcessOutcome::collect_with_messages(outcomes, round_four_messages)?
            .consolidate(vec![output_outcome])
    }

    /// Generate round four: the partial signature — or, when the δ
    /// consistency check fails, the opening that starts the abort phase.
    #[instrument(skip_all, err(Debug))]
    fn gen_round_four_msgs(&mut self) -> Result<Vec<Message>> {
        info!("Generating round four sign messages.");

        let all = self.all_participants();
        let mut delta = Scalar::ZERO;
        let mut big_delta = CurvePoint::IDENTITY;
        for pid in &all {
            let (delta_share, Delta_share) =
                self.local_storage.retrieve::<storage::R3Public>(*pid)?;
            delta += delta_share;
            big_delta = big_delta + *Delta_share;
        }

        // Σ Δ_j must equal δ·G; otherwise some party's δ share is
        // inconsistent with its Δ and we enter the abort phase.
        if CurvePoint::GENERATOR.multiply_by_scalar(&delta) != big_delta {
            error!("delta shares are inconsistent with the Delta points; entering abort");
            return self.gen_blame_msgs();
        }

        let r3_private = self.local_storage.retrieve::<storage::R3Private>(self.id())?;
        let delta_inv = Option::<Scalar>::from(delta.invert()).ok_or_else(|| {
            error!("delta is zero; either you got profoundly unlucky or more likely there's a bug");
            InternalError::InternalInvariantFailed
        })?;
        let R = r3_private.Gamma.multiply_by_scalar(&delta_inv);
        let r = R.x_projection()?;

        let r1_private = self.local_storage.retrieve::<storage::R1Private>(self.id())?;
        let k_scalar = bn_to_scalar(&r1_private.k)?;
        let sigma = k_scalar * self.message_scalar() + r * r3_private.chi;

        self.local_storage.store::<storage::RProjection>(self.id(), r);
        self.local_storage
            .store::<storage::SigShare>(self.id(), SignatureShare(sigma));

        self.message_for_other_participants(
            MessageType::Sign(SignMessageType::R4SigShare),
            SignatureShare(sigma),
        )
    }

    /// Handle a partial signature from a peer.
    #[instrument(skip_all, err(Debug))]
    fn handle_round_four_msg(
        &mut self,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let in_abort = self.local_storage.contains::<storage::AbortFlag>(self.id());
        if !in_abort && !self.local_storage.contains::<storage::RProjection>(self.id()) {
            info!("Not yet ready to handle round four sign message.");
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }
        self.check_for_duplicate_msg::<storage::SigShare>(message.from())?;
        info!("Handling round four sign message.");

        let share = SignatureShare::from_message(message)?;
        self.local_storage
            .store::<storage::SigShare>(message.from(), share);

        if in_abort {
            // The shares are still recorded for the σ recomputation, but
            // no signature will be assembled.
            return Ok(ProcessOutcome::Incomplete);
        }

        self.maybe_compute_output()
    }

    /// Assemble and verify the signature once every share arrived.
    fn maybe_compute_output(
        &mut self,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        if *self.status() == Status::TerminatedSuccessfully {
            return Ok(ProcessOutcome::Incomplete);
        }
        if self.local_storage.contains::<storage::AbortFlag>(self.id())
            || !self.local_storage.contains::<storage::RProjection>(self.id())
            || !self
                .local_storage
                .contains_for_all_ids::<storage::SigShare>(&self.all_participants())
        {
            return Ok(ProcessOutcome::Incomplete);
        }

        let r = *self.local_storage.retrieve::<storage::RProjection>(self.id())?;
        let shares = self
            .all_participants()
            .iter()
            .map(|pid| self.local_storage.retrieve::<storage::SigShare>(*pid).copied())
            .collect::<Result<Vec<_>>>()?;
        let signature = SignatureShare::assemble(&r, shares.into_iter())?;

        match verify_signature(&self.aggregate_pk, self.input.digest(), &signature) {
            Ok(()) => {
                self.status = Status::TerminatedSuccessfully;
                Ok(ProcessOutcome::Terminated(signature))
            }
            Err(_) => {
                error!("assembled signature failed to verify; entering abort");
                let blame_messages = self.gen_blame_msgs()?;
                Ok(ProcessOutcome::Processed(blame_messages))
            }
        }
    }

    /// Start (or join) the abort phase: open our nonces and masks.
    fn gen_blame_msgs(&mut self) -> Result<Vec<Message>> {
        let messages = run_only_once!(self.gen_blame_msgs_impl())?;
        Ok(messages)
    }

    #[instrument(skip_all, err(Debug))]
    fn gen_blame_msgs_impl(&mut self) -> Result<Vec<Message>> {
        info!("Generating blame messages.");
        self.local_storage.store::<storage::AbortFlag>(self.id(), ());

        let r1_private = self.local_storage.retrieve::<storage::R1Private>(self.id())?;
        let mut delta_openings = Vec::with_capacity(self.other_ids().len());
        let mut chi_openings = Vec::with_capacity(self.other_ids().len());
        for &peer in self.other_ids() {
            let secrets = self.local_storage.retrieve::<storage::MtaSecretsFor>(peer)?;
            delta_openings.push(MaskOpening {
                recipient: peer,
                beta: secrets.beta.clone(),
                nonce: secrets.beta_nonce.clone(),
            });
            chi_openings.push(MaskOpening {
                recipient: peer,
                beta: secrets.beta_hat.clone(),
                nonce: secrets.beta_hat_nonce.clone(),
            });
        }
        let data = BlameData {
            k: r1_private.k.clone(),
            rho: r1_private.rho.clone(),
            gamma: r1_private.gamma.clone(),
            nu: r1_private.nu.clone(),
            delta_openings,
            chi_openings,
        };

        let messages = self.message_for_other_participants(
            MessageType::Sign(SignMessageType::R5Blame),
            &data,
        )?;
        self.local_storage
            .store::<storage::BlameShared>(self.id(), data);

        Ok(messages)
    }

    /// Handle a peer's opening in the abort phase.
    #[instrument(skip_all, err(Debug))]
    fn handle_round_five_msg(
        &mut self,
        message: &Message,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        if !self.local_storage.contains::<storage::R3Private>(self.id()) {
            info!("Not yet ready to handle a blame message.");
            self.stash_message(message)?;
            return Ok(ProcessOutcome::Incomplete);
        }

        // A peer declaring an abort pulls us into the abort phase too.
        let mut messages = Vec::new();
        if !self.local_storage.contains::<storage::AbortFlag>(self.id()) {
            messages = self.gen_blame_msgs()?;
        }

        self.check_for_duplicate_msg::<storage::BlameShared>(message.from())?;
        info!("Handling blame message.");

        let data = BlameData::from_message(message)?;
        self.verify_blame_data(message.from(), &data)?;
        self.local_storage
            .store::<storage::BlameShared>(message.from(), data);

        let outcome = self.maybe_adjudicate()?;
        Ok(outcome.with_messages(messages))
    }

    /// Check a peer's openings against the binding ciphertexts this
    /// party holds.
    fn verify_blame_data(&self, from: ParticipantIdentifier, data: &BlameData) -> Result<()> {
        let order = k256_order();
        if data.k >= order
            || data.k < BigNumber::zero()
            || data.gamma >= order
            || data.gamma < BigNumber::zero()
        {
            error!("{from} opened nonce shares outside the scalar field");
            return Err(InternalError::blame(from, Fault::ProtocolViolation));
        }

        let sender_pk = self.input.config().public_material(from)?.paillier();
        let r1_public = self.local_storage.retrieve::<storage::R1Public>(from)?;

        // The opened k and γ must reproduce the round 1 ciphertexts.
        if sender_pk.encrypt_with_nonce(&data.k, &data.rho)? != r1_public.K
            || sender_pk.encrypt_with_nonce(&data.gamma, &data.nu)? != r1_public.G
        {
            error!("{from} opened nonces that do not match its round 1 ciphertexts");
            return Err(InternalError::blame(from, Fault::ProtocolViolation));
        }

        // The opened masks toward us must reproduce the binding `F`
        // ciphertexts from round 2. (Only our own pair is checkable
        // locally; lies about other pairs are caught by their partner.)
        let received = self.local_storage.retrieve::<storage::R2Received>(from)?;
        let delta_opening = data
            .delta_opening_for(self.id())
            .ok_or_else(|| InternalError::blame(from, Fault::ProtocolViolation))?;
        let chi_opening = data
            .chi_opening_for(self.id())
            .ok_or_else(|| InternalError::blame(from, Fault::ProtocolViolation))?;
        let neg_beta = -delta_opening.beta.clone();
        let neg_beta_hat = -chi_opening.beta.clone();
        if sender_pk.encrypt_with_nonce(&neg_beta, &delta_opening.nonce)? != received.F
            || sender_pk.encrypt_with_nonce(&neg_beta_hat, &chi_opening.nonce)? != received.F_hat
        {
            error!("{from} opened MtA masks that do not match its binding ciphertexts");
            return Err(InternalError::blame(from, Fault::ProtocolViolation));
        }

        // Δ must be consistent with the opened k.
        let Gamma = self
            .local_storage
            .retrieve::<storage::R3Private>(self.id())?
            .Gamma;
        let (_, Delta) = self.local_storage.retrieve::<storage::R3Public>(from)?;
        if &Gamma.multiply_by_bignum(&data.k)? != Delta {
            error!("{from} opened a k inconsistent with its Delta point");
            return Err(InternalError::blame(from, Fault::ProtocolViolation));
        }

        Ok(())
    }

    /// Recompute every published share from the openings and terminate
    /// with the set of parties whose shares do not reconcile.
    fn maybe_adjudicate(
        &mut self,
    ) -> Result<ProcessOutcome<<Self as ProtocolParticipant>::Output>> {
        let all = self.all_participants();
        if !self
            .local_storage
            .contains_for_all_ids::<storage::BlameShared>(&all)
        {
            return Ok(ProcessOutcome::Incomplete);
        }
        info!("All openings received; adjudicating the abort.");

        let message_scalar = self.message_scalar();
        let mut culprits = Vec::new();

        for &party in &all {
            let data = self.local_storage.retrieve::<storage::BlameShared>(party)?;

            // δ_j == γ_j·k_j + Σ_{i≠j} [(γ_i·k_j - β_ij) + β_ji]?
            let mut expected = &data.gamma * &data.k;
            let mut openings_complete = true;
            for &other in &all {
                if other == party {
                    continue;
                }
                let other_data = self.local_storage.retrieve::<storage::BlameShared>(other)?;
                match (
                    other_data.delta_opening_for(party),
                    data.delta_opening_for(other),
                ) {
                    (Some(incoming), Some(outgoing)) => {
                        expected = expected + &other_data.gamma * &data.k - &incoming.beta
                            + &outgoing.beta;
                    }
                    _ => {
                        // A missing opening already incriminates its
                        // owner through `verify_blame_data`; skip the
                        // recomputation for this pair.
                        openings_complete = false;
                    }
                }
            }
            let (published_delta, _) = self.local_storage.retrieve::<storage::R3Public>(party)?;
            if openings_complete && &bn_to_scalar(&expected)? != published_delta {
                error!("{party} published a delta share that does not reconcile");
                culprits.push(party);
                continue;
            }

            // σ_j·G == (k_j·m)·G + r·χ_j·G, with χ_j·G recomputed from
            // public key shares and the opened χ masks? Only applicable
            // when the session got far enough to fix `r` and `j`
            // published a share.
            let has_r = self.local_storage.contains::<storage::RProjection>(self.id());
            if has_r && self.local_storage.contains::<storage::SigShare>(party) {
                let r = *self
                    .local_storage
                    .retrieve::<storage::RProjection>(self.id())?;
                let share = self.local_storage.retrieve::<storage::SigShare>(party)?;
                let k_scalar = bn_to_scalar(&data.k)?;

                let mut chi_point = self.aggregate_pk.multiply_by_scalar(&k_scalar);
                let mut mask_sum = BigNumber::zero();
                for &other in &all {
                    if other == party {
                        continue;
                    }
                    let other_data =
                        self.local_storage.retrieve::<storage::BlameShared>(other)?;
                    if let (Some(outgoing), Some(incoming)) = (
                        data.chi_opening_for(other),
                        other_data.chi_opening_for(party),
                    ) {
                        mask_sum = mask_sum + &outgoing.beta - &incoming.beta;
                    }
                }
                chi_point = chi_point
                    + CurvePoint::GENERATOR.multiply_by_scalar(&bn_to_scalar(&mask_sum)?);

                let lhs = CurvePoint::GENERATOR.multiply_by_scalar(&share.0);
                let rhs = CurvePoint::GENERATOR.multiply_by_scalar(&(k_scalar * message_scalar))
                    + chi_point.multiply_by_scalar(&r);
                if lhs != rhs {
                    error!("{party} published a signature share that does not reconcile");
                    culprits.push(party);
                }
            }
        }

        Err(InternalError::ProtocolError(Violation::blame_all(
            culprits,
            Fault::SignatureInvalid,
        )))
    }
}

/// Transcript for a signing proof, forked by prover and verifier.
fn sign_transcript(
    label: &'static [u8],
    sid: Identifier,
    sender: ParticipantIdentifier,
    verifier: ParticipantIdentifier,
) -> Result<Transcript> {
    let mut transcript = Transcript::new(b"sign proof");
    transcript.append_message(b"label", label);
    transcript.append_message(b"sid", &serialize!(&sid)?);
    transcript.append_message(b"sender", &serialize!(&sender)?);
    transcript.append_message(b"verifier", &serialize!(&verifier)?);
    Ok(transcript)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        keygen::{output::testing::simulate_quorum, Config, KeygenParticipant},
        pool::Pool,
        utils::testing::init_testing,
    };
    use k256::ecdsa::signature::DigestVerifier;
    use rand::rngs::StdRng;
    use sha2::{Digest, Sha256};
    use std::collections::HashMap;

    /// Drive a set of participants to completion with random delivery
    /// order, passing every outgoing message through `tamper`.
    fn run_with_tamper<P, F>(
        sid: Identifier,
        quorum: &mut [P],
        rng: &mut StdRng,
        mut tamper: F,
    ) -> (HashMap<ParticipantIdentifier, P::Output>, Vec<crate::errors::Violation>)
    where
        P: ProtocolParticipant,
        F: FnMut(Message, &mut StdRng) -> Vec<Message>,
    {
        let mut inboxes: HashMap<_, Vec<Message>> = HashMap::new();
        for participant in quorum.iter() {
            let _ = inboxes.insert(participant.id(), vec![]);
        }
        for participant in quorum.iter() {
            let empty: [u8; 0] = [];
            let ready = Message::new(P::ready_type(), sid, participant.id(), participant.id(), &empty)
                .unwrap();
            inboxes.get_mut(&participant.id()).unwrap().push(ready);
        }

        let mut outputs = HashMap::new();
        let mut violations = Vec::new();
        loop {
            if quorum
                .iter()
                .all(|p| *p.status() == Status::TerminatedSuccessfully)
            {
                break;
            }
            let index = rng.gen_range(0..quorum.len());
            let participant = &mut quorum[index];
            let inbox = inboxes.get_mut(&participant.id()).unwrap();
            if inbox.is_empty() {
                if inboxes.values().all(|inbox| inbox.is_empty()) {
                    break;
                }
                continue;
            }
            let message = inbox.remove(rng.gen_range(0..inbox.len()));
            match participant.process_message(rng, &message) {
                Ok(outcome) => {
                    let (output, messages) = outcome.into_parts();
                    if let Some(output) = output {
                        let _ = outputs.insert(quorum[index].id(), output);
                    }
                    for message in messages {
                        for tampered in tamper(message, rng) {
                            inboxes.get_mut(&tampered.to()).unwrap().push(tampered);
                        }
                    }
                }
                Err(InternalError::ProtocolError(violation)) => violations.push(violation),
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        (outputs, violations)
    }

    fn run_honest<P: ProtocolParticipant>(
        sid: Identifier,
        quorum: &mut [P],
        rng: &mut StdRng,
    ) -> HashMap<ParticipantIdentifier, P::Output> {
        let (outputs, violations) = run_with_tamper(sid, quorum, rng, |message, _| vec![message]);
        assert!(violations.is_empty(), "honest run produced violations");
        assert_eq!(outputs.len(), quorum.len(), "not every participant finished");
        outputs
    }

    fn run_keygen(quorum_size: usize, threshold: usize, rng: &mut StdRng) -> Vec<Config> {
        let sid = Identifier::random(rng);
        let mut quorum =
            KeygenParticipant::new_quorum(sid, quorum_size, threshold, rng).unwrap();
        let mut outputs = run_honest(sid, &mut quorum, rng);
        quorum
            .iter()
            .map(|participant| outputs.remove(&participant.id()).unwrap())
            .collect()
    }

    fn sign_quorum(
        configs: &[Config],
        signers: &[ParticipantIdentifier],
        message: &[u8],
        rng: &mut StdRng,
    ) -> (Identifier, Vec<SignParticipant>) {
        let sid = Identifier::random(rng);
        let quorum = configs
            .iter()
            .filter(|config| signers.contains(&config.id()))
            .map(|config| {
                let others = signers
                    .iter()
                    .copied()
                    .filter(|pid| *pid != config.id())
                    .collect::<Vec<_>>();
                let input = Input::new(
                    config.clone(),
                    signers.to_vec(),
                    message,
                    Pool::serial(),
                )
                .unwrap();
                SignParticipant::new(sid, config.id(), others, input).unwrap()
            })
            .collect();
        (sid, quorum)
    }

    fn assert_signatures_agree_and_verify(
        outputs: &HashMap<ParticipantIdentifier, Signature>,
        config: &Config,
        message: &[u8],
    ) -> Signature {
        let signatures: Vec<_> = outputs.values().collect();
        assert!(signatures.windows(2).all(|pair| pair[0] == pair[1]));
        let signature = *signatures[0];

        // Standard ECDSA verification, low-s form.
        let verifying_key = config.public_key().unwrap();
        assert!(verifying_key
            .verify_digest(Sha256::new_with_prefix(message), &signature)
            .is_ok());
        assert!(signature.normalize_s().is_none(), "signature is not low-s");
        signature
    }

    #[test]
    fn keygen_then_sign_produces_a_valid_signature() {
        let mut rng = init_testing();

        // Keygen over three parties with threshold 1: any two can sign.
        let configs = run_keygen(3, 1, &mut rng);
        let pids: Vec<_> = configs.iter().map(Config::id).collect();

        let message = b"hello";
        let signers = vec![pids[0], pids[2]];
        let (sid, mut quorum) = sign_quorum(&configs, &signers, message, &mut rng);
        let outputs = run_honest(sid, &mut quorum, &mut rng);
        let _ = assert_signatures_agree_and_verify(&outputs, &configs[0], message);
    }

    #[test]
    fn signing_works_over_a_simulated_config() {
        let mut rng = init_testing();
        let mut pids: Vec<_> = (0..3)
            .map(|_| ParticipantIdentifier::random(&mut rng))
            .collect();
        pids.sort();
        let (_, configs) = simulate_quorum(&pids, 2, &mut rng);

        // Full-threshold subset: all three sign.
        let message = b"the quick brown fox jumped over the lazy dog";
        let (sid, mut quorum) = sign_quorum(&configs, &pids, message, &mut rng);
        let outputs = run_honest(sid, &mut quorum, &mut rng);
        let _ = assert_signatures_agree_and_verify(&outputs, &configs[0], message);
    }

    #[test]
    fn refresh_then_sign_with_a_different_subset() {
        let mut rng = init_testing();

        // 2-of-5 keygen.
        let configs = run_keygen(5, 1, &mut rng);
        let pids: Vec<_> = configs.iter().map(Config::id).collect();
        let public_key_point = configs[0].public_key_point();
        let message = b"hello";

        let (sid, mut quorum) = sign_quorum(&configs, &pids[0..2].to_vec(), message, &mut rng);
        let outputs = run_honest(sid, &mut quorum, &mut rng);
        let first = assert_signatures_agree_and_verify(&outputs, &configs[0], message);

        // Refresh every share.
        let refresh_sid = Identifier::random(&mut rng);
        let mut refresh_quorum = configs
            .iter()
            .map(|config| {
                let input =
                    crate::keygen::Input::refresh(config.clone(), Pool::serial()).unwrap();
                let others = config
                    .participants()
                    .into_iter()
                    .filter(|pid| *pid != config.id())
                    .collect::<Vec<_>>();
                KeygenParticipant::new(refresh_sid, config.id(), others, input).unwrap()
            })
            .collect::<Vec<_>>();
        let mut refreshed_outputs = run_honest(refresh_sid, &mut refresh_quorum, &mut rng);
        let refreshed: Vec<_> = refresh_quorum
            .iter()
            .map(|participant| refreshed_outputs.remove(&participant.id()).unwrap())
            .collect();

        // Same key, new shares.
        assert_eq!(refreshed[0].public_key_point(), public_key_point);
        for (old, new) in configs.iter().zip(&refreshed) {
            assert_ne!(old.secret_share(), new.secret_share());
        }

        // Sign the same message with a disjoint subset.
        let (sid, mut quorum) = sign_quorum(&refreshed, &pids[3..5].to_vec(), message, &mut rng);
        let outputs = run_honest(sid, &mut quorum, &mut rng);
        let second = assert_signatures_agree_and_verify(&outputs, &refreshed[0], message);

        // Both signatures verify under the one aggregate key; the nonce
        // differs so the signatures do too.
        assert_ne!(first, second);
    }

    #[test]
    fn inconsistent_delta_share_is_blamed() {
        let mut rng = init_testing();
        let mut pids: Vec<_> = (0..3)
            .map(|_| ParticipantIdentifier::random(&mut rng))
            .collect();
        pids.sort();
        let (_, configs) = simulate_quorum(&pids, 2, &mut rng);
        let message = b"blame me";
        let (sid, mut quorum) = sign_quorum(&configs, &pids, message, &mut rng);
        let cheater = pids[2];

        // The cheater ships δ shares inconsistent with its Δ point.
        let (outputs, violations) = run_with_tamper(sid, &mut quorum, &mut rng, |message, _| {
            if message.from() == cheater
                && message.message_type() == MessageType::Sign(SignMessageType::R3DeltaShare)
            {
                let mut public: round_three::Public =
                    deserialize!(&message.unverified_bytes).unwrap();
                public.delta += Scalar::ONE;
                vec![Message::new(
                    message.message_type(),
                    message.id(),
                    message.from(),
                    message.to(),
                    &public,
                )
                .unwrap()]
            } else {
                vec![message]
            }
        });

        assert!(outputs.is_empty());
        // Both honest parties (and possibly the cheater's own local run)
        // must finish in the abort phase; every honest verdict names
        // exactly the cheater.
        let honest_verdicts: Vec<_> = violations
            .iter()
            .filter(|violation| !violation.culprits().is_empty())
            .collect();
        assert_eq!(honest_verdicts.len(), 2);
        for verdict in honest_verdicts {
            assert_eq!(verdict.culprits(), &[cheater]);
            assert_eq!(verdict.fault(), Fault::SignatureInvalid);
        }
    }

    #[test]
    fn misdirected_mta_proofs_are_blamed() {
        let mut rng = init_testing();
        let mut pids: Vec<_> = (0..3)
            .map(|_| ParticipantIdentifier::random(&mut rng))
            .collect();
        pids.sort();
        let (_, configs) = simulate_quorum(&pids, 2, &mut rng);
        let message = b"swap the proofs";
        let (sid, mut quorum) = sign_quorum(&configs, &pids, message, &mut rng);
        let cheater = pids[1];

        // Swap the recipients of the cheater's two MtA payloads: each
        // honest party receives a transform of the *other* party's K,
        // whose aff-g proof cannot verify against its own statement.
        let mut pending: Option<Message> = None;
        let (outputs, violations) = run_with_tamper(sid, &mut quorum, &mut rng, |message, _| {
            if message.from() == cheater
                && message.message_type() == MessageType::Sign(SignMessageType::R2MtA)
            {
                match pending.take() {
                    None => {
                        pending = Some(message);
                        vec![]
                    }
                    Some(other) => {
                        let redirected_a = Message::new_raw(
                            other.message_type(),
                            other.id(),
                            other.from(),
                            message.to(),
                            other.unverified_bytes.clone(),
                        );
                        let redirected_b = Message::new_raw(
                            message.message_type(),
                            message.id(),
                            message.from(),
                            other.to(),
                            message.unverified_bytes.clone(),
                        );
                        vec![redirected_a, redirected_b]
                    }
                }
            } else {
                vec![message]
            }
        });

        assert!(outputs.is_empty());
        assert_eq!(violations.len(), 2);
        for violation in violations {
            assert_eq!(violation.culprits(), &[cheater]);
            assert_eq!(violation.fault(), Fault::ZkProofFailed(ProofKind::AffG));
        }
    }
}
