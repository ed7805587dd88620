// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Round 1 commitment and its round 2 opening.

use crate::{
    curve::CurvePoint,
    errors::{Fault, InternalError, Result},
    keygen::keyshare::CoeffPublic,
    messages::{KeygenMessageType, Message, MessageType},
    paillier::EncryptionKey,
    parameters::RID_BYTES,
    protocol::{Identifier, ParticipantIdentifier},
    ring_pedersen::RingPedersen,
};
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Hash commitment to a [`KeygenDecommit`], echo-broadcast in round 1.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub(crate) struct KeygenCommit {
    hash: [u8; 32],
}

impl KeygenCommit {
    pub(crate) fn from_message(message: &Message) -> Result<Self> {
        message.check_type(MessageType::Keygen(KeygenMessageType::R1CommitHash))?;
        let keygen_commit: KeygenCommit = deserialize!(&message.unverified_bytes)?;
        Ok(keygen_commit)
    }
}

/// The opening of a round 1 commitment: everything a party samples for
/// the session.
#[derive(Serialize, Deserialize, Clone)]
pub(crate) struct KeygenDecommit {
    sid: Identifier,
    sender: ParticipantIdentifier,
    /// The blinding factor is never read but makes the commitment hiding.
    u_i: [u8; RID_BYTES],
    pub(crate) rid: [u8; RID_BYTES],
    pub(crate) chain_key: [u8; RID_BYTES],
    /// The exponent-form VSS polynomial `F(X)`.
    pub(crate) coeff_publics: Vec<CoeffPublic>,
    /// Schnorr precommitment `A` for the round 4 proof of share knowledge.
    pub(crate) precom: CurvePoint,
    /// Session ElGamal key; agreed but not persisted in the `Config`.
    pub(crate) el_gamal: CurvePoint,
    /// The party's Paillier encryption key.
    pub(crate) encryption_key: EncryptionKey,
    /// The party's ring-Pedersen parameters over the same modulus.
    pub(crate) setup: RingPedersen,
}

// Implement custom Debug to avoid dumping multi-kilobyte fields.
impl std::fmt::Debug for KeygenDecommit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeygenDecommit")
            .field("sid", &self.sid)
            .field("sender", &self.sender)
            .field("...", &"[omitted]")
            .finish()
    }
}

impl KeygenDecommit {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new<R: RngCore + CryptoRng>(
        rng: &mut R,
        sid: &Identifier,
        sender: &ParticipantIdentifier,
        coeff_publics: Vec<CoeffPublic>,
        precom: CurvePoint,
        el_gamal: CurvePoint,
        encryption_key: EncryptionKey,
        setup: RingPedersen,
    ) -> Self {
        let mut rid = [0u8; RID_BYTES];
        let mut chain_key = [0u8; RID_BYTES];
        let mut u_i = [0u8; RID_BYTES];
        rng.fill_bytes(rid.as_mut_slice());
        rng.fill_bytes(chain_key.as_mut_slice());
        rng.fill_bytes(u_i.as_mut_slice());
        Self {
            sid: *sid,
            sender: *sender,
            u_i,
            rid,
            chain_key,
            coeff_publics,
            precom,
            el_gamal,
            encryption_key,
            setup,
        }
    }

    /// Deserialize a decommitment from a message and verify it against
    /// the commitment and the protocol rules.
    pub(crate) fn from_message(
        message: &Message,
        com: &KeygenCommit,
        expected_coeffs: usize,
        refresh: bool,
    ) -> Result<Self> {
        message.check_type(MessageType::Keygen(KeygenMessageType::R2Decommit))?;
        let decommit: KeygenDecommit = deserialize!(&message.unverified_bytes)?;
        decommit.verify(message.id(), message.from(), com, expected_coeffs, refresh)?;
        Ok(decommit)
    }

    pub(crate) fn commit(&self) -> Result<KeygenCommit> {
        let mut transcript = Transcript::new(b"KeygenR1");
        transcript.append_message(b"decom", &serialize!(&self)?);
        let mut hash = [0u8; 32];
        transcript.challenge_bytes(b"hashing r1", &mut hash);
        Ok(KeygenCommit { hash })
    }

    fn verify(
        &self,
        sid: Identifier,
        sender: ParticipantIdentifier,
        com: &KeygenCommit,
        expected_coeffs: usize,
        refresh: bool,
    ) -> Result<()> {
        // Check the commitment.
        let rebuilt_com = self.commit()?;
        if &rebuilt_com != com {
            error!("decommitment does not match original commitment");
            return Err(InternalError::blame(sender, Fault::CommitmentMismatch));
        }

        // Check the session ID and sender ID.
        if self.sid != sid || self.sender != sender {
            error!("decommitment carries the wrong session or sender id");
            return Err(InternalError::blame(sender, Fault::ProtocolViolation));
        }

        // The dealt polynomial must have the agreed degree, and its
        // constant term must deal a fresh secret (keygen) or exactly zero
        // (refresh).
        if self.coeff_publics.len() != expected_coeffs {
            error!("dealt polynomial has the wrong degree");
            return Err(InternalError::blame(sender, Fault::InvalidShare));
        }
        let constant_is_identity = *self.coeff_publics[0].as_ref() == CurvePoint::IDENTITY;
        if constant_is_identity != refresh {
            error!("dealt polynomial constant term does not match the protocol mode");
            return Err(InternalError::blame(sender, Fault::InvalidShare));
        }

        // Pedersen parameters must live over the Paillier modulus.
        if self.setup.modulus() != self.encryption_key.modulus() {
            error!("ring-Pedersen modulus differs from the Paillier modulus");
            return Err(InternalError::blame(sender, Fault::ProtocolViolation));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        keygen::keyshare::{sample_polynomial, to_public_coeffs},
        paillier::{prime_gen, DecryptionKey},
        utils::testing::init_testing,
        zkp::pisch::PiSchProof,
    };

    fn decommit(refresh: bool) -> (rand::rngs::StdRng, KeygenDecommit, Identifier, ParticipantIdentifier) {
        let mut rng = init_testing();
        let sid = Identifier::random(&mut rng);
        let sender = ParticipantIdentifier::random(&mut rng);
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let dk = DecryptionKey::from_primes(&p, &q).unwrap();
        let (setup, _) = crate::ring_pedersen::RingPedersen::extract(&dk, &mut rng).unwrap();
        let constant = refresh.then_some(k256::Scalar::ZERO);
        let coeffs = sample_polynomial(2, constant, &mut rng);
        let precom = PiSchProof::precommit(&mut rng).unwrap();
        let el_gamal = CurvePoint::random(&mut rng);
        let decom = KeygenDecommit::new(
            &mut rng,
            &sid,
            &sender,
            to_public_coeffs(&coeffs),
            *precom.precommitment(),
            el_gamal,
            dk.encryption_key(),
            setup,
        );
        (rng, decom, sid, sender)
    }

    #[test]
    fn decommitment_opens_its_commitment() {
        let (_rng, decom, sid, sender) = decommit(false);
        let com = decom.commit().unwrap();
        assert!(decom.verify(sid, sender, &com, 3, false).is_ok());
    }

    #[test]
    fn tampered_opening_is_rejected() {
        let (mut rng, decom, sid, sender) = decommit(false);
        let com = decom.commit().unwrap();

        let mut tampered = decom.clone();
        tampered.rid[0] ^= 1;
        let err = tampered.verify(sid, sender, &com, 3, false).unwrap_err();
        assert_eq!(
            err.violation().unwrap().fault(),
            Fault::CommitmentMismatch
        );

        // Sender and session must match, too.
        let other = ParticipantIdentifier::random(&mut rng);
        assert!(decom.verify(sid, other, &com, 3, false).is_err());
        assert!(decom
            .verify(Identifier::random(&mut rng), sender, &com, 3, false)
            .is_err());
    }

    #[test]
    fn degree_and_mode_are_enforced() {
        let (_rng, decom, sid, sender) = decommit(false);
        let com = decom.commit().unwrap();
        // Wrong degree.
        assert!(decom.verify(sid, sender, &com, 4, false).is_err());
        // Fresh keygen polynomial presented as a refresh.
        assert!(decom.verify(sid, sender, &com, 3, true).is_err());

        let (_rng, refresh_decom, sid, sender) = decommit(true);
        let com = refresh_decom.commit().unwrap();
        assert!(refresh_decom.verify(sid, sender, &com, 3, true).is_ok());
        assert!(refresh_decom.verify(sid, sender, &com, 3, false).is_err());
    }
}
