// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Affine-operation proof with a Paillier witness commitment.
//!
//! Identical relation to [`piaffg`](crate::zkp::piaffg), except the
//! multiplier `x` is bound to a prover-key ciphertext
//! `X = Enc(N₁, x; ρ_x)` instead of a curve point. The signing protocol
//! uses it for the key-share MtA, where the multiplier is the party's
//! Lagrange-scaled ECDSA share.

use crate::{
    errors::{Fault, InternalError, ProofKind, Result},
    paillier::{Ciphertext, EncryptionKey, Nonce},
    ring_pedersen::{Commitment, RingPedersen},
    utils::{
        challenge_plusminus_q, in_mask_range, in_witness_range, sample_pedersen_blind,
        sample_pedersen_blind_wide, sample_prover_mask, sample_prover_mask_wide,
    },
    zkp::{Proof, ProofContext},
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Proof that [`CommonInput::transformed`] is an affine transform of
/// [`CommonInput::original`] with both witnesses bound to Paillier
/// ciphertexts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiAffpProof {
    /// `A = C^α ⊙ Enc(N₀, β; r)`.
    A: Ciphertext,
    /// `B_x = Enc(N₁, α; r_x)`.
    B_x: Ciphertext,
    /// `B_y = Enc(N₁, β; r_y)`.
    B_y: Ciphertext,
    /// Commitments to α, x, β, y under the verifier's parameters.
    E: Commitment,
    S: Commitment,
    F: Commitment,
    T: Commitment,
    /// `z₁ = α + e·x`.
    z1: BigNumber,
    /// `z₂ = β + e·y`.
    z2: BigNumber,
    /// `z₃ = γ + e·m`.
    z3: BigNumber,
    /// `z₄ = δ + e·μ`.
    z4: BigNumber,
    /// `w = r·ρ^e mod N₀`.
    w: Nonce,
    /// `w_x = r_x·ρ_x^e mod N₁`.
    w_x: Nonce,
    /// `w_y = r_y·ρ_y^e mod N₁`.
    w_y: Nonce,
}

/// The public statement.
#[derive(Clone, Copy)]
pub(crate) struct CommonInput<'a> {
    /// The verifier's ring-Pedersen parameters.
    setup: &'a RingPedersen,
    /// The verifier's Paillier key (`N₀`).
    verifier_pk: &'a EncryptionKey,
    /// The prover's Paillier key (`N₁`).
    prover_pk: &'a EncryptionKey,
    /// The verifier's ciphertext `C` being transformed.
    original: &'a Ciphertext,
    /// The transformed ciphertext `D = C^x ⊙ Enc(N₀, y; ρ)`.
    transformed: &'a Ciphertext,
    /// The prover-key encryption `Y = Enc(N₁, y; ρ_y)`.
    mask_encryption: &'a Ciphertext,
    /// The prover-key encryption `X = Enc(N₁, x; ρ_x)`.
    multiplier_encryption: &'a Ciphertext,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(
        setup: &'a RingPedersen,
        verifier_pk: &'a EncryptionKey,
        prover_pk: &'a EncryptionKey,
        original: &'a Ciphertext,
        transformed: &'a Ciphertext,
        mask_encryption: &'a Ciphertext,
        multiplier_encryption: &'a Ciphertext,
    ) -> Self {
        Self {
            setup,
            verifier_pk,
            prover_pk,
            original,
            transformed,
            mask_encryption,
            multiplier_encryption,
        }
    }
}

/// The witnesses and their nonces.
pub(crate) struct ProverSecret<'a> {
    x: &'a BigNumber,
    y: &'a BigNumber,
    /// Nonce of the `Enc(N₀, y)` factor of the transform.
    nonce: &'a Nonce,
    /// Nonce of `X = Enc(N₁, x)`.
    multiplier_nonce: &'a Nonce,
    /// Nonce of `Y = Enc(N₁, y)`.
    mask_nonce: &'a Nonce,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(
        x: &'a BigNumber,
        y: &'a BigNumber,
        nonce: &'a Nonce,
        multiplier_nonce: &'a Nonce,
        mask_nonce: &'a Nonce,
    ) -> Self {
        Self {
            x,
            y,
            nonce,
            multiplier_nonce,
            mask_nonce,
        }
    }
}

impl std::fmt::Debug for ProverSecret<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("piaffp::ProverSecret([redacted])")
    }
}

struct Commitments<'a> {
    A: &'a Ciphertext,
    B_x: &'a Ciphertext,
    B_y: &'a Ciphertext,
    E: &'a Commitment,
    S: &'a Commitment,
    F: &'a Commitment,
    T: &'a Commitment,
}

fn append_statement(
    transcript: &mut Transcript,
    context: &impl ProofContext,
    input: &CommonInput,
    commitments: &Commitments,
) -> Result<()> {
    transcript.append_message(b"PiAffp ProofContext", &context.as_bytes()?);
    transcript.append_message(
        b"statement",
        &serialize!(&(
            input.setup,
            input.verifier_pk,
            input.prover_pk,
            input.original,
            input.transformed,
            input.mask_encryption,
            input.multiplier_encryption
        ))?,
    );
    transcript.append_message(
        b"commitments",
        &serialize!(&(
            commitments.A,
            commitments.B_x,
            commitments.B_y,
            commitments.E,
            commitments.S,
            commitments.F,
            commitments.T
        ))?,
    );
    Ok(())
}

impl Proof for PiAffpProof {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = ProverSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let alpha = sample_prover_mask(rng);
        let beta = sample_prover_mask_wide(rng);
        let r = input.verifier_pk.random_nonce(rng)?;
        let r_x = input.prover_pk.random_nonce(rng)?;
        let r_y = input.prover_pk.random_nonce(rng)?;
        let gamma = sample_pedersen_blind_wide(rng, input.setup.modulus());
        let m = sample_pedersen_blind(rng, input.setup.modulus());
        let delta = sample_pedersen_blind_wide(rng, input.setup.modulus());
        let mu = sample_pedersen_blind(rng, input.setup.modulus());

        let enc_beta = input.verifier_pk.encrypt_with_nonce(&beta, &r)?;
        let A = input
            .verifier_pk
            .multiply_and_add(&alpha, input.original, &enc_beta)?;
        let B_x = input.prover_pk.encrypt_with_nonce(&alpha, &r_x)?;
        let B_y = input.prover_pk.encrypt_with_nonce(&beta, &r_y)?;
        let E = input.setup.commit(&alpha, &gamma);
        let S = input.setup.commit(secret.x, &m);
        let F = input.setup.commit(&beta, &delta);
        let T = input.setup.commit(secret.y, &mu);

        append_statement(
            transcript,
            context,
            &input,
            &Commitments {
                A: &A,
                B_x: &B_x,
                B_y: &B_y,
                E: &E,
                S: &S,
                F: &F,
                T: &T,
            },
        )?;
        let e = challenge_plusminus_q(transcript);

        let z1 = &alpha + &e * secret.x;
        let z2 = &beta + &e * secret.y;
        let z3 = gamma + &e * m;
        let z4 = delta + &e * mu;
        let w = r.mask(secret.nonce, &e, input.verifier_pk.modulus());
        let w_x = r_x.mask(secret.multiplier_nonce, &e, input.prover_pk.modulus());
        let w_y = r_y.mask(secret.mask_nonce, &e, input.prover_pk.modulus());

        Ok(Self {
            A,
            B_x,
            B_y,
            E,
            S,
            F,
            T,
            z1,
            z2,
            z3,
            z4,
            w,
            w_x,
            w_y,
        })
    }

    fn verify(
        self,
        input: Self::CommonInput<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
    ) -> Result<()> {
        let fail = || InternalError::unattributed(Fault::ZkProofFailed(ProofKind::AffP));

        append_statement(
            transcript,
            context,
            &input,
            &Commitments {
                A: &self.A,
                B_x: &self.B_x,
                B_y: &self.B_y,
                E: &self.E,
                S: &self.S,
                F: &self.F,
                T: &self.T,
            },
        )?;
        let e = challenge_plusminus_q(transcript);

        if !in_witness_range(&self.z1) {
            error!("response z1 is out of range");
            return Err(fail());
        }
        if !in_mask_range(&self.z2) {
            error!("response z2 is out of range");
            return Err(fail());
        }

        // C^z₁ ⊙ Enc(N₀, z₂; w) == A · D^e (mod N₀²)
        let enc_z2 = input
            .verifier_pk
            .encrypt_with_nonce(&self.z2, &self.w)
            .map_err(|_| fail())?;
        let lhs = input
            .verifier_pk
            .multiply_and_add(&self.z1, input.original, &enc_z2)
            .map_err(|_| fail())?;
        let rhs = input
            .verifier_pk
            .multiply_and_add(&e, input.transformed, &self.A)
            .map_err(|_| fail())?;
        if lhs != rhs {
            error!("affine ciphertext equation failed to verify");
            return Err(fail());
        }

        // Enc(N₁, z₁; w_x) == B_x · X^e (mod N₁²)
        let lhs = input
            .prover_pk
            .encrypt_with_nonce(&self.z1, &self.w_x)
            .map_err(|_| fail())?;
        let rhs = input
            .prover_pk
            .multiply_and_add(&e, input.multiplier_encryption, &self.B_x)
            .map_err(|_| fail())?;
        if lhs != rhs {
            error!("multiplier encryption equation failed to verify");
            return Err(fail());
        }

        // Enc(N₁, z₂; w_y) == B_y · Y^e (mod N₁²)
        let lhs = input
            .prover_pk
            .encrypt_with_nonce(&self.z2, &self.w_y)
            .map_err(|_| fail())?;
        let rhs = input
            .prover_pk
            .multiply_and_add(&e, input.mask_encryption, &self.B_y)
            .map_err(|_| fail())?;
        if lhs != rhs {
            error!("mask encryption equation failed to verify");
            return Err(fail());
        }

        // s^z₁ t^z₃ == E · S^e and s^z₂ t^z₄ == F · T^e (mod N̂)
        let lhs = input.setup.commit(&self.z1, &self.z3);
        let rhs = input.setup.combine(self.E.as_ref(), self.S.as_ref(), &e);
        if lhs.as_ref() != &rhs {
            error!("x commitment equation failed to verify");
            return Err(fail());
        }
        let lhs = input.setup.commit(&self.z2, &self.z4);
        let rhs = input.setup.combine(self.F.as_ref(), self.T.as_ref(), &e);
        if lhs.as_ref() != &rhs {
            error!("y commitment equation failed to verify");
            return Err(fail());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocol::SharedContext,
        utils::testing::init_testing,
        zkp::{piaffg::tests::mta_instance, testing::BadContext},
    };

    fn transcript() -> Transcript {
        Transcript::new(b"PiAffpProof Test")
    }

    #[test]
    fn proof_verifies_for_honest_transform() {
        let mut rng = init_testing();
        let context = SharedContext::random(&mut rng);
        let mta = mta_instance(&mut rng);
        let verifier_pk = mta.verifier_dk.encryption_key();
        let prover_pk = mta.prover_dk.encryption_key();
        let (multiplier_encryption, multiplier_nonce) =
            mta.prover_dk.encrypt(&mut rng, &mta.multiplier).unwrap();

        let input = CommonInput::new(
            &mta.setup,
            &verifier_pk,
            &prover_pk,
            &mta.original,
            &mta.transformed,
            &mta.mask_encryption,
            &multiplier_encryption,
        );
        let proof = PiAffpProof::prove(
            input,
            ProverSecret::new(
                &mta.multiplier,
                &mta.addend,
                &mta.transform_nonce,
                &multiplier_nonce,
                &mta.mask_nonce,
            ),
            &context,
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &context, &mut transcript()).is_ok());
    }

    #[test]
    fn unrelated_multiplier_ciphertext_fails() {
        let mut rng = init_testing();
        let context = SharedContext::random(&mut rng);
        let mta = mta_instance(&mut rng);
        let verifier_pk = mta.verifier_dk.encryption_key();
        let prover_pk = mta.prover_dk.encryption_key();
        // An encryption of something else entirely.
        let (wrong_encryption, wrong_nonce) = mta
            .prover_dk
            .encrypt(&mut rng, &(&mta.multiplier + 1))
            .unwrap();

        let input = CommonInput::new(
            &mta.setup,
            &verifier_pk,
            &prover_pk,
            &mta.original,
            &mta.transformed,
            &mta.mask_encryption,
            &wrong_encryption,
        );
        let proof = PiAffpProof::prove(
            input,
            ProverSecret::new(
                &mta.multiplier,
                &mta.addend,
                &mta.transform_nonce,
                &wrong_nonce,
                &mta.mask_nonce,
            ),
            &context,
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &context, &mut transcript()).is_err());
    }

    #[test]
    fn context_must_match() {
        let mut rng = init_testing();
        let context = SharedContext::random(&mut rng);
        let mta = mta_instance(&mut rng);
        let verifier_pk = mta.verifier_dk.encryption_key();
        let prover_pk = mta.prover_dk.encryption_key();
        let (multiplier_encryption, multiplier_nonce) =
            mta.prover_dk.encrypt(&mut rng, &mta.multiplier).unwrap();

        let input = CommonInput::new(
            &mta.setup,
            &verifier_pk,
            &prover_pk,
            &mta.original,
            &mta.transformed,
            &mta.mask_encryption,
            &multiplier_encryption,
        );
        let proof = PiAffpProof::prove(
            input,
            ProverSecret::new(
                &mta.multiplier,
                &mta.addend,
                &mta.transform_nonce,
                &multiplier_nonce,
                &mta.mask_nonce,
            ),
            &context,
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &BadContext, &mut transcript()).is_err());
    }
}
