// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Affine-operation proof with a group-element witness commitment.
//!
//! The MtA step has the prover transform the verifier's ciphertext
//! `C = Enc(N₀, c)` into `D = C^x ⊙ Enc(N₀, y; ρ)`, handing the verifier
//! an encryption of `x·c + y`. This proof shows `D` was formed exactly
//! that way from witnesses in range (`x ∈ ±2^ℓ`, `y ∈ ±2^ℓ'`), where `x`
//! is additionally bound to the public point `X = x·G` and `y` to the
//! prover-key encryption `Y = Enc(N₁, y; ρ_y)`.

use crate::{
    curve::CurvePoint,
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
/// [`CommonInput::original`] under in-range witnesses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiAffgProof {
    /// `A = C^α ⊙ Enc(N₀, β; r)`.
    A: Ciphertext,
    /// `B_x = α·G`.
    B_x: CurvePoint,
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
    /// The public point `X = x·G`.
    x_point: &'a CurvePoint,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(
        setup: &'a RingPedersen,
        verifier_pk: &'a EncryptionKey,
        prover_pk: &'a EncryptionKey,
        original: &'a Ciphertext,
        transformed: &'a Ciphertext,
        mask_encryption: &'a Ciphertext,
        x_point: &'a CurvePoint,
    ) -> Self {
        Self {
            setup,
            verifier_pk,
            prover_pk,
            original,
            transformed,
            mask_encryption,
            x_point,
        }
    }
}

/// The witnesses and their nonces.
pub(crate) struct ProverSecret<'a> {
    x: &'a BigNumber,
    y: &'a BigNumber,
    /// Nonce of the `Enc(N₀, y)` factor of the transform.
    nonce: &'a Nonce,
    /// Nonce of `Y = Enc(N₁, y)`.
    mask_nonce: &'a Nonce,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(
        x: &'a BigNumber,
        y: &'a BigNumber,
        nonce: &'a Nonce,
        mask_nonce: &'a Nonce,
    ) -> Self {
        Self {
            x,
            y,
            nonce,
            mask_nonce,
        }
    }
}

impl std::fmt::Debug for ProverSecret<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("piaffg::ProverSecret([redacted])")
    }
}

struct Commitments<'a> {
    A: &'a Ciphertext,
    B_x: &'a CurvePoint,
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
    transcript.append_message(b"PiAffg ProofContext", &context.as_bytes()?);
    transcript.append_message(
        b"statement",
        &serialize!(&(
            input.setup,
            input.verifier_pk,
            input.prover_pk,
            input.original,
            input.transformed,
            input.mask_encryption,
            input.x_point
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

impl Proof for PiAffgProof {
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
        let r_y = input.prover_pk.random_nonce(rng)?;
        let gamma = sample_pedersen_blind_wide(rng, input.setup.modulus());
        let m = sample_pedersen_blind(rng, input.setup.modulus());
        let delta = sample_pedersen_blind_wide(rng, input.setup.modulus());
        let mu = sample_pedersen_blind(rng, input.setup.modulus());

        let enc_beta = input.verifier_pk.encrypt_with_nonce(&beta, &r)?;
        let A = input
            .verifier_pk
            .multiply_and_add(&alpha, input.original, &enc_beta)?;
        let B_x = CurvePoint::GENERATOR.multiply_by_bignum(&alpha)?;
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
            w_y,
        })
    }

    fn verify(
        self,
        input: Self::CommonInput<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
    ) -> Result<()> {
        let fail = || InternalError::unattributed(Fault::ZkProofFailed(ProofKind::AffG));

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

        // z₁·G == B_x + e·X
        let lhs = CurvePoint::GENERATOR.multiply_by_bignum(&self.z1)?;
        let rhs = self.B_x + input.x_point.multiply_by_bignum(&e)?;
        if lhs != rhs {
            error!("curve equation failed to verify");
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
pub(crate) mod tests {
    use super::*;
    use crate::{
        paillier::{prime_gen, DecryptionKey},
        protocol::SharedContext,
        utils::{sample_mta_mask, sample_witness, testing::init_testing},
        zkp::testing::BadContext,
    };
    use rand::rngs::StdRng;

    fn transcript() -> Transcript {
        Transcript::new(b"PiAffgProof Test")
    }

    pub(crate) struct MtaInstance {
        pub(crate) verifier_dk: DecryptionKey,
        pub(crate) prover_dk: DecryptionKey,
        pub(crate) setup: RingPedersen,
        pub(crate) original: Ciphertext,
        pub(crate) multiplier: BigNumber,
        pub(crate) addend: BigNumber,
        pub(crate) transformed: Ciphertext,
        pub(crate) transform_nonce: Nonce,
        pub(crate) mask_encryption: Ciphertext,
        pub(crate) mask_nonce: Nonce,
    }

    /// Build an honest MtA transform between two fresh keys.
    pub(crate) fn mta_instance(rng: &mut StdRng) -> MtaInstance {
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(rng).unwrap();
        let verifier_dk = DecryptionKey::from_primes(&p, &q).unwrap();
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(rng).unwrap();
        let prover_dk = DecryptionKey::from_primes(&p, &q).unwrap();
        let (setup, _) = RingPedersen::gen(rng).unwrap();

        let plaintext = sample_witness(rng);
        let (original, _) = verifier_dk.encrypt(rng, &plaintext).unwrap();

        let multiplier = sample_witness(rng);
        let addend = sample_mta_mask(rng);

        let verifier_pk = verifier_dk.encryption_key();
        let transform_nonce = verifier_pk.random_nonce(rng).unwrap();
        let enc_addend = verifier_pk
            .encrypt_with_nonce(&addend, &transform_nonce)
            .unwrap();
        let transformed = verifier_pk
            .multiply_and_add(&multiplier, &original, &enc_addend)
            .unwrap();

        let (mask_encryption, mask_nonce) = prover_dk.encrypt(rng, &addend).unwrap();

        MtaInstance {
            verifier_dk,
            prover_dk,
            setup,
            original,
            multiplier,
            addend,
            transformed,
            transform_nonce,
            mask_encryption,
            mask_nonce,
        }
    }

    #[test]
    fn proof_verifies_for_honest_transform() {
        let mut rng = init_testing();
        let context = SharedContext::random(&mut rng);
        let mta = mta_instance(&mut rng);
        let verifier_pk = mta.verifier_dk.encryption_key();
        let prover_pk = mta.prover_dk.encryption_key();
        let x_point = CurvePoint::GENERATOR
            .multiply_by_bignum(&mta.multiplier)
            .unwrap();

        let input = CommonInput::new(
            &mta.setup,
            &verifier_pk,
            &prover_pk,
            &mta.original,
            &mta.transformed,
            &mta.mask_encryption,
            &x_point,
        );
        let proof = PiAffgProof::prove(
            input,
            ProverSecret::new(
                &mta.multiplier,
                &mta.addend,
                &mta.transform_nonce,
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
    fn wrong_multiplier_point_fails() {
        let mut rng = init_testing();
        let context = SharedContext::random(&mut rng);
        let mta = mta_instance(&mut rng);
        let verifier_pk = mta.verifier_dk.encryption_key();
        let prover_pk = mta.prover_dk.encryption_key();
        let wrong_point = CurvePoint::random(&mut rng);

        let input = CommonInput::new(
            &mta.setup,
            &verifier_pk,
            &prover_pk,
            &mta.original,
            &mta.transformed,
            &mta.mask_encryption,
            &wrong_point,
        );
        let proof = PiAffgProof::prove(
            input,
            ProverSecret::new(
                &mta.multiplier,
                &mta.addend,
                &mta.transform_nonce,
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
    fn transform_decrypts_to_affine_value() {
        let mut rng = init_testing();
        let mta = mta_instance(&mut rng);
        let plaintext = mta.verifier_dk.decrypt(&mta.original).unwrap();
        let result = mta.verifier_dk.decrypt(&mta.transformed).unwrap();
        assert_eq!(result, &mta.multiplier * plaintext + &mta.addend);
    }

    #[test]
    fn context_must_match() {
        let mut rng = init_testing();
        let context = SharedContext::random(&mut rng);
        let mta = mta_instance(&mut rng);
        let verifier_pk = mta.verifier_dk.encryption_key();
        let prover_pk = mta.prover_dk.encryption_key();
        let x_point = CurvePoint::GENERATOR
            .multiply_by_bignum(&mta.multiplier)
            .unwrap();

        let input = CommonInput::new(
            &mta.setup,
            &verifier_pk,
            &prover_pk,
            &mta.original,
            &mta.transformed,
            &mta.mask_encryption,
            &x_point,
        );
        let proof = PiAffgProof::prove(
            input,
            ProverSecret::new(
                &mta.multiplier,
                &mta.addend,
                &mta.transform_nonce,
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
