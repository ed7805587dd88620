// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Proof that a Paillier plaintext equals a discrete logarithm.
//!
//! Proves knowledge of `x ∈ ±2^ℓ` and nonce ρ with `C = Enc(N₀, x; ρ)`
//! and `X = x·g`, for a caller-chosen base point `g`. The signing
//! protocol uses it twice: binding `Γᵢ` to `Gᵢ` (base `G`) and binding
//! `Δᵢ` to `Kᵢ` (base `Γ`); keygen uses it to bind encrypted polynomial
//! evaluations to the exponent polynomial.

use crate::{
    curve::CurvePoint,
    errors::{Fault, InternalError, ProofKind, Result},
    paillier::{Ciphertext, EncryptionKey, Nonce},
    ring_pedersen::{Commitment, RingPedersen},
    utils::{
        challenge_plusminus_q, in_witness_range, sample_pedersen_blind,
        sample_pedersen_blind_wide, sample_prover_mask,
    },
    zkp::{Proof, ProofContext},
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Proof that [`CommonInput::ciphertext`] and [`CommonInput::x_point`]
/// hide the same in-range value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiLogProof {
    /// Commitment to `x` under the verifier's parameters.
    S: Commitment,
    /// Encryption of the masking value α.
    A: Ciphertext,
    /// `Y = α·g`.
    Y: CurvePoint,
    /// Commitment to α under the verifier's parameters.
    D: Commitment,
    /// `z₁ = α + e·x`.
    z1: BigNumber,
    /// `z₂ = r·ρ^e mod N₀`.
    z2: Nonce,
    /// `z₃ = γ + e·μ`.
    z3: BigNumber,
}

/// The public statement.
#[derive(Clone, Copy)]
pub(crate) struct CommonInput<'a> {
    /// The verifier's ring-Pedersen parameters.
    setup: &'a RingPedersen,
    /// The prover's Paillier key.
    pk: &'a EncryptionKey,
    /// The ciphertext of `x`.
    ciphertext: &'a Ciphertext,
    /// The point `X = x·g`.
    x_point: &'a CurvePoint,
    /// The base `g`.
    base: &'a CurvePoint,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(
        setup: &'a RingPedersen,
        pk: &'a EncryptionKey,
        ciphertext: &'a Ciphertext,
        x_point: &'a CurvePoint,
        base: &'a CurvePoint,
    ) -> Self {
        Self {
            setup,
            pk,
            ciphertext,
            x_point,
            base,
        }
    }
}

/// The witness: the plaintext/discrete log and its encryption nonce.
pub(crate) struct ProverSecret<'a> {
    x: &'a BigNumber,
    nonce: &'a Nonce,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(x: &'a BigNumber, nonce: &'a Nonce) -> Self {
        Self { x, nonce }
    }
}

impl std::fmt::Debug for ProverSecret<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("pilog::ProverSecret([redacted])")
    }
}

#[allow(clippy::too_many_arguments)]
fn append_statement(
    transcript: &mut Transcript,
    context: &impl ProofContext,
    input: &CommonInput,
    S: &Commitment,
    A: &Ciphertext,
    Y: &CurvePoint,
    D: &Commitment,
) -> Result<()> {
    transcript.append_message(b"PiLog ProofContext", &context.as_bytes()?);
    transcript.append_message(
        b"statement",
        &serialize!(&(
            input.setup,
            input.pk,
            input.ciphertext,
            input.x_point,
            input.base
        ))?,
    );
    transcript.append_message(b"commitments", &serialize!(&(S, A, Y, D))?);
    Ok(())
}

impl Proof for PiLogProof {
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
        let mu = sample_pedersen_blind(rng, input.setup.modulus());
        let gamma = sample_pedersen_blind_wide(rng, input.setup.modulus());
        let r = input.pk.random_nonce(rng)?;

        let S = input.setup.commit(secret.x, &mu);
        let A = input.pk.encrypt_with_nonce(&alpha, &r)?;
        let Y = input.base.multiply_by_bignum(&alpha)?;
        let D = input.setup.commit(&alpha, &gamma);

        append_statement(transcript, context, &input, &S, &A, &Y, &D)?;
        let e = challenge_plusminus_q(transcript);

        let z1 = &alpha + &e * secret.x;
        let z2 = r.mask(secret.nonce, &e, input.pk.modulus());
        let z3 = gamma + &e * mu;

        Ok(Self {
            S,
            A,
            Y,
            D,
            z1,
            z2,
            z3,
        })
    }

    fn verify(
        self,
        input: Self::CommonInput<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
    ) -> Result<()> {
        let fail = || InternalError::unattributed(Fault::ZkProofFailed(ProofKind::LogStar));

        append_statement(
            transcript, context, &input, &self.S, &self.A, &self.Y, &self.D,
        )?;
        let e = challenge_plusminus_q(transcript);

        if !in_witness_range(&self.z1) {
            error!("response z1 is out of range");
            return Err(fail());
        }

        // Enc(z₁; z₂) == A · C^e (mod N₀²)
        let lhs = input
            .pk
            .encrypt_with_nonce(&self.z1, &self.z2)
            .map_err(|_| fail())?;
        let rhs = input
            .pk
            .multiply_and_add(&e, input.ciphertext, &self.A)
            .map_err(|_| fail())?;
        if lhs != rhs {
            error!("ciphertext equation failed to verify");
            return Err(fail());
        }

        // z₁·g == Y + e·X
        let lhs = input.base.multiply_by_bignum(&self.z1)?;
        let rhs = self.Y + input.x_point.multiply_by_bignum(&e)?;
        if lhs != rhs {
            error!("curve equation failed to verify");
            return Err(fail());
        }

        // s^z₁ t^z₃ == D · S^e (mod N̂)
        let lhs = input.setup.commit(&self.z1, &self.z3);
        let rhs = input.setup.combine(self.D.as_ref(), self.S.as_ref(), &e);
        if lhs.as_ref() != &rhs {
            error!("commitment equation failed to verify");
            return Err(fail());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        curve::bn_to_scalar,
        paillier::{prime_gen, DecryptionKey},
        protocol::SharedContext,
        utils::{sample_witness, testing::init_testing},
        zkp::testing::BadContext,
    };

    fn transcript() -> Transcript {
        Transcript::new(b"PiLogProof Test")
    }

    #[test]
    fn proof_verifies_for_consistent_statement() {
        let mut rng = init_testing();
        let context = SharedContext::random(&mut rng);
        let (scheme, _) = RingPedersen::gen(&mut rng).unwrap();
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let dk = DecryptionKey::from_primes(&p, &q).unwrap();
        let pk = dk.encryption_key();

        let base = CurvePoint::random(&mut rng);
        let x = sample_witness(&mut rng);
        let (C, rho) = pk.encrypt(&mut rng, &x).unwrap();
        let X = base.multiply_by_bignum(&x).unwrap();

        let input = CommonInput::new(&scheme, &pk, &C, &X, &base);
        let proof = PiLogProof::prove(
            input,
            ProverSecret::new(&x, &rho),
            &context,
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &context, &mut transcript()).is_ok());
    }

    #[test]
    fn mismatched_point_fails() {
        let mut rng = init_testing();
        let context = SharedContext::random(&mut rng);
        let (scheme, _) = RingPedersen::gen(&mut rng).unwrap();
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let pk = DecryptionKey::from_primes(&p, &q).unwrap().encryption_key();

        let base = CurvePoint::GENERATOR;
        let x = sample_witness(&mut rng);
        let (C, rho) = pk.encrypt(&mut rng, &x).unwrap();
        // A point for a different exponent.
        let wrong_exponent = &x + BigNumber::one();
        let X = base
            .multiply_by_scalar(&bn_to_scalar(&wrong_exponent).unwrap());

        let input = CommonInput::new(&scheme, &pk, &C, &X, &base);
        let proof = PiLogProof::prove(
            input,
            ProverSecret::new(&x, &rho),
            &context,
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &context, &mut transcript()).is_err());
    }

    #[test]
    fn base_point_is_part_of_the_statement() {
        let mut rng = init_testing();
        let context = SharedContext::random(&mut rng);
        let (scheme, _) = RingPedersen::gen(&mut rng).unwrap();
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let pk = DecryptionKey::from_primes(&p, &q).unwrap().encryption_key();

        let base = CurvePoint::random(&mut rng);
        let x = sample_witness(&mut rng);
        let (C, rho) = pk.encrypt(&mut rng, &x).unwrap();
        let X = base.multiply_by_bignum(&x).unwrap();

        let input = CommonInput::new(&scheme, &pk, &C, &X, &base);
        let proof = PiLogProof::prove(
            input,
            ProverSecret::new(&x, &rho),
            &context,
            &mut transcript(),
            &mut rng,
        )
        .unwrap();

        // Same X, different claimed base.
        let other_base = CurvePoint::GENERATOR;
        let other_input = CommonInput::new(&scheme, &pk, &C, &X, &other_base);
        assert!(proof
            .clone()
            .verify(other_input, &context, &mut transcript())
            .is_err());
        assert!(proof.verify(input, &BadContext, &mut transcript()).is_err());
    }
}
