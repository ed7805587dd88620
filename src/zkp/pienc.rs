// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Range proof for a Paillier plaintext.
//!
//! Proves knowledge of `k ∈ ±2^ℓ` and a nonce ρ with
//! `K = Enc(N₀, k; ρ)`, where `N₀` is the prover's Paillier modulus. The
//! witness is committed under the *verifier's* ring-Pedersen parameters,
//! so each verifier receives its own proof instance.

use crate::{
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

/// Proof that [`CommonInput::ciphertext`] encrypts a value in
/// `±2^(ℓ+ε)` under the prover's key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiEncProof {
    /// Commitment to the plaintext under the verifier's parameters.
    S: Commitment,
    /// Encryption of the masking value α.
    A: Ciphertext,
    /// Commitment to α under the verifier's parameters.
    C: Commitment,
    /// `z₁ = α + e·k`.
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
    /// The ciphertext whose plaintext is claimed to be in range.
    ciphertext: &'a Ciphertext,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(
        setup: &'a RingPedersen,
        pk: &'a EncryptionKey,
        ciphertext: &'a Ciphertext,
    ) -> Self {
        Self {
            setup,
            pk,
            ciphertext,
        }
    }
}

/// The witness: the plaintext and its encryption nonce.
pub(crate) struct ProverSecret<'a> {
    plaintext: &'a BigNumber,
    nonce: &'a Nonce,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(plaintext: &'a BigNumber, nonce: &'a Nonce) -> Self {
        Self { plaintext, nonce }
    }
}

impl std::fmt::Debug for ProverSecret<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("pienc::ProverSecret([redacted])")
    }
}

fn append_statement(
    transcript: &mut Transcript,
    context: &impl ProofContext,
    input: &CommonInput,
    S: &Commitment,
    A: &Ciphertext,
    C: &Commitment,
) -> Result<()> {
    transcript.append_message(b"PiEnc ProofContext", &context.as_bytes()?);
    transcript.append_message(b"statement", &serialize!(&(input.setup, input.pk, input.ciphertext))?);
    transcript.append_message(b"commitments", &serialize!(&(S, A, C))?);
    Ok(())
}

impl Proof for PiEncProof {
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

        let S = input.setup.commit(secret.plaintext, &mu);
        let A = input.pk.encrypt_with_nonce(&alpha, &r)?;
        let C = input.setup.commit(&alpha, &gamma);

        append_statement(transcript, context, &input, &S, &A, &C)?;
        let e = challenge_plusminus_q(transcript);

        let z1 = &alpha + &e * secret.plaintext;
        let z2 = r.mask(secret.nonce, &e, input.pk.modulus());
        let z3 = gamma + &e * mu;

        Ok(Self {
            S,
            A,
            C,
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
        let fail = || InternalError::unattributed(Fault::ZkProofFailed(ProofKind::Enc));

        append_statement(transcript, context, &input, &self.S, &self.A, &self.C)?;
        let e = challenge_plusminus_q(transcript);

        // Response must be in the slack range.
        if !in_witness_range(&self.z1) {
            error!("response z1 is out of range");
            return Err(fail());
        }

        // Enc(z₁; z₂) == A · K^e (mod N₀²)
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

        // s^z₁ t^z₃ == C · S^e (mod N̂)
        let lhs = input.setup.commit(&self.z1, &self.z3);
        let rhs = input
            .setup
            .combine(self.C.as_ref(), self.S.as_ref(), &e);
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
        paillier::{prime_gen, DecryptionKey},
        parameters::{ELL, EPSILON},
        protocol::SharedContext,
        utils::{sample_witness, testing::init_testing},
        zkp::testing::BadContext,
    };
    use rand::rngs::StdRng;

    fn transcript() -> Transcript {
        Transcript::new(b"PiEncProof Test")
    }

    struct Setup {
        rng: StdRng,
        context: SharedContext,
        setup: RingPedersen,
        pk: EncryptionKey,
    }

    fn setup() -> Setup {
        let mut rng = init_testing();
        let context = SharedContext::random(&mut rng);
        let (scheme, _) = RingPedersen::gen(&mut rng).unwrap();
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let prover_key = DecryptionKey::from_primes(&p, &q).unwrap();
        Setup {
            rng,
            context,
            setup: scheme,
            pk: prover_key.encryption_key(),
        }
    }

    #[test]
    fn proof_verifies_for_in_range_plaintext() {
        let mut s = setup();
        let k = sample_witness(&mut s.rng);
        let (K, rho) = s.pk.encrypt(&mut s.rng, &k).unwrap();

        let input = CommonInput::new(&s.setup, &s.pk, &K);
        let proof = PiEncProof::prove(
            input,
            ProverSecret::new(&k, &rho),
            &s.context,
            &mut transcript(),
            &mut s.rng,
        )
        .unwrap();
        assert!(proof.verify(input, &s.context, &mut transcript()).is_ok());
    }

    #[test]
    fn out_of_range_plaintext_fails() {
        let mut s = setup();
        // Far outside ±2^(ℓ+ε): the z1 range check must catch it.
        let k = (BigNumber::one() << (ELL + 3 * EPSILON)) + BigNumber::one();
        let (K, rho) = s.pk.encrypt(&mut s.rng, &k).unwrap();

        let input = CommonInput::new(&s.setup, &s.pk, &K);
        let proof = PiEncProof::prove(
            input,
            ProverSecret::new(&k, &rho),
            &s.context,
            &mut transcript(),
            &mut s.rng,
        )
        .unwrap();
        assert!(proof.verify(input, &s.context, &mut transcript()).is_err());
    }

    #[test]
    fn mismatched_statement_or_context_fails() {
        let mut s = setup();
        let k = sample_witness(&mut s.rng);
        let (K, rho) = s.pk.encrypt(&mut s.rng, &k).unwrap();
        let (other_K, _) = s.pk.encrypt(&mut s.rng, &k).unwrap();

        let input = CommonInput::new(&s.setup, &s.pk, &K);
        let proof = PiEncProof::prove(
            input,
            ProverSecret::new(&k, &rho),
            &s.context,
            &mut transcript(),
            &mut s.rng,
        )
        .unwrap();

        let other_input = CommonInput::new(&s.setup, &s.pk, &other_K);
        assert!(proof
            .clone()
            .verify(other_input, &s.context, &mut transcript())
            .is_err());
        assert!(proof.verify(input, &BadContext, &mut transcript()).is_err());
    }

    #[test]
    fn wrong_nonce_fails() {
        let mut s = setup();
        let k = sample_witness(&mut s.rng);
        let (K, _) = s.pk.encrypt(&mut s.rng, &k).unwrap();
        let wrong_nonce = s.pk.random_nonce(&mut s.rng).unwrap();

        let input = CommonInput::new(&s.setup, &s.pk, &K);
        let proof = PiEncProof::prove(
            input,
            ProverSecret::new(&k, &wrong_nonce),
            &s.context,
            &mut transcript(),
            &mut s.rng,
        )
        .unwrap();
        assert!(proof.verify(input, &s.context, &mut transcript()).is_err());
    }
}
