// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Proof that ring-Pedersen parameters are well-formed.
//!
//! Proves knowledge of λ with `s = t^λ mod N`, which makes commitments
//! under `(N, s, t)` binding for everyone except the parameter owner.
//! Binary challenges over [`SOUNDNESS_REPS`] parallel repetitions.

use crate::{
    errors::{Fault, InternalError, ProofKind, Result},
    paillier::DecryptionKey,
    parameters::SOUNDNESS_REPS,
    ring_pedersen::{PedersenSecret, RingPedersen},
    utils::challenge_bits_from_transcript,
    zkp::{Proof, ProofContext},
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Proof that [`CommonInput::scheme`] satisfies `s = t^λ mod N`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiPrmProof {
    /// Commitments `A_i = t^{a_i} mod N`.
    commitments: Vec<BigNumber>,
    /// Responses `z_i = a_i + e_i·λ mod φ(N)`.
    responses: Vec<BigNumber>,
}

/// The public statement: the ring-Pedersen parameters.
#[derive(Clone, Copy)]
pub(crate) struct CommonInput<'a> {
    scheme: &'a RingPedersen,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(scheme: &'a RingPedersen) -> Self {
        Self { scheme }
    }
}

/// The witness: the trapdoor λ and the decryption key of the modulus,
/// which supplies the group order φ(N) and CRT-accelerated
/// exponentiation.
pub(crate) struct ProverSecret<'a> {
    secret: &'a PedersenSecret,
    sk: &'a DecryptionKey,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(secret: &'a PedersenSecret, sk: &'a DecryptionKey) -> Self {
        Self { secret, sk }
    }
}

impl std::fmt::Debug for ProverSecret<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("piprm::ProverSecret([redacted])")
    }
}

fn append_statement(
    transcript: &mut Transcript,
    context: &impl ProofContext,
    input: &CommonInput,
    commitments: &[BigNumber],
) -> Result<()> {
    transcript.append_message(b"PiPrm ProofContext", &context.as_bytes()?);
    transcript.append_message(b"N", &input.scheme.modulus().to_bytes());
    transcript.append_message(b"s", &input.scheme.s().to_bytes());
    transcript.append_message(b"t", &input.scheme.t().to_bytes());
    transcript.append_message(b"A", &serialize!(&commitments)?);
    Ok(())
}

impl Proof for PiPrmProof {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = ProverSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let totient = secret.sk.phi();
        let exponents = (0..SOUNDNESS_REPS)
            .map(|_| BigNumber::from_rng(totient, rng))
            .collect::<Vec<_>>();
        // The prover owns the modulus, so the commitments go through CRT.
        let commitments = exponents
            .iter()
            .map(|a| secret.sk.crt_n().exp(input.scheme.t(), a))
            .collect::<Vec<_>>();

        append_statement(transcript, context, &input, &commitments)?;
        let challenges = challenge_bits_from_transcript(transcript, SOUNDNESS_REPS);

        let responses = exponents
            .iter()
            .zip(&challenges)
            .map(|(a, e)| {
                if *e {
                    (a + secret.secret.lambda()).nmod(totient)
                } else {
                    a.clone()
                }
            })
            .collect();

        Ok(Self {
            commitments,
            responses,
        })
    }

    fn verify(
        self,
        input: Self::CommonInput<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
    ) -> Result<()> {
        let fail = || InternalError::unattributed(Fault::ZkProofFailed(ProofKind::Prm));
        if self.commitments.len() != SOUNDNESS_REPS || self.responses.len() != SOUNDNESS_REPS {
            error!("wrong number of proof repetitions");
            return Err(fail());
        }

        append_statement(transcript, context, &input, &self.commitments)?;
        let challenges = challenge_bits_from_transcript(transcript, SOUNDNESS_REPS);

        let modulus = input.scheme.modulus();
        for ((commitment, response), e) in self
            .commitments
            .iter()
            .zip(&self.responses)
            .zip(&challenges)
        {
            // t^z == A · s^e (mod N)
            let lhs = input.scheme.t().modpow(response, modulus);
            let rhs = if *e {
                commitment.modmul(input.scheme.s(), modulus)
            } else {
                commitment.nmod(modulus)
            };
            if lhs != rhs {
                error!("ring-Pedersen response failed to verify");
                return Err(fail());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        paillier::{prime_gen, DecryptionKey},
        protocol::SharedContext,
        utils::testing::init_testing,
        zkp::testing::BadContext,
    };

    fn transcript() -> Transcript {
        Transcript::new(b"PiPrmProof Test")
    }

    #[test]
    fn proof_verifies_for_honest_parameters() {
        let mut rng = init_testing();
        let context = SharedContext::random(&mut rng);
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let sk = DecryptionKey::from_primes(&p, &q).unwrap();
        let (scheme, secret) = RingPedersen::extract(&sk, &mut rng).unwrap();

        let input = CommonInput::new(&scheme);
        let proof = PiPrmProof::prove(
            input,
            ProverSecret::new(&secret, &sk),
            &context,
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &context, &mut transcript()).is_ok());
    }

    #[test]
    fn unrelated_parameters_fail() {
        let mut rng = init_testing();
        let context = SharedContext::random(&mut rng);
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let sk = DecryptionKey::from_primes(&p, &q).unwrap();
        let (scheme, _) = RingPedersen::extract(&sk, &mut rng).unwrap();
        // A trapdoor for different parameters over the same modulus.
        let (_, wrong_secret) = RingPedersen::extract(&sk, &mut rng).unwrap();

        let input = CommonInput::new(&scheme);
        let proof = PiPrmProof::prove(
            input,
            ProverSecret::new(&wrong_secret, &sk),
            &context,
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &context, &mut transcript()).is_err());
    }

    #[test]
    fn context_and_shape_must_match() {
        let mut rng = init_testing();
        let context = SharedContext::random(&mut rng);
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let sk = DecryptionKey::from_primes(&p, &q).unwrap();
        let (scheme, secret) = RingPedersen::extract(&sk, &mut rng).unwrap();

        let input = CommonInput::new(&scheme);
        let proof = PiPrmProof::prove(
            input,
            ProverSecret::new(&secret, &sk),
            &context,
            &mut transcript(),
            &mut rng,
        )
        .unwrap();

        assert!(proof
            .clone()
            .verify(input, &BadContext, &mut transcript())
            .is_err());

        let mut truncated = proof;
        let _ = truncated.responses.pop();
        assert!(truncated.verify(input, &context, &mut transcript()).is_err());
    }
}
