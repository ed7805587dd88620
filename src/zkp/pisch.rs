// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Schnorr proof of knowledge of a discrete logarithm.
//!
//! Proves knowledge of `x` such that `X = x·G`. The protocols use the
//! split form: the commitment `A = a·G` is produced (and committed to)
//! rounds before the response, so [`PiSchProof::precommit`],
//! [`PiSchProof::prove_from_precommit`] and
//! [`PiSchProof::verify_with_precommit`] are the primary interface; the
//! one-shot [`Proof`] impl exists for completeness and tests.

use crate::{
    curve::{bn_to_scalar, k256_order, random_scalar, CurvePoint},
    errors::{Fault, InternalError, ProofKind, Result},
    utils::transcript_integer_below,
    zkp::{Proof, ProofContext},
};
use k256::Scalar;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;
use zeroize::Zeroize;

/// Proof of knowledge of the discrete log of [`CommonInput::x_point`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiSchProof {
    /// Commitment `A = a·G`.
    A: CurvePoint,
    /// Response `z = a + e·x mod q`.
    z: Scalar,
}

/// The prover's commitment, generated ahead of the proof.
///
/// Holds the secret exponent `a`; zeroized on drop.
pub(crate) struct PiSchPrecommit {
    A: CurvePoint,
    a: Scalar,
}

impl std::fmt::Debug for PiSchPrecommit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiSchPrecommit")
            .field("A", &self.A)
            .field("a", &"[redacted]")
            .finish()
    }
}

impl Drop for PiSchPrecommit {
    fn drop(&mut self) {
        self.a.zeroize();
    }
}

impl PiSchPrecommit {
    /// The public commitment `A`.
    pub(crate) fn precommitment(&self) -> &CurvePoint {
        &self.A
    }
}

/// The public statement: `X = x·G` for the witness `x`.
#[derive(Clone, Copy)]
pub(crate) struct CommonInput<'a> {
    x_point: &'a CurvePoint,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(x_point: &'a CurvePoint) -> Self {
        Self { x_point }
    }
}

/// The witness `x`.
pub(crate) struct ProverSecret<'a> {
    x: &'a Scalar,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(x: &'a Scalar) -> Self {
        Self { x }
    }
}

impl std::fmt::Debug for ProverSecret<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("pisch::ProverSecret([redacted])")
    }
}

impl PiSchProof {
    /// Sample the commitment phase of the proof.
    pub(crate) fn precommit<R: RngCore + CryptoRng>(rng: &mut R) -> Result<PiSchPrecommit> {
        let a = random_scalar(rng);
        let A = CurvePoint::GENERATOR.multiply_by_scalar(&a);
        Ok(PiSchPrecommit { A, a })
    }

    /// Complete a proof from an earlier commitment.
    ///
    /// The transcript must already bind everything the challenge should
    /// depend on; it is cloned, so the caller's copy is unchanged.
    pub(crate) fn prove_from_precommit(
        context: &impl ProofContext,
        precommit: &PiSchPrecommit,
        input: &CommonInput,
        secret: &ProverSecret,
        transcript: &Transcript,
    ) -> Result<Self> {
        let mut transcript = transcript.clone();
        let e = Self::challenge(&mut transcript, context, input, &precommit.A)?;
        let z = precommit.a + e * secret.x;
        Ok(Self { A: precommit.A, z })
    }

    /// Verify a proof whose commitment `A` was fixed in advance.
    pub(crate) fn verify_with_precommit(
        self,
        input: CommonInput,
        context: &impl ProofContext,
        transcript: &Transcript,
        precommitment: &CurvePoint,
    ) -> Result<()> {
        if &self.A != precommitment {
            error!("proof commitment does not match the committed precommitment");
            return Err(InternalError::unattributed(Fault::ZkProofFailed(
                ProofKind::Sch,
            )));
        }
        let mut transcript = transcript.clone();
        self.verify_impl(input, context, &mut transcript)
    }

    fn challenge(
        transcript: &mut Transcript,
        context: &impl ProofContext,
        input: &CommonInput,
        A: &CurvePoint,
    ) -> Result<Scalar> {
        transcript.append_message(b"PiSch ProofContext", &context.as_bytes()?);
        transcript.append_message(b"X", &input.x_point.to_bytes());
        transcript.append_message(b"A", &A.to_bytes());
        bn_to_scalar(&transcript_integer_below(transcript, &k256_order()))
    }

    fn verify_impl(
        self,
        input: CommonInput,
        context: &impl ProofContext,
        transcript: &mut Transcript,
    ) -> Result<()> {
        let e = Self::challenge(transcript, context, &input, &self.A)?;
        let lhs = CurvePoint::GENERATOR.multiply_by_scalar(&self.z);
        let rhs = self.A + input.x_point.multiply_by_scalar(&e);
        if lhs != rhs {
            error!("Schnorr verification equation failed");
            return Err(InternalError::unattributed(Fault::ZkProofFailed(
                ProofKind::Sch,
            )));
        }
        Ok(())
    }
}

impl Proof for PiSchProof {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = ProverSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let precommit = Self::precommit(rng)?;
        Self::prove_from_precommit(context, &precommit, &input, &secret, transcript)
    }

    fn verify(
        self,
        input: Self::CommonInput<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
    ) -> Result<()> {
        self.verify_impl(input, context, transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocol::SharedContext,
        utils::testing::init_testing,
        zkp::testing::BadContext,
    };

    fn transcript() -> Transcript {
        Transcript::new(b"PiSchProof Test")
    }

    #[test]
    fn proof_verifies() {
        let mut rng = init_testing();
        let context = SharedContext::random(&mut rng);
        let x = random_scalar(&mut rng);
        let X = CurvePoint::GENERATOR.multiply_by_scalar(&x);
        let input = CommonInput::new(&X);

        let proof = PiSchProof::prove(
            input,
            ProverSecret::new(&x),
            &context,
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &context, &mut transcript()).is_ok());
    }

    #[test]
    fn wrong_witness_fails() {
        let mut rng = init_testing();
        let context = SharedContext::random(&mut rng);
        let x = random_scalar(&mut rng);
        let X = CurvePoint::GENERATOR.multiply_by_scalar(&x);
        let bad_x = random_scalar(&mut rng);
        let input = CommonInput::new(&X);

        let proof = PiSchProof::prove(
            input,
            ProverSecret::new(&bad_x),
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
        let x = random_scalar(&mut rng);
        let X = CurvePoint::GENERATOR.multiply_by_scalar(&x);
        let input = CommonInput::new(&X);

        let proof = PiSchProof::prove(
            input,
            ProverSecret::new(&x),
            &context,
            &mut transcript(),
            &mut rng,
        )
        .unwrap();
        assert!(proof.verify(input, &BadContext, &mut transcript()).is_err());
    }

    #[test]
    fn precommit_flow_matches_one_shot() {
        let mut rng = init_testing();
        let context = SharedContext::random(&mut rng);
        let x = random_scalar(&mut rng);
        let X = CurvePoint::GENERATOR.multiply_by_scalar(&x);
        let input = CommonInput::new(&X);

        let precommit = PiSchProof::precommit(&mut rng).unwrap();
        let A = *precommit.precommitment();
        let transcript = transcript();
        let proof = PiSchProof::prove_from_precommit(
            &context,
            &precommit,
            &input,
            &ProverSecret::new(&x),
            &transcript,
        )
        .unwrap();

        // Must verify against the original commitment, not a substitute.
        let other = PiSchProof::precommit(&mut rng).unwrap();
        assert!(proof
            .clone()
            .verify_with_precommit(input, &context, &transcript, other.precommitment())
            .is_err());
        assert!(proof
            .verify_with_precommit(input, &context, &transcript, &A)
            .is_ok());
    }
}
