// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Proof that a modulus is a Paillier–Blum integer.
//!
//! Proves that `N = p·q` with `p ≡ q ≡ 3 (mod 4)` and `gcd(N, φ(N)) = 1`:
//! exactly the structure the Paillier key and the 4th-root arithmetic of
//! this crate rely on. The protocol runs [`SOUNDNESS_REPS`] parallel
//! repetitions; in each, the verifier's challenge `y` is answered with an
//! `N`-th root of `y` and a 4th root of `±w^b·y`, neither of which can be
//! produced for malformed moduli with probability better than 1/2 per
//! repetition.

use crate::{
    errors::{Fault, InternalError, ProofKind, Result},
    parameters::SOUNDNESS_REPS,
    paillier::CrtExp,
    utils::transcript_integer_below,
    zkp::{Proof, ProofContext},
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Proof that [`CommonInput::modulus`] is a Paillier–Blum integer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PiModProof {
    /// A quadratic non-residue with Jacobi symbol -1.
    w: BigNumber,
    responses: Vec<PiModResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PiModResponse {
    /// 4th root of `(-1)^a · w^b · y mod N`.
    x: BigNumber,
    a: bool,
    b: bool,
    /// `N`-th root of `y mod N`.
    z: BigNumber,
}

/// The public statement: the modulus `N`.
#[derive(Clone, Copy)]
pub(crate) struct CommonInput<'a> {
    modulus: &'a BigNumber,
}

impl<'a> CommonInput<'a> {
    pub(crate) fn new(modulus: &'a BigNumber) -> Self {
        Self { modulus }
    }
}

/// The witness: the prime factorization of `N`.
pub(crate) struct ProverSecret<'a> {
    p: &'a BigNumber,
    q: &'a BigNumber,
}

impl<'a> ProverSecret<'a> {
    pub(crate) fn new(p: &'a BigNumber, q: &'a BigNumber) -> Self {
        Self { p, q }
    }
}

impl std::fmt::Debug for ProverSecret<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("pimod::ProverSecret([redacted])")
    }
}

/// Compute the Jacobi symbol `(a/n)` for odd positive `n`.
///
/// Binary algorithm over the reciprocity law; runs in `O(log² n)`.
pub(crate) fn jacobi(a: &BigNumber, n: &BigNumber) -> i8 {
    let zero = BigNumber::zero();
    let one = BigNumber::one();
    let three = BigNumber::from(3u64);
    let four = BigNumber::from(4u64);
    let eight = BigNumber::from(8u64);

    let mut a = a.nmod(n);
    let mut n = n.clone();
    let mut result: i8 = 1;
    while a != zero {
        while a.nmod(&BigNumber::from(2u64)) == zero {
            a = a >> 1;
            let r = n.nmod(&eight);
            if r == three || r == BigNumber::from(5u64) {
                result = -result;
            }
        }
        std::mem::swap(&mut a, &mut n);
        if a.nmod(&four) == three && n.nmod(&four) == three {
            result = -result;
        }
        a = a.nmod(&n);
    }
    if n == one {
        result
    } else {
        0
    }
}

/// Draw a challenge in `Z*_N` from the transcript.
///
/// A draw sharing a factor with `N` *is* a factorization of `N`; both
/// sides treat that (negligible for honest moduli) event as a failed
/// statement rather than resampling past it.
fn challenge_y(transcript: &mut Transcript, modulus: &BigNumber) -> Result<BigNumber> {
    let y = transcript_integer_below(transcript, modulus);
    if y == BigNumber::zero() || y.gcd(modulus) != BigNumber::one() {
        error!("transcript challenge shares a factor with the modulus");
        return Err(InternalError::unattributed(Fault::ZkProofFailed(
            ProofKind::Mod,
        )));
    }
    Ok(y)
}

/// Square root mod a Blum prime `p`, picking the root that is itself a
/// quadratic residue (so it can be rooted again).
fn sqrt_mod_blum_prime(value: &BigNumber, p: &BigNumber) -> BigNumber {
    let exp: BigNumber = (p + BigNumber::one()) >> 2;
    let root = value.modpow(&exp, p);
    if jacobi(&root, p) == 1 {
        root
    } else {
        (p - root).nmod(p)
    }
}

/// 4th root mod a Blum prime of a value known to be a quadratic residue
/// whose square roots are again rootable.
fn fourth_root_mod_blum_prime(value: &BigNumber, p: &BigNumber) -> BigNumber {
    let sqrt = sqrt_mod_blum_prime(value, p);
    sqrt_mod_blum_prime(&sqrt, p)
}

fn append_statement(
    transcript: &mut Transcript,
    context: &impl ProofContext,
    input: &CommonInput,
    w: &BigNumber,
) -> Result<()> {
    transcript.append_message(b"PiMod ProofContext", &context.as_bytes()?);
    transcript.append_message(b"N", &input.modulus.to_bytes());
    transcript.append_message(b"w", &w.to_bytes());
    Ok(())
}

impl Proof for PiModProof {
    type CommonInput<'a> = CommonInput<'a>;
    type ProverSecret<'a> = ProverSecret<'a>;

    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self> {
        let n = input.modulus;
        if &(secret.p * secret.q) != n {
            error!("prover secret does not factor the modulus");
            return Err(InternalError::InternalInvariantFailed);
        }
        let phi = (secret.p - BigNumber::one()) * (secret.q - BigNumber::one());
        let n_inv = n.invert(&phi).ok_or_else(|| {
            error!("N is not invertible mod φ(N); the factors are not safe primes");
            InternalError::InternalInvariantFailed
        })?;
        let crt = CrtExp::for_modulus(secret.p, secret.q)?;

        // A quadratic non-residue with Jacobi symbol -1; half of Z*_N
        // qualifies, so a couple of draws suffice.
        let w = loop {
            let candidate = BigNumber::from_rng(n, rng);
            if jacobi(&candidate, n) == -1 {
                break candidate;
            }
        };

        append_statement(transcript, context, &input, &w)?;

        let responses = (0..SOUNDNESS_REPS)
            .map(|_| {
                let y = challenge_y(transcript, n)?;
                let z = crt.exp(&y, &n_inv);

                // Exactly one of (-1)^a · w^b · y is a quadratic residue
                // mod both p and q; find it by Legendre symbols.
                let y_p = jacobi(&y, secret.p);
                let y_q = jacobi(&y, secret.q);
                let w_p = jacobi(&w, secret.p);
                let w_q = jacobi(&w, secret.q);
                let (a, b) = match (y_p, y_q) {
                    (1, 1) => (false, false),
                    (-1, -1) => (true, false),
                    // One-sided non-residue: multiplying by w flips
                    // exactly one side, multiplying by -1 flips both.
                    _ => {
                        if (w_p * y_p, w_q * y_q) == (1, 1) {
                            (false, true)
                        } else {
                            (true, true)
                        }
                    }
                };
                let mut adjusted = y.clone();
                if b {
                    adjusted = adjusted.modmul(&w, n);
                }
                if a {
                    adjusted = (n - adjusted).nmod(n);
                }

                let x_p = fourth_root_mod_blum_prime(&adjusted, secret.p);
                let x_q = fourth_root_mod_blum_prime(&adjusted, secret.q);
                let x = crt.combine(&x_p, &x_q);

                Ok(PiModResponse { x, a, b, z })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { w, responses })
    }

    fn verify(
        self,
        input: Self::CommonInput<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
    ) -> Result<()> {
        let n = input.modulus;
        let fail = || InternalError::unattributed(Fault::ZkProofFailed(ProofKind::Mod));

        // Structural checks on the modulus itself.
        if n <= &BigNumber::one() || n.nmod(&BigNumber::from(2u64)) == BigNumber::zero() {
            error!("modulus is even or trivial");
            return Err(fail());
        }
        if n.is_prime() {
            error!("modulus is prime");
            return Err(fail());
        }
        if self.w <= BigNumber::zero() || &self.w >= n || jacobi(&self.w, n) != -1 {
            error!("w is not a Jacobi -1 element of Z_N");
            return Err(fail());
        }
        if self.responses.len() != SOUNDNESS_REPS {
            error!("wrong number of proof repetitions");
            return Err(fail());
        }

        append_statement(transcript, context, &input, &self.w)?;

        let four = BigNumber::from(4u64);
        for response in &self.responses {
            let y = challenge_y(transcript, n)?;

            // z^N == y (mod N)
            if response.z.modpow(n, n) != y {
                error!("N-th root response failed");
                return Err(fail());
            }

            // x^4 == (-1)^a · w^b · y (mod N)
            let mut adjusted = y;
            if response.b {
                adjusted = adjusted.modmul(&self.w, n);
            }
            if response.a {
                adjusted = (n - adjusted).nmod(n);
            }
            if response.x.modpow(&four, n) != adjusted {
                error!("4th-root response failed");
                return Err(fail());
            }
        }
        Ok(())
    }
}
