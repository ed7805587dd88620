// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Sampling and challenge derivation for the ranges this protocol
//! actually uses.
//!
//! Four symmetric ranges cover every random integer the rounds and
//! proofs draw (besides uniform field elements and Paillier nonces):
//!
//! | range          | drawn for                                        |
//! |----------------|--------------------------------------------------|
//! | `±2^ℓ'`        | MtA masks β, β̂                                   |
//! | `±2^(ℓ+ε)`     | proof maskings α of a witness                    |
//! | `±2^(ℓ'+ε)`    | proof maskings of an MtA mask                   |
//! | `±2^b · N̂`     | ring-Pedersen commitment randomness (b = ℓ, ℓ+ε) |
//!
//! Every sampler draws from the shifted interval `[0, 2B]` and
//! recenters, so there is no separate sign coin to bias. Fiat–Shamir
//! challenges are derived by wide reduction: 64 surplus bytes of
//! transcript output pushed through `mod n`, leaving a bias below
//! `2^-512`.

use crate::{
    curve::k256_order,
    errors::{InternalError, Result},
    parameters::{ELL, ELL_PRIME, EPSILON},
};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};
use tracing::error;

/// Draw uniformly from `[-bound, bound]` by recentering a draw from
/// `[0, 2·bound]`.
fn sample_symmetric<R: RngCore + CryptoRng>(rng: &mut R, bound: &BigNumber) -> BigNumber {
    // `from_rng` samples the open interval, so widen by one to include
    // the endpoint.
    let width = bound + bound + 1;
    BigNumber::from_rng(&width, rng) - bound
}

/// `|value| ≤ 2^bits`, checked over the shifted interval `[0, 2^(bits+1)]`.
fn fits_symmetric(value: &BigNumber, bits: usize) -> bool {
    let bound = BigNumber::one() << bits;
    let shifted = value + &bound;
    shifted >= BigNumber::zero() && shifted <= &bound + &bound
}

/// Sample an MtA mask `β ∈ ±2^ℓ'`.
pub(crate) fn sample_mta_mask<R: RngCore + CryptoRng>(rng: &mut R) -> BigNumber {
    sample_symmetric(rng, &(BigNumber::one() << ELL_PRIME))
}

/// Sample a proof masking `α ∈ ±2^(ℓ+ε)` for a witness-sized value.
pub(crate) fn sample_prover_mask<R: RngCore + CryptoRng>(rng: &mut R) -> BigNumber {
    sample_symmetric(rng, &(BigNumber::one() << (ELL + EPSILON)))
}

/// Sample a proof masking `∈ ±2^(ℓ'+ε)` for an MtA-mask-sized value.
pub(crate) fn sample_prover_mask_wide<R: RngCore + CryptoRng>(rng: &mut R) -> BigNumber {
    sample_symmetric(rng, &(BigNumber::one() << (ELL_PRIME + EPSILON)))
}

/// Sample ring-Pedersen commitment randomness `∈ ±2^ℓ · N̂` for a
/// committed witness.
pub(crate) fn sample_pedersen_blind<R: RngCore + CryptoRng>(
    rng: &mut R,
    modulus: &BigNumber,
) -> BigNumber {
    sample_symmetric(rng, &((BigNumber::one() << ELL) * modulus))
}

/// Sample ring-Pedersen commitment randomness `∈ ±2^(ℓ+ε) · N̂` for a
/// committed masking.
pub(crate) fn sample_pedersen_blind_wide<R: RngCore + CryptoRng>(
    rng: &mut R,
    modulus: &BigNumber,
) -> BigNumber {
    sample_symmetric(rng, &((BigNumber::one() << (ELL + EPSILON)) * modulus))
}

/// Sample a witness `∈ ±2^ℓ`, the range the proofs promise. Testing only.
#[cfg(test)]
pub(crate) fn sample_witness<R: RngCore + CryptoRng>(rng: &mut R) -> BigNumber {
    sample_symmetric(rng, &(BigNumber::one() << ELL))
}

/// Whether a proof response masking a witness is in `±2^(ℓ+ε)`.
pub(crate) fn in_witness_range(value: &BigNumber) -> bool {
    fits_symmetric(value, ELL + EPSILON)
}

/// Whether a proof response masking an MtA mask is in `±2^(ℓ'+ε)`.
pub(crate) fn in_mask_range(value: &BigNumber) -> bool {
    fits_symmetric(value, ELL_PRIME + EPSILON)
}

/// Sample a unit of `Z*_n` for a biprime `n`.
///
/// A draw that shares a factor with `n` would *be* a factorization of
/// somebody's Paillier modulus; at ~2^-1022 odds that is an invariant
/// failure, not something to quietly resample past.
pub(crate) fn random_unit_mod<R: RngCore + CryptoRng>(
    rng: &mut R,
    n: &BigNumber,
) -> Result<BigNumber> {
    let draw = BigNumber::from_rng(n, rng);
    if draw == BigNumber::zero() || draw.gcd(n) != BigNumber::one() {
        error!("sampled a non-unit mod a biprime; the modulus is factorable");
        return Err(InternalError::InternalInvariantFailed);
    }
    Ok(draw)
}

/// Derive a deterministic pseudorandom integer in `[0, n)` from the
/// [`Transcript`] by wide reduction.
///
/// The draw is 64 bytes longer than `n`, so the reduction bias is below
/// `2^-512` and no resample loop is needed; prover and verifier read the
/// same transcript state and land on the same value.
pub(crate) fn transcript_integer_below(transcript: &mut Transcript, n: &BigNumber) -> BigNumber {
    let mut wide = vec![0u8; n.to_bytes().len() + 64];
    transcript.challenge_bytes(b"wide integer draw", &mut wide);
    BigNumber::from_slice(&wide).nmod(n)
}

/// Derive a deterministic pseudorandom challenge in `±q` from the
/// [`Transcript`], where `q` is the curve order.
pub(crate) fn challenge_plusminus_q(transcript: &mut Transcript) -> BigNumber {
    let q = k256_order();
    let width = &q + &q + 1;
    transcript_integer_below(transcript, &width) - q
}

/// Derive a deterministic sequence of challenge bits from the
/// [`Transcript`], one per soundness repetition.
pub(crate) fn challenge_bits_from_transcript(
    transcript: &mut Transcript,
    count: usize,
) -> Vec<bool> {
    let mut bytes = vec![0u8; count];
    transcript.challenge_bytes(b"sampling challenge bits", bytes.as_mut_slice());
    bytes.into_iter().map(|byte| byte & 1 == 1).collect()
}


////////////////////////////
// Test Utility Functions //
////////////////////////////

#[cfg(test)]
pub(crate) mod testing {
    use crate::enable_zeroize;
    use rand::{
        rngs::{OsRng, StdRng},
        Rng, SeedableRng,
    };
    use tracing_subscriber::{
        filter::Targets, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    };

    /// Initialize any fields necessary for our tests. This should be called
    /// at the top of all our tests. This function is idempotent.
    ///
    /// This will print the rng seed to stderr so that if a test fails, the
    /// failing seed can be recovered and used for debugging.
    pub(crate) fn init_testing() -> StdRng {
        enable_zeroize();
        let mut seeder = OsRng;
        let seed = seeder.gen();
        eprintln!(
            "To re-run test with the same randomness, use init_testing_with_seed() with the following seed:"
        );
        eprintln!("\t{seed:?}");
        StdRng::from_seed(seed)
    }

    /// A seeded version of [`init_testing`]. Use this to reproduce a run
    /// that failed with a specific RNG seed.
    ///
    /// **Additionally, turns on logging by default.**
    ///
    /// This function should only be called when debugging, since error-level
    /// events logged by tests that purposely feed bad input look alarming
    /// next to an `ok` test result.
    #[allow(unused)]
    pub(crate) fn init_testing_with_seed(seed: [u8; 32]) -> StdRng {
        let logging_level = EnvFilter::from_default_env()
            .max_level_hint()
            .unwrap()
            .into_level()
            .unwrap();

        // Only capture logging events from this crate.
        let targets = Targets::new().with_target("cmp_ecdsa", logging_level);
        let stdout_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_filter(targets);

        // It's okay if this fails. It just means logging has already been
        // set up for this thread.
        let _ = tracing_subscriber::registry().with(stdout_layer).try_init();

        crate::enable_zeroize();
        StdRng::from_seed(seed)
    }
}
