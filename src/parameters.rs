// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Protocol-wide constants.
//!
//! The range-proof parameters follow the CGGMP'21 instantiation for a
//! 256-bit curve order: witnesses live in `±2^ELL`, MtA masks in
//! `±2^ELL_PRIME`, and responses may grow by the slack `EPSILON`.

/// Bit length of each prime factor of a Paillier modulus.
pub(crate) const PRIME_BITS: usize = 1024;

/// Bit length of a full Paillier modulus `N = p·q`.
pub(crate) const MODULUS_BITS: usize = 2 * PRIME_BITS;

/// Range bound exponent ℓ for proof witnesses (the curve order size).
pub(crate) const ELL: usize = 256;

/// Range bound exponent ℓ' for MtA mask values.
pub(crate) const ELL_PRIME: usize = 5 * ELL;

/// Slack exponent ε added to range bounds by the Fiat–Shamir challenge.
pub(crate) const EPSILON: usize = 2 * ELL;

/// Parallel repetitions for the binary-challenge proofs (`pimod`,
/// `piprm`); gives 2⁻⁸⁰ soundness error.
pub(crate) const SOUNDNESS_REPS: usize = 80;

/// Byte length of the session random identifier and chain key.
pub(crate) const RID_BYTES: usize = 32;
