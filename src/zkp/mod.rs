// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Non-interactive zero-knowledge proofs (Fiat–Shamir Σ-protocols).
//!
//! Each proof is a serializable blob produced against a [`Transcript`] that
//! the prover and verifier construct identically: the caller seeds it with
//! the session context and the prover's party identifier (the "per-party
//! fork"), the proof then absorbs its statement and commitments before
//! squeezing the challenge. Verification recomputes the challenge and
//! checks the responses; any mismatch is attributed to the prover by the
//! calling round.
//!
//! The suite:
//! - [`pimod`] — `N` is a Paillier–Blum modulus.
//! - [`piprm`] — `(s, t)` are honest ring-Pedersen parameters for `N`.
//! - [`pisch`] — Schnorr knowledge of discrete log.
//! - [`pienc`] — Paillier plaintext is in range.
//! - [`pilog`] — Paillier plaintext equals a discrete log, in range.
//! - [`piaffg`] — affine-operation consistency, group-element witness.
//! - [`piaffp`] — affine-operation consistency, Paillier witness.

pub mod piaffg;
pub mod piaffp;
pub mod pienc;
pub mod pilog;
pub mod pimod;
pub mod piprm;
pub mod pisch;

use crate::errors::Result;
use merlin::Transcript;
use rand::{CryptoRng, RngCore};

/// Public context material bound into a proof transcript.
///
/// Binding the session context into every transcript stops proofs from
/// being replayed across sessions, protocols, or library versions.
pub trait ProofContext {
    /// A canonical byte encoding of the context.
    fn as_bytes(&self) -> Result<Vec<u8>>;
}

/// Common interface for the proofs in this module.
pub(crate) trait Proof: Sized {
    /// Public statement, shared by prover and verifier.
    type CommonInput<'a>;
    /// The prover's witness.
    type ProverSecret<'a>;

    /// Prove the statement over the given transcript.
    fn prove<R: RngCore + CryptoRng>(
        input: Self::CommonInput<'_>,
        secret: Self::ProverSecret<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
        rng: &mut R,
    ) -> Result<Self>;

    /// Verify the proof against the statement, consuming it.
    fn verify(
        self,
        input: Self::CommonInput<'_>,
        context: &impl ProofContext,
        transcript: &mut Transcript,
    ) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::ProofContext;
    use crate::errors::Result;

    /// A context that cannot match any real session's.
    pub(crate) struct BadContext;

    impl ProofContext for BadContext {
        fn as_bytes(&self) -> Result<Vec<u8>> {
            Ok(b"not the real context".to_vec())
        }
    }
}
