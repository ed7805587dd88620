// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Types and functions related to the interactive signing sub-protocol.
//!
//! Produces a standard low-s ECDSA signature over secp256k1 from a
//! [`Config`](crate::keygen::Config) and a signing subset of
//! `threshold + 1` parties.
//!
//! # High-level protocol description
//! Shares are first rescaled by Lagrange coefficients so the subset's
//! shares sum to the full key. The protocol then runs in five rounds:
//! - Round 1 samples the nonce shares `k_i`, `γ_i`, publishes their
//!   Paillier encryptions `K_i`, `G_i` (echo broadcast), and range-proves
//!   `K_i` to each verifier.
//! - Round 2 runs pairwise MtA: each party homomorphically multiplies
//!   its `γ_i` and key share into every peer's `K_j`, with affine-
//!   operation proofs, and reveals `Γ_i = γ_i·G` with a binding proof.
//! - Round 3 decrypts the MtA outputs into additive shares `δ_i` of
//!   `k·γ` and `χ_i` of `k·x`, and publishes `δ_i` and `Δ_i = k_i·Γ`.
//! - Round 4 checks `Σ Δ_j = δ·G`, derives the signature point
//!   `R = δ⁻¹·Γ`, and publishes the partial signature
//!   `σ_i = k_i·m + r·χ_i`.
//! - Round 5 assembles and verifies `(r, s = Σ σ_j)`.
//!
//! If the consistency check or the final verification fails, the parties
//! open their nonces and MtA masks and re-derive every share, ending the
//! session with an error that names the misbehaving parties.

mod blame;
mod input;
mod participant;
mod round_one;
mod round_three;
mod round_two;
mod share;

pub use input::Input;
pub use participant::SignParticipant;
