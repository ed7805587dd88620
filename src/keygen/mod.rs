// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Types and functions related to the key generation / refresh
//! sub-protocol.
//!
//! Produces an ECDSA public key whose private key is Shamir-shared among
//! `n` parties with signing threshold `t + 1`, along with each party's
//! Paillier key and ring-Pedersen parameters — everything the signing
//! protocol needs, bundled in a [`Config`].
//!
//! # High-level protocol description
//! The protocol runs in five rounds:
//! - In the first round, each participant samples its VSS polynomial,
//!   session randomness, Paillier and ring-Pedersen material, and
//!   echo-broadcasts a commitment to all of it.
//! - Once all commitments have been received, the second round opens
//!   them.
//! - In the third round, each participant proves its Paillier modulus
//!   and ring-Pedersen parameters well-formed, and sends every other
//!   party its encrypted polynomial evaluation with a binding proof.
//! - In the fourth round, each participant verifies what it received,
//!   aggregates the new key shares, and completes a Schnorr proof of
//!   knowledge of its new share, bound to the assembled [`Config`].
//! - Finally, each participant checks all other participants' Schnorr
//!   responses and outputs the [`Config`].
//!
//! Run with an existing [`Config`] as input, the same five rounds
//! refresh every share (the dealt polynomials share zero) while
//! preserving the aggregate public key.

mod input;
mod keygen_commit;
pub(crate) mod keyshare;
pub mod output;
mod participant;

pub use input::Input;
pub use keyshare::{KeySharePrivate, KeySharePublic};
pub use output::{Config, PublicMaterial};
pub use participant::KeygenParticipant;
