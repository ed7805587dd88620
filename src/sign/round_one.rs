// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Round one of signing: nonce ciphertexts and their range proofs.

use crate::{
    errors::Result,
    messages::{Message, MessageType, SignMessageType},
    paillier::{Ciphertext, Nonce},
    zkp::pienc::PiEncProof,
};
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

/// The nonce shares and encryption randomness sampled in round one.
#[derive(ZeroizeOnDrop)]
pub(super) struct Private {
    /// The signature nonce share `k_i ∈ Z_q`.
    pub(super) k: BigNumber,
    /// The nonce of `K_i = Enc(k_i; ρ)`.
    pub(super) rho: Nonce,
    /// The mask share `γ_i ∈ Z_q`.
    pub(super) gamma: BigNumber,
    /// The nonce of `G_i = Enc(γ_i; ν)`.
    pub(super) nu: Nonce,
}

impl std::fmt::Debug for Private {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("sign::round_one::Private([redacted])")
    }
}

/// The echo-broadcast portion of round one: both nonce ciphertexts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct PublicBroadcast {
    pub(super) K: Ciphertext,
    pub(super) G: Ciphertext,
}

impl PublicBroadcast {
    pub(super) fn from_message(message: &Message) -> Result<Self> {
        message.check_type(MessageType::Sign(SignMessageType::R1Broadcast))?;
        let public: PublicBroadcast = deserialize!(&message.unverified_bytes)?;
        Ok(public)
    }
}

/// The per-verifier portion of round one: a range proof on `K_i` under
/// the verifier's ring-Pedersen parameters.
#[derive(Serialize, Deserialize)]
pub(super) struct PublicProof {
    pub(super) proof: PiEncProof,
}

impl PublicProof {
    pub(super) fn from_message(message: &Message) -> Result<Self> {
        message.check_type(MessageType::Sign(SignMessageType::R1RangeProof))?;
        let public: PublicProof = deserialize!(&message.unverified_bytes)?;
        Ok(public)
    }
}
