// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Round two of signing: the pairwise MtA transforms.

use crate::{
    curve::CurvePoint,
    errors::Result,
    messages::{Message, MessageType, SignMessageType},
    paillier::{Ciphertext, Nonce},
    zkp::{piaffg::PiAffgProof, piaffp::PiAffpProof, pilog::PiLogProof},
};
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

/// The masks this party chose for one peer's MtA pair, kept for round
/// three aggregation and for the blame phase.
#[derive(ZeroizeOnDrop)]
pub(super) struct MtaSecrets {
    /// The mask `β` of the `γ·k` product.
    pub(super) beta: BigNumber,
    /// The nonce opening `F = Enc_i(-β)`.
    pub(super) beta_nonce: Nonce,
    /// The mask `β̂` of the `x·k` product.
    pub(super) beta_hat: BigNumber,
    /// The nonce opening `F̂ = Enc_i(-β̂)`.
    pub(super) beta_hat_nonce: Nonce,
}

impl std::fmt::Debug for MtaSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("sign::round_two::MtaSecrets([redacted])")
    }
}

/// The round two payload for one recipient `j`.
///
/// `D` and `D_hat` transform the recipient's own `K_j`; `F`, `F_hat` and
/// `x_encryption` are prover-key encryptions binding the masks and the
/// key share; the three proofs tie everything together.
#[derive(Serialize, Deserialize)]
pub(super) struct Public {
    /// `Γ_i = γ_i·G`.
    pub(super) gamma_point: CurvePoint,
    /// `D = K_j^{γ_i} ⊙ Enc_j(-β)`.
    pub(super) D: Ciphertext,
    /// `F = Enc_i(-β)`.
    pub(super) F: Ciphertext,
    /// `D̂ = K_j^{x_i} ⊙ Enc_j(-β̂)`.
    pub(super) D_hat: Ciphertext,
    /// `F̂ = Enc_i(-β̂)`.
    pub(super) F_hat: Ciphertext,
    /// `X̂ = Enc_i(x_i)`, the Paillier binding of the key share.
    pub(super) x_encryption: Ciphertext,
    /// Affine-operation proof for the `γ·k` product, bound to `Γ_i`.
    pub(super) affg: PiAffgProof,
    /// Affine-operation proof for the `x·k` product, bound to `X̂`.
    pub(super) affp: PiAffpProof,
    /// Discrete-log proof binding `Γ_i` to `G_i`.
    pub(super) pilog: PiLogProof,
}

impl Public {
    pub(super) fn from_message(message: &Message) -> Result<Self> {
        message.check_type(MessageType::Sign(SignMessageType::R2MtA))?;
        let public: Public = deserialize!(&message.unverified_bytes)?;
        Ok(public)
    }
}
