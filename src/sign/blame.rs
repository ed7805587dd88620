// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The identifiable-abort phase of signing.
//!
//! When the `Σ Δ = δ·G` consistency check or the final signature
//! verification fails, the signature attempt is dead and every party
//! opens its nonce shares and MtA masks. The openings are checkable
//! against the round 1 ciphertexts and the round 2 `F` encryptions, so
//! lying about them is detected by the pair partner; with honest
//! openings, every party's published `δ_j` and `σ_j` can be recomputed
//! from public data and the cheaters pinned.
//!
//! Opening `k`, `γ`, and the masks of a *failed* attempt reveals nothing
//! about the long-term key: the key-share products stay hidden inside
//! the unopened `χ` values.

use crate::{
    errors::Result,
    messages::{Message, MessageType, SignMessageType},
    paillier::Nonce,
    protocol::ParticipantIdentifier,
};
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};

/// One opened MtA mask, keyed by the recipient of the transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct MaskOpening {
    pub(super) recipient: ParticipantIdentifier,
    /// The mask `β` (or `β̂`).
    pub(super) beta: BigNumber,
    /// The nonce of the binding encryption `F = Enc(-β)`.
    pub(super) nonce: Nonce,
}

/// Everything a party opens when the session aborts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct BlameData {
    /// The nonce share `k_i` with the opening of `K_i`.
    pub(super) k: BigNumber,
    pub(super) rho: Nonce,
    /// The mask share `γ_i` with the opening of `G_i`.
    pub(super) gamma: BigNumber,
    pub(super) nu: Nonce,
    /// δ-side mask openings, one per peer.
    pub(super) delta_openings: Vec<MaskOpening>,
    /// χ-side mask openings, one per peer.
    pub(super) chi_openings: Vec<MaskOpening>,
}

impl BlameData {
    pub(super) fn from_message(message: &Message) -> Result<Self> {
        message.check_type(MessageType::Sign(SignMessageType::R5Blame))?;
        let data: BlameData = deserialize!(&message.unverified_bytes)?;
        Ok(data)
    }

    /// The δ-side mask this party claims it sent to `recipient`.
    pub(super) fn delta_opening_for(
        &self,
        recipient: ParticipantIdentifier,
    ) -> Option<&MaskOpening> {
        self.delta_openings
            .iter()
            .find(|opening| opening.recipient == recipient)
    }

    /// The χ-side mask this party claims it sent to `recipient`.
    pub(super) fn chi_opening_for(
        &self,
        recipient: ParticipantIdentifier,
    ) -> Option<&MaskOpening> {
        self.chi_openings
            .iter()
            .find(|opening| opening.recipient == recipient)
    }
}
