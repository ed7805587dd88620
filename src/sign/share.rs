// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Partial signatures and their assembly.

use crate::{
    curve::{is_high, Signature},
    errors::{Fault, InternalError, Result},
    messages::{Message, MessageType, SignMessageType},
};
use k256::Scalar;
use serde::{Deserialize, Serialize};
use tracing::error;

/// One party's partial signature `σ_i = k_i·m + r·χ_i`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(super) struct SignatureShare(pub(super) Scalar);

impl SignatureShare {
    pub(super) fn from_message(message: &Message) -> Result<Self> {
        message.check_type(MessageType::Sign(SignMessageType::R4SigShare))?;
        let share: SignatureShare = deserialize!(&message.unverified_bytes)?;
        Ok(share)
    }

    /// Assemble a low-s signature from the x-projection `r` and all
    /// partial signatures.
    pub(super) fn assemble(r: &Scalar, shares: impl Iterator<Item = Self>) -> Result<Signature> {
        let mut sum = shares.fold(Scalar::ZERO, |sum, share| sum + share.0);
        if is_high(&sum) {
            sum = -sum;
        }
        Signature::from_scalars(*r, sum).map_err(|_| {
            error!("assembled (r, s) pair is not a valid signature encoding");
            InternalError::unattributed(Fault::SignatureInvalid)
        })
    }
}
