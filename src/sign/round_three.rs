// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Round three of signing: the additive shares of `k·γ` and `k·x`.

use crate::{
    curve::CurvePoint,
    errors::{CallerError, InternalError, Result},
    messages::{Message, MessageType, SignMessageType},
    zkp::pilog::PiLogProof,
};
use k256::{elliptic_curve::PrimeField, FieldBytes, Scalar};
use serde::{Deserialize, Serialize};
use tracing::error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The shares computed after decrypting the MtA outputs.
#[derive(Clone, ZeroizeOnDrop)]
pub(super) struct Private {
    /// Additive share of `k·γ`; also sent in the clear in round three.
    pub(super) delta: Scalar,
    /// Additive share of `k·x`.
    pub(super) chi: Scalar,
    #[zeroize(skip)]
    pub(super) Gamma: CurvePoint,
    #[zeroize(skip)]
    pub(super) Delta: CurvePoint,
}

impl std::fmt::Debug for Private {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // delta, Gamma, and Delta travel over the network in this round;
        // only chi stays private.
        f.debug_struct("sign::round_three::Private")
            .field("delta", &self.delta)
            .field("chi", &"[redacted]")
            .field("Gamma", &self.Gamma)
            .field("Delta", &self.Delta)
            .finish()
    }
}

/// The round three payload for one verifier.
#[derive(Serialize, Deserialize)]
pub(super) struct Public {
    pub(super) delta: Scalar,
    pub(super) Delta: CurvePoint,
    /// Discrete-log proof binding `Δ_i` to `K_i` over the base `Γ`.
    pub(super) psi_double_prime: PiLogProof,
}

impl Public {
    /// Deserialize, re-checking that `delta` is a canonical scalar.
    ///
    /// Serde's scalar deserialization does not reject non-canonical
    /// encodings, so round-trip through the checked parser.
    pub(super) fn from_message(message: &Message) -> Result<Self> {
        message.check_type(MessageType::Sign(SignMessageType::R3DeltaShare))?;
        let public: Public = deserialize!(&message.unverified_bytes)?;

        let mut bytes: FieldBytes = public.delta.to_bytes();
        let canonical: Option<Scalar> = Scalar::from_repr(bytes).into();
        bytes.zeroize();
        if canonical.is_none() {
            error!("round three delta share is not a canonical scalar");
            return Err(InternalError::from(CallerError::DeserializationFailed));
        }
        Ok(public)
    }
}
