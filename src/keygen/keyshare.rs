// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Key shares and the VSS polynomial arithmetic behind them.
//!
//! Each party deals a degree-`t` polynomial `f` over the scalar field and
//! publishes its exponent form `F(X) = f(X)·G` coefficient-wise. Party `j`
//! is assigned the fixed nonzero coordinate `pid(j) + 1`; its share of the
//! dealt secret is `f(j)`, verifiable against `F(j)`.

use crate::{
    curve::{bn_to_scalar, k256_order, random_scalar, scalar_to_bn, CurvePoint},
    errors::{Fault, InternalError, Result},
    paillier::{Ciphertext, DecryptionKey, EncryptionKey},
    protocol::ParticipantIdentifier,
};
use k256::{elliptic_curve::PrimeField, Scalar};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::ops::Add;
use tracing::error;
use zeroize::ZeroizeOnDrop;

/// A private VSS polynomial coefficient.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub(crate) struct CoeffPrivate {
    pub(crate) x: Scalar,
}

impl std::fmt::Debug for CoeffPrivate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CoeffPrivate([redacted])")
    }
}

/// A public (exponent-form) VSS polynomial coefficient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct CoeffPublic {
    X: CurvePoint,
}

impl CoeffPublic {
    pub(crate) fn new(X: CurvePoint) -> Self {
        Self { X }
    }
}

impl AsRef<CurvePoint> for CoeffPublic {
    fn as_ref(&self) -> &CurvePoint {
        &self.X
    }
}

impl Add<&CoeffPublic> for CoeffPublic {
    type Output = Self;

    fn add(self, rhs: &CoeffPublic) -> Self::Output {
        CoeffPublic { X: self.X + rhs.X }
    }
}

/// Sample a VSS polynomial of the given degree.
///
/// The constant term is the dealt secret: a fresh random scalar for
/// initial keygen, zero for a refresh (so the dealt sharing adds nothing
/// to the aggregate key).
pub(crate) fn sample_polynomial<R: RngCore + CryptoRng>(
    degree: usize,
    constant: Option<Scalar>,
    rng: &mut R,
) -> Vec<CoeffPrivate> {
    let mut coeffs = Vec::with_capacity(degree + 1);
    coeffs.push(CoeffPrivate {
        x: constant.unwrap_or_else(|| random_scalar(rng)),
    });
    for _ in 0..degree {
        coeffs.push(CoeffPrivate {
            x: random_scalar(rng),
        });
    }
    coeffs
}

/// The exponent form of a private polynomial.
pub(crate) fn to_public_coeffs(coeffs: &[CoeffPrivate]) -> Vec<CoeffPublic> {
    coeffs
        .iter()
        .map(|coeff| CoeffPublic::new(CurvePoint::GENERATOR.multiply_by_scalar(&coeff.x)))
        .collect()
}

/// Assign a nonzero x-coordinate to each participant.
pub(crate) fn participant_coordinate(pid: ParticipantIdentifier) -> Scalar {
    Scalar::from_u128(pid.as_u128()) + Scalar::ONE
}

/// Evaluate the private polynomial at a participant's coordinate.
pub(crate) fn eval_private_share(
    coeffs: &[CoeffPrivate],
    recipient: ParticipantIdentifier,
) -> EvalPrivate {
    let x = participant_coordinate(recipient);
    let mut sum = Scalar::ZERO;
    for coeff in coeffs.iter().rev() {
        sum *= &x;
        sum += &coeff.x;
    }
    EvalPrivate { x: sum }
}

/// Feldman evaluation of the exponent polynomial at a participant's
/// coordinate.
pub(crate) fn eval_public_share(
    coeff_publics: &[CoeffPublic],
    recipient: ParticipantIdentifier,
) -> CurvePoint {
    let x = participant_coordinate(recipient);
    let mut sum = CurvePoint::IDENTITY;
    for coeff in coeff_publics.iter().rev() {
        sum = sum.multiply_by_scalar(&x);
        sum = sum + *coeff.as_ref();
    }
    sum
}

/// The Lagrange coefficient at zero for `my_point` over the given set.
///
/// Scaling each party's share by its coefficient turns Shamir shares over
/// the set into additive shares of the polynomial's constant term.
pub(crate) fn lagrange_coefficient_at_zero(
    my_point: &ParticipantIdentifier,
    other_points: &[ParticipantIdentifier],
) -> Scalar {
    let mut result = Scalar::ONE;
    let my_coordinate = participant_coordinate(*my_point);
    for point in other_points {
        if point != my_point {
            let coordinate = participant_coordinate(*point);
            let numerator = Scalar::ZERO - coordinate;
            let inv = Option::<Scalar>::from((my_coordinate - coordinate).invert())
                .expect("participant coordinates are distinct");
            result *= numerator * inv;
        }
    }
    result
}

/// A polynomial evaluation `f(j)`: one party's share of a dealt secret.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub(crate) struct EvalPrivate {
    pub(crate) x: Scalar,
}

impl std::fmt::Debug for EvalPrivate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EvalPrivate([redacted])")
    }
}

impl EvalPrivate {
    pub(crate) fn public_point(&self) -> CurvePoint {
        CurvePoint::GENERATOR.multiply_by_scalar(&self.x)
    }

    pub(crate) fn to_bignumber(&self) -> BigNumber {
        scalar_to_bn(&self.x)
    }
}

/// A Paillier-encrypted [`EvalPrivate`], in transit to its recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EvalEncrypted {
    pub(crate) ciphertext: Ciphertext,
}

impl EvalEncrypted {
    pub(crate) fn encrypt<R: RngCore + CryptoRng>(
        share: &EvalPrivate,
        pk: &EncryptionKey,
        rng: &mut R,
    ) -> Result<(Self, crate::paillier::Nonce)> {
        if &(k256_order() * 2) >= pk.modulus() {
            error!("share encryption failed, pk.modulus() is too small");
            Err(InternalError::InternalInvariantFailed)?;
        }
        let (ciphertext, nonce) = pk.encrypt(rng, &share.to_bignumber())?;
        Ok((EvalEncrypted { ciphertext }, nonce))
    }

    /// Decrypt and range-check a received share.
    ///
    /// The plaintext must decrypt to exactly the dealt field element: a
    /// value whose reduction mod `q` would change it is rejected, since
    /// the dealer could otherwise ship a share that passes VSS while
    /// encoding something else.
    pub(crate) fn decrypt(&self, dk: &DecryptionKey) -> Result<EvalPrivate> {
        let x = dk.decrypt(&self.ciphertext)?;
        if x >= k256_order() || x < BigNumber::one() {
            error!("share decryption failed, plaintext out of the scalar field");
            return Err(InternalError::unattributed(Fault::DecryptionOverflow));
        }
        Ok(EvalPrivate { x: bn_to_scalar(&x)? })
    }
}

/// A party's long-term secret key share.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct KeySharePrivate {
    x: Scalar,
}

impl std::fmt::Debug for KeySharePrivate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeySharePrivate([redacted])")
    }
}

impl KeySharePrivate {
    pub(crate) fn new(x: Scalar) -> Self {
        Self { x }
    }

    pub(crate) fn as_scalar(&self) -> &Scalar {
        &self.x
    }

    /// The corresponding public share.
    pub(crate) fn public_share(&self) -> CurvePoint {
        CurvePoint::GENERATOR.multiply_by_scalar(&self.x)
    }
}

/// A party's public key share.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeySharePublic {
    participant: ParticipantIdentifier,
    X: CurvePoint,
}

impl KeySharePublic {
    pub(crate) fn new(participant: ParticipantIdentifier, X: CurvePoint) -> Self {
        Self { participant, X }
    }

    /// The party this share belongs to.
    pub fn participant(&self) -> ParticipantIdentifier {
        self.participant
    }
}

impl AsRef<CurvePoint> for KeySharePublic {
    fn as_ref(&self) -> &CurvePoint {
        &self.X
    }
}
