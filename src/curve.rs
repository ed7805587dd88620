// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Thin wrapper around the secp256k1 arithmetic used by the protocols.
//!
//! The elliptic curve itself is an external dependency with a fixed
//! contract; this module pins it to `k256` and exposes the handful of
//! operations the protocols need: base-point and variable-base
//! multiplication, point addition, canonical encoding, x-projection, and
//! conversions between [`BigNumber`] and the scalar field.

use crate::errors::{CallerError, InternalError, Result};
use k256::{
    ecdsa::{signature::DigestVerifier, VerifyingKey},
    elliptic_curve::{
        bigint::Encoding, group::GroupEncoding, point::AffineCoordinates, scalar::IsHigh,
        AffinePoint, Curve, Field, PrimeField,
    },
    EncodedPoint, FieldBytes, Scalar,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use tracing::error;
use zeroize::{Zeroize, Zeroizing};

/// The ECDSA signature type produced by the signing protocol.
pub type Signature = k256::ecdsa::Signature;

/// A point on the secp256k1 curve.
///
/// Note that this type derives [`Debug`]; if a [`CurvePoint`] appears in a
/// private type, `Debug` should be manually implemented with the field
/// redacted!
#[derive(Eq, PartialEq, Debug, Clone, Copy, Zeroize)]
pub struct CurvePoint(pub(crate) k256::ProjectivePoint);

impl CurvePoint {
    /// The base point.
    pub const GENERATOR: Self = CurvePoint(k256::ProjectivePoint::GENERATOR);

    /// The identity point, used to initialize sums of points.
    pub const IDENTITY: Self = CurvePoint(k256::ProjectivePoint::IDENTITY);

    /// Multiply `self` by a scalar.
    pub(crate) fn multiply_by_scalar(&self, scalar: &Scalar) -> Self {
        Self(self.0 * scalar)
    }

    /// Multiply `self` by a [`BigNumber`], which is first reduced into the
    /// scalar field.
    ///
    /// Note: the value is cloned during conversion; callers holding secret
    /// material should prefer [`multiply_by_scalar`](Self::multiply_by_scalar).
    pub(crate) fn multiply_by_bignum(&self, value: &BigNumber) -> Result<Self> {
        let scalar = Zeroizing::new(bn_to_scalar(value)?);
        Ok(self.multiply_by_scalar(&scalar))
    }

    /// The x-coordinate of the point, reduced into the scalar field.
    pub(crate) fn x_projection(&self) -> Result<Scalar> {
        if self == &Self::IDENTITY {
            error!("tried to take the x-projection of the identity point");
            return Err(InternalError::InternalInvariantFailed);
        }
        let x_bytes = self.0.to_affine().x();
        Ok(
            <Scalar as k256::elliptic_curve::ops::Reduce<k256::U256>>::reduce_bytes(&x_bytes),
        )
    }

    /// Serialize the point as a compressed affine-encoded byte array.
    pub(crate) fn to_bytes(self) -> Vec<u8> {
        let mut generic_array = AffinePoint::<k256::Secp256k1>::from(self.0).to_bytes();
        let bytes = generic_array.to_vec();
        generic_array.zeroize();
        bytes
    }

    /// Deserialize a point from a compressed affine-encoded byte array.
    pub(crate) fn try_from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut fixed_len_bytes: [u8; 33] = bytes.try_into().map_err(|_| {
            error!("failed to decode bytes as a curve point");
            InternalError::from(CallerError::DeserializationFailed)
        })?;

        let point: Option<AffinePoint<k256::Secp256k1>> =
            AffinePoint::<k256::Secp256k1>::from_bytes(&fixed_len_bytes.into()).into();
        fixed_len_bytes.zeroize();

        match point {
            Some(point) => Ok(Self(point.into())),
            None => {
                error!("bytes do not encode a point on the curve");
                Err(CallerError::DeserializationFailed)?
            }
        }
    }

    /// A random point, as `r·G` for uniform `r`. Testing only.
    #[cfg(test)]
    pub(crate) fn random(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        Self::GENERATOR.multiply_by_scalar(&random_scalar(rng))
    }
}

impl std::ops::Add for CurvePoint {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AsRef<CurvePoint> for CurvePoint {
    fn as_ref(&self) -> &CurvePoint {
        self
    }
}

impl From<CurvePoint> for EncodedPoint {
    fn from(value: CurvePoint) -> EncodedPoint {
        value.0.to_affine().into()
    }
}

impl Serialize for CurvePoint {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        AffinePoint::<k256::Secp256k1>::from(self.0).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CurvePoint {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let point = AffinePoint::<k256::Secp256k1>::deserialize(deserializer)?;
        Ok(Self(point.into()))
    }
}

/// The order of the secp256k1 scalar field.
pub(crate) fn k256_order() -> BigNumber {
    let order_bytes: [u8; 32] = k256::Secp256k1::ORDER.to_be_bytes();
    BigNumber::from_slice(order_bytes)
}

/// Reduce a [`BigNumber`] into the scalar field.
///
/// Negative values reduce the way integers mod `q` do, so `-1` maps to
/// `q - 1`.
pub(crate) fn bn_to_scalar(value: &BigNumber) -> Result<Scalar> {
    let reduced = value.nmod(&k256_order());
    let bytes = reduced.to_bytes();
    if bytes.len() > 32 {
        error!("a value reduced mod the curve order exceeded 32 bytes");
        return Err(InternalError::InternalInvariantFailed);
    }
    let mut padded = [0u8; 32];
    padded[32 - bytes.len()..].copy_from_slice(&bytes);
    let scalar: Option<Scalar> = Scalar::from_repr(FieldBytes::from(padded)).into();
    padded.zeroize();
    scalar.ok_or(InternalError::InternalInvariantFailed)
}

/// Convert a scalar to a nonnegative [`BigNumber`].
pub(crate) fn scalar_to_bn(scalar: &Scalar) -> BigNumber {
    BigNumber::from_slice(scalar.to_bytes())
}

/// Sample a uniformly random scalar.
pub(crate) fn random_scalar(rng: &mut (impl RngCore + CryptoRng)) -> Scalar {
    <Scalar as Field>::random(rng)
}

/// Whether a scalar is in the upper half of the field (non-canonical `s`).
pub(crate) fn is_high(scalar: &Scalar) -> bool {
    scalar.is_high().into()
}

/// Build an ECDSA verifying key from an aggregate public-key point.
pub(crate) fn verifying_key(public_key: &CurvePoint) -> Result<VerifyingKey> {
    VerifyingKey::from_affine(public_key.0.to_affine()).map_err(|_| {
        error!("aggregate public key is not a valid verifying key");
        InternalError::InternalInvariantFailed
    })
}

/// Verify a signature over a prepared SHA-256 digest.
pub(crate) fn verify_signature(
    public_key: &CurvePoint,
    digest: Sha256,
    signature: &Signature,
) -> Result<()> {
    verifying_key(public_key)?
        .verify_digest(digest, signature)
        .map_err(|_| InternalError::InternalInvariantFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::init_testing;

    #[test]
    fn bn_to_scalar_handles_negative_values() {
        let neg1 = BigNumber::zero() - BigNumber::one();
        let scalar = bn_to_scalar(&neg1).unwrap();
        assert_eq!(Scalar::ZERO, scalar + Scalar::ONE);
    }

    #[test]
    fn scalar_conversion_round_trips() {
        let mut rng = init_testing();
        for _ in 0..10 {
            let scalar = random_scalar(&mut rng);
            let round_tripped = bn_to_scalar(&scalar_to_bn(&scalar)).unwrap();
            assert_eq!(scalar, round_tripped);
        }
    }

    #[test]
    fn point_encoding_round_trips() {
        let mut rng = init_testing();
        let point = CurvePoint::random(&mut rng);
        let bytes = point.to_bytes();
        assert_eq!(bytes.len(), 33);
        assert_eq!(CurvePoint::try_from_bytes(&bytes).unwrap(), point);

        // The generator's canonical encoding matches k256's.
        let generator_bytes = CurvePoint::GENERATOR.to_bytes();
        assert_eq!(
            generator_bytes.as_slice(),
            k256::ProjectivePoint::GENERATOR.to_bytes().as_slice()
        );
    }

    #[test]
    fn x_projection_of_identity_fails() {
        assert!(CurvePoint::IDENTITY.x_projection().is_err());
    }

    #[test]
    fn order_matches_k256() {
        let q = k256_order();
        let point = CurvePoint::GENERATOR.multiply_by_bignum(&q).unwrap();
        assert_eq!(point, CurvePoint::IDENTITY);
        let point = CurvePoint::GENERATOR
            .multiply_by_bignum(&(q - BigNumber::one()))
            .unwrap();
        assert_ne!(point, CurvePoint::IDENTITY);
    }
}
