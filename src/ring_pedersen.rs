// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Ring-Pedersen commitments over `Z*_N`.
//!
//! Parameters `(N, s, t)` are generated by the owner of the Paillier
//! modulus: `t` is a random square and `s = t^λ` for a secret exponent λ.
//! After setup, `commit(x, r) = s^x · t^r mod N` is binding to anyone who
//! does not know λ; the `prm` proof convinces verifiers the parameters
//! were formed this way. Range proofs commit to their witnesses under the
//! *verifier's* parameters.

use crate::{
    errors::{CallerError, Result},
    paillier::DecryptionKey,
    utils::random_unit_mod,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::error;
use zeroize::ZeroizeOnDrop;

/// Public ring-Pedersen parameters `(N, s, t)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingPedersen {
    modulus: BigNumber,
    s: BigNumber,
    t: BigNumber,
}

/// A commitment `s^x · t^r mod N`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Commitment(BigNumber);

impl AsRef<BigNumber> for Commitment {
    fn as_ref(&self) -> &BigNumber {
        &self.0
    }
}

/// The setup trapdoor λ with `s = t^λ`; the witness of the `prm` proof.
#[derive(Debug, Clone, ZeroizeOnDrop)]
pub(crate) struct PedersenSecret {
    lambda: BigNumber,
}

impl PedersenSecret {
    pub(crate) fn lambda(&self) -> &BigNumber {
        &self.lambda
    }
}

impl RingPedersen {
    /// Generate parameters from a Paillier decryption key.
    ///
    /// Samples λ uniformly from `[0, φ(N))` and a random square `t`;
    /// exponentiations use the key's CRT context. Returns the scheme and
    /// the trapdoor.
    pub(crate) fn extract<R: RngCore + CryptoRng>(
        sk: &DecryptionKey,
        rng: &mut R,
    ) -> Result<(Self, PedersenSecret)> {
        let modulus = sk.modulus().clone();
        let lambda = BigNumber::from_rng(sk.phi(), rng);
        let tau = random_unit_mod(rng, &modulus)?;
        let t = sk.crt_n().exp(&tau, &BigNumber::from(2u64));
        let s = sk.crt_n().exp(&t, &lambda);
        Ok((Self { modulus, s, t }, PedersenSecret { lambda }))
    }

    /// Wrap parameters received from another party.
    ///
    /// Only syntactic checks happen here; the discrete-log relation
    /// between `s` and `t` is established by the `prm` proof.
    pub(crate) fn from_parts(modulus: &BigNumber, s: &BigNumber, t: &BigNumber) -> Result<Self> {
        for value in [s, t] {
            if value <= &BigNumber::one()
                || value >= modulus
                || value.gcd(modulus) != BigNumber::one()
            {
                error!("ring-Pedersen parameter is not a nontrivial unit mod N");
                Err(CallerError::BadInput)?;
            }
        }
        Ok(Self {
            modulus: modulus.clone(),
            s: s.clone(),
            t: t.clone(),
        })
    }

    /// The modulus `N`.
    pub(crate) fn modulus(&self) -> &BigNumber {
        &self.modulus
    }

    /// The commitment base `s`.
    pub(crate) fn s(&self) -> &BigNumber {
        &self.s
    }

    /// The randomization base `t`.
    pub(crate) fn t(&self) -> &BigNumber {
        &self.t
    }

    /// Compute `s^x · t^r mod N`. Exponents may be negative.
    pub(crate) fn commit(&self, x: &BigNumber, r: &BigNumber) -> Commitment {
        let s_to_x = self.s.modpow(x, &self.modulus);
        let t_to_r = self.t.modpow(r, &self.modulus);
        Commitment(s_to_x.modmul(&t_to_r, &self.modulus))
    }

    /// Recompute a commitment and compare.
    pub(crate) fn verify(&self, com: &Commitment, x: &BigNumber, r: &BigNumber) -> bool {
        &self.commit(x, r) == com
    }

    /// Evaluate `a^x · b^e mod N` for proof verification equations of the
    /// form `commitment-combination = candidate`.
    pub(crate) fn combine(&self, a: &BigNumber, b: &BigNumber, e: &BigNumber) -> BigNumber {
        a.modmul(&b.modpow(e, &self.modulus), &self.modulus)
    }

    /// Generate a scheme from a fresh Paillier key. Testing only.
    #[cfg(test)]
    pub(crate) fn gen<R: RngCore + CryptoRng>(rng: &mut R) -> Result<(Self, PedersenSecret)> {
        let (p, q) = crate::paillier::prime_gen::get_prime_pair_from_pool_insecure(rng)?;
        let sk = DecryptionKey::from_primes(&p, &q)?;
        Self::extract(&sk, rng)
    }
}
