// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Paillier encryption over safe-prime moduli, with CRT acceleration.
//!
//! A [`DecryptionKey`] is built from two independent 1024-bit safe Blum
//! primes, giving a 2048-bit modulus `N`. Plaintexts live in the symmetric
//! range `±(N-2)/2`; ciphertexts are elements of `Z*_{N²}`. Whenever the
//! factorization is known, exponentiation runs mod `p` and `q` separately
//! and is recombined with Garner's formula ([`CrtExp`]).

use crate::{
    errors::{CallerError, Fault, InternalError, Result},
    parameters::{MODULUS_BITS, PRIME_BITS},
    pool::Pool,
    utils::random_unit_mod,
};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A Paillier ciphertext: an element of `Z*_{N²}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext(BigNumber);

impl Ciphertext {
    /// Wrap a raw value as a ciphertext without validation. Testing only.
    #[cfg(test)]
    pub(crate) fn from_raw(value: BigNumber) -> Self {
        Self(value)
    }
}

/// The encryption randomness of a ciphertext: an element of `Z*_N`.
///
/// Knowledge of the nonce opens the ciphertext, so nonces are secret for
/// as long as their plaintext is.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct Nonce(BigNumber);

impl std::fmt::Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Nonce([redacted])")
    }
}

impl AsRef<BigNumber> for Nonce {
    fn as_ref(&self) -> &BigNumber {
        &self.0
    }
}

impl Nonce {
    /// Combine this nonce with another as `self · other^e mod N`.
    ///
    /// This is the nonce of the ciphertext `A · C^e` when `self` opens `A`
    /// and `other` opens `C`; proof responses are masked this way.
    pub(crate) fn mask(&self, other: &Nonce, e: &BigNumber, n: &BigNumber) -> Nonce {
        Nonce(self.0.modmul(&other.0.modpow(e, n), n))
    }
}

/// A public Paillier encryption key: the modulus `N` and cached `N²`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKey {
    n: BigNumber,
    n_squared: BigNumber,
}

impl EncryptionKey {
    /// Wrap a modulus received from another party.
    ///
    /// Only syntactic checks happen here (odd, expected size); the
    /// Paillier–Blum structure of the modulus is established by the `mod`
    /// proof during keygen.
    pub(crate) fn from_modulus(n: &BigNumber) -> Result<Self> {
        if n.bit_length() < MODULUS_BITS || n.nmod(&BigNumber::from(2u64)) == BigNumber::zero() {
            error!("modulus is even or too small to be a Paillier modulus");
            Err(CallerError::BadInput)?;
        }
        Ok(Self {
            n_squared: n * n,
            n: n.clone(),
        })
    }

    /// The modulus `N`.
    pub fn modulus(&self) -> &BigNumber {
        &self.n
    }

    /// Whether `x` lies in the plaintext range `±(N/2)`.
    pub(crate) fn is_in_plaintext_range(&self, x: &BigNumber) -> bool {
        let half = &self.n >> 1;
        x <= &half && x >= &-half
    }

    /// Check that a ciphertext is an element of `Z*_{N²}`.
    pub(crate) fn validate_ciphertext(&self, c: &Ciphertext) -> Result<()> {
        if c.0 <= BigNumber::zero()
            || c.0 >= self.n_squared
            || c.0.gcd(&self.n_squared) != BigNumber::one()
        {
            error!("ciphertext is not a unit mod N²");
            return Err(InternalError::unattributed(Fault::InvalidCiphertext));
        }
        Ok(())
    }

    /// Sample encryption randomness.
    pub(crate) fn random_nonce<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<Nonce> {
        Ok(Nonce(random_unit_mod(rng, &self.n)?))
    }

    /// Encrypt `x ∈ ±(N/2)` with a fresh nonce.
    pub(crate) fn encrypt<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        x: &BigNumber,
    ) -> Result<(Ciphertext, Nonce)> {
        let nonce = self.random_nonce(rng)?;
        let ciphertext = self.encrypt_with_nonce(x, &nonce)?;
        Ok((ciphertext, nonce))
    }

    /// Encrypt `x ∈ ±(N/2)` with a caller-provided nonce.
    pub(crate) fn encrypt_with_nonce(&self, x: &BigNumber, nonce: &Nonce) -> Result<Ciphertext> {
        if !self.is_in_plaintext_range(x) {
            error!("tried to encrypt a value outside ±(N/2)");
            Err(CallerError::BadInput)?;
        }
        // (1 + N)^m = 1 + mN (mod N²), so one multiplication replaces the
        // first exponentiation.
        let m = x.nmod(&self.n);
        let one_plus_mn = (BigNumber::one() + m * &self.n).nmod(&self.n_squared);
        let r_to_n = nonce.0.modpow(&self.n, &self.n_squared);
        Ok(Ciphertext(one_plus_mn.modmul(&r_to_n, &self.n_squared)))
    }

    /// Homomorphically evaluate `c₁^a · c₂ mod N²`, which encrypts
    /// `a·m₁ + m₂`.
    pub(crate) fn multiply_and_add(
        &self,
        a: &BigNumber,
        c1: &Ciphertext,
        c2: &Ciphertext,
    ) -> Result<Ciphertext> {
        self.validate_ciphertext(c1)?;
        self.validate_ciphertext(c2)?;
        let scaled = c1.0.modpow(a, &self.n_squared);
        Ok(Ciphertext(scaled.modmul(&c2.0, &self.n_squared)))
    }

}

/// Precomputed context for exponentiation modulo `p^k · q^k` by CRT.
///
/// Exponents are reduced modulo the group orders `φ(p^k)`, `φ(q^k)`, which
/// is sound for unit bases — every base this crate exponentiates is
/// validated to be a unit first. Negative exponents reduce to positive
/// ones the same way.
#[derive(Debug, Clone, PartialEq, Eq, Zeroize)]
pub(crate) struct CrtExp {
    p_pow: BigNumber,
    q_pow: BigNumber,
    /// (q^k)⁻¹ mod p^k, Garner's coefficient.
    q_pow_inv: BigNumber,
    phi_p: BigNumber,
    phi_q: BigNumber,
    modulus: BigNumber,
}

impl CrtExp {
    /// Build a context for `Z_N`, `N = p·q`.
    pub(crate) fn for_modulus(p: &BigNumber, q: &BigNumber) -> Result<Self> {
        let q_pow_inv = q
            .invert(p)
            .ok_or(InternalError::InternalInvariantFailed)?;
        Ok(Self {
            p_pow: p.clone(),
            q_pow: q.clone(),
            q_pow_inv,
            phi_p: p - BigNumber::one(),
            phi_q: q - BigNumber::one(),
            modulus: p * q,
        })
    }

    /// Build a context for `Z_{N²}`, `N = p·q`.
    pub(crate) fn for_modulus_squared(p: &BigNumber, q: &BigNumber) -> Result<Self> {
        let p_squared = p * p;
        let q_squared = q * q;
        let q_pow_inv = q_squared
            .invert(&p_squared)
            .ok_or(InternalError::InternalInvariantFailed)?;
        Ok(Self {
            q_pow_inv,
            phi_p: p * (p - BigNumber::one()),
            phi_q: q * (q - BigNumber::one()),
            modulus: &p_squared * &q_squared,
            p_pow: p_squared,
            q_pow: q_squared,
        })
    }

    /// Compute `base^e mod p^k·q^k` for a unit `base`.
    pub(crate) fn exp(&self, base: &BigNumber, e: &BigNumber) -> BigNumber {
        let e_p = e.nmod(&self.phi_p);
        let e_q = e.nmod(&self.phi_q);
        let x_p = base.nmod(&self.p_pow).modpow(&e_p, &self.p_pow);
        let x_q = base.nmod(&self.q_pow).modpow(&e_q, &self.q_pow);
        self.combine(&x_p, &x_q)
    }

    /// Garner recomposition of residues mod `p^k` and `q^k`.
    pub(crate) fn combine(&self, x_p: &BigNumber, x_q: &BigNumber) -> BigNumber {
        let h = (x_p - x_q).modmul(&self.q_pow_inv, &self.p_pow);
        (x_q + &self.q_pow * h).nmod(&self.modulus)
    }
}

/// A Paillier decryption key: the factorization of `N` plus cached
/// quantities for CRT arithmetic.
#[derive(Clone, ZeroizeOnDrop)]
pub struct DecryptionKey {
    p: BigNumber,
    q: BigNumber,
    /// φ = (p-1)(q-1)
    phi: BigNumber,
    /// φ⁻¹ mod N
    phi_inv: BigNumber,
    #[zeroize(skip)]
    pk: EncryptionKey,
    crt_n: CrtExp,
    crt_n_squared: CrtExp,
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("pk", &self.pk)
            .field("...", &"[redacted]")
            .finish()
    }
}

impl DecryptionKey {
    /// Generate a fresh key from two independent safe Blum primes.
    ///
    /// The prime search runs on the worker pool. Also returns the primes
    /// for storage in the key share.
    #[instrument(skip_all)]
    pub fn new<R: RngCore + CryptoRng>(
        rng: &mut R,
        pool: &Pool,
    ) -> Result<(Self, BigNumber, BigNumber)> {
        // Unit and protocol tests draw from the cached prime pool; a real
        // 1024-bit safe-prime search per party makes the protocol suites
        // unrunnable under test profiles.
        #[cfg(test)]
        let (p, q) = {
            let _ = pool;
            prime_gen::get_prime_pair_from_pool_insecure(rng)?
        };
        #[cfg(not(test))]
        let (p, q) = prime_gen::get_prime_pair(rng, pool)?;
        let dk = Self::from_primes(&p, &q)?;
        Ok((dk, p, q))
    }

    /// Reconstruct a key from stored primes, validating them.
    pub fn from_primes(p: &BigNumber, q: &BigNumber) -> Result<Self> {
        // The factors and every derived quantity live in GMP limb
        // buffers; make sure those are wiped on release.
        crate::gmp_zeroize::ensure_enabled();
        prime_gen::validate_prime(p)?;
        prime_gen::validate_prime(q)?;
        if p == q {
            error!("the two prime factors must be distinct");
            Err(CallerError::BadInput)?;
        }
        let n = p * q;
        let phi = (p - BigNumber::one()) * (q - BigNumber::one());
        let phi_inv = phi.invert(&n).ok_or_else(|| {
            error!("φ is not invertible mod N; the factors are not distinct primes");
            InternalError::InternalInvariantFailed
        })?;
        Ok(Self {
            phi,
            phi_inv,
            pk: EncryptionKey {
                n_squared: &n * &n,
                n,
            },
            crt_n: CrtExp::for_modulus(p, q)?,
            crt_n_squared: CrtExp::for_modulus_squared(p, q)?,
            p: p.clone(),
            q: q.clone(),
        })
    }

    /// The corresponding encryption key.
    pub fn encryption_key(&self) -> EncryptionKey {
        self.pk.clone()
    }

    /// The modulus `N`.
    pub fn modulus(&self) -> &BigNumber {
        &self.pk.n
    }

    /// The totient φ(N) = (p-1)(q-1).
    pub(crate) fn phi(&self) -> &BigNumber {
        &self.phi
    }

    /// The prime factors of `N`.
    pub(crate) fn primes(&self) -> (&BigNumber, &BigNumber) {
        (&self.p, &self.q)
    }

    /// The CRT context for `Z_N`.
    pub(crate) fn crt_n(&self) -> &CrtExp {
        &self.crt_n
    }

    /// Encrypt under our own key, using CRT for the nonce power.
    pub(crate) fn encrypt<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        x: &BigNumber,
    ) -> Result<(Ciphertext, Nonce)> {
        if !self.pk.is_in_plaintext_range(x) {
            error!("tried to encrypt a value outside ±(N/2)");
            Err(CallerError::BadInput)?;
        }
        let nonce = self.pk.random_nonce(rng)?;
        let m = x.nmod(&self.pk.n);
        let one_plus_mn = (BigNumber::one() + m * &self.pk.n).nmod(&self.pk.n_squared);
        let r_to_n = self.crt_n_squared.exp(nonce.as_ref(), &self.pk.n);
        let ciphertext = Ciphertext(one_plus_mn.modmul(&r_to_n, &self.pk.n_squared));
        Ok((ciphertext, nonce))
    }

    /// Decrypt a ciphertext, returning the plaintext in the symmetric
    /// range `±(N-2)/2`.
    ///
    /// Fails with [`Fault::InvalidCiphertext`] if the ciphertext is not a
    /// unit mod `N²`.
    pub fn decrypt(&self, ct: &Ciphertext) -> Result<BigNumber> {
        self.pk.validate_ciphertext(ct)?;
        let n = &self.pk.n;

        // m = [(c^φ mod N² - 1) / N] · φ⁻¹ mod N
        let c_phi = self.crt_n_squared.exp(&ct.0, &self.phi);
        let m = ((c_phi - BigNumber::one()) / n).modmul(&self.phi_inv, n);

        // Recenter into the symmetric range.
        let half = n >> 1;
        if m > half {
            Ok(m - n)
        } else {
            Ok(m)
        }
    }
}

/// Safe-prime generation and validation.
pub(crate) mod prime_gen {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use rayon::prelude::*;

    /// Check whether `p` is a suitable prime factor for a Paillier
    /// modulus:
    /// - exactly [`PRIME_BITS`] bits long,
    /// - `p ≡ 3 (mod 4)`,
    /// - `(p-1)/2` probably prime.
    pub(crate) fn validate_prime(p: &BigNumber) -> Result<()> {
        // This leaks the bit length, which the error would assert
        // statically anyway.
        if p.bit_length() != PRIME_BITS {
            error!(
                "invalid prime size: have {}, need {}",
                p.bit_length(),
                PRIME_BITS
            );
            return Err(InternalError::unattributed(Fault::PrimeBadLength));
        }
        if p.nmod(&BigNumber::from(4u64)) != BigNumber::from(3u64) {
            return Err(InternalError::unattributed(Fault::NotBlum));
        }
        let p_minus_1_div_2: BigNumber = (p - BigNumber::one()) >> 1;
        if !p_minus_1_div_2.is_prime() {
            return Err(InternalError::unattributed(Fault::NotSafePrime));
        }
        Ok(())
    }

    /// Whether the prime's top two bits are set, which guarantees the
    /// product of two such primes has exactly [`MODULUS_BITS`] bits.
    fn has_full_size(p: &BigNumber) -> bool {
        let threshold =
            (BigNumber::one() << (PRIME_BITS - 1)) + (BigNumber::one() << (PRIME_BITS - 2));
        p >= &threshold
    }

    /// Search for one safe Blum prime with the top two bits set, racing
    /// independent searches on the worker pool.
    pub(crate) fn get_random_safe_prime<R: RngCore + CryptoRng>(
        rng: &mut R,
        pool: &Pool,
    ) -> Result<BigNumber> {
        // Rejected candidates are secrets too; wipe their limbs.
        crate::gmp_zeroize::ensure_enabled();

        // Workers must not share the caller's rng; derive an independent
        // stream per search from one base seed.
        let base_seed: [u8; 32] = rng.gen();
        let prime = pool.install(move || {
            (0..u64::MAX).into_par_iter().find_map_any(|index| {
                let mut seed = base_seed;
                for (seed_byte, index_byte) in seed.iter_mut().zip(index.to_le_bytes()) {
                    *seed_byte ^= index_byte;
                }
                let mut search_rng = StdRng::from_seed(seed);
                let p = BigNumber::safe_prime_from_rng(PRIME_BITS, &mut search_rng);
                (has_full_size(&p) && validate_prime(&p).is_ok()).then_some(p)
            })
        });
        prime.ok_or_else(|| {
            error!("all parallel safe-prime searches failed");
            InternalError::InternalInvariantFailed
        })
    }

    /// Retry cap for the distinct-factor draw. Colliding 1024-bit safe
    /// primes means the rng is broken, not that persistence will help.
    const DISTINCT_FACTOR_RETRIES: usize = 4;

    /// Sample a pair of distinct safe Blum primes.
    pub(crate) fn get_prime_pair<R: RngCore + CryptoRng>(
        rng: &mut R,
        pool: &Pool,
    ) -> Result<(BigNumber, BigNumber)> {
        let p = get_random_safe_prime(rng, pool)?;
        for _ in 0..DISTINCT_FACTOR_RETRIES {
            let q = get_random_safe_prime(rng, pool)?;
            if p != q {
                return Ok((p, q));
            }
        }
        Err(CallerError::RetryFailed)?
    }

    /// Draw a pair of distinct safe primes from a small cached pool.
    ///
    /// The pool is generated once per process and primes are reused across
    /// calls, so the resulting keys are **insecure**. Testing only.
    #[cfg(test)]
    pub(crate) fn get_prime_pair_from_pool_insecure<R: RngCore + CryptoRng>(
        rng: &mut R,
    ) -> Result<(BigNumber, BigNumber)> {
        use std::sync::OnceLock;
        static POOL: OnceLock<Vec<BigNumber>> = OnceLock::new();
        const POOL_SIZE: usize = 6;

        let pool = POOL.get_or_init(|| {
            eprintln!("Generating the test pool of {POOL_SIZE} safe primes; this happens once.");
            let workers = Pool::default();
            let mut seeder = rand::rngs::OsRng;
            (0..POOL_SIZE)
                .map(|_| {
                    get_random_safe_prime(&mut seeder, &workers)
                        .expect("safe-prime search cannot fail")
                })
                .collect()
        });

        let i = rng.gen_range(0..pool.len());
        let j = (i + 1 + rng.gen_range(0..pool.len() - 1)) % pool.len();
        Ok((pool[i].clone(), pool[j].clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{random_unit_mod, sample_prover_mask, testing::init_testing};

    fn test_key() -> (rand::rngs::StdRng, DecryptionKey) {
        let mut rng = init_testing();
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let dk = DecryptionKey::from_primes(&p, &q).unwrap();
        (rng, dk)
    }

    #[test]
    fn encryption_round_trips_on_symmetric_range() {
        let (mut rng, dk) = test_key();
        let pk = dk.encryption_key();
        let half = pk.modulus() >> 1;

        // Draws over the full symmetric plaintext range.
        let sample_plaintext = |rng: &mut rand::rngs::StdRng| {
            BigNumber::from_rng(&(&half + &half + 1), rng) - &half
        };

        for _ in 0..10 {
            let m = sample_plaintext(&mut rng);
            let (ct, _) = pk.encrypt(&mut rng, &m).unwrap();
            assert_eq!(dk.decrypt(&ct).unwrap(), m);
        }

        // CRT-accelerated own-key encryption agrees.
        let m = sample_plaintext(&mut rng);
        let (ct, _) = dk.encrypt(&mut rng, &m).unwrap();
        assert_eq!(dk.decrypt(&ct).unwrap(), m);
    }

    #[test]
    fn encryption_with_nonce_is_deterministic() {
        let (mut rng, dk) = test_key();
        let pk = dk.encryption_key();
        let m = BigNumber::from(117u64);
        let nonce = pk.random_nonce(&mut rng).unwrap();
        let c1 = pk.encrypt_with_nonce(&m, &nonce).unwrap();
        let c2 = pk.encrypt_with_nonce(&m, &nonce).unwrap();
        assert_eq!(c1, c2);

        let (c3, used) = dk.encrypt(&mut rng, &m).unwrap();
        assert_eq!(pk.encrypt_with_nonce(&m, &used).unwrap(), c3);
    }

    #[test]
    fn out_of_range_plaintexts_are_rejected() {
        let (mut rng, dk) = test_key();
        let pk = dk.encryption_key();
        let too_big = (pk.modulus() >> 1) + 1;
        assert!(pk.encrypt(&mut rng, &too_big).is_err());
        assert!(pk.encrypt(&mut rng, &-too_big).is_err());
    }

    #[test]
    fn invalid_ciphertexts_fail_decryption() {
        let (_rng, dk) = test_key();
        let n_squared = dk.modulus() * dk.modulus();

        for bad in [
            BigNumber::zero(),
            n_squared.clone(),
            // A multiple of p shares a factor with N².
            dk.p.clone() * BigNumber::from(3u64),
        ] {
            let err = dk.decrypt(&Ciphertext::from_raw(bad)).unwrap_err();
            match err {
                InternalError::ProtocolError(violation) => {
                    assert_eq!(violation.fault(), Fault::InvalidCiphertext)
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn homomorphisms_hold() {
        let (mut rng, dk) = test_key();
        let pk = dk.encryption_key();

        let m1 = BigNumber::from(1234u64);
        let m2 = BigNumber::from(5678u64);
        let a = BigNumber::from(99u64);
        let (c1, _) = pk.encrypt(&mut rng, &m1).unwrap();
        let (c2, _) = pk.encrypt(&mut rng, &m2).unwrap();

        // a·m₁ + m₂, the affine evaluation the MtA step relies on.
        let evaluated = pk.multiply_and_add(&a, &c1, &c2).unwrap();
        assert_eq!(dk.decrypt(&evaluated).unwrap(), &a * &m1 + &m2);

        // a = 1 degenerates to plain ciphertext addition.
        let sum = pk.multiply_and_add(&BigNumber::one(), &c1, &c2).unwrap();
        assert_eq!(dk.decrypt(&sum).unwrap(), &m1 + &m2);

        // Negative multipliers land in the symmetric range.
        let negated = pk.multiply_and_add(&-a.clone(), &c1, &c2).unwrap();
        assert_eq!(dk.decrypt(&negated).unwrap(), &m2 - &a * &m1);
    }

    #[test]
    fn crt_exponentiation_matches_modpow() {
        let (mut rng, dk) = test_key();
        let n = dk.modulus().clone();
        let base = random_unit_mod(&mut rng, &n).unwrap();
        let exponent = sample_prover_mask(&mut rng);

        let expected = base.modpow(&exponent.nmod(dk.phi()), &n);
        assert_eq!(dk.crt_n().exp(&base, &exponent), expected);
    }

    #[test]
    fn pool_primes_validate() {
        let mut rng = init_testing();
        let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        assert!(prime_gen::validate_prime(&p).is_ok());
        assert!(prime_gen::validate_prime(&q).is_ok());
        assert_ne!(p, q);

        let n = &p * &q;
        assert_eq!(n.bit_length(), MODULUS_BITS);
    }

    #[test]
    fn validate_prime_rejects_bad_candidates() {
        // Wrong length.
        let short = BigNumber::from(11u64);
        assert_eq!(
            prime_gen::validate_prime(&short)
                .unwrap_err()
                .violation()
                .unwrap()
                .fault(),
            Fault::PrimeBadLength
        );

        // Right length, not ≡ 3 mod 4: flip the low bits of a pool prime.
        let mut rng = init_testing();
        let (p, _) = prime_gen::get_prime_pair_from_pool_insecure(&mut rng).unwrap();
        let not_blum = &p - BigNumber::from(2u64);
        assert_eq!(
            prime_gen::validate_prime(&not_blum)
                .unwrap_err()
                .violation()
                .unwrap()
                .fault(),
            Fault::NotBlum
        );

        // Right length and Blum, but (p-1)/2 composite. p + 4 keeps
        // p ≡ 3 mod 4; finding a safe prime 4 away is astronomically
        // unlikely, but check to keep the test honest.
        let mut candidate = &p + BigNumber::from(4u64);
        while prime_gen::validate_prime(&candidate).is_ok() {
            candidate = &candidate + BigNumber::from(4u64);
        }
        let err = prime_gen::validate_prime(&candidate).unwrap_err();
        assert!(matches!(
            err.violation().unwrap().fault(),
            Fault::NotBlum | Fault::NotSafePrime
        ));
    }
}
