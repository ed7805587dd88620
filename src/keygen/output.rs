// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! The persistent output of keygen: the [`Config`].

use crate::{
    curve::{bn_to_scalar, CurvePoint},
    errors::{CallerError, Result},
    keygen::keyshare::{lagrange_coefficient_at_zero, KeySharePrivate},
    paillier::{DecryptionKey, EncryptionKey},
    protocol::ParticipantIdentifier,
    ring_pedersen::RingPedersen,
};
use k256::ecdsa::VerifyingKey;
use libpaillier::unknown_order::BigNumber;
use tracing::error;
use zeroize::{Zeroize, Zeroizing};

/// One party's public material in a [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicMaterial {
    participant: ParticipantIdentifier,
    ecdsa: CurvePoint,
    paillier: EncryptionKey,
    pedersen: RingPedersen,
}

impl PublicMaterial {
    pub(crate) fn new(
        participant: ParticipantIdentifier,
        ecdsa: CurvePoint,
        paillier: EncryptionKey,
        pedersen: RingPedersen,
    ) -> Self {
        Self {
            participant,
            ecdsa,
            paillier,
            pedersen,
        }
    }

    /// The party this material belongs to.
    pub fn participant(&self) -> ParticipantIdentifier {
        self.participant
    }

    /// The party's public ECDSA key share `X = F(j)`.
    pub(crate) fn ecdsa(&self) -> &CurvePoint {
        &self.ecdsa
    }

    /// The party's Paillier encryption key.
    pub(crate) fn paillier(&self) -> &EncryptionKey {
        &self.paillier
    }

    /// The party's ring-Pedersen parameters.
    pub(crate) fn pedersen(&self) -> &RingPedersen {
        &self.pedersen
    }
}

/// One party's secret material in a [`Config`].
#[derive(Clone)]
pub(crate) struct SecretMaterial {
    id: ParticipantIdentifier,
    ecdsa: KeySharePrivate,
    paillier: DecryptionKey,
}

impl std::fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretMaterial")
            .field("id", &self.id)
            .field("...", &"[redacted]")
            .finish()
    }
}

/// The long-term artifact of a keygen or refresh session.
///
/// Holds the committee description — every party's ECDSA public share,
/// Paillier modulus and ring-Pedersen parameters — along with this
/// party's secret share and Paillier factors, the agreed session
/// randomizer `rid`, and the chain key.
///
/// # 🔒 Storage requirements
/// The secret portion requires secure persistent storage; use
/// [`into_bytes`](Self::into_bytes) and treat the result like a private
/// key.
#[derive(Debug, Clone)]
pub struct Config {
    threshold: usize,
    /// Sorted by participant id.
    public: Vec<PublicMaterial>,
    rid: [u8; 32],
    chain_key: [u8; 32],
    secret: SecretMaterial,
}

const CONFIG_TAG: &[u8] = b"CMP Threshold Config";

impl Config {
    pub(crate) fn from_parts(
        threshold: usize,
        mut public: Vec<PublicMaterial>,
        rid: [u8; 32],
        chain_key: [u8; 32],
        id: ParticipantIdentifier,
        ecdsa_share: KeySharePrivate,
        paillier: DecryptionKey,
    ) -> Result<Self> {
        public.sort_by_key(|material| material.participant());
        let config = Self {
            threshold,
            public,
            rid,
            chain_key,
            secret: SecretMaterial {
                id,
                ecdsa: ecdsa_share,
                paillier,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Consistency checks over the assembled config.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.threshold < 1 || self.threshold >= self.public.len() {
            error!("config threshold is out of range");
            Err(CallerError::BadInput)?;
        }
        let mut pids: Vec<_> = self.public.iter().map(|m| m.participant()).collect();
        pids.dedup();
        if pids.len() != self.public.len() {
            error!("config contains duplicate participants");
            Err(CallerError::BadInput)?;
        }

        let own = self.public_material(self.secret.id)?;
        if own.ecdsa() != &self.secret.ecdsa.public_share() {
            error!("own public share does not match the secret share");
            Err(CallerError::BadInput)?;
        }
        if own.paillier().modulus() != self.secret.paillier.modulus() {
            error!("own Paillier modulus does not match the decryption key");
            Err(CallerError::BadInput)?;
        }
        for material in &self.public {
            if material.pedersen().modulus() != material.paillier().modulus() {
                error!("ring-Pedersen modulus differs from the Paillier modulus");
                Err(CallerError::BadInput)?;
            }
        }
        Ok(())
    }

    /// This party's identifier.
    pub fn id(&self) -> ParticipantIdentifier {
        self.secret.id
    }

    /// The signing threshold: any `threshold() + 1` parties can sign.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// The committee, sorted.
    pub fn participants(&self) -> Vec<ParticipantIdentifier> {
        self.public.iter().map(|m| m.participant()).collect()
    }

    /// The agreed session randomizer.
    pub fn rid(&self) -> &[u8; 32] {
        &self.rid
    }

    /// The agreed chain key.
    pub fn chain_key(&self) -> &[u8; 32] {
        &self.chain_key
    }

    /// The public material of one party.
    pub(crate) fn public_material(
        &self,
        pid: ParticipantIdentifier,
    ) -> Result<&PublicMaterial> {
        self.public
            .iter()
            .find(|material| material.participant() == pid)
            .ok_or_else(|| {
                error!("no public material for {pid}");
                CallerError::BadInput.into()
            })
    }

    /// All public material, sorted by participant.
    pub(crate) fn all_public_material(&self) -> &[PublicMaterial] {
        &self.public
    }

    pub(crate) fn secret_share(&self) -> &KeySharePrivate {
        &self.secret.ecdsa
    }

    pub(crate) fn decryption_key(&self) -> &DecryptionKey {
        &self.secret.paillier
    }

    /// The aggregate public key, reconstructed by Lagrange interpolation
    /// of the public shares at zero.
    pub fn public_key_point(&self) -> CurvePoint {
        let pids = self.participants();
        self.public.iter().fold(CurvePoint::IDENTITY, |sum, material| {
            let lagrange = lagrange_coefficient_at_zero(&material.participant(), &pids);
            sum + material.ecdsa().multiply_by_scalar(&lagrange)
        })
    }

    /// The aggregate public key as an ECDSA verifying key.
    pub fn public_key(&self) -> Result<VerifyingKey> {
        crate::curve::verifying_key(&self.public_key_point())
    }

    /// Whether `signers` is a valid signing subset: exactly
    /// `threshold + 1` distinct committee members.
    pub fn can_sign(&self, signers: &[ParticipantIdentifier]) -> bool {
        let mut sorted = signers.to_vec();
        sorted.sort();
        sorted.dedup();
        let committee = self.participants();
        sorted.len() == signers.len()
            && signers.len() == self.threshold + 1
            && sorted.iter().all(|pid| committee.contains(pid))
    }

    /// A digest of the public portion of the config, bound into the
    /// round 4 Schnorr transcript so the proof commits every party to the
    /// same assembled view.
    pub(crate) fn transcript_digest(&self) -> [u8; 32] {
        let mut transcript = merlin::Transcript::new(b"config digest");
        transcript.append_message(b"threshold", &self.threshold.to_le_bytes());
        transcript.append_message(b"rid", &self.rid);
        transcript.append_message(b"chain key", &self.chain_key);
        for material in &self.public {
            transcript.append_message(b"pid", &material.participant().as_u128().to_le_bytes());
            transcript.append_message(b"X", &material.ecdsa().to_bytes());
            transcript.append_message(b"N", &material.paillier().modulus().to_bytes());
            transcript.append_message(b"s", &material.pedersen().s().to_bytes());
            transcript.append_message(b"t", &material.pedersen().t().to_bytes());
        }
        let mut digest = [0u8; 32];
        transcript.challenge_bytes(b"digest", &mut digest);
        digest
    }

    /// Serialize the config, secret material included.
    ///
    /// 🔒 Handle the output like a private key.
    pub fn into_bytes(self) -> Vec<u8> {
        // Format:
        // CONFIG_TAG
        // threshold (8 bytes LE) | party count (8 bytes LE)
        // rid (32 bytes) | chain key (32 bytes)
        // per party, sorted by id:
        //   id (16 bytes LE) | X (33 bytes)
        //   N length (8 bytes LE) | N | s length | s | t length | t
        // secret:
        //   id (16 bytes LE) | share (32 bytes)
        //   p length (8 bytes LE) | p | q length | q
        let mut bytes = CONFIG_TAG.to_vec();
        bytes.extend(self.threshold.to_le_bytes());
        bytes.extend(self.public.len().to_le_bytes());
        bytes.extend(self.rid);
        bytes.extend(self.chain_key);
        for material in &self.public {
            bytes.extend(material.participant().as_u128().to_le_bytes());
            bytes.extend(material.ecdsa().to_bytes());
            for value in [
                material.paillier().modulus(),
                material.pedersen().s(),
                material.pedersen().t(),
            ] {
                let value_bytes = value.to_bytes();
                bytes.extend(value_bytes.len().to_le_bytes());
                bytes.extend(value_bytes);
            }
        }

        bytes.extend(self.secret.id.as_u128().to_le_bytes());
        let mut share_bytes = self.secret.ecdsa.as_scalar().to_bytes();
        bytes.extend(share_bytes.as_slice());
        share_bytes.zeroize();
        let (p, q) = self.secret.paillier.primes();
        for value in [p, q] {
            let mut value_bytes = value.to_bytes();
            bytes.extend(value_bytes.len().to_le_bytes());
            bytes.extend(value_bytes.iter());
            value_bytes.zeroize();
        }
        bytes
    }

    /// Deserialize a config produced by [`into_bytes`](Self::into_bytes).
    ///
    /// 🔒 Do not use this to build arbitrary configs; it revalidates the
    /// structural invariants but cannot re-run keygen's proofs.
    pub fn try_from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let mut reader = ConfigReader::new(bytes);

        if reader.chunk(CONFIG_TAG.len())? != CONFIG_TAG {
            error!("config blob does not start with the expected tag");
            Err(CallerError::DeserializationFailed)?;
        }
        let threshold = reader.count()?;
        let count = reader.count()?;
        // A forged count would otherwise drive the preallocation below.
        if count < 2 || count > MAX_COMMITTEE {
            error!("config blob claims an implausible committee size");
            Err(CallerError::DeserializationFailed)?;
        }
        let mut rid = [0u8; 32];
        rid.copy_from_slice(reader.chunk(32)?);
        let mut chain_key = [0u8; 32];
        chain_key.copy_from_slice(reader.chunk(32)?);

        let mut public = Vec::with_capacity(count);
        for _ in 0..count {
            let pid = reader.participant()?;
            let ecdsa = CurvePoint::try_from_bytes(reader.chunk(33)?)?;
            let n = reader.integer()?;
            let s = reader.integer()?;
            let t = reader.integer()?;
            public.push(PublicMaterial::new(
                pid,
                ecdsa,
                EncryptionKey::from_modulus(&n)?,
                RingPedersen::from_parts(&n, &s, &t)?,
            ));
        }

        let id = reader.participant()?;
        let share = bn_to_scalar(&BigNumber::from_slice(reader.chunk(32)?))?;
        let p = reader.integer()?;
        let q = reader.integer()?;
        reader.finish()?;

        Config::from_parts(
            threshold,
            public,
            rid,
            chain_key,
            id,
            KeySharePrivate::new(share),
            DecryptionKey::from_primes(&p, &q)?,
        )
    }
}

/// Committee sizes past this are a corrupt blob, not a real deployment.
const MAX_COMMITTEE: usize = 1024;

/// A consuming reader over a serialized [`Config`].
///
/// The backing buffer holds the secret share and prime factors, so it is
/// kept in [`Zeroizing`] storage and wiped when the reader drops — on
/// success and on every early-return parse failure alike.
struct ConfigReader {
    bytes: Zeroizing<Vec<u8>>,
    at: usize,
}

impl ConfigReader {
    fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
            at: 0,
        }
    }

    /// The next `n` bytes, advancing the reader.
    fn chunk(&mut self, n: usize) -> Result<&[u8]> {
        let end = self
            .at
            .checked_add(n)
            .ok_or(CallerError::DeserializationFailed)?;
        let chunk = self
            .bytes
            .get(self.at..end)
            .ok_or(CallerError::DeserializationFailed)?;
        self.at = end;
        Ok(chunk)
    }

    /// An 8-byte little-endian count.
    fn count(&mut self) -> Result<usize> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.chunk(8)?);
        Ok(usize::from_le_bytes(raw))
    }

    /// A 16-byte little-endian participant identifier.
    fn participant(&mut self) -> Result<ParticipantIdentifier> {
        let mut raw = [0u8; 16];
        raw.copy_from_slice(self.chunk(16)?);
        Ok(ParticipantIdentifier::from_u128(u128::from_le_bytes(raw)))
    }

    /// A length-prefixed big integer.
    fn integer(&mut self) -> Result<BigNumber> {
        let len = self.count()?;
        Ok(BigNumber::from_slice(self.chunk(len)?))
    }

    /// Finish parsing; trailing bytes mean a corrupt or foreign blob.
    fn finish(self) -> Result<()> {
        if self.at != self.bytes.len() {
            error!(
                "config blob has {} trailing bytes",
                self.bytes.len() - self.at
            );
            Err(CallerError::DeserializationFailed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::{
        keygen::keyshare::{eval_private_share, sample_polynomial},
        paillier::prime_gen,
        ring_pedersen::RingPedersen,
    };
    use k256::Scalar;
    use rand::{CryptoRng, RngCore};

    /// Simulate the output of an honest keygen run: a set of consistent
    /// configs sharing one aggregate key. Testing only.
    pub(crate) fn simulate_quorum<R: RngCore + CryptoRng>(
        pids: &[ParticipantIdentifier],
        threshold: usize,
        rng: &mut R,
    ) -> (Scalar, Vec<Config>) {
        let coeffs = sample_polynomial(threshold, None, rng);
        let secret_key = coeffs[0].x;

        let keys: Vec<_> = pids
            .iter()
            .map(|_| {
                let (p, q) = prime_gen::get_prime_pair_from_pool_insecure(rng).unwrap();
                DecryptionKey::from_primes(&p, &q).unwrap()
            })
            .collect();

        let public: Vec<_> = pids
            .iter()
            .zip(&keys)
            .map(|(pid, dk)| {
                let share = eval_private_share(&coeffs, *pid);
                let (setup, _) = RingPedersen::extract(dk, rng).unwrap();
                PublicMaterial::new(*pid, share.public_point(), dk.encryption_key(), setup)
            })
            .collect();

        let mut rid = [0u8; 32];
        let mut chain_key = [0u8; 32];
        rng.fill_bytes(&mut rid);
        rng.fill_bytes(&mut chain_key);

        let configs = pids
            .iter()
            .zip(keys)
            .map(|(pid, dk)| {
                let share = eval_private_share(&coeffs, *pid);
                Config::from_parts(
                    threshold,
                    public.clone(),
                    rid,
                    chain_key,
                    *pid,
                    KeySharePrivate::new(share.x),
                    dk,
                )
                .unwrap()
            })
            .collect();

        (secret_key, configs)
    }
}
