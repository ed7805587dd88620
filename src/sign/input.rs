// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Input to the signing protocol.

use crate::{
    errors::{CallerError, Result},
    keygen::Config,
    pool::Pool,
    protocol::ParticipantIdentifier,
};
use generic_array::{typenum::U32, GenericArray};
use sha2::{Digest, Sha256};
use tracing::error;

/// Input for a signing session.
#[derive(Debug)]
pub struct Input {
    config: Config,
    signers: Vec<ParticipantIdentifier>,
    digest: Sha256,
    pool: Pool,
}

impl Input {
    /// Construct a signing input over a message.
    ///
    /// `signers` must be a valid signing subset of the config's committee
    /// (exactly `threshold + 1` members, this party included); the
    /// message is hashed with SHA-256.
    pub fn new(
        config: Config,
        signers: Vec<ParticipantIdentifier>,
        message: &[u8],
        pool: Pool,
    ) -> Result<Self> {
        // An empty message would leave the session's gate open for a
        // later message; that mode is not supported.
        if message.is_empty() {
            error!("refusing to start signing without a message");
            Err(CallerError::BadInput)?;
        }
        Self::new_from_digest(config, signers, Sha256::new_with_prefix(message), pool)
    }

    /// Construct a signing input from a prepared SHA-256 digest.
    pub fn new_from_digest(
        config: Config,
        signers: Vec<ParticipantIdentifier>,
        digest: Sha256,
        pool: Pool,
    ) -> Result<Self> {
        if !config.can_sign(&signers) {
            error!("signers is not a valid signing subset of the config");
            Err(CallerError::BadInput)?;
        }
        if !signers.contains(&config.id()) {
            error!("this party is not in the signing subset");
            Err(CallerError::BadInput)?;
        }
        Ok(Self {
            config,
            signers,
            digest,
            pool,
        })
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn signers(&self) -> &[ParticipantIdentifier] {
        &self.signers
    }

    pub(crate) fn pool(&self) -> &Pool {
        &self.pool
    }

    /// The message digest. Forces a clone of the hash state.
    pub(crate) fn digest(&self) -> Sha256 {
        self.digest.clone()
    }

    /// The digest as 32 bytes.
    pub(crate) fn digest_hash(&self) -> GenericArray<u8, U32> {
        self.digest.clone().finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{keygen::output::testing::simulate_quorum, utils::testing::init_testing};

    #[test]
    fn input_enforces_the_signing_subset() {
        let mut rng = init_testing();
        let mut pids: Vec<_> = (0..3)
            .map(|_| ParticipantIdentifier::random(&mut rng))
            .collect();
        pids.sort();
        let (_, configs) = simulate_quorum(&pids, 1, &mut rng);
        let config = configs[0].clone();
        let me = config.id();
        let other = pids.iter().copied().find(|pid| *pid != me).unwrap();
        let outsider = ParticipantIdentifier::random(&mut rng);

        // Happy path.
        assert!(Input::new(
            config.clone(),
            vec![me, other],
            b"message",
            Pool::serial()
        )
        .is_ok());

        // Empty message, wrong subset sizes, and strangers are rejected.
        assert!(Input::new(config.clone(), vec![me, other], b"", Pool::serial()).is_err());
        assert!(Input::new(config.clone(), vec![me], b"m", Pool::serial()).is_err());
        assert!(Input::new(config.clone(), pids.clone(), b"m", Pool::serial()).is_err());
        assert!(Input::new(config.clone(), vec![me, outsider], b"m", Pool::serial()).is_err());

        // A subset that omits this party is rejected even if it is valid
        // for the committee.
        let without_me: Vec<_> = pids.iter().copied().filter(|pid| *pid != me).collect();
        assert!(Input::new(config, without_me, b"m", Pool::serial()).is_err());
    }
}
