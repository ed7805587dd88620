// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Input to the keygen / refresh protocol.

use crate::{
    errors::{CallerError, Result},
    keygen::Config,
    pool::Pool,
    protocol::ParticipantConfig,
};
use tracing::error;

/// Input for a keygen or refresh session.
#[derive(Debug)]
pub struct Input {
    threshold: usize,
    pool: Pool,
    previous: Option<Config>,
}

impl Input {
    /// Input for an initial key generation with signing threshold
    /// `threshold + 1` (any `threshold + 1` parties can sign; no
    /// `threshold` parties can).
    pub fn new(threshold: usize, pool: Pool) -> Result<Self> {
        if threshold < 1 {
            error!("threshold must be at least 1");
            Err(CallerError::BadInput)?;
        }
        Ok(Self {
            threshold,
            pool,
            previous: None,
        })
    }

    /// Input for a share refresh of an existing [`Config`].
    ///
    /// The session must run with exactly the committee of the config.
    pub fn refresh(previous: Config, pool: Pool) -> Result<Self> {
        Ok(Self {
            threshold: previous.threshold(),
            pool,
            previous: Some(previous),
        })
    }

    pub(crate) fn threshold(&self) -> usize {
        self.threshold
    }

    pub(crate) fn pool(&self) -> &Pool {
        &self.pool
    }

    pub(crate) fn previous(&self) -> Option<&Config> {
        self.previous.as_ref()
    }

    pub(crate) fn is_refresh(&self) -> bool {
        self.previous.is_some()
    }

    /// Check the input against the session's participant set.
    pub(crate) fn check_participant_config(&self, config: &ParticipantConfig) -> Result<()> {
        if self.threshold >= config.count() {
            error!(
                "threshold {} requires more than {} participants",
                self.threshold,
                config.count()
            );
            Err(CallerError::BadInput)?;
        }
        if let Some(previous) = &self.previous {
            if previous.participants() != config.all_participants() {
                error!("refresh must run with the committee of the existing config");
                Err(CallerError::BadInput)?;
            }
            if previous.id() != config.id() {
                error!("refresh input belongs to a different participant");
                Err(CallerError::BadInput)?;
            }
        }
        Ok(())
    }
}
