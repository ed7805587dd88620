// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! A threshold ECDSA signing library implementing the CMP protocol suite.
//!
//! A committee of `n` parties jointly holds a secp256k1 ECDSA key such that
//! no party ever learns the key and any `t + 1` of them can produce a
//! standard ECDSA signature. The crate provides two interactive protocols:
//!
//! - [`keygen`]: five rounds producing a [`Config`](keygen::Config) — the
//!   party's long-term share of the key together with every party's public
//!   material (ECDSA share, Paillier modulus, ring-Pedersen parameters).
//!   The same protocol, run with an existing `Config` as input, refreshes
//!   all shares while preserving the aggregate public key.
//! - [`sign`]: five rounds over a signing subset of `t + 1` parties,
//!   multiplying nonce and key shares through Paillier-based MtA and
//!   outputting a low-s normalized `(r, s)` signature.
//!
//! Both protocols are driven by [`Message`](messages::Message) passing: the
//! caller owns the transport, feeds inbound messages to a participant via
//! [`ProtocolParticipant::process_message`], and delivers the returned
//! outbound messages. Broadcast consistency is enforced internally with an
//! echo round. Any cryptographic misbehavior terminates the session with an
//! error naming the culprit parties.
//!
//! Long-running number-theoretic work (safe-prime search, per-peer proof
//! generation) is dispatched to a [`Pool`](pool::Pool) that may be shared
//! across sessions.

#![allow(non_snake_case)]
#![warn(missing_docs)]

#[macro_use]
mod macros {
    /// Serialize a value into bytes with the crate's canonical codec.
    ///
    /// Returns `Result<Vec<u8>>`, mapping codec failures to
    /// [`InternalError::Serialization`](crate::errors::InternalError).
    macro_rules! serialize {
        ($x:expr) => {{
            bincode::serialize($x).map_err(|_| crate::errors::InternalError::Serialization)
        }};
    }

    /// Deserialize bytes produced by [`serialize!`].
    ///
    /// Failures are attributed to the calling application (or the remote
    /// sender) rather than to this crate.
    macro_rules! deserialize {
        ($x:expr) => {{
            bincode::deserialize($x).map_err(|_| {
                crate::errors::InternalError::CallingApplicationMistake(
                    crate::errors::CallerError::DeserializationFailed,
                )
            })
        }};
    }

    /// Run a body producing `Result<Vec<Message>>` at most once per
    /// participant.
    ///
    /// Message handlers can be triggered multiple times for the same round
    /// boundary (e.g. when processing stashed messages); the first call
    /// produces the round's outbound messages and subsequent calls yield an
    /// empty batch.
    macro_rules! run_only_once {
        ($self:ident . $func:ident ( $($arg:expr),* $(,)? )) => {{
            if $self.local_storage_mut().mark_done_once(stringify!($func)) {
                $self.$func($($arg),*)
            } else {
                Ok(Vec::new())
            }
        }};
    }
}

mod broadcast;
pub mod curve;
pub mod errors;
mod gmp_zeroize;
pub mod keygen;
mod local_storage;
mod message_queue;
pub mod messages;
pub mod paillier;
mod parameters;
pub mod participant;
pub mod pool;
pub mod protocol;
pub mod ring_pedersen;
pub mod sign;
mod utils;
pub mod zkp;

pub use gmp_zeroize::enable_zeroize;
pub use keygen::{Config, KeygenParticipant};
pub use messages::{Message, MessageType};
pub use participant::{ProcessOutcome, ProtocolParticipant, Status};
pub use pool::Pool;
pub use protocol::{Identifier, Participant, ParticipantConfig, ParticipantIdentifier};
pub use sign::SignParticipant;
