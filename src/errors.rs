// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! Error types for the CMP protocols.
//!
//! The crate distinguishes between mistakes made by the calling application
//! ([`CallerError`]), faults observed during a protocol run
//! ([`Fault`], wrapped in a [`Violation`] naming the culprit parties), and
//! internal invariant failures. All of them surface through
//! [`InternalError`]; a protocol session never recovers from an error — the
//! caller must abandon it.

use crate::protocol::ParticipantIdentifier;
use std::fmt::{Display, Formatter};

/// The default result type for the crate.
pub type Result<T> = std::result::Result<T, InternalError>;

/// Errors triggered by the calling application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerError {
    /// Input to a protocol constructor was malformed.
    BadInput,
    /// Bytes could not be decoded into the expected type.
    DeserializationFailed,
    /// A message of an unexpected type was passed to a participant.
    WrongMessageType,
    /// A message was passed to a session it does not belong to.
    WrongSessionIdentifier,
    /// A message was passed to a participant that already terminated.
    ProtocolAlreadyTerminated,
    /// A sampling loop exceeded its retry budget.
    RetryFailed,
}

impl Display for CallerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            CallerError::BadInput => "malformed input to a protocol constructor",
            CallerError::DeserializationFailed => "failed to deserialize bytes",
            CallerError::WrongMessageType => "message type does not match the protocol",
            CallerError::WrongSessionIdentifier => "message belongs to a different session",
            CallerError::ProtocolAlreadyTerminated => "the protocol already terminated",
            CallerError::RetryFailed => "exceeded the maximum number of sampling retries",
        };
        write!(f, "{msg}")
    }
}

/// The zero-knowledge proof that failed, for [`Fault::ZkProofFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofKind {
    /// Paillier–Blum modulus proof.
    Mod,
    /// Ring-Pedersen parameter proof.
    Prm,
    /// Schnorr proof of knowledge.
    Sch,
    /// Paillier plaintext range proof.
    Enc,
    /// Group-element / Paillier plaintext equality proof.
    LogStar,
    /// Affine-operation proof with a group-element witness commitment.
    AffG,
    /// Affine-operation proof with a Paillier witness commitment.
    AffP,
}

impl Display for ProofKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProofKind::Mod => "mod",
            ProofKind::Prm => "prm",
            ProofKind::Sch => "sch",
            ProofKind::Enc => "enc",
            ProofKind::LogStar => "log*",
            ProofKind::AffG => "aff-g",
            ProofKind::AffP => "aff-p",
        };
        write!(f, "{name}")
    }
}

/// The observable kinds of protocol misbehavior and failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A Paillier ciphertext was outside `[1, N²-1]` or shared a factor
    /// with the modulus.
    InvalidCiphertext,
    /// A Paillier prime factor had the wrong bit length.
    PrimeBadLength,
    /// A Paillier prime factor was not ≡ 3 (mod 4).
    NotBlum,
    /// A Paillier prime factor was not a safe prime.
    NotSafePrime,
    /// A received secret share was out of range or malformed.
    InvalidShare,
    /// A decrypted share did not match the sender's committed polynomial.
    VssFailed,
    /// A zero-knowledge proof failed to verify.
    ZkProofFailed(ProofKind),
    /// A decommitment did not match the earlier commitment.
    CommitmentMismatch,
    /// Parties reported conflicting views of a broadcast value.
    EchoInconsistent,
    /// A Paillier plaintext did not fit the scalar field.
    DecryptionOverflow,
    /// The assembled signature failed to verify.
    SignatureInvalid,
    /// A party did not deliver its messages within the round budget.
    Timeout,
    /// The session was cancelled by its driver.
    Cancelled,
    /// Catch-all for malformed or out-of-place protocol messages.
    ProtocolViolation,
}

impl Display for Fault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Fault::InvalidCiphertext => write!(f, "invalid Paillier ciphertext"),
            Fault::PrimeBadLength => write!(f, "prime factor has the wrong length"),
            Fault::NotBlum => write!(f, "prime factor is not equivalent to 3 (mod 4)"),
            Fault::NotSafePrime => write!(f, "supposed prime factor is not a safe prime"),
            Fault::InvalidShare => write!(f, "invalid secret share"),
            Fault::VssFailed => write!(f, "share does not lie on the committed polynomial"),
            Fault::ZkProofFailed(kind) => write!(f, "{kind} proof failed to verify"),
            Fault::CommitmentMismatch => write!(f, "decommitment does not match commitment"),
            Fault::EchoInconsistent => write!(f, "inconsistent echo broadcast"),
            Fault::DecryptionOverflow => write!(f, "decrypted value overflows the scalar field"),
            Fault::SignatureInvalid => write!(f, "assembled signature failed to verify"),
            Fault::Timeout => write!(f, "round time budget expired"),
            Fault::Cancelled => write!(f, "session cancelled"),
            Fault::ProtocolViolation => write!(f, "protocol violation"),
        }
    }
}

/// A protocol fault together with the parties it is attributed to.
///
/// The culprit set may be empty for faults that cannot be pinned on a
/// specific party (echo-broadcast inconsistency, engine-level failures).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    culprits: Vec<ParticipantIdentifier>,
    fault: Fault,
}

impl Violation {
    /// A fault attributed to a single party.
    pub(crate) fn blame(culprit: ParticipantIdentifier, fault: Fault) -> Self {
        Self {
            culprits: vec![culprit],
            fault,
        }
    }

    /// A fault attributed to a set of parties.
    pub(crate) fn blame_all(mut culprits: Vec<ParticipantIdentifier>, fault: Fault) -> Self {
        culprits.sort();
        culprits.dedup();
        Self { culprits, fault }
    }

    /// A fault that cannot be attributed to any specific party.
    pub(crate) fn unattributed(fault: Fault) -> Self {
        Self {
            culprits: Vec::new(),
            fault,
        }
    }

    /// The parties this fault is attributed to, sorted; possibly empty.
    pub fn culprits(&self) -> &[ParticipantIdentifier] {
        &self.culprits
    }

    /// The kind of fault observed.
    pub fn fault(&self) -> Fault {
        self.fault
    }
}

impl Display for Violation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.culprits.is_empty() {
            write!(f, "{} (unattributed)", self.fault)
        } else {
            write!(f, "{} (culprits:", self.fault)?;
            for culprit in &self.culprits {
                write!(f, " {culprit}")?;
            }
            write!(f, ")")
        }
    }
}

/// The error type returned by the library API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalError {
    /// An invariant the implementation relies on did not hold. This
    /// indicates a bug and is never attributable to a remote party.
    InternalInvariantFailed,
    /// The calling application misused the API.
    CallingApplicationMistake(CallerError),
    /// A value failed to serialize.
    Serialization,
    /// A party violated the protocol; the session is dead.
    ProtocolError(Violation),
}

impl InternalError {
    /// Shorthand for a protocol error blaming one party.
    pub(crate) fn blame(culprit: ParticipantIdentifier, fault: Fault) -> Self {
        InternalError::ProtocolError(Violation::blame(culprit, fault))
    }

    /// Shorthand for a protocol error with no attributable culprit.
    pub(crate) fn unattributed(fault: Fault) -> Self {
        InternalError::ProtocolError(Violation::unattributed(fault))
    }

    /// Attribute an unattributed protocol fault to a specific party.
    ///
    /// Leaf operations (decryption, proof verification) report faults
    /// without a culprit; the round handler that knows the sender pins it.
    pub(crate) fn attributed_to(self, culprit: ParticipantIdentifier) -> Self {
        match self {
            InternalError::ProtocolError(violation) if violation.culprits().is_empty() => {
                InternalError::blame(culprit, violation.fault())
            }
            other => other,
        }
    }

    /// The violation carried by this error, if it is a protocol error.
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            InternalError::ProtocolError(violation) => Some(violation),
            _ => None,
        }
    }
}

impl Display for InternalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InternalError::InternalInvariantFailed => {
                write!(f, "an internal invariant was violated")
            }
            InternalError::CallingApplicationMistake(caller) => {
                write!(f, "caller error: {caller}")
            }
            InternalError::Serialization => write!(f, "failed to serialize a value"),
            InternalError::ProtocolError(violation) => write!(f, "protocol error: {violation}"),
        }
    }
}

impl std::error::Error for InternalError {}

impl From<CallerError> for InternalError {
    fn from(err: CallerError) -> Self {
        InternalError::CallingApplicationMistake(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_culprits_are_sorted_and_deduped() {
        let a = ParticipantIdentifier::from_u128(7);
        let b = ParticipantIdentifier::from_u128(3);
        let violation = Violation::blame_all(vec![a, b, a], Fault::VssFailed);
        assert_eq!(violation.culprits(), &[b, a]);
        assert_eq!(violation.fault(), Fault::VssFailed);
    }

    #[test]
    fn unattributed_violation_has_no_culprits() {
        let violation = Violation::unattributed(Fault::EchoInconsistent);
        assert!(violation.culprits().is_empty());
    }
}
