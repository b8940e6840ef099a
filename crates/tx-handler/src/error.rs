use crate::handler::BatchOutcome;
use crate::utxo::Utxo;
use rust_decimal::Decimal;
use thiserror::Error;

/// Why a transaction was not accepted. Rejections are ordinary outcomes, not faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("input {index} spends {utxo}, which is not in the pool")]
    MissingInput { index: usize, utxo: Utxo },

    #[error("input {index} claims {utxo} a second time")]
    DuplicateInput { index: usize, utxo: Utxo },

    #[error("input {index} has an invalid signature")]
    InvalidSignature { index: usize },

    #[error("output {index} has negative value {value}")]
    NegativeOutput { index: usize, value: Decimal },

    #[error("inputs total {inputs} but outputs total {outputs}")]
    InsufficientInputs { inputs: Decimal, outputs: Decimal },

    #[error("value sum overflows")]
    ValueOverflow,
}

/// Signature verification could not be carried out at all
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("verification unavailable: malformed public key {key}")]
    MalformedKey { key: String },
}

/// Outcome of a failed transaction check
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    #[error("transaction rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Verification(#[from] VerificationError),
}

/// Batch stopped by a verification fault.
///
/// `outcome.accepted` lists every transaction already applied to the pool.
/// `outcome.rejected` is empty since the batch never reached its fixed point.
#[derive(Debug, Clone, Error)]
#[error(
    "batch aborted at position {position} after {} acceptances: {fault}",
    .outcome.accepted.len()
)]
pub struct BatchError {
    pub outcome: BatchOutcome,
    /// Batch position of the transaction whose verification failed
    pub position: usize,
    #[source]
    pub fault: VerificationError,
}
