pub mod crypto;
pub mod error;
pub mod handler;
pub mod transaction;
pub mod utxo;

pub use crypto::{Ed25519Verifier, SignatureVerifier};
pub use error::{BatchError, Rejection, TxError, VerificationError};
pub use handler::{Accepted, BatchOutcome, Rejected, TxHandler};
pub use transaction::{Input, PublicKey, Transaction, TxHash};
pub use utxo::{Output, Utxo, UtxoPool};
